//! TF-IDF vectorization of log messages.
//!
//! Messages are clipped, tokenized and projected onto a bounded
//! vocabulary so the clustering pass downstream works on fixed-width,
//! unit-length vectors regardless of batch size.

use std::collections::{HashMap, HashSet};

use logwarden_core::record::truncate_chars;

/// Characters of each message considered for tokenization.
const MAX_DOC_LEN: usize = 256;
/// Upper bound on vocabulary size; terms beyond it are dropped.
const MAX_VOCABULARY: usize = 100;
/// Tokens shorter than this carry no signal and are discarded.
const MIN_TOKEN_LEN: usize = 2;

/// Common English filler with no diagnostic value in log text.
const STOP_WORDS: [&str; 48] = [
    "about", "after", "all", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
    "can", "could", "did", "do", "each", "for", "from", "had", "has", "have", "how", "if", "in",
    "into", "is", "it", "its", "may", "more", "not", "of", "on", "or", "over", "so", "such",
    "that", "the", "then", "this", "to", "was", "were", "will", "with",
];

/// Builds one unit-length TF-IDF vector per message.
///
/// Returns `None` when no message yields a usable token, in which case
/// outlier detection has nothing to stand on.
pub(crate) fn vectorize(messages: &[&str]) -> Option<Vec<Vec<f64>>> {
    let docs: Vec<Vec<String>> = messages.iter().map(|m| tokenize(m)).collect();

    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *df.entry(term).or_insert(0) += 1;
        }
    }
    if df.is_empty() {
        return None;
    }

    let mut terms: Vec<(&str, usize)> = df.into_iter().collect();
    // Most frequent first; ties resolve alphabetically so the vocabulary
    // is deterministic across runs.
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    terms.truncate(MAX_VOCABULARY);

    let index: HashMap<&str, usize> = terms
        .iter()
        .enumerate()
        .map(|(i, (term, _))| (*term, i))
        .collect();
    let n_docs = docs.len() as f64;
    // Smoothed inverse document frequency, never zero or negative.
    let idf: Vec<f64> = terms
        .iter()
        .map(|(_, df)| ((1.0 + n_docs) / (1.0 + *df as f64)).ln() + 1.0)
        .collect();

    let vectors = docs
        .iter()
        .map(|doc| {
            let mut vector = vec![0.0; terms.len()];
            for token in doc {
                if let Some(&i) = index.get(token.as_str()) {
                    vector[i] += idf[i];
                }
            }
            normalize(&mut vector);
            vector
        })
        .collect();
    Some(vectors)
}

/// Lowercases, splits on non-alphanumeric runs and drops noise tokens.
pub(crate) fn tokenize(message: &str) -> Vec<String> {
    truncate_chars(message, MAX_DOC_LEN)
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
