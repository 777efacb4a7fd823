//! Density-based clustering over message vectors.
//!
//! A minimal DBSCAN: points with at least `min_samples` neighbors inside
//! `eps` (themselves included) seed a cluster, reachable points join it,
//! and everything left over is labeled [`NOISE`]. Noise is what the
//! outlier detector is after.

use std::collections::VecDeque;

/// Label for points outside every dense neighborhood.
pub(crate) const NOISE: i32 = -1;
const UNCLASSIFIED: i32 = -2;

/// Labels each point with a cluster id starting at `0`, or [`NOISE`].
pub(crate) fn dbscan(points: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<i32> {
    let mut labels = vec![UNCLASSIFIED; points.len()];
    let mut cluster = 0;

    for i in 0..points.len() {
        if labels[i] != UNCLASSIFIED {
            continue;
        }
        let neighbors = region_query(points, i, eps);
        if neighbors.len() < min_samples {
            labels[i] = NOISE;
            continue;
        }

        labels[i] = cluster;
        let mut queue: VecDeque<usize> = neighbors.into();
        while let Some(j) = queue.pop_front() {
            if labels[j] == NOISE {
                // Border point: reachable from a core point, not expanded.
                labels[j] = cluster;
            }
            if labels[j] != UNCLASSIFIED {
                continue;
            }
            labels[j] = cluster;
            let next = region_query(points, j, eps);
            if next.len() >= min_samples {
                queue.extend(next);
            }
        }
        cluster += 1;
    }
    labels
}

fn region_query(points: &[Vec<f64>], center: usize, eps: f64) -> Vec<usize> {
    (0..points.len())
        .filter(|&j| euclidean_distance(&points[center], &points[j]) <= eps)
        .collect()
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
