use rayon::prelude::*;

use crate::features::{ImageFeatures, TOTAL_HASH_BITS};

/// Raw weights for the three sub-distances. They are renormalized to sum to 1
/// before use, so the combined distance stays in [0, 1] regardless of the raw
/// magnitudes supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct DistanceWeights {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl DistanceWeights {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        DistanceWeights { alpha, beta, gamma }
    }

    fn normalized(&self) -> (f64, f64, f64) {
        let sum = self.alpha + self.beta + self.gamma;
        (self.alpha / sum, self.beta / sum, self.gamma / sum)
    }
}

/// Sum of bitwise Hamming distances across the four hashes, normalized by the
/// total bit count so the result lies in [0, 1].
pub fn hash_distance(a: &ImageFeatures, b: &ImageFeatures) -> f64 {
    let bits = (a.ahash ^ b.ahash).count_ones()
        + (a.phash ^ b.phash).count_ones()
        + (a.dhash ^ b.dhash).count_ones()
        + (a.whash ^ b.whash).count_ones();
    bits as f64 / TOTAL_HASH_BITS as f64
}

/// One minus cosine similarity. A zero-norm vector (no edges at all) is
/// treated as maximally dissimilar rather than dividing by zero.
pub fn cosine_distance(u: &[f32], v: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_u = 0.0f64;
    let mut norm_v = 0.0f64;
    for (&a, &b) in u.iter().zip(v.iter()) {
        dot += a as f64 * b as f64;
        norm_u += a as f64 * a as f64;
        norm_v += b as f64 * b as f64;
    }
    let denom = norm_u.sqrt() * norm_v.sqrt();
    if denom == 0.0 {
        return 1.0;
    }
    1.0 - dot / denom
}

fn l1_distance(u: &[f32], v: &[f32]) -> f64 {
    if u.is_empty() {
        return 0.0;
    }
    let sum: f64 = u
        .iter()
        .zip(v.iter())
        .map(|(&a, &b)| (a as f64 - b as f64).abs())
        .sum();
    sum / u.len() as f64
}

/// Average of the horizontal and vertical projection L1 distances.
pub fn projection_distance(a: &ImageFeatures, b: &ImageFeatures) -> f64 {
    0.5 * (l1_distance(&a.h_projection, &b.h_projection)
        + l1_distance(&a.v_projection, &b.v_projection))
}

/// Weighted combination of the three sub-distances.
pub fn combined_distance(a: &ImageFeatures, b: &ImageFeatures, weights: &DistanceWeights) -> f64 {
    let dh = hash_distance(a, b);
    let de = cosine_distance(&a.edge_signature, &b.edge_signature);
    let dp = projection_distance(a, b);
    let (alpha, beta, gamma) = weights.normalized();
    alpha * dh + beta * de + gamma * dp
}

/// Build the full N x N symmetric distance matrix with zero diagonal. The
/// upper-triangle pairs are independent, so they are evaluated in parallel
/// and mirrored into place afterwards.
pub fn build_distance_matrix(
    features: &[ImageFeatures],
    weights: &DistanceWeights,
) -> Vec<Vec<f64>> {
    let n = features.len();
    let mut pairs = Vec::with_capacity(n.saturating_sub(1) * n / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }

    let distances: Vec<f64> = pairs
        .par_iter()
        .map(|&(i, j)| combined_distance(&features[i], &features[j], weights))
        .collect();

    let mut matrix = vec![vec![0.0f64; n]; n];
    for (&(i, j), &d) in pairs.iter().zip(distances.iter()) {
        matrix[i][j] = d;
        matrix[j][i] = d;
    }
    matrix
}
