use std::collections::VecDeque;

/// Sentinel label for points that fail to reach any cluster.
pub const NOISE: i32 = -1;

/// Density-based clustering over a precomputed distance matrix.
///
/// Two points are neighbors when their distance is at most `eps`; a core
/// point has at least `min_samples` neighbors (itself included). Clusters are
/// the maximal density-connected sets reachable from core points, expanded
/// breadth-first in index order so the labeling is deterministic. With
/// `min_samples = 1` every point is a core point and clustering degenerates
/// to nearest-neighbor chaining, which is the intended "group everything
/// reasonably close" mode.
pub struct Dbscan {
    eps: f64,
    min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Dbscan { eps, min_samples }
    }

    /// Assign one label per point. Unreached points keep the `NOISE` label;
    /// callers that need total coverage follow up with `resolve_noise`.
    pub fn fit_predict(&self, matrix: &[Vec<f64>]) -> Result<Vec<i32>, Box<dyn std::error::Error>> {
        let n = matrix.len();
        for (i, row) in matrix.iter().enumerate() {
            if row.len() != n {
                return Err(format!(
                    "Malformed distance matrix: row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    n
                )
                .into());
            }
        }

        let mut labels = vec![NOISE; n];
        let mut visited = vec![false; n];
        let mut cluster = 0i32;

        for i in 0..n {
            if visited[i] {
                continue;
            }
            visited[i] = true;

            let neighbors = self.region_query(matrix, i);
            if neighbors.len() < self.min_samples {
                continue; // stays NOISE unless later reached from a core point
            }

            labels[i] = cluster;
            let mut queue: VecDeque<usize> = neighbors.into_iter().collect();
            while let Some(j) = queue.pop_front() {
                if labels[j] == NOISE {
                    labels[j] = cluster;
                }
                if visited[j] {
                    continue;
                }
                visited[j] = true;
                let reachable = self.region_query(matrix, j);
                if reachable.len() >= self.min_samples {
                    queue.extend(reachable);
                }
            }
            cluster += 1;
        }

        Ok(labels)
    }

    fn region_query(&self, matrix: &[Vec<f64>], i: usize) -> Vec<usize> {
        matrix[i]
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d <= self.eps)
            .map(|(j, _)| j)
            .collect()
    }
}

/// Remap every noise point to a fresh, previously-unused label so that each
/// image ends up in exactly one cluster (genuinely unique layouts become
/// singleton clusters instead of being dropped from the report).
pub fn resolve_noise(labels: &mut [i32]) {
    let mut next = labels.iter().copied().filter(|&l| l >= 0).max().map_or(0, |m| m + 1);
    for label in labels.iter_mut() {
        if *label == NOISE {
            *label = next;
            next += 1;
        }
    }
}
