// src/quantizer/codebook.rs — Vector quantizer (nearest prototype + k-means refresh)
//
// Algorithm for `rebuild`:
//   1. Start from the current prototypes; overwrite a random subset with
//      sampled data vectors so the refresh tracks the observed distribution
//   2. Assign each vector to its nearest prototype (Euclidean)
//   3. Recompute each prototype as the mean of its members; empty clusters
//      keep their previous prototype
//   4. Repeat for a fixed number of iterations

use serde::{Deserialize, Serialize};

use crate::infra::errors::{Result, SynapseError};
use crate::quantizer::rng::Rng;

/// Quantized token id in [0, K).
pub type TokenId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codebook {
    dimension: usize,
    prototypes: Vec<Vec<f32>>,
}

impl Codebook {
    /// K prototypes with independent components uniform in [-1, 1].
    pub fn random(size: usize, dimension: usize, rng: &mut Rng) -> Self {
        let prototypes = (0..size)
            .map(|_| (0..dimension).map(|_| rng.uniform(-1.0, 1.0)).collect())
            .collect();
        Self {
            dimension,
            prototypes,
        }
    }

    pub fn from_prototypes(prototypes: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = prototypes.first().map(Vec::len).unwrap_or(0);
        if prototypes.is_empty() || dimension == 0 {
            return Err(SynapseError::Config("codebook must not be empty".into()));
        }
        if prototypes.iter().any(|p| p.len() != dimension) {
            return Err(SynapseError::Config(
                "codebook prototypes must share one dimension".into(),
            ));
        }
        Ok(Self {
            dimension,
            prototypes,
        })
    }

    pub fn size(&self) -> usize {
        self.prototypes.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn prototypes(&self) -> &[Vec<f32>] {
        &self.prototypes
    }

    /// Nearest prototype by Euclidean distance; ties go to the lowest index.
    pub fn assign(&self, vector: &[f32]) -> TokenId {
        nearest(&self.prototypes, vector) as TokenId
    }

    /// Refresh prototypes by k-means over `vectors`. Size stays K.
    ///
    /// Fails without touching `self` when the batch is empty or has the
    /// wrong dimension.
    pub fn rebuild(&self, vectors: &[Vec<f32>], iterations: usize, rng: &mut Rng) -> Result<Self> {
        if vectors.is_empty() {
            return Err(SynapseError::TrainingFailure(
                "cannot cluster an empty batch".into(),
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(SynapseError::TrainingFailure(format!(
                "vector dimension {} does not match codebook dimension {}",
                bad.len(),
                self.dimension
            )));
        }

        let k = self.size();
        let mut centroids = self.prototypes.clone();

        // Seed min(K, n) prototypes with distinct data points
        let mut order: Vec<usize> = (0..vectors.len()).collect();
        rng.shuffle(&mut order);
        let mut slots: Vec<usize> = (0..k).collect();
        rng.shuffle(&mut slots);
        for (slot, idx) in slots.iter().zip(order.iter()) {
            centroids[*slot] = vectors[*idx].clone();
        }

        let mut assignments = vec![0usize; vectors.len()];
        for iteration in 0..iterations {
            let mut changed = 0usize;
            for (i, v) in vectors.iter().enumerate() {
                let c = nearest(&centroids, v);
                if c != assignments[i] || iteration == 0 {
                    changed += 1;
                }
                assignments[i] = c;
            }

            let mut sums = vec![vec![0.0f32; self.dimension]; k];
            let mut counts = vec![0usize; k];
            for (v, &c) in vectors.iter().zip(assignments.iter()) {
                counts[c] += 1;
                for (s, x) in sums[c].iter_mut().zip(v.iter()) {
                    *s += x;
                }
            }
            for c in 0..k {
                if counts[c] == 0 {
                    continue;
                }
                let n = counts[c] as f32;
                centroids[c] = sums[c].iter().map(|s| s / n).collect();
            }

            if changed == 0 {
                break;
            }
        }

        if centroids.iter().flatten().any(|x| !x.is_finite()) {
            return Err(SynapseError::TrainingFailure(
                "k-means produced non-finite prototypes".into(),
            ));
        }

        Ok(Self {
            dimension: self.dimension,
            prototypes: centroids,
        })
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(prototypes: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, p) in prototypes.iter().enumerate() {
        let d = squared_distance(p, vector);
        // strict: earlier index wins ties
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_shape() {
        let mut rng = Rng::seeded(1);
        let cb = Codebook::random(256, 18, &mut rng);
        assert_eq!(cb.size(), 256);
        assert!(cb.prototypes().iter().all(|p| p.len() == 18));
        assert!(cb
            .prototypes()
            .iter()
            .flatten()
            .all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn test_assign_nearest_and_ties() {
        let cb = Codebook::from_prototypes(vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 0.0],
        ])
        .unwrap();
        assert_eq!(cb.assign(&[0.9, 0.8]), 1);
        // duplicate prototypes 0 and 2: lowest index wins
        assert_eq!(cb.assign(&[0.1, 0.0]), 0);
    }

    #[test]
    fn test_rebuild_separates_clusters() {
        let mut rng = Rng::seeded(11);
        let cb = Codebook::from_prototypes(vec![vec![0.5, 0.5], vec![0.5, 0.5]]).unwrap();
        let mut data = Vec::new();
        for i in 0..20 {
            let j = i as f32 * 0.001;
            data.push(vec![0.0 + j, 0.0]);
            data.push(vec![1.0 - j, 1.0]);
        }
        let rebuilt = cb.rebuild(&data, 10, &mut rng).unwrap();
        assert_eq!(rebuilt.size(), 2);
        let a = rebuilt.assign(&[0.0, 0.0]);
        let b = rebuilt.assign(&[1.0, 1.0]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rebuild_keeps_size_with_few_vectors() {
        let mut rng = Rng::seeded(5);
        let cb = Codebook::random(8, 3, &mut rng);
        let rebuilt = cb
            .rebuild(&[vec![0.2, 0.2, 0.2], vec![0.8, 0.8, 0.8]], 10, &mut rng)
            .unwrap();
        assert_eq!(rebuilt.size(), 8);
    }

    #[test]
    fn test_rebuild_rejects_bad_input() {
        let mut rng = Rng::seeded(5);
        let cb = Codebook::random(4, 3, &mut rng);
        assert!(cb.rebuild(&[], 10, &mut rng).is_err());
        assert!(cb.rebuild(&[vec![1.0]], 10, &mut rng).is_err());
    }

    #[test]
    fn test_from_prototypes_validation() {
        assert!(Codebook::from_prototypes(vec![]).is_err());
        assert!(Codebook::from_prototypes(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
