use ndarray::{Array1, Array2};
use rand::prelude::*;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

use crate::error::{ErrorKind, PipelineError, Result};

/// Distance/index pair ordered by distance, for heap-based partial sort.
#[derive(Debug, Clone, Copy)]
struct NeighborDist(f64, usize);

impl PartialEq for NeighborDist {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for NeighborDist {}
impl PartialOrd for NeighborDist {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for NeighborDist {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Synthetic minority oversampling. Every class is brought up to the
/// majority class count by interpolating between a minority sample and one
/// of its k nearest same-class neighbors. Original rows are kept unchanged
/// as a prefix of the output.
#[derive(Debug, Clone)]
pub struct Smote {
    k_neighbors: usize,
    seed: u64,
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self {
            k_neighbors: k_neighbors.max(1),
            seed,
        }
    }

    pub fn fit_resample(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
    ) -> Result<(Array2<f64>, Array1<i64>)> {
        if x.nrows() != y.len() {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                "feature matrix and labels disagree on row count",
            ));
        }

        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(PipelineError::new(
                ErrorKind::InvalidInput,
                "need at least 2 classes to balance",
            ));
        }
        let majority = counts.values().copied().max().unwrap_or(0);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic_x: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();

        // Deterministic iteration order over classes.
        let mut classes: Vec<i64> = counts.keys().copied().collect();
        classes.sort_unstable();

        for class in classes {
            let current = counts[&class];
            let deficit = majority - current;
            if deficit == 0 {
                continue;
            }

            let class_rows: Vec<Vec<f64>> = indices[&class]
                .iter()
                .map(|&i| x.row(i).iter().copied().collect())
                .collect();
            let k = self.k_neighbors.min(class_rows.len().saturating_sub(1)).max(1);

            let mut generated = 0usize;
            while generated < deficit {
                let sample = &class_rows[rng.gen_range(0..class_rows.len())];
                let neighbors = nearest_neighbors(sample, &class_rows, k);
                if neighbors.is_empty() {
                    // Degenerate class where every row coincides: duplicate it.
                    synthetic_x.push(sample.clone());
                } else {
                    let neighbor = &class_rows[neighbors[rng.gen_range(0..neighbors.len())]];
                    synthetic_x.push(interpolate(sample, neighbor, rng.gen::<f64>()));
                }
                synthetic_y.push(class);
                generated += 1;
            }
            debug!(class, generated, "generated synthetic minority samples");
        }

        let n_original = x.nrows();
        let n_total = n_original + synthetic_x.len();
        let resampled_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[i - n_original][j]
            }
        });

        let mut resampled_y: Vec<i64> = y.iter().copied().collect();
        resampled_y.extend_from_slice(&synthetic_y);

        Ok((resampled_x, Array1::from_vec(resampled_y)))
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(ai, bi)| (ai - bi).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Indices of the k nearest rows to `point`, excluding exact coincidences.
fn nearest_neighbors(point: &[f64], rows: &[Vec<f64>], k: usize) -> Vec<usize> {
    let mut heap: BinaryHeap<NeighborDist> = BinaryHeap::with_capacity(k + 1);
    for (i, row) in rows.iter().enumerate() {
        let dist = euclidean(point, row);
        if dist <= 0.0 {
            continue;
        }
        if heap.len() < k {
            heap.push(NeighborDist(dist, i));
        } else if let Some(&NeighborDist(max_dist, _)) = heap.peek() {
            if dist < max_dist {
                heap.pop();
                heap.push(NeighborDist(dist, i));
            }
        }
    }
    heap.into_iter().map(|NeighborDist(_, i)| i).collect()
}

fn interpolate(point: &[f64], neighbor: &[f64], gap: f64) -> Vec<f64> {
    point
        .iter()
        .zip(neighbor.iter())
        .map(|(&p, &n)| p + gap * (n - p))
        .collect()
}

pub(crate) fn class_counts(y: &Array1<i64>) -> HashMap<i64, usize> {
    let mut counts = HashMap::new();
    for &label in y.iter() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

fn class_indices(y: &Array1<i64>) -> HashMap<i64, Vec<usize>> {
    let mut indices: HashMap<i64, Vec<usize>> = HashMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label).or_default().push(i);
    }
    indices
}
