use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::vision::FeatureMatch;

fn l2(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn nearest(
    query_idx: usize,
    query: ArrayView1<f32>,
    train: &Array2<f32>,
    k: usize,
) -> Vec<FeatureMatch> {
    let mut candidates: Vec<FeatureMatch> = train
        .rows()
        .into_iter()
        .enumerate()
        .map(|(train_idx, row)| FeatureMatch {
            query_idx,
            train_idx,
            distance: l2(query, row),
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.train_idx.cmp(&b.train_idx))
    });
    candidates.truncate(k);
    candidates
}

/// Brute-force k-nearest-neighbour matching by Euclidean distance.
///
/// Entry `i` lists the neighbours of query row `i`, closest first.
pub fn knn_match(query: &Array2<f32>, train: &Array2<f32>, k: usize) -> Vec<Vec<FeatureMatch>> {
    if k == 0 || train.nrows() == 0 || query.ncols() != train.ncols() {
        return vec![Vec::new(); query.nrows()];
    }
    if query.nrows() * train.nrows() >= PARALLEL_PIXEL_THRESHOLD {
        (0..query.nrows())
            .into_par_iter()
            .map(|i| nearest(i, query.row(i), train, k))
            .collect()
    } else {
        (0..query.nrows())
            .map(|i| nearest(i, query.row(i), train, k))
            .collect()
    }
}
