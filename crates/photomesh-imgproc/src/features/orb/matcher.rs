use rayon::prelude::*;

use crate::features::{Correspondence, DescriptorMatcher};

/// Hamming distance between two fixed-size byte descriptors.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum()
}

/// Exhaustive nearest-neighbour search over binary descriptors with the Hamming distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct BruteForceMatcher;

impl<const N: usize> DescriptorMatcher<[u8; N]> for BruteForceMatcher {
    fn knn_match(
        &self,
        query: &[[u8; N]],
        train: &[[u8; N]],
        k: usize,
    ) -> Vec<Vec<Correspondence>> {
        query
            .par_iter()
            .enumerate()
            .map(|(qi, q)| {
                // insertion into a short sorted list keeps the k best with stable ties
                let mut best: Vec<Correspondence> = Vec::with_capacity(k + 1);
                for (ti, t) in train.iter().enumerate() {
                    let distance = hamming_distance(q, t);
                    if best.len() == k && best.last().is_some_and(|w| w.distance <= distance) {
                        continue;
                    }
                    let pos = best.partition_point(|c| c.distance <= distance);
                    best.insert(
                        pos,
                        Correspondence {
                            query: qi,
                            train: ti,
                            distance,
                        },
                    );
                    best.truncate(k);
                }
                best
            })
            .collect()
    }
}
