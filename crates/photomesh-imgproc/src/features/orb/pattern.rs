use rand::{rngs::StdRng, Rng, SeedableRng};

/// Half-size of the square region the BRIEF sample points are drawn from.
pub const PATCH_RADIUS: i32 = 13;

/// The 256 point pairs compared by the rotated BRIEF descriptor.
///
/// Each pair is `[x0, y0, x1, y1]` relative to the keypoint, drawn uniformly from
/// `[-PATCH_RADIUS, PATCH_RADIUS]`. The pattern only depends on the seed.
#[derive(Clone, Debug, PartialEq)]
pub struct BriefPattern {
    pairs: Vec<[i8; 4]>,
}

impl BriefPattern {
    /// Number of binary tests, one bit each.
    pub const N_BITS: usize = 256;

    /// Generate the pattern from a seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut pairs = Vec::with_capacity(Self::N_BITS);
        while pairs.len() < Self::N_BITS {
            let pair = [
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS) as i8,
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS) as i8,
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS) as i8,
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS) as i8,
            ];
            // a test comparing a point with itself carries no information
            if pair[0] != pair[2] || pair[1] != pair[3] {
                pairs.push(pair);
            }
        }

        Self { pairs }
    }

    /// The point pairs of the pattern.
    pub fn pairs(&self) -> &[[i8; 4]] {
        &self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_deterministic() {
        let a = BriefPattern::from_seed(7);
        let b = BriefPattern::from_seed(7);
        let c = BriefPattern::from_seed(8);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.pairs().len(), BriefPattern::N_BITS);
        assert!(a
            .pairs()
            .iter()
            .flatten()
            .all(|&v| (-PATCH_RADIUS..=PATCH_RADIUS).contains(&(v as i32))));
    }
}
