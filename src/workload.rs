//! Input generation for the demo binary, tests and benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Range of the random demo values, inclusive.
pub const RANDOM_MIN: i32 = 1;
pub const RANDOM_MAX: i32 = 100;

/// Shape of a generated input array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputPattern {
    /// Uniform values in `RANDOM_MIN..=RANDOM_MAX`.
    #[default]
    Random,
    /// Uniform values over the whole `i32` range.
    Wide,
    /// `0, 1, 2, ..`
    Sorted,
    /// `len - 1, .., 1, 0`
    Reversed,
    /// Every element equal.
    Constant,
}

/// Generate `len` values with the given pattern. `seed` only affects the random patterns.
pub fn generate(pattern: InputPattern, len: usize, seed: u64) -> Vec<i32> {
    match pattern {
        InputPattern::Random => {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..len)
                .map(|_| rng.gen_range(RANDOM_MIN..=RANDOM_MAX))
                .collect()
        }
        InputPattern::Wide => {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..len).map(|_| rng.gen()).collect()
        }
        InputPattern::Sorted => (0..len).map(|i| i as i32).collect(),
        InputPattern::Reversed => (0..len).rev().map(|i| i as i32).collect(),
        InputPattern::Constant => vec![42; len],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_is_seeded_and_bounded() {
        let a = generate(InputPattern::Random, 1000, 11);
        let b = generate(InputPattern::Random, 1000, 11);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (RANDOM_MIN..=RANDOM_MAX).contains(v)));
        assert_ne!(a, generate(InputPattern::Random, 1000, 12));
    }

    #[test]
    fn test_fixed_patterns() {
        assert_eq!(generate(InputPattern::Sorted, 4, 0), vec![0, 1, 2, 3]);
        assert_eq!(generate(InputPattern::Reversed, 4, 0), vec![3, 2, 1, 0]);
        assert_eq!(generate(InputPattern::Constant, 3, 0), vec![42, 42, 42]);
        assert_eq!(generate(InputPattern::Wide, 16, 0).len(), 16);
    }
}
