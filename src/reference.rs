//! Single-threaded bitonic network
//!
//! The textbook `i ^ j` formulation of the same network, run element by
//! element on one thread. Used as a baseline by the benchmark mode and as an
//! independent oracle in tests.
//!
//! Complexity: O(n * log²n) comparisons

use crate::config::Direction;
use crate::lane::compare_exchange;

/// Sort `data` in place in `direction`.
///
/// The length must be a power of two; empty and single-element slices are
/// left untouched.
pub fn sort(data: &mut [i32], direction: Direction) {
    let n = data.len();
    if n <= 1 {
        return;
    }

    assert!(
        n.is_power_of_two(),
        "Bitonic sort requires power of 2 length, got {}",
        n
    );

    // k is the length of the bitonic runs being built
    let mut k = 2;
    while k <= n {
        // j is the comparison distance
        let mut j = k / 2;
        while j > 0 {
            for i in 0..n {
                let partner = i ^ j;
                if partner > i {
                    // For k == n this is always the requested direction.
                    let dir = if (i & k) == 0 {
                        direction
                    } else {
                        direction.reversed()
                    };
                    compare_exchange(data, i, partner, dir);
                }
            }
            j /= 2;
        }
        k *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::check_integrity;
    use rand::Rng;

    #[test]
    fn test_sort_empty() {
        let mut data: Vec<i32> = vec![];
        sort(&mut data, Direction::Ascending);
        assert!(data.is_empty());
    }

    #[test]
    fn test_sort_power_of_2() {
        let mut data: Vec<i32> = (0..16).rev().collect();
        sort(&mut data, Direction::Ascending);
        assert_eq!(data, (0..16).collect::<Vec<i32>>());
    }

    #[test]
    fn test_sort_descending() {
        let mut data = vec![5, 3, 5, 1, 3, 5, 1, 1];
        sort(&mut data, Direction::Descending);
        assert_eq!(data, vec![5, 5, 5, 3, 3, 1, 1, 1]);
    }

    #[test]
    fn test_sort_random_power_of_2() {
        let mut rng = rand::thread_rng();
        let mut data: Vec<i32> = (0..1024).map(|_| rng.gen()).collect();
        let mut expected = data.clone();
        expected.sort_unstable();
        sort(&mut data, Direction::Ascending);
        assert!(check_integrity(&data, Direction::Ascending));
        assert_eq!(data, expected);
    }

    #[test]
    #[should_panic(expected = "Bitonic sort requires power of 2 length")]
    fn test_sort_non_power_of_2_panics() {
        let mut data = vec![1, 2, 3];
        sort(&mut data, Direction::Ascending);
    }
}
