//! Post-sort integrity check.

use crate::config::Direction;

/// Check that `data` is monotonic in `direction`.
///
/// Equal neighbours are accepted. Pass the same direction the sort ran with;
/// a check in the opposite direction will reject a correctly sorted array.
#[inline]
pub fn check_integrity(data: &[i32], direction: Direction) -> bool {
    data.windows(2)
        .all(|w| !direction.out_of_order(w[0], w[1]))
}

/// Index of the first element that breaks the order, if any.
pub fn first_violation(data: &[i32], direction: Direction) -> Option<usize> {
    data.windows(2)
        .position(|w| direction.out_of_order(w[0], w[1]))
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_integrity_ascending() {
        assert!(check_integrity(&[1, 2, 3, 4, 5], Direction::Ascending));
        assert!(check_integrity(&[1, 1, 1, 1], Direction::Ascending));
        assert!(check_integrity(&[1], Direction::Ascending));
        assert!(check_integrity(&[], Direction::Ascending));
        assert!(!check_integrity(&[5, 4, 3, 2, 1], Direction::Ascending));
        assert!(!check_integrity(&[1, 3, 2], Direction::Ascending));
    }

    #[test]
    fn test_check_integrity_descending() {
        assert!(check_integrity(&[5, 4, 4, 2, -1], Direction::Descending));
        assert!(!check_integrity(&[1, 2, 3], Direction::Descending));
    }

    #[test]
    fn test_first_violation() {
        assert_eq!(first_violation(&[1, 2, 3], Direction::Ascending), None);
        assert_eq!(first_violation(&[1, 3, 2, 0], Direction::Ascending), Some(2));
        assert_eq!(first_violation(&[3, 2, 5], Direction::Descending), Some(2));
    }
}
