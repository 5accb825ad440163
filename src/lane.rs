//! Compare-exchange lanes.
//!
//! A lane is one independent unit of parallel work. In every round it owns
//! `ELEMENTS_PER_LANE` array positions, arranged as two vectors of
//! `VECTOR_WIDTH` elements, and performs compare-exchanges between them.
//! Lanes of the same round never share a position, so rounds only need a
//! barrier between them, not inside them.
//!
//! Two kinds of rounds exist:
//!
//! - **Work-group rounds** (init, stage zero, merge last) operate on a whole
//!   tile of `ELEMENTS_PER_LANE * local_size` elements that one work-group
//!   holds in local storage. [`sort_tile`] and [`merge_tile`] run the lanes of
//!   one group pass by pass, where each pass ends at a group barrier.
//! - **Cross-tile rounds** (stage n, merge) compare vectors from different
//!   tiles. [`cross_tile_pair`] gives each lane its two vectors.

use crate::config::Direction;

/// Elements in one vector.
pub const VECTOR_WIDTH: usize = 4;

/// Elements owned by one lane per round.
pub const ELEMENTS_PER_LANE: usize = 2 * VECTOR_WIDTH;

/// Compare-exchanges performed by one lane per work-group pass.
pub const PAIRS_PER_LANE: usize = ELEMENTS_PER_LANE / 2;

/// Order `data[a]` and `data[b]` according to `direction`.
#[inline]
pub fn compare_exchange(data: &mut [i32], a: usize, b: usize, direction: Direction) {
    debug_assert!(a < b, "lane positions must satisfy a < b ({} >= {})", a, b);
    if direction.out_of_order(data[a], data[b]) {
        data.swap(a, b);
    }
}

/// Positions of butterfly `pair` at comparison `distance`.
///
/// Pairs are numbered densely: for distance `d` the pairs `0..d` cover the
/// first `2d` positions, pairs `d..2d` the next `2d`, and so on.
#[inline]
pub fn butterfly(pair: usize, distance: usize) -> (usize, usize) {
    let a = (pair / distance) * (distance * 2) + pair % distance;
    (a, a + distance)
}

/// First element of each vector compared by lane `local_id` of `group` in a
/// cross-tile round at distance `stage` (in blocks of `local_size` vectors).
///
/// The lane compares elements `a + k` with `b + k` for `k < VECTOR_WIDTH`.
#[inline]
pub fn cross_tile_pair(
    group: usize,
    local_id: usize,
    local_size: usize,
    stage: usize,
) -> (usize, usize) {
    let vector = (group + (group / stage) * stage) * local_size + local_id;
    let a = vector * VECTOR_WIDTH;
    (a, a + stage * local_size * VECTOR_WIDTH)
}

/// Direction of work-group `group` while building bitonic runs of `high_stage` tiles.
#[inline]
pub fn stage_direction(group: usize, high_stage: usize) -> Direction {
    Direction::from_flag(group / high_stage)
}

/// Fully sort one tile with the classic bitonic network.
///
/// `lanes` is the work-group width; `tile.len()` must be
/// `lanes * ELEMENTS_PER_LANE`. The tile ends up ordered in `direction`.
pub fn sort_tile(tile: &mut [i32], lanes: usize, direction: Direction) {
    debug_assert_eq!(tile.len(), lanes * ELEMENTS_PER_LANE);
    let flip = direction == Direction::Descending;

    let mut size = 2;
    while size <= tile.len() {
        let mut distance = size / 2;
        while distance > 0 {
            for lane in 0..lanes {
                for k in 0..PAIRS_PER_LANE {
                    let (a, b) = butterfly(lane * PAIRS_PER_LANE + k, distance);
                    // Sub-runs alternate so that each pair of them is bitonic.
                    let descending = ((a & size) != 0) != flip;
                    let dir = if descending {
                        Direction::Descending
                    } else {
                        Direction::Ascending
                    };
                    compare_exchange(tile, a, b, dir);
                }
            }
            // group barrier
            distance /= 2;
        }
        size *= 2;
    }
}

/// Resolve one bitonic tile into order, comparing at distances `tile.len() / 2` down to 1.
pub fn merge_tile(tile: &mut [i32], lanes: usize, direction: Direction) {
    debug_assert_eq!(tile.len(), lanes * ELEMENTS_PER_LANE);

    let mut distance = tile.len() / 2;
    while distance > 0 {
        for lane in 0..lanes {
            for k in 0..PAIRS_PER_LANE {
                let (a, b) = butterfly(lane * PAIRS_PER_LANE + k, distance);
                compare_exchange(tile, a, b, direction);
            }
        }
        distance /= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::check_integrity;
    use rand::Rng;
    use std::collections::HashSet;

    #[test]
    fn test_compare_exchange_ascending() {
        let mut data = vec![5, 3];
        compare_exchange(&mut data, 0, 1, Direction::Ascending);
        assert_eq!(data, vec![3, 5]);
        compare_exchange(&mut data, 0, 1, Direction::Ascending);
        assert_eq!(data, vec![3, 5]);
    }

    #[test]
    fn test_compare_exchange_descending() {
        let mut data = vec![1, 9, 4];
        compare_exchange(&mut data, 0, 2, Direction::Descending);
        assert_eq!(data, vec![4, 9, 1]);
    }

    #[test]
    fn test_compare_exchange_equal_values_untouched() {
        let mut data = vec![7, 7];
        compare_exchange(&mut data, 0, 1, Direction::Descending);
        assert_eq!(data, vec![7, 7]);
    }

    #[test]
    fn test_butterfly_covers_every_position_once() {
        for distance in [1, 2, 4, 8] {
            let mut seen = HashSet::new();
            for pair in 0..16 {
                let (a, b) = butterfly(pair, distance);
                assert_eq!(b - a, distance);
                assert!(seen.insert(a));
                assert!(seen.insert(b));
            }
            assert_eq!(seen.len(), 32);
            assert!(seen.iter().all(|&p| p < 32));
        }
    }

    #[test]
    fn test_cross_tile_pair_matches_vector_butterfly() {
        let local_size = 4;
        let num_stages = 8;
        for stage in [1, 2, 4, 8] {
            for group in 0..num_stages {
                for local_id in 0..local_size {
                    let (a, b) = cross_tile_pair(group, local_id, local_size, stage);
                    let (va, vb) = butterfly(group * local_size + local_id, stage * local_size);
                    assert_eq!((a, b), (va * VECTOR_WIDTH, vb * VECTOR_WIDTH));
                }
            }
        }
    }

    #[test]
    fn test_cross_tile_lanes_are_disjoint() {
        let local_size = 2;
        let num_stages = 16;
        let len = num_stages * local_size * ELEMENTS_PER_LANE;
        for stage in [2, 4, 8, 16] {
            let mut owner = vec![None; len];
            for group in 0..num_stages {
                for local_id in 0..local_size {
                    let lane = group * local_size + local_id;
                    let (a, b) = cross_tile_pair(group, local_id, local_size, stage);
                    for k in 0..VECTOR_WIDTH {
                        for pos in [a + k, b + k] {
                            assert_eq!(owner[pos], None, "position {} claimed twice", pos);
                            owner[pos] = Some(lane);
                        }
                    }
                }
            }
            assert!(owner.iter().all(Option::is_some));
        }
    }

    #[test]
    fn test_stage_direction_alternates_per_run() {
        let dirs: Vec<u32> = (0..8).map(|g| stage_direction(g, 2).flag()).collect();
        assert_eq!(dirs, vec![0, 0, 1, 1, 0, 0, 1, 1]);
        let dirs: Vec<u32> = (0..8).map(|g| stage_direction(g, 4).flag()).collect();
        assert_eq!(dirs, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_sort_tile_both_directions() {
        let mut rng = rand::thread_rng();
        for lanes in [1, 2, 4, 16] {
            for direction in [Direction::Ascending, Direction::Descending] {
                let mut tile: Vec<i32> = (0..lanes * ELEMENTS_PER_LANE)
                    .map(|_| rng.gen_range(-50..50))
                    .collect();
                let mut expected = tile.clone();
                expected.sort_unstable();
                if direction == Direction::Descending {
                    expected.reverse();
                }
                sort_tile(&mut tile, lanes, direction);
                assert_eq!(tile, expected);
            }
        }
    }

    #[test]
    fn test_merge_tile_resolves_bitonic_input() {
        // Ascending half followed by descending half.
        let mut tile: Vec<i32> = (0..8).chain((0..8).rev()).map(|x| x * 3).collect();
        merge_tile(&mut tile, 2, Direction::Ascending);
        assert!(check_integrity(&tile, Direction::Ascending));

        let mut tile: Vec<i32> = (0..8).chain((0..8).rev()).collect();
        merge_tile(&mut tile, 2, Direction::Descending);
        assert!(check_integrity(&tile, Direction::Descending));
    }

    #[test]
    fn test_merge_tile_inverts_sorted_tile() {
        let mut tile: Vec<i32> = (1..=8).collect();
        merge_tile(&mut tile, 1, Direction::Descending);
        assert_eq!(tile, (1..=8).rev().collect::<Vec<i32>>());
    }
}
