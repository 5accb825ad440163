//! Bitonic stage scheduling.
//!
//! The whole round sequence is computed up front from the launch geometry and
//! the direction, without touching a substrate. [`Schedule::plan`] is the
//! single source of truth for what gets dispatched and in which order.
//!
//! For `num_stages` tiles the sequence is:
//!
//! ```text
//! Init
//! for high_stage in 2, 4, .. while high_stage < num_stages:
//!     StageN { stage: high_stage }, .., StageN { stage: 2 }
//!     StageZero { high_stage }
//! Merge { stage: num_stages }, .., Merge { stage: 2 }
//! MergeLast
//! ```

use std::fmt;

use crate::config::{Direction, LaunchGeometry};

/// Kernel a round runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundKind {
    Init,
    StageZero,
    StageN,
    Merge,
    MergeLast,
}

impl RoundKind {
    pub const ALL: [RoundKind; 5] = [
        RoundKind::Init,
        RoundKind::StageZero,
        RoundKind::StageN,
        RoundKind::Merge,
        RoundKind::MergeLast,
    ];

    /// Name of the compute kernel behind this round.
    pub fn kernel_name(self) -> &'static str {
        match self {
            RoundKind::Init => "bitonic_sort_init",
            RoundKind::StageZero => "bitonic_sort_stage_zero",
            RoundKind::StageN => "bitonic_sort_stage_n",
            RoundKind::Merge => "bitonic_sort_merge",
            RoundKind::MergeLast => "bitonic_sort_merge_last",
        }
    }

    /// Whether the round works on whole tiles inside one work-group.
    pub fn is_work_group_local(self) -> bool {
        matches!(
            self,
            RoundKind::Init | RoundKind::StageZero | RoundKind::MergeLast
        )
    }
}

/// One synchronized parallel dispatch.
///
/// `stage` values count blocks (half tiles); `high_stage` counts tiles per
/// bitonic run being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// Sort every tile, even tiles ascending and odd tiles descending.
    Init,
    /// Cross-tile compare-exchange at distance `stage` blocks.
    StageN { stage: usize, high_stage: usize },
    /// Per-tile merge closing a `high_stage` iteration.
    StageZero { high_stage: usize },
    /// Cross-tile compare-exchange at distance `stage` blocks in the final direction.
    Merge { stage: usize, direction: Direction },
    /// Per-tile merge in the final direction.
    MergeLast { direction: Direction },
}

impl Round {
    pub fn kind(&self) -> RoundKind {
        match self {
            Round::Init => RoundKind::Init,
            Round::StageN { .. } => RoundKind::StageN,
            Round::StageZero { .. } => RoundKind::StageZero,
            Round::Merge { .. } => RoundKind::Merge,
            Round::MergeLast { .. } => RoundKind::MergeLast,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind().kernel_name();
        match *self {
            Round::Init => write!(f, "{}", name),
            Round::StageN { stage, high_stage } => {
                write!(f, "{}(stage={}, high_stage={})", name, stage, high_stage)
            }
            Round::StageZero { high_stage } => write!(f, "{}(high_stage={})", name, high_stage),
            Round::Merge { stage, direction } => {
                write!(f, "{}(stage={}, direction={})", name, stage, direction.flag())
            }
            Round::MergeLast { direction } => write!(f, "{}(direction={})", name, direction.flag()),
        }
    }
}

/// Ordered round list for one sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    geometry: LaunchGeometry,
    direction: Direction,
    rounds: Vec<Round>,
}

impl Schedule {
    /// Compute every round for `geometry`, finishing in `direction`.
    pub fn plan(geometry: LaunchGeometry, direction: Direction) -> Self {
        let num_stages = geometry.num_stages;
        let mut rounds = Vec::with_capacity(expected_round_count(num_stages));

        rounds.push(Round::Init);

        let mut high_stage = 2;
        while high_stage < num_stages {
            let mut stage = high_stage;
            while stage > 1 {
                rounds.push(Round::StageN { stage, high_stage });
                stage >>= 1;
            }
            rounds.push(Round::StageZero { high_stage });
            high_stage <<= 1;
        }

        let mut stage = num_stages;
        while stage > 1 {
            rounds.push(Round::Merge { stage, direction });
            stage >>= 1;
        }
        rounds.push(Round::MergeLast { direction });

        Self {
            geometry,
            direction,
            rounds,
        }
    }

    pub fn geometry(&self) -> &LaunchGeometry {
        &self.geometry
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Number of rounds of the given kind.
    pub fn count(&self, kind: RoundKind) -> usize {
        self.rounds.iter().filter(|r| r.kind() == kind).count()
    }
}

/// Closed-form round count for `num_stages` tiles (a power of two).
///
/// With `m = log2(num_stages)`: one init round, `t + 1` rounds for every
/// `high_stage = 2^t` with `1 <= t < m`, `m` merge rounds and one final merge.
pub fn expected_round_count(num_stages: usize) -> usize {
    debug_assert!(num_stages.is_power_of_two());
    let m = num_stages.trailing_zeros() as usize;
    let global_stages = if m == 0 { 0 } else { (m - 1) * (m + 2) / 2 };
    1 + global_stages + m + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortConfig;

    fn geometry(len: usize, local_size: usize) -> LaunchGeometry {
        let config = SortConfig::new(len, Direction::Ascending).unwrap();
        LaunchGeometry::new(&config, local_size).unwrap()
    }

    #[test]
    fn test_single_tile_runs_init_and_merge_last() {
        let schedule = Schedule::plan(geometry(8, 1), Direction::Descending);
        assert_eq!(
            schedule.rounds(),
            &[
                Round::Init,
                Round::MergeLast {
                    direction: Direction::Descending
                }
            ]
        );
    }

    #[test]
    fn test_two_tiles_skip_global_stages() {
        let schedule = Schedule::plan(geometry(16, 1), Direction::Ascending);
        assert_eq!(
            schedule.rounds(),
            &[
                Round::Init,
                Round::Merge {
                    stage: 2,
                    direction: Direction::Ascending
                },
                Round::MergeLast {
                    direction: Direction::Ascending
                },
            ]
        );
    }

    #[test]
    fn test_eight_tiles_sequence() {
        let dir = Direction::Ascending;
        let schedule = Schedule::plan(geometry(64, 1), dir);
        assert_eq!(schedule.geometry().num_stages, 8);
        assert_eq!(
            schedule.rounds(),
            &[
                Round::Init,
                Round::StageN { stage: 2, high_stage: 2 },
                Round::StageZero { high_stage: 2 },
                Round::StageN { stage: 4, high_stage: 4 },
                Round::StageN { stage: 2, high_stage: 4 },
                Round::StageZero { high_stage: 4 },
                Round::Merge { stage: 8, direction: dir },
                Round::Merge { stage: 4, direction: dir },
                Round::Merge { stage: 2, direction: dir },
                Round::MergeLast { direction: dir },
            ]
        );
    }

    #[test]
    fn test_round_count_matches_closed_form() {
        for len_exp in 3..=20 {
            for local_exp in 0..=8 {
                let g = geometry(1 << len_exp, 1 << local_exp);
                let schedule = Schedule::plan(g, Direction::Ascending);
                assert_eq!(
                    schedule.len(),
                    expected_round_count(g.num_stages),
                    "len=2^{} local=2^{}",
                    len_exp,
                    local_exp
                );
            }
        }
    }

    #[test]
    fn test_round_count_by_summation() {
        for m in 0..12usize {
            let num_stages = 1usize << m;
            let mut total = 1;
            let mut high_stage = 2;
            while high_stage < num_stages {
                total += high_stage.trailing_zeros() as usize + 1;
                high_stage <<= 1;
            }
            total += m + 1;
            assert_eq!(expected_round_count(num_stages), total);
        }
    }

    #[test]
    fn test_kind_counts() {
        let schedule = Schedule::plan(geometry(1 << 12, 4), Direction::Descending);
        // 512 lanes over 4-lane groups: 128 tiles, m = 7.
        assert_eq!(schedule.geometry().num_stages, 128);
        assert_eq!(schedule.count(RoundKind::Init), 1);
        assert_eq!(schedule.count(RoundKind::StageZero), 6);
        assert_eq!(schedule.count(RoundKind::StageN), 1 + 2 + 3 + 4 + 5 + 6);
        assert_eq!(schedule.count(RoundKind::Merge), 7);
        assert_eq!(schedule.count(RoundKind::MergeLast), 1);
    }

    #[test]
    fn test_merge_rounds_carry_final_direction() {
        let schedule = Schedule::plan(geometry(256, 2), Direction::Descending);
        for round in schedule.rounds() {
            match round {
                Round::Merge { direction, .. } | Round::MergeLast { direction } => {
                    assert_eq!(*direction, Direction::Descending)
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_round_display() {
        let round = Round::StageN {
            stage: 4,
            high_stage: 8,
        };
        assert_eq!(round.to_string(), "bitonic_sort_stage_n(stage=4, high_stage=8)");
        assert_eq!(Round::Init.to_string(), "bitonic_sort_init");
        assert!(RoundKind::MergeLast.is_work_group_local());
        assert!(!RoundKind::Merge.is_work_group_local());
    }
}
