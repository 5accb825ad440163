//! Round-by-round driver of the bitonic network.
//!
//! [`BitonicSorter::sort`] validates the request, derives the launch geometry
//! from the substrate's capability, plans the full [`Schedule`] and then
//! dispatches its rounds strictly in order. Every dispatch blocks, so round
//! r + 1 always observes the writes of round r. The first failure aborts the
//! call; the array is then left in an unspecified state.

use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn};

use crate::config::{LaunchGeometry, SortConfig};
use crate::error::{Result, SortError};
use crate::integrity::{check_integrity, first_violation};
use crate::schedule::{Round, Schedule};
use crate::substrate::ExecutionSubstrate;

/// Result of a completed sort call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOutcome {
    pub geometry: LaunchGeometry,
    /// Rounds dispatched, equal to the schedule length.
    pub rounds: usize,
    /// Integrity check verdict. `false` means the network itself is wrong.
    pub sorted: bool,
}

/// Observer of a sort call. All methods default to doing nothing.
pub trait SortHooks {
    fn before_sort(&mut self, _schedule: &Schedule) {}
    fn before_round(&mut self, _index: usize, _round: &Round) {}
    fn after_round(&mut self, _index: usize, _round: &Round) {}
    fn after_sort(&mut self, _outcome: &SortOutcome) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SortHooks for NoHooks {}

/// Timing hook: wall-clock time of the whole sort and of every round.
#[derive(Debug, Default, Clone)]
pub struct Stopwatch {
    started: Option<Instant>,
    round_started: Option<Instant>,
    total: Option<Duration>,
    rounds: Vec<(Round, Duration)>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time from `before_sort` to `after_sort`, once the sort has finished.
    pub fn total(&self) -> Option<Duration> {
        self.total
    }

    pub fn rounds(&self) -> &[(Round, Duration)] {
        &self.rounds
    }

    /// Sum of per-round durations.
    pub fn dispatch_time(&self) -> Duration {
        self.rounds.iter().map(|(_, d)| *d).sum()
    }
}

impl SortHooks for Stopwatch {
    fn before_sort(&mut self, schedule: &Schedule) {
        self.rounds.clear();
        self.rounds.reserve(schedule.len());
        self.total = None;
        self.started = Some(Instant::now());
    }

    fn before_round(&mut self, _index: usize, _round: &Round) {
        self.round_started = Some(Instant::now());
    }

    fn after_round(&mut self, _index: usize, round: &Round) {
        if let Some(start) = self.round_started.take() {
            self.rounds.push((*round, start.elapsed()));
        }
    }

    fn after_sort(&mut self, _outcome: &SortOutcome) {
        self.total = self.started.take().map(|start| start.elapsed());
    }
}

/// Bitonic network scheduler over an execution substrate.
pub struct BitonicSorter<S> {
    substrate: S,
}

impl<S: ExecutionSubstrate> BitonicSorter<S> {
    pub fn new(substrate: S) -> Self {
        Self { substrate }
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn substrate_mut(&mut self) -> &mut S {
        &mut self.substrate
    }

    pub fn into_inner(self) -> S {
        self.substrate
    }

    /// Compute the round sequence `config` would run on this substrate.
    pub fn plan(&self, config: &SortConfig) -> Result<Schedule> {
        let max_local_size = self
            .substrate
            .max_local_size()
            .map_err(|e| SortError::Capability(e.to_string()))?;
        let geometry = LaunchGeometry::new(config, max_local_size)?;
        Ok(Schedule::plan(geometry, config.direction()))
    }

    /// Sort `data` in place.
    pub fn sort(&mut self, data: &mut [i32], config: &SortConfig) -> Result<SortOutcome> {
        self.sort_with_hooks(data, config, &mut NoHooks)
    }

    /// Sort `data` in place, reporting progress to `hooks`.
    pub fn sort_with_hooks(
        &mut self,
        data: &mut [i32],
        config: &SortConfig,
        hooks: &mut dyn SortHooks,
    ) -> Result<SortOutcome> {
        if data.len() != config.len() {
            return Err(SortError::Configuration(format!(
                "array holds {} elements but the configuration expects {}",
                data.len(),
                config.len()
            )));
        }

        let schedule = self.plan(config)?;
        let geometry = *schedule.geometry();
        let substrate = self.substrate.info().name;

        let span = info_span!(
            "bitonic_sort",
            len = data.len(),
            direction = %config.direction(),
            substrate = %substrate,
        );
        let _enter = span.enter();

        debug!(
            global_size = geometry.global_size,
            local_size = geometry.local_size,
            num_stages = geometry.num_stages,
            rounds = schedule.len(),
            "planned schedule"
        );
        hooks.before_sort(&schedule);

        self.substrate
            .upload(data)
            .map_err(|e| SortError::execution("upload", e))?;

        for (index, round) in schedule.rounds().iter().enumerate() {
            let kernel = round.kind().kernel_name();
            debug!(round = index, kernel, "dispatching {}", round);
            hooks.before_round(index, round);
            self.substrate
                .dispatch(round, &geometry)
                .map_err(|e| SortError::execution(format!("round {} ({})", index, kernel), e))?;
            hooks.after_round(index, round);
        }

        self.substrate
            .read_back(data)
            .map_err(|e| SortError::execution("read back", e))?;

        let sorted = check_integrity(data, config.direction());
        if sorted {
            info!(rounds = schedule.len(), "sort complete");
        } else {
            warn!(
                first_violation = ?first_violation(data, config.direction()),
                "integrity check failed"
            );
        }

        let outcome = SortOutcome {
            geometry,
            rounds: schedule.len(),
            sorted,
        };
        hooks.after_sort(&outcome);
        Ok(outcome)
    }
}
