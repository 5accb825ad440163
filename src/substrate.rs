//! Execution substrate interface.
//!
//! The scheduler never enumerates devices, compiles kernels or allocates
//! buffers itself. It talks to an [`ExecutionSubstrate`], which owns the
//! array buffer for the duration of a sort and runs one round per
//! [`ExecutionSubstrate::dispatch`] call, returning only once every lane of
//! that round has finished.

use std::fmt;

use crate::config::LaunchGeometry;
use crate::error::SubstrateError;
use crate::schedule::Round;

/// Description of a substrate, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstrateInfo {
    pub name: String,
    pub max_local_size: usize,
    /// Lanes the substrate can run at once (threads or compute units).
    pub parallelism: usize,
}

impl fmt::Display for SubstrateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, max work-group width: {}, parallelism: {}",
            self.name, self.max_local_size, self.parallelism
        )
    }
}

/// Backend that stores the array and runs rounds on it.
pub trait ExecutionSubstrate {
    fn info(&self) -> SubstrateInfo;

    /// Widest work-group the substrate supports, in lanes.
    fn max_local_size(&self) -> Result<usize, SubstrateError>;

    /// Copy `data` into the substrate buffer, replacing its previous contents.
    fn upload(&mut self, data: &[i32]) -> Result<(), SubstrateError>;

    /// Run one round over the whole buffer. Blocks until the round completes.
    fn dispatch(&mut self, round: &Round, geometry: &LaunchGeometry)
        -> Result<(), SubstrateError>;

    /// Copy the buffer into `out`, which must have the uploaded length.
    fn read_back(&mut self, out: &mut [i32]) -> Result<(), SubstrateError>;
}

impl<S: ExecutionSubstrate + ?Sized> ExecutionSubstrate for Box<S> {
    fn info(&self) -> SubstrateInfo {
        (**self).info()
    }

    fn max_local_size(&self) -> Result<usize, SubstrateError> {
        (**self).max_local_size()
    }

    fn upload(&mut self, data: &[i32]) -> Result<(), SubstrateError> {
        (**self).upload(data)
    }

    fn dispatch(
        &mut self,
        round: &Round,
        geometry: &LaunchGeometry,
    ) -> Result<(), SubstrateError> {
        (**self).dispatch(round, geometry)
    }

    fn read_back(&mut self, out: &mut [i32]) -> Result<(), SubstrateError> {
        (**self).read_back(out)
    }
}

/// Reject round parameters that would make lanes leave the buffer or overlap.
pub fn validate_round(
    round: &Round,
    geometry: &LaunchGeometry,
    buffer_len: usize,
) -> Result<(), SubstrateError> {
    if buffer_len != geometry.len || geometry.tile_len() * geometry.num_stages != geometry.len {
        return Err(SubstrateError::Dispatch(format!(
            "geometry {:?} does not match a buffer of {} elements",
            geometry, buffer_len
        )));
    }
    let stage_ok = |stage: usize| stage.is_power_of_two() && stage <= geometry.num_stages;
    let ok = match *round {
        Round::Init | Round::MergeLast { .. } => true,
        Round::StageZero { high_stage } => high_stage.is_power_of_two(),
        Round::StageN { stage, high_stage } => {
            stage_ok(stage) && high_stage.is_power_of_two() && stage <= high_stage
        }
        Round::Merge { stage, .. } => stage_ok(stage),
    };
    if ok {
        Ok(())
    } else {
        Err(SubstrateError::Dispatch(format!(
            "invalid parameters for {} with {} tiles",
            round, geometry.num_stages
        )))
    }
}

/// Substrate wrapper that records every dispatched round before forwarding it.
#[derive(Debug)]
pub struct RecordingSubstrate<S> {
    inner: S,
    dispatched: Vec<(Round, LaunchGeometry)>,
}

impl<S> RecordingSubstrate<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            dispatched: Vec::new(),
        }
    }

    /// Rounds dispatched so far, oldest first.
    pub fn rounds(&self) -> Vec<Round> {
        self.dispatched.iter().map(|(round, _)| *round).collect()
    }

    pub fn dispatched(&self) -> &[(Round, LaunchGeometry)] {
        &self.dispatched
    }

    pub fn clear(&mut self) {
        self.dispatched.clear();
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ExecutionSubstrate> ExecutionSubstrate for RecordingSubstrate<S> {
    fn info(&self) -> SubstrateInfo {
        let mut info = self.inner.info();
        info.name = format!("{} (recording)", info.name);
        info
    }

    fn max_local_size(&self) -> Result<usize, SubstrateError> {
        self.inner.max_local_size()
    }

    fn upload(&mut self, data: &[i32]) -> Result<(), SubstrateError> {
        self.inner.upload(data)
    }

    fn dispatch(
        &mut self,
        round: &Round,
        geometry: &LaunchGeometry,
    ) -> Result<(), SubstrateError> {
        self.dispatched.push((*round, *geometry));
        self.inner.dispatch(round, geometry)
    }

    fn read_back(&mut self, out: &mut [i32]) -> Result<(), SubstrateError> {
        self.inner.read_back(out)
    }
}
