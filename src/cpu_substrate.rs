//! Data-parallel CPU substrate using Rayon
//!
//! Rounds run on a dedicated rayon thread pool:
//!
//! - Work-group rounds split the buffer into tiles with `par_chunks_mut`; each
//!   task plays one work-group and runs its lanes over the tile, which stands
//!   in for local memory.
//! - Cross-tile rounds spawn one task per lane. Every lane derives its two
//!   vectors from its id and writes only those positions, so lanes share the
//!   buffer through a raw pointer without locking.
//!
//! `dispatch` returns after the parallel iterator has joined, which is the
//! barrier between rounds.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::marker::PhantomData;

use crate::config::{Direction, LaunchGeometry};
use crate::error::SubstrateError;
use crate::lane::{self, VECTOR_WIDTH};
use crate::schedule::Round;
use crate::substrate::{validate_round, ExecutionSubstrate, SubstrateInfo};

/// Default work-group width reported by the CPU substrate.
pub const DEFAULT_MAX_LOCAL_SIZE: usize = 256;

/// Rayon-backed execution substrate.
pub struct CpuSubstrate {
    pool: ThreadPool,
    max_local_size: usize,
    buffer: Vec<i32>,
}

impl CpuSubstrate {
    /// Create a substrate using one thread per available core.
    pub fn new() -> Result<Self, SubstrateError> {
        Self::with_threads(0)
    }

    /// Create a substrate with `threads` worker threads (0 lets rayon decide).
    pub fn with_threads(threads: usize) -> Result<Self, SubstrateError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bitonic-lane-{}", i))
            .build()
            .map_err(|e| SubstrateError::Unavailable(format!("thread pool: {}", e)))?;
        Ok(Self {
            pool,
            max_local_size: DEFAULT_MAX_LOCAL_SIZE,
            buffer: Vec::new(),
        })
    }

    /// Override the reported maximum work-group width.
    ///
    /// Zero is accepted here and rejected as a capability error when a sort
    /// asks for it.
    pub fn with_max_local_size(mut self, max_local_size: usize) -> Self {
        self.max_local_size = max_local_size;
        self
    }

    /// Current buffer contents.
    pub fn buffer(&self) -> &[i32] {
        &self.buffer
    }

    fn run_tiles<F>(&mut self, geometry: &LaunchGeometry, per_tile: F)
    where
        F: Fn(usize, &mut [i32]) + Sync,
    {
        let tile_len = geometry.tile_len();
        let buffer = &mut self.buffer;
        self.pool.install(|| {
            buffer
                .par_chunks_mut(tile_len)
                .enumerate()
                .for_each(|(group, tile)| per_tile(group, tile));
        });
    }

    fn run_cross_tile<F>(&mut self, geometry: &LaunchGeometry, stage: usize, direction_of: F)
    where
        F: Fn(usize) -> Direction + Sync,
    {
        let local_size = geometry.local_size;
        let lanes = LaneBuffer::new(&mut self.buffer);
        self.pool.install(|| {
            (0..geometry.global_size)
                .into_par_iter()
                .with_min_len(64)
                .for_each(|gid| {
                    let group = gid / local_size;
                    let local_id = gid % local_size;
                    let (a, b) = lane::cross_tile_pair(group, local_id, local_size, stage);
                    let direction = direction_of(group);
                    for k in 0..VECTOR_WIDTH {
                        // SAFETY: cross_tile_pair hands every lane of the round
                        // its own two vectors, so no position is touched twice.
                        unsafe { lanes.compare_exchange(a + k, b + k, direction) };
                    }
                });
        });
    }
}

impl ExecutionSubstrate for CpuSubstrate {
    fn info(&self) -> SubstrateInfo {
        SubstrateInfo {
            name: "CPU (rayon)".to_string(),
            max_local_size: self.max_local_size,
            parallelism: self.pool.current_num_threads(),
        }
    }

    fn max_local_size(&self) -> Result<usize, SubstrateError> {
        Ok(self.max_local_size)
    }

    fn upload(&mut self, data: &[i32]) -> Result<(), SubstrateError> {
        self.buffer.clear();
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn dispatch(
        &mut self,
        round: &Round,
        geometry: &LaunchGeometry,
    ) -> Result<(), SubstrateError> {
        validate_round(round, geometry, self.buffer.len())?;
        let lanes = geometry.local_size;

        match *round {
            Round::Init => self.run_tiles(geometry, |group, tile| {
                lane::sort_tile(tile, lanes, Direction::from_flag(group))
            }),
            Round::StageZero { high_stage } => self.run_tiles(geometry, |group, tile| {
                lane::merge_tile(tile, lanes, lane::stage_direction(group, high_stage))
            }),
            Round::MergeLast { direction } => {
                self.run_tiles(geometry, |_, tile| lane::merge_tile(tile, lanes, direction))
            }
            Round::StageN { stage, high_stage } => self.run_cross_tile(geometry, stage, |group| {
                lane::stage_direction(group, high_stage)
            }),
            Round::Merge { stage, direction } => {
                self.run_cross_tile(geometry, stage, |_| direction)
            }
        }
        Ok(())
    }

    fn read_back(&mut self, out: &mut [i32]) -> Result<(), SubstrateError> {
        if out.len() != self.buffer.len() {
            return Err(SubstrateError::Transfer(format!(
                "read back of {} elements from a buffer of {}",
                out.len(),
                self.buffer.len()
            )));
        }
        out.copy_from_slice(&self.buffer);
        Ok(())
    }
}

/// Shared view of the buffer for one cross-tile round.
struct LaneBuffer<'a> {
    ptr: *mut i32,
    len: usize,
    _buffer: PhantomData<&'a mut [i32]>,
}

// SAFETY: lanes only access disjoint positions; see `run_cross_tile`.
unsafe impl Send for LaneBuffer<'_> {}
unsafe impl Sync for LaneBuffer<'_> {}

impl<'a> LaneBuffer<'a> {
    fn new(buffer: &'a mut [i32]) -> Self {
        Self {
            ptr: buffer.as_mut_ptr(),
            len: buffer.len(),
            _buffer: PhantomData,
        }
    }

    /// # Safety
    ///
    /// No other thread may access `a` or `b` while this call runs.
    #[inline]
    unsafe fn compare_exchange(&self, a: usize, b: usize, direction: Direction) {
        debug_assert!(a < b && b < self.len);
        let pa = self.ptr.add(a);
        let pb = self.ptr.add(b);
        let (first, second) = (*pa, *pb);
        if direction.out_of_order(first, second) {
            *pa = second;
            *pb = first;
        }
    }
}
