//! GPU substrate using Metal
//!
//! Runs each round of the bitonic network as one Metal compute dispatch.
//! There are five kernels, one per round kind:
//!
//! 1. `bitonic_sort_init`: sorts every tile in threadgroup memory
//! 2. `bitonic_sort_stage_n`: cross-tile compare-exchange while building runs
//! 3. `bitonic_sort_stage_zero`: per-tile merge closing a run-building step
//! 4. `bitonic_sort_merge`: cross-tile compare-exchange in the final direction
//! 5. `bitonic_sort_merge_last`: per-tile merge in the final direction
//!
//! Every dispatch gets its own command buffer and waits for completion, so
//! rounds never overlap.
//!
//! This module only compiles on macOS. On other platforms, a stub implementation
//! is provided that returns an error.

#[cfg(target_os = "macos")]
mod metal_impl {
    use metal::*;
    use std::mem;

    use crate::config::LaunchGeometry;
    use crate::error::SubstrateError;
    use crate::lane::ELEMENTS_PER_LANE;
    use crate::schedule::{Round, RoundKind};
    use crate::substrate::{validate_round, ExecutionSubstrate, SubstrateInfo};

    /// Shader source for the five round kernels.
    ///
    /// Index formulas match `crate::lane`: tiles hold `8 * lanes` ints,
    /// cross-tile lanes own one 4-wide vector on each side of the comparison.
    const SHADER_SOURCE: &str = r#"
#include <metal_stdlib>
using namespace metal;

#define VECTOR_WIDTH 4
#define ELEMENTS_PER_LANE 8
#define PAIRS_PER_LANE 4

inline bool out_of_order(int first, int second, bool descending)
{
    return descending ? (first < second) : (first > second);
}

inline void compare_exchange_local(threadgroup int *tile, uint a, uint b, bool descending)
{
    int first = tile[a];
    int second = tile[b];
    if (out_of_order(first, second, descending)) {
        tile[a] = second;
        tile[b] = first;
    }
}

inline void compare_exchange_global(device int *data, uint a, uint b, bool descending)
{
    int first = data[a];
    int second = data[b];
    if (out_of_order(first, second, descending)) {
        data[a] = second;
        data[b] = first;
    }
}

inline uint butterfly(uint pair, uint distance)
{
    return (pair / distance) * (distance * 2) + pair % distance;
}

inline void load_tile(device int *data, threadgroup int *tile, uint base, uint lid)
{
    for (uint k = 0; k < ELEMENTS_PER_LANE; k++) {
        uint i = lid * ELEMENTS_PER_LANE + k;
        tile[i] = data[base + i];
    }
    threadgroup_barrier(mem_flags::mem_threadgroup);
}

inline void store_tile(device int *data, threadgroup int *tile, uint base, uint lid)
{
    for (uint k = 0; k < ELEMENTS_PER_LANE; k++) {
        uint i = lid * ELEMENTS_PER_LANE + k;
        data[base + i] = tile[i];
    }
}

/// Merge a bitonic tile at distances tile_len / 2 .. 1.
inline void merge_tile(threadgroup int *tile, uint tile_len, uint lid, bool descending)
{
    for (uint distance = tile_len / 2; distance > 0; distance >>= 1) {
        for (uint k = 0; k < PAIRS_PER_LANE; k++) {
            uint a = butterfly(lid * PAIRS_PER_LANE + k, distance);
            compare_exchange_local(tile, a, a + distance, descending);
        }
        threadgroup_barrier(mem_flags::mem_threadgroup);
    }
}

/// Sort every tile: even tiles ascending, odd tiles descending.
kernel void bitonic_sort_init(
    device int *data [[buffer(0)]],
    threadgroup int *tile [[threadgroup(0)]],
    uint lid [[thread_position_in_threadgroup]],
    uint group [[threadgroup_position_in_grid]],
    uint lanes [[threads_per_threadgroup]])
{
    uint tile_len = lanes * ELEMENTS_PER_LANE;
    uint base = group * tile_len;
    bool flip = (group & 1) != 0;

    load_tile(data, tile, base, lid);

    for (uint size = 2; size <= tile_len; size <<= 1) {
        for (uint distance = size / 2; distance > 0; distance >>= 1) {
            for (uint k = 0; k < PAIRS_PER_LANE; k++) {
                uint a = butterfly(lid * PAIRS_PER_LANE + k, distance);
                bool descending = ((a & size) != 0) != flip;
                compare_exchange_local(tile, a, a + distance, descending);
            }
            threadgroup_barrier(mem_flags::mem_threadgroup);
        }
    }

    store_tile(data, tile, base, lid);
}

kernel void bitonic_sort_stage_zero(
    device int *data [[buffer(0)]],
    constant uint &high_stage [[buffer(1)]],
    threadgroup int *tile [[threadgroup(0)]],
    uint lid [[thread_position_in_threadgroup]],
    uint group [[threadgroup_position_in_grid]],
    uint lanes [[threads_per_threadgroup]])
{
    uint tile_len = lanes * ELEMENTS_PER_LANE;
    uint base = group * tile_len;
    bool descending = ((group / high_stage) & 1) != 0;

    load_tile(data, tile, base, lid);
    merge_tile(tile, tile_len, lid, descending);
    store_tile(data, tile, base, lid);
}

kernel void bitonic_sort_stage_n(
    device int *data [[buffer(0)]],
    constant uint &stage [[buffer(1)]],
    constant uint &high_stage [[buffer(2)]],
    uint lid [[thread_position_in_threadgroup]],
    uint group [[threadgroup_position_in_grid]],
    uint lanes [[threads_per_threadgroup]])
{
    uint vector = (group + (group / stage) * stage) * lanes + lid;
    uint a = vector * VECTOR_WIDTH;
    uint b = a + stage * lanes * VECTOR_WIDTH;
    bool descending = ((group / high_stage) & 1) != 0;

    for (uint k = 0; k < VECTOR_WIDTH; k++) {
        compare_exchange_global(data, a + k, b + k, descending);
    }
}

kernel void bitonic_sort_merge(
    device int *data [[buffer(0)]],
    constant uint &stage [[buffer(1)]],
    constant uint &direction [[buffer(2)]],
    uint lid [[thread_position_in_threadgroup]],
    uint group [[threadgroup_position_in_grid]],
    uint lanes [[threads_per_threadgroup]])
{
    uint vector = (group + (group / stage) * stage) * lanes + lid;
    uint a = vector * VECTOR_WIDTH;
    uint b = a + stage * lanes * VECTOR_WIDTH;
    bool descending = direction != 0;

    for (uint k = 0; k < VECTOR_WIDTH; k++) {
        compare_exchange_global(data, a + k, b + k, descending);
    }
}

kernel void bitonic_sort_merge_last(
    device int *data [[buffer(0)]],
    constant uint &direction [[buffer(1)]],
    threadgroup int *tile [[threadgroup(0)]],
    uint lid [[thread_position_in_threadgroup]],
    uint group [[threadgroup_position_in_grid]],
    uint lanes [[threads_per_threadgroup]])
{
    uint tile_len = lanes * ELEMENTS_PER_LANE;
    uint base = group * tile_len;

    load_tile(data, tile, base, lid);
    merge_tile(tile, tile_len, lid, direction != 0);
    store_tile(data, tile, base, lid);
}
"#;

    /// Compiled pipelines, one per round kind.
    struct Pipelines {
        init: ComputePipelineState,
        stage_zero: ComputePipelineState,
        stage_n: ComputePipelineState,
        merge: ComputePipelineState,
        merge_last: ComputePipelineState,
    }

    impl Pipelines {
        fn get(&self, kind: RoundKind) -> &ComputePipelineState {
            match kind {
                RoundKind::Init => &self.init,
                RoundKind::StageZero => &self.stage_zero,
                RoundKind::StageN => &self.stage_n,
                RoundKind::Merge => &self.merge,
                RoundKind::MergeLast => &self.merge_last,
            }
        }
    }

    /// Metal execution substrate for Apple Silicon and other Metal GPUs.
    pub struct MetalSubstrate {
        device: Device,
        command_queue: CommandQueue,
        pipelines: Pipelines,
        /// Widest threadgroup every pipeline accepts, bounded by threadgroup memory.
        max_local_size: usize,
        buffer: Option<Buffer>,
        len: usize,
    }

    impl MetalSubstrate {
        /// Create a substrate on the system default Metal device.
        ///
        /// Returns an error if Metal is not available or shader compilation fails.
        pub fn new() -> Result<Self, SubstrateError> {
            let device = Device::system_default().ok_or_else(|| {
                SubstrateError::Unavailable(
                    "No Metal device found. Metal is only available on macOS and iOS.".to_string(),
                )
            })?;

            let command_queue = device.new_command_queue();

            let options = CompileOptions::new();
            let library = device
                .new_library_with_source(SHADER_SOURCE, &options)
                .map_err(|e| {
                    SubstrateError::Unavailable(format!("Failed to compile shader: {}", e))
                })?;

            let pipeline = |kind: RoundKind| -> Result<ComputePipelineState, SubstrateError> {
                let name = kind.kernel_name();
                let function = library.get_function(name, None).map_err(|e| {
                    SubstrateError::Unavailable(format!("Failed to get {}: {}", name, e))
                })?;
                device
                    .new_compute_pipeline_state_with_function(&function)
                    .map_err(|e| {
                        SubstrateError::Unavailable(format!(
                            "Failed to create {} pipeline: {}",
                            name, e
                        ))
                    })
            };

            let pipelines = Pipelines {
                init: pipeline(RoundKind::Init)?,
                stage_zero: pipeline(RoundKind::StageZero)?,
                stage_n: pipeline(RoundKind::StageN)?,
                merge: pipeline(RoundKind::Merge)?,
                merge_last: pipeline(RoundKind::MergeLast)?,
            };

            let thread_limit = RoundKind::ALL
                .iter()
                .map(|&kind| pipelines.get(kind).max_total_threads_per_threadgroup() as usize)
                .min()
                .unwrap_or(0);
            let memory_limit = device.max_threadgroup_memory_length() as usize
                / (ELEMENTS_PER_LANE * mem::size_of::<i32>());
            let max_local_size = thread_limit.min(memory_limit);

            Ok(Self {
                device,
                command_queue,
                pipelines,
                max_local_size,
                buffer: None,
                len: 0,
            })
        }

        fn param_buffer(&self, value: u32) -> Buffer {
            self.device.new_buffer_with_data(
                &value as *const u32 as *const _,
                mem::size_of::<u32>() as u64,
                MTLResourceOptions::StorageModeShared,
            )
        }
    }

    impl ExecutionSubstrate for MetalSubstrate {
        fn info(&self) -> SubstrateInfo {
            SubstrateInfo {
                name: format!("Metal ({})", self.device.name()),
                max_local_size: self.max_local_size,
                parallelism: self.max_local_size,
            }
        }

        fn max_local_size(&self) -> Result<usize, SubstrateError> {
            Ok(self.max_local_size)
        }

        fn upload(&mut self, data: &[i32]) -> Result<(), SubstrateError> {
            if data.is_empty() {
                return Err(SubstrateError::Transfer(
                    "cannot create an empty Metal buffer".to_string(),
                ));
            }
            let buffer_size = (data.len() * mem::size_of::<i32>()) as u64;
            let buffer = self.device.new_buffer_with_data(
                data.as_ptr() as *const _,
                buffer_size,
                MTLResourceOptions::StorageModeShared,
            );
            self.buffer = Some(buffer);
            self.len = data.len();
            Ok(())
        }

        fn dispatch(
            &mut self,
            round: &Round,
            geometry: &LaunchGeometry,
        ) -> Result<(), SubstrateError> {
            validate_round(round, geometry, self.len)?;
            let buffer = self
                .buffer
                .as_ref()
                .ok_or_else(|| SubstrateError::Dispatch("no buffer uploaded".to_string()))?;

            let params: Vec<u32> = match *round {
                Round::Init => vec![],
                Round::StageZero { high_stage } => vec![high_stage as u32],
                Round::StageN { stage, high_stage } => vec![stage as u32, high_stage as u32],
                Round::Merge { stage, direction } => vec![stage as u32, direction.flag()],
                Round::MergeLast { direction } => vec![direction.flag()],
            };
            let param_buffers: Vec<Buffer> =
                params.iter().map(|&v| self.param_buffer(v)).collect();

            let command_buffer = self.command_queue.new_command_buffer();
            let encoder = command_buffer.new_compute_command_encoder();

            encoder.set_compute_pipeline_state(self.pipelines.get(round.kind()));
            encoder.set_buffer(0, Some(buffer), 0);
            for (i, param) in param_buffers.iter().enumerate() {
                encoder.set_buffer(i as u64 + 1, Some(param), 0);
            }
            if round.kind().is_work_group_local() {
                let tile_bytes = (geometry.tile_len() * mem::size_of::<i32>()) as u64;
                encoder.set_threadgroup_memory_length(0, tile_bytes);
            }

            let threadgroups = MTLSize::new(geometry.num_stages as u64, 1, 1);
            let threadgroup_size = MTLSize::new(geometry.local_size as u64, 1, 1);
            encoder.dispatch_thread_groups(threadgroups, threadgroup_size);
            encoder.end_encoding();

            command_buffer.commit();
            command_buffer.wait_until_completed();

            if matches!(command_buffer.status(), MTLCommandBufferStatus::Error) {
                return Err(SubstrateError::Dispatch(format!(
                    "command buffer for {} reported an error",
                    round
                )));
            }
            Ok(())
        }

        fn read_back(&mut self, out: &mut [i32]) -> Result<(), SubstrateError> {
            let buffer = self
                .buffer
                .as_ref()
                .ok_or_else(|| SubstrateError::Transfer("no buffer uploaded".to_string()))?;
            if out.len() != self.len {
                return Err(SubstrateError::Transfer(format!(
                    "read back of {} elements from a buffer of {}",
                    out.len(),
                    self.len
                )));
            }
            let result_ptr = buffer.contents() as *const i32;
            // SAFETY: the shared-storage buffer holds `self.len` ints and no
            // command buffer is in flight once `dispatch` has returned.
            unsafe {
                std::ptr::copy_nonoverlapping(result_ptr, out.as_mut_ptr(), self.len);
            }
            Ok(())
        }
    }
}

#[cfg(target_os = "macos")]
pub use metal_impl::MetalSubstrate;

#[cfg(not(target_os = "macos"))]
mod stub {
    use crate::config::LaunchGeometry;
    use crate::error::SubstrateError;
    use crate::schedule::Round;
    use crate::substrate::{ExecutionSubstrate, SubstrateInfo};

    const UNSUPPORTED: &str = "GPU sorting via Metal is only available on macOS.";

    /// Placeholder for platforms without Metal; it can never be constructed.
    pub struct MetalSubstrate {
        _private: (),
    }

    impl MetalSubstrate {
        /// On non-macOS platforms, this always returns an error.
        pub fn new() -> Result<Self, SubstrateError> {
            Err(SubstrateError::Unavailable(format!(
                "{} This platform is not supported.",
                UNSUPPORTED
            )))
        }
    }

    impl ExecutionSubstrate for MetalSubstrate {
        fn info(&self) -> SubstrateInfo {
            SubstrateInfo {
                name: "N/A (Metal not available on this platform)".to_string(),
                max_local_size: 0,
                parallelism: 0,
            }
        }

        fn max_local_size(&self) -> Result<usize, SubstrateError> {
            Err(SubstrateError::Unavailable(UNSUPPORTED.to_string()))
        }

        fn upload(&mut self, _data: &[i32]) -> Result<(), SubstrateError> {
            Err(SubstrateError::Unavailable(UNSUPPORTED.to_string()))
        }

        fn dispatch(
            &mut self,
            _round: &Round,
            _geometry: &LaunchGeometry,
        ) -> Result<(), SubstrateError> {
            Err(SubstrateError::Unavailable(UNSUPPORTED.to_string()))
        }

        fn read_back(&mut self, _out: &mut [i32]) -> Result<(), SubstrateError> {
            Err(SubstrateError::Unavailable(UNSUPPORTED.to_string()))
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub use stub::MetalSubstrate;

#[cfg(all(test, not(target_os = "macos")))]
mod stub_tests {
    use super::*;

    #[test]
    fn test_metal_unavailable_off_macos() {
        assert!(MetalSubstrate::new().is_err());
    }
}
