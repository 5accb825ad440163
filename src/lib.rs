//! Bitonic Stage Scheduler
//!
//! Sorts a power-of-two array of `i32` with a bitonic network decomposed into
//! synchronized data-parallel rounds:
//!
//! - one **init** round sorting every work-group tile in local storage,
//! - **stage n** / **stage zero** rounds merging tiles into longer bitonic runs,
//! - **merge** rounds and a final **merge last** round resolving the whole
//!   array in the requested direction.
//!
//! The round list is a pure function of the array length, the work-group
//! width and the direction ([`Schedule::plan`]). [`BitonicSorter`] drives it
//! over any [`ExecutionSubstrate`]: [`CpuSubstrate`] runs lanes with rayon,
//! [`MetalSubstrate`] runs them on a Metal GPU (macOS only).
//!
//! ```
//! use bitonic_stages::{BitonicSorter, CpuSubstrate, Direction, SortConfig};
//!
//! let mut data = vec![9, 3, 7, 1, 8, 2, 6, 4];
//! let config = SortConfig::new(data.len(), Direction::Descending).unwrap();
//! let mut sorter = BitonicSorter::new(CpuSubstrate::new().unwrap());
//! let outcome = sorter.sort(&mut data, &config).unwrap();
//! assert!(outcome.sorted);
//! assert_eq!(data, vec![9, 8, 7, 6, 4, 3, 2, 1]);
//! ```

pub mod config;
pub mod cpu_substrate;
pub mod error;
pub mod integrity;
pub mod lane;
pub mod metal_substrate;
pub mod reference;
pub mod schedule;
pub mod sorter;
pub mod substrate;
pub mod workload;

pub use config::{Direction, LaunchGeometry, SortConfig};
pub use cpu_substrate::CpuSubstrate;
pub use error::{SortError, SubstrateError};
pub use integrity::check_integrity;
pub use metal_substrate::MetalSubstrate;
pub use schedule::{expected_round_count, Round, RoundKind, Schedule};
pub use sorter::{BitonicSorter, NoHooks, SortHooks, SortOutcome, Stopwatch};
pub use substrate::{ExecutionSubstrate, RecordingSubstrate, SubstrateInfo};
