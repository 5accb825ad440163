//! Sort configuration and launch geometry.
//!
//! [`SortConfig`] is what the caller asks for: array length, direction and an
//! optional work-group width. [`LaunchGeometry`] is what the scheduler
//! actually launches once the substrate's capability is known.

use std::fmt;

use crate::error::{Result, SortError};
use crate::lane::ELEMENTS_PER_LANE;

/// Smallest array the network accepts: one lane's worth of elements (a tile with L = 1).
pub const MIN_LEN: usize = ELEMENTS_PER_LANE;

/// Sort direction, fixed for a whole sort call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    /// Kernel-side flag: 0 for ascending, 1 for descending.
    #[inline]
    pub fn flag(self) -> u32 {
        match self {
            Direction::Ascending => 0,
            Direction::Descending => 1,
        }
    }

    /// Inverse of [`Direction::flag`]; only the lowest bit is looked at.
    #[inline]
    pub fn from_flag(flag: usize) -> Self {
        if flag & 1 == 0 {
            Direction::Ascending
        } else {
            Direction::Descending
        }
    }

    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }

    /// True when `first` must not stay in front of `second`.
    #[inline]
    pub fn out_of_order(self, first: i32, second: i32) -> bool {
        match self {
            Direction::Ascending => first > second,
            Direction::Descending => first < second,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => f.write_str("ascending"),
            Direction::Descending => f.write_str("descending"),
        }
    }
}

/// Validated, immutable parameters of one sort call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
    len: usize,
    direction: Direction,
    local_size: Option<usize>,
}

impl SortConfig {
    /// Validate the array length.
    ///
    /// The length must be a power of two and at least [`MIN_LEN`].
    pub fn new(len: usize, direction: Direction) -> Result<Self> {
        if !len.is_power_of_two() {
            return Err(SortError::Configuration(format!(
                "array length must be a power of two, got {}",
                len
            )));
        }
        if len < MIN_LEN {
            return Err(SortError::Configuration(format!(
                "array length must be at least {} (one tile of a single lane), got {}",
                MIN_LEN, len
            )));
        }
        Ok(Self {
            len,
            direction,
            local_size: None,
        })
    }

    /// Request a specific work-group width instead of the substrate maximum.
    pub fn with_local_size(mut self, local_size: usize) -> Result<Self> {
        if local_size == 0 || !local_size.is_power_of_two() {
            return Err(SortError::Configuration(format!(
                "local size must be a non-zero power of two, got {}",
                local_size
            )));
        }
        self.local_size = Some(local_size);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn local_size(&self) -> Option<usize> {
        self.local_size
    }
}

/// Lane counts for every round of one sort.
///
/// All rounds share the same geometry: `global_size` lanes split into
/// `num_stages` work-groups of `local_size` lanes. One work-group tile holds
/// `ELEMENTS_PER_LANE * local_size` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub len: usize,
    pub global_size: usize,
    pub local_size: usize,
    pub num_stages: usize,
}

impl LaunchGeometry {
    /// Derive the geometry from a validated config and the substrate's maximum width.
    pub fn new(config: &SortConfig, max_local_size: usize) -> Result<Self> {
        if max_local_size == 0 {
            return Err(SortError::Capability(
                "substrate reported a maximum work-group width of 0".to_string(),
            ));
        }
        let device_width = prev_power_of_two(max_local_size);

        let requested = match config.local_size() {
            Some(requested) if requested > device_width => {
                return Err(SortError::Capability(format!(
                    "requested local size {} exceeds the device limit of {}",
                    requested, device_width
                )));
            }
            Some(requested) => requested,
            None => device_width,
        };

        let global_size = config.len() / ELEMENTS_PER_LANE;
        // A tile may not be wider than the whole array.
        let local_size = requested.min(global_size);

        Ok(Self {
            len: config.len(),
            global_size,
            local_size,
            num_stages: global_size / local_size,
        })
    }

    /// Elements held by one work-group.
    #[inline]
    pub fn tile_len(&self) -> usize {
        self.local_size * ELEMENTS_PER_LANE
    }

    /// Elements in half a tile; `stage` distances are measured in blocks.
    #[inline]
    pub fn block_len(&self) -> usize {
        self.tile_len() / 2
    }
}

/// Largest power of two not above `n`. `n` must be non-zero.
#[inline]
pub fn prev_power_of_two(n: usize) -> usize {
    debug_assert!(n > 0);
    1 << (usize::BITS - 1 - n.leading_zeros())
}
