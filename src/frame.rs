//! Coordinate frames and extent validation
//!
//! A [`CoordinateFrame`] declares the valid voxel space shared by every
//! experiment that references it. Cutout requests address that space at a
//! resolution level: each level halves the x/y extent, z and time are never
//! downsampled.
//!
//! ```rust
//! use bosscore::frame::{validate_extent, AxisRange, CoordinateFrame, Extent};
//!
//! # fn main() -> bosscore::Result<()> {
//! let frame = CoordinateFrame::builder("cf1")
//!     .x(0, 1000)
//!     .y(0, 1000)
//!     .z(0, 1000)
//!     .voxel_size(4.0, 4.0, 4.0)
//!     .build()?;
//!
//! let extent = Extent::new(AxisRange::new(0, 5), AxisRange::new(0, 6), AxisRange::new(0, 2));
//! validate_extent(&frame, 2, &extent, 1)?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Physical unit of a voxel edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoxelUnit {
    /// nm
    #[default]
    Nanometers,
    /// µm
    Micrometers,
    /// mm
    Millimeters,
    /// cm
    Centimeters,
}

impl FromStr for VoxelUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nanometers" => Ok(Self::Nanometers),
            "micrometers" => Ok(Self::Micrometers),
            "millimeters" => Ok(Self::Millimeters),
            "centimeters" => Ok(Self::Centimeters),
            other => Err(Error::InvalidFrame(format!("unknown voxel unit '{other}'"))),
        }
    }
}

/// Physical unit of one time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// ns
    Nanoseconds,
    /// µs
    Microseconds,
    /// ms
    Milliseconds,
    /// s
    #[default]
    Seconds,
}

impl FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nanoseconds" => Ok(Self::Nanoseconds),
            "microseconds" => Ok(Self::Microseconds),
            "milliseconds" => Ok(Self::Milliseconds),
            "seconds" => Ok(Self::Seconds),
            other => Err(Error::InvalidFrame(format!("unknown time unit '{other}'"))),
        }
    }
}

/// Half-open `[start, stop)` interval along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisRange {
    /// Inclusive start
    pub start: u64,
    /// Exclusive stop
    pub stop: u64,
}

impl AxisRange {
    /// Create a range. No validation happens here; see [`AxisRange::check`].
    #[must_use]
    pub const fn new(start: u64, stop: u64) -> Self {
        Self { start, stop }
    }

    /// Number of samples covered (zero for reversed ranges).
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }

    /// `true` when `start >= stop`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.stop
    }

    /// Reject reversed or empty ranges.
    ///
    /// # Errors
    /// [`Error::MalformedRange`] if `start >= stop`.
    pub fn check(&self, axis: &str) -> Result<()> {
        if self.is_empty() {
            return Err(Error::MalformedRange(format!(
                "{axis} range {self} must satisfy start < stop"
            )));
        }
        Ok(())
    }

    const fn contains(&self, other: &Self) -> bool {
        other.start >= self.start && other.stop <= self.stop
    }
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.stop)
    }
}

impl FromStr for AxisRange {
    type Err = Error;

    /// Parse `start:stop`. Only syntax is checked; ordering is left to
    /// [`AxisRange::check`].
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedRange(format!("'{s}' is not of the form start:stop"));
        let (start, stop) = s.split_once(':').ok_or_else(malformed)?;
        let start = start.parse::<u64>().map_err(|_| malformed())?;
        let stop = stop.parse::<u64>().map_err(|_| malformed())?;
        Ok(Self { start, stop })
    }
}

/// Requested sub-volume: x/y/z plus a time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// x range at the requested resolution
    pub x: AxisRange,
    /// y range at the requested resolution
    pub y: AxisRange,
    /// z range (never downsampled)
    pub z: AxisRange,
    /// time range (never downsampled)
    pub t: AxisRange,
}

impl Extent {
    /// Spatial extent at time sample 0.
    #[must_use]
    pub const fn new(x: AxisRange, y: AxisRange, z: AxisRange) -> Self {
        Self {
            x,
            y,
            z,
            t: AxisRange::new(0, 1),
        }
    }

    /// Replace the time range.
    #[must_use]
    pub const fn with_time(mut self, t: AxisRange) -> Self {
        self.t = t;
        self
    }

    /// Voxel count, or `None` on overflow.
    #[must_use]
    pub fn voxel_count(&self) -> Option<u64> {
        self.x
            .len()
            .checked_mul(self.y.len())?
            .checked_mul(self.z.len())?
            .checked_mul(self.t.len())
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.x, self.y, self.z, self.t)
    }
}

/// Declared spatial/temporal bounding box and units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFrame {
    name: String,
    description: String,
    x: AxisRange,
    y: AxisRange,
    z: AxisRange,
    voxel_size: [f64; 3],
    voxel_unit: VoxelUnit,
    time_step: u64,
    time_unit: TimeUnit,
}

impl CoordinateFrame {
    /// Start building a frame with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> CoordinateFrameBuilder {
        CoordinateFrameBuilder::new(name)
    }

    /// Frame name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Base-resolution x extent.
    #[must_use]
    pub const fn x(&self) -> AxisRange {
        self.x
    }

    /// Base-resolution y extent.
    #[must_use]
    pub const fn y(&self) -> AxisRange {
        self.y
    }

    /// z extent.
    #[must_use]
    pub const fn z(&self) -> AxisRange {
        self.z
    }

    /// Voxel edge lengths (x, y, z).
    #[must_use]
    pub const fn voxel_size(&self) -> [f64; 3] {
        self.voxel_size
    }

    /// Unit of [`CoordinateFrame::voxel_size`].
    #[must_use]
    pub const fn voxel_unit(&self) -> VoxelUnit {
        self.voxel_unit
    }

    /// Duration of one time sample.
    #[must_use]
    pub const fn time_step(&self) -> u64 {
        self.time_step
    }

    /// Unit of [`CoordinateFrame::time_step`].
    #[must_use]
    pub const fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Frame extent at `resolution`.
    ///
    /// x and y bounds are divided by `2^resolution`, start rounded up and
    /// stop rounded down, so every scaled voxel lies wholly inside the frame.
    /// z is unchanged.
    ///
    /// # Errors
    /// [`Error::OutOfBounds`] if downsampling collapses an axis to nothing.
    pub fn extent_at(&self, resolution: u8) -> Result<(AxisRange, AxisRange, AxisRange)> {
        let shift = u32::from(resolution);
        let scale = |axis: &str, range: AxisRange| -> Result<AxisRange> {
            let start = match 1u64.checked_shl(shift) {
                Some(factor) => range.start.div_ceil(factor),
                None => u64::from(range.start > 0),
            };
            let scaled = AxisRange::new(start, range.stop.checked_shr(shift).unwrap_or(0));
            if scaled.is_empty() {
                return Err(Error::OutOfBounds(format!(
                    "{axis} extent {range} of frame '{}' vanishes at resolution {resolution}",
                    self.name
                )));
            }
            Ok(scaled)
        };
        Ok((scale("x", self.x)?, scale("y", self.y)?, self.z))
    }
}

/// Builder for [`CoordinateFrame`]; `build` enforces the frame invariants.
#[derive(Debug)]
pub struct CoordinateFrameBuilder {
    name: String,
    description: String,
    x: AxisRange,
    y: AxisRange,
    z: AxisRange,
    voxel_size: [f64; 3],
    voxel_unit: VoxelUnit,
    time_step: u64,
    time_unit: TimeUnit,
}

impl CoordinateFrameBuilder {
    /// New builder with unit voxels and a unit time step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            x: AxisRange::new(0, 1),
            y: AxisRange::new(0, 1),
            z: AxisRange::new(0, 1),
            voxel_size: [1.0; 3],
            voxel_unit: VoxelUnit::default(),
            time_step: 1,
            time_unit: TimeUnit::default(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the x extent.
    #[must_use]
    pub const fn x(mut self, start: u64, stop: u64) -> Self {
        self.x = AxisRange::new(start, stop);
        self
    }

    /// Set the y extent.
    #[must_use]
    pub const fn y(mut self, start: u64, stop: u64) -> Self {
        self.y = AxisRange::new(start, stop);
        self
    }

    /// Set the z extent.
    #[must_use]
    pub const fn z(mut self, start: u64, stop: u64) -> Self {
        self.z = AxisRange::new(start, stop);
        self
    }

    /// Set voxel edge lengths.
    #[must_use]
    pub const fn voxel_size(mut self, x: f64, y: f64, z: f64) -> Self {
        self.voxel_size = [x, y, z];
        self
    }

    /// Set the voxel unit.
    #[must_use]
    pub const fn voxel_unit(mut self, unit: VoxelUnit) -> Self {
        self.voxel_unit = unit;
        self
    }

    /// Set the time step and its unit.
    #[must_use]
    pub const fn time_step(mut self, step: u64, unit: TimeUnit) -> Self {
        self.time_step = step;
        self.time_unit = unit;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// [`Error::InvalidFrame`] if any axis has `start >= stop` or any voxel
    /// size is not strictly positive.
    pub fn build(self) -> Result<CoordinateFrame> {
        for (axis, range) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            if range.is_empty() {
                return Err(Error::InvalidFrame(format!(
                    "frame '{}' {axis} extent {range} must satisfy start < stop",
                    self.name
                )));
            }
        }
        // NaN fails the comparison as well
        if !self.voxel_size.iter().all(|size| *size > 0.0) {
            return Err(Error::InvalidFrame(format!(
                "frame '{}' voxel sizes must be positive",
                self.name
            )));
        }
        if self.time_step == 0 {
            return Err(Error::InvalidFrame(format!(
                "frame '{}' time step must be positive",
                self.name
            )));
        }
        Ok(CoordinateFrame {
            name: self.name,
            description: self.description,
            x: self.x,
            y: self.y,
            z: self.z,
            voxel_size: self.voxel_size,
            voxel_unit: self.voxel_unit,
            time_step: self.time_step,
            time_unit: self.time_unit,
        })
    }
}

/// Check a requested extent against a frame at a resolution.
///
/// `time_samples` bounds the time axis to `[0, max(time_samples, 1))`.
/// Ranges are checked in x, y, z, t order and the first failure is returned.
///
/// # Errors
/// - [`Error::MalformedRange`] if any axis has `start >= stop`
/// - [`Error::OutOfBounds`] if any axis leaves the scaled frame extent
pub fn validate_extent(
    frame: &CoordinateFrame,
    resolution: u8,
    extent: &Extent,
    time_samples: u64,
) -> Result<()> {
    extent.x.check("x")?;
    extent.y.check("y")?;
    extent.z.check("z")?;
    extent.t.check("t")?;

    let (x, y, z) = frame.extent_at(resolution)?;
    let t = AxisRange::new(0, time_samples.max(1));

    for (axis, bound, requested) in [
        ("x", x, extent.x),
        ("y", y, extent.y),
        ("z", z, extent.z),
        ("t", t, extent.t),
    ] {
        if !bound.contains(&requested) {
            return Err(Error::OutOfBounds(format!(
                "{axis} range {requested} outside {bound} at resolution {resolution}"
            )));
        }
    }
    Ok(())
}
