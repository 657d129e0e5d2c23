//! Conversions between device ticks and physical angles.

use std::f64::consts::PI;

/// Factory position resolution of the PTU-46, in degrees per tick.
pub const DEG_PER_POSITION_TICK: f64 = 0.051432698;

/// Scale from the resolution query's arc-seconds-per-tick to degrees per
/// tick.
pub const ARCSEC_PER_TICK_TO_DEG: f64 = 0.0002778;

/// Convert a raw resolution reading (arc-seconds per tick) into degrees per
/// tick.
pub fn resolution_to_deg_per_tick(raw_arcsec: f64) -> f64 {
    raw_arcsec * ARCSEC_PER_TICK_TO_DEG
}

/// Convert a tick count into degrees.
pub fn ticks_to_deg(ticks: i32, deg_per_tick: f64) -> f64 {
    f64::from(ticks) * deg_per_tick
}

/// Convert degrees into the nearest tick count.
///
/// Uses `f64::round`, i.e. round-half-away-from-zero. Sign-symmetric, so the
/// sub-tick error of a round trip stays within one tick on both sides of
/// zero.
pub fn deg_to_ticks(deg: f64, deg_per_tick: f64) -> i32 {
    (deg / deg_per_tick).round() as i32
}

/// Degrees to radians.
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Radians to degrees.
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}

/// Per-axis conversion state discovered by the initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCalibration {
    /// Degrees per position tick. 1.0 until the resolution query runs.
    pub deg_per_tick: f64,
    /// Lower travel limit in radians.
    pub min_rad: f64,
    /// Upper travel limit in radians.
    pub max_rad: f64,
}

impl Default for AxisCalibration {
    fn default() -> Self {
        Self {
            deg_per_tick: 1.0,
            min_rad: 0.0,
            max_rad: 0.0,
        }
    }
}

impl AxisCalibration {
    /// Convert a device tick count into radians.
    pub fn ticks_to_rad(&self, ticks: i32) -> f64 {
        deg_to_rad(ticks_to_deg(ticks, self.deg_per_tick))
    }

    /// Convert radians into the nearest device tick count.
    pub fn rad_to_ticks(&self, rad: f64) -> i32 {
        deg_to_ticks(rad_to_deg(rad), self.deg_per_tick)
    }

    /// Whether a target angle lies within the discovered travel limits.
    pub fn in_range(&self, rad: f64) -> bool {
        rad >= self.min_rad && rad <= self.max_rad
    }
}
