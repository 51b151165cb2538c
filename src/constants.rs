//! Timing and value-range constants shared by the interpreter, sequencer and player.

use std::time::Duration;

pub const TICKS_PER_QUARTER: u32 = 960;
pub const TICKS_PER_WHOLE: u32 = 4 * TICKS_PER_QUARTER;

pub const DEFAULT_TEMPO: u16 = 120;
pub const DEFAULT_VELOCITY: u8 = 100;
pub const DEFAULT_TIME_SIGNATURE: (u8, u8) = (4, 4);

pub const MIN_VALUE: u8 = 0;
pub const MAX_VALUE: u8 = 127;
pub const MAX_CHANNEL: u8 = 15;
pub const MAX_BEATS_PER_BAR: u8 = 128;

/// Velocity added per accent mark.
pub const ACCENT_VELOCITY: i32 = 5;
/// Velocity added per marcato mark.
pub const MARCATO_VELOCITY: i32 = 10;
/// Velocity removed per ghost mark.
pub const GHOST_VELOCITY: i32 = 5;

/// Convert a tick count to nanoseconds at `tempo` quarter notes per minute.
///
/// This is the only floating point step in the timing pipeline.
pub fn ticks_to_nanos(tempo: f64, ticks: u32) -> i64 {
    (ticks as f64 * 60e9 / (tempo * TICKS_PER_QUARTER as f64)).round() as i64
}

/// Convert a tick count to a wall-clock duration at `tempo`.
pub fn ticks_to_duration(tempo: f64, ticks: u32) -> Duration {
    Duration::from_nanos(ticks_to_nanos(tempo, ticks).max(0) as u64)
}
