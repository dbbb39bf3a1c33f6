use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Every continuous quantity in the simulation (wiper ratios, servo angles,
/// sensor readings, elapsed time) uses this type so that the host loop and
/// the background worker compute bit-identical results.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Nominal tick rate: one tick per animation frame.
pub const TICKS_PER_SECOND: u32 = 60;

/// Length of one tick in seconds (1/60 s).
#[inline]
pub fn tick_seconds() -> Fixed64 {
    Fixed64::from_num(1) / Fixed64::from_num(TICKS_PER_SECOND)
}

/// Convert an f64 to Fixed64. Use only for initialization, never in the tick loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and the JSON boundary.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Clamp a value into the unit interval [0, 1].
#[inline]
pub fn clamp_unit(v: Fixed64) -> Fixed64 {
    v.clamp(Fixed64::ZERO, Fixed64::from_num(1))
}

/// Checked multiplication for Fixed64 that returns None on overflow.
#[inline]
pub fn checked_mul_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_mul(b)
}

/// Checked division for Fixed64 that returns None on zero divisor or overflow.
#[inline]
pub fn checked_div_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_div(b)
}

/// Move `current` toward `target` by at most `max_step`, never overshooting.
#[inline]
pub fn approach(current: Fixed64, target: Fixed64, max_step: Fixed64) -> Fixed64 {
    if current < target {
        current.saturating_add(max_step).min(target)
    } else {
        current.saturating_sub(max_step).max(target)
    }
}
