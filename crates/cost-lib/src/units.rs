//! Resource quantity parsing and unit normalization
//!
//! All conversions between raw backend values and the units reported to
//! callers live here:
//! - Kubernetes quantity strings (`500m`, `1Gi`, `1e3`) to base units
//! - CPU quantities to cores, memory quantities and bytes to GiB
//! - windowed sums to hourly rates via [`hourly_rate`]

use crate::error::{CostError, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Bytes in one GiB
pub const GIB_IN_BYTES: f64 = 1_073_741_824.0;

/// Seconds in one hour
pub const HOUR_IN_SECONDS: u64 = 3600;

/// Interval at which the emitter writes samples, and the floor for query steps
pub const SAMPLE_PERIOD_SECONDS: u64 = 15;

/// Hours in an average month, used for monthly estimates
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Parse a Kubernetes quantity string into its base-unit value
///
/// Accepts decimal SI suffixes (`n`, `u`, `m`, `k`, `M`, `G`, `T`, `P`, `E`),
/// binary suffixes (`Ki` .. `Ei`) and decimal exponents (`1e3`, `2E-3`).
pub fn parse_quantity(raw: &str) -> Result<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(CostError::Quantity(raw.to_string()));
    }

    let (number, multiplier) = split_suffix(s).ok_or_else(|| CostError::Quantity(raw.to_string()))?;

    let value: f64 = number
        .parse()
        .map_err(|_| CostError::Quantity(raw.to_string()))?;

    if !value.is_finite() {
        return Err(CostError::Quantity(raw.to_string()));
    }

    Ok(value * multiplier)
}

fn split_suffix(s: &str) -> Option<(&str, f64)> {
    const BINARY: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
    ];
    for (suffix, mult) in BINARY {
        if let Some(number) = s.strip_suffix(suffix) {
            return Some((number, *mult));
        }
    }

    // Exponent forms such as `1e3` end in a digit and parse as plain f64
    let last = s.chars().last()?;
    let mult = match last {
        'n' => 1e-9,
        'u' => 1e-6,
        'm' => 1e-3,
        'k' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        'T' => 1e12,
        'P' => 1e15,
        'E' => 1e18,
        c if c.is_ascii_digit() || c == '.' => return Some((s, 1.0)),
        _ => return None,
    };
    Some((&s[..s.len() - last.len_utf8()], mult))
}

/// CPU quantity in cores
pub fn quantity_to_cores(q: &Quantity) -> Result<f64> {
    parse_quantity(&q.0)
}

/// Memory quantity in GiB
pub fn quantity_to_gib(q: &Quantity) -> Result<f64> {
    parse_quantity(&q.0).map(bytes_to_gib)
}

pub fn bytes_to_gib(bytes: f64) -> f64 {
    bytes / GIB_IN_BYTES
}

/// Convert a value accumulated over `period_seconds` into a per-hour rate
///
/// This is the only hourly conversion in the crate. A sum of 15-second
/// samples divided by [`samples_per_hour`] is the same quantity as
/// `hourly_rate(sum, step)` scaled by the step length.
pub fn hourly_rate(value: f64, period_seconds: u64) -> f64 {
    if period_seconds == 0 {
        return 0.0;
    }
    value / period_seconds as f64 * HOUR_IN_SECONDS as f64
}

/// Number of samples of `sample_period_seconds` in one hour (240 at 15s)
pub fn samples_per_hour(sample_period_seconds: u64) -> f64 {
    hourly_rate(1.0, sample_period_seconds)
}

/// Average a sample count taken over `step_seconds` back to a per-sample value
pub fn average_over_step(count: f64, step_seconds: u64, sample_period_seconds: u64) -> f64 {
    if step_seconds == 0 {
        return 0.0;
    }
    count * sample_period_seconds as f64 / step_seconds as f64
}
