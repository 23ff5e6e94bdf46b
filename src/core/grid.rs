//! Grid ladder calculation
//!
//! The ladder is a pure function of (lower, upper, count, progression); it is
//! recomputed on every session initialization and never patched in place.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Trigger offset applied around each level price. Buys rest slightly below
/// the level, sells slightly above, so every round trip clears a minimum
/// spread of 2 * TRIGGER_OFFSET.
pub const TRIGGER_OFFSET: f64 = 0.0005;

/// Default half-width used when a bot has no configured price bounds
pub const DEFAULT_RANGE_PERCENT: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progression {
    /// Equal price spacing between levels
    Arithmetic,
    /// Equal percentage spacing between levels
    Geometric,
}

impl Progression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Progression::Arithmetic => "arithmetic",
            Progression::Geometric => "geometric",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "geometric" => Progression::Geometric,
            _ => Progression::Arithmetic,
        }
    }
}

/// One rung of the price ladder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: usize,
    pub price: f64,
    pub buy_price: f64,
    pub sell_price: f64,
}

/// Compute the ordered ladder of grid levels.
///
/// Requires `count >= 2` and `0 < lower < upper`.
pub fn compute_levels(
    lower: f64,
    upper: f64,
    count: u32,
    progression: Progression,
) -> EngineResult<Vec<GridLevel>> {
    if count < 2 {
        return Err(EngineError::InvalidRange(format!(
            "grid count must be at least 2, got {}",
            count
        )));
    }

    if lower <= 0.0 || lower >= upper {
        return Err(EngineError::InvalidRange(format!(
            "bounds must satisfy 0 < lower < upper, got [{}, {}]",
            lower, upper
        )));
    }

    let mut levels = Vec::with_capacity(count as usize);

    match progression {
        Progression::Geometric => {
            let ratio = (upper / lower).powf(1.0 / (count - 1) as f64);
            for i in 0..count as usize {
                let price = lower * ratio.powi(i as i32);
                levels.push(make_level(i, price));
            }
        }
        Progression::Arithmetic => {
            let interval = (upper - lower) / (count - 1) as f64;
            for i in 0..count as usize {
                let price = lower + interval * i as f64;
                levels.push(make_level(i, price));
            }
        }
    }

    Ok(levels)
}

fn make_level(index: usize, price: f64) -> GridLevel {
    GridLevel {
        index,
        price,
        buy_price: price * (1.0 - TRIGGER_OFFSET),
        sell_price: price * (1.0 + TRIGGER_OFFSET),
    }
}

/// Derive ladder bounds around the current price when a bot has none
/// configured. Rounded to 2 decimal places, computed once at initialization.
pub fn derive_bounds(current_price: f64, range_percent: f64) -> EngineResult<(f64, f64)> {
    if current_price <= 0.0 {
        return Err(EngineError::InvalidRange(format!(
            "cannot derive bounds from non-positive price {}",
            current_price
        )));
    }

    let lower = round2(current_price * (1.0 - range_percent));
    let upper = round2(current_price * (1.0 + range_percent));

    if lower <= 0.0 || lower >= upper {
        return Err(EngineError::InvalidRange(format!(
            "derived bounds [{}, {}] are degenerate at price {}",
            lower, upper, current_price
        )));
    }

    Ok((lower, upper))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
