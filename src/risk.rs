// ===============================
// src/risk.rs
// ===============================
//
// Pre-trade checks. validate() = hard limits (no venue call if it fails),
// normalize() = shrink the ticket to what the book can absorb.
//
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::Limits;
use crate::domain::OrderSide;
use crate::market::OrderBook;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    // ---- schema ----
    #[error("entry is not an object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is invalid: {detail}")]
    InvalidField { field: &'static str, detail: String },
    #[error("negative size_usd {0}")]
    NegativeSize(f64),
    #[error("leverage {0} is below 1")]
    LeverageBelowOne(f64),
    // ---- safety ----
    #[error("unknown asset {0}")]
    UnknownAsset(String),
    #[error("below minimum order size (${size:.2} < ${min:.2})")]
    BelowMinimum { size: f64, min: f64 },
    #[error("exceeds maximum order size (${size:.2} > ${max:.2})")]
    AboveMaximum { size: f64, max: f64 },
    #[error("leverage {leverage}x exceeds market cap {cap}x")]
    LeverageAboveCap { leverage: f64, cap: f64 },
    #[error("market snapshot stale ({age_ms} ms old)")]
    StaleSnapshot { age_ms: i64 },
    #[error("insufficient liquidity (${available:.2} usable, minimum ${min:.2})")]
    InsufficientLiquidity { available: f64, min: f64 },
    #[error("batch cancelled before submission")]
    Cancelled,
}

/// Ticket that passed validate() + normalize().
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub size_usd: f64,
    pub leverage: Option<f64>,
}

pub fn validate(
    asset: &str,
    size_usd: f64,
    leverage: Option<f64>,
    book: Option<&OrderBook>,
    lim: &Limits,
) -> Result<(), ValidationError> {
    // 1) asset harus ada di snapshot venue
    if book.is_none() {
        return Err(ValidationError::UnknownAsset(asset.to_string()));
    }

    // 2) size band (pre-normalization)
    if !size_usd.is_finite() || size_usd < 0.0 {
        return Err(ValidationError::NegativeSize(size_usd));
    }
    if size_usd < lim.min_order_usd {
        return Err(ValidationError::BelowMinimum { size: size_usd, min: lim.min_order_usd });
    }
    if size_usd > lim.max_order_usd {
        return Err(ValidationError::AboveMaximum { size: size_usd, max: lim.max_order_usd });
    }

    // 3) per-market leverage cap
    if let Some(lev) = leverage {
        if !lev.is_finite() || lev < 1.0 {
            return Err(ValidationError::LeverageBelowOne(lev));
        }
        let cap = lim.leverage_cap(asset);
        if lev > cap {
            return Err(ValidationError::LeverageAboveCap { leverage: lev, cap });
        }
    }
    Ok(())
}

/// Clamp size to `depth_fraction` of visible depth and leverage to the
/// appetite ceiling. Never increases either value.
pub fn normalize(
    side: OrderSide,
    requested_usd: f64,
    leverage: Option<f64>,
    book: &OrderBook,
    lim: &Limits,
    appetite_ceiling: f64,
    now: DateTime<Utc>,
) -> Result<Normalized, ValidationError> {
    if !book.is_fresh(now, lim.max_snapshot_age) {
        return Err(ValidationError::StaleSnapshot { age_ms: book.age(now).num_milliseconds() });
    }

    let depth = book.visible_depth_usd(side.consumes_asks(), lim.depth_levels);
    let usable = depth * lim.depth_fraction;
    let size_usd = requested_usd.min(usable);
    if !(size_usd >= lim.min_order_usd) {
        return Err(ValidationError::InsufficientLiquidity { available: usable, min: lim.min_order_usd });
    }

    let leverage = leverage.map(|l| l.min(appetite_ceiling.min(lim.leverage_cap(&book.symbol))).max(1.0));
    Ok(Normalized { size_usd, leverage })
}
