// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : trade_pilot, profile-driven, risk-checked order execution
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Profiles a trader's spot & perp history, merges user preferences,
          takes advisor recommendations, validates & normalizes them against
          venue limits and live books, and submits idempotent orders with
          bounded retry. Exposes Prometheus metrics, records JSONL reports.
=============================================================================
*/
use ahash::AHashMap as HashMap;
use chrono::Duration as ChronoDuration;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Duration;

use crate::domain::{RiskAppetite, TradingHorizon, UserPreferences};
use crate::policy::{AppetitePolicy, ExperiencePolicy, FrequencyPolicy, LeverageCeilings, ProfilePolicy, SpotRiskPolicy, StylePolicy};
use crate::submit::RetryPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {detail}")]
    Invalid { key: &'static str, detail: String },
}

#[derive(Clone, Debug)]
pub struct Args {
    // files
    pub history_file: Option<String>,
    pub recommendations_file: Option<String>,
    pub report_file: Option<String>,
    pub metrics_port: Option<u16>,

    // paper market (symbol -> mid)
    pub mock_mids: Vec<(String, f64)>,
    pub mock_level_usd: f64,
    pub paper_fill_ms: u64,

    // stage (b) overrides
    pub preferences: UserPreferences,
}

/// Executor safety limits. Semua angka datang dari env, bukan hardcode di core.
#[derive(Clone, Debug)]
pub struct Limits {
    pub min_order_usd: f64,
    pub max_order_usd: f64,
    pub leverage_caps: HashMap<String, f64>,
    pub default_leverage_cap: f64,
    pub appetite_ceilings: LeverageCeilings,

    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub submit_timeout: Duration,
    pub max_in_flight: usize,

    pub depth_fraction: f64,
    pub depth_levels: usize,
    pub max_snapshot_age: ChronoDuration,

    /// Some(x) = test mode: every ticket is resized to x USD before validation
    pub test_trade_size_usd: Option<f64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_order_usd: 10.0,
            max_order_usd: 150.0,
            leverage_caps: parse_caps("BTC:50,ETH:50,SOL:20").unwrap_or_default(),
            default_leverage_cap: 10.0,
            appetite_ceilings: LeverageCeilings::default(),
            max_attempts: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_millis(5_000),
            submit_timeout: Duration::from_millis(3_000),
            max_in_flight: 4,
            depth_fraction: 0.10,
            depth_levels: 5,
            max_snapshot_age: ChronoDuration::milliseconds(5_000),
            test_trade_size_usd: None,
        }
    }
}

impl Limits {
    pub fn leverage_cap(&self, asset: &str) -> f64 {
        self.leverage_caps.get(asset).copied().unwrap_or(self.default_leverage_cap)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.max_attempts, base_delay: self.backoff_base, max_delay: self.backoff_max }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_order_usd > 0.0) || self.min_order_usd > self.max_order_usd {
            return Err(ConfigError::Invalid {
                key: "MIN_ORDER_USD",
                detail: format!("need 0 < min ({}) <= max ({})", self.min_order_usd, self.max_order_usd),
            });
        }
        if !(self.depth_fraction > 0.0 && self.depth_fraction <= 1.0) {
            return Err(ConfigError::Invalid { key: "DEPTH_FRACTION", detail: format!("{} not in (0, 1]", self.depth_fraction) });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid { key: "SUBMIT_MAX_ATTEMPTS", detail: "must be >= 1".into() });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid { key: "MAX_IN_FLIGHT", detail: "must be >= 1".into() });
        }
        if self.depth_levels == 0 {
            return Err(ConfigError::Invalid { key: "DEPTH_LEVELS", detail: "must be >= 1".into() });
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|x| x.trim().parse().ok()).unwrap_or(default)
}

/// `BTC:50,ETH:50` -> {BTC: 50, ETH: 50}
pub fn parse_caps(s: &str) -> Result<HashMap<String, f64>, ConfigError> {
    let mut out = HashMap::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (sym, val) = part
            .split_once(':')
            .ok_or_else(|| ConfigError::Invalid { key: "LEVERAGE_CAPS", detail: format!("expected SYMBOL:VALUE, got {part:?}") })?;
        let v: f64 = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key: "LEVERAGE_CAPS", detail: format!("bad number in {part:?}") })?;
        if !(v >= 1.0) {
            return Err(ConfigError::Invalid { key: "LEVERAGE_CAPS", detail: format!("cap below 1 in {part:?}") });
        }
        out.insert(sym.trim().to_ascii_uppercase(), v);
    }
    Ok(out)
}

fn parse_mids(s: &str) -> Vec<(String, f64)> {
    s.split(',')
        .filter_map(|p| p.split_once(':'))
        .filter_map(|(k, v)| v.trim().parse::<f64>().ok().filter(|x| *x > 0.0).map(|x| (k.trim().to_ascii_uppercase(), x)))
        .collect()
}

fn parse_ceilings(s: &str) -> Result<LeverageCeilings, ConfigError> {
    let vals: Vec<f64> = s.split(',').filter_map(|x| x.trim().parse().ok()).collect();
    match vals.as_slice() {
        [c, m, a] if *c >= 1.0 && c <= m && m <= a => Ok(LeverageCeilings { conservative: *c, moderate: *m, aggressive: *a }),
        _ => Err(ConfigError::Invalid { key: "APPETITE_LEVERAGE_CEILINGS", detail: format!("expected three ascending values >= 1, got {s:?}") }),
    }
}

fn load_preferences() -> UserPreferences {
    UserPreferences {
        risk_tolerance: env::var("PREF_RISK_TOLERANCE").ok().and_then(|s| RiskAppetite::parse(&s)),
        target_return_pct: env::var("PREF_TARGET_RETURN_PCT").ok().and_then(|s| s.trim().parse().ok()),
        max_drawdown_pct: env::var("PREF_MAX_DRAWDOWN_PCT").ok().and_then(|s| s.trim().parse().ok()),
        preferred_markets: env::var("PREF_MARKETS")
            .ok()
            .map(|s| s.split(',').map(|x| x.trim().to_ascii_uppercase()).filter(|x| !x.is_empty()).collect())
            .unwrap_or_default(),
        trading_horizon: env::var("PREF_HORIZON").ok().and_then(|s| TradingHorizon::parse(&s)),
        notes: env::var("PREF_NOTES").ok().filter(|s| !s.trim().is_empty()),
    }
}

pub fn load_limits() -> Result<Limits, ConfigError> {
    let d = Limits::default();
    let leverage_caps = match env::var("LEVERAGE_CAPS") {
        Ok(s) => parse_caps(&s)?,
        Err(_) => d.leverage_caps.clone(),
    };
    let appetite_ceilings = match env::var("APPETITE_LEVERAGE_CEILINGS") {
        Ok(s) => parse_ceilings(&s)?,
        Err(_) => d.appetite_ceilings.clone(),
    };
    let test_mode = matches!(env::var("TEST_MODE").unwrap_or_default().to_ascii_lowercase().as_str(), "1" | "true" | "yes");

    let limits = Limits {
        min_order_usd: env_or("MIN_ORDER_USD", d.min_order_usd),
        max_order_usd: env_or("MAX_ORDER_USD", d.max_order_usd),
        leverage_caps,
        default_leverage_cap: env_or("DEFAULT_LEVERAGE_CAP", d.default_leverage_cap),
        appetite_ceilings,
        max_attempts: env_or("SUBMIT_MAX_ATTEMPTS", d.max_attempts),
        backoff_base: Duration::from_millis(env_or("BACKOFF_BASE_MS", 200u64)),
        backoff_max: Duration::from_millis(env_or("BACKOFF_MAX_MS", 5_000u64)),
        submit_timeout: Duration::from_millis(env_or("SUBMIT_TIMEOUT_MS", 3_000u64)),
        max_in_flight: env_or("MAX_IN_FLIGHT", d.max_in_flight),
        depth_fraction: env_or("DEPTH_FRACTION", d.depth_fraction),
        depth_levels: env_or("DEPTH_LEVELS", d.depth_levels),
        max_snapshot_age: ChronoDuration::milliseconds(env_or("MAX_SNAPSHOT_AGE_MS", 5_000i64)),
        test_trade_size_usd: test_mode.then(|| env_or("TEST_TRADE_SIZE_USD", 15.0)),
    };
    limits.validate()?;
    Ok(limits)
}

pub fn load_policy() -> ProfilePolicy {
    let d = ProfilePolicy::default();
    ProfilePolicy {
        style: StylePolicy {
            scalper_max_hours: env_or("SCALPER_MAX_HOURS", d.style.scalper_max_hours),
            swing_max_hours: env_or("SWING_MAX_DAYS", d.style.swing_max_hours / 24.0) * 24.0,
        },
        frequency: FrequencyPolicy {
            high_per_day: env_or("HIGH_FREQ_PER_DAY", d.frequency.high_per_day),
            medium_per_day: env_or("MEDIUM_FREQ_PER_DAY", d.frequency.medium_per_day),
        },
        appetite: AppetitePolicy {
            conservative_below: env_or("CONSERVATIVE_MAX_LEVERAGE", d.appetite.conservative_below),
            moderate_below: env_or("MODERATE_MAX_LEVERAGE", d.appetite.moderate_below),
            dispersion_threshold: env_or("LEVERAGE_DISPERSION_THRESHOLD", d.appetite.dispersion_threshold),
        },
        experience: ExperiencePolicy {
            beginner_below: env_or("BEGINNER_MAX_CLOSED", d.experience.beginner_below),
            intermediate_below: env_or("INTERMEDIATE_MAX_CLOSED", d.experience.intermediate_below),
        },
        spot_risk: SpotRiskPolicy {
            moderate_above: env_or("SPOT_MODERATE_RISK_SCORE", d.spot_risk.moderate_above),
            aggressive_above: env_or("SPOT_AGGRESSIVE_RISK_SCORE", d.spot_risk.aggressive_above),
            ..d.spot_risk.clone()
        },
        spot_experience: d.spot_experience,
    }
}

pub fn load() -> Result<(Args, Limits, ProfilePolicy), ConfigError> {
    // Pastikan .env dibaca (agar LEVERAGE_CAPS, RECOMMENDATIONS_FILE, dll ter-load)
    let _ = dotenv();

    let args = Args {
        history_file: env::var("HISTORY_FILE").ok(),
        recommendations_file: env::var("RECOMMENDATIONS_FILE").ok(),
        report_file: env::var("REPORT_FILE").ok(),
        metrics_port: env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        mock_mids: {
            let m = parse_mids(&env::var("MOCK_MIDS").unwrap_or_default());
            if m.is_empty() { parse_mids("BTC:65000,ETH:3200,SOL:150,USDC:1") } else { m }
        },
        mock_level_usd: env_or("MOCK_LEVEL_USD", 2_000.0),
        paper_fill_ms: env_or("PAPER_FILL_MS", 20u64),
        preferences: load_preferences(),
    };

    Ok((args, load_limits()?, load_policy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_parse_and_reject_garbage() {
        let caps = parse_caps(" btc:50 , eth : 25 ").unwrap();
        assert_eq!(caps.get("BTC"), Some(&50.0));
        assert_eq!(caps.get("ETH"), Some(&25.0));
        assert!(parse_caps("BTC=50").is_err());
        assert!(parse_caps("BTC:0.5").is_err());
        assert!(parse_caps("").unwrap().is_empty());
    }

    #[test]
    fn ceilings_must_ascend() {
        assert!(parse_ceilings("3,10,20").is_ok());
        assert!(parse_ceilings("10,3,20").is_err());
        assert!(parse_ceilings("3,10").is_err());
    }

    #[test]
    fn default_limits_are_valid_and_fall_back_for_unlisted_caps() {
        let l = Limits::default();
        assert!(l.validate().is_ok());
        assert_eq!(l.leverage_cap("ETH"), 50.0);
        assert_eq!(l.leverage_cap("DOGE"), l.default_leverage_cap);
        assert_eq!(l.retry_policy().max_attempts, 3);
    }

    #[test]
    fn inverted_order_bounds_rejected() {
        let l = Limits { min_order_usd: 200.0, ..Limits::default() };
        assert!(matches!(l.validate(), Err(ConfigError::Invalid { key: "MIN_ORDER_USD", .. })));
    }

    #[test]
    fn mids_parse() {
        assert_eq!(parse_mids("btc:100, eth:x ,sol:2"), vec![("BTC".to_string(), 100.0), ("SOL".to_string(), 2.0)]);
    }
}
