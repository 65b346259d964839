// ===============================
// src/perp_profiler.rs
// ===============================
use ahash::AHashMap as HashMap;
use std::cmp::Ordering;

use crate::domain::{DirectionalBias, PerpPosition, PerpProfile, ProfileError, ProfitFactor};
use crate::policy::ProfilePolicy;
use crate::spot_profiler::{mean, sample_stdev};

/// Net direction beyond this share of all positions counts as a bias.
const BIAS_SHARE: f64 = 0.2;

pub fn compute_perp_profile(positions: &[PerpPosition]) -> Result<PerpProfile, ProfileError> {
    compute_perp_profile_with(positions, &ProfilePolicy::default())
}

pub fn compute_perp_profile_with(positions: &[PerpPosition], policy: &ProfilePolicy) -> Result<PerpProfile, ProfileError> {
    let mut ordered: Vec<&PerpPosition> = positions.iter().collect();
    ordered.sort_by(|a, b| {
        a.closed_at
            .cmp(&b.closed_at)
            .then_with(|| a.asset.cmp(&b.asset))
            .then_with(|| a.realized_pnl.partial_cmp(&b.realized_pnl).unwrap_or(Ordering::Equal))
    });

    let closed: Vec<&PerpPosition> = ordered.iter().copied().filter(|p| p.is_closed()).collect();
    if closed.is_empty() {
        return Err(ProfileError::InsufficientData("no closed perp positions".into()));
    }

    // 1) win rate & profit factor (closed only)
    let wins = closed.iter().filter(|p| p.realized_pnl > 0.0).count();
    let win_rate = wins as f64 / closed.len() as f64;
    let gross_profit: f64 = closed.iter().map(|p| p.realized_pnl).filter(|v| *v > 0.0).sum();
    let gross_loss: f64 = closed.iter().map(|p| p.realized_pnl).filter(|v| *v < 0.0).map(f64::abs).sum();
    let profit_factor = if gross_loss > 0.0 {
        ProfitFactor::Finite(gross_profit / gross_loss)
    } else if gross_profit > 0.0 {
        ProfitFactor::Infinite
    } else {
        // break-even only: nothing won, nothing lost
        ProfitFactor::Finite(0.0)
    };

    // 2) leverage stats (open + closed)
    let leverages: Vec<f64> = ordered.iter().map(|p| p.leverage).filter(|l| l.is_finite()).collect();
    let avg_leverage = mean(&leverages).unwrap_or(0.0);
    let leverage_volatility = population_stdev(&leverages, avg_leverage);
    let max_leverage = leverages.iter().copied().fold(0.0_f64, f64::max);

    // 3) sizing: concentration of what is still open, consistency over everything
    let open_values: Vec<f64> = ordered.iter().filter(|p| !p.is_closed()).map(|p| p.notional()).filter(|v| v.is_finite()).collect();
    let open_total: f64 = open_values.iter().sum();
    let position_concentration = if open_total > 0.0 {
        open_values.iter().map(|v| (v / open_total).powi(2)).sum::<f64>().clamp(0.0, 1.0)
    } else {
        0.0
    };
    let notionals: Vec<f64> = ordered.iter().map(|p| p.notional()).filter(|v| v.is_finite()).collect();
    let avg_position_size = mean(&notionals).unwrap_or(0.0);
    let size_consistency = match sample_stdev(&notionals) {
        Some(sd) if avg_position_size > 0.0 => sd / avg_position_size,
        _ => 0.0,
    };

    // 4) bias & preferred markets
    let net: i64 = ordered.iter().map(|p| p.direction.sign()).sum();
    let n = ordered.len() as f64;
    let directional_bias = if net as f64 > n * BIAS_SHARE {
        DirectionalBias::LongBiased
    } else if (net as f64) < -n * BIAS_SHARE {
        DirectionalBias::ShortBiased
    } else {
        DirectionalBias::Neutral
    };

    let mut volume: HashMap<&str, f64> = HashMap::new();
    for p in &ordered {
        *volume.entry(p.asset.as_str()).or_insert(0.0) += p.notional();
    }
    let mut ranked: Vec<(&str, f64)> = volume.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));

    Ok(PerpProfile {
        avg_leverage,
        leverage_volatility,
        max_leverage,
        win_rate,
        profit_factor,
        risk_appetite: policy.appetite.classify(avg_leverage, leverage_volatility),
        experience_level: policy.experience.classify(closed.len()),
        closed_positions: closed.len(),
        position_concentration,
        avg_position_size,
        size_consistency,
        directional_bias,
        preferred_markets: ranked.into_iter().take(3).map(|(a, _)| a.to_string()).collect(),
    })
}

fn population_stdev(xs: &[f64], m: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, ExperienceLevel, RiskAppetite};
    use crate::policy::AppetitePolicy;
    use chrono::{TimeZone, Utc};

    fn pos(asset: &str, dir: Direction, lev: f64, pnl: f64, closed: bool) -> PerpPosition {
        PerpPosition {
            asset: asset.into(),
            direction: dir,
            size: 1.0,
            entry_price: 100.0,
            leverage: lev,
            realized_pnl: pnl,
            closed_at: closed.then(|| Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn one_win_one_loss() {
        let ps = vec![pos("ETH", Direction::Long, 5.0, 100.0, true), pos("ETH", Direction::Short, 5.0, -50.0, true)];
        let p = compute_perp_profile(&ps).unwrap();
        assert_eq!(p.win_rate, 0.5);
        assert_eq!(p.profit_factor, ProfitFactor::Finite(2.0));
        assert_eq!(p.closed_positions, 2);
    }

    #[test]
    fn no_losers_is_infinite_sentinel() {
        let ps = vec![pos("BTC", Direction::Long, 2.0, 10.0, true), pos("BTC", Direction::Long, 2.0, 30.0, true)];
        let p = compute_perp_profile(&ps).unwrap();
        assert!(p.profit_factor.is_infinite());
        assert_eq!(p.profit_factor.as_f64(), None);
        assert_eq!(p.win_rate, 1.0);
    }

    #[test]
    fn breakeven_only_is_zero_not_nan() {
        let p = compute_perp_profile(&[pos("SOL", Direction::Long, 1.0, 0.0, true)]).unwrap();
        assert_eq!(p.profit_factor, ProfitFactor::Finite(0.0));
        assert_eq!(p.win_rate, 0.0);
    }

    #[test]
    fn open_only_is_insufficient_data() {
        let err = compute_perp_profile(&[pos("ETH", Direction::Long, 5.0, 0.0, false)]).unwrap_err();
        assert!(matches!(err, ProfileError::InsufficientData(_)));
        assert!(compute_perp_profile(&[]).is_err());
    }

    #[test]
    fn leverage_stats_include_open_positions() {
        let ps = vec![
            pos("ETH", Direction::Long, 2.0, 10.0, true),
            pos("ETH", Direction::Long, 4.0, -5.0, true),
            pos("BTC", Direction::Long, 6.0, 0.0, false),
        ];
        let p = compute_perp_profile(&ps).unwrap();
        assert!((p.avg_leverage - 4.0).abs() < 1e-12);
        assert!((p.leverage_volatility - (8.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(p.max_leverage, 6.0);
        assert_eq!(p.risk_appetite, RiskAppetite::Moderate);
        assert_eq!(p.directional_bias, DirectionalBias::LongBiased);
    }

    #[test]
    fn dispersion_bumps_appetite() {
        // avg 2x would be conservative; stdev 1x over a tuned threshold of 0.5
        let ps = vec![pos("ETH", Direction::Long, 1.0, 1.0, true), pos("ETH", Direction::Short, 3.0, 1.0, true)];
        let policy = ProfilePolicy { appetite: AppetitePolicy { dispersion_threshold: 0.5, ..Default::default() }, ..Default::default() };
        let p = compute_perp_profile_with(&ps, &policy).unwrap();
        assert_eq!(p.risk_appetite, RiskAppetite::Moderate);
        assert_eq!(compute_perp_profile(&ps).unwrap().risk_appetite, RiskAppetite::Conservative);
    }

    #[test]
    fn experience_counts_closed_positions() {
        let mut ps: Vec<PerpPosition> = (0..12).map(|i| pos("ETH", Direction::Long, 3.0, i as f64 - 5.0, true)).collect();
        ps.push(pos("ETH", Direction::Long, 3.0, 0.0, false));
        let p = compute_perp_profile(&ps).unwrap();
        assert_eq!(p.experience_level, ExperienceLevel::Intermediate);
        assert_eq!(p.closed_positions, 12);
    }

    #[test]
    fn sizing_metrics() {
        let mut big = pos("BTC", Direction::Long, 2.0, 0.0, false);
        big.size = 3.0;
        let ps = vec![pos("ETH", Direction::Long, 2.0, 5.0, true), pos("ETH", Direction::Long, 2.0, 0.0, false), big];
        let p = compute_perp_profile(&ps).unwrap();
        // open: 100 and 300 -> 0.25^2 + 0.75^2
        assert!((p.position_concentration - 0.625).abs() < 1e-12);
        // all: 100, 100, 300
        assert!((p.avg_position_size - 500.0 / 3.0).abs() < 1e-9);
        let sd = ((2.0 * (100.0_f64 - 500.0 / 3.0).powi(2) + (300.0_f64 - 500.0 / 3.0).powi(2)) / 2.0).sqrt();
        assert!((p.size_consistency - sd / (500.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn nothing_open_means_zero_concentration() {
        let ps = vec![pos("ETH", Direction::Long, 2.0, 5.0, true), pos("SOL", Direction::Short, 2.0, -1.0, true)];
        let p = compute_perp_profile(&ps).unwrap();
        assert_eq!(p.position_concentration, 0.0);
        assert_eq!(p.avg_position_size, 100.0);
        assert_eq!(p.size_consistency, 0.0);
    }

    #[test]
    fn deterministic_for_same_input() {
        let ps = vec![
            pos("ETH", Direction::Long, 7.5, 12.5, true),
            pos("SOL", Direction::Short, 12.0, -3.25, true),
            pos("BTC", Direction::Long, 20.0, 0.0, false),
        ];
        assert_eq!(compute_perp_profile(&ps).unwrap(), compute_perp_profile(&ps).unwrap());
    }
}
