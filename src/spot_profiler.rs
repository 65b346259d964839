// ===============================
// src/spot_profiler.rs
// ===============================
//
// Spot history -> SpotProfile. Pure & deterministic: fills are re-ordered by
// (timestamp, asset) and holdings by asset before any float is summed, so the
// same input always gives bit-identical output.
//
use ahash::AHashMap as HashMap;
use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::domain::{AssetWeight, ProfileError, Side, SpotFill, SpotHolding, SpotProfile, TradeFrequency};
use crate::policy::ProfilePolicy;

pub const STABLECOINS: [&str; 3] = ["USDC", "USDT", "DAI"];
pub const LARGE_CAPS: [&str; 2] = ["BTC", "ETH"];

const QTY_EPS: f64 = 1e-12;

pub fn compute_spot_profile(fills: &[SpotFill], holdings: &[SpotHolding]) -> Result<SpotProfile, ProfileError> {
    compute_spot_profile_with(fills, holdings, &ProfilePolicy::default())
}

pub fn compute_spot_profile_with(
    fills: &[SpotFill],
    holdings: &[SpotHolding],
    policy: &ProfilePolicy,
) -> Result<SpotProfile, ProfileError> {
    if holdings.is_empty() {
        return Err(ProfileError::InsufficientData("no spot holdings".into()));
    }

    let mut ordered: Vec<&SpotFill> = fills
        .iter()
        .filter(|f| f.size.is_finite() && f.price.is_finite() && f.size > 0.0 && f.price > 0.0)
        .collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.asset.cmp(&b.asset)));

    // 1) valuation pakai harga fill terakhir, fallback cost_basis
    let mut last_px: HashMap<&str, f64> = HashMap::new();
    for f in &ordered {
        last_px.insert(f.asset.as_str(), f.price);
    }
    let values = value_holdings(holdings, &last_px);
    let total: f64 = values.iter().map(|(_, v)| *v).sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(ProfileError::InsufficientData("holdings have no positive USD value".into()));
    }

    // 2) concentration (HHI) + dominant assets
    let concentration: f64 = values.iter().map(|(_, v)| (v / total).powi(2)).sum::<f64>().clamp(0.0, 1.0);
    let mut dominant: Vec<AssetWeight> = values
        .iter()
        .map(|(a, v)| AssetWeight { asset: a.clone(), weight: v / total, value_usd: *v })
        .collect();
    dominant.sort_by(|a, b| {
        b.value_usd.partial_cmp(&a.value_usd).unwrap_or(Ordering::Equal).then_with(|| a.asset.cmp(&b.asset))
    });

    let share_of = |set: &[&str]| -> f64 {
        values.iter().filter(|(a, _)| set.contains(&a.as_str())).map(|(_, v)| *v).sum::<f64>() / total
    };

    // 3) style
    let avg_holding_hours = average_holding_hours(&ordered);
    let (trading_style, style_inferred) = policy.style.classify(avg_holding_hours);

    // 4) trade behaviour
    let notionals: Vec<f64> = ordered.iter().map(|f| f.notional()).collect();
    let typical_trade_usd = mean(&notionals).unwrap_or(0.0);
    let size_consistency = match sample_stdev(&notionals) {
        Some(sd) if typical_trade_usd > 0.0 => sd / typical_trade_usd,
        _ => 0.0,
    };
    let trade_frequency = match (ordered.first(), ordered.last()) {
        (Some(first), Some(last)) => {
            let days = ((last.timestamp - first.timestamp).num_seconds() as f64 / 86_400.0).max(1.0);
            policy.frequency.classify(ordered.len() as f64 / days)
        }
        _ => TradeFrequency::Low,
    };

    let stablecoin_ratio = share_of(&STABLECOINS);
    let large_cap_ratio = share_of(&LARGE_CAPS);

    Ok(SpotProfile {
        risk_tolerance: policy.spot_risk.classify(stablecoin_ratio, large_cap_ratio, concentration, trade_frequency),
        experience_level: policy.spot_experience.classify(values.len(), trade_frequency, total),
        concentration_index: concentration,
        diversity_score: 1.0 - concentration,
        dominant_assets: dominant,
        trading_style,
        style_inferred,
        avg_holding_hours,
        total_value_usd: total,
        asset_count: values.len(),
        stablecoin_ratio,
        large_cap_ratio,
        trade_frequency,
        typical_trade_usd,
        size_consistency,
        preferred_assets: preferred_assets(&ordered, 3),
    })
}

/// Per-asset USD value, merged by symbol and sorted by symbol.
fn value_holdings(holdings: &[SpotHolding], last_px: &HashMap<&str, f64>) -> Vec<(String, f64)> {
    let mut sorted: Vec<&SpotHolding> = holdings.iter().collect();
    sorted.sort_by(|a, b| a.asset.cmp(&b.asset));

    let mut out: Vec<(String, f64)> = Vec::with_capacity(sorted.len());
    for h in sorted {
        let px = last_px.get(h.asset.as_str()).copied().unwrap_or(h.cost_basis);
        let v = h.quantity * px;
        let v = if v.is_finite() { v.max(0.0) } else { 0.0 };
        match out.last_mut() {
            Some((a, acc)) if *a == h.asset => *acc += v,
            _ => out.push((h.asset.clone(), v)),
        }
    }
    out
}

/// FIFO lot matching per asset: every sold unit is paired with the oldest
/// open buy and the pair's duration is weighted by matched size. Without any
/// round trip, fall back to the mean gap between consecutive fills.
fn average_holding_hours(ordered: &[&SpotFill]) -> Option<f64> {
    let mut lots: HashMap<&str, VecDeque<(f64, i64)>> = HashMap::new();
    let mut weighted = 0.0_f64;
    let mut matched = 0.0_f64;

    for f in ordered {
        let ts = f.timestamp.timestamp();
        match f.side {
            Side::Buy => lots.entry(f.asset.as_str()).or_default().push_back((f.size, ts)),
            Side::Sell => {
                let Some(queue) = lots.get_mut(f.asset.as_str()) else { continue };
                let mut remaining = f.size;
                while remaining > QTY_EPS {
                    let Some(front) = queue.front_mut() else { break };
                    let m = remaining.min(front.0);
                    weighted += m * (ts - front.1) as f64 / 3600.0;
                    matched += m;
                    remaining -= m;
                    front.0 -= m;
                    if front.0 <= QTY_EPS {
                        queue.pop_front();
                    }
                }
            }
        }
    }

    if matched > QTY_EPS {
        return Some(weighted / matched);
    }
    let gaps: Vec<f64> = ordered
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds() as f64 / 3600.0)
        .collect();
    mean(&gaps)
}

fn preferred_assets(ordered: &[&SpotFill], top: usize) -> Vec<String> {
    let mut volume: HashMap<&str, f64> = HashMap::new();
    for f in ordered {
        *volume.entry(f.asset.as_str()).or_insert(0.0) += f.notional();
    }
    let mut ranked: Vec<(&str, f64)> = volume.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(top).map(|(a, _)| a.to_string()).collect()
}

pub(crate) fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() { None } else { Some(xs.iter().sum::<f64>() / xs.len() as f64) }
}

pub(crate) fn sample_stdev(xs: &[f64]) -> Option<f64> {
    let m = mean(xs)?;
    if xs.len() < 2 {
        return None;
    }
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExperienceLevel, RiskAppetite, TradingStyle};
    use chrono::{Duration, TimeZone, Utc};

    fn holding(asset: &str, qty: f64, cost: f64) -> SpotHolding {
        SpotHolding { asset: asset.into(), quantity: qty, cost_basis: cost }
    }

    fn fill(asset: &str, side: Side, size: f64, price: f64, hours: i64) -> SpotFill {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        SpotFill { asset: asset.into(), side, size, price, timestamp: t0 + Duration::hours(hours) }
    }

    #[test]
    fn concentration_for_seventy_thirty_portfolio() {
        let holdings = vec![holding("ETH", 1.0, 3000.0), holding("BTC", 1.0, 7000.0)];
        let p = compute_spot_profile(&[], &holdings).unwrap();
        assert!((p.concentration_index - 0.58).abs() < 1e-9);
        assert_eq!(p.dominant_assets[0].asset, "BTC");
        assert!((p.dominant_assets[0].weight - 0.7).abs() < 1e-9);
        assert_eq!(p.dominant_assets[1].asset, "ETH");
        assert!((p.dominant_assets[1].weight - 0.3).abs() < 1e-9);
        assert_eq!(p.diversity_score, 1.0 - p.concentration_index);
        assert!((p.large_cap_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_holdings_is_insufficient_data() {
        let err = compute_spot_profile(&[], &[]).unwrap_err();
        assert!(matches!(err, ProfileError::InsufficientData(_)));
    }

    #[test]
    fn zero_value_holdings_is_insufficient_data() {
        let err = compute_spot_profile(&[], &[holding("BTC", 0.0, 60_000.0)]).unwrap_err();
        assert!(matches!(err, ProfileError::InsufficientData(_)));
    }

    #[test]
    fn ties_broken_by_symbol() {
        let holdings = vec![holding("SOL", 10.0, 100.0), holding("ARB", 1000.0, 1.0), holding("USDC", 500.0, 1.0)];
        let p = compute_spot_profile(&[], &holdings).unwrap();
        let order: Vec<&str> = p.dominant_assets.iter().map(|a| a.asset.as_str()).collect();
        assert_eq!(order, vec!["ARB", "SOL", "USDC"]);
        assert!((p.stablecoin_ratio - 0.2).abs() < 1e-9);
    }

    #[test]
    fn latest_fill_price_wins_over_cost_basis() {
        let fills = vec![fill("ETH", Side::Buy, 1.0, 2000.0, 0), fill("ETH", Side::Buy, 1.0, 4000.0, 5)];
        let holdings = vec![holding("ETH", 1.0, 1.0), holding("USDC", 4000.0, 1.0)];
        let p = compute_spot_profile(&fills, &holdings).unwrap();
        assert!((p.total_value_usd - 8000.0).abs() < 1e-9);
        assert!((p.concentration_index - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bounds_and_exact_diversity_for_many_holdings() {
        for n in 1..30 {
            let holdings: Vec<SpotHolding> =
                (0..n).map(|i| holding(&format!("A{i:02}"), (i as f64 + 1.0) * 3.7, 1.3)).collect();
            let p = compute_spot_profile(&[], &holdings).unwrap();
            assert!((0.0..=1.0).contains(&p.concentration_index));
            assert_eq!(p.diversity_score, 1.0 - p.concentration_index);
        }
    }

    #[test]
    fn round_trip_under_a_day_is_scalper() {
        let fills = vec![fill("SOL", Side::Buy, 10.0, 100.0, 0), fill("SOL", Side::Sell, 10.0, 101.0, 3)];
        let p = compute_spot_profile(&fills, &[holding("SOL", 1.0, 100.0)]).unwrap();
        assert_eq!(p.trading_style, TradingStyle::Scalper);
        assert!(p.style_inferred);
        assert!((p.avg_holding_hours.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn fifo_weighting_gives_swing() {
        // 1 unit held 2 days, 1 unit held 10 days -> avg 6 days
        let fills = vec![
            fill("ETH", Side::Buy, 1.0, 3000.0, 0),
            fill("ETH", Side::Buy, 1.0, 3000.0, 24 * 8),
            fill("ETH", Side::Sell, 1.0, 3100.0, 24 * 2),
            fill("ETH", Side::Sell, 1.0, 3100.0, 24 * 18),
        ];
        let p = compute_spot_profile(&fills, &[holding("ETH", 1.0, 3000.0)]).unwrap();
        assert_eq!(p.trading_style, TradingStyle::Swing);
        assert!((p.avg_holding_hours.unwrap() - 6.0 * 24.0).abs() < 1e-9);
    }

    #[test]
    fn long_gaps_without_sells_is_holder() {
        let fills = vec![fill("BTC", Side::Buy, 0.1, 60_000.0, 0), fill("BTC", Side::Buy, 0.1, 62_000.0, 24 * 60)];
        let p = compute_spot_profile(&fills, &[holding("BTC", 0.2, 61_000.0)]).unwrap();
        assert_eq!(p.trading_style, TradingStyle::Holder);
        assert!(p.style_inferred);
    }

    #[test]
    fn no_fills_defaults_to_holder_and_flags_it() {
        let p = compute_spot_profile(&[], &[holding("BTC", 1.0, 60_000.0)]).unwrap();
        assert_eq!(p.trading_style, TradingStyle::Holder);
        assert!(!p.style_inferred);
        assert_eq!(p.avg_holding_hours, None);
        assert_eq!(p.trade_frequency, TradeFrequency::Low);
    }

    #[test]
    fn deterministic_regardless_of_input_order() {
        let fills = vec![
            fill("ETH", Side::Buy, 1.0, 3000.0, 0),
            fill("SOL", Side::Buy, 5.0, 150.0, 1),
            fill("ETH", Side::Sell, 0.5, 3200.0, 30),
            fill("SOL", Side::Sell, 5.0, 140.0, 2),
        ];
        let holdings = vec![holding("ETH", 0.5, 3000.0), holding("SOL", 2.0, 150.0), holding("USDC", 900.0, 1.0)];
        let a = compute_spot_profile(&fills, &holdings).unwrap();
        let b = compute_spot_profile(&fills, &holdings).unwrap();
        assert_eq!(a, b);

        let mut rev_fills = fills.clone();
        rev_fills.reverse();
        let mut rev_holdings = holdings.clone();
        rev_holdings.reverse();
        assert_eq!(a, compute_spot_profile(&rev_fills, &rev_holdings).unwrap());
    }

    #[test]
    fn composition_drives_risk_tolerance() {
        // mostly stablecoin + BTC: (1-0.8)*3 + (1-0.2)*2 + 0.68*2 = 3.56 -> moderate
        let p = compute_spot_profile(&[], &[holding("USDC", 8_000.0, 1.0), holding("BTC", 1.0, 2_000.0)]).unwrap();
        assert_eq!(p.risk_tolerance, RiskAppetite::Moderate);

        // spread across stablecoins: 0 + 2 + (1/3)*2
        let safe = compute_spot_profile(&[], &[holding("USDC", 1_000.0, 1.0), holding("USDT", 1_000.0, 1.0), holding("DAI", 1_000.0, 1.0)]).unwrap();
        assert_eq!(safe.risk_tolerance, RiskAppetite::Conservative);

        let alts = compute_spot_profile(&[], &[holding("ARB", 1_000.0, 1.0), holding("SOL", 2.0, 100.0)]).unwrap();
        assert_eq!(alts.risk_tolerance, RiskAppetite::Aggressive);
    }

    #[test]
    fn experience_from_breadth_activity_and_size() {
        let small = compute_spot_profile(&[], &[holding("SOL", 0.5, 100.0)]).unwrap();
        assert_eq!(small.experience_level, ExperienceLevel::Beginner);

        let holdings: Vec<SpotHolding> = ["ARB", "BTC", "ETH", "SOL", "USDC"].iter().map(|a| holding(a, 1.0, 5_000.0)).collect();
        let wide = compute_spot_profile(&[], &holdings).unwrap();
        // 5 assets (2) + low frequency (0) + $25k (3)
        assert_eq!(wide.experience_level, ExperienceLevel::Expert);
    }

    #[test]
    fn preferred_assets_ranked_by_volume() {
        let fills = vec![
            fill("SOL", Side::Buy, 10.0, 100.0, 0),
            fill("ETH", Side::Buy, 1.0, 3000.0, 1),
            fill("ARB", Side::Buy, 100.0, 1.0, 2),
            fill("DOGE", Side::Buy, 100.0, 0.1, 3),
        ];
        let p = compute_spot_profile(&fills, &[holding("ETH", 1.0, 3000.0)]).unwrap();
        assert_eq!(p.preferred_assets, vec!["ETH", "SOL", "ARB"]);
        assert!(p.typical_trade_usd > 0.0);
    }
}
