// ===============================
// src/adjuster.rs
// ===============================
use std::collections::BTreeSet;

use crate::domain::{RiskAppetite, SpotProfile, PerpProfile, TradingHorizon, TradingProfile, TradingStyle, UserPreferences};

pub const DEFAULT_TARGET_RETURN_PCT: f64 = 50.0;
pub const DEFAULT_MAX_DRAWDOWN_PCT: f64 = 20.0;

/// Merge detected profiles with user overrides. Preferences always win;
/// anything left unset falls back to what the profilers saw.
/// Risk: preference, then perp appetite, then spot tolerance.
pub fn adjust_profile(spot: Option<SpotProfile>, perp: Option<PerpProfile>, prefs: &UserPreferences) -> TradingProfile {
    let risk_tolerance = prefs
        .risk_tolerance
        .or_else(|| perp.as_ref().map(|p| p.risk_appetite))
        .or_else(|| spot.as_ref().map(|s| s.risk_tolerance))
        .unwrap_or(RiskAppetite::Conservative);

    let trading_horizon = prefs.trading_horizon.unwrap_or_else(|| match spot.as_ref().map(|s| s.trading_style) {
        Some(TradingStyle::Scalper) => TradingHorizon::Short,
        Some(TradingStyle::Holder) => TradingHorizon::Long,
        Some(TradingStyle::Swing) | None => TradingHorizon::Medium,
    });

    let preferred_markets: BTreeSet<String> = if !prefs.preferred_markets.is_empty() {
        prefs.preferred_markets.iter().map(|m| m.trim().to_ascii_uppercase()).filter(|m| !m.is_empty()).collect()
    } else {
        spot.iter()
            .flat_map(|s| s.preferred_assets.iter())
            .chain(perp.iter().flat_map(|p| p.preferred_markets.iter()))
            .cloned()
            .collect()
    };

    TradingProfile {
        target_return_pct: prefs.target_return_pct.unwrap_or(DEFAULT_TARGET_RETURN_PCT),
        max_drawdown_pct: prefs.max_drawdown_pct.unwrap_or(DEFAULT_MAX_DRAWDOWN_PCT),
        notes: prefs.notes.clone(),
        spot,
        perp,
        risk_tolerance,
        preferred_markets,
        trading_horizon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DirectionalBias, ExperienceLevel, ProfitFactor, SpotHolding};
    use crate::spot_profiler::compute_spot_profile;

    fn perp(appetite: RiskAppetite) -> PerpProfile {
        PerpProfile {
            avg_leverage: 5.0,
            leverage_volatility: 1.0,
            max_leverage: 8.0,
            win_rate: 0.6,
            profit_factor: ProfitFactor::Finite(1.4),
            risk_appetite: appetite,
            experience_level: ExperienceLevel::Intermediate,
            closed_positions: 20,
            position_concentration: 0.5,
            avg_position_size: 250.0,
            size_consistency: 0.3,
            directional_bias: DirectionalBias::Neutral,
            preferred_markets: vec!["ETH".into(), "SOL".into()],
        }
    }

    #[test]
    fn detected_values_used_when_no_overrides() {
        let t = adjust_profile(None, Some(perp(RiskAppetite::Moderate)), &UserPreferences::default());
        assert_eq!(t.risk_tolerance, RiskAppetite::Moderate);
        assert_eq!(t.trading_horizon, TradingHorizon::Medium);
        assert_eq!(t.target_return_pct, DEFAULT_TARGET_RETURN_PCT);
        assert!(t.preferred_markets.contains("SOL"));
    }

    #[test]
    fn overrides_win() {
        let prefs = UserPreferences {
            risk_tolerance: Some(RiskAppetite::Conservative),
            target_return_pct: Some(12.0),
            preferred_markets: [" btc ".to_string()].into_iter().collect(),
            trading_horizon: Some(TradingHorizon::Long),
            ..Default::default()
        };
        let t = adjust_profile(None, Some(perp(RiskAppetite::Aggressive)), &prefs);
        assert_eq!(t.risk_tolerance, RiskAppetite::Conservative);
        assert_eq!(t.target_return_pct, 12.0);
        assert_eq!(t.preferred_markets.iter().collect::<Vec<_>>(), vec!["BTC"]);
        assert_eq!(t.trading_horizon, TradingHorizon::Long);
    }

    fn spot(tolerance: RiskAppetite) -> SpotProfile {
        let holding = SpotHolding { asset: "SOL".into(), quantity: 10.0, cost_basis: 100.0 };
        SpotProfile { risk_tolerance: tolerance, ..compute_spot_profile(&[], &[holding]).unwrap() }
    }

    #[test]
    fn spot_tolerance_used_without_perp() {
        let t = adjust_profile(Some(spot(RiskAppetite::Aggressive)), None, &UserPreferences::default());
        assert_eq!(t.risk_tolerance, RiskAppetite::Aggressive);
        assert_eq!(t.trading_horizon, TradingHorizon::Long);

        // perp appetite still comes first
        let t = adjust_profile(Some(spot(RiskAppetite::Aggressive)), Some(perp(RiskAppetite::Moderate)), &UserPreferences::default());
        assert_eq!(t.risk_tolerance, RiskAppetite::Moderate);
    }

    #[test]
    fn nothing_known_is_conservative() {
        let t = adjust_profile(None, None, &UserPreferences::default());
        assert_eq!(t.risk_tolerance, RiskAppetite::Conservative);
        assert!(t.preferred_markets.is_empty());
    }
}
