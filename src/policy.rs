// ===============================
// src/policy.rs
// ===============================
//
// Classification tables used by the profilers and the executor.
// The numbers live here (and in config.rs overrides), never inside the
// statistics code, so each table can be tested and tuned on its own.
//
use crate::domain::{ExperienceLevel, RiskAppetite, TradeFrequency, TradingStyle};

/// Average holding time -> trading style.
#[derive(Debug, Clone, PartialEq)]
pub struct StylePolicy {
    pub scalper_max_hours: f64,
    pub swing_max_hours: f64,
}

impl Default for StylePolicy {
    fn default() -> Self { Self { scalper_max_hours: 24.0, swing_max_hours: 30.0 * 24.0 } }
}

impl StylePolicy {
    /// Returns the style and whether it was inferred from data (`false` = holder fallback).
    pub fn classify(&self, avg_holding_hours: Option<f64>) -> (TradingStyle, bool) {
        match avg_holding_hours {
            Some(h) if h.is_finite() && h < self.scalper_max_hours => (TradingStyle::Scalper, true),
            Some(h) if h.is_finite() && h < self.swing_max_hours => (TradingStyle::Swing, true),
            Some(h) if h.is_finite() => (TradingStyle::Holder, true),
            _ => (TradingStyle::Holder, false),
        }
    }
}

/// Fills per day -> frequency bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyPolicy {
    pub high_per_day: f64,
    pub medium_per_day: f64,
}

impl Default for FrequencyPolicy {
    fn default() -> Self { Self { high_per_day: 3.0, medium_per_day: 0.5 } }
}

impl FrequencyPolicy {
    pub fn classify(&self, per_day: f64) -> TradeFrequency {
        if per_day >= self.high_per_day {
            TradeFrequency::High
        } else if per_day >= self.medium_per_day {
            TradeFrequency::Medium
        } else {
            TradeFrequency::Low
        }
    }
}

/// Leverage mean/stdev -> risk appetite.
#[derive(Debug, Clone, PartialEq)]
pub struct AppetitePolicy {
    pub conservative_below: f64,
    pub moderate_below: f64,
    /// stdev above this bumps the bucket one step up
    pub dispersion_threshold: f64,
}

impl Default for AppetitePolicy {
    fn default() -> Self { Self { conservative_below: 3.0, moderate_below: 10.0, dispersion_threshold: 5.0 } }
}

impl AppetitePolicy {
    pub fn classify(&self, avg_leverage: f64, leverage_volatility: f64) -> RiskAppetite {
        let base = if avg_leverage < self.conservative_below {
            RiskAppetite::Conservative
        } else if avg_leverage < self.moderate_below {
            RiskAppetite::Moderate
        } else {
            RiskAppetite::Aggressive
        };
        if leverage_volatility > self.dispersion_threshold { base.bump() } else { base }
    }
}

/// Closed-position count -> experience level.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperiencePolicy {
    pub beginner_below: usize,
    pub intermediate_below: usize,
}

impl Default for ExperiencePolicy {
    fn default() -> Self { Self { beginner_below: 10, intermediate_below: 100 } }
}

impl ExperiencePolicy {
    pub fn classify(&self, closed_positions: usize) -> ExperienceLevel {
        if closed_positions < self.beginner_below {
            ExperienceLevel::Beginner
        } else if closed_positions < self.intermediate_below {
            ExperienceLevel::Intermediate
        } else {
            ExperienceLevel::Expert
        }
    }
}

/// Portfolio composition -> spot risk tolerance.
///
/// score = (1 - stable) * w_stable + (1 - large_cap) * w_large_cap
///       + concentration * w_concentration (+ bonus on high frequency)
#[derive(Debug, Clone, PartialEq)]
pub struct SpotRiskPolicy {
    pub stablecoin_weight: f64,
    pub large_cap_weight: f64,
    pub concentration_weight: f64,
    pub high_frequency_bonus: f64,
    /// score strictly above -> moderate
    pub moderate_above: f64,
    /// score strictly above -> aggressive
    pub aggressive_above: f64,
}

impl Default for SpotRiskPolicy {
    fn default() -> Self {
        Self {
            stablecoin_weight: 3.0,
            large_cap_weight: 2.0,
            concentration_weight: 2.0,
            high_frequency_bonus: 1.0,
            moderate_above: 3.0,
            aggressive_above: 5.0,
        }
    }
}

impl SpotRiskPolicy {
    pub fn score(&self, stablecoin_ratio: f64, large_cap_ratio: f64, concentration: f64, frequency: TradeFrequency) -> f64 {
        let mut score = (1.0 - stablecoin_ratio) * self.stablecoin_weight
            + (1.0 - large_cap_ratio) * self.large_cap_weight
            + concentration * self.concentration_weight;
        if frequency == TradeFrequency::High {
            score += self.high_frequency_bonus;
        }
        score
    }

    pub fn classify(&self, stablecoin_ratio: f64, large_cap_ratio: f64, concentration: f64, frequency: TradeFrequency) -> RiskAppetite {
        let score = self.score(stablecoin_ratio, large_cap_ratio, concentration, frequency);
        if score > self.aggressive_above {
            RiskAppetite::Aggressive
        } else if score > self.moderate_above {
            RiskAppetite::Moderate
        } else {
            RiskAppetite::Conservative
        }
    }
}

/// Points for breadth, activity and size -> spot experience level.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotExperiencePolicy {
    /// (min asset count, points), highest first
    pub asset_tiers: Vec<(usize, u32)>,
    /// (portfolio value strictly above, points), highest first
    pub value_tiers: Vec<(f64, u32)>,
    pub high_frequency_points: u32,
    pub medium_frequency_points: u32,
    pub intermediate_from: u32,
    pub expert_from: u32,
}

impl Default for SpotExperiencePolicy {
    fn default() -> Self {
        Self {
            asset_tiers: vec![(5, 2), (3, 1)],
            value_tiers: vec![(10_000.0, 3), (1_000.0, 2), (100.0, 1)],
            high_frequency_points: 2,
            medium_frequency_points: 1,
            intermediate_from: 3,
            expert_from: 5,
        }
    }
}

impl SpotExperiencePolicy {
    pub fn points(&self, asset_count: usize, frequency: TradeFrequency, total_value_usd: f64) -> u32 {
        let breadth = self.asset_tiers.iter().find(|(min, _)| asset_count >= *min).map_or(0, |(_, pts)| *pts);
        let activity = match frequency {
            TradeFrequency::High => self.high_frequency_points,
            TradeFrequency::Medium => self.medium_frequency_points,
            TradeFrequency::Low => 0,
        };
        let size = self.value_tiers.iter().find(|(above, _)| total_value_usd > *above).map_or(0, |(_, pts)| *pts);
        breadth + activity + size
    }

    pub fn classify(&self, asset_count: usize, frequency: TradeFrequency, total_value_usd: f64) -> ExperienceLevel {
        let pts = self.points(asset_count, frequency, total_value_usd);
        if pts >= self.expert_from {
            ExperienceLevel::Expert
        } else if pts >= self.intermediate_from {
            ExperienceLevel::Intermediate
        } else {
            ExperienceLevel::Beginner
        }
    }
}

/// Max leverage the executor will allow for a given appetite.
#[derive(Debug, Clone, PartialEq)]
pub struct LeverageCeilings {
    pub conservative: f64,
    pub moderate: f64,
    pub aggressive: f64,
}

impl Default for LeverageCeilings {
    fn default() -> Self { Self { conservative: 3.0, moderate: 10.0, aggressive: 20.0 } }
}

impl LeverageCeilings {
    pub fn ceiling(&self, appetite: RiskAppetite) -> f64 {
        match appetite {
            RiskAppetite::Conservative => self.conservative,
            RiskAppetite::Moderate => self.moderate,
            RiskAppetite::Aggressive => self.aggressive,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePolicy {
    pub style: StylePolicy,
    pub frequency: FrequencyPolicy,
    pub appetite: AppetitePolicy,
    pub experience: ExperiencePolicy,
    pub spot_risk: SpotRiskPolicy,
    pub spot_experience: SpotExperiencePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_buckets_follow_holding_time() {
        let p = StylePolicy::default();
        assert_eq!(p.classify(Some(2.0)), (TradingStyle::Scalper, true));
        assert_eq!(p.classify(Some(24.0)), (TradingStyle::Swing, true));
        assert_eq!(p.classify(Some(29.0 * 24.0)), (TradingStyle::Swing, true));
        assert_eq!(p.classify(Some(30.0 * 24.0)), (TradingStyle::Holder, true));
        assert_eq!(p.classify(None), (TradingStyle::Holder, false));
    }

    #[test]
    fn appetite_thresholds_and_dispersion_bump() {
        let p = AppetitePolicy::default();
        assert_eq!(p.classify(2.0, 0.5), RiskAppetite::Conservative);
        assert_eq!(p.classify(3.0, 0.5), RiskAppetite::Moderate);
        assert_eq!(p.classify(10.0, 0.5), RiskAppetite::Aggressive);
        // high variance -> one bucket riskier
        assert_eq!(p.classify(2.0, 6.0), RiskAppetite::Moderate);
        assert_eq!(p.classify(5.0, 6.0), RiskAppetite::Aggressive);
        assert_eq!(p.classify(15.0, 9.0), RiskAppetite::Aggressive);
    }

    #[test]
    fn tuned_dispersion_threshold_changes_outcome() {
        let p = AppetitePolicy { dispersion_threshold: 1.0, ..AppetitePolicy::default() };
        assert_eq!(p.classify(2.0, 1.5), RiskAppetite::Moderate);
    }

    #[test]
    fn experience_from_closed_count() {
        let p = ExperiencePolicy::default();
        assert_eq!(p.classify(0), ExperienceLevel::Beginner);
        assert_eq!(p.classify(9), ExperienceLevel::Beginner);
        assert_eq!(p.classify(10), ExperienceLevel::Intermediate);
        assert_eq!(p.classify(99), ExperienceLevel::Intermediate);
        assert_eq!(p.classify(100), ExperienceLevel::Expert);
    }

    #[test]
    fn frequency_buckets() {
        let p = FrequencyPolicy::default();
        assert_eq!(p.classify(5.0), TradeFrequency::High);
        assert_eq!(p.classify(0.5), TradeFrequency::Medium);
        assert_eq!(p.classify(0.1), TradeFrequency::Low);
    }

    #[test]
    fn spot_risk_score_boundaries() {
        let p = SpotRiskPolicy::default();
        // all stablecoins, one asset: 0 + 2 + 2 = 4
        assert_eq!(p.classify(1.0, 0.0, 1.0, TradeFrequency::Low), RiskAppetite::Moderate);
        // all BTC: 3 + 0 + 2 = 5, not above 5
        assert_eq!(p.score(0.0, 1.0, 1.0, TradeFrequency::Low), 5.0);
        assert_eq!(p.classify(0.0, 1.0, 1.0, TradeFrequency::Low), RiskAppetite::Moderate);
        assert_eq!(p.classify(0.0, 1.0, 1.0, TradeFrequency::High), RiskAppetite::Aggressive);
        // mostly stable and large cap, spread out: 1.2 + 1.0 + 0.6
        assert_eq!(p.classify(0.6, 0.5, 0.3, TradeFrequency::Medium), RiskAppetite::Conservative);
        assert_eq!(p.classify(0.0, 0.0, 0.2, TradeFrequency::Low), RiskAppetite::Aggressive);
    }

    #[test]
    fn spot_experience_points() {
        let p = SpotExperiencePolicy::default();
        assert_eq!(p.points(1, TradeFrequency::Low, 50.0), 0);
        assert_eq!(p.points(3, TradeFrequency::Medium, 100.0), 2);
        assert_eq!(p.points(5, TradeFrequency::High, 10_000.01), 7);
        assert_eq!(p.classify(1, TradeFrequency::Low, 50.0), ExperienceLevel::Beginner);
        assert_eq!(p.classify(3, TradeFrequency::Low, 5_000.0), ExperienceLevel::Intermediate);
        assert_eq!(p.classify(2, TradeFrequency::High, 20_000.0), ExperienceLevel::Expert);
    }

    #[test]
    fn ceilings_per_appetite() {
        let c = LeverageCeilings::default();
        assert_eq!(c.ceiling(RiskAppetite::Conservative), 3.0);
        assert_eq!(c.ceiling(RiskAppetite::Aggressive), 20.0);
    }
}
