// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side { Buy, Sell }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction { Long, Short }
impl Direction { pub fn sign(&self) -> i64 { match self { Direction::Long => 1, Direction::Short => -1 } } }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotAction { Buy, Sell, Hold }

// ---- History (input profiler) ----
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotFill { pub asset: String, pub side: Side, pub size: f64, pub price: f64, pub timestamp: DateTime<Utc> }
impl SpotFill { pub fn notional(&self) -> f64 { (self.size * self.price).abs() } }

/// `cost_basis` is the average unit cost; used as price fallback when no fill prices the asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotHolding { pub asset: String, pub quantity: f64, pub cost_basis: f64 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpPosition {
    pub asset: String,
    pub direction: Direction,
    pub size: f64,
    pub entry_price: f64,
    pub leverage: f64,
    pub realized_pnl: f64,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}
impl PerpPosition {
    pub fn is_closed(&self) -> bool { self.closed_at.is_some() }
    pub fn notional(&self) -> f64 { (self.size * self.entry_price).abs() }
}

/// Everything the profilers need, as loaded from a saved account export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeHistory {
    #[serde(default)]
    pub spot_fills: Vec<SpotFill>,
    #[serde(default)]
    pub spot_holdings: Vec<SpotHolding>,
    #[serde(default)]
    pub perp_positions: Vec<PerpPosition>,
}

// ---- Profiles ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingStyle { Scalper, Swing, Holder }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeFrequency { High, Medium, Low }

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskAppetite { Conservative, Moderate, Aggressive }
impl RiskAppetite {
    /// Next-higher bucket; aggressive stays aggressive.
    pub fn bump(self) -> Self {
        match self {
            RiskAppetite::Conservative => RiskAppetite::Moderate,
            RiskAppetite::Moderate | RiskAppetite::Aggressive => RiskAppetite::Aggressive,
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" | "low" | "1" => Some(RiskAppetite::Conservative),
            "moderate" | "medium" | "2" => Some(RiskAppetite::Moderate),
            "aggressive" | "high" | "3" => Some(RiskAppetite::Aggressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel { Beginner, Intermediate, Expert }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionalBias { LongBiased, ShortBiased, Neutral }

/// Profit factor with an explicit sentinel for "no losing trades".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfitFactor { Finite(f64), Infinite }
impl ProfitFactor {
    pub fn as_f64(&self) -> Option<f64> { match self { ProfitFactor::Finite(v) => Some(*v), ProfitFactor::Infinite => None } }
    pub fn is_infinite(&self) -> bool { matches!(self, ProfitFactor::Infinite) }
}
impl fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { ProfitFactor::Finite(v) => write!(f, "{v:.2}"), ProfitFactor::Infinite => write!(f, "inf") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight { pub asset: String, pub weight: f64, pub value_usd: f64 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotProfile {
    pub concentration_index: f64,
    pub dominant_assets: Vec<AssetWeight>,
    pub trading_style: TradingStyle,
    pub diversity_score: f64,
    /// false kalau style tidak bisa diturunkan dari fills (fallback holder)
    pub style_inferred: bool,
    pub avg_holding_hours: Option<f64>,
    pub total_value_usd: f64,
    pub asset_count: usize,
    pub stablecoin_ratio: f64,
    pub large_cap_ratio: f64,
    pub trade_frequency: TradeFrequency,
    pub typical_trade_usd: f64,
    pub size_consistency: f64,
    pub preferred_assets: Vec<String>,
    /// skor komposisi portfolio (stablecoin, large cap, konsentrasi, frekuensi)
    pub risk_tolerance: RiskAppetite,
    pub experience_level: ExperienceLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpProfile {
    pub avg_leverage: f64,
    pub leverage_volatility: f64,
    pub max_leverage: f64,
    pub win_rate: f64,
    pub profit_factor: ProfitFactor,
    pub risk_appetite: RiskAppetite,
    pub experience_level: ExperienceLevel,
    pub closed_positions: usize,
    /// HHI over open position notionals; 0 with nothing open
    pub position_concentration: f64,
    pub avg_position_size: f64,
    /// coefficient of variation of position notionals
    pub size_consistency: f64,
    pub directional_bias: DirectionalBias,
    pub preferred_markets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingHorizon { Short, Medium, Long }
impl TradingHorizon {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "short-term" | "1" => Some(TradingHorizon::Short),
            "medium" | "medium-term" | "2" => Some(TradingHorizon::Medium),
            "long" | "long-term" | "3" => Some(TradingHorizon::Long),
            _ => None,
        }
    }
}

/// User-declared overrides; `None`/empty means "keep what the profilers detected".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub risk_tolerance: Option<RiskAppetite>,
    pub target_return_pct: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub preferred_markets: BTreeSet<String>,
    pub trading_horizon: Option<TradingHorizon>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingProfile {
    pub spot: Option<SpotProfile>,
    pub perp: Option<PerpProfile>,
    pub target_return_pct: f64,
    pub risk_tolerance: RiskAppetite,
    pub preferred_markets: BTreeSet<String>,
    pub trading_horizon: TradingHorizon,
    pub max_drawdown_pct: f64,
    pub notes: Option<String>,
}

// ---- Recommendations (output advisor) ----
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRecommendation { pub asset: String, pub action: SpotAction, pub size_usd: f64, #[serde(default)] pub reasoning: Vec<String> }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpRecommendation { pub asset: String, pub direction: Direction, pub size_usd: f64, pub leverage: f64, #[serde(default)] pub reasoning: Vec<String> }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStrategy {
    #[serde(default)]
    pub risk_assessment: String,
    #[serde(default)]
    pub portfolio_balance: String,
    #[serde(default)]
    pub key_considerations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    #[serde(default)]
    pub spot_recommendations: Vec<SpotRecommendation>,
    #[serde(default)]
    pub perp_recommendations: Vec<PerpRecommendation>,
    #[serde(default)]
    pub overall_strategy: OverallStrategy,
}

// ---- Orders & report ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind { Spot, Perp }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide { Buy, Sell, Long, Short }
impl OrderSide {
    /// Buy/long lifts the asks; sell/short hits the bids.
    pub fn consumes_asks(&self) -> bool { matches!(self, OrderSide::Buy | OrderSide::Long) }
}
impl From<Side> for OrderSide { fn from(s: Side) -> Self { match s { Side::Buy => OrderSide::Buy, Side::Sell => OrderSide::Sell } } }
impl From<Direction> for OrderSide { fn from(d: Direction) -> Self { match d { Direction::Long => OrderSide::Long, Direction::Short => OrderSide::Short } } }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { Pending, Submitted, Filled, Rejected, Failed }
impl OrderStatus {
    pub fn is_terminal(&self) -> bool { matches!(self, OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Failed) }
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Failed => "failed",
        }
    }
}

/// One logical order and its fate. An order the venue accepted but left
/// resting on the book is reported as `Submitted` (not terminal) with the
/// reason "resting at venue".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: String,
    pub market: MarketKind,
    pub asset: String,
    pub side: Option<OrderSide>,
    pub requested_size_usd: f64,
    pub normalized_size_usd: Option<f64>,
    pub leverage: Option<f64>,
    pub venue_order_id: Option<String>,
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind { Validation, Transient, Fatal, Cancelled }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError { pub client_order_id: String, pub asset: String, pub kind: ErrorKind, pub message: String }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecommendation { pub asset: String, pub reason: String }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: String,
    pub orders: Vec<Order>,
    pub errors: Vec<ExecutionError>,
    pub skipped: Vec<SkippedRecommendation>,
    pub overall_strategy: Option<OverallStrategy>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
impl ExecutionReport {
    pub fn count(&self, status: OrderStatus) -> usize { self.orders.iter().filter(|o| o.status == status).count() }
}

// ---- Errors ----
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProfileError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

// ---- Human-readable summaries ----
impl fmt::Display for SpotProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Spot profile")?;
        writeln!(f, "- Risk tolerance: {:?}, experience: {:?}", self.risk_tolerance, self.experience_level)?;
        writeln!(f, "- Trading style: {:?}{}", self.trading_style, if self.style_inferred { "" } else { " (default, no holding data)" })?;
        writeln!(f, "- Portfolio value: ${:.2} across {} assets", self.total_value_usd, self.asset_count)?;
        writeln!(f, "- Concentration: {:.2} (diversity {:.2})", self.concentration_index, self.diversity_score)?;
        writeln!(f, "- Stablecoin ratio: {:.1}%, large cap ratio: {:.1}%", self.stablecoin_ratio * 100.0, self.large_cap_ratio * 100.0)?;
        writeln!(f, "- Trading frequency: {:?}, typical trade ${:.2}", self.trade_frequency, self.typical_trade_usd)?;
        let top: Vec<String> = self.dominant_assets.iter().take(3).map(|a| format!("{} {:.1}%", a.asset, a.weight * 100.0)).collect();
        write!(f, "- Dominant assets: {}", if top.is_empty() { "N/A".to_string() } else { top.join(", ") })
    }
}

impl fmt::Display for PerpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Perp profile")?;
        writeln!(f, "- Risk appetite: {:?}, experience: {:?}", self.risk_appetite, self.experience_level)?;
        writeln!(f, "- Leverage: avg {:.1}x, stdev {:.1}x, max {:.1}x", self.avg_leverage, self.leverage_volatility, self.max_leverage)?;
        writeln!(f, "- Win rate: {:.1}% over {} closed, profit factor {}", self.win_rate * 100.0, self.closed_positions, self.profit_factor)?;
        writeln!(f, "- Position concentration: {:.2}", self.position_concentration)?;
        writeln!(f, "- Position size: avg ${:.2}, consistency {:.2}", self.avg_position_size, self.size_consistency)?;
        writeln!(f, "- Directional bias: {:?}", self.directional_bias)?;
        write!(f, "- Preferred markets: {}", if self.preferred_markets.is_empty() { "N/A".to_string() } else { self.preferred_markets.join(", ") })
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Execution {}: {} filled, {} submitted, {} rejected, {} failed, {} skipped",
            self.run_id,
            self.count(OrderStatus::Filled),
            self.count(OrderStatus::Submitted),
            self.count(OrderStatus::Rejected),
            self.count(OrderStatus::Failed),
            self.skipped.len(),
        )?;
        for o in &self.orders {
            let size = o.normalized_size_usd.unwrap_or(o.requested_size_usd);
            write!(f, "- {:?} {} {} ${:.2}", o.market, o.asset, o.status.label(), size)?;
            if let Some(r) = &o.reason { write!(f, " ({r})")?; }
            writeln!(f)?;
        }
        for s in &self.skipped {
            writeln!(f, "- skip {} ({})", s.asset, s.reason)?;
        }
        Ok(())
    }
}
