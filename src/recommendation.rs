// ===============================
// src/recommendation.rs
// ===============================
//
// Advisor output is untrusted. Each entry is parsed on its own into either a
// fully-typed recommendation or the list of reasons it was refused, so one
// malformed entry never poisons the rest of the batch.
//
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Direction, OverallStrategy, PerpRecommendation, RecommendationSet, SpotAction, SpotRecommendation};
use crate::risk::ValidationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Candidate<T> {
    Valid(T),
    Invalid { asset: Option<String>, errors: Vec<ValidationError> },
}

impl<T> Candidate<T> {
    pub fn is_valid(&self) -> bool { matches!(self, Candidate::Valid(_)) }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationBatch {
    pub spot: Vec<Candidate<SpotRecommendation>>,
    pub perp: Vec<Candidate<PerpRecommendation>>,
    pub overall_strategy: Option<OverallStrategy>,
}

impl From<RecommendationSet> for RecommendationBatch {
    fn from(set: RecommendationSet) -> Self {
        Self {
            spot: set.spot_recommendations.into_iter().map(Candidate::Valid).collect(),
            perp: set.perp_recommendations.into_iter().map(Candidate::Valid).collect(),
            overall_strategy: Some(set.overall_strategy),
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("recommendation document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("recommendation document must be a JSON object")]
    NotObject,
    #[error("`{0}` must be an array")]
    NotArray(&'static str),
}

pub fn parse_document(text: &str) -> Result<RecommendationBatch, DocumentError> {
    let doc: Value = serde_json::from_str(text)?;
    parse_value(&doc)
}

pub fn parse_value(doc: &Value) -> Result<RecommendationBatch, DocumentError> {
    let obj = doc.as_object().ok_or(DocumentError::NotObject)?;
    let spot = entries(obj, "spot_recommendations")?.iter().map(parse_spot).collect();
    let perp = entries(obj, "perp_recommendations")?.iter().map(parse_perp).collect();
    let overall_strategy = obj.get("overall_strategy").and_then(|v| serde_json::from_value(v.clone()).ok());
    Ok(RecommendationBatch { spot, perp, overall_strategy })
}

fn entries<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<&'a [Value], DocumentError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(xs)) => Ok(xs.as_slice()),
        Some(_) => Err(DocumentError::NotArray(key)),
    }
}

/// Collects every problem with an entry instead of stopping at the first.
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    errors: Vec<ValidationError>,
}

impl<'a> Fields<'a> {
    fn asset(&mut self) -> Option<String> {
        match self.obj.get("asset") {
            None | Some(Value::Null) => { self.errors.push(ValidationError::MissingField("asset")); None }
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_ascii_uppercase()),
            Some(other) => {
                self.errors.push(ValidationError::InvalidField { field: "asset", detail: format!("expected symbol, got {other}") });
                None
            }
        }
    }

    fn keyword(&mut self, field: &'static str) -> Option<String> {
        match self.obj.get(field) {
            None | Some(Value::Null) => { self.errors.push(ValidationError::MissingField(field)); None }
            Some(Value::String(s)) => Some(s.trim().to_ascii_lowercase()),
            Some(other) => {
                self.errors.push(ValidationError::InvalidField { field, detail: format!("expected string, got {other}") });
                None
            }
        }
    }

    fn number(&mut self, field: &'static str) -> Option<f64> {
        match self.obj.get(field) {
            None | Some(Value::Null) => { self.errors.push(ValidationError::MissingField(field)); None }
            Some(v) => match v.as_f64().filter(|x| x.is_finite()) {
                Some(x) => Some(x),
                None => {
                    self.errors.push(ValidationError::InvalidField { field, detail: format!("expected number, got {v}") });
                    None
                }
            },
        }
    }

    fn size_usd(&mut self) -> Option<f64> {
        let size = self.number("size_usd")?;
        if size < 0.0 {
            self.errors.push(ValidationError::NegativeSize(size));
            return None;
        }
        Some(size)
    }

    fn reasoning(&mut self) -> Vec<String> {
        match self.obj.get("reasoning") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(xs)) if xs.iter().all(Value::is_string) => {
                xs.iter().filter_map(|x| x.as_str().map(str::to_string)).collect()
            }
            Some(_) => {
                self.errors.push(ValidationError::InvalidField { field: "reasoning", detail: "expected list of strings".into() });
                Vec::new()
            }
        }
    }
}

fn parse_spot(v: &Value) -> Candidate<SpotRecommendation> {
    let Some(obj) = v.as_object() else {
        return Candidate::Invalid { asset: None, errors: vec![ValidationError::NotAnObject] };
    };
    let mut f = Fields { obj, errors: Vec::new() };
    let asset = f.asset();
    let action = f.keyword("action").and_then(|a| match a.as_str() {
        "buy" => Some(SpotAction::Buy),
        "sell" => Some(SpotAction::Sell),
        "hold" => Some(SpotAction::Hold),
        other => {
            f.errors.push(ValidationError::InvalidField { field: "action", detail: format!("expected buy/sell/hold, got {other:?}") });
            None
        }
    });
    let size_usd = f.size_usd();
    let reasoning = f.reasoning();

    match (asset, action, size_usd) {
        (Some(asset), Some(action), Some(size_usd)) if f.errors.is_empty() => {
            Candidate::Valid(SpotRecommendation { asset, action, size_usd, reasoning })
        }
        (asset, ..) => Candidate::Invalid { asset, errors: f.errors },
    }
}

fn parse_perp(v: &Value) -> Candidate<PerpRecommendation> {
    let Some(obj) = v.as_object() else {
        return Candidate::Invalid { asset: None, errors: vec![ValidationError::NotAnObject] };
    };
    let mut f = Fields { obj, errors: Vec::new() };
    let asset = f.asset();
    let direction = f.keyword("direction").and_then(|d| match d.as_str() {
        "long" => Some(Direction::Long),
        "short" => Some(Direction::Short),
        other => {
            f.errors.push(ValidationError::InvalidField { field: "direction", detail: format!("expected long/short, got {other:?}") });
            None
        }
    });
    let size_usd = f.size_usd();
    let leverage = f.number("leverage").and_then(|l| {
        if l < 1.0 {
            f.errors.push(ValidationError::LeverageBelowOne(l));
            None
        } else {
            Some(l)
        }
    });
    let reasoning = f.reasoning();

    match (asset, direction, size_usd, leverage) {
        (Some(asset), Some(direction), Some(size_usd), Some(leverage)) if f.errors.is_empty() => {
            Candidate::Valid(PerpRecommendation { asset, direction, size_usd, leverage, reasoning })
        }
        (asset, ..) => Candidate::Invalid { asset, errors: f.errors },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_document() {
        let doc = json!({
            "spot_recommendations": [
                {"asset": "eth", "action": "BUY", "size_usd": 50.0, "reasoning": ["trend"]},
                {"asset": "BTC", "action": "hold", "size_usd": 0, "reasoning": []}
            ],
            "perp_recommendations": [
                {"asset": "SOL", "direction": "short", "size_usd": 40, "leverage": 3, "reasoning": ["funding"]}
            ],
            "overall_strategy": {"risk_assessment": "moderate", "portfolio_balance": "60/40", "key_considerations": ["vol"]}
        });
        let b = parse_value(&doc).unwrap();
        assert_eq!(b.spot.len(), 2);
        assert_eq!(
            b.spot[0],
            Candidate::Valid(SpotRecommendation { asset: "ETH".into(), action: SpotAction::Buy, size_usd: 50.0, reasoning: vec!["trend".into()] })
        );
        match &b.perp[0] {
            Candidate::Valid(p) => {
                assert_eq!(p.direction, Direction::Short);
                assert_eq!(p.leverage, 3.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(b.overall_strategy.unwrap().portfolio_balance, "60/40");
    }

    #[test]
    fn bad_entries_are_isolated_with_all_reasons() {
        let doc = json!({
            "spot_recommendations": [
                {"asset": "ETH", "size_usd": -5},
                "not an object",
                {"asset": "SOL", "action": "buy", "size_usd": 20}
            ],
            "perp_recommendations": [
                {"asset": "BTC", "direction": "sideways", "size_usd": "lots", "leverage": 0.5}
            ]
        });
        let b = parse_value(&doc).unwrap();
        match &b.spot[0] {
            Candidate::Invalid { asset, errors } => {
                assert_eq!(asset.as_deref(), Some("ETH"));
                assert!(errors.contains(&ValidationError::MissingField("action")));
                assert!(errors.contains(&ValidationError::NegativeSize(-5.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&b.spot[1], Candidate::Invalid { asset: None, .. }));
        assert!(b.spot[2].is_valid());
        match &b.perp[0] {
            Candidate::Invalid { errors, .. } => assert_eq!(errors.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_lists_mean_empty_batch() {
        let b = parse_document("{}").unwrap();
        assert!(b.spot.is_empty() && b.perp.is_empty());
        assert!(b.overall_strategy.is_none());
    }

    #[test]
    fn document_level_errors() {
        assert!(matches!(parse_document("[1,2]"), Err(DocumentError::NotObject)));
        assert!(matches!(parse_document("{\"spot_recommendations\": 3}"), Err(DocumentError::NotArray("spot_recommendations"))));
        assert!(matches!(parse_document("nope"), Err(DocumentError::Json(_))));
    }

    #[test]
    fn typed_set_converts_to_valid_candidates() {
        let set = RecommendationSet {
            spot_recommendations: vec![SpotRecommendation { asset: "ETH".into(), action: SpotAction::Sell, size_usd: 20.0, reasoning: vec![] }],
            ..Default::default()
        };
        let b = RecommendationBatch::from(set);
        assert!(b.spot[0].is_valid());
        assert!(b.overall_strategy.is_some());
    }
}
