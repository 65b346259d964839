// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder untuk ExecutionReport:
// - satu baris per order, lalu satu baris summary (errors, skipped, strategy)
// - append, supaya beberapa run bisa dikumpulkan di satu file
// - otomatis membuat parent directory jika belum ada
//
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::info;

use crate::domain::{ExecutionReport, OrderStatus};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn lines(report: &ExecutionReport) -> Result<Vec<String>, serde_json::Error> {
    let mut out = Vec::with_capacity(report.orders.len() + 1);
    for order in &report.orders {
        let mut row = serde_json::to_value(order)?;
        if let Value::Object(map) = &mut row {
            map.insert("type".into(), json!("order"));
            map.insert("run_id".into(), json!(report.run_id));
        }
        out.push(row.to_string());
    }
    let summary = json!({
        "type": "summary",
        "run_id": report.run_id,
        "filled": report.count(OrderStatus::Filled),
        "rejected": report.count(OrderStatus::Rejected),
        "failed": report.count(OrderStatus::Failed),
        "errors": report.errors,
        "skipped": report.skipped,
        "overall_strategy": report.overall_strategy,
        "started_at": report.started_at,
        "finished_at": report.finished_at,
    });
    out.push(summary.to_string());
    Ok(out)
}

pub async fn write_report(path: &str, report: &ExecutionReport) -> Result<(), RecorderError> {
    // serialize dulu, supaya file tidak setengah tertulis kalau ada error
    let lines = lines(report)?;

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    let mut writer = BufWriter::new(file);
    for line in &lines {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;

    info!(%path, run_id = %report.run_id, lines = lines.len(), "recorder: report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketKind, Order, OrderSide, SkippedRecommendation};
    use chrono::Utc;

    fn report() -> ExecutionReport {
        ExecutionReport {
            run_id: "r-1".into(),
            orders: vec![Order {
                client_order_id: "0xab".into(),
                market: MarketKind::Spot,
                asset: "ETH".into(),
                side: Some(OrderSide::Buy),
                requested_size_usd: 50.0,
                normalized_size_usd: Some(50.0),
                leverage: None,
                venue_order_id: Some("paper-1".into()),
                status: OrderStatus::Filled,
                reason: None,
                attempts: 1,
            }],
            errors: vec![],
            skipped: vec![SkippedRecommendation { asset: "BTC".into(), reason: "hold".into() }],
            overall_strategy: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_order_plus_summary() {
        let dir = std::env::temp_dir().join(format!("trade_pilot_rec_{}", std::process::id()));
        let path = dir.join("nested").join("report.jsonl");
        let path = path.to_string_lossy().to_string();

        write_report(&path, &report()).await.unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let rows: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["type"], "order");
        assert_eq!(rows[0]["asset"], "ETH");
        assert_eq!(rows[1]["type"], "summary");
        assert_eq!(rows[1]["filled"], 1);
        assert_eq!(rows[1]["skipped"][0]["asset"], "BTC");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
