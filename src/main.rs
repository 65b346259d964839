// ===============================
// src/main.rs
// ===============================
/*
 # satu run: profil -> adjust -> advisor (file) -> eksekusi di paper venue
 HISTORY_FILE=data/history.json RECOMMENDATIONS_FILE=data/advice.json \
 REPORT_FILE=out/report.jsonl METRICS_PORT=9898 cargo run --release

 # dry run dengan tiket minimum
 TEST_MODE=1 TEST_TRADE_SIZE_USD=15 RUST_LOG=trade_pilot=debug cargo run
*/
/*
=============================================================================
Project : trade_pilot, profile-driven, risk-checked order execution
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Profiles a trader's spot & perp history, merges user preferences,
          takes advisor recommendations, validates & normalizes them against
          venue limits and live books, and submits idempotent orders with
          bounded retry. Exposes Prometheus metrics, records JSONL reports.
=============================================================================
*/
use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trade_pilot::adjuster::adjust_profile;
use trade_pilot::advisor::{FileAdvisor, TradingAdvisor};
use trade_pilot::domain::{ProfileError, TradeHistory};
use trade_pilot::executor::{ExecutionConstraints, TradeExecutor};
use trade_pilot::market::{collect_snapshot, MarketSnapshot, MockMarketData};
use trade_pilot::metrics::{self, PROFILES};
use trade_pilot::recommendation::{parse_value, Candidate};
use trade_pilot::venue::PaperVenue;
use trade_pilot::{config, perp_profiler, recorder, spot_profiler};

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(%e, "run failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    // ---- Load config & limits ----
    let (args, limits, policy) = config::load()?;
    info!(
        min_order_usd = limits.min_order_usd,
        max_order_usd = limits.max_order_usd,
        max_attempts = limits.max_attempts,
        max_in_flight = limits.max_in_flight,
        test_mode = limits.test_trade_size_usd.is_some(),
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = args.metrics_port {
        metrics::serve_metrics(port)?;
    }

    // ---- (a) Profiling ----
    let history: TradeHistory = match &args.history_file {
        Some(path) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
        None => {
            warn!("HISTORY_FILE not set, profiling an empty history");
            TradeHistory::default()
        }
    };

    let spot = match spot_profiler::compute_spot_profile_with(&history.spot_fills, &history.spot_holdings, &policy) {
        Ok(p) => {
            PROFILES.with_label_values(&["spot"]).inc();
            info!("\n{p}");
            Some(p)
        }
        Err(ProfileError::InsufficientData(why)) => {
            warn!(%why, "spot profile skipped");
            None
        }
    };
    let perp = match perp_profiler::compute_perp_profile_with(&history.perp_positions, &policy) {
        Ok(p) => {
            PROFILES.with_label_values(&["perp"]).inc();
            info!("\n{p}");
            Some(p)
        }
        Err(ProfileError::InsufficientData(why)) => {
            warn!(%why, "perp profile skipped");
            None
        }
    };

    // ---- (b) Adjust ----
    let profile = adjust_profile(spot, perp, &args.preferences);
    info!(
        risk = ?profile.risk_tolerance,
        horizon = ?profile.trading_horizon,
        target_return_pct = profile.target_return_pct,
        max_drawdown_pct = profile.max_drawdown_pct,
        markets = ?profile.preferred_markets,
        "trading profile"
    );

    // ---- (c) Advisor ----
    let Some(rec_path) = args.recommendations_file.clone() else {
        warn!("RECOMMENDATIONS_FILE not set, nothing to execute");
        return Ok(());
    };
    let gateway = MockMarketData::new(args.mock_mids.clone(), limits.depth_levels, args.mock_level_usd);
    let advisor_view: Vec<String> = profile.preferred_markets.iter().cloned().collect();
    let advisor_snapshot = collect_snapshot(&gateway, &advisor_view).await;
    let doc = FileAdvisor::new(rec_path).advise(&profile, &advisor_snapshot).await?;
    let batch = parse_value(&doc)?;

    // ---- (d) Execute ----
    // snapshot baru, tepat sebelum eksekusi (staleness dicek per book)
    let mut symbols: BTreeSet<String> = args.mock_mids.iter().map(|(s, _)| s.clone()).collect();
    let rec_assets = batch
        .spot
        .iter()
        .map(|c| match c { Candidate::Valid(r) => Some(r.asset.clone()), Candidate::Invalid { asset, .. } => asset.clone() })
        .chain(batch.perp.iter().map(|c| match c {
            Candidate::Valid(r) => Some(r.asset.clone()),
            Candidate::Invalid { asset, .. } => asset.clone(),
        }));
    symbols.extend(rec_assets.flatten());
    let symbols: Vec<String> = symbols.into_iter().collect();
    let snapshot: MarketSnapshot = collect_snapshot(&gateway, &symbols).await;

    let venue = Arc::new(PaperVenue::new("paper", Duration::from_millis(args.paper_fill_ms)));
    let executor = TradeExecutor::new(venue, limits);

    // Ctrl-C: order yang belum submit dibatalkan, yang sudah jalan ditunggu
    let cancel = executor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received, cancelling pending submissions");
            cancel.cancel();
        }
    });

    let constraints = ExecutionConstraints::from_profile(&profile);
    let report = executor.execute(batch, Some(&snapshot), &constraints).await?;
    info!("\n{report}");

    if let Some(path) = &args.report_file {
        recorder::write_report(path, &report).await?;
    }
    Ok(())
}
