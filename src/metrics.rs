// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Profiling --------
pub static PROFILES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("profiles_total", "profiles computed (label: kind = spot|perp)"), &["kind"]).unwrap()
});

// -------- Execution --------
pub static ORDERS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("orders_total", "orders by terminal status"), &["status"]).unwrap()
});

pub static SUBMIT_ATTEMPTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("submit_attempts_total", "venue submit calls").unwrap());

pub static SUBMIT_RETRIES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("submit_retries_total", "transient failures scheduled for retry").unwrap());

pub static RECONCILE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reconcile_hits_total", "orders found at the venue after an ambiguous failure").unwrap()
});

// Latency from first submit -> terminal outcome (milliseconds)
pub static SUBMIT_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("submit_latency_ms", "Latency from first submit to terminal outcome (ms)")
            .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0]),
    )
    .unwrap()
});

// Paper venue
pub static VENUE_FILLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("venue_fills_total", "fills recorded by the venue"), &["venue"]).unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; double init is harmless
    for m in [
        REGISTRY.register(Box::new(PROFILES.clone())),
        REGISTRY.register(Box::new(ORDERS.clone())),
        REGISTRY.register(Box::new(SUBMIT_ATTEMPTS.clone())),
        REGISTRY.register(Box::new(SUBMIT_RETRIES.clone())),
        REGISTRY.register(Box::new(RECONCILE_HITS.clone())),
        REGISTRY.register(Box::new(SUBMIT_LATENCY_MS.clone())),
        REGISTRY.register(Box::new(VENUE_FILLS.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// tiny HTTP 1.1 responder: every request gets the metrics page
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Bind and serve on a dedicated OS thread (keeps Tokio runtime clean).
pub fn serve_metrics(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    info!(%addr, "metrics listening on http://{addr}/metrics");

    thread::spawn(move || {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_show_up_in_text_output() {
        init();
        ORDERS.with_label_values(&["filled"]).inc();
        SUBMIT_ATTEMPTS.inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("orders_total"));
        assert!(text.contains("submit_attempts_total"));
    }
}
