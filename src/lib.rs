// ===============================
// src/lib.rs
// ===============================
pub mod domain;
pub mod config;
pub mod policy;
pub mod metrics;
pub mod recorder;

// profiling (pure)
pub mod spot_profiler;
pub mod perp_profiler;
pub mod adjuster;

// advisor & untrusted recommendations
pub mod advisor;
pub mod recommendation;

// execution
pub mod market;
pub mod venue;
pub mod risk;
pub mod submit;
pub mod executor;
