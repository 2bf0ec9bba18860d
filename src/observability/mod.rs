//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! http / registry / protocol / syncproxy
//!     → logging.rs (tracing events, env-filtered, stdout)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout log collection
//!     → GET {metrics_address}/metrics (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Recording metrics without an installed recorder is a no-op, so
//!   library code and tests never need to care whether export is enabled
//! - Metric labels are bounded (endpoint IDs come from config, command
//!   names are folded to a fixed set)

pub mod logging;
pub mod metrics;
