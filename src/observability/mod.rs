//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → instrument.rs (begin/end events, status and byte accounting)
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured key-value events for machine parsing
//! - Request ID from the server layer flows into every event
//! - Instrumentation never alters response bytes

pub mod instrument;
pub mod logging;
pub mod metrics;
