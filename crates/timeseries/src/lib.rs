//! Time-series writer (C3): batches telemetry points, flushes them to an
//! InfluxDB-compatible line-protocol sink on a size/time trigger, retries
//! failed flushes with backoff, and spills exhausted batches to a bounded
//! on-disk overflow buffer rather than dropping them.

pub mod config;
pub mod error;
pub mod line_protocol;
pub mod overflow;
pub mod sink;
pub mod writer;

pub use config::TimeseriesConfig;
pub use error::TimeseriesError;
pub use overflow::OverflowBuffer;
pub use sink::{HttpLineProtocolSink, TimeseriesSink};
pub use writer::TimeSeriesWriter;
