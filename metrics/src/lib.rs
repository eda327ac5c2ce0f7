//! Metric surface for the Casper validator exporter.
//!
//! [`MetricSurface`] owns a Prometheus [`Registry`](prometheus::Registry) of
//! gauges and guarantees that a scrape never observes half of a logical
//! update. [`ValidatorMetrics`] declares the exporter's gauge set on top of
//! it, and [`MetricsServer`] serves the text exposition at `/metrics`.

pub mod error;
pub mod gauges;
pub mod server;
pub mod surface;

pub use error::MetricsError;
pub use gauges::{
    ValidatorMetrics, LABEL_API_VERSION, LABEL_ERA_ID, LABEL_LOCAL_IP, LABEL_NEXT_VERSION,
    LABEL_PUBLIC_IP,
};
pub use server::MetricsServer;
pub use surface::{GaugeHandle, LabelSet, MetricBatch, MetricSurface};
