//! Process-wide set of named, optionally labelled gauges.
//!
//! Writers group related writes into a [`MetricBatch`], which holds the
//! surface's write gate for its lifetime; [`MetricSurface::render`] holds the
//! read gate while it snapshots the registry. A scrape therefore sees either
//! all of a batch or none of it. The gate guard is not `Send`, so a batch
//! cannot be held across an `.await` inside a spawned task.

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::MetricsError;

/// Label name to label value.
pub type LabelSet = BTreeMap<String, String>;

/// Handle to a registered gauge. Cheap to clone.
#[derive(Clone)]
pub struct GaugeHandle {
    name: Arc<str>,
    dimensions: Arc<[String]>,
    kind: GaugeKind,
}

#[derive(Clone)]
enum GaugeKind {
    Plain(Gauge),
    Labeled(GaugeVec),
}

impl GaugeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Order `labels` by this gauge's dimensions.
    fn label_values<'a>(&self, labels: &[(&str, &'a str)]) -> Result<Vec<&'a str>, MetricsError> {
        let mismatch = || MetricsError::LabelMismatch {
            name: self.name.to_string(),
            expected: self.dimensions.to_vec(),
            got: labels.iter().map(|(key, _)| key.to_string()).collect(),
        };
        if labels.len() != self.dimensions.len() {
            return Err(mismatch());
        }
        self.dimensions
            .iter()
            .map(|dimension| {
                labels
                    .iter()
                    .find(|(key, _)| key == dimension)
                    .map(|(_, value)| *value)
                    .ok_or_else(mismatch)
            })
            .collect()
    }

    fn write(&self, labels: &[(&str, &str)], value: f64) -> Result<(), MetricsError> {
        let values = self.label_values(labels)?;
        match &self.kind {
            GaugeKind::Plain(gauge) => gauge.set(value),
            GaugeKind::Labeled(vec) => vec.get_metric_with_label_values(&values)?.set(value),
        }
        Ok(())
    }

    fn clear(&self) {
        if let GaugeKind::Labeled(vec) = &self.kind {
            vec.reset();
        }
    }
}

/// Registry of gauges plus the gate that keeps batches atomic for readers.
pub struct MetricSurface {
    registry: Registry,
    gate: RwLock<()>,
}

impl MetricSurface {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gate: RwLock::new(()),
        }
    }

    /// Register a gauge. Every gauge starts with one point valued zero; for
    /// labelled gauges that point carries empty label values, so the name is
    /// present in the very first scrape.
    ///
    /// Fails with [`MetricsError::DuplicateName`] when `name` is taken.
    pub fn define_gauge(
        &self,
        name: &str,
        help: &str,
        dimensions: &[&str],
    ) -> Result<GaugeHandle, MetricsError> {
        let _gate = self.write_gate();
        let opts = Opts::new(name, help);
        let kind = if dimensions.is_empty() {
            let gauge = Gauge::with_opts(opts)?;
            self.register(name, Box::new(gauge.clone()))?;
            GaugeKind::Plain(gauge)
        } else {
            let vec = GaugeVec::new(opts, dimensions)?;
            self.register(name, Box::new(vec.clone()))?;
            let blanks = vec![""; dimensions.len()];
            vec.get_metric_with_label_values(&blanks)?.set(0.0);
            GaugeKind::Labeled(vec)
        };
        Ok(GaugeHandle {
            name: Arc::from(name),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            kind,
        })
    }

    fn register(
        &self,
        name: &str,
        collector: Box<dyn prometheus::core::Collector>,
    ) -> Result<(), MetricsError> {
        self.registry.register(collector).map_err(|e| match e {
            prometheus::Error::AlreadyReg => MetricsError::DuplicateName(name.to_string()),
            other => MetricsError::Prometheus(other),
        })
    }

    /// Start a logical update. Writes made through the batch become visible
    /// to readers together when it is dropped.
    pub fn batch(&self) -> MetricBatch<'_> {
        MetricBatch {
            _gate: self.write_gate(),
        }
    }

    /// Upsert a single point.
    pub fn set(
        &self,
        handle: &GaugeHandle,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), MetricsError> {
        self.batch().set(handle, labels, value)
    }

    /// Replace every point of `handle` with a single new one.
    pub fn reset_and_set(
        &self,
        handle: &GaugeHandle,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), MetricsError> {
        self.batch().reset_and_set(handle, labels, value)
    }

    /// Encode every registered point in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let families = {
            let _gate = self.read_gate();
            self.registry.gather()
        };
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    /// Current points of one gauge.
    pub fn points(&self, handle: &GaugeHandle) -> Vec<(LabelSet, f64)> {
        let families = {
            let _gate = self.read_gate();
            self.registry.gather()
        };
        families
            .iter()
            .filter(|family| family.get_name() == handle.name())
            .flat_map(|family| family.get_metric())
            .map(|metric| {
                let labels = metric
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect();
                (labels, metric.get_gauge().get_value())
            })
            .collect()
    }

    /// Value of the point with exactly `labels`, if present.
    pub fn value(&self, handle: &GaugeHandle, labels: &[(&str, &str)]) -> Option<f64> {
        let wanted: LabelSet = labels
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.points(handle)
            .into_iter()
            .find(|(labels, _)| *labels == wanted)
            .map(|(_, value)| value)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        // The gate guards no data, so a poisoned lock is still usable.
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// A group of writes applied with no scrape in between.
pub struct MetricBatch<'a> {
    _gate: RwLockWriteGuard<'a, ()>,
}

impl MetricBatch<'_> {
    /// Upsert a point. Other label combinations of the same gauge are kept.
    pub fn set(
        &mut self,
        handle: &GaugeHandle,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), MetricsError> {
        handle.write(labels, value)
    }

    /// Drop every point of `handle`, then insert one. Labels are validated
    /// first, so a rejected call leaves the gauge untouched.
    pub fn reset_and_set(
        &mut self,
        handle: &GaugeHandle,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), MetricsError> {
        handle.label_values(labels)?;
        handle.clear();
        handle.write(labels, value)
    }
}
