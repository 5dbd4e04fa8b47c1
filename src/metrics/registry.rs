use prometheus::core::Collector;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::collections::BTreeSet;
use std::sync::Mutex;

use super::MetricsError;

/// Name of the build information gauge registered by [`MetricRegistry::collect_defaults`]
pub const BUILD_INFO_METRIC: &str = "obligato_server_info";

/// Collection of every metric instrument exposed on `/metrics`
///
/// Constructed once at startup and shared behind an `Arc`; tests build a fresh
/// registry each so observations never leak between them.
pub struct MetricRegistry {
    inner: Registry,
    names: Mutex<BTreeSet<String>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
            names: Mutex::new(BTreeSet::new()),
        }
    }

    /// Add an instrument; fails if any of its metric names is already taken
    pub fn register<C>(&self, instrument: C) -> Result<(), MetricsError>
    where
        C: Collector + 'static,
    {
        let candidate: Vec<String> = instrument
            .desc()
            .iter()
            .map(|desc| desc.fq_name.clone())
            .collect();

        let mut names = self.names.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(taken) = candidate.iter().find(|name| names.contains(*name)) {
            return Err(MetricsError::DuplicateName(taken.clone()));
        }

        self.inner.register(Box::new(instrument))?;
        names.extend(candidate);

        tracing::debug!(metrics = ?names, "Metric instrument registered");
        Ok(())
    }

    /// Register the process gauges and the build information gauge
    pub fn collect_defaults(&self) -> Result<(), MetricsError> {
        let build_info = IntGaugeVec::new(
            Opts::new(BUILD_INFO_METRIC, "Server version and build information"),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);
        self.register(build_info)?;

        #[cfg(target_os = "linux")]
        self.register(prometheus::process_collector::ProcessCollector::for_self())?;

        Ok(())
    }

    /// Render every instrument in the Prometheus text exposition format
    pub fn exposition(&self) -> Result<String, MetricsError> {
        let families = self.inner.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Content type matching [`MetricRegistry::exposition`]
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Names of every registered metric, sorted
    #[cfg(test)]
    fn metric_names(&self) -> Vec<String> {
        self.names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
