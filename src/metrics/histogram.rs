use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::MetricsError;

/// A labeled latency histogram with fixed buckets and a fixed label schema
///
/// Cloning is cheap: clones share the same underlying counters, so a clone can
/// be registered with a [`super::MetricRegistry`] while this handle keeps
/// recording observations.
#[derive(Clone)]
pub struct DurationHistogram {
    inner: HistogramVec,
    label_names: Arc<[String]>,
}

impl DurationHistogram {
    /// Create a histogram named `name` whose bucket upper bounds are given in seconds
    pub fn new(
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: Vec<f64>,
    ) -> Result<Self, MetricsError> {
        validate_buckets(&buckets)?;

        let opts = HistogramOpts::new(name, help).buckets(buckets);
        let inner = HistogramVec::new(opts, label_names)?;

        Ok(Self {
            inner,
            label_names: label_names.iter().map(|n| n.to_string()).collect(),
        })
    }

    /// Start a timer carrying a partial label set
    ///
    /// Every key must belong to the schema; the remaining keys are supplied to
    /// [`Timer::stop`].
    pub fn start_timer(&self, partial_labels: &[(&str, &str)]) -> Result<Timer, MetricsError> {
        let mut labels = HashMap::with_capacity(self.label_names.len());
        for (key, value) in partial_labels {
            if !self.label_names.iter().any(|n| n == key) {
                return Err(self.mismatch(partial_labels.iter().map(|(k, _)| *k)));
            }
            labels.insert(key.to_string(), value.to_string());
        }

        Ok(Timer {
            histogram: self.clone(),
            labels,
            start: Instant::now(),
            stopped: false,
        })
    }

    /// Record an observation for a complete label set
    pub fn observe(&self, labels: &HashMap<String, String>, elapsed: Duration) -> Result<(), MetricsError> {
        let values = self.values_in_schema_order(labels)?;
        self.inner
            .get_metric_with_label_values(&values)?
            .observe(elapsed.as_secs_f64());
        Ok(())
    }

    /// Current state of one label combination, or `None` if it was never observed
    pub fn snapshot(&self, labels: &[(&str, &str)]) -> Option<HistogramSnapshot> {
        let families = self.inner.collect();
        let metric = families.iter().flat_map(|f| f.get_metric()).find(|m| {
            let pairs = m.get_label();
            pairs.len() == labels.len()
                && labels.iter().all(|(key, value)| {
                    pairs
                        .iter()
                        .any(|p| p.get_name() == *key && p.get_value() == *value)
                })
        })?;

        let histogram = metric.get_histogram();
        Some(HistogramSnapshot {
            count: histogram.get_sample_count(),
            sum_seconds: histogram.get_sample_sum(),
            buckets: histogram
                .get_bucket()
                .iter()
                .map(|b| (b.get_upper_bound(), b.get_cumulative_count()))
                .collect(),
        })
    }

    /// Total observations across every label combination
    pub fn observation_count(&self) -> u64 {
        self.inner
            .collect()
            .iter()
            .flat_map(|f| f.get_metric())
            .map(|m| m.get_histogram().get_sample_count())
            .sum()
    }

    fn values_in_schema_order<'a>(
        &self,
        labels: &'a HashMap<String, String>,
    ) -> Result<Vec<&'a str>, MetricsError> {
        let mismatch = || self.mismatch(labels.keys().map(String::as_str));

        if labels.len() != self.label_names.len() {
            return Err(mismatch());
        }
        self.label_names
            .iter()
            .map(|name| labels.get(name).map(String::as_str))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(mismatch)
    }

    fn mismatch<'a>(&self, found: impl Iterator<Item = &'a str>) -> MetricsError {
        let mut found: Vec<&str> = found.collect();
        found.sort_unstable();
        MetricsError::LabelSchemaMismatch {
            expected: self.label_names.join(","),
            found: found.join(","),
        }
    }
}

impl Collector for DurationHistogram {
    fn desc(&self) -> Vec<&Desc> {
        self.inner.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.inner.collect()
    }
}

fn validate_buckets(buckets: &[f64]) -> Result<(), MetricsError> {
    if buckets.is_empty() {
        return Err(MetricsError::InvalidBuckets("no bucket bounds given".to_string()));
    }
    if let Some(bound) = buckets.iter().find(|b| !b.is_finite()) {
        return Err(MetricsError::InvalidBuckets(format!("bound {} is not finite", bound)));
    }
    if let Some(pair) = buckets.windows(2).find(|w| w[0] >= w[1]) {
        return Err(MetricsError::InvalidBuckets(format!(
            "bounds must increase strictly, got {} then {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Cumulative state of a single label combination
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_seconds: f64,
    /// `(upper bound, cumulative count)`, excluding `+Inf` (which equals `count`)
    pub buckets: Vec<(f64, u64)>,
}

/// A running measurement started by [`DurationHistogram::start_timer`]
///
/// Uses the monotonic clock. Dropping an unstopped timer records nothing.
pub struct Timer {
    histogram: DurationHistogram,
    labels: HashMap<String, String>,
    start: Instant,
    stopped: bool,
}

impl Timer {
    /// Complete the label set and record the elapsed time
    ///
    /// Fails with [`MetricsError::TimerAlreadyStopped`] on a second call; a
    /// failed schema check leaves the timer running so it can be stopped again.
    pub fn stop(&mut self, remaining_labels: &[(&str, &str)]) -> Result<Duration, MetricsError> {
        if self.stopped {
            return Err(MetricsError::TimerAlreadyStopped);
        }

        let mut labels = self.labels.clone();
        for (key, value) in remaining_labels {
            labels.insert(key.to_string(), value.to_string());
        }

        let elapsed = self.start.elapsed();
        self.histogram.observe(&labels, elapsed)?;
        self.stopped = true;

        Ok(elapsed)
    }

    #[cfg(test)]
    fn is_stopped(&self) -> bool {
        self.stopped
    }
}
