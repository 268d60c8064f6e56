//! # Meter Provider
//!
//! New [`Meter`] instances are always created through an
//! [`SdkMeterProvider`], which owns the resource, the meter registry and
//! the metric readers.

use crate::error::SdkResult;
use crate::metrics::data::{ResourceMetrics, ScopeMetrics};
use crate::metrics::{Meter, PeriodicExportingMetricReader, Temporality};
use crate::{config, sdk_debug, InstrumentationScope, Resource};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

const DEFAULT_METER_NAME: &str = "rust.vantage/sdk/meter";

/// Creates [`Meter`]s and owns the metric collection pipeline.
#[derive(Clone)]
pub struct SdkMeterProvider {
    inner: Arc<MeterProviderInner>,
}

pub(crate) struct MeterProviderInner {
    resource: Resource,
    meters: Mutex<HashMap<InstrumentationScope, Meter>>,
    readers: Vec<PeriodicExportingMetricReader>,
    is_shutdown: AtomicBool,
    disabled: bool,
}

impl MeterProviderInner {
    /// Collects from every instrument of every meter, annotated with the
    /// provider's resource. Consistency is per instrument: there is no
    /// cross-instrument atomicity.
    pub(crate) fn collect(&self, temporality: Temporality) -> ResourceMetrics {
        let mut scope_metrics = Vec::new();
        if !self.disabled {
            let meters: Vec<Meter> = self
                .meters
                .lock()
                .map(|meters| meters.values().cloned().collect())
                .unwrap_or_default();
            for meter in meters {
                let metrics = meter.collect(temporality);
                if !metrics.is_empty() {
                    scope_metrics.push(ScopeMetrics {
                        scope: meter.scope().clone(),
                        metrics,
                    });
                }
            }
        }
        ResourceMetrics {
            resource: self.resource.clone(),
            scope_metrics,
        }
    }

    fn shutdown(&self) -> SdkResult {
        let mut result = Ok(());
        for reader in &self.readers {
            if let Err(err) = reader.shutdown() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

impl Drop for MeterProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            sdk_debug!(name: "MeterProvider.DroppedWithoutShutdown");
            let _ = self.shutdown();
        }
    }
}

impl fmt::Debug for SdkMeterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkMeterProvider")
            .field("resource", &self.inner.resource)
            .field("readers", &self.inner.readers.len())
            .finish()
    }
}

impl SdkMeterProvider {
    /// Build a provider with custom configuration.
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Returns the meter for the given component name, creating it on
    /// first use.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        let mut name = name.into();
        if name.is_empty() {
            name = Cow::Borrowed(DEFAULT_METER_NAME);
        }
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns the meter for the given scope.
    ///
    /// Meters are stable per `(name, version, schema_url)` tuple: repeated
    /// calls with an equal scope return the same meter and instrument
    /// registry.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        let enabled = !self.inner.disabled;
        self.inner
            .meters
            .lock()
            .map(|mut meters| {
                meters
                    .entry(scope.clone())
                    .or_insert_with(|| Meter::new(scope.clone(), enabled))
                    .clone()
            })
            .unwrap_or_else(|_| Meter::new(scope, enabled))
    }

    /// The resource metrics produced under this provider inherit.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    /// Collects every instrument of every meter right now, without going
    /// through a reader.
    pub fn collect_all_metrics(&self, temporality: Temporality) -> ResourceMetrics {
        self.inner.collect(temporality)
    }

    /// Triggers an immediate collect-and-export on every reader.
    pub fn force_flush(&self) -> SdkResult {
        let mut result = Ok(());
        for reader in &self.inner.readers {
            if let Err(err) = reader.force_flush() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Shuts down every reader after one final collect-and-export.
    ///
    /// The first call performs the shutdown; subsequent calls return
    /// success immediately.
    pub fn shutdown(&self) -> SdkResult {
        if self.inner.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown()
    }
}

/// Configures an [`SdkMeterProvider`].
#[derive(Default)]
pub struct MeterProviderBuilder {
    resource: Option<Resource>,
    readers: Vec<PeriodicExportingMetricReader>,
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("readers", &self.readers.len())
            .finish()
    }
}

impl MeterProviderBuilder {
    /// Overrides the resource.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Adds a periodic reader driving collection into its exporter.
    pub fn with_reader(mut self, reader: PeriodicExportingMetricReader) -> Self {
        self.readers.push(reader);
        self
    }

    /// Builds the provider and starts its readers.
    pub fn build(self) -> SdkMeterProvider {
        let inner = Arc::new(MeterProviderInner {
            resource: self.resource.unwrap_or_default(),
            meters: Mutex::new(HashMap::new()),
            readers: self.readers,
            is_shutdown: AtomicBool::new(false),
            disabled: config::sdk_disabled(),
        });
        let weak: Weak<MeterProviderInner> = Arc::downgrade(&inner);
        for reader in &inner.readers {
            reader.start(weak.clone());
        }
        sdk_debug!(
            name: "MeterProvider.Built",
            readers = inner.readers.len()
        );
        SdkMeterProvider { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{MetricData, MetricValue};
    use crate::KeyValue;

    #[test]
    fn meters_are_stable_per_scope() {
        let provider = SdkMeterProvider::builder().build();
        let a = provider.meter("component");
        let b = provider.meter("component");
        let counter = a.u64_counter("hits").build();
        counter.add(2, &[]);
        counter.add(3, &[]);

        // Both handles observe the same registry.
        let _ = b;
        let collected = provider.collect_all_metrics(Temporality::Cumulative);
        assert_eq!(collected.scope_metrics.len(), 1);
        let metric = &collected.scope_metrics[0].metrics[0];
        assert_eq!(metric.name, "hits");
        let MetricData::Sum(sum) = &metric.data else {
            panic!("expected sum");
        };
        assert_eq!(sum.points[0].value, MetricValue::U64(5));
    }

    #[test]
    fn counter_sum_matches_adds_per_attribute_set() {
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter("sums");
        let counter = meter.u64_counter("requests").build();
        let route_a = [KeyValue::new("route", "a")];
        let route_b = [KeyValue::new("route", "b")];
        for value in [1u64, 2, 3] {
            counter.add(value, &route_a);
        }
        counter.add(10, &route_b);

        let collected = provider.collect_all_metrics(Temporality::Cumulative);
        let MetricData::Sum(sum) = &collected.scope_metrics[0].metrics[0].data else {
            panic!("expected sum");
        };
        let mut by_route: Vec<(String, u64)> = sum
            .points
            .iter()
            .map(|p| {
                let route = p.attributes[0].value.as_str().into_owned();
                let MetricValue::U64(v) = p.value else {
                    panic!("expected u64")
                };
                (route, v)
            })
            .collect();
        by_route.sort();
        assert_eq!(by_route, vec![("a".to_owned(), 6), ("b".to_owned(), 10)]);
    }

    #[test]
    fn negative_f64_counter_add_is_rejected() {
        let provider = SdkMeterProvider::builder().build();
        let counter = provider.meter("guard").f64_counter("work").build();
        assert!(counter.add(1.5, &[]).is_ok());
        assert!(counter.add(-0.5, &[]).is_err());

        let collected = provider.collect_all_metrics(Temporality::Cumulative);
        let MetricData::Sum(sum) = &collected.scope_metrics[0].metrics[0].data else {
            panic!("expected sum");
        };
        assert_eq!(sum.points[0].value, MetricValue::F64(1.5));
    }

    #[test]
    fn invalid_instrument_name_is_not_collected() {
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter("invalid");
        let counter = meter.u64_counter("9starts-with-digit").build();
        counter.add(1, &[]);

        let collected = provider.collect_all_metrics(Temporality::Cumulative);
        assert!(collected.scope_metrics.is_empty());
    }

    #[test]
    fn disabled_sdk_collects_nothing() {
        temp_env::with_var(crate::config::OTEL_SDK_DISABLED, Some("true"), || {
            let provider = SdkMeterProvider::builder().build();
            let counter = provider.meter("off").u64_counter("hits").build();
            counter.add(1, &[]);
            let collected = provider.collect_all_metrics(Temporality::Cumulative);
            assert!(collected.scope_metrics.is_empty());
        });
    }
}
