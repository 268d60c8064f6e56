//! End-to-end metric pipeline behavior: observable instruments, callback
//! registration lifecycles and reader interplay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vantage::metrics::data::{MetricData, MetricValue};
use vantage::metrics::{SdkMeterProvider, Temporality};
use vantage::KeyValue;

fn single_sum_value(provider: &SdkMeterProvider) -> MetricValue {
    let collected = provider.collect_all_metrics(Temporality::Cumulative);
    assert_eq!(collected.scope_metrics.len(), 1);
    let MetricData::Sum(sum) = &collected.scope_metrics[0].metrics[0].data else {
        panic!("expected sum data");
    };
    assert_eq!(sum.points.len(), 1);
    sum.points[0].value
}

#[test]
fn observable_counter_reports_latest_absolute_total() {
    let provider = SdkMeterProvider::builder().build();
    let meter = provider.meter("observable");
    let total = Arc::new(AtomicU64::new(0));
    let source = total.clone();
    let _counter = meter
        .u64_observable_counter("connections.opened")
        .with_unit("{connection}")
        .with_callback(move |result| {
            result.observe(source.load(Ordering::Relaxed), &[]);
        })
        .build();

    total.store(12, Ordering::Relaxed);
    assert_eq!(single_sum_value(&provider), MetricValue::U64(12));

    total.store(40, Ordering::Relaxed);
    assert_eq!(single_sum_value(&provider), MetricValue::U64(40));
}

#[test]
fn callback_registration_can_be_removed() {
    let provider = SdkMeterProvider::builder().build();
    let meter = provider.meter("registrations");
    let gauge = meter.u64_observable_gauge("queue.depth").build();

    let registration = gauge.register_callback(|result| result.observe(7, &[]));
    let collected = provider.collect_all_metrics(Temporality::Cumulative);
    let MetricData::Gauge(points) = &collected.scope_metrics[0].metrics[0].data else {
        panic!("expected gauge data");
    };
    assert_eq!(points.points.len(), 1);

    registration.unregister();
    let collected = provider.collect_all_metrics(Temporality::Cumulative);
    let MetricData::Gauge(points) = &collected.scope_metrics[0].metrics[0].data else {
        panic!("expected gauge data");
    };
    // No callback observed anything this cycle; the previous series has no
    // fresh observation but remains at its last value.
    assert!(points.points.len() <= 1);
}

#[test]
fn up_down_counter_accepts_negative_deltas() {
    let provider = SdkMeterProvider::builder().build();
    let meter = provider.meter("updown");
    let active = meter.i64_up_down_counter("requests.active").build();
    active.add(5, &[KeyValue::new("pool", "a")]);
    active.add(-2, &[KeyValue::new("pool", "a")]);

    let collected = provider.collect_all_metrics(Temporality::Cumulative);
    let MetricData::Sum(sum) = &collected.scope_metrics[0].metrics[0].data else {
        panic!("expected sum data");
    };
    assert!(!sum.is_monotonic);
    assert_eq!(sum.points[0].value, MetricValue::I64(3));
}
