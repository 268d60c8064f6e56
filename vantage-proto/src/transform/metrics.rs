use crate::proto::collector::metrics::v1::ExportMetricsServiceRequest;
use crate::proto::metrics::v1::{
    metric, number_data_point, AggregationTemporality, Gauge, Histogram, HistogramDataPoint,
    Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
};
use crate::transform::to_nanos;
use vantage::metrics::data;
use vantage::metrics::Temporality;

impl From<Temporality> for AggregationTemporality {
    fn from(temporality: Temporality) -> Self {
        match temporality {
            Temporality::Cumulative => AggregationTemporality::Cumulative,
            Temporality::Delta => AggregationTemporality::Delta,
        }
    }
}

impl From<data::MetricValue> for number_data_point::Value {
    fn from(value: data::MetricValue) -> Self {
        match value {
            data::MetricValue::U64(val) => number_data_point::Value::AsInt(val as i64),
            data::MetricValue::I64(val) => number_data_point::Value::AsInt(val),
            data::MetricValue::F64(val) => number_data_point::Value::AsDouble(val),
        }
    }
}

impl From<data::SumPoint> for NumberDataPoint {
    fn from(point: data::SumPoint) -> Self {
        NumberDataPoint {
            attributes: point.attributes.into_iter().map(Into::into).collect(),
            start_time_unix_nano: to_nanos(point.start_time),
            time_unix_nano: to_nanos(point.time),
            value: Some(point.value.into()),
        }
    }
}

impl From<data::GaugePoint> for NumberDataPoint {
    fn from(point: data::GaugePoint) -> Self {
        NumberDataPoint {
            attributes: point.attributes.into_iter().map(Into::into).collect(),
            start_time_unix_nano: 0,
            time_unix_nano: to_nanos(point.time),
            value: Some(point.value.into()),
        }
    }
}

impl From<data::HistogramPoint> for HistogramDataPoint {
    fn from(point: data::HistogramPoint) -> Self {
        HistogramDataPoint {
            attributes: point.attributes.into_iter().map(Into::into).collect(),
            start_time_unix_nano: to_nanos(point.start_time),
            time_unix_nano: to_nanos(point.time),
            count: point.count,
            sum: Some(point.sum),
            bucket_counts: point.bucket_counts,
            explicit_bounds: point.bounds,
            min: point.min,
            max: point.max,
        }
    }
}

impl From<data::Metric> for Metric {
    fn from(source: data::Metric) -> Self {
        Metric {
            name: source.name.into_owned(),
            description: source.description.into_owned(),
            unit: source.unit.into_owned(),
            data: Some(match source.data {
                data::MetricData::Sum(sum) => metric::Data::Sum(Sum {
                    aggregation_temporality: AggregationTemporality::from(sum.temporality)
                        as i32,
                    is_monotonic: sum.is_monotonic,
                    data_points: sum.points.into_iter().map(Into::into).collect(),
                }),
                data::MetricData::Gauge(gauge) => metric::Data::Gauge(Gauge {
                    data_points: gauge.points.into_iter().map(Into::into).collect(),
                }),
                data::MetricData::Histogram(histogram) => metric::Data::Histogram(Histogram {
                    aggregation_temporality: AggregationTemporality::from(
                        histogram.temporality,
                    ) as i32,
                    data_points: histogram.points.into_iter().map(Into::into).collect(),
                }),
            }),
        }
    }
}

/// Converts one collection cycle into a complete export request.
pub fn resource_metrics_request(metrics: data::ResourceMetrics) -> ExportMetricsServiceRequest {
    let resource = (&metrics.resource).into();
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(resource),
            schema_url: metrics.resource.schema_url().unwrap_or_default().to_owned(),
            scope_metrics: metrics
                .scope_metrics
                .into_iter()
                .map(|scope_metrics| ScopeMetrics {
                    schema_url: scope_metrics
                        .scope
                        .schema_url()
                        .unwrap_or_default()
                        .to_owned(),
                    scope: Some((&scope_metrics.scope).into()),
                    metrics: scope_metrics.metrics.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage::metrics::SdkMeterProvider;
    use vantage::KeyValue;

    #[test]
    fn histogram_point_shape() {
        let provider = SdkMeterProvider::builder().build();
        let histogram = provider
            .meter("transform")
            .u64_histogram("latency")
            .with_boundaries(vec![0.0, 5.0, 10.0, 25.0])
            .build();
        for value in [3, 7, 7, 30] {
            histogram.record(value, &[KeyValue::new("route", "a")]);
        }

        let request =
            resource_metrics_request(provider.collect_all_metrics(Temporality::Cumulative));
        let metric = &request.resource_metrics[0].scope_metrics[0].metrics[0];
        assert_eq!(metric.name, "latency");
        let Some(metric::Data::Histogram(histogram)) = &metric.data else {
            panic!("expected histogram");
        };
        assert_eq!(
            histogram.aggregation_temporality,
            AggregationTemporality::Cumulative as i32
        );
        let point = &histogram.data_points[0];
        assert_eq!(point.count, 4);
        assert_eq!(point.sum, Some(47.0));
        assert_eq!(point.bucket_counts, vec![0, 1, 2, 0, 1]);
        assert_eq!(point.explicit_bounds, vec![0.0, 5.0, 10.0, 25.0]);
        assert_eq!(point.min, Some(3.0));
        assert_eq!(point.max, Some(30.0));
    }

    #[test]
    fn sum_point_value_encoding() {
        let provider = SdkMeterProvider::builder().build();
        let counter = provider.meter("transform").u64_counter("hits").build();
        counter.add(7, &[]);

        let request =
            resource_metrics_request(provider.collect_all_metrics(Temporality::Cumulative));
        let metric = &request.resource_metrics[0].scope_metrics[0].metrics[0];
        let Some(metric::Data::Sum(sum)) = &metric.data else {
            panic!("expected sum");
        };
        assert!(sum.is_monotonic);
        assert_eq!(
            sum.data_points[0].value,
            Some(number_data_point::Value::AsInt(7))
        );
    }
}
