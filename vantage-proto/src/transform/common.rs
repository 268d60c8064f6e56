use crate::proto::common::v1::{any_value, AnyValue, ArrayValue, InstrumentationScope, KeyValue};
use crate::proto::resource::v1::Resource;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds since the unix epoch, saturating at zero for pre-epoch
/// times.
pub fn to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos() as u64
}

impl From<&vantage::InstrumentationScope> for InstrumentationScope {
    fn from(scope: &vantage::InstrumentationScope) -> Self {
        InstrumentationScope {
            name: scope.name().to_owned(),
            version: scope.version().unwrap_or_default().to_owned(),
            attributes: scope.attributes().cloned().map(Into::into).collect(),
            dropped_attributes_count: 0,
        }
    }
}

impl From<vantage::KeyValue> for KeyValue {
    fn from(kv: vantage::KeyValue) -> Self {
        KeyValue {
            key: kv.key.into(),
            value: Some(kv.value.into()),
        }
    }
}

impl From<vantage::Value> for AnyValue {
    fn from(value: vantage::Value) -> Self {
        AnyValue {
            value: Some(match value {
                vantage::Value::Bool(val) => any_value::Value::BoolValue(val),
                vantage::Value::I64(val) => any_value::Value::IntValue(val),
                vantage::Value::F64(val) => any_value::Value::DoubleValue(val),
                vantage::Value::String(val) => any_value::Value::StringValue(val),
                vantage::Value::Array(array) => any_value::Value::ArrayValue(match array {
                    vantage::Array::Bool(vals) => array_into_proto(vals),
                    vantage::Array::I64(vals) => array_into_proto(vals),
                    vantage::Array::F64(vals) => array_into_proto(vals),
                    vantage::Array::String(vals) => array_into_proto(vals),
                }),
            }),
        }
    }
}

fn array_into_proto<T>(vals: Vec<T>) -> ArrayValue
where
    AnyValue: From<T>,
{
    ArrayValue {
        values: vals.into_iter().map(AnyValue::from).collect(),
    }
}

impl From<bool> for AnyValue {
    fn from(val: bool) -> Self {
        AnyValue {
            value: Some(any_value::Value::BoolValue(val)),
        }
    }
}

impl From<i64> for AnyValue {
    fn from(val: i64) -> Self {
        AnyValue {
            value: Some(any_value::Value::IntValue(val)),
        }
    }
}

impl From<f64> for AnyValue {
    fn from(val: f64) -> Self {
        AnyValue {
            value: Some(any_value::Value::DoubleValue(val)),
        }
    }
}

impl From<String> for AnyValue {
    fn from(val: String) -> Self {
        AnyValue {
            value: Some(any_value::Value::StringValue(val)),
        }
    }
}

impl From<&vantage::Resource> for Resource {
    fn from(resource: &vantage::Resource) -> Self {
        Resource {
            attributes: resource
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.as_str().to_owned(),
                    value: Some(value.clone().into()),
                })
                .collect(),
            dropped_attributes_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage::KeyValue as SdkKeyValue;

    #[test]
    fn value_encoding() {
        let proto: AnyValue = vantage::Value::from("text").into();
        assert_eq!(
            proto.value,
            Some(any_value::Value::StringValue("text".to_owned()))
        );

        let proto: AnyValue = vantage::Value::Array(vantage::Array::I64(vec![1, 2])).into();
        let Some(any_value::Value::ArrayValue(array)) = proto.value else {
            panic!("expected array");
        };
        assert_eq!(array.values.len(), 2);
        assert_eq!(array.values[0].value, Some(any_value::Value::IntValue(1)));
    }

    #[test]
    fn resource_attributes_survive() {
        let resource = vantage::Resource::new([SdkKeyValue::new("service.name", "svc")]);
        let proto: Resource = (&resource).into();
        assert_eq!(proto.attributes.len(), 1);
        assert_eq!(proto.attributes[0].key, "service.name");
    }
}
