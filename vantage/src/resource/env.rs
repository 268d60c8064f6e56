//! Environment variable resource detectors.

use crate::resource::{Resource, ResourceDetector, SERVICE_NAME};
use crate::{config, Key, KeyValue, Value};

const OTEL_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

/// Reads resource attributes from the `OTEL_RESOURCE_ATTRIBUTES`
/// configuration key, formatted as `key1=value1,key2=value2,...`.
#[derive(Debug, Default)]
pub struct EnvResourceDetector {
    _private: (),
}

impl EnvResourceDetector {
    /// Create a new environment detector.
    pub fn new() -> Self {
        EnvResourceDetector { _private: () }
    }
}

impl ResourceDetector for EnvResourceDetector {
    fn detect(&self) -> Resource {
        match config::get(OTEL_RESOURCE_ATTRIBUTES) {
            Some(value) if !value.is_empty() => parse_resource_attributes(&value),
            _ => Resource::empty(),
        }
    }
}

fn parse_resource_attributes(s: &str) -> Resource {
    Resource::new(s.split_terminator(',').filter_map(|entry| {
        let (key, value) = entry.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(KeyValue::new(key.to_owned(), value.trim().to_owned()))
    }))
}

/// Provides the attributes the SDK itself must supply, currently only
/// `service.name`.
///
/// Resolution order: `OTEL_SERVICE_NAME`, then a `service.name` entry in
/// `OTEL_RESOURCE_ATTRIBUTES`, then the literal `unknown_service`.
#[derive(Debug)]
pub struct SdkProvidedResourceDetector;

impl ResourceDetector for SdkProvidedResourceDetector {
    fn detect(&self) -> Resource {
        let service_name = config::get(OTEL_SERVICE_NAME)
            .filter(|name| !name.is_empty())
            .map(Value::from)
            .or_else(|| {
                EnvResourceDetector::new()
                    .detect()
                    .get(&Key::new(SERVICE_NAME))
            })
            .unwrap_or_else(|| Value::from("unknown_service"));
        Resource::new([KeyValue::new(SERVICE_NAME, service_name)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attribute_list() {
        temp_env::with_var(
            OTEL_RESOURCE_ATTRIBUTES,
            Some("key=value, k = v , a= x, base64=SGVsbG8sIFdvcmxkIQ=="),
            || {
                let resource = EnvResourceDetector::new().detect();
                assert_eq!(resource.get(&Key::new("key")), Some(Value::from("value")));
                assert_eq!(resource.get(&Key::new("k")), Some(Value::from("v")));
                assert_eq!(resource.get(&Key::new("a")), Some(Value::from("x")));
                // Values may themselves contain `=`; only the first splits.
                assert_eq!(
                    resource.get(&Key::new("base64")),
                    Some(Value::from("SGVsbG8sIFdvcmxkIQ=="))
                );
            },
        );
    }

    #[test]
    fn empty_when_unset() {
        temp_env::with_var_unset(OTEL_RESOURCE_ATTRIBUTES, || {
            assert!(EnvResourceDetector::new().detect().is_empty());
        });
    }

    #[test]
    fn sdk_provided_service_name() {
        temp_env::with_vars_unset([OTEL_SERVICE_NAME, OTEL_RESOURCE_ATTRIBUTES], || {
            let resource = SdkProvidedResourceDetector.detect();
            assert_eq!(
                resource.get(&Key::new(SERVICE_NAME)),
                Some(Value::from("unknown_service")),
            );
        });

        temp_env::with_var(OTEL_SERVICE_NAME, Some("checkout"), || {
            let resource = SdkProvidedResourceDetector.detect();
            assert_eq!(
                resource.get(&Key::new(SERVICE_NAME)),
                Some(Value::from("checkout")),
            );
        });
    }
}
