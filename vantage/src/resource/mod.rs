//! Representations of entities producing telemetry.
//!
//! A [`Resource`] is an immutable representation of the entity producing
//! telemetry as attributes, e.g. a process producing telemetry running in
//! a container on Kubernetes carries a process name, a pod name, a
//! namespace and possibly a deployment name.
//!
//! Resources are assembled with a [`ResourceBuilder`] from explicit
//! attributes and [`ResourceDetector`]s, and attached to a provider at
//! construction. Every record emitted under that provider inherits it.

mod env;

pub use env::{EnvResourceDetector, SdkProvidedResourceDetector};

use crate::{Key, KeyValue, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// The `service.name` resource attribute key.
pub const SERVICE_NAME: &str = "service.name";

/// An immutable set of attributes identifying the producing entity.
///
/// `merge` favors the incoming resource on key conflicts.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

#[derive(Debug, PartialEq)]
struct ResourceInner {
    attrs: HashMap<Key, Value>,
    schema_url: Option<Cow<'static, str>>,
}

impl Default for Resource {
    /// The default resource: SDK-provided service name plus the
    /// `OTEL_RESOURCE_ATTRIBUTES` and `OTEL_SERVICE_NAME` environment
    /// detectors.
    fn default() -> Self {
        Resource::builder().build()
    }
}

impl Resource {
    /// Creates an empty resource.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: HashMap::new(),
                schema_url: None,
            }),
        }
    }

    /// Creates a resource from the given attributes, without consulting any
    /// detector.
    pub fn new<T: IntoIterator<Item = KeyValue>>(attrs: T) -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: attrs
                    .into_iter()
                    .filter(|kv| !kv.key.as_str().is_empty())
                    .map(|kv| (kv.key, kv.value))
                    .collect(),
                schema_url: None,
            }),
        }
    }

    /// A builder preloaded with the default detectors.
    ///
    /// The SDK-provided detector runs last: it resolves `service.name`
    /// from `OTEL_SERVICE_NAME`, then the `OTEL_RESOURCE_ATTRIBUTES`
    /// entry, then the `unknown_service` fallback, and must win over the
    /// plain environment detector.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource::empty()
                .merge(&EnvResourceDetector::new().detect())
                .merge(&SdkProvidedResourceDetector.detect()),
            schema_url: None,
        }
    }

    /// A builder starting from a completely empty resource.
    pub fn builder_empty() -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource::empty(),
            schema_url: None,
        }
    }

    /// Returns a new resource containing this resource's attributes with
    /// `other`'s attributes applied on top; on key conflict `other` wins.
    /// The schema url follows the same rule.
    pub fn merge(&self, other: &Resource) -> Self {
        if self.is_empty() && other.schema_url().is_none() {
            return Resource {
                inner: Arc::new(ResourceInner {
                    attrs: other.inner.attrs.clone(),
                    schema_url: self.inner.schema_url.clone(),
                }),
            };
        }
        let mut attrs = self.inner.attrs.clone();
        for (key, value) in other.inner.attrs.iter() {
            attrs.insert(key.clone(), value.clone());
        }
        Resource {
            inner: Arc::new(ResourceInner {
                attrs,
                schema_url: other
                    .inner
                    .schema_url
                    .clone()
                    .or_else(|| self.inner.schema_url.clone()),
            }),
        }
    }

    /// Returns the value of the attribute with the given key, if present.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner.attrs.get(key).cloned()
    }

    /// Returns the number of attributes.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Returns true if the resource carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Iterates over the attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.inner.attrs.iter()
    }

    /// The schema url of this resource, if any.
    pub fn schema_url(&self) -> Option<&str> {
        self.inner.schema_url.as_deref()
    }
}

/// An interface for detecting resource attributes from the execution
/// environment.
pub trait ResourceDetector {
    /// Returns the detected resource; detectors that find nothing return an
    /// empty resource rather than failing.
    fn detect(&self) -> Resource;
}

/// Assembles a [`Resource`] from detectors and explicit attributes.
///
/// Later additions win over earlier ones, so explicit attributes override
/// anything a detector found.
#[derive(Debug)]
pub struct ResourceBuilder {
    resource: Resource,
    schema_url: Option<Cow<'static, str>>,
}

impl ResourceBuilder {
    /// Runs `detector` and merges its result on top of the current state.
    pub fn with_detector(mut self, detector: &dyn ResourceDetector) -> Self {
        self.resource = self.resource.merge(&detector.detect());
        self
    }

    /// Adds a single attribute.
    pub fn with_attribute(self, kv: KeyValue) -> Self {
        self.with_attributes([kv])
    }

    /// Adds attributes, overriding existing keys.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attrs: T) -> Self {
        self.resource = self.resource.merge(&Resource::new(attrs));
        self
    }

    /// Sets `service.name`, overriding every other source of it.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_NAME, name.into()))
    }

    /// Sets the schema url of the resulting resource.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Builds the resource.
    pub fn build(self) -> Resource {
        if let Some(schema_url) = self.schema_url {
            Resource {
                inner: Arc::new(ResourceInner {
                    attrs: self.resource.inner.attrs.clone(),
                    schema_url: Some(schema_url),
                }),
            }
        } else {
            self.resource
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_favors_incoming() {
        let base = Resource::new([KeyValue::new("a", "base"), KeyValue::new("b", "base")]);
        let overlay = Resource::new([KeyValue::new("b", "overlay"), KeyValue::new("c", "overlay")]);
        let merged = base.merge(&overlay);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get(&Key::new("a")), Some(Value::from("base")));
        assert_eq!(merged.get(&Key::new("b")), Some(Value::from("overlay")));
    }

    #[test]
    fn explicit_service_name_wins_over_env() {
        temp_env::with_vars(
            [
                ("OTEL_SERVICE_NAME", Some("env-svc")),
                ("OTEL_RESOURCE_ATTRIBUTES", Some("service.name=attr-svc")),
            ],
            || {
                let resource = Resource::builder().with_service_name("explicit").build();
                assert_eq!(
                    resource.get(&Key::new(SERVICE_NAME)),
                    Some(Value::from("explicit"))
                );
            },
        );
    }

    #[test]
    fn env_service_name_wins_over_resource_attributes() {
        temp_env::with_vars(
            [
                ("OTEL_SERVICE_NAME", Some("env-svc")),
                ("OTEL_RESOURCE_ATTRIBUTES", Some("service.name=attr-svc")),
            ],
            || {
                let resource = Resource::builder().build();
                assert_eq!(
                    resource.get(&Key::new(SERVICE_NAME)),
                    Some(Value::from("env-svc"))
                );
            },
        );
    }

    #[test]
    fn unknown_service_fallback() {
        temp_env::with_vars_unset(["OTEL_SERVICE_NAME", "OTEL_RESOURCE_ATTRIBUTES"], || {
            let resource = Resource::default();
            assert_eq!(
                resource.get(&Key::new(SERVICE_NAME)),
                Some(Value::from("unknown_service"))
            );
        });
    }

    #[test]
    fn schema_url() {
        let resource = Resource::builder_empty()
            .with_schema_url("https://opentelemetry.io/schemas/1.23.0")
            .build();
        assert_eq!(
            resource.schema_url(),
            Some("https://opentelemetry.io/schemas/1.23.0")
        );
    }
}
