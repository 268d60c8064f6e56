//! Tracer provider configuration: sampler, id generator, limits, resource.

use crate::config;
use crate::sdk_warn;
use crate::trace::{
    IdGenerator, RandomIdGenerator, Sampler, ShouldSample, SpanLimits,
};
use crate::Resource;
use std::fmt;

const OTEL_TRACES_SAMPLER: &str = "OTEL_TRACES_SAMPLER";
const OTEL_TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";

/// Tracer configuration, owned by the provider and shared by its tracers.
#[non_exhaustive]
pub struct Config {
    /// The sampler consulted for every new span.
    pub sampler: Box<dyn ShouldSample>,

    /// The generator for trace and span ids.
    pub id_generator: Box<dyn IdGenerator>,

    /// Bounds on the data recorded per span.
    pub span_limits: SpanLimits,

    /// The resource attached to every span produced under this provider.
    pub resource: Resource,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sampler", &self.sampler.description())
            .field("id_generator", &self.id_generator)
            .field("span_limits", &self.span_limits)
            .field("resource", &self.resource)
            .finish()
    }
}

impl Default for Config {
    /// Builds a config honoring `OTEL_TRACES_SAMPLER` and
    /// `OTEL_TRACES_SAMPLER_ARG`; unknown sampler names fall back to
    /// `parentbased_always_on` with a diagnostic.
    fn default() -> Self {
        let sampler = match config::get(OTEL_TRACES_SAMPLER).as_deref() {
            Some(name) => sampler_from_name(name),
            None => Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
        };

        Config {
            sampler,
            id_generator: Box::<RandomIdGenerator>::default(),
            span_limits: SpanLimits::default(),
            resource: Resource::default(),
        }
    }
}

fn sampler_arg_ratio() -> f64 {
    config::get(OTEL_TRACES_SAMPLER_ARG)
        .and_then(|arg| arg.parse::<f64>().ok())
        .unwrap_or_else(|| {
            sdk_warn!(
                name: "Config.InvalidSamplerArg",
                message = "OTEL_TRACES_SAMPLER_ARG is missing or not a number, using 1.0"
            );
            1.0
        })
}

fn sampler_from_name(name: &str) -> Box<dyn ShouldSample> {
    match name {
        "always_on" => Box::new(Sampler::AlwaysOn),
        "always_off" => Box::new(Sampler::AlwaysOff),
        "traceidratio" => Box::new(Sampler::TraceIdRatioBased(sampler_arg_ratio())),
        "parentbased_always_on" => Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
        "parentbased_always_off" => Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOff))),
        "parentbased_traceidratio" => Box::new(Sampler::ParentBased(Box::new(
            Sampler::TraceIdRatioBased(sampler_arg_ratio()),
        ))),
        unknown => {
            sdk_warn!(
                name: "Config.UnknownSampler",
                sampler = unknown.to_string(),
                message = "unsupported OTEL_TRACES_SAMPLER value, using parentbased_always_on"
            );
            Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_from_env() {
        temp_env::with_vars(
            [
                (OTEL_TRACES_SAMPLER, Some("traceidratio")),
                (OTEL_TRACES_SAMPLER_ARG, Some("0.25")),
            ],
            || {
                let config = Config::default();
                assert_eq!(config.sampler.description(), "TraceIdRatioBased{0.25}");
            },
        );

        temp_env::with_var(OTEL_TRACES_SAMPLER, Some("always_off"), || {
            let config = Config::default();
            assert_eq!(config.sampler.description(), "AlwaysOffSampler");
        });

        temp_env::with_var(OTEL_TRACES_SAMPLER, Some("nonsense"), || {
            let config = Config::default();
            assert_eq!(
                config.sampler.description(),
                "ParentBased{root:AlwaysOnSampler}"
            );
        });
    }
}
