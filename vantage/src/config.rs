//! Layered SDK configuration.
//!
//! Configuration values are resolved from two namespaces, highest
//! precedence first:
//!
//! 1. A build-bundled define table, registered once via [`set_defines`].
//! 2. Process environment variables.
//!
//! Explicit builder arguments always override both: builders only consult
//! this module for settings that were not programmatically supplied.
//!
//! Values bundled at build time cannot contain commas (the bundling format
//! is itself comma separated), so producers replace `,` with `;` for the
//! documented comma-bearing keys and this module converts them back on read.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Disables every API when set to `true`.
pub const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";

/// Keys whose values are comma-separated lists and therefore `;`-escaped in
/// the define table.
const COMMA_BEARING_KEYS: [&str; 6] = [
    "OTEL_RESOURCE_ATTRIBUTES",
    "OTEL_PROPAGATORS",
    "OTEL_EXPORTER_OTLP_HEADERS",
    "OTEL_EXPORTER_OTLP_TRACES_HEADERS",
    "OTEL_EXPORTER_OTLP_METRICS_HEADERS",
    "OTEL_EXPORTER_OTLP_LOGS_HEADERS",
];

static DEFINES: RwLock<Option<HashMap<String, String>>> = RwLock::new(None);

/// Error returned when the configuration layers are set up inconsistently.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    /// The define table was registered more than once.
    #[error("build-time defines are already registered")]
    AlreadyRegistered,
}

/// Registers the build-bundled define table.
///
/// May be called at most once per process; tests can start over with
/// [`reset_defines_for_test`].
pub fn set_defines<I, K, V>(defines: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut guard = DEFINES.write().unwrap_or_else(|e| e.into_inner());
    if guard.is_some() {
        return Err(ConfigError::AlreadyRegistered);
    }
    *guard = Some(
        defines
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    );
    Ok(())
}

/// Clears the define table so tests can register their own.
pub fn reset_defines_for_test() {
    *DEFINES.write().unwrap_or_else(|e| e.into_inner()) = None;
}

/// Looks `key` up in the define table, falling back to the process
/// environment. Empty values are treated as unset.
pub fn get(key: &str) -> Option<String> {
    let defined = {
        let guard = DEFINES.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().and_then(|map| map.get(key).cloned())
    };
    defined
        .map(|value| {
            if COMMA_BEARING_KEYS.contains(&key) {
                value.replace(';', ",")
            } else {
                value
            }
        })
        .or_else(|| std::env::var(key).ok())
        .filter(|value| !value.is_empty())
}

/// Parses `key` as a boolean; unset or unparseable values yield `None`.
pub fn get_bool(key: &str) -> Option<bool> {
    get(key).map(|value| value.eq_ignore_ascii_case("true") || value == "1")
}

/// Parses `key` as an unsigned integer.
pub fn get_u64(key: &str) -> Option<u64> {
    get(key).and_then(|value| value.trim().parse().ok())
}

/// Parses `key` as a duration in milliseconds.
pub fn get_duration_millis(key: &str) -> Option<Duration> {
    get_u64(key).map(Duration::from_millis)
}

/// Returns true when `OTEL_SDK_DISABLED=true`, which turns every API into a
/// no-op.
pub fn sdk_disabled() -> bool {
    get_bool(OTEL_SDK_DISABLED).unwrap_or(false)
}

/// The exporter selected for a signal via
/// `OTEL_{TRACES,METRICS,LOGS}_EXPORTER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExporterSelection {
    /// Export over OTLP (the default).
    #[default]
    Otlp,
    /// Export to the console; pipeline assemblers substitute their
    /// console implementation.
    Console,
    /// Do not install an exporter for this signal.
    None,
}

/// Parses the exporter selection for `key` (one of
/// `OTEL_TRACES_EXPORTER`, `OTEL_METRICS_EXPORTER`,
/// `OTEL_LOGS_EXPORTER`). Unknown values fall back to `otlp`.
pub fn exporter_selection(key: &str) -> ExporterSelection {
    match get(key).as_deref().map(str::trim) {
        Some("none") => ExporterSelection::None,
        Some("console") => ExporterSelection::Console,
        _ => ExporterSelection::Otlp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_fallback_and_empty_is_unset() {
        temp_env::with_vars(
            [("VANTAGE_TEST_KEY", Some("from-env")), ("VANTAGE_EMPTY", Some(""))],
            || {
                assert_eq!(get("VANTAGE_TEST_KEY").as_deref(), Some("from-env"));
                assert_eq!(get("VANTAGE_EMPTY"), None);
            },
        );
    }

    #[test]
    fn defines_override_env_and_unescape_commas() {
        // Keys here are ones no other test reads; the temp-env lock keeps
        // concurrent env-based tests out while the define table is live.
        temp_env::with_var(
            "OTEL_EXPORTER_OTLP_LOGS_HEADERS",
            Some("ignored=true"),
            || {
                reset_defines_for_test();
                set_defines([
                    ("OTEL_EXPORTER_OTLP_LOGS_HEADERS", "a=1;b=2"),
                    ("OTEL_EXPORTER_OTLP_CLIENT_KEY", "/etc/otel/client.pem"),
                ])
                .unwrap();

                // The define wins over the environment, and `;` unescapes
                // back to `,` for the comma-bearing key.
                assert_eq!(
                    get("OTEL_EXPORTER_OTLP_LOGS_HEADERS").as_deref(),
                    Some("a=1,b=2")
                );
                assert_eq!(
                    get("OTEL_EXPORTER_OTLP_CLIENT_KEY").as_deref(),
                    Some("/etc/otel/client.pem")
                );
                assert_eq!(
                    set_defines([("X", "Y")]),
                    Err(ConfigError::AlreadyRegistered)
                );
                reset_defines_for_test();
            },
        );
    }

    #[test]
    fn exporter_selection_parsing() {
        temp_env::with_var("OTEL_TRACES_EXPORTER", Some("none"), || {
            assert_eq!(
                exporter_selection("OTEL_TRACES_EXPORTER"),
                ExporterSelection::None
            );
        });
        temp_env::with_var("OTEL_LOGS_EXPORTER", Some("console"), || {
            assert_eq!(
                exporter_selection("OTEL_LOGS_EXPORTER"),
                ExporterSelection::Console
            );
        });
        temp_env::with_var_unset("OTEL_METRICS_EXPORTER", || {
            assert_eq!(
                exporter_selection("OTEL_METRICS_EXPORTER"),
                ExporterSelection::Otlp
            );
        });
    }

    #[test]
    fn disabled_flag() {
        temp_env::with_var(OTEL_SDK_DISABLED, Some("true"), || {
            assert!(sdk_disabled());
        });
        temp_env::with_var(OTEL_SDK_DISABLED, Some("false"), || {
            assert!(!sdk_disabled());
        });
    }
}
