//! Runtime configuration resolved from the environment.
//!
//! `COSTSOURCE_PLUGIN_PORT` is the canonical port source. The deprecated
//! `PLUGIN_PORT` alias is still honored, but the canonical variable
//! always wins when both are set; the providers are merged in that order
//! and the precedence is unit-tested below.
//!
//! Header lists keep the unset/empty distinction: an unset variable
//! selects the documented gateway defaults, an explicitly empty value
//! means "send no headers".

use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Once;
use tracing::warn;

use crate::error::{ConfigError, Result};

pub const CANONICAL_PORT_VAR: &str = "COSTSOURCE_PLUGIN_PORT";
pub const DEPRECATED_PORT_VAR: &str = "PLUGIN_PORT";
pub const TRACE_ID_VAR: &str = "COSTSOURCE_TRACE_ID";
const ENV_PREFIX: &str = "COSTSOURCE_PLUGIN_";

static TEST_MODE_WARNING: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// `None` = documented defaults, `Some(vec![])` = send none.
    pub allow_headers: Option<Vec<String>>,
    pub expose_headers: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub port: u16,
    pub gateway: Option<GatewayConfig>,
    pub logging: LoggingConfig,
    pub trace_id_override: Option<String>,
    pub test_mode: bool,
}

/// Flat env projection; every field optional so presence/absence stays
/// observable after extraction.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    port: Option<u16>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
    log_file: Option<PathBuf>,
    test_mode: Option<bool>,
    gateway_port: Option<u16>,
    gateway_allow_headers: Option<String>,
    gateway_expose_headers: Option<String>,
    trace_id: Option<String>,
}

fn figment() -> Figment {
    Figment::new()
        // Deprecated alias first so the canonical provider wins on merge.
        .merge(Env::raw().only(&[DEPRECATED_PORT_VAR]).map(|_| "port".into()))
        .merge(Env::raw().only(&[TRACE_ID_VAR]).map(|_| "trace_id".into()))
        .merge(Env::prefixed(ENV_PREFIX))
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig = figment()
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let port = raw
            .port
            .ok_or(ConfigError::MissingVar(CANONICAL_PORT_VAR))?;
        if port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".into()).into());
        }

        let gateway = raw.gateway_port.map(|gateway_port| GatewayConfig {
            port: gateway_port,
            allow_headers: parse_header_list(raw.gateway_allow_headers.as_deref()),
            expose_headers: parse_header_list(raw.gateway_expose_headers.as_deref()),
        });
        if let Some(gw) = &gateway {
            if gw.port == port {
                return Err(ConfigError::Validation(
                    "gateway and plugin ports must be different".into(),
                )
                .into());
            }
        }

        let mut logging = LoggingConfig::default();
        if let Some(level) = raw.log_level {
            logging.level = level;
        }
        if let Some(format) = raw.log_format {
            logging.format = format;
        }
        logging.file = raw.log_file;

        let test_mode = raw.test_mode.unwrap_or(false);
        if test_mode {
            // One warning per process so the flag is never silently left
            // on in production.
            TEST_MODE_WARNING.call_once(|| {
                warn!("test mode enabled; do not run production traffic against this plugin");
            });
        }

        Ok(Self {
            port,
            gateway,
            logging,
            trace_id_override: raw.trace_id,
            test_mode,
        })
    }
}

/// `None` stays `None`; a set-but-empty value becomes an explicit empty
/// list.
fn parse_header_list(value: Option<&str>) -> Option<Vec<String>> {
    value.map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_port_wins_over_deprecated() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(DEPRECATED_PORT_VAR, "4000");
            jail.set_env(CANONICAL_PORT_VAR, "5000");
            let config = RuntimeConfig::from_env().expect("config");
            assert_eq!(config.port, 5000);
            Ok(())
        });
    }

    #[test]
    fn deprecated_port_honored_when_canonical_absent() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(DEPRECATED_PORT_VAR, "4000");
            let config = RuntimeConfig::from_env().expect("config");
            assert_eq!(config.port, 4000);
            Ok(())
        });
    }

    #[test]
    fn missing_port_is_a_configuration_error() {
        figment::Jail::expect_with(|_jail| {
            let err = RuntimeConfig::from_env().unwrap_err();
            assert!(err.to_string().contains(CANONICAL_PORT_VAR));
            Ok(())
        });
    }

    #[test]
    fn zero_port_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(CANONICAL_PORT_VAR, "0");
            assert!(RuntimeConfig::from_env().is_err());
            Ok(())
        });
    }

    #[test]
    fn gateway_port_must_differ_from_plugin_port() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(CANONICAL_PORT_VAR, "5000");
            jail.set_env("COSTSOURCE_PLUGIN_GATEWAY_PORT", "5000");
            assert!(RuntimeConfig::from_env().is_err());
            Ok(())
        });
    }

    #[test]
    fn unset_headers_mean_defaults_empty_means_none() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(CANONICAL_PORT_VAR, "5000");
            jail.set_env("COSTSOURCE_PLUGIN_GATEWAY_PORT", "5001");
            jail.set_env("COSTSOURCE_PLUGIN_GATEWAY_ALLOW_HEADERS", "");
            let config = RuntimeConfig::from_env().expect("config");
            let gateway = config.gateway.expect("gateway");
            // Explicit empty is an empty list, not the default set.
            assert_eq!(gateway.allow_headers, Some(vec![]));
            // Unset stays None so the gateway applies its defaults.
            assert_eq!(gateway.expose_headers, None);
            Ok(())
        });
    }

    #[test]
    fn header_list_parses_comma_separated_values() {
        assert_eq!(
            parse_header_list(Some("content-type, x-trace-id")),
            Some(vec!["content-type".to_string(), "x-trace-id".to_string()])
        );
        assert_eq!(parse_header_list(None), None);
        assert_eq!(parse_header_list(Some("")), Some(vec![]));
    }

    #[test]
    fn trace_id_override_and_test_mode() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(CANONICAL_PORT_VAR, "5000");
            jail.set_env(TRACE_ID_VAR, "fixed-trace");
            jail.set_env("COSTSOURCE_PLUGIN_TEST_MODE", "true");
            let config = RuntimeConfig::from_env().expect("config");
            assert_eq!(config.trace_id_override.as_deref(), Some("fixed-trace"));
            assert!(config.test_mode);
            Ok(())
        });
    }
}
