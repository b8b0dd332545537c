//! # nal2-telemetry
//!
//! `tracing` subscriber setup for the NAL2 host: an `EnvFilter` built from
//! the configured level (overridden by `RUST_LOG`) and a stdout formatter
//! that writes either human-readable lines or JSON.

#![deny(unsafe_code)]

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `nal2_server` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON output instead of text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from a level name; unknown names fall back to `info`.
    pub fn from_level_name(level: &str, json: bool) -> Self {
        Self {
            log_level: parse_level(level).unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            json,
        }
    }

    /// Add per-target levels from `(target, level name)` pairs.
    ///
    /// Pairs with an unknown level name or an empty target are skipped.
    #[must_use]
    pub fn with_module_levels<'a>(
        mut self,
        modules: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Self {
        self.module_levels.extend(modules.into_iter().filter_map(|(target, level)| {
            let target = target.trim();
            let level = parse_level(level)?;
            (!target.is_empty()).then(|| (target.to_string(), level))
        }));
        self
    }

    /// Filter directive string, e.g. `info,nal2_server=debug`.
    pub fn filter_directive(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(&level.to_string().to_lowercase());
        }
        filter
    }
}

/// Parse a level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(name: &str) -> Option<Level> {
    Level::from_str(name.trim()).ok()
}

/// Install the global subscriber. Call once at startup.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let (json_layer, text_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true);
        (Some(layer), None)
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(true);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_names() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level(" info "), Some(Level::INFO));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let config = TelemetryConfig::from_level_name("loud", true);
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.json);
    }

    #[test]
    fn filter_directive_includes_module_levels() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("nal2_server".into(), Level::DEBUG)],
            json: false,
        };
        assert_eq!(config.filter_directive(), "warn,nal2_server=debug");
    }

    #[test]
    fn module_levels_from_named_pairs() {
        let modules: std::collections::BTreeMap<String, String> = [
            ("nal2_core", "trace"),
            ("nal2_server", "DEBUG"),
            ("tokio_tungstenite", "chatty"),
            (" ", "warn"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = TelemetryConfig::from_level_name("info", false).with_module_levels(&modules);
        assert_eq!(
            config.module_levels,
            vec![
                ("nal2_core".to_string(), Level::TRACE),
                ("nal2_server".to_string(), Level::DEBUG),
            ]
        );
        assert_eq!(
            config.filter_directive(),
            "info,nal2_core=trace,nal2_server=debug"
        );
    }

    #[test]
    fn second_init_reports_false() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(!init_telemetry(&config));
    }
}
