//! Configuration for the dashboard refresher
//!
//! CLI arguments and environment variables via clap, the serde-backed
//! `RefresherConfig` the library consumes, and the TOML bindings file that
//! seeds the headless document.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::dom::{ElementSpec, VirtualDocument};
use crate::types::{DashboardError, Result};

/// Smart dashboard - keeps bound elements in sync with entity states
#[derive(Parser, Debug, Clone)]
#[command(name = "smart-dashboard")]
#[command(about = "Polls entity states and projects them into dashboard elements")]
pub struct Args {
    /// Base URL of the state provider
    #[arg(long, env = "HASS_URL", default_value = "http://localhost:8123")]
    pub url: String,

    /// Long-lived bearer token
    #[arg(long, env = "HASS_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Poll interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "5000")]
    pub interval_ms: u64,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Bound-element count above which projection goes lazy
    #[arg(long, env = "LAZY_THRESHOLD", default_value = "500")]
    pub lazy_threshold: usize,

    /// Viewport proximity margin in pixels
    #[arg(long, env = "ROOT_MARGIN_PX", default_value = "100")]
    pub root_margin_px: f64,

    /// Drop poll responses that resolve after a newer one was applied
    #[arg(long, env = "DISCARD_STALE_RESPONSES", default_value = "false")]
    pub discard_stale_responses: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Poll continuously and project into a headless document until Ctrl-C
    Watch {
        /// TOML file describing the bound elements
        #[arg(long)]
        bindings: PathBuf,
    },
    /// Refresh once and evaluate condition expressions
    Eval {
        /// Expressions to evaluate
        #[arg(required = true)]
        expressions: Vec<String>,

        /// User value, JSON or a plain string
        #[arg(long)]
        user: Option<String>,
    },
    /// Refresh once and print a layout with conditions applied
    Layout {
        /// YAML layout file
        file: PathBuf,

        /// User value, JSON or a plain string
        #[arg(long)]
        user: Option<String>,
    },
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.token.trim().is_empty() {
            return Err("HASS_TOKEN must not be empty".to_string());
        }

        if self.interval_ms == 0 {
            return Err("POLL_INTERVAL_MS must be greater than zero".to_string());
        }

        if let Err(e) = Url::parse(&self.url) {
            return Err(format!("HASS_URL is not a valid URL: {e}"));
        }

        if !self.root_margin_px.is_finite() || self.root_margin_px < 0.0 {
            return Err("ROOT_MARGIN_PX must be a non-negative number".to_string());
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Library construction record for these arguments
    pub fn refresher_config(&self) -> RefresherConfig {
        RefresherConfig {
            base_url: self.url.clone(),
            token: self.token.clone(),
            request_timeout_ms: self.request_timeout_ms,
            lazy_threshold: self.lazy_threshold,
            root_margin_px: self.root_margin_px,
            discard_stale_responses: self.discard_stale_responses,
        }
    }
}

/// Parse a `--user` value: JSON when it parses, otherwise a plain string
pub fn parse_user(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Refresher construction options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefresherConfig {
    /// Base URL of the state provider
    pub base_url: String,

    /// Bearer token
    pub token: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_lazy_threshold")]
    pub lazy_threshold: usize,

    #[serde(default = "default_root_margin_px")]
    pub root_margin_px: f64,

    /// Off by default: responses apply in completion order
    #[serde(default)]
    pub discard_stale_responses: bool,
}

impl RefresherConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            request_timeout_ms: default_request_timeout_ms(),
            lazy_threshold: default_lazy_threshold(),
            root_margin_px: default_root_margin_px(),
            discard_stale_responses: false,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_lazy_threshold() -> usize { 500 }
fn default_root_margin_px() -> f64 { 100.0 }

// =============================================================================
// BINDINGS FILE
// =============================================================================

/// Elements for a headless document
///
/// ```toml
/// viewport_height = 900
///
/// [[element]]
/// entity_id = "sensor.living_room_temperature"
/// top = 120
/// height = 24
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingsFile {
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,

    #[serde(default, rename = "element")]
    pub elements: Vec<ElementBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementBinding {
    /// Omitted for elements without an identifier
    #[serde(default)]
    pub entity_id: Option<String>,

    #[serde(default)]
    pub top: Option<f64>,

    #[serde(default = "default_element_height")]
    pub height: f64,

    /// Initial text
    #[serde(default)]
    pub text: String,
}

fn default_viewport_height() -> f64 { 800.0 }
fn default_element_height() -> f64 { 24.0 }

impl BindingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| DashboardError::Config(format!("invalid bindings file: {e}")))
    }

    /// Build a document holding these elements
    pub fn into_document(self) -> VirtualDocument {
        let document = VirtualDocument::new(self.viewport_height);
        for binding in self.elements {
            let mut spec = match binding.entity_id {
                Some(id) => ElementSpec::bound(id),
                None => ElementSpec::unbound(),
            };
            if let Some(top) = binding.top {
                spec = spec.at(top, binding.height);
            }
            document.insert(spec.with_text(binding.text));
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{BoundElement, Document};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["smart-dashboard", "--token", "abc"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = args(&["eval", "true"]);
        assert_eq!(args.interval(), Duration::from_millis(5000));
        assert_eq!(args.lazy_threshold, 500);
        assert_eq!(args.root_margin_px, 100.0);
        assert!(!args.discard_stale_responses);
        assert!(args.validate().is_ok());

        let config = args.refresher_config();
        assert_eq!(config.token, "abc");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(args(&["--interval-ms", "0", "eval", "true"]).validate().is_err());
        assert!(args(&["--url", "localhost 8123", "eval", "true"]).validate().is_err());
        assert!(args(&["--root-margin-px=-5", "eval", "true"]).validate().is_err());
    }

    #[test]
    fn test_parse_user() {
        assert_eq!(parse_user(r#"{"name":"admin"}"#)["name"], "admin");
        assert_eq!(parse_user("guest"), serde_json::Value::String("guest".into()));
    }

    #[test]
    fn test_refresher_config_defaults_from_json() {
        let config: RefresherConfig =
            serde_json::from_str(r#"{"base_url": "http://h:8123", "token": "t"}"#).unwrap();
        assert_eq!(config.lazy_threshold, 500);
        assert_eq!(config.root_margin_px, 100.0);
        assert_eq!(config.request_timeout_ms, 10_000);
        assert!(!config.discard_stale_responses);
    }

    #[test]
    fn test_bindings_into_document() {
        let bindings = BindingsFile::from_toml(
            r#"
viewport_height = 600

[[element]]
entity_id = "sensor.t"
top = 10
text = "--"

[[element]]
text = "label"
"#,
        )
        .unwrap();

        let document = bindings.into_document();
        assert_eq!(document.viewport_height(), 600.0);
        let bound = document.bound_elements();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].text(), "--");
        assert_eq!(bound[0].bounding_rect().unwrap().height(), 24.0);
    }

    #[test]
    fn test_bindings_rejects_bad_toml() {
        let err = BindingsFile::from_toml("viewport_height = \"tall\"").unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
    }
}
