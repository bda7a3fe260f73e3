//! Shared types for the dashboard refresher
//!
//! Entity state records as served by `GET /api/states`, the snapshot that
//! groups one poll cycle's records, and the crate-wide error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single entity state record
///
/// Only `entity_id` and `state` are required. Any other top-level fields the
/// provider sends (timestamps, context) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity identifier, e.g. `sensor.living_room_temperature`
    pub entity_id: String,
    /// Current state as the provider renders it
    pub state: String,
    /// Free-form attributes
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Attach an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// An ordered set of entity records from one poll cycle
///
/// Identifiers are not checked for uniqueness. Lookups return the first
/// matching record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entities: Vec<EntityState>,
}

impl Snapshot {
    pub fn new(entities: Vec<EntityState>) -> Self {
        Self { entities }
    }

    /// First record whose identifier equals `entity_id`
    pub fn lookup(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }

    /// State string of the first matching record
    pub fn state_of(&self, entity_id: &str) -> Option<&str> {
        self.lookup(entity_id).map(|e| e.state.as_str())
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.lookup(entity_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityState> {
        self.entities.iter()
    }
}

impl FromIterator<EntityState> for Snapshot {
    fn from_iter<I: IntoIterator<Item = EntityState>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Dashboard refresher error
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Transport failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-2xx status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Response body was not a list of entity records
    #[error("Invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for refresher operations
pub type Result<T> = std::result::Result<T, DashboardError>;
