//! Dashboard layout definitions
//!
//! A YAML layout lists rooms of cards plus sidebar links. Rooms and sidebar
//! items may carry conditions, evaluated with the same evaluator that hosts
//! use at runtime, so a layout can be trimmed for a given user and the
//! entities that currently exist.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::condition::ConditionEvaluator;
use crate::types::{DashboardError, Result, Snapshot};

/// Dashboard card; unknown keys are kept as card options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    #[serde(rename = "type")]
    pub card_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,

    #[serde(default)]
    pub order: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default)]
    pub cards: Vec<Card>,

    /// All must hold for the room to be kept
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebarItem {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub rooms: Vec<Room>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidebar: Vec<SidebarItem>,
}

impl DashboardLayout {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| DashboardError::Layout(format!("invalid layout: {e}")))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| DashboardError::Layout(format!("failed to serialize layout: {e}")))
    }

    /// Drop rooms and sidebar items whose conditions do not hold.
    ///
    /// Kept sidebar items lose their `condition`.
    pub fn apply_conditions(
        &mut self,
        evaluator: &ConditionEvaluator,
        user: Option<&serde_json::Value>,
    ) {
        let before = self.rooms.len();
        self.rooms
            .retain(|room| evaluator.evaluate_all(&room.conditions, user));

        let sidebar_before = self.sidebar.len();
        self.sidebar.retain_mut(|item| {
            let keep = match item.condition.as_deref() {
                Some(condition) => evaluator.evaluate(condition, user),
                None => true,
            };
            if keep {
                item.condition = None;
            }
            keep
        });

        debug!(
            rooms_dropped = before - self.rooms.len(),
            sidebar_dropped = sidebar_before - self.sidebar.len(),
            "Layout conditions applied"
        );
    }

    /// Drop cards whose entity is not in `snapshot`.
    ///
    /// An empty snapshot means the entity list is unknown; nothing is dropped.
    pub fn filter_existing_entities(&mut self, snapshot: &Snapshot) {
        if snapshot.is_empty() {
            warn!("Entity list empty; skipping entity filtering");
            return;
        }
        for room in &mut self.rooms {
            room.cards.retain(|card| match card.entity.as_deref() {
                Some(entity) => snapshot.contains(entity),
                None => true,
            });
        }
    }

    /// Remove repeated identical cards within each room, keeping the first
    pub fn deduplicate_cards(&mut self) {
        for room in &mut self.rooms {
            let mut seen = HashSet::new();
            room.cards.retain(|card| match serde_json::to_string(card) {
                Ok(key) => seen.insert(key),
                Err(_) => true,
            });
        }
    }

    /// Non-hidden rooms ordered by `order`; ties keep file order
    pub fn visible_rooms(&self) -> Vec<&Room> {
        let mut rooms: Vec<&Room> = self.rooms.iter().filter(|r| !r.hidden).collect();
        rooms.sort_by_key(|r| r.order);
        rooms
    }
}
