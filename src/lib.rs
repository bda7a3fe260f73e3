//! Smart Dashboard - entity state refresher for dashboard pages
//!
//! Polls a home-automation controller's `/api/states` endpoint, keeps the
//! latest snapshot in memory and writes each entity's state into the page
//! elements bound to it.
//!
//! ## Components
//!
//! - **Cache**: single shared snapshot, replaced whole on every poll
//! - **Projection**: eager or viewport-gated writes into bound elements
//! - **Condition**: sandboxed boolean expressions over `state()` and `user`
//! - **Poll**: HTTP fetch and the periodic scheduler
//! - **Layout**: YAML dashboard layouts trimmed by conditions
//! - **Dom**: the host page seam, with a headless in-memory implementation

pub mod cache;
pub mod condition;
pub mod config;
pub mod dashboard;
pub mod dom;
pub mod layout;
pub mod poll;
pub mod projection;
pub mod types;

pub use cache::StateCache;
pub use condition::{Condition, ConditionError, ConditionEvaluator};
pub use config::{Args, RefresherConfig};
pub use dashboard::SmartDashboard;
pub use projection::{DomProjector, ProjectionMode};
pub use types::{DashboardError, EntityState, Result, Snapshot};
