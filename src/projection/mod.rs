//! DOM projection
//!
//! After every cache replacement the projector walks the bound elements and
//! writes each entity's `state` string into its element verbatim. Elements
//! whose entity is missing from the snapshot keep their current text.
//!
//! ## Eager and lazy mode
//!
//! The first `project()` call latches the mode for the projector's lifetime
//! from the bound-element count at that moment:
//!
//! - at or below the threshold every element is written on every pass;
//! - above it, elements are handed to the [`ViewportGate`] once, and each
//!   pass only writes elements currently inside the viewport. Everything
//!   else is written when the host reports it intersecting, including the
//!   initial report for elements already within the margin.

pub mod viewport;

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::cache::StateCache;
use crate::dom::{BoundElement, Document};
use crate::types::Snapshot;

pub use viewport::{ViewportGate, DEFAULT_ROOT_MARGIN_PX};

/// Bound-element count above which lazy mode is latched
pub const DEFAULT_LAZY_THRESHOLD: usize = 500;

/// Projection strategy, decided once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// No projection pass has run yet
    Unset,
    /// Every bound element is written each pass
    Eager,
    /// Writes are gated by viewport proximity
    Lazy,
}

/// Summary of one projection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionReport {
    /// Bound elements found in the document
    pub bound: usize,
    /// Elements considered for an immediate write
    pub considered: usize,
    /// Elements whose entity was found and written
    pub written: usize,
}

/// Write the entity's state into `element`.
///
/// Returns `false` without touching the element when it has no identifier or
/// the snapshot has no record for it.
pub(crate) fn write_entity_state<E: BoundElement>(element: &E, snapshot: &Snapshot) -> bool {
    let Some(entity_id) = element.entity_id() else {
        return false;
    };
    match snapshot.lookup(&entity_id) {
        Some(record) => {
            element.set_text(&record.state);
            true
        }
        None => false,
    }
}

/// Projects cached entity state into bound elements
pub struct DomProjector<D: Document> {
    document: Arc<D>,
    cache: Arc<StateCache>,
    mode: OnceLock<ProjectionMode>,
    gate: ViewportGate<D>,
    lazy_threshold: usize,
}

impl<D: Document> DomProjector<D> {
    /// Create a projector with the default threshold and root margin
    pub fn new(document: Arc<D>, cache: Arc<StateCache>) -> Self {
        Self::with_options(document, cache, DEFAULT_LAZY_THRESHOLD, DEFAULT_ROOT_MARGIN_PX)
    }

    pub fn with_options(
        document: Arc<D>,
        cache: Arc<StateCache>,
        lazy_threshold: usize,
        root_margin_px: f64,
    ) -> Self {
        Self {
            document,
            cache,
            mode: OnceLock::new(),
            gate: ViewportGate::new(root_margin_px),
            lazy_threshold,
        }
    }

    /// Latched mode, `Unset` before the first pass
    pub fn mode(&self) -> ProjectionMode {
        self.mode.get().copied().unwrap_or(ProjectionMode::Unset)
    }

    pub fn lazy_threshold(&self) -> usize {
        self.lazy_threshold
    }

    pub fn gate(&self) -> &ViewportGate<D> {
        &self.gate
    }

    pub fn document(&self) -> &Arc<D> {
        &self.document
    }

    /// Run one projection pass against the current snapshot
    pub fn project(&self) -> ProjectionReport {
        let elements = self.document.bound_elements();
        let snapshot = self.cache.snapshot();

        let mode = *self.mode.get_or_init(|| {
            let mode = if elements.len() > self.lazy_threshold {
                ProjectionMode::Lazy
            } else {
                ProjectionMode::Eager
            };
            info!(
                bound = elements.len(),
                threshold = self.lazy_threshold,
                ?mode,
                "Projection mode latched"
            );
            mode
        });

        let report = match mode {
            ProjectionMode::Lazy => self.project_lazy(&elements, &snapshot),
            _ => self.project_eager(&elements, &snapshot),
        };
        debug!(
            bound = report.bound,
            considered = report.considered,
            written = report.written,
            "Projection pass complete"
        );
        report
    }

    fn project_eager(&self, elements: &[D::Element], snapshot: &Snapshot) -> ProjectionReport {
        let written = elements
            .iter()
            .filter(|el| write_entity_state(*el, snapshot))
            .count();
        ProjectionReport {
            bound: elements.len(),
            considered: elements.len(),
            written,
        }
    }

    fn project_lazy(&self, elements: &[D::Element], snapshot: &Snapshot) -> ProjectionReport {
        self.gate.register(&self.document, &self.cache, elements);

        let viewport_height = self.document.viewport_height();
        let mut report = ProjectionReport {
            bound: elements.len(),
            ..ProjectionReport::default()
        };
        for element in elements {
            let Some(rect) = element.bounding_rect() else {
                continue;
            };
            if rect.intersects_viewport(viewport_height, 0.0) {
                report.considered += 1;
                if write_entity_state(element, snapshot) {
                    report.written += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ElementSpec, VirtualDocument};
    use crate::types::EntityState;

    fn setup(threshold: usize) -> (Arc<VirtualDocument>, Arc<StateCache>, DomProjector<VirtualDocument>) {
        let doc = Arc::new(VirtualDocument::new(800.0));
        let cache = Arc::new(StateCache::new());
        let projector = DomProjector::with_options(
            Arc::clone(&doc),
            Arc::clone(&cache),
            threshold,
            DEFAULT_ROOT_MARGIN_PX,
        );
        (doc, cache, projector)
    }

    #[test]
    fn test_eager_writes_state_verbatim() {
        let (doc, cache, projector) = setup(DEFAULT_LAZY_THRESHOLD);
        let el = doc.insert(ElementSpec::bound("sensor.t"));
        cache.replace(Snapshot::new(vec![EntityState::new("sensor.t", "21.50")]));

        assert_eq!(projector.mode(), ProjectionMode::Unset);
        let report = projector.project();

        assert_eq!(projector.mode(), ProjectionMode::Eager);
        assert_eq!(el.text(), "21.50");
        assert_eq!(report, ProjectionReport { bound: 1, considered: 1, written: 1 });
    }

    #[test]
    fn test_absent_entity_keeps_previous_text() {
        let (doc, cache, projector) = setup(DEFAULT_LAZY_THRESHOLD);
        let el = doc.insert(ElementSpec::bound("sensor.t").with_text("19.0"));
        cache.replace(Snapshot::new(vec![EntityState::new("sensor.other", "1")]));

        projector.project();
        assert_eq!(el.text(), "19.0");
    }

    #[test]
    fn test_projection_is_idempotent() {
        let (doc, cache, projector) = setup(DEFAULT_LAZY_THRESHOLD);
        let el = doc.insert(ElementSpec::bound("light.kitchen"));
        cache.replace(Snapshot::new(vec![EntityState::new("light.kitchen", "on")]));

        projector.project();
        projector.project();
        assert_eq!(el.text(), "on");
    }

    #[test]
    fn test_threshold_is_strictly_greater() {
        let (doc, _cache, projector) = setup(3);
        for i in 0..3 {
            doc.insert(ElementSpec::bound(format!("sensor.{i}")));
        }
        projector.project();
        assert_eq!(projector.mode(), ProjectionMode::Eager);
    }

    #[test]
    fn test_mode_latch_survives_count_change() {
        let (doc, _cache, projector) = setup(3);
        doc.insert(ElementSpec::bound("sensor.0"));
        projector.project();
        assert_eq!(projector.mode(), ProjectionMode::Eager);

        for i in 1..10 {
            doc.insert(ElementSpec::bound(format!("sensor.{i}")));
        }
        projector.project();
        assert_eq!(projector.mode(), ProjectionMode::Eager);
        assert!(!projector.gate().is_observing());
    }

    #[test]
    fn test_lazy_writes_only_visible_elements() {
        let (doc, cache, projector) = setup(2);
        let visible = doc.insert(ElementSpec::bound("sensor.a").at(10.0, 20.0));
        let edge = doc.insert(ElementSpec::bound("sensor.b").at(800.0, 20.0));
        let below = doc.insert(ElementSpec::bound("sensor.c").at(950.0, 20.0));
        let unplaced = doc.insert(ElementSpec::bound("sensor.d"));
        cache.replace(
            ["sensor.a", "sensor.b", "sensor.c", "sensor.d"]
                .iter()
                .map(|id| EntityState::new(*id, "on"))
                .collect(),
        );

        let report = projector.project();

        assert_eq!(projector.mode(), ProjectionMode::Lazy);
        assert!(projector.gate().is_observing());
        assert_eq!(visible.text(), "on");
        assert_eq!(edge.text(), "on");
        assert_eq!(below.text(), "");
        assert_eq!(unplaced.text(), "");
        assert_eq!(report, ProjectionReport { bound: 4, considered: 2, written: 2 });
    }

    #[test]
    fn test_lazy_writes_margin_element_on_registration() {
        let (doc, cache, projector) = setup(1);
        doc.insert(ElementSpec::bound("sensor.a").at(0.0, 20.0));
        let margin = doc.insert(ElementSpec::bound("sensor.b").at(850.0, 20.0).with_text("--"));
        let unplaced = doc.insert(ElementSpec::bound("sensor.c").with_text("--"));
        cache.replace(
            ["sensor.a", "sensor.b", "sensor.c"]
                .iter()
                .map(|id| EntityState::new(*id, "on"))
                .collect(),
        );

        let report = projector.project();

        // outside the viewport, so not part of the visible pass
        assert_eq!(report.considered, 1);
        assert_eq!(margin.text(), "on");
        assert_eq!(unplaced.text(), "--");
        assert_eq!(doc.scroll_to(0.0), 0);
    }

    #[test]
    fn test_lazy_registers_observer_once() {
        let (doc, cache, projector) = setup(1);
        doc.insert(ElementSpec::bound("sensor.a").at(2000.0, 20.0));
        doc.insert(ElementSpec::bound("sensor.b").at(3000.0, 20.0));
        cache.replace(Snapshot::new(vec![EntityState::new("sensor.a", "1")]));

        projector.project();
        doc.insert(ElementSpec::bound("sensor.c").at(4000.0, 20.0));
        projector.project();

        assert_eq!(doc.observer_count(), 1);
        assert_eq!(projector.gate().observer().unwrap().observed_count(), 2);
    }

    #[test]
    fn test_lazy_element_updates_when_scrolled_into_margin() {
        let (doc, cache, projector) = setup(1);
        doc.insert(ElementSpec::bound("sensor.a").at(0.0, 20.0));
        let far = doc.insert(ElementSpec::bound("sensor.b").at(2000.0, 20.0).with_text("--"));
        cache.replace(Snapshot::new(vec![
            EntityState::new("sensor.a", "1"),
            EntityState::new("sensor.b", "2"),
        ]));

        projector.project();
        assert_eq!(far.text(), "--");

        // top lands 60px below the viewport bottom
        doc.scroll_to(1140.0);
        assert_eq!(far.text(), "2");
    }
}
