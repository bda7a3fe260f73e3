//! Viewport gate
//!
//! Defers text writes for off-screen elements until the host reports them
//! within the observer's root margin. One observer per page lifetime: it is
//! created on the first `register` call and never replaced or torn down.
//! Targets stay observed after an update, so repeated intersections simply
//! rewrite the same text.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use super::write_entity_state;
use crate::cache::StateCache;
use crate::dom::{BoundElement, Document, ElementObserver, IntersectionEntry, ObserverOptions};

/// Default proximity margin around the viewport
pub const DEFAULT_ROOT_MARGIN_PX: f64 = 100.0;

pub struct ViewportGate<D: Document> {
    observer: OnceLock<D::Observer>,
    root_margin_px: f64,
}

impl<D: Document> ViewportGate<D> {
    pub fn new(root_margin_px: f64) -> Self {
        Self {
            observer: OnceLock::new(),
            root_margin_px,
        }
    }

    /// Create the observer and watch `elements`.
    ///
    /// Only the first call has an effect; later calls return `false` without
    /// observing anything.
    pub fn register(
        &self,
        document: &D,
        cache: &Arc<StateCache>,
        elements: &[D::Element],
    ) -> bool {
        let mut created = false;
        let observer = self.observer.get_or_init(|| {
            created = true;
            let options = ObserverOptions {
                root_margin_px: self.root_margin_px,
            };
            let cache = Arc::clone(cache);
            document.create_observer(
                options,
                Arc::new(move |entries: Vec<IntersectionEntry<D::Element>>| {
                    on_intersection(&cache, entries)
                }),
            )
        });

        if !created {
            return false;
        }

        for element in elements {
            observer.observe(element);
        }
        info!(
            observed = elements.len(),
            root_margin_px = self.root_margin_px,
            "Viewport observer created"
        );
        true
    }

    /// Whether the observer exists
    pub fn is_observing(&self) -> bool {
        self.observer.get().is_some()
    }

    /// The live observer, if created
    pub fn observer(&self) -> Option<&D::Observer> {
        self.observer.get()
    }

    pub fn root_margin_px(&self) -> f64 {
        self.root_margin_px
    }
}

fn on_intersection<E: BoundElement>(cache: &StateCache, entries: Vec<IntersectionEntry<E>>) {
    let snapshot = cache.snapshot();
    let mut written = 0;
    for entry in entries.iter().filter(|e| e.is_intersecting) {
        if write_entity_state(&entry.target, &snapshot) {
            written += 1;
        }
    }
    debug!(entries = entries.len(), written, "Intersection entries applied");
}
