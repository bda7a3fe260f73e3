//! Headless in-memory document
//!
//! Backs the `smart-dashboard` binary and the test suite. Elements are laid
//! out in document coordinates; scrolling shifts their viewport rectangles
//! and notifies observers about elements whose intersection state changed.
//! Like a browser observer, `observe` delivers one initial entry for a newly
//! watched target carrying its current intersection state. Targets without
//! a layout box report not intersecting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::trace;

use super::{
    BoundElement, Document, ElementObserver, IntersectionCallback, IntersectionEntry,
    ObserverOptions, Rect,
};

/// Description of an element to insert
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    entity_id: Option<String>,
    layout: Option<Rect>,
    text: String,
}

impl ElementSpec {
    /// Element carrying the entity identifier attribute
    pub fn bound(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    /// Element without the attribute
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Place the element at `top` (document coordinates)
    pub fn at(mut self, top: f64, height: f64) -> Self {
        self.layout = Some(Rect::new(top, height));
        self
    }

    /// Initial text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

struct ElementInner {
    id: usize,
    entity_id: Option<String>,
    text: Mutex<String>,
    layout: Option<Rect>,
    scroll: Arc<RwLock<f64>>,
}

/// Element handle; clones share the same node
#[derive(Clone)]
pub struct VirtualElement {
    inner: Arc<ElementInner>,
}

impl VirtualElement {
    /// Node identifier, unique within its document
    pub fn node_id(&self) -> usize {
        self.inner.id
    }

    /// Layout box in document coordinates
    pub fn layout(&self) -> Option<Rect> {
        self.inner.layout
    }
}

impl PartialEq for VirtualElement {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for VirtualElement {}

impl std::fmt::Debug for VirtualElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualElement")
            .field("id", &self.inner.id)
            .field("entity_id", &self.inner.entity_id)
            .field("text", &self.text())
            .finish()
    }
}

impl BoundElement for VirtualElement {
    fn entity_id(&self) -> Option<String> {
        self.inner.entity_id.clone()
    }

    fn text(&self) -> String {
        self.inner
            .text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_text(&self, text: &str) {
        let mut current = self.inner.text.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != text {
            trace!(node = self.inner.id, text, "Text content updated");
            *current = text.to_string();
        }
    }

    fn bounding_rect(&self) -> Option<Rect> {
        let scroll = *self.inner.scroll.read().unwrap_or_else(PoisonError::into_inner);
        self.inner.layout.map(|rect| rect.offset(-scroll))
    }
}

struct ObserverState {
    options: ObserverOptions,
    viewport_height: f64,
    callback: IntersectionCallback<VirtualElement>,
    /// Observed targets with their last reported intersection state
    targets: Mutex<Vec<(VirtualElement, bool)>>,
}

/// Observer handle returned by [`VirtualDocument::create_observer`]
#[derive(Clone)]
pub struct VirtualObserver {
    state: Arc<ObserverState>,
}

impl VirtualObserver {
    pub fn observed_count(&self) -> usize {
        self.state
            .targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn root_margin_px(&self) -> f64 {
        self.state.options.root_margin_px
    }
}

impl ObserverState {
    fn intersects(&self, element: &VirtualElement) -> bool {
        element.bounding_rect().is_some_and(|rect| {
            rect.intersects_viewport(self.viewport_height, self.options.root_margin_px)
        })
    }
}

impl ElementObserver<VirtualElement> for VirtualObserver {
    fn observe(&self, element: &VirtualElement) {
        let is_intersecting = {
            let mut targets = self.state.targets.lock().unwrap_or_else(PoisonError::into_inner);
            if targets.iter().any(|(target, _)| target == element) {
                return;
            }
            let now = self.state.intersects(element);
            targets.push((element.clone(), now));
            now
        };

        // callback runs without the target lock held
        (self.state.callback)(vec![IntersectionEntry {
            target: element.clone(),
            is_intersecting,
        }]);
    }
}

/// In-memory page
pub struct VirtualDocument {
    elements: RwLock<Vec<VirtualElement>>,
    viewport_height: f64,
    scroll: Arc<RwLock<f64>>,
    observers: Mutex<Vec<Arc<ObserverState>>>,
    next_id: AtomicUsize,
}

impl VirtualDocument {
    pub fn new(viewport_height: f64) -> Self {
        Self {
            elements: RwLock::new(Vec::new()),
            viewport_height,
            scroll: Arc::new(RwLock::new(0.0)),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Append an element
    pub fn insert(&self, spec: ElementSpec) -> VirtualElement {
        let element = VirtualElement {
            inner: Arc::new(ElementInner {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                entity_id: spec.entity_id,
                text: Mutex::new(spec.text),
                layout: spec.layout,
                scroll: Arc::clone(&self.scroll),
            }),
        };
        self.elements
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(element.clone());
        element
    }

    /// Detach an element from the page. Observers keep their handle.
    pub fn remove(&self, element: &VirtualElement) -> bool {
        let mut elements = self.elements.write().unwrap_or_else(PoisonError::into_inner);
        let before = elements.len();
        elements.retain(|e| e != element);
        elements.len() != before
    }

    /// All elements, bound or not, in insertion order
    pub fn elements(&self) -> Vec<VirtualElement> {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text of every bound element for `entity_id`
    pub fn texts_for(&self, entity_id: &str) -> Vec<String> {
        self.bound_elements()
            .iter()
            .filter(|e| e.entity_id().as_deref() == Some(entity_id))
            .map(BoundElement::text)
            .collect()
    }

    pub fn scroll_offset(&self) -> f64 {
        *self.scroll.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of observers ever created on this page
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Scroll to `offset` and deliver intersection changes.
    ///
    /// Returns the number of entries delivered across all observers.
    pub fn scroll_to(&self, offset: f64) -> usize {
        *self.scroll.write().unwrap_or_else(PoisonError::into_inner) = offset;

        let mut delivered = 0;
        for observer in self.observers_snapshot() {
            let entries = {
                let mut targets = observer.targets.lock().unwrap_or_else(PoisonError::into_inner);
                let mut entries = Vec::new();
                for (target, last) in targets.iter_mut() {
                    if target.bounding_rect().is_none() {
                        continue;
                    }
                    let now = observer.intersects(target);
                    if now != *last {
                        *last = now;
                        entries.push(IntersectionEntry {
                            target: target.clone(),
                            is_intersecting: now,
                        });
                    }
                }
                entries
            };

            if !entries.is_empty() {
                delivered += entries.len();
                (observer.callback)(entries);
            }
        }
        delivered
    }

    /// Deliver a single entry for `element` to every observer watching it.
    ///
    /// Returns the number of observers notified.
    pub fn fire_intersection(&self, element: &VirtualElement, is_intersecting: bool) -> usize {
        let mut notified = 0;
        for observer in self.observers_snapshot() {
            let watching = {
                let mut targets = observer.targets.lock().unwrap_or_else(PoisonError::into_inner);
                match targets.iter_mut().find(|(target, _)| target == element) {
                    Some((_, last)) => {
                        *last = is_intersecting;
                        true
                    }
                    None => false,
                }
            };
            if watching {
                notified += 1;
                (observer.callback)(vec![IntersectionEntry {
                    target: element.clone(),
                    is_intersecting,
                }]);
            }
        }
        notified
    }

    fn observers_snapshot(&self) -> Vec<Arc<ObserverState>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Document for VirtualDocument {
    type Element = VirtualElement;
    type Observer = VirtualObserver;

    fn bound_elements(&self) -> Vec<VirtualElement> {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.inner.entity_id.is_some())
            .cloned()
            .collect()
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn create_observer(
        &self,
        options: ObserverOptions,
        callback: IntersectionCallback<VirtualElement>,
    ) -> VirtualObserver {
        let state = Arc::new(ObserverState {
            options,
            viewport_height: self.viewport_height,
            callback,
            targets: Mutex::new(Vec::new()),
        });
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&state));
        VirtualObserver { state }
    }
}
