//! DOM binding contract
//!
//! The page owns its elements. The refresher only enumerates elements that
//! carry an entity identifier attribute, reads that attribute, writes text
//! content, and asks the host for an intersection observer.

pub mod virtual_dom;

use std::sync::Arc;

pub use virtual_dom::{ElementSpec, VirtualDocument, VirtualElement, VirtualObserver};

/// Attribute that binds an element to an entity
pub const ENTITY_ID_ATTRIBUTE: &str = "data-entity-id";

/// Element box relative to the viewport, in logical pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(top: f64, height: f64) -> Self {
        Self {
            top,
            bottom: top + height,
        }
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Same box moved vertically by `dy`
    pub fn offset(&self, dy: f64) -> Self {
        Self {
            top: self.top + dy,
            bottom: self.bottom + dy,
        }
    }

    /// Whether the box overlaps the viewport grown by `margin` on each edge.
    /// Edges touching count as overlap.
    pub fn intersects_viewport(&self, viewport_height: f64, margin: f64) -> bool {
        self.bottom >= -margin && self.top <= viewport_height + margin
    }
}

/// One observation delivered to an intersection callback
#[derive(Debug, Clone)]
pub struct IntersectionEntry<E> {
    pub target: E,
    pub is_intersecting: bool,
}

/// Callback the host invokes on its event loop with batched entries
pub type IntersectionCallback<E> = Arc<dyn Fn(Vec<IntersectionEntry<E>>) + Send + Sync>;

/// Options for creating an intersection observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverOptions {
    /// Margin around the viewport that still counts as intersecting
    pub root_margin_px: f64,
}

/// A page element bound to an entity
pub trait BoundElement: Clone + Send + Sync + 'static {
    /// Value of the entity identifier attribute
    fn entity_id(&self) -> Option<String>;

    /// Current text content
    fn text(&self) -> String;

    /// Replace text content
    fn set_text(&self, text: &str);

    /// Box relative to the viewport, `None` when the host cannot measure it
    fn bounding_rect(&self) -> Option<Rect>;
}

/// Handle on a live intersection observer
pub trait ElementObserver<E>: Send + Sync {
    /// Start observing `element`
    fn observe(&self, element: &E);
}

/// The page the refresher projects into
pub trait Document: Send + Sync + 'static {
    type Element: BoundElement;
    type Observer: ElementObserver<Self::Element>;

    /// Every element currently carrying the entity identifier attribute
    fn bound_elements(&self) -> Vec<Self::Element>;

    /// Viewport height in logical pixels
    fn viewport_height(&self) -> f64;

    /// Create an intersection observer that reports to `callback`
    fn create_observer(
        &self,
        options: ObserverOptions,
        callback: IntersectionCallback<Self::Element>,
    ) -> Self::Observer;
}
