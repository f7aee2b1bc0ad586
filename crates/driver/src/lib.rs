//! Driver boundary for holdfast.
//!
//! The engine consumes exactly this surface; backends implement it. Every
//! operation reports failures through [`DriverError`], whose kind decides
//! whether the engine absorbs the failure (refresh and retry) or propagates
//! it. The in-memory [`fake::FakeDriver`] is the reference backend and the
//! test bed for the retry machinery.

pub mod errors;
pub mod fake;

use holdfast_core_types::{
    ElementRef, Rect, ScrollTarget, SelectChoice, Selector, WindowSize,
};
use serde_json::Value;

pub use errors::{DriverError, DriverErrorKind, DriverResult};

/// Where a lookup starts.
#[derive(Clone, Copy, Debug)]
pub enum Scope<'a> {
    /// The document root.
    Document,
    /// Relative to one already-located element.
    Element(&'a ElementRef),
}

/// Capability surface of an automation backend.
///
/// References handed out by `locate` stay meaningful only while the
/// underlying document holds still; any method taking an [`ElementRef`] may
/// fail with a recoverable kind when it no longer does.
pub trait Driver: Send + Sync {
    /// Current matches for `selector` under `scope`, in document order.
    /// An empty result is not an error.
    fn locate(&self, scope: Scope<'_>, selector: &Selector) -> DriverResult<Vec<ElementRef>>;

    // Per-element reads.
    fn text(&self, element: &ElementRef) -> DriverResult<String>;
    fn value(&self, element: &ElementRef) -> DriverResult<Option<String>>;
    fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>>;
    fn tag_name(&self, element: &ElementRef) -> DriverResult<String>;
    fn is_displayed(&self, element: &ElementRef) -> DriverResult<bool>;
    fn is_enabled(&self, element: &ElementRef) -> DriverResult<bool>;
    fn is_selected(&self, element: &ElementRef) -> DriverResult<bool>;
    fn rect(&self, element: &ElementRef) -> DriverResult<Rect>;
    /// The parent node, or `None` at the document root.
    fn parent(&self, element: &ElementRef) -> DriverResult<Option<ElementRef>>;

    // Per-element actions.
    fn click(&self, element: &ElementRef) -> DriverResult<()>;
    fn send_keys(&self, element: &ElementRef, text: &str) -> DriverResult<()>;
    fn clear(&self, element: &ElementRef) -> DriverResult<()>;
    fn select_option(&self, element: &ElementRef, choice: &SelectChoice) -> DriverResult<()>;
    fn deselect_option(&self, element: &ElementRef, choice: &SelectChoice) -> DriverResult<()>;
    fn deselect_all(&self, element: &ElementRef) -> DriverResult<()>;

    // Session-level operations.
    fn active_element(&self) -> DriverResult<ElementRef>;
    fn title(&self) -> DriverResult<String>;
    fn page_source(&self) -> DriverResult<String>;
    fn current_url(&self) -> DriverResult<String>;
    fn navigate(&self, url: &str) -> DriverResult<()>;
    fn refresh(&self) -> DriverResult<()>;
    fn execute_script(&self, script: &str) -> DriverResult<Value>;
    fn window_size(&self) -> DriverResult<WindowSize>;
    fn set_window_size(&self, size: WindowSize) -> DriverResult<()>;
    fn scroll(&self, target: ScrollTarget) -> DriverResult<()>;
}
