//! Borrowed single-element lens handed to predicates and per-element
//! actions.

use holdfast_core_types::{ElementRef, Rect, SelectChoice};
use holdfast_driver::{Driver, DriverResult};

/// One element, borrowed from a collection for the duration of a callback.
///
/// Methods talk straight to the driver and surface its errors unshielded;
/// the calling retry protocol decides what to absorb. The `?` operator
/// converts these into [`crate::Error`] inside callbacks.
pub struct ElementView<'a> {
    driver: &'a dyn Driver,
    element: &'a ElementRef,
}

impl<'a> ElementView<'a> {
    pub(crate) fn new(driver: &'a dyn Driver, element: &'a ElementRef) -> Self {
        Self { driver, element }
    }

    /// The opaque reference this view wraps.
    pub fn element(&self) -> &ElementRef {
        self.element
    }

    pub fn text(&self) -> DriverResult<String> {
        self.driver.text(self.element)
    }

    /// The form value, or `None` when the element carries no value.
    pub fn value(&self) -> DriverResult<Option<String>> {
        self.driver.value(self.element)
    }

    pub fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        self.driver.attribute(self.element, name)
    }

    pub fn tag_name(&self) -> DriverResult<String> {
        self.driver.tag_name(self.element)
    }

    pub fn is_displayed(&self) -> DriverResult<bool> {
        self.driver.is_displayed(self.element)
    }

    pub fn is_enabled(&self) -> DriverResult<bool> {
        self.driver.is_enabled(self.element)
    }

    pub fn is_selected(&self) -> DriverResult<bool> {
        self.driver.is_selected(self.element)
    }

    pub fn rect(&self) -> DriverResult<Rect> {
        self.driver.rect(self.element)
    }

    pub fn click(&self) -> DriverResult<()> {
        self.driver.click(self.element)
    }

    pub fn send_keys(&self, text: &str) -> DriverResult<()> {
        self.driver.send_keys(self.element, text)
    }

    pub fn clear(&self) -> DriverResult<()> {
        self.driver.clear(self.element)
    }

    pub fn select_option(&self, choice: &SelectChoice) -> DriverResult<()> {
        self.driver.select_option(self.element, choice)
    }

    pub fn deselect_option(&self, choice: &SelectChoice) -> DriverResult<()> {
        self.driver.deselect_option(self.element, choice)
    }

    pub fn deselect_all(&self) -> DriverResult<()> {
        self.driver.deselect_all(self.element)
    }
}
