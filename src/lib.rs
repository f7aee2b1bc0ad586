//! Fault-tolerant, chainable element access over automation drivers.
//!
//! Collections obtained through [`Selection`] remember how they were
//! derived, not just what they resolved to. When the target document
//! changes and a held reference goes stale, the operation that tripped
//! over it re-resolves the whole lookup chain root to leaf, in place, and
//! retries, bounded by a configurable deadline. Staleness becomes an
//! ordinary absorbed event instead of a fatal one.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use holdfast::driver::fake::{FakeDriver, FakeNode};
//! use holdfast::{Selection, WaitConfig};
//!
//! let driver = Arc::new(FakeDriver::new());
//! driver.add_node(FakeNode::new("accept", "button").text("Accept"));
//!
//! let wait = WaitConfig::new(Duration::from_secs(1), Duration::from_millis(20));
//! let session = Selection::root_with_config(driver, wait);
//!
//! let buttons = session.find("button");
//! buttons.until(|b: &Selection| b.count() == 1)?;
//! buttons.click()?;
//! assert_eq!(buttons.text()?, "Accept");
//! # Ok::<(), holdfast::Error>(())
//! ```

pub mod errors;
mod lookup;
pub mod selection;
mod view;
pub mod waiter;

pub use errors::{Error, LastSeen, Result};
pub use selection::Selection;
pub use view::ElementView;
pub use waiter::{Backoff, FailureKind, IntoOutcome, Poll, Waiter};

pub use holdfast_core_types::{
    ElementRef, FindOptions, Rect, ScrollTarget, SelectChoice, SelectSpec, Selector, WaitConfig,
    WindowSize, DEFAULT_POLL_INTERVAL, DEFAULT_TTL,
};
pub use holdfast_driver::{
    self as driver, Driver, DriverError, DriverErrorKind, DriverResult, Scope,
};
