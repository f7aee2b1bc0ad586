//! Element collections: ordered, lazily resolved, self-healing, chainable.
//!
//! A collection is one node of a lookup chain. The node owns the handle
//! that produced it, a link to its parent node, and the opaque references
//! the handle last yielded. Every element-backed operation runs under the
//! retry protocol: on a recoverable failure the chain re-resolves itself
//! root to leaf, in place, and the operation is attempted again until the
//! deadline expires.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use holdfast_core_types::{
    ElementRef, FindOptions, Rect, ScrollTarget, SelectChoice, SelectSpec, Selector, WaitConfig,
    WindowSize,
};
use holdfast_driver::{Driver, DriverResult};

use crate::errors::{Error, Result};
use crate::lookup::{ElementPredicate, Lookup, Source};
use crate::view::ElementView;
use crate::waiter::{FailureKind, IntoOutcome, Poll, Waiter};

/// Backing references plus the state flags of the refresh protocol.
struct Backing {
    refs: Vec<ElementRef>,
    /// Set after the first successful resolve.
    resolved: bool,
    /// Set when this node was re-resolved during the current refresh pass,
    /// cleared when a new pass starts. One pass touches each chain node at
    /// most once however many failures triggered it.
    fresh: bool,
}

/// One node of the lookup chain.
pub(crate) struct Node {
    driver: Arc<dyn Driver>,
    lookup: Lookup,
    backing: RwLock<Backing>,
}

impl Node {
    fn create(driver: Arc<dyn Driver>, lookup: Lookup) -> Arc<Self> {
        Arc::new(Self {
            driver,
            lookup,
            backing: RwLock::new(Backing {
                refs: Vec::new(),
                resolved: false,
                fresh: false,
            }),
        })
    }

    pub(crate) fn is_root(&self) -> bool {
        matches!(self.lookup.source, Source::Root)
    }

    /// Chain path for logs and error messages.
    pub(crate) fn path(&self) -> String {
        self.lookup.describe()
    }

    fn snapshot(&self) -> Vec<ElementRef> {
        self.backing.read().refs.clone()
    }

    fn is_resolved(&self) -> bool {
        self.backing.read().resolved
    }

    /// Clear per-pass freshness from this node up to the root.
    fn clear_freshness(&self) {
        self.backing.write().fresh = false;
        if let Some(parent) = &self.lookup.parent {
            parent.clear_freshness();
        }
    }

    /// Re-resolve ancestors first, then this node, in place. Children are
    /// always re-derived from an already-refreshed parent; nodes refreshed
    /// earlier in the same pass are skipped.
    fn refresh(self: &Arc<Self>) -> Result<()> {
        if self.backing.read().fresh {
            return Ok(());
        }
        let parent_refs = match &self.lookup.parent {
            Some(parent) => {
                parent.refresh()?;
                if parent.is_root() {
                    None
                } else {
                    Some(parent.snapshot())
                }
            }
            None => None,
        };
        let refs = self
            .lookup
            .source
            .resolve(self.driver.as_ref(), parent_refs.as_deref())?;
        debug!(path = %self.path(), count = refs.len(), "resolved");
        let mut backing = self.backing.write();
        backing.refs = refs;
        backing.resolved = true;
        backing.fresh = true;
        Ok(())
    }

    /// One full root-to-leaf refresh pass.
    fn refresh_pass(self: &Arc<Self>) -> Result<()> {
        self.clear_freshness();
        self.refresh()
    }

    /// Resolve the chain if it has never been resolved; otherwise leave the
    /// current backing untouched.
    fn ensure_resolved(self: &Arc<Self>) -> Result<()> {
        if self.is_resolved() {
            return Ok(());
        }
        self.refresh()
    }
}

/// An ordered collection of elements behind a lookup chain.
///
/// Clones share the node, so a repair performed through one clone is
/// visible through all of them. The wait policy is copied per handle;
/// [`Selection::with_ttl`] and friends scope a different policy to the
/// calls made through that handle only.
#[derive(Clone)]
pub struct Selection {
    node: Arc<Node>,
    wait: WaitConfig,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("path", &self.node.path())
            .field("wait", &self.wait)
            .finish()
    }
}

impl Selection {
    /// Session root over `driver` with the default wait policy.
    pub fn root(driver: Arc<dyn Driver>) -> Selection {
        Self::root_with_config(driver, WaitConfig::default())
    }

    pub fn root_with_config(driver: Arc<dyn Driver>, wait: WaitConfig) -> Selection {
        Selection {
            node: Node::create(driver, Lookup::root()),
            wait,
        }
    }

    /// The same collection under a different wait policy.
    pub fn with_wait(&self, wait: WaitConfig) -> Selection {
        Selection {
            node: self.node.clone(),
            wait,
        }
    }

    pub fn with_ttl(&self, ttl: Duration) -> Selection {
        self.with_wait(self.wait.with_ttl(ttl))
    }

    pub fn with_poll_interval(&self, poll_interval: Duration) -> Selection {
        self.with_wait(self.wait.with_poll_interval(poll_interval))
    }

    pub fn wait_config(&self) -> WaitConfig {
        self.wait
    }

    fn driver(&self) -> &dyn Driver {
        self.node.driver.as_ref()
    }

    fn waiter(&self) -> Waiter {
        Waiter::new(self.wait)
    }

    // ---- resolution ----

    /// Force one refresh pass now, ancestors first.
    pub fn refresh(&self) -> Result<&Self> {
        self.node.refresh_pass()?;
        Ok(self)
    }

    /// Number of elements currently backing the collection, resolving the
    /// chain first if it never has been. Never fails: a chain that cannot
    /// resolve within the deadline reports zero.
    pub fn count(&self) -> usize {
        match self.on_elements("count", |_, refs| Ok(refs.len())) {
            Ok(len) => len,
            Err(error) => {
                warn!(path = %self.node.path(), error = %error, "count fell back to 0 on unresolvable chain");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Snapshot of the opaque references currently backing the collection.
    pub fn refs(&self) -> Result<Vec<ElementRef>> {
        self.on_elements("refs", |_, refs| Ok(refs.to_vec()))
    }

    /// One single-element collection per current element, in order.
    pub fn elements(&self) -> Result<Vec<Selection>> {
        let total = self.on_elements("elements", |_, refs| Ok(refs.len()))?;
        Ok((0..total).map(|position| self.get(position as isize)).collect())
    }

    // ---- single-valued accessors ----

    pub fn text(&self) -> Result<String> {
        self.on_single("text", |driver, element| driver.text(element))
    }

    /// The form value, or `None` when the element carries no value.
    pub fn value(&self) -> Result<Option<String>> {
        self.on_single("value", |driver, element| driver.value(element))
    }

    pub fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.on_single("attribute", |driver, element| driver.attribute(element, name))
    }

    pub fn tag_name(&self) -> Result<String> {
        self.on_single("tag_name", |driver, element| driver.tag_name(element))
    }

    pub fn is_displayed(&self) -> Result<bool> {
        self.on_single("is_displayed", |driver, element| driver.is_displayed(element))
    }

    pub fn is_enabled(&self) -> Result<bool> {
        self.on_single("is_enabled", |driver, element| driver.is_enabled(element))
    }

    pub fn is_selected(&self) -> Result<bool> {
        self.on_single("is_selected", |driver, element| driver.is_selected(element))
    }

    pub fn rect(&self) -> Result<Rect> {
        self.on_single("rect", |driver, element| driver.rect(element))
    }

    // ---- actions ----

    /// Click every element in order.
    pub fn click(&self) -> Result<&Self> {
        self.on_each("click", |view| Ok(view.click()?))?;
        Ok(self)
    }

    /// Send keystrokes to every element in order.
    pub fn type_text(&self, text: &str) -> Result<&Self> {
        self.on_each("type_text", |view| Ok(view.send_keys(text)?))?;
        Ok(self)
    }

    /// Clear the value of every element in order.
    pub fn clear(&self) -> Result<&Self> {
        self.on_each("clear", |view| Ok(view.clear()?))?;
        Ok(self)
    }

    /// Select an option on every element. Exactly one addressing form must
    /// be supplied; `index(0)` is the first option, not an omission.
    pub fn select(&self, spec: SelectSpec) -> Result<&Self> {
        let choice = match one_choice(&spec)? {
            Some(choice) => choice,
            None => {
                return Err(Error::invalid_argument(
                    "select requires one of text, value or index",
                ))
            }
        };
        self.on_each("select", |view| Ok(view.select_option(&choice)?))?;
        Ok(self)
    }

    /// Deselect an option on every element, or every option when no
    /// addressing form is supplied.
    pub fn deselect(&self, spec: SelectSpec) -> Result<&Self> {
        match one_choice(&spec)? {
            Some(choice) => {
                self.on_each("deselect", |view| Ok(view.deselect_option(&choice)?))?
            }
            None => self.on_each("deselect_all", |view| Ok(view.deselect_all()?))?,
        }
        Ok(self)
    }

    /// Apply an action to every element sequentially. A failure at any
    /// position aborts the remainder and propagates; an empty collection
    /// is a no-op.
    pub fn apply(&self, action: impl FnMut(&ElementView<'_>) -> Result<()>) -> Result<&Self> {
        self.on_each("apply", action)?;
        Ok(self)
    }

    /// Project every element through `f`, in order.
    pub fn map<T>(&self, mut f: impl FnMut(&ElementView<'_>) -> Result<T>) -> Result<Vec<T>> {
        let mut collected = Vec::new();
        self.on_each("map", |view| {
            collected.push(f(view)?);
            Ok(())
        })?;
        Ok(collected)
    }

    // ---- derivation ----

    fn derive(&self, source: Source) -> Selection {
        Selection {
            node: Node::create(
                self.node.driver.clone(),
                Lookup::derived(self.node.clone(), source),
            ),
            wait: self.wait,
        }
    }

    /// Elements matching `selector` within each element of this collection,
    /// or within the document when called on the root. Lazy: no driver
    /// traffic until the result is first used.
    pub fn find(&self, selector: impl Into<Selector>) -> Selection {
        self.derive(Source::Query {
            selector: selector.into(),
            only_displayed: false,
        })
    }

    /// [`Selection::find`] with options: displayed-only filtering, or
    /// blocking until the query yields at least one element.
    pub fn find_opts(
        &self,
        selector: impl Into<Selector>,
        options: FindOptions,
    ) -> Result<Selection> {
        let derived = self.derive(Source::Query {
            selector: selector.into(),
            only_displayed: options.only_displayed,
        });
        let derived = match options.wait_config {
            Some(config) => derived.with_wait(config),
            None => derived,
        };
        if options.wait {
            derived.until(|collection: &Selection| collection.count() > 0)
        } else {
            Ok(derived)
        }
    }

    /// [`Selection::find`], blocking until at least one match appears.
    pub fn find_with_wait(&self, selector: impl Into<Selector>) -> Result<Selection> {
        self.find_opts(selector, FindOptions::waiting())
    }

    /// Anchors whose text equals `text`.
    pub fn find_link(&self, text: impl Into<String>) -> Selection {
        self.derive(Source::Query {
            selector: Selector::link_text(text, true),
            only_displayed: false,
        })
    }

    /// Anchors whose text contains `text`.
    pub fn find_link_partial(&self, text: impl Into<String>) -> Selection {
        self.derive(Source::Query {
            selector: Selector::link_text(text, false),
            only_displayed: false,
        })
    }

    /// Elements of this collection passing `predicate`, order preserved.
    /// The predicate re-applies on every refresh.
    pub fn filter<P, O>(&self, predicate: P) -> Selection
    where
        P: Fn(&ElementView<'_>) -> O + Send + Sync + 'static,
        O: IntoOutcome,
    {
        let predicate: ElementPredicate = Box::new(move |view| predicate(view).into_outcome());
        self.derive(Source::Where {
            name: "filter".to_string(),
            predicate,
        })
    }

    /// The element at `index`; negative indexes count from the end. The
    /// position re-applies on every refresh, so the result keeps meaning
    /// "the i-th match" over document churn.
    pub fn get(&self, index: isize) -> Selection {
        self.derive(Source::Nth { index })
    }

    /// Alias of [`Selection::get`].
    pub fn at(&self, index: isize) -> Selection {
        self.get(index)
    }

    /// The parent element of each element in this collection.
    pub fn parent(&self) -> Selection {
        self.derive(Source::Parents)
    }

    /// The element currently holding focus.
    pub fn active_element(&self) -> Selection {
        self.derive(Source::Active)
    }

    // ---- waits ----

    /// Block until `predicate` holds, re-resolving the chain between
    /// polls. Deadline expiry raises the timeout kind. Returns the
    /// collection for chaining.
    pub fn until<P, O>(&self, predicate: P) -> Result<Selection>
    where
        P: Fn(&Selection) -> O,
        O: IntoOutcome,
    {
        self.wait_for(FailureKind::Timeout, predicate)
    }

    /// Same polling as [`Selection::until`]; deadline expiry raises the
    /// assertion kind instead.
    pub fn insist<P, O>(&self, predicate: P) -> Result<Selection>
    where
        P: Fn(&Selection) -> O,
        O: IntoOutcome,
    {
        self.wait_for(FailureKind::Assertion, predicate)
    }

    fn wait_for<P, O>(&self, kind: FailureKind, predicate: P) -> Result<Selection>
    where
        P: Fn(&Selection) -> O,
        O: IntoOutcome,
    {
        let label = format!("condition on {}", self.node.path());
        let waiter = self.waiter().with_failure(kind);
        waiter.until(
            &label,
            || self.node.refresh_pass(),
            || {
                self.node.ensure_resolved()?;
                if predicate(self).into_outcome()? {
                    Ok(Poll::Ready(self.clone()))
                } else {
                    Ok(Poll::Pending(Some(format!(
                        "{} elements did not satisfy the condition",
                        self.node.snapshot().len()
                    ))))
                }
            },
        )
    }

    /// Retry an arbitrary caller operation under this collection's wait
    /// policy. Escape hatch for driver capabilities the engine does not
    /// wrap.
    pub fn run<T>(&self, operation: &str, attempt: impl FnMut() -> Result<T>) -> Result<T> {
        self.waiter().retry(operation, attempt)
    }

    // ---- session ----

    pub fn title(&self) -> Result<String> {
        self.on_session("title", |driver| driver.title())
    }

    pub fn page_source(&self) -> Result<String> {
        self.on_session("page_source", |driver| driver.page_source())
    }

    pub fn current_url(&self) -> Result<String> {
        self.on_session("current_url", |driver| driver.current_url())
    }

    pub fn navigate(&self, url: &str) -> Result<&Self> {
        self.on_session("navigate", |driver| driver.navigate(url))?;
        Ok(self)
    }

    /// Reload the current page. Element references across the session are
    /// expected to go stale; chains repair themselves on next use.
    pub fn reload(&self) -> Result<&Self> {
        self.on_session("reload", |driver| driver.refresh())?;
        Ok(self)
    }

    pub fn execute_script(&self, script: &str) -> Result<Value> {
        self.on_session("execute_script", |driver| driver.execute_script(script))
    }

    pub fn window_size(&self) -> Result<WindowSize> {
        self.on_session("window_size", |driver| driver.window_size())
    }

    pub fn set_window_size(&self, size: WindowSize) -> Result<&Self> {
        self.on_session("set_window_size", move |driver| driver.set_window_size(size))?;
        Ok(self)
    }

    pub fn scroll(&self, target: ScrollTarget) -> Result<&Self> {
        self.on_session("scroll", move |driver| driver.scroll(target))?;
        Ok(self)
    }

    pub fn scroll_top(&self) -> Result<&Self> {
        self.scroll(ScrollTarget::Top)
    }

    pub fn scroll_bottom(&self) -> Result<&Self> {
        self.scroll(ScrollTarget::Bottom)
    }

    // ---- engine plumbing ----

    /// Run an element-backed operation under the retry protocol: resolve
    /// lazily, hand the current references to `operate`, and on a
    /// recoverable failure refresh the chain and try again until the
    /// deadline.
    fn on_elements<T>(
        &self,
        operation: &str,
        mut operate: impl FnMut(&dyn Driver, &[ElementRef]) -> Result<T>,
    ) -> Result<T> {
        let label = format!("{} on {}", operation, self.node.path());
        self.waiter().retry_recovering(
            &label,
            || self.node.refresh_pass(),
            || {
                self.node.ensure_resolved()?;
                let refs = self.node.snapshot();
                operate(self.driver(), &refs)
            },
        )
    }

    /// Element-backed read that requires exactly one element. Zero and
    /// many are usage errors raised without retry, from a fresh resolve.
    fn on_single<T>(
        &self,
        operation: &'static str,
        mut read: impl FnMut(&dyn Driver, &ElementRef) -> DriverResult<T>,
    ) -> Result<T> {
        self.on_elements(operation, |driver, refs| match refs {
            [] => Err(Error::not_found(operation)),
            [element] => Ok(read(driver, element)?),
            many => Err(Error::ambiguous(operation, many.len())),
        })
    }

    /// Apply `act` to every element in order. Each position runs under its
    /// own retry protocol against a shared deadline, so healing element k
    /// never re-acts on elements before it. A position that disappears
    /// stays pending until the deadline expires.
    fn on_each(
        &self,
        operation: &str,
        mut act: impl FnMut(&ElementView<'_>) -> Result<()>,
    ) -> Result<()> {
        let total = self.on_elements(operation, |_, refs| Ok(refs.len()))?;
        let started = Instant::now();
        for position in 0..total {
            let remaining = self.wait.ttl.saturating_sub(started.elapsed());
            let waiter = Waiter::new(self.wait.with_ttl(remaining));
            let label = format!(
                "{} on {} [element {}/{}]",
                operation,
                self.node.path(),
                position + 1,
                total
            );
            waiter.until(
                &label,
                || self.node.refresh_pass(),
                || {
                    self.node.ensure_resolved()?;
                    let refs = self.node.snapshot();
                    match refs.get(position) {
                        None => Ok(Poll::Pending(Some(format!(
                            "{} elements remain after refresh",
                            refs.len()
                        )))),
                        Some(element) => {
                            act(&ElementView::new(self.driver(), element))?;
                            Ok(Poll::Ready(()))
                        }
                    }
                },
            )?;
        }
        Ok(())
    }

    fn on_session<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut(&dyn Driver) -> DriverResult<T>,
    ) -> Result<T> {
        self.waiter().retry(operation, || Ok(call(self.driver())?))
    }
}

/// Collapse a spec into at most one driver choice. Supplying more than one
/// addressing form is a usage error whatever the values are, index 0
/// included.
fn one_choice(spec: &SelectSpec) -> Result<Option<SelectChoice>> {
    if spec.supplied() > 1 {
        return Err(Error::invalid_argument(
            "text, value and index are mutually exclusive select forms",
        ));
    }
    Ok(spec
        .text
        .clone()
        .map(SelectChoice::Text)
        .or_else(|| spec.value.clone().map(SelectChoice::Value))
        .or_else(|| spec.index.map(SelectChoice::Index)))
}
