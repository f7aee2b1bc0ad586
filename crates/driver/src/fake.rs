//! In-memory reference backend.
//!
//! A [`FakeDriver`] holds a flat node tree behind a mutex and mints
//! generation-stamped references: bumping the generation makes every
//! outstanding reference stale while fresh lookups keep working, which is
//! exactly the failure mode the engine exists to absorb. One-shot failure
//! injection, reveal-after-N locate scripting, call counters and an
//! interaction log make retry behavior observable from tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use holdfast_core_types::{ElementRef, Rect, ScrollTarget, SelectChoice, Selector, WindowSize};

use crate::errors::{DriverError, DriverErrorKind, DriverResult};
use crate::{Driver, Scope};

/// One option of a select node.
#[derive(Clone, Debug)]
pub struct FakeOption {
    pub text: String,
    pub value: String,
    pub selected: bool,
}

/// One node in the fake document. Build with the chainable setters, then
/// install via [`FakeDriver::add_node`].
#[derive(Clone, Debug)]
pub struct FakeNode {
    label: String,
    tag: String,
    text: String,
    value: Option<String>,
    attributes: HashMap<String, String>,
    displayed: bool,
    enabled: bool,
    selected: bool,
    multi: bool,
    options: Vec<FakeOption>,
    matches: Vec<Selector>,
    parent: Option<String>,
    reveal_after: u32,
    rect: Rect,
}

impl FakeNode {
    pub fn new(label: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tag: tag.into(),
            text: String::new(),
            value: None,
            attributes: HashMap::new(),
            displayed: true,
            enabled: true,
            selected: false,
            multi: false,
            options: Vec::new(),
            matches: Vec::new(),
            parent: None,
            reveal_after: 0,
            rect: Rect::default(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    /// Allow multiple selected options (required by the deselect family).
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn option(mut self, text: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(FakeOption {
            text: text.into(),
            value: value.into(),
            selected: false,
        });
        self
    }

    /// Additional selector this node answers to, beyond its bare tag name.
    pub fn matches(mut self, selector: Selector) -> Self {
        self.matches.push(selector);
        self
    }

    pub fn child_of(mut self, parent_label: impl Into<String>) -> Self {
        self.parent = Some(parent_label.into());
        self
    }

    /// Keep the node out of lookup results until the driver has served
    /// `count` locate calls in total.
    pub fn reveal_after(mut self, count: u32) -> Self {
        self.reveal_after = count;
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    fn answers(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Css(css) => self.tag == *css || self.matches.contains(selector),
            Selector::XPath(_) => self.matches.contains(selector),
            Selector::LinkText { text, exact } => {
                self.tag == "a"
                    && if *exact {
                        self.text == *text
                    } else {
                        self.text.contains(text.as_str())
                    }
            }
        }
    }
}

struct FakeState {
    nodes: Vec<FakeNode>,
    generation: u64,
    title: String,
    url: String,
    source: String,
    window: WindowSize,
    active: Option<String>,
    script_result: Value,
    failures: HashMap<String, Vec<DriverErrorKind>>,
    calls: HashMap<String, u32>,
    locate_log: Vec<String>,
    action_log: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            generation: 0,
            title: String::new(),
            url: "about:blank".to_string(),
            source: String::new(),
            window: WindowSize {
                width: 1280,
                height: 800,
            },
            active: None,
            script_result: Value::Null,
            failures: HashMap::new(),
            calls: HashMap::new(),
            locate_log: Vec::new(),
            action_log: Vec::new(),
        }
    }
}

impl FakeState {
    /// Count the call and surface the next injected failure for `op`, if any.
    fn tick(&mut self, op: &str) -> DriverResult<()> {
        *self.calls.entry(op.to_string()).or_insert(0) += 1;
        if let Some(queue) = self.failures.get_mut(op) {
            if !queue.is_empty() {
                let kind = queue.remove(0);
                return Err(DriverError::new(kind, format!("injected {} failure", op)));
            }
        }
        Ok(())
    }

    fn node(&self, label: &str) -> Option<&FakeNode> {
        self.nodes.iter().find(|n| n.label == label)
    }

    fn node_mut(&mut self, label: &str) -> Option<&mut FakeNode> {
        self.nodes.iter_mut().find(|n| n.label == label)
    }

    fn resolve(&self, element: &ElementRef) -> DriverResult<&FakeNode> {
        let (label, generation) = decode(element)?;
        if generation != self.generation {
            return Err(DriverError::stale(format!(
                "{} predates document generation {}",
                element, self.generation
            )));
        }
        self.node(&label)
            .ok_or_else(|| DriverError::stale(format!("node {} is gone", label)))
    }

    fn resolve_mut(&mut self, element: &ElementRef) -> DriverResult<&mut FakeNode> {
        let (label, generation) = decode(element)?;
        if generation != self.generation {
            return Err(DriverError::stale(format!(
                "{} predates document generation {}",
                element, self.generation
            )));
        }
        self.node_mut(&label)
            .ok_or_else(|| DriverError::stale(format!("node {} is gone", label)))
    }

    fn is_descendant(&self, node: &FakeNode, ancestor: &str) -> bool {
        let mut current = node.parent.as_deref();
        let mut hops = 0;
        while let Some(label) = current {
            if label == ancestor {
                return true;
            }
            hops += 1;
            if hops > 64 {
                return false;
            }
            current = self.node(label).and_then(|n| n.parent.as_deref());
        }
        false
    }
}

fn encode(label: &str, generation: u64) -> ElementRef {
    ElementRef::new(format!("{}@g{}", label, generation))
}

fn decode(element: &ElementRef) -> DriverResult<(String, u64)> {
    let raw = element.as_str();
    let unknown = || DriverError::internal(format!("unknown element reference {}", raw));
    let (label, generation) = raw.rsplit_once("@g").ok_or_else(unknown)?;
    let generation = generation.parse::<u64>().map_err(|_| unknown())?;
    Ok((label.to_string(), generation))
}

/// The in-memory backend. Shared freely behind `Arc`; all mutation goes
/// through the internal mutex.
#[derive(Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: FakeNode) {
        self.state.lock().nodes.push(node);
    }

    /// Make every outstanding reference stale. Fresh lookups keep working.
    pub fn invalidate_refs(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        debug!(generation = state.generation, "fake document invalidated");
    }

    /// Drop one node. References to it go stale; references to everything
    /// else stay live.
    pub fn remove_node(&self, label: &str) {
        self.state.lock().nodes.retain(|n| n.label != label);
    }

    pub fn set_node_text(&self, label: &str, text: impl Into<String>) {
        if let Some(node) = self.state.lock().node_mut(label) {
            node.text = text.into();
        }
    }

    pub fn set_node_displayed(&self, label: &str, displayed: bool) {
        if let Some(node) = self.state.lock().node_mut(label) {
            node.displayed = displayed;
        }
    }

    /// Queue a one-shot failure for the named operation ("locate", "click",
    /// ...). Queued kinds fire in order, one per call.
    pub fn fail_once(&self, op: &str, kind: DriverErrorKind) {
        self.state
            .lock()
            .failures
            .entry(op.to_string())
            .or_default()
            .push(kind);
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.state.lock().title = title.into();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    pub fn set_source(&self, source: impl Into<String>) {
        self.state.lock().source = source.into();
    }

    pub fn set_active(&self, label: impl Into<String>) {
        self.state.lock().active = Some(label.into());
    }

    pub fn set_script_result(&self, result: Value) {
        self.state.lock().script_result = result;
    }

    /// Total calls served for the named operation.
    pub fn calls(&self, op: &str) -> u32 {
        self.state.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Locate calls served for one selector, across all scopes.
    pub fn locates_for(&self, selector: &Selector) -> u32 {
        let needle = selector.to_string();
        self.state
            .lock()
            .locate_log
            .iter()
            .filter(|entry| **entry == needle)
            .count() as u32
    }

    pub fn action_log(&self) -> Vec<String> {
        self.state.lock().action_log.clone()
    }

    /// Indices of the currently selected options of a select node.
    pub fn selected_indices(&self, label: &str) -> Vec<usize> {
        self.state
            .lock()
            .node(label)
            .map(|n| {
                n.options
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.selected)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn node_value(&self, label: &str) -> Option<String> {
        self.state.lock().node(label).and_then(|n| n.value.clone())
    }
}

impl Driver for FakeDriver {
    fn locate(&self, scope: Scope<'_>, selector: &Selector) -> DriverResult<Vec<ElementRef>> {
        let mut state = self.state.lock();
        state.tick("locate")?;
        let served = state.calls.get("locate").copied().unwrap_or(0);

        let ancestor = match scope {
            Scope::Document => None,
            Scope::Element(parent) => Some(state.resolve(parent)?.label.clone()),
        };

        let mut refs = Vec::new();
        for node in &state.nodes {
            if node.reveal_after > served {
                continue;
            }
            if !node.answers(selector) {
                continue;
            }
            if let Some(a) = ancestor.as_deref() {
                if !state.is_descendant(node, a) {
                    continue;
                }
            }
            refs.push(encode(&node.label, state.generation));
        }

        state.locate_log.push(selector.to_string());
        debug!(selector = %selector, matches = refs.len(), "fake locate");
        Ok(refs)
    }

    fn text(&self, element: &ElementRef) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.tick("text")?;
        Ok(state.resolve(element)?.text.clone())
    }

    fn value(&self, element: &ElementRef) -> DriverResult<Option<String>> {
        let mut state = self.state.lock();
        state.tick("value")?;
        Ok(state.resolve(element)?.value.clone())
    }

    fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let mut state = self.state.lock();
        state.tick("attribute")?;
        Ok(state.resolve(element)?.attributes.get(name).cloned())
    }

    fn tag_name(&self, element: &ElementRef) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.tick("tag_name")?;
        Ok(state.resolve(element)?.tag.clone())
    }

    fn is_displayed(&self, element: &ElementRef) -> DriverResult<bool> {
        let mut state = self.state.lock();
        state.tick("is_displayed")?;
        Ok(state.resolve(element)?.displayed)
    }

    fn is_enabled(&self, element: &ElementRef) -> DriverResult<bool> {
        let mut state = self.state.lock();
        state.tick("is_enabled")?;
        Ok(state.resolve(element)?.enabled)
    }

    fn is_selected(&self, element: &ElementRef) -> DriverResult<bool> {
        let mut state = self.state.lock();
        state.tick("is_selected")?;
        Ok(state.resolve(element)?.selected)
    }

    fn rect(&self, element: &ElementRef) -> DriverResult<Rect> {
        let mut state = self.state.lock();
        state.tick("rect")?;
        Ok(state.resolve(element)?.rect)
    }

    fn parent(&self, element: &ElementRef) -> DriverResult<Option<ElementRef>> {
        let mut state = self.state.lock();
        state.tick("parent")?;
        let parent_label = state.resolve(element)?.parent.clone();
        let generation = state.generation;
        Ok(parent_label
            .filter(|label| state.node(label).is_some())
            .map(|label| encode(&label, generation)))
    }

    fn click(&self, element: &ElementRef) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("click")?;
        let label = state.resolve(element)?.label.clone();
        state.action_log.push(format!("click {}", label));
        Ok(())
    }

    fn send_keys(&self, element: &ElementRef, text: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("send_keys")?;
        let label = {
            let node = state.resolve_mut(element)?;
            let mut value = node.value.take().unwrap_or_default();
            value.push_str(text);
            node.value = Some(value);
            node.label.clone()
        };
        state.action_log.push(format!("send_keys {} '{}'", label, text));
        Ok(())
    }

    fn clear(&self, element: &ElementRef) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("clear")?;
        let label = {
            let node = state.resolve_mut(element)?;
            node.value = Some(String::new());
            node.label.clone()
        };
        state.action_log.push(format!("clear {}", label));
        Ok(())
    }

    fn select_option(&self, element: &ElementRef, choice: &SelectChoice) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("select_option")?;
        let label = {
            let node = state.resolve_mut(element)?;
            if node.options.is_empty() {
                return Err(DriverError::invalid_state(format!(
                    "node {} is not a select element",
                    node.label
                )));
            }
            let index = option_index(&node.options, choice).ok_or_else(|| {
                DriverError::no_such_element(format!("no option {} in {}", choice, node.label))
            })?;
            if !node.multi {
                for option in &mut node.options {
                    option.selected = false;
                }
            }
            node.options[index].selected = true;
            node.label.clone()
        };
        state.action_log.push(format!("select {} {}", label, choice));
        Ok(())
    }

    fn deselect_option(&self, element: &ElementRef, choice: &SelectChoice) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("deselect_option")?;
        let label = {
            let node = state.resolve_mut(element)?;
            if !node.multi {
                return Err(DriverError::invalid_state(format!(
                    "node {} does not allow multiple selection",
                    node.label
                )));
            }
            let index = option_index(&node.options, choice).ok_or_else(|| {
                DriverError::no_such_element(format!("no option {} in {}", choice, node.label))
            })?;
            node.options[index].selected = false;
            node.label.clone()
        };
        state
            .action_log
            .push(format!("deselect {} {}", label, choice));
        Ok(())
    }

    fn deselect_all(&self, element: &ElementRef) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("deselect_all")?;
        let label = {
            let node = state.resolve_mut(element)?;
            if !node.multi {
                return Err(DriverError::invalid_state(format!(
                    "node {} does not allow multiple selection",
                    node.label
                )));
            }
            for option in &mut node.options {
                option.selected = false;
            }
            node.label.clone()
        };
        state.action_log.push(format!("deselect_all {}", label));
        Ok(())
    }

    fn active_element(&self) -> DriverResult<ElementRef> {
        let mut state = self.state.lock();
        state.tick("active_element")?;
        let label = state
            .active
            .clone()
            .ok_or_else(|| DriverError::no_such_element("no active element"))?;
        Ok(encode(&label, state.generation))
    }

    fn title(&self) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.tick("title")?;
        Ok(state.title.clone())
    }

    fn page_source(&self) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.tick("page_source")?;
        Ok(state.source.clone())
    }

    fn current_url(&self) -> DriverResult<String> {
        let mut state = self.state.lock();
        state.tick("current_url")?;
        Ok(state.url.clone())
    }

    fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("navigate")?;
        state.url = url.to_string();
        state.generation += 1;
        state.action_log.push(format!("navigate {}", url));
        Ok(())
    }

    fn refresh(&self) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("refresh")?;
        state.generation += 1;
        state.action_log.push("refresh".to_string());
        Ok(())
    }

    fn execute_script(&self, script: &str) -> DriverResult<Value> {
        let mut state = self.state.lock();
        state.tick("execute_script")?;
        state.action_log.push(format!("script {}", script));
        Ok(state.script_result.clone())
    }

    fn window_size(&self) -> DriverResult<WindowSize> {
        let mut state = self.state.lock();
        state.tick("window_size")?;
        Ok(state.window)
    }

    fn set_window_size(&self, size: WindowSize) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("set_window_size")?;
        state.window = size;
        state
            .action_log
            .push(format!("resize {}x{}", size.width, size.height));
        Ok(())
    }

    fn scroll(&self, target: ScrollTarget) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.tick("scroll")?;
        state.action_log.push(format!("scroll {}", target));
        Ok(())
    }
}

fn option_index(options: &[FakeOption], choice: &SelectChoice) -> Option<usize> {
    match choice {
        SelectChoice::Text(text) => options.iter().position(|o| o.text == *text),
        SelectChoice::Value(value) => options.iter().position(|o| o.value == *value),
        SelectChoice::Index(index) => (*index < options.len()).then_some(*index),
    }
}
