//! Lookup handles: immutable, re-invocable descriptions of how a collection
//! obtains its elements.
//!
//! A handle is a refinement plus the chain it refines. Handles never hold
//! element references themselves, so re-invoking one against the live
//! document is always legal; that is what makes collections repairable
//! after the document changes under them.

use std::sync::Arc;

use holdfast_core_types::{ElementRef, Selector};
use holdfast_driver::{Driver, Scope};

use crate::errors::{Error, Result};
use crate::selection::Node;
use crate::view::ElementView;

/// Stored filter predicate. Driver failures inside a predicate surface as
/// resolution failures and go through the ordinary recovery path.
pub(crate) type ElementPredicate = Box<dyn Fn(&ElementView<'_>) -> Result<bool> + Send + Sync>;

/// How one collection derives its elements from its parent.
pub(crate) enum Source {
    /// The whole-session root. Owns no elements.
    Root,
    /// Elements matching a selector within each parent element, or within
    /// the document when derived straight from the root.
    Query {
        selector: Selector,
        only_displayed: bool,
    },
    /// The parent element at one position; negative counts from the end.
    Nth { index: isize },
    /// Parent elements passing a predicate, document order preserved.
    Where {
        name: String,
        predicate: ElementPredicate,
    },
    /// Whatever element currently holds focus.
    Active,
    /// The parent node of each parent element.
    Parents,
}

impl Source {
    pub(crate) fn describe(&self) -> String {
        match self {
            Source::Root => "session".to_string(),
            Source::Query {
                selector,
                only_displayed: false,
            } => format!("find {}", selector),
            Source::Query {
                selector,
                only_displayed: true,
            } => format!("find {} (displayed)", selector),
            Source::Nth { index } => format!("nth {}", index),
            Source::Where { name, .. } => name.clone(),
            Source::Active => "active-element".to_string(),
            Source::Parents => "parent".to_string(),
        }
    }

    /// Re-derive the element set from the given parent elements.
    ///
    /// `parent_refs` is `None` when this source hangs straight off the
    /// session root: queries then run document-wide, and the positional or
    /// filtering sources see an empty input.
    pub(crate) fn resolve(
        &self,
        driver: &dyn Driver,
        parent_refs: Option<&[ElementRef]>,
    ) -> Result<Vec<ElementRef>> {
        match self {
            Source::Root => Ok(Vec::new()),
            Source::Query {
                selector,
                only_displayed,
            } => {
                let refs = match parent_refs {
                    None => driver.locate(Scope::Document, selector)?,
                    Some(parents) => {
                        let mut all = Vec::new();
                        for parent in parents {
                            all.extend(driver.locate(Scope::Element(parent), selector)?);
                        }
                        all
                    }
                };
                if !*only_displayed {
                    return Ok(refs);
                }
                let mut kept = Vec::with_capacity(refs.len());
                for element in refs {
                    if driver.is_displayed(&element)? {
                        kept.push(element);
                    }
                }
                Ok(kept)
            }
            Source::Nth { index } => {
                let parents = parent_refs.unwrap_or(&[]);
                let position = normalize_index(*index, parents.len()).ok_or(Error::IndexOutOfRange {
                    index: *index,
                    len: parents.len(),
                })?;
                Ok(vec![parents[position].clone()])
            }
            Source::Where { predicate, .. } => {
                let mut kept = Vec::new();
                for element in parent_refs.unwrap_or(&[]) {
                    let view = ElementView::new(driver, element);
                    if predicate(&view)? {
                        kept.push(element.clone());
                    }
                }
                Ok(kept)
            }
            Source::Active => Ok(vec![driver.active_element()?]),
            Source::Parents => {
                let mut parents_out = Vec::new();
                for element in parent_refs.unwrap_or(&[]) {
                    if let Some(parent) = driver.parent(element)? {
                        parents_out.push(parent);
                    }
                }
                Ok(parents_out)
            }
        }
    }
}

/// A refinement bound to the chain it refines. Immutable for its lifetime.
pub(crate) struct Lookup {
    pub(crate) parent: Option<Arc<Node>>,
    pub(crate) source: Source,
}

impl Lookup {
    pub(crate) fn root() -> Self {
        Self {
            parent: None,
            source: Source::Root,
        }
    }

    pub(crate) fn derived(parent: Arc<Node>, source: Source) -> Self {
        Self {
            parent: Some(parent),
            source,
        }
    }

    /// Human-readable chain path, rootmost refinement first.
    pub(crate) fn describe(&self) -> String {
        match &self.parent {
            Some(parent) if !parent.is_root() => {
                format!("{} > {}", parent.path(), self.source.describe())
            }
            _ => self.source.describe(),
        }
    }
}

/// Map a possibly-negative index onto `0..len`, or `None` when out of range.
pub(crate) fn normalize_index(index: isize, len: usize) -> Option<usize> {
    let len = len as isize;
    let position = if index < 0 { len + index } else { index };
    (0..len).contains(&position).then_some(position as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_driver::fake::{FakeDriver, FakeNode};

    fn list_fixture() -> FakeDriver {
        let driver = FakeDriver::new();
        driver.add_node(FakeNode::new("menu", "ul"));
        driver.add_node(FakeNode::new("aside", "ul"));
        driver.add_node(FakeNode::new("home", "li").text("Home").child_of("menu"));
        driver.add_node(FakeNode::new("docs", "li").text("Docs").child_of("menu"));
        driver.add_node(
            FakeNode::new("legal", "li")
                .text("Legal")
                .child_of("aside")
                .hidden(),
        );
        driver
    }

    fn labels(refs: &[ElementRef]) -> Vec<String> {
        refs.iter()
            .map(|r| r.as_str().split('@').next().unwrap().to_string())
            .collect()
    }

    #[test]
    fn normalize_index_handles_both_signs() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(2, 3), Some(2));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(-3, 3), Some(0));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(0, 0), None);
    }

    #[test]
    fn rootward_queries_run_document_wide() {
        let driver = list_fixture();
        let source = Source::Query {
            selector: Selector::css("li"),
            only_displayed: false,
        };
        let refs = source.resolve(&driver, None).unwrap();
        assert_eq!(labels(&refs), ["home", "docs", "legal"]);
    }

    #[test]
    fn queries_flatten_parent_scopes_in_order() {
        let driver = list_fixture();
        let lists = driver.locate(Scope::Document, &Selector::css("ul")).unwrap();
        let source = Source::Query {
            selector: Selector::css("li"),
            only_displayed: false,
        };
        let refs = source.resolve(&driver, Some(&lists)).unwrap();
        assert_eq!(labels(&refs), ["home", "docs", "legal"]);
    }

    #[test]
    fn displayed_only_queries_drop_hidden_elements() {
        let driver = list_fixture();
        let source = Source::Query {
            selector: Selector::css("li"),
            only_displayed: true,
        };
        let refs = source.resolve(&driver, None).unwrap();
        assert_eq!(labels(&refs), ["home", "docs"]);
    }

    #[test]
    fn nth_accepts_negative_positions() {
        let driver = list_fixture();
        let items = driver.locate(Scope::Document, &Selector::css("li")).unwrap();

        let refs = Source::Nth { index: -1 }.resolve(&driver, Some(&items)).unwrap();
        assert_eq!(labels(&refs), ["legal"]);

        let refs = Source::Nth { index: 0 }.resolve(&driver, Some(&items)).unwrap();
        assert_eq!(labels(&refs), ["home"]);
    }

    #[test]
    fn nth_out_of_range_is_fatal() {
        let driver = list_fixture();
        let items = driver.locate(Scope::Document, &Selector::css("li")).unwrap();
        let outcome = Source::Nth { index: -4 }.resolve(&driver, Some(&items));
        assert!(matches!(
            outcome,
            Err(Error::IndexOutOfRange { index: -4, len: 3 })
        ));
    }

    #[test]
    fn where_keeps_passing_elements_in_document_order() {
        let driver = list_fixture();
        let items = driver.locate(Scope::Document, &Selector::css("li")).unwrap();
        let source = Source::Where {
            name: "filter".to_string(),
            predicate: Box::new(|view| Ok(view.text()?.contains('o'))),
        };
        let refs = source.resolve(&driver, Some(&items)).unwrap();
        assert_eq!(labels(&refs), ["home", "docs"]);
    }

    #[test]
    fn parents_maps_each_element_to_its_container() {
        let driver = list_fixture();
        let items = driver.locate(Scope::Document, &Selector::css("li")).unwrap();
        let refs = Source::Parents.resolve(&driver, Some(&items)).unwrap();
        assert_eq!(labels(&refs), ["menu", "menu", "aside"]);
    }

    #[test]
    fn active_follows_the_focused_element() {
        let driver = list_fixture();
        driver.set_active("docs");
        let refs = Source::Active.resolve(&driver, None).unwrap();
        assert_eq!(labels(&refs), ["docs"]);
    }

    #[test]
    fn the_root_owns_no_elements() {
        let driver = list_fixture();
        let refs = Source::Root.resolve(&driver, None).unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn descriptions_name_the_refinement() {
        let query = Source::Query {
            selector: Selector::css("button"),
            only_displayed: false,
        };
        assert_eq!(query.describe(), "find css:button");
        assert_eq!(Source::Nth { index: -1 }.describe(), "nth -1");
        assert_eq!(Source::Parents.describe(), "parent");
    }
}
