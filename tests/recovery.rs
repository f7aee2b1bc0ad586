//! Staleness recovery and refresh propagation across lookup chains.

use std::sync::Arc;
use std::time::{Duration, Instant};

use holdfast::driver::fake::{FakeDriver, FakeNode};
use holdfast::{DriverErrorKind, Error, Selection, Selector, WaitConfig};

fn fast() -> WaitConfig {
    WaitConfig::new(Duration::from_millis(500), Duration::from_millis(20))
}

fn list_page() -> Arc<FakeDriver> {
    let driver = Arc::new(FakeDriver::new());
    driver.add_node(FakeNode::new("menu", "ul"));
    driver.add_node(FakeNode::new("home", "li").child_of("menu"));
    driver.add_node(FakeNode::new("docs", "li").child_of("menu"));
    driver.add_node(FakeNode::new("link", "a").text("Open").child_of("docs"));
    driver.add_node(FakeNode::new("icon", "span").child_of("link"));
    driver
}

#[test]
fn a_single_staleness_event_heals_with_exactly_one_refresh() {
    let driver = list_page();
    let session = Selection::root_with_config(driver.clone(), fast());
    let items = session.find("li");
    assert_eq!(items.count(), 2);
    assert_eq!(driver.locates_for(&Selector::css("li")), 1);

    driver.fail_once("click", DriverErrorKind::StaleElement);
    let started = Instant::now();
    items.click().unwrap();

    // One re-resolve, no sleeping, and nothing clicked twice.
    assert_eq!(driver.locates_for(&Selector::css("li")), 2);
    assert!(started.elapsed() < Duration::from_millis(20));
    assert_eq!(driver.action_log(), ["click home", "click docs"]);
}

#[test]
fn chains_of_any_depth_refresh_each_ancestor_exactly_once() {
    let selectors = ["ul", "li", "a", "span"];
    for depth in 1..=selectors.len() {
        let driver = list_page();
        let session = Selection::root_with_config(driver.clone(), fast());

        let mut chain = session;
        for selector in &selectors[..depth] {
            chain = chain.find(*selector);
        }
        assert!(chain.count() >= 1, "depth {} resolved empty", depth);

        driver.invalidate_refs();
        chain.click().unwrap();

        for selector in &selectors[..depth] {
            assert_eq!(
                driver.locates_for(&Selector::css(*selector)),
                2,
                "depth {}: {} was re-resolved more than once",
                depth,
                selector
            );
        }
    }
}

#[test]
fn transient_locate_failures_during_a_refresh_are_absorbed() {
    let driver = list_page();
    let session = Selection::root_with_config(driver.clone(), fast());
    let items = session.find("li");
    assert_eq!(items.count(), 2);

    driver.invalidate_refs();
    driver.fail_once("locate", DriverErrorKind::Io);
    items.click().unwrap();

    let clicks = driver.action_log();
    assert_eq!(
        clicks.iter().filter(|entry| *entry == "click home").count(),
        1
    );
    assert_eq!(
        clicks.iter().filter(|entry| *entry == "click docs").count(),
        1
    );
}

#[test]
fn persistent_staleness_exhausts_the_deadline_with_diagnostics() {
    let driver = list_page();
    let session = Selection::root_with_config(
        driver.clone(),
        WaitConfig::new(Duration::from_millis(150), Duration::from_millis(30)),
    );
    let items = session.find("li");
    assert_eq!(items.count(), 2);

    for _ in 0..64 {
        driver.fail_once("text", DriverErrorKind::StaleElement);
    }

    match items.at(1).text() {
        Err(Error::Timeout { operation, last }) => {
            assert!(operation.contains("text"), "operation was {}", operation);
            assert!(operation.contains("nth 1"), "operation was {}", operation);
            assert!(last.attempts >= 2);
            assert!(last.waited_ms >= 150);
            assert!(last.note.unwrap().contains("stale"));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[test]
fn fatal_driver_errors_propagate_without_retry() {
    let driver = list_page();
    let session = Selection::root_with_config(driver.clone(), fast());
    let items = session.find("li");
    assert_eq!(items.count(), 2);

    driver.fail_once("click", DriverErrorKind::Unsupported);
    let started = Instant::now();
    let outcome = items.click();

    assert!(matches!(
        outcome,
        Err(Error::Driver(ref e)) if e.kind == DriverErrorKind::Unsupported
    ));
    assert_eq!(driver.calls("click"), 1);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(driver.action_log().is_empty());
}

#[test]
fn a_vanished_element_aborts_the_remainder_with_a_shrunken_count() {
    let driver = list_page();
    let session = Selection::root_with_config(driver.clone(), fast());
    let items = session.find("li");
    assert_eq!(items.count(), 2);

    driver.remove_node("docs");
    let impatient = items.with_ttl(Duration::from_millis(120));
    let outcome = impatient.click();

    match outcome {
        Err(Error::Timeout { last, .. }) => {
            assert!(last.note.unwrap().contains("1 elements remain"));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    // The surviving element was acted on once and never re-acted on.
    assert_eq!(driver.action_log(), ["click home"]);
}

#[test]
fn reresolution_can_repair_a_collection_that_shrank_and_regrew() {
    let driver = list_page();
    let session = Selection::root_with_config(driver.clone(), fast());
    let items = session.find("li");
    assert_eq!(items.count(), 2);

    // The document is replaced wholesale; the chain repairs on next use.
    driver.invalidate_refs();
    assert_eq!(items.at(0).tag_name().unwrap(), "li");
    assert_eq!(driver.locates_for(&Selector::css("li")), 2);
}
