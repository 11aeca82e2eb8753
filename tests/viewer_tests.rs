use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::Receiver;
use pdf_embed::pdf::{ScaleDescriptor, Source, ViewerError};
use pdf_embed::test_utils::{
    EngineStats, FakeDocument, FakeEngine, SurfaceOp, TestHost, drain_events,
};
use pdf_embed::{Event, Props, Viewer, ViewerConfig};
use serde_json::json;

fn config() -> ViewerConfig {
    ViewerConfig {
        scroll_width: 0.0,
        ..ViewerConfig::default()
    }
}

/// Mount with no source, subscribe, then hand over `src` so no event is missed
fn mount(
    engine: FakeEngine,
    host: &TestHost,
    props: Props,
    src: Option<Source>,
) -> (Viewer, Receiver<Event>) {
    let viewer = Viewer::mount(Arc::new(engine), host.parts(), props, config());
    let events = viewer.events();
    viewer.set_src(src);
    (viewer, events)
}

fn wait_for(events: &Receiver<Event>, done: impl Fn(&Event) -> bool) -> Vec<Event> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    while let Ok(event) = events.recv_deadline(deadline) {
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
    panic!("timed out, saw {:?}", seen.iter().map(Event::name).collect::<Vec<_>>());
}

fn page_loaded(events: &Receiver<Event>) -> Vec<Event> {
    wait_for(events, |e| matches!(e, Event::PageLoaded(_)))
}

fn three_pages() -> FakeEngine {
    FakeEngine::new().with_document("a.pdf", FakeDocument::with_pages(3))
}

#[test]
fn test_loaded_document_fetches_page_from_props() {
    let host = TestHost::new();
    let props = Props {
        page: 2,
        rotate: 90,
        ..Props::default()
    };
    let (viewer, events) = mount(three_pages(), &host, props, Some(Source::from("a.pdf")));

    let seen = page_loaded(&events);
    assert!(matches!(seen.last(), Some(Event::PageLoaded(2))));
    assert_eq!(host.surface.draws(), vec![(1200, 800)]);
    assert!(host.surface.ops().contains(&SurfaceOp::DisplayHeight(800.0)));
    assert_eq!(viewer.page(), 2);
    assert_eq!(viewer.rotate(), 90);
}

#[test]
fn test_unsupported_source_value_is_rejected_without_events() {
    let host = TestHost::new();
    let (viewer, events) = mount(three_pages(), &host, Props::default(), None);
    viewer.controller().wait_idle();
    drain_events(&events);

    for value in [json!(42), json!(true)] {
        let err = viewer.set_src_value(&value).unwrap_err();
        assert!(matches!(err, ViewerError::InvalidInput { .. }));
    }
    viewer.controller().wait_idle();
    assert!(drain_events(&events).is_empty());

    viewer.set_src_value(&json!(null)).unwrap();
    viewer.controller().wait_idle();
    assert!(matches!(
        drain_events(&events).as_slice(),
        [Event::NumPages(None)]
    ));
}

#[test]
fn test_source_descriptor_object_loads() {
    let host = TestHost::new();
    let (viewer, events) = mount(three_pages(), &host, Props::default(), None);

    viewer.set_src_value(&json!({ "url": "a.pdf" })).unwrap();
    let seen = page_loaded(&events);
    assert!(seen.iter().any(|e| matches!(e, Event::NumPages(Some(3)))));
}

#[test]
fn test_resize_rerenders_only_when_resolution_drifts() {
    let host = TestHost::new();
    let (viewer, events) = mount(
        three_pages(),
        &host,
        Props::default(),
        Some(Source::from("a.pdf")),
    );
    page_loaded(&events);
    assert_eq!(viewer.controller().resolution_scale(), Some(1.0));

    assert!(!viewer.on_resize(800.0, 1200.0));
    assert!(!viewer.on_resize(0.0, 0.0));

    host.surface.set_attached(false);
    host.surface.set_displayed_width(400.0);
    assert!(!viewer.on_resize(400.0, 600.0));

    host.surface.set_attached(true);
    host.surface.clear_ops();
    assert!(viewer.on_resize(400.0, 600.0));
    viewer.controller().wait_idle();

    let ops = host.surface.ops();
    assert_eq!(ops.first(), Some(&SurfaceOp::DisplayHeight(600.0)));
    assert_eq!(host.surface.draws(), vec![(400, 600)]);
    assert_eq!(viewer.controller().resolution_scale(), Some(1.0));
}

#[test]
fn test_resize_before_first_render_is_ignored() {
    let host = TestHost::new();
    let (viewer, _events) = mount(three_pages(), &host, Props::default(), None);
    viewer.controller().wait_idle();

    assert!(!viewer.on_resize(640.0, 480.0));
}

#[test]
fn test_page_and_scale_changes() {
    let host = TestHost::new();
    let (viewer, events) = mount(
        three_pages(),
        &host,
        Props::default(),
        Some(Source::from("a.pdf")),
    );
    page_loaded(&events);

    viewer.set_page(3);
    let seen = page_loaded(&events);
    assert!(matches!(seen.last(), Some(Event::PageLoaded(3))));
    assert_eq!(viewer.page(), 3);

    viewer.set_scale(ScaleDescriptor::percent(50.0));
    viewer.controller().wait_idle();
    assert_eq!(viewer.scale(), Some(ScaleDescriptor::percent(50.0)));
    assert_eq!(host.surface.draws().last(), Some(&(400, 600)));

    viewer.set_rotate(180);
    viewer.controller().wait_idle();
    assert_eq!(host.surface.draws().last(), Some(&(800, 1200)));
}

#[test]
fn test_unmount_releases_document() {
    let engine = three_pages();
    let stats = engine.stats();
    let host = TestHost::new();
    let (viewer, events) = mount(engine, &host, Props::default(), Some(Source::from("a.pdf")));
    page_loaded(&events);

    viewer.unmount();

    assert_eq!(EngineStats::get(&stats.documents_destroyed), 1);
    assert_eq!(EngineStats::get(&stats.max_active_renders), 1);
}
