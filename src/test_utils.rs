//! In-memory engine and host doubles for exercising viewer sessions

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flume::Receiver;

use crate::notification::Event;
use crate::pdf::{
    Annotation, AnnotationKind, AnnotationRect, CancelToken, ContainerMetrics, DocumentSource,
    EngineError, HostParts, LinkService, LinkTarget, LoadingTask, Overlay, PageSize,
    PasswordReason, PdfDocument, PdfEngine, PdfPage, PrintFrame, PrintHost, Raster, RenderIntent,
    Surface, Viewport,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drain everything currently queued on an event channel
pub fn drain_events(rx: &Receiver<Event>) -> Vec<Event> {
    rx.try_iter().collect()
}

/// Event names in emission order
pub fn event_names(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::name).collect()
}

/// Counters shared by a fake engine and everything it creates
#[derive(Debug, Default)]
pub struct EngineStats {
    pub opens: AtomicUsize,
    pub active_renders: AtomicUsize,
    pub max_active_renders: AtomicUsize,
    pub renders_started: AtomicUsize,
    pub renders_completed: AtomicUsize,
    pub renders_cancelled: AtomicUsize,
    pub print_renders: AtomicUsize,
    pub documents_destroyed: AtomicUsize,
    /// (document label, page number) for every page fetch
    pub page_fetches: Mutex<Vec<(String, usize)>>,
}

impl EngineStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> Vec<(String, usize)> {
        lock(&self.page_fetches).clone()
    }
}

/// How a fake document behaves
#[derive(Clone, Debug)]
pub struct FakeDocument {
    pub pages: Vec<PageSize>,
    pub rotation: i32,
    pub password: Option<String>,
    pub open_delay: Duration,
    pub failing_pages: BTreeSet<usize>,
}

impl FakeDocument {
    /// `count` pages of 400x600pt
    pub fn with_pages(count: usize) -> Self {
        Self {
            pages: vec![PageSize::new(400.0, 600.0); count],
            rotation: 0,
            password: None,
            open_delay: Duration::ZERO,
            failing_pages: BTreeSet::new(),
        }
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn failing_page(mut self, number: usize) -> Self {
        self.failing_pages.insert(number);
        self
    }
}

/// Engine serving canned documents by URL; byte sources open the `bytes` entry
pub struct FakeEngine {
    documents: HashMap<String, FakeDocument>,
    render_delay: Duration,
    stats: Arc<EngineStats>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            render_delay: Duration::ZERO,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn with_document(mut self, key: &str, doc: FakeDocument) -> Self {
        self.documents.insert(key.to_string(), doc);
        self
    }

    /// How long each display render takes unless cancelled
    pub fn render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    fn authenticate(fixture: &FakeDocument, task: &LoadingTask) -> Result<(), EngineError> {
        let Some(expected) = &fixture.password else {
            return Ok(());
        };

        let mut attempt = task.options().password.clone();
        let mut reason = PasswordReason::NeedPassword;
        loop {
            match attempt {
                Some(ref given) if given == expected => return Ok(()),
                Some(_) => reason = PasswordReason::IncorrectPassword,
                None => {}
            }
            attempt = Some(
                task.request_password(reason)
                    .ok_or(EngineError::PasswordRequired)?,
            );
        }
    }
}

impl PdfEngine for FakeEngine {
    fn open(&self, task: &LoadingTask) -> Result<Arc<dyn PdfDocument>, EngineError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);

        let key = match task.source() {
            DocumentSource::Url(url) => url.clone(),
            DocumentSource::Data(_) => "bytes".to_string(),
        };
        let fixture = self
            .documents
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::generic(format!("{key}: not found")))?;

        task.report_progress(1, 2);
        std::thread::sleep(fixture.open_delay);
        Self::authenticate(&fixture, task)?;
        task.report_progress(2, 2);

        Ok(Arc::new(FakeDoc {
            label: key,
            fixture,
            render_delay: self.render_delay,
            destroyed: AtomicBool::new(false),
            stats: self.stats.clone(),
        }))
    }
}

struct FakeDoc {
    label: String,
    fixture: FakeDocument,
    render_delay: Duration,
    destroyed: AtomicBool,
    stats: Arc<EngineStats>,
}

impl PdfDocument for FakeDoc {
    fn page_count(&self) -> usize {
        self.fixture.pages.len()
    }

    fn page(&self, number: usize) -> Result<Arc<dyn PdfPage>, EngineError> {
        if self.is_destroyed() {
            return Err(EngineError::Destroyed);
        }
        let count = self.page_count();
        let size = *number
            .checked_sub(1)
            .and_then(|i| self.fixture.pages.get(i))
            .ok_or(EngineError::InvalidPage { number, count })?;

        lock(&self.stats.page_fetches).push((self.label.clone(), number));

        Ok(Arc::new(FakePage {
            number,
            size,
            rotation: self.fixture.rotation,
            fails: self.fixture.failing_pages.contains(&number),
            render_delay: self.render_delay,
            page_count: count,
            stats: self.stats.clone(),
        }))
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.stats.documents_destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

struct FakePage {
    number: usize,
    size: PageSize,
    rotation: i32,
    fails: bool,
    render_delay: Duration,
    page_count: usize,
    stats: Arc<EngineStats>,
}

impl FakePage {
    fn wait_or_cancel(&self, cancel: &CancelToken) -> bool {
        let step = Duration::from_millis(1);
        let mut waited = Duration::ZERO;
        while waited < self.render_delay {
            if cancel.is_cancelled() {
                return false;
            }
            std::thread::sleep(step);
            waited += step;
        }
        !cancel.is_cancelled()
    }
}

impl PdfPage for FakePage {
    fn number(&self) -> usize {
        self.number
    }

    fn size(&self) -> PageSize {
        self.size
    }

    fn rotation(&self) -> i32 {
        self.rotation
    }

    fn render(
        &self,
        viewport: &Viewport,
        intent: RenderIntent,
        cancel: &CancelToken,
    ) -> Result<Raster, EngineError> {
        let (width, height) = viewport.pixel_size();

        if intent == RenderIntent::Print {
            self.stats.print_renders.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                return Err(EngineError::generic("broken page"));
            }
            return Ok(Raster::blank(width, height));
        }

        let stats = &self.stats;
        stats.renders_started.fetch_add(1, Ordering::SeqCst);
        let active = stats.active_renders.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_active_renders.fetch_max(active, Ordering::SeqCst);

        let finished = self.wait_or_cancel(cancel);
        stats.active_renders.fetch_sub(1, Ordering::SeqCst);

        if !finished {
            stats.renders_cancelled.fetch_add(1, Ordering::SeqCst);
            return Err(EngineError::Cancelled);
        }
        if self.fails {
            return Err(EngineError::generic("broken page"));
        }
        stats.renders_completed.fetch_add(1, Ordering::SeqCst);
        Ok(Raster::blank(width, height))
    }

    fn annotations(&self, _intent: RenderIntent) -> Result<Vec<Annotation>, EngineError> {
        let next = if self.number < self.page_count {
            self.number + 1
        } else {
            1
        };
        Ok(vec![Annotation {
            rect: AnnotationRect {
                x0: 10.0,
                y0: 10.0,
                x1: 50.0,
                y1: 20.0,
            },
            kind: AnnotationKind::Link(LinkTarget::Page { number: next }),
        }])
    }
}

/// Surface and overlay calls in the order the host saw them
#[derive(Clone, Debug, PartialEq)]
pub enum HostOp {
    Surface(SurfaceOp),
    Overlay(OverlayOp),
}

type Timeline = Arc<Mutex<Vec<HostOp>>>;

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    Resize(u32, u32),
    Draw(u32, u32),
    Clear,
    Reset,
    DisplayHeight(f64),
}

/// Surface that records every call
pub struct RecordingSurface {
    displayed_width: Mutex<f64>,
    pixel_ratio: f64,
    attached: AtomicBool,
    size: Mutex<(u32, u32)>,
    ops: Mutex<Vec<SurfaceOp>>,
    timeline: Timeline,
}

impl RecordingSurface {
    pub fn new(displayed_width: f64) -> Self {
        Self::with_pixel_ratio(displayed_width, 1.0)
    }

    pub fn with_pixel_ratio(displayed_width: f64, pixel_ratio: f64) -> Self {
        Self {
            displayed_width: Mutex::new(displayed_width),
            pixel_ratio,
            attached: AtomicBool::new(true),
            size: Mutex::new((0, 0)),
            ops: Mutex::new(Vec::new()),
            timeline: Timeline::default(),
        }
    }

    pub fn set_displayed_width(&self, width: f64) {
        *lock(&self.displayed_width) = width;
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        lock(&self.ops).clone()
    }

    pub fn draws(&self) -> Vec<(u32, u32)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::Draw(w, h) => Some((w, h)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_ops(&self) {
        lock(&self.ops).clear();
    }

    fn record(&self, op: SurfaceOp) {
        lock(&self.timeline).push(HostOp::Surface(op.clone()));
        lock(&self.ops).push(op);
    }
}

impl Surface for RecordingSurface {
    fn displayed_width(&self) -> f64 {
        *lock(&self.displayed_width)
    }

    fn raster_size(&self) -> (u32, u32) {
        *lock(&self.size)
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn resize(&self, width: u32, height: u32) {
        *lock(&self.size) = (width, height);
        self.record(SurfaceOp::Resize(width, height));
    }

    fn draw(&self, raster: &Raster) {
        self.record(SurfaceOp::Draw(raster.width, raster.height));
    }

    fn clear(&self) {
        self.record(SurfaceOp::Clear);
    }

    fn reset(&self) {
        *lock(&self.size) = (0, 0);
        self.record(SurfaceOp::Reset);
    }

    fn set_display_height(&self, height: f64) {
        self.record(SurfaceOp::DisplayHeight(height));
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverlayOp {
    Clear,
    Visible(bool),
    /// Number of annotations rendered
    Render(usize),
}

/// Overlay that records calls and keeps the last link service
#[derive(Default)]
pub struct RecordingOverlay {
    ops: Mutex<Vec<OverlayOp>>,
    links: Mutex<Option<LinkService>>,
    timeline: Timeline,
}

impl RecordingOverlay {
    pub fn ops(&self) -> Vec<OverlayOp> {
        lock(&self.ops).clone()
    }

    pub fn links(&self) -> Option<LinkService> {
        lock(&self.links).clone()
    }

    pub fn is_visible(&self) -> bool {
        self.ops()
            .iter()
            .rev()
            .find_map(|op| match op {
                OverlayOp::Visible(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(true)
    }

    fn record(&self, op: OverlayOp) {
        lock(&self.timeline).push(HostOp::Overlay(op.clone()));
        lock(&self.ops).push(op);
    }
}

impl Overlay for RecordingOverlay {
    fn clear(&self) {
        self.record(OverlayOp::Clear);
    }

    fn set_visible(&self, visible: bool) {
        self.record(OverlayOp::Visible(visible));
    }

    fn render(&self, annotations: &[Annotation], _viewport: &Viewport, links: &LinkService) {
        self.record(OverlayOp::Render(annotations.len()));
        *lock(&self.links) = Some(links.clone());
    }
}

/// What happened to print frames
#[derive(Debug, Default)]
pub struct PrintLog {
    pub frames_created: usize,
    pub frames_removed: usize,
    pub pages: Vec<(u32, u32)>,
    pub styles: Vec<String>,
    pub printed: usize,
}

/// Print host recording frames; can be told to fail
#[derive(Default)]
pub struct RecordingPrintHost {
    log: Arc<Mutex<PrintLog>>,
    fail_print: bool,
}

impl RecordingPrintHost {
    pub fn failing() -> Self {
        Self {
            fail_print: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, PrintLog> {
        lock(&self.log)
    }
}

impl PrintHost for RecordingPrintHost {
    fn create_frame(&self) -> Result<Box<dyn PrintFrame>, String> {
        lock(&self.log).frames_created += 1;
        Ok(Box::new(RecordingFrame {
            log: self.log.clone(),
            fail_print: self.fail_print,
        }))
    }
}

struct RecordingFrame {
    log: Arc<Mutex<PrintLog>>,
    fail_print: bool,
}

impl PrintFrame for RecordingFrame {
    fn set_title(&mut self, _title: &str) {}

    fn inject_style(&mut self, css: &str) {
        lock(&self.log).styles.push(css.to_string());
    }

    fn append_page(&mut self, raster: Raster) {
        lock(&self.log).pages.push((raster.width, raster.height));
    }

    fn print(&mut self) -> Result<(), String> {
        if self.fail_print {
            return Err("printer on fire".into());
        }
        lock(&self.log).printed += 1;
        Ok(())
    }

    fn remove(&mut self) {
        lock(&self.log).frames_removed += 1;
    }
}

/// Recording host objects plus the parts bundle handed to a controller
pub struct TestHost {
    pub surface: Arc<RecordingSurface>,
    pub overlay: Arc<RecordingOverlay>,
    pub printer: Arc<RecordingPrintHost>,
    pub metrics: ContainerMetrics,
    timeline: Timeline,
}

impl TestHost {
    /// Surface displayed 800px wide inside an 800px content box, no print
    /// failures
    pub fn new() -> Self {
        Self::with(RecordingSurface::new(800.0), RecordingPrintHost::default())
    }

    pub fn with(surface: RecordingSurface, printer: RecordingPrintHost) -> Self {
        let timeline = Timeline::default();
        let surface = RecordingSurface {
            timeline: timeline.clone(),
            ..surface
        };
        let overlay = RecordingOverlay {
            timeline: timeline.clone(),
            ..RecordingOverlay::default()
        };

        Self {
            surface: Arc::new(surface),
            overlay: Arc::new(overlay),
            printer: Arc::new(printer),
            metrics: ContainerMetrics {
                frame_width: 1000.0,
                frame_height: 900.0,
                content_top: 100.0,
                content_width: 800.0,
            },
            timeline,
        }
    }

    /// Surface and overlay calls interleaved in call order
    pub fn timeline(&self) -> Vec<HostOp> {
        lock(&self.timeline).clone()
    }

    pub fn clear_timeline(&self) {
        lock(&self.timeline).clear();
    }

    pub fn parts(&self) -> HostParts {
        HostParts {
            surface: self.surface.clone(),
            overlay: self.overlay.clone(),
            container: Arc::new(self.metrics),
            print_host: Some(self.printer.clone()),
        }
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}
