//! Controller - the host-facing handle onto one viewer session

use std::ops::Deref;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use flume::Sender;
use log::{debug, error};

use crate::notification::{Emitter, Event};
use crate::settings::ViewerConfig;

use super::engine::PdfEngine;
use super::request::{Operation, RenderTarget};
use super::source::{PromptGate, Source};
use super::state::{Command, Effect, RenderPhase, RenderState};
use super::surface::{Container, Overlay, PrintHost, Surface};
use super::worker::session_worker;
use super::zoom::ScaleDescriptor;

/// Host objects a viewer draws into
#[derive(Clone)]
pub struct HostParts {
    pub surface: Arc<dyn Surface>,
    pub overlay: Arc<dyn Overlay>,
    pub container: Arc<dyn Container>,
    pub print_host: Option<Arc<dyn PrintHost>>,
}

/// State shared between the controller and its worker
pub(crate) struct Shared {
    pub(crate) emitter: Emitter,
    pub(crate) config: ViewerConfig,
    pub(crate) surface: Arc<dyn Surface>,
    pub(crate) overlay: Arc<dyn Overlay>,
    pub(crate) container: Arc<dyn Container>,
    pub(crate) print_host: Option<Arc<dyn PrintHost>>,
    render_state: Mutex<RenderState>,
    /// Password prompts of the document being loaded
    pub(crate) prompts: PromptGate,
    /// Rotation of the most recent render request
    rotation: AtomicI32,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RenderState> {
        self.render_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle for queueing work on a session.
///
/// Every call returns immediately; the work runs on the session worker in
/// the order it was queued.
#[derive(Clone)]
pub struct PdfHandle {
    shared: Arc<Shared>,
    request_tx: Sender<Operation>,
}

impl PdfHandle {
    pub fn emitter(&self) -> &Emitter {
        &self.shared.emitter
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.shared.config
    }

    /// Replace the document. `None` unloads and resets the surface.
    ///
    /// A password prompt still waiting for the previous document is
    /// abandoned.
    pub fn load_document(&self, source: Option<Source>) {
        self.shared.prompts.abandon();
        self.shared.emitter.emit(Event::NumPages(None));
        match source {
            Some(source) => self.send(Operation::LoadDocument(source)),
            None => self.send(Operation::Unload),
        }
    }

    /// Fetch the 1-based page `number` and render it at fit-width scale
    pub fn load_page(&self, number: usize, rotation: i32) {
        self.shared.rotation.store(rotation, Ordering::SeqCst);
        self.send(Operation::LoadPage { number, rotation });
    }

    /// Render the current page to fill the surface's displayed width
    pub fn render_page(&self, rotation: i32) {
        self.shared.rotation.store(rotation, Ordering::SeqCst);
        self.request_render(RenderTarget::Fit { rotation });
    }

    /// Render the current page sized by a scale descriptor, at the most
    /// recently requested rotation
    pub fn render_page_scale(&self, descriptor: ScaleDescriptor) {
        let rotation = self.shared.rotation.load(Ordering::SeqCst);
        self.request_render(RenderTarget::Scale {
            descriptor,
            rotation,
        });
    }

    /// Print `pages` (all when `None`) at `dpi` (configured default when `None`)
    pub fn print_page(&self, dpi: Option<u32>, pages: Option<Vec<usize>>) {
        let dpi = dpi.unwrap_or(self.shared.config.default_print_dpi);
        self.send(Operation::Print { dpi, pages });
    }

    /// Release the current document. Safe to call repeatedly.
    ///
    /// A password prompt waiting for an answer is abandoned and its load
    /// fails.
    pub fn destroy(&self) {
        self.shared.prompts.abandon();
        self.send(Operation::Destroy);
    }

    /// Displayed width ÷ raster width, `None` before anything was rendered
    pub fn resolution_scale(&self) -> Option<f64> {
        let (raster_width, _) = self.shared.surface.raster_size();
        if raster_width == 0 {
            return None;
        }
        Some(self.shared.surface.displayed_width() / f64::from(raster_width))
    }

    pub fn render_phase(&self) -> RenderPhase {
        self.shared.lock_state().phase()
    }

    /// Block until everything queued before this call has run.
    ///
    /// Must not be called from an event handler: handlers run on the worker.
    pub fn wait_idle(&self) {
        let (tx, rx) = flume::bounded(1);
        self.send(Operation::Barrier(tx));
        let _ = rx.recv();
    }

    fn request_render(&self, target: RenderTarget) {
        let effect = self.shared.lock_state().apply(Command::Request(target));
        match effect {
            Effect::Start { target, token } => self.send(Operation::Render { target, token }),
            Effect::Cancelled => debug!("cancelling active render for {target:?}"),
            Effect::Superseded => debug!("pending render replaced by {target:?}"),
            Effect::None => {}
        }
    }

    fn send(&self, op: Operation) {
        if let Err(e) = self.request_tx.send(op) {
            error!("session worker is gone, dropped {:?}", e.into_inner());
        }
    }
}

/// Owns a session worker. Dropping it destroys the document and stops the
/// worker.
pub struct PdfController {
    handle: PdfHandle,
    worker: Option<JoinHandle<()>>,
}

impl PdfController {
    #[must_use]
    pub fn new(
        engine: Arc<dyn PdfEngine>,
        parts: HostParts,
        emitter: Emitter,
        config: ViewerConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            emitter,
            config,
            surface: parts.surface,
            overlay: parts.overlay,
            container: parts.container,
            print_host: parts.print_host,
            render_state: Mutex::new(RenderState::new()),
            prompts: PromptGate::default(),
            rotation: AtomicI32::new(0),
        });

        let (request_tx, request_rx) = flume::unbounded();
        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            session_worker(engine, worker_shared, request_rx);
        });

        Self {
            handle: PdfHandle { shared, request_tx },
            worker: Some(worker),
        }
    }

    /// A cloneable handle for event handlers and other threads
    pub fn handle(&self) -> PdfHandle {
        self.handle.clone()
    }
}

impl Deref for PdfController {
    type Target = PdfHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for PdfController {
    fn drop(&mut self) {
        self.handle.shared.prompts.close();
        self.handle.send(Operation::Destroy);
        self.handle.send(Operation::Shutdown);

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!("session worker panicked");
            }
        }
    }
}
