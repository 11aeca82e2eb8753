//! Session worker - executes the pending-operation chain in order
//!
//! Owns the document and page handles. Every operation queued by the
//! controller runs here, one at a time, so loads and renders never overlap on
//! the shared surface.

use std::sync::Arc;

use flume::Receiver;
use log::{debug, info, warn};

use crate::notification::Event;

use super::engine::{EngineError, PdfDocument, PdfEngine, PdfPage};
use super::print::print_document;
use super::request::{Operation, RenderTarget, ViewerError};
use super::service::Shared;
use super::source::{DocumentSource, LoadOptions, LoadingTask, Source, create_loading_task};
use super::state::{Command, Effect, RenderPhase};
use super::surface::LinkService;
use super::types::{CancelToken, PageSize, RenderIntent, Viewport};
use super::zoom::{ScaleDescriptor, fit_displayed_width, scale_for};

/// Document Session: the handles the chain operates on
pub(crate) struct Session {
    engine: Arc<dyn PdfEngine>,
    shared: Arc<Shared>,
    document: Option<Arc<dyn PdfDocument>>,
    page: Option<Arc<dyn PdfPage>>,
}

/// Main worker function - runs in the session's dedicated thread
pub(crate) fn session_worker(
    engine: Arc<dyn PdfEngine>,
    shared: Arc<Shared>,
    requests: Receiver<Operation>,
) {
    let mut session = Session {
        engine,
        shared,
        document: None,
        page: None,
    };

    for op in requests {
        debug!("run {op:?}");
        match op {
            Operation::LoadDocument(source) => session.load_document(source),
            Operation::Unload => session.unload(),
            Operation::LoadPage { number, rotation } => session.load_page(number, rotation),
            Operation::Render { target, token } => session.run_render(target, token),
            Operation::Print { dpi, pages } => session.print(dpi, pages.as_deref()),
            Operation::Destroy => session.destroy(),
            Operation::Barrier(done) => {
                let _ = done.send(());
            }
            Operation::Shutdown => break,
        }
    }

    session.destroy();
    debug!("session worker stopped");
}

impl Session {
    fn load_document(&mut self, source: Source) {
        self.release_document();

        let task = match source {
            Source::Task(task) => {
                if task.is_destroyed() {
                    self.fail_load(EngineError::generic(
                        "loading task has been destroyed",
                    ));
                    return;
                }
                task
            }
            Source::Url(url) => self.task_for(DocumentSource::Url(url)),
            Source::Bytes(data) => self.task_for(DocumentSource::Data(data)),
        };
        let task = self.observe(task);

        match self.engine.open(&task) {
            Ok(doc) => {
                let count = doc.page_count();
                info!("document loaded ({count} pages)");
                self.document = Some(doc);
                self.shared.emitter.emit(Event::NumPages(Some(count)));
                self.shared.emitter.emit(Event::Loaded);
            }
            Err(e) => self.fail_load(e),
        }
    }

    fn task_for(&self, source: DocumentSource) -> LoadingTask {
        let options = LoadOptions {
            with_credentials: self.shared.config.with_credentials,
            ..LoadOptions::default()
        };
        create_loading_task(source, options)
    }

    /// Forward progress and password prompts to the emitter unless the task's
    /// creator observes them itself. Prompts answer to the session's gate.
    fn observe(&self, task: LoadingTask) -> LoadingTask {
        let progress = self.shared.emitter.clone();
        let password = self.shared.emitter.clone();

        task.with_fallback_callbacks(
            Arc::new(move |ratio| progress.emit(Event::Progress(ratio))),
            Arc::new(move |responder, reason| {
                password.emit(Event::Password { responder, reason });
            }),
        )
        .gated(self.shared.prompts.clone())
    }

    fn fail_load(&self, err: EngineError) {
        self.clear_surfaces();
        self.shared.emitter.error(ViewerError::LoadFailure(err));
    }

    fn unload(&mut self) {
        self.release_document();
        self.shared.surface.reset();
        self.shared.overlay.clear();
    }

    fn load_page(&mut self, number: usize, rotation: i32) {
        self.page = None;

        let Some(doc) = self.document.clone() else {
            debug!("page {number} requested without a document");
            return;
        };

        match doc.page(number) {
            Ok(page) => {
                self.page = Some(page);
                self.request_render(RenderTarget::Scale {
                    descriptor: ScaleDescriptor::fit_width(),
                    rotation,
                });
                self.shared.emitter.emit(Event::PageLoaded(number));
            }
            Err(e) => {
                self.clear_surfaces();
                self.shared.emitter.error(ViewerError::LoadFailure(e));
            }
        }
    }

    /// Admit a render raised from inside the chain.
    ///
    /// A host render admitted while this operation waited in the queue is
    /// newer and runs right after it, so that one wins.
    fn request_render(&mut self, target: RenderTarget) {
        let effect = {
            let mut state = self.shared.lock_state();
            if state.phase() != RenderPhase::Idle {
                debug!("render {target:?} superseded by a queued request");
                return;
            }
            state.apply(Command::Request(target))
        };
        if let Effect::Start { target, token } = effect {
            self.run_render(target, token);
        }
    }

    /// Render, then keep rendering whatever request superseded it until the
    /// admission state settles back to idle.
    fn run_render(&mut self, target: RenderTarget, token: CancelToken) {
        let mut next = Some((target, token));

        while let Some((target, token)) = next.take() {
            match self.render_once(&target, &token) {
                Ok(()) => {}
                Err(ViewerError::RenderCancelled) => debug!("render {target:?} cancelled"),
                Err(e) => self.shared.emitter.error(e),
            }

            let effect = self.shared.lock_state().apply(Command::Settle);
            if let Effect::Start { target, token } = effect {
                debug!("restarting render with {target:?}");
                next = Some((target, token));
            }
        }
    }

    fn render_once(&self, target: &RenderTarget, token: &CancelToken) -> Result<(), ViewerError> {
        let Some(page) = self.page.clone() else {
            return Ok(());
        };
        if token.is_cancelled() {
            return Err(ViewerError::RenderCancelled);
        }

        let Some(viewport) = self.viewport_for(target, page.as_ref()) else {
            debug!("no usable geometry for {target:?}, skipping render");
            return Ok(());
        };

        let shared = &self.shared;
        shared.emitter.emit(Event::PageSize {
            width: viewport.width,
            height: viewport.height,
            scale: viewport.scale,
        });

        let (width, height) = viewport.pixel_size();
        shared.surface.resize(width, height);
        shared.overlay.set_visible(false);
        shared.overlay.clear();

        let (annotations, raster) = rayon::join(
            || page.annotations(RenderIntent::Display),
            || page.render(&viewport, RenderIntent::Display, token),
        );

        let raster = raster.map_err(|e| ViewerError::from_render(page.number(), e))?;
        shared.surface.draw(&raster);

        match annotations {
            Ok(annotations) => {
                shared
                    .overlay
                    .render(&annotations, &viewport, &self.link_service());
            }
            Err(e) => {
                warn!("annotations for page {} unavailable: {e}", page.number());
                shared
                    .emitter
                    .error(ViewerError::from_render(page.number(), e));
            }
        }
        shared.overlay.set_visible(true);

        Ok(())
    }

    fn viewport_for(&self, target: &RenderTarget, page: &dyn PdfPage) -> Option<Viewport> {
        // Intrinsic size with the page's own rotation applied, at scale 1
        let base = Viewport::new(page.size(), 1.0, page.rotation());
        let intrinsic = PageSize::new(base.width, base.height);

        let (scale, rotation) = match *target {
            RenderTarget::Fit { rotation } => {
                let surface = &self.shared.surface;
                let scale = fit_displayed_width(
                    surface.displayed_width(),
                    intrinsic,
                    surface.device_pixel_ratio(),
                )?;
                (scale, rotation)
            }
            RenderTarget::Scale {
                descriptor,
                rotation,
            } => {
                let metrics = self.shared.container.metrics();
                let scale = scale_for(
                    &descriptor,
                    intrinsic,
                    &metrics,
                    self.shared.config.scroll_width,
                )?;
                (scale, rotation)
            }
        };

        Some(Viewport::new(
            page.size(),
            scale,
            page.rotation() + rotation,
        ))
    }

    fn link_service(&self) -> LinkService {
        let count = self.document.as_ref().map_or(0, |d| d.page_count());
        LinkService::new(self.shared.emitter.clone(), count)
    }

    fn print(&self, dpi: u32, pages: Option<&[usize]>) {
        if self.page.is_none() {
            debug!("print requested without a page");
            return;
        }
        let Some(doc) = self.document.as_ref() else {
            return;
        };
        let Some(host) = self.shared.print_host.as_ref() else {
            self.shared
                .emitter
                .error(ViewerError::print_failure("no print host configured"));
            return;
        };

        match print_document(doc.as_ref(), host.as_ref(), dpi, pages) {
            Ok(count) => info!("printed {count} pages"),
            Err(e) => self.shared.emitter.error(e),
        }
    }

    fn destroy(&mut self) {
        if self.document.is_none() {
            return;
        }
        let _ = self.shared.lock_state().apply(Command::Abort);
        self.release_document();
        debug!("document destroyed");
    }

    fn release_document(&mut self) {
        self.page = None;
        if let Some(doc) = self.document.take() {
            doc.destroy();
        }
    }

    fn clear_surfaces(&self) {
        self.shared.surface.clear();
        self.shared.overlay.clear();
    }
}
