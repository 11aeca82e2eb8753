//! Viewer component
//!
//! Binds host properties (`src`, `page`, `rotate`, `scale`) to a controller:
//! each setter is the change handler for that property. Mounting loads the
//! initial source; once it is loaded the current page is fetched
//! automatically.

use std::sync::{Arc, Mutex, PoisonError};

use flume::Receiver;
use log::debug;
use serde_json::Value;

use crate::notification::{Emitter, Event, HandlerId};
use crate::pdf::{
    HostParts, PdfController, PdfEngine, PdfHandle, ScaleDescriptor, Source, Surface, ViewerError,
};
use crate::settings::ViewerConfig;

/// Initial property values
#[derive(Clone, Debug)]
pub struct Props {
    pub src: Option<Source>,
    /// 1-based page number
    pub page: usize,
    /// Extra rotation in degrees
    pub rotate: i32,
    pub scale: Option<ScaleDescriptor>,
}

impl Default for Props {
    fn default() -> Self {
        Self {
            src: None,
            page: 1,
            rotate: 0,
            scale: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Current {
    page: usize,
    rotate: i32,
    scale: Option<ScaleDescriptor>,
}

pub struct Viewer {
    controller: PdfController,
    surface: Arc<dyn Surface>,
    current: Arc<Mutex<Current>>,
    handler: HandlerId,
}

impl Viewer {
    /// Create the controller, wire the internal handlers and load `props.src`
    pub fn mount(
        engine: Arc<dyn PdfEngine>,
        parts: HostParts,
        props: Props,
        config: ViewerConfig,
    ) -> Self {
        let emitter = Emitter::new();
        let surface = parts.surface.clone();
        let controller = PdfController::new(engine, parts, emitter.clone(), config);

        let current = Arc::new(Mutex::new(Current {
            page: props.page,
            rotate: props.rotate,
            scale: props.scale,
        }));

        let handler = emitter.on(internal_handler(
            controller.handle(),
            surface.clone(),
            current.clone(),
        ));

        controller.load_document(props.src);

        Self {
            controller,
            surface,
            current,
            handler,
        }
    }

    pub fn controller(&self) -> &PdfHandle {
        &self.controller
    }

    /// Channel receiving every event emitted from now on
    #[must_use]
    pub fn events(&self) -> Receiver<Event> {
        self.controller.emitter().subscribe()
    }

    pub fn set_src(&self, src: Option<Source>) {
        self.controller.load_document(src);
    }

    /// Change the source from a dynamic host value.
    ///
    /// Unsupported values fail here with [`ViewerError::InvalidInput`] and
    /// nothing is emitted.
    pub fn set_src_value(&self, value: &Value) -> Result<(), ViewerError> {
        let src = Source::from_value(value)?;
        self.set_src(src);
        Ok(())
    }

    pub fn set_page(&self, page: usize) {
        let rotate = {
            let mut current = self.lock();
            current.page = page;
            current.rotate
        };
        self.controller.load_page(page, rotate);
    }

    pub fn set_rotate(&self, rotate: i32) {
        self.lock().rotate = rotate;
        self.controller.render_page(rotate);
    }

    pub fn set_scale(&self, scale: ScaleDescriptor) {
        self.lock().scale = Some(scale);
        self.controller.render_page_scale(scale);
    }

    pub fn page(&self) -> usize {
        self.lock().page
    }

    pub fn rotate(&self) -> i32 {
        self.lock().rotate
    }

    pub fn scale(&self) -> Option<ScaleDescriptor> {
        self.lock().scale
    }

    /// React to a size change of the hosting element.
    ///
    /// Returns true when the raster resolution drifted far enough from the
    /// displayed size to queue a re-render.
    pub fn on_resize(&self, width: f64, height: f64) -> bool {
        if !self.surface.is_attached() || (width == 0.0 && height == 0.0) {
            return false;
        }

        let (raster_width, raster_height) = self.surface.raster_size();
        if raster_width > 0 {
            self.surface.set_display_height(
                self.surface.displayed_width() * f64::from(raster_height)
                    / f64::from(raster_width),
            );
        }

        let Some(ratio) = self.controller.resolution_scale() else {
            return false;
        };
        if self.controller.config().resolution_band.contains(ratio) {
            return false;
        }

        debug!("resolution scale {ratio:.2} out of band, re-rendering");
        self.controller.render_page(self.rotate());
        true
    }

    pub fn print(&self, dpi: Option<u32>, pages: Option<Vec<usize>>) {
        self.controller.print_page(dpi, pages);
    }

    /// Release the document and stop the session
    pub fn unmount(self) {
        self.controller.destroy();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        // The handler holds a controller handle; unregister it so the session
        // can be torn down
        self.controller.emitter().off(self.handler);
    }
}

fn internal_handler(
    handle: PdfHandle,
    surface: Arc<dyn Surface>,
    current: Arc<Mutex<Current>>,
) -> impl Fn(&Event) + Send + Sync + 'static {
    move |event| match event {
        Event::Loaded => {
            let Current { page, rotate, .. } =
                *current.lock().unwrap_or_else(PoisonError::into_inner);
            handle.load_page(page, rotate);
        }
        Event::PageSize { height, .. } => surface.set_display_height(*height),
        _ => {}
    }
}
