//! Seams to the wrapped PDF engine
//!
//! Parsing, viewport math inputs, rasterization and annotation extraction are
//! supplied by an engine implementation. The session only talks to these traits.

use std::sync::Arc;

use super::source::LoadingTask;
use super::types::{Annotation, CancelToken, PageSize, Raster, RenderIntent, Viewport};

/// Errors reported by an engine implementation
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The render observed its cancel token
    #[error("rendering cancelled")]
    Cancelled,

    #[error("invalid page number {number} (document has {count} pages)")]
    InvalidPage { number: usize, count: usize },

    #[error("document has been destroyed")]
    Destroyed,

    #[error("password required")]
    PasswordRequired,

    #[error("{detail}")]
    Generic { detail: String },
}

impl EngineError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Opens documents from loading tasks
pub trait PdfEngine: Send + Sync + 'static {
    /// Fetch and parse the task's source.
    ///
    /// Implementations report progress through [`LoadingTask::report_progress`]
    /// and ask for passwords through [`LoadingTask::request_password`].
    fn open(&self, task: &LoadingTask) -> Result<Arc<dyn PdfDocument>, EngineError>;
}

/// A parsed document
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    /// Fetch a page by its 1-based number
    fn page(&self, number: usize) -> Result<Arc<dyn PdfPage>, EngineError>;

    /// Release engine resources. Further page requests fail with
    /// [`EngineError::Destroyed`].
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

/// A parsed page, valid while its document is alive
pub trait PdfPage: Send + Sync {
    /// 1-based page number
    fn number(&self) -> usize;

    /// Size at scale 1 before any rotation
    fn size(&self) -> PageSize;

    /// Rotation stored in the page dictionary, in degrees
    fn rotation(&self) -> i32 {
        0
    }

    /// Rasterize the page into a buffer of `viewport.pixel_size()`.
    ///
    /// Must fail with [`EngineError::Cancelled`] once `cancel` trips.
    fn render(
        &self,
        viewport: &Viewport,
        intent: RenderIntent,
        cancel: &CancelToken,
    ) -> Result<Raster, EngineError>;

    fn annotations(&self, intent: RenderIntent) -> Result<Vec<Annotation>, EngineError>;
}
