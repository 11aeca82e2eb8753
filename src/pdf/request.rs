//! Operations queued on the session worker, and the errors they report

use std::sync::Arc;

use flume::Sender;

use super::engine::EngineError;
use super::source::Source;
use super::types::CancelToken;
use super::zoom::ScaleDescriptor;

/// Errors surfaced to the host
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// Unsupported source value; returned synchronously, never emitted
    #[error("invalid input: {detail}")]
    InvalidInput { detail: String },

    #[error("failed to load: {0}")]
    LoadFailure(#[source] EngineError),

    /// Internal; the guard restarts the render instead of reporting this
    #[error("rendering cancelled")]
    RenderCancelled,

    #[error("failed to render page {page}: {source}")]
    RenderFailure {
        page: usize,
        #[source]
        source: EngineError,
    },

    #[error("failed to print: {detail}")]
    PrintFailure { detail: String },

    #[error("config: {detail}")]
    Config { detail: String },
}

impl ViewerError {
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::InvalidInput {
            detail: detail.into(),
        }
    }

    pub fn print_failure(detail: impl Into<String>) -> Self {
        Self::PrintFailure {
            detail: detail.into(),
        }
    }

    /// Map an engine failure during rendering, keeping cancellation distinct
    pub fn from_render(page: usize, err: EngineError) -> Self {
        match err {
            EngineError::Cancelled => Self::RenderCancelled,
            source => Self::RenderFailure { page, source },
        }
    }
}

/// What a render request asks for
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RenderTarget {
    /// Fit the surface's displayed width at device resolution
    Fit { rotation: i32 },
    /// Size from a scale descriptor against the container
    Scale {
        descriptor: ScaleDescriptor,
        rotation: i32,
    },
}

/// Work items on the pending-operation chain
pub enum Operation {
    LoadDocument(Source),
    /// Drop the document and reset the surface
    Unload,
    LoadPage {
        number: usize,
        rotation: i32,
    },
    Render {
        target: RenderTarget,
        token: CancelToken,
    },
    Print {
        dpi: u32,
        pages: Option<Vec<usize>>,
    },
    Destroy,
    /// Acknowledged once everything queued before it has run
    Barrier(Sender<()>),
    Shutdown,
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::LoadDocument(source) => f.debug_tuple("LoadDocument").field(source).finish(),
            Operation::Unload => f.write_str("Unload"),
            Operation::LoadPage { number, rotation } => f
                .debug_struct("LoadPage")
                .field("number", number)
                .field("rotation", rotation)
                .finish(),
            Operation::Render { target, .. } => f.debug_tuple("Render").field(target).finish(),
            Operation::Print { dpi, pages } => f
                .debug_struct("Print")
                .field("dpi", dpi)
                .field("pages", pages)
                .finish(),
            Operation::Destroy => f.write_str("Destroy"),
            Operation::Barrier(_) => f.write_str("Barrier"),
            Operation::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Shared error handle, cheap to fan out to several listeners
pub type SharedError = Arc<ViewerError>;
