//! PDF viewing infrastructure

mod engine;
mod print;
mod request;
mod service;
mod source;
mod state;
mod surface;
mod types;
mod worker;
mod zoom;

#[cfg(feature = "mupdf")]
pub mod mupdf_engine;

pub use engine::{EngineError, PdfDocument, PdfEngine, PdfPage};
pub use print::{DEFAULT_PRINT_DPI, page_style, print_document, print_units, selected_pages};
pub use request::{RenderTarget, SharedError, ViewerError};
pub use service::{HostParts, PdfController, PdfHandle};
pub use source::{
    DocumentSource, LoadOptions, LoadingTask, PasswordReason, PasswordResponder, Source,
    create_loading_task,
};
pub use state::{Command, Effect, RenderPhase, RenderState};
pub use surface::{Container, LinkService, Overlay, PrintFrame, PrintHost, Surface};
pub use types::*;
pub use zoom::*;
