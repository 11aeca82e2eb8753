pub mod headless;
pub mod notification;
pub mod pdf;
pub mod settings;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use notification::{Emitter, Event, HandlerId};
pub use settings::ViewerConfig;
pub use viewer::{Props, Viewer};
