pub mod config;
pub mod document;
pub mod error;
pub mod formats;
pub mod io;
pub mod keypath;
pub mod manager;
pub mod merge;
pub mod pipeline;
pub mod value;

pub use document::{Format, KeyValueDocument};
pub use error::{ConfweldError, Result};
pub use keypath::{KeyPath, Segment};
pub use manager::{DocumentManager, OpenDocuments};
