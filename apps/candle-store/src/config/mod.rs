//! Configuration loaded from the environment.

mod settings;

pub use settings::{PipelineSettings, ReaderSettings, StoreSettings};
