pub mod logging;
pub mod models;
pub mod services;

pub use logging::{start_logging, LoggingSession};
pub use services::DocumentPipeline;
