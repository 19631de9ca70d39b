//! Job execution: placeholder resolution and the recursive job runner.

pub mod placeholder;
pub mod running;

pub use placeholder::{AncestorChain, Bindings, PlaceholderBinding};
pub use running::{ExtractionJob, JobContext};

/// Logging settings of one configuration run.
///
/// Passed down explicitly instead of reconfiguring the global subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub config_name: String,

    /// Log every request at `info`
    pub verbose: bool,
}

impl LogContext {
    pub fn new(config_name: impl Into<String>, verbose: bool) -> Self {
        Self {
            config_name: config_name.into(),
            verbose,
        }
    }
}
