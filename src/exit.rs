//! Process exit codes.

use crate::pipeline::{PipelineError, StartupError};

pub mod codes {
    /// Graceful shutdown, or no alert log to follow.
    pub const SUCCESS: i32 = 0;
    /// Bad configuration, unusable storage or no signal handler.
    pub const STARTUP_FAILURE: i32 = 1;
    /// Unrecoverable error while the pipeline was running.
    pub const RUNTIME_FAILURE: i32 = 2;
}

/// Map a pipeline error to an exit code.
///
/// A missing alert log is reported but is not a failure: the daemon simply
/// has nothing to watch.
pub fn exit_code(error: &PipelineError) -> i32 {
    match error {
        PipelineError::Startup(StartupError::AlertSourceMissing(_)) => codes::SUCCESS,
        PipelineError::Startup(_) => codes::STARTUP_FAILURE,
        PipelineError::Runtime(_) => codes::RUNTIME_FAILURE,
    }
}
