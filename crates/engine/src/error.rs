// SPDX-License-Identifier: Apache-2.0

//! Errors for the pipeline runtime.
//!
//! Data-plane failures (source read errors, predicate errors, sink flush
//! failures) are reported through logs and counters, never as panics; the
//! variants here cover construction and lifecycle failures.

/// Boxed error produced by a stage capability.
///
/// Capabilities are plugins; the runtime only logs their failures, so a
/// type-erased error is all that crosses the trait boundary.
pub type StageError = Box<dyn std::error::Error + Send + Sync>;

/// All errors that can occur building or running a pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A wrapper for configuration errors.
    #[error("a config error occurred: {0}")]
    Config(#[from] Box<loggraph_config::Error>),

    /// The same stage was added to the builder twice.
    #[error("stage `{stage}` was added more than once")]
    StageAlreadyExists {
        /// The duplicated stage name.
        stage: String,
    },

    /// A driver task failed to join.
    #[error("driver task error in stage `{stage}`: {error}, panic: {is_panic}")]
    JoinTask {
        /// The stage whose driver failed.
        stage: String,
        /// Flag indicating whether the task panicked.
        is_panic: bool,
        /// The error that occurred.
        error: String,
    },

    /// An internal invariant did not hold.
    #[error("internal error: {message}")]
    Internal {
        /// An internal error message.
        message: String,
    },
}

impl From<loggraph_config::Error> for Error {
    fn from(value: loggraph_config::Error) -> Self {
        Error::Config(Box::new(value))
    }
}
