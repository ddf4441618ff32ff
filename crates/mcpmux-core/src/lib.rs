//! Core types shared by every layer of the mcpmux protocol engine: the error
//! taxonomy, per-request context and cancellation, session-scoped state, and
//! the logging target conventions used across the workspace.

#![forbid(unsafe_code)]
#![allow(dead_code)]

mod context;
mod error;
pub mod logging;

pub use context::{
    CancelledError, McpContext, NoOpNotificationSender, NotificationSender, ProgressReporter,
};
pub use error::{cancelled, err, ok, McpError, McpErrorCode, McpResult, ResultExt};
