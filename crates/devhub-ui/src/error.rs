use thiserror::Error;

use crate::surface::{Capability, CapabilitySet};

/// Everything that can go wrong inside the home screen core. None of these
/// are fatal: each is absorbed locally or turned into one notice or dialog.
#[derive(Debug, Error)]
pub enum UiError {
    /// The attached surface lacks the capability the event needs. The event
    /// is dropped and never retried.
    #[error("{event} requires {required} but the surface only provides {available}")]
    CapabilityMismatch {
        event: &'static str,
        required: Capability,
        available: CapabilitySet,
    },

    /// No handler exists for an external action such as a file picker.
    #[error("no handler available for {action}")]
    LauncherUnavailable { action: String },

    #[error("update fetch failed: {0}")]
    FetchFailure(String),

    #[error("environment check failed: {0}")]
    CheckFailure(String),

    #[error("config error: {0}")]
    Config(String),
}
