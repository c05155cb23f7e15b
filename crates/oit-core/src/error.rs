//! Error types for A-buffer setup and frame sequencing.
//!
//! Nothing inside a frame is an error: arena exhaustion, per-pixel overflow and
//! empty pixels all degrade silently. These variants cover host misuse only.

use thiserror::Error;

/// Result type for OIT operations.
pub type Result<T> = std::result::Result<T, OitError>;

/// Errors that can occur while configuring or driving an A-buffer.
#[derive(Error, Debug)]
pub enum OitError {
    /// Descriptor rejected before any allocation happened.
    #[error("invalid A-buffer descriptor: {0}")]
    InvalidDescriptor(String),

    /// A per-pixel buffer handed in does not match the A-buffer resolution.
    #[error("{what} is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    SizeMismatch {
        what: &'static str,
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },

    /// Capture or resolve attempted on a frame that was already resolved.
    #[error("frame already resolved; clear before capturing or resolving again")]
    FrameResolved,

    /// Worker pool construction failed.
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// GPU buffer mapping failed during readback.
    #[error("GPU readback failed: {0}")]
    Readback(String),
}
