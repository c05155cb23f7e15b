//! The three per-frame kernels. Each is a per-invocation function; the
//! [`ABuffer`](crate::ABuffer) dispatches them across its worker pool.

pub mod capture;
pub mod clear;
pub mod resolve;

pub use capture::{CaptureOutcome, CaptureTargets, Fragment, capture_fragment};
pub use clear::clear_pixel;
pub use resolve::{ResolvedPixel, SortEntry, composite, resolve_pixel, sort_far_to_near};
