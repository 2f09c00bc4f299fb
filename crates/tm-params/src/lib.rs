//! `tm-params` — behavioral configuration read by every pipeline stage.
//!
//! One [`ParameterStore`] lives for the lifetime of a manager instance.
//! Setters are fire-and-forget and safe to call from any thread while a tick
//! is running; stages only read.  Per-vehicle values override globals where
//! both exist.

pub mod store;

#[cfg(test)]
mod tests;

pub use store::{ChangeLaneInfo, ParameterStore, UploadedPath, UploadedRoute};
