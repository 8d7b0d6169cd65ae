//! Shared primitives for the sdbot workspace.
//!
//! Holds the identifier aliases used across crates, the [`CoreError`]
//! type, and the prompt style templates applied to user text before it
//! is sent for generation. This crate has no internal dependencies.

pub mod error;
pub mod style;
pub mod types;

pub use error::CoreError;
