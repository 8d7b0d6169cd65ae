//! Console front end for the generation queue.
//!
//! Stands in for a chat transport: requests arrive as stdin lines and
//! results are printed and written to disk.

pub mod config;
pub mod console;
