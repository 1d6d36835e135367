//! # Otter Development Tools
//!
//! Command-line tools for development:
//! - Content validators
//! - Offline catch-up against a save file

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod simulate;
pub mod store;
pub mod validate;
