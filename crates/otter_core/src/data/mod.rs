//! Content declarations.
//!
//! Pure data types describing the resources and commands a game defines,
//! deserialized from RON. This module contains no IO; reading files is
//! left to the caller.

mod content_data;

pub use content_data::ContentData;
