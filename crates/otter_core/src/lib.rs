//! # Otter Core
//!
//! Deterministic simulation core for an incremental/idle game.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No file or network IO
//! - No wall-clock time (a virtual clock drives every timer)
//!
//! This separation enables:
//! - Offline catch-up by advancing the clock
//! - Headless tooling
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`modifier`] - Modifier values and the priority-ordered stack fold
//! - [`ticker`] - Virtual clock, periodic and one-shot timers
//! - [`resource`] - Bounded accumulating quantities
//! - [`command`] - Player-triggered commands and their state
//! - [`world`] - The context that owns and drives everything
//! - [`persistence`] - Save/restore through a key-value store
//! - [`data`] - RON content declarations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub mod format;
pub mod modifier;
pub mod observer;
pub mod persistence;
pub mod registry;
pub mod resource;
pub mod ticker;
pub mod visibility;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{ActionContext, CommandAction};
    pub use crate::command::{
        Blocked, Command, CommandChange, CommandId, CommandOptions, CommandState, CooldownScaling,
        RunId, RunOutcome,
    };
    pub use crate::config::SimConfig;
    pub use crate::data::ContentData;
    pub use crate::error::{GameError, Result};
    pub use crate::modifier::{KeyedModifier, Modifier, ModifierStack, Operation, StackChange};
    pub use crate::persistence::{LoadReport, MemoryStore, SaveStore};
    pub use crate::registry::Registry;
    pub use crate::resource::{Resource, ResourceChange, ResourceId, ResourceOptions};
    pub use crate::ticker::{TickTarget, Ticker, TimerId};
    pub use crate::visibility::Visibility;
    pub use crate::world::{Completion, StackRef, World};
}
