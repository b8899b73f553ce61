//! A simulated multi-tool command shell for teaching datacenter-operations
//! workflows.
//!
//! A learner types Unix-style commands; the engine parses them, routes them
//! to the matching tool emulator, mutates a simulated GPU cluster, and
//! judges whether the actions satisfy a lab exercise's goals. Nothing here
//! executes real processes or touches real hardware: emulators implement
//! the [`command::Simulator`] contract against an isolated, mutation-logged
//! copy of cluster state.
//!
//! The main entry point is [`Orchestrator`], which processes one line at a
//! time: shell-mode resolution, parsing, routing, pipe filtering, scenario
//! validation, and history, returning a [`command::CommandResult`] and the
//! next prompt.

pub mod builtin;
pub mod cluster;
pub mod command;
pub mod context;
pub mod filters;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod scenario;
pub mod shell_mode;
pub mod simulators;
pub mod validator;

/// Convenient re-export of the line-at-a-time session driver.
///
/// See [`orchestrator::Orchestrator`] for the high-level API.
pub use orchestrator::{Orchestrator, default_router};
