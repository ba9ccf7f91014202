// src/state/mod.rs
//
// Declarative state layer for the control context.
//
// This module contains structures that describe *what* the engine should
// render: pattern tables, vehicle profiles, the handle and speed. The
// control side builds them freely; the bridge hands them to the realtime
// engine as messages.
//
// Key principles:
// - All structures are serializable
// - Tables are immutable once built and replaced wholesale
// - Mutations reach the engine only through `ControlUpdate`
// - The engine never reaches back into these structures

mod command;
mod pattern;
mod profile;
mod session;

pub use command::*;
pub use pattern::*;
pub use profile::*;
pub use session::*;
