// src/lib.rs
//
// Library entry point for Rust and WebAssembly consumers.

mod bridge;
mod config;
mod engine;
mod error;
mod modulator;
mod parameter;
mod state;
mod telemetry;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use bridge::{ControlHandle, EngineHandle, create_bridge};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, ConfigResult, EngineFault};
pub use modulator::{AmplitudeLaw, Modulator, ModulatorFrame, OscillatorState, ResolvedSegment};
pub use parameter::DriveParameter;
pub use state::{
    CarrierSpec, ControlInputs, ControlUpdate, Direction, DirectionalPatterns, EngineMessage,
    EngineReadback, HandlePosition, ModulationSegment, PatternTable, PhysicalSpec, Pulse,
    SegmentDef, SegmentKind, Session, TableIssue, UpperBound, VehicleProfile,
};
pub use telemetry::WaveformSnapshot;
