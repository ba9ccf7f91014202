//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { vvvf_init, VvvfProcessor } from './vvvf.js';
//!
//! await init();
//! vvvf_init();
//!
//! // Inside the AudioWorkletProcessor
//! const processor = new VvvfProcessor("seibu-6000", sampleRate);
//! processor.post_message(JSON.stringify({ handlePosition: 3, speed: 24 }));
//!
//! // process(inputs, outputs, parameters)
//! processor.process_with_frequency(outputs[0][0], parameters.signalFreq);
//! port.postMessage(JSON.parse(processor.take_messages()));
//! ```

use wasm_bindgen::prelude::*;

use crate::bridge::{ControlHandle, EngineHandle, create_bridge};
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::state::{
    ControlUpdate, Direction, EngineReadback, HandlePosition, PatternTable, Session,
    VehicleProfile,
};

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn vvvf_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

/// Keys of the bundled vehicle profiles, as a JSON array.
#[wasm_bindgen]
pub fn vvvf_profiles() -> String {
    let keys: Vec<&str> = VehicleProfile::builtin_keys().collect();
    serde_json::to_string(&keys).unwrap_or_else(|_| "[]".to_string())
}

fn js_error(err: ConfigError) -> JsError {
    JsError::new(&err.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback Data
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data from the engine (for UI meters/displays).
#[wasm_bindgen]
#[derive(Clone, Copy, Default)]
pub struct VvvfReadback {
    /// Frames rendered since the processor was created.
    pub frames_rendered: u64,
    /// Drive frequency at the end of the last block, in Hz.
    pub drive_frequency: f64,
    /// Whether the last block was driving (not silent).
    pub driving: bool,
    /// Engine messages dropped because nobody collected them.
    pub dropped_messages: u64,
}

impl From<EngineReadback> for VvvfReadback {
    fn from(r: EngineReadback) -> Self {
        Self {
            frames_rendered: r.frames_rendered,
            drive_frequency: r.drive_frequency,
            driving: r.driving,
            dropped_messages: r.dropped_messages,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Processor (AudioWorklet-side)
// ═══════════════════════════════════════════════════════════════════════════

/// Both ends of the bridge, for use inside an AudioWorkletProcessor.
///
/// The worklet's message port feeds `post_message`; `take_messages`
/// returns what should be posted back to the main thread.
#[wasm_bindgen]
pub struct VvvfProcessor {
    control: ControlHandle,
    engine: EngineHandle,
}

impl VvvfProcessor {
    /// The ready message is answered (and forwarded) by the first `take_messages`.
    fn create(profile: VehicleProfile, config: &EngineConfig) -> Result<Self, ConfigError> {
        let (control, engine) = create_bridge(Session::new(profile), config)?;
        Ok(Self { control, engine })
    }
}

#[wasm_bindgen]
impl VvvfProcessor {
    /// Create a processor for a bundled vehicle profile.
    #[wasm_bindgen(constructor)]
    pub fn new(profile: &str, sample_rate: f64) -> Result<VvvfProcessor, JsError> {
        let profile = VehicleProfile::builtin(profile).map_err(js_error)?;
        let config = EngineConfig::default().with_sample_rate(sample_rate);
        Self::create(profile, &config).map_err(js_error)
    }

    /// Create a processor from JSON profile and engine configuration documents.
    pub fn from_json(profile_json: &str, config_json: &str) -> Result<VvvfProcessor, JsError> {
        let profile = VehicleProfile::from_json(profile_json).map_err(js_error)?;
        let config = EngineConfig::from_json(config_json).map_err(js_error)?;
        Self::create(profile, &config).map_err(js_error)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a control message: `{"handlePosition"?, "speed"?, "modulationPatterns"?}`.
    pub fn post_message(&mut self, json: &str) -> Result<(), JsError> {
        let update = ControlUpdate::from_json(json).map_err(js_error)?;
        self.control.dispatch(update);
        Ok(())
    }

    /// Set the handle. `0` is neutral, negative values are brake notches.
    pub fn set_handle(&mut self, notch: i32) {
        self.control.set_handle(HandlePosition::from_index(notch));
    }

    /// Set the drive-frequency target in Hz.
    pub fn set_drive_speed(&mut self, frequency: f64) {
        self.control.set_speed(frequency);
    }

    /// Set the target from a vehicle speed in km/h.
    pub fn set_vehicle_speed(&mut self, speed_kmh: f64) {
        self.control.set_vehicle_speed(speed_kmh);
    }

    /// Switch to a bundled vehicle profile.
    pub fn select_profile(&mut self, key: &str) -> Result<(), JsError> {
        self.control.select_builtin(key).map_err(js_error)
    }

    /// Replace the acceleration (`braking == false`) or braking table.
    pub fn load_patterns(&mut self, braking: bool, json: &str) -> Result<(), JsError> {
        let table = PatternTable::from_json(json).map_err(js_error)?;
        let direction = if braking {
            Direction::Braking
        } else {
            Direction::Accelerating
        };
        self.control.install_patterns(direction, table);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audio
    // ─────────────────────────────────────────────────────────────────────────

    /// Render one block, ramping the drive frequency to the speed target.
    pub fn process(&mut self, output: &mut [f32]) {
        self.engine.process(output);
    }

    /// Render one block with the worklet's a-rate frequency parameter.
    pub fn process_with_frequency(&mut self, output: &mut [f32], frequencies: &[f32]) {
        self.engine.process_with_frequency(output, frequencies);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readback
    // ─────────────────────────────────────────────────────────────────────────

    /// Engine messages since the last call, as a JSON array.
    pub fn take_messages(&mut self) -> Result<String, JsError> {
        let messages = self.control.poll();
        serde_json::to_string(&messages).map_err(|err| JsError::new(&err.to_string()))
    }

    pub fn readback(&self) -> VvvfReadback {
        self.control.readback().into()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.control.readback().frames_rendered
    }
}
