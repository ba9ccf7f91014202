//! Thread-safe bridge between the control context and the audio engine.
//!
//! This module provides the communication layer that lets the control
//! thread (UI, vehicle simulation, scripted renderer) drive the real-time
//! engine without ever making the audio thread wait.
//!
//! # Architecture
//!
//! - **Control thread** owns [`ControlHandle`] with the local [`Session`] mirror
//! - **Audio thread** owns [`EngineHandle`] with the [`Engine`]
//! - Bounded channels carry updates in, messages and replaced tables out;
//!   atomics carry the readback
//!
//! # Usage
//!
//! ```ignore
//! let (mut control, mut engine) = create_bridge(session, &EngineConfig::default())?;
//!
//! // Control thread: answer the ready handshake, then drive
//! control.poll();
//! control.set_handle(HandlePosition::Notch(3));
//! control.set_vehicle_speed(40.0);
//!
//! // Audio thread: drain updates and render
//! engine.process(&mut buffer);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError},
};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::ConfigResult;
use crate::state::{
    ControlUpdate, Direction, EngineMessage, EngineReadback, HandlePosition, PatternTable, Session,
    VehicleProfile, sanitize_speed,
};
use crate::telemetry::{TelemetryPublisher, WaveformSnapshot};

/// Handle for the control thread to communicate with the engine.
///
/// All methods are safe to call from the main thread and never block.
pub struct ControlHandle {
    /// Control-side mirror of what the engine should be doing.
    session: Session,

    /// Updates towards the engine.
    command_tx: SyncSender<ControlUpdate>,

    /// Ready, waveform and fault messages from the engine.
    message_rx: Receiver<EngineMessage>,

    /// Tables the engine no longer uses, dropped here instead of on the audio thread.
    retire_rx: Receiver<PatternTable>,

    /// Shared readback state (updated by engine, read by control).
    readback: Arc<SharedReadback>,

    /// Updates that did not fit into the queue, merged field by field.
    pending: Option<ControlUpdate>,

    latest_waveform: Option<WaveformSnapshot>,
    max_drive: f64,
    engine_ready: bool,
}

/// Handle for the audio thread containing the engine and communication channels.
pub struct EngineHandle {
    /// The engine (owned by audio thread).
    engine: Engine,

    command_rx: Receiver<ControlUpdate>,
    message_tx: SyncSender<EngineMessage>,
    retire_tx: SyncSender<PatternTable>,

    /// Replaced table waiting for room in the retire queue.
    held: Option<PatternTable>,

    telemetry: TelemetryPublisher,

    /// Shared readback state (written by engine).
    readback: Arc<SharedReadback>,
}

/// Lock-free shared state for engine -> control readback.
struct SharedReadback {
    frames_rendered: AtomicU64,
    /// Drive frequency stored as f64 bits (no AtomicF64 in std)
    drive_frequency_bits: AtomicU64,
    driving: AtomicBool,
    dropped_messages: AtomicU64,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            frames_rendered: AtomicU64::new(0),
            drive_frequency_bits: AtomicU64::new(0.0_f64.to_bits()),
            driving: AtomicBool::new(false),
            dropped_messages: AtomicU64::new(0),
        }
    }
}

/// Create a linked pair of handles for control and engine communication.
///
/// The engine is built from `config` and announces itself with a single
/// [`EngineMessage::Ready`]. The control side answers it with the full
/// session state on its next [`ControlHandle::poll`].
pub fn create_bridge(
    session: Session,
    config: &EngineConfig,
) -> ConfigResult<(ControlHandle, EngineHandle)> {
    config.validate()?;

    let (command_tx, command_rx) = mpsc::sync_channel(config.command_capacity);
    let (message_tx, message_rx) = mpsc::sync_channel(config.message_capacity);
    let (retire_tx, retire_rx) = mpsc::sync_channel(config.retire_capacity);
    let readback = Arc::new(SharedReadback::new());

    log::debug!(
        "creating bridge for '{}' at {} Hz",
        session.profile.name,
        config.sample_rate
    );

    let control = ControlHandle {
        session,
        command_tx,
        message_rx,
        retire_rx,
        readback: Arc::clone(&readback),
        pending: None,
        latest_waveform: None,
        max_drive: config.nyquist(),
        engine_ready: false,
    };

    let engine = EngineHandle {
        engine: Engine::new(config),
        command_rx,
        message_tx,
        retire_tx,
        held: None,
        telemetry: TelemetryPublisher::new(config.telemetry_interval),
        readback,
    };
    engine.post(EngineMessage::Ready);

    Ok((control, engine))
}

// ═══════════════════════════════════════════════════════════════════
// ControlHandle - Control Thread API
// ═══════════════════════════════════════════════════════════════════

impl ControlHandle {
    /// Get a reference to the current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the engine's ready message has been seen.
    pub fn is_engine_ready(&self) -> bool {
        self.engine_ready
    }

    /// Queue an update for the engine.
    ///
    /// The session mirror is not touched; use the typed setters (or
    /// [`dispatch`](Self::dispatch)) to keep both in step.
    pub fn send(&mut self, update: ControlUpdate) {
        match self.pending.as_mut() {
            Some(pending) => pending.merge(update),
            None => self.pending = Some(update),
        }
        self.flush();
    }

    /// Try to deliver coalesced updates. Returns `true` when nothing is left pending.
    pub fn flush(&mut self) -> bool {
        let Some(update) = self.pending.take() else {
            return true;
        };
        match self.command_tx.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(update)) => {
                self.pending = Some(update);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("engine is gone, dropping control update");
                true
            }
        }
    }

    /// Apply an incoming control message through the typed setters.
    pub fn dispatch(&mut self, update: ControlUpdate) {
        if let Some(handle) = update.handle_position {
            self.set_handle(handle);
        }
        if let Some(speed) = update.speed {
            self.set_speed(speed);
        }
        if let Some(table) = update.modulation_patterns {
            let direction = self.session.direction;
            self.install_patterns(direction, table);
        }
    }

    /// Move the handle. Crossing between power and brake swaps the table.
    pub fn set_handle(&mut self, requested: HandlePosition) {
        let handle = self.session.profile.clamp_handle(requested);
        if handle != requested {
            log::debug!("handle {requested:?} clamped to {handle:?}");
        }
        self.session.handle = handle;

        let mut update = ControlUpdate::default().with_handle(handle);
        let direction = handle.direction();
        if direction != self.session.direction {
            log::debug!("direction {:?} -> {direction:?}", self.session.direction);
            self.session.direction = direction;
            update = update.with_patterns(self.session.active_table().clone());
        }
        self.send(update);
    }

    /// Set the drive-frequency target in Hz.
    pub fn set_speed(&mut self, requested: f64) {
        let speed = sanitize_speed(requested, self.max_drive);
        if speed != requested {
            log::debug!("speed {requested} clamped to {speed}");
        }
        self.session.speed = speed;
        self.send(ControlUpdate::default().with_speed(speed));
    }

    /// Set the target from a vehicle speed in km/h.
    pub fn set_vehicle_speed(&mut self, speed_kmh: f64) {
        let frequency = self.session.profile.drive_frequency(speed_kmh);
        self.set_speed(frequency);
    }

    /// Switch vehicles. The handle is re-clamped and the full state resent.
    pub fn select_profile(&mut self, profile: VehicleProfile) {
        log::info!("selecting vehicle profile '{}'", profile.name);
        self.session.profile = profile;
        self.session.handle = self.session.profile.clamp_handle(self.session.handle);
        self.session.direction = self.session.handle.direction();
        self.send(self.session.full_update());
    }

    /// Switch to one of the bundled vehicles.
    pub fn select_builtin(&mut self, key: &str) -> ConfigResult<()> {
        let profile = VehicleProfile::builtin(key)?;
        self.select_profile(profile);
        Ok(())
    }

    /// Replace the table for `direction`.
    ///
    /// Authoring hazards are logged but never block installation. The
    /// engine only hears about it when `direction` is the active one.
    pub fn install_patterns(&mut self, direction: Direction, table: PatternTable) {
        for issue in table.audit() {
            log::warn!("{direction:?} pattern table: {issue}");
        }
        let patterns = &mut self.session.profile.modulation_patterns;
        match direction {
            Direction::Accelerating => patterns.accel = table,
            Direction::Braking => patterns.decel = table,
        }
        if direction == self.session.direction {
            let table = self.session.active_table().clone();
            self.send(ControlUpdate::default().with_patterns(table));
        }
    }

    /// Drain everything the engine sent since the last poll.
    ///
    /// Answers the ready handshake, releases retired tables and retries
    /// any coalesced updates.
    pub fn poll(&mut self) -> Vec<EngineMessage> {
        let mut messages = Vec::new();
        loop {
            match self.message_rx.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        for message in &messages {
            match message {
                EngineMessage::Ready => {
                    log::info!("engine ready, sending session state");
                    self.engine_ready = true;
                    self.send(self.session.full_update());
                }
                EngineMessage::Waveform(snapshot) => self.latest_waveform = Some(*snapshot),
                EngineMessage::Fault(fault) => log::warn!("engine fault: {fault}"),
            }
        }

        let retired = self.retire_rx.try_iter().count();
        if retired > 0 {
            log::trace!("released {retired} retired pattern tables");
        }

        self.flush();
        messages
    }

    /// Most recent waveform snapshot seen by [`poll`](Self::poll).
    pub fn latest_waveform(&self) -> Option<&WaveformSnapshot> {
        self.latest_waveform.as_ref()
    }

    /// Get the current engine readback state.
    pub fn readback(&self) -> EngineReadback {
        EngineReadback {
            frames_rendered: self.readback.frames_rendered.load(Ordering::Relaxed),
            drive_frequency: f64::from_bits(
                self.readback.drive_frequency_bits.load(Ordering::Relaxed),
            ),
            driving: self.readback.driving.load(Ordering::Relaxed),
            dropped_messages: self.readback.dropped_messages.load(Ordering::Relaxed),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// EngineHandle - Audio Thread API
// ═══════════════════════════════════════════════════════════════════

impl EngineHandle {
    /// Apply all pending updates from the control thread.
    ///
    /// Called at the start of each block by `process`. Returns the number
    /// of updates applied.
    pub fn process_commands(&mut self) -> usize {
        if let Some(table) = self.held.take() {
            self.retire(table);
        }

        let mut applied = 0;
        while let Ok(update) = self.command_rx.try_recv() {
            if let Some(old) = self.engine.apply(update) {
                self.retire(old);
            }
            applied += 1;
        }
        applied
    }

    /// Drain updates, render one block and publish its results.
    ///
    /// Call this once per audio block from the audio callback.
    pub fn process(&mut self, output: &mut [f32]) {
        self.process_commands();
        self.engine.process(output);
        self.publish();
    }

    /// Like [`process`](Self::process) with host-supplied drive frequencies.
    pub fn process_with_frequency(&mut self, output: &mut [f32], frequencies: &[f32]) {
        self.process_commands();
        self.engine.process_with_frequency(output, frequencies);
        self.publish();
    }

    /// Get a reference to the engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn publish(&mut self) {
        while let Some(fault) = self.engine.take_fault() {
            self.post(EngineMessage::Fault(fault));
        }
        if self.telemetry.poll(self.engine.clock_seconds()) {
            self.post(EngineMessage::Waveform(*self.engine.snapshot()));
        }
        self.sync_readback();
    }

    /// Drops `message` when the queue is full; the queued ones stay.
    fn post(&self, message: EngineMessage) {
        if self.message_tx.try_send(message).is_err() {
            self.readback.dropped_messages.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn retire(&mut self, table: PatternTable) {
        match self.retire_tx.try_send(table) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(table)) => self.held = Some(table),
        }
    }

    /// Sync readback state from engine.
    fn sync_readback(&self) {
        self.readback
            .frames_rendered
            .store(self.engine.frames_processed(), Ordering::Relaxed);
        self.readback
            .drive_frequency_bits
            .store(self.engine.drive_frequency().to_bits(), Ordering::Relaxed);
        self.readback
            .driving
            .store(self.engine.is_driving(), Ordering::Relaxed);
    }
}
