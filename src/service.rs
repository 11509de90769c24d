use std::{
    sync::{Arc, RwLock, mpsc::Sender},
    thread::JoinHandle,
};

use crate::{
    backend::{self, Command, Message},
    config::AudioConfig,
    error::AudioError,
    state::AudioState,
    volume::VolumeDirection,
};

/// Observable state of the connection to the audio server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// The first connection is being established
    Connecting,
    /// Connected and serving events
    Ready,
    /// The connection was lost; the given re-establishment attempt is pending
    Reconnecting {
        /// Consecutive failed attempts since the connection was last ready
        attempt: u32,
    },
    /// The service has shut down
    Stopped,
}

/// Live, reconciled view of the machine's active audio output and input.
///
/// Owns the background connection to the audio server and keeps a snapshot
/// of the current sink and source up to date as devices appear, disappear
/// and change. The consumer registers one change callback at construction
/// and re-reads whatever fields it displays when that callback fires;
/// control operations are submitted asynchronously and the snapshot
/// converges on the server's answer through the same event path.
///
/// Create one instance at the composition root and share it by reference;
/// dropping it shuts the connection down.
pub struct AudioService {
    messages: Sender<Message>,
    state: Arc<RwLock<AudioState>>,
    health: Arc<RwLock<ConnectionHealth>>,
    worker: Option<JoinHandle<()>>,
}

impl AudioService {
    /// Connect to the audio server and start reconciling device state.
    ///
    /// `on_changed` is invoked, with no arguments, from the connection's
    /// event thread whenever the snapshot changes; it should be cheap and
    /// must not call back into this service's blocking teardown (i.e. do
    /// not drop the service from inside it).
    ///
    /// # Errors
    /// Returns an error when the underlying client handles cannot be
    /// allocated or the initial connection cannot be initiated. This is the
    /// only failure the consumer ever observes; later connection losses are
    /// retried in the background with backoff.
    pub fn new<F>(config: AudioConfig, on_changed: F) -> Result<Self, AudioError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let state = Arc::new(RwLock::new(AudioState::new(config.ignored_sinks)));
        let health = Arc::new(RwLock::new(ConnectionHealth::Connecting));

        let (messages, worker) = backend::spawn(
            Arc::clone(&state),
            Arc::clone(&health),
            Arc::new(on_changed),
            config.reconnect,
        )?;

        Ok(Self {
            messages,
            state,
            health,
            worker: Some(worker),
        })
    }

    /// Set the sink volume to an absolute percentage, clamped into
    /// `[min, max]`. The same level is applied to every channel.
    pub fn set_volume(&self, percent: u16, min: u16, max: u16) {
        let _ = self
            .messages
            .send(Message::Command(Command::SetVolume { percent, min, max }));
    }

    /// Change the sink volume by up to `step` percentage points, never
    /// exceeding `max` and never dropping below zero.
    pub fn step_volume(&self, direction: VolumeDirection, step: f64, max: u16) {
        let _ = self.messages.send(Message::Command(Command::StepVolume {
            direction,
            step,
            max,
        }));
    }

    /// Set the sink mute flag.
    ///
    /// The local flag flips immediately; the server request is
    /// fire-and-forget and the next sink event confirms it.
    pub fn set_sink_muted(&self, muted: bool) {
        if let Ok(mut state) = self.state.write() {
            state.set_sink_muted(muted);
        }
        let _ = self
            .messages
            .send(Message::Command(Command::SetSinkMute(muted)));
    }

    /// Invert the sink mute flag.
    pub fn toggle_sink_mute(&self) {
        self.set_sink_muted(!self.is_muted());
    }

    /// Set the source mute flag. Same optimistic semantics as
    /// [`set_sink_muted`](Self::set_sink_muted).
    pub fn set_source_muted(&self, muted: bool) {
        if let Ok(mut state) = self.state.write() {
            state.set_source_muted(muted);
        }
        let _ = self
            .messages
            .send(Message::Command(Command::SetSourceMute(muted)));
    }

    /// Invert the source mute flag.
    pub fn toggle_source_mute(&self) {
        self.set_source_muted(!self.is_source_muted());
    }

    /// Current sink volume percentage.
    pub fn volume(&self) -> u16 {
        self.state.read().map(|s| s.volume_percent()).unwrap_or(0)
    }

    /// Whether the current sink is muted.
    pub fn is_muted(&self) -> bool {
        self.state.read().map(|s| s.is_muted()).unwrap_or(false)
    }

    /// Human-readable description of the current sink.
    pub fn description(&self) -> String {
        self.state
            .read()
            .map(|s| s.description().to_string())
            .unwrap_or_default()
    }

    /// Monitor source name of the current sink.
    pub fn monitor_name(&self) -> String {
        self.state
            .read()
            .map(|s| s.monitor_name().to_string())
            .unwrap_or_default()
    }

    /// Active port of the current sink.
    pub fn port_name(&self) -> String {
        self.state
            .read()
            .map(|s| s.port_name().to_string())
            .unwrap_or_default()
    }

    /// Form-factor tag of the current sink, empty when the server does not
    /// report one.
    pub fn form_factor(&self) -> String {
        self.state
            .read()
            .map(|s| s.form_factor().to_string())
            .unwrap_or_default()
    }

    /// Whether the current sink is running or idle.
    pub fn is_sink_running(&self) -> bool {
        self.state
            .read()
            .map(|s| s.is_sink_running())
            .unwrap_or(false)
    }

    /// Whether the current sink is a Bluetooth device.
    pub fn is_bluetooth(&self) -> bool {
        self.state.read().map(|s| s.is_bluetooth()).unwrap_or(false)
    }

    /// Current source volume percentage.
    pub fn source_volume(&self) -> u16 {
        self.state
            .read()
            .map(|s| s.source_volume_percent())
            .unwrap_or(0)
    }

    /// Whether the current source is muted.
    pub fn is_source_muted(&self) -> bool {
        self.state
            .read()
            .map(|s| s.is_source_muted())
            .unwrap_or(false)
    }

    /// Human-readable description of the current source.
    pub fn source_description(&self) -> String {
        self.state
            .read()
            .map(|s| s.source_description().to_string())
            .unwrap_or_default()
    }

    /// Active port of the current source.
    pub fn source_port_name(&self) -> String {
        self.state
            .read()
            .map(|s| s.source_port_name().to_string())
            .unwrap_or_default()
    }

    /// Current connection health, for indicators that want to show a
    /// degraded state while the server is away.
    pub fn connection_health(&self) -> ConnectionHealth {
        self.health
            .read()
            .map(|health| *health)
            .unwrap_or(ConnectionHealth::Stopped)
    }
}

impl Drop for AudioService {
    fn drop(&mut self) {
        let _ = self
            .messages
            .send(Message::Command(Command::Shutdown));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
