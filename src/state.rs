use libpulse_binding::volume::ChannelVolumes;
use tracing::error;

use crate::{
    device::{SinkUpdate, SourceUpdate},
    volume,
};

/// Port name recorded when a device reports no active port.
const UNKNOWN_PORT: &str = "Unknown";

/// Monitor-name fragments that identify a Bluetooth sink, covering both the
/// PulseAudio and PipeWire naming schemes.
const BLUETOOTH_MARKERS: [&str; 3] = ["a2dp_sink", "a2dp-sink", "bluez"];

/// Reconciled view of the machine's current audio output and input.
///
/// Owns the long-lived snapshot the consumer reads, the retained channel
/// volume vector that relative volume changes build on, and the bookkeeping
/// used to pick exactly one sink and one source from the stream of device
/// updates. Mutated only through the `apply_*` methods (driven by server
/// events) and the optimistic mute setters.
#[derive(Debug)]
pub struct AudioState {
    ignored_sinks: Vec<String>,

    current_sink_name: Option<String>,
    current_sink_running: bool,
    default_sink_name: Option<String>,
    default_sink_running: bool,

    sink_index: u32,
    levels: ChannelVolumes,
    volume_percent: u16,
    muted: bool,
    description: String,
    monitor_name: String,
    port_name: String,
    form_factor: String,

    default_source_name: Option<String>,
    source_index: u32,
    source_volume_percent: u16,
    source_muted: bool,
    source_description: String,
    source_port_name: String,
}

impl AudioState {
    /// Create an empty state with the given ignore list.
    ///
    /// Ignored entries are matched against sink descriptions, not names,
    /// and the list is fixed for the lifetime of the state.
    pub fn new(ignored_sinks: Vec<String>) -> Self {
        Self {
            ignored_sinks,
            current_sink_name: None,
            current_sink_running: false,
            default_sink_name: None,
            default_sink_running: false,
            sink_index: 0,
            levels: ChannelVolumes::default(),
            volume_percent: 0,
            muted: false,
            description: String::new(),
            monitor_name: String::new(),
            port_name: String::new(),
            form_factor: String::new(),
            default_source_name: None,
            source_index: 0,
            source_volume_percent: 0,
            source_muted: false,
            source_description: String::new(),
            source_port_name: String::new(),
        }
    }

    /// Record the server-reported default device names.
    ///
    /// The current sink is reset to the new default; the following sink list
    /// refresh re-evaluates selection from there.
    pub fn apply_server_info(
        &mut self,
        default_sink: Option<String>,
        default_source: Option<String>,
    ) {
        self.current_sink_name = default_sink.clone();
        self.default_sink_name = default_sink;
        self.default_source_name = default_source;
    }

    /// Reconcile one sink update into the snapshot.
    ///
    /// Returns whether any snapshot field changed, i.e. whether the change
    /// callback should fire. Updates arrive in arbitrary order, possibly
    /// repeatedly for the same device; this method is where the single
    /// current sink is chosen.
    pub fn apply_sink_update(&mut self, update: &SinkUpdate) -> bool {
        let active = update.state.is_active();

        if self
            .ignored_sinks
            .iter()
            .any(|ignored| *ignored == update.description)
        {
            if self.current_sink_name.as_deref() == Some(update.name.as_str()) {
                // An ignored sink is never considered running, so a later
                // update replaces it with another sink.
                self.current_sink_running = false;
            }
            return false;
        }

        let is_default = self.default_sink_name.as_deref() == Some(update.name.as_str());
        self.default_sink_running = is_default && active;

        if !is_default && !self.default_sink_running {
            return false;
        }

        if self.current_sink_name.as_deref() == Some(update.name.as_str()) {
            self.current_sink_running = active;
        }

        if !self.current_sink_running && active {
            self.current_sink_name = Some(update.name.clone());
            self.current_sink_running = true;
        }

        if self.current_sink_name.as_deref() != Some(update.name.as_str()) {
            return false;
        }

        if volume::usable(&update.volume) {
            self.levels = update.volume;
            self.volume_percent = volume::percent_from(&update.volume);
            self.sink_index = update.index;
        } else {
            error!(sink = %update.name, "invalid volume structure received from server");
            self.levels = ChannelVolumes::default();
            self.volume_percent = 0;
        }

        self.muted = update.mute;
        self.description = update.description.clone();
        self.monitor_name = update.monitor_name.clone();
        self.port_name = update
            .active_port
            .clone()
            .unwrap_or_else(|| UNKNOWN_PORT.to_string());
        self.form_factor = update.form_factor.clone().unwrap_or_default();
        true
    }

    /// Reconcile one source update into the snapshot.
    ///
    /// Sources follow the server's default directly; there is no ignore list
    /// or fallback selection for them.
    pub fn apply_source_update(&mut self, update: &SourceUpdate) -> bool {
        if self.default_source_name.as_deref() != Some(update.name.as_str()) {
            return false;
        }

        self.source_volume_percent = volume::percent_from(&update.volume);
        self.source_index = update.index;
        self.source_muted = update.mute;
        self.source_description = update.description.clone();
        self.source_port_name = update
            .active_port
            .clone()
            .unwrap_or_else(|| UNKNOWN_PORT.to_string());
        true
    }

    /// Optimistically record the sink mute flag ahead of server confirmation.
    pub fn set_sink_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Optimistically record the source mute flag ahead of server confirmation.
    pub fn set_source_muted(&mut self, muted: bool) {
        self.source_muted = muted;
    }

    /// Whether the current sink is a Bluetooth device, judged by its
    /// monitor source name.
    pub fn is_bluetooth(&self) -> bool {
        BLUETOOTH_MARKERS
            .iter()
            .any(|marker| self.monitor_name.contains(marker))
    }

    /// Name of the currently selected sink, if one has been chosen.
    pub fn current_sink_name(&self) -> Option<&str> {
        self.current_sink_name.as_deref()
    }

    /// Whether the currently selected sink is running or idle.
    pub fn is_sink_running(&self) -> bool {
        self.current_sink_running
    }

    /// Server-side index of the current sink, used to address requests.
    pub fn sink_index(&self) -> u32 {
        self.sink_index
    }

    /// Retained per-channel volume vector for the current sink.
    pub fn levels(&self) -> ChannelVolumes {
        self.levels
    }

    /// Current sink volume percentage, derived from the channel average.
    pub fn volume_percent(&self) -> u16 {
        self.volume_percent
    }

    /// Sink mute flag.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Human-readable description of the current sink.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Monitor source name of the current sink.
    pub fn monitor_name(&self) -> &str {
        &self.monitor_name
    }

    /// Active port of the current sink.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Form-factor tag of the current sink, empty when unreported.
    pub fn form_factor(&self) -> &str {
        &self.form_factor
    }

    /// Server-side index of the current source.
    pub fn source_index(&self) -> u32 {
        self.source_index
    }

    /// Current source volume percentage.
    pub fn source_volume_percent(&self) -> u16 {
        self.source_volume_percent
    }

    /// Source mute flag.
    pub fn is_source_muted(&self) -> bool {
        self.source_muted
    }

    /// Human-readable description of the current source.
    pub fn source_description(&self) -> &str {
        &self.source_description
    }

    /// Active port of the current source.
    pub fn source_port_name(&self) -> &str {
        &self.source_port_name
    }
}
