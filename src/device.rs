use libpulse_binding::volume::ChannelVolumes;

/// Activity state reported by the server for a sink or source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is actively processing audio
    Running,
    /// Device is open but momentarily silent
    Idle,
    /// Device is suspended
    Suspended,
    /// Device state was not reported or not recognized
    Unknown,
}

impl DeviceState {
    /// Whether the device counts as available for selection.
    ///
    /// Both running and idle devices are selectable; suspended and unknown
    /// ones are not.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Idle)
    }
}

/// Per-event snapshot of a sink, built from a single introspection result.
///
/// Values live only for the duration of one reconciliation pass; the fields
/// that matter are copied into [`AudioState`](crate::state::AudioState).
#[derive(Debug, Clone)]
pub struct SinkUpdate {
    /// Server-assigned device index
    pub index: u32,
    /// Stable machine identifier
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Per-channel volume vector as reported
    pub volume: ChannelVolumes,
    /// Mute flag
    pub mute: bool,
    /// Activity state
    pub state: DeviceState,
    /// Name of the active port, if one is reported
    pub active_port: Option<String>,
    /// Name of the sink's monitor source
    pub monitor_name: String,
    /// Physical form factor tag, if reported
    pub form_factor: Option<String>,
}

/// Per-event snapshot of a source.
///
/// Sources carry no monitor or form-factor information.
#[derive(Debug, Clone)]
pub struct SourceUpdate {
    /// Server-assigned device index
    pub index: u32,
    /// Stable machine identifier
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Per-channel volume vector as reported
    pub volume: ChannelVolumes,
    /// Mute flag
    pub mute: bool,
    /// Name of the active port, if one is reported
    pub active_port: Option<String>,
}
