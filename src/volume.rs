use libpulse_binding::volume::{ChannelVolumes, Volume};

/// Direction of a relative volume change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    /// Raise the volume
    Increase,
    /// Lower the volume
    Decrease,
}

/// Hard ceiling, in percent, on any caller-supplied upper volume bound.
///
/// Matches the conventional overdrive limit of the PulseAudio/PipeWire
/// desktop stack.
pub const OVERDRIVE_LIMIT_PERCENT: u16 = 150;

/// Channel count used when no trustworthy vector is retained (stereo).
pub const DEFAULT_CHANNELS: u8 = 2;

fn native_per_percent() -> f64 {
    f64::from(Volume::NORMAL.0) / 100.0
}

/// Whether a channel volume vector can be used as the baseline for
/// arithmetic: structurally valid with at least one channel.
pub fn usable(levels: &ChannelVolumes) -> bool {
    levels.len() > 0 && levels.is_valid()
}

/// Channel average expressed as a percentage of the native full scale,
/// rounded to the nearest integer.
pub fn percent_from(levels: &ChannelVolumes) -> u16 {
    let ratio = f64::from(levels.avg().0) / f64::from(Volume::NORMAL.0);
    (ratio * 100.0).round() as u16
}

/// Build a vector with every channel set to the same percentage.
///
/// Per-channel gain is intentionally unsupported; all volume writes are
/// uniform across channels.
pub fn uniform(channels: u8, percent: u16) -> ChannelVolumes {
    let native = (f64::from(percent) * native_per_percent()).round() as u32;
    let mut levels = ChannelVolumes::default();
    levels.set(channels, Volume(native));
    levels
}

/// Apply a clamped relative change to an existing vector.
///
/// The caller-supplied `max_percent` is capped at [`OVERDRIVE_LIMIT_PERCENT`]
/// before use. An increase never pushes the reported percentage past the
/// bound and never pushes a channel past the native maximum; a decrease
/// never drops a channel below zero. Returns `None` when the volume is
/// already at the relevant bound, in which case no request should be
/// submitted.
pub fn stepped(
    levels: &ChannelVolumes,
    current_percent: u16,
    direction: VolumeDirection,
    step: f64,
    max_percent: u16,
) -> Option<ChannelVolumes> {
    let max_percent = max_percent.min(OVERDRIVE_LIMIT_PERCENT);
    let mut next = *levels;

    match direction {
        VolumeDirection::Increase => {
            if current_percent >= max_percent {
                return None;
            }
            let headroom = f64::from(max_percent - current_percent);
            let delta = (headroom.min(step) * native_per_percent()).round() as u32;
            for value in next.get_mut() {
                *value = Volume(value.0.saturating_add(delta).min(Volume::MAX.0));
            }
        }
        VolumeDirection::Decrease => {
            if current_percent == 0 {
                return None;
            }
            let reach = f64::from(current_percent);
            let delta = (reach.min(step) * native_per_percent()).round() as u32;
            for value in next.get_mut() {
                *value = Volume(value.0.saturating_sub(delta));
            }
        }
    }

    Some(next)
}
