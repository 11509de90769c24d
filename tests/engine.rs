//! Integration tests for the reconciliation engine.
//!
//! Drives device selection, snapshot updates, volume arithmetic and
//! configuration through the public API. No live audio server involved -
//! updates are synthesized the same way the backend builds them from
//! introspection results.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use libpulse_binding::volume::ChannelVolumes;
use pulsewatch::config::{AudioConfig, ReconnectConfig};
use pulsewatch::device::{DeviceState, SinkUpdate, SourceUpdate};
use pulsewatch::state::AudioState;
use pulsewatch::volume::{self, VolumeDirection};

fn sink(name: &str, description: &str, state: DeviceState, percent: u16) -> SinkUpdate {
    SinkUpdate {
        index: 7,
        name: name.to_string(),
        description: description.to_string(),
        volume: volume::uniform(2, percent),
        mute: false,
        state,
        active_port: Some("analog-output-speaker".to_string()),
        monitor_name: format!("{name}.monitor"),
        form_factor: Some("internal".to_string()),
    }
}

fn source(name: &str, description: &str, percent: u16) -> SourceUpdate {
    SourceUpdate {
        index: 3,
        name: name.to_string(),
        description: description.to_string(),
        volume: volume::uniform(2, percent),
        mute: false,
        active_port: Some("analog-input-internal-mic".to_string()),
    }
}

fn state_with_defaults(default_sink: &str, default_source: &str) -> AudioState {
    let mut state = AudioState::new(Vec::new());
    state.apply_server_info(
        Some(default_sink.to_string()),
        Some(default_source.to_string()),
    );
    state
}

mod volume_scaling {
    use super::*;

    #[test]
    fn round_trips_every_percentage() {
        for percent in 0..=100 {
            let levels = volume::uniform(2, percent);
            assert_eq!(volume::percent_from(&levels), percent);
        }
    }

    #[test]
    fn supports_overdrive_percentages() {
        let levels = volume::uniform(2, 120);
        assert_eq!(volume::percent_from(&levels), 120);
    }

    #[test]
    fn default_vector_is_not_usable() {
        assert!(!volume::usable(&ChannelVolumes::default()));
        assert!(volume::usable(&volume::uniform(2, 50)));
    }

    #[test]
    fn uniform_uses_requested_channel_count() {
        assert_eq!(volume::uniform(6, 40).len(), 6);
    }
}

mod volume_stepping {
    use super::*;

    #[test]
    fn increase_clamps_at_bound() {
        let levels = volume::uniform(2, 95);
        let next = volume::stepped(&levels, 95, VolumeDirection::Increase, 10.0, 100).unwrap();
        assert_eq!(volume::percent_from(&next), 100);
    }

    #[test]
    fn decrease_floors_at_zero() {
        let levels = volume::uniform(2, 5);
        let next = volume::stepped(&levels, 5, VolumeDirection::Decrease, 10.0, 100).unwrap();
        assert_eq!(volume::percent_from(&next), 0);
    }

    #[test]
    fn increase_at_bound_is_a_noop() {
        let levels = volume::uniform(2, 100);
        assert!(volume::stepped(&levels, 100, VolumeDirection::Increase, 10.0, 100).is_none());
    }

    #[test]
    fn decrease_at_zero_is_a_noop() {
        let levels = volume::uniform(2, 0);
        assert!(volume::stepped(&levels, 0, VolumeDirection::Decrease, 10.0, 100).is_none());
    }

    #[test]
    fn plain_step_moves_by_step_size() {
        let levels = volume::uniform(2, 50);
        let next = volume::stepped(&levels, 50, VolumeDirection::Decrease, 10.0, 100).unwrap();
        assert_eq!(volume::percent_from(&next), 40);

        let next = volume::stepped(&levels, 50, VolumeDirection::Increase, 10.0, 100).unwrap();
        assert_eq!(volume::percent_from(&next), 60);
    }

    #[test]
    fn caller_bound_is_capped_at_overdrive_limit() {
        let levels = volume::uniform(2, 148);
        let next =
            volume::stepped(&levels, 148, VolumeDirection::Increase, 10.0, u16::MAX).unwrap();
        assert_eq!(volume::percent_from(&next), 150);

        let levels = volume::uniform(2, 150);
        assert!(volume::stepped(&levels, 150, VolumeDirection::Increase, 10.0, u16::MAX).is_none());
    }

    #[test]
    fn preserves_channel_count() {
        let levels = volume::uniform(6, 40);
        let next = volume::stepped(&levels, 40, VolumeDirection::Increase, 5.0, 100).unwrap();
        assert_eq!(next.len(), 6);
    }
}

mod sink_selection {
    use super::*;

    #[test]
    fn adopts_the_active_default_sink() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");

        let changed = state.apply_sink_update(&sink(
            "alsa_output.pci",
            "Built-in Audio",
            DeviceState::Running,
            40,
        ));

        assert!(changed);
        assert_eq!(state.current_sink_name(), Some("alsa_output.pci"));
        assert!(state.is_sink_running());
        assert_eq!(state.volume_percent(), 40);
        assert_eq!(state.description(), "Built-in Audio");
        assert_eq!(state.port_name(), "analog-output-speaker");
        assert_eq!(state.form_factor(), "internal");
    }

    #[test]
    fn idle_devices_count_as_available() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");

        let changed = state.apply_sink_update(&sink(
            "alsa_output.pci",
            "Built-in Audio",
            DeviceState::Idle,
            25,
        ));

        assert!(changed);
        assert!(state.is_sink_running());
    }

    #[test]
    fn unrelated_sinks_are_discarded() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");

        let changed =
            state.apply_sink_update(&sink("hdmi_out", "HDMI Audio", DeviceState::Running, 70));

        assert!(!changed);
        assert_eq!(state.volume_percent(), 0);
        assert_eq!(state.description(), "");
    }

    #[test]
    fn suspended_default_updates_fields_but_is_not_running() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");
        state.apply_sink_update(&sink(
            "alsa_output.pci",
            "Built-in Audio",
            DeviceState::Running,
            40,
        ));

        let changed = state.apply_sink_update(&sink(
            "alsa_output.pci",
            "Built-in Audio",
            DeviceState::Suspended,
            55,
        ));

        assert!(changed);
        assert!(!state.is_sink_running());
        assert_eq!(state.volume_percent(), 55);
    }

    #[test]
    fn ignored_description_never_touches_the_snapshot() {
        let mut state = AudioState::new(vec!["HDMI Audio".to_string()]);
        state.apply_server_info(Some("hdmi_out".to_string()), None);
        state.apply_sink_update(&sink("hdmi_out", "Display Audio", DeviceState::Running, 40));
        assert!(state.is_sink_running());

        // The device's description now matches the ignore list; the update
        // must only demote it, not be copied into the snapshot.
        let changed =
            state.apply_sink_update(&sink("hdmi_out", "HDMI Audio", DeviceState::Running, 70));

        assert!(!changed);
        assert!(!state.is_sink_running());
        assert_eq!(state.volume_percent(), 40);
        assert_eq!(state.description(), "Display Audio");
    }

    #[test]
    fn demoted_sink_is_replaced_after_a_default_change() {
        let mut state = AudioState::new(vec!["HDMI Audio".to_string()]);
        state.apply_server_info(Some("hdmi_out".to_string()), None);
        state.apply_sink_update(&sink("hdmi_out", "HDMI Audio", DeviceState::Running, 70));
        assert!(!state.is_sink_running());

        state.apply_server_info(Some("speakers".to_string()), None);
        let changed =
            state.apply_sink_update(&sink("speakers", "Speakers", DeviceState::Running, 30));

        assert!(changed);
        assert_eq!(state.current_sink_name(), Some("speakers"));
        assert!(state.is_sink_running());
        assert_eq!(state.volume_percent(), 30);
    }

    #[test]
    fn recovers_when_description_leaves_the_ignore_list() {
        let mut state = AudioState::new(vec!["HDMI Audio".to_string()]);
        state.apply_server_info(Some("hdmi_out".to_string()), None);
        state.apply_sink_update(&sink("hdmi_out", "HDMI Audio", DeviceState::Running, 70));
        assert!(!state.is_sink_running());

        let changed =
            state.apply_sink_update(&sink("hdmi_out", "Display Audio", DeviceState::Running, 80));

        assert!(changed);
        assert!(state.is_sink_running());
        assert_eq!(state.volume_percent(), 80);
    }

    #[test]
    fn invalid_volume_vector_resets_to_safe_default() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");
        state.apply_sink_update(&sink(
            "alsa_output.pci",
            "Built-in Audio",
            DeviceState::Running,
            40,
        ));

        let mut update = sink(
            "alsa_output.pci",
            "Built-in Audio",
            DeviceState::Running,
            40,
        );
        update.volume = ChannelVolumes::default();
        let changed = state.apply_sink_update(&update);

        assert!(changed);
        assert_eq!(state.volume_percent(), 0);
        assert!(!volume::usable(&state.levels()));
    }

    #[test]
    fn retains_the_device_channel_count() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");

        let mut update = sink(
            "alsa_output.pci",
            "Surround Audio",
            DeviceState::Running,
            40,
        );
        update.volume = volume::uniform(6, 40);
        state.apply_sink_update(&update);

        assert_eq!(state.levels().len(), 6);
    }

    #[test]
    fn missing_port_is_reported_as_unknown() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");

        let mut update = sink(
            "alsa_output.pci",
            "Built-in Audio",
            DeviceState::Running,
            40,
        );
        update.active_port = None;
        update.form_factor = None;
        state.apply_sink_update(&update);

        assert_eq!(state.port_name(), "Unknown");
        assert_eq!(state.form_factor(), "");
    }
}

mod source_selection {
    use super::*;

    #[test]
    fn adopts_only_the_default_source() {
        let mut state = state_with_defaults("alsa_output.pci", "internal_mic");

        let changed = state.apply_source_update(&source("internal_mic", "Internal Mic", 60));
        assert!(changed);
        assert_eq!(state.source_volume_percent(), 60);
        assert_eq!(state.source_description(), "Internal Mic");
        assert_eq!(state.source_port_name(), "analog-input-internal-mic");

        let changed = state.apply_source_update(&source("webcam_mic", "Webcam Mic", 90));
        assert!(!changed);
        assert_eq!(state.source_description(), "Internal Mic");
    }

    #[test]
    fn missing_source_port_is_reported_as_unknown() {
        let mut state = state_with_defaults("alsa_output.pci", "internal_mic");

        let mut update = source("internal_mic", "Internal Mic", 60);
        update.active_port = None;
        state.apply_source_update(&update);

        assert_eq!(state.source_port_name(), "Unknown");
    }
}

mod mute {
    use super::*;

    #[test]
    fn sink_mute_toggle_is_an_involution() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");
        assert!(!state.is_muted());

        state.set_sink_muted(!state.is_muted());
        assert!(state.is_muted());

        state.set_sink_muted(!state.is_muted());
        assert!(!state.is_muted());
    }

    #[test]
    fn source_mute_is_independent_of_sink_mute() {
        let mut state = state_with_defaults("alsa_output.pci", "mic");

        state.set_source_muted(true);
        assert!(state.is_source_muted());
        assert!(!state.is_muted());

        state.set_sink_muted(true);
        state.set_source_muted(!state.is_source_muted());
        assert!(!state.is_source_muted());
        assert!(state.is_muted());
    }
}

mod bluetooth {
    use super::*;

    fn state_with_monitor(monitor: &str) -> AudioState {
        let mut state = state_with_defaults("sink", "mic");
        let mut update = sink("sink", "Some Sink", DeviceState::Running, 40);
        update.monitor_name = monitor.to_string();
        state.apply_sink_update(&update);
        state
    }

    #[test]
    fn wired_monitor_is_not_bluetooth() {
        let state = state_with_monitor("alsa_output.pci-0000_00_1f.3.analog-stereo");
        assert!(!state.is_bluetooth());
    }

    #[test]
    fn pulseaudio_a2dp_monitor_is_bluetooth() {
        let state = state_with_monitor("bluez_sink.AA_BB.a2dp_sink.monitor");
        assert!(state.is_bluetooth());
    }

    #[test]
    fn pipewire_a2dp_monitor_is_bluetooth() {
        let state = state_with_monitor("headset.a2dp-sink.monitor");
        assert!(state.is_bluetooth());
    }

    #[test]
    fn bluez_names_are_bluetooth() {
        let state = state_with_monitor("bluez_output.AA_BB_CC.1.monitor");
        assert!(state.is_bluetooth());
    }
}

mod reconnection {
    use super::*;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ReconnectConfig {
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
        };

        assert_eq!(config.delay_for(1), Duration::from_millis(250));
        assert_eq!(config.delay_for(2), Duration::from_millis(500));
        assert_eq!(config.delay_for(3), Duration::from_millis(1_000));
        assert_eq!(config.delay_for(6), Duration::from_millis(8_000));
        assert_eq!(config.delay_for(7), Duration::from_millis(10_000));
        assert_eq!(config.delay_for(100), Duration::from_millis(10_000));
    }

    #[test]
    fn first_attempt_uses_the_initial_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for(0), config.delay_for(1));
    }
}

mod config {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AudioConfig::default();

        assert!(config.ignored_sinks.is_empty());
        assert_eq!(config.reconnect.initial_delay_ms, 250);
        assert_eq!(config.reconnect.max_delay_ms, 10_000);
    }

    #[test]
    fn deserializes_partial_toml() {
        let config: AudioConfig = toml::from_str(
            r#"
            ignored_sinks = ["HDMI Audio", "Navi 31 HDMI/DP Audio"]

            [reconnect]
            initial_delay_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.ignored_sinks.len(), 2);
        assert_eq!(config.reconnect.initial_delay_ms, 100);
        assert_eq!(config.reconnect.max_delay_ms, 10_000);
    }

    #[test]
    fn serialize_roundtrip() {
        let original = AudioConfig::default();

        let toml_str = toml::to_string(&original).unwrap();
        let deserialized: AudioConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(format!("{original:?}"), format!("{deserialized:?}"));
    }
}
