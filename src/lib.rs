//! Pulsewatch - reconciled PulseAudio device state for status indicators.
//!
//! Pulsewatch keeps a live, always-consistent view of the machine's active
//! audio output (sink) and input (source) by subscribing to PulseAudio (or
//! pipewire-pulse) change notifications and reconciling them into a single
//! snapshot: volume, mute, description, port, form factor and a Bluetooth
//! flag. It also issues volume and mute commands on the consumer's behalf
//! and survives server restarts by reconnecting with backoff.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pulsewatch::{AudioConfig, AudioService};
//!
//! let service = AudioService::new(AudioConfig::default(), || {
//!     // the snapshot changed; re-read whatever the indicator displays
//! })?;
//!
//! println!("{}: {}%", service.description(), service.volume());
//! # Ok::<(), pulsewatch::AudioError>(())
//! ```

/// Service configuration types.
pub mod config;

/// Per-event device snapshots and activity states.
pub mod device;

/// Audio error types.
pub mod error;

/// Service handle and control surface.
pub mod service;

/// Reconciled device state and selection rules.
pub mod state;

/// Tracing initialization for the bundled tooling.
pub mod tracing_config;

/// Pure channel-volume arithmetic.
pub mod volume;

mod backend;

pub use config::{AudioConfig, ReconnectConfig};
pub use error::AudioError;
pub use service::{AudioService, ConnectionHealth};
pub use volume::VolumeDirection;
