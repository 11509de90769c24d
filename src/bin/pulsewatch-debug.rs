//! Pulsewatch debug tool - watch and drive the reconciled audio state.
//!
//! Connects to the audio server, prints a status line whenever the snapshot
//! changes, and accepts simple commands on stdin to exercise the control
//! surface against a live server.

use std::io::{self, BufRead};

use clap::Parser;
use pulsewatch::{AudioConfig, AudioService, VolumeDirection, tracing_config};

#[derive(Parser, Debug)]
#[command(
    name = "pulsewatch-debug",
    about = "Watch and control the default audio devices"
)]
struct Args {
    /// Sink description to exclude from selection (repeatable)
    #[arg(long = "ignore", value_name = "DESCRIPTION")]
    ignored_sinks: Vec<String>,

    /// Volume step size in percentage points
    #[arg(long, default_value_t = 5.0)]
    step: f64,

    /// Upper volume bound in percent
    #[arg(long, default_value_t = 100)]
    max_volume: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_config::init()?;
    let args = Args::parse();

    let config = AudioConfig {
        ignored_sinks: args.ignored_sinks,
        ..AudioConfig::default()
    };

    let service = AudioService::new(config, || println!("(changed)"))?;

    println!(
        "commands: + / - step volume, v <percent> set volume, m toggle sink mute, \
         M toggle source mute, s print status, q quit"
    );

    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("+") => service.step_volume(VolumeDirection::Increase, args.step, args.max_volume),
            Some("-") => service.step_volume(VolumeDirection::Decrease, args.step, args.max_volume),
            Some("v") => match parts.next().and_then(|raw| raw.parse().ok()) {
                Some(percent) => service.set_volume(percent, 0, args.max_volume),
                None => println!("usage: v <percent>"),
            },
            Some("m") => service.toggle_sink_mute(),
            Some("M") => service.toggle_source_mute(),
            Some("s") => print_status(&service),
            Some("q") => break,
            Some(other) => println!("unknown command: {other}"),
            None => {}
        }
    }

    Ok(())
}

fn print_status(service: &AudioService) {
    println!(
        "sink: {} ({}%{}) port={} form_factor={:?} bluetooth={} running={}",
        service.description(),
        service.volume(),
        if service.is_muted() { ", muted" } else { "" },
        service.port_name(),
        service.form_factor(),
        service.is_bluetooth(),
        service.is_sink_running(),
    );
    println!(
        "source: {} ({}%{}) port={}",
        service.source_description(),
        service.source_volume(),
        if service.is_source_muted() { ", muted" } else { "" },
        service.source_port_name(),
    );
    println!("health: {:?}", service.connection_health());
}
