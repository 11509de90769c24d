//! Background worker owning the PulseAudio connection.
//!
//! One dedicated thread owns the threaded mainloop and the context. All
//! reconciliation runs as pulse callbacks on the mainloop thread, which
//! serializes it; the worker thread itself only brings connections up and
//! down and submits requests. Callbacks never hold a pointer back into the
//! engine: they capture a channel sender and shared state handles, so a
//! callback firing during teardown posts into a channel instead of touching
//! freed memory.

use std::{
    sync::{
        Arc, RwLock,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use libpulse_binding::{
    callbacks::ListResult,
    context::{
        Context, FlagSet as ContextFlags, State as ContextState,
        introspect::{SinkInfo, SourceInfo},
        subscribe::{Facility, InterestMaskSet, Operation},
    },
    def::SinkState,
    mainloop::threaded::Mainloop,
    proplist::{Proplist, properties},
    volume::ChannelVolumes,
};
use tracing::{debug, info, warn};

use crate::{
    config::ReconnectConfig,
    device::{DeviceState, SinkUpdate, SourceUpdate},
    error::AudioError,
    service::ConnectionHealth,
    state::AudioState,
    volume::{self, VolumeDirection},
};

/// Consumer requests accepted by the worker.
#[derive(Debug)]
pub(crate) enum Command {
    SetVolume { percent: u16, min: u16, max: u16 },
    StepVolume { direction: VolumeDirection, step: f64, max: u16 },
    SetSinkMute(bool),
    SetSourceMute(bool),
    Shutdown,
}

/// Introspection requests derived from server notifications.
#[derive(Debug, Clone, Copy)]
enum Refresh {
    ServerInfo,
    Sink(u32),
    SinkList,
    Source(u32),
    SourceList,
}

/// Everything the worker thread can be woken for.
pub(crate) enum Message {
    Command(Command),
    ContextState,
    Refresh(Refresh),
}

enum Exit {
    Shutdown,
    ConnectionLost { was_ready: bool },
}

struct Session {
    context: Context,
    mainloop: Mainloop,
}

struct Worker {
    msg_tx: Sender<Message>,
    msg_rx: Receiver<Message>,
    state: Arc<RwLock<AudioState>>,
    health: Arc<RwLock<ConnectionHealth>>,
    on_changed: Arc<dyn Fn() + Send + Sync>,
    reconnect: ReconnectConfig,
}

/// Spawn the worker thread and wait for the outcome of its first
/// connection attempt.
///
/// Allocation or connect failure on the first attempt is fatal and
/// propagated to the caller; once the first attempt is underway, later
/// connection losses are handled internally with backoff.
pub(crate) fn spawn(
    state: Arc<RwLock<AudioState>>,
    health: Arc<RwLock<ConnectionHealth>>,
    on_changed: Arc<dyn Fn() + Send + Sync>,
    reconnect: ReconnectConfig,
) -> Result<(Sender<Message>, thread::JoinHandle<()>), AudioError> {
    let (msg_tx, msg_rx) = mpsc::channel();
    let (setup_tx, setup_rx) = mpsc::channel();

    let worker = Worker {
        msg_tx: msg_tx.clone(),
        msg_rx,
        state,
        health,
        on_changed,
        reconnect,
    };

    let handle = thread::Builder::new()
        .name("pulsewatch-audio".to_string())
        .spawn(move || worker.run(setup_tx))
        .map_err(|_| AudioError::WorkerUnavailable)?;

    match setup_rx.recv() {
        Ok(Ok(())) => Ok((msg_tx, handle)),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
        Err(_) => Err(AudioError::WorkerUnavailable),
    }
}

impl Worker {
    fn run(self, setup_tx: Sender<Result<(), AudioError>>) {
        let mut setup_tx = Some(setup_tx);
        let mut attempt: u32 = 0;

        loop {
            self.set_health(if attempt == 0 {
                ConnectionHealth::Connecting
            } else {
                ConnectionHealth::Reconnecting { attempt }
            });

            match self.connect() {
                Ok(session) => {
                    if let Some(tx) = setup_tx.take() {
                        let _ = tx.send(Ok(()));
                    }
                    match self.serve(session) {
                        Exit::Shutdown => {
                            self.set_health(ConnectionHealth::Stopped);
                            return;
                        }
                        Exit::ConnectionLost { was_ready } => {
                            attempt = if was_ready { 1 } else { attempt.saturating_add(1) };
                        }
                    }
                }
                Err(err) => {
                    if let Some(tx) = setup_tx.take() {
                        let _ = tx.send(Err(err));
                        return;
                    }
                    warn!("audio reconnection attempt failed: {err}");
                    attempt = attempt.saturating_add(1);
                }
            }

            if !self.pause_before_retry(attempt) {
                self.set_health(ConnectionHealth::Stopped);
                return;
            }
        }
    }

    /// Allocate a fresh mainloop and context and initiate the connection.
    ///
    /// The context state callback only pings the worker; the actual state is
    /// queried from the worker thread afterwards.
    fn connect(&self) -> Result<Session, AudioError> {
        let mut mainloop = Mainloop::new().ok_or(AudioError::MainloopCreation)?;

        let mut proplist = Proplist::new().ok_or(AudioError::ContextCreation)?;
        let _ = proplist.set_str(properties::APPLICATION_NAME, "pulsewatch");

        let mut context = Context::new_with_proplist(&mainloop, "pulsewatch", &proplist)
            .ok_or(AudioError::ContextCreation)?;

        let ping = self.msg_tx.clone();
        context.set_state_callback(Some(Box::new(move || {
            let _ = ping.send(Message::ContextState);
        })));

        mainloop
            .start()
            .map_err(|err| AudioError::ConnectionFailed(ToString::to_string(&err)))?;

        mainloop.lock();
        let connected = context.connect(None, ContextFlags::NOFLAGS, None);
        mainloop.unlock();

        if let Err(err) = connected {
            mainloop.stop();
            return Err(AudioError::ConnectionFailed(ToString::to_string(&err)));
        }

        Ok(Session { context, mainloop })
    }

    /// Drive one connection until shutdown or loss.
    fn serve(&self, mut session: Session) -> Exit {
        let mut ready = false;

        loop {
            let message = match self.msg_rx.recv() {
                Ok(message) => message,
                Err(_) => {
                    self.teardown(&mut session);
                    return Exit::Shutdown;
                }
            };

            match message {
                Message::Command(Command::Shutdown) => {
                    self.teardown(&mut session);
                    return Exit::Shutdown;
                }
                Message::Command(command) => {
                    if ready {
                        self.handle_command(&mut session, command);
                    } else {
                        debug!("audio context not ready, discarding request");
                    }
                }
                Message::Refresh(refresh) => {
                    if ready {
                        self.handle_refresh(&mut session, refresh);
                    }
                }
                Message::ContextState => {
                    session.mainloop.lock();
                    let context_state = session.context.get_state();
                    session.mainloop.unlock();

                    match context_state {
                        ContextState::Ready if !ready => {
                            ready = true;
                            info!("connected to audio server");
                            self.set_health(ConnectionHealth::Ready);
                            self.subscribe(&mut session);
                            self.handle_refresh(&mut session, Refresh::ServerInfo);
                        }
                        ContextState::Failed => {
                            warn!("audio server connection lost");
                            self.teardown(&mut session);
                            return Exit::ConnectionLost { was_ready: ready };
                        }
                        ContextState::Terminated => {
                            info!("audio server connection terminated");
                            self.teardown(&mut session);
                            return Exit::Shutdown;
                        }
                        // Connecting, authorizing and name-setting are
                        // observational only.
                        _ => {}
                    }
                }
            }
        }
    }

    fn teardown(&self, session: &mut Session) {
        session.mainloop.lock();
        session.context.disconnect();
        session.mainloop.unlock();
        session.mainloop.stop();
    }

    /// Register interest in the notification classes that can affect the
    /// selected devices. Only `Changed` operations are acted on.
    fn subscribe(&self, session: &mut Session) {
        let forward = self.msg_tx.clone();

        session.mainloop.lock();
        session
            .context
            .set_subscribe_callback(Some(Box::new(move |facility, operation, index| {
                if !matches!(operation, Some(Operation::Changed)) {
                    return;
                }
                let refresh = match facility {
                    Some(Facility::Server) => Some(Refresh::ServerInfo),
                    Some(Facility::Sink) => Some(Refresh::Sink(index)),
                    // A stream change can move which sink is running, so
                    // rescan the whole list rather than one index.
                    Some(Facility::SinkInput) => Some(Refresh::SinkList),
                    Some(Facility::Source) => Some(Refresh::Source(index)),
                    Some(Facility::SourceOutput) => Some(Refresh::SourceList),
                    _ => None,
                };
                if let Some(refresh) = refresh {
                    let _ = forward.send(Message::Refresh(refresh));
                }
            })));
        session.context.subscribe(
            InterestMaskSet::SERVER
                | InterestMaskSet::SINK
                | InterestMaskSet::SINK_INPUT
                | InterestMaskSet::SOURCE
                | InterestMaskSet::SOURCE_OUTPUT,
            |_success| {},
        );
        session.mainloop.unlock();
    }

    fn handle_refresh(&self, session: &mut Session, refresh: Refresh) {
        session.mainloop.lock();
        if !matches!(session.context.get_state(), ContextState::Ready) {
            // A queued refresh can outlive the connection it was meant for.
            session.mainloop.unlock();
            debug!("audio context not ready, skipping refresh");
            return;
        }
        let introspect = session.context.introspect();

        match refresh {
            Refresh::ServerInfo => {
                let state = Arc::clone(&self.state);
                let forward = self.msg_tx.clone();
                introspect.get_server_info(move |info| {
                    let default_sink = info.default_sink_name.as_ref().map(|s| s.to_string());
                    let default_source = info.default_source_name.as_ref().map(|s| s.to_string());
                    if let Ok(mut state) = state.write() {
                        state.apply_server_info(default_sink, default_source);
                    }
                    let _ = forward.send(Message::Refresh(Refresh::SinkList));
                    let _ = forward.send(Message::Refresh(Refresh::SourceList));
                });
            }
            Refresh::Sink(index) => {
                introspect.get_sink_info_by_index(index, self.sink_callback());
            }
            Refresh::SinkList => {
                introspect.get_sink_info_list(self.sink_callback());
            }
            Refresh::Source(index) => {
                introspect.get_source_info_by_index(index, self.source_callback());
            }
            Refresh::SourceList => {
                introspect.get_source_info_list(self.source_callback());
            }
        }

        session.mainloop.unlock();
    }

    fn sink_callback(&self) -> impl FnMut(ListResult<&SinkInfo>) + 'static {
        let state = Arc::clone(&self.state);
        let on_changed = Arc::clone(&self.on_changed);

        move |result| match result {
            ListResult::Item(info) => {
                let update = sink_update_from(info);
                let changed = match state.write() {
                    Ok(mut state) => state.apply_sink_update(&update),
                    Err(_) => false,
                };
                if changed {
                    on_changed();
                }
            }
            ListResult::End => {}
            ListResult::Error => debug!("sink introspection failed"),
        }
    }

    fn source_callback(&self) -> impl FnMut(ListResult<&SourceInfo>) + 'static {
        let state = Arc::clone(&self.state);
        let on_changed = Arc::clone(&self.on_changed);

        move |result| match result {
            ListResult::Item(info) => {
                let update = source_update_from(info);
                let changed = match state.write() {
                    Ok(mut state) => state.apply_source_update(&update),
                    Err(_) => false,
                };
                if changed {
                    on_changed();
                }
            }
            ListResult::End => {}
            ListResult::Error => debug!("source introspection failed"),
        }
    }

    fn handle_command(&self, session: &mut Session, command: Command) {
        match command {
            Command::SetVolume { percent, min, max } => {
                let (levels, _, index) = self.sink_levels();
                let channels = if volume::usable(&levels) {
                    levels.len()
                } else {
                    volume::DEFAULT_CHANNELS
                };
                let target = percent.max(min).min(max);
                let next = volume::uniform(channels, target);
                self.submit_sink_volume(session, index, &next);
            }
            Command::StepVolume {
                direction,
                step,
                max,
            } => {
                let (levels, current, index) = self.sink_levels();
                if !volume::usable(&levels) {
                    // No trustworthy baseline; re-assert the current level
                    // on a synthesized stereo vector instead of stepping.
                    let next = volume::uniform(volume::DEFAULT_CHANNELS, current);
                    self.submit_sink_volume(session, index, &next);
                    return;
                }
                if let Some(next) = volume::stepped(&levels, current, direction, step, max) {
                    self.submit_sink_volume(session, index, &next);
                }
            }
            Command::SetSinkMute(muted) => {
                let index = self.state.read().map(|s| s.sink_index()).unwrap_or(0);
                session.mainloop.lock();
                if matches!(session.context.get_state(), ContextState::Ready) {
                    let mut introspect = session.context.introspect();
                    introspect.set_sink_mute_by_index(index, muted, None);
                }
                session.mainloop.unlock();
            }
            Command::SetSourceMute(muted) => {
                let index = self.state.read().map(|s| s.source_index()).unwrap_or(0);
                session.mainloop.lock();
                if matches!(session.context.get_state(), ContextState::Ready) {
                    let mut introspect = session.context.introspect();
                    introspect.set_source_mute_by_index(index, muted, None);
                }
                session.mainloop.unlock();
            }
            Command::Shutdown => {}
        }
    }

    fn sink_levels(&self) -> (ChannelVolumes, u16, u32) {
        match self.state.read() {
            Ok(state) => (state.levels(), state.volume_percent(), state.sink_index()),
            Err(_) => (ChannelVolumes::default(), 0, 0),
        }
    }

    /// Submit a sink volume request. A successful completion re-fetches the
    /// sink so the snapshot converges on what the server actually applied;
    /// a failed one is only logged.
    fn submit_sink_volume(&self, session: &mut Session, index: u32, levels: &ChannelVolumes) {
        session.mainloop.lock();
        if !matches!(session.context.get_state(), ContextState::Ready) {
            session.mainloop.unlock();
            warn!("audio context not ready, dropping volume request");
            return;
        }

        let forward = self.msg_tx.clone();
        let mut introspect = session.context.introspect();
        introspect.set_sink_volume_by_index(
            index,
            levels,
            Some(Box::new(move |success| {
                if success {
                    let _ = forward.send(Message::Refresh(Refresh::Sink(index)));
                } else {
                    debug!("volume modification failed");
                }
            })),
        );
        session.mainloop.unlock();
    }

    /// Sleep out the backoff delay while staying responsive to shutdown.
    /// Returns false when the worker should stop instead of retrying.
    fn pause_before_retry(&self, attempt: u32) -> bool {
        let delay = self.reconnect.delay_for(attempt) + jitter();
        debug!(attempt, ?delay, "waiting before reconnecting");
        let deadline = Instant::now() + delay;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match self.msg_rx.recv_timeout(remaining) {
                Ok(Message::Command(Command::Shutdown)) | Err(RecvTimeoutError::Disconnected) => {
                    return false;
                }
                Ok(Message::Command(_)) => {
                    debug!("audio context not ready, discarding request");
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => return true,
            }
        }
    }

    fn set_health(&self, health: ConnectionHealth) {
        if let Ok(mut slot) = self.health.write() {
            *slot = health;
        }
    }
}

/// Small randomized offset so parallel clients do not retry in lockstep.
fn jitter() -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(u64::from(nanos % 100))
}

fn sink_update_from(info: &SinkInfo) -> SinkUpdate {
    SinkUpdate {
        index: info.index,
        name: info.name.as_ref().map(|s| s.to_string()).unwrap_or_default(),
        description: info
            .description
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default(),
        volume: info.volume,
        mute: info.mute,
        state: sink_device_state(info.state),
        active_port: info
            .active_port
            .as_ref()
            .and_then(|port| port.name.as_ref().map(|s| s.to_string())),
        monitor_name: info
            .monitor_source_name
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default(),
        form_factor: info.proplist.get_str(properties::DEVICE_FORM_FACTOR),
    }
}

fn source_update_from(info: &SourceInfo) -> SourceUpdate {
    SourceUpdate {
        index: info.index,
        name: info.name.as_ref().map(|s| s.to_string()).unwrap_or_default(),
        description: info
            .description
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default(),
        volume: info.volume,
        mute: info.mute,
        active_port: info
            .active_port
            .as_ref()
            .and_then(|port| port.name.as_ref().map(|s| s.to_string())),
    }
}

fn sink_device_state(state: SinkState) -> DeviceState {
    match state {
        SinkState::Running => DeviceState::Running,
        SinkState::Idle => DeviceState::Idle,
        SinkState::Suspended => DeviceState::Suspended,
        _ => DeviceState::Unknown,
    }
}
