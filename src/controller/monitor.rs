use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Envelope, Repeat, Replay, Ticks};
use gilrs::{EventType, GamepadId, Gilrs};
use statum::{machine, state};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::pad::PadCore;

// Settings for the shared poll loop
#[derive(Clone, Debug)]
pub struct MonitorSettings {
    /// Frame interval of the poll loop in milliseconds
    pub poll_interval_ms: u64,
    /// Rumble playback duration used when the caller passes none
    pub rumble_duration_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            rumble_duration_ms: 300,
        }
    }
}

// Monitor errors
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to initialize monitor: {0}")]
    InitializationError(String),

    #[error("failed to send command to monitor: {0}")]
    CommandSendError(String),

    #[error("monitor dropped the reply: {0}")]
    ReplyError(String),
}

/// One connected gamepad as seen at enumeration time.
#[derive(Clone, Debug)]
pub struct PadInfo {
    pub index: usize,
    pub name: String,
    pub uuid: [u8; 16],
    pub connected: bool,
    pub ff_supported: bool,
}

#[derive(Debug)]
pub(crate) enum MonitorCommand {
    ListPads {
        reply: oneshot::Sender<Vec<PadInfo>>,
    },
    Watch {
        core: Arc<PadCore>,
    },
    Unwatch {
        index: usize,
    },
    Rumble {
        index: usize,
        duration: Option<Duration>,
    },
}

// Pads currently kept fresh by the poll loop, keyed by pad index.
#[derive(Debug, Default)]
struct WatchRegistry {
    pads: HashMap<usize, Arc<PadCore>>,
}

impl WatchRegistry {
    fn insert(&mut self, core: Arc<PadCore>) {
        if let Some(existing) = self.pads.get(&core.index()) {
            if !Arc::ptr_eq(existing, &core) {
                error!(
                    "Already monitoring a different pad at index {}",
                    core.index()
                );
                return;
            }
        }
        self.pads.insert(core.index(), core);
    }

    fn remove(&mut self, index: usize) {
        if self.pads.remove(&index).is_none() {
            debug!("Unwatch for pad {} that was not monitored", index);
        }
    }

    fn get(&self, index: usize) -> Option<&Arc<PadCore>> {
        self.pads.get(&index)
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<PadCore>> {
        self.pads.values()
    }

    fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }
}

// Define monitor states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum MonitorState {
    Initializing,
    Monitoring,
}

#[machine]
pub struct PadMonitor<S: MonitorState> {
    // Gilrs context, owned by the monitor task for its whole life
    gilrs: Gilrs,

    // Pad index to gilrs id, refreshed on enumeration and connect events
    pad_ids: HashMap<usize, GamepadId>,

    // Monitor settings
    settings: MonitorSettings,

    // Command channel from the handles
    commands: mpsc::Receiver<MonitorCommand>,

    // Pads with at least one observer
    watched: WatchRegistry,

    // Force feedback effects currently playing, by pad index
    effects: HashMap<usize, Effect>,
}

// Implementation for Initializing state
impl PadMonitor<Initializing> {
    pub fn create(
        settings: Option<MonitorSettings>,
        commands: mpsc::Receiver<MonitorCommand>,
    ) -> Result<Self, MonitorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating pad monitor with settings: {:?}", settings);

        info!("Initializing gilrs gamepad interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(MonitorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            HashMap::new(),
            settings,
            commands,
            WatchRegistry::default(),
            HashMap::new(),
        ))
    }

    // Record the pads present at startup and transition to Monitoring state
    pub fn initialize(mut self) -> Result<PadMonitor<Monitoring>, MonitorError> {
        let ids: Vec<GamepadId> = self.gilrs.gamepads().map(|(id, _)| id).collect();

        if ids.is_empty() {
            warn!("No gamepad connected, monitor starts idle");
        } else {
            info!("Found {} gamepads:", ids.len());
            for id in &ids {
                let pad = self.gilrs.gamepad(*id);
                info!("  [{}] Name: {}, UUID: {:?}", id, pad.name(), pad.uuid());
            }
        }

        for id in ids {
            self.pad_ids.insert(usize::from(id), id);
        }

        info!("Pad monitor initialized, transitioning to Monitoring state");
        Ok(self.transition())
    }
}

// Implementation for Monitoring state
impl PadMonitor<Monitoring> {
    // Run the monitor loop. While nobody observes a pad the loop blocks on
    // the command channel alone; the frame timer only runs with watchers.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), MonitorError> {
        info!(
            "Starting pad monitor loop with {}ms frame interval",
            self.settings.poll_interval_ms
        );

        let mut frame =
            tokio::time::interval(Duration::from_millis(self.settings.poll_interval_ms));
        frame.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // For performance monitoring
        let mut frames: u64 = 0;
        let mut last_stats_time = Local::now();
        let stats_interval = chrono::Duration::seconds(30);

        loop {
            if self.watched.is_empty() {
                debug!("No watched pads, monitor going idle");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Pad monitor cancelled");
                        return Ok(());
                    }
                    maybe = self.commands.recv() => match maybe {
                        Some(command) => self.handle_command(command),
                        None => {
                            info!("Command channel closed, stopping pad monitor");
                            return Ok(());
                        }
                    }
                }
                frame.reset();
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Pad monitor cancelled");
                    return Ok(());
                }
                maybe = self.commands.recv() => match maybe {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("Command channel closed, stopping pad monitor");
                        return Ok(());
                    }
                },
                _ = frame.tick() => {
                    self.poll_frame();
                    frames += 1;

                    let now = Local::now();
                    if now - last_stats_time > stats_interval {
                        info!(
                            "Pad monitor stats: {} frames in last {} seconds (avg {:.2}/sec)",
                            frames,
                            stats_interval.num_seconds(),
                            frames as f64 / stats_interval.num_seconds() as f64
                        );
                        frames = 0;
                        last_stats_time = now;
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::ListPads { reply } => {
                let pads = self.enumerate_pads();
                debug!("Enumerated {} pads", pads.len());
                if reply.send(pads).is_err() {
                    warn!("Pad list requester went away before the reply");
                }
            }
            MonitorCommand::Watch { core } => {
                debug!("Watch request for pad {}", core.index());
                self.watched.insert(core);
            }
            MonitorCommand::Unwatch { index } => {
                debug!("Unwatch request for pad {}", index);
                self.watched.remove(index);
            }
            MonitorCommand::Rumble { index, duration } => {
                let duration = duration
                    .unwrap_or(Duration::from_millis(self.settings.rumble_duration_ms));
                self.play_rumble(index, duration);
            }
        }
    }

    fn enumerate_pads(&mut self) -> Vec<PadInfo> {
        let ids: Vec<GamepadId> = self.gilrs.gamepads().map(|(id, _)| id).collect();
        for id in &ids {
            self.pad_ids.insert(usize::from(*id), *id);
        }

        let mut infos = Vec::new();
        for (id, pad) in self.gilrs.gamepads() {
            infos.push(PadInfo {
                index: usize::from(id),
                name: pad.name().to_string(),
                uuid: pad.uuid(),
                connected: pad.is_connected(),
                ff_supported: pad.is_ff_supported(),
            });
        }
        infos
    }

    // One frame: consume pending gilrs events, then copy the pressed state of
    // every canonical button of every watched pad into its cells.
    fn poll_frame(&mut self) {
        self.drain_events();

        for core in self.watched.iter() {
            let Some(id) = self.pad_ids.get(&core.index()).copied() else {
                continue;
            };
            let pad = self.gilrs.gamepad(id);
            if !pad.is_connected() {
                continue;
            }
            for cell in core.cells() {
                cell.set_pressed(pad.is_pressed(cell.kind().to_gilrs()));
            }
        }
    }

    fn drain_events(&mut self) {
        while let Some(gilrs::Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    let index = usize::from(id);
                    info!("Gamepad {} connected", index);
                    self.pad_ids.insert(index, id);
                    if let Some(core) = self.watched.get(index) {
                        core.set_connected(true);
                    }
                }
                EventType::Disconnected => {
                    let index = usize::from(id);
                    warn!("Gamepad {} disconnected", index);
                    if let Some(core) = self.watched.get(index) {
                        core.set_connected(false);
                        core.release_all();
                    }
                    self.effects.remove(&index);
                }
                _ => {}
            }
        }
    }

    // Dual-magnitude rumble: strong motor at full, weak motor at half.
    fn play_rumble(&mut self, index: usize, duration: Duration) {
        let Some(id) = self.pad_ids.get(&index).copied() else {
            warn!("Rumble requested for unknown pad {}", index);
            return;
        };

        {
            let pad = self.gilrs.gamepad(id);
            if !pad.is_connected() {
                warn!("Rumble requested for disconnected pad {}", index);
                return;
            }
            if !pad.is_ff_supported() {
                debug!("Pad {} has no force feedback support", index);
                return;
            }
        }

        let play_for = Ticks::from_ms(duration.as_millis() as u32);
        let result = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong { magnitude: u16::MAX },
                scheduling: Replay {
                    after: Ticks::from_ms(0),
                    play_for,
                    with_delay: Ticks::from_ms(0),
                },
                envelope: Envelope::default(),
            })
            .add_effect(BaseEffect {
                kind: BaseEffectType::Weak {
                    magnitude: u16::MAX / 2,
                },
                scheduling: Replay {
                    after: Ticks::from_ms(0),
                    play_for,
                    with_delay: Ticks::from_ms(0),
                },
                envelope: Envelope::default(),
            })
            .repeat(Repeat::For(play_for))
            .gamepads(&[id])
            .finish(&mut self.gilrs);

        match result {
            Ok(effect) => match effect.play() {
                Ok(()) => {
                    debug!("Rumble playing on pad {} for {:?}", index, duration);
                    self.effects.insert(index, effect);
                }
                Err(e) => error!("Failed to play rumble on pad {}: {}", index, e),
            },
            Err(e) => error!("Failed to build rumble effect for pad {}: {}", index, e),
        }
    }
}

/// Public handle to the shared pad monitor task.
#[derive(Clone, Debug)]
pub struct MonitorHandle {
    pub(crate) commands: mpsc::Sender<MonitorCommand>,
    pub(crate) cancel: CancellationToken,
}

impl MonitorHandle {
    // Create the monitor and spawn it as a tokio task
    pub fn spawn(settings: Option<MonitorSettings>) -> Result<Self, MonitorError> {
        info!("Spawning pad monitor with settings: {:?}", settings);

        let (commands, command_receiver) = mpsc::channel(64);

        // Initialize monitor in Initializing state
        let monitor = PadMonitor::create(settings, command_receiver)?;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        info!("Spawning pad monitor task");
        tokio::spawn(async move {
            match monitor.initialize() {
                Ok(monitoring) => {
                    if let Err(e) = monitoring.run(task_cancel).await {
                        error!("Pad monitor terminated with error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to initialize pad monitor: {}", e);
                }
            }
        });

        info!("Pad monitor successfully started");
        Ok(Self { commands, cancel })
    }

    /// Enumerates the gamepads currently known to the monitor.
    pub async fn pads(&self) -> Result<Vec<PadInfo>, MonitorError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(MonitorCommand::ListPads { reply })
            .await
            .map_err(|e| MonitorError::CommandSendError(e.to_string()))?;
        response
            .await
            .map_err(|e| MonitorError::ReplyError(e.to_string()))
    }

    pub(crate) fn watch(&self, core: Arc<PadCore>) {
        if let Err(e) = self.commands.try_send(MonitorCommand::Watch { core }) {
            error!("Failed to send watch command: {}", e);
        }
    }

    pub(crate) fn unwatch(&self, index: usize) {
        if let Err(e) = self.commands.try_send(MonitorCommand::Unwatch { index }) {
            error!("Failed to send unwatch command: {}", e);
        }
    }

    /// Plays a rumble on the pad; `None` uses the configured default duration.
    pub fn rumble(&self, index: usize, duration: Option<Duration>) {
        if let Err(e) = self.commands.try_send(MonitorCommand::Rumble { index, duration }) {
            error!("Failed to send rumble command: {}", e);
        }
    }

    /// Stops the monitor task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
