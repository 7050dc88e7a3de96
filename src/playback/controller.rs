// Player controller - the one owner of the engine and the transport
// Commands, device events and fetch completions are handled one at a time;
// each leaves a fresh state snapshot on the watch channel for the UI.

use super::device::AudioDevice;
use super::engine::QueueEngine;
use super::state::{PlaybackState, QueueSource};
use super::transport::{Transport, TransportEvent};
use crate::catalog::{Track, TrackFeed};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Upper bound (exclusive) for the random offset of the startup queue.
const INITIAL_OFFSET_RANGE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    PlayTrack(Track),
    PlayQueue {
        tracks: Vec<Track>,
        start_index: usize,
        source: QueueSource,
    },
    Play,
    Pause,
    TogglePlay,
    Next,
    Previous,
    JumpTo(usize),
    SeekTo(f64),
    SetVolume(f32),
    ToggleShuffle,
    CycleRepeat,
    LoadInitial,
    Shutdown,
}

/// Completions of background fetches, delivered back as follow-up commands.
#[derive(Debug)]
enum FollowUp {
    InitialLoaded { offset: u32, tracks: Vec<Track> },
    SeedLoaded { queue_token: u64, track: Track, tracks: Vec<Track> },
    PageLoaded { queue_token: u64, offset: u32, tracks: Vec<Track> },
    PageMissed { queue_token: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub page_size: u32,
    pub prefetch_threshold: usize,
    pub ready_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            prefetch_threshold: 5,
            ready_timeout: super::transport::DEFAULT_READY_TIMEOUT,
        }
    }
}

enum Input {
    Transport(TransportEvent),
    FollowUp(FollowUp),
}

pub struct PlayerController<D: AudioDevice> {
    engine: QueueEngine,
    transport: Transport<D>,
    feed: Arc<dyn TrackFeed>,
    settings: ControllerSettings,
    follow_tx: mpsc::UnboundedSender<FollowUp>,
    follow_rx: mpsc::UnboundedReceiver<FollowUp>,
    state_tx: watch::Sender<PlaybackState>,
    /// Bumped on every queue replacement so late pages for an old queue are dropped.
    queue_token: u64,
    /// (index, queue length, source, queue token) at the last extension check
    extension_key: Option<(usize, usize, Option<QueueSource>, u64)>,
}

impl<D: AudioDevice> PlayerController<D> {
    pub fn new(device: D, feed: Arc<dyn TrackFeed>, settings: ControllerSettings, engine: QueueEngine) -> Self {
        let (follow_tx, follow_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(engine.state().clone());
        let mut controller = Self {
            engine,
            transport: Transport::new(device, settings.ready_timeout),
            feed,
            settings,
            follow_tx,
            follow_rx,
            state_tx,
            queue_token: 0,
            extension_key: None,
        };
        controller.after_transition();
        controller
    }

    pub fn state(&self) -> &PlaybackState {
        self.engine.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn device(&self) -> &D {
        self.transport.device()
    }

    /// Drive the controller until `Shutdown` arrives or every command sender
    /// is gone.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<PlayerCommand>) {
        loop {
            let command = tokio::select! {
                command = commands.recv() => command,
                _ = self.step() => continue,
            };
            match command {
                Some(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                None => break,
            }
        }
        info!("Player controller stopped");
    }

    /// Wait for one device event or fetch completion and apply it.
    pub async fn step(&mut self) {
        let input = tokio::select! {
            event = self.transport.recv() => event.map(Input::Transport),
            Some(follow_up) = self.follow_rx.recv() => Some(Input::FollowUp(follow_up)),
        };
        if let Some(input) = input {
            self.apply_input(input);
        }
    }

    /// Apply everything already queued without waiting. Returns how many
    /// inputs were handled.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let input = match self.transport.try_recv() {
                Some(event) => Input::Transport(event),
                None => match self.follow_rx.try_recv() {
                    Ok(follow_up) => Input::FollowUp(follow_up),
                    Err(_) => break,
                },
            };
            self.apply_input(input);
            handled += 1;
        }
        handled
    }

    fn apply_input(&mut self, input: Input) {
        match input {
            Input::Transport(event) => self.transport.handle_event(event, &mut self.engine),
            Input::FollowUp(follow_up) => self.handle_follow_up(follow_up),
        }
        self.after_transition();
    }

    /// Returns false once the controller should stop.
    pub fn handle_command(&mut self, command: PlayerCommand) -> bool {
        debug!(?command, "Player command");
        match command {
            PlayerCommand::PlayTrack(track) => self.play_track(track),
            PlayerCommand::PlayQueue { tracks, start_index, source } => {
                self.play_queue(tracks, start_index, source)
            }
            PlayerCommand::Play => self.engine.play(),
            PlayerCommand::Pause => self.engine.pause(),
            PlayerCommand::TogglePlay => self.engine.toggle_play(),
            PlayerCommand::Next => self.engine.advance(),
            PlayerCommand::Previous => self.engine.retreat(),
            PlayerCommand::JumpTo(index) => self.engine.set_current_index(index),
            PlayerCommand::SeekTo(seconds) => self.transport.seek_to(seconds, &mut self.engine),
            PlayerCommand::SetVolume(volume) => self.engine.set_volume(volume),
            PlayerCommand::ToggleShuffle => self.engine.toggle_shuffle(),
            PlayerCommand::CycleRepeat => self.engine.cycle_repeat(),
            PlayerCommand::LoadInitial => self.load_initial_random_songs(),
            PlayerCommand::Shutdown => {
                self.engine.pause();
                self.after_transition();
                return false;
            }
        }
        self.after_transition();
        true
    }

    fn replace_queue(&mut self, tracks: Vec<Track>, start_index: usize, source: QueueSource) {
        self.queue_token += 1;
        self.engine.set_queue(tracks, start_index, source);
    }

    /// Play a single track. When there is no real queue around it yet, the
    /// first popular page is fetched to build a general one.
    fn play_track(&mut self, track: Track) {
        // measured before set_track, which may grow the queue by one
        let needs_seed = self.engine.state().queue.len() <= 1;
        self.engine.set_track(track.clone());
        self.engine.play();

        if needs_seed {
            let limit = self.settings.page_size;
            let fetch = self.feed.popular_page(0, limit);
            let follow_tx = self.follow_tx.clone();
            let queue_token = self.queue_token;
            tokio::spawn(async move {
                match fetch.await {
                    Ok(tracks) if !tracks.is_empty() => {
                        let _ = follow_tx.send(FollowUp::SeedLoaded { queue_token, track, tracks });
                    }
                    Ok(_) => debug!("No tracks to build a queue from"),
                    Err(e) => warn!(error = %e, "Failed to initialize queue"),
                }
            });
        }
    }

    fn play_queue(&mut self, tracks: Vec<Track>, start_index: usize, source: QueueSource) {
        self.replace_queue(tracks, start_index, source);
        self.engine.set_last_fetch_offset(0);
        self.engine.play();
    }

    /// Startup queue: a shuffled popular page from a random offset. Loaded
    /// but not played.
    fn load_initial_random_songs(&mut self) {
        let offset = rand::thread_rng().gen_range(0..INITIAL_OFFSET_RANGE);
        let fetch = self.feed.popular_page(offset, self.settings.page_size);
        let follow_tx = self.follow_tx.clone();
        tokio::spawn(async move {
            match fetch.await {
                Ok(tracks) if !tracks.is_empty() => {
                    let _ = follow_tx.send(FollowUp::InitialLoaded { offset, tracks });
                }
                Ok(_) => debug!(offset, "Initial catalog page was empty"),
                Err(e) => warn!(error = %e, "Failed to load initial random songs"),
            }
        });
    }

    fn handle_follow_up(&mut self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::InitialLoaded { offset, mut tracks } => {
                if !self.engine.state().queue.is_empty() {
                    debug!("Queue already started, ignoring initial songs");
                    return;
                }
                tracks.shuffle(&mut rand::thread_rng());
                info!(count = tracks.len(), "Loaded initial random songs");
                self.replace_queue(tracks, 0, QueueSource::General);
                self.engine.set_last_fetch_offset(offset);
            }
            FollowUp::SeedLoaded { queue_token, track, tracks } => {
                let current = self.engine.state().current_track.as_ref().map(|t| t.id.as_str());
                if queue_token != self.queue_token || current != Some(track.id.as_str()) {
                    debug!(id = %track.id, "Dropping seed page for a track no longer current");
                    return;
                }
                let (queue, start) = match tracks.iter().position(|t| t.id == track.id) {
                    Some(index) => (tracks, index),
                    None => {
                        let mut queue = Vec::with_capacity(tracks.len() + 1);
                        queue.push(track);
                        queue.extend(tracks);
                        (queue, 0)
                    }
                };
                self.replace_queue(queue, start, QueueSource::General);
                self.engine.set_last_fetch_offset(0);
            }
            FollowUp::PageLoaded { queue_token, offset, tracks } => {
                if queue_token != self.queue_token {
                    debug!("Dropping page fetched for a replaced queue");
                    self.engine.end_loading_more();
                    self.extension_key = None;
                    return;
                }
                info!(count = tracks.len(), offset, "Extended queue");
                self.engine.append_tracks(tracks);
                self.engine.set_last_fetch_offset(offset);
            }
            FollowUp::PageMissed { queue_token } => {
                self.engine.end_loading_more();
                if queue_token != self.queue_token {
                    self.extension_key = None;
                }
            }
        }
    }

    fn after_transition(&mut self) {
        self.transport.sync(self.engine.state());
        self.maybe_extend_queue();
        self.state_tx.send_replace(self.engine.state().clone());
    }

    /// Auto-extension scheduler. Only re-checked when the position, the queue
    /// length, the source or the queue itself changed, so a failed fetch is
    /// not retried until the listener moves on.
    fn maybe_extend_queue(&mut self) {
        let state = self.engine.state();
        let key = (state.current_index, state.queue.len(), state.queue_source, self.queue_token);
        if self.extension_key == Some(key) {
            return;
        }
        self.extension_key = Some(key);

        if !state.should_extend_queue(self.settings.prefetch_threshold) {
            return;
        }
        let offset = state.last_fetch_offset + self.settings.page_size;
        if !self.engine.begin_loading_more() {
            return;
        }

        debug!(offset, "Fetching more tracks for the queue");
        let fetch = self.feed.popular_page(offset, self.settings.page_size);
        let follow_tx = self.follow_tx.clone();
        let queue_token = self.queue_token;
        tokio::spawn(async move {
            let follow_up = match fetch.await {
                Ok(tracks) if !tracks.is_empty() => FollowUp::PageLoaded { queue_token, offset, tracks },
                Ok(_) => {
                    debug!(offset, "Catalog has no more tracks");
                    FollowUp::PageMissed { queue_token }
                }
                Err(e) => {
                    warn!(error = %e, offset, "Failed to load more tracks");
                    FollowUp::PageMissed { queue_token }
                }
            };
            let _ = follow_tx.send(follow_up);
        });
    }
}
