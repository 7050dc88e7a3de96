// Queue engine - the playback state machine
// Every command runs to completion and leaves `current_track` and
// `queue[current_index]` in lock-step. No I/O happens in here.

use super::state::{PlaybackState, QueueSource};
use crate::catalog::Track;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// "Previous" past this point restarts the current track instead of skipping back.
pub const RESTART_THRESHOLD_SECS: f64 = 3.0;

pub struct QueueEngine {
    state: PlaybackState,
    rng: StdRng,
}

impl QueueEngine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic shuffle draws, for tests and reproducible sessions.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: PlaybackState::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.state.current_track.as_ref()
    }

    /// Point at `index` and bump the selection epoch. Callers guarantee the
    /// index is in bounds.
    fn select(&mut self, index: usize) {
        self.state.current_index = index;
        self.state.current_track = self.state.queue.get(index).cloned();
        self.state.current_time = 0.0;
        self.state.selection_epoch = self.state.selection_epoch.wrapping_add(1);
    }

    /// Replace the queue wholesale. An out-of-range start index on a non-empty
    /// queue falls back to the first track.
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_index: usize, source: QueueSource) {
        let len = tracks.len();
        self.state.queue = tracks;
        self.state.queue_source = Some(source);
        self.state.last_fetch_offset = 0;

        if len == 0 {
            self.state.current_index = 0;
            self.state.current_track = None;
            self.state.current_time = 0.0;
            self.state.selection_epoch = self.state.selection_epoch.wrapping_add(1);
            debug!("Queue cleared");
            return;
        }

        let index = if start_index < len {
            start_index
        } else {
            warn!(start_index, len, "Queue start index out of range, starting at 0");
            0
        };
        self.select(index);
        debug!(len, index, ?source, "Queue replaced");
    }

    /// Make `track` current. On an empty queue this starts a one-track queue;
    /// otherwise the track is selected where it already sits in the queue
    /// (the current slot wins over earlier duplicates), or inserted right
    /// after the current position.
    pub fn set_track(&mut self, track: Track) {
        if self.state.queue.is_empty() {
            self.state.queue.push(track);
            self.select(0);
            return;
        }

        let current = self.state.current_index;
        let at_current = self.state.queue.get(current).is_some_and(|queued| queued.id == track.id);
        let found = if at_current {
            Some(current)
        } else {
            self.state.queue.iter().position(|queued| queued.id == track.id)
        };
        match found {
            Some(index) => self.select(index),
            None => {
                let index = (self.state.current_index + 1).min(self.state.queue.len());
                self.state.queue.insert(index, track);
                self.select(index);
            }
        }
    }

    pub fn play(&mut self) {
        self.state.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.state.is_playing = false;
    }

    pub fn toggle_play(&mut self) {
        self.state.is_playing = !self.state.is_playing;
    }

    /// "Next": repeat-one stays put, shuffle draws a different random index,
    /// otherwise step forward and wrap (repeat-all) or clamp at the end.
    pub fn advance(&mut self) {
        let len = self.state.queue.len();
        if len == 0 {
            return;
        }
        let current = self.state.current_index;

        let next = if self.state.repeat == super::RepeatMode::One {
            current
        } else if self.state.shuffle {
            if len > 1 {
                loop {
                    let candidate = self.rng.gen_range(0..len);
                    if candidate != current {
                        break candidate;
                    }
                }
            } else {
                0
            }
        } else if current + 1 < len {
            current + 1
        } else if self.state.repeat == super::RepeatMode::All {
            0
        } else {
            len - 1
        };

        self.select(next);
    }

    /// "Previous": restart the track after a few seconds of play, otherwise
    /// step back and wrap (repeat-all) or clamp at the start.
    pub fn retreat(&mut self) {
        let len = self.state.queue.len();
        if len == 0 {
            return;
        }

        if self.state.current_time > RESTART_THRESHOLD_SECS {
            let current = self.state.current_index.min(len - 1);
            self.select(current);
            return;
        }

        let previous = match self.state.current_index.checked_sub(1) {
            Some(index) => index.min(len - 1),
            None if self.state.repeat == super::RepeatMode::All => len - 1,
            None => 0,
        };
        self.select(previous);
    }

    /// Jump straight to a queued track; out-of-range indices are ignored.
    pub fn set_current_index(&mut self, index: usize) {
        if index < self.state.queue.len() {
            self.select(index);
        } else {
            debug!(index, len = self.state.queue.len(), "Ignoring jump outside the queue");
        }
    }

    pub fn toggle_shuffle(&mut self) {
        self.state.shuffle = !self.state.shuffle;
    }

    pub fn cycle_repeat(&mut self) {
        self.state.repeat = self.state.repeat.next();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.state.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
    }

    pub fn set_current_time(&mut self, seconds: f64) {
        let mut seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.state.duration > 0.0 {
            seconds = seconds.min(self.state.duration);
        }
        self.state.current_time = seconds;
    }

    /// Unknown or unbounded (live stream) durations are stored as 0.
    pub fn set_duration(&mut self, seconds: f64) {
        self.state.duration = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    }

    /// Returns false when a fetch is already in flight; the caller drops its
    /// request in that case.
    pub fn begin_loading_more(&mut self) -> bool {
        if self.state.is_loading_more {
            return false;
        }
        self.state.is_loading_more = true;
        true
    }

    /// Clears the loading flag after an empty or failed fetch.
    pub fn end_loading_more(&mut self) {
        self.state.is_loading_more = false;
    }

    pub fn append_tracks(&mut self, tracks: Vec<Track>) {
        let was_empty = self.state.queue.is_empty();
        self.state.queue.extend(tracks);
        self.state.is_loading_more = false;

        if was_empty && !self.state.queue.is_empty() {
            self.select(0);
        }
    }

    pub fn set_last_fetch_offset(&mut self, offset: u32) {
        self.state.last_fetch_offset = offset;
    }
}

impl Default for QueueEngine {
    fn default() -> Self {
        Self::new()
    }
}
