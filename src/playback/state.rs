use crate::catalog::Track;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    All,
    One,
}

impl RepeatMode {
    /// none -> all -> one -> none
    pub fn next(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RepeatMode::None => "Repeat: Off",
            RepeatMode::All => "Repeat: All",
            RepeatMode::One => "Repeat: One",
        }
    }
}

/// Where the current queue came from. Liked-songs queues are a closed set and
/// never grow; general queues are extended from the catalog near their end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueSource {
    LikedSongs,
    #[default]
    General,
}

/// The single process-wide playback model. Only `QueueEngine` mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub current_index: usize,
    pub is_playing: bool,
    pub current_time: f64, // seconds
    pub duration: f64,     // seconds, 0 while unknown
    pub volume: f32,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub is_loading_more: bool,
    pub last_fetch_offset: u32,
    pub queue_source: Option<QueueSource>, // None until the first queue is set
    /// Bumped whenever a navigation command (re)selects the current track,
    /// including re-selecting the same one (repeat-one, restart).
    pub selection_epoch: u64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            queue: Vec::new(),
            current_index: 0,
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            volume: DEFAULT_VOLUME,
            shuffle: false,
            repeat: RepeatMode::None,
            is_loading_more: false,
            last_fetch_offset: 0,
            queue_source: None,
            selection_epoch: 0,
        }
    }
}

impl PlaybackState {
    pub fn tracks_remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.current_index)
    }

    /// Auto-extension trigger: close to the end of a non-empty general queue
    /// and no fetch already in flight.
    pub fn should_extend_queue(&self, threshold: usize) -> bool {
        !self.queue.is_empty()
            && !self.is_loading_more
            && self.queue_source != Some(QueueSource::LikedSongs)
            && self.tracks_remaining() <= threshold
    }

    /// `current_track == queue[current_index]` for a non-empty queue
    pub fn is_consistent(&self) -> bool {
        if self.queue.is_empty() {
            return self.current_index == 0;
        }
        match (&self.current_track, self.queue.get(self.current_index)) {
            (Some(current), Some(queued)) => current == queued,
            _ => false,
        }
    }

    pub fn progress_ratio(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
