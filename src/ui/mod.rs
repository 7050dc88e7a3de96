// Console UI - the face of melodytail
// Line-oriented: one command per line in, plain text out. The player itself
// runs elsewhere; this side only sends commands and reads state snapshots.

pub mod events; // console line parsing

pub use events::{AppEvent, Browse, EventHandler, LikedAction};

use crate::catalog::{format_clock, ApiResponse, CatalogClient, CatalogError, Track};
use crate::library::{format_relative_time, LikedTracksStore};
use crate::playback::{PlaybackState, PlayerCommand, QueueSource};
use anyhow::Result;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const PROGRESS_WIDTH: usize = 24;
const QUEUE_WINDOW: usize = 10;

const HELP: &str = "\
playback: play [n] | pause | toggle | next | prev | seek <s|m:ss> | vol <0..1> | jump <n>
modes:    shuffle | repeat
catalog:  search <q> | genre <tag> | album <id> | artist <id> | playlist <id> | featured | popular | new | track <id>
library:  like | liked [shuffle|list] [filter]
info:     status | queue | help | quit";

pub struct App {
    catalog: CatalogClient,
    liked: LikedTracksStore,
    commands: mpsc::UnboundedSender<PlayerCommand>,
    state: watch::Receiver<PlaybackState>,
    results: Vec<Track>,
    list_limit: u32,
    announced: Option<String>, // id of the last "now playing" line
}

impl App {
    pub fn new(
        catalog: CatalogClient,
        liked: LikedTracksStore,
        commands: mpsc::UnboundedSender<PlayerCommand>,
        state: watch::Receiver<PlaybackState>,
        list_limit: u32,
    ) -> Self {
        Self {
            catalog,
            liked,
            commands,
            state,
            results: Vec::new(),
            list_limit,
            announced: None,
        }
    }

    pub async fn run(mut self, mut events: EventHandler) -> Result<()> {
        let input = tokio::spawn(EventHandler::handle_console_input(events.sender()));
        println!("melodytail - type 'help' for commands");

        loop {
            tokio::select! {
                event = events.next_event() => {
                    let Some(event) = event else { break };
                    if !self.handle_event(event).await {
                        break;
                    }
                }
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.announce_track_change();
                }
            }
        }

        input.abort();
        let _ = self.commands.send(PlayerCommand::Shutdown);
        info!("Console closed");
        Ok(())
    }

    fn send(&self, command: PlayerCommand) {
        if self.commands.send(command).is_err() {
            warn!("Player is gone, command dropped");
        }
    }

    fn snapshot(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    fn announce_track_change(&mut self) {
        let state = self.state.borrow_and_update();
        let current = state.current_track.as_ref().map(|t| t.id.clone());
        if current != self.announced {
            if let Some(track) = &state.current_track {
                println!("Now playing: {}", track.display_line());
            }
            self.announced = current;
        }
    }

    /// Returns false when the console should close.
    pub async fn handle_event(&mut self, event: AppEvent) -> bool {
        debug!(?event, "Console event");
        if let Some(command) = playback_command(&event) {
            self.send(command);
            return true;
        }

        match event {
            AppEvent::Quit => return false,
            AppEvent::Help => println!("{}", HELP),
            AppEvent::Status => println!("{}", render_status(&self.snapshot())),
            AppEvent::ShowQueue => {
                for line in render_queue(&self.snapshot(), QUEUE_WINDOW) {
                    println!("{}", line);
                }
            }
            AppEvent::PlayResult(index) => match self.results.get(index) {
                Some(_) => self.send(PlayerCommand::PlayQueue {
                    tracks: self.results.clone(),
                    start_index: index,
                    source: QueueSource::General,
                }),
                None => println!("No result #{} (run a search first)", index + 1),
            },
            AppEvent::PlayTrackId(id) => match self.catalog.track_by_id(&id).await {
                Ok(response) => match response.results.into_iter().next() {
                    Some(track) => self.send(PlayerCommand::PlayTrack(track)),
                    None => println!("No track with id {}", id),
                },
                Err(e) => report_fetch_error(&e),
            },
            AppEvent::Browse(browse) => self.browse(browse).await,
            AppEvent::ToggleLike => self.toggle_like(),
            AppEvent::Liked(LikedAction::List(query)) => {
                let now = Utc::now().timestamp_millis();
                for line in render_liked(&self.liked, &query, now) {
                    println!("{}", line);
                }
            }
            AppEvent::Liked(LikedAction::Play(query)) => self.play_liked(&query, false),
            AppEvent::Liked(LikedAction::Shuffle(query)) => self.play_liked(&query, true),
            _ => {}
        }
        true
    }

    async fn browse(&mut self, browse: Browse) {
        let limit = self.list_limit;
        let response: Result<ApiResponse<Track>, CatalogError> = match &browse {
            Browse::Search(query) => self.catalog.search_tracks(query, limit).await,
            Browse::Genre(tag) => self.catalog.tracks_by_genre(tag, limit).await,
            Browse::Album(id) => self.catalog.album_tracks(id).await,
            Browse::Artist(id) => self.catalog.artist_tracks(id, limit).await,
            Browse::Playlist(id) => self.catalog.playlist_tracks(id).await,
            Browse::Featured => self.catalog.featured_tracks(limit).await,
            Browse::Popular => self.catalog.popular_tracks(limit).await,
            Browse::NewReleases => self.catalog.new_releases(limit).await,
        };

        match response {
            Ok(response) => {
                self.results = response.results;
                if self.results.is_empty() {
                    println!("Nothing found");
                }
                for line in render_results(&self.results) {
                    println!("{}", line);
                }
            }
            Err(e) => report_fetch_error(&e),
        }
    }

    fn toggle_like(&mut self) {
        let Some(track) = self.snapshot().current_track else {
            println!("Nothing is playing");
            return;
        };
        if self.liked.toggle_like(&track) {
            println!("Liked {} ({} liked)", track.display_line(), self.liked.count());
        } else {
            println!("Removed {} from liked tracks", track.display_line());
        }
    }

    fn play_liked(&self, query: &str, shuffle: bool) {
        match liked_queue(&self.liked, query, shuffle, &mut rand::thread_rng()) {
            Some(command) => self.send(command),
            None if self.liked.count() == 0 => {
                println!("No liked tracks yet - 'like' the current track to add it")
            }
            None => println!("No liked tracks match '{}'", query),
        }
    }
}

fn report_fetch_error(error: &CatalogError) {
    warn!(error = %error, "Catalog request failed");
    println!("Catalog unavailable: {}", error);
}

/// Console events that map straight onto a player command.
pub fn playback_command(event: &AppEvent) -> Option<PlayerCommand> {
    let command = match event {
        AppEvent::Play => PlayerCommand::Play,
        AppEvent::Pause => PlayerCommand::Pause,
        AppEvent::TogglePlayPause => PlayerCommand::TogglePlay,
        AppEvent::NextTrack => PlayerCommand::Next,
        AppEvent::PreviousTrack => PlayerCommand::Previous,
        AppEvent::Seek(seconds) => PlayerCommand::SeekTo(*seconds),
        AppEvent::Volume(volume) => PlayerCommand::SetVolume(*volume),
        AppEvent::JumpTo(index) => PlayerCommand::JumpTo(*index),
        AppEvent::ToggleShuffle => PlayerCommand::ToggleShuffle,
        AppEvent::ToggleRepeat => PlayerCommand::CycleRepeat,
        _ => return None,
    };
    Some(command)
}

/// The liked tracks matching `query` as a closed queue, optionally shuffled.
/// `None` when nothing matches.
pub fn liked_queue<R: Rng + ?Sized>(
    liked: &LikedTracksStore,
    query: &str,
    shuffle: bool,
    rng: &mut R,
) -> Option<PlayerCommand> {
    let mut tracks = liked.playable(query);
    if tracks.is_empty() {
        return None;
    }
    if shuffle {
        tracks.shuffle(rng);
    }
    Some(PlayerCommand::PlayQueue {
        tracks,
        start_index: 0,
        source: QueueSource::LikedSongs,
    })
}

pub fn render_status(state: &PlaybackState) -> String {
    let Some(track) = &state.current_track else {
        return "Nothing queued".to_string();
    };

    let filled = (state.progress_ratio() * PROGRESS_WIDTH as f64).round() as usize;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(PROGRESS_WIDTH - filled.min(PROGRESS_WIDTH)));

    format!(
        "{} {}\n[{}] {} / {}  vol {:.0}%  shuffle {}  {}  [{}/{}]{}",
        if state.is_playing { "Playing" } else { "Paused" },
        track.display_line(),
        bar,
        format_clock(state.current_time),
        format_clock(state.duration),
        state.volume * 100.0,
        if state.shuffle { "on" } else { "off" },
        state.repeat.label(),
        state.current_index + 1,
        state.queue.len(),
        if state.is_loading_more { "  loading more..." } else { "" },
    )
}

/// A window of the queue around the current track, marked with `>`.
pub fn render_queue(state: &PlaybackState, window: usize) -> Vec<String> {
    if state.queue.is_empty() {
        return vec!["Queue is empty".to_string()];
    }
    let start = state.current_index.saturating_sub(window / 2);
    let end = (start + window).min(state.queue.len());

    let mut lines: Vec<String> = state.queue[start..end]
        .iter()
        .enumerate()
        .map(|(offset, track)| {
            let index = start + offset;
            let marker = if index == state.current_index { '>' } else { ' ' };
            format!("{} {:>3}. {}  {}", marker, index + 1, track.display_line(), track.duration_string())
        })
        .collect();
    if end < state.queue.len() {
        lines.push(format!("      ... {} more", state.queue.len() - end));
    }
    lines
}

pub fn render_results(results: &[Track]) -> Vec<String> {
    results
        .iter()
        .enumerate()
        .map(|(i, track)| format!("{:>3}. {}  {}", i + 1, track.display_line(), track.duration_string()))
        .collect()
}

pub fn render_liked(liked: &LikedTracksStore, query: &str, now_ms: i64) -> Vec<String> {
    let matching = liked.search(query);
    if matching.is_empty() {
        return vec!["No liked tracks".to_string()];
    }
    matching
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "{:>3}. {}  (liked {})",
                i + 1,
                entry.track.display_line(),
                format_relative_time(entry.date_added, now_ms).to_lowercase()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn track(id: &str) -> Track {
        Track::new(id, format!("Song {}", id), format!("https://cdn.example/{}.mp3", id))
            .with_artist("9", "Nia")
            .with_duration(185)
    }

    fn state_with(n: usize, index: usize) -> PlaybackState {
        let queue: Vec<Track> = (0..n).map(|i| track(&i.to_string())).collect();
        PlaybackState {
            current_track: queue.get(index).cloned(),
            queue,
            current_index: index,
            ..PlaybackState::default()
        }
    }

    #[test]
    fn test_playback_events_map_to_commands() {
        assert_eq!(playback_command(&AppEvent::NextTrack), Some(PlayerCommand::Next));
        assert_eq!(playback_command(&AppEvent::ToggleRepeat), Some(PlayerCommand::CycleRepeat));
        assert_eq!(playback_command(&AppEvent::Seek(12.0)), Some(PlayerCommand::SeekTo(12.0)));
        assert_eq!(playback_command(&AppEvent::JumpTo(4)), Some(PlayerCommand::JumpTo(4)));
        assert_eq!(playback_command(&AppEvent::Status), None);
        assert_eq!(playback_command(&AppEvent::ToggleLike), None);
    }

    #[test]
    fn test_status_line() {
        let mut state = state_with(3, 1);
        state.is_playing = true;
        state.current_time = 62.0;
        state.duration = 185.0;

        let status = render_status(&state);
        assert!(status.starts_with("Playing Song 1 - Nia"));
        assert!(status.contains("1:02 / 3:05"));
        assert!(status.contains("vol 70%"));
        assert!(status.contains("Repeat: Off"));
        assert!(status.contains("[2/3]"));
        assert_eq!(render_status(&PlaybackState::default()), "Nothing queued");
    }

    #[test]
    fn test_queue_window_marks_current() {
        let state = state_with(30, 12);
        let lines = render_queue(&state, 10);

        assert_eq!(lines.len(), 11);
        assert!(lines[0].contains(" 8. Song 7"));
        assert!(lines[5].starts_with(">  13. Song 12"));
        assert_eq!(lines[10].trim(), "... 13 more");
    }

    #[test]
    fn test_liked_queue_is_closed_and_optional() {
        let dir = TempDir::new().unwrap();
        let mut liked = LikedTracksStore::open(dir.path().join("liked.json"));
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(liked_queue(&liked, "", false, &mut rng), None);

        for id in ["a", "b", "c", "d"] {
            liked.add_to_liked(&track(id));
        }
        match liked_queue(&liked, "", true, &mut rng) {
            Some(PlayerCommand::PlayQueue { tracks, start_index, source }) => {
                assert_eq!(start_index, 0);
                assert_eq!(source, QueueSource::LikedSongs);
                let mut ids: Vec<String> = tracks.into_iter().map(|t| t.id).collect();
                ids.sort();
                assert_eq!(ids, vec!["a", "b", "c", "d"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let lines = render_liked(&liked, "", Utc::now().timestamp_millis());
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("(liked just now)"));
    }

    #[test]
    fn test_liked_queue_and_list_honor_filter() {
        let dir = TempDir::new().unwrap();
        let mut liked = LikedTracksStore::open(dir.path().join("liked.json"));
        let mut rng = StdRng::seed_from_u64(3);
        liked.add_to_liked(&track("a"));
        liked.add_to_liked(&Track::new("b", "Tidewater", "https://cdn.example/b.mp3").with_artist("4", "Oren"));

        match liked_queue(&liked, "oren", false, &mut rng) {
            Some(PlayerCommand::PlayQueue { tracks, .. }) => {
                let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
                assert_eq!(ids, vec!["b"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(liked_queue(&liked, "nobody", false, &mut rng), None);

        let now = Utc::now().timestamp_millis();
        let lines = render_liked(&liked, "song a", now);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Song a"));
        assert_eq!(render_liked(&liked, "nobody", now), vec!["No liked tracks".to_string()]);
    }
}
