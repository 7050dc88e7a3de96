use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// What to do with the liked tracks matching a search string; an empty
/// string matches all of them.
#[derive(Debug, Clone, PartialEq)]
pub enum LikedAction {
    Play(String),
    Shuffle(String),
    List(String),
}

/// Catalog listings that fill the result list.
#[derive(Debug, Clone, PartialEq)]
pub enum Browse {
    Search(String),
    Genre(String),
    Album(String),
    Artist(String),
    Playlist(String),
    Featured,
    Popular,
    NewReleases,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    // UI Events
    Quit,
    Help,
    Status,
    ShowQueue,

    // Playback Events
    Play,
    PlayResult(usize),
    PlayTrackId(String),
    Pause,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    Seek(f64),
    Volume(f32),
    JumpTo(usize),

    // Playlist Events
    ToggleShuffle,
    ToggleRepeat,

    // Catalog Events
    Browse(Browse),

    // Library Events
    ToggleLike,
    Liked(LikedAction),
}

/// Turn one console line into an event. `Ok(None)` for blank lines, `Err`
/// with a usage hint for anything unrecognised.
pub fn parse_line(line: &str) -> Result<Option<AppEvent>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let event = match command.to_lowercase().as_str() {
        "quit" | "exit" | "q" => AppEvent::Quit,
        "help" | "?" => AppEvent::Help,
        "status" | "s" => AppEvent::Status,
        "queue" => AppEvent::ShowQueue,

        "play" | "p" if rest.is_empty() => AppEvent::Play,
        "play" | "p" => AppEvent::PlayResult(parse_position(rest)?),
        "track" if !rest.is_empty() => AppEvent::PlayTrackId(rest.to_string()),
        "pause" => AppEvent::Pause,
        "toggle" | "t" => AppEvent::TogglePlayPause,
        "next" | "n" => AppEvent::NextTrack,
        "prev" | "previous" | "b" => AppEvent::PreviousTrack,
        "seek" => AppEvent::Seek(parse_seconds(rest)?),
        "vol" | "volume" => AppEvent::Volume(parse_volume(rest)?),
        "jump" | "j" => AppEvent::JumpTo(parse_position(rest)?),

        "shuffle" | "z" => AppEvent::ToggleShuffle,
        "repeat" | "r" => AppEvent::ToggleRepeat,

        "search" | "/" if !rest.is_empty() => AppEvent::Browse(Browse::Search(rest.to_string())),
        "genre" if !rest.is_empty() => AppEvent::Browse(Browse::Genre(rest.to_lowercase())),
        "album" if !rest.is_empty() => AppEvent::Browse(Browse::Album(rest.to_string())),
        "artist" if !rest.is_empty() => AppEvent::Browse(Browse::Artist(rest.to_string())),
        "playlist" if !rest.is_empty() => AppEvent::Browse(Browse::Playlist(rest.to_string())),
        "featured" => AppEvent::Browse(Browse::Featured),
        "popular" => AppEvent::Browse(Browse::Popular),
        "new" => AppEvent::Browse(Browse::NewReleases),

        "like" | "l" => AppEvent::ToggleLike,
        "liked" => AppEvent::Liked(parse_liked(rest)),

        "track" | "search" | "/" | "genre" | "album" | "artist" | "playlist" => {
            return Err(format!("'{}' needs an argument", command))
        }
        _ => return Err(format!("unknown command '{}' (type 'help')", command)),
    };
    Ok(Some(event))
}

/// `liked [shuffle|list] [query]`; anything else after `liked` is the query.
fn parse_liked(rest: &str) -> LikedAction {
    let (word, query) = match rest.split_once(char::is_whitespace) {
        Some((word, query)) => (word, query.trim()),
        None => (rest, ""),
    };
    match word.to_lowercase().as_str() {
        "shuffle" => LikedAction::Shuffle(query.to_string()),
        "list" => LikedAction::List(query.to_string()),
        _ => LikedAction::Play(rest.to_string()),
    }
}

/// Positions are typed 1-based, the way lists are printed.
fn parse_position(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("expected a position from 1, got '{}'", arg)),
    }
}

/// Accepts plain seconds ("95") or clock form ("1:35").
fn parse_seconds(arg: &str) -> Result<f64, String> {
    let invalid = || format!("expected seconds or m:ss, got '{}'", arg);
    let seconds = match arg.split_once(':') {
        Some((minutes, secs)) => {
            let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
            let secs: f64 = secs.parse().map_err(|_| invalid())?;
            f64::from(minutes) * 60.0 + secs
        }
        None => arg.parse().map_err(|_| invalid())?,
    };
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(invalid())
    }
}

fn parse_volume(arg: &str) -> Result<f32, String> {
    arg.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("expected a volume between 0 and 1, got '{}'", arg))
}

pub struct EventHandler {
    event_sender: mpsc::UnboundedSender<AppEvent>,
    event_receiver: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();

        Self {
            event_sender,
            event_receiver,
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.event_sender.clone()
    }

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.event_receiver.recv().await
    }

    /// Read stdin line by line until EOF, which counts as `quit`.
    pub async fn handle_console_input(sender: mpsc::UnboundedSender<AppEvent>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_line(&line) {
                Ok(Some(event)) => {
                    let quit = event == AppEvent::Quit;
                    if sender.send(event).is_err() || quit {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(hint) => println!("{}", hint),
            }
        }
        let _ = sender.send(AppEvent::Quit);
        Ok(())
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
