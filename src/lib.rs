// melodytail library - core modules for the catalog-backed music player
// The player core (engine, transport, liked store) has no UI dependencies

pub mod catalog;  // remote catalog API client and records
pub mod config;   // settings and preferences
pub mod library;  // liked tracks
pub mod logging;  // tracing setup
pub mod playback; // queue engine, audio transport, controller
pub mod ui;       // console interface

// Export the stuff other modules actually use
pub use catalog::{CatalogClient, CatalogError, Track, TrackFeed};
pub use config::Config;
pub use library::{LikedTrack, LikedTracksStore};
pub use playback::{PlaybackState, PlayerCommand, PlayerController, QueueEngine, QueueSource, RepeatMode};
