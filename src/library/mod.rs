// Library - the user's saved tracks

pub mod liked;

pub use liked::{format_relative_time, LikedTrack, LikedTracksStore};
