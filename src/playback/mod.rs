// Playback - queue state machine, device transport and the controller tying them together

pub mod controller;
pub mod device;
pub mod engine;
#[cfg(feature = "audio")]
pub mod rodio_device;
pub mod state;
pub mod transport;

pub use controller::{ControllerSettings, PlayerCommand, PlayerController};
pub use device::{AudioDevice, DeviceError, DeviceEvent};
pub use engine::QueueEngine;
#[cfg(feature = "audio")]
pub use rodio_device::RodioDevice;
pub use state::{PlaybackState, QueueSource, RepeatMode};
pub use transport::Transport;
