// Audio output device contract
// Commands go in through `AudioDevice`, everything the device notices on its
// own (progress, end of track, readiness) comes back out as `DeviceEvent`s.

use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    TimeUpdate(f64), // seconds into the current source
    // Source-bound events carry the id passed to `load`, so a listener can
    // tell them apart from leftovers of a superseded source.
    DurationChange { load: u64, seconds: f64 },
    CanPlay { load: u64 }, // buffered enough to start
    Ended { load: u64 },
    Started,
    Paused,
    Error(String),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio source loaded")]
    NotLoaded,
    #[error("playback rejected: {0}")]
    Rejected(String),
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
}

pub trait AudioDevice {
    /// Replace the current source. Returns once the load is started; readiness
    /// is reported later through `DeviceEvent::CanPlay` tagged with `load_id`.
    fn load(&mut self, url: &str, load_id: u64) -> Result<(), DeviceError>;
    /// A refused start must also be reported as `DeviceEvent::Paused`.
    fn play(&mut self) -> Result<(), DeviceError>;
    fn pause(&mut self) -> Result<(), DeviceError>;
    fn seek(&mut self, seconds: f64) -> Result<(), DeviceError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), DeviceError>;
    fn is_paused(&self) -> bool;
    fn events(&self) -> &EventBus;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Slot = Arc<Mutex<Option<mpsc::UnboundedSender<DeviceEvent>>>>;

/// One-listener event outlet owned by a device. Cloned into the device's
/// background tasks so they can report without holding the device.
#[derive(Clone, Default)]
pub struct EventBus {
    slot: Slot,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listener. It stays registered until the returned guard
    /// is dropped.
    pub fn subscribe(&self, sender: mpsc::UnboundedSender<DeviceEvent>) -> Subscription {
        *lock(&self.slot) = Some(sender);
        Subscription { slot: self.slot.clone() }
    }

    pub fn emit(&self, event: DeviceEvent) {
        if let Some(sender) = lock(&self.slot).as_ref() {
            let _ = sender.send(event);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

pub struct Subscription {
    slot: Slot,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        lock(&self.slot).take();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_released_on_drop() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = bus.subscribe(tx);
        assert!(bus.is_subscribed());
        bus.emit(DeviceEvent::CanPlay { load: 1 });
        assert_eq!(rx.try_recv().ok(), Some(DeviceEvent::CanPlay { load: 1 }));

        drop(subscription);
        assert!(!bus.is_subscribed());
        bus.emit(DeviceEvent::Ended { load: 1 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_listener_is_dropped() {
        let bus = EventBus::new();
        bus.emit(DeviceEvent::TimeUpdate(1.0));
        assert!(!bus.is_subscribed());
    }
}
