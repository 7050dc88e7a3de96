// Transport - keeps the output device in step with the engine
// Engine state changes become device commands (`sync`), device events become
// engine commands (`handle_event`). Only the transport touches the device.

use super::device::{AudioDevice, DeviceEvent, Subscription};
use super::engine::QueueEngine;
use super::state::{PlaybackState, RepeatMode};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Device(DeviceEvent),
    /// The readiness wait for load `generation` ran out.
    ReadyTimeout(u64),
}

/// Deferred "start playing once ready". Armed per load; the first of
/// `CanPlay` or the timeout takes it, the other finds it empty.
#[derive(Debug, Default)]
struct StartLatch {
    armed: Option<u64>,
}

impl StartLatch {
    fn arm(&mut self, generation: u64) {
        self.armed = Some(generation);
    }

    fn disarm(&mut self) {
        self.armed = None;
    }

    fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Take the latch only if it is still armed for `generation`.
    fn take_for(&mut self, generation: u64) -> bool {
        if self.armed == Some(generation) {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

/// What the device was last told, so `sync` only issues changes.
#[derive(Debug, Default)]
struct Applied {
    track_id: Option<String>,
    audio_url: Option<String>,
    selection_epoch: u64,
    playing: bool,
    volume: Option<f32>,
}

pub struct Transport<D: AudioDevice> {
    device: D,
    device_rx: mpsc::UnboundedReceiver<DeviceEvent>,
    timer_tx: mpsc::UnboundedSender<u64>,
    timer_rx: mpsc::UnboundedReceiver<u64>,
    applied: Applied,
    latch: StartLatch,
    load_generation: u64,
    ready: bool,
    ready_timeout: Duration,
    _subscription: Subscription,
}

impl<D: AudioDevice> Transport<D> {
    pub fn new(device: D, ready_timeout: Duration) -> Self {
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let subscription = device.events().subscribe(device_tx);

        Self {
            device,
            device_rx,
            timer_tx,
            timer_rx,
            applied: Applied::default(),
            latch: StartLatch::default(),
            load_generation: 0,
            ready: false,
            ready_timeout,
            _subscription: subscription,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub async fn recv(&mut self) -> Option<TransportEvent> {
        tokio::select! {
            Some(event) = self.device_rx.recv() => Some(TransportEvent::Device(event)),
            Some(generation) = self.timer_rx.recv() => Some(TransportEvent::ReadyTimeout(generation)),
            else => None,
        }
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        if let Ok(event) = self.device_rx.try_recv() {
            return Some(TransportEvent::Device(event));
        }
        self.timer_rx.try_recv().ok().map(TransportEvent::ReadyTimeout)
    }

    /// Push whatever changed in `state` since the last call to the device.
    pub fn sync(&mut self, state: &PlaybackState) {
        if self.applied.volume != Some(state.volume) {
            if let Err(e) = self.device.set_volume(state.volume) {
                warn!(error = %e, "Failed to set device volume");
            }
            self.applied.volume = Some(state.volume);
        }

        let track = state.current_track.as_ref();
        let track_changed = track.map(|t| t.id.as_str()) != self.applied.track_id.as_deref()
            || track.map(|t| t.audio.as_str()) != self.applied.audio_url.as_deref();
        let reselected = state.selection_epoch != self.applied.selection_epoch;
        self.applied.selection_epoch = state.selection_epoch;

        if track_changed {
            self.applied.track_id = track.map(|t| t.id.clone());
            self.applied.audio_url = track.map(|t| t.audio.clone());
            match track {
                Some(track) => {
                    self.load(&track.audio, state.is_playing);
                    info!("Loading '{}'", track.display_line());
                }
                None => {
                    self.latch.disarm();
                    if let Err(e) = self.device.pause() {
                        warn!(error = %e, "Failed to pause device after queue cleared");
                    }
                }
            }
            self.applied.playing = state.is_playing;
            return;
        }

        if reselected && track.is_some() {
            self.restart();
        }

        if state.is_playing != self.applied.playing {
            self.applied.playing = state.is_playing;
            if state.is_playing {
                self.start_when_ready();
            } else {
                self.latch.disarm();
                if let Err(e) = self.device.pause() {
                    warn!(error = %e, "Device pause failed");
                }
            }
        } else if reselected && state.is_playing && self.ready && self.device.is_paused() {
            // same track re-selected after it ran out
            self.start_now();
        }
    }

    fn load(&mut self, url: &str, resume: bool) {
        self.load_generation += 1;
        self.ready = false;
        self.latch.disarm();

        if let Err(e) = self.device.load(url, self.load_generation) {
            warn!(error = %e, url, "Device failed to load source");
            return;
        }
        if resume {
            self.arm_latch();
        }
    }

    fn restart(&mut self) {
        if !self.ready {
            // still loading, so already at the start
            return;
        }
        debug!("Restarting current track");
        if let Err(e) = self.device.seek(0.0) {
            warn!(error = %e, "Failed to restart track");
        }
    }

    fn start_when_ready(&mut self) {
        if self.ready {
            self.start_now();
        } else if !self.latch.is_armed() {
            self.arm_latch();
        }
    }

    fn arm_latch(&mut self) {
        let generation = self.load_generation;
        self.latch.arm(generation);

        let timer_tx = self.timer_tx.clone();
        let timeout = self.ready_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timer_tx.send(generation);
        });
    }

    fn start_now(&mut self) {
        if let Err(e) = self.device.play() {
            // the device reports the refusal as a Paused event, which corrects the engine
            warn!(error = %e, "Device refused to start playback");
        }
    }

    /// Mirror a device event into the engine. The caller syncs afterwards.
    pub fn handle_event(&mut self, event: TransportEvent, engine: &mut QueueEngine) {
        match event {
            TransportEvent::Device(DeviceEvent::TimeUpdate(seconds)) => {
                engine.set_current_time(seconds);
            }
            TransportEvent::Device(DeviceEvent::DurationChange { load, seconds }) => {
                if self.is_current(load) {
                    engine.set_duration(seconds);
                }
            }
            TransportEvent::Device(DeviceEvent::CanPlay { load }) => {
                if !self.is_current(load) {
                    debug!(load, current = self.load_generation, "Ignoring readiness of a superseded source");
                    return;
                }
                self.ready = true;
                if self.latch.take_for(load) {
                    debug!("Source ready, resuming playback");
                    self.start_now();
                }
            }
            TransportEvent::ReadyTimeout(generation) => {
                if self.latch.take_for(generation) && self.device.is_paused() {
                    debug!(generation, "Readiness wait timed out, starting anyway");
                    self.start_now();
                }
            }
            TransportEvent::Device(DeviceEvent::Ended { load }) => {
                if !self.is_current(load) {
                    debug!(load, current = self.load_generation, "Ignoring completion of a superseded source");
                    return;
                }
                let before = engine.state().current_index;
                engine.advance();
                let state = engine.state();
                if state.current_index == before && state.repeat != RepeatMode::One {
                    // nothing to move to: hold the finished track paused; the
                    // following sync rewinds it to the start
                    info!("Reached the end of the queue");
                    engine.pause();
                    self.latch.disarm();
                    if let Err(e) = self.device.pause() {
                        warn!(error = %e, "Failed to pause device at end of queue");
                    }
                    self.applied.playing = false;
                }
            }
            TransportEvent::Device(DeviceEvent::Started) => {
                engine.play();
                self.applied.playing = true;
            }
            TransportEvent::Device(DeviceEvent::Paused) => {
                engine.pause();
                self.applied.playing = false;
            }
            TransportEvent::Device(DeviceEvent::Error(message)) => {
                warn!(%message, "Audio device error");
            }
        }
    }

    fn is_current(&self, load: u64) -> bool {
        load == self.load_generation
    }

    /// Seek the device and mirror the position in the same step.
    pub fn seek_to(&mut self, seconds: f64, engine: &mut QueueEngine) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if let Err(e) = self.device.seek(seconds) {
            warn!(error = %e, seconds, "Seek failed");
        }
        engine.set_current_time(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Track;
    use crate::playback::device::mock::{DeviceCall, MockDevice};
    use crate::playback::QueueSource;

    fn track(id: &str) -> Track {
        Track::new(id, format!("Song {}", id), format!("https://cdn.example/{}.mp3", id))
    }

    fn setup(ids: &[&str]) -> (MockDevice, Transport<MockDevice>, QueueEngine) {
        let device = MockDevice::new();
        let transport = Transport::new(device.clone(), DEFAULT_READY_TIMEOUT);
        let mut engine = QueueEngine::with_seed(11);
        engine.set_queue(ids.iter().map(|id| track(id)).collect(), 0, QueueSource::General);
        (device, transport, engine)
    }

    /// Feed every queued event back through the transport, syncing after each.
    fn pump(transport: &mut Transport<MockDevice>, engine: &mut QueueEngine) {
        while let Some(event) = transport.try_recv() {
            transport.handle_event(event, engine);
            transport.sync(engine.state());
        }
    }

    #[tokio::test]
    async fn test_track_change_loads_without_playing_when_paused() {
        let (device, mut transport, engine) = setup(&["A", "B"]);
        transport.sync(engine.state());

        assert_eq!(
            device.calls(),
            vec![DeviceCall::Volume(0.7), DeviceCall::Load("https://cdn.example/A.mp3".to_string())]
        );
        assert!(!transport.latch.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_event_starts_playback_once() {
        let (device, mut transport, mut engine) = setup(&["A", "B"]);
        engine.play();
        transport.sync(engine.state());
        assert_eq!(device.count(&DeviceCall::Play), 0);

        device.ready();
        pump(&mut transport, &mut engine);
        assert_eq!(device.count(&DeviceCall::Play), 1);

        // the fallback timer fires later and finds the latch already taken
        tokio::time::sleep(DEFAULT_READY_TIMEOUT * 2).await;
        pump(&mut transport, &mut engine);
        assert_eq!(device.count(&DeviceCall::Play), 1);
        assert!(engine.state().is_playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_starts_playback_without_ready_event() {
        let (device, mut transport, mut engine) = setup(&["A", "B"]);
        engine.play();
        transport.sync(engine.state());

        tokio::time::sleep(DEFAULT_READY_TIMEOUT + Duration::from_millis(10)).await;
        pump(&mut transport, &mut engine);
        assert_eq!(device.count(&DeviceCall::Play), 1);

        // a late CanPlay must not start it a second time
        device.ready();
        pump(&mut transport, &mut engine);
        assert_eq!(device.count(&DeviceCall::Play), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timeout_is_ignored_after_track_switch() {
        let (device, mut transport, mut engine) = setup(&["A", "B"]);
        engine.play();
        transport.sync(engine.state());

        engine.advance();
        transport.sync(engine.state());
        device.ready();
        pump(&mut transport, &mut engine);
        assert_eq!(device.count(&DeviceCall::Play), 1);

        tokio::time::sleep(DEFAULT_READY_TIMEOUT * 2).await;
        pump(&mut transport, &mut engine);
        assert_eq!(device.count(&DeviceCall::Play), 1);
        assert_eq!(device.count(&DeviceCall::Load("https://cdn.example/B.mp3".to_string())), 1);
    }

    #[tokio::test]
    async fn test_ended_advances_and_stops_at_queue_end() {
        let (device, mut transport, mut engine) = setup(&["A", "B"]);
        transport.sync(engine.state());
        device.ready();
        engine.play();
        transport.sync(engine.state());
        pump(&mut transport, &mut engine);

        device.finish();
        pump(&mut transport, &mut engine);
        assert_eq!(engine.state().current_index, 1);
        assert!(engine.state().is_playing);
        assert_eq!(device.count(&DeviceCall::Load("https://cdn.example/B.mp3".to_string())), 1);

        device.ready();
        pump(&mut transport, &mut engine);
        device.clear_calls();

        device.finish();
        pump(&mut transport, &mut engine);
        assert_eq!(engine.state().current_index, 1);
        assert!(!engine.state().is_playing);
        // the last track is held paused at its start, not replayed
        assert_eq!(device.calls(), vec![DeviceCall::Pause, DeviceCall::Seek(0.0)]);

        engine.play();
        transport.sync(engine.state());
        assert_eq!(device.count(&DeviceCall::Play), 1);
    }

    #[tokio::test]
    async fn test_end_of_single_track_queue_pauses_device() {
        let device = MockDevice::new();
        let mut transport = Transport::new(device.clone(), DEFAULT_READY_TIMEOUT);
        let mut engine = QueueEngine::with_seed(3);
        engine.set_queue(vec![track("solo")], 0, QueueSource::LikedSongs);
        engine.play();
        transport.sync(engine.state());
        device.ready();
        pump(&mut transport, &mut engine);
        assert!(engine.state().is_playing);
        device.clear_calls();

        device.finish();
        pump(&mut transport, &mut engine);

        assert!(!engine.state().is_playing);
        assert_eq!(device.count(&DeviceCall::Play), 0);
        let calls = device.calls();
        let pause = calls.iter().position(|c| *c == DeviceCall::Pause);
        let seek = calls.iter().position(|c| *c == DeviceCall::Seek(0.0));
        assert!(matches!((pause, seek), (Some(p), Some(s)) if p < s));
    }

    #[tokio::test]
    async fn test_readiness_of_superseded_load_is_ignored() {
        let (device, mut transport, mut engine) = setup(&["A", "B"]);
        engine.play();
        transport.sync(engine.state());
        let first_load = device.current_load();

        engine.advance();
        transport.sync(engine.state());
        device.emit(DeviceEvent::CanPlay { load: first_load });
        device.emit(DeviceEvent::DurationChange { load: first_load, seconds: 321.0 });
        pump(&mut transport, &mut engine);

        assert!(!transport.ready);
        assert!(transport.latch.is_armed());
        assert_eq!(device.count(&DeviceCall::Play), 0);
        assert_eq!(engine.state().duration, 0.0);
        assert!(engine.state().is_playing);

        device.ready();
        pump(&mut transport, &mut engine);
        assert!(transport.ready);
        assert_eq!(device.count(&DeviceCall::Play), 1);
    }

    #[tokio::test]
    async fn test_completion_of_superseded_load_does_not_advance() {
        let (device, mut transport, mut engine) = setup(&["A", "B", "C"]);
        transport.sync(engine.state());
        let first_load = device.current_load();

        engine.advance();
        transport.sync(engine.state());
        device.emit(DeviceEvent::Ended { load: first_load });
        pump(&mut transport, &mut engine);

        assert_eq!(engine.state().current_index, 1);
    }

    #[tokio::test]
    async fn test_repeat_one_completion_restarts_same_track() {
        let (device, mut transport, mut engine) = setup(&["A", "B"]);
        engine.cycle_repeat();
        engine.cycle_repeat();
        transport.sync(engine.state());
        device.ready();
        engine.play();
        transport.sync(engine.state());
        pump(&mut transport, &mut engine);
        device.clear_calls();

        device.finish();
        pump(&mut transport, &mut engine);

        assert_eq!(engine.state().current_index, 0);
        assert!(device.calls().contains(&DeviceCall::Seek(0.0)));
        assert_eq!(device.count(&DeviceCall::Load("https://cdn.example/A.mp3".to_string())), 0);
    }

    #[tokio::test]
    async fn test_device_events_mirror_into_engine() {
        let (device, mut transport, mut engine) = setup(&["A"]);
        transport.sync(engine.state());

        device.emit(DeviceEvent::DurationChange { load: device.current_load(), seconds: 200.0 });
        device.emit(DeviceEvent::TimeUpdate(12.5));
        device.emit(DeviceEvent::Started);
        pump(&mut transport, &mut engine);
        assert_eq!(engine.state().duration, 200.0);
        assert_eq!(engine.state().current_time, 12.5);
        assert!(engine.state().is_playing);
        // mirrored state is not echoed back as a command
        assert_eq!(device.count(&DeviceCall::Play), 0);

        device.emit(DeviceEvent::Paused);
        pump(&mut transport, &mut engine);
        assert!(!engine.state().is_playing);
        assert_eq!(device.count(&DeviceCall::Pause), 0);
    }

    #[tokio::test]
    async fn test_rejected_play_corrects_intent() {
        let (device, mut transport, mut engine) = setup(&["A"]);
        transport.sync(engine.state());
        device.ready();
        pump(&mut transport, &mut engine);

        device.set_reject_play(true);
        engine.play();
        transport.sync(engine.state());
        assert_eq!(device.count(&DeviceCall::Play), 1);

        pump(&mut transport, &mut engine);
        assert!(!engine.state().is_playing);
    }

    #[tokio::test]
    async fn test_volume_change_does_not_reload() {
        let (device, mut transport, mut engine) = setup(&["A"]);
        transport.sync(engine.state());
        device.clear_calls();

        engine.set_volume(0.3);
        transport.sync(engine.state());
        assert_eq!(device.calls(), vec![DeviceCall::Volume(0.3)]);
    }

    #[tokio::test]
    async fn test_seek_mirrors_time_immediately() {
        let (device, mut transport, mut engine) = setup(&["A"]);
        transport.sync(engine.state());
        engine.set_duration(180.0);

        transport.seek_to(42.0, &mut engine);
        assert_eq!(engine.state().current_time, 42.0);
        assert!(device.calls().contains(&DeviceCall::Seek(42.0)));
    }

    #[tokio::test]
    async fn test_dropping_transport_releases_subscription() {
        let (device, transport, _engine) = setup(&["A"]);
        assert!(device.events().is_subscribed());
        drop(transport);
        assert!(!device.events().is_subscribed());
    }
}
