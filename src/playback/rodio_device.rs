// rodio-backed output device
// Sources are fetched over HTTP in the background, decoded in memory and
// handed to a paused sink; a monitor task turns sink state into events.

use super::device::{lock, AudioDevice, DeviceError, DeviceEvent, EventBus};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Default)]
struct Shared {
    sink: Mutex<Option<Sink>>,
    bytes: Mutex<Option<Arc<[u8]>>>, // kept so an ended source can be restarted
    volume: Mutex<f32>,
    loaded: AtomicU64, // load id of the source in `sink`
    ended_reported: AtomicBool,
}

pub struct RodioDevice {
    _stream: OutputStream, // must outlive every sink
    stream_handle: OutputStreamHandle,
    shared: Arc<Shared>,
    generation: Arc<AtomicU64>,
    http: reqwest::Client,
    bus: EventBus,
    monitor: JoinHandle<()>,
}

impl RodioDevice {
    /// Open the default output. Must be called inside a tokio runtime.
    pub fn new(volume: f32) -> Result<Self, DeviceError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        let shared = Arc::new(Shared::default());
        *lock(&shared.volume) = volume.clamp(0.0, 1.0);
        let bus = EventBus::new();
        let monitor = tokio::spawn(monitor_sink(shared.clone(), bus.clone()));

        Ok(Self {
            _stream: stream,
            stream_handle,
            shared,
            generation: Arc::new(AtomicU64::new(0)),
            http: reqwest::Client::new(),
            bus,
            monitor,
        })
    }

    fn stop_current(&self) {
        if let Some(sink) = lock(&self.shared.sink).take() {
            sink.stop();
        }
        lock(&self.shared.bytes).take();
        self.shared.ended_reported.store(false, Ordering::SeqCst);
    }
}

fn decode(bytes: Arc<[u8]>) -> Result<Decoder<Cursor<Arc<[u8]>>>, String> {
    Decoder::new(Cursor::new(bytes)).map_err(|e| e.to_string())
}

async fn fetch_source(http: reqwest::Client, url: String) -> Result<Arc<[u8]>, String> {
    let response = http.get(&url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(Arc::from(bytes.as_ref()))
}

/// Reports progress while playing and a single `Ended` once the sink drains.
async fn monitor_sink(shared: Arc<Shared>, bus: EventBus) {
    let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
    loop {
        interval.tick().await;
        let guard = lock(&shared.sink);
        let Some(sink) = guard.as_ref() else {
            continue;
        };

        if sink.empty() {
            if !shared.ended_reported.swap(true, Ordering::SeqCst) {
                bus.emit(DeviceEvent::Ended {
                    load: shared.loaded.load(Ordering::SeqCst),
                });
            }
        } else if !sink.is_paused() {
            bus.emit(DeviceEvent::TimeUpdate(sink.get_pos().as_secs_f64()));
        }
    }
}

impl AudioDevice for RodioDevice {
    fn load(&mut self, url: &str, load_id: u64) -> Result<(), DeviceError> {
        self.stop_current();
        let generation = load_id;
        self.generation.store(generation, Ordering::SeqCst);

        let current = self.generation.clone();
        let shared = self.shared.clone();
        let bus = self.bus.clone();
        let handle = self.stream_handle.clone();
        let http = self.http.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let bytes = match fetch_source(http, url.clone()).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(%url, error = %e, "Failed to fetch audio");
                    bus.emit(DeviceEvent::Error(format!("fetch failed: {}", e)));
                    return;
                }
            };
            if current.load(Ordering::SeqCst) != generation {
                debug!(%url, "Dropping superseded audio load");
                return;
            }

            let source = match decode(bytes.clone()) {
                Ok(source) => source,
                Err(e) => {
                    error!(%url, error = %e, "Failed to decode audio");
                    bus.emit(DeviceEvent::Error(format!("decode failed: {}", e)));
                    return;
                }
            };
            let total = source.total_duration();

            let sink = match Sink::try_new(&handle) {
                Ok(sink) => sink,
                Err(e) => {
                    bus.emit(DeviceEvent::Error(format!("no output sink: {}", e)));
                    return;
                }
            };
            sink.pause();
            sink.set_volume(*lock(&shared.volume));
            sink.append(source);

            {
                let mut slot = lock(&shared.sink);
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                *slot = Some(sink);
                shared.loaded.store(generation, Ordering::SeqCst);
            }
            *lock(&shared.bytes) = Some(bytes);
            shared.ended_reported.store(false, Ordering::SeqCst);

            if let Some(total) = total {
                bus.emit(DeviceEvent::DurationChange {
                    load: generation,
                    seconds: total.as_secs_f64(),
                });
            }
            bus.emit(DeviceEvent::TimeUpdate(0.0));
            bus.emit(DeviceEvent::CanPlay { load: generation });
        });

        Ok(())
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        match lock(&self.shared.sink).as_ref() {
            Some(sink) => {
                sink.play();
                self.bus.emit(DeviceEvent::Started);
                Ok(())
            }
            None => {
                self.bus.emit(DeviceEvent::Paused);
                Err(DeviceError::NotLoaded)
            }
        }
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        if let Some(sink) = lock(&self.shared.sink).as_ref() {
            sink.pause();
            self.bus.emit(DeviceEvent::Paused);
        }
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<(), DeviceError> {
        let guard = lock(&self.shared.sink);
        let sink = guard.as_ref().ok_or(DeviceError::NotLoaded)?;

        if sink.empty() {
            // the source ran out; rebuild it from the cached bytes
            let bytes = lock(&self.shared.bytes).clone().ok_or(DeviceError::NotLoaded)?;
            let source = decode(bytes).map_err(DeviceError::Seek)?;
            sink.append(source);
            self.shared.ended_reported.store(false, Ordering::SeqCst);
        }

        let position = Duration::from_secs_f64(seconds.max(0.0));
        sink.try_seek(position).map_err(|e| DeviceError::Seek(e.to_string()))?;
        self.bus.emit(DeviceEvent::TimeUpdate(position.as_secs_f64()));
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), DeviceError> {
        let volume = volume.clamp(0.0, 1.0);
        *lock(&self.shared.volume) = volume;
        if let Some(sink) = lock(&self.shared.sink).as_ref() {
            sink.set_volume(volume);
        }
        Ok(())
    }

    fn is_paused(&self) -> bool {
        lock(&self.shared.sink)
            .as_ref()
            .map(|sink| sink.is_paused() || sink.empty())
            .unwrap_or(true)
    }

    fn events(&self) -> &EventBus {
        &self.bus
    }
}

impl Drop for RodioDevice {
    fn drop(&mut self) {
        self.monitor.abort();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = lock(&self.shared.sink).take() {
            sink.stop();
        }
        debug!("Audio device closed");
    }
}
