//! Audio output device seam and the `rodio` implementation.
//!
//! [`AudioOutput`] is the single audio resource of the process: one clip at
//! a time, started with [`start`](AudioOutput::start) and awaited with
//! [`finished`](AudioOutput::finished).  Starting a clip replaces whatever
//! was playing.

use std::io::Cursor;
use std::sync::{mpsc, Arc, Mutex};

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use super::PlaybackError;

// ---------------------------------------------------------------------------
// AudioOutput trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe audio sink.
///
/// All control methods are synchronous and take effect immediately; only
/// waiting for the end of a clip is async.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Decode `audio` and begin playing it at `speed`.  Any clip already
    /// playing is stopped first.
    fn start(&self, audio: Vec<u8>, speed: f32) -> Result<(), PlaybackError>;

    /// Resolve once the current clip has ended, naturally or via
    /// [`stop`](Self::stop).  Stays pending while paused.  Returns
    /// immediately when nothing is playing.
    async fn finished(&self);

    fn pause(&self);

    fn resume(&self);

    /// Change the speed of the clip in progress.
    fn set_speed(&self, speed: f32);

    /// Halt playback and drop buffered audio.  No-op when idle.
    fn stop(&self);
}

// ---------------------------------------------------------------------------
// RodioOutput
// ---------------------------------------------------------------------------

/// Default output device via `rodio`.
///
/// `rodio::OutputStream` is `!Send` on some platforms, so it lives on a
/// dedicated `audio-output` thread for as long as this value exists; only
/// the `Send` stream handle is kept here.  Each clip gets a fresh [`Sink`].
pub struct RodioOutput {
    handle: OutputStreamHandle,
    sink: Mutex<Option<Arc<Sink>>>,
    /// Dropping this ends the `audio-output` thread, closing the stream.
    _keepalive: mpsc::Sender<()>,
}

impl RodioOutput {
    /// Open the system default output device.
    pub fn new() -> Result<Self, PlaybackError> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (keepalive_tx, keepalive_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Blocks until the owning RodioOutput is dropped.
                    let _ = keepalive_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        let handle = handle_rx
            .recv()
            .map_err(|e| PlaybackError::Output(e.to_string()))?
            .map_err(PlaybackError::Output)?;

        log::info!("playback: audio output initialised on default device");

        Ok(Self {
            handle,
            sink: Mutex::new(None),
            _keepalive: keepalive_tx,
        })
    }

    fn current(&self) -> Option<Arc<Sink>> {
        self.sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    fn start(&self, audio: Vec<u8>, speed: f32) -> Result<(), PlaybackError> {
        let source =
            Decoder::new(Cursor::new(audio)).map_err(|e| PlaybackError::Decode(e.to_string()))?;

        let sink = Sink::try_new(&self.handle).map_err(|e| PlaybackError::Output(e.to_string()))?;
        sink.set_speed(speed);
        sink.append(source);

        let previous = self
            .sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Arc::new(sink));
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    async fn finished(&self) {
        let Some(sink) = self.current() else {
            return;
        };
        // `sleep_until_end` returns when the queue drains or `stop()` clears it.
        let _ = tokio::task::spawn_blocking(move || sink.sleep_until_end()).await;
    }

    fn pause(&self) {
        if let Some(sink) = self.current() {
            sink.pause();
        }
    }

    fn resume(&self) {
        if let Some(sink) = self.current() {
            sink.play();
        }
    }

    fn set_speed(&self, speed: f32) {
        if let Some(sink) = self.current() {
            sink.set_speed(speed);
        }
    }

    fn stop(&self) {
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sink) = sink {
            sink.stop();
            log::debug!("playback: audio output stopped");
        }
    }
}

// ---------------------------------------------------------------------------
// MockOutput (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockOutput;
