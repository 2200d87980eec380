pub mod chime;

use chime::AlertChime;

use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "eyecare::audio";

use crate::log_warn;

enum AudioCommand {
    Chime,
    Stop,
}

/// Handle to a dedicated audio thread. The rodio stream is not `Send`, so it
/// lives on that thread and is driven through a channel.
#[derive(Clone)]
pub struct AudioEngineHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
}

impl Default for AudioEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngineHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;
                let volume: f32 = 0.8;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                    volume: f32,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        new_sink.set_volume(volume);
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Chime => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink, volume) {
                                log_warn!("alert chime unavailable: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                // Drop queued chimes so bursts of warnings don't pile up.
                                if s.len() > 1 {
                                    continue;
                                }
                                s.append(AlertChime::new());
                                s.play();
                            }
                        }
                        AudioCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    /// Queue one alert chime. Output device problems are reported by the audio
    /// thread's log, not here.
    pub fn chime(&self) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::Chime).map_err(|e| e.to_string())
    }

    pub fn stop(&self) -> Result<(), String> {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Stop);
        }
        Ok(())
    }
}
