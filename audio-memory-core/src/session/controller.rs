use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;

use crate::models::audio_models::StateReport;
use crate::models::config::{self, MemoryConfiguration, MAX_MEMORY_SIZE_BYTES};
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::ServiceState;
use crate::session::dispatcher::Dispatcher;
use crate::session::worker::{Engine, Settings, WorkerMessage};
use crate::storage::wav_writer::WavWriterFactory;
use crate::traits::capture_source::CaptureSourceFactory;
use crate::traits::memory_delegate::MemoryDelegate;
use crate::traits::persistence_writer::WriterFactory;

/// Always-on audio memory with on-demand recording.
///
/// Captures continuously into a fixed-size ring buffer while LISTENING, so a
/// recording can start with audio from before it was requested. All state
/// lives on a dedicated worker thread; every method here only enqueues a task
/// and returns. Results come back through callbacks, which run on a separate
/// callback thread.
///
/// ```text
/// [CaptureSource] → pull → [RingBuffer] ──prepend/snapshot──→ [PersistenceWriter]
///                                └───────── live mirror while RECORDING ──┘
/// ```
pub struct RecordingController {
    tasks: Sender<WorkerMessage>,
    worker: Option<thread::JoinHandle<()>>,
    settings: Arc<Mutex<Settings>>,
    // Dropped after the worker is joined, so queued callbacks still run.
    _dispatcher: Dispatcher,
}

impl RecordingController {
    pub fn builder(config: MemoryConfiguration) -> RecordingControllerBuilder {
        RecordingControllerBuilder {
            config,
            sources: None,
            writers: None,
            delegate: None,
        }
    }

    /// READY → LISTENING. No-op while already capturing.
    pub fn enable_listening(&self) -> Result<(), CaptureError> {
        self.post(|engine| engine.enable_listening())
    }

    /// → READY, finishing an active recording first. Its result goes to
    /// [`MemoryDelegate::on_recording_finished`].
    pub fn disable_listening(&self) -> Result<(), CaptureError> {
        self.post(|engine| engine.disable_listening())
    }

    /// Start a recording that begins with the newest `prepend_secs` seconds
    /// of audio memory. Starts capture first when READY; no-op while
    /// RECORDING. Negative durations prepend nothing.
    pub fn start_recording(&self, prepend_secs: f64) -> Result<(), CaptureError> {
        self.post(move |engine| engine.start_recording(prepend_secs))
    }

    /// Finish the active recording. `on_file_ready` receives the file, or
    /// `InvalidState` when nothing is being recorded.
    pub fn stop_recording<F>(&self, on_file_ready: F) -> Result<(), CaptureError>
    where
        F: FnOnce(Result<RecordingResult, CaptureError>) + Send + 'static,
    {
        self.post(move |engine| engine.stop_recording(Box::new(on_file_ready)))
    }

    /// Write the newest `secs` seconds of audio memory to a standalone file
    /// named `name` (a generated name when blank). Only while LISTENING.
    pub fn dump_snapshot<F>(&self, secs: f64, name: &str, on_file_ready: F) -> Result<(), CaptureError>
    where
        F: FnOnce(Result<RecordingResult, CaptureError>) + Send + 'static,
    {
        let name = name.to_string();
        self.post(move |engine| engine.dump_snapshot(secs, name, Box::new(on_file_ready)))
    }

    /// Resize the audio memory, keeping the newest audio. Sizes are clamped
    /// to `0..=MAX_MEMORY_SIZE_BYTES` and rounded down to whole frames. If
    /// the memory cannot be allocated the old one stays and the failure goes
    /// to [`MemoryDelegate::on_error`].
    pub fn set_memory_size(&self, bytes: i64) -> Result<(), CaptureError> {
        let bytes = config::clamp_memory_size(bytes);
        self.post(move |engine| engine.set_memory_size(bytes))
    }

    /// Configured audio memory size in bytes.
    pub fn memory_size(&self) -> u64 {
        self.settings.lock().memory_size
    }

    /// Change the capture rate, restarting capture. Rates outside
    /// `1..=MAX_SAMPLE_RATE` are rejected with `InvalidArgument`. Only
    /// honoured while LISTENING; otherwise the change is dropped and
    /// reported through [`MemoryDelegate::on_error`].
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<(), CaptureError> {
        config::check_sample_rate(sample_rate).map_err(CaptureError::InvalidArgument)?;
        self.post(move |engine| engine.set_sample_rate(sample_rate))
    }

    pub fn sample_rate(&self) -> u32 {
        self.settings.lock().sample_rate
    }

    /// State as of the last executed task.
    pub fn state(&self) -> ServiceState {
        self.settings.lock().state
    }

    /// Flush pending capture and report memory and session figures.
    pub fn query_state<F>(&self, callback: F) -> Result<(), CaptureError>
    where
        F: FnOnce(StateReport) + Send + 'static,
    {
        self.post(move |engine| engine.query_state(callback))
    }

    fn post<F>(&self, task: F) -> Result<(), CaptureError>
    where
        F: FnOnce(&mut Engine) + Send + 'static,
    {
        self.tasks
            .send(WorkerMessage::Run(Box::new(task)))
            .map_err(|_| CaptureError::WorkerUnavailable)
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        let _ = self.tasks.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Audio worker panicked");
            }
        }
    }
}

pub struct RecordingControllerBuilder {
    config: MemoryConfiguration,
    sources: Option<Box<dyn CaptureSourceFactory>>,
    writers: Option<Box<dyn WriterFactory>>,
    delegate: Option<Arc<dyn MemoryDelegate>>,
}

impl RecordingControllerBuilder {
    /// Where captured audio comes from. Required.
    pub fn source_factory(mut self, factory: impl CaptureSourceFactory + 'static) -> Self {
        self.sources = Some(Box::new(factory));
        self
    }

    /// Where files go. Defaults to [`WavWriterFactory`].
    pub fn writer_factory(mut self, factory: impl WriterFactory + 'static) -> Self {
        self.writers = Some(Box::new(factory));
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn MemoryDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Validate the configuration and start the worker and callback threads.
    pub fn build(self) -> Result<RecordingController, CaptureError> {
        self.config
            .validate()
            .map_err(CaptureError::ConfigurationFailed)?;
        let sources = self.sources.ok_or_else(|| {
            CaptureError::ConfigurationFailed("a capture source factory is required".into())
        })?;
        let writers = self
            .writers
            .unwrap_or_else(|| Box::new(WavWriterFactory));

        let format = self.config.format();
        let settings = Arc::new(Mutex::new(Settings {
            sample_rate: format.sample_rate,
            memory_size: format.align_down(self.config.memory_size_bytes.min(MAX_MEMORY_SIZE_BYTES)),
            state: ServiceState::Ready,
        }));

        let dispatcher = Dispatcher::spawn()?;
        let (tasks, receiver) = unbounded();

        // The engine is built on the worker: capture sources are not `Send`.
        let config = self.config.clone();
        let delegate = self.delegate;
        let published = Arc::clone(&settings);
        let callbacks = dispatcher.poster();
        let worker = thread::Builder::new()
            .name("audio-memory-worker".into())
            .spawn(move || {
                Engine::new(&config, sources, writers, delegate, published, callbacks).run(receiver)
            })
            .map_err(|e| {
                CaptureError::ConfigurationFailed(format!("failed to spawn audio worker: {}", e))
            })?;

        let controller = RecordingController {
            tasks,
            worker: Some(worker),
            settings,
            _dispatcher: dispatcher,
        };

        if self.config.listen_on_start {
            controller.enable_listening()?;
        }
        log::debug!(
            "Audio memory ready: {} Hz, {} bytes",
            format.sample_rate,
            controller.memory_size()
        );
        Ok(controller)
    }
}
