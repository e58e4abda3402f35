use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use crate::models::audio_models::{AudioFormat, StateReport};
use crate::models::config::{MemoryConfiguration, MAX_MEMORY_SIZE_BYTES};
use crate::models::error::CaptureError;
use crate::models::recording_result::{FileReadyCallback, RecordingResult};
use crate::models::state::ServiceState;
use crate::processing::ring_buffer::RingBuffer;
use crate::session::dispatcher::CallbackPoster;
use crate::session::extraction::Extraction;
use crate::session::scheduler::CaptureScheduler;
use crate::storage::naming;
use crate::traits::capture_source::{CaptureSource, CaptureSourceFactory};
use crate::traits::memory_delegate::MemoryDelegate;
use crate::traits::persistence_writer::{PersistenceWriter, WriterFactory};

pub(crate) type Task = Box<dyn FnOnce(&mut Engine) + Send>;

pub(crate) enum WorkerMessage {
    Run(Task),
    Shutdown,
}

/// Values the worker publishes for the non-blocking getters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub sample_rate: u32,
    pub memory_size: u64,
    pub state: ServiceState,
}

/// The live recording: exists only while the state is `Recording`.
struct RecordingSession {
    writer: Box<dyn PersistenceWriter>,
    file_path: PathBuf,
    /// Reconstructed start of the prepended audio.
    started_at: DateTime<Local>,
    opened_at: Instant,
    prepended_bytes: u64,
}

/// Everything the audio worker owns. Never touched from another thread.
pub(crate) struct Engine {
    format: AudioFormat,
    memory_size: u64,
    output_directory: PathBuf,
    file_prefix: String,
    state: ServiceState,
    listening_enabled: bool,
    memory: RingBuffer,
    scheduler: CaptureScheduler,
    source: Option<Box<dyn CaptureSource>>,
    session: Option<RecordingSession>,
    sources: Box<dyn CaptureSourceFactory>,
    writers: Box<dyn WriterFactory>,
    delegate: Option<Arc<dyn MemoryDelegate>>,
    settings: Arc<Mutex<Settings>>,
    callbacks: CallbackPoster,
    worker_thread: Option<ThreadId>,
}

impl Engine {
    pub fn new(
        config: &MemoryConfiguration,
        sources: Box<dyn CaptureSourceFactory>,
        writers: Box<dyn WriterFactory>,
        delegate: Option<Arc<dyn MemoryDelegate>>,
        settings: Arc<Mutex<Settings>>,
        callbacks: CallbackPoster,
    ) -> Self {
        let format = config.format();
        let memory_size = format.align_down(config.memory_size_bytes.min(MAX_MEMORY_SIZE_BYTES));
        *settings.lock() = Settings {
            sample_rate: format.sample_rate,
            memory_size,
            state: ServiceState::Ready,
        };

        Self {
            format,
            memory_size,
            output_directory: config.output_directory.clone(),
            file_prefix: config.file_prefix.clone(),
            state: ServiceState::Ready,
            listening_enabled: false,
            memory: RingBuffer::new(),
            scheduler: CaptureScheduler::new(),
            source: None,
            session: None,
            sources,
            writers,
            delegate,
            settings,
            callbacks,
            worker_thread: None,
        }
    }

    /// Worker loop: run queued tasks in order, and scheduled pulls whenever
    /// the queue is idle past their deadline.
    pub fn run(mut self, tasks: Receiver<WorkerMessage>) {
        self.worker_thread = Some(thread::current().id());
        log::debug!("Audio worker started");

        loop {
            // A due pull goes first, so a busy queue cannot hold it back.
            if self.scheduler.is_due(Instant::now()) {
                self.pull_scheduled();
            }

            let message = match self.scheduler.next_pull() {
                Some(deadline) => match tasks.recv_deadline(deadline) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => WorkerMessage::Shutdown,
                },
                None => tasks.recv().unwrap_or(WorkerMessage::Shutdown),
            };

            match message {
                WorkerMessage::Run(task) => task(&mut self),
                WorkerMessage::Shutdown => {
                    self.shutdown();
                    break;
                }
            }
        }

        log::debug!("Audio worker stopped");
    }

    // --- Control operations ---

    pub fn enable_listening(&mut self) {
        self.listening_enabled = true;
        self.start_listening();
    }

    pub fn disable_listening(&mut self) {
        self.listening_enabled = false;
        if self.state.is_recording() {
            self.finish_session(None);
        }
        self.stop_listening();
    }

    pub fn start_recording(&mut self, prepend_secs: f64) {
        match self.state {
            ServiceState::Recording => {
                log::debug!("Already recording, ignoring start");
                return;
            }
            ServiceState::Ready => {
                if !self.start_listening() {
                    return;
                }
            }
            ServiceState::Listening => {}
        }

        log::debug!("Executing: start recording, prepending {:.1}s", prepend_secs);
        self.flush_or_abort();
        let extraction = Extraction::plan(self.memory.count_filled(), prepend_secs, &self.format);
        let started_at = extraction.started_at(&self.format, Local::now());
        let file_name = naming::default_file_name(&self.file_prefix, &started_at);
        let file_path = naming::unique_path(&self.output_directory, &file_name);

        let mut writer = match self.writers.create(&file_path, &self.format) {
            Ok(writer) => writer,
            Err(e) => {
                log::error!("Can't create {}: {}", file_path.display(), e);
                self.notify_error(e);
                self.settle();
                return;
            }
        };

        if let Err(e) = extraction.write_to(&self.memory, writer.as_mut()) {
            log::error!("Error writing history into {}: {}", file_path.display(), e);
            discard(writer);
            self.notify_error(e);
            self.settle();
            return;
        }

        self.session = Some(RecordingSession {
            writer,
            file_path,
            started_at,
            opened_at: Instant::now(),
            prepended_bytes: extraction.use_bytes as u64,
        });
        self.set_state(ServiceState::Recording);
    }

    pub fn stop_recording(&mut self, on_file_ready: FileReadyCallback) {
        if !self.state.is_recording() {
            log::debug!("Not recording, ignoring stop");
            self.callbacks.post(move || {
                on_file_ready(Err(CaptureError::InvalidState("not recording".into())))
            });
            return;
        }
        self.finish_session(Some(on_file_ready));
    }

    pub fn dump_snapshot(&mut self, secs: f64, name: String, on_file_ready: FileReadyCallback) {
        if self.state != ServiceState::Listening {
            log::warn!("Snapshot requested while {:?}, rejecting", self.state);
            self.callbacks.post(move || {
                on_file_ready(Err(CaptureError::InvalidState("not listening".into())))
            });
            return;
        }

        self.flush_or_abort();
        let result = self.write_snapshot(secs, &name);
        if let Err(e) = &result {
            log::error!("Snapshot failed: {}", e);
        }
        self.callbacks.post(move || on_file_ready(result));
    }

    pub fn set_memory_size(&mut self, bytes: u64) {
        let bytes = self.format.align_down(bytes.min(MAX_MEMORY_SIZE_BYTES));

        if self.state.is_capturing() {
            self.flush_or_abort();
            self.scheduler.cancel();
            let resized = self.memory.set_capacity(capacity_bytes(bytes));
            self.scheduler.schedule_now();
            if let Err(e) = resized {
                log::error!("Keeping {} bytes of audio memory: {}", self.memory_size, e);
                self.notify_error(e);
                return;
            }
        }

        self.memory_size = bytes;
        self.settings.lock().memory_size = bytes;
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        match self.state {
            ServiceState::Listening => {}
            ServiceState::Recording => {
                log::warn!("Sample rate change rejected while recording");
                self.notify_error(CaptureError::InvalidState(
                    "cannot change sample rate while recording".into(),
                ));
                return;
            }
            ServiceState::Ready => {
                log::warn!("Sample rate change rejected while not listening");
                self.notify_error(CaptureError::InvalidState(
                    "sample rate can only change while listening".into(),
                ));
                return;
            }
        }
        if sample_rate == self.format.sample_rate {
            return;
        }

        log::debug!("Executing: sample rate {} -> {}", self.format.sample_rate, sample_rate);
        self.stop_listening();
        self.format.sample_rate = sample_rate;
        self.memory_size = self.format.align_down(self.memory_size);
        {
            let mut settings = self.settings.lock();
            settings.sample_rate = sample_rate;
            settings.memory_size = self.memory_size;
        }
        self.start_listening();
    }

    pub fn query_state<F>(&mut self, callback: F)
    where
        F: FnOnce(StateReport) + Send + 'static,
    {
        self.flush_or_abort();
        let report = self.state_report();
        self.callbacks.post(move || callback(report));
    }

    // --- Internals ---

    /// READY → LISTENING. Returns whether capture is running afterwards.
    fn start_listening(&mut self) -> bool {
        if self.state.is_capturing() {
            return true;
        }

        log::debug!("Executing: start listening at {} Hz", self.format.sample_rate);
        let source = match self.sources.open(&self.format) {
            Ok(source) => source,
            Err(e) => {
                log::error!("Audio: initialization error, staying ready: {}", e);
                self.notify_error(CaptureError::DeviceNotAvailable);
                return false;
            }
        };

        if let Err(e) = self.memory.set_capacity(capacity_bytes(self.memory_size)) {
            log::error!("Audio: memory allocation failed, staying ready: {}", e);
            self.notify_error(e);
            return false;
        }
        self.source = Some(source);
        self.set_state(ServiceState::Listening);
        self.scheduler.schedule_now();
        true
    }

    /// LISTENING → READY. The recording session must already be finished.
    fn stop_listening(&mut self) {
        if self.state.is_ready() {
            return;
        }
        debug_assert!(self.session.is_none());

        log::debug!("Executing: stop listening");
        self.scheduler.cancel();
        self.source = None;
        self.memory = RingBuffer::new();
        self.set_state(ServiceState::Ready);
    }

    /// Return to READY if capture only ran for the sake of a recording.
    fn settle(&mut self) {
        if self.state == ServiceState::Listening && !self.listening_enabled {
            self.stop_listening();
        }
    }

    /// Cancel the pending pull and run one pass inline. Only valid on the
    /// worker thread.
    ///
    /// Returns the error of a failed live write, if any; the session is left
    /// for the caller to end.
    fn flush(&mut self) -> Option<CaptureError> {
        assert_eq!(
            self.worker_thread,
            Some(thread::current().id()),
            "flush must run on the audio worker"
        );
        self.pull()
    }

    fn flush_or_abort(&mut self) {
        if let Some(e) = self.flush() {
            self.abort_session(e);
        }
    }

    fn pull_scheduled(&mut self) {
        if let Some(e) = self.pull() {
            self.abort_session(e);
        }
    }

    /// One fill pass, mirroring new audio into the live session.
    fn pull(&mut self) -> Option<CaptureError> {
        let Some(source) = self.source.as_mut() else {
            self.scheduler.cancel();
            return None;
        };

        let session = &mut self.session;
        let mut write_error = None;
        self.scheduler
            .run_pass(&mut self.memory, &mut **source, |chunk| {
                if write_error.is_some() {
                    return;
                }
                if let Some(session) = session.as_mut() {
                    if let Err(e) = session.writer.write(chunk) {
                        write_error = Some(e);
                    }
                }
            });
        write_error
    }

    /// End the session after a persistence fault. Reported once, through the
    /// delegate.
    fn abort_session(&mut self, error: CaptureError) {
        let Some(session) = self.session.take() else {
            return;
        };
        log::error!(
            "Error during recording into {}: {}",
            session.file_path.display(),
            error
        );
        discard(session.writer);
        self.notify_error(error);
        self.set_state(ServiceState::Listening);
        self.settle();
    }

    /// RECORDING → LISTENING, delivering the file to `on_file_ready` or,
    /// without one, to the delegate. Goes on to READY if listening is
    /// disabled.
    fn finish_session(&mut self, on_file_ready: Option<FileReadyCallback>) {
        let write_error = self.flush();
        let Some(session) = self.session.take() else {
            return;
        };

        let result = match write_error {
            Some(e) => {
                log::error!("Error during recording into {}: {}", session.file_path.display(), e);
                discard(session.writer);
                Err(e)
            }
            None => self.close_session(session),
        };

        self.set_state(ServiceState::Listening);
        match on_file_ready {
            Some(callback) => self.callbacks.post(move || callback(result)),
            None => match result {
                Ok(result) => self.notify(move |d| d.on_recording_finished(&result)),
                Err(e) => self.notify_error(e),
            },
        }
        self.settle();
    }

    fn close_session(&self, session: RecordingSession) -> Result<RecordingResult, CaptureError> {
        let closed = session.writer.close().map_err(|e| {
            log::error!("Closing error for {}: {}", session.file_path.display(), e);
            e
        })?;
        Ok(RecordingResult {
            file_path: session.file_path,
            duration_secs: self.format.bytes_to_seconds(closed.audio_bytes),
            audio_bytes: closed.audio_bytes,
            checksum: closed.checksum,
            started_at: session.started_at,
        })
    }

    fn write_snapshot(&mut self, secs: f64, name: &str) -> Result<RecordingResult, CaptureError> {
        let extraction = Extraction::plan(self.memory.count_filled(), secs, &self.format);
        let started_at = extraction.started_at(&self.format, Local::now());
        let file_name = naming::file_name_for(name, &self.file_prefix, &started_at);
        let file_path = naming::unique_path(&self.output_directory, &file_name);

        let mut writer = self.writers.create(&file_path, &self.format)?;
        if let Err(e) = extraction.write_to(&self.memory, writer.as_mut()) {
            discard(writer);
            return Err(e);
        }
        let closed = writer.close()?;

        Ok(RecordingResult {
            file_path,
            duration_secs: self.format.bytes_to_seconds(closed.audio_bytes),
            audio_bytes: closed.audio_bytes,
            checksum: closed.checksum,
            started_at,
        })
    }

    /// Derived from a single stats snapshot taken after a flush.
    fn state_report(&self) -> StateReport {
        let stats = self.memory.stats(self.format.bytes_per_second());
        let total = stats.total as u64;
        let estimation = stats.estimation as u64;

        let memorized = if stats.overwriting {
            total
        } else {
            (stats.filled as u64 + estimation).min(total)
        };

        // The estimate must never push the recorded time past what the
        // session can possibly hold: its prepend plus the time since it opened.
        let recorded_secs = self
            .session
            .as_ref()
            .map(|session| {
                let recorded = self
                    .format
                    .bytes_to_seconds(session.writer.audio_bytes() + estimation);
                let limit = self.format.bytes_to_seconds(session.prepended_bytes)
                    + session.opened_at.elapsed().as_secs_f64();
                recorded.min(limit)
            })
            .unwrap_or(0.0);

        StateReport {
            listening: self.listening_enabled,
            recording: self.state.is_recording(),
            memorized_secs: self.format.bytes_to_seconds(memorized),
            capacity_secs: self.format.bytes_to_seconds(total),
            recorded_secs,
        }
    }

    fn set_state(&mut self, state: ServiceState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.settings.lock().state = state;
        self.notify(move |d| d.on_state_changed(state));
    }

    fn notify<F>(&self, event: F)
    where
        F: FnOnce(&dyn MemoryDelegate) + Send + 'static,
    {
        if let Some(delegate) = self.delegate.clone() {
            self.callbacks.post(move || event(delegate.as_ref()));
        }
    }

    fn notify_error(&self, error: CaptureError) {
        self.notify(move |d| d.on_error(&error));
    }

    fn shutdown(&mut self) {
        if self.state.is_recording() {
            self.finish_session(None);
        }
        self.stop_listening();
    }
}

fn capacity_bytes(bytes: u64) -> usize {
    usize::try_from(bytes).unwrap_or(usize::MAX)
}

/// Close a writer whose session failed, keeping whatever made it to disk.
fn discard(writer: Box<dyn PersistenceWriter>) {
    if let Err(e) = writer.close() {
        log::warn!("Failed to close abandoned writer: {}", e);
    }
}
