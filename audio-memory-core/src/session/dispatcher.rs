use std::thread;

use crossbeam_channel::{unbounded, Sender};

use crate::models::error::CaptureError;

type Callback = Box<dyn FnOnce() + Send>;

/// Runs caller callbacks on their own thread, in the order they were posted,
/// so caller code never runs on the audio worker.
pub(crate) struct Dispatcher {
    sender: Option<Sender<Callback>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn() -> Result<Self, CaptureError> {
        let (sender, receiver) = unbounded::<Callback>();

        let handle = thread::Builder::new()
            .name("audio-memory-callbacks".into())
            .spawn(move || {
                for callback in receiver {
                    callback();
                }
            })
            .map_err(|e| {
                CaptureError::ConfigurationFailed(format!("failed to spawn callback thread: {}", e))
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// A handle for posting callbacks from other threads.
    pub fn poster(&self) -> CallbackPoster {
        CallbackPoster {
            sender: self.sender.clone(),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Pending callbacks still run; the thread exits once every poster is gone.
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[derive(Clone)]
pub(crate) struct CallbackPoster {
    sender: Option<Sender<Callback>>,
}

impl CallbackPoster {
    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(Box::new(callback)).is_err() {
            log::warn!("Callback thread is gone, dropping callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn callbacks_run_in_order_off_the_calling_thread() {
        let dispatcher = Dispatcher::spawn().unwrap();
        let poster = dispatcher.poster();
        let (tx, rx) = crossbeam_channel::unbounded();
        let caller = thread::current().id();

        for i in 0..5 {
            let tx = tx.clone();
            poster.post(move || {
                tx.send((i, thread::current().id())).unwrap();
            });
        }

        for expected in 0..5 {
            let (i, ran_on) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(i, expected);
            assert_ne!(ran_on, caller);
        }
    }
}
