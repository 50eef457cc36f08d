//! Single-resolution handle for asynchronous calls.

use crate::connection::{BusFault, Reply};
use crate::error::ClientError;
use std::time::Duration;
use tokio::sync::oneshot;

/// How a call ultimately failed, cached so the status can be re-read.
#[derive(Debug, Clone)]
enum Failure {
    Fault(BusFault),
    Closed,
}

impl Failure {
    fn to_error(&self) -> ClientError {
        match self {
            Failure::Fault(fault) => fault.clone().into(),
            Failure::Closed => ClientError::ConnectionClosed,
        }
    }
}

/// The not-yet-completed outcome of an asynchronous call.
///
/// Starts pending and transitions exactly once to a resolved payload or a
/// failure; the transition is driven by the connection's I/O task through a
/// `oneshot` channel, so duplicate resolution is unrepresentable. Once
/// resolved, the outcome is cached: `wait` variants keep returning the same
/// status and [`CallResult::get`] reads the response payload.
pub struct CallResult {
    rx: Option<oneshot::Receiver<Reply>>,
    outcome: Option<Result<wirebus_protocol::Payload, Failure>>,
}

impl CallResult {
    pub(crate) fn new(rx: oneshot::Receiver<Reply>) -> Self {
        Self {
            rx: Some(rx),
            outcome: None,
        }
    }

    /// Suspends the calling task until the call resolves. Never blocks the
    /// I/O task. Returns `Ok(())` once the response payload is readable via
    /// [`CallResult::get`].
    pub async fn wait(&mut self) -> Result<(), ClientError> {
        if self.outcome.is_none() {
            if let Some(rx) = self.rx.as_mut() {
                let received = rx.await.ok();
                self.finish(received);
            }
        }
        self.status()
    }

    /// Like [`CallResult::wait`], bounded by `timeout`. On timeout the call
    /// stays pending and may still resolve on a later wait.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<(), ClientError> {
        if self.outcome.is_none() {
            if let Some(rx) = self.rx.as_mut() {
                match tokio::time::timeout(timeout, &mut *rx).await {
                    Err(_) => return Err(ClientError::Timeout),
                    Ok(received) => self.finish(received.ok()),
                }
            }
        }
        self.status()
    }

    /// Polls without suspending. `None` means still pending.
    pub fn try_wait(&mut self) -> Option<Result<(), ClientError>> {
        if self.outcome.is_none() {
            if let Some(rx) = self.rx.as_mut() {
                match rx.try_recv() {
                    Err(oneshot::error::TryRecvError::Empty) => return None,
                    Ok(reply) => self.finish(Some(reply)),
                    Err(oneshot::error::TryRecvError::Closed) => self.finish(None),
                }
            }
        }
        Some(self.status())
    }

    /// Returns whether the call has resolved (successfully or not).
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// The response payload, once resolved successfully.
    pub fn payload(&self) -> Option<&wirebus_protocol::Payload> {
        match &self.outcome {
            Some(Ok(payload)) => Some(payload),
            _ => None,
        }
    }

    /// Reads one key from the response payload. `None` while pending, after
    /// a failure, or when the key is absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.payload().and_then(|p| p.get(key))
    }

    /// Records the terminal outcome. `None` means the slot's sender was
    /// dropped, i.e. the connection closed before a reply arrived.
    fn finish(&mut self, received: Option<Reply>) {
        self.outcome = Some(match received {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(fault)) => Err(Failure::Fault(fault)),
            None => Err(Failure::Closed),
        });
        self.rx = None;
    }

    fn status(&self) -> Result<(), ClientError> {
        match &self.outcome {
            Some(Ok(_)) => Ok(()),
            Some(Err(failure)) => Err(failure.to_error()),
            // Only reachable before any wait has completed.
            None => Err(ClientError::ConnectionClosed),
        }
    }
}
