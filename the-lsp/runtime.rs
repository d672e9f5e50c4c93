use std::{
  sync::mpsc::{
    Receiver,
    Sender,
    TryRecvError,
    channel,
  },
  thread::{
    self,
    JoinHandle,
  },
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{
  debug,
  error,
};

use crate::{
  channel::{
    ChannelError,
    MessageChannel,
  },
  command::RuntimeCommand,
  jsonrpc::Notification,
};

/// Hands a notification to the transport, on the runtime's worker thread.
pub type Deliver = Box<dyn FnMut(&Notification) -> Result<(), ChannelError> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
  Started,
  Delivered { method: String },
  Failed { method: String, error: String },
  Stopped,
}

/// A worker thread that delivers notifications in enqueue order, so editor
/// event handlers never wait on the transport.
#[derive(Default)]
pub struct NotificationRuntime {
  command_tx: Option<Sender<RuntimeCommand>>,
  event_rx:   Mutex<Option<Receiver<NotificationEvent>>>,
  worker:     Option<JoinHandle<()>>,
}

impl NotificationRuntime {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_running(&self) -> bool {
    self.worker.is_some()
  }

  pub fn start(
    &mut self,
    deliver: impl FnMut(&Notification) -> Result<(), ChannelError> + Send + 'static,
  ) -> Result<(), NotificationRuntimeError> {
    if self.is_running() {
      return Err(NotificationRuntimeError::AlreadyRunning);
    }

    let (command_tx, command_rx) = channel();
    let (event_tx, event_rx) = channel();
    let deliver: Deliver = Box::new(deliver);

    let worker = thread::Builder::new()
      .name("the-lsp-notifications".into())
      .spawn(move || run_worker(deliver, command_rx, event_tx))
      .map_err(|_| NotificationRuntimeError::FailedToSpawnWorker)?;

    self.command_tx = Some(command_tx);
    *self.event_rx.lock() = Some(event_rx);
    self.worker = Some(worker);

    Ok(())
  }

  pub fn send(&self, command: RuntimeCommand) -> Result<(), NotificationRuntimeError> {
    let Some(tx) = &self.command_tx else {
      return Err(NotificationRuntimeError::NotRunning);
    };

    tx.send(command)
      .map_err(|_| NotificationRuntimeError::CommandChannelClosed)
  }

  pub fn try_recv_event(&self) -> Option<NotificationEvent> {
    let event_rx = self.event_rx.lock();
    match event_rx.as_ref()?.try_recv() {
      Ok(event) => Some(event),
      Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
    }
  }

  /// Delivers what is already queued, then stops the worker. Events stay
  /// readable until the next start.
  pub fn shutdown(&mut self) -> Result<(), NotificationRuntimeError> {
    if !self.is_running() {
      return Ok(());
    }

    if let Some(tx) = self.command_tx.take() {
      let _ = tx.send(RuntimeCommand::Shutdown);
    }

    if let Some(worker) = self.worker.take() {
      worker
        .join()
        .map_err(|_| NotificationRuntimeError::WorkerPanicked)?;
    }

    Ok(())
  }
}

impl MessageChannel for NotificationRuntime {
  fn send_notification(&self, notification: Notification) -> Result<(), ChannelError> {
    self
      .send(RuntimeCommand::Deliver(notification))
      .map_err(|_| ChannelError::Closed)
  }
}

impl Drop for NotificationRuntime {
  fn drop(&mut self) {
    let _ = self.shutdown();
  }
}

#[derive(Debug, Error)]
pub enum NotificationRuntimeError {
  #[error("notification runtime is already running")]
  AlreadyRunning,
  #[error("notification runtime is not running")]
  NotRunning,
  #[error("failed to spawn notification runtime worker thread")]
  FailedToSpawnWorker,
  #[error("notification runtime command channel is closed")]
  CommandChannelClosed,
  #[error("notification runtime worker thread panicked")]
  WorkerPanicked,
}

fn run_worker(
  mut deliver: Deliver,
  command_rx: Receiver<RuntimeCommand>,
  event_tx: Sender<NotificationEvent>,
) {
  debug!("notification runtime worker started");
  let _ = event_tx.send(NotificationEvent::Started);

  while let Ok(command) = command_rx.recv() {
    match command {
      RuntimeCommand::Shutdown => break,
      RuntimeCommand::Deliver(notification) => {
        let event = match deliver(&notification) {
          Ok(()) => {
            NotificationEvent::Delivered {
              method: notification.method,
            }
          },
          Err(err) => {
            error!(method = %notification.method, %err, "notification delivery failed");
            NotificationEvent::Failed {
              method: notification.method,
              error:  err.to_string(),
            }
          },
        };
        let _ = event_tx.send(event);
      },
    }
  }

  debug!("notification runtime worker stopped");
  let _ = event_tx.send(NotificationEvent::Stopped);
}
