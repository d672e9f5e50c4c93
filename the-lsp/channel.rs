use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{
  error,
  trace,
};

use crate::jsonrpc::Notification;

#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("message channel is closed")]
  Closed,
  #[error("notification rejected: {0}")]
  Rejected(String),
  #[error("failed to serialize notification params: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Outgoing side of a language server connection.
pub trait MessageChannel: Send + Sync {
  /// Hands `notification` to the transport. Must not block on the server.
  fn send_notification(&self, notification: Notification) -> Result<(), ChannelError>;

  /// Error sink for failed sends.
  fn report_error(&self, method: &str, err: &ChannelError) {
    error!(method, %err, "sending notification failed");
  }
}

/// Serializes and sends a notification. Failures go to the channel's error
/// sink and are not returned.
pub(crate) fn notify<P: Serialize>(channel: &dyn MessageChannel, method: &str, params: &P) {
  let result = Notification::with_params(method, params)
    .map_err(ChannelError::from)
    .and_then(|notification| channel.send_notification(notification));
  match result {
    Ok(()) => trace!(method, "sent notification"),
    Err(err) => channel.report_error(method, &err),
  }
}

/// Keeps every notification in memory, in send order.
#[derive(Debug, Default, Clone)]
pub struct RecordingChannel {
  sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingChannel {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drains what has been sent so far.
  pub fn take(&self) -> Vec<Notification> {
    std::mem::take(&mut *self.sent.lock())
  }

  pub fn methods(&self) -> Vec<String> {
    self
      .sent
      .lock()
      .iter()
      .map(|notification| notification.method.clone())
      .collect()
  }
}

impl MessageChannel for RecordingChannel {
  fn send_notification(&self, notification: Notification) -> Result<(), ChannelError> {
    self.sent.lock().push(notification);
    Ok(())
  }
}
