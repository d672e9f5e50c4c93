use crate::jsonrpc::Notification;

#[derive(Debug, Clone)]
pub enum RuntimeCommand {
  Shutdown,
  Deliver(Notification),
}
