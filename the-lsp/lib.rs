//! Client-side notebook document synchronization for language servers.

mod capabilities;
mod cell_content;
mod channel;
mod command;
pub mod config;
pub mod convert;
pub mod diff;
mod dispatcher;
pub mod document;
mod event;
pub mod filter;
pub mod jsonrpc;
pub mod metadata;
mod middleware;
mod notebook_sync;
pub mod protocol;
mod runtime;
mod sync_info;
pub mod text_sync;

pub use capabilities::{
  fill_client_capabilities,
  notebook_document_sync,
};
pub use cell_content::CellContentSync;
pub use channel::{
  ChannelError,
  MessageChannel,
  RecordingChannel,
};
pub use command::RuntimeCommand;
pub use config::{
  ConfigError,
  NotebookDocumentOptions,
  NotebookSyncConfig,
};
pub use dispatcher::{
  NotebookDocumentSyncFeature,
  RegistrationError,
  SyncProvider,
  SyncStrategy,
};
pub use event::{
  EditorEvent,
  EventHub,
  Subscription,
};
pub use middleware::{
  CellStructureChange,
  CellsChangeEvent,
  ChangeNext,
  CloseNext,
  NotebookChangeEvent,
  NotebookMiddleware,
  OpenNext,
  SaveNext,
};
pub use notebook_sync::{
  NotebookSync,
  SyncError,
};
pub use runtime::{
  Deliver,
  NotificationEvent,
  NotificationRuntime,
  NotificationRuntimeError,
};
pub use sync_info::{
  SyncInfo,
  SyncInfoRegistry,
};
pub use text_sync::{
  TextDocumentSyncFeature,
  TextDocumentSyncKind,
  TextSyncRegistration,
  TextSyncRegistry,
};
