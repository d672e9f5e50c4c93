//! Registration bookkeeping and editor event routing for notebook sync.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::{
  debug,
  trace,
};
use uuid::Uuid;

use crate::{
  capabilities,
  cell_content::CellContentSync,
  channel::MessageChannel,
  config::{
    NotebookDocumentOptions,
    NotebookSyncConfig,
  },
  document::{
    NotebookCell,
    NotebookDocument,
    TextDocument,
    TextDocumentChangeEvent,
    Workspace,
  },
  event::{
    EditorEvent,
    EventHub,
    Subscription,
  },
  notebook_sync::NotebookSync,
  protocol::{
    NotebookDocumentSyncRegistrationOptions,
    NotebookSyncMode,
  },
  text_sync::TextSyncRegistry,
};

#[derive(Debug, Error)]
pub enum RegistrationError {
  #[error("invalid notebook document sync options: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("notebook document sync registration {0} already exists")]
  DuplicateId(String),
}

/// What every sync strategy offers the dispatcher.
pub trait SyncProvider {
  fn mode(&self) -> NotebookSyncMode;

  /// Whether the strategy is responsible for `cell`.
  fn handles(&self, notebook: &NotebookDocument, cell: &NotebookCell) -> bool;

  /// Releases subscriptions and sub-registrations. Idempotent.
  fn dispose(&self);
}

impl SyncProvider for NotebookSync {
  fn mode(&self) -> NotebookSyncMode {
    NotebookSyncMode::Notebook
  }

  fn handles(&self, notebook: &NotebookDocument, cell: &NotebookCell) -> bool {
    NotebookSync::handles(self, notebook, cell)
  }

  fn dispose(&self) {
    NotebookSync::dispose(self);
  }
}

impl SyncProvider for CellContentSync {
  fn mode(&self) -> NotebookSyncMode {
    NotebookSyncMode::CellContent
  }

  fn handles(&self, notebook: &NotebookDocument, cell: &NotebookCell) -> bool {
    CellContentSync::handles(self, notebook, cell)
  }

  fn dispose(&self) {
    CellContentSync::dispose(self);
  }
}

/// The strategy a registration was created with. Fixed for its lifetime.
pub enum SyncStrategy {
  Notebook(NotebookSync),
  CellContent(CellContentSync),
}

impl SyncStrategy {
  fn provider(&self) -> &dyn SyncProvider {
    match self {
      Self::Notebook(sync) => sync,
      Self::CellContent(sync) => sync,
    }
  }

  pub fn as_notebook(&self) -> Option<&NotebookSync> {
    match self {
      Self::Notebook(sync) => Some(sync),
      Self::CellContent(_) => None,
    }
  }

  pub fn as_cell_content(&self) -> Option<&CellContentSync> {
    match self {
      Self::Notebook(_) => None,
      Self::CellContent(sync) => Some(sync),
    }
  }
}

impl SyncProvider for SyncStrategy {
  fn mode(&self) -> NotebookSyncMode {
    self.provider().mode()
  }

  fn handles(&self, notebook: &NotebookDocument, cell: &NotebookCell) -> bool {
    self.provider().handles(notebook, cell)
  }

  fn dispose(&self) {
    self.provider().dispose();
  }
}

type Registrations = Mutex<IndexMap<String, Arc<SyncStrategy>>>;

struct Router {
  registrations: Arc<Registrations>,
  workspace:     Arc<dyn Workspace>,
  cell_scheme:   String,
}

impl Router {
  fn handle_event(&self, event: &EditorEvent) {
    match event {
      EditorEvent::TextDocumentOpened(document) => self.cell_document_opened(document),
      EditorEvent::TextDocumentChanged(change) => self.cell_text_changed(change),
      _ => {},
    }
  }

  fn find_cell(&self, document: &TextDocument) -> Option<(NotebookDocument, NotebookCell)> {
    if document.uri.scheme() != self.cell_scheme {
      return None;
    }
    self.workspace.find_cell(&document.uri)
  }

  fn strategies(&self) -> Vec<Arc<SyncStrategy>> {
    self.registrations.lock().values().cloned().collect()
  }

  /// Cell documents reopen when their language changes, which can move a
  /// cell in or out of a selector. The owner and every notebook strategy
  /// that synced the cell get a look.
  fn cell_document_opened(&self, document: &TextDocument) {
    let Some((notebook, cell)) = self.find_cell(document) else {
      return;
    };
    let strategies = self.strategies();
    let owner = resolve(&strategies, &notebook, &cell);

    for strategy in &strategies {
      let Some(sync) = strategy.as_notebook() else {
        continue;
      };
      let is_owner = owner.is_some_and(|owner| Arc::ptr_eq(owner, strategy));
      if is_owner || sync.is_cell_synced(&notebook.uri, cell.uri()) {
        sync.cell_document_opened(&notebook, &cell);
      }
    }
  }

  fn cell_text_changed(&self, change: &TextDocumentChangeEvent) {
    if change.edits.is_empty() {
      return;
    }
    let Some((notebook, cell)) = self.find_cell(&change.document) else {
      return;
    };
    let strategies = self.strategies();
    match resolve(&strategies, &notebook, &cell).map(|owner| owner.as_notebook()) {
      Some(Some(sync)) => sync.cell_text_changed(&notebook, change),
      // Cell content registrations see text events through text sync.
      Some(None) => {},
      None => trace!(cell = %cell.uri(), "no registration handles cell"),
    }
  }
}

fn resolve<'a>(
  strategies: &'a [Arc<SyncStrategy>],
  notebook: &NotebookDocument,
  cell: &NotebookCell,
) -> Option<&'a Arc<SyncStrategy>> {
  strategies
    .iter()
    .find(|strategy| strategy.handles(notebook, cell))
}

/// Entry point for notebook document sync: owns one strategy per server
/// registration and routes cell document events to them.
pub struct NotebookDocumentSyncFeature {
  registrations: Arc<Registrations>,
  events:        EventHub,
  channel:       Arc<dyn MessageChannel>,
  workspace:     Arc<dyn Workspace>,
  text_sync:     TextSyncRegistry,
  config:        NotebookSyncConfig,
  options:       NotebookDocumentOptions,
  subscriptions: Vec<Subscription>,
}

impl NotebookDocumentSyncFeature {
  pub fn new(
    events: &EventHub,
    channel: Arc<dyn MessageChannel>,
    workspace: Arc<dyn Workspace>,
    text_sync: TextSyncRegistry,
    config: NotebookSyncConfig,
    options: NotebookDocumentOptions,
  ) -> Self {
    let registrations = Arc::new(Mutex::new(IndexMap::new()));
    let router = Router {
      registrations: registrations.clone(),
      workspace:     workspace.clone(),
      cell_scheme:   config.cell_scheme.clone(),
    };
    let subscription = events.subscribe(move |event| router.handle_event(event));

    Self {
      registrations,
      events: events.clone(),
      channel,
      workspace,
      text_sync,
      config,
      options,
      subscriptions: vec![subscription],
    }
  }

  pub fn config(&self) -> &NotebookSyncConfig {
    &self.config
  }

  pub fn fill_client_capabilities(&self, capabilities: &mut Value) {
    capabilities::fill_client_capabilities(capabilities, &self.config);
  }

  /// Registers the server's static notebook sync options, if any. Returns
  /// the registration id used.
  pub fn initialize(&self, server_capabilities: &Value) -> Result<Option<String>, RegistrationError> {
    let Some(options) = capabilities::notebook_document_sync(server_capabilities) else {
      return Ok(None);
    };
    let options: NotebookDocumentSyncRegistrationOptions = serde_json::from_value(options.clone())?;
    let id = options
      .id
      .clone()
      .unwrap_or_else(|| Uuid::new_v4().to_string());
    self.register(id.clone(), options)?;
    Ok(Some(id))
  }

  /// Registers from a raw `registerOptions` payload.
  pub fn register_value(&self, id: impl Into<String>, options: Value) -> Result<(), RegistrationError> {
    self.register(id, serde_json::from_value(options)?)
  }

  pub fn register(
    &self,
    id: impl Into<String>,
    options: NotebookDocumentSyncRegistrationOptions,
  ) -> Result<(), RegistrationError> {
    let id = id.into();
    if self.registrations.lock().contains_key(&id) {
      return Err(RegistrationError::DuplicateId(id));
    }

    debug!(id = %id, mode = ?options.mode, "registering notebook document sync");
    let strategy = Arc::new(match options.mode {
      NotebookSyncMode::Notebook => {
        SyncStrategy::Notebook(NotebookSync::new(
          &options,
          &self.events,
          self.channel.clone(),
          &*self.workspace,
          self.options.clone(),
        ))
      },
      NotebookSyncMode::CellContent => {
        SyncStrategy::CellContent(CellContentSync::new(&options, self.text_sync.clone()))
      },
    });

    let mut registrations = self.registrations.lock();
    if registrations.contains_key(&id) {
      drop(registrations);
      strategy.dispose();
      return Err(RegistrationError::DuplicateId(id));
    }
    registrations.insert(id, strategy);
    Ok(())
  }

  /// Removes and disposes a registration. Unknown ids are ignored.
  pub fn unregister(&self, id: &str) {
    let removed = self.registrations.lock().shift_remove(id);
    match removed {
      Some(strategy) => {
        debug!(id, "unregistering notebook document sync");
        strategy.dispose();
      },
      None => trace!(id, "unknown notebook document sync registration"),
    }
  }

  pub fn registration(&self, id: &str) -> Option<Arc<SyncStrategy>> {
    self.registrations.lock().get(id).cloned()
  }

  pub fn registration_ids(&self) -> Vec<String> {
    self.registrations.lock().keys().cloned().collect()
  }

  /// The first registration, in registration order, responsible for `cell`.
  pub fn resolve_owner(
    &self,
    notebook: &NotebookDocument,
    cell: &NotebookCell,
  ) -> Option<Arc<SyncStrategy>> {
    let strategies: Vec<Arc<SyncStrategy>> = self.registrations.lock().values().cloned().collect();
    resolve(&strategies, notebook, cell).cloned()
  }

  /// Disposes every registration and stops routing events.
  pub fn dispose(&mut self) {
    let strategies: Vec<Arc<SyncStrategy>> = self
      .registrations
      .lock()
      .drain(..)
      .map(|(_, strategy)| strategy)
      .collect();
    for strategy in strategies {
      strategy.dispose();
    }
    self.subscriptions.clear();
  }
}

impl Drop for NotebookDocumentSyncFeature {
  fn drop(&mut self) {
    self.dispose();
  }
}
