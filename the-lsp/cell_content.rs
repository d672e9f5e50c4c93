//! Cell-content sync: cell documents travel as ordinary text documents,
//! scoped to the registration's selectors.

use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use crate::{
  document::{
    NotebookCell,
    NotebookDocument,
    TextDocument,
    TextDocumentChangeEvent,
  },
  filter::{
    DocumentSelector,
    NotebookSelectors,
  },
  protocol::NotebookDocumentSyncRegistrationOptions,
  text_sync::{
    TextDocumentSyncKind,
    TextSyncRegistration,
    TextSyncRegistry,
  },
};

pub struct CellContentSync {
  cell_selector: DocumentSelector,
  text_sync:     TextSyncRegistry,
  /// Text sync registration id; taken on dispose.
  registration:  Mutex<Option<String>>,
}

impl CellContentSync {
  pub fn new(
    registration: &NotebookDocumentSyncRegistrationOptions,
    text_sync: TextSyncRegistry,
  ) -> Self {
    let selectors = NotebookSelectors::compile(registration);
    let cell_selector = DocumentSelector::for_notebook_cells(&selectors, true);

    let registration = (!cell_selector.is_empty()).then(|| {
      let id = Uuid::new_v4().to_string();
      trace!(id = %id, "registering cell content sync");
      text_sync.register(
        id.clone(),
        TextSyncRegistration {
          document_selector: cell_selector.clone(),
          sync_kind:         TextDocumentSyncKind::Incremental,
        },
      );
      id
    });

    Self {
      cell_selector,
      text_sync,
      registration: Mutex::new(registration),
    }
  }

  pub fn handles(&self, notebook: &NotebookDocument, cell: &NotebookCell) -> bool {
    self
      .cell_selector
      .match_for_document_sync(&cell.document, Some(notebook))
  }

  /// The text sync registration backing this strategy, while active.
  pub fn text_registration(&self) -> Option<String> {
    self.registration.lock().clone()
  }

  pub fn send_did_open_text_document(&self, document: &TextDocument) -> bool {
    self.text_sync.did_open(document)
  }

  pub fn send_did_change_text_document(&self, event: &TextDocumentChangeEvent) -> bool {
    self.text_sync.did_change(event)
  }

  pub fn send_did_close_text_document(&self, document: &TextDocument) -> bool {
    self.text_sync.did_close(document)
  }

  pub fn dispose(&self) {
    let registration = self.registration.lock().take();
    if let Some(id) = registration {
      self.text_sync.unregister(&id);
    }
  }
}

impl Drop for CellContentSync {
  fn drop(&mut self) {
    self.dispose();
  }
}
