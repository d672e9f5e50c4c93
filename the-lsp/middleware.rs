//! Interception points around outgoing notebook notifications.

use crate::{
  diff::CellSplice,
  document::{
    NotebookCell,
    NotebookDocument,
    TextDocumentChangeEvent,
  },
  metadata::Metadata,
  notebook_sync::SyncError,
};

/// A notebook change in editor terms. Converted to wire form only when sent.
#[derive(Debug, Clone, Default)]
pub struct NotebookChangeEvent {
  pub metadata: Option<Metadata>,
  pub cells:    Option<CellsChangeEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct CellsChangeEvent {
  pub structure:    Option<CellStructureChange>,
  /// Cells whose kind, metadata or execution summary changed.
  pub data:         Option<Vec<NotebookCell>>,
  pub text_content: Option<Vec<TextDocumentChangeEvent>>,
}

#[derive(Debug, Clone)]
pub struct CellStructureChange {
  pub array:     CellSplice,
  pub did_open:  Option<Vec<NotebookCell>>,
  pub did_close: Option<Vec<NotebookCell>>,
}

impl NotebookChangeEvent {
  pub fn metadata(metadata: Metadata) -> Self {
    Self {
      metadata: Some(metadata),
      cells:    None,
    }
  }

  pub fn cells(cells: CellsChangeEvent) -> Self {
    Self {
      metadata: None,
      cells:    Some(cells),
    }
  }
}

pub type OpenNext<'a> = &'a dyn Fn(&NotebookDocument, &[NotebookCell]) -> Result<(), SyncError>;
pub type ChangeNext<'a> =
  &'a dyn Fn(&NotebookDocument, &NotebookChangeEvent) -> Result<(), SyncError>;
pub type SaveNext<'a> = &'a dyn Fn(&NotebookDocument) -> Result<(), SyncError>;
pub type CloseNext<'a> = &'a dyn Fn(&NotebookDocument, &[NotebookCell]) -> Result<(), SyncError>;

/// Hooks run in place of each notebook notification. `next` performs the
/// send; a hook may rewrite its arguments or not call it at all.
pub trait NotebookMiddleware: Send + Sync {
  fn did_open(
    &self,
    notebook: &NotebookDocument,
    cells: &[NotebookCell],
    next: OpenNext<'_>,
  ) -> Result<(), SyncError> {
    next(notebook, cells)
  }

  fn did_change(
    &self,
    notebook: &NotebookDocument,
    event: &NotebookChangeEvent,
    next: ChangeNext<'_>,
  ) -> Result<(), SyncError> {
    next(notebook, event)
  }

  fn did_save(&self, notebook: &NotebookDocument, next: SaveNext<'_>) -> Result<(), SyncError> {
    next(notebook)
  }

  fn did_close(
    &self,
    notebook: &NotebookDocument,
    cells: &[NotebookCell],
    next: CloseNext<'_>,
  ) -> Result<(), SyncError> {
    next(notebook, cells)
  }
}
