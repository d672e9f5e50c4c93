//! The editor's in-memory notebook and text document model, as observed by
//! the sync engine. The editor owns these; the engine only keeps snapshots.

use std::ops::Range;

use parking_lot::RwLock;
use ropey::Rope;
use url::Url;

use crate::metadata::Metadata;

#[derive(Debug, Clone)]
pub struct TextDocument {
  pub uri:         Url,
  pub language_id: String,
  pub version:     i32,
  pub text:        Rope,
}

impl TextDocument {
  pub fn new(uri: Url, language_id: impl Into<String>, version: i32, text: &str) -> Self {
    Self {
      uri,
      language_id: language_id.into(),
      version,
      text: Rope::from_str(text),
    }
  }
}

/// A replacement of the char range `range` with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
  pub range: Range<usize>,
  pub text:  String,
}

/// A text document edit. `edits` apply one after another, starting from
/// `previous`; `document` is the state after all of them.
#[derive(Debug, Clone)]
pub struct TextDocumentChangeEvent {
  pub document: TextDocument,
  pub previous: Rope,
  pub edits:    Vec<TextEdit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
  Markup,
  Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
  pub start_time: u64,
  pub end_time:   u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionSummary {
  pub order:   Option<u32>,
  pub success: Option<bool>,
  pub timing:  Option<Timing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellExecutionState {
  Pending,
  Executing,
  Idle,
}

#[derive(Debug, Clone)]
pub struct NotebookCell {
  pub kind:              CellKind,
  pub document:          TextDocument,
  pub metadata:          Metadata,
  pub execution_summary: Option<ExecutionSummary>,
}

impl NotebookCell {
  pub fn new(kind: CellKind, document: TextDocument) -> Self {
    Self {
      kind,
      document,
      metadata: Metadata::new(),
      execution_summary: None,
    }
  }

  /// The cell's identity: the URI of its content document.
  pub fn uri(&self) -> &Url {
    &self.document.uri
  }

  pub fn language_id(&self) -> &str {
    &self.document.language_id
  }
}

#[derive(Debug, Clone)]
pub struct NotebookDocument {
  pub uri:           Url,
  pub notebook_type: String,
  pub version:       i32,
  pub metadata:      Metadata,
  pub cells:         Vec<NotebookCell>,
}

impl NotebookDocument {
  pub fn new(uri: Url, notebook_type: impl Into<String>) -> Self {
    Self {
      uri,
      notebook_type: notebook_type.into(),
      version: 0,
      metadata: Metadata::new(),
      cells: Vec::new(),
    }
  }

  pub fn cell(&self, uri: &Url) -> Option<&NotebookCell> {
    self.cells.iter().find(|cell| cell.uri() == uri)
  }

  /// The path glob filters are matched against.
  pub fn fs_path(&self) -> String {
    if self.uri.scheme() == "file"
      && let Ok(path) = self.uri.to_file_path()
    {
      return path.to_string_lossy().into_owned();
    }
    self.uri.path().to_string()
  }
}

/// Synchronous access to the editor's current notebooks.
pub trait Workspace: Send + Sync {
  fn notebook_documents(&self) -> Vec<NotebookDocument>;

  /// Finds the notebook that owns the cell content document `uri`.
  fn find_cell(&self, uri: &Url) -> Option<(NotebookDocument, NotebookCell)> {
    self.notebook_documents().into_iter().find_map(|notebook| {
      let cell = notebook.cell(uri).cloned()?;
      Some((notebook, cell))
    })
  }
}

/// A workspace backed by an in-memory list of open notebooks.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
  notebooks: RwLock<Vec<NotebookDocument>>,
}

impl InMemoryWorkspace {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds `notebook`, or replaces the notebook with the same URI.
  pub fn upsert(&self, notebook: NotebookDocument) {
    let mut notebooks = self.notebooks.write();
    match notebooks.iter_mut().find(|open| open.uri == notebook.uri) {
      Some(open) => *open = notebook,
      None => notebooks.push(notebook),
    }
  }

  pub fn remove(&self, uri: &Url) -> Option<NotebookDocument> {
    let mut notebooks = self.notebooks.write();
    let idx = notebooks.iter().position(|notebook| notebook.uri == *uri)?;
    Some(notebooks.remove(idx))
  }

  pub fn notebook(&self, uri: &Url) -> Option<NotebookDocument> {
    self
      .notebooks
      .read()
      .iter()
      .find(|notebook| notebook.uri == *uri)
      .cloned()
  }
}

impl Workspace for InMemoryWorkspace {
  fn notebook_documents(&self) -> Vec<NotebookDocument> {
    self.notebooks.read().clone()
  }
}
