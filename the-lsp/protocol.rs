//! Wire schema for notebook and text document synchronization.

use serde::{
  Deserialize,
  Serialize,
};
use serde_json::{
  Map,
  Value,
};

pub const DID_OPEN_NOTEBOOK_DOCUMENT: &str = "notebookDocument/didOpen";
pub const DID_CHANGE_NOTEBOOK_DOCUMENT: &str = "notebookDocument/didChange";
pub const DID_SAVE_NOTEBOOK_DOCUMENT: &str = "notebookDocument/didSave";
pub const DID_CLOSE_NOTEBOOK_DOCUMENT: &str = "notebookDocument/didClose";

pub const DID_OPEN_TEXT_DOCUMENT: &str = "textDocument/didOpen";
pub const DID_CHANGE_TEXT_DOCUMENT: &str = "textDocument/didChange";
pub const DID_CLOSE_TEXT_DOCUMENT: &str = "textDocument/didClose";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
  pub line:      u32,
  pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
  pub start: Position,
  pub end:   Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
  pub uri:         String,
  pub language_id: String,
  pub version:     i32,
  pub text:        String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
  pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedTextDocumentIdentifier {
  pub uri:     String,
  pub version: i32,
}

/// A content change; without `range` it replaces the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDocumentContentChangeEvent {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub range: Option<Range>,
  pub text:  String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenTextDocumentParams {
  pub text_document: TextDocumentItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeTextDocumentParams {
  pub text_document:   VersionedTextDocumentIdentifier,
  pub content_changes: Vec<TextDocumentContentChangeEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseTextDocumentParams {
  pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NotebookCellKind {
  Markup,
  Code,
}

impl From<NotebookCellKind> for u8 {
  fn from(kind: NotebookCellKind) -> Self {
    match kind {
      NotebookCellKind::Markup => 1,
      NotebookCellKind::Code => 2,
    }
  }
}

impl TryFrom<u8> for NotebookCellKind {
  type Error = String;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      1 => Ok(Self::Markup),
      2 => Ok(Self::Code),
      other => Err(format!("unknown notebook cell kind {other}")),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
  pub execution_order: u32,
  pub success:         bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookCell {
  pub kind:              NotebookCellKind,
  pub document:          String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata:          Option<Map<String, Value>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution_summary: Option<ExecutionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookDocument {
  pub uri:           String,
  pub notebook_type: String,
  pub version:       i32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata:      Option<Map<String, Value>>,
  pub cells:         Vec<NotebookCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookDocumentIdentifier {
  pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedNotebookDocumentIdentifier {
  pub version: i32,
  pub uri:     String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookCellArrayChange {
  pub start:        usize,
  pub delete_count: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cells:        Option<Vec<NotebookCell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookCellStructureChange {
  pub array:     NotebookCellArrayChange,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub did_open:  Option<Vec<TextDocumentItem>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub did_close: Option<Vec<TextDocumentIdentifier>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookCellTextContentChange {
  pub document: VersionedTextDocumentIdentifier,
  pub changes:  Vec<TextDocumentContentChangeEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookCellsChange {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub structure:    Option<NotebookCellStructureChange>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data:         Option<Vec<NotebookCell>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text_content: Option<Vec<NotebookCellTextContentChange>>,
}

impl NotebookCellsChange {
  pub fn is_empty(&self) -> bool {
    self.structure.is_none() && self.data.is_none() && self.text_content.is_none()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookDocumentChangeEvent {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Map<String, Value>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cells:    Option<NotebookCellsChange>,
}

impl NotebookDocumentChangeEvent {
  pub fn is_empty(&self) -> bool {
    self.metadata.is_none() && self.cells.is_none()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenNotebookDocumentParams {
  pub notebook_document:   NotebookDocument,
  pub cell_text_documents: Vec<TextDocumentItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeNotebookDocumentParams {
  pub notebook_document: VersionedNotebookDocumentIdentifier,
  pub change:            NotebookDocumentChangeEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidSaveNotebookDocumentParams {
  pub notebook_document: NotebookDocumentIdentifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseNotebookDocumentParams {
  pub notebook_document:   NotebookDocumentIdentifier,
  pub cell_text_documents: Vec<TextDocumentIdentifier>,
}

/// Which notebooks a registration applies to. Absent fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookDocumentFilter {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notebook_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scheme:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pattern:       Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLanguageFilter {
  pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSelectorEntry {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notebook_document_filter: Option<NotebookDocumentFilter>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cell_selector:            Option<Vec<CellLanguageFilter>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotebookSyncMode {
  #[default]
  Notebook,
  CellContent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookDocumentSyncRegistrationOptions {
  pub notebook_document_selector: Vec<NotebookSelectorEntry>,
  #[serde(default)]
  pub mode:                       NotebookSyncMode,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub save:                       Option<bool>,
  /// Static registration id, if the server supplied one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id:                         Option<String>,
}
