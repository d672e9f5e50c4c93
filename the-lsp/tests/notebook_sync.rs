use std::sync::{
  Arc,
  atomic::{
    AtomicUsize,
    Ordering,
  },
};

use ropey::Rope;
use serde_json::{
  Value,
  json,
};
use the_lsp_sync::{
  ChangeNext,
  EditorEvent,
  EventHub,
  NotebookChangeEvent,
  NotebookDocumentOptions,
  NotebookDocumentSyncFeature,
  NotebookMiddleware,
  NotebookSyncConfig,
  RecordingChannel,
  SyncError,
  TextDocumentSyncFeature,
  document::{
    CellExecutionState,
    CellKind,
    ExecutionSummary,
    InMemoryWorkspace,
    NotebookCell,
    NotebookDocument,
    TextDocument,
    TextDocumentChangeEvent,
    TextEdit,
  },
  filter::CellFilter,
  jsonrpc::Notification,
  metadata::{
    Metadata,
    MetadataValue,
  },
  protocol,
};
use url::Url;

const NOTEBOOK_URI: &str = "file:///work/analysis.ipynb";

fn cell(name: &str, language: &str) -> NotebookCell {
  let uri = Url::parse(&format!("vscode-notebook-cell:/work/analysis.ipynb#{name}"))
    .expect("valid cell uri");
  NotebookCell::new(CellKind::Code, TextDocument::new(uri, language, 1, ""))
}

fn notebook(cells: Vec<NotebookCell>) -> NotebookDocument {
  let mut notebook = NotebookDocument::new(
    Url::parse(NOTEBOOK_URI).expect("valid notebook uri"),
    "jupyter-notebook",
  );
  notebook.version = 1;
  notebook.cells = cells;
  notebook
}

fn python_cells() -> Value {
  json!({
    "notebookDocumentSelector": [{
      "notebookDocumentFilter": { "notebookType": "jupyter-notebook", "pattern": "**/*.ipynb" },
      "cellSelector": [{ "language": "python" }]
    }]
  })
}

struct Harness {
  events:    EventHub,
  channel:   RecordingChannel,
  workspace: Arc<InMemoryWorkspace>,
  feature:   NotebookDocumentSyncFeature,
  _text:     TextDocumentSyncFeature,
}

impl Harness {
  fn new(options: NotebookDocumentOptions) -> Self {
    let events = EventHub::new();
    let channel = RecordingChannel::new();
    let workspace = Arc::new(InMemoryWorkspace::new());
    let text = TextDocumentSyncFeature::new(&events, Arc::new(channel.clone()), workspace.clone());
    let feature = NotebookDocumentSyncFeature::new(
      &events,
      Arc::new(channel.clone()),
      workspace.clone(),
      text.registry().clone(),
      NotebookSyncConfig::default(),
      options,
    );
    Self {
      events,
      channel,
      workspace,
      feature,
      _text: text,
    }
  }

  fn with_registration(options: Value) -> Self {
    let harness = Self::new(NotebookDocumentOptions::default());
    harness
      .feature
      .register_value("registration", options)
      .expect("valid registration");
    harness
  }

  /// Cell documents open first, then the notebook.
  fn open(&self, notebook: &NotebookDocument) {
    self.workspace.upsert(notebook.clone());
    for cell in &notebook.cells {
      self
        .events
        .emit(&EditorEvent::TextDocumentOpened(cell.document.clone()));
    }
    self
      .events
      .emit(&EditorEvent::NotebookOpened(notebook.clone()));
  }

  fn change_cells(&self, notebook: &NotebookDocument) {
    self.workspace.upsert(notebook.clone());
    self
      .events
      .emit(&EditorEvent::NotebookCellsChanged(notebook.clone()));
  }

  fn close(&self, notebook: &NotebookDocument) {
    self.workspace.remove(&notebook.uri);
    self
      .events
      .emit(&EditorEvent::NotebookClosed(notebook.clone()));
  }

  fn sent(&self) -> Vec<Notification> {
    self.channel.take()
  }
}

fn methods(sent: &[Notification]) -> Vec<&str> {
  sent
    .iter()
    .map(|notification| notification.method.as_str())
    .collect()
}

fn params(notification: &Notification) -> &Value {
  notification.params.as_ref().expect("notification params")
}

fn uris(value: &Value) -> Vec<&str> {
  value
    .as_array()
    .expect("an array")
    .iter()
    .map(|item| item["uri"].as_str().expect("a uri"))
    .collect()
}

#[test]
fn non_matching_notebooks_are_never_opened() {
  let harness = Harness::with_registration(python_cells());

  let markdown_only = notebook(vec![cell("m1", "markdown")]);
  harness.open(&markdown_only);
  harness.close(&markdown_only);

  let mut other_type = notebook(vec![cell("c1", "python")]);
  other_type.notebook_type = "interactive".into();
  harness.open(&other_type);

  assert!(harness.sent().is_empty());
}

#[test]
fn open_sends_notebook_and_matching_cells() {
  let harness = Harness::with_registration(python_cells());
  harness.open(&notebook(vec![
    cell("c1", "python"),
    cell("m1", "markdown"),
    cell("c2", "python"),
  ]));

  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_OPEN_NOTEBOOK_DOCUMENT]);
  let params = params(&sent[0]);
  assert_eq!(params["notebookDocument"]["uri"], NOTEBOOK_URI);
  assert_eq!(params["notebookDocument"]["notebookType"], "jupyter-notebook");
  assert_eq!(params["notebookDocument"]["cells"].as_array().map(Vec::len), Some(2));
  assert_eq!(
    uris(&params["cellTextDocuments"]),
    [
      "vscode-notebook-cell:/work/analysis.ipynb#c1",
      "vscode-notebook-cell:/work/analysis.ipynb#c2",
    ]
  );
  assert_eq!(params["cellTextDocuments"][0]["languageId"], "python");
}

#[test]
fn structure_change_reports_splice_and_cell_transitions() {
  let harness = Harness::with_registration(python_cells());
  let mut nb = notebook(vec![
    cell("c1", "python"),
    cell("c2", "python"),
    cell("c3", "python"),
  ]);
  harness.open(&nb);
  harness.sent();

  nb.version = 2;
  nb.cells[1] = cell("c4", "python");
  harness.change_cells(&nb);

  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_CHANGE_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    *params(&sent[0]),
    json!({
      "notebookDocument": { "version": 2, "uri": NOTEBOOK_URI },
      "change": {
        "cells": {
          "structure": {
            "array": {
              "start": 1,
              "deleteCount": 1,
              "cells": [{ "kind": 2, "document": "vscode-notebook-cell:/work/analysis.ipynb#c4" }]
            },
            "didOpen": [{
              "uri": "vscode-notebook-cell:/work/analysis.ipynb#c4",
              "languageId": "python",
              "version": 1,
              "text": ""
            }],
            "didClose": [{ "uri": "vscode-notebook-cell:/work/analysis.ipynb#c2" }]
          }
        }
      }
    })
  );

  harness.change_cells(&nb);
  assert!(harness.sent().is_empty());
}

#[test]
fn losing_every_match_closes_then_reopens() {
  let harness = Harness::with_registration(python_cells());
  let mut nb = notebook(vec![cell("c1", "python"), cell("c2", "python")]);
  harness.open(&nb);
  harness.sent();

  nb.cells = vec![cell("m1", "markdown"), cell("m2", "markdown")];
  harness.change_cells(&nb);
  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_CLOSE_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    uris(&params(&sent[0])["cellTextDocuments"]),
    [
      "vscode-notebook-cell:/work/analysis.ipynb#c1",
      "vscode-notebook-cell:/work/analysis.ipynb#c2",
    ]
  );

  nb.cells.push(cell("c3", "python"));
  harness.change_cells(&nb);
  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_OPEN_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    uris(&params(&sent[0])["cellTextDocuments"]),
    ["vscode-notebook-cell:/work/analysis.ipynb#c3"]
  );
}

#[test]
fn close_lists_only_synced_cells() {
  let harness = Harness::with_registration(python_cells());
  let nb = notebook(vec![cell("c1", "python"), cell("m1", "markdown")]);
  harness.open(&nb);
  harness.sent();

  harness.close(&nb);
  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_CLOSE_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    uris(&params(&sent[0])["cellTextDocuments"]),
    ["vscode-notebook-cell:/work/analysis.ipynb#c1"]
  );

  harness.close(&nb);
  assert!(harness.sent().is_empty());
}

#[test]
fn language_change_moves_cell_out_of_sync() {
  let harness = Harness::with_registration(python_cells());
  let mut nb = notebook(vec![cell("c1", "python"), cell("c2", "python")]);
  harness.open(&nb);
  harness.sent();

  nb.cells[1].document.language_id = "markdown".into();
  harness.workspace.upsert(nb.clone());
  harness
    .events
    .emit(&EditorEvent::TextDocumentOpened(nb.cells[1].document.clone()));

  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_CHANGE_NOTEBOOK_DOCUMENT]);
  let structure = &params(&sent[0])["change"]["cells"]["structure"];
  assert_eq!(structure["array"], json!({ "start": 1, "deleteCount": 1 }));
  assert_eq!(
    uris(&structure["didClose"]),
    ["vscode-notebook-cell:/work/analysis.ipynb#c2"]
  );
}

#[test]
fn execution_is_reported_once_settled() {
  let harness = Harness::with_registration(python_cells());
  let mut nb = notebook(vec![cell("c1", "python")]);
  harness.open(&nb);
  harness.sent();

  nb.cells[0].execution_summary = Some(ExecutionSummary {
    order:   Some(7),
    success: Some(true),
    timing:  None,
  });
  for state in [
    CellExecutionState::Pending,
    CellExecutionState::Executing,
    CellExecutionState::Idle,
  ] {
    harness.events.emit(&EditorEvent::CellExecutionStateChanged {
      notebook: nb.clone(),
      cell: nb.cells[0].clone(),
      state,
    });
  }

  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_CHANGE_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    params(&sent[0])["change"],
    json!({
      "cells": {
        "data": [{
          "kind": 2,
          "document": "vscode-notebook-cell:/work/analysis.ipynb#c1",
          "executionSummary": { "executionOrder": 7, "success": true }
        }]
      }
    })
  );
}

#[test]
fn unannounced_execution_results_keep_diffs_minimal() {
  let harness = Harness::with_registration(python_cells());
  let mut nb = notebook(vec![cell("c1", "python")]);
  harness.open(&nb);
  harness.sent();

  nb.cells[0].execution_summary = Some(ExecutionSummary {
    order:   Some(1),
    success: Some(true),
    timing:  None,
  });
  harness.workspace.upsert(nb.clone());
  harness.events.emit(&EditorEvent::CellExecutionStateChanged {
    notebook: nb.clone(),
    cell:     nb.cells[0].clone(),
    state:    CellExecutionState::Idle,
  });
  assert!(harness.sent().is_empty());

  nb.cells.push(cell("c2", "python"));
  harness.change_cells(&nb);
  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_CHANGE_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    params(&sent[0])["change"]["cells"]["structure"]["array"],
    json!({
      "start": 1,
      "deleteCount": 0,
      "cells": [{ "kind": 2, "document": "vscode-notebook-cell:/work/analysis.ipynb#c2" }]
    })
  );
}

#[test]
fn notebook_metadata_change_carries_only_metadata() {
  let harness = Harness::with_registration(python_cells());
  let mut nb = notebook(vec![cell("c1", "python")]);
  harness.open(&nb);
  harness.sent();

  nb.metadata
    .insert("kernelspec".into(), MetadataValue::from(json!({ "name": "python3" })));
  harness
    .events
    .emit(&EditorEvent::NotebookMetadataChanged(nb.clone()));

  let sent = harness.sent();
  assert_eq!(
    params(&sent[0])["change"],
    json!({ "metadata": { "kernelspec": { "name": "python3" } } })
  );
}

#[test]
fn cyclic_metadata_sends_nothing_and_keeps_state() {
  let harness = Harness::with_registration(python_cells());
  let mut nb = notebook(vec![cell("c1", "python")]);
  harness.open(&nb);
  harness.sent();

  let node = MetadataValue::shared(MetadataValue::Object(Metadata::new()));
  if let MetadataValue::Shared(inner) = &node
    && let MetadataValue::Object(map) = &mut *inner.write()
  {
    map.insert("parent".into(), node.clone());
  }
  nb.metadata.insert("tree".into(), node.clone());
  harness
    .events
    .emit(&EditorEvent::NotebookMetadataChanged(nb.clone()));
  assert!(harness.sent().is_empty());

  nb.cells.push(cell("c2", "python"));
  harness.change_cells(&nb);
  assert_eq!(
    methods(&harness.sent()),
    [protocol::DID_CHANGE_NOTEBOOK_DOCUMENT]
  );

  if let MetadataValue::Shared(inner) = &node {
    *inner.write() = MetadataValue::Null;
  }
}

#[test]
fn cell_text_edits_become_text_content_changes() {
  let harness = Harness::with_registration(python_cells());
  let nb = notebook(vec![cell("c1", "python")]);
  harness.open(&nb);
  harness.sent();

  let mut document = nb.cells[0].document.clone();
  document.version = 2;
  document.text = Rope::from_str("print(1)");
  let edit = TextDocumentChangeEvent {
    document,
    previous: Rope::new(),
    edits: vec![TextEdit {
      range: 0..0,
      text:  "print(1)".into(),
    }],
  };
  harness
    .events
    .emit(&EditorEvent::TextDocumentChanged(edit.clone()));
  harness.events.emit(&EditorEvent::TextDocumentChanged(TextDocumentChangeEvent {
    edits: Vec::new(),
    ..edit
  }));

  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_CHANGE_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    params(&sent[0])["change"]["cells"]["textContent"],
    json!([{
      "document": { "uri": "vscode-notebook-cell:/work/analysis.ipynb#c1", "version": 2 },
      "changes": [{
        "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 0 } },
        "text": "print(1)"
      }]
    }])
  );
}

#[test]
fn save_is_sent_only_when_requested() {
  let harness = Harness::with_registration(python_cells());
  let nb = notebook(vec![cell("c1", "python")]);
  harness.open(&nb);
  harness.sent();
  harness.events.emit(&EditorEvent::NotebookSaved(nb.clone()));
  assert!(harness.sent().is_empty());

  let mut options = python_cells();
  options["save"] = json!(true);
  let harness = Harness::with_registration(options);
  harness.open(&nb);
  harness.sent();
  harness.events.emit(&EditorEvent::NotebookSaved(nb.clone()));
  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_SAVE_NOTEBOOK_DOCUMENT]);
  assert_eq!(
    *params(&sent[0]),
    json!({ "notebookDocument": { "uri": NOTEBOOK_URI } })
  );
}

#[test]
fn cell_content_mode_syncs_cells_as_text_documents() {
  let mut options = python_cells();
  options["mode"] = json!("cellContent");
  let harness = Harness::with_registration(options);

  let nb = notebook(vec![cell("c1", "python"), cell("m1", "markdown")]);
  harness.open(&nb);
  let sent = harness.sent();
  assert_eq!(methods(&sent), [protocol::DID_OPEN_TEXT_DOCUMENT]);
  assert_eq!(
    params(&sent[0])["textDocument"]["uri"],
    "vscode-notebook-cell:/work/analysis.ipynb#c1"
  );

  let mut document = nb.cells[0].document.clone();
  document.version = 2;
  document.text = Rope::from_str("x");
  harness
    .events
    .emit(&EditorEvent::TextDocumentChanged(TextDocumentChangeEvent {
      document,
      previous: Rope::new(),
      edits: vec![TextEdit {
        range: 0..0,
        text:  "x".into(),
      }],
    }));
  assert_eq!(
    methods(&harness.sent()),
    [protocol::DID_CHANGE_TEXT_DOCUMENT]
  );

  harness.feature.unregister("registration");
  assert_eq!(
    methods(&harness.sent()),
    [protocol::DID_CLOSE_TEXT_DOCUMENT]
  );
}

#[test]
fn cell_content_registration_opens_existing_cells() {
  let harness = Harness::new(NotebookDocumentOptions::default());
  harness.open(&notebook(vec![cell("c1", "python")]));
  assert!(harness.sent().is_empty());

  let mut options = python_cells();
  options["mode"] = json!("cellContent");
  harness
    .feature
    .register_value("registration", options)
    .expect("valid registration");
  assert_eq!(
    methods(&harness.sent()),
    [protocol::DID_OPEN_TEXT_DOCUMENT]
  );
}

#[test]
fn unregistered_notebook_sync_goes_quiet() {
  let harness = Harness::with_registration(python_cells());
  harness.feature.unregister("registration");
  harness.open(&notebook(vec![cell("c1", "python")]));
  assert!(harness.sent().is_empty());
}

#[derive(Default)]
struct QuietChanges {
  suppressed: AtomicUsize,
}

impl NotebookMiddleware for QuietChanges {
  fn did_change(
    &self,
    _notebook: &NotebookDocument,
    _event: &NotebookChangeEvent,
    _next: ChangeNext<'_>,
  ) -> Result<(), SyncError> {
    self.suppressed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

#[test]
fn middleware_can_suppress_notifications() {
  let middleware = Arc::new(QuietChanges::default());
  let hook: Arc<dyn NotebookMiddleware> = middleware.clone();
  let harness = Harness::new(NotebookDocumentOptions {
    filter_cells: None,
    middleware:   Some(hook),
  });
  harness
    .feature
    .register_value("registration", python_cells())
    .expect("valid registration");

  let mut nb = notebook(vec![cell("c1", "python")]);
  harness.open(&nb);
  nb.cells.push(cell("c2", "python"));
  harness.change_cells(&nb);

  assert_eq!(
    methods(&harness.sent()),
    [protocol::DID_OPEN_NOTEBOOK_DOCUMENT]
  );
  assert_eq!(middleware.suppressed.load(Ordering::SeqCst), 1);
}

#[test]
fn filter_cells_hook_narrows_synced_cells() {
  let keep_first: CellFilter = Arc::new(|_: &NotebookDocument, mut cells: Vec<NotebookCell>| {
    cells.truncate(1);
    cells
  });
  let harness = Harness::new(NotebookDocumentOptions {
    filter_cells: Some(keep_first),
    middleware:   None,
  });
  harness
    .feature
    .register_value("registration", python_cells())
    .expect("valid registration");

  harness.open(&notebook(vec![cell("c1", "python"), cell("c2", "python")]));
  let sent = harness.sent();
  assert_eq!(
    uris(&params(&sent[0])["cellTextDocuments"]),
    ["vscode-notebook-cell:/work/analysis.ipynb#c1"]
  );
}
