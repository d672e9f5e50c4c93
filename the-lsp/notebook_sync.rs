//! Whole-notebook sync: mirrors notebook structure, metadata, execution
//! results and cell text to the server.

use std::{
  collections::HashSet,
  slice,
  sync::Arc,
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{
  trace,
  warn,
};
use url::Url;

use crate::{
  channel::{
    MessageChannel,
    notify,
  },
  config::NotebookDocumentOptions,
  convert,
  diff::{
    CellTransitions,
    compute_diff,
  },
  document::{
    CellExecutionState,
    NotebookCell,
    NotebookDocument,
    TextDocumentChangeEvent,
    Workspace,
  },
  event::{
    EditorEvent,
    EventHub,
    Subscription,
  },
  filter::{
    DocumentSelector,
    NotebookSelectors,
  },
  metadata::MetadataError,
  middleware::{
    CellStructureChange,
    CellsChangeEvent,
    NotebookChangeEvent,
  },
  protocol::{
    self,
    DidChangeNotebookDocumentParams,
    DidCloseNotebookDocumentParams,
    DidOpenNotebookDocumentParams,
    DidSaveNotebookDocumentParams,
    NotebookDocumentSyncRegistrationOptions,
  },
  sync_info::SyncInfoRegistry,
};

#[derive(Debug, Error)]
pub enum SyncError {
  #[error(transparent)]
  Metadata(#[from] MetadataError),
}

#[derive(Default)]
struct SyncState {
  sync_info: SyncInfoRegistry,
  /// Cells seen entering the executing state and not yet idle.
  executing: HashSet<Url>,
  /// Notebooks the editor has reported open.
  opened:    HashSet<Url>,
}

enum Outgoing {
  Open {
    notebook: NotebookDocument,
    cells:    Vec<NotebookCell>,
  },
  Change {
    notebook: NotebookDocument,
    event:    NotebookChangeEvent,
  },
  Save(NotebookDocument),
  Close {
    notebook: NotebookDocument,
    cells:    Vec<NotebookCell>,
  },
}

struct Coordinator {
  selectors:     NotebookSelectors,
  cell_selector: DocumentSelector,
  save:          bool,
  channel:       Arc<dyn MessageChannel>,
  options:       NotebookDocumentOptions,
  state:         Mutex<SyncState>,
}

impl Coordinator {
  fn handle_event(&self, event: &EditorEvent) {
    let result = match event {
      EditorEvent::NotebookOpened(notebook) => self.notebook_opened(notebook),
      EditorEvent::NotebookClosed(notebook) => self.notebook_closed(notebook),
      EditorEvent::NotebookSaved(notebook) if self.save => self.notebook_saved(notebook),
      EditorEvent::NotebookMetadataChanged(notebook) => self.notebook_metadata_changed(notebook),
      EditorEvent::NotebookCellsChanged(notebook) => self.cells_changed(notebook),
      EditorEvent::CellMetadataChanged { notebook, cell } => {
        self.cell_metadata_changed(notebook, cell)
      },
      EditorEvent::CellExecutionStateChanged {
        notebook,
        cell,
        state,
      } => self.cell_execution_state_changed(notebook, cell, *state),
      _ => Ok(()),
    };

    if let Err(err) = result {
      warn!(%err, "dropped notebook sync notification");
    }
  }

  fn matching_cells(
    &self,
    notebook: &NotebookDocument,
    candidates: &[NotebookCell],
  ) -> Option<Vec<NotebookCell>> {
    self
      .selectors
      .select_cells(notebook, candidates, self.options.filter_cells.as_ref())
  }

  fn notebook_opened(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    let outgoing = {
      let mut state = self.state.lock();
      state.opened.insert(notebook.uri.clone());
      self.structure_changed(&mut state, notebook)
    };
    self.deliver(outgoing)
  }

  fn notebook_closed(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    let outgoing = {
      let mut state = self.state.lock();
      state.opened.remove(&notebook.uri);
      self.close(&mut state, notebook)
    };
    self.deliver(outgoing)
  }

  fn notebook_saved(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    if !self.state.lock().sync_info.is_synced(&notebook.uri) {
      return Ok(());
    }
    self.deliver(Some(Outgoing::Save(notebook.clone())))
  }

  fn notebook_metadata_changed(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    if !self.state.lock().sync_info.is_synced(&notebook.uri) {
      return Ok(());
    }
    self.deliver(Some(Outgoing::Change {
      notebook: notebook.clone(),
      event:    NotebookChangeEvent::metadata(notebook.metadata.clone()),
    }))
  }

  fn cells_changed(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    let outgoing = self.structure_changed(&mut self.state.lock(), notebook);
    self.deliver(outgoing)
  }

  fn cell_metadata_changed(
    &self,
    notebook: &NotebookDocument,
    cell: &NotebookCell,
  ) -> Result<(), SyncError> {
    if !self.state.lock().sync_info.refresh_cell(&notebook.uri, cell) {
      return Ok(());
    }
    self.deliver(Some(Outgoing::Change {
      notebook: notebook.clone(),
      event:    data_change(cell),
    }))
  }

  /// Reports a cell once it settles back to idle after executing.
  fn cell_execution_state_changed(
    &self,
    notebook: &NotebookDocument,
    cell: &NotebookCell,
    execution: CellExecutionState,
  ) -> Result<(), SyncError> {
    {
      let mut state = self.state.lock();
      let synced = state
        .sync_info
        .get(&notebook.uri)
        .is_some_and(|info| info.contains(cell.uri()));
      if !synced {
        return Ok(());
      }
      match execution {
        CellExecutionState::Pending => return Ok(()),
        CellExecutionState::Executing => {
          state.executing.insert(cell.uri().clone());
          return Ok(());
        },
        CellExecutionState::Idle => {
          if !state.executing.remove(cell.uri()) {
            return Ok(());
          }
          state.sync_info.refresh_cell(&notebook.uri, cell);
        },
      }
    }

    self.deliver(Some(Outgoing::Change {
      notebook: notebook.clone(),
      event:    data_change(cell),
    }))
  }

  fn cell_document_opened(
    &self,
    notebook: &NotebookDocument,
    cell: &NotebookCell,
  ) -> Result<(), SyncError> {
    let outgoing = {
      let mut state = self.state.lock();
      if !state.opened.contains(&notebook.uri) {
        // The notebook open event is still to come and will sync the cell.
        trace!(notebook = %notebook.uri, cell = %cell.uri(), "cell opened before its notebook");
        return Ok(());
      }

      let cell_matches = self
        .matching_cells(notebook, slice::from_ref(cell))
        .is_some_and(|cells| cells.first().is_some_and(|first| first.uri() == cell.uri()));
      let cell_synced = state
        .sync_info
        .get(&notebook.uri)
        .map(|info| info.contains(cell.uri()));
      match cell_synced {
        Some(true) if cell_matches => None,
        None if !cell_matches => None,
        _ => self.structure_changed(&mut state, notebook),
      }
    };
    self.deliver(outgoing)
  }

  fn cell_text_changed(
    &self,
    notebook: &NotebookDocument,
    event: &TextDocumentChangeEvent,
  ) -> Result<(), SyncError> {
    if !self
      .cell_selector
      .match_for_provider(&event.document, Some(notebook))
    {
      return Ok(());
    }
    self.deliver(Some(Outgoing::Change {
      notebook: notebook.clone(),
      event:    NotebookChangeEvent::cells(CellsChangeEvent {
        text_content: Some(vec![event.clone()]),
        ..CellsChangeEvent::default()
      }),
    }))
  }

  /// Brings the server's view of `notebook` in line with the matching cells:
  /// opens, diffs or closes it.
  fn structure_changed(
    &self,
    state: &mut SyncState,
    notebook: &NotebookDocument,
  ) -> Option<Outgoing> {
    let cells = self.matching_cells(notebook, &notebook.cells);

    if !state.sync_info.is_synced(&notebook.uri) {
      let Some(cells) = cells else {
        trace!(notebook = %notebook.uri, "notebook does not match any selector");
        return None;
      };
      state.sync_info.set(notebook.uri.clone(), cells.clone());
      return Some(Outgoing::Open {
        notebook: notebook.clone(),
        cells,
      });
    }

    let Some(cells) = cells else {
      return self.close(state, notebook);
    };

    // Execution results may settle without an executing tick, so the
    // snapshot is brought up to date before diffing.
    state.sync_info.follow_cells(&notebook.uri, &notebook.cells);
    let info = state.sync_info.get(&notebook.uri)?;
    // Metadata changes travel as their own events.
    let Some(array) = compute_diff(info.cells(), &cells, false) else {
      trace!(notebook = %notebook.uri, "cell structure unchanged");
      return None;
    };
    let transitions = CellTransitions::compute(info.cells(), &array);
    state.sync_info.set(notebook.uri.clone(), cells);

    let CellTransitions { opened, closed } = transitions;
    for cell in &closed {
      state.executing.remove(cell.uri());
    }
    Some(Outgoing::Change {
      notebook: notebook.clone(),
      event:    NotebookChangeEvent::cells(CellsChangeEvent {
        structure: Some(CellStructureChange {
          array,
          did_open: (!opened.is_empty()).then_some(opened),
          did_close: (!closed.is_empty()).then_some(closed),
        }),
        ..CellsChangeEvent::default()
      }),
    })
  }

  fn close(&self, state: &mut SyncState, notebook: &NotebookDocument) -> Option<Outgoing> {
    let info = state.sync_info.remove(&notebook.uri)?;
    state.executing.retain(|uri| !info.contains(uri));
    Some(Outgoing::Close {
      notebook: notebook.clone(),
      cells:    info.cells().to_vec(),
    })
  }

  fn deliver(&self, outgoing: Option<Outgoing>) -> Result<(), SyncError> {
    match outgoing {
      None => Ok(()),
      Some(Outgoing::Open { notebook, cells }) => self.send_open(&notebook, &cells),
      Some(Outgoing::Change { notebook, event }) => self.send_change(&notebook, &event),
      Some(Outgoing::Save(notebook)) => self.send_save(&notebook),
      Some(Outgoing::Close { notebook, cells }) => self.send_close(&notebook, &cells),
    }
  }

  fn send_open(&self, notebook: &NotebookDocument, cells: &[NotebookCell]) -> Result<(), SyncError> {
    let next = |notebook: &NotebookDocument, cells: &[NotebookCell]| -> Result<(), SyncError> {
      let params = DidOpenNotebookDocumentParams {
        notebook_document:   convert::as_notebook_document(notebook, cells)?,
        cell_text_documents: cells
          .iter()
          .map(|cell| convert::as_text_document_item(&cell.document))
          .collect(),
      };
      trace!(notebook = %notebook.uri, cells = cells.len(), "opening notebook");
      notify(
        &*self.channel,
        protocol::DID_OPEN_NOTEBOOK_DOCUMENT,
        &params,
      );
      Ok(())
    };
    match &self.options.middleware {
      Some(middleware) => middleware.did_open(notebook, cells, &next),
      None => next(notebook, cells),
    }
  }

  fn send_change(
    &self,
    notebook: &NotebookDocument,
    event: &NotebookChangeEvent,
  ) -> Result<(), SyncError> {
    let next = |notebook: &NotebookDocument, event: &NotebookChangeEvent| -> Result<(), SyncError> {
      let change = convert::as_change_event(event)?;
      if change.is_empty() {
        trace!(notebook = %notebook.uri, "empty notebook change");
        return Ok(());
      }
      trace!(notebook = %notebook.uri, version = notebook.version, "changing notebook");
      notify(
        &*self.channel,
        protocol::DID_CHANGE_NOTEBOOK_DOCUMENT,
        &DidChangeNotebookDocumentParams {
          notebook_document: convert::as_versioned_notebook_document_identifier(notebook),
          change,
        },
      );
      Ok(())
    };
    match &self.options.middleware {
      Some(middleware) => middleware.did_change(notebook, event, &next),
      None => next(notebook, event),
    }
  }

  fn send_save(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    let next = |notebook: &NotebookDocument| -> Result<(), SyncError> {
      trace!(notebook = %notebook.uri, "saving notebook");
      notify(
        &*self.channel,
        protocol::DID_SAVE_NOTEBOOK_DOCUMENT,
        &DidSaveNotebookDocumentParams {
          notebook_document: convert::as_notebook_document_identifier(notebook),
        },
      );
      Ok(())
    };
    match &self.options.middleware {
      Some(middleware) => middleware.did_save(notebook, &next),
      None => next(notebook),
    }
  }

  fn send_close(&self, notebook: &NotebookDocument, cells: &[NotebookCell]) -> Result<(), SyncError> {
    let next = |notebook: &NotebookDocument, cells: &[NotebookCell]| -> Result<(), SyncError> {
      trace!(notebook = %notebook.uri, cells = cells.len(), "closing notebook");
      notify(
        &*self.channel,
        protocol::DID_CLOSE_NOTEBOOK_DOCUMENT,
        &DidCloseNotebookDocumentParams {
          notebook_document:   convert::as_notebook_document_identifier(notebook),
          cell_text_documents: cells
            .iter()
            .map(|cell| convert::as_text_document_identifier(&cell.document))
            .collect(),
        },
      );
      Ok(())
    };
    match &self.options.middleware {
      Some(middleware) => middleware.did_close(notebook, cells, &next),
      None => next(notebook, cells),
    }
  }
}

fn data_change(cell: &NotebookCell) -> NotebookChangeEvent {
  NotebookChangeEvent::cells(CellsChangeEvent {
    data: Some(vec![cell.clone()]),
    ..CellsChangeEvent::default()
  })
}

/// Syncs whole notebooks matched by one registration's selectors.
pub struct NotebookSync {
  coordinator:   Arc<Coordinator>,
  subscriptions: Mutex<Vec<Subscription>>,
}

impl NotebookSync {
  /// Starts listening to `events` and opens the already open notebooks that
  /// match.
  pub fn new(
    registration: &NotebookDocumentSyncRegistrationOptions,
    events: &EventHub,
    channel: Arc<dyn MessageChannel>,
    workspace: &dyn Workspace,
    options: NotebookDocumentOptions,
  ) -> Self {
    let selectors = NotebookSelectors::compile(registration);
    let coordinator = Arc::new(Coordinator {
      cell_selector: DocumentSelector::for_notebook_cells(&selectors, false),
      selectors,
      save: registration.save == Some(true),
      channel,
      options,
      state: Mutex::new(SyncState::default()),
    });

    let listener = coordinator.clone();
    let subscriptions = vec![events.subscribe(move |event| listener.handle_event(event))];

    for notebook in workspace.notebook_documents() {
      if let Err(err) = coordinator.notebook_opened(&notebook) {
        warn!(notebook = %notebook.uri, %err, "failed to open notebook");
      }
    }

    Self {
      coordinator,
      subscriptions: Mutex::new(subscriptions),
    }
  }

  /// Whether `cell` falls under this registration's cell selector.
  pub fn handles(&self, notebook: &NotebookDocument, cell: &NotebookCell) -> bool {
    self
      .coordinator
      .cell_selector
      .match_for_provider(&cell.document, Some(notebook))
  }

  pub fn is_synced(&self, notebook: &Url) -> bool {
    self.coordinator.state.lock().sync_info.is_synced(notebook)
  }

  /// The cells last sent to the server for `notebook`.
  pub fn synced_cells(&self, notebook: &Url) -> Option<Vec<NotebookCell>> {
    self
      .coordinator
      .state
      .lock()
      .sync_info
      .get(notebook)
      .map(|info| info.cells().to_vec())
  }

  pub(crate) fn cell_document_opened(&self, notebook: &NotebookDocument, cell: &NotebookCell) {
    if let Err(err) = self.coordinator.cell_document_opened(notebook, cell) {
      warn!(notebook = %notebook.uri, %err, "dropped notebook sync notification");
    }
  }

  pub(crate) fn cell_text_changed(&self, notebook: &NotebookDocument, event: &TextDocumentChangeEvent) {
    if let Err(err) = self.coordinator.cell_text_changed(notebook, event) {
      warn!(notebook = %notebook.uri, %err, "dropped notebook sync notification");
    }
  }

  pub fn send_did_open(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    match self.coordinator.matching_cells(notebook, &notebook.cells) {
      Some(cells) => self.coordinator.send_open(notebook, &cells),
      None => Ok(()),
    }
  }

  pub fn send_did_change(
    &self,
    notebook: &NotebookDocument,
    event: &NotebookChangeEvent,
  ) -> Result<(), SyncError> {
    self.coordinator.send_change(notebook, event)
  }

  pub fn send_did_save(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    self.coordinator.send_save(notebook)
  }

  pub fn send_did_close(&self, notebook: &NotebookDocument) -> Result<(), SyncError> {
    let cells = self
      .coordinator
      .matching_cells(notebook, &notebook.cells)
      .unwrap_or_default();
    self.coordinator.send_close(notebook, &cells)
  }

  /// Whether `cell` is among the cells last sent for `notebook`.
  pub fn is_cell_synced(&self, notebook: &Url, cell: &Url) -> bool {
    self
      .coordinator
      .state
      .lock()
      .sync_info
      .get(notebook)
      .is_some_and(|info| info.contains(cell))
  }

  /// Stops listening to editor events.
  pub fn dispose(&self) {
    self.subscriptions.lock().clear();
  }
}
