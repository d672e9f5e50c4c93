use std::collections::{
  HashMap,
  HashSet,
};

use url::Url;

use crate::document::NotebookCell;

/// The cells of a notebook the server currently knows about.
#[derive(Debug, Clone)]
pub struct SyncInfo {
  cells: Vec<NotebookCell>,
  uris:  HashSet<Url>,
}

impl SyncInfo {
  pub fn new(cells: Vec<NotebookCell>) -> Self {
    let uris = cells.iter().map(|cell| cell.uri().clone()).collect();
    Self { cells, uris }
  }

  pub fn cells(&self) -> &[NotebookCell] {
    &self.cells
  }

  pub fn contains(&self, uri: &Url) -> bool {
    self.uris.contains(uri)
  }

  /// Replaces the snapshot of an already synced cell. Identity is unchanged.
  fn refresh(&mut self, cell: &NotebookCell) -> bool {
    match self.cells.iter_mut().find(|synced| synced.uri() == cell.uri()) {
      Some(synced) => {
        *synced = cell.clone();
        true
      },
      None => false,
    }
  }

  /// Takes execution results and metadata of synced cells from the editor's
  /// current cells, matched by URI.
  fn follow(&mut self, current: &[NotebookCell]) {
    for synced in &mut self.cells {
      if let Some(cell) = current.iter().find(|cell| cell.uri() == synced.uri()) {
        synced.execution_summary = cell.execution_summary;
        synced.metadata = cell.metadata.clone();
      }
    }
  }
}

/// Per-notebook sync state, keyed by notebook URI.
#[derive(Debug, Default)]
pub struct SyncInfoRegistry {
  notebooks: HashMap<Url, SyncInfo>,
}

impl SyncInfoRegistry {
  pub fn get(&self, notebook: &Url) -> Option<&SyncInfo> {
    self.notebooks.get(notebook)
  }

  pub fn is_synced(&self, notebook: &Url) -> bool {
    self.notebooks.contains_key(notebook)
  }

  /// Creates or wholesale replaces the entry for `notebook`.
  pub fn set(&mut self, notebook: Url, cells: Vec<NotebookCell>) {
    self.notebooks.insert(notebook, SyncInfo::new(cells));
  }

  pub fn refresh_cell(&mut self, notebook: &Url, cell: &NotebookCell) -> bool {
    self
      .notebooks
      .get_mut(notebook)
      .is_some_and(|info| info.refresh(cell))
  }

  /// Brings the snapshot of `notebook` up to date with the editor's cells
  /// without changing which cells are synced.
  pub fn follow_cells(&mut self, notebook: &Url, current: &[NotebookCell]) {
    if let Some(info) = self.notebooks.get_mut(notebook) {
      info.follow(current);
    }
  }

  pub fn remove(&mut self, notebook: &Url) -> Option<SyncInfo> {
    self.notebooks.remove(notebook)
  }

  pub fn len(&self) -> usize {
    self.notebooks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.notebooks.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::document::{
    CellKind,
    ExecutionSummary,
    TextDocument,
  };

  fn cell(idx: usize) -> NotebookCell {
    let uri = Url::parse(&format!("vscode-notebook-cell:/nb.ipynb#{idx}")).expect("valid uri");
    NotebookCell::new(CellKind::Code, TextDocument::new(uri, "python", 1, ""))
  }

  #[test]
  fn uris_follow_cells() {
    let notebook = Url::parse("file:///nb.ipynb").expect("valid uri");
    let mut registry = SyncInfoRegistry::default();
    registry.set(notebook.clone(), vec![cell(0), cell(1)]);
    assert!(registry.get(&notebook).is_some_and(|info| info.contains(cell(1).uri())));

    registry.set(notebook.clone(), vec![cell(2)]);
    let info = registry.get(&notebook).expect("synced");
    assert!(!info.contains(cell(1).uri()));
    assert!(info.contains(cell(2).uri()));

    assert!(registry.remove(&notebook).is_some());
    assert!(registry.is_empty());
  }

  #[test]
  fn refresh_only_touches_synced_cells() {
    let notebook = Url::parse("file:///nb.ipynb").expect("valid uri");
    let mut registry = SyncInfoRegistry::default();
    registry.set(notebook.clone(), vec![cell(0)]);

    let mut executed = cell(0);
    executed.execution_summary = Some(ExecutionSummary {
      order:   Some(4),
      success: Some(true),
      timing:  None,
    });
    assert!(registry.refresh_cell(&notebook, &executed));
    assert!(!registry.refresh_cell(&notebook, &cell(7)));
    assert_eq!(
      registry.get(&notebook).expect("synced").cells()[0].execution_summary,
      executed.execution_summary
    );
  }

  #[test]
  fn following_keeps_the_synced_cell_set() {
    let notebook = Url::parse("file:///nb.ipynb").expect("valid uri");
    let mut registry = SyncInfoRegistry::default();
    registry.set(notebook.clone(), vec![cell(0), cell(1)]);

    let mut executed = cell(1);
    executed.execution_summary = Some(ExecutionSummary {
      order:   Some(2),
      success: Some(false),
      timing:  None,
    });
    registry.follow_cells(&notebook, &[executed.clone(), cell(5)]);

    let info = registry.get(&notebook).expect("synced");
    assert_eq!(info.cells().len(), 2);
    assert!(!info.contains(cell(5).uri()));
    assert_eq!(info.cells()[0].execution_summary, None);
    assert_eq!(info.cells()[1].execution_summary, executed.execution_summary);
  }
}
