use std::collections::HashSet;

use url::Url;

use crate::{
  document::{
    ExecutionSummary,
    NotebookCell,
    Timing,
  },
  metadata::equals_metadata,
};

/// An array splice: delete `delete_count` cells at `start`, then insert
/// `cells` there.
#[derive(Debug, Clone)]
pub struct CellSplice {
  pub start:        usize,
  pub delete_count: usize,
  pub cells:        Option<Vec<NotebookCell>>,
}

impl CellSplice {
  pub fn apply(&self, cells: &mut Vec<NotebookCell>) {
    let inserted = self.cells.clone().unwrap_or_default();
    cells.splice(self.start..self.start + self.delete_count, inserted);
  }
}

/// The minimal splice turning `original` into `modified`, or `None` when the
/// two sequences are equal.
///
/// Common prefixes and suffixes are trimmed; the suffix scan never reaches
/// back past the prefix.
pub fn compute_diff(
  original: &[NotebookCell],
  modified: &[NotebookCell],
  compare_metadata: bool,
) -> Option<CellSplice> {
  let prefix = original
    .iter()
    .zip(modified)
    .take_while(|(one, other)| equals(one, other, compare_metadata))
    .count();

  let suffix = original[prefix..]
    .iter()
    .rev()
    .zip(modified[prefix..].iter().rev())
    .take_while(|(one, other)| equals(one, other, compare_metadata))
    .count();

  let delete_count = original.len() - suffix - prefix;
  let inserted = &modified[prefix..modified.len() - suffix];
  if delete_count == 0 && inserted.is_empty() {
    return None;
  }

  Some(CellSplice {
    start: prefix,
    delete_count,
    cells: (!inserted.is_empty()).then(|| inserted.to_vec()),
  })
}

/// Cell content documents a splice opens and closes. A cell deleted and
/// re-inserted with the same document moved and is in neither list.
#[derive(Debug, Clone, Default)]
pub struct CellTransitions {
  pub opened: Vec<NotebookCell>,
  pub closed: Vec<NotebookCell>,
}

impl CellTransitions {
  pub fn compute(original: &[NotebookCell], splice: &CellSplice) -> Self {
    let deleted = &original[splice.start..splice.start + splice.delete_count];
    let inserted = splice.cells.as_deref().unwrap_or_default();

    let deleted_uris: HashSet<&Url> = deleted.iter().map(NotebookCell::uri).collect();
    let inserted_uris: HashSet<&Url> = inserted.iter().map(NotebookCell::uri).collect();

    Self {
      opened: unique_outside(inserted, &deleted_uris),
      closed: unique_outside(deleted, &inserted_uris),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.opened.is_empty() && self.closed.is_empty()
  }
}

fn unique_outside(cells: &[NotebookCell], excluded: &HashSet<&Url>) -> Vec<NotebookCell> {
  let mut seen = HashSet::new();
  cells
    .iter()
    .filter(|cell| !excluded.contains(cell.uri()) && seen.insert(cell.uri().clone()))
    .cloned()
    .collect()
}

/// Only kind, document, execution and metadata reach the server, so only
/// those take part in the comparison.
pub fn equals(one: &NotebookCell, other: &NotebookCell, compare_metadata: bool) -> bool {
  if one.kind != other.kind
    || one.uri() != other.uri()
    || !equals_execution(one.execution_summary.as_ref(), other.execution_summary.as_ref())
  {
    return false;
  }
  !compare_metadata || equals_metadata(&one.metadata, &other.metadata)
}

fn equals_execution(one: Option<&ExecutionSummary>, other: Option<&ExecutionSummary>) -> bool {
  match (one, other) {
    (None, None) => true,
    (Some(one), Some(other)) => {
      std::ptr::eq(one, other)
        || (one.order == other.order
          && one.success == other.success
          && equals_timing(one.timing.as_ref(), other.timing.as_ref()))
    },
    _ => false,
  }
}

fn equals_timing(one: Option<&Timing>, other: Option<&Timing>) -> bool {
  match (one, other) {
    (None, None) => true,
    (Some(one), Some(other)) => {
      one.start_time == other.start_time && one.end_time == other.end_time
    },
    _ => false,
  }
}
