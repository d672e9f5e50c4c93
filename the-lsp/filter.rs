//! Server-declared selectors, compiled once per registration.

use std::sync::Arc;

use globset::{
  GlobBuilder,
  GlobMatcher,
};
use tracing::warn;

use crate::{
  document::{
    NotebookCell,
    NotebookDocument,
    TextDocument,
  },
  protocol::{
    NotebookDocumentFilter,
    NotebookDocumentSyncRegistrationOptions,
  },
};

/// Narrows a matched cell set further. Receives the language-filtered cells.
pub type CellFilter =
  Arc<dyn Fn(&NotebookDocument, Vec<NotebookCell>) -> Vec<NotebookCell> + Send + Sync>;

#[derive(Debug, Clone)]
enum PatternMatcher {
  Glob(GlobMatcher),
  /// The pattern failed to compile and matches nothing.
  Invalid,
}

#[derive(Debug, Clone)]
pub struct NotebookFilter {
  notebook_type: Option<String>,
  scheme:        Option<String>,
  pattern:       Option<PatternMatcher>,
}

impl NotebookFilter {
  pub fn compile(filter: &NotebookDocumentFilter) -> Self {
    let pattern = filter.pattern.as_deref().map(|pattern| {
      match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => PatternMatcher::Glob(glob.compile_matcher()),
        Err(err) => {
          warn!(pattern, %err, "invalid notebook document filter pattern");
          PatternMatcher::Invalid
        },
      }
    });

    Self {
      notebook_type: filter.notebook_type.clone(),
      scheme: filter.scheme.clone(),
      pattern,
    }
  }

  /// Every field present on the filter must match; absent fields are wildcards.
  pub fn matches(&self, notebook: &NotebookDocument) -> bool {
    if let Some(notebook_type) = &self.notebook_type
      && *notebook_type != notebook.notebook_type
    {
      return false;
    }
    if let Some(scheme) = &self.scheme
      && scheme != notebook.uri.scheme()
    {
      return false;
    }
    match &self.pattern {
      None => true,
      Some(PatternMatcher::Invalid) => false,
      Some(PatternMatcher::Glob(glob)) => glob.is_match(notebook.fs_path()),
    }
  }
}

#[derive(Debug, Clone)]
pub struct NotebookSelector {
  pub notebook:       Option<NotebookFilter>,
  pub cell_languages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct NotebookSelectors {
  entries: Vec<NotebookSelector>,
}

impl NotebookSelectors {
  pub fn compile(options: &NotebookDocumentSyncRegistrationOptions) -> Self {
    let entries = options
      .notebook_document_selector
      .iter()
      .map(|entry| {
        NotebookSelector {
          notebook:       entry
            .notebook_document_filter
            .as_ref()
            .map(NotebookFilter::compile),
          cell_languages: entry.cell_selector.as_ref().map(|cells| {
            cells
              .iter()
              .map(|filter| filter.language.clone())
              .collect()
          }),
        }
      })
      .collect();
    Self { entries }
  }

  pub fn entries(&self) -> &[NotebookSelector] {
    &self.entries
  }

  /// The cells of `notebook` that should be synced, or `None` when the
  /// notebook should not be synced at all.
  ///
  /// The first entry that applies decides. An entry without a notebook filter
  /// applies to every notebook; an entry with neither filter stops the search
  /// without a match. An empty selection counts as no match.
  pub fn select_cells(
    &self,
    notebook: &NotebookDocument,
    candidates: &[NotebookCell],
    filter_cells: Option<&CellFilter>,
  ) -> Option<Vec<NotebookCell>> {
    for entry in &self.entries {
      match (&entry.notebook, &entry.cell_languages) {
        (None, None) => return None,
        (None, Some(languages)) => {
          let selected = filter_by_language(notebook, candidates, languages, filter_cells);
          return (!selected.is_empty()).then_some(selected);
        },
        (Some(filter), languages) if filter.matches(notebook) => {
          let selected = match languages {
            None => candidates.to_vec(),
            Some(languages) => filter_by_language(notebook, candidates, languages, filter_cells),
          };
          return (!selected.is_empty()).then_some(selected);
        },
        (Some(_), _) => {},
      }
    }
    None
  }
}

fn filter_by_language(
  notebook: &NotebookDocument,
  candidates: &[NotebookCell],
  languages: &[String],
  filter_cells: Option<&CellFilter>,
) -> Vec<NotebookCell> {
  let selected: Vec<NotebookCell> = candidates
    .iter()
    .filter(|cell| languages.iter().any(|language| language == cell.language_id()))
    .cloned()
    .collect();
  match filter_cells {
    Some(filter_cells) => filter_cells(notebook, selected),
    None => selected,
  }
}

/// A document filter that only applies to notebook cell documents.
#[derive(Debug, Clone)]
pub struct CellDocumentFilter {
  pub notebook:      Option<NotebookFilter>,
  pub cell_language: Option<String>,
  /// Whether the filter takes part in single-document sync.
  pub sync:          bool,
}

impl CellDocumentFilter {
  fn matches(&self, document: &TextDocument, notebook: &NotebookDocument) -> bool {
    if let Some(language) = &self.cell_language
      && *language != document.language_id
    {
      return false;
    }
    self
      .notebook
      .as_ref()
      .is_none_or(|filter| filter.matches(notebook))
  }
}

/// Plain text document filter.
#[derive(Debug, Clone, Default)]
pub struct TextDocumentFilter {
  pub language: Option<String>,
  pub scheme:   Option<String>,
}

impl TextDocumentFilter {
  fn matches(&self, document: &TextDocument) -> bool {
    self
      .language
      .as_ref()
      .is_none_or(|language| *language == document.language_id)
      && self
        .scheme
        .as_ref()
        .is_none_or(|scheme| scheme == document.uri.scheme())
  }
}

#[derive(Debug, Clone)]
pub enum DocumentFilter {
  Text(TextDocumentFilter),
  Cell(CellDocumentFilter),
}

#[derive(Debug, Clone, Default)]
pub struct DocumentSelector {
  filters: Vec<DocumentFilter>,
}

impl DocumentSelector {
  pub fn new(filters: Vec<DocumentFilter>) -> Self {
    Self { filters }
  }

  /// Expands notebook selector entries into one cell filter per cell
  /// language. Entries with neither a notebook filter nor cell languages
  /// contribute nothing.
  pub fn for_notebook_cells(selectors: &NotebookSelectors, sync: bool) -> Self {
    let mut filters = Vec::new();
    for entry in selectors.entries() {
      match &entry.cell_languages {
        Some(languages) => {
          filters.extend(languages.iter().map(|language| {
            DocumentFilter::Cell(CellDocumentFilter {
              notebook: entry.notebook.clone(),
              cell_language: Some(language.clone()),
              sync,
            })
          }));
        },
        None if entry.notebook.is_some() => {
          filters.push(DocumentFilter::Cell(CellDocumentFilter {
            notebook: entry.notebook.clone(),
            cell_language: None,
            sync,
          }));
        },
        None => {},
      }
    }
    Self { filters }
  }

  pub fn is_empty(&self) -> bool {
    self.filters.is_empty()
  }

  /// Provider matching: cell filters match any cell document of a matching
  /// notebook.
  pub fn match_for_provider(
    &self,
    document: &TextDocument,
    notebook: Option<&NotebookDocument>,
  ) -> bool {
    self.matches(document, notebook, false)
  }

  /// Document sync matching: cell filters only match when they are flagged
  /// for sync.
  pub fn match_for_document_sync(
    &self,
    document: &TextDocument,
    notebook: Option<&NotebookDocument>,
  ) -> bool {
    self.matches(document, notebook, true)
  }

  fn matches(
    &self,
    document: &TextDocument,
    notebook: Option<&NotebookDocument>,
    for_sync: bool,
  ) -> bool {
    self.filters.iter().any(|filter| {
      match (filter, notebook) {
        (DocumentFilter::Text(filter), _) => filter.matches(document),
        (DocumentFilter::Cell(filter), Some(notebook)) => {
          (!for_sync || filter.sync) && filter.matches(document, notebook)
        },
        (DocumentFilter::Cell(_), None) => false,
      }
    })
  }
}
