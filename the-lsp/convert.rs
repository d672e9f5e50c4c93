//! Editor model to wire schema.

use serde_json::{
  Map,
  Value,
};

use crate::{
  document::{
    CellKind,
    ExecutionSummary,
    NotebookCell,
    NotebookDocument,
    TextDocument,
    TextDocumentChangeEvent,
  },
  metadata::{
    Metadata,
    MetadataError,
    to_lsp_object,
  },
  middleware::{
    CellsChangeEvent,
    NotebookChangeEvent,
  },
  protocol,
  text_sync,
};

pub fn as_text_document_item(document: &TextDocument) -> protocol::TextDocumentItem {
  protocol::TextDocumentItem {
    uri:         document.uri.to_string(),
    language_id: document.language_id.clone(),
    version:     document.version,
    text:        document.text.to_string(),
  }
}

pub fn as_text_document_identifier(document: &TextDocument) -> protocol::TextDocumentIdentifier {
  protocol::TextDocumentIdentifier {
    uri: document.uri.to_string(),
  }
}

pub fn as_versioned_text_document_identifier(
  document: &TextDocument,
) -> protocol::VersionedTextDocumentIdentifier {
  protocol::VersionedTextDocumentIdentifier {
    uri:     document.uri.to_string(),
    version: document.version,
  }
}

pub fn as_notebook_document_identifier(
  notebook: &NotebookDocument,
) -> protocol::NotebookDocumentIdentifier {
  protocol::NotebookDocumentIdentifier {
    uri: notebook.uri.to_string(),
  }
}

pub fn as_versioned_notebook_document_identifier(
  notebook: &NotebookDocument,
) -> protocol::VersionedNotebookDocumentIdentifier {
  protocol::VersionedNotebookDocumentIdentifier {
    version: notebook.version,
    uri:     notebook.uri.to_string(),
  }
}

/// Empty metadata is left off the wire.
pub fn as_metadata(metadata: &Metadata) -> Result<Option<Map<String, Value>>, MetadataError> {
  if metadata.is_empty() {
    return Ok(None);
  }
  to_lsp_object(metadata).map(Some)
}

pub fn as_cell_kind(kind: CellKind) -> protocol::NotebookCellKind {
  match kind {
    CellKind::Markup => protocol::NotebookCellKind::Markup,
    CellKind::Code => protocol::NotebookCellKind::Code,
  }
}

/// Only complete summaries are sent; timing never is.
pub fn as_execution_summary(summary: &ExecutionSummary) -> Option<protocol::ExecutionSummary> {
  Some(protocol::ExecutionSummary {
    execution_order: summary.order?,
    success:         summary.success?,
  })
}

pub fn as_notebook_cell(cell: &NotebookCell) -> Result<protocol::NotebookCell, MetadataError> {
  Ok(protocol::NotebookCell {
    kind:              as_cell_kind(cell.kind),
    document:          cell.uri().to_string(),
    metadata:          as_metadata(&cell.metadata)?,
    execution_summary: cell
      .execution_summary
      .as_ref()
      .and_then(as_execution_summary),
  })
}

pub fn as_notebook_cells(
  cells: &[NotebookCell],
) -> Result<Vec<protocol::NotebookCell>, MetadataError> {
  cells.iter().map(as_notebook_cell).collect()
}

/// The notebook as the server sees it: only `cells` are included.
pub fn as_notebook_document(
  notebook: &NotebookDocument,
  cells: &[NotebookCell],
) -> Result<protocol::NotebookDocument, MetadataError> {
  Ok(protocol::NotebookDocument {
    uri:           notebook.uri.to_string(),
    notebook_type: notebook.notebook_type.clone(),
    version:       notebook.version,
    metadata:      as_metadata(&notebook.metadata)?,
    cells:         as_notebook_cells(cells)?,
  })
}

pub fn as_text_content_change(
  event: &TextDocumentChangeEvent,
) -> protocol::NotebookCellTextContentChange {
  protocol::NotebookCellTextContentChange {
    document: as_versioned_text_document_identifier(&event.document),
    changes:  text_sync::content_changes(event),
  }
}

fn as_cells_change(cells: &CellsChangeEvent) -> Result<protocol::NotebookCellsChange, MetadataError> {
  let structure = match &cells.structure {
    Some(structure) => {
      Some(protocol::NotebookCellStructureChange {
        array:     protocol::NotebookCellArrayChange {
          start:        structure.array.start,
          delete_count: structure.array.delete_count,
          cells:        structure
            .array
            .cells
            .as_deref()
            .map(as_notebook_cells)
            .transpose()?,
        },
        did_open:  structure.did_open.as_ref().map(|cells| {
          cells
            .iter()
            .map(|cell| as_text_document_item(&cell.document))
            .collect()
        }),
        did_close: structure.did_close.as_ref().map(|cells| {
          cells
            .iter()
            .map(|cell| as_text_document_identifier(&cell.document))
            .collect()
        }),
      })
    },
    None => None,
  };

  Ok(protocol::NotebookCellsChange {
    structure,
    data: cells.data.as_deref().map(as_notebook_cells).transpose()?,
    text_content: cells
      .text_content
      .as_ref()
      .map(|events| events.iter().map(as_text_content_change).collect()),
  })
}

/// Empty parts of `event` are omitted from the result.
pub fn as_change_event(
  event: &NotebookChangeEvent,
) -> Result<protocol::NotebookDocumentChangeEvent, MetadataError> {
  let metadata = match &event.metadata {
    Some(metadata) => Some(to_lsp_object(metadata)?),
    None => None,
  };
  let cells = match &event.cells {
    Some(cells) => Some(as_cells_change(cells)?).filter(|cells| !cells.is_empty()),
    None => None,
  };
  Ok(protocol::NotebookDocumentChangeEvent { metadata, cells })
}
