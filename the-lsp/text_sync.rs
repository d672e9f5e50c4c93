use std::{
  collections::HashMap,
  sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use ropey::{
  Rope,
  RopeSlice,
};
use tracing::trace;
use url::Url;

use crate::{
  channel::{
    MessageChannel,
    notify,
  },
  convert,
  document::{
    TextDocument,
    TextDocumentChangeEvent,
    Workspace,
  },
  event::{
    EditorEvent,
    EventHub,
    Subscription,
  },
  filter::DocumentSelector,
  protocol::{
    self,
    DidChangeTextDocumentParams,
    DidCloseTextDocumentParams,
    DidOpenTextDocumentParams,
    Position,
    TextDocumentContentChangeEvent,
  },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextDocumentSyncKind {
  None,
  Full,
  #[default]
  Incremental,
}

pub fn char_idx_to_utf16_position(text: &Rope, pos: usize) -> Position {
  let pos = pos.min(text.len_chars());
  let line = text.char_to_line(pos);
  let line_start = text.line_to_char(line);
  let character = text
    .slice(line_start..pos)
    .chars()
    .map(|ch| ch.len_utf16() as u32)
    .sum::<u32>();

  Position {
    line: line as u32,
    character,
  }
}

fn traverse_utf16(pos: Position, text: RopeSlice<'_>) -> Position {
  let Position {
    mut line,
    mut character,
  } = pos;

  let mut chars = text.chars().peekable();
  while let Some(ch) = chars.next() {
    if ch == '\n' || ch == '\r' {
      if ch == '\r' && chars.peek() == Some(&'\n') {
        chars.next();
      }
      line += 1;
      character = 0;
    } else {
      character += ch.len_utf16() as u32;
    }
  }

  Position { line, character }
}

/// Incremental content changes for `event`, one per edit. Each range is
/// expressed against the text as left by the edits before it.
pub fn content_changes(event: &TextDocumentChangeEvent) -> Vec<TextDocumentContentChangeEvent> {
  let mut text = event.previous.clone();
  let mut changes = Vec::with_capacity(event.edits.len());

  for edit in &event.edits {
    let len = text.len_chars();
    let start = edit.range.start.min(len);
    let end = edit.range.end.clamp(start, len);

    let start_pos = char_idx_to_utf16_position(&text, start);
    let end_pos = traverse_utf16(start_pos, text.slice(start..end));
    changes.push(TextDocumentContentChangeEvent {
      range: Some(protocol::Range {
        start: start_pos,
        end:   end_pos,
      }),
      text:  edit.text.clone(),
    });

    text.remove(start..end);
    text.insert(start, &edit.text);
  }

  changes
}

pub fn did_open_params(document: &TextDocument) -> DidOpenTextDocumentParams {
  DidOpenTextDocumentParams {
    text_document: convert::as_text_document_item(document),
  }
}

pub fn did_change_params(
  event: &TextDocumentChangeEvent,
  sync_kind: TextDocumentSyncKind,
) -> Option<DidChangeTextDocumentParams> {
  let content_changes = match sync_kind {
    TextDocumentSyncKind::None => return None,
    TextDocumentSyncKind::Full => {
      vec![TextDocumentContentChangeEvent {
        range: None,
        text:  event.document.text.to_string(),
      }]
    },
    TextDocumentSyncKind::Incremental => content_changes(event),
  };

  if content_changes.is_empty() {
    return None;
  }

  Some(DidChangeTextDocumentParams {
    text_document: convert::as_versioned_text_document_identifier(&event.document),
    content_changes,
  })
}

pub fn did_close_params(document: &TextDocument) -> DidCloseTextDocumentParams {
  DidCloseTextDocumentParams {
    text_document: convert::as_text_document_identifier(document),
  }
}

/// Which documents a registration syncs, and how.
#[derive(Debug, Clone)]
pub struct TextSyncRegistration {
  pub document_selector: DocumentSelector,
  pub sync_kind:         TextDocumentSyncKind,
}

struct OpenDocument {
  /// Registration that opened the document.
  owner:    String,
  /// The document as it was when opened.
  document: TextDocument,
}

#[derive(Default)]
struct TextSyncState {
  registrations:  IndexMap<String, TextSyncRegistration>,
  open_documents: HashMap<Url, OpenDocument>,
}

impl TextSyncState {
  fn matching_registration(
    &self,
    document: &TextDocument,
    workspace: &dyn Workspace,
  ) -> Option<String> {
    let notebook = workspace
      .find_cell(&document.uri)
      .map(|(notebook, _)| notebook);
    self
      .registrations
      .iter()
      .find(|(_, registration)| {
        registration
          .document_selector
          .match_for_document_sync(document, notebook.as_ref())
      })
      .map(|(id, _)| id.clone())
  }
}

struct TextSyncShared {
  state:     Mutex<TextSyncState>,
  channel:   Arc<dyn MessageChannel>,
  workspace: Arc<dyn Workspace>,
}

/// Shared handle to the single-document sync registrations.
#[derive(Clone)]
pub struct TextSyncRegistry {
  shared: Arc<TextSyncShared>,
}

impl TextSyncRegistry {
  pub fn new(channel: Arc<dyn MessageChannel>, workspace: Arc<dyn Workspace>) -> Self {
    Self {
      shared: Arc::new(TextSyncShared {
        state: Mutex::new(TextSyncState::default()),
        channel,
        workspace,
      }),
    }
  }

  /// Adds a registration and opens the cell documents of already open
  /// notebooks that it matches.
  pub fn register(&self, id: impl Into<String>, registration: TextSyncRegistration) {
    let id = id.into();
    trace!(id = %id, "registering text document sync");
    self
      .shared
      .state
      .lock()
      .registrations
      .insert(id, registration);

    for notebook in self.shared.workspace.notebook_documents() {
      for cell in &notebook.cells {
        self.did_open(&cell.document);
      }
    }
  }

  /// Removes a registration. Documents it opened move to another matching
  /// registration, or are closed.
  pub fn unregister(&self, id: &str) {
    let mut closed = Vec::new();
    {
      let mut state = self.shared.state.lock();
      if state.registrations.shift_remove(id).is_none() {
        return;
      }
      let orphans: Vec<Url> = state
        .open_documents
        .iter()
        .filter(|(_, open)| open.owner == id)
        .map(|(uri, _)| uri.clone())
        .collect();
      for uri in orphans {
        let Some(open) = state.open_documents.remove(&uri) else {
          continue;
        };
        match state.matching_registration(&open.document, &*self.shared.workspace) {
          Some(owner) => {
            state.open_documents.insert(uri, OpenDocument { owner, ..open });
          },
          None => closed.push(open.document),
        }
      }
    }

    for document in closed {
      notify(
        &*self.shared.channel,
        protocol::DID_CLOSE_TEXT_DOCUMENT,
        &did_close_params(&document),
      );
    }
  }

  pub fn is_registered(&self, id: &str) -> bool {
    self.shared.state.lock().registrations.contains_key(id)
  }

  pub fn is_open(&self, uri: &Url) -> bool {
    self.shared.state.lock().open_documents.contains_key(uri)
  }

  /// Sends `textDocument/didOpen` if a registration matches and the document
  /// is not open yet. Returns whether a notification was sent.
  pub fn did_open(&self, document: &TextDocument) -> bool {
    {
      let mut state = self.shared.state.lock();
      if state.open_documents.contains_key(&document.uri) {
        return false;
      }
      let Some(owner) = state.matching_registration(document, &*self.shared.workspace) else {
        return false;
      };
      state.open_documents.insert(
        document.uri.clone(),
        OpenDocument {
          owner,
          document: document.clone(),
        },
      );
    }

    notify(
      &*self.shared.channel,
      protocol::DID_OPEN_TEXT_DOCUMENT,
      &did_open_params(document),
    );
    true
  }

  /// Sends `textDocument/didChange` for an open document.
  pub fn did_change(&self, event: &TextDocumentChangeEvent) -> bool {
    let sync_kind = {
      let state = self.shared.state.lock();
      let Some(open) = state.open_documents.get(&event.document.uri) else {
        return false;
      };
      match state.registrations.get(&open.owner) {
        Some(registration) => registration.sync_kind,
        None => return false,
      }
    };

    let Some(params) = did_change_params(event, sync_kind) else {
      return false;
    };
    notify(
      &*self.shared.channel,
      protocol::DID_CHANGE_TEXT_DOCUMENT,
      &params,
    );
    true
  }

  /// Sends `textDocument/didClose` for an open document.
  pub fn did_close(&self, document: &TextDocument) -> bool {
    if self
      .shared
      .state
      .lock()
      .open_documents
      .remove(&document.uri)
      .is_none()
    {
      return false;
    }

    notify(
      &*self.shared.channel,
      protocol::DID_CLOSE_TEXT_DOCUMENT,
      &did_close_params(document),
    );
    true
  }
}

/// Mirrors text document open, change and close events to the server for
/// every document some registration matches.
pub struct TextDocumentSyncFeature {
  registry:       TextSyncRegistry,
  _subscriptions: Vec<Subscription>,
}

impl TextDocumentSyncFeature {
  pub fn new(
    events: &EventHub,
    channel: Arc<dyn MessageChannel>,
    workspace: Arc<dyn Workspace>,
  ) -> Self {
    let registry = TextSyncRegistry::new(channel, workspace);
    let listener = registry.clone();
    let subscription = events.subscribe(move |event| {
      match event {
        EditorEvent::TextDocumentOpened(document) => {
          listener.did_open(document);
        },
        EditorEvent::TextDocumentChanged(change) => {
          listener.did_change(change);
        },
        EditorEvent::TextDocumentClosed(document) => {
          listener.did_close(document);
        },
        _ => {},
      }
    });

    Self {
      registry,
      _subscriptions: vec![subscription],
    }
  }

  pub fn registry(&self) -> &TextSyncRegistry {
    &self.registry
  }
}
