use std::sync::{
  Arc,
  Weak,
};

use parking_lot::Mutex;

use crate::document::{
  CellExecutionState,
  NotebookCell,
  NotebookDocument,
  TextDocument,
  TextDocumentChangeEvent,
};

/// Editor events the sync engine observes. Notebook payloads are snapshots
/// taken after the change happened.
#[derive(Debug, Clone)]
pub enum EditorEvent {
  NotebookOpened(NotebookDocument),
  NotebookClosed(NotebookDocument),
  NotebookSaved(NotebookDocument),
  NotebookMetadataChanged(NotebookDocument),
  /// Cells were added, removed or reordered.
  NotebookCellsChanged(NotebookDocument),
  CellMetadataChanged {
    notebook: NotebookDocument,
    cell:     NotebookCell,
  },
  CellExecutionStateChanged {
    notebook: NotebookDocument,
    cell:     NotebookCell,
    state:    CellExecutionState,
  },
  TextDocumentOpened(TextDocument),
  TextDocumentChanged(TextDocumentChangeEvent),
  TextDocumentClosed(TextDocument),
}

type Listener = Arc<dyn Fn(&EditorEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
  next_id: u64,
  entries: Vec<(u64, Listener)>,
}

/// Delivers editor events to subscribed listeners, in subscription order.
#[derive(Clone, Default)]
pub struct EventHub {
  listeners: Arc<Mutex<Listeners>>,
}

impl EventHub {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self, listener: impl Fn(&EditorEvent) + Send + Sync + 'static) -> Subscription {
    let mut listeners = self.listeners.lock();
    let id = listeners.next_id;
    listeners.next_id += 1;
    listeners.entries.push((id, Arc::new(listener)));
    Subscription {
      listeners: Arc::downgrade(&self.listeners),
      id,
    }
  }

  pub fn emit(&self, event: &EditorEvent) {
    // Listeners may subscribe or dispose while handling the event.
    let listeners: Vec<Listener> = self
      .listeners
      .lock()
      .entries
      .iter()
      .map(|(_, listener)| listener.clone())
      .collect();
    for listener in listeners {
      listener(event);
    }
  }

  pub fn listener_count(&self) -> usize {
    self.listeners.lock().entries.len()
  }
}

/// A listener registration. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes it"]
pub struct Subscription {
  listeners: Weak<Mutex<Listeners>>,
  id:        u64,
}

impl Subscription {
  pub fn dispose(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(listeners) = self.listeners.upgrade() {
      listeners.lock().entries.retain(|(id, _)| *id != self.id);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{
    AtomicUsize,
    Ordering,
  };

  use url::Url;

  use super::*;

  fn event() -> EditorEvent {
    EditorEvent::TextDocumentOpened(TextDocument::new(
      Url::parse("file:///a.py").expect("valid uri"),
      "python",
      1,
      "",
    ))
  }

  #[test]
  fn dropping_a_subscription_unsubscribes() {
    let hub = EventHub::new();
    let count = Arc::new(AtomicUsize::new(0));

    let counter = count.clone();
    let subscription = hub.subscribe(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    hub.emit(&event());
    assert_eq!(hub.listener_count(), 1);

    subscription.dispose();
    hub.emit(&event());
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(hub.listener_count(), 0);
  }

  #[test]
  fn subscription_outliving_hub_is_harmless() {
    let hub = EventHub::new();
    let subscription = hub.subscribe(|_| {});
    drop(hub);
    drop(subscription);
  }
}
