//! Notebook sync fragments of the initialize handshake.

use serde_json::{
  Map,
  Value,
};

use crate::config::NotebookSyncConfig;

pub const NOTEBOOK_DOCUMENT_SYNC: &str = "notebookDocumentSync";

/// The server's notebook sync options, if it declared any.
pub fn notebook_document_sync(server_capabilities: &Value) -> Option<&Value> {
  capability_present(server_capabilities, NOTEBOOK_DOCUMENT_SYNC)
    .then(|| server_capabilities.get(NOTEBOOK_DOCUMENT_SYNC))
    .flatten()
}

/// Writes `notebookDocument.synchronization` into the client capabilities,
/// creating intermediate objects as needed.
pub fn fill_client_capabilities(capabilities: &mut Value, config: &NotebookSyncConfig) {
  let notebook_document = ensure_object(capabilities, "notebookDocument");
  let synchronization = ensure_object(notebook_document, "synchronization");
  synchronization["dynamicRegistration"] = Value::Bool(config.dynamic_registration);
  synchronization["executionSummarySupport"] = Value::Bool(config.execution_summary_support);
  synchronization["notebookControllerSupport"] = Value::Bool(config.notebook_controller_support);
}

fn ensure_object<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
  if !value.is_object() {
    *value = Value::Object(Map::new());
  }
  let child = &mut value[key];
  if !child.is_object() {
    *child = Value::Object(Map::new());
  }
  child
}

fn capability_present(raw: &Value, key: &str) -> bool {
  match raw.get(key) {
    Some(Value::Bool(enabled)) => *enabled,
    Some(Value::Null) | None => false,
    Some(_) => true,
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn fills_synchronization_without_clobbering_siblings() {
    let mut capabilities = json!({ "notebookDocument": { "other": 1 }, "textDocument": {} });
    let config = NotebookSyncConfig {
      notebook_controller_support: false,
      ..NotebookSyncConfig::default()
    };
    fill_client_capabilities(&mut capabilities, &config);
    assert_eq!(
      capabilities,
      json!({
        "notebookDocument": {
          "other": 1,
          "synchronization": {
            "dynamicRegistration": true,
            "executionSummarySupport": true,
            "notebookControllerSupport": false
          }
        },
        "textDocument": {}
      })
    );
  }

  #[test]
  fn absent_or_disabled_sync_is_none() {
    assert!(notebook_document_sync(&json!({})).is_none());
    assert!(notebook_document_sync(&json!({ "notebookDocumentSync": null })).is_none());
    assert!(notebook_document_sync(&json!({ "notebookDocumentSync": false })).is_none());
    assert!(
      notebook_document_sync(&json!({ "notebookDocumentSync": { "notebookDocumentSelector": [] } }))
        .is_some()
    );
  }
}
