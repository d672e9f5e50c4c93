use std::sync::Arc;

use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

use crate::{
  filter::CellFilter,
  middleware::NotebookMiddleware,
};

pub const DEFAULT_CELL_SCHEME: &str = "vscode-notebook-cell";

/// Config for notebook document sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct NotebookSyncConfig {
  /// URI scheme of cell content documents.
  pub cell_scheme:                 String,
  pub dynamic_registration:        bool,
  pub execution_summary_support:   bool,
  pub notebook_controller_support: bool,
}

impl Default for NotebookSyncConfig {
  fn default() -> Self {
    Self {
      cell_scheme:                 DEFAULT_CELL_SCHEME.to_string(),
      dynamic_registration:        true,
      execution_summary_support:   true,
      notebook_controller_support: true,
    }
  }
}

impl NotebookSyncConfig {
  pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(source)?)
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid notebook sync config: {0}")]
  Toml(#[from] toml::de::Error),
}

/// Host hooks for notebook sync.
#[derive(Clone, Default)]
pub struct NotebookDocumentOptions {
  /// Narrows the cells selected for a notebook, after language filtering.
  pub filter_cells: Option<CellFilter>,
  pub middleware:   Option<Arc<dyn NotebookMiddleware>>,
}
