use serde::{
  Deserialize,
  Serialize,
};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
  #[default]
  #[serde(rename = "2.0")]
  V2,
}

/// An outgoing JSON-RPC notification. Sync traffic never expects a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  #[serde(default)]
  pub jsonrpc: Version,
  pub method:  String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub params:  Option<Value>,
}

impl Notification {
  pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
    Self {
      jsonrpc: Version::V2,
      method: method.into(),
      params,
    }
  }

  /// Serializes `params` as the notification payload.
  pub fn with_params<P: Serialize>(
    method: impl Into<String>,
    params: &P,
  ) -> Result<Self, serde_json::Error> {
    Ok(Self::new(method, Some(serde_json::to_value(params)?)))
  }

  /// Decodes the payload back into a typed parameter struct.
  pub fn params_as<P: for<'de> Deserialize<'de>>(&self) -> Result<P, serde_json::Error> {
    serde_json::from_value(self.params.clone().unwrap_or(Value::Null))
  }
}
