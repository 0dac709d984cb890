//! The legacy `--combined-json` output document.
//!
//! Compilers below 0.8 embed ABIs and documentation as JSON-encoded
//! strings; the deserializer unwraps those so callers always see the
//! decoded values.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CombinedJson {
    #[serde(default)]
    pub contracts: BTreeMap<String, CombinedContract>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, CombinedSource>,
    #[serde(default, rename = "sourceList", skip_serializing_if = "Vec::is_empty")]
    pub source_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CombinedContract {
    #[serde(default, deserialize_with = "embedded_json")]
    pub abi: Option<Value>,
    #[serde(default)]
    pub bin: String,
    #[serde(default, rename = "bin-runtime")]
    pub bin_runtime: String,
    #[serde(default)]
    pub srcmap: String,
    #[serde(default, rename = "srcmap-runtime")]
    pub srcmap_runtime: String,
    #[serde(default, deserialize_with = "embedded_json")]
    pub userdoc: Option<Value>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub devdoc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CombinedSource {
    #[serde(default, rename = "AST", skip_serializing_if = "Option::is_none")]
    pub ast: Option<Value>,
}

/// `"[{...}]"` and `[{...}]` both decode to the inner value.
fn embedded_json<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match &v {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or(v),
        _ => v,
    }))
}

/// Splits a `path:Contract` combined-json key. Old compilers omit the
/// path entirely.
pub fn split_path_and_name(key: &str) -> (Option<&str>, &str) {
    match key.rsplit_once(':') {
        Some((path, name)) => (Some(path), name),
        None => (None, key),
    }
}
