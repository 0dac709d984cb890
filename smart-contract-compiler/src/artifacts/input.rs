//! The `--standard-json` input document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardJsonInput {
    pub language: String,
    #[serde(default)]
    pub sources: BTreeMap<String, Source>,
    #[serde(default)]
    pub settings: Settings,
}

impl StandardJsonInput {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            sources: BTreeMap::new(),
            settings: Settings::default(),
        }
    }

    /// Adds a source by path reference; the compiler reads the file
    /// itself (requires an allow-path covering it).
    pub fn add_source_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.sources.insert(
            path.clone(),
            Source {
                content: None,
                urls: Some(vec![path]),
            },
        );
    }

    pub fn add_source_content(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.sources.insert(
            path.into(),
            Source {
                content: Some(content.into()),
                urls: None,
            },
        );
    }

    pub fn add_remapping(&mut self, remapping: impl Into<String>) {
        self.settings.remappings.push(remapping.into());
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remappings: Vec<String>,
    #[serde(default)]
    pub optimizer: Optimizer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
    #[serde(rename = "viaIR", default, skip_serializing_if = "Option::is_none")]
    pub via_ir: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libraries: Option<BTreeMap<String, BTreeMap<String, String>>>,
    #[serde(default = "default_output_selection")]
    pub output_selection: Value,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remappings: Vec::new(),
            optimizer: Optimizer::default(),
            evm_version: None,
            via_ir: None,
            libraries: None,
            output_selection: default_output_selection(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Optimizer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<u32>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            enabled: Some(false),
            runs: None,
        }
    }
}

/// The outputs every compilation unit needs for the canonical model.
pub fn default_output_selection() -> Value {
    json!({
        "*": {
            "*": [
                "abi",
                "metadata",
                "devdoc",
                "userdoc",
                "evm.bytecode",
                "evm.deployedBytecode",
                "evm.methodIdentifiers",
            ],
            "": ["ast"],
        }
    })
}
