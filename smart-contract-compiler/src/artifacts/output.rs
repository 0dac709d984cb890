//! The `--standard-json` output document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StandardJsonOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<OutputError>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceOutput>,
    #[serde(default)]
    pub contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
}

impl StandardJsonOutput {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(OutputError::is_error)
    }

    /// Formatted diagnostics, errors only.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter(|e| e.is_error())
            .map(OutputError::message)
            .collect()
    }

    /// Formatted diagnostics classified as warnings.
    pub fn warning_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter(|e| !e.is_error())
            .map(OutputError::message)
            .collect()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputError {
    #[serde(default)]
    pub severity: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
}

impl OutputError {
    pub fn is_error(&self) -> bool {
        self.severity != "warning" && self.severity != "info"
    }

    pub fn message(&self) -> String {
        self.formatted_message
            .clone()
            .unwrap_or_else(|| format!("{}: {}", self.kind, self.message))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContractOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userdoc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devdoc: Option<Value>,
    /// JSON-escaped string in the compiler output; kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm: Option<Evm>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<Bytecode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_bytecode: Option<Bytecode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_identifiers: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bytecode {
    #[serde(default)]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
    /// `file -> library -> byte offsets` of unlinked placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_references: Option<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl Bytecode {
    /// Library names referenced by unlinked placeholders.
    pub fn referenced_libraries(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .link_references
            .iter()
            .flat_map(|files| files.values())
            .flat_map(|libs| libs.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OUTPUT: &str = r#"{
        "errors": [
            {"severity": "warning", "type": "Warning", "message": "unused variable"},
            {"severity": "error", "type": "ParserError", "message": "expected ;",
             "formattedMessage": "ParserError: expected ; at a.sol:1"}
        ],
        "sources": {"a.sol": {"id": 0, "ast": {"nodeType": "SourceUnit"}}},
        "contracts": {
            "a.sol": {
                "A": {
                    "abi": [],
                    "evm": {
                        "bytecode": {
                            "object": "6080",
                            "sourceMap": "0:10:0",
                            "linkReferences": {"lib.sol": {"MathLib": [{"start": 1, "length": 20}]}}
                        },
                        "deployedBytecode": {"object": "6080", "sourceMap": "0:10:0"},
                        "methodIdentifiers": {"get()": "6d4ce63c"}
                    }
                }
            }
        }
    }"#;

    #[test]
    fn classifies_errors_and_warnings() {
        let output: StandardJsonOutput = serde_json::from_str(OUTPUT).unwrap();
        assert!(output.has_errors());
        assert_eq!(output.error_messages(), vec!["ParserError: expected ; at a.sol:1"]);
        assert_eq!(output.warning_messages(), vec!["Warning: unused variable"]);
    }

    #[test]
    fn exposes_link_references() {
        let output: StandardJsonOutput = serde_json::from_str(OUTPUT).unwrap();
        let contract = &output.contracts["a.sol"]["A"];
        let bytecode = contract.evm.as_ref().unwrap().bytecode.as_ref().unwrap();
        assert_eq!(bytecode.referenced_libraries(), vec!["MathLib"]);
        assert_eq!(bytecode.source_map.as_deref(), Some("0:10:0"));
    }
}
