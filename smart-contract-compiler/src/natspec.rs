//! NatSpec documentation handling.
//!
//! The compiler emits two parallel JSON documents per contract: the
//! user-facing one and the developer-facing one. Both are kept verbatim
//! (unknown keys included, for forward compatibility) and folded into a
//! single per-contract record indexed by function selector.

use crate::hash::selector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key under which free-standing contract-level documentation is folded.
pub const CONTRACT_DOC_KEY: &str = "contract";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, UserMethod>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Constructors are emitted as a bare string by some compiler versions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserMethod {
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notice: Option<String>,
        #[serde(flatten)]
        extra: BTreeMap<String, Value>,
    },
    Bare(String),
}

impl UserMethod {
    pub fn notice(&self) -> Option<&str> {
        match self {
            UserMethod::Detailed { notice, .. } => notice.as_deref(),
            UserMethod::Bare(notice) => Some(notice),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DevDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, DevMethod>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DevMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub returns: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DevMethod {
    /// Older compilers emit a singular `return` string instead of the
    /// `returns` map.
    pub fn all_returns(&self) -> BTreeMap<String, String> {
        let mut returns = self.returns.clone();
        if let Some(Value::String(single)) = self.extra.get("return") {
            returns.entry("_0".to_string()).or_insert_with(|| single.clone());
        }
        returns
    }
}

/// Per-contract documentation pair, as stored in the canonical model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Natspec {
    #[serde(default)]
    pub userdoc: UserDoc,
    #[serde(default)]
    pub devdoc: DevDoc,
}

impl Natspec {
    pub fn new(userdoc: Value, devdoc: Value) -> Self {
        Self {
            userdoc: serde_json::from_value(userdoc).unwrap_or_default(),
            devdoc: serde_json::from_value(devdoc).unwrap_or_default(),
        }
    }

    /// Folds both documents into one record keyed by 4-byte selector hex,
    /// with contract-level documentation under [`CONTRACT_DOC_KEY`].
    pub fn fold(&self) -> BTreeMap<String, MethodDoc> {
        let mut folded: BTreeMap<String, MethodDoc> = BTreeMap::new();

        for (signature, method) in &self.userdoc.methods {
            let entry = folded.entry(doc_key(signature)).or_default();
            entry.signature = Some(signature.clone());
            entry.notice = method.notice().map(str::to_string);
        }
        for (signature, method) in &self.devdoc.methods {
            let entry = folded.entry(doc_key(signature)).or_default();
            entry.signature = Some(signature.clone());
            entry.details = method.details.clone();
            entry.params = method.params.clone();
            entry.returns = method.all_returns();
        }

        if self.userdoc.notice.is_some()
            || self.devdoc.details.is_some()
            || self.devdoc.title.is_some()
            || self.devdoc.author.is_some()
        {
            let entry = folded.entry(CONTRACT_DOC_KEY.to_string()).or_default();
            entry.notice = self.userdoc.notice.clone();
            entry.details = self.devdoc.details.clone();
            entry.title = self.devdoc.title.clone();
            entry.author = self.devdoc.author.clone();
        }

        folded
    }
}

/// One folded documentation entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub returns: BTreeMap<String, String>,
}

/// `constructor` and other non-function entries have no selector; they
/// keep their signature as the key.
fn doc_key(signature: &str) -> String {
    if signature.contains('(') {
        selector(signature)
    } else {
        signature.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn folds_user_and_dev_docs_by_selector() {
        let natspec = Natspec::new(
            json!({
                "notice": "A simple storage slot",
                "methods": {
                    "set(uint256)": {"notice": "Stores a value"}
                }
            }),
            json!({
                "title": "Storage",
                "author": "example",
                "methods": {
                    "set(uint256)": {
                        "details": "Overwrites the slot",
                        "params": {"x": "value to store"}
                    }
                }
            }),
        );

        let folded = natspec.fold();
        let entry = folded.get("60fe47b1").expect("selector entry missing");
        assert_eq!(entry.signature.as_deref(), Some("set(uint256)"));
        assert_eq!(entry.notice.as_deref(), Some("Stores a value"));
        assert_eq!(entry.details.as_deref(), Some("Overwrites the slot"));
        assert_eq!(entry.params.get("x").unwrap(), "value to store");

        let contract = folded.get(CONTRACT_DOC_KEY).expect("contract entry missing");
        assert_eq!(contract.notice.as_deref(), Some("A simple storage slot"));
        assert_eq!(contract.title.as_deref(), Some("Storage"));
    }

    #[test]
    fn retains_unknown_keys() {
        let userdoc: UserDoc = serde_json::from_value(json!({
            "notice": "n",
            "version": 1,
            "kind": "user"
        }))
        .unwrap();
        assert_eq!(userdoc.extra.get("kind").unwrap(), "user");

        let round_tripped = serde_json::to_value(&userdoc).unwrap();
        assert_eq!(round_tripped.get("version").unwrap(), 1);
    }

    #[test]
    fn constructor_docs_accept_bare_strings() {
        let natspec = Natspec::new(
            json!({"methods": {"constructor": "Builds the thing"}}),
            json!({}),
        );
        let folded = natspec.fold();
        let entry = folded.get("constructor").unwrap();
        assert_eq!(entry.notice.as_deref(), Some("Builds the thing"));
    }

    #[test]
    fn singular_return_is_promoted() {
        let method: DevMethod = serde_json::from_value(json!({
            "details": "d",
            "return": "the stored value"
        }))
        .unwrap();
        assert_eq!(method.all_returns().get("_0").unwrap(), "the stored value");
    }

    #[test]
    fn missing_documents_default_to_empty() {
        let natspec = Natspec::new(Value::Null, Value::Null);
        assert_eq!(natspec, Natspec::default());
        assert!(natspec.fold().is_empty());
    }
}
