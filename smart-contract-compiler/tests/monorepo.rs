//! Parent directories holding several framework roots compile into one
//! project; artifacts are re-read in place (`ignore_compile`) so no
//! framework binaries are needed.

use smart_contract_compiler::errors::Error;
use smart_contract_compiler::{CompileConfig, Project};
use std::path::Path;

fn hardhat_root(parent: &Path, name: &str, file: &str, contract: &str, abi: serde_json::Value) {
    let root = parent.join(name);
    let build_info = root.join("artifacts/build-info");
    std::fs::create_dir_all(&build_info).unwrap();
    std::fs::write(root.join("hardhat.config.js"), "module.exports = {};").unwrap();

    let mut contracts = serde_json::Map::new();
    let mut inner = serde_json::Map::new();
    inner.insert(
        contract.to_string(),
        serde_json::json!({
            "abi": abi,
            "evm": {
                "bytecode": {"object": "6001", "sourceMap": "0:1:0"},
                "deployedBytecode": {"object": "6002", "sourceMap": "0:1:0"}
            }
        }),
    );
    contracts.insert(file.to_string(), serde_json::Value::Object(inner));

    let mut sources = serde_json::Map::new();
    sources.insert(
        file.to_string(),
        serde_json::json!({"id": 0, "ast": {"nodeType": "SourceUnit", "nodes": []}}),
    );

    let document = serde_json::json!({
        "_format": "hh-sol-build-info-1",
        "solcVersion": "0.8.19",
        "input": {
            "language": "Solidity",
            "settings": {"optimizer": {"enabled": false, "runs": 200}}
        },
        "output": {"contracts": contracts, "sources": sources}
    });
    std::fs::write(build_info.join(format!("{name}.json")), document.to_string()).unwrap();
}

#[tokio::test]
async fn two_hardhat_roots_merge_into_one_project() {
    let parent = tempfile::tempdir().unwrap();
    hardhat_root(
        parent.path(),
        "core",
        "contracts/Token.sol",
        "Token",
        serde_json::json!([{"type": "function", "name": "ping", "inputs": []}]),
    );
    hardhat_root(
        parent.path(),
        "periphery",
        "contracts/Router.sol",
        "Router",
        serde_json::json!([{"type": "function", "name": "route", "inputs": []}]),
    );

    let config = CompileConfig {
        ignore_compile: true,
        ..Default::default()
    };
    let project = Project::compile(&parent.path().to_string_lossy(), &config)
        .await
        .unwrap();

    assert_eq!(project.platform(), "monorepo");
    assert_eq!(project.units.len(), 2);
    assert_eq!(project.contract_names(), vec!["Router", "Token"]);
    for name in project.contract_names() {
        assert!(!project.is_in_multiple_units(&name));
    }
}

#[tokio::test]
async fn conflicting_contract_definitions_are_ambiguous() {
    let parent = tempfile::tempdir().unwrap();
    // Both roots reference the same shared path but report different
    // ABIs for the contract in it. The path never hits the disk; the
    // identity still collapses to one absolute path.
    let shared = parent.path().join("shared/Token.sol").display().to_string();
    hardhat_root(
        parent.path(),
        "core",
        &shared,
        "Token",
        serde_json::json!([{"type": "function", "name": "a", "inputs": []}]),
    );
    hardhat_root(
        parent.path(),
        "periphery",
        &shared,
        "Token",
        serde_json::json!([{"type": "function", "name": "b", "inputs": []}]),
    );

    let config = CompileConfig {
        ignore_compile: true,
        ..Default::default()
    };
    let err = Project::compile(&parent.path().to_string_lossy(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ContractAmbiguous { contract, .. } if contract == "Token"));
}

#[tokio::test]
async fn directory_without_any_marker_is_not_a_monorepo() {
    let parent = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(parent.path().join("docs")).unwrap();
    let err = Project::compile(
        &parent.path().to_string_lossy(),
        &CompileConfig::default(),
    )
    .await
    .unwrap_err();
    // No framework, no sources: nothing to dispatch to.
    assert!(matches!(err, Error::NoPlatformDetected(_) | Error::InvalidTarget(_)));
}
