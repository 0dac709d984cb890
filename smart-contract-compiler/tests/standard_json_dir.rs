//! Directory compilation through standard-json, driven by a
//! `crytic_compile.config.json` as the verification fetchers leave
//! behind. The compiler input must carry the materialized settings.

use smart_contract_compiler::{CompileConfig, Project};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const OUTPUT: &str = r#"{
    "sources": {"contracts/Box.sol": {"id": 0, "ast": {"nodeType": "SourceUnit", "nodes": [
        {"nodeType": "ContractDefinition", "id": 1, "name": "Box", "contractKind": "contract", "contractDependencies": []}
    ]}}},
    "contracts": {
        "contracts/Box.sol": {
            "Box": {
                "abi": [{"inputs": [], "name": "value", "outputs": [{"type": "uint256"}], "stateMutability": "view", "type": "function"}],
                "evm": {
                    "bytecode": {"object": "6080600a", "sourceMap": "0:4:0"},
                    "deployedBytecode": {"object": "6080600b", "sourceMap": "0:4:0"},
                    "methodIdentifiers": {"value()": "3fa4f245"}
                }
            }
        }
    }
}"#;

/// Captures the standard-json input it receives, then answers with the
/// canned output.
fn capturing_solc(dir: &Path, capture: &Path) -> std::path::PathBuf {
    let output_fixture = dir.join("output.json");
    std::fs::write(&output_fixture, OUTPUT).unwrap();
    let binary = dir.join("solc");
    std::fs::write(
        &binary,
        format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 'Version: 0.8.21+commit.d9974bed'; exit 0; fi\ncat > '{}'\ncat '{}'\n",
            capture.display(),
            output_fixture.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
    binary
}

#[tokio::test]
async fn materialized_config_settings_reach_the_compiler() {
    let scratch = tempfile::tempdir().unwrap();
    let project_dir = scratch.path().join("mainet-0xabc-Box");
    std::fs::create_dir_all(project_dir.join("contracts")).unwrap();
    std::fs::write(
        project_dir.join("contracts/Box.sol"),
        "contract Box { uint256 public value; }",
    )
    .unwrap();
    std::fs::write(
        project_dir.join("crytic_compile.config.json"),
        serde_json::json!({
            "solc_settings": {
                "viaIR": true,
                "evmVersion": "paris",
                "optimizer": {"enabled": true, "runs": 800}
            }
        })
        .to_string(),
    )
    .unwrap();

    let capture = scratch.path().join("captured-input.json");
    let config = CompileConfig {
        solc: Some(capturing_solc(scratch.path(), &capture)),
        ..Default::default()
    };

    let project = Project::compile(&project_dir.to_string_lossy(), &config)
        .await
        .unwrap();

    assert_eq!(project.platform(), "solc-standard-json");
    let unit = project.units.values().next().unwrap();
    assert!(unit.compiler.via_ir);
    assert_eq!(unit.compiler.evm_version.as_deref(), Some("paris"));
    assert_eq!(unit.compiler.optimize_runs, Some(800));

    let (_, artifact) = unit.find_contract("Box").unwrap();
    assert_eq!(artifact.hashes.get("value()").unwrap(), "3fa4f245");

    // What the compiler actually saw.
    let seen: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&capture).unwrap()).unwrap();
    assert_eq!(seen["language"], "Solidity");
    assert_eq!(seen["settings"]["viaIR"], true);
    assert_eq!(seen["settings"]["optimizer"]["runs"], 800);
    assert!(seen["sources"]["contracts/Box.sol"]["content"]
        .as_str()
        .unwrap()
        .contains("contract Box"));
}
