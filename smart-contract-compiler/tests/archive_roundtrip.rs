//! Export-then-reimport: the rehydrated model matches the original on
//! compiler descriptor, source units, contracts, ABIs, bytecodes and
//! source maps.

use smart_contract_compiler::export::{self, ExportFormat};
use smart_contract_compiler::{CompileConfig, Project};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn fake_solc(dir: &Path, combined_json: String) -> PathBuf {
    let fixture = dir.join("combined.json");
    std::fs::write(&fixture, combined_json).unwrap();
    let binary = dir.join("solc");
    std::fs::write(
        &binary,
        format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 'Version: 0.8.19+commit.7dd6d404'; exit 0; fi\ncat '{}'\n",
            fixture.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
    binary
}

fn two_file_combined_json(first: &Path, second: &Path) -> String {
    let mut contracts = serde_json::Map::new();
    for (path, name, bin) in [
        (first, "Token", "6001600155"),
        (second, "Vault", "6002600255"),
    ] {
        contracts.insert(
            format!("{}:{name}", path.display()),
            serde_json::json!({
                "abi": [{"inputs": [], "name": "ping", "outputs": [], "stateMutability": "view", "type": "function"}],
                "bin": bin,
                "bin-runtime": bin,
                "srcmap": "0:5:0:-:0;;",
                "srcmap-runtime": "0:5:0:-:0",
                "userdoc": {"methods": {}},
                "devdoc": {"methods": {}}
            }),
        );
    }
    let mut sources = serde_json::Map::new();
    for path in [first, second] {
        sources.insert(
            path.display().to_string(),
            serde_json::json!({"AST": {"nodeType": "SourceUnit", "nodes": []}}),
        );
    }
    serde_json::json!({
        "contracts": contracts,
        "sources": sources,
        "version": "0.8.19+commit.7dd6d404"
    })
    .to_string()
}

#[tokio::test]
async fn archive_round_trip_preserves_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("Token.sol");
    let second = dir.path().join("Vault.sol");
    std::fs::write(&first, "contract Token {}").unwrap();
    std::fs::write(&second, "contract Vault {}").unwrap();

    let config = CompileConfig {
        solc: Some(fake_solc(dir.path(), two_file_combined_json(&first, &second))),
        ..Default::default()
    };
    let original = Project::compile(&first.to_string_lossy(), &config)
        .await
        .unwrap();

    let export_dir = dir.path().join("crytic-export");
    let files = export::export(&original, ExportFormat::Archive, &export_dir).unwrap();
    assert!(files[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_export_archive.json"));

    let reimported = Project::compile(&files[0].to_string_lossy(), &CompileConfig::default())
        .await
        .unwrap();
    assert_eq!(reimported.platform(), "Archive");

    assert_eq!(original.units.len(), reimported.units.len());
    for (unit_id, unit) in &original.units {
        let restored = reimported.units.get(unit_id).expect("unit id survived");
        assert_eq!(unit.compiler, restored.compiler);
        assert_eq!(unit.contract_names(), restored.contract_names());
        for name in unit.contract_names() {
            let (source, contract) = unit.find_contract(&name).unwrap();
            let (restored_source, restored_contract) = restored.find_contract(&name).unwrap();
            assert_eq!(source.filename, restored_source.filename);
            assert_eq!(contract.abi, restored_contract.abi);
            assert_eq!(contract.bytecode_init, restored_contract.bytecode_init);
            assert_eq!(contract.bytecode_runtime, restored_contract.bytecode_runtime);
            assert_eq!(contract.srcmap_init, restored_contract.srcmap_init);
            assert_eq!(contract.srcmap_runtime, restored_contract.srcmap_runtime);
        }
    }

    // The archive carried the source text of both files.
    assert_eq!(reimported.archived_sources.len(), 2);
}
