//! Truffle-style export: one artifact file per contract.

use crate::errors::Result;
use crate::project::Project;
use serde_json::json;
use std::path::{Path, PathBuf};

pub(super) fn export(project: &Project, export_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for unit in project.units.values() {
        for source_unit in unit.source_units.values() {
            for (name, artifact) in &source_unit.contracts {
                let document = json!({
                    "contractName": name,
                    "abi": artifact.abi,
                    "bytecode": format!("0x{}", artifact.bytecode_init),
                    "deployedBytecode": format!("0x{}", artifact.bytecode_runtime),
                    "sourceMap": artifact.srcmap_init.join(";"),
                    "deployedSourceMap": artifact.srcmap_runtime.join(";"),
                    "sourcePath": source_unit.filename.absolute,
                    "ast": source_unit.ast,
                    "userdoc": artifact.natspec.userdoc,
                    "devdoc": artifact.natspec.devdoc,
                    "compiler": {
                        "name": unit.compiler.compiler,
                        "version": unit.compiler.version,
                    },
                });
                let path = export_dir.join(format!("{name}.json"));
                std::fs::write(&path, serde_json::to_vec(&document)?)?;
                written.push(path);
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerDescriptor;
    use crate::filename::NormalizeHints;
    use crate::unit::{CompilationUnit, ContractArtifact};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[test]
    fn writes_one_file_per_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::for_tests(dir.path());
        let mut unit = CompilationUnit::new("u");
        unit.compiler = CompilerDescriptor::new("solc", "0.8.19");
        let filename = project.index().intern("pair.sol", &NormalizeHints::default());
        let source = unit.source_unit_mut(filename);
        for name in ["Token", "Pair"] {
            source.contracts.insert(
                name.to_string(),
                ContractArtifact {
                    abi: json!([]),
                    bytecode_init: "6001".into(),
                    ..Default::default()
                },
            );
        }
        project.add_unit(unit);

        let mut files = export(&project, dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("Pair.json"));

        let document: Value =
            serde_json::from_str(&std::fs::read_to_string(&files[1]).unwrap()).unwrap();
        assert_eq!(document["contractName"], "Token");
        assert_eq!(document["bytecode"], "0x6001");
        assert_eq!(document["compiler"]["version"], "0.8.19");
    }
}
