//! Legacy combined-json export (`combined_solc.json`).

use crate::errors::Result;
use crate::project::Project;
use crate::unit::CompilationUnit;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub(super) fn export(project: &Project, export_dir: &Path) -> Result<Vec<PathBuf>> {
    if project.units.len() == 1 {
        let unit = project.units.values().next().expect("one unit");
        return Ok(vec![write_unit(unit, "combined_solc", export_dir)?]);
    }
    let mut written = Vec::new();
    for (unit_id, unit) in &project.units {
        written.push(write_unit(unit, unit_id, export_dir)?);
    }
    Ok(written)
}

fn write_unit(unit: &CompilationUnit, stem: &str, export_dir: &Path) -> Result<PathBuf> {
    let mut contracts = serde_json::Map::new();
    for source_unit in unit.source_units.values() {
        let absolute = source_unit.filename.absolute.to_string_lossy();
        for (name, artifact) in &source_unit.contracts {
            contracts.insert(
                format!("{absolute}:{name}"),
                json!({
                    "abi": serde_json::to_string(&artifact.abi)?,
                    "bin": artifact.bytecode_init,
                    "bin-runtime": artifact.bytecode_runtime,
                    "srcmap": artifact.srcmap_init.join(";"),
                    "srcmap-runtime": artifact.srcmap_runtime.join(";"),
                    "userdoc": serde_json::to_value(&artifact.natspec.userdoc)?,
                    "devdoc": serde_json::to_value(&artifact.natspec.devdoc)?,
                    "hashes": artifact.hashes,
                }),
            );
        }
    }

    let mut sources = serde_json::Map::new();
    for source_unit in unit.source_units.values() {
        sources.insert(
            source_unit.filename.absolute.to_string_lossy().into_owned(),
            json!({"AST": source_unit.ast}),
        );
    }

    let document = json!({
        "sources": Value::Object(sources),
        "sourceList": source_list(unit),
        "contracts": Value::Object(contracts),
    });
    let path = export_dir.join(format!("{stem}.json"));
    std::fs::write(&path, serde_json::to_vec(&document)?)?;
    Ok(path)
}

/// Scoped-package paths (`@…`) come first, then the rest, each group
/// sorted. Some downstream consumers index into this list by position.
fn source_list(unit: &CompilationUnit) -> Vec<String> {
    let mut scoped = Vec::new();
    let mut plain = Vec::new();
    for filename in &unit.filenames {
        let absolute = filename.absolute.to_string_lossy().into_owned();
        if absolute.contains('@') {
            scoped.push(absolute);
        } else {
            plain.push(absolute);
        }
    }
    scoped.sort();
    plain.sort();
    scoped.extend(plain);
    scoped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerDescriptor;
    use crate::filename::NormalizeHints;
    use crate::unit::ContractArtifact;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn writes_combined_solc_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::for_tests(dir.path());
        let mut unit = CompilationUnit::new("u");
        unit.compiler = CompilerDescriptor::new("solc", "0.8.19");
        let filename = project.index().intern("a.sol", &NormalizeHints::default());
        unit.source_unit_mut(filename).contracts.insert(
            "A".to_string(),
            ContractArtifact {
                abi: json!([]),
                bytecode_init: "6001".into(),
                bytecode_runtime: "6002".into(),
                srcmap_init: vec!["0:1:0".into()],
                srcmap_runtime: vec!["0:1:0".into()],
                ..Default::default()
            },
        );
        project.add_unit(unit);

        let files = export(&project, dir.path()).unwrap();
        assert!(files[0].ends_with("combined_solc.json"));

        let document: Value =
            serde_json::from_str(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
        let key = document["contracts"]
            .as_object()
            .unwrap()
            .keys()
            .next()
            .unwrap()
            .clone();
        assert!(key.ends_with("a.sol:A"));
        // The abi travels as a compact JSON string in this format.
        assert_eq!(document["contracts"][&key]["abi"], "[]");
        assert_eq!(document["sourceList"].as_array().unwrap().len(), 1);
    }
}
