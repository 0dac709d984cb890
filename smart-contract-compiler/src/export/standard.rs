//! The canonical wire format, and its inverse used by the archive and
//! standard import platforms.
//!
//! Source units are keyed by absolute path and sorted by the map order,
//! keeping the export byte-stable across runs.

use crate::compiler::CompilerDescriptor;
use crate::errors::{Error, Result};
use crate::filename::Filename;
use crate::natspec::Natspec;
use crate::platform::{self, Platform as _};
use crate::project::Project;
use crate::unit::{CompilationUnit, ContractArtifact, ContractKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StandardExport {
    pub compilation_units: BTreeMap<String, UnitExport>,
    pub working_dir: String,
    #[serde(rename = "type")]
    pub platform: String,
    pub target: String,
    /// Present in archives only: file contents keyed by absolute path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_content: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitExport {
    pub unit_id: String,
    pub compiler: CompilerDescriptor,
    pub source_units: BTreeMap<String, SourceUnitExport>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceUnitExport {
    pub filenames: FilenameFacets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub ast: Value,
    pub contracts: BTreeMap<String, ContractExport>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_dependency: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameFacets {
    pub absolute: String,
    pub relative: String,
    pub short: String,
    pub used: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractExport {
    pub abi: Value,
    pub bin: String,
    #[serde(rename = "bin-runtime")]
    pub bin_runtime: String,
    pub srcmap: String,
    #[serde(rename = "srcmap-runtime")]
    pub srcmap_runtime: String,
    #[serde(default)]
    pub userdoc: Value,
    #[serde(default)]
    pub devdoc: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub kind: ContractKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Builds the wire model from a project.
pub fn from_project(project: &Project) -> StandardExport {
    let adapter = platform::by_name(project.platform());
    let mut compilation_units = BTreeMap::new();
    for (unit_id, unit) in &project.units {
        let mut source_units = BTreeMap::new();
        for source_unit in unit.source_units.values() {
            let contracts = source_unit
                .contracts
                .iter()
                .map(|(name, artifact)| (name.clone(), contract_export(artifact)))
                .collect();
            let filename = &source_unit.filename;
            source_units.insert(
                filename.absolute.to_string_lossy().into_owned(),
                SourceUnitExport {
                    filenames: facets(filename),
                    source_id: source_unit.source_id,
                    ast: source_unit.ast.clone(),
                    contracts,
                    is_dependency: adapter
                        .map(|a| a.is_dependency(&filename.relative))
                        .unwrap_or(false),
                },
            );
        }
        compilation_units.insert(
            unit_id.clone(),
            UnitExport {
                unit_id: unit.unique_id().to_string(),
                compiler: unit.compiler.clone(),
                source_units,
            },
        );
    }
    StandardExport {
        compilation_units,
        working_dir: project.working_dir().to_string_lossy().into_owned(),
        platform: project.platform().to_string(),
        target: project.target().to_string(),
        source_content: BTreeMap::new(),
    }
}

/// Rehydrates a previously exported model into the project. No compiler
/// runs; the stored identities are installed verbatim.
pub fn load_into(project: &mut Project, export: StandardExport) -> Result<()> {
    project.set_platform(export.platform.clone());
    project.set_working_dir(PathBuf::from(&export.working_dir));
    project.archived_sources = export.source_content;

    for (unit_id, unit_export) in export.compilation_units {
        let mut unit = CompilationUnit::new(unit_id);
        unit.compiler = unit_export.compiler;
        for (_, source_export) in unit_export.source_units {
            let filename = project.index().install(Filename {
                absolute: PathBuf::from(&source_export.filenames.absolute),
                relative: PathBuf::from(&source_export.filenames.relative),
                short: PathBuf::from(&source_export.filenames.short),
                used: source_export.filenames.used.clone(),
            });
            let source_unit = unit.source_unit_mut(filename);
            source_unit.ast = source_export.ast;
            source_unit.source_id = source_export.source_id;
            for (name, contract) in source_export.contracts {
                source_unit.contracts.insert(name, contract_import(contract));
            }
        }
        project.add_unit(unit);
    }
    Ok(())
}

pub(super) fn export(project: &Project, export_dir: &Path) -> Result<Vec<PathBuf>> {
    let model = from_project(project);
    let path = export_dir.join("contracts.json");
    std::fs::write(&path, serde_json::to_vec(&model)?)?;
    Ok(vec![path])
}

pub(super) fn export_archive(project: &Project, export_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut model = from_project(project);
    model.source_content = project.source_contents();

    let stem = archive_stem(project.target());
    let path = export_dir.join(format!("{stem}_export_archive.json"));
    std::fs::write(&path, serde_json::to_vec(&model)?)?;
    Ok(vec![path])
}

/// Directory targets collapse to `contracts`; file targets keep their
/// final component.
fn archive_stem(target: &str) -> String {
    let path = Path::new(target);
    if path.is_dir() {
        "contracts".to_string()
    } else {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "contracts".to_string())
    }
}

pub fn parse(raw: &str, origin: &str) -> Result<StandardExport> {
    serde_json::from_str(raw).map_err(|err| Error::InvalidArchive {
        path: origin.to_string(),
        reason: err.to_string(),
    })
}

fn facets(filename: &Filename) -> FilenameFacets {
    FilenameFacets {
        absolute: filename.absolute.to_string_lossy().into_owned(),
        relative: filename.relative.to_string_lossy().into_owned(),
        short: filename.short.to_string_lossy().into_owned(),
        used: filename.used.clone(),
    }
}

fn contract_export(artifact: &ContractArtifact) -> ContractExport {
    ContractExport {
        abi: artifact.abi.clone(),
        bin: artifact.bytecode_init.clone(),
        bin_runtime: artifact.bytecode_runtime.clone(),
        srcmap: artifact.srcmap_init.join(";"),
        srcmap_runtime: artifact.srcmap_runtime.join(";"),
        userdoc: serde_json::to_value(&artifact.natspec.userdoc).unwrap_or(Value::Null),
        devdoc: serde_json::to_value(&artifact.natspec.devdoc).unwrap_or(Value::Null),
        hashes: artifact.hashes.clone(),
        kind: artifact.kind,
        libraries: artifact.libraries.clone(),
        dependencies: artifact.dependencies.clone(),
    }
}

fn contract_import(export: ContractExport) -> ContractArtifact {
    ContractArtifact {
        abi: export.abi,
        bytecode_init: export.bin,
        bytecode_runtime: export.bin_runtime,
        srcmap_init: split(&export.srcmap),
        srcmap_runtime: split(&export.srcmap_runtime),
        natspec: Natspec::new(export.userdoc, export.devdoc),
        kind: export.kind,
        libraries: export.libraries,
        dependencies: export.dependencies,
        hashes: export.hashes,
    }
}

fn split(srcmap: &str) -> Vec<String> {
    if srcmap.is_empty() {
        return Vec::new();
    }
    srcmap.split(';').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filename::NormalizeHints;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_project(dir: &Path) -> Project {
        let mut project = Project::for_tests(dir);
        let mut unit = CompilationUnit::new("unit-1");
        unit.compiler = CompilerDescriptor::new("solc", "0.8.19");
        let filename = project.index().intern("a.sol", &NormalizeHints::default());
        unit.source_unit_mut(filename).contracts.insert(
            "A".to_string(),
            ContractArtifact {
                abi: json!([{"type": "function", "name": "get", "inputs": []}]),
                bytecode_init: "6001".into(),
                bytecode_runtime: "6002".into(),
                srcmap_init: vec!["0:1:0".into(), "".into()],
                srcmap_runtime: vec!["0:1:0".into()],
                ..Default::default()
            },
        );
        project.add_unit(unit);
        project
    }

    #[test]
    fn round_trip_preserves_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let project = sample_project(dir.path());

        let exported = from_project(&project);
        let serialized = serde_json::to_string(&exported).unwrap();
        let parsed = parse(&serialized, "round-trip").unwrap();

        let mut restored = Project::for_tests(dir.path());
        load_into(&mut restored, parsed).unwrap();

        let original_unit = project.units.get("unit-1").unwrap();
        let restored_unit = restored.units.get("unit-1").unwrap();
        assert_eq!(original_unit.compiler, restored_unit.compiler);

        let (original_source, original_contract) = original_unit.find_contract("A").unwrap();
        let (restored_source, restored_contract) = restored_unit.find_contract("A").unwrap();
        assert_eq!(original_source.filename, restored_source.filename);
        assert_eq!(original_contract, restored_contract);
    }

    #[test]
    fn archive_carries_source_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.sol"), "contract A {}").unwrap();
        let project = sample_project(dir.path());

        let export_dir = dir.path().join("crytic-export");
        std::fs::create_dir_all(&export_dir).unwrap();
        let files = export_archive(&project, &export_dir).unwrap();
        let raw = std::fs::read_to_string(&files[0]).unwrap();
        let parsed = parse(&raw, "archive").unwrap();
        assert_eq!(parsed.source_content.len(), 1);
        assert!(parsed
            .source_content
            .values()
            .next()
            .unwrap()
            .contains("contract A"));
    }

    #[test]
    fn malformed_documents_are_invalid_archives() {
        let err = parse("{\"nope\": 1}", "bad.json").unwrap_err();
        assert!(matches!(err, Error::InvalidArchive { .. }));
    }
}
