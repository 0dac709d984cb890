//! Truffle adapter, plus the per-contract artifact-file parsing shared
//! with the other frameworks that write one JSON file per contract
//! (Brownie, Etherlime).

use crate::compiler::version::parse_version_output;
use crate::compiler::CompilerDescriptor;
use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::filename::NormalizeHints;
use crate::natspec::Natspec;
use crate::platform::{run_command, Platform};
use crate::project::Project;
use crate::unit::{CompilationUnit, ContractArtifact};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub struct Truffle;

#[async_trait]
impl Platform for Truffle {
    fn name(&self) -> &'static str {
        "Truffle"
    }

    fn priority(&self) -> u32 {
        300
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let dir = Path::new(target);
        dir.join("truffle-config.js").is_file() || dir.join("truffle.js").is_file()
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        if !config.ignore_compile {
            run_command("npx", &["truffle", "compile", "--all"], Path::new(target)).await?;
        }
        let build_dir = Path::new(target).join(&config.truffle_build_directory);
        let unit = absorb_artifact_files(project, target, Path::new(target), &build_dir)?;
        project.add_unit(unit);
        Ok(())
    }

    fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
    }

    fn guessed_tests(&self) -> Vec<String> {
        vec!["npx truffle test".to_string()]
    }
}

/// Reads a directory of per-contract artifact files into one
/// compilation unit.
pub(crate) fn absorb_artifact_files(
    project: &mut Project,
    unit_id: &str,
    root: &Path,
    build_dir: &Path,
) -> Result<CompilationUnit> {
    let files = artifact_files(build_dir)?;
    if files.is_empty() {
        return Err(Error::CompilationFailed {
            diagnostics: vec![format!(
                "{} holds no artifacts, did the framework build run?",
                build_dir.display()
            )],
        });
    }

    let mut unit = CompilationUnit::new(unit_id);
    let hints = NormalizeHints {
        working_dir: Some(root.to_path_buf()),
        ..Default::default()
    };

    for file in files {
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
        let name = raw
            .get("contractName")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                file.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
        let used = raw
            .get("sourcePath")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{name}.sol"));
        let filename = project.index().intern(&used, &hints);

        if unit.compiler.version.is_empty() {
            unit.compiler = descriptor_from_artifact(&raw);
        }

        let mut artifact = ContractArtifact {
            abi: raw.get("abi").cloned().unwrap_or(Value::Array(Vec::new())),
            bytecode_init: hex_body(&raw, "bytecode"),
            bytecode_runtime: hex_body(&raw, "deployedBytecode"),
            srcmap_init: srcmap_segments(&raw, "sourceMap"),
            srcmap_runtime: srcmap_segments(&raw, "deployedSourceMap"),
            natspec: Natspec::new(
                raw.get("userdoc").cloned().unwrap_or(Value::Null),
                raw.get("devdoc").cloned().unwrap_or(Value::Null),
            ),
            ..Default::default()
        };

        artifact.compute_hashes();
        let source_unit = unit.source_unit_mut(Arc::clone(&filename));
        if let Some(ast) = raw.get("ast") {
            source_unit.ast = ast.clone();
        }
        source_unit.contracts.insert(name, artifact);
    }

    unit.finalize();
    Ok(unit)
}

fn descriptor_from_artifact(raw: &Value) -> CompilerDescriptor {
    let name = raw
        .pointer("/compiler/name")
        .and_then(Value::as_str)
        .unwrap_or("solc");
    let version = raw
        .pointer("/compiler/version")
        .and_then(Value::as_str)
        .and_then(parse_version_output)
        .unwrap_or_default();
    CompilerDescriptor::new(name, version)
}

fn hex_body(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .map(|hex| hex.strip_prefix("0x").unwrap_or(hex).to_string())
        .unwrap_or_default()
}

fn srcmap_segments(raw: &Value, key: &str) -> Vec<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|srcmap| !srcmap.is_empty())
        .map(|srcmap| srcmap.split(';').map(str::to_string).collect())
        .unwrap_or_default()
}

fn artifact_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|err| Error::CompilationFailed {
        diagnostics: vec![format!("{}: {err}", dir.display())],
    })?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}
