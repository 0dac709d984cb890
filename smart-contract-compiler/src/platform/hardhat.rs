//! Hardhat adapters (v2 and v3) and the shared build-info parsing used
//! by every framework that persists standard-json build-info files.

use crate::artifacts::StandardJsonOutput;
use crate::compiler::CompilerDescriptor;
use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::filename::{NormalizeHints, Remapping};
use crate::platform::{run_command, Platform};
use crate::project::Project;
use crate::unit::CompilationUnit;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

const CONFIG_STEMS: &[&str] = &[
    "hardhat.config.js",
    "hardhat.config.ts",
    "hardhat.config.cjs",
    "hardhat.config.mjs",
];

pub struct Hardhat;

#[async_trait]
impl Platform for Hardhat {
    fn name(&self) -> &'static str {
        "Hardhat"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        has_hardhat_config(Path::new(target))
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        if !config.ignore_compile {
            run_command("npx", &["hardhat", "compile", "--force"], Path::new(target)).await?;
        }
        let build_info = Path::new(target)
            .join(&config.hardhat_artifacts_directory)
            .join("build-info");
        parse_build_info_directory(project, Path::new(target), &build_info)
    }

    fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
    }

    fn guessed_tests(&self) -> Vec<String> {
        vec!["npx hardhat test".to_string()]
    }

    async fn clean(&self, target: &str, config: &CompileConfig) -> Result<()> {
        if config.ignore_compile {
            return Ok(());
        }
        run_command("npx", &["hardhat", "clean"], Path::new(target)).await?;
        Ok(())
    }
}

/// Hardhat 3 keeps the same config layout but must be recognized first:
/// its build pipeline and command names differ.
pub struct HardhatV3;

#[async_trait]
impl Platform for HardhatV3 {
    fn name(&self) -> &'static str {
        "Hardhat-v3"
    }

    fn priority(&self) -> u32 {
        150
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let dir = Path::new(target);
        has_hardhat_config(dir) && declares_hardhat_v3(dir)
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        if !config.ignore_compile {
            run_command("npx", &["hardhat", "build"], Path::new(target)).await?;
        }
        let build_info = Path::new(target)
            .join(&config.hardhat_artifacts_directory)
            .join("build-info");
        parse_build_info_directory(project, Path::new(target), &build_info)
    }

    fn is_dependency(&self, path: &Path) -> bool {
        Hardhat.is_dependency(path)
    }

    fn guessed_tests(&self) -> Vec<String> {
        vec!["npx hardhat test".to_string()]
    }
}

fn has_hardhat_config(dir: &Path) -> bool {
    CONFIG_STEMS.iter().any(|stem| dir.join(stem).is_file())
}

/// True when package.json pins hardhat to a 3.x release or pulls in the
/// v3 toolbox.
fn declares_hardhat_v3(dir: &Path) -> bool {
    let Ok(raw) = std::fs::read_to_string(dir.join("package.json")) else {
        return false;
    };
    let Ok(package) = serde_json::from_str::<Value>(&raw) else {
        return false;
    };
    for section in ["dependencies", "devDependencies"] {
        let Some(deps) = package.get(section).and_then(Value::as_object) else {
            continue;
        };
        if deps
            .keys()
            .any(|name| name.starts_with("@nomicfoundation/hardhat-toolbox-"))
        {
            return true;
        }
        if let Some(version) = deps.get("hardhat").and_then(Value::as_str) {
            let trimmed = version.trim_start_matches(['^', '~', '>', '=', 'v']);
            if trimmed.starts_with("3.") || trimmed == "3" {
                return true;
            }
        }
    }
    false
}

/// Parses every build-info file in a directory into one compilation
/// unit each, oldest build first. Shared by Hardhat and Foundry.
pub(crate) fn parse_build_info_directory(
    project: &mut Project,
    root: &Path,
    build_info_dir: &Path,
) -> Result<()> {
    let files = build_info_files(build_info_dir)?;
    if files.is_empty() {
        return Err(Error::CompilationFailed {
            diagnostics: vec![format!(
                "{} is empty, did the framework build run?",
                build_info_dir.display()
            )],
        });
    }

    for file in files {
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
        let unit_id = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut unit = CompilationUnit::new(unit_id);
        unit.compiler = descriptor_from_build_info(&raw);

        let output: StandardJsonOutput = match raw.get("output") {
            Some(output) => serde_json::from_value(output.clone())?,
            None => StandardJsonOutput::default(),
        };
        let hints = NormalizeHints {
            remappings: unit
                .compiler
                .remappings
                .iter()
                .filter_map(|r| Remapping::parse(r))
                .collect(),
            working_dir: Some(root.to_path_buf()),
            include_paths: Vec::new(),
        };
        unit.absorb_standard_json(&output, project.index(), &hints, None);
        project.add_unit(unit);
    }
    Ok(())
}

fn descriptor_from_build_info(raw: &Value) -> CompilerDescriptor {
    let language = raw
        .pointer("/input/language")
        .and_then(Value::as_str)
        .unwrap_or("Solidity");
    let compiler = if language == "Vyper" { "vyper" } else { "solc" };
    let version = raw
        .get("solcVersion")
        .or_else(|| raw.get("solcLongVersion"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut descriptor = CompilerDescriptor::new(compiler, version);
    let settings = raw.pointer("/input/settings").cloned().unwrap_or(Value::Null);
    descriptor.optimized = settings.pointer("/optimizer/enabled").and_then(Value::as_bool);
    descriptor.optimize_runs = settings
        .pointer("/optimizer/runs")
        .and_then(Value::as_u64)
        .map(|runs| runs as u32);
    descriptor.evm_version = settings
        .get("evmVersion")
        .and_then(Value::as_str)
        .map(str::to_string);
    descriptor.via_ir = settings.get("viaIR").and_then(Value::as_bool).unwrap_or(false);
    descriptor.remappings = settings
        .get("remappings")
        .and_then(Value::as_array)
        .map(|remappings| {
            remappings
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    descriptor
}

/// Build-info JSON files ordered by modification time, oldest first.
fn build_info_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|err| Error::CompilationFailed {
        diagnostics: vec![format!("{}: {err}", dir.display())],
    })?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    files.sort_by_key(|path| {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        (modified, path.clone())
    });
    Ok(files)
}
