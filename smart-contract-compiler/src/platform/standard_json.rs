//! Aggregated standard-json compilation of a source directory.
//!
//! Used for plain directories of Solidity files, for
//! `--solc-standard-json`, and as the usual second pass over sources
//! materialized by the verification fetchers. A
//! `crytic_compile.config.json` sitting in the target directory is
//! honored; its `solc_settings` object (optimizer, viaIR, evmVersion,
//! libraries, remappings) flows into the compiler input unchanged.

use crate::artifacts::{input, StandardJsonInput};
use crate::compiler::CompilerDescriptor;
use crate::config::{CompileConfig, CONFIG_FILE_NAME};
use crate::errors::Result;
use crate::platform::solc::{descriptor_for, hints_rooted_at, locate_solc};
use crate::platform::Platform;
use crate::project::Project;
use crate::unit::CompilationUnit;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct SolcStandardJson;

#[async_trait]
impl Platform for SolcStandardJson {
    fn name(&self) -> &'static str {
        "solc-standard-json"
    }

    fn priority(&self) -> u32 {
        1030
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let path = Path::new(target);
        path.is_dir() && !collect_sources(path, "sol").is_empty()
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let root = Path::new(target);
        let mut config = config.clone();
        let local_config = root.join(CONFIG_FILE_NAME);
        if local_config.is_file() {
            config.apply_config_file(&local_config)?;
        }

        let sources = collect_sources(root, "sol");
        let runner = locate_solc(&config, sources.first().map(PathBuf::as_path)).await?;

        let mut unit = CompilationUnit::new(target);
        unit.compiler = descriptor_for(&runner.version, &config);
        apply_settings_descriptor(&mut unit.compiler, &config);

        let input = build_input(root, &sources, &config)?;
        let mut options = config.invocation_options();
        if options.working_dir.is_none() {
            options.working_dir = Some(root.to_path_buf());
        }
        let (output, _raw) = runner.standard_json(&input, &options).await?;

        let hints = hints_rooted_at(&config, root);
        unit.absorb_standard_json(&output, project.index(), &hints, Some(target));
        project.add_unit(unit);
        Ok(())
    }
}

/// Builds the compiler input: sources by content (paths relative to the
/// root), settings from the config.
fn build_input(root: &Path, sources: &[PathBuf], config: &CompileConfig) -> Result<StandardJsonInput> {
    let mut input = StandardJsonInput::new("Solidity");

    if let Some(raw_settings) = &config.solc_settings {
        let mut settings: input::Settings = serde_json::from_value(raw_settings.clone())?;
        settings.output_selection = input::default_output_selection();
        input.settings = settings;
    }
    for remapping in &config.solc_remaps {
        if !input.settings.remappings.contains(remapping) {
            input.settings.remappings.push(remapping.clone());
        }
    }
    if let Some(args) = &config.solc_args {
        if args.contains("--optimize") {
            input.settings.optimizer.enabled = Some(true);
        }
        if let Some(runs) = args
            .split_whitespace()
            .skip_while(|arg| *arg != "--optimize-runs")
            .nth(1)
            .and_then(|runs| runs.parse().ok())
        {
            input.settings.optimizer.runs = Some(runs);
        }
    }

    for source in sources {
        let used = source
            .strip_prefix(root)
            .unwrap_or(source)
            .to_string_lossy()
            .into_owned();
        let content = std::fs::read_to_string(source)?;
        input.add_source_content(used, content);
    }
    Ok(input)
}

fn apply_settings_descriptor(descriptor: &mut CompilerDescriptor, config: &CompileConfig) {
    let Some(settings) = &config.solc_settings else {
        return;
    };
    if let Some(enabled) = settings.pointer("/optimizer/enabled").and_then(|v| v.as_bool()) {
        descriptor.optimized = Some(enabled);
    }
    if let Some(runs) = settings.pointer("/optimizer/runs").and_then(|v| v.as_u64()) {
        descriptor.optimize_runs = Some(runs as u32);
    }
    if let Some(evm_version) = settings.get("evmVersion").and_then(|v| v.as_str()) {
        descriptor.evm_version = Some(evm_version.to_string());
    }
    if settings.get("viaIR").and_then(|v| v.as_bool()) == Some(true) {
        descriptor.via_ir = true;
    }
    if let Some(remappings) = settings.get("remappings").and_then(|v| v.as_array()) {
        for remapping in remappings.iter().filter_map(|v| v.as_str()) {
            if !descriptor.remappings.iter().any(|r| r == remapping) {
                descriptor.remappings.push(remapping.to_string());
            }
        }
    }
}

/// Source files with the given extension under a directory, skipping
/// dependency and export trees. Sorted for determinism.
pub(crate) fn collect_sources(root: &Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name();
                if name != "node_modules" && name != "crytic-export" && !name.to_string_lossy().starts_with('.') {
                    pending.push(path);
                }
            } else if path.extension().map(|e| e == extension).unwrap_or(false) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn collects_nested_sources_skipping_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("contracts/utils")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/@oz")).unwrap();
        std::fs::write(dir.path().join("contracts/A.sol"), "").unwrap();
        std::fs::write(dir.path().join("contracts/utils/B.sol"), "").unwrap();
        std::fs::write(dir.path().join("node_modules/@oz/C.sol"), "").unwrap();

        let sources = collect_sources(dir.path(), "sol");
        assert_eq!(sources.len(), 2);
        assert!(sources[0].ends_with("contracts/A.sol"));
    }

    #[test]
    fn settings_from_config_flow_into_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.sol"), "contract A {}").unwrap();
        let config = CompileConfig {
            solc_settings: Some(json!({
                "viaIR": true,
                "evmVersion": "london",
                "optimizer": {"enabled": true, "runs": 777},
                "remappings": ["@oz/=node_modules/@oz/"]
            })),
            ..Default::default()
        };

        let sources = collect_sources(dir.path(), "sol");
        let input = build_input(dir.path(), &sources, &config).unwrap();
        assert_eq!(input.settings.via_ir, Some(true));
        assert_eq!(input.settings.optimizer.runs, Some(777));
        assert_eq!(input.settings.evm_version.as_deref(), Some("london"));
        // Output selection is always ours, never the materialized one.
        assert_eq!(input.settings.output_selection["*"][""][0], "ast");
        assert!(input.sources.contains_key("A.sol"));

        let mut descriptor = CompilerDescriptor::new("solc", "0.8.19");
        apply_settings_descriptor(&mut descriptor, &config);
        assert!(descriptor.via_ir);
        assert_eq!(descriptor.evm_version.as_deref(), Some("london"));
    }
}
