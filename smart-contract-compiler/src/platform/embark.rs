//! Embark adapter. The contract-info plugin leaves a combined-json
//! style summary under `crytic-export/contracts.json`.

use crate::artifacts::CombinedJson;
use crate::compiler::CompilerDescriptor;
use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::filename::NormalizeHints;
use crate::platform::{run_command, Platform};
use crate::project::Project;
use crate::unit::CompilationUnit;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

pub struct Embark;

#[async_trait]
impl Platform for Embark {
    fn name(&self) -> &'static str {
        "Embark"
    }

    fn priority(&self) -> u32 {
        700
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        Path::new(target).join("embark.json").is_file()
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let dir = Path::new(target);
        if !config.ignore_compile {
            run_command("embark", &["build", "--contracts"], dir).await?;
        }

        let summary = dir.join("crytic-export/contracts.json");
        let raw = std::fs::read_to_string(&summary).map_err(|err| Error::CompilationFailed {
            diagnostics: vec![format!("{}: {err}", summary.display())],
        })?;
        let document: Value = serde_json::from_str(&raw)?;

        let combined = CombinedJson {
            contracts: serde_json::from_value(
                document
                    .get("contracts")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            )?,
            ..Default::default()
        };
        let mut unit = CompilationUnit::new(target);
        unit.compiler = CompilerDescriptor::new(
            "solc",
            document
                .get("compiler_version")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        );
        let hints = NormalizeHints {
            working_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        unit.absorb_combined_json(&combined, project.index(), &hints, Some(target));
        project.add_unit(unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_embark_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompileConfig::default();
        assert!(!Embark.detect(&dir.path().to_string_lossy(), &config));
        std::fs::write(dir.path().join("embark.json"), "{}").unwrap();
        assert!(Embark.detect(&dir.path().to_string_lossy(), &config));
    }
}
