//! Dapptools adapter. `dapp build` writes a combined-json style
//! document under `out/`.

use crate::artifacts::CombinedJson;
use crate::compiler::CompilerDescriptor;
use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::filename::NormalizeHints;
use crate::platform::{run_command, Platform};
use crate::project::Project;
use crate::unit::CompilationUnit;
use async_trait::async_trait;
use std::path::{Component, Path};

pub struct Dapp;

#[async_trait]
impl Platform for Dapp {
    fn name(&self) -> &'static str {
        "Dapp"
    }

    fn priority(&self) -> u32 {
        400
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let makefile = Path::new(target).join("Makefile");
        match std::fs::read_to_string(makefile) {
            Ok(content) => content.contains("dapp"),
            Err(_) => false,
        }
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        if !config.ignore_compile {
            run_command("dapp", &["build"], Path::new(target)).await?;
        }

        let artifact = Path::new(target).join("out/dapp.sol.json");
        let raw = std::fs::read_to_string(&artifact).map_err(|err| Error::CompilationFailed {
            diagnostics: vec![format!("{}: {err}", artifact.display())],
        })?;
        let combined: CombinedJson = serde_json::from_str(&raw)?;

        let mut unit = CompilationUnit::new(target);
        unit.compiler = CompilerDescriptor::new(
            "solc",
            combined.version.clone().unwrap_or_default(),
        );
        let hints = NormalizeHints {
            working_dir: Some(Path::new(target).to_path_buf()),
            ..Default::default()
        };
        unit.absorb_combined_json(&combined, project.index(), &hints, Some(target));
        project.add_unit(unit);
        Ok(())
    }

    fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "lib"))
    }

    fn guessed_tests(&self) -> Vec<String> {
        vec!["dapp test".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dapp_makefiles_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompileConfig::default();
        assert!(!Dapp.detect(&dir.path().to_string_lossy(), &config));

        std::fs::write(dir.path().join("Makefile"), "all:\n\tcargo build\n").unwrap();
        assert!(!Dapp.detect(&dir.path().to_string_lossy(), &config));

        std::fs::write(dir.path().join("Makefile"), "all:; dapp build\n").unwrap();
        assert!(Dapp.detect(&dir.path().to_string_lossy(), &config));
    }
}
