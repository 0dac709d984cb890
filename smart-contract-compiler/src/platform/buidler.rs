//! Buidler adapter (Hardhat's predecessor). The build leaves a full
//! standard-json output in `cache/solc-output.json`.

use crate::artifacts::StandardJsonOutput;
use crate::compiler::CompilerDescriptor;
use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::filename::NormalizeHints;
use crate::platform::{run_command, Platform};
use crate::project::Project;
use crate::unit::CompilationUnit;
use async_trait::async_trait;
use std::path::{Component, Path};

pub struct Buidler;

#[async_trait]
impl Platform for Buidler {
    fn name(&self) -> &'static str {
        "Buidler"
    }

    fn priority(&self) -> u32 {
        900
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let dir = Path::new(target);
        dir.join("buidler.config.js").is_file() || dir.join("buidler.config.ts").is_file()
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let dir = Path::new(target);
        if !config.ignore_compile {
            run_command("npx", &["buidler", "compile"], dir).await?;
        }

        let artifact = dir.join("cache/solc-output.json");
        let raw = std::fs::read_to_string(&artifact).map_err(|err| Error::CompilationFailed {
            diagnostics: vec![format!("{}: {err}", artifact.display())],
        })?;
        let output: StandardJsonOutput = serde_json::from_str(&raw)?;

        let mut unit = CompilationUnit::new(target);
        unit.compiler = CompilerDescriptor::new(
            "solc",
            config.solc_version.clone().unwrap_or_default(),
        );
        let hints = NormalizeHints {
            working_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        unit.absorb_standard_json(&output, project.index(), &hints, Some(target));
        project.add_unit(unit);
        Ok(())
    }

    fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
    }
}
