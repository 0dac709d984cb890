//! Brownie adapter. Artifact files under `build/contracts/` share the
//! truffle per-contract shape.

use crate::config::CompileConfig;
use crate::errors::Result;
use crate::platform::truffle::absorb_artifact_files;
use crate::platform::{run_command, Platform};
use crate::project::Project;
use async_trait::async_trait;
use std::path::Path;

pub struct Brownie;

#[async_trait]
impl Platform for Brownie {
    fn name(&self) -> &'static str {
        "Brownie"
    }

    fn priority(&self) -> u32 {
        500
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let dir = Path::new(target);
        dir.join("brownie-config.yaml").is_file() || dir.join("brownie-config.yml").is_file()
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        if !config.ignore_compile {
            run_command("brownie", &["compile", "--all"], Path::new(target)).await?;
        }
        let build_dir = Path::new(target).join("build/contracts");
        let unit = absorb_artifact_files(project, target, Path::new(target), &build_dir)?;
        project.add_unit(unit);
        Ok(())
    }

    fn guessed_tests(&self) -> Vec<String> {
        vec!["brownie test".to_string()]
    }
}
