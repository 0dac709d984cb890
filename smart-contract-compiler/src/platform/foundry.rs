//! Foundry adapter. Builds with `forge build --build-info` and re-reads
//! the build-info files, one compilation unit per file (profiles and
//! multi-compiler projects produce several).

use crate::config::CompileConfig;
use crate::errors::Result;
use crate::platform::hardhat::parse_build_info_directory;
use crate::platform::{run_command, Platform};
use crate::project::Project;
use async_trait::async_trait;
use std::path::{Component, Path};

pub struct Foundry;

#[async_trait]
impl Platform for Foundry {
    fn name(&self) -> &'static str {
        "Foundry"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        Path::new(target).join("foundry.toml").is_file()
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        // Foundry vendors dependencies under `lib/`.
        project.index().add_vendor_dir("lib");

        if !config.ignore_compile {
            run_command("forge", &["build", "--build-info"], Path::new(target)).await?;
        }
        let build_info = Path::new(target)
            .join(&config.foundry_out_directory)
            .join("build-info");
        parse_build_info_directory(project, Path::new(target), &build_info)
    }

    fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "lib"))
    }

    fn guessed_tests(&self) -> Vec<String> {
        vec!["forge test".to_string()]
    }

    async fn clean(&self, target: &str, config: &CompileConfig) -> Result<()> {
        if config.ignore_compile {
            return Ok(());
        }
        run_command("forge", &["clean"], Path::new(target)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_foundry_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompileConfig::default();
        assert!(!Foundry.detect(&dir.path().to_string_lossy(), &config));
        std::fs::write(dir.path().join("foundry.toml"), "[profile.default]").unwrap();
        assert!(Foundry.detect(&dir.path().to_string_lossy(), &config));
    }

    #[test]
    fn lib_paths_are_dependencies() {
        assert!(Foundry.is_dependency(Path::new("lib/forge-std/src/Test.sol")));
        assert!(!Foundry.is_dependency(Path::new("src/Token.sol")));
    }
}
