//! Etherlime adapter. Per-contract artifact files under `build/` share
//! the truffle shape.

use crate::config::CompileConfig;
use crate::errors::Result;
use crate::platform::truffle::absorb_artifact_files;
use crate::platform::{run_command, Platform};
use crate::project::Project;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path};

pub struct Etherlime;

#[async_trait]
impl Platform for Etherlime {
    fn name(&self) -> &'static str {
        "Etherlime"
    }

    fn priority(&self) -> u32 {
        800
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let Ok(raw) = std::fs::read_to_string(Path::new(target).join("package.json")) else {
            return false;
        };
        let Ok(package) = serde_json::from_str::<Value>(&raw) else {
            return false;
        };
        ["dependencies", "devDependencies"].iter().any(|section| {
            package
                .get(section)
                .and_then(Value::as_object)
                .map(|deps| deps.keys().any(|name| name.starts_with("etherlime")))
                .unwrap_or(false)
        })
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        if !config.ignore_compile {
            run_command("npx", &["etherlime", "compile"], Path::new(target)).await?;
        }
        let build_dir = Path::new(target).join("build");
        let unit = absorb_artifact_files(project, target, Path::new(target), &build_dir)?;
        project.add_unit(unit);
        Ok(())
    }

    fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
    }

    fn guessed_tests(&self) -> Vec<String> {
        vec!["npx etherlime test".to_string()]
    }
}
