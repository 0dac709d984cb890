//! Waffle adapter. The build writes a single combined-json document.
//!
//! Early Waffle releases could leave a stale build behind after a
//! failed run; `retry_clean` wipes the build directory and tries once
//! more before giving up.

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

pub struct Waffle;

#[async_trait]
impl Platform for Waffle {
    fn name(&self) -> &'static str {
        "Waffle"
    }

    fn priority(&self) -> u32 {
        600
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        Path::new(target).join("waffle.json").is_file()
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let dir = Path::new(target);
        if !config.ignore_compile {
            let first = run_command("npx", &["waffle", "waffle.json"], dir).await;
            match first {
                Ok(_) => {}
                Err(_) if config.retry_clean => {
                    let _ = std::fs::remove_dir_all(dir.join("build"));
                    run_command("npx", &["waffle", "waffle.json"], dir).await?;
                }
                Err(err) => return Err(err),
            }
        }

        let artifact = dir.join("build/Combined-Json.json");
        let raw = std::fs::read_to_string(&artifact).map_err(|err| Error::CompilationFailed {
            diagnostics: vec![format!("{}: {err}", artifact.display())],
        })?;
        let combined: CombinedJson = serde_json::from_str(&raw)?;

        let mut unit = CompilationUnit::new(target);
        unit.compiler =
            CompilerDescriptor::new("solc", combined.version.clone().unwrap_or_default());
        let hints = NormalizeHints {
            working_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        unit.absorb_combined_json(&combined, project.index(), &hints, Some(target));
        project.add_unit(unit);
        Ok(())
    }

    fn is_dependency(&self, path: &Path) -> bool {
        path.components()
            .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
    }
}
