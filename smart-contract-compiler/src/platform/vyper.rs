//! Direct compilation of Vyper sources.

use crate::compiler::vyper::{vyper_input, VyperRunner};
use crate::compiler::CompilerDescriptor;
use crate::config::CompileConfig;
use crate::errors::Result;
use crate::platform::solc::hints_rooted_at;
use crate::platform::standard_json::collect_sources;
use crate::platform::Platform;
use crate::project::Project;
use crate::unit::CompilationUnit;
use async_trait::async_trait;
use std::path::Path;

pub struct VyperPlatform;

#[async_trait]
impl Platform for VyperPlatform {
    fn name(&self) -> &'static str {
        "vyper"
    }

    fn priority(&self) -> u32 {
        1020
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        let path = Path::new(target);
        (path.is_file() && target.ends_with(".vy"))
            || (path.is_dir() && !collect_sources(path, "vy").is_empty())
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let path = Path::new(target);
        let (root, sources) = if path.is_dir() {
            (path.to_path_buf(), collect_sources(path, "vy"))
        } else {
            let parent = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            (parent, vec![path.to_path_buf()])
        };

        let mut contents = Vec::new();
        for source in &sources {
            let used = source
                .strip_prefix(&root)
                .unwrap_or(source)
                .to_string_lossy()
                .into_owned();
            contents.push((used, std::fs::read_to_string(source)?));
        }

        let runner = VyperRunner::locate(config.vyper.clone()).await?;
        let mut unit = CompilationUnit::new(target);
        unit.compiler = CompilerDescriptor::new("vyper", runner.version.clone());
        unit.compiler.optimized = Some(false);

        let input = vyper_input(&contents);
        let mut options = config.invocation_options();
        if options.working_dir.is_none() {
            options.working_dir = Some(root.clone());
        }
        let (output, _raw) = runner.standard_json(&input, &options).await?;

        let hints = hints_rooted_at(config, &root);
        unit.absorb_standard_json(&output, project.index(), &hints, Some(target));
        project.add_unit(unit);
        Ok(())
    }
}
