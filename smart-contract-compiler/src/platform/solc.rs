//! Direct compilation of a single Solidity file, combined-json style.

use crate::compiler::solc::SolcLocator;
use crate::compiler::CompilerDescriptor;
use crate::config::CompileConfig;
use crate::errors::Result;
use crate::filename::{NormalizeHints, Remapping};
use crate::platform::Platform;
use crate::project::Project;
use crate::unit::CompilationUnit;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct Solc;

#[async_trait]
impl Platform for Solc {
    fn name(&self) -> &'static str {
        "solc"
    }

    fn priority(&self) -> u32 {
        1000
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        Path::new(target).is_file() && target.ends_with(".sol")
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let runner = locate_solc(config, Some(Path::new(target))).await?;
        let mut unit = CompilationUnit::new(target);
        unit.compiler = descriptor_for(&runner.version, config);

        let options = config.invocation_options();
        let combined = runner
            .combined_json(Path::new(target), &config.solc_remaps, &options)
            .await?;

        let hints = normalize_hints(config);
        unit.absorb_combined_json(&combined, project.index(), &hints, Some(target));
        project.add_unit(unit);
        Ok(())
    }
}

pub(crate) async fn locate_solc(
    config: &CompileConfig,
    pragma_source: Option<&Path>,
) -> Result<crate::compiler::SolcRunner> {
    SolcLocator {
        binary: config.solc.clone(),
        version: config.solc_version.clone(),
        pragma_source: pragma_source.map(Path::to_path_buf),
    }
    .locate()
    .await
}

pub(crate) fn descriptor_for(version: &str, config: &CompileConfig) -> CompilerDescriptor {
    let args = config.solc_args.as_deref().unwrap_or("");
    let mut descriptor = CompilerDescriptor::new("solc", version);
    descriptor.optimized = Some(args.contains("--optimize"));
    descriptor.optimize_runs = args
        .split_whitespace()
        .skip_while(|arg| *arg != "--optimize-runs")
        .nth(1)
        .and_then(|runs| runs.parse().ok());
    descriptor.remappings = config.solc_remaps.clone();
    descriptor
}

pub(crate) fn normalize_hints(config: &CompileConfig) -> NormalizeHints {
    NormalizeHints {
        remappings: config
            .solc_remaps
            .iter()
            .filter_map(|raw| Remapping::parse(raw))
            .collect(),
        working_dir: config.solc_working_dir.clone(),
        include_paths: Vec::new(),
    }
}

/// Hints resolving against a directory other than the process working
/// directory (framework roots, materialized fetches).
pub(crate) fn hints_rooted_at(config: &CompileConfig, root: &Path) -> NormalizeHints {
    let mut hints = normalize_hints(config);
    if hints.working_dir.is_none() {
        hints.working_dir = Some(PathBuf::from(root));
    }
    hints
}
