//! The top-level façade: target classification, platform resolution,
//! compilation and post-processing.

use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::filename::{Filename, FilenameIndex};
use crate::metadata::{self, BytecodeMetadata};
use crate::platform::{self, Platform as _};
use crate::unit::CompilationUnit;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::instrument;

/// One compile/export call's worth of state.
#[derive(Debug)]
pub struct Project {
    target: String,
    platform: String,
    working_dir: PathBuf,
    index: Arc<FilenameIndex>,
    pub units: BTreeMap<String, CompilationUnit>,
    /// True when only the on-chain bytecode could be recovered for an
    /// address target.
    pub bytecode_only: bool,
    /// Source contents carried by an imported archive; empty otherwise.
    pub archived_sources: BTreeMap<String, String>,
}

impl Project {
    fn new(target: &str, working_dir: PathBuf) -> Self {
        let index = Arc::new(FilenameIndex::new(&working_dir));
        Self {
            target: target.to_string(),
            platform: "unknown".to_string(),
            working_dir,
            index,
            units: BTreeMap::new(),
            bytecode_only: false,
            archived_sources: BTreeMap::new(),
        }
    }

    /// Compiles a target: a directory, a single source file, an exported
    /// archive, or a chain-prefixed address.
    #[instrument(name = "compile", skip(config), level = "info")]
    pub async fn compile(target: &str, config: &CompileConfig) -> Result<Self> {
        let working_dir = std::env::current_dir()?;
        let mut project = Self::new(target, working_dir);
        let mut config = config.clone();

        if !Path::new(target).exists() && !platform::looks_like_address(target) {
            return Err(Error::InvalidTarget(target.to_string()));
        }

        if let Some(custom_build) = config.compile_custom_build.take() {
            run_custom_build(&custom_build, target).await?;
            config.ignore_compile = true;
        }

        if let Some(roots) = monorepo_roots(target, &config) {
            project.platform = "monorepo".to_string();
            project.compile_roots(roots, &config).await?;
        } else {
            let adapter = platform::resolve(target, &config)?;
            project.platform = adapter.name().to_string();
            adapter
                .compile(&mut project, target, &config)
                .await
                .map_err(|err| err.with_platform(adapter.name(), target))?;
        }

        if config.compile_remove_metadata {
            for unit in project.units.values_mut() {
                unit.remove_metadata();
            }
        }
        project.check_ambiguity()?;
        Ok(project)
    }

    /// Compiles several framework roots into this project, bounded by a
    /// semaphore sized to the available cores. Results merge in root
    /// order regardless of completion order.
    async fn compile_roots(&mut self, roots: Vec<PathBuf>, config: &CompileConfig) -> Result<()> {
        let permits = config
            .max_concurrency
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        let jobs = roots.into_iter().map(|root| {
            let semaphore = Arc::clone(&semaphore);
            let config = config.clone();
            let working_dir = self.working_dir.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|err| Error::Internal(anyhow::anyhow!("semaphore closed: {err}")))?;
                let target = root.to_string_lossy().into_owned();
                let mut sub_project = Project::new(&target, working_dir);
                let adapter = platform::resolve(&target, &config)?;
                adapter
                    .compile(&mut sub_project, &target, &config)
                    .await
                    .map_err(|err| err.with_platform(adapter.name(), target.clone()))?;
                Ok::<_, Error>(sub_project)
            }
        });

        for finished in futures::future::join_all(jobs).await {
            let sub_project = finished?;
            for (_, unit) in sub_project.units {
                self.add_unit(unit);
            }
            self.bytecode_only |= sub_project.bytecode_only;
            // Identities re-intern into the parent index so absolute
            // paths shared across roots collapse to one Filename.
            for filename in sub_project.index.all() {
                self.index
                    .intern(&filename.used, &crate::filename::NormalizeHints::default());
            }
        }
        Ok(())
    }

    /// Installs a unit, keeping unit ids unique across monorepo roots.
    pub fn add_unit(&mut self, unit: CompilationUnit) {
        let mut key = unit.unique_id().to_string();
        let mut counter = 1;
        while self.units.contains_key(&key) {
            counter += 1;
            key = format!("{}-{counter}", unit.unique_id());
        }
        self.units.insert(key, unit);
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn set_platform(&mut self, platform: impl Into<String>) {
        self.platform = platform.into();
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn set_working_dir(&mut self, working_dir: PathBuf) {
        self.working_dir = working_dir;
    }

    pub fn index(&self) -> &FilenameIndex {
        &self.index
    }

    pub fn filenames(&self) -> Vec<Arc<Filename>> {
        self.index.all()
    }

    pub fn contract_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .units
            .values()
            .flat_map(CompilationUnit::contract_names)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Whether a contract appears in more than one compilation unit.
    pub fn is_in_multiple_units(&self, contract: &str) -> bool {
        self.units
            .values()
            .filter(|unit| unit.find_contract(contract).is_some())
            .count()
            >= 2
    }

    /// Topological deployment order over a unit's contract -> library
    /// graph; libraries come out before the contracts linking them.
    pub fn link_order(&self, unit_id: &str) -> Result<Vec<String>> {
        let unit = self
            .units
            .get(unit_id)
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("unknown unit `{unit_id}`")))?;
        crate::libraries::deployment_order(&unit.library_graph())
    }

    /// Decoded metadata trailer of a contract's deployed bytecode.
    pub fn metadata_of(&self, contract: &str) -> Option<BytecodeMetadata> {
        self.units.values().find_map(|unit| {
            unit.find_contract(contract)
                .map(|(_, artifact)| metadata::decode(&artifact.bytecode_runtime))
        })
    }

    /// Source contents for every known file: the archived copies when
    /// this project was imported, the on-disk files otherwise.
    pub fn source_contents(&self) -> BTreeMap<String, String> {
        if !self.archived_sources.is_empty() {
            return self.archived_sources.clone();
        }
        let mut contents = BTreeMap::new();
        for filename in self.filenames() {
            if let Ok(content) = std::fs::read_to_string(&filename.absolute) {
                contents.insert(filename.absolute.to_string_lossy().into_owned(), content);
            }
        }
        contents
    }

    /// Monorepo merge safety: the same (file, contract) pair must not
    /// resolve to two different ABIs.
    fn check_ambiguity(&self) -> Result<()> {
        let mut seen: BTreeMap<(PathBuf, String), (&serde_json::Value, PathBuf)> = BTreeMap::new();
        for unit in self.units.values() {
            for source_unit in unit.source_units.values() {
                for (name, artifact) in &source_unit.contracts {
                    let key = (source_unit.filename.absolute.clone(), name.clone());
                    if let Some((abi, first)) = seen.get(&key) {
                        if *abi != &artifact.abi {
                            return Err(Error::ContractAmbiguous {
                                contract: name.clone(),
                                first: first.clone(),
                                second: source_unit.filename.absolute.clone(),
                            });
                        }
                    } else {
                        seen.insert(key, (&artifact.abi, source_unit.filename.absolute.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl Project {
    /// Bare project for adapter tests.
    pub(crate) fn for_tests(working_dir: &Path) -> Self {
        Self::new("test-target", working_dir.to_path_buf())
    }
}

/// Immediate subdirectories that are framework roots, when the target
/// itself is not one. `None` means "not a monorepo".
fn monorepo_roots(target: &str, config: &CompileConfig) -> Option<Vec<PathBuf>> {
    let path = Path::new(target);
    if !path.is_dir() {
        return None;
    }
    if config.compile_force_framework.is_some() {
        return None;
    }
    if platform::all().iter().any(|adapter| adapter.detect(target, config)) {
        return None;
    }

    let mut roots: Vec<PathBuf> = std::fs::read_dir(path)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|entry| entry.is_dir() && is_framework_root(entry))
        .collect();
    if roots.is_empty() {
        return None;
    }
    roots.sort();
    Some(roots)
}

fn is_framework_root(dir: &Path) -> bool {
    dir.join("foundry.toml").is_file()
        || dir.join("hardhat.config.js").is_file()
        || dir.join("hardhat.config.ts").is_file()
}

async fn run_custom_build(command: &str, target: &str) -> Result<()> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(Error::InvalidTarget("empty custom build command".to_string()));
    };
    let args: Vec<&str> = parts.collect();
    let cwd = if Path::new(target).is_dir() {
        PathBuf::from(target)
    } else {
        std::env::current_dir()?
    };
    platform::run_command(program, &args, &cwd).await?;
    Ok(())
}
