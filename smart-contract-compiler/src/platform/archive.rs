//! Import of previously exported projects: export archives (with
//! source contents), plain standard exports, and zip bundles of either.
//!
//! Importing rehydrates the stored model; no compiler runs.

use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::export::standard;
use crate::platform::Platform;
use crate::project::Project;
use async_trait::async_trait;
use std::io::Read;
use std::path::Path;

pub struct Archive;

#[async_trait]
impl Platform for Archive {
    fn name(&self) -> &'static str {
        "Archive"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        Path::new(target).is_file()
            && (target.ends_with("_export_archive.json") || target.ends_with(".zip"))
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        _config: &CompileConfig,
    ) -> Result<()> {
        if target.ends_with(".zip") {
            return import_zip(project, target);
        }
        let raw = std::fs::read_to_string(target)?;
        standard::load_into(project, standard::parse(&raw, target)?)
    }
}

/// Plain standard exports (`*_export.json`), same wire format without
/// the source contents.
pub struct StandardImport;

#[async_trait]
impl Platform for StandardImport {
    fn name(&self) -> &'static str {
        "Standard"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        Path::new(target).is_file()
            && target.ends_with("_export.json")
            && !target.ends_with("_export_archive.json")
    }

    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        _config: &CompileConfig,
    ) -> Result<()> {
        let raw = std::fs::read_to_string(target)?;
        standard::load_into(project, standard::parse(&raw, target)?)
    }
}

/// Every JSON entry of the zip is imported; units from all entries land
/// in the same project.
fn import_zip(project: &mut Project, target: &str) -> Result<()> {
    let file = std::fs::File::open(target)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| Error::InvalidArchive {
        path: target.to_string(),
        reason: err.to_string(),
    })?;
    if archive.is_empty() {
        return Err(Error::InvalidArchive {
            path: target.to_string(),
            reason: "zip holds no entries".to_string(),
        });
    }
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| Error::InvalidArchive {
            path: target.to_string(),
            reason: err.to_string(),
        })?;
        if !entry.name().ends_with(".json") {
            continue;
        }
        let mut raw = String::new();
        entry.read_to_string(&mut raw)?;
        let origin = format!("{target}!{}", entry.name());
        standard::load_into(project, standard::parse(&raw, &origin)?)?;
    }
    Ok(())
}
