//! Serializers for the interchange formats and the export archive
//! packer.

pub mod solc;
pub mod standard;
pub mod truffle;

use crate::errors::{Error, Result};
use crate::project::Project;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// The canonical format (`contracts.json`).
    Standard,
    /// Legacy combined-json shape (`combined_solc.json`).
    Solc,
    /// One artifact file per contract.
    Truffle,
    /// Standard format plus the source contents, re-importable offline.
    Archive,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "standard" => Ok(Self::Standard),
            "solc" => Ok(Self::Solc),
            "truffle" => Ok(Self::Truffle),
            "archive" => Ok(Self::Archive),
            other => Err(Error::Internal(anyhow::anyhow!(
                "unknown export format `{other}` (expected standard, solc, truffle or archive)"
            ))),
        }
    }
}

/// Serializes a project, returning the files written.
pub fn export(project: &Project, format: ExportFormat, export_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(export_dir)?;
    match format {
        ExportFormat::Standard => standard::export(project, export_dir),
        ExportFormat::Solc => solc::export(project, export_dir),
        ExportFormat::Truffle => truffle::export(project, export_dir),
        ExportFormat::Archive => standard::export_archive(project, export_dir),
    }
}

/// Packs previously exported files into a single zip archive. The
/// `zip_type` picks the compression (`zip` deflates, `stored` does not).
pub fn export_zip(files: &[PathBuf], zip_path: &Path, zip_type: &str) -> Result<()> {
    let method = match zip_type {
        "stored" => zip::CompressionMethod::Stored,
        _ => zip::CompressionMethod::Deflated,
    };
    let options = zip::write::SimpleFileOptions::default().compression_method(method);

    let file = std::fs::File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    for path in files {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("unnamed export file")))?;
        writer
            .start_file(name, options)
            .map_err(|err| Error::Internal(err.into()))?;
        writer.write_all(&std::fs::read(path)?)?;
    }
    writer.finish().map_err(|err| Error::Internal(err.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_format_names() {
        assert_eq!("standard".parse::<ExportFormat>().unwrap(), ExportFormat::Standard);
        assert_eq!("archive".parse::<ExportFormat>().unwrap(), ExportFormat::Archive);
        assert!("json".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn zips_exported_files() {
        let dir = tempfile::tempdir().unwrap();
        let exported = dir.path().join("contracts.json");
        std::fs::write(&exported, "{}").unwrap();
        let zip_path = dir.path().join("export.zip");
        export_zip(&[exported], &zip_path, "zip").unwrap();
        assert!(zip_path.is_file());

        let mut archive =
            zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.by_index(0).unwrap().name(), "contracts.json");
    }
}
