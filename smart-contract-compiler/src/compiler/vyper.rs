//! Driving the Vyper compiler.
//!
//! Vyper speaks its own flavor of standard-json: the input document is
//! handed over as a file path and the output is written to a file given
//! with `-o`. Outputs are adapted into the same per-contract record
//! shape as solc (no libraries, no jump field in source maps).

use crate::artifacts::{StandardJsonInput, StandardJsonOutput};
use crate::compiler::solc::{wait_with_timeout, InvocationOptions};
use crate::compiler::version::parse_version_output;
use crate::errors::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::instrument;

#[derive(Clone, Debug)]
pub struct VyperRunner {
    pub binary: PathBuf,
    pub version: String,
}

impl VyperRunner {
    /// Probes the given binary (default `vyper` on PATH).
    pub async fn locate(binary: Option<PathBuf>) -> Result<Self> {
        let binary = binary.unwrap_or_else(|| PathBuf::from("vyper"));
        let output = Command::new(&binary)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| Error::CompilerNotFound(format!("{}: {err}", binary.display())))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = parse_version_output(&stdout).ok_or_else(|| {
            Error::CompilerNotFound(format!(
                "{}: no version in `--version` output: {stdout}",
                binary.display()
            ))
        })?;
        Ok(Self { binary, version })
    }

    #[instrument(name = "vyper_standard_json", skip_all, fields(version = %self.version))]
    pub async fn standard_json(
        &self,
        input: &StandardJsonInput,
        options: &InvocationOptions,
    ) -> Result<(StandardJsonOutput, serde_json::Value)> {
        // The input and output documents go through a scoped temp dir,
        // released on every exit path.
        let scratch = tempfile::tempdir()?;
        let input_path = scratch.path().join("input.json");
        let output_path = scratch.path().join("output.json");
        tokio::fs::write(&input_path, serde_json::to_vec(input)?).await?;

        let mut command = Command::new(&self.binary);
        command
            .arg(&input_path)
            .arg("--standard-json")
            .arg("-o")
            .arg(&output_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }
        let child = command
            .spawn()
            .map_err(|err| Error::CompilerNotFound(format!("{}: {err}", self.binary.display())))?;
        let finished = wait_with_timeout(child, options.timeout).await?;

        // Newer releases print the document to stdout instead of
        // honoring `-o`; accept either.
        let raw_bytes = match tokio::fs::read(&output_path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            _ => finished.stdout.clone(),
        };
        let raw: serde_json::Value =
            serde_json::from_slice(&raw_bytes).map_err(|_| Error::CompilerCrashed {
                exit_code: finished.status.code(),
                stderr: String::from_utf8_lossy(&finished.stderr).into_owned(),
            })?;
        let parsed: StandardJsonOutput = serde_json::from_value(raw.clone())?;

        if parsed.has_errors() {
            return Err(Error::CompilationFailed {
                diagnostics: parsed.error_messages(),
            });
        }
        if !options.disable_warnings {
            for warning in parsed.warning_messages() {
                tracing::warn!("{warning}");
            }
        }
        Ok((parsed, raw))
    }
}

/// Vyper's default output selection: like solc's but without
/// solc-specific members.
pub fn vyper_input(sources: &[(String, String)]) -> StandardJsonInput {
    let mut input = StandardJsonInput::new("Vyper");
    input.settings.output_selection = serde_json::json!({
        "*": {
            "*": [
                "abi",
                "devdoc",
                "userdoc",
                "evm.bytecode",
                "evm.deployedBytecode",
                "evm.deployedBytecode.sourceMap",
            ],
            "": ["ast"],
        }
    });
    for (path, content) in sources {
        input.add_source_content(path.clone(), content.clone());
    }
    input
}
