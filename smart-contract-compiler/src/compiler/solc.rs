//! Locating and driving the Solidity compiler.
//!
//! Locator priority: explicit binary path, then an explicit version
//! resolved through the version manager (`SOLC_VERSION`, solc-select
//! convention), then the version implied by the first
//! `pragma solidity` directive, then plain `solc` on PATH. The chosen
//! binary is probed with `--version` before use.

use crate::artifacts::{CombinedJson, StandardJsonInput, StandardJsonOutput};
use crate::compiler::version::{find_versions, parse_version_output};
use crate::errors::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::instrument;

/// Combined-json fields requested from modern compilers.
const COMBINED_OPTIONS: &str = "abi,ast,bin,bin-runtime,srcmap,srcmap-runtime,userdoc,devdoc,hashes";
/// Compilers below 0.4.12 reject the `hashes` field.
const COMBINED_OPTIONS_LEGACY: &str = "abi,ast,bin,bin-runtime,srcmap,srcmap-runtime,userdoc,devdoc";

/// How to find the compiler binary.
#[derive(Clone, Debug, Default)]
pub struct SolcLocator {
    /// `--solc` override.
    pub binary: Option<PathBuf>,
    /// `--solc-version` override, resolved through the version manager.
    pub version: Option<String>,
    /// Source scanned for a `pragma solidity` directive when no version
    /// is given.
    pub pragma_source: Option<PathBuf>,
}

impl SolcLocator {
    #[instrument(name = "locate_solc", skip(self), level = "debug")]
    pub async fn locate(&self) -> Result<SolcRunner> {
        let mut env = BTreeMap::new();

        let binary = match &self.binary {
            Some(path) => path.clone(),
            None => {
                let managed_version = match &self.version {
                    Some(version) => Some(version.clone()),
                    None => self.guess_from_pragma().await,
                };
                if let Some(version) = managed_version {
                    env.insert("SOLC_VERSION".to_string(), version);
                }
                PathBuf::from("solc")
            }
        };

        let version = probe_version(&binary, &env).await?;
        Ok(SolcRunner {
            binary,
            version,
            env,
        })
    }

    async fn guess_from_pragma(&self) -> Option<String> {
        let source = self.pragma_source.as_ref()?;
        let content = tokio::fs::read_to_string(source).await.ok()?;
        content
            .lines()
            .find(|line| line.trim_start().starts_with("pragma solidity"))
            .and_then(|line| find_versions(line).into_iter().next())
    }
}

/// A located, probed compiler binary.
#[derive(Clone, Debug)]
pub struct SolcRunner {
    pub binary: PathBuf,
    /// Version reported by `--version`.
    pub version: String,
    /// Extra environment for every invocation (version manager hint).
    pub env: BTreeMap<String, String>,
}

/// Per-invocation knobs shared by both invocation styles.
#[derive(Clone, Debug, Default)]
pub struct InvocationOptions {
    pub working_dir: Option<PathBuf>,
    /// Extra pass-through arguments (`--solc-args`).
    pub extra_args: Vec<String>,
    /// Drop compiler warnings from the logs.
    pub disable_warnings: bool,
    /// Overall wall-clock budget; live subprocesses are killed on expiry.
    pub timeout: Option<Duration>,
}

impl SolcRunner {
    /// Feeds a standard-json document on stdin and parses the document
    /// produced on stdout. Diagnostics classified `error` fail the call;
    /// warnings are logged unless disabled.
    #[instrument(name = "solc_standard_json", skip_all, fields(version = %self.version))]
    pub async fn standard_json(
        &self,
        input: &StandardJsonInput,
        options: &InvocationOptions,
    ) -> Result<(StandardJsonOutput, serde_json::Value)> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--standard-json")
            .arg("--allow-paths")
            .arg(".")
            .args(&options.extra_args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|err| Error::CompilerNotFound(format!("{}: {err}", self.binary.display())))?;
        let payload = serde_json::to_vec(input)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
        }
        let output = wait_with_timeout(child, options.timeout).await?;

        let raw: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|_| {
            Error::CompilerCrashed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
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

    /// Legacy `--combined-json` invocation over on-disk sources.
    #[instrument(name = "solc_combined_json", skip_all, fields(version = %self.version))]
    pub async fn combined_json(
        &self,
        target: &Path,
        remappings: &[String],
        options: &InvocationOptions,
    ) -> Result<CombinedJson> {
        let mut command = Command::new(&self.binary);
        command
            .args(remappings)
            .arg(target)
            .arg("--combined-json")
            .arg(self.combined_options())
            .args(&options.extra_args)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }
        if self.supports_allow_paths() && !options.extra_args.iter().any(|a| a == "--allow-paths") {
            command.arg("--allow-paths").arg(".");
        }

        let child = command
            .spawn()
            .map_err(|err| Error::CompilerNotFound(format!("{}: {err}", self.binary.display())))?;
        let output = wait_with_timeout(child, options.timeout).await?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.is_empty() && !options.disable_warnings {
            tracing::warn!("compiler diagnostics on {}:\n{stderr}", target.display());
        }

        serde_json::from_slice(&output.stdout).map_err(|_| {
            if output.status.success() {
                Error::CompilerCrashed {
                    exit_code: output.status.code(),
                    stderr,
                }
            } else {
                Error::CompilationFailed {
                    diagnostics: vec![stderr],
                }
            }
        })
    }

    pub fn short_version(&self) -> &str {
        self.version.split('+').next().unwrap_or(&self.version)
    }

    fn semver(&self) -> Option<semver::Version> {
        semver::Version::parse(self.short_version()).ok()
    }

    fn combined_options(&self) -> &'static str {
        match self.semver() {
            Some(version) if version < semver::Version::new(0, 4, 12) => COMBINED_OPTIONS_LEGACY,
            _ => COMBINED_OPTIONS,
        }
    }

    fn supports_allow_paths(&self) -> bool {
        match self.semver() {
            Some(version) => version >= semver::Version::new(0, 4, 11),
            None => true,
        }
    }
}

async fn probe_version(binary: &Path, env: &BTreeMap<String, String>) -> Result<String> {
    let output = Command::new(binary)
        .arg("--version")
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| Error::CompilerNotFound(format!("{}: {err}", binary.display())))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version_output(&stdout).ok_or_else(|| {
        Error::CompilerNotFound(format!(
            "{}: no version in `--version` output: {stdout}",
            binary.display()
        ))
    })
}

pub(crate) async fn wait_with_timeout(
    child: tokio::process::Child,
    timeout: Option<Duration>,
) -> Result<std::process::Output> {
    let waited = child.wait_with_output();
    match timeout {
        Some(limit) => tokio::time::timeout(limit, waited)
            .await
            .map_err(|_| Error::CompilerCrashed {
                exit_code: None,
                stderr: format!("compiler timed out after {}s", limit.as_secs()),
            })?
            .map_err(Error::Io),
        None => waited.await.map_err(Error::Io),
    }
}
