//! Compilation settings shared by the CLI flags and the JSON config
//! file (`crytic_compile.config.json`).
//!
//! Explicit CLI values win over config-file values; config-file values
//! win over the built-in defaults. Unknown config keys are logged and
//! ignored.

use crate::compiler::solc::InvocationOptions;
use crate::errors::Result;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_EXPORT_DIR: &str = "crytic-export";
pub const CONFIG_FILE_NAME: &str = "crytic_compile.config.json";
pub const ETHERSCAN_API_KEY_ENV: &str = "ETHERSCAN_API_KEY";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompileConfig {
    /// Skip detection and force the named adapter.
    pub compile_force_framework: Option<String>,
    /// Run an arbitrary build command instead of the framework's own,
    /// then re-read artifacts.
    pub compile_custom_build: Option<String>,
    /// Strip the CBOR trailer from stored bytecodes.
    pub compile_remove_metadata: bool,
    /// Re-read existing artifacts without invoking the framework build.
    pub ignore_compile: bool,
    /// Retry a failed framework build once after a clean (legacy
    /// workaround for a 0.3.1-era framework bug).
    pub retry_clean: bool,

    pub solc: Option<PathBuf>,
    pub solc_version: Option<String>,
    pub solc_args: Option<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub solc_remaps: Vec<String>,
    pub solc_disable_warnings: bool,
    /// Aggregate a directory of sources into one standard-json unit.
    pub solc_standard_json: bool,
    pub solc_working_dir: Option<PathBuf>,
    /// Raw standard-json `settings` object, as materialized by the
    /// verification fetchers (carries viaIR, evmVersion, optimizer,
    /// libraries, remappings).
    pub solc_settings: Option<serde_json::Value>,
    pub vyper: Option<PathBuf>,

    pub etherscan_api_key: Option<String>,
    pub etherscan_only_source_code: bool,
    pub etherscan_only_bytecode: bool,

    pub export_dir: PathBuf,

    pub foundry_out_directory: PathBuf,
    pub hardhat_artifacts_directory: PathBuf,
    pub truffle_build_directory: PathBuf,

    /// Overall compile budget in seconds; live subprocesses are killed
    /// on expiry.
    pub compile_timeout: Option<u64>,
    /// Bound on concurrently compiled sub-projects; defaults to the
    /// available cores.
    pub max_concurrency: Option<usize>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            compile_force_framework: None,
            compile_custom_build: None,
            compile_remove_metadata: false,
            ignore_compile: false,
            retry_clean: false,
            solc: None,
            solc_version: None,
            solc_args: None,
            solc_remaps: Vec::new(),
            solc_disable_warnings: false,
            solc_standard_json: false,
            solc_working_dir: None,
            solc_settings: None,
            vyper: None,
            etherscan_api_key: None,
            etherscan_only_source_code: false,
            etherscan_only_bytecode: false,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            foundry_out_directory: PathBuf::from("out"),
            hardhat_artifacts_directory: PathBuf::from("artifacts"),
            truffle_build_directory: PathBuf::from("build/contracts"),
            compile_timeout: None,
            max_concurrency: None,
        }
    }
}

impl CompileConfig {
    /// Loads a config file and fills every field still carrying its
    /// built-in default. Fields already set (by CLI flags) are kept.
    pub fn apply_config_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)?;
        let file_value: serde_json::Value = serde_json::from_str(&raw)?;
        if let Some(object) = file_value.as_object() {
            for key in object.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::info!("{} has an unknown key: {key}", path.display());
                }
            }
        }
        let from_file: CompileConfig = serde_json::from_value(file_value)?;
        let defaults = CompileConfig::default();

        macro_rules! fill {
            ($($field:ident),* $(,)?) => {
                $(if self.$field == defaults.$field {
                    self.$field = from_file.$field;
                })*
            };
        }
        fill!(
            compile_force_framework,
            compile_custom_build,
            compile_remove_metadata,
            ignore_compile,
            retry_clean,
            solc,
            solc_version,
            solc_args,
            solc_remaps,
            solc_disable_warnings,
            solc_standard_json,
            solc_working_dir,
            solc_settings,
            vyper,
            etherscan_api_key,
            etherscan_only_source_code,
            etherscan_only_bytecode,
            export_dir,
            foundry_out_directory,
            hardhat_artifacts_directory,
            truffle_build_directory,
            compile_timeout,
            max_concurrency,
        );
        Ok(())
    }

    pub fn invocation_options(&self) -> InvocationOptions {
        InvocationOptions {
            working_dir: self.solc_working_dir.clone(),
            extra_args: self
                .solc_args
                .as_deref()
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            disable_warnings: self.solc_disable_warnings,
            timeout: self.compile_timeout.map(Duration::from_secs),
        }
    }

    /// `--etherscan-apikey` with the environment variable as fallback.
    pub fn etherscan_key(&self) -> Option<String> {
        self.etherscan_api_key
            .clone()
            .or_else(|| std::env::var(ETHERSCAN_API_KEY_ENV).ok())
    }
}

const KNOWN_KEYS: &[&str] = &[
    "compile_force_framework",
    "compile_custom_build",
    "compile_remove_metadata",
    "ignore_compile",
    "retry_clean",
    "solc",
    "solc_version",
    "solc_args",
    "solc_remaps",
    "solc_disable_warnings",
    "solc_standard_json",
    "solc_working_dir",
    "solc_settings",
    "vyper",
    "etherscan_api_key",
    "etherscan_only_source_code",
    "etherscan_only_bytecode",
    "export_dir",
    "foundry_out_directory",
    "hardhat_artifacts_directory",
    "truffle_build_directory",
    "compile_timeout",
    "max_concurrency",
];

/// Remappings arrive as a list from the CLI but may be a single
/// space-separated string in config files.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::One(joined)) => joined.split_whitespace().map(str::to_string).collect(),
        Some(Raw::Many(list)) => list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_file_fills_defaults_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{
                "solc_version": "0.5.12",
                "solc_args": "--optimize --optimize-runs 200",
                "solc_remaps": "@oz/=node_modules/@oz/ ds-test/=lib/ds-test/src/",
                "export_dir": "out-export",
                "unknown_knob": 42
            }"#,
        )
        .unwrap();

        let mut config = CompileConfig {
            // Pretend the CLI already set this one.
            export_dir: PathBuf::from("cli-export"),
            ..Default::default()
        };
        config.apply_config_file(&path).unwrap();

        assert_eq!(config.solc_version.as_deref(), Some("0.5.12"));
        assert_eq!(config.solc_remaps.len(), 2);
        // CLI value survives the merge.
        assert_eq!(config.export_dir, PathBuf::from("cli-export"));

        let options = config.invocation_options();
        assert_eq!(options.extra_args, vec!["--optimize", "--optimize-runs", "200"]);
    }

    #[test]
    fn remap_lists_parse_from_both_shapes() {
        let one: CompileConfig =
            serde_json::from_str(r#"{"solc_remaps": "a=b c=d"}"#).unwrap();
        let many: CompileConfig =
            serde_json::from_str(r#"{"solc_remaps": ["a=b", "c=d"]}"#).unwrap();
        assert_eq!(one.solc_remaps, many.solc_remaps);
    }
}
