//! Etherscan verification fetcher.
//!
//! The target is a chain-prefixed address. Verified sources are fetched
//! from the explorer API, materialized under
//! `crytic-export/etherscan-contracts/<chain>-<address>-<contract>/`
//! together with a `crytic_compile.config.json` carrying the compiler
//! settings, then the directory is re-dispatched through the platform
//! registry. An already-materialized directory short-circuits the
//! network entirely.

use crate::config::{CompileConfig, CONFIG_FILE_NAME};
use crate::errors::{Error, Result};
use crate::hash::keccak256;
use crate::platform::{self, Platform};
use crate::project::Project;
use crate::unit::{CompilationUnit, ContractArtifact};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

const EXPORT_SUBDIR: &str = "etherscan-contracts";
const MAX_ATTEMPTS: u32 = 5;

/// chain label -> API host infix.
const NETWORKS: &[(&str, &str)] = &[
    ("mainet", ""),
    ("ropsten", "-ropsten"),
    ("kovan", "-kovan"),
    ("rinkeby", "-rinkeby"),
    ("goerli", "-goerli"),
    ("sepolia", "-sepolia"),
    ("tobalaba", "-tobalaba"),
];

pub struct Etherscan;

#[async_trait]
impl Platform for Etherscan {
    fn name(&self) -> &'static str {
        "Etherscan"
    }

    fn priority(&self) -> u32 {
        950
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        parse_target(target).is_some()
    }

    #[instrument(name = "etherscan", skip_all, fields(target = %target))]
    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let (chain, infix, address) =
            parse_target(target).ok_or_else(|| Error::InvalidTarget(target.to_string()))?;
        let export_base = config.export_dir.join(EXPORT_SUBDIR);

        // Idempotence: a previously materialized fetch is reused as-is.
        if let Some(existing) = find_materialized(&export_base, &chain, &address) {
            tracing::info!("reusing materialized sources at {}", existing.display());
            return platform::compile_with_registry(
                project,
                &existing.to_string_lossy(),
                config,
            )
            .await;
        }

        let api_key = config.etherscan_key();
        let client = reqwest::Client::new();
        let url = source_code_url(&infix, &address, api_key.as_deref());

        let verified = fetch_verified_source(&client, &url, &address, api_key.is_some()).await?;
        let Some(verified) = verified else {
            if config.etherscan_only_source_code {
                return Err(Error::SourceNotVerified(target.to_string()));
            }
            if config.etherscan_only_bytecode {
                let code =
                    fetch_deployed_code(&client, &infix, &address, api_key.as_deref()).await?;
                install_bytecode_only(project, &address, &code);
                return Ok(());
            }
            return Err(Error::SourceNotVerified(target.to_string()));
        };

        let directory = export_base.join(format!(
            "{chain}-{address}-{}",
            sanitize_component(&verified.contract_name)
        ));
        materialize(&directory, &verified)?;

        platform::compile_with_registry(project, &directory.to_string_lossy(), config).await
    }
}

/// Splits `mainet:0x…` (or a bare address) into chain label, API host
/// infix and address.
pub(crate) fn parse_target(target: &str) -> Option<(String, String, String)> {
    let trimmed = target.trim();
    if let Some((prefix, address)) = trimmed.split_once(':') {
        let (chain, infix) = NETWORKS.iter().find(|(chain, _)| *chain == prefix)?;
        if !is_address(address) {
            return None;
        }
        return Some((chain.to_string(), infix.to_string(), address.to_string()));
    }
    if is_address(trimmed) {
        return Some(("mainet".to_string(), String::new(), trimmed.to_string()));
    }
    None
}

fn is_address(raw: &str) -> bool {
    raw.len() == 42 && raw.starts_with("0x") && raw[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn source_code_url(infix: &str, address: &str, api_key: Option<&str>) -> String {
    let mut url = format!(
        "https://api{infix}.etherscan.io/api?module=contract&action=getsourcecode&address={address}"
    );
    if let Some(api_key) = api_key {
        url.push_str("&apikey=");
        url.push_str(api_key);
    }
    url
}

/// One verified-contract record from the explorer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VerifiedSource {
    pub contract_name: String,
    /// `v0.5.12+commit.7709ece9` as reported.
    pub compiler_version: String,
    pub optimization_used: bool,
    pub runs: Option<u32>,
    pub evm_version: Option<String>,
    pub source_code: String,
}

/// Queries the explorer, retrying rate limits with exponential back-off
/// and jitter. `Ok(None)` means the contract has no verified source.
pub(crate) async fn fetch_verified_source(
    client: &reqwest::Client,
    url: &str,
    address: &str,
    authenticated: bool,
) -> Result<Option<VerifiedSource>> {
    // Unauthenticated callers get a longer initial back-off.
    let base_delay = if authenticated { 1 } else { 5 };

    for attempt in 0..MAX_ATTEMPTS {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|err| Error::Network(err.into()))?;

        let rate_limited_status = response.status().as_u16() == 429;
        let body: Value = if rate_limited_status {
            Value::Null
        } else {
            response
                .json()
                .await
                .map_err(|err| Error::Network(err.into()))?
        };

        let rate_limited_body = body
            .get("result")
            .and_then(Value::as_str)
            .map(|result| result.contains("rate limit"))
            .unwrap_or(false);
        if rate_limited_status || rate_limited_body {
            if attempt + 1 == MAX_ATTEMPTS {
                return Err(Error::Network(anyhow::anyhow!(
                    "rate limited after {MAX_ATTEMPTS} attempts"
                )));
            }
            let delay = base_delay * 2u64.pow(attempt) + jitter(address, attempt);
            tracing::warn!("rate limited, backing off {delay}s");
            tokio::time::sleep(Duration::from_secs(delay)).await;
            continue;
        }

        let message = body.get("message").and_then(Value::as_str).unwrap_or("");
        if !message.starts_with("OK") {
            return Ok(None);
        }
        let Some(record) = body
            .get("result")
            .and_then(Value::as_array)
            .and_then(|records| records.first())
        else {
            return Ok(None);
        };

        let source_code = record
            .get("SourceCode")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if source_code.is_empty() {
            return Ok(None);
        }
        return Ok(Some(VerifiedSource {
            contract_name: record
                .get("ContractName")
                .and_then(Value::as_str)
                .unwrap_or("Contract")
                .to_string(),
            compiler_version: record
                .get("CompilerVersion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            optimization_used: record.get("OptimizationUsed").and_then(Value::as_str)
                == Some("1"),
            runs: record
                .get("Runs")
                .and_then(Value::as_str)
                .and_then(|runs| runs.parse().ok()),
            evm_version: record
                .get("EVMVersion")
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty() && *v != "Default")
                .map(str::to_string),
            source_code,
        }));
    }
    unreachable!("retry loop returns or errors")
}

/// Deterministic 0..3s jitter derived from the address.
fn jitter(address: &str, attempt: u32) -> u64 {
    let digest = keccak256(address.as_bytes());
    (u64::from(digest[attempt as usize % 32])) % 4
}

async fn fetch_deployed_code(
    client: &reqwest::Client,
    infix: &str,
    address: &str,
    api_key: Option<&str>,
) -> Result<String> {
    let mut url = format!(
        "https://api{infix}.etherscan.io/api?module=proxy&action=eth_getCode&address={address}&tag=latest"
    );
    if let Some(api_key) = api_key {
        url.push_str("&apikey=");
        url.push_str(api_key);
    }
    let body: Value = client
        .get(&url)
        .send()
        .await
        .map_err(|err| Error::Network(err.into()))?
        .json()
        .await
        .map_err(|err| Error::Network(err.into()))?;
    body.get("result")
        .and_then(Value::as_str)
        .filter(|code| code.len() > 2)
        .map(str::to_string)
        .ok_or_else(|| Error::SourceNotVerified(address.to_string()))
}

/// Installs a synthetic bytecode-only unit for an unverified contract.
fn install_bytecode_only(project: &mut Project, address: &str, code: &str) {
    let mut unit = CompilationUnit::new(address);
    let filename = project.index().intern(
        &format!("{address}.bin"),
        &crate::filename::NormalizeHints::default(),
    );
    unit.source_unit_mut(filename).contracts.insert(
        format!("Contract_{address}"),
        ContractArtifact {
            abi: Value::Array(Vec::new()),
            bytecode_runtime: code.strip_prefix("0x").unwrap_or(code).to_string(),
            ..Default::default()
        },
    );
    project.add_unit(unit);
    project.bytecode_only = true;
}

/// Writes the fetched sources and the compiler settings to disk,
/// preserving the directory structure the service reported.
pub(crate) fn materialize(directory: &Path, verified: &VerifiedSource) -> Result<()> {
    std::fs::create_dir_all(directory)?;

    let mut settings: Option<Value> = None;
    match decoded_source(&verified.source_code) {
        DecodedSource::StandardJsonInput(input) => {
            if let Some(sources) = input.get("sources").and_then(Value::as_object) {
                write_source_map(directory, sources)?;
            }
            settings = input.get("settings").cloned().map(|mut raw| {
                if let Some(object) = raw.as_object_mut() {
                    object.remove("outputSelection");
                }
                raw
            });
        }
        DecodedSource::SourceMap(sources) => {
            write_source_map(directory, &sources)?;
        }
        DecodedSource::Flattened(content) => {
            let file = directory.join(format!(
                "{}.sol",
                sanitize_component(&verified.contract_name)
            ));
            std::fs::write(file, content)?;
        }
    }

    let settings = settings.unwrap_or_else(|| {
        let mut built = json!({
            "optimizer": {
                "enabled": verified.optimization_used,
            }
        });
        if let Some(runs) = verified.runs {
            built["optimizer"]["runs"] = json!(runs);
        }
        if let Some(evm_version) = &verified.evm_version {
            built["evmVersion"] = json!(evm_version);
        }
        built
    });

    let mut solc_args = String::new();
    if verified.optimization_used {
        solc_args.push_str("--optimize");
        if let Some(runs) = verified.runs {
            solc_args.push_str(&format!(" --optimize-runs {runs}"));
        }
    }
    let mut compile_config = json!({
        "solc_version": short_compiler_version(&verified.compiler_version),
        "solc_settings": settings,
    });
    if !solc_args.is_empty() {
        compile_config["solc_args"] = json!(solc_args);
    }
    std::fs::write(
        directory.join(CONFIG_FILE_NAME),
        serde_json::to_vec_pretty(&compile_config)?,
    )?;
    Ok(())
}

enum DecodedSource {
    /// `{{ … }}`: a full standard-json input document.
    StandardJsonInput(Value),
    /// `{ … }`: a map of path -> `{content}`, possibly under `sources`.
    SourceMap(serde_json::Map<String, Value>),
    /// A single flattened source file.
    Flattened(String),
}

fn decoded_source(source_code: &str) -> DecodedSource {
    let trimmed = source_code.trim();
    if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
        if let Ok(input) = serde_json::from_str::<Value>(&trimmed[1..trimmed.len() - 1]) {
            return DecodedSource::StandardJsonInput(input);
        }
    }
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
            if let Some(Value::Object(sources)) = object.get("sources").cloned() {
                return DecodedSource::SourceMap(sources);
            }
            return DecodedSource::SourceMap(object);
        }
    }
    DecodedSource::Flattened(source_code.to_string())
}

fn write_source_map(
    directory: &Path,
    sources: &serde_json::Map<String, Value>,
) -> Result<()> {
    for (used_path, entry) in sources {
        let Some(content) = entry.get("content").and_then(Value::as_str) else {
            continue;
        };
        let relative = sanitize_path(used_path);
        let destination = directory.join(relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, content)?;
    }
    Ok(())
}

/// Service-reported paths may be absolute or try to climb out of the
/// materialized tree; both are flattened into safe relatives.
fn sanitize_path(raw: &str) -> PathBuf {
    Path::new(raw)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect()
}

/// `v0.5.12+commit.7709ece9` -> `0.5.12`.
fn short_compiler_version(raw: &str) -> String {
    let stripped = raw.trim_start_matches('v');
    stripped
        .split('+')
        .next()
        .unwrap_or(stripped)
        .to_string()
}

/// Finds an earlier materialization carrying its config file.
fn find_materialized(export_base: &Path, chain: &str, address: &str) -> Option<PathBuf> {
    let prefix = format!("{chain}-{address}-");
    let entries = std::fs::read_dir(export_base).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .map(|name| name.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
                && path.join(CONFIG_FILE_NAME).is_file()
        })
}
