//! Sourcify verification fetcher.
//!
//! Targets use a `sourcify-<chain>:` prefix ahead of the address; the
//! chain may be a decimal id or a 0x-hex id. The service returns the
//! full file list (sources plus `metadata.json`); everything is
//! materialized under
//! `crytic-export/sourcify-contracts/<chain>-<address>-<contract>/` and
//! re-dispatched through the registry.

use crate::config::{CompileConfig, CONFIG_FILE_NAME};
use crate::errors::{Error, Result};
use crate::platform::{self, Platform};
use crate::project::Project;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

const DEFAULT_HOST: &str = "https://sourcify.dev/server";
const EXPORT_SUBDIR: &str = "sourcify-contracts";
const MAX_RETRIES: u32 = 5;

pub struct Sourcify;

#[async_trait]
impl Platform for Sourcify {
    fn name(&self) -> &'static str {
        "Sourcify"
    }

    fn priority(&self) -> u32 {
        940
    }

    fn detect(&self, target: &str, _config: &CompileConfig) -> bool {
        parse_target(target).is_some()
    }

    #[instrument(name = "sourcify", skip_all, fields(target = %target))]
    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()> {
        let (chain, address) =
            parse_target(target).ok_or_else(|| Error::InvalidTarget(target.to_string()))?;
        let export_base = config.export_dir.join(EXPORT_SUBDIR);

        if let Some(existing) = find_materialized(&export_base, &chain, &address) {
            tracing::info!("reusing materialized sources at {}", existing.display());
            return platform::compile_with_registry(
                project,
                &existing.to_string_lossy(),
                config,
            )
            .await;
        }

        let client = retrying_client()?;
        let files = fetch_files(&client, DEFAULT_HOST, &chain, &address).await?;
        let directory = materialize(&export_base, &chain, &address, &files)
            .map_err(|err| err.with_platform(self.name(), target))?;

        platform::compile_with_registry(project, &directory.to_string_lossy(), config).await
    }
}

/// `sourcify:0x…`, `sourcify-1:0x…` or `sourcify-0x1:0x…`.
pub(crate) fn parse_target(target: &str) -> Option<(String, String)> {
    let (prefix, address) = target.trim().split_once(':')?;
    if address.len() != 42
        || !address.starts_with("0x")
        || !address[2..].chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }
    let chain = match prefix {
        "sourcify" => "1".to_string(),
        _ => {
            let raw = prefix.strip_prefix("sourcify-")?;
            if let Some(hex_id) = raw.strip_prefix("0x") {
                u64::from_str_radix(hex_id, 16).ok()?.to_string()
            } else {
                raw.parse::<u64>().ok()?.to_string()
            }
        }
    };
    Some((chain, address.to_string()))
}

fn retrying_client() -> Result<ClientWithMiddleware> {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|err| Error::Network(err.into()))?;
    Ok(reqwest_middleware::ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiFilesResponse {
    pub files: Vec<ApiFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiFile {
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub content: String,
}

pub(crate) async fn fetch_files(
    client: &ClientWithMiddleware,
    host: &str,
    chain: &str,
    address: &str,
) -> Result<Vec<ApiFile>> {
    let url = format!("{host}/files/any/{chain}/{address}");
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|err| Error::Network(err.into()))?;
    if response.status().as_u16() == 404 {
        return Err(Error::SourceNotVerified(format!("{chain}:{address}")));
    }
    let response = response
        .error_for_status()
        .map_err(|err| Error::Network(err.into()))?;
    let parsed: ApiFilesResponse = response
        .json()
        .await
        .map_err(|err| Error::Network(err.into()))?;
    if parsed.files.is_empty() {
        return Err(Error::SourceNotVerified(format!("{chain}:{address}")));
    }
    Ok(parsed.files)
}

/// The slice of `metadata.json` the re-dispatch needs.
#[derive(Debug, Deserialize)]
struct Metadata {
    compiler: MetadataCompiler,
    settings: MetadataSettings,
}

#[derive(Debug, Deserialize)]
struct MetadataCompiler {
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSettings {
    #[serde(default)]
    compilation_target: BTreeMap<String, String>,
    #[serde(default)]
    optimizer: Value,
    #[serde(default)]
    evm_version: Option<String>,
    #[serde(default)]
    libraries: Value,
    #[serde(default)]
    remappings: Vec<String>,
}

/// Writes the fetched files under `<chain>-<address>-<contract>/`,
/// preserving the service's directory structure, plus the compile
/// config recovered from `metadata.json`.
pub(crate) fn materialize(
    export_base: &Path,
    chain: &str,
    address: &str,
    files: &[ApiFile],
) -> Result<PathBuf> {
    let metadata = files
        .iter()
        .find(|file| file.name == "metadata.json")
        .ok_or_else(|| Error::SourceNotVerified(format!("{chain}:{address}: no metadata.json")))?;
    let metadata: Metadata =
        serde_json::from_str(&metadata.content).map_err(Error::Json)?;

    let contract_name = metadata
        .settings
        .compilation_target
        .values()
        .next()
        .cloned()
        .unwrap_or_else(|| "Contract".to_string());
    let directory = export_base.join(format!("{chain}-{address}-{contract_name}"));

    for file in files {
        let destination = directory.join(relative_path(file, address));
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, &file.content)?;
    }

    let mut settings = json!({
        "optimizer": metadata.settings.optimizer,
        "libraries": metadata.settings.libraries,
        "remappings": metadata.settings.remappings,
    });
    if let Some(evm_version) = &metadata.settings.evm_version {
        settings["evmVersion"] = json!(evm_version);
    }
    let compile_config = json!({
        "solc_version": metadata.compiler.version.split('+').next(),
        "solc_settings": settings,
    });
    std::fs::write(
        directory.join(CONFIG_FILE_NAME),
        serde_json::to_vec_pretty(&compile_config)?,
    )?;
    Ok(directory)
}

/// The repository path ends with `…/<address>/sources/<real path>`;
/// everything before the address is repository layout, not project
/// structure.
fn relative_path(file: &ApiFile, address: &str) -> PathBuf {
    let path = if file.path.is_empty() { &file.name } else { &file.path };
    let tail = path
        .split(&format!("/{address}/"))
        .last()
        .unwrap_or(path)
        .trim_start_matches("sources/");
    let sanitized: PathBuf = Path::new(tail)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if sanitized.as_os_str().is_empty() {
        PathBuf::from(&file.name)
    } else {
        sanitized
    }
}

fn find_materialized(export_base: &Path, chain: &str, address: &str) -> Option<PathBuf> {
    let prefix = format!("{chain}-{address}-");
    std::fs::read_dir(export_base)
        .ok()?
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADDRESS: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";

    fn metadata_content() -> String {
        json!({
            "compiler": {"version": "0.8.7+commit.e28d00a7"},
            "language": "Solidity",
            "settings": {
                "compilationTarget": {"contracts/Box.sol": "Box"},
                "optimizer": {"enabled": false, "runs": 200},
                "evmVersion": "london",
                "libraries": {},
                "remappings": []
            }
        })
        .to_string()
    }

    #[test]
    fn parses_sourcify_prefixes() {
        assert_eq!(
            parse_target(&format!("sourcify:{ADDRESS}")).unwrap().0,
            "1"
        );
        assert_eq!(
            parse_target(&format!("sourcify-5:{ADDRESS}")).unwrap().0,
            "5"
        );
        assert_eq!(
            parse_target(&format!("sourcify-0xa:{ADDRESS}")).unwrap().0,
            "10"
        );
        assert!(parse_target(&format!("mainet:{ADDRESS}")).is_none());
        assert!(parse_target(ADDRESS).is_none());
    }

    #[tokio::test]
    async fn fetches_file_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/files/any/1/{ADDRESS}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    {"name": "metadata.json", "path": "", "content": metadata_content()},
                    {
                        "name": "Box.sol",
                        "path": format!("/repository/contracts/full_match/1/{ADDRESS}/sources/contracts/Box.sol"),
                        "content": "contract Box {}"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = retrying_client().unwrap();
        let files = fetch_files(&client, &server.uri(), "1", ADDRESS).await.unwrap();
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn missing_verification_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "Files have not been found"})),
            )
            .mount(&server)
            .await;

        let client = retrying_client().unwrap();
        let err = fetch_files(&client, &server.uri(), "1", ADDRESS)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotVerified(_)));
    }

    #[test]
    fn materializes_with_repository_layout_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            ApiFile {
                name: "metadata.json".to_string(),
                path: String::new(),
                content: metadata_content(),
            },
            ApiFile {
                name: "Box.sol".to_string(),
                path: format!(
                    "/repository/contracts/full_match/1/{ADDRESS}/sources/contracts/Box.sol"
                ),
                content: "contract Box {}".to_string(),
            },
        ];

        let directory = materialize(dir.path(), "1", ADDRESS, &files).unwrap();
        assert_eq!(
            directory.file_name().unwrap().to_string_lossy(),
            format!("1-{ADDRESS}-Box")
        );
        assert!(directory.join("contracts/Box.sol").is_file());

        let config: Value = serde_json::from_str(
            &std::fs::read_to_string(directory.join(CONFIG_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(config["solc_version"], "0.8.7");
        assert_eq!(config["solc_settings"]["evmVersion"], "london");

        assert_eq!(find_materialized(dir.path(), "1", ADDRESS).unwrap(), directory);
    }
}
