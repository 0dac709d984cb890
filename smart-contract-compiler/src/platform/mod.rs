//! Platform adapters and the ordered detection registry.
//!
//! Each adapter answers "can I handle this target?" and, if yes,
//! installs one or more compilation units into the project. Adapters
//! are tried in priority order (lower first); the first match wins.

pub mod archive;
pub mod brownie;
pub mod buidler;
pub mod dapp;
pub mod embark;
pub mod etherlime;
pub mod etherscan;
pub mod foundry;
pub mod hardhat;
pub mod solc;
pub mod sourcify;
pub mod standard_json;
pub mod truffle;
pub mod vyper;
pub mod waffle;

use crate::config::CompileConfig;
use crate::errors::{Error, Result};
use crate::project::Project;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

/// A build-system driver. Stateless; the target travels with each call.
#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower priorities are tried first.
    fn priority(&self) -> u32;

    /// Static, filesystem-only check; never an error.
    fn detect(&self, target: &str, config: &CompileConfig) -> bool;

    /// Drives the build system and installs compilation units. Every
    /// file path introduced must go through the project's identity
    /// index.
    async fn compile(
        &self,
        project: &mut Project,
        target: &str,
        config: &CompileConfig,
    ) -> Result<()>;

    /// Whether a path belongs to this platform's dependency tree.
    fn is_dependency(&self, _path: &Path) -> bool {
        false
    }

    /// Commands a user would run to exercise the project's tests.
    fn guessed_tests(&self) -> Vec<String> {
        Vec::new()
    }

    /// Removes build artifacts.
    async fn clean(&self, _target: &str, _config: &CompileConfig) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Platform").field(&self.name()).finish()
    }
}

/// All registered adapters, sorted by priority.
pub fn all() -> &'static [Box<dyn Platform>] {
    static REGISTRY: OnceLock<Vec<Box<dyn Platform>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut adapters: Vec<Box<dyn Platform>> = vec![
            Box::new(archive::Archive),
            Box::new(archive::StandardImport),
            Box::new(foundry::Foundry),
            Box::new(hardhat::HardhatV3),
            Box::new(hardhat::Hardhat),
            Box::new(truffle::Truffle),
            Box::new(dapp::Dapp),
            Box::new(brownie::Brownie),
            Box::new(waffle::Waffle),
            Box::new(embark::Embark),
            Box::new(etherlime::Etherlime),
            Box::new(buidler::Buidler),
            Box::new(sourcify::Sourcify),
            Box::new(etherscan::Etherscan),
            Box::new(solc::Solc),
            Box::new(vyper::VyperPlatform),
            Box::new(standard_json::SolcStandardJson),
        ];
        adapters.sort_by_key(|adapter| adapter.priority());
        adapters
    })
}

/// Finds a registered adapter by (case-insensitive) name.
pub fn by_name(name: &str) -> Option<&'static dyn Platform> {
    all()
        .iter()
        .find(|adapter| adapter.name().eq_ignore_ascii_case(name))
        .map(|adapter| adapter.as_ref())
}

/// Picks the adapter for a target. With `--compile-force-framework` only
/// the named adapter is consulted and its veto is fatal; otherwise the
/// first detecting adapter wins, with the direct compiler as the final
/// fallback for existing paths.
pub fn resolve(target: &str, config: &CompileConfig) -> Result<&'static dyn Platform> {
    if let Some(forced) = &config.compile_force_framework {
        let adapter = all()
            .iter()
            .find(|adapter| adapter.name().eq_ignore_ascii_case(forced))
            .ok_or_else(|| Error::NoPlatformDetected(format!("unknown framework `{forced}`")))?;
        if !adapter.detect(target, config) {
            return Err(Error::NoPlatformDetected(format!(
                "{} rejected `{target}`",
                adapter.name()
            )));
        }
        return Ok(adapter.as_ref());
    }

    for adapter in all() {
        if adapter.detect(target, config) {
            return Ok(adapter.as_ref());
        }
    }

    // Final fallback: hand an existing file to the direct compiler. A
    // directory that reached this point has nothing compilable in it.
    if Path::new(target).is_file() {
        return Ok(all()
            .iter()
            .find(|adapter| adapter.name() == "solc")
            .expect("direct compiler registered")
            .as_ref());
    }

    if Path::new(target).exists() || looks_like_address(target) {
        Err(Error::NoPlatformDetected(target.to_string()))
    } else {
        Err(Error::InvalidTarget(target.to_string()))
    }
}

/// Resolves and compiles a target into an existing project. Used by the
/// verification fetchers to re-dispatch the materialized sources.
pub async fn compile_with_registry(
    project: &mut Project,
    target: &str,
    config: &CompileConfig,
) -> Result<()> {
    let adapter = resolve(target, config)?;
    tracing::debug!(adapter = adapter.name(), target, "re-dispatching");
    adapter
        .compile(project, target, config)
        .await
        .map_err(|err| err.with_platform(adapter.name(), target))
}

/// `0x` + 40 hex characters, optionally chain-prefixed (`mainet:0x…`,
/// `sourcify-1:0x…`).
pub fn looks_like_address(target: &str) -> bool {
    let address = match target.rsplit_once(':') {
        Some((_, address)) => address,
        None => target,
    };
    let trimmed = address.trim();
    trimmed.len() == 42
        && trimmed.starts_with("0x")
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Runs a framework build command with inherited environment, logging
/// its output. Returns an error only when the process cannot be spawned
/// or exits nonzero.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
) -> Result<std::process::Output> {
    tracing::info!("running `{program} {}`", args.join(" "));
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| Error::CompilerNotFound(format!("{program}: {err}")))?;
    tracing::debug!("{}", String::from_utf8_lossy(&output.stdout));
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::error!("`{program}` failed:\n{stderr}");
        return Err(Error::CompilerCrashed {
            exit_code: output.status.code(),
            stderr,
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_is_priority_ordered() {
        let priorities: Vec<u32> = all().iter().map(|adapter| adapter.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        // Archive import is consulted before every framework.
        assert_eq!(all()[0].name(), "Archive");
    }

    #[test]
    fn address_recognition() {
        assert!(looks_like_address("0x6B175474E89094C44Da98b954EedeAC495271d0F"));
        assert!(looks_like_address("mainet:0x6B175474E89094C44Da98b954EedeAC495271d0F"));
        assert!(looks_like_address("sourcify-1:0x6B175474E89094C44Da98b954EedeAC495271d0F"));
        assert!(!looks_like_address("contracts/Token.sol"));
        assert!(!looks_like_address("0x123"));
    }

    #[test]
    fn forced_framework_veto_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompileConfig {
            compile_force_framework: Some("Foundry".to_string()),
            ..Default::default()
        };
        let err = resolve(&dir.path().to_string_lossy(), &config).unwrap_err();
        assert!(matches!(err, Error::NoPlatformDetected(_)));
    }

    #[test]
    fn detection_picks_foundry_over_hardhat() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foundry.toml"), "[profile.default]").unwrap();
        std::fs::write(dir.path().join("hardhat.config.js"), "module.exports = {}").unwrap();
        let adapter = resolve(&dir.path().to_string_lossy(), &CompileConfig::default()).unwrap();
        assert_eq!(adapter.name(), "Foundry");
    }

    #[test]
    fn missing_target_is_invalid() {
        let err = resolve("/definitely/not/here.sol", &CompileConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidTarget(_)));
    }
}
