//! Compiler descriptor stored per compilation unit.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity and settings of the compiler invocation that produced a
/// compilation unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerDescriptor {
    /// Compiler family (`solc`, `vyper`) or the binary name used.
    pub compiler: String,
    /// Dotted version, possibly with the `+commit` suffix.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize_runs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub via_ir: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remappings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_paths: Vec<PathBuf>,
}

impl Default for CompilerDescriptor {
    fn default() -> Self {
        Self {
            compiler: "unknown".to_string(),
            version: String::new(),
            optimized: None,
            optimize_runs: None,
            evm_version: None,
            via_ir: false,
            remappings: Vec::new(),
            include_paths: Vec::new(),
        }
    }
}

impl CompilerDescriptor {
    pub fn new(compiler: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// The bare `x.y.z` part of the version.
    pub fn short_version(&self) -> &str {
        self.version
            .split('+')
            .next()
            .unwrap_or(&self.version)
            .trim_start_matches('v')
    }

    pub fn semver(&self) -> Option<semver::Version> {
        semver::Version::parse(self.short_version()).ok()
    }

    /// True for versions strictly below `major.minor.patch`.
    pub fn is_below(&self, major: u64, minor: u64, patch: u64) -> bool {
        match self.semver() {
            Some(version) => version < semver::Version::new(major, minor, patch),
            None => false,
        }
    }

    /// solc < 0.4.10 does not report file names in its output; callers
    /// fall back to the target path.
    pub fn omits_filenames(&self) -> bool {
        self.compiler == "solc" && self.is_below(0, 4, 10)
    }
}

/// Extracts the first `x.y.z` version from free-form compiler output
/// such as `solc, the solidity compiler commandline interface\nVersion:
/// 0.8.14+commit.80d49f37.Linux.g++`.
pub fn parse_version_output(stdout: &str) -> Option<String> {
    find_versions(stdout).into_iter().next()
}

/// All `x.y.z` occurrences, in order.
pub fn find_versions(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() && (i == 0 || !bytes[i - 1].is_ascii_digit()) {
            if let Some((version, consumed)) = read_version(&text[i..]) {
                found.push(version);
                i += consumed;
                continue;
            }
        }
        i += 1;
    }
    found
}

fn read_version(text: &str) -> Option<(String, usize)> {
    let mut parts = 0;
    let mut end = 0;
    let bytes = text.as_bytes();
    while parts < 3 {
        let digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        end += digits;
        parts += 1;
        if parts < 3 {
            if bytes.get(end) != Some(&b'.') {
                return None;
            }
            end += 1;
        }
    }
    Some((text[..end].to_string(), end))
}
