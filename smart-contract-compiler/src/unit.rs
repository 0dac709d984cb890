//! The canonical artifact model: compilation units, per-file source
//! units and per-contract artifacts.
//!
//! Units are populated by platform adapters while they parse compiler
//! output and are read-only afterwards. Library linking never mutates
//! the stored templates; fully linked results are cached per unit,
//! keyed by a fingerprint of the address map.

use crate::artifacts::{CombinedJson, ContractOutput, StandardJsonOutput};
use crate::compiler::CompilerDescriptor;
use crate::errors::Result;
use crate::filename::{Filename, FilenameIndex, NormalizeHints};
use crate::hash::selector;
use crate::libraries::{self, LibraryContext};
use crate::metadata;
use crate::natspec::Natspec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    #[default]
    Contract,
    Library,
    Interface,
    Abstract,
}

/// One contract's slice of a source unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractArtifact {
    pub abi: Value,
    /// Creation bytecode template (hex, no `0x`), may contain library
    /// placeholders. Empty for interfaces and abstract contracts.
    pub bytecode_init: String,
    /// Deployed bytecode template.
    pub bytecode_runtime: String,
    /// Compressed source map segments (split on `;`).
    pub srcmap_init: Vec<String>,
    pub srcmap_runtime: Vec<String>,
    pub natspec: Natspec,
    pub kind: ContractKind,
    /// Names of libraries this contract references.
    pub libraries: Vec<String>,
    /// Direct contract dependencies, sorted for stability.
    pub dependencies: Vec<String>,
    /// Function signature -> 4-byte selector hex.
    pub hashes: BTreeMap<String, String>,
}

impl ContractArtifact {
    /// Selector table from the ABI when the compiler did not emit one.
    pub fn compute_hashes(&mut self) {
        if !self.hashes.is_empty() {
            return;
        }
        let Some(entries) = self.abi.as_array() else {
            return;
        };
        for entry in entries {
            if entry.get("type").and_then(Value::as_str) != Some("function") {
                continue;
            }
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            let inputs: Vec<&str> = entry
                .get("inputs")
                .and_then(Value::as_array)
                .map(|inputs| {
                    inputs
                        .iter()
                        .filter_map(|i| i.get("type").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            let signature = format!("{name}({})", inputs.join(","));
            self.hashes.insert(signature.clone(), selector(&signature));
        }
    }
}

/// One source file's compiled data within a compilation unit.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    pub filename: Arc<Filename>,
    pub ast: Value,
    /// Numeric identifier the compiler assigned for source maps.
    pub source_id: Option<u32>,
    pub contracts: BTreeMap<String, ContractArtifact>,
}

impl SourceUnit {
    fn new(filename: Arc<Filename>) -> Self {
        Self {
            filename,
            ast: Value::Null,
            source_id: None,
            contracts: BTreeMap::new(),
        }
    }
}

/// One compiler invocation's worth of output.
#[derive(Debug)]
pub struct CompilationUnit {
    unique_id: String,
    pub compiler: CompilerDescriptor,
    /// Identities in the order the compiler emitted them.
    pub filenames: Vec<Arc<Filename>>,
    pub source_units: BTreeMap<PathBuf, SourceUnit>,
    link_cache: Mutex<HashMap<String, BTreeMap<String, (String, String)>>>,
}

impl CompilationUnit {
    pub fn new(unique_id: impl Into<String>) -> Self {
        let mut unique_id = unique_id.into();
        if unique_id == "." || unique_id.is_empty() {
            unique_id = uuid::Uuid::new_v4().to_string();
        }
        Self {
            unique_id,
            compiler: CompilerDescriptor::default(),
            filenames: Vec::new(),
            source_units: BTreeMap::new(),
            link_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Fetch-or-create the source unit for an identity, keeping the
    /// emission order of first appearance.
    pub fn source_unit_mut(&mut self, filename: Arc<Filename>) -> &mut SourceUnit {
        if !self.filenames.iter().any(|f| **f == *filename) {
            self.filenames.push(Arc::clone(&filename));
        }
        self.source_units
            .entry(filename.absolute.clone())
            .or_insert_with(|| SourceUnit::new(filename))
    }

    pub fn contract_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .source_units
            .values()
            .flat_map(|unit| unit.contracts.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn find_contract(&self, name: &str) -> Option<(&SourceUnit, &ContractArtifact)> {
        self.source_units
            .values()
            .find_map(|unit| unit.contracts.get(name).map(|c| (unit, c)))
    }

    /// Naming contexts of every contract, used to recognize library
    /// placeholders across compiler versions.
    pub fn library_contexts(&self) -> Vec<LibraryContext> {
        self.source_units
            .values()
            .flat_map(|unit| {
                unit.contracts.keys().map(|name| LibraryContext {
                    name: name.clone(),
                    absolute: unit.filename.absolute.to_string_lossy().into_owned(),
                    used: unit.filename.used.clone(),
                })
            })
            .collect()
    }

    /// Libraries a contract references: the compiler-reported list when
    /// present, otherwise discovered from placeholders in its templates.
    pub fn libraries_used(&self, contract: &str) -> Vec<String> {
        let Some((_, artifact)) = self.find_contract(contract) else {
            return Vec::new();
        };
        if !artifact.libraries.is_empty() {
            return artifact.libraries.clone();
        }
        let contexts = self.library_contexts();
        let mut names: Vec<String> = libraries::find_placeholders(&artifact.bytecode_init)
            .into_iter()
            .chain(libraries::find_placeholders(&artifact.bytecode_runtime))
            .filter_map(|token| libraries::resolve_token(&token, &contexts))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Contract -> required libraries, for topological link order.
    pub fn library_graph(&self) -> BTreeMap<String, Vec<String>> {
        self.contract_names()
            .into_iter()
            .map(|name| {
                let used = self.libraries_used(&name);
                (name, used)
            })
            .collect()
    }

    /// Fully linked `(init, runtime)` bytecodes for a contract. Results
    /// are cached per address map; the stored templates are untouched.
    pub fn linked_bytecodes(
        &self,
        contract: &str,
        addresses: &BTreeMap<String, String>,
    ) -> Result<(String, String)> {
        let fingerprint = libraries::fingerprint(addresses);
        if let Some(cached) = self
            .link_cache
            .lock()
            .expect("link cache poisoned")
            .get(&fingerprint)
            .and_then(|by_contract| by_contract.get(contract))
        {
            return Ok(cached.clone());
        }

        let (_, artifact) = self.find_contract(contract).ok_or_else(|| {
            crate::errors::Error::Internal(anyhow::anyhow!("unknown contract `{contract}`"))
        })?;
        let contexts = self.library_contexts();
        let init = libraries::link_complete(&artifact.bytecode_init, addresses, &contexts)?;
        let runtime = libraries::link_complete(&artifact.bytecode_runtime, addresses, &contexts)?;

        self.link_cache
            .lock()
            .expect("link cache poisoned")
            .entry(fingerprint)
            .or_default()
            .insert(contract.to_string(), (init.clone(), runtime.clone()));
        Ok((init, runtime))
    }

    /// Strips recognized metadata trailers from every stored bytecode.
    pub fn remove_metadata(&mut self) {
        for unit in self.source_units.values_mut() {
            for artifact in unit.contracts.values_mut() {
                artifact.bytecode_init = metadata::strip(&artifact.bytecode_init);
                artifact.bytecode_runtime = metadata::strip(&artifact.bytecode_runtime);
            }
        }
    }

    /// Installs the parsed standard-json output into this unit. When the
    /// compiler predates file names in its output, `fallback_path` names
    /// the compiled target instead.
    pub fn absorb_standard_json(
        &mut self,
        output: &StandardJsonOutput,
        index: &FilenameIndex,
        hints: &NormalizeHints,
        fallback_path: Option<&str>,
    ) {
        let omits_filenames = self.compiler.omits_filenames();
        for (path, contracts) in &output.contracts {
            let used = if omits_filenames {
                fallback_path.unwrap_or(path)
            } else {
                path.as_str()
            };
            let filename = index.intern(used, hints);
            for (name, contract) in contracts {
                let artifact = contract_from_output(contract);
                self.source_unit_mut(Arc::clone(&filename))
                    .contracts
                    .insert(name.clone(), artifact);
            }
        }
        for (path, source) in &output.sources {
            let used = if omits_filenames {
                fallback_path.unwrap_or(path)
            } else {
                path.as_str()
            };
            let filename = index.intern(used, hints);
            let unit = self.source_unit_mut(filename);
            unit.source_id = source.id;
            if let Some(ast) = &source.ast {
                unit.ast = ast.clone();
            }
        }
        self.finalize();
    }

    /// Installs a legacy combined-json output.
    pub fn absorb_combined_json(
        &mut self,
        combined: &CombinedJson,
        index: &FilenameIndex,
        hints: &NormalizeHints,
        fallback_path: Option<&str>,
    ) {
        let omits_filenames = self.compiler.omits_filenames();
        for (key, contract) in &combined.contracts {
            let (path, name) = crate::artifacts::combined::split_path_and_name(key);
            let used = match (omits_filenames, path) {
                (false, Some(path)) => path,
                _ => fallback_path.unwrap_or(key.as_str()),
            };
            let filename = index.intern(used, hints);

            let mut artifact = ContractArtifact {
                abi: contract.abi.clone().unwrap_or(Value::Array(Vec::new())),
                bytecode_init: strip_0x(&contract.bin),
                bytecode_runtime: strip_0x(&contract.bin_runtime),
                srcmap_init: split_srcmap(&contract.srcmap),
                srcmap_runtime: split_srcmap(&contract.srcmap_runtime),
                natspec: Natspec::new(
                    contract.userdoc.clone().unwrap_or(Value::Null),
                    contract.devdoc.clone().unwrap_or(Value::Null),
                ),
                ..Default::default()
            };
            if let Some(hashes) = &contract.hashes {
                artifact.hashes = hashes.clone();
            }
            artifact.compute_hashes();
            self.source_unit_mut(filename)
                .contracts
                .insert(name.to_string(), artifact);
        }
        for (path, source) in &combined.sources {
            let used = if omits_filenames {
                fallback_path.unwrap_or(path)
            } else {
                path.as_str()
            };
            let filename = index.intern(used, hints);
            let unit = self.source_unit_mut(filename);
            if let Some(ast) = &source.ast {
                unit.ast = ast.clone();
            }
        }
        self.finalize();
    }

    /// Second pass over the absorbed data: contract kinds and direct
    /// dependencies from the ASTs.
    pub(crate) fn finalize(&mut self) {
        let mut id_to_name: HashMap<i64, String> = HashMap::new();
        let mut definitions: HashMap<String, (ContractKind, Vec<i64>)> = HashMap::new();
        for unit in self.source_units.values() {
            collect_contract_definitions(&unit.ast, &mut id_to_name, &mut definitions);
        }

        for unit in self.source_units.values_mut() {
            for (name, artifact) in unit.contracts.iter_mut() {
                if let Some((kind, dependency_ids)) = definitions.get(name) {
                    artifact.kind = *kind;
                    let mut dependencies: Vec<String> = dependency_ids
                        .iter()
                        .filter_map(|id| id_to_name.get(id).cloned())
                        .collect();
                    // Ordering is not stable across platforms; sort once
                    // here so consumers never see filesystem order.
                    dependencies.sort();
                    dependencies.dedup();
                    artifact.dependencies = dependencies;
                }
            }
        }
    }
}

fn contract_from_output(contract: &ContractOutput) -> ContractArtifact {
    let mut artifact = ContractArtifact {
        abi: contract.abi.clone().unwrap_or(Value::Array(Vec::new())),
        natspec: Natspec::new(
            contract.userdoc.clone().unwrap_or(Value::Null),
            contract.devdoc.clone().unwrap_or(Value::Null),
        ),
        ..Default::default()
    };
    if let Some(evm) = &contract.evm {
        if let Some(bytecode) = &evm.bytecode {
            artifact.bytecode_init = strip_0x(&bytecode.object);
            artifact.srcmap_init = split_srcmap(bytecode.source_map.as_deref().unwrap_or(""));
            artifact.libraries = bytecode.referenced_libraries();
        }
        if let Some(deployed) = &evm.deployed_bytecode {
            artifact.bytecode_runtime = strip_0x(&deployed.object);
            artifact.srcmap_runtime = split_srcmap(deployed.source_map.as_deref().unwrap_or(""));
            let mut libraries = artifact.libraries.clone();
            libraries.extend(deployed.referenced_libraries());
            libraries.sort();
            libraries.dedup();
            artifact.libraries = libraries;
        }
        if let Some(identifiers) = &evm.method_identifiers {
            artifact.hashes = identifiers.clone();
        }
    }
    artifact.compute_hashes();
    artifact
}

fn strip_0x(bytecode: &str) -> String {
    bytecode.strip_prefix("0x").unwrap_or(bytecode).to_string()
}

fn split_srcmap(srcmap: &str) -> Vec<String> {
    if srcmap.is_empty() {
        return Vec::new();
    }
    srcmap.split(';').map(str::to_string).collect()
}

/// Walks an AST (modern `nodes` or legacy `children` shape) collecting
/// contract definitions: id, name, kind, dependency ids.
fn collect_contract_definitions(
    ast: &Value,
    id_to_name: &mut HashMap<i64, String>,
    definitions: &mut HashMap<String, (ContractKind, Vec<i64>)>,
) {
    let nodes = ast
        .get("nodes")
        .or_else(|| ast.get("children"))
        .and_then(Value::as_array);
    let Some(nodes) = nodes else {
        return;
    };
    for node in nodes {
        let node_type = node
            .get("nodeType")
            .or_else(|| node.get("name"))
            .and_then(Value::as_str);
        if node_type != Some("ContractDefinition") {
            continue;
        }
        // Legacy ASTs nest the fields under `attributes`.
        let fields = node.get("attributes").unwrap_or(node);
        let Some(name) = fields.get("name").and_then(Value::as_str) else {
            continue;
        };
        if let Some(id) = node.get("id").and_then(Value::as_i64) {
            id_to_name.insert(id, name.to_string());
        }

        let kind = match fields.get("contractKind").and_then(Value::as_str) {
            Some("library") => ContractKind::Library,
            Some("interface") => ContractKind::Interface,
            _ => {
                if fields.get("abstract").and_then(Value::as_bool) == Some(true)
                    || fields.get("fullyImplemented").and_then(Value::as_bool) == Some(false)
                {
                    ContractKind::Abstract
                } else {
                    ContractKind::Contract
                }
            }
        };
        let dependency_ids: Vec<i64> = fields
            .get("contractDependencies")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();
        definitions.insert(name.to_string(), (kind, dependency_ids));
    }
}
