//! Library placeholder handling and bytecode linking.
//!
//! Until a library address is known, solc leaves a 40-character
//! placeholder in the bytecode. Two wire formats exist: the 0.4-era
//! `__<name padded to 38>__` and the 0.5-era
//! `__$<keccak256(name)[..34]>$__`. Linking replaces placeholders with a
//! concrete address and always produces a fresh string; the stored
//! template is never mutated.

use crate::errors::{Error, Result};
use crate::hash::keccak256;
use std::collections::BTreeMap;

pub const PLACEHOLDER_LEN: usize = 40;

/// Naming context for one known library: the contract name plus the
/// absolute and used paths of the file defining it. Different compiler
/// versions embed different combinations of these in the placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryContext {
    pub name: String,
    pub absolute: String,
    pub used: String,
}

/// `__name____…__`, exactly 40 characters.
pub fn placeholder_underscore(name: &str) -> String {
    let truncated: String = name.chars().take(36).collect();
    format!("__{truncated:_<36}__")
}

/// `__$keccak256(name)[..34]$__`, exactly 40 characters.
pub fn placeholder_keccak(name: &str) -> String {
    let digest = hex::encode(keccak256(name.as_bytes()));
    format!("__${}$__", &digest[..34])
}

/// Every placeholder token a library may appear under, given its naming
/// context: the bare name and the `path:name` forms, in both wire formats.
pub fn candidate_tokens(ctx: &LibraryContext) -> Vec<String> {
    let mut qualified: Vec<String> = vec![ctx.name.clone()];
    for path in [&ctx.absolute, &ctx.used] {
        if !path.is_empty() {
            let full = format!("{}:{}", path, ctx.name);
            qualified.push(full.chars().take(36).collect());
        }
    }
    let mut tokens = Vec::new();
    for name in &qualified {
        tokens.push(placeholder_underscore(name));
        tokens.push(placeholder_keccak(name));
    }
    tokens.dedup();
    tokens
}

/// Scans a bytecode template for placeholder tokens, in order of first
/// appearance, without duplicates.
pub fn find_placeholders(bytecode: &str) -> Vec<String> {
    let bytes = bytecode.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i + PLACEHOLDER_LEN <= bytes.len() {
        if &bytes[i..i + 2] == b"__" && &bytes[i + 38..i + 40] == b"__" {
            let token = &bytecode[i..i + PLACEHOLDER_LEN];
            if !found.iter().any(|t| t == token) {
                found.push(token.to_string());
            }
            i += PLACEHOLDER_LEN;
        } else {
            i += 1;
        }
    }
    found
}

/// Maps a placeholder token back to the library it names, if any context
/// produces it.
pub fn resolve_token(token: &str, contexts: &[LibraryContext]) -> Option<String> {
    contexts
        .iter()
        .find(|ctx| candidate_tokens(ctx).iter().any(|t| t == token))
        .map(|ctx| ctx.name.clone())
}

/// Lowercase 40-hex address, no `0x`. Short values are left-padded so
/// numeric addresses (test fixtures) stay usable.
pub fn normalize_address(address: &str) -> String {
    let stripped = address.strip_prefix("0x").unwrap_or(address).to_lowercase();
    format!("{stripped:0>40}")
}

/// Expands a `library name -> address` map into a
/// `placeholder token -> address` map using the known naming contexts.
pub fn expand_addresses(
    addresses: &BTreeMap<String, String>,
    contexts: &[LibraryContext],
) -> BTreeMap<String, String> {
    let mut expanded = BTreeMap::new();
    for (name, address) in addresses {
        let address = normalize_address(address);
        expanded.insert(placeholder_underscore(name), address.clone());
        expanded.insert(placeholder_keccak(name), address.clone());
        if let Some(ctx) = contexts.iter().find(|ctx| &ctx.name == name) {
            for token in candidate_tokens(ctx) {
                expanded.insert(token, address.clone());
            }
        }
    }
    expanded
}

/// Replaces every resolvable placeholder in the template. Placeholders
/// without an address are left in place (staged linking is allowed).
pub fn apply(template: &str, token_addresses: &BTreeMap<String, String>) -> String {
    let mut linked = template.to_string();
    for (token, address) in token_addresses {
        linked = linked.replace(token, address);
    }
    linked
}

/// Links and requires every placeholder to resolve. The error names the
/// first unresolved library.
pub fn link_complete(
    template: &str,
    addresses: &BTreeMap<String, String>,
    contexts: &[LibraryContext],
) -> Result<String> {
    let linked = apply(template, &expand_addresses(addresses, contexts));
    if let Some(token) = find_placeholders(&linked).into_iter().next() {
        let name = resolve_token(&token, contexts)
            .unwrap_or_else(|| token.trim_matches(|c| c == '_' || c == '$').to_string());
        return Err(Error::UnresolvedLibrary(name));
    }
    Ok(linked)
}

/// Stable fingerprint of an address map, used as the link-cache key.
pub fn fingerprint(addresses: &BTreeMap<String, String>) -> String {
    let joined: String = addresses
        .iter()
        .map(|(name, address)| format!("{name}={};", normalize_address(address)))
        .collect();
    hex::encode(&keccak256(joined.as_bytes())[..16])
}

/// Topological deployment order over the contract -> required-libraries
/// graph (Kahn). Libraries come out before their dependents.
pub fn deployment_order(dependencies: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut nodes: Vec<String> = dependencies.keys().cloned().collect();
    for deps in dependencies.values() {
        for dep in deps {
            if !nodes.contains(dep) {
                nodes.push(dep.clone());
            }
        }
    }
    nodes.sort();

    let mut in_degree: BTreeMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    for (contract, deps) in dependencies {
        let count = deps.iter().filter(|d| in_degree.contains_key(d.as_str())).count();
        *in_degree.get_mut(contract.as_str()).expect("node registered") += count;
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    queue.sort();

    let mut order = Vec::new();
    while let Some(current) = queue.first().copied() {
        queue.remove(0);
        order.push(current.to_string());
        for (contract, deps) in dependencies {
            if deps.iter().any(|d| d == current) {
                let degree = in_degree.get_mut(contract.as_str()).expect("node registered");
                *degree -= 1;
                if *degree == 0 {
                    queue.push(contract);
                    queue.sort();
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let remaining: Vec<String> = nodes.into_iter().filter(|n| !order.contains(n)).collect();
        return Err(Error::Internal(anyhow::anyhow!(
            "circular library dependency involving: {}",
            remaining.join(", ")
        )));
    }
    Ok(order)
}

/// Sequential fake addresses for a set of libraries, starting at 0xa070.
pub fn generate_addresses(libraries: &[String]) -> BTreeMap<String, String> {
    let mut sorted = libraries.to_vec();
    sorted.sort();
    sorted
        .into_iter()
        .enumerate()
        .map(|(offset, name)| (name, format!("{:040x}", 0xa070 + offset)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(name: &str) -> LibraryContext {
        LibraryContext {
            name: name.to_string(),
            absolute: format!("/work/{name}.sol"),
            used: format!("{name}.sol"),
        }
    }

    #[test]
    fn placeholder_shape() {
        let token = placeholder_underscore("MathLib");
        assert_eq!(token.len(), PLACEHOLDER_LEN);
        assert!(token.starts_with("__MathLib"));
        assert!(token.ends_with("____"));
        assert!(token.chars().all(|c| c == '_' || "MathLib".contains(c)));

        let keccak_token = placeholder_keccak("MathLib");
        assert_eq!(keccak_token.len(), PLACEHOLDER_LEN);
        assert!(keccak_token.starts_with("__$") && keccak_token.ends_with("$__"));
    }

    #[test]
    fn long_names_are_truncated() {
        let token = placeholder_underscore(&"L".repeat(50));
        assert_eq!(token.len(), PLACEHOLDER_LEN);
    }

    #[test]
    fn finds_placeholders_in_template() {
        let template = format!(
            "6080{}60aa{}00",
            placeholder_underscore("MathLib"),
            placeholder_keccak("AdvancedMath")
        );
        let found = find_placeholders(&template);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], placeholder_underscore("MathLib"));
    }

    #[test]
    fn links_all_occurrences_with_same_address() {
        let token = placeholder_underscore("MathLib");
        let template = format!("60{token}73{token}00");
        let addresses = BTreeMap::from([(
            "MathLib".to_string(),
            "0xA070000000000000000000000000000000000001".to_string(),
        )]);
        let linked = link_complete(&template, &addresses, &[ctx("MathLib")]).unwrap();
        assert_eq!(
            linked,
            "60a07000000000000000000000000000000000000173a07000000000000000000000000000000000000100"
        );
    }

    #[test]
    fn linking_is_idempotent_and_monotonic() {
        let template = format!("60{}00", placeholder_underscore("MathLib"));
        let contexts = [ctx("MathLib")];
        let addresses = BTreeMap::from([("MathLib".to_string(), "a070".to_string())]);

        let once = apply(&template, &expand_addresses(&addresses, &contexts));
        let twice = apply(&once, &expand_addresses(&addresses, &contexts));
        assert_eq!(once, twice);

        let mut superset = addresses.clone();
        superset.insert("Other".to_string(), "beef".to_string());
        let with_superset = apply(&template, &expand_addresses(&superset, &contexts));
        assert_eq!(once, with_superset);
    }

    #[test]
    fn staged_linking_reports_first_unresolved() {
        // ComplexMath -> AdvancedMath -> MathLib
        let template = format!(
            "60{}73{}00",
            placeholder_underscore("AdvancedMath"),
            placeholder_underscore("MathLib")
        );
        let contexts = [ctx("MathLib"), ctx("AdvancedMath"), ctx("ComplexMath")];
        let only_mathlib = BTreeMap::from([("MathLib".to_string(), "a070".to_string())]);

        let partially = apply(&template, &expand_addresses(&only_mathlib, &contexts));
        assert_eq!(find_placeholders(&partially).len(), 1);

        let err = link_complete(&template, &only_mathlib, &contexts).unwrap_err();
        match err {
            Error::UnresolvedLibrary(name) => assert_eq!(name, "AdvancedMath"),
            other => panic!("unexpected error: {other}"),
        }

        let all = BTreeMap::from([
            ("MathLib".to_string(), "a070".to_string()),
            ("AdvancedMath".to_string(), "a071".to_string()),
        ]);
        link_complete(&template, &all, &contexts).unwrap();
    }

    #[test]
    fn qualified_keccak_placeholders_resolve() {
        let qualified: String = "/work/MathLib.sol:MathLib".chars().take(36).collect();
        let token = placeholder_keccak(&qualified);
        let template = format!("60{token}00");
        let addresses = BTreeMap::from([("MathLib".to_string(), "a070".to_string())]);
        let linked = link_complete(&template, &addresses, &[ctx("MathLib")]).unwrap();
        assert!(find_placeholders(&linked).is_empty());
    }

    #[test]
    fn deployment_order_is_topological() {
        let dependencies = BTreeMap::from([
            ("ComplexMath".to_string(), vec!["AdvancedMath".to_string()]),
            ("AdvancedMath".to_string(), vec!["MathLib".to_string()]),
            ("Consumer".to_string(), vec!["ComplexMath".to_string()]),
        ]);
        let order = deployment_order(&dependencies).unwrap();
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(position("MathLib") < position("AdvancedMath"));
        assert!(position("AdvancedMath") < position("ComplexMath"));
        assert!(position("ComplexMath") < position("Consumer"));
    }

    #[test]
    fn deployment_order_rejects_cycles() {
        let dependencies = BTreeMap::from([
            ("A".to_string(), vec!["B".to_string()]),
            ("B".to_string(), vec!["A".to_string()]),
        ]);
        assert!(deployment_order(&dependencies).is_err());
    }

    #[test]
    fn generated_addresses_are_sequential() {
        let addresses =
            generate_addresses(&["MathLib".to_string(), "AdvancedMath".to_string()]);
        assert_eq!(addresses.get("AdvancedMath").unwrap(), &format!("{:040x}", 0xa070));
        assert_eq!(addresses.get("MathLib").unwrap(), &format!("{:040x}", 0xa071));
    }

    #[test]
    fn fingerprint_is_order_insensitive() {
        let a = BTreeMap::from([
            ("X".to_string(), "0xAA".to_string()),
            ("Y".to_string(), "0xBB".to_string()),
        ]);
        let mut b = BTreeMap::new();
        b.insert("Y".to_string(), "0xbb".to_string());
        b.insert("X".to_string(), "0xaa".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }
}
