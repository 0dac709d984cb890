//! Source-file identity handling.
//!
//! Every file path entering the project goes through [`FilenameIndex::intern`],
//! which resolves it to a canonical [`Filename`] carrying four coexisting
//! views of the same file. Equality is defined on the absolute path only;
//! the other three facets are display forms.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    path::{Component, Path, PathBuf},
    sync::{Arc, RwLock},
};

/// An import remapping, `prefix=target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remapping {
    pub prefix: String,
    pub target: String,
}

impl Remapping {
    /// Parses a `prefix=target` pair. Returns `None` when `=` is missing.
    pub fn parse(raw: &str) -> Option<Self> {
        let (prefix, target) = raw.split_once('=')?;
        Some(Self {
            prefix: prefix.to_string(),
            target: target.to_string(),
        })
    }

    fn apply(&self, used: &str) -> Option<PathBuf> {
        used.strip_prefix(&self.prefix)
            .map(|rest| PathBuf::from(format!("{}{}", self.target, rest)))
    }
}

/// Resolution hints for a single intern call: include paths and import
/// remappings active for the compiler invocation that produced the path.
#[derive(Clone, Debug, Default)]
pub struct NormalizeHints {
    pub include_paths: Vec<PathBuf>,
    pub remappings: Vec<Remapping>,
    /// Directory the compiler was invoked from, when it differs from the
    /// project working directory (verification fetches).
    pub working_dir: Option<PathBuf>,
}

/// A source-file identity.
///
/// `absolute` is canonicalized once at ingestion (symlinks resolved,
/// `..` collapsed); `relative` is relative to the project working
/// directory when the file lives under it; `short` is the display form
/// with dependency roots, the working directory, and the user home
/// stripped; `used` is the exact string the compiler saw.
#[derive(Clone, Debug)]
pub struct Filename {
    pub absolute: PathBuf,
    pub relative: PathBuf,
    pub short: PathBuf,
    pub used: String,
}

impl PartialEq for Filename {
    fn eq(&self, other: &Self) -> bool {
        self.absolute == other.absolute
    }
}

impl Eq for Filename {}

impl Hash for Filename {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.absolute.hash(state);
    }
}

impl PartialOrd for Filename {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Filename {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.absolute.cmp(&other.absolute)
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short.display())
    }
}

/// Project-wide identity index. At most one [`Filename`] per absolute
/// path; lookups by any of the four facets resolve to the same instance.
///
/// Inserts are rare relative to lookups, so the maps sit behind a
/// read-write lock; adapters running in parallel share one index.
#[derive(Debug)]
pub struct FilenameIndex {
    working_dir: PathBuf,
    vendor_dirs: RwLock<Vec<String>>,
    by_absolute: RwLock<HashMap<PathBuf, Arc<Filename>>>,
    aliases: RwLock<HashMap<String, PathBuf>>,
}

impl FilenameIndex {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            vendor_dirs: RwLock::new(vec!["node_modules".to_string()]),
            by_absolute: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Registers an additional dependency root stripped by the `short`
    /// view (e.g. `lib` for Foundry projects).
    pub fn add_vendor_dir(&self, dir: impl Into<String>) {
        let dir = dir.into();
        let mut vendor_dirs = self.vendor_dirs.write().expect("index poisoned");
        if !vendor_dirs.contains(&dir) {
            vendor_dirs.push(dir);
        }
    }

    /// Installs a pre-built identity verbatim, as recovered from an
    /// imported archive. An existing identity for the same absolute
    /// path wins.
    pub fn install(&self, filename: Filename) -> Arc<Filename> {
        let mut by_absolute = self.by_absolute.write().expect("index poisoned");
        if let Some(existing) = by_absolute.get(&filename.absolute) {
            return Arc::clone(existing);
        }
        let installed = Arc::new(filename);
        by_absolute.insert(installed.absolute.clone(), Arc::clone(&installed));
        installed
    }

    /// Resolves `used` into an identity and installs it in the index.
    /// A second intern of a path resolving to the same absolute file
    /// returns the existing instance and remembers the new `used` string
    /// as an alias.
    pub fn intern(&self, used: &str, hints: &NormalizeHints) -> Arc<Filename> {
        let working_dir = hints.working_dir.as_deref().unwrap_or(&self.working_dir);
        let absolute = self.resolve_absolute(used, working_dir, hints);

        if let Some(existing) = self.by_absolute.read().expect("index poisoned").get(&absolute) {
            let existing = Arc::clone(existing);
            if existing.used != used {
                self.aliases
                    .write()
                    .expect("index poisoned")
                    .insert(used.to_string(), absolute);
            }
            return existing;
        }

        let relative = absolute
            .strip_prefix(&self.working_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute.clone());
        let short = self.shorten(&absolute, &relative);

        let filename = Arc::new(Filename {
            absolute: absolute.clone(),
            relative,
            short,
            used: used.to_string(),
        });
        self.by_absolute
            .write()
            .expect("index poisoned")
            .insert(absolute, Arc::clone(&filename));
        filename
    }

    /// Looks up an already-interned identity by any facet.
    pub fn lookup(&self, any: &str) -> Option<Arc<Filename>> {
        let by_absolute = self.by_absolute.read().expect("index poisoned");
        let path = Path::new(any);
        if let Some(found) = by_absolute.get(path) {
            return Some(Arc::clone(found));
        }
        if let Some(absolute) = self.aliases.read().expect("index poisoned").get(any) {
            return by_absolute.get(absolute).map(Arc::clone);
        }
        by_absolute
            .values()
            .find(|f| f.relative == path || f.short == path || f.used == any)
            .map(Arc::clone)
    }

    /// All identities currently known to the project, sorted by absolute
    /// path for stable iteration.
    pub fn all(&self) -> Vec<Arc<Filename>> {
        let mut all: Vec<_> = self
            .by_absolute
            .read()
            .expect("index poisoned")
            .values()
            .map(Arc::clone)
            .collect();
        all.sort();
        all
    }

    fn resolve_absolute(&self, used: &str, working_dir: &Path, hints: &NormalizeHints) -> PathBuf {
        let expanded = expand(used);
        let path = PathBuf::from(&expanded);

        if path.is_absolute() && path.exists() {
            return canonicalize(&path);
        }

        let mut candidates: Vec<PathBuf> = vec![working_dir.join(&path)];
        for include in &hints.include_paths {
            candidates.push(include.join(&path));
        }
        for remapping in &hints.remappings {
            if let Some(remapped) = remapping.apply(&expanded) {
                if remapped.is_absolute() {
                    candidates.push(remapped);
                } else {
                    candidates.push(working_dir.join(remapped));
                }
            }
        }
        for candidate in candidates {
            if candidate.exists() {
                return canonicalize(&candidate);
            }
        }

        // Nothing on disk: keep a syntactically normalized join so the
        // identity is still stable (archives, virtual standard-json paths).
        normalize_components(&working_dir.join(&path))
    }

    fn shorten(&self, absolute: &Path, relative: &Path) -> PathBuf {
        let vendor_dirs = self.vendor_dirs.read().expect("index poisoned").clone();
        for vendor in &vendor_dirs {
            if let Some(stripped) = strip_through_component(absolute, vendor) {
                return stripped;
            }
        }
        if absolute.starts_with(&self.working_dir) {
            return relative.to_path_buf();
        }
        if let Some(home) = std::env::var_os("HOME") {
            if let Ok(stripped) = absolute.strip_prefix(&home) {
                return stripped.to_path_buf();
            }
        }
        relative.to_path_buf()
    }
}

/// Expands a leading `~` and `$VAR`/`${VAR}` occurrences.
fn expand(raw: &str) -> String {
    let mut out = raw.to_string();
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            out = Path::new(&home).join(rest).to_string_lossy().into_owned();
        }
    }
    while let Some(start) = out.find("${") {
        let Some(end) = out[start..].find('}') else {
            break;
        };
        let var = &out[start + 2..start + end];
        let value = std::env::var(var).unwrap_or_default();
        out.replace_range(start..start + end + 1, &value);
    }
    out
}

fn canonicalize(path: &Path) -> PathBuf {
    path.canonicalize()
        .unwrap_or_else(|_| normalize_components(path))
}

/// Collapses `.` and `..` without hitting the filesystem.
fn normalize_components(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Returns the path suffix after the first component named `marker`.
fn strip_through_component(path: &Path, marker: &str) -> Option<PathBuf> {
    let components: Vec<_> = path.components().collect();
    let position = components
        .iter()
        .position(|c| matches!(c, Component::Normal(name) if *name == std::ffi::OsStr::new(marker)))?;
    if position + 1 >= components.len() {
        return None;
    }
    Some(components[position + 1..].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn relative_path_resolves_through_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Token.sol");
        std::fs::write(&file, "contract Token {}").unwrap();

        let index = FilenameIndex::new(dir.path());
        let filename = index.intern("Token.sol", &NormalizeHints::default());

        assert_eq!(filename.absolute, file.canonicalize().unwrap());
        assert_eq!(filename.relative, PathBuf::from("Token.sol"));
        assert_eq!(filename.used, "Token.sol");
    }

    #[test]
    fn two_used_strings_share_one_identity() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A.sol");
        std::fs::write(&file, "").unwrap();

        let index = FilenameIndex::new(dir.path());
        let first = index.intern("A.sol", &NormalizeHints::default());
        let second = index.intern(&file.to_string_lossy(), &NormalizeHints::default());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(index.all().len(), 1);
        // Both used variants resolve through the alias table.
        assert!(index.lookup("A.sol").is_some());
        assert!(index.lookup(&file.to_string_lossy()).is_some());
    }

    #[test]
    fn missing_file_keeps_syntactic_join() {
        let dir = tempfile::tempdir().unwrap();
        let index = FilenameIndex::new(dir.path());
        let filename = index.intern("sub/../Virtual.sol", &NormalizeHints::default());
        assert_eq!(filename.absolute, dir.path().join("Virtual.sol"));
    }

    #[test]
    fn remapping_resolves_import_path() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("node_modules/@oz/token");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(lib.join("ERC20.sol"), "").unwrap();

        let index = FilenameIndex::new(dir.path());
        let hints = NormalizeHints {
            remappings: vec![Remapping::parse("@oz/=node_modules/@oz/").unwrap()],
            ..Default::default()
        };
        let filename = index.intern("@oz/token/ERC20.sol", &hints);
        assert!(filename.absolute.ends_with("node_modules/@oz/token/ERC20.sol"));
        // Dependency root wins over the working directory in the short view.
        assert_eq!(filename.short, PathBuf::from("@oz/token/ERC20.sol"));
    }

    #[test]
    fn include_path_consulted_after_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let include = dir.path().join("deps");
        std::fs::create_dir_all(&include).unwrap();
        std::fs::write(include.join("Math.sol"), "").unwrap();

        let index = FilenameIndex::new(dir.path());
        let hints = NormalizeHints {
            include_paths: vec![include.clone()],
            ..Default::default()
        };
        let filename = index.intern("Math.sol", &hints);
        assert_eq!(filename.absolute, include.join("Math.sol").canonicalize().unwrap());
    }

    #[test]
    fn lookup_by_any_facet() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("contracts")).unwrap();
        std::fs::write(dir.path().join("contracts/B.sol"), "").unwrap();

        let index = FilenameIndex::new(dir.path());
        let interned = index.intern("contracts/B.sol", &NormalizeHints::default());

        for key in [
            interned.absolute.to_string_lossy().to_string(),
            interned.relative.to_string_lossy().to_string(),
            interned.used.clone(),
        ] {
            let found = index.lookup(&key).expect("facet lookup failed");
            assert!(Arc::ptr_eq(&found, &interned));
        }
    }
}
