use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::model::{KeyPattern, LoadReport, Pair, SubstitutionMode};
use crate::parser::parse_source;
use crate::resolve::{coerce, expand};
use crate::source::LineSource;
use crate::store::EnvStore;
use crate::value::TypedValue;

const DEFAULT_FILE: &str = ".env";

/// Load `.env` from the current working directory into a fresh in-memory store.
pub fn load() -> Result<EnvStore, Error> {
    from_path(DEFAULT_FILE)
}

/// Load one dotenv file into a fresh in-memory store.
pub fn from_path(path: impl AsRef<Path>) -> Result<EnvStore, Error> {
    let mut loader = EnvLoader::new().path(path);
    loader.load()?;
    Ok(loader.into_store())
}

/// Load several dotenv files, later files overriding earlier ones.
pub fn from_paths<I, P>(paths: I) -> Result<EnvStore, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut loader = EnvLoader::new().paths(paths);
    loader.load()?;
    Ok(loader.into_store())
}

/// Load `.env` from the current working directory into the process environment.
///
/// # Safety
///
/// See [`EnvStore::process`].
pub unsafe fn dotenv() -> Result<LoadReport, Error> {
    unsafe { from_path_into_env(DEFAULT_FILE) }
}

/// Load a dotenv file into the process environment.
///
/// # Safety
///
/// See [`EnvStore::process`].
pub unsafe fn from_path_into_env(path: impl AsRef<Path>) -> Result<LoadReport, Error> {
    let store = unsafe { EnvStore::process() };
    let mut loader = EnvLoader::new().path(path).store(store);
    loader.load()
}

/// Builder-style dotenv loader.
///
/// Files are read in the order given. Every file is read before any line is
/// parsed, so a missing or unreadable file leaves the store untouched.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    required: bool,
    override_existing: bool,
    substitution_mode: SubstitutionMode,
    key_pattern: KeyPattern,
    strict_quotes: bool,
    store: EnvStore,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    /// When `false`, missing files are skipped instead of failing the load.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Replace keys that were already in the store before this load.
    ///
    /// Keys written by an earlier file of the same load are always replaced
    /// by later files.
    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.substitution_mode = substitution_mode;
        self
    }

    pub fn key_pattern(mut self, key_pattern: KeyPattern) -> Self {
        self.key_pattern = key_pattern;
        self
    }

    /// Fail the load when a file ends inside a quoted value instead of
    /// dropping that value.
    pub fn strict_quotes(mut self, strict_quotes: bool) -> Self {
        self.strict_quotes = strict_quotes;
        self
    }

    pub fn store(mut self, store: EnvStore) -> Self {
        self.store = store;
        self
    }

    pub fn store_ref(&self) -> &EnvStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EnvStore {
        &mut self.store
    }

    pub fn into_store(self) -> EnvStore {
        self.store
    }

    /// Read and parse every file without touching the store.
    pub fn parse_only(&self) -> Result<Vec<Pair>, Error> {
        let (pairs, _) = self.collect_pairs()?;
        Ok(pairs)
    }

    pub fn load(&mut self) -> Result<LoadReport, Error> {
        let (pairs, mut report) = self.collect_pairs()?;
        let mut written = HashSet::new();
        let mut skipped = HashSet::new();

        for pair in pairs {
            if !self.override_existing
                && !written.contains(&pair.key)
                && self.store.contains_key(&pair.key)
            {
                tracing::debug!(key = %pair.key, "skipping existing key");
                skipped.insert(pair.key);
                continue;
            }

            let value = self.resolve(&pair)?;
            if self.store.set(&pair.key, value) {
                written.insert(pair.key);
            }
        }

        report.loaded = written.len();
        report.skipped_existing = skipped.len();
        tracing::debug!(
            loaded = report.loaded,
            skipped_existing = report.skipped_existing,
            skipped_lines = report.skipped_lines,
            files_read = report.files_read,
            "dotenv load finished"
        );
        Ok(report)
    }

    fn resolve(&self, pair: &Pair) -> Result<TypedValue, Error> {
        match self.substitution_mode {
            SubstitutionMode::Disabled => Ok(coerce(&pair.raw)),
            SubstitutionMode::Expand => {
                let expanded = expand(&pair.raw, |name| self.store.get(name))?;
                Ok(coerce(&expanded))
            }
        }
    }

    fn collect_pairs(&self) -> Result<(Vec<Pair>, LoadReport), Error> {
        let sources = self.read_sources()?;
        let mut report = LoadReport {
            files_read: sources.len(),
            ..LoadReport::default()
        };
        let mut pairs = Vec::new();

        for (path, source) in &sources {
            let parsed = parse_source(source, Some(path.as_path()), self.key_pattern);
            report.skipped_lines += parsed.errors.len();
            if let Some(unterminated) = parsed.unterminated
                && self.strict_quotes
            {
                return Err(unterminated.into());
            }

            tracing::debug!(
                file = %path.display(),
                pairs = parsed.pairs.len(),
                "parsed dotenv file"
            );
            pairs.extend(parsed.pairs);
        }

        Ok((pairs, report))
    }

    fn read_sources(&self) -> Result<Vec<(PathBuf, LineSource<'static>)>, Error> {
        let mut sources = Vec::new();
        for path in self.effective_paths() {
            match LineSource::from_path(&path) {
                Ok(source) => sources.push((path, source)),
                Err(Error::FileNotFound { path }) if !self.required => {
                    tracing::debug!(file = %path.display(), "skipping missing dotenv file");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(sources)
    }

    fn effective_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![PathBuf::from(DEFAULT_FILE)]
        } else {
            self.paths.clone()
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            required: true,
            override_existing: false,
            substitution_mode: SubstitutionMode::Expand,
            key_pattern: KeyPattern::Loose,
            strict_quotes: false,
            store: EnvStore::memory(),
        }
    }
}
