use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tracing::debug;

use crate::env::{Environment, EnvironmentMut, ProcessEnv, TargetEnv};
use crate::error::Error;
use crate::map::EnvMap;
use crate::model::{LoadReport, SubstitutionMode};
use crate::parser::parse_reader_with_env;
use crate::serializer::marshal;

const DEFAULT_FILE: &str = ".env";

/// Load dotenv files into the process environment, keeping variables that
/// are already set. Loads `.env` when `paths` is empty.
///
/// # Safety
///
/// The caller must ensure no other threads concurrently read or write the
/// process environment while this runs.
pub unsafe fn load<I, P>(paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut loader = EnvLoader::new()
        .paths(paths)
        .target(unsafe { TargetEnv::process() });
    loader.load()
}

/// Load dotenv files into the process environment, replacing variables that
/// are already set. Loads `.env` when `paths` is empty.
///
/// # Safety
///
/// Same contract as [`load`].
pub unsafe fn overload<I, P>(paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut loader = EnvLoader::new()
        .paths(paths)
        .override_existing(true)
        .target(unsafe { TargetEnv::process() });
    loader.load()
}

/// Read dotenv files into a map without touching the process environment.
///
/// Undefined references fall back to the process environment.
pub fn read<I, P>(paths: I) -> Result<EnvMap, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    EnvLoader::new()
        .paths(paths)
        .target(TargetEnv::snapshot())
        .read()
}

/// Like [`read`], but leaves `$NAME` references unexpanded.
pub fn read_no_expand<I, P>(paths: I) -> Result<EnvMap, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    EnvLoader::new()
        .paths(paths)
        .substitution_mode(SubstitutionMode::Disabled)
        .read()
}

/// Serialize `map` and write it to `path`, replacing any existing file.
pub fn write(map: &EnvMap, path: impl AsRef<Path>) -> Result<(), Error> {
    std::fs::write(path, marshal(map))?;
    Ok(())
}

/// Build a command for `program` whose environment includes every entry of
/// `map` that the current process does not already define.
pub fn command(map: &EnvMap, program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    for (key, value) in map {
        if ProcessEnv.contains_key(key) {
            debug!(key, "keeping inherited value");
            continue;
        }
        command.env(key, value);
    }
    command
}

/// Load dotenv files and run `program` with inherited standard streams.
///
/// Files are applied in order on top of a copy of the process environment,
/// as [`EnvLoader::load`] does: the first definition of a key wins and later
/// files can reference variables from earlier ones. Loaded variables never
/// replace ones the current process already has.
pub fn exec<I, P, S>(
    paths: I,
    program: impl AsRef<OsStr>,
    args: &[S],
) -> Result<ExitStatus, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
    S: AsRef<OsStr>,
{
    let mut loader = EnvLoader::new().paths(paths).target(TargetEnv::snapshot());
    loader.load()?;

    let target = loader.into_target();
    let mut command = Command::new(program);
    if let Some(vars) = target.as_memory() {
        for (key, value) in vars {
            if !ProcessEnv.contains_key(key) {
                command.env(key, value);
            }
        }
    }
    let status = command.args(args).status()?;
    Ok(status)
}

/// Builder-style dotenv loader.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    override_existing: bool,
    substitution_mode: SubstitutionMode,
    target: TargetEnv,
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

    /// Replace variables the target already defines instead of keeping them.
    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.substitution_mode = substitution_mode;
        self
    }

    pub fn target(mut self, target: TargetEnv) -> Self {
        self.target = target;
        self
    }

    pub fn target_env(&self) -> &TargetEnv {
        &self.target
    }

    pub fn into_target(self) -> TargetEnv {
        self.target
    }

    /// Parse every file and merge them in order, without modifying the target.
    ///
    /// Each file is parsed on its own, with the target as the fallback for
    /// undefined references. A later file replaces the values of keys an
    /// earlier file defined but keeps their positions.
    pub fn read(&self) -> Result<EnvMap, Error> {
        let mut merged = EnvMap::new();
        for path in self.effective_paths() {
            let parsed = self.read_file(&path)?;
            merged.extend(parsed.iter());
        }
        Ok(merged)
    }

    /// Parse every file and apply its entries to the target.
    ///
    /// Files are applied one at a time, so a file can reference variables
    /// loaded from the files before it. An error stops the load, but entries
    /// from files already applied stay in the target.
    pub fn load(&mut self) -> Result<LoadReport, Error> {
        let mut report = LoadReport::default();

        for path in self.effective_paths() {
            let parsed = self.read_file(&path)?;
            report.files_read += 1;

            for (key, value) in &parsed {
                if !self.override_existing && self.target.contains_key(key) {
                    report.skipped_existing += 1;
                    debug!(key, "skipping existing key");
                    continue;
                }

                self.target.set_var(key, value);
                report.loaded += 1;
            }
        }

        Ok(report)
    }

    fn read_file(&self, path: &Path) -> Result<EnvMap, Error> {
        debug!(path = %path.display(), "reading dotenv file");
        let file = File::open(path)?;
        parse_reader_with_env(BufReader::new(file), self.substitution_mode, &self.target)
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
            override_existing: false,
            substitution_mode: SubstitutionMode::Expand,
            target: TargetEnv::memory(),
        }
    }
}
