use std::path::{Path, PathBuf};

use specval::{SpecvalConfig, TraceabilityOptions, ValidationOptions, Validator};

use crate::error::CliError;

/// Flags that override values loaded from the config file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub strict: bool,
    pub allow_circular: bool,
    pub no_gitignore: bool,
    pub no_specignore: bool,
    pub specignore_file: Option<String>,
    pub unmanaged: Vec<String>,
    pub test_paths: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

/// Everything one invocation needs: the root to validate and a configured validator.
pub struct CliSession {
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub validator: Validator,
    pub verbosity: Verbosity,
}

impl CliSession {
    pub fn bootstrap(
        root: PathBuf,
        config_path: Option<PathBuf>,
        overrides: Overrides,
        verbosity: Verbosity,
    ) -> Result<Self, CliError> {
        let config_path = config_path.or_else(|| discover_config(&root));
        let config = match &config_path {
            Some(path) => SpecvalConfig::load(path)?,
            None => SpecvalConfig::default(),
        };
        let (types, mut options) = config.into_parts()?;
        apply_overrides(&mut options, overrides);

        let validator = Validator::new(types, options)?;
        Ok(Self {
            root,
            config_path,
            validator,
            verbosity,
        })
    }
}

/// `specval.yaml` / `specval.yml` at the validation root, when present.
fn discover_config(root: &Path) -> Option<PathBuf> {
    ["specval.yaml", "specval.yml"]
        .into_iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.is_file())
}

fn apply_overrides(options: &mut ValidationOptions, overrides: Overrides) {
    options.strict |= overrides.strict;
    options.allow_circular |= overrides.allow_circular;
    if overrides.no_gitignore {
        options.respect_gitignore = false;
    }
    if overrides.no_specignore {
        options.use_specignore = false;
    }
    if let Some(file) = overrides.specignore_file {
        options.specignore_file = file;
    }
    options.unmanaged_patterns.extend(overrides.unmanaged);
    if !overrides.test_paths.is_empty() {
        let trace = options
            .traceability
            .get_or_insert_with(TraceabilityOptions::default);
        trace.test_paths = overrides.test_paths;
    }
}
