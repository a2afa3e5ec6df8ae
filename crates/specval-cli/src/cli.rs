use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::context::{CliSession, Overrides, Verbosity};
use crate::error::CliError;
use crate::formatter::{OutputFormat, emit_result};

const NAME: &str = "specval";

pub fn run() -> ExitCode {
    init_tracing();
    match run_cli(std::env::args()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses arguments, loads configuration and validates the requested root.
/// Returns a `sysexits`-compatible code: 0 when no errors were found, 65 when
/// validation failed.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let matches = build_cli().try_get_matches_from(args)?;

    let verbosity = Verbosity {
        json: matches.get_flag("json"),
        verbose: matches.get_flag("verbose"),
    };
    let output = if verbosity.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let root = matches
        .get_one::<PathBuf>("path")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = matches.get_one::<PathBuf>("config").cloned();
    let session = CliSession::bootstrap(root, config, overrides(&matches), verbosity)?;

    if session.verbosity.verbose {
        let options = session.validator.options();
        tracing::info!(
            root = %session.root.display(),
            config = ?session.config_path,
            schemas = session.validator.types().len(),
            strict = options.strict,
            allow_circular = options.allow_circular,
            respect_gitignore = options.respect_gitignore,
            use_specignore = options.use_specignore,
            "resolved validation context"
        );
    }

    let result = session.validator.validate(&session.root)?;
    emit_result(&session.root, &result, output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn overrides(matches: &ArgMatches) -> Overrides {
    Overrides {
        strict: matches.get_flag("strict"),
        allow_circular: matches.get_flag("allow-circular"),
        no_gitignore: matches.get_flag("no-gitignore"),
        no_specignore: matches.get_flag("no-specignore"),
        specignore_file: matches.get_one::<String>("specignore").cloned(),
        unmanaged: matches
            .get_many::<String>("unmanaged")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        test_paths: matches
            .get_many::<PathBuf>("trace-tests")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
    }
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Validate a workspace of markdown specification documents")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Root directory to validate. Defaults to the current directory."),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("YAML config with options and schemas. Defaults to specval.yaml in PATH."),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Warn about markdown files that match no module schema."),
        )
        .arg(
            Arg::new("allow-circular")
                .long("allow-circular")
                .action(ArgAction::SetTrue)
                .help("Allow reference cycles unless a rule forbids them."),
        )
        .arg(
            Arg::new("no-gitignore")
                .long("no-gitignore")
                .action(ArgAction::SetTrue)
                .help("Validate files excluded by .gitignore."),
        )
        .arg(
            Arg::new("no-specignore")
                .long("no-specignore")
                .action(ArgAction::SetTrue)
                .help("Validate files excluded by the specignore file."),
        )
        .arg(
            Arg::new("specignore")
                .long("specignore")
                .value_name("NAME")
                .help("File name of the per-directory ignore file (default .specignore)."),
        )
        .arg(
            Arg::new("unmanaged")
                .long("unmanaged")
                .value_name("PATTERN")
                .action(ArgAction::Append)
                .help("Gitignore-style pattern for files that are deliberately unmanaged."),
        )
        .arg(
            Arg::new("trace-tests")
                .long("trace-tests")
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Append)
                .help("Scan DIR for tests mentioning module ids and report untested modules."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Emit the report as JSON instead of human-readable text."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Log the resolved root, config file and options."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn repeated_flags_accumulate() {
        let matches = build_cli()
            .try_get_matches_from([
                NAME,
                "docs",
                "--unmanaged",
                "README.md",
                "--unmanaged",
                "notes/",
                "--trace-tests",
                "tests",
                "--strict",
            ])
            .unwrap();
        let overrides = overrides(&matches);
        assert_eq!(overrides.unmanaged, vec!["README.md", "notes/"]);
        assert_eq!(overrides.test_paths, vec![PathBuf::from("tests")]);
        assert!(overrides.strict);
        assert!(!overrides.allow_circular);
    }
}
