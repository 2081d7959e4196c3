use std::collections::BTreeMap;
use std::ffi::OsString;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use typenv::{EnvLoader, EnvStore, KeyPattern, SubstitutionMode};

#[derive(Debug, Parser)]
#[command(name = "typenv", version)]
#[command(about = "Load dotenv files and use their typed values", long_about = None)]
struct Cli {
    /// Increase diagnostics on stderr (-v info, -vv debug). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load dotenv files and execute a command with the loaded variables
    Run {
        #[command(flatten)]
        load: LoadArgs,

        /// Command and arguments to execute
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<OsString>,
    },
    /// Print the value of one key
    Get {
        #[command(flatten)]
        load: LoadArgs,

        /// Key to print (uppercase letters, digits and underscores)
        key: String,

        /// Prefix the value with its coerced type
        #[arg(long = "type")]
        show_type: bool,
    },
    /// Print every loaded key as KEY=value
    List {
        #[command(flatten)]
        load: LoadArgs,

        /// Append the coerced type of each value
        #[arg(long = "type")]
        show_type: bool,
    },
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Dotenv file path(s). Repeat or pass comma-separated paths. Defaults to .env
    #[arg(short, long = "file", value_name = "PATHS", value_delimiter = ',')]
    files: Vec<PathBuf>,

    /// Skip dotenv files that do not exist
    #[arg(short, long, alias = "ignore")]
    ignore_missing: bool,

    /// Override variables already set in the environment
    #[arg(short = 'o', long = "override", alias = "overload")]
    override_existing: bool,

    /// Keep `$VAR` references unexpanded
    #[arg(long)]
    no_expand: bool,

    /// Only accept uppercase keys in dotenv files
    #[arg(long)]
    strict_keys: bool,

    /// Fail when a file ends inside a quoted value
    #[arg(long)]
    strict_quotes: bool,
}

impl LoadArgs {
    /// Load into a snapshot of the current environment, leaving the process
    /// environment itself untouched.
    fn load(&self) -> Result<EnvStore> {
        let substitution_mode = if self.no_expand {
            SubstitutionMode::Disabled
        } else {
            SubstitutionMode::Expand
        };
        let key_pattern = if self.strict_keys {
            KeyPattern::Strict
        } else {
            KeyPattern::Loose
        };

        let mut loader = EnvLoader::new()
            .paths(&self.files)
            .required(!self.ignore_missing)
            .override_existing(self.override_existing)
            .substitution_mode(substitution_mode)
            .key_pattern(key_pattern)
            .strict_quotes(self.strict_quotes)
            .store(EnvStore::from_memory(snapshot_process_env()));
        let report = loader.load().context("failed to load dotenv files")?;
        tracing::info!(
            loaded = report.loaded,
            skipped_existing = report.skipped_existing,
            skipped_lines = report.skipped_lines,
            files_read = report.files_read,
            "loaded dotenv files"
        );
        Ok(loader.into_store())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("typenv: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run { load, command } => {
            let store = load.load()?;
            execute(&store, command)
        }
        Commands::Get {
            load,
            key,
            show_type,
        } => {
            let store = load.load()?;
            let Some(value) = store.get(&key)? else {
                bail!("`{key}` is not set");
            };
            if show_type {
                println!("{}\t{value}", value.type_name());
            } else {
                println!("{value}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { load, show_type } => {
            let store = load.load()?;
            for (key, value) in store.iter() {
                if show_type {
                    println!("{key}={value} ({})", value.type_name());
                } else {
                    println!("{key}={value}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn execute(store: &EnvStore, command: Vec<OsString>) -> Result<ExitCode> {
    let Some((program, args)) = command.split_first() else {
        bail!("missing command after `run`");
    };

    let mut child = Command::new(program);
    child.args(args);
    for (key, value) in store.iter() {
        child.env(key, value.to_string());
    }

    spawn(child, program)
}

#[cfg(unix)]
fn spawn(mut child: Command, program: &OsString) -> Result<ExitCode> {
    let err = child.exec();
    Err(err).with_context(|| format!("failed to execute `{}`", program.to_string_lossy()))
}

#[cfg(not(unix))]
fn spawn(mut child: Command, program: &OsString) -> Result<ExitCode> {
    let status = child
        .status()
        .with_context(|| format!("failed to execute `{}`", program.to_string_lossy()))?;
    let code = status.code().unwrap_or(1);
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

fn snapshot_process_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .collect()
}
