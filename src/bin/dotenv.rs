use std::ffi::OsString;
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Command};

use clap::{Args, Parser, Subcommand};
use envmap::{EnvLoader, EnvMap, Error, SubstitutionMode, TargetEnv, marshal};
use tracing_subscriber::EnvFilter;

/// Run commands with variables loaded from dotenv files
#[derive(Parser, Debug)]
#[command(name = "dotenv")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print loader diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load dotenv files and execute a command
    Run(RunArgs),

    /// Print the merged variables of dotenv files
    Print(PrintArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct SourceArgs {
    /// Dotenv file path(s). Repeat or pass comma-separated paths
    #[arg(short, long = "file", value_name = "PATHS", value_delimiter = ',')]
    files: Vec<PathBuf>,

    /// Keep `$NAME` references unexpanded
    #[arg(long)]
    no_expand: bool,
}

impl SourceArgs {
    /// Selected paths without empty entries. The loader falls back to `.env`
    /// when none remain.
    fn files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|path| !path.as_os_str().is_empty())
            .cloned()
            .collect()
    }

    fn substitution_mode(&self) -> SubstitutionMode {
        if self.no_expand {
            SubstitutionMode::Disabled
        } else {
            SubstitutionMode::Expand
        }
    }

    fn loader(&self) -> EnvLoader {
        EnvLoader::new()
            .paths(self.files())
            .substitution_mode(self.substitution_mode())
            .target(TargetEnv::snapshot())
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Override existing environment variables
    #[arg(short, long = "override", visible_alias = "overload")]
    override_existing: bool,

    /// Command to execute, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<OsString>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct PrintArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Print values unescaped, as stored
    #[arg(long)]
    raw: bool,

    /// Prefix every line with its position (implies --raw)
    #[arg(short = 'n', long)]
    line_numbers: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => execute_run(args),
        Commands::Print(args) => execute_print(args),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("dotenv: {err}");
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn execute_run(args: RunArgs) -> Result<i32, String> {
    let map = load_map(&args.source).map_err(|err| err.to_string())?;
    let Some((program, program_args)) = args.command.split_first() else {
        return Err("missing command after `run`".to_owned());
    };

    let mut command = if args.override_existing {
        let mut command = Command::new(program);
        command.envs(map.iter());
        command
    } else {
        envmap::command(&map, program)
    };
    command.args(program_args);

    execute_command(command, program)
}

fn execute_print(args: PrintArgs) -> Result<i32, String> {
    let map = load_map(&args.source).map_err(|err| err.to_string())?;
    let mut stdout = io::stdout().lock();

    let written = if args.raw || args.line_numbers {
        map.emit(&mut stdout, args.line_numbers)
    } else {
        stdout.write_all(marshal(&map).as_bytes())
    };
    written
        .and_then(|()| stdout.flush())
        .map_err(|err| format!("failed to write output: {err}"))?;
    Ok(0)
}

fn load_map(source: &SourceArgs) -> Result<EnvMap, Error> {
    source.loader().read()
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let err = command.exec();
    Err(format!(
        "failed to execute `{}`: {err}",
        program.to_string_lossy()
    ))
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let status = command
        .status()
        .map_err(|err| format!("failed to execute `{}`: {err}", program.to_string_lossy()))?;
    Ok(status.code().unwrap_or(1))
}
