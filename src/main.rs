//! `coders` command-line interface.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use coders::config::{Engine, CONFIG_FILE};
use coders::diagnostics::Diagnostic;
use coders::pipeline::CancelToken;
use coders::runner::{self, BuildOptions};

const LOG_FILE: &str = "log.txt";

#[derive(Parser, Debug)]
#[command(name = "coders", version)]
#[command(about = "Compile jssp sources into projects for many platforms")]
struct Cli {
    /// Log progress to the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate every configured project, or only the one given with -p
    Build {
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Project id to build
        #[arg(short, long)]
        project: Option<String>,

        /// Generation engine
        #[arg(short, long, value_enum)]
        engine: Option<Engine>,

        /// Replace existing files coders did not write
        #[arg(long)]
        overwrite: bool,
    },

    /// Parse, resolve and lower without generating
    Check {
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Source file; defaults to the configured entries
        file: Option<PathBuf>,
    },

    /// Write a sample configuration and sources
    Init {
        #[arg(long)]
        force: bool,

        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

impl Command {
    /// Only builds keep a log file; check and init stay read-only.
    fn writes_log_file(&self) -> bool {
        matches!(self, Command::Build { .. })
    }
}

fn init_tracing(verbose: bool, log_file: bool) {
    let console_level = if verbose { "coders=info" } else { "coders=warn" };
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| console_level.into()),
        );

    // The log file is best-effort; a read-only directory only loses it.
    let file = log_file.then(|| File::create(LOG_FILE).ok()).flatten().map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .with_filter(EnvFilter::new("coders=info"))
    });

    tracing_subscriber::registry().with(console).with(file).init();
}

fn print_diagnostics<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) -> usize {
    let mut errors = 0;
    for diagnostic in diagnostics {
        if diagnostic.is_error() {
            errors += 1;
        }
        eprintln!("{diagnostic}");
    }
    errors
}

fn build(options: BuildOptions) -> ExitCode {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("cancelling after the current stage...");
        handler_token.cancel();
    }) {
        tracing::warn!("cannot install Ctrl-C handler: {err}");
    }

    let outcomes = match runner::build(&options, &cancel) {
        Ok(outcomes) => outcomes,
        Err(err) => {
            eprintln!("{}", err.to_diagnostic());
            return ExitCode::FAILURE;
        }
    };

    let mut failed = 0;
    for outcome in &outcomes {
        print_diagnostics(&outcome.report.diagnostics);
        if outcome.report.succeeded() {
            println!(
                "{} ({}): {} file(s) written, {} skipped",
                outcome.project,
                outcome.platform,
                outcome.report.generated.len(),
                outcome.report.skipped.len()
            );
        } else {
            failed += 1;
            println!(
                "{} ({}): failed at {:?} with {} error(s)",
                outcome.project,
                outcome.platform,
                outcome.report.stage,
                outcome.report.error_count()
            );
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.command.writes_log_file());

    match cli.command {
        Command::Build {
            config,
            project,
            engine,
            overwrite,
        } => build(BuildOptions {
            config,
            project,
            engine,
            overwrite,
        }),

        Command::Check { config, file } => match runner::check(&config, file.as_deref()) {
            Ok(diagnostics) => {
                let errors = print_diagnostics(diagnostics.iter());
                if errors > 0 {
                    println!("check failed with {errors} error(s)");
                    ExitCode::FAILURE
                } else {
                    println!("check passed");
                    ExitCode::SUCCESS
                }
            }
            Err(err) => {
                eprintln!("{}", err.to_diagnostic());
                ExitCode::FAILURE
            }
        },

        Command::Init { force, dir } => match runner::init(&dir, force) {
            Ok(written) => {
                for path in written {
                    println!("created {}", path.display());
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{}", err.to_diagnostic());
                ExitCode::FAILURE
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn only_build_writes_a_log_file() {
        assert!(command(&["coders", "build"]).writes_log_file());
        assert!(command(&["coders", "-v", "build", "-p", "server"]).writes_log_file());
        assert!(!command(&["coders", "check"]).writes_log_file());
        assert!(!command(&["coders", "init", "demo"]).writes_log_file());
    }
}
