use std::path::Path;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, ValueEnum};
use log::{info, warn};

use glgen::config::{Config, GL_REGISTRY_FILE};
use glgen::{clean, fetch, generate, parse, FatalError};

/// Generates C++ source code and headers for a lazily loading OpenGL
/// binding from the OpenGL XML API Registry.
///
/// On a fresh checkout, run `fetch` first to download the registry files,
/// then `generate` to produce the C++ sources and headers.
#[derive(Parser)]
#[command(name = "glgen")]
struct Cli {
    /// What to do; omitting it prints this help text.
    #[arg(value_enum)]
    mode: Option<Mode>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Fetch the latest OpenGL XML API Registry files.
    Fetch,
    /// Delete generated C++ source code and headers.
    Clean,
    /// Generate C++ source code and headers.
    Generate,
    /// Print the glgen version and exit immediately.
    Version,
    /// Print this help text and exit immediately.
    Help,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if err.use_stderr() {
                // Usage problems surface as a single line, like every other
                // failure.
                let rendered = err.to_string();
                eprintln!("{}", rendered.lines().next().unwrap_or("error: invalid usage"));
                return ExitCode::FAILURE;
            }
            // --help and --version print to stdout and succeed.
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    match run(cli.mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(mode: Option<Mode>) -> Result<(), FatalError> {
    match mode.unwrap_or(Mode::Help) {
        Mode::Fetch => fetch::fetch(),
        Mode::Clean => clean::clean(&Config::default()),
        Mode::Generate => parse_and_generate(&Config::default()),
        Mode::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Mode::Help => {
            Cli::command().print_long_help()?;
            Ok(())
        }
    }
}

fn parse_and_generate(config: &Config) -> Result<(), FatalError> {
    let (registry, diagnostics) = parse::parse_file(Path::new(GL_REGISTRY_FILE))?;
    for diagnostic in &diagnostics {
        warn!("{}", diagnostic);
    }
    info!("parsed {} enums", registry.enum_count());
    info!("parsed {} commands", registry.command_count());
    info!("parsed {} features", registry.features.len());
    info!("parsed {} extensions", registry.extensions.len());

    generate::generate(&registry, config)
}
