//! Purpose: `tyco` CLI entry point: render documents to JSON and validate them.
//! Role: Binary crate root; parses args, drives `tyco::api`, emits JSON on stdout.
//! Invariants: Every document goes through the C ABI via `api::Document`.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Exit code is the numeric `tyco_status` of the failure (64 for usage errors).
use std::ffi::OsString;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind};
use clap_complete::aot::Shell;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod color_json;

use color_json::colorize_json;
use tyco::api::{BoundaryError, Document, Status};

const STDIN_SOURCE_NAME: &str = "<stdin>";
// EX_USAGE; kept clear of the 0..=3 status codes.
const USAGE_EXIT_CODE: i32 = 64;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run(std::env::args_os()) {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            err.status().code()
        }
    };
    std::process::exit(exit_code);
}

fn run<I>(args: I) -> Result<RunOutcome, (BoundaryError, ColorMode)>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let exit_code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => USAGE_EXIT_CODE,
            };
            // clap already wrote the usage text; a failed write has nowhere to go.
            let _ = err.print();
            return Ok(RunOutcome::with_code(exit_code));
        }
    };

    init_tracing(cli.verbose);
    let color_mode = cli.color;
    dispatch(cli.command, color_mode).map_err(|err| (err, color_mode))
}

fn dispatch(command: Command, color_mode: ColorMode) -> Result<RunOutcome, BoundaryError> {
    match command {
        Command::Json {
            input,
            name,
            pretty,
        } => {
            let document = load_input(&input, name.as_deref())?;
            if pretty {
                let value = document.to_value()?;
                let use_color = color_mode.use_color(io::stdout().is_terminal());
                println!("{}", colorize_json(&value, use_color));
            } else {
                println!("{}", document.to_json()?);
            }
            Ok(RunOutcome::ok())
        }
        Command::Check { files } => {
            let mut worst = Status::Ok;
            for path in files {
                let record = match Document::load_file(&path) {
                    Ok(_) => CheckRecord::pass(&path),
                    Err(err) => {
                        if err.status().code() > worst.code() {
                            worst = err.status();
                        }
                        CheckRecord::fail(&path, &err)
                    }
                };
                println!("{}", record.to_line()?);
            }
            Ok(RunOutcome::with_code(worst.code()))
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "tyco", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn load_input(input: &str, name: Option<&str>) -> Result<Document, BoundaryError> {
    if input != "-" {
        return Document::load_file(input);
    }
    let mut source = String::new();
    io::stdin().read_to_string(&mut source).map_err(|err| {
        BoundaryError::new(Status::ParsingFailed, format!("failed to read stdin: {err}"))
    })?;
    Document::load_str(&source, Some(name.unwrap_or(STDIN_SOURCE_NAME)))
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "tyco",
    version,
    about = "Render Tyco documents to JSON",
    long_about = None,
    after_help = r#"EXAMPLES
  $ tyco json app.tyco
  $ tyco json --pretty app.tyco
  $ cat app.tyco | tyco json - --name app.tyco
  $ tyco check configs/*.tyco"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,
    #[arg(short, long, global = true, help = "Log debug events to stderr (RUST_LOG wins)")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Print a document as JSON",
        long_about = r#"Load a document and print its canonical JSON (sorted keys, compact).

Use `-` to read the document from stdin."#,
        after_help = r#"EXAMPLES
  $ tyco json app.tyco
  $ tyco json --pretty app.tyco
  $ printf 'int port: 80\n' | tyco json -"#
    )]
    Json {
        #[arg(help = "Document path, or - for stdin", value_hint = ValueHint::FilePath)]
        input: String,
        #[arg(long, help = "Source label for diagnostics when reading stdin")]
        name: Option<String>,
        #[arg(long, help = "Pretty-print (and colorize on a terminal)")]
        pretty: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Validate documents",
        long_about = r#"Load each document and print one JSON line per file.

Exit code is 0 when every document loads, otherwise the highest failing status.
Argument errors exit with 64."#,
        after_help = r#"EXAMPLES
  $ tyco check app.tyco db.tyco"#
    )]
    Check {
        #[arg(required = true, help = "Document paths", value_hint = ValueHint::FilePath)]
        files: Vec<PathBuf>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ tyco completions bash > ~/.local/share/bash-completion/completions/tyco
  $ tyco completions zsh > ~/.zfunc/_tyco"#
    )]
    Completions {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Debug, Serialize)]
struct CheckRecord {
    path: String,
    ok: bool,
    status: &'static str,
    error: Option<String>,
}

impl CheckRecord {
    fn pass(path: &std::path::Path) -> Self {
        Self {
            path: path.display().to_string(),
            ok: true,
            status: Status::Ok.label(),
            error: None,
        }
    }

    fn fail(path: &std::path::Path, err: &BoundaryError) -> Self {
        Self {
            path: path.display().to_string(),
            ok: false,
            status: err.status().label(),
            error: Some(err.message().to_string()),
        }
    }

    fn to_line(&self) -> Result<String, BoundaryError> {
        serde_json::to_string(self).map_err(|err| {
            BoundaryError::new(Status::Internal, format!("failed to encode check record: {err}"))
        })
    }
}

fn emit_error(err: &BoundaryError, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }
    let value = json!({
        "error": {
            "status": err.status().label(),
            "message": err.message(),
        }
    });
    eprintln!("{value}");
}

fn error_text(err: &BoundaryError, use_color: bool) -> String {
    let label = if use_color {
        "\u{1b}[31merror:\u{1b}[0m"
    } else {
        "error:"
    };
    format!("{label} {}", err.message())
}
