//! Purpose: `zengate` CLI entry point.
//! Role: Binary crate root; parses args, builds the engine, runs commands.
//! Invariants: `exec` writes the engine output to stdout byte-for-byte (or wrapped with --json).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;
use zengate::api::{
    ConfPolicy, EngineSelect, EntryAbi, Error, ErrorKind, GatewayOptions, NativeOptions,
    ProcessOptions, to_exit_code,
};
use zengate::notice::{Notice, notice_json};

mod command_dispatch;
mod mcp_stdio;

const LOG_ENV: &str = "ZENGATE_LOG";

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
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let engine = EngineConfig::from_cli(&cli.engine);
    command_dispatch::dispatch_command(cli.command, &engine, color_mode)
        .map_err(add_load_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "zengate",
    version,
    about = "Run Zencode and Lua scripts through the Zenroom engine",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Scripts, conf, keys and data are passed to the engine as-is; its output comes back as-is.

Engines:
  - `native` loads libzenroom and calls its *_exec_tobuf entry points
  - `process` pipes the request to a `zencode-exec` binary
"#,
    after_help = r#"EXAMPLES
  $ zengate exec keygen.zen
  $ zengate exec sign.zen --keys-file alice.keys --data '{"message":"hi"}'
  $ zengate --engine process exec - < script.zen
  $ zengate probe --json

LEARN MORE
  $ zengate <command> --help
  https://dev.zenroom.org"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug)]
struct EngineArgs {
    #[arg(
        long,
        global = true,
        env = "ZENGATE_ENGINE",
        default_value = "native",
        value_enum,
        help = "Engine adapter: native|process"
    )]
    engine: EngineKind,
    #[arg(
        long = "lib",
        global = true,
        env = "ZENGATE_LIB",
        help = "Path or soname of the Zenroom shared library (native engine)",
        value_hint = ValueHint::FilePath
    )]
    lib: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "ZENGATE_ABI",
        default_value = "extended",
        value_enum,
        help = "Entry point signature exported by the library: classic|extended"
    )]
    abi: AbiKind,
    #[arg(
        long = "exec-bin",
        global = true,
        env = "ZENGATE_EXEC_BIN",
        help = "zencode-exec binary (process engine)",
        value_hint = ValueHint::ExecutablePath
    )]
    exec_bin: Option<PathBuf>,
    #[arg(long, global = true, help = "Reject malformed conf before calling the engine")]
    strict_conf: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    Native,
    Process,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum AbiKind {
    Classic,
    Extended,
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

/// Resolved engine choice shared by every command.
#[derive(Clone, Debug)]
struct EngineConfig {
    select: EngineSelect,
    options: GatewayOptions,
}

impl EngineConfig {
    fn from_cli(args: &EngineArgs) -> Self {
        let select = match args.engine {
            EngineKind::Native => {
                let mut options = NativeOptions::default().with_abi(match args.abi {
                    AbiKind::Classic => EntryAbi::Classic,
                    AbiKind::Extended => EntryAbi::Extended,
                });
                if let Some(lib) = &args.lib {
                    options.library = lib.clone();
                }
                EngineSelect::Native(options)
            }
            EngineKind::Process => EngineSelect::Process(
                args.exec_bin
                    .clone()
                    .map(ProcessOptions::new)
                    .unwrap_or_default(),
            ),
        };
        let conf_policy = if args.strict_conf {
            ConfPolicy::Validate
        } else {
            ConfPolicy::Forward
        };
        Self {
            select,
            options: GatewayOptions { conf_policy },
        }
    }

    fn target_json(&self) -> Value {
        match &self.select {
            EngineSelect::Native(options) => json!({
                "engine": "native",
                "library": options.library.display().to_string(),
                "abi": match options.abi {
                    EntryAbi::Classic => "classic",
                    EntryAbi::Extended => "extended",
                },
            }),
            EngineSelect::Process(options) => json!({
                "engine": "process",
                "program": options.program.display().to_string(),
            }),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Execute a script",
        long_about = r#"Execute a Zencode (or, with --lua, Lua) script.

The script comes from a file, or from stdin when SCRIPT is `-`.
Keys and data are JSON strings handed to the engine untouched."#,
        after_help = r#"EXAMPLES
  $ zengate exec keygen.zen
  $ zengate exec sign.zen --keys-file alice.keys --data '{"message":"hi"}'
  $ zengate exec verify.zen --extra '{}' --context 'session-1'
  $ cat hello.lua | zengate exec --lua -

NOTES
  - `--extra`/`--context` select the six-input entry point (native engine only)
  - `--logs` copies the engine's log stream to stderr
  - `--json` wraps the result as {"output","logs"}"#
    )]
    Exec(ExecArgs),
    #[command(about = "Load the engine and report whether it is usable")]
    Probe {
        #[arg(long, help = "Emit JSON")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Parse an engine conf string and print its directives",
        after_help = r#"EXAMPLES
  $ zengate conf 'debug=3, rngseed="hex:00112233"'
  $ zengate conf 'logfmt=json'"#
    )]
    Conf {
        #[arg(help = "Conf string, e.g. debug=1,color=0")]
        conf: String,
    },
    #[command(about = "Run an MCP server on stdio exposing execute/validate tools and prompts")]
    Mcp,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ zengate completion bash > /etc/bash_completion.d/zengate
  $ zengate completion zsh > ~/.zfunc/_zengate"#
    )]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

#[derive(Args, Clone, Debug)]
struct ExecArgs {
    #[arg(help = "Script file, or - for stdin", value_hint = ValueHint::FilePath)]
    script: String,
    #[arg(long, default_value = "", help = "Engine conf string")]
    conf: String,
    #[arg(long, help = "Inline keys JSON")]
    keys: Option<String>,
    #[arg(
        long = "keys-file",
        conflicts_with = "keys",
        help = "Read keys from a file",
        value_hint = ValueHint::FilePath
    )]
    keys_file: Option<PathBuf>,
    #[arg(long, help = "Inline data JSON")]
    data: Option<String>,
    #[arg(
        long = "data-file",
        conflicts_with = "data",
        help = "Read data from a file",
        value_hint = ValueHint::FilePath
    )]
    data_file: Option<PathBuf>,
    #[arg(long, help = "Extra input (six-input call)")]
    extra: Option<String>,
    #[arg(long, help = "Context input (six-input call)")]
    context: Option<String>,
    #[arg(long, help = "Treat the script as Lua")]
    lua: bool,
    #[arg(long, help = "Copy engine logs to stderr")]
    logs: bool,
    #[arg(long, help = "Emit {\"output\",\"logs\"} JSON instead of the raw output")]
    json: bool,
}

fn read_script(source: &str) -> Result<String, Error> {
    if source == "-" {
        let mut script = String::new();
        io::stdin().read_to_string(&mut script).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read script from stdin")
                .with_source(err)
        })?;
        return Ok(script);
    }
    read_text_file(Path::new(source), "script")
}

fn read_text_file(path: &Path, field: &'static str) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::NotFound {
            ErrorKind::Usage
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message(format!("failed to read {field} from {}", path.display()))
            .with_field(field)
            .with_source(err)
    })
}

fn add_load_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Load || err.hint().is_some() {
        return err;
    }
    err.with_hint("Set --lib/ZENGATE_LIB to libzenroom, or use --engine process.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint("Internal error. Re-run with ZENGATE_LOG=debug and report the output.")
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("zengate {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "zengate",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_notice(notice: Notice, color_mode: ColorMode) {
    let notice = notice.with_time(notice_time_now().unwrap_or_default());
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (engine: {})", notice.message, notice.engine);
        return;
    }

    let value = notice_json(&notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Load => "engine could not be loaded".to_string(),
        ErrorKind::Invocation => "script execution failed".to_string(),
        ErrorKind::Config => "invalid engine configuration".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(field) = err.field() {
        lines.push(format!(
            "{} {field}",
            colorize_label("field:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(status) = err.status() {
        lines.push(format!(
            "{} {status}",
            colorize_label("status:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `zengate --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "zengate") else {
        return "Try `zengate --help`.".to_string();
    };

    let parts = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return "Try `zengate --help`.".to_string();
    }
    format!("Try `zengate {} --help`.", parts.join(" "))
}
