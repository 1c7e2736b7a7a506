//! Purpose: Hold top-level CLI command dispatch for `zengate`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command that touches the engine goes through one `Gateway`.
//! Invariants: Engine output is never reformatted unless `--json` is requested.

use std::io::Write;

use super::*;
use zengate::api::{EngineConf, ExecRequest, Gateway, ScriptEngine, ScriptKind};

pub(super) fn dispatch_command(
    command: Command,
    engine: &EngineConfig,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "zengate", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Conf { conf } => {
            let parsed = EngineConf::parse(&conf)?;
            for warning in &parsed.warnings {
                emit_notice(
                    Notice::new("conf_warning", "conf", "none", warning.clone()),
                    color_mode,
                );
            }
            emit_json(parsed.to_json(), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Probe { json } => {
            let gateway = build_gateway(engine);
            let mut report = engine.target_json();
            match gateway.initialize() {
                Ok(()) => {
                    if json {
                        report["ready"] = json!(true);
                        emit_json(report, color_mode);
                    } else {
                        println!("{} engine ready", gateway.engine().name());
                    }
                    Ok(RunOutcome::ok())
                }
                Err(err) if json => {
                    report["ready"] = json!(false);
                    report["error"] = error_json(&err)["error"].clone();
                    emit_json(report, color_mode);
                    Ok(RunOutcome::with_code(to_exit_code(err.kind())))
                }
                Err(err) => Err(err),
            }
        }
        Command::Exec(args) => run_exec(args, engine, color_mode),
        Command::Mcp => {
            let gateway = build_gateway(engine);
            let engine_name = gateway.engine().name();
            mcp_stdio::serve(gateway, |err| {
                let notice = Notice::new("engine_unavailable", "mcp", engine_name, error_message(err))
                    .with_detail("kind", json!(format!("{:?}", err.kind())));
                emit_notice(notice, color_mode);
            })?;
            Ok(RunOutcome::ok())
        }
    }
}

fn build_gateway(engine: &EngineConfig) -> Gateway {
    Gateway::with_options(engine.select.clone().build(), engine.options.clone())
}

fn run_exec(args: ExecArgs, engine: &EngineConfig, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    let request = exec_request(&args)?;
    let gateway = build_gateway(engine);
    match gateway.run(&request) {
        Ok(output) => {
            if args.logs && !args.json {
                emit_logs(&output.logs);
            }
            if args.json {
                emit_json(
                    json!({ "output": output.output, "logs": output.logs }),
                    color_mode,
                );
            } else {
                write_stdout(output.output.as_bytes())?;
            }
            Ok(RunOutcome::ok())
        }
        Err(err) => {
            if args.logs {
                if let Some(logs) = err.logs() {
                    emit_logs(logs);
                }
            }
            Err(err)
        }
    }
}

fn exec_request(args: &ExecArgs) -> Result<ExecRequest, Error> {
    let script = read_script(&args.script)?;
    let keys = match (&args.keys, &args.keys_file) {
        (Some(keys), _) => keys.clone(),
        (None, Some(path)) => read_text_file(path, "keys")?,
        (None, None) => String::new(),
    };
    let data = match (&args.data, &args.data_file) {
        (Some(data), _) => data.clone(),
        (None, Some(path)) => read_text_file(path, "data")?,
        (None, None) => String::new(),
    };
    let kind = if args.lua {
        ScriptKind::Lua
    } else {
        ScriptKind::Zencode
    };
    let mut request = ExecRequest::classic(script, args.conf.clone(), keys, data).with_kind(kind);
    if args.extra.is_some() || args.context.is_some() {
        request = request.with_extended(
            args.extra.clone().unwrap_or_default(),
            args.context.clone().unwrap_or_default(),
        );
    }
    Ok(request)
}

fn emit_logs(logs: &str) {
    if logs.is_empty() {
        return;
    }
    if logs.ends_with('\n') {
        eprint!("{logs}");
    } else {
        eprintln!("{logs}");
    }
}

fn write_stdout(bytes: &[u8]) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(bytes)
        .and_then(|()| stdout.flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write output")
                .with_source(err)
        })
}
