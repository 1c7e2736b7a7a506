//! Purpose: The execution gateway: one engine, explicit initialisation, string-in/string-out calls.
//! Exports: `Gateway`, `GatewayOptions`, `ConfPolicy`.
//! Role: The component every surface (C ABI, CLI, MCP) calls through.
//! Invariants: Inputs reach the engine unmodified; the engine's output is returned unmodified.
//! Invariants: `initialize` is idempotent after success; failures are reported, not cached.
//! Invariants: Logs carry the request digest, never key or data material.
//! Invariants: Failures are returned to the caller and only traced at debug level.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, info_span, warn};

use crate::core::conf::EngineConf;
use crate::core::engine::ScriptEngine;
use crate::core::error::Error;
use crate::core::request::{ExecOutput, ExecRequest};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConfPolicy {
    /// Conf is opaque and only the engine interprets it.
    #[default]
    Forward,
    /// Conf is linted first; malformed conf fails before the engine runs.
    Validate,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GatewayOptions {
    pub conf_policy: ConfPolicy,
}

pub struct Gateway<E = Box<dyn ScriptEngine>> {
    engine: E,
    options: GatewayOptions,
    ready: AtomicBool,
}

impl<E: ScriptEngine> Gateway<E> {
    pub fn new(engine: E) -> Self {
        Self::with_options(engine, GatewayOptions::default())
    }

    pub fn with_options(engine: E, options: GatewayOptions) -> Self {
        Self {
            engine,
            options,
            ready: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn initialize(&self) -> Result<(), Error> {
        if self.is_ready() {
            return Ok(());
        }
        match self.engine.initialize() {
            Ok(()) => {
                self.ready.store(true, Ordering::Release);
                info!(engine = self.engine.name(), "engine ready");
                Ok(())
            }
            Err(err) => {
                debug!(engine = self.engine.name(), error = %err, "engine initialisation failed");
                Err(err)
            }
        }
    }

    pub fn execute(&self, script: &str, conf: &str, keys: &str, data: &str) -> Result<String, Error> {
        self.run(&ExecRequest::classic(script, conf, keys, data))
            .map(|output| output.output)
    }

    pub fn execute_extended(
        &self,
        script: &str,
        conf: &str,
        keys: &str,
        data: &str,
        extra: &str,
        context: &str,
    ) -> Result<String, Error> {
        self.run(&ExecRequest::extended(
            script, conf, keys, data, extra, context,
        ))
        .map(|output| output.output)
    }

    /// Full form of `execute`, keeping the engine logs.
    pub fn run(&self, request: &ExecRequest) -> Result<ExecOutput, Error> {
        if self.options.conf_policy == ConfPolicy::Validate {
            let conf = EngineConf::parse(&request.conf)?;
            for warning in &conf.warnings {
                warn!(warning = %warning, "conf lint");
            }
        }
        self.initialize()?;

        let digest = request.digest();
        let span = info_span!(
            "execute",
            engine = self.engine.name(),
            kind = request.kind.as_str(),
            arity = request.arity(),
            digest = &digest[..16],
        );
        let _entered = span.enter();
        let started = Instant::now();
        match self.engine.execute(request) {
            Ok(output) => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    output_len = output.output.len(),
                    logs_len = output.logs.len(),
                    "execution succeeded"
                );
                Ok(output)
            }
            Err(err) => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    kind = ?err.kind(),
                    error = %err,
                    "execution failed"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfPolicy, Gateway, GatewayOptions};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::recording::RecordingEngine;
    use crate::core::request::ExecOutput;

    #[test]
    fn initialize_is_idempotent_after_success() {
        let gateway = Gateway::new(RecordingEngine::new());
        assert!(!gateway.is_ready());
        gateway.initialize().expect("first");
        gateway.initialize().expect("second");
        assert!(gateway.is_ready());
        assert_eq!(gateway.engine().initialize_calls(), 1);
    }

    #[test]
    fn failed_initialize_is_retried() {
        let gateway = Gateway::new(RecordingEngine::new().failing_initialize("no library"));
        assert_eq!(
            gateway.initialize().expect_err("fails").kind(),
            ErrorKind::Load
        );
        assert_eq!(
            gateway.initialize().expect_err("fails again").kind(),
            ErrorKind::Load
        );
        assert_eq!(gateway.engine().initialize_calls(), 2);
        assert!(!gateway.is_ready());
    }

    #[test]
    fn execute_initialises_lazily() {
        let gateway = Gateway::new(RecordingEngine::returning("ok"));
        assert_eq!(gateway.execute("s", "", "", "").expect("exec"), "ok");
        assert!(gateway.is_ready());
    }

    #[test]
    fn invocation_failure_is_distinguishable() {
        let engine = RecordingEngine::new().with_responder(|_| {
            Err(Error::new(ErrorKind::Invocation)
                .with_message("[!] Zencode parser error")
                .with_status(1))
        });
        let gateway = Gateway::new(engine);
        let err = gateway.execute("bogus", "", "", "").expect_err("fails");
        assert_eq!(err.kind(), ErrorKind::Invocation);
        assert_eq!(err.message(), Some("[!] Zencode parser error"));
    }

    #[test]
    fn validate_policy_rejects_bad_conf_before_the_engine() {
        let gateway = Gateway::with_options(
            RecordingEngine::new(),
            GatewayOptions {
                conf_policy: ConfPolicy::Validate,
            },
        );
        let err = gateway
            .execute("s", "debug=\"loud\"", "", "")
            .expect_err("bad conf");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(gateway.engine().calls().is_empty());

        gateway.execute("s", "debug=1, color=0", "", "").expect("good conf");
        assert_eq!(gateway.engine().calls()[0].conf, "debug=1, color=0");
    }

    #[test]
    fn forward_policy_passes_any_conf() {
        let gateway = Gateway::new(RecordingEngine::new());
        gateway.execute("s", "not ; a = conf", "", "").expect("opaque");
        assert_eq!(gateway.engine().calls()[0].conf, "not ; a = conf");
    }

    #[test]
    fn run_keeps_logs() {
        let engine = RecordingEngine::new()
            .with_responder(|_| Ok(ExecOutput::new("{}").with_logs("[*] done")));
        let gateway = Gateway::new(engine);
        let output = gateway
            .run(&crate::core::request::ExecRequest::new("s"))
            .expect("run");
        assert_eq!(output.logs, "[*] done");
    }
}
