//! Purpose: Request/response values crossing the engine boundary.
//! Exports: `ExecRequest`, `ExtendedInputs`, `ExecOutput`, `ScriptKind`.
//! Role: One invocation in, one result out; no state shared between calls.
//! Invariants: Fields are opaque text and are never rewritten after construction.
//! Invariants: `forwarded_fields` yields the wire order (script, conf, keys, data[, extra, context]).
use sha2::{Digest, Sha256};

/// Which engine entry point interprets the script.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum ScriptKind {
    #[default]
    Zencode,
    Lua,
}

impl ScriptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptKind::Zencode => "zencode",
            ScriptKind::Lua => "lua",
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ExtendedInputs {
    pub extra: String,
    pub context: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ExecRequest {
    pub kind: ScriptKind,
    pub script: String,
    pub conf: String,
    pub keys: String,
    pub data: String,
    pub extended: Option<ExtendedInputs>,
}

impl ExecRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// The four-input form.
    pub fn classic(
        script: impl Into<String>,
        conf: impl Into<String>,
        keys: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            kind: ScriptKind::Zencode,
            script: script.into(),
            conf: conf.into(),
            keys: keys.into(),
            data: data.into(),
            extended: None,
        }
    }

    /// The six-input form.
    pub fn extended(
        script: impl Into<String>,
        conf: impl Into<String>,
        keys: impl Into<String>,
        data: impl Into<String>,
        extra: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::classic(script, conf, keys, data).with_extended(extra, context)
    }

    pub fn with_kind(mut self, kind: ScriptKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_conf(mut self, conf: impl Into<String>) -> Self {
        self.conf = conf.into();
        self
    }

    pub fn with_keys(mut self, keys: impl Into<String>) -> Self {
        self.keys = keys.into();
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_extended(mut self, extra: impl Into<String>, context: impl Into<String>) -> Self {
        self.extended = Some(ExtendedInputs {
            extra: extra.into(),
            context: context.into(),
        });
        self
    }

    pub fn arity(&self) -> usize {
        if self.extended.is_some() { 6 } else { 4 }
    }

    pub fn extra(&self) -> Option<&str> {
        self.extended.as_ref().map(|inputs| inputs.extra.as_str())
    }

    pub fn context(&self) -> Option<&str> {
        self.extended.as_ref().map(|inputs| inputs.context.as_str())
    }

    /// Named fields in wire order.
    pub fn forwarded_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("script", self.script.as_str()),
            ("conf", self.conf.as_str()),
            ("keys", self.keys.as_str()),
            ("data", self.data.as_str()),
        ];
        if let Some(inputs) = &self.extended {
            fields.push(("extra", inputs.extra.as_str()));
            fields.push(("context", inputs.context.as_str()));
        }
        fields
    }

    /// SHA-256 over kind, arity and length-prefixed fields, as lowercase hex.
    ///
    /// Logged in place of the inputs so key material never reaches the log sink.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update([self.arity() as u8]);
        for (_, value) in self.forwarded_fields() {
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecOutput {
    pub output: String,
    pub logs: String,
}

impl ExecOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            logs: String::new(),
        }
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = logs.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecRequest, ScriptKind};

    #[test]
    fn classic_request_forwards_four_fields_in_order() {
        let request = ExecRequest::classic("script", "debug=1", "", "{}");
        assert_eq!(request.arity(), 4);
        assert_eq!(
            request.forwarded_fields(),
            vec![
                ("script", "script"),
                ("conf", "debug=1"),
                ("keys", ""),
                ("data", "{}"),
            ]
        );
    }

    #[test]
    fn extended_request_keeps_empty_extra_and_context() {
        let request = ExecRequest::extended("s", "", "k", "d", "", "");
        assert_eq!(request.arity(), 6);
        assert_eq!(request.extra(), Some(""));
        assert_eq!(request.context(), Some(""));
        assert_eq!(request.forwarded_fields().len(), 6);
    }

    #[test]
    fn digest_is_stable_and_field_sensitive() {
        let a = ExecRequest::classic("s", "c", "k", "d");
        let b = ExecRequest::classic("s", "c", "k", "d");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        // Moving a byte across a field boundary changes the digest.
        let shifted = ExecRequest::classic("s", "ck", "", "d");
        assert_ne!(a.digest(), shifted.digest());

        let lua = a.clone().with_kind(ScriptKind::Lua);
        assert_ne!(a.digest(), lua.digest());

        let six = ExecRequest::extended("s", "c", "k", "d", "", "");
        assert_ne!(a.digest(), six.digest());
    }
}
