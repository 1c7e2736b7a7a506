//! Purpose: Lint engine configuration strings (`debug=1,rngseed="..."`).
//! Exports: `EngineConf`, `ConfDirective`, `ConfKey`, `ConfValue`.
//! Role: Optional pre-flight check; the gateway still forwards the conf text verbatim.
//! Invariants: Strings shorter than 3 bytes carry no directives.
//! Invariants: Unknown identifiers warn and clear the current key; a literal with no matching key is `ErrorKind::Config`.
//! Invariants: `=` with no current key warns; any other character is `ErrorKind::Config`.
use serde_json::{Value, json};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfKey {
    Debug,
    Color,
    Seccomp,
    RngSeed,
    LogFmt,
}

impl ConfKey {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "debug" | "verbose" => Some(ConfKey::Debug),
            "color" => Some(ConfKey::Color),
            "seccomp" => Some(ConfKey::Seccomp),
            "rngseed" => Some(ConfKey::RngSeed),
            "logfmt" => Some(ConfKey::LogFmt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfKey::Debug => "debug",
            ConfKey::Color => "color",
            ConfKey::Seccomp => "seccomp",
            ConfKey::RngSeed => "rngseed",
            ConfKey::LogFmt => "logfmt",
        }
    }

    fn takes_int(self) -> bool {
        matches!(self, ConfKey::Debug | ConfKey::Color | ConfKey::Seccomp)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfValue {
    Int(i64),
    Text(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfDirective {
    pub key: ConfKey,
    pub value: ConfValue,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EngineConf {
    pub directives: Vec<ConfDirective>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Comma,
    Equals,
}

impl EngineConf {
    /// Runs the engine's conf state machine: a key selects the slot the next literal fills.
    pub fn parse(conf: &str) -> Result<Self, Error> {
        let mut parsed = EngineConf::default();
        if conf.len() < 3 {
            return Ok(parsed);
        }

        let mut current: Option<ConfKey> = None;
        for token in tokenize(conf)? {
            match token {
                Token::Comma => current = None,
                Token::Equals => {
                    if current.is_none() {
                        parsed
                            .warnings
                            .push("undefined config variable".to_string());
                    }
                }
                Token::Ident(name) => {
                    // `logfmt` takes an identifier; the runner appends `logfmt=json` itself.
                    if current == Some(ConfKey::LogFmt) {
                        let value = name.to_ascii_lowercase();
                        if value == "text" || value == "json" {
                            parsed.push(ConfKey::LogFmt, ConfValue::Text(value));
                            continue;
                        }
                    }
                    current = ConfKey::lookup(&name);
                    if current.is_none() {
                        parsed
                            .warnings
                            .push(format!("unrecognised configuration: {name}"));
                    }
                }
                Token::Int(value) => match current {
                    Some(key) if key.takes_int() => parsed.push(key, ConfValue::Int(value)),
                    _ => return Err(invalid(conf, "invalid configuration")),
                },
                Token::Str(value) => match current {
                    Some(ConfKey::RngSeed) => parsed.push(ConfKey::RngSeed, ConfValue::Text(value)),
                    _ => return Err(invalid(conf, "invalid configuration")),
                },
            }
        }
        Ok(parsed)
    }

    fn push(&mut self, key: ConfKey, value: ConfValue) {
        self.directives.push(ConfDirective { key, value });
    }

    /// Last value wins, matching how the engine applies repeated directives.
    pub fn get(&self, key: ConfKey) -> Option<&ConfValue> {
        self.directives
            .iter()
            .rev()
            .find(|directive| directive.key == key)
            .map(|directive| &directive.value)
    }

    pub fn debug_level(&self) -> Option<i64> {
        match self.get(ConfKey::Debug) {
            Some(ConfValue::Int(level)) => Some(*level),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let directives = self
            .directives
            .iter()
            .map(|directive| {
                let value = match &directive.value {
                    ConfValue::Int(value) => json!(value),
                    ConfValue::Text(value) => json!(value),
                };
                json!({ "key": directive.key.as_str(), "value": value })
            })
            .collect::<Vec<_>>();
        json!({ "directives": directives, "warnings": self.warnings })
    }
}

fn invalid(conf: &str, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Config)
        .with_message(message)
        .with_field("conf")
        .with_hint(format!("conf was: {conf}"))
}

fn tokenize(conf: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut chars = conf.char_indices().peekable();
    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        match ch {
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        '\n' => break,
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(invalid(conf, "unterminated string in configuration"));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let mut end = start;
                while let Some(&(idx, c)) = chars.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    end = idx + c.len_utf8();
                    chars.next();
                }
                let value = conf[start..end].parse::<i64>().map_err(|err| {
                    invalid(conf, "integer out of range in configuration").with_source(err)
                })?;
                tokens.push(Token::Int(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(idx, c)) = chars.peek() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    end = idx + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(conf[start..end].to_string()));
            }
            other => {
                return Err(invalid(
                    conf,
                    format!("invalid string in configuration: {other}"),
                ));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::{ConfKey, ConfValue, EngineConf};
    use crate::core::error::ErrorKind;

    #[test]
    fn short_or_empty_conf_has_no_directives() {
        assert_eq!(EngineConf::parse("").expect("empty"), EngineConf::default());
        assert_eq!(EngineConf::parse("d=").expect("short"), EngineConf::default());
    }

    #[test]
    fn parses_known_directives() {
        let conf = EngineConf::parse("debug=3, color=0,rngseed=\"hex:00aa\",logfmt=json")
            .expect("parse");
        assert_eq!(conf.debug_level(), Some(3));
        assert_eq!(conf.get(ConfKey::Color), Some(&ConfValue::Int(0)));
        assert_eq!(
            conf.get(ConfKey::RngSeed),
            Some(&ConfValue::Text("hex:00aa".to_string()))
        );
        assert_eq!(
            conf.get(ConfKey::LogFmt),
            Some(&ConfValue::Text("json".to_string()))
        );
        assert!(conf.warnings.is_empty());
    }

    #[test]
    fn verbose_is_an_alias_and_keys_ignore_case() {
        let conf = EngineConf::parse("VERBOSE=2").expect("parse");
        assert_eq!(conf.debug_level(), Some(2));
    }

    #[test]
    fn literal_after_unknown_key_is_invalid() {
        let err = EngineConf::parse("memwipe=1,debug=1").expect_err("no slot for 1");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.message(), Some("invalid configuration"));

        assert!(EngineConf::parse("memwipe=\"on\"").is_err());
    }

    #[test]
    fn identifier_values_only_warn() {
        let conf = EngineConf::parse("debug=foo,color=1").expect("parse");
        assert_eq!(conf.debug_level(), None);
        assert_eq!(conf.get(ConfKey::Color), Some(&ConfValue::Int(1)));
        assert_eq!(conf.warnings, vec!["unrecognised configuration: foo"]);
    }

    #[test]
    fn equals_without_a_key_warns() {
        let conf = EngineConf::parse("memwipe=on").expect("parse");
        assert_eq!(
            conf.warnings,
            vec![
                "unrecognised configuration: memwipe",
                "undefined config variable",
                "unrecognised configuration: on",
            ]
        );

        let conf = EngineConf::parse("debug=1,=2").expect_err("2 has no key");
        assert_eq!(conf.kind(), ErrorKind::Config);
    }

    #[test]
    fn a_key_keeps_taking_values_until_the_next_comma() {
        let conf = EngineConf::parse("debug 1 2").expect("parse");
        assert_eq!(conf.directives.len(), 2);
        assert_eq!(conf.debug_level(), Some(2));
        assert!(conf.warnings.is_empty());
    }

    #[test]
    fn type_mismatch_is_config_error() {
        let err = EngineConf::parse("debug=\"x\"").expect_err("string for int key");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.field(), Some("conf"));

        let err = EngineConf::parse("rngseed=12").expect_err("int for string key");
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn stray_characters_and_open_strings_fail() {
        assert!(EngineConf::parse("debug=1;color=1").is_err());
        assert!(EngineConf::parse("rngseed=\"abc").is_err());
        assert!(EngineConf::parse("debug=-1").is_err());
    }

    #[test]
    fn unknown_logfmt_is_an_unrecognised_identifier() {
        let conf = EngineConf::parse("logfmt=yaml").expect("parse");
        assert_eq!(conf.get(ConfKey::LogFmt), None);
        assert_eq!(conf.warnings, vec!["unrecognised configuration: yaml"]);
    }

    #[test]
    fn json_view_lists_directives() {
        let conf = EngineConf::parse("debug=1").expect("parse");
        let value = conf.to_json();
        assert_eq!(value["directives"][0]["key"], "debug");
        assert_eq!(value["directives"][0]["value"], 1);
    }
}
