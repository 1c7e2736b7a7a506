//! Purpose: Turn engine log text into a one-line failure diagnostic.
//! Exports: `diagnostic`, `log_lines`.
//! Invariants: Accepts both plain-text logs and the JSON array emitted with `logfmt=json`.
//! Invariants: Always returns a non-empty message.
use serde_json::Value;

const ERROR_PREFIX: &str = "[!]";

/// Log lines in emission order, with JSON string arrays flattened.
pub fn log_lines(logs: &str) -> Vec<String> {
    let trimmed = logs.trim();
    if trimmed.starts_with('[') {
        if let Some(lines) = json_lines(trimmed) {
            return lines;
        }
    }
    logs.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn diagnostic(logs: &str, status: i32) -> String {
    let lines = log_lines(logs);
    let errors = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| line.starts_with(ERROR_PREFIX))
        .collect::<Vec<_>>();
    if !errors.is_empty() {
        return errors.join("; ");
    }
    lines
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !is_log_marker(line))
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("engine exited with status {status}"))
}

fn json_lines(text: &str) -> Option<Vec<String>> {
    // The JSON log may be truncated if the engine aborted mid-write.
    let value = serde_json::from_str::<Value>(text)
        .or_else(|_| serde_json::from_str::<Value>(&format!("{} ]", text.trim_end_matches(','))))
        .ok()?;
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(line) => Some(line.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|line| !line.trim().is_empty())
            .collect(),
    )
}

fn is_log_marker(line: &str) -> bool {
    line.starts_with("ZENROOM JSON LOG")
}

#[cfg(test)]
mod tests {
    use super::{diagnostic, log_lines};

    #[test]
    fn text_logs_prefer_error_lines() {
        let logs = "[*] Zenroom v4\n[W] deprecated statement\n[!] Zencode parser error\n[!] line 3: When I frobnicate\n";
        assert_eq!(
            diagnostic(logs, 1),
            "[!] Zencode parser error; [!] line 3: When I frobnicate"
        );
    }

    #[test]
    fn json_logs_are_flattened() {
        let logs = r#"[ "ZENROOM JSON LOG START", "[*] release", "[!] Execution aborted", "ZENROOM JSON LOG END" ]"#;
        assert_eq!(
            log_lines(logs),
            vec![
                "ZENROOM JSON LOG START",
                "[*] release",
                "[!] Execution aborted",
                "ZENROOM JSON LOG END"
            ]
        );
        assert_eq!(diagnostic(logs, 1), "[!] Execution aborted");
    }

    #[test]
    fn truncated_json_log_is_recovered() {
        let logs = "[ \"ZENROOM JSON LOG START\",\n\"[!] Initialisation failed\",";
        assert_eq!(diagnostic(logs, 1), "[!] Initialisation failed");
    }

    #[test]
    fn falls_back_to_last_line_then_status() {
        assert_eq!(diagnostic("first\nsegfault in vm\n", 139), "segfault in vm");
        assert_eq!(diagnostic("", 2), "engine exited with status 2");
        assert_eq!(diagnostic("  \n", 7), "engine exited with status 7");
    }
}
