//! Result text formatting for the code-mode tool.
//!
//! The wire content is plain text, not JSON, so a caller's parser can
//! cheaply classify success/failure by substring rather than by decoding a
//! structured payload: presence of `"Return value:"` means success;
//! presence of `"Execution runtime error:"`, `"Execution failed:"`, or
//! `"Execution validation error:"` means failure.

pub const SUCCESS_MARKER: &str = "Return value:";
pub const RUNTIME_ERROR_MARKER: &str = "Execution runtime error:";
pub const FAILED_MARKER: &str = "Execution failed:";
pub const VALIDATION_ERROR_MARKER: &str = "Execution validation error:";

/// One finished code-mode execution, already rendered into the text format
/// the tool result carries.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub is_error: bool,
    pub text: String,
}

impl ExecutionReport {
    fn console_section(console: &[String]) -> String {
        if console.is_empty() {
            "[Console output: (none)]".to_string()
        } else {
            format!("[Console output: {}]", console.join(" | "))
        }
    }

    pub fn success(console: &[String], return_value_json: &str, environment: &str) -> Self {
        let text = format!(
            "{}\nExecution completed successfully.\n{SUCCESS_MARKER} {return_value_json}\nEnvironment: {environment}",
            Self::console_section(console)
        );
        Self { is_error: false, text }
    }

    pub fn validation_error(console: &[String], message: &str, environment: &str) -> Self {
        let text = format!(
            "{}\n{VALIDATION_ERROR_MARKER}\n{message}\nEnvironment: {environment}",
            Self::console_section(console)
        );
        Self { is_error: true, text }
    }

    pub fn runtime_error(console: &[String], message: &str, environment: &str) -> Self {
        let text = format!(
            "{}\n{RUNTIME_ERROR_MARKER}\n{message}\nEnvironment: {environment}",
            Self::console_section(console)
        );
        Self { is_error: true, text }
    }

    /// For host-side plumbing failures unrelated to the guest program itself
    /// (e.g. the interpreter could not be constructed). Distinct from
    /// `runtime_error`, which covers the guest program throwing or timing
    /// out mid-execution.
    pub fn failed(message: &str, environment: &str) -> Self {
        let text = format!("{}\n{FAILED_MARKER}\n{message}\nEnvironment: {environment}", Self::console_section(&[]));
        Self { is_error: true, text }
    }
}

/// Whether `text` carries the success marker.
pub fn is_success_marker(text: &str) -> bool {
    text.contains(SUCCESS_MARKER)
}

/// Whether `text` carries any of the three recognized error markers.
pub fn is_error_marker(text: &str) -> bool {
    text.contains(RUNTIME_ERROR_MARKER) || text.contains(FAILED_MARKER) || text.contains(VALIDATION_ERROR_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_carries_return_value_marker() {
        let report = ExecutionReport::success(&[], "{\"ok\":true}", "clients=[]");
        assert!(is_success_marker(&report.text));
        assert!(!is_error_marker(&report.text));
        assert!(!report.is_error);
    }

    #[test]
    fn runtime_error_carries_marker() {
        let report = ExecutionReport::runtime_error(&[], "boom", "clients=[]");
        assert!(is_error_marker(&report.text));
        assert!(!is_success_marker(&report.text));
        assert!(report.is_error);
    }

    #[test]
    fn validation_error_carries_marker() {
        let report = ExecutionReport::validation_error(&[], "Unexpected token", "clients=[]");
        assert!(is_error_marker(&report.text));
        assert!(report.text.contains(VALIDATION_ERROR_MARKER));
    }

    #[test]
    fn failed_carries_marker_and_empty_console() {
        let report = ExecutionReport::failed("could not start interpreter", "clients=[]");
        assert!(is_error_marker(&report.text));
        assert!(report.text.contains(FAILED_MARKER));
    }

    #[test]
    fn console_output_joins_lines() {
        let report = ExecutionReport::success(&["hi".to_string(), "there".to_string()], "1", "clients=[]");
        assert!(report.text.contains("[Console output: hi | there]"));
    }
}
