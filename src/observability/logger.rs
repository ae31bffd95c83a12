//! Structured JSON logger for the sync core.
//!
//! One log line = one event. Lines are single-line JSON with deterministic
//! key ordering (event first, severity second, remaining fields sorted), so
//! log output is stable across runs and greppable by event name.
//!
//! Logging is synchronous and unbuffered; the core never logs on the hot
//! routing path above `Trace`.

use std::fmt;
use std::io::{self, Write};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-event detail (routing, coalescing)
    Trace = 0,
    /// Normal lifecycle operations
    Info = 1,
    /// Recoverable issues (malformed frames, callback failures)
    Warn = 2,
    /// Operation failures (transport errors)
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured logger emitting one JSON object per line
pub struct Logger;

impl Logger {
    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Trace, event, fields, &mut io::stdout());
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Info, event, fields, &mut io::stdout());
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Warn, event, fields, &mut io::stderr());
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::emit(Severity::Error, event, fields, &mut io::stderr());
    }

    fn emit<W: Write>(severity: Severity, event: &str, fields: &[(&str, &str)], writer: &mut W) {
        let line = Self::render(severity, event, fields);
        // One write_all call so concurrent lines never interleave
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    /// Render a log line without writing it (also used by tests)
    pub fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(128);

        out.push_str("{\"event\":\"");
        Self::escape(&mut out, event);
        out.push_str("\",\"severity\":\"");
        out.push_str(severity.as_str());
        out.push('"');

        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted {
            out.push_str(",\"");
            Self::escape(&mut out, key);
            out.push_str("\":\"");
            Self::escape(&mut out, value);
            out.push('"');
        }

        out.push_str("}\n");
        out
    }

    fn escape(out: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_line_is_valid_json() {
        let line = Logger::render(
            Severity::Warn,
            "EVENT_MALFORMED",
            &[("reason", "missing field `table`")],
        );

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "EVENT_MALFORMED");
        assert_eq!(parsed["severity"], "WARN");
        assert_eq!(parsed["reason"], "missing field `table`");
    }

    #[test]
    fn test_deterministic_field_order() {
        let a = Logger::render(Severity::Info, "T", &[("z", "1"), ("a", "2"), ("m", "3")]);
        let b = Logger::render(Severity::Info, "T", &[("a", "2"), ("m", "3"), ("z", "1")]);
        assert_eq!(a, b);

        let a_pos = a.find("\"a\"").unwrap();
        let m_pos = a.find("\"m\"").unwrap();
        let z_pos = a.find("\"z\"").unwrap();
        assert!(a_pos < m_pos && m_pos < z_pos);
    }

    #[test]
    fn test_event_comes_first() {
        let line = Logger::render(Severity::Info, "CHANNEL_SUBSCRIBED", &[("channel", "c1")]);
        assert!(line.starts_with("{\"event\":"));
        assert!(line.ends_with("}\n"));
    }

    #[test]
    fn test_escapes_special_characters() {
        let line = Logger::render(Severity::Error, "T", &[("msg", "a \"b\"\nc\\d")]);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["msg"], "a \"b\"\nc\\d");
    }

    #[test]
    fn test_single_line() {
        let line = Logger::render(Severity::Info, "T", &[("a", "1"), ("b", "2")]);
        assert_eq!(line.chars().filter(|c| *c == '\n').count(), 1);
    }
}
