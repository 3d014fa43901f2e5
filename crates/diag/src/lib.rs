use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

/// How serious a reported message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Style,
    Debug,
}

impl Severity {
    pub fn from_string(s: &str) -> Severity {
        match s {
            "warning" => Severity::Warning,
            "style" => Severity::Style,
            "debug" => Severity::Debug,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Style => "style",
            Severity::Debug => "debug",
        };
        f.write_str(s)
    }
}

/// A single file/line position attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLocation {
    pub file: String,
    pub line: u32,
}

impl FileLocation {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: file.to_string(),
            line,
        }
    }
}

/// A reportable diagnostic. `file0` names the translation unit that was
/// being analyzed when the message was produced, which can differ from the
/// location list when the message points into an included header.
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    pub locations: Vec<FileLocation>,
    pub severity: Severity,
    pub id: String,
    pub msg: String,
    pub file0: String,
}

impl ErrorMessage {
    pub fn new(locations: Vec<FileLocation>, severity: Severity, msg: &str, id: &str) -> Self {
        Self {
            locations,
            severity,
            id: id.to_string(),
            msg: msg.to_string(),
            file0: String::new(),
        }
    }

    /// Serialize as a single `<error .../>` element.
    pub fn to_xml(&self) -> String {
        let (file, line) = match self.locations.last() {
            Some(loc) => (loc.file.as_str(), loc.line),
            None => ("", 0),
        };
        format!(
            "<error file=\"{}\" line=\"{}\" id=\"{}\" severity=\"{}\" msg=\"{}\"/>",
            xml_escape(file),
            line,
            xml_escape(&self.id),
            self.severity,
            xml_escape(&self.msg)
        )
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.locations.last() {
            Some(loc) => write!(
                f,
                "[{}:{}]: ({}) {}",
                loc.file, loc.line, self.severity, self.msg
            ),
            None => write!(f, "({}) {}", self.severity, self.msg),
        }
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Receiver for diagnostics and progress notifications.
pub trait Reporter {
    fn report_err(&mut self, msg: &ErrorMessage);

    fn report_progress(&mut self, _filename: &str, _stage: &str, _value: u32) {}
}

/// A `Reporter` that buffers everything it receives. Embedders that render
/// messages lazily, and the test suites, use this.
#[derive(Debug, Default)]
pub struct Collector {
    pub messages: Vec<ErrorMessage>,
    pub progress: Vec<(String, String, u32)>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// One rendered message per line, for assertions.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for m in &self.messages {
            out.push_str(&m.to_string());
            out.push('\n');
        }
        out
    }

    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }
}

impl Reporter for Collector {
    fn report_err(&mut self, msg: &ErrorMessage) {
        self.messages.push(msg.clone());
    }

    fn report_progress(&mut self, filename: &str, stage: &str, value: u32) {
        self.progress
            .push((filename.to_string(), stage.to_string(), value));
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SuppressionError {
    #[error("suppression id is empty")]
    EmptyId,
    #[error("invalid character in suppression id '{0}'")]
    BadId(String),
}

/// One registered suppression. `line == 0` matches every line of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppression {
    pub id: String,
    pub file: String,
    pub line: u32,
}

/// The set of messages the user asked not to see.
#[derive(Debug, Default)]
pub struct Suppressions {
    entries: Vec<Suppression>,
}

impl Suppressions {
    pub fn add_suppression(
        &mut self,
        id: &str,
        file: &str,
        line: u32,
    ) -> Result<(), SuppressionError> {
        if id.is_empty() {
            return Err(SuppressionError::EmptyId);
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SuppressionError::BadId(id.to_string()));
        }
        let entry = Suppression {
            id: id.to_string(),
            file: file.to_string(),
            line,
        };
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
        Ok(())
    }

    pub fn is_suppressed(&self, id: &str, file: &str, line: u32) -> bool {
        self.entries
            .iter()
            .any(|s| s.id == id && s.file == file && (s.line == 0 || s.line == line))
    }

    pub fn entries(&self) -> &[Suppression] {
        &self.entries
    }
}

/// Analyzer settings consulted by the preprocessing pipeline.
#[derive(Debug)]
pub struct Settings {
    /// Semicolon-joined defines supplied on the command line, e.g. `"A;B=1"`.
    /// When non-empty, configuration enumeration is skipped.
    pub user_defines: String,
    /// Honor suppression markers found in comments.
    pub inline_suppressions: bool,
    /// Emit `debug` severity messages for oddities the analyzer skips over.
    pub debug_warnings: bool,
    /// Allow whitespace between a line-continuation backslash and the
    /// newline it splices (matches how gcc reads such lines; when false the
    /// backslash is kept literally, matching msvc).
    pub relaxed_backslash_newline: bool,
    /// Ids of optional checks the user switched on, e.g. "missingInclude".
    pub enabled: HashSet<String>,
    /// Registered suppressions.
    pub nomsg: Suppressions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_defines: String::new(),
            inline_suppressions: false,
            debug_warnings: false,
            relaxed_backslash_newline: true,
            enabled: HashSet::new(),
            nomsg: Suppressions::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }

    pub fn enable(&mut self, id: &str) {
        self.enabled.insert(id.to_string());
    }
}
