//! Preprocessing front end for C/C++ static analysis.
//!
//! Raw source text is normalized, includes are inlined, and the set of
//! compile-time configurations implied by the conditional directives is
//! enumerated. For each configuration the matching branches can then be
//! selected and macro-expanded into a single translation unit, with line
//! numbers preserved throughout so findings point at real source
//! locations.
//!
//! ```no_run
//! use diag::{Collector, Settings};
//! use pp::Preprocessor;
//!
//! let mut settings = Settings::default();
//! let mut sink = Collector::new();
//! let mut pp = Preprocessor::new(&mut settings, &mut sink);
//! let src = b"#ifdef A\nint a;\n#endif\n";
//! let (text, configurations) = pp.preprocess(src, "file.c", &[]);
//! for cfg in &configurations {
//!     let code = Preprocessor::getcode(&text, cfg, "file.c", &settings, &mut sink);
//!     // hand `code` to the tokenizer
//! }
//! ```

mod condition;
mod configs;
mod include;
mod macros;
mod reader;
mod select;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use diag::{ErrorMessage, FileLocation, Reporter, Settings, Severity};

pub use condition::{match_cfg_def, simplify_condition};

pub(crate) fn write_error(
    filename: &str,
    linenr: u32,
    sink: &mut dyn Reporter,
    id: &str,
    msg: &str,
) {
    let errmsg = ErrorMessage::new(
        vec![FileLocation::new(filename, linenr)],
        Severity::Error,
        msg,
        id,
    );
    sink.report_err(&errmsg);
}

/// One preprocessing invocation. Owns no global state; settings and the
/// diagnostic sink are borrowed for the lifetime of the run.
pub struct Preprocessor<'a> {
    settings: &'a mut Settings,
    sink: &'a mut dyn Reporter,
    /// the translation unit that started this run, for diagnostics that
    /// point into headers
    file0: String,
}

impl<'a> Preprocessor<'a> {
    pub fn new(settings: &'a mut Settings, sink: &'a mut dyn Reporter) -> Self {
        Self {
            settings,
            sink,
            file0: String::new(),
        }
    }

    /// Normalize one file's bytes: line endings, whitespace, splices,
    /// comments, raw strings, `#if` parenthesis shapes. Inline suppression
    /// markers are registered on the settings as a side effect.
    pub fn read(&mut self, data: &[u8], filename: &str) -> String {
        reader::read_text(data, filename, self.settings, self.sink)
    }

    /// Run the full pipeline short of branch selection: normalized text
    /// plus the list of configurations to analyze. The list is empty when
    /// the settings carry user-supplied defines (the caller then selects
    /// with exactly those), otherwise it always contains `""`.
    pub fn preprocess(
        &mut self,
        data: &[u8],
        filename: &str,
        include_paths: &[String],
    ) -> (String, Vec<String>) {
        if self.file0.is_empty() {
            self.file0 = filename.to_string();
        }

        let mut processed = self.read(data, filename);
        processed = reader::preprocess_whitespaces(&processed);
        reader::remove_asm(&mut processed);
        processed = reader::normalize_defined(&processed);
        include::handle_includes(
            &mut processed,
            filename,
            include_paths,
            &self.file0,
            self.settings,
            self.sink,
        );
        processed = reader::replace_if_defined(&processed);

        let configurations = if self.settings.user_defines.is_empty() {
            configs::getcfgs(&processed, filename, self.settings, self.sink)
        } else {
            Vec::new()
        };

        (processed, configurations)
    }

    /// `preprocess` plus selection: preprocessed code per configuration,
    /// in deterministic order.
    pub fn preprocess_all(
        &mut self,
        data: &[u8],
        filename: &str,
        include_paths: &[String],
    ) -> BTreeMap<String, String> {
        let (text, configurations) = self.preprocess(data, filename, include_paths);
        let mut result = BTreeMap::new();
        for cfg in configurations {
            let code = select::getcode(&text, &cfg, filename, self.settings, self.sink);
            result.insert(cfg, code);
        }
        result
    }

    /// Convenience wrapper over [`Preprocessor::preprocess`] for a file on
    /// disk.
    pub fn preprocess_file(
        &mut self,
        path: &Path,
        include_paths: &[String],
    ) -> Result<(String, Vec<String>)> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path.to_string_lossy().into_owned();
        Ok(self.preprocess(&data, &filename, include_paths))
    }

    /// Enumerate configurations of already-normalized text.
    pub fn getcfgs(&mut self, filedata: &str, filename: &str) -> Vec<String> {
        configs::getcfgs(filedata, filename, self.settings, self.sink)
    }

    /// Select the branches matching `cfg` out of normalized text and
    /// expand macros over the result. Returns empty text when a matching
    /// `#error` is hit under user-supplied defines, or when expansion
    /// fails.
    pub fn getcode(
        filedata: &str,
        cfg: &str,
        filename: &str,
        settings: &Settings,
        sink: &mut dyn Reporter,
    ) -> String {
        select::getcode(filedata, cfg, filename, settings, sink)
    }

    /// Macro expansion alone, for already-selected code.
    pub fn expand_macros(code: &str, filename: &str, sink: &mut dyn Reporter) -> String {
        macros::expand_macros(code, filename, sink)
    }

    /// One sample message per id this crate can report, for XML listings.
    pub fn error_message_catalogue() -> Vec<ErrorMessage> {
        vec![
            ErrorMessage::new(
                Vec::new(),
                Severity::Style,
                "Include file: \"\" not found.",
                "missingInclude",
            ),
            ErrorMessage::new(
                Vec::new(),
                Severity::Error,
                "#error ...",
                "preprocessorErrorDirective",
            ),
        ]
    }
}
