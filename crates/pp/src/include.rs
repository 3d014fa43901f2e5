//! Recursive `#include` expansion with cycle suppression.

use std::collections::HashSet;
use std::fs;

use diag::{ErrorMessage, FileLocation, Reporter, Settings, Severity};
use tracing::{debug, trace};

use crate::reader;

enum HeaderType {
    None,
    User,
    System,
}

/// Reduce an `#include` directive remainder to the bare header name.
/// Backslashes are normalized so the name can be opened on any platform.
fn header_file_name(s: &mut String) -> HeaderType {
    let Some(i) = s.find(['<', '"']) else {
        s.clear();
        return HeaderType::None;
    };
    let open = s.as_bytes()[i];
    let close = if open == b'<' { b'>' } else { b'"' };

    let mut result = String::new();
    for &c in &s.as_bytes()[i + 1..] {
        if c == close {
            break;
        }
        result.push(if c == b'\\' { '/' } else { c as char });
    }

    *s = result;
    if close == b'"' {
        HeaderType::User
    } else {
        HeaderType::System
    }
}

/// Directory part of `path` including the trailing separator, or `""`.
fn dir_of(path: &str) -> String {
    match path.rfind(['/', '\\']) {
        Some(p) => path[..=p].to_string(),
        None => String::new(),
    }
}

/// Lexical cleanup of a path: forward slashes, no `.` components, `..`
/// resolved where possible. Combined with case folding this is the cycle
/// detection key.
pub(crate) fn simplify_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if parts.is_empty() || matches!(parts.last(), Some(&"..")) {
                    parts.push("..");
                } else {
                    parts.pop();
                }
            }
            c => parts.push(c),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Original line of the directive at byte `pos`, recovered by walking
/// backward over balanced `#file`/`#endfile` markers.
fn recover_line(code: &str, pos: usize) -> u32 {
    let b = code.as_bytes();
    let mut linenr = 1u32;
    let mut level = 0u32;
    for p in 1..=pos {
        let q = pos - p;
        if q >= b.len() {
            continue;
        }
        if level == 0 && b[q] == b'\n' {
            linenr += 1;
        } else if b[q..].starts_with(b"#endfile\n") {
            level += 1;
        } else if b[q..].starts_with(b"#file ") {
            if level == 0 {
                linenr = linenr.saturating_sub(1);
                break;
            }
            level -= 1;
        }
    }
    linenr
}

/// Inline every resolvable `#include` into `code`, wrapping each body in
/// `#file "..."` / `#endfile`. Freshly inserted bodies are rescanned, so
/// nested includes resolve too; a set of simplified paths breaks cycles.
pub(crate) fn handle_includes(
    code: &mut String,
    file_path: &str,
    include_paths: &[String],
    file0: &str,
    settings: &mut Settings,
    sink: &mut dyn Reporter,
) {
    let mut paths: Vec<String> = vec![dir_of(file_path)];
    let mut handled_files: HashSet<String> = HashSet::new();

    let mut pos = 0usize;
    let mut endfile_pos = 0usize;
    while let Some(off) = code[pos..].find("#include") {
        pos += off;

        // only directives at the start of a line count
        if pos > 0 && code.as_bytes()[pos - 1] != b'\n' {
            pos += 8;
            continue;
        }

        // every #endfile passed since the last include closes a directory
        while let Some(e) = code[endfile_pos..].find("\n#endfile") {
            let ep = endfile_pos + e;
            if ep >= pos {
                break;
            }
            paths.pop();
            endfile_pos = ep + 9;
        }
        endfile_pos = pos;

        let end = code[pos..].find('\n').map(|x| pos + x).unwrap_or(code.len());
        let mut filename = code[pos..end].to_string();
        code.replace_range(pos..end, "");

        let header_type = header_file_name(&mut filename);
        if matches!(header_type, HeaderType::None) {
            continue;
        }

        let mut data: Vec<u8> = Vec::new();
        let mut file_opened = false;
        for dir in std::iter::once(String::new()).chain(include_paths.iter().cloned()) {
            let candidate = format!("{}{}", dir, filename);
            if let Ok(bytes) = fs::read(&candidate) {
                filename = candidate;
                data = bytes;
                file_opened = true;
                break;
            }
        }

        if matches!(header_type, HeaderType::User) && !file_opened {
            let dir = paths.last().map(String::as_str).unwrap_or("");
            let candidate = format!("{}{}", dir, filename);
            if let Ok(bytes) = fs::read(&candidate) {
                filename = candidate;
                data = bytes;
                file_opened = true;
            }
        }

        let mut processed = String::new();
        if file_opened {
            let key = simplify_path(&filename).to_lowercase();
            if handled_files.contains(&key) {
                trace!(header = %filename, "already included, skipping");
                continue;
            }
            handled_files.insert(key);
            debug!(header = %filename, "inlining include");
            processed = reader::read_text(&data, &filename, settings, sink);
        }

        if !processed.is_empty() {
            let processed = reader::preprocess_whitespaces(&processed);
            let wrapped = format!("#file \"{}\"\n{}\n#endfile", filename, processed);
            code.insert_str(pos, &wrapped);
            paths.push(dir_of(&filename));
        } else if !file_opened
            && matches!(header_type, HeaderType::User)
            && settings.is_enabled("missingInclude")
        {
            let linenr = recover_line(code, pos);
            let mut errmsg = ErrorMessage::new(
                vec![FileLocation::new(file_path, linenr)],
                Severity::Style,
                &format!("Include file: \"{}\" not found.", filename),
                "missingInclude",
            );
            errmsg.file0 = file0.to_string();
            sink.report_err(&errmsg);
        }
    }
}
