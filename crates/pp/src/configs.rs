//! Enumeration of the distinct preprocessor configurations a file can be
//! viewed under.

use std::collections::{HashMap, HashSet};

use diag::{ErrorMessage, FileLocation, Reporter, Settings, Severity};
use expr::TokenList;
use tracing::debug;

use crate::condition::simplify_condition;

/// Extract the condition from a conditional directive. With `def` the line
/// must be an `#ifdef`/`#if`/`#elif`; without it an `#ifndef`. Interior
/// whitespace is collapsed except where it separates two word characters.
pub(crate) fn getdef(line: &str, def: bool) -> String {
    if def
        && !line.starts_with("#ifdef ")
        && !line.starts_with("#if ")
        && !line.starts_with("#elif ")
    {
        return String::new();
    }
    if !def && !line.starts_with("#ifndef ") {
        return String::new();
    }

    let mut line = line.to_string();
    if line.starts_with("#if defined ") {
        line.replace_range(0..11, "");
    } else {
        let sp = line.find(' ').unwrap_or(0);
        line.replace_range(0..sp, "");
    }

    let word = |c: u8| c.is_ascii_alphanumeric() || c == b'_';
    let mut pos = 0usize;
    while let Some(off) = line[pos..].find(' ') {
        let p = pos + off;
        let prev = if p > 0 { line.as_bytes()[p - 1] } else { 0 };
        let next = if p + 1 < line.len() {
            line.as_bytes()[p + 1]
        } else {
            0
        };
        if word(prev) && word(next) {
            pos = p + 1;
        } else {
            line.remove(p);
            pos = p;
        }
    }

    line
}

/// One open conditional while scanning. A negated frame remembers the
/// positive spelling of its condition so a later `#else` can restore it.
enum Frame {
    Positive(String),
    Negative(String),
}

/// Scan normalized (and include-expanded) text and collect every distinct
/// configuration, canonicalized and sorted. The empty configuration is
/// always present. Returns an empty list when a condition cannot even be
/// parsed.
pub(crate) fn getcfgs(
    filedata: &str,
    filename: &str,
    settings: &Settings,
    sink: &mut dyn Reporter,
) -> Vec<String> {
    let mut ret: Vec<String> = vec![String::new()];

    let mut deflist: Vec<Frame> = Vec::new();

    // names #define'd in the code itself
    let mut defines: HashSet<String> = HashSet::new();

    let mut filelevel = 0i32;
    let mut includeguard = false;

    let mut linenr = 0u32;
    for line in filedata.lines() {
        linenr += 1;
        sink.report_progress(filename, "Preprocessing (get configurations 1)", 0);

        if line.starts_with("#file ") {
            includeguard = true;
            filelevel += 1;
            continue;
        }
        if line == "#endfile" {
            includeguard = false;
            if filelevel > 0 {
                filelevel -= 1;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("#define ") {
            match rest.find(' ') {
                None => {
                    defines.insert(rest.to_string());
                }
                Some(sp) => {
                    let mut s = rest.to_string();
                    s.replace_range(sp..sp + 1, "=");
                    defines.insert(s);
                }
            }
        }

        if !line.is_empty() && !line.starts_with("#if") {
            includeguard = false;
        }
        if includeguard {
            continue;
        }

        let mut from_negation = false;
        let mut def = getdef(line, true);
        if def.is_empty() {
            def = getdef(line, false);
            // branches nested under an #ifndef must not carry the negated
            // name, so the frame is marked instead
            if !def.is_empty() {
                from_negation = true;
            }
        }

        if !def.is_empty() {
            let mut par = 0i32;
            for &c in def.as_bytes() {
                if c == b'(' {
                    par += 1;
                } else if c == b')' {
                    par -= 1;
                    if par < 0 {
                        break;
                    }
                }
            }
            if par != 0 {
                let errmsg = ErrorMessage::new(
                    vec![FileLocation::new(filename, linenr)],
                    Severity::Error,
                    &format!("mismatching number of '(' and ')' in this line: {}", def),
                    &format!("preprocessor{}", line!()),
                );
                sink.report_err(&errmsg);
                return Vec::new();
            }

            // substitute valued defines seen so far
            let mut varmap: HashMap<String, String> = HashMap::new();
            for d in &defines {
                if let Some(eq) = d.find('=') {
                    varmap.insert(d[..eq].to_string(), d[eq + 1..].to_string());
                }
            }
            simplify_condition(&varmap, &mut def, false);

            if !deflist.is_empty() && line.starts_with("#elif ") {
                deflist.pop();
            }

            // the configuration for this branch: all enclosing positive
            // frames plus the new condition
            let mut cfg = String::new();
            for e in deflist
                .iter()
                .filter_map(|f| match f {
                    Frame::Positive(s) => Some(s.as_str()),
                    Frame::Negative(_) => None,
                })
                .chain(std::iter::once(def.as_str()))
            {
                if e == "0" {
                    break;
                }
                if e == "1" {
                    continue;
                }
                // identical directly nested conditions count once
                if cfg != e {
                    if !cfg.is_empty() {
                        cfg.push(';');
                    }
                    cfg.push_str(e);
                }
            }

            deflist.push(if from_negation {
                Frame::Negative(def)
            } else {
                Frame::Positive(def)
            });

            if !ret.contains(&cfg) {
                ret.push(cfg);
            }
        } else if line.starts_with("#else") && !deflist.is_empty() {
            match deflist.pop() {
                Some(Frame::Negative(s)) => deflist.push(Frame::Positive(s)),
                Some(Frame::Positive(s)) => {
                    let flipped = if s == "1" { "0" } else { "1" };
                    deflist.push(Frame::Positive(flipped.to_string()));
                }
                None => {}
            }
        } else if line.starts_with("#endif") && !deflist.is_empty() {
            deflist.pop();
        }
    }

    // drop tokens satisfied unconditionally by in-file #defines
    let total = ret.len();
    for (count, item) in ret.iter_mut().enumerate() {
        sink.report_progress(
            filename,
            "Preprocessing (get configurations 2)",
            (100 * count as u32) / total as u32,
        );

        let mut cfg = item.clone();
        for d in &defines {
            let name = match d.find('=') {
                Some(eq) => &d[..eq],
                None => d.as_str(),
            };
            let mut pos = 0usize;
            while let Some(off) = cfg[pos..].find(name) {
                let p1 = pos + off;
                pos = p1 + 1;
                if p1 > 0 && cfg.as_bytes()[p1 - 1] != b';' {
                    continue;
                }
                let p2 = p1 + name.len();
                if p2 < cfg.len() && cfg.as_bytes()[p2] != b';' {
                    continue;
                }
                pos = p1;
                cfg.replace_range(p1..p2, "");
            }
        }
        if cfg.len() != item.len() {
            while cfg.starts_with(';') {
                cfg.remove(0);
            }
            while cfg.ends_with(';') {
                cfg.pop();
            }
            while let Some(p) = cfg.find(";;") {
                cfg.remove(p);
            }
            *item = cfg;
        }
    }

    // "defined(A)&&defined(B)" => "A;B"
    for item in ret.iter_mut() {
        if !item.contains("&&") {
            continue;
        }
        let toks = TokenList::tokenize(item);
        let mut vars: Vec<String> = Vec::new();
        let mut i = 0usize;
        loop {
            if toks.match_at(i, "defined ( %var% )") {
                vars.push(toks.str_at(i + 2).to_string());
                i += 4;
                if toks.str_at(i) == "&&" {
                    i += 1;
                }
            } else if toks.match_at(i, "%var% ;") {
                vars.push(toks.str_at(i).to_string());
                i += 2;
            } else {
                break;
            }
        }
        vars.sort();
        let s = vars.join(";");
        if !s.is_empty() {
            *item = s;
        }
    }

    // canonical order inside each configuration
    for item in ret.iter_mut() {
        let mut defs: Vec<&str> = item.split(';').filter(|s| !s.is_empty()).collect();
        defs.sort_unstable();
        *item = defs.join(";");
    }

    ret.sort();
    ret.dedup();

    // drop configurations that are not plain NAME or NAME=number lists
    ret.retain(|cfg| {
        let s = format!("{};", cfg);
        let b = s.as_bytes();
        let mut pos = 0usize;
        let mut unhandled = false;
        while pos < b.len() {
            let c = b[pos];
            if c == b';' {
                pos += 1;
                continue;
            }
            if c.is_ascii_alphabetic() || c == b'_' {
                while pos < b.len() && (b[pos].is_ascii_alphanumeric() || b[pos] == b'_') {
                    pos += 1;
                }
                if pos < b.len() && b[pos] == b'=' {
                    pos += 1;
                    while pos < b.len() && b[pos].is_ascii_digit() {
                        pos += 1;
                    }
                    if pos >= b.len() || b[pos] != b';' {
                        unhandled = true;
                        break;
                    }
                }
                continue;
            }
            unhandled = true;
            break;
        }

        if unhandled {
            debug!(config = %cfg, "dropping unhandled configuration");
            if settings.debug_warnings {
                let errmsg = ErrorMessage::new(
                    Vec::new(),
                    Severity::Debug,
                    &format!("unhandled configuration: {}", cfg),
                    "debug",
                );
                sink.report_err(&errmsg);
            }
        }
        !unhandled
    });

    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getdef_strips_directive_and_spaces() {
        assert_eq!(getdef("#ifdef ABC", true), "ABC");
        assert_eq!(getdef("#if A || B", true), "A||B");
        assert_eq!(getdef("#elif defined(A)&&defined(B)", true), "defined(A)&&defined(B)");
        assert_eq!(getdef("#ifndef X", false), "X");
        assert_eq!(getdef("#ifndef X", true), "");
        assert_eq!(getdef("#ifdef X", false), "");
    }

    #[test]
    fn getdef_keeps_word_separating_space() {
        assert_eq!(getdef("#if A 1", true), "A 1");
    }
}
