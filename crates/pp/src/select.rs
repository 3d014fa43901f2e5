//! Extraction of the code that one configuration actually compiles.

use std::collections::HashMap;

use diag::{Reporter, Settings};
use expr::TokenList;

use crate::condition::match_cfg_def;
use crate::configs::getdef;
use crate::macros::expand_macros;
use crate::write_error;

/// Split a configuration string `"A;B=1"` into a define map.
fn parse_cfg(cfg: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for part in cfg.split(';') {
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((k, v)) => map.insert(k.to_string(), v.to_string()),
            None => map.insert(part.to_string(), String::new()),
        };
    }
    map
}

/// Keep the lines selected by `cfg`, blank everything else (newlines
/// survive so the tokenizer's line numbers stay meaningful), then expand
/// macros over the result.
pub(crate) fn getcode(
    filedata: &str,
    cfg: &str,
    filename: &str,
    settings: &Settings,
    sink: &mut dyn Reporter,
) -> String {
    let mut lineno: u32 = 0;
    let mut ret = String::with_capacity(filedata.len());

    let mut match_all = true;
    let mut matching_ifdef: Vec<bool> = Vec::new();
    let mut matched_ifdef: Vec<bool> = Vec::new();

    let mut cfgmap = parse_cfg(cfg);

    let lines: Vec<&str> = filedata.lines().collect();
    let mut li = 0usize;
    while li < lines.len() {
        let mut line = lines[li].to_string();
        li += 1;
        lineno += 1;

        if line.starts_with("#pragma asm") {
            ret.push('\n');
            let mut found_end = false;
            while li < lines.len() {
                let l2 = lines[li];
                li += 1;
                if l2.starts_with("#pragma endasm") {
                    line = l2.to_string();
                    found_end = true;
                    break;
                }
                ret.push('\n');
            }
            if !found_end {
                break;
            }

            if line.contains('=') {
                let rest = line.get(15..).unwrap_or("");
                let toks = TokenList::tokenize(rest);
                if toks.match_at(0, "( %var% = %any% )") {
                    ret.push_str("asm(");
                    ret.push_str(toks.str_at(1));
                    ret.push_str(");");
                }
            }
            ret.push('\n');
            continue;
        }

        let def = getdef(&line, true);
        let ndef = getdef(&line, false);

        if let Some(rest) = line.strip_prefix("#define ") {
            match rest.find(|c| c == ' ' || c == '(') {
                None => {
                    cfgmap.insert(rest.to_string(), String::new());
                }
                Some(p) if rest.as_bytes()[p] == b' ' => {
                    cfgmap.insert(rest[..p].to_string(), rest[p + 1..].to_string());
                }
                Some(p) => {
                    cfgmap.insert(rest[..p].to_string(), String::new());
                }
            }
        } else if line.starts_with("#elif ") {
            if let (Some(m), Some(d)) = (matched_ifdef.last().copied(), matching_ifdef.last_mut())
            {
                if m {
                    *d = false;
                } else if match_cfg_def(&cfgmap, &def) {
                    *d = true;
                    if let Some(md) = matched_ifdef.last_mut() {
                        *md = true;
                    }
                }
            }
        } else if !def.is_empty() {
            let m = match_cfg_def(&cfgmap, &def);
            matching_ifdef.push(m);
            matched_ifdef.push(m);
        } else if !ndef.is_empty() {
            let m = !match_cfg_def(&cfgmap, &ndef);
            matching_ifdef.push(m);
            matched_ifdef.push(m);
        } else if line == "#else" {
            if let Some(m) = matched_ifdef.last().copied() {
                if let Some(d) = matching_ifdef.last_mut() {
                    *d = !m;
                }
            }
        } else if line.starts_with("#endif") {
            matched_ifdef.pop();
            matching_ifdef.pop();
        }

        if line.starts_with('#') {
            match_all = matching_ifdef.iter().all(|&b| b);
        }

        if match_all && line.starts_with("#error") {
            if !settings.user_defines.is_empty() {
                write_error(filename, lineno, sink, "preprocessorErrorDirective", &line);
            }
            return String::new();
        }

        if !match_all && line.starts_with("#define ") {
            // not part of this configuration
            line.clear();
        } else if line.starts_with("#file \"")
            || line.starts_with("#endfile")
            || line.starts_with("#define ")
            || line.starts_with("#undef")
        {
            // keep; line numbers would break without the file markers
        } else if !match_all || line.starts_with('#') {
            line.clear();
        }

        ret.push_str(&line);
        ret.push('\n');
    }

    expand_macros(&ret, filename, sink)
}
