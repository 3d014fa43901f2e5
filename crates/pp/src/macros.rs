//! Macro expansion over selected code.
//!
//! Works on logical lines: physical lines are grouped so that a statement
//! or a directive is handled as one unit, keeping multi-line macro calls
//! and their newline accounting together.

use std::collections::HashMap;

use diag::Reporter;
use expr::TokenList;

use crate::write_error;

/// Skip a string or character literal. `pos` enters at the opening quote
/// and leaves at the closing one.
pub(crate) fn skipstring(line: &str, pos: &mut usize) {
    let b = line.as_bytes();
    let ch = b[*pos];
    *pos += 1;
    while *pos < b.len() && b[*pos] != ch {
        if b[*pos] == b'\\' {
            *pos += 1;
        }
        *pos += 1;
    }
}

/// Collect macro call arguments. `pos` enters at (or one space before) the
/// opening parenthesis and leaves at the closing one. Newlines inside the
/// call are counted separately so the expansion can re-emit them.
fn getparams(
    line: &str,
    pos: &mut usize,
    params: &mut Vec<String>,
    number_of_newlines: &mut u32,
    end_found: &mut bool,
) {
    params.clear();
    *number_of_newlines = 0;
    *end_found = false;

    let b = line.as_bytes();
    if *pos < b.len() && b[*pos] == b' ' {
        *pos += 1;
    }
    if *pos >= b.len() || b[*pos] != b'(' {
        return;
    }

    let mut parlevel = 0i32;
    let mut par = String::new();

    while *pos < b.len() {
        let c = b[*pos];
        if c == b'(' {
            parlevel += 1;
            if parlevel == 1 {
                *pos += 1;
                continue;
            }
        } else if c == b')' {
            parlevel -= 1;
            if parlevel <= 0 {
                *end_found = true;
                params.push(std::mem::take(&mut par));
                break;
            }
        } else if c == b'"' || c == b'\'' {
            let p = *pos;
            skipstring(line, pos);
            if *pos >= line.len() {
                break;
            }
            par.push_str(&line[p..=*pos]);
            *pos += 1;
            continue;
        } else if c == b'\n' {
            *number_of_newlines += 1;
            *pos += 1;
            continue;
        }

        if parlevel == 1 && c == b',' {
            params.push(std::mem::take(&mut par));
        } else if c == b' ' {
            if par
                .as_bytes()
                .last()
                .is_some_and(|l| l.is_ascii_alphanumeric())
            {
                par.push(' ');
            }
        } else if parlevel >= 1 {
            par.push(c as char);
        }
        *pos += 1;
    }
}

/// One `#define`d macro.
#[derive(Debug, Clone)]
pub(crate) struct Macro {
    /// definition text after `#define `
    text: String,
    name: String,
    params: Vec<String>,
    variadic: bool,
    /// has parentheses but no parameters, `AAA()`
    nopar: bool,
    toks: TokenList,
}

impl Macro {
    pub(crate) fn new(text: &str) -> Macro {
        let toks = TokenList::tokenize(text);
        let name = if toks.is_name(0) {
            toks.str_at(0).to_string()
        } else {
            String::new()
        };

        let mut params: Vec<String> = Vec::new();
        let mut variadic = false;
        let mut nopar = false;

        let paren_first = matches!(
            text.find(|c| c == ' ' || c == '('),
            Some(p) if text.as_bytes()[p] == b'('
        );
        if paren_first {
            if toks.match_at(0, "%var% ( %var%") {
                let mut i = 2usize;
                while i < toks.len() {
                    if toks.str_at(i) == ")" {
                        break;
                    }
                    if toks.match_at(i, ". . . )") {
                        variadic = true;
                        // the C99 spelling gets its named stand-in
                        if matches!(toks.str_at(i - 1), "," | "(") {
                            params.push("__VA_ARGS__".to_string());
                        }
                        break;
                    }
                    if toks.is_name(i) {
                        params.push(toks.str_at(i).to_string());
                    }
                    i += 1;
                }
            } else if toks.match_at(0, "%var% ( . . . )") {
                variadic = true;
            } else if toks.match_at(0, "%var% ( )") {
                nopar = true;
            }
        }

        Macro {
            text: text.to_string(),
            name,
            params,
            variadic,
            nopar,
            toks,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &[String] {
        &self.params
    }

    fn variadic(&self) -> bool {
        self.variadic
    }

    fn nopar(&self) -> bool {
        self.nopar
    }

    /// If every argument is a call of one inner macro of matching arity,
    /// pre-expand those calls.
    fn expand_inner_macros(
        &self,
        params1: &[String],
        macros: &HashMap<String, Macro>,
    ) -> Vec<String> {
        let Some(close) = (0..self.toks.len()).find(|&i| self.toks.str_at(i) == ")") else {
            return params1.to_vec();
        };
        if !self.toks.match_at(close, ") %var% (") {
            return params1.to_vec();
        }
        let inner_name = self.toks.str_at(close + 1).to_string();
        let mut t = close + 3;
        let mut par = 0usize;
        while self.toks.match_at(t, "%var% ,|)") {
            t += 2;
            par += 1;
        }
        if t < self.toks.len() || par != params1.len() {
            return params1.to_vec();
        }

        let mut params2: Vec<String> = params1.to_vec();
        for (ipar, param) in params1.iter().enumerate() {
            let opening = format!("{}(", inner_name);
            if !param.starts_with(&opening) || !param.ends_with(')') {
                continue;
            }
            let mut pos = opening.len() - 1;
            let mut inner_params: Vec<String> = Vec::new();
            let mut num = 0u32;
            let mut end_found = false;
            getparams(param, &mut pos, &mut inner_params, &mut num, &mut end_found);
            if pos == param.len() - 1
                && num == 0
                && end_found
                && inner_params.len() == params1.len()
            {
                if let Some(inner) = macros.get(&inner_name) {
                    let mut inner_macros = macros.clone();
                    inner_macros.remove(&inner_name);
                    let mut inner_code = String::new();
                    inner.code(&inner_params, &inner_macros, &mut inner_code);
                    params2[ipar] = inner_code;
                }
            }
        }

        params2
    }

    /// Produce the expansion of this macro for the given arguments.
    /// Returns false when the call does not supply enough arguments.
    fn code(
        &self,
        params2: &[String],
        macros: &HashMap<String, Macro>,
        macrocode: &mut String,
    ) -> bool {
        if self.nopar || (self.params.is_empty() && self.variadic) {
            let after = self.text.find(')').map(|p| p + 1).unwrap_or(0);
            *macrocode = self.text[after..].to_string();
            if macrocode.is_empty() {
                return true;
            }
            *macrocode = macrocode.trim_start_matches(' ').to_string();
            if let Some(p) = macrocode.find(['\r', '\n']) {
                macrocode.truncate(p);
            }
            if !self.nopar {
                let joined = params2.join(",");
                let mut pos = 0usize;
                while let Some(off) = macrocode[pos..].find("__VA_ARGS__") {
                    let p = pos + off;
                    macrocode.replace_range(p..p + 11, &joined);
                    pos = p + joined.len();
                }
            }
        } else if self.params.is_empty() {
            match self.text.find(' ') {
                None => macrocode.clear(),
                Some(p) => {
                    *macrocode = self.text[p + 1..].to_string();
                    if let Some(q) = macrocode.find(['\r', '\n']) {
                        macrocode.truncate(q);
                    }
                }
            }
        } else {
            let given = self.expand_inner_macros(params2, macros);

            let Some(close) = (0..self.toks.len()).find(|&i| self.toks.str_at(i) == ")") else {
                return true;
            };
            let mut optcomma = false;
            let mut i = close + 1;
            while i < self.toks.len() {
                let tokstr = self.toks.str_at(i);
                if tokstr == "##" {
                    i += 1;
                    continue;
                }
                let mut piece = tokstr.to_string();
                if piece.starts_with('#') || self.toks.is_name(i) {
                    let stringify = piece.starts_with('#');
                    if stringify {
                        piece.remove(0);
                    }
                    for (pi, pname) in self.params.iter().enumerate() {
                        if &piece != pname {
                            continue;
                        }
                        if self.variadic
                            && (pi == self.params.len() - 1
                                || (given.len() + 2 == self.params.len()
                                    && pi + 1 == self.params.len() - 1))
                        {
                            piece.clear();
                            let mut j = self.params.len() - 1;
                            while j < given.len() {
                                if optcomma || j > self.params.len() - 1 {
                                    piece.push(',');
                                }
                                optcomma = false;
                                piece.push_str(&given[j]);
                                j += 1;
                            }
                        } else if pi >= given.len() {
                            // the call supplied fewer arguments than used
                            macrocode.clear();
                            return false;
                        } else if stringify {
                            let mut quoted = String::from("\"");
                            for c in given[pi].chars() {
                                if c == '\\' || c == '"' {
                                    quoted.push('\\');
                                }
                                quoted.push(c);
                            }
                            quoted.push('"');
                            piece = quoted;
                        } else {
                            piece = given[pi].clone();
                        }
                        break;
                    }
                }
                if self.variadic && tokstr == "," && self.toks.str_at(i + 1) == "##" {
                    optcomma = true;
                    i += 1;
                    continue;
                }
                optcomma = false;
                macrocode.push_str(&piece);
                // avoid gluing adjacent words together
                let next_name = self.toks.is_name(i + 1);
                if (self.toks.is_name(i) && (next_name || self.toks.is_number(i + 1)))
                    || (self.toks.is_number(i) && next_name)
                    || (self.toks.str_at(i) == ">" && self.toks.str_at(i + 1) == ">")
                {
                    macrocode.push(' ');
                }
                i += 1;
            }
        }

        true
    }
}

/// Read one logical line: a directive, or a statement extended across
/// physical lines while parentheses or string literals remain open.
fn getlines(data: &[u8], pos: &mut usize, line: &mut String) -> bool {
    if *pos >= data.len() {
        return false;
    }
    line.clear();
    let mut parlevel = 0i32;
    while *pos < data.len() {
        let ch = data[*pos];
        *pos += 1;
        if ch == b'\'' || ch == b'"' {
            line.push(ch as char);
            let mut c: u8 = 0;
            while c != ch {
                if c == b'\\' {
                    if *pos >= data.len() {
                        return true;
                    }
                    c = data[*pos];
                    *pos += 1;
                    line.push(c as char);
                }
                if *pos >= data.len() {
                    return true;
                }
                c = data[*pos];
                *pos += 1;
                if c == b'\n' && line.starts_with('#') {
                    return true;
                }
                line.push(c as char);
            }
            continue;
        }
        if ch == b'(' {
            parlevel += 1;
        } else if ch == b')' {
            parlevel -= 1;
        } else if ch == b'\n' {
            if line.starts_with('#') {
                return true;
            }
            if data.get(*pos) == Some(&b'#') {
                line.push('\n');
                return true;
            }
        } else if !line.starts_with('#') && parlevel <= 0 && ch == b';' {
            line.push(';');
            return true;
        }
        line.push(ch as char);
    }
    true
}

/// Expand all macro uses in `code`. Directive lines other than
/// `#file`/`#endfile` are blanked; those two drive position bookkeeping for
/// diagnostics.
pub(crate) fn expand_macros(code: &str, filename: &str, sink: &mut dyn Reporter) -> String {
    let mut macros: HashMap<String, Macro> = HashMap::new();

    let mut filename = filename.to_string();
    let mut linenr: u32 = 1;

    // (line, file) saved across #file/#endfile
    let mut fileinfo: Vec<(u32, String)> = Vec::new();

    let mut ostr = String::with_capacity(code.len());

    let data = code.as_bytes();
    let mut ci = 0usize;
    let mut line = String::new();
    while getlines(data, &mut ci, &mut line) {
        if let Some(rest) = line.strip_prefix("#define ") {
            let mac = Macro::new(rest);
            if !mac.name().is_empty() {
                macros.insert(mac.name().to_string(), mac);
            }
            line = "\n".to_string();
        } else if let Some(rest) = line.strip_prefix("#undef ") {
            macros.remove(rest);
            line = "\n".to_string();
        } else if line.starts_with("#file \"") {
            fileinfo.push((linenr, filename.clone()));
            filename = line
                .get(7..line.len().saturating_sub(1))
                .unwrap_or("")
                .to_string();
            linenr = 0;
            line.push('\n');
        } else if line == "#endfile" {
            if let Some((l, f)) = fileinfo.pop() {
                linenr = l;
                filename = f;
            }
            line.push('\n');
        } else if line.starts_with('#') {
            line.push('\n');
        } else {
            // suffix-relative positions before which a macro must not be
            // expanded again; keyed per macro
            let mut limits: HashMap<String, usize> = HashMap::new();

            let mut pos = 0usize;
            let mut tmp_linenr = 0u32;
            while pos < line.len() {
                let b = line.as_bytes();
                if b[pos] == b'\n' {
                    tmp_linenr += 1;
                }

                if b[pos] == b'"' || b[pos] == b'\'' {
                    let quote = b[pos] as char;
                    skipstring(&line, &mut pos);
                    pos += 1;
                    if pos >= line.len() {
                        write_error(
                            &filename,
                            linenr + tmp_linenr,
                            sink,
                            "noQuoteCharPair",
                            &format!(
                                "No pair for character ({}). Can't process file. \
                                 File is either invalid or unicode, which is currently \
                                 not supported.",
                                quote
                            ),
                        );
                        return String::new();
                    }
                    continue;
                }

                if !(b[pos].is_ascii_alphabetic() || b[pos] == b'_') {
                    pos += 1;
                }

                // expand identifiers here for as long as the freshly
                // inserted text starts with another macro name
                while pos < line.len() {
                    let b = line.as_bytes();
                    if !(b[pos].is_ascii_alphabetic() || b[pos] == b'_') {
                        break;
                    }
                    let pos1 = pos;
                    pos += 1;
                    while pos < line.len() {
                        let c = line.as_bytes()[pos];
                        if c.is_ascii_alphanumeric() || c == b'_' {
                            pos += 1;
                        } else {
                            break;
                        }
                    }
                    let id = line[pos1..pos].to_string();

                    let Some(mac) = macros.get(&id) else {
                        break;
                    };

                    if let Some(&limit) = limits.get(&id) {
                        if limit > line.len() || pos <= line.len() - limit {
                            break;
                        }
                    }

                    let mut params: Vec<String> = Vec::new();
                    let mut pos2 = pos;
                    if !mac.params().is_empty() && pos2 >= line.len() {
                        break;
                    }

                    let mut number_of_newlines = 0u32;
                    if mac.variadic() || mac.nopar() || !mac.params().is_empty() {
                        let mut end_found = false;
                        getparams(
                            &line,
                            &mut pos2,
                            &mut params,
                            &mut number_of_newlines,
                            &mut end_found,
                        );
                        if !end_found {
                            break;
                        }
                    }

                    if params.len() == 1 && params[0].is_empty() {
                        params.clear();
                    }

                    if !mac.variadic() && params.len() != mac.params().len() {
                        break;
                    }

                    let mut temp = String::new();
                    if !mac.code(&params, &macros, &mut temp) {
                        write_error(
                            &filename,
                            linenr + tmp_linenr,
                            sink,
                            "syntaxError",
                            &format!(
                                "Syntax error. Not enough parameters for macro '{}'.",
                                mac.name()
                            ),
                        );
                        return String::new();
                    }

                    let mut macrocode = "\n".repeat(number_of_newlines as usize);
                    macrocode.push_str(&temp);

                    if mac.variadic() || mac.nopar() || !mac.params().is_empty() {
                        pos2 += 1;
                    }

                    // limits measured from end of line survive edits made
                    // before them; anything now out of range is stale
                    limits.retain(|_, &mut l| line.len() - pos1 >= l);
                    limits.insert(id, line.len().saturating_sub(pos2));

                    line.replace_range(pos1..pos2.min(line.len()), "");

                    if line.as_bytes().get(pos1).is_some_and(|&c| {
                        c.is_ascii_alphanumeric() || c == b'_'
                    }) {
                        macrocode.push(' ');
                    }

                    line.insert_str(pos1, &macrocode);
                    pos = pos1;
                }
            }
        }

        ostr.push_str(&line);
        linenr += line.matches('\n').count() as u32;
    }

    ostr
}
