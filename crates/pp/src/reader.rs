//! Normalization of raw source bytes into the canonical text the rest of
//! the pipeline scans: LF line endings, no comments, no splices, collapsed
//! whitespace, uniform `#if` condition shapes.

use diag::{Reporter, Settings};

use crate::write_error;

fn is_cntrl(ch: u8) -> bool {
    ch < 0x20 || ch == 0x7f
}

/// Next byte with `\r` and `\r\n` folded to `\n`.
fn read_char(data: &[u8], i: &mut usize) -> Option<u8> {
    let ch = *data.get(*i)?;
    *i += 1;
    if ch == b'\r' {
        if data.get(*i) == Some(&b'\n') {
            *i += 1;
        }
        return Some(b'\n');
    }
    Some(ch)
}

/// First pass over the raw bytes: line-ending folding, control-character
/// scrubbing, space deduplication, `#`-spacing and backslash-newline
/// splicing. Elided newlines are re-emitted after the next real newline so
/// the line count is unchanged.
pub(crate) fn fold_stream(data: &[u8], relaxed_backslash_newline: bool) -> Vec<u8> {
    let mut code: Vec<u8> = Vec::with_capacity(data.len());
    let mut ignore_space = true;
    let mut need_space = false;
    let mut newlines = 0usize;
    let mut i = 0usize;

    while let Some(mut ch) = read_char(data, &mut i) {
        if ch & 0x80 == 0 && ch != b'\n' && (ch.is_ascii_whitespace() || is_cntrl(ch)) {
            ch = b' ';
        }

        if ch == b' ' && ignore_space {
            continue;
        }
        ignore_space = ch == b' ' || ch == b'#' || ch == b'\n';

        if need_space {
            if ch == b'(' || ch == b'!' {
                code.push(b' ');
            } else if !ch.is_ascii_alphabetic() {
                need_space = false;
            }
        }
        if ch == b'#' {
            need_space = true;
        }

        if ch == b'\\' {
            if relaxed_backslash_newline {
                // tolerate whitespace between the backslash and the newline
                while let Some(&c2) = data.get(i) {
                    if c2 & 0x80 == 0
                        && c2 != b'\n'
                        && c2 != b'\r'
                        && (c2.is_ascii_whitespace() || is_cntrl(c2))
                    {
                        read_char(data, &mut i);
                    } else {
                        break;
                    }
                }
            }
            let next = data.get(i).copied();
            if next == Some(b'\n') || next == Some(b'\r') {
                newlines += 1;
                read_char(data, &mut i);
            } else {
                code.push(b'\\');
            }
        } else {
            code.push(ch);
            if ch == b'\n' && newlines > 0 {
                code.extend(std::iter::repeat(b'\n').take(newlines));
                newlines = 0;
            }
        }
    }

    code
}

fn find_byte(data: &[u8], from: usize, needle: u8) -> Option<usize> {
    data[from.min(data.len())..]
        .iter()
        .position(|&b| b == needle)
        .map(|p| from + p)
}

fn find_sub(data: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || from >= data.len() {
        return None;
    }
    data[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Strip `//` and `/* */` comments, reduce raw strings to ordinary ones and
/// extract inline suppression markers. Newlines swallowed by multi-line
/// constructs are re-emitted after the next real newline. `#error` and
/// `#warning` lines pass through verbatim.
pub(crate) fn remove_comments(
    data: &[u8],
    filename: &str,
    settings: &mut Settings,
    sink: &mut dyn Reporter,
) -> Vec<u8> {
    let mut lineno: u32 = 1;
    let mut newlines = 0usize;
    let mut code: Vec<u8> = Vec::with_capacity(data.len());
    let mut previous: u8 = 0;
    let mut suppression_ids: Vec<String> = Vec::new();

    let mut i = if data.starts_with(&[0xef, 0xbb, 0xbf]) {
        3
    } else {
        0
    };
    while i < data.len() {
        let mut ch = data[i];
        if ch & 0x80 != 0 {
            let errmsg = format!(
                "The code contains characters that are unhandled. \
                 Neither unicode nor extended ascii are supported. \
                 (line={}, character code={:x})",
                lineno,
                ch as u32
            );
            write_error(filename, lineno, sink, "syntaxError", &errmsg);
            ch = b' ';
        }

        if data[i..].starts_with(b"#error") || data[i..].starts_with(b"#warning") {
            let end = find_byte(data, i, b'\n').unwrap_or(data.len());
            code.extend_from_slice(&data[i..end]);
            previous = code.last().copied().unwrap_or(0);
            i = end;
            continue;
        }

        // a line without comments just ended; flush collected suppressions
        if ch == b'\n' && !suppression_ids.is_empty() {
            for id in &suppression_ids {
                if let Err(e) = settings.nomsg.add_suppression(id, filename, lineno) {
                    write_error(filename, lineno, sink, "cppcheckError", &e.to_string());
                }
            }
            suppression_ids.clear();
        }

        if data[i..].starts_with(b"//") {
            let comment_start = i + 2;
            let Some(end) = find_byte(data, i, b'\n') else {
                break;
            };
            if settings.inline_suppressions {
                let comment = String::from_utf8_lossy(&data[comment_start..end]);
                let mut words = comment.split_whitespace();
                if words.next() == Some("adder-suppress") {
                    if let Some(id) = words.next() {
                        suppression_ids.push(id.to_string());
                    }
                }
            }
            code.push(b'\n');
            previous = b'\n';
            lineno += 1;
            i = end + 1;
        } else if data[i..].starts_with(b"/*") {
            let mut ch_prev = 0u8;
            let mut ch2 = b'/';
            let mut j = i + 1;
            while j + 1 < data.len() && !(ch_prev == b'*' && ch2 == b'/') {
                ch_prev = ch2;
                j += 1;
                ch2 = data[j];
                if ch2 == b'\n' {
                    newlines += 1;
                    lineno += 1;
                }
            }
            i = j + 1;
        } else if ch == b'"' || ch == b'\'' {
            code.push(ch);
            loop {
                i += 1;
                if i >= data.len() {
                    break;
                }
                let ch_next = data[i];
                if ch_next == b'\\' {
                    i += 1;
                    if i >= data.len() {
                        break;
                    }
                    let ch_seq = data[i];
                    if ch_seq == b'\n' {
                        newlines += 1;
                    } else {
                        code.push(ch_next);
                        code.push(ch_seq);
                        previous = ch_seq;
                    }
                } else {
                    code.push(ch_next);
                    previous = ch_next;
                }
                if ch_next == ch || ch_next == b'\n' {
                    break;
                }
            }
            i += 1;
        } else if data[i..].starts_with(b"R\"") {
            let mut delim: Vec<u8> = Vec::new();
            let mut found_open = false;
            let mut usable = true;
            let mut i2 = i + 2;
            while i2 < data.len() {
                let c2 = data[i2];
                if delim.len() > 16
                    || (c2 & 0x80 == 0 && (c2.is_ascii_whitespace() || is_cntrl(c2)))
                    || c2 == b')'
                    || c2 == b'\\'
                {
                    usable = false;
                    break;
                } else if c2 == b'(' {
                    found_open = true;
                    break;
                }
                delim.push(c2);
                i2 += 1;
            }
            let mut closer: Vec<u8> = vec![b')'];
            closer.extend_from_slice(&delim);
            closer.push(b'"');
            let endpos = if usable && found_open {
                find_sub(data, i, &closer)
            } else {
                None
            };
            if let Some(endpos) = endpos {
                let mut raw_newlines = 0usize;
                code.push(b'"');
                for p in (i + 3 + delim.len())..endpos {
                    let c = data[p];
                    if c == b'\n' {
                        raw_newlines += 1;
                        code.extend_from_slice(b"\\n");
                    } else if c & 0x80 == 0 && (is_cntrl(c) || c.is_ascii_whitespace()) {
                        code.push(b' ');
                    } else if c == b'\\' {
                        code.push(b'\\');
                    } else if c == b'"' || c == b'\'' {
                        code.push(b'\\');
                        code.push(c);
                    } else {
                        code.push(c);
                    }
                }
                code.push(b'"');
                if raw_newlines > 0 {
                    code.extend(std::iter::repeat(b'\n').take(raw_newlines));
                }
                previous = b'"';
                i = endpos + delim.len() + 2;
            } else {
                code.push(b'R');
                previous = b'R';
                i += 1;
            }
        } else {
            if ch == b' ' && previous == b' ' {
                // collapse runs of spaces
            } else {
                code.push(ch);
                previous = ch;
            }
            if ch == b'\n' {
                lineno += 1;
                if newlines > 0 {
                    code.extend(std::iter::repeat(b'\n').take(newlines));
                    newlines = 0;
                    previous = b'\n';
                }
            }
            i += 1;
        }
    }

    code
}

fn erase_pattern_char(line: &mut String, pat: &str, erase_offset: usize) {
    let mut pos = 0usize;
    while let Some(p) = line[pos..].find(pat) {
        let p = pos + p;
        line.remove(p + erase_offset);
        pos = p;
    }
}

/// Normalize parentheses on `#if`/`#elif` lines so that later pattern
/// matching over `defined(...)` conditions is reliable.
pub(crate) fn remove_parentheses(text: &str) -> String {
    if !text.contains("\n#if") && !text.starts_with("#if") {
        return text.to_string();
    }

    let mut ret = String::with_capacity(text.len());
    for line in text.lines() {
        let mut line = line.to_string();
        if line.starts_with("#if") || line.starts_with("#elif") {
            erase_pattern_char(&mut line, " (", 0);
            erase_pattern_char(&mut line, "( ", 1);
            erase_pattern_char(&mut line, " )", 0);
            erase_pattern_char(&mut line, ") ", 1);

            // "((..))" => "(..)"
            let mut pos = 0usize;
            while let Some(off) = line[pos..].find("((") {
                let p = pos + off;
                pos = p + 1;
                if let Some(q) = line[pos + 1..]
                    .find(|c| c == '(' || c == ')')
                    .map(|x| pos + 1 + x)
                {
                    if line.as_bytes()[q] == b')' {
                        line.remove(q);
                        line.remove(pos);
                    }
                }
            }

            // "#if(X)" => "#if X", but not "#if(defined A)||defined(B)"
            if (line.starts_with("#if(") || line.starts_with("#elif(")) && line.ends_with(')') {
                let b = line.as_bytes();
                let mut ind = 0i32;
                for k in 0..b.len() {
                    if b[k] == b'(' {
                        ind += 1;
                    } else if b[k] == b')' {
                        ind -= 1;
                        if ind == 0 {
                            if k == b.len() - 1 {
                                let open = line.find('(').unwrap_or(0);
                                line.replace_range(open..open + 1, " ");
                                line.pop();
                            }
                            break;
                        }
                    }
                }
            }

            if line.starts_with("#if(") {
                line.insert(3, ' ');
            } else if line.starts_with("#elif(") {
                line.insert(5, ' ');
            }
        }
        ret.push_str(&line);
        ret.push('\n');
    }

    ret
}

fn remove_space_near_nl(s: &str) -> String {
    let b = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(b.len());
    let mut prev = 0u8;
    for i in 0..b.len() {
        if b[i] == b' ' && ((i > 0 && prev == b'\n') || (i + 1 < b.len() && b[i + 1] == b'\n')) {
            continue;
        }
        out.push(b[i]);
        prev = b[i];
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub(crate) fn preprocess_whitespaces(processed: &str) -> String {
    let mut s = processed.replace('\t', " ");
    if s.starts_with(' ') {
        let indent = s.len() - s.trim_start_matches(' ').len();
        s.drain(..indent);
    }
    remove_space_near_nl(&s)
}

fn erase_asm_body(s: &mut String, pos: usize) {
    let b = s.as_bytes();
    let mut newlines = 0usize;
    let mut instr = false;
    let mut parlevel = 0i32;
    let mut pos2 = pos + 1;
    while pos2 < b.len() {
        let c = b[pos2];
        if c == b'"' {
            instr = !instr;
        } else if c == b'\n' {
            newlines += 1;
        } else if !instr {
            if c == b'(' {
                parlevel += 1;
            } else if c == b')' {
                if parlevel <= 1 {
                    break;
                }
                parlevel -= 1;
            }
        }
        pos2 += 1;
    }
    let end = (pos2 + 1).min(s.len());
    s.replace_range(pos + 1..end, "");
    s.insert_str(pos, &"\n".repeat(newlines));
}

/// Erase the bodies of `asm(...)` constructs, preserving enclosed newlines.
pub(crate) fn remove_asm(s: &mut String) {
    for pat in ["\nasm(", "\nasm ("] {
        let mut start = 0usize;
        while let Some(off) = s[start..].find(pat) {
            let pos = start + off;
            erase_asm_body(s, pos);
            s.insert_str(pos + 1, "asm()");
            start = pos + 1;
        }
    }
    for pat in ["\nasm __volatile(", "\nasm __volatile ("] {
        let mut start = 0usize;
        while let Some(off) = s[start..].find(pat) {
            let pos = start + off;
            erase_asm_body(s, pos);
            start = pos;
        }
    }
}

/// `#if defined A` => `#if defined(A)` so the evaluator sees one shape.
pub(crate) fn normalize_defined(text: &str) -> String {
    let mut ret = String::with_capacity(text.len());
    for line in text.lines() {
        let mut line = line.to_string();
        if line.starts_with("#if ") || line.starts_with("#elif ") {
            while let Some(pos) = line.find(" defined ") {
                line.replace_range(pos + 8..pos + 9, "(");
                match line[pos + 8..]
                    .find(|c| c == ' ' || c == '|' || c == '&')
                    .map(|x| pos + 8 + x)
                {
                    Some(q) => line.insert(q, ')'),
                    None => line.push(')'),
                }
            }
        }
        ret.push_str(&line);
        ret.push('\n');
    }
    ret
}

/// Rewrite single-condition `defined` forms into their `#ifdef`-family
/// spellings. Runs after include expansion so headers are covered too.
pub(crate) fn replace_if_defined(text: &str) -> String {
    let mut ret = text.to_string();

    let mut pos = 0usize;
    while let Some(off) = ret[pos..].find("#if defined(") {
        let p = pos + off;
        let Some(p2) = ret[p + 9..].find(')').map(|x| p + 9 + x) else {
            break;
        };
        if ret.as_bytes().get(p2 + 1) == Some(&b'\n') {
            ret.remove(p2);
            ret.replace_range(p + 3..p + 12, "");
            ret.insert_str(p + 3, "def ");
        }
        pos = p + 1;
    }

    pos = 0;
    while let Some(off) = ret[pos..].find("#if !defined(") {
        let p = pos + off;
        let Some(p2) = ret[p + 9..].find(')').map(|x| p + 9 + x) else {
            break;
        };
        if ret.as_bytes().get(p2 + 1) == Some(&b'\n') {
            ret.remove(p2);
            ret.replace_range(p + 3..p + 13, "");
            ret.insert_str(p + 3, "ndef ");
        }
        pos = p + 1;
    }

    pos = 0;
    while let Some(off) = ret[pos..].find("#elif defined(") {
        let p = pos + off;
        let Some(p2) = ret[p + 9..].find(')').map(|x| p + 9 + x) else {
            break;
        };
        if ret.as_bytes().get(p2 + 1) == Some(&b'\n') {
            ret.remove(p2);
            ret.replace_range(p + 6..p + 14, "");
        }
        pos = p + 1;
    }

    ret
}

/// Full normalization of one file's bytes: stream folding, comment and raw
/// string removal, then `#if` parenthesis cleanup.
pub(crate) fn read_text(
    data: &[u8],
    filename: &str,
    settings: &mut Settings,
    sink: &mut dyn Reporter,
) -> String {
    let folded = fold_stream(data, settings.relaxed_backslash_newline);
    let stripped = remove_comments(&folded, filename, settings, sink);
    let text = String::from_utf8_lossy(&stripped).into_owned();
    remove_parentheses(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use diag::{Collector, Settings};

    fn read(src: &str) -> String {
        let mut settings = Settings::default();
        let mut sink = Collector::new();
        read_text(src.as_bytes(), "test.c", &mut settings, &mut sink)
    }

    #[test]
    fn fold_crlf_and_tabs() {
        assert_eq!(read("a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(read("x\ty\n"), "x y\n");
    }

    #[test]
    fn splice_preserves_line_count() {
        let out = read("int x = 1 \\\n+ 2;\nint y;\n");
        assert_eq!(out, "int x = 1 + 2;\n\nint y;\n");
    }

    #[test]
    fn block_comment_newlines_reemitted() {
        let out = read("a /* one\ntwo */ b\nc\n");
        assert_eq!(out, "a b\n\nc\n");
    }

    #[test]
    fn line_comment_keeps_newline() {
        assert_eq!(read("a // text\nb\n"), "a \nb\n");
    }

    #[test]
    fn hash_spacing() {
        assert_eq!(read("#if(A)\n"), "#if A\n");
        assert_eq!(read("#  define X 1\n"), "#define X 1\n");
    }

    #[test]
    fn paren_cleanup_on_if_lines() {
        assert_eq!(read("#if ( A )\n"), "#if A\n");
        assert_eq!(read("#if ((A))\n"), "#if A\n");
        assert_eq!(read("#if (defined(A))||defined(B)\n"), "#if (defined(A))||defined(B)\n");
    }

    #[test]
    fn raw_string_becomes_plain_string() {
        assert_eq!(read("s = R\"(ab\"c)\";\n"), "s = \"ab\\\"c\";\n");
        // hoisted newline lands right after the rewritten literal
        let out = read("s = R\"x(1\n2)x\";\nnext;\n");
        assert_eq!(out, "s = \"1\\n2\"\n;\nnext;\n");
    }

    #[test]
    fn unterminated_raw_string_keeps_r() {
        assert_eq!(read("R\"(abc\n"), "R\"(abc\n");
    }

    #[test]
    fn error_directive_is_verbatim() {
        assert_eq!(
            read("#error // not a comment /* still not */\n"),
            "#error // not a comment /* still not */\n"
        );
    }

    #[test]
    fn non_ascii_reported_and_blanked() {
        let mut settings = Settings::default();
        let mut sink = Collector::new();
        let out = read_text(b"int a\xc3\xa9;\n", "t.c", &mut settings, &mut sink);
        assert_eq!(out, "int a ;\n");
        assert_eq!(sink.ids(), vec!["syntaxError", "syntaxError"]);
    }

    #[test]
    fn suppression_markers_registered() {
        let mut settings = Settings::default();
        settings.inline_suppressions = true;
        let mut sink = Collector::new();
        // the marker applies to the line after the comment
        let src = "// adder-suppress nullPointer\nx = *p;\n";
        read_text(src.as_bytes(), "t.c", &mut settings, &mut sink);
        assert!(settings.nomsg.is_suppressed("nullPointer", "t.c", 2));
        assert!(sink.messages.is_empty());
    }

    #[test]
    fn rejected_suppression_id_is_reported() {
        let mut settings = Settings::default();
        settings.inline_suppressions = true;
        let mut sink = Collector::new();
        let src = "// adder-suppress bad*id\nx = *p;\n";
        read_text(src.as_bytes(), "t.c", &mut settings, &mut sink);
        assert!(settings.nomsg.entries().is_empty());
        assert_eq!(sink.ids(), vec!["cppcheckError"]);
        assert!(
            sink.messages[0].msg.contains("bad*id"),
            "message was: {}",
            sink.messages[0].msg
        );
        assert_eq!(sink.messages[0].locations[0].line, 2);
    }

    #[test]
    fn asm_bodies_elided() {
        let mut s = String::from("x;\nasm(mov eax, 1);\ny;\n");
        remove_asm(&mut s);
        assert_eq!(s, "x;\nasm();\ny;\n");

        let mut s = String::from("a;\nasm __volatile(nop);\nb;\n");
        remove_asm(&mut s);
        assert_eq!(s, "a;\n;\nb;\n");
    }

    #[test]
    fn defined_gets_parens() {
        assert_eq!(normalize_defined("#if defined A\n"), "#if defined(A)\n");
        assert_eq!(
            normalize_defined("#if defined A || defined B\n"),
            "#if defined(A) || defined(B)\n"
        );
    }

    #[test]
    fn if_defined_rewrites() {
        assert_eq!(replace_if_defined("#if defined(A)\n"), "#ifdef A\n");
        assert_eq!(replace_if_defined("#if !defined(A)\n"), "#ifndef A\n");
        assert_eq!(replace_if_defined("#elif defined(B)\n"), "#elif B\n");
        assert_eq!(
            replace_if_defined("#if defined(A) || defined(B)\n"),
            "#if defined(A) || defined(B)\n"
        );
    }

    #[test]
    fn read_is_idempotent_on_canonical_input() {
        let canonical = "#if A\nint x;\n#endif\n";
        assert_eq!(read(canonical), canonical);
        assert_eq!(read(&read(canonical)), read(canonical));
    }
}
