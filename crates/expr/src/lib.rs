//! A small token list for preprocessor expressions and macro bodies.
//!
//! Tokens live in a flat `Vec` and are addressed by index; edits happen in
//! place. The pattern language understood by [`TokenList::match_at`] covers
//! exactly what the preprocessor needs: literal tokens, `%var%`, `%num%`,
//! `%any%`, and `|`-alternation.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    text: String,
}

impl Token {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn str(&self) -> &str {
        &self.text
    }
}

fn is_name_str(s: &str) -> bool {
    matches!(s.as_bytes().first(), Some(c) if c.is_ascii_alphabetic() || *c == b'_')
}

fn is_number_str(s: &str) -> bool {
    matches!(s.as_bytes().first(), Some(c) if c.is_ascii_digit())
}

#[derive(Debug, Clone, Default)]
pub struct TokenList {
    toks: Vec<Token>,
}

impl TokenList {
    pub fn tokenize(text: &str) -> TokenList {
        let b = text.as_bytes();
        let mut toks = Vec::new();
        let mut i = 0usize;
        while i < b.len() {
            let c = b[i];
            if c.is_ascii_whitespace() {
                i += 1;
                continue;
            }
            let start = i;
            if c == b'_' || c.is_ascii_alphabetic() {
                i += 1;
                while i < b.len() && (b[i] == b'_' || b[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
            } else if c.is_ascii_digit() {
                i += 1;
                while i < b.len() && (b[i] == b'_' || b[i] == b'.' || b[i].is_ascii_alphanumeric())
                {
                    i += 1;
                }
            } else if c == b'"' || c == b'\'' {
                i += 1;
                while i < b.len() && b[i] != c {
                    if b[i] == b'\\' {
                        i += 1;
                    }
                    i = (i + 1).min(b.len());
                }
                i = (i + 1).min(b.len());
            } else if c == b'#' {
                i += 1;
                if i < b.len() && b[i] == b'#' {
                    i += 1;
                } else {
                    // "#x" stays one token so stringification is visible
                    while i < b.len() && (b[i] == b'_' || b[i].is_ascii_alphanumeric()) {
                        i += 1;
                    }
                }
            } else {
                const DOUBLES: [&[u8; 2]; 8] = [
                    b"&&", b"||", b"==", b"!=", b"<=", b">=", b"<<", b">>",
                ];
                let pair = b.get(i..i + 2);
                if pair.is_some() && DOUBLES.iter().any(|d| pair == Some(&d[..])) {
                    i += 2;
                } else {
                    // single char, stepping over a full code point
                    let w = text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                    i += w;
                }
            }
            toks.push(Token::new(&text[start..i]));
        }
        TokenList { toks }
    }

    pub fn len(&self) -> usize {
        self.toks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toks.is_empty()
    }

    /// Token text at `i`, or `""` past the end.
    pub fn str_at(&self, i: usize) -> &str {
        self.toks.get(i).map(|t| t.str()).unwrap_or("")
    }

    pub fn is_name(&self, i: usize) -> bool {
        is_name_str(self.str_at(i))
    }

    pub fn is_number(&self, i: usize) -> bool {
        is_number_str(self.str_at(i))
    }

    pub fn set_str(&mut self, i: usize, s: &str) {
        if let Some(t) = self.toks.get_mut(i) {
            t.text = s.to_string();
        }
    }

    pub fn delete(&mut self, i: usize) {
        if i < self.toks.len() {
            self.toks.remove(i);
        }
    }

    /// Match `pattern` against the tokens starting at `i`. Pattern elements
    /// are separated by spaces; each is a literal, `%var%`, `%num%`,
    /// `%any%`, or a `|`-alternation of those.
    pub fn match_at(&self, i: usize, pattern: &str) -> bool {
        let mut idx = i;
        for elem in pattern.split_whitespace() {
            if idx >= self.toks.len() {
                return false;
            }
            let t = self.toks[idx].str();
            let ok = elem.split('|').any(|p| match p {
                "%var%" => is_name_str(t),
                "%num%" => is_number_str(t),
                "%any%" => true,
                lit => lit == t,
            });
            if !ok {
                return false;
            }
            idx += 1;
        }
        true
    }

    /// First index at or after `start` where `pattern` matches.
    pub fn find_match(&self, start: usize, pattern: &str) -> Option<usize> {
        (start..self.toks.len()).find(|&i| self.match_at(i, pattern))
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        for t in &self.toks {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(t.str());
        }
        out
    }

    /// Fold constant subexpressions in place until nothing more reduces.
    /// Returns whether anything changed. Parentheses that wrap a lone
    /// number are dropped, except an opening paren at index 0 (callers rely
    /// on the outermost wrapping surviving) or one that would turn a call
    /// into juxtaposition.
    pub fn simplify_calculations(&mut self) -> bool {
        let mut any = false;
        loop {
            let mut changed = false;
            let mut i = 1;
            while i + 1 < self.toks.len() {
                if let Some(folded) = self.fold_binary_at(i) {
                    self.toks[i - 1].text = folded;
                    self.toks.drain(i..=i + 1);
                    changed = true;
                    break;
                }
                i += 1;
            }
            if !changed {
                let mut j = 1;
                while j + 2 < self.toks.len() {
                    if self.str_at(j) == "("
                        && self.is_number(j + 1)
                        && self.str_at(j + 2) == ")"
                        && !self.is_name(j - 1)
                    {
                        self.toks.remove(j + 2);
                        self.toks.remove(j);
                        changed = true;
                        break;
                    }
                    j += 1;
                }
            }
            if changed {
                any = true;
            } else {
                return any;
            }
        }
    }

    fn fold_binary_at(&self, i: usize) -> Option<String> {
        let p = operator_precedence(self.str_at(i))?;
        if !self.is_number(i - 1) || !self.is_number(i + 1) {
            return None;
        }
        // respect tighter neighbours: "x * 1 + 2" must not fold "1 + 2"
        if i >= 2 {
            if let Some(bp) = operator_precedence(self.str_at(i - 2)) {
                if bp <= p {
                    return None;
                }
            }
        }
        if i + 2 < self.toks.len() {
            if let Some(ap) = operator_precedence(self.str_at(i + 2)) {
                if ap < p {
                    return None;
                }
            }
        }
        let a: i64 = self.str_at(i - 1).parse().ok()?;
        let b: i64 = self.str_at(i + 1).parse().ok()?;
        let v = match self.str_at(i) {
            "*" => a.checked_mul(b)?,
            "/" => a.checked_div(b)?,
            "%" => a.checked_rem(b)?,
            "+" => a.checked_add(b)?,
            "-" => a.checked_sub(b)?,
            "<<" => a.checked_shl(u32::try_from(b).ok()?)?,
            ">>" => a.checked_shr(u32::try_from(b).ok()?)?,
            "<" => (a < b) as i64,
            "<=" => (a <= b) as i64,
            ">" => (a > b) as i64,
            ">=" => (a >= b) as i64,
            "==" => (a == b) as i64,
            "!=" => (a != b) as i64,
            "&" => a & b,
            "^" => a ^ b,
            "|" => a | b,
            "&&" => (a != 0 && b != 0) as i64,
            "||" => (a != 0 || b != 0) as i64,
            _ => return None,
        };
        Some(v.to_string())
    }
}

fn operator_precedence(op: &str) -> Option<u8> {
    let p = match op {
        "*" | "/" | "%" => 3,
        "+" | "-" => 4,
        "<<" | ">>" => 5,
        "<" | "<=" | ">" | ">=" => 6,
        "==" | "!=" => 7,
        "&" => 8,
        "^" => 9,
        "|" => 10,
        "&&" => 11,
        "||" => 12,
        _ => return None,
    };
    Some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> TokenList {
        TokenList::tokenize(s)
    }

    #[test]
    fn tokenize_idents_numbers_ops() {
        let t = toks("defined(A)&&B_1>=0x10");
        let got: Vec<&str> = (0..t.len()).map(|i| t.str_at(i)).collect();
        assert_eq!(got, vec!["defined", "(", "A", ")", "&&", "B_1", ">=", "0x10"]);
    }

    #[test]
    fn tokenize_hash_forms() {
        let t = toks("a##b #x # y");
        let got: Vec<&str> = (0..t.len()).map(|i| t.str_at(i)).collect();
        assert_eq!(got, vec!["a", "##", "b", "#x", "#", "y"]);
    }

    #[test]
    fn tokenize_strings_are_single_tokens() {
        let t = toks("f(\"a,b\\\"c\", 'x')");
        let got: Vec<&str> = (0..t.len()).map(|i| t.str_at(i)).collect();
        assert_eq!(got, vec!["f", "(", "\"a,b\\\"c\"", ",", "'x'", ")"]);
    }

    #[test]
    fn dots_stay_separate() {
        let t = toks("M(a, ...)");
        let got: Vec<&str> = (0..t.len()).map(|i| t.str_at(i)).collect();
        assert_eq!(got, vec!["M", "(", "a", ",", ".", ".", ".", ")"]);
    }

    #[test]
    fn match_patterns() {
        let t = toks("defined ( FOO )");
        assert!(t.match_at(0, "defined ( %var% )"));
        assert!(!t.match_at(0, "defined ( %num% )"));
        assert!(t.match_at(1, "( %any% )"));
        let t = toks("a , b )");
        assert!(t.match_at(0, "%var% ,|)"));
        assert!(t.match_at(2, "%var% ,|)"));
        assert!(!t.match_at(3, "%var%"));
    }

    #[test]
    fn match_past_end_fails() {
        let t = toks("( 1");
        assert!(!t.match_at(0, "( 1 )"));
    }

    #[test]
    fn fold_boolean_chain() {
        let mut t = toks("( 1 && 1 && 0 )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( 0 )");
    }

    #[test]
    fn fold_respects_precedence() {
        let mut t = toks("( x * 1 + 2 )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( x * 1 + 2 )");

        let mut t = toks("( 2 + 3 * 4 )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( 14 )");
    }

    #[test]
    fn fold_comparisons_and_arith() {
        let mut t = toks("( 3 >= 2 )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( 1 )");

        let mut t = toks("( 6 == 7 )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( 0 )");
    }

    #[test]
    fn inner_parens_fold_outer_survive() {
        let mut t = toks("( ( 1 ) && ( 0 ) )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( 0 )");
    }

    #[test]
    fn call_parens_survive() {
        let mut t = toks("( FOO ( 1 ) )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( FOO ( 1 ) )");
    }

    #[test]
    fn division_by_zero_is_left_alone() {
        let mut t = toks("( 1 / 0 )");
        t.simplify_calculations();
        assert_eq!(t.text(), "( 1 / 0 )");
    }
}
