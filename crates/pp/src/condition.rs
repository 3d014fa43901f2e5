//! Reduction of `#if`/`#elif` conditions against a set of known defines.

use std::collections::HashMap;

use expr::TokenList;

/// Reduce `condition` using `variables` (define name => value, empty when
/// the define carries no value). In match mode every unknown name counts as
/// undefined and the condition collapses to `"0"` or `"1"`; outside match
/// mode unknown names are left alone so the condition can still contribute
/// to configuration enumeration. The condition text is rewritten only when
/// it fully reduces.
pub fn simplify_condition(
    variables: &HashMap<String, String>,
    condition: &mut String,
    match_mode: bool,
) {
    let mut toks = TokenList::tokenize(&format!("({})", condition));

    if toks.match_at(0, "( %var% )") {
        if variables.contains_key(toks.str_at(1)) {
            *condition = "1".to_string();
        } else if match_mode {
            *condition = "0".to_string();
        }
        return;
    }

    if toks.match_at(0, "( ! %var% )") {
        if !variables.contains_key(toks.str_at(2)) {
            *condition = "1".to_string();
        } else if match_mode {
            *condition = "0".to_string();
        }
        return;
    }

    // replace names with their values
    let mut i = 0usize;
    while i < toks.len() {
        if !toks.is_name(i) {
            i += 1;
            continue;
        }

        if toks.match_at(i, "defined ( %var% )") {
            if variables.contains_key(toks.str_at(i + 2)) {
                toks.set_str(i, "1");
            } else if match_mode {
                toks.set_str(i, "0");
            } else {
                i += 1;
                continue;
            }
            toks.delete(i + 1);
            toks.delete(i + 1);
            toks.delete(i + 1);
            i += 1;
            continue;
        }

        if toks.match_at(i, "defined %var%") {
            if variables.contains_key(toks.str_at(i + 1)) {
                toks.set_str(i, "1");
            } else if match_mode {
                toks.set_str(i, "0");
            } else {
                i += 1;
                continue;
            }
            toks.delete(i + 1);
            i += 1;
            continue;
        }

        if let Some(value) = variables.get(toks.str_at(i)) {
            if !value.is_empty() {
                toks.set_str(i, value);
                i += 1;
            } else {
                let prev_ok = i == 0 || matches!(toks.str_at(i - 1), "||" | "&&" | "(");
                let next_ok =
                    i + 1 >= toks.len() || matches!(toks.str_at(i + 1), "||" | "&&" | ")");
                if prev_ok && next_ok {
                    toks.set_str(i, "1");
                    i += 1;
                } else {
                    toks.delete(i);
                }
            }
        } else {
            i += 1;
        }
    }

    // fold to fixed point
    loop {
        toks.simplify_calculations();
        let mut modified = false;
        let mut j = 0usize;
        while j < toks.len() {
            if toks.match_at(j, "! %num%") {
                toks.delete(j);
                let flipped = if toks.str_at(j) == "0" { "1" } else { "0" };
                toks.set_str(j, flipped);
                modified = true;
            }
            j += 1;
        }
        if !modified {
            break;
        }
    }

    if toks.match_at(0, "( 1 )") || toks.match_at(0, "( 1 ||") {
        *condition = "1".to_string();
    } else if toks.match_at(0, "( 0 )") {
        *condition = "0".to_string();
    }
}

/// Does `def` hold under configuration `cfg`?
pub fn match_cfg_def(cfg: &HashMap<String, String>, def: &str) -> bool {
    let mut def = def.to_string();
    simplify_condition(cfg, &mut def, true);

    if cfg.contains_key(&def) {
        return true;
    }
    if def == "0" {
        return false;
    }
    def == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn simplified(v: &HashMap<String, String>, cond: &str, match_mode: bool) -> String {
        let mut c = cond.to_string();
        simplify_condition(v, &mut c, match_mode);
        c
    }

    #[test]
    fn bare_name() {
        let v = vars(&[("A", "")]);
        assert_eq!(simplified(&v, "A", false), "1");
        assert_eq!(simplified(&v, "B", false), "B");
        assert_eq!(simplified(&v, "B", true), "0");
    }

    #[test]
    fn negated_name() {
        let v = vars(&[("A", "")]);
        assert_eq!(simplified(&v, "!B", false), "1");
        assert_eq!(simplified(&v, "!A", true), "0");
    }

    #[test]
    fn defined_forms() {
        let v = vars(&[("A", "")]);
        assert_eq!(simplified(&v, "defined(A)&&defined(B)", true), "0");
        assert_eq!(simplified(&v, "defined(A)||defined(B)", true), "1");
        // outside match mode the unknown half keeps the condition open
        assert_eq!(
            simplified(&v, "defined(A)&&defined(B)", false),
            "defined(A)&&defined(B)"
        );
    }

    #[test]
    fn value_substitution() {
        let v = vars(&[("VER", "3")]);
        assert_eq!(simplified(&v, "VER>=2", true), "1");
        assert_eq!(simplified(&v, "VER==2", true), "0");
    }

    #[test]
    fn empty_value_between_operators() {
        let v = vars(&[("A", ""), ("B", "")]);
        assert_eq!(simplified(&v, "A&&B", true), "1");
    }

    #[test]
    fn bang_on_lone_name_checks_definedness_only() {
        let v = vars(&[("A", "1")]);
        assert_eq!(simplified(&v, "!A", true), "0");
        // same for a zero value: `!X` alone asks "is X undefined"
        let v = vars(&[("A", "0")]);
        assert_eq!(simplified(&v, "!A", true), "0");
    }

    #[test]
    fn bang_folds_inside_larger_expressions() {
        let v = vars(&[("A", "0")]);
        assert_eq!(simplified(&v, "!A||B", true), "1");
        // a dead && arm does not fully reduce, so the match fails on text
        let v = vars(&[("A", "1")]);
        assert!(!match_cfg_def(&v, "!A&&B"));
    }

    #[test]
    fn match_cfg_def_token_lookup() {
        let cfg = vars(&[("X", ""), ("Y", "2")]);
        assert!(match_cfg_def(&cfg, "X"));
        assert!(match_cfg_def(&cfg, "Y"));
        assert!(!match_cfg_def(&cfg, "Z"));
        assert!(match_cfg_def(&cfg, "defined(X)"));
        assert!(!match_cfg_def(&cfg, "defined(Z)"));
        assert!(match_cfg_def(&cfg, "Y>=2"));
    }
}
