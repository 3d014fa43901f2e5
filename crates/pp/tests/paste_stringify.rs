use diag::{Collector, Settings};
use pp::Preprocessor;

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn expand(src: &str) -> String {
    let mut settings = Settings::default();
    let mut sink = Collector::new();
    let mut pp = Preprocessor::new(&mut settings, &mut sink);
    let (text, _) = pp.preprocess(src.as_bytes(), "test.c", &[]);
    Preprocessor::getcode(&text, "", "test.c", &settings, &mut sink)
}

#[test]
fn stringify_single_token() {
    let out = expand("#define STR(x) #x\nconst char *s = STR(abc);\n");
    assert!(out.contains("\"abc\""), "output was:\n{}", out);
}

#[test]
fn stringify_multi_token_argument() {
    let out = expand("#define STR(x) #x\nconst char *s = STR(hello world);\n");
    assert!(out.contains("\"hello world\""), "output was:\n{}", out);
}

#[test]
fn stringify_escapes_quotes_and_backslashes() {
    let out = expand("#define STR(x) #x\ns = STR(\"q\");\n");
    assert!(out.contains("\"\\\"q\\\"\""), "output was:\n{}", out);
}

#[test]
fn paste_two_parameters() {
    let out = expand("#define CAT(a,b) a##b\nint CAT(foo,bar);\n");
    assert!(squash(&out).contains("intfoobar;"), "output was:\n{}", out);
}

#[test]
fn paste_parameter_with_literal() {
    let out = expand("#define FIELD(n) m_##n\nint FIELD(count);\n");
    assert!(squash(&out).contains("intm_count;"), "output was:\n{}", out);
}

#[test]
fn pasted_name_can_hit_another_macro() {
    let out = expand("#define AB 7\n#define GLUE(a,b) a##b\nint r = GLUE(A,B);\n");
    assert!(squash(&out).contains("intr=7;"), "output was:\n{}", out);
}

#[test]
fn stringify_then_paste_mix() {
    let out = expand("#define BOTH(a,b) #a a##b\nx = BOTH(one,two);\n");
    let squashed = squash(&out);
    assert!(squashed.contains("\"one\"onetwo"), "output was:\n{}", out);
}
