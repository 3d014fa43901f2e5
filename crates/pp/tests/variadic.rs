use diag::{Collector, Settings};
use pp::Preprocessor;

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn expand_with(src: &str) -> (String, Collector) {
    let mut settings = Settings::default();
    let mut sink = Collector::new();
    let mut pp = Preprocessor::new(&mut settings, &mut sink);
    let (text, _) = pp.preprocess(src.as_bytes(), "test.c", &[]);
    let out = Preprocessor::getcode(&text, "", "test.c", &settings, &mut sink);
    (out, sink)
}

fn expand(src: &str) -> String {
    expand_with(src).0
}

#[test]
fn va_args_only() {
    let out = expand("#define CALL(...) f(__VA_ARGS__)\nCALL(1, 2, 3);\n");
    assert!(squash(&out).contains("f(1,2,3);"), "output was:\n{}", out);
}

#[test]
fn va_args_empty() {
    let out = expand("#define CALL(...) f(__VA_ARGS__)\nCALL();\n");
    assert!(squash(&out).contains("f();"), "output was:\n{}", out);
}

#[test]
fn named_plus_va_args() {
    let out = expand("#define LOG(fmt, ...) printf(fmt, __VA_ARGS__)\nLOG(\"%d\", 1);\n");
    assert!(squash(&out).contains("printf(\"%d\",1);"), "output was:\n{}", out);
}

#[test]
fn comma_suppressed_when_va_args_empty() {
    let src = "#define LOG(fmt, ...) printf(fmt, ##__VA_ARGS__)\nLOG(\"x\");\nLOG(\"y\", 1);\n";
    let out = squash(&expand(src));
    assert!(out.contains("printf(\"x\");"), "output was:\n{}", out);
    assert!(out.contains("printf(\"y\",1);"), "output was:\n{}", out);
}

#[test]
fn gnu_named_rest_parameter() {
    let src = "#define TRACE(args...) dbg(args)\nTRACE(1, 2);\n";
    let out = squash(&expand(src));
    assert!(out.contains("dbg(1,2);"), "output was:\n{}", out);
}

#[test]
fn starved_variadic_reports_syntax_error() {
    let (out, sink) = expand_with("#define L(a,b,...) f(a,b)\nL();\n");
    assert_eq!(out, "");
    assert_eq!(sink.ids(), vec!["syntaxError"]);
    assert!(sink.messages[0].msg.contains("Not enough parameters"));
}
