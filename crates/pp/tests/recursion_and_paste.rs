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
fn self_referencing_object_macro_halts() {
    let out = expand("#define A A\nint r = A;\n");
    assert!(squash(&out).contains("intr=A;"), "output was:\n{}", out);
}

#[test]
fn self_referencing_function_macro_halts() {
    let out = expand("#define ID(x) ID(x)\nint r = ID(7);\n");
    assert!(squash(&out).contains("intr=ID(7);"), "output was:\n{}", out);
}

#[test]
fn mutual_recursion_halts() {
    let out = expand("#define A B\n#define B A\nint r = A;\n");
    assert!(squash(&out).contains("intr=A;"), "output was:\n{}", out);
}

#[test]
fn chain_expansion_reaches_fixed_point() {
    let out = expand("#define A B\n#define B 7\nint r = A;\n");
    assert!(squash(&out).contains("intr=7;"), "output was:\n{}", out);
}

#[test]
fn same_macro_expands_at_later_call_sites() {
    let out = expand("#define TWO 2\nint r = TWO + TWO;\n");
    assert!(squash(&out).contains("intr=2+2;"), "output was:\n{}", out);
}

#[test]
fn recursion_guard_is_per_logical_line() {
    let out = expand("#define A A\nint r = A;\nint s = A;\n");
    let squashed = squash(&out);
    assert!(squashed.contains("intr=A;") && squashed.contains("ints=A;"), "output was:\n{}", out);
}
