use std::fs;
use std::path::PathBuf;

use oney::{evaluate, stock_env, ExecError, Value};

fn eval(src: &str) -> Result<Value, ExecError> {
    evaluate(src, &stock_env())
}

fn eval_ok(src: &str) -> Value {
    eval(src).unwrap_or_else(|err| panic!("script failed: {}\nscript: {}", err, src))
}

fn assert_inspect(src: &str, expected: &str) {
    assert_eq!(expected, eval_ok(src).inspect(), "script: {}", src);
}

fn assert_error_contains(src: &str, needles: &[&str]) {
    match eval(src) {
        Err(err) => {
            let message = err.to_string();
            for needle in needles {
                assert!(
                    message.contains(needle),
                    "error {:?} does not mention {:?} (script: {})",
                    message,
                    needle,
                    src
                );
            }
        }
        Ok(value) => panic!("expected error from {:?}, got {:?}", src, value),
    }
}

#[test]
fn arithmetic_scenarios() {
    assert_inspect("let a = 5; a + 3;", "8");
    assert_inspect("let i = 0; while (i < 3) { i = i + 1 }; i;", "3");
    assert_inspect(r#""ab" * 3;"#, "ababab");
    assert_inspect("2 ** 10", "1024");
    assert_inspect("7 / 2", "3");
    assert_inspect("2 + 3 * 4 ** 2 / 8", "8");
}

#[test]
fn recursive_fibonacci() {
    assert_inspect(
        "const f = fn(x){ if (x<2) {x} else {f(x-1)+f(x-2)} }; f(10);",
        "55",
    );
}

#[test]
fn unbounded_integers() {
    // 2^128, far past any machine word
    assert_inspect(
        "let p = 1; let i = 0; while (i < 128) { p = p * 2; i = i + 1 }; p;",
        "340282366920938463463374607431768211456",
    );
    assert_inspect("(1 << 200) >> 200", "1");
}

#[test]
fn division_identity() {
    for (x, y) in [(17, 5), (-17, 5), (17, -5), (-17, -5), (100, 7)] {
        let src = format!("({x} / {y}) * {y} + ({x} % {y}) == {x}");
        assert_inspect(&src, "true");
    }
}

#[test]
fn push_aliases_the_array() {
    assert_inspect("let xs = [3,1,2]; push(xs, 0); len(xs);", "4");
    // Two names, one array
    assert_inspect("let a = []; let b = a; push(b, 1); push(a, 2); len(b);", "2");
}

#[test]
fn hash_dot_assignment() {
    assert_inspect(r#"let h = {"a": 1}; h.a = h.a + 41; h["a"];"#, "42");
    assert_inspect(r#"let h = {}; h.list = [1]; push(h.list, 2); len(h["list"]);"#, "2");
}

#[test]
fn constants_are_protected() {
    assert_error_contains("const x = 1; x = 2;", &["constant", "x"]);
    assert_error_contains("const x = 1; const x = 2;", &["redeclare", "x"]);
    assert_error_contains("const k = [1]; k = [2];", &["cannot assign to constant 'k'"]);
    // The container a constant names is still mutable
    assert_inspect("const k = [1]; push(k, 2); len(k);", "2");
}

#[test]
fn division_by_zero() {
    assert_error_contains("1 / 0;", &["division by zero"]);
    assert_error_contains("let a = 1; a %= 0;", &["modulus by zero"]);
}

#[test]
fn closures_capture_their_frame() {
    assert_inspect(
        "let factory = fn() { let i = 0; fn() { i = i + 1; i } };
         let a = factory(); let b = factory();
         a(); a(); a(); b();",
        "1",
    );
    assert_inspect(
        "let factory = fn() { let i = 0; fn() { i = i + 1; i } };
         let c = factory(); c(); c();",
        "2",
    );
}

#[test]
fn referential_transparency_of_pure_expressions() {
    for src in [
        "2 ** 8",
        "[1, 2] + [3]",
        r#"{"k": 1 + 1}["k"]"#,
        "!0 && true",
    ] {
        assert_eq!(
            eval_ok(src).inspect(),
            eval_ok(src).inspect(),
            "script: {}",
            src
        );
    }
}

#[test]
fn truthiness_follows_the_dialect() {
    // Zero and empty collections are truthy; only null and false are not
    assert_inspect("if (0) { 1 } else { 2 }", "1");
    assert_inspect(r#"if ("") { 1 } else { 2 }"#, "1");
    assert_inspect("if ([]) { 1 } else { 2 }", "1");
    // A missed if with no else evaluates to null, which is falsy
    assert_inspect("if (if (false) { 0 }) { 1 } else { 2 }", "2");
}

#[test]
fn elif_chains() {
    let grade = |score: i64| {
        format!(
            "let s = {score};
             if (s >= 90) {{ \"A\" }} elif (s >= 80) {{ \"B\" }} elif (s >= 70) {{ \"C\" }} else {{ \"F\" }}"
        )
    };
    assert_inspect(&grade(95), "A");
    assert_inspect(&grade(85), "B");
    assert_inspect(&grade(75), "C");
    assert_inspect(&grade(5), "F");
}

#[test]
fn for_loops_with_break_and_continue() {
    assert_inspect(
        "let sum = 0;
         for (let i = 0; i < 10; i++) {
             if (i == 7) { break }
             if (i % 2 == 1) { continue }
             sum += i;
         }
         sum;",
        "12",
    );
}

#[test]
fn builtins_through_the_language() {
    assert_inspect(r#"len("hello")"#, "5");
    assert_inspect("first([7, 8])", "7");
    assert_inspect("last([7, 8])", "8");
    assert_inspect("rest([7, 8, 9])[0]", "8");
    assert_inspect("pop([1, 2, 3])", "3");
    assert_inspect("let xs = [1, 2]; pop(xs); len(xs);", "1");
    assert_inspect("concat([1], [2], [3])[2]", "3");
    assert_inspect("len(range(0, 10))", "10");
    assert_inspect("range(3, 6)[0]", "3");
    assert_inspect(r#"split("a,b,c", ",")[1]"#, "b");
    assert_inspect(r#"sprintf("%s-%d", "x", 7)"#, "x-7");
    assert_inspect(r#"int("42") + 1"#, "43");
    assert_inspect(r#"float("2.5") * 2"#, "5.0");
    assert_inspect("str(42) + \"!\"", "42!");
    assert_inspect("type(1)", "INTEGER");
    assert_inspect("type(1.5)", "FLOAT");
    assert_inspect(r#"type("s")"#, "STRING");
    assert_inspect("type(fn() { 0 })", "FUNCTION");
    assert_inspect("type(len)", "BUILTIN");
    assert_error_contains("len(1)", &["argument to `len` not supported"]);
    assert_error_contains("len()", &["wrong number of arguments"]);
    assert_error_contains("range(5, 1)", &["start index cannot be greater"]);
    assert_error_contains(r#"int("zap")"#, &["cannot convert zap to int"]);
}

#[test]
fn builtins_can_be_shadowed() {
    assert_inspect("let len = 3; len;", "3");
}

#[test]
fn library_namespaces() {
    assert_inspect(r#"String.upper("abc")"#, "ABC");
    assert_inspect(r#"String.contains("haystack", "st")"#, "true");
    assert_inspect(r#"String.repeat("ab", 2)"#, "abab");
    assert_inspect(r#"String.split("a b", " ")[1]"#, "b");
    assert_inspect(r#"String.trim("  pad  ")"#, "pad");
    assert_inspect(r#"String.compare("a", "b")"#, "-1");
    assert_inspect(r#"Array.indexOf([5, 6], 6)"#, "1");
    assert_inspect(r#"Array.join([1, 2], "+")"#, "1+2");
    assert_inspect("Array.slice([1, 2, 3, 4], 1, 3)[0]", "2");
    assert_inspect("let xs = [2]; Array.unshift(xs, 1); xs[0];", "1");
    assert_inspect("Math.sqrt(9)", "3");
    assert_inspect("Math.floor(3.9)", "3");
    assert_inspect("Math.max(2, 7)", "7");
    // Namespaces are constants
    assert_error_contains("String = 1;", &["cannot assign to constant 'String'"]);
}

#[test]
fn string_indexing() {
    assert_inspect(r#""hello"[0]"#, "h");
    assert_inspect(r#"let s = "hi"; s[9]"#, "null");
}

#[test]
fn hash_keys_across_kinds() {
    assert_inspect(r#"{1: "int", "1": "str", true: "bool"}[1]"#, "int");
    assert_inspect(r#"{1: "int", "1": "str", true: "bool"}["1"]"#, "str");
    assert_inspect(r#"{1: "int", "1": "str", true: "bool"}[true]"#, "bool");
    assert_error_contains("{2.5: 1}", &["unusable as hash key: FLOAT"]);
}

#[test]
fn multi_dimensional_indexing() {
    assert_inspect("[[1, 2], [3, 4]][1, 1]", "4");
    assert_inspect(r#"let grid = {"row": [10, 20]}; grid["row", 1];"#, "20");
}

#[test]
fn function_values_inspect_as_source() {
    assert_inspect("fn(x) { x }", "fn(x) {\nx\n}");
    assert_inspect("len", "builtin function");
}

#[test]
fn arity_is_checked() {
    assert_error_contains(
        "let f = fn(a, b) { a + b }; f(1);",
        &["wrong number of arguments: expected 2, got 1"],
    );
    assert_error_contains(
        "let f = fn() { 0 }; f(9);",
        &["wrong number of arguments: expected 0, got 1"],
    );
}

struct TempModule {
    path: PathBuf,
    import_arg: String,
}

impl TempModule {
    fn new(stem: &str, contents: &str) -> TempModule {
        let path = std::env::temp_dir().join(format!("{}_{}.1y", stem, std::process::id()));
        fs::write(&path, contents).expect("write module");
        let import_arg = path
            .to_str()
            .expect("temp path is utf-8")
            .trim_end_matches(".1y")
            .to_string();
        TempModule { path, import_arg }
    }
}

impl Drop for TempModule {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[test]
fn import_exposes_module_bindings_as_hash() {
    let module = TempModule::new(
        "oney_mod",
        "let value = 41;\nconst inc = fn(x) { x + 1 };\n",
    );
    let src = format!(
        r#"let m = import("{}"); m.inc(m.value);"#,
        module.import_arg
    );
    assert_inspect(&src, "42");

    // The `.1y` suffix may also be spelled out
    let src = format!(
        r#"let m = import("{}.1y"); m.value;"#,
        module.import_arg
    );
    assert_inspect(&src, "41");
}

#[test]
fn import_twice_yields_equal_modules() {
    let module = TempModule::new("oney_mod_twice", "let a = 1; let b = [1, 2];\n");
    let src = format!(
        r#"import("{0}") == import("{0}")"#,
        module.import_arg
    );
    assert_inspect(&src, "true");
}

#[test]
fn import_failures() {
    assert_error_contains(
        r#"import("oney_definitely_missing_module")"#,
        &["could not read file", "oney_definitely_missing_module.1y"],
    );

    let module = TempModule::new("oney_mod_broken", "let = ;\n");
    let src = format!(r#"import("{}")"#, module.import_arg);
    assert_error_contains(&src, &["parsing file", "failed"]);

    assert_error_contains("import(5)", &["import path must be a string, got INTEGER"]);
}

#[test]
fn import_runtime_errors_propagate() {
    let module = TempModule::new("oney_mod_bad_rt", "let x = 1 / 0;\n");
    let src = format!(r#"import("{}")"#, module.import_arg);
    assert_error_contains(&src, &["division by zero"]);
}

#[test]
fn parser_errors_block_evaluation() {
    match eval("let x 5;") {
        Err(ExecError::Parse(errors)) => {
            assert!(!errors.is_empty());
            assert!(errors[0].contains("expected next token to be ="));
        }
        other => panic!("expected parse errors, got {:?}", other),
    }
}

#[test]
fn logical_operators_short_circuit_across_calls() {
    assert_inspect(
        "let called = [];
         let t = fn() { push(called, 1); true };
         false && t();
         len(called);",
        "0",
    );
    assert_inspect(
        "let called = [];
         let t = fn() { push(called, 1); true };
         true || t();
         len(called);",
        "0",
    );
}

#[test]
fn returns_do_not_leak_past_the_call() {
    assert_inspect(
        "let f = fn() { let i = 0; while (true) { i = i + 1; if (i == 4) { return i } } };
         f() + 1;",
        "5",
    );
}
