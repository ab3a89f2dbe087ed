//! End-to-end scenarios from the language specification, run in-process
//! against the embedding contract (`zephyr_lang::run_capturing`) rather
//! than by spawning the built binary.
use zephyr_lang::value::Tag;

fn run(source: &str) -> (zephyr_lang::Value, bool, String) {
    zephyr_lang::run_capturing("scenario.zy", source)
}

#[test]
fn hello_world() {
    let (value, ok, out) = run(r#"print("Hello, World!");"#);
    assert!(ok);
    assert_eq!(out, "Hello, World!\n");
    assert_eq!(value.tag(), Tag::String);
}

#[test]
fn recursive_fibonacci_is_memoized() {
    let (value, ok, out) = run(
        "let fib = fn (n) => { if (n < 2) { n } else { fib(n-1) + fib(n-2) } }; print(fib(20));",
    );
    assert!(ok);
    assert_eq!(out, "6765\n");
    assert_eq!(value.as_integer(), Some(6765));
}

#[test]
fn calling_a_function_twice_sums_correctly() {
    let (value, ok, out) = run("let sum = fn (a,b) => { a + b }; print(sum(3,2) + sum(1,2));");
    assert!(ok);
    assert_eq!(out, "8\n");
    assert_eq!(value.as_integer(), Some(8));
}

#[test]
fn arithmetic_precedence_and_grouping() {
    let (value, ok, out) = run("let a = 9; let b = (a + 2) * 3 / 2; print(b * 6);");
    assert!(ok);
    assert_eq!(out, "96\n");
    assert_eq!(value.as_integer(), Some(96));
}

#[test]
fn plus_falls_back_to_string_concatenation() {
    let (value, ok, out) = run(r#"let a = "'/{} string test"; let b = 3 + a; print(b);"#);
    assert!(ok);
    assert_eq!(out, "3'/{} string test\n");
    assert_eq!(value.render(), "3'/{} string test");
}

#[test]
fn chained_assignment_and_string_concatenation() {
    let (value, ok, out) = run(r#"let a = 5; let b = 33; let c = a = b = 567; print("c = ["+c+"]");"#);
    assert!(ok);
    assert_eq!(out, "c = [567]\n");
    assert_eq!(value.render(), "c = [567]");
}

#[test]
fn closure_captures_enclosing_frame_after_it_returns() {
    let (value, ok, out) = run(
        "let z = fn () => { let x = 2; let f = fn (y) => x + y; f }; let f = z(); print(f(1));",
    );
    assert!(ok);
    assert_eq!(out, "3\n");
    assert_eq!(value.as_integer(), Some(3));
}

#[test]
fn nested_tuples_and_first_second() {
    let (value, ok, out) = run(
        "print(second((first((55,60)), first((second((100,200)), 90)))));",
    );
    assert!(ok);
    assert_eq!(out, "200\n");
    assert_eq!(value.as_integer(), Some(200));
}

#[test]
fn assignment_to_an_undefined_identifier_is_a_fatal_error() {
    let (_, ok, _) = run("x = 5;");
    assert!(!ok);
}

#[test]
fn comparing_different_tags_is_a_fatal_error() {
    let (_, ok, _) = run("1 == true;");
    assert!(!ok);
}

#[test]
fn print_disables_memoization_for_the_call_chain() {
    // A cached function that also prints must recompute (and re-print)
    // on every call with the same arguments, rather than short-circuit
    // through the memoization cache on the second call.
    let (_, ok, out) = run(
        "let f = fn (n) => { print(n); n * 2 }; f(5); f(5);",
    );
    assert!(ok);
    assert_eq!(out, "5\n5\n");
}

#[test]
fn first_non_integer_argument_disables_caching_permanently() {
    let (value, ok, out) = run(
        r#"let id = fn (n) => { n }; id("x"); print(id(5)); print(id(5));"#,
    );
    assert!(ok);
    assert_eq!(out, "5\n5\n");
    assert_eq!(value.as_integer(), Some(5));
}
