/// End-to-end evaluation tests: source text through scan → parse → eval →
/// display.
///
/// These cover:
///   • Right-to-left evaluation order and vector juxtaposition
///   • Reductions, scans, inner and outer products
///   • Shape operations: rho, take, drop, transpose, catenation
///   • Indexing, indexed assignment, and the quiet-assignment marker
///   • User-defined operators, recursion, and early return
///   • The numeric tower: promotion, shrinking, high-precision sqrt
///   • Error messages surfaced at the statement boundary
use aplite::{sprint, Config, Context, Value};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn eval_with(ctx: &mut Context, src: &str) -> Value {
    ctx.run(src)
        .unwrap_or_else(|e| panic!("eval failed for {:?}: {}", src, e))
        .expect("expression should produce a value")
}

fn eval_text(src: &str) -> String {
    let mut ctx = Context::new();
    let v = eval_with(&mut ctx, src);
    sprint(&ctx.config, &v)
}

fn eval_err(src: &str) -> String {
    let mut ctx = Context::new();
    ctx.run(src).unwrap_err().to_string()
}

// ─── Arithmetic and evaluation order ─────────────────────────────────────────

#[test]
fn apl_right_to_left() {
    assert_eq!(eval_text("1 + 2 * 3"), "7");
    assert_eq!(eval_text("10 - 2 - 3"), "11");
    // A glued minus is a negative literal; unary minus binds the rest.
    assert_eq!(eval_text("-3 + 4"), "1");
    assert_eq!(eval_text("x = 7; - x + 4"), "-11");
}

#[test]
fn rational_and_big_promotion() {
    assert_eq!(eval_text("1 / 3"), "1/3");
    assert_eq!(eval_text("1/3 + 2/3"), "1");
    assert_eq!(eval_text("2 ** 100"), "1267650600228229401496703205376");
    // Shrink: a big result that fits collapses back to int.
    assert_eq!(eval_text("(2 ** 40) idiv 2 ** 35"), "32");
}

#[test]
fn comparison_chain_returns_bits() {
    assert_eq!(eval_text("3 < 1 2 3 4 5"), "0 0 0 1 1");
    assert_eq!(eval_text("2 max 1 5 2"), "2 5 2");
}

// ─── Vectors and shapes ──────────────────────────────────────────────────────

#[test]
fn iota_and_reductions() {
    assert_eq!(eval_text("iota 5"), "1 2 3 4 5");
    assert_eq!(eval_text("iota 0"), "");
    assert_eq!(eval_text("+/ iota 100"), "5050");
    assert_eq!(eval_text("*/ iota 5"), "120");
    assert_eq!(eval_text("+\\ iota 5"), "1 3 6 10 15");
}

#[test]
fn reshape_scenario() {
    assert_eq!(eval_text("3 4 rho iota 12"), "1 2 3 4\n5 6 7 8\n9 10 11 12");
    assert_eq!(eval_text("0 rho 42"), "");
    assert_eq!(eval_text("1 1 rho 42"), "42");
    assert_eq!(eval_text("rho 3 4 rho iota 12"), "3 4");
}

#[test]
fn take_drop_and_fills() {
    assert_eq!(eval_text("2 take iota 5"), "1 2");
    assert_eq!(eval_text("-2 take iota 5"), "4 5");
    assert_eq!(eval_text("5 take 1 2 3"), "1 2 3 0 0");
    assert_eq!(eval_text("2 drop iota 5"), "3 4 5");
    assert_eq!(eval_text("5 take 'ab'"), "ab   ");
}

#[test]
fn rotate_reverse_transpose() {
    assert_eq!(eval_text("2 rot iota 5"), "3 4 5 1 2");
    assert_eq!(eval_text("rev iota 4"), "4 3 2 1");
    assert_eq!(eval_text("rev rev iota 7"), "1 2 3 4 5 6 7");
    assert_eq!(eval_text("transp 2 3 rho iota 6"), "1 4\n2 5\n3 6");
    assert_eq!(eval_text("transp transp 2 3 rho iota 6"), "1 2 3\n4 5 6");
}

#[test]
fn catenation() {
    assert_eq!(eval_text("'abc' , 'def'"), "abcdef");
    assert_eq!(eval_text("1 2 , 3"), "1 2 3");
    assert_eq!(eval_text("0 , iota 3"), "0 1 2 3");
}

#[test]
fn inner_and_outer_products() {
    assert_eq!(eval_text("1 2 3 +.* 4 5 6"), "32");
    assert_eq!(eval_text("(2 2 rho 1 2 3 4) +.* 2 2 rho 1 0 0 1"), "1 2\n3 4");
    assert_eq!(eval_text("1 2 3 o.* 1 10"), "1 10\n2 20\n3 30");
}

#[test]
fn membership_unique_union() {
    assert_eq!(eval_text("2 5 in iota 4"), "1 0");
    assert_eq!(eval_text("unique 3 1 3 2 1"), "3 1 2");
    assert_eq!(eval_text("1 2 union 2 3"), "1 2 3");
    assert_eq!(eval_text("1 2 2 4 intersect 2 4"), "2 2 4");
}

#[test]
fn encode_decode() {
    assert_eq!(eval_text("2 2 2 2 encode 5"), "0 1 0 1");
    assert_eq!(eval_text("2 2 2 2 decode 0 1 0 1"), "5");
    assert_eq!(eval_text("10 10 10 decode 1 2 3"), "123");
    assert_eq!(eval_text("24 60 60 decode 1 30 0"), "5400");
}

#[test]
fn grade_up_down() {
    assert_eq!(eval_text("up 30 10 20"), "2 3 1");
    assert_eq!(eval_text("down 30 10 20"), "1 3 2");
    assert_eq!(eval_text("(up 30 10 20) iota 1"), "3");
}

// ─── Indexing and assignment ─────────────────────────────────────────────────

#[test]
fn matrix_index_scenario() {
    let mut ctx = Context::new();
    let v = eval_with(&mut ctx, "A = 3 3 rho 1 2 3 4 5 6 7 8 9; A[2; 2]");
    assert_eq!(v, Value::Int(5));
    let v = eval_with(&mut ctx, "A[2;2] = 99; +/, A");
    assert_eq!(v, Value::Int(139));
}

#[test]
fn index_round_trip() {
    assert_eq!(eval_text("v = 10 20 30; v[2] = 7; v[2]"), "7");
    assert_eq!(eval_text("m = 2 2 rho iota 4; m[1;]"), "1 2");
    assert_eq!(eval_text("m = 2 2 rho iota 4; m[;2]"), "2 4");
}

#[test]
fn out_of_range_index_reports_shape() {
    assert_eq!(
        eval_err("v = 10 20 30; v[4]"),
        "index 4 out of range for shape 3"
    );
}

#[test]
fn assignments_are_quiet_and_ordered() {
    // Assignment inside the right operand lands before the left reads it.
    assert_eq!(eval_text("x = 1000; x + x = 2"), "4");
}

// ─── User-defined operators ──────────────────────────────────────────────────

#[test]
fn factorial_scenario() {
    let src = "op fact n = n <= 1: 1; n * fact n-1";
    let mut ctx = Context::new();
    ctx.run(src).unwrap();
    let v = eval_with(&mut ctx, "fact 20");
    assert_eq!(sprint(&ctx.config, &v), "2432902008176640000");
    let v = eval_with(&mut ctx, "fact 25");
    assert_eq!(sprint(&ctx.config, &v), "15511210043330985984000000");
    assert!(matches!(v, Value::Big(_)));
}

#[test]
fn user_binary_op_and_control_flow() {
    let src = "op a gcd b = b == 0: a; b gcd a mod b\n36 gcd 84";
    assert_eq!(eval_text(src), "12");
    let src = "op sum n = { t = 0; while n > 0 { t = t + n; n = n - 1 }; t }\nsum 100";
    assert_eq!(eval_text(src), "5050");
    let src = "op f x = { if x > 0 { ret 'pos' }; 'neg' }\nf 3";
    assert_eq!(eval_text(src), "pos");
}

// ─── The numeric tower at high precision ─────────────────────────────────────

#[test]
fn sqrt_two_squares_to_two_within_ulp() {
    let mut ctx = Context::new();
    let v = eval_with(&mut ctx, "(sqrt 2) * sqrt 2");
    match v {
        // Exactly 2 after shrink, or a float within an ulp of 2.
        Value::Int(2) => {}
        Value::Float(f) => {
            let two = aplite::core::bigfloat::BigFloat::from_i64(2, 256);
            let delta = f.sub(&two);
            assert!(
                delta.is_zero() || delta.exponent() < two.exponent() - 250,
                "sqrt 2 squared missed: {:?}",
                delta
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(eval_text("sqrt 2"), "1.41421356237");
}

#[test]
fn transcendental_sanity() {
    assert_eq!(eval_text("exp 0"), "1");
    assert_eq!(eval_text("log exp 1"), "1");
    assert_eq!(eval_text("2 log 8"), "3");
    assert_eq!(eval_text("floor 3.7"), "3");
    assert_eq!(eval_text("ceil 3.2"), "4");
    assert_eq!(eval_text("abs -5"), "5");
    assert_eq!(eval_text("! 5"), "120");
}

#[test]
fn complex_numbers() {
    assert_eq!(eval_text("1j2 + 3j4"), "4j6");
    assert_eq!(eval_text("1j2 * 1j2"), "-3j4");
    assert_eq!(eval_text("conj 1j2"), "1j-2");
    assert_eq!(eval_text("real 3j4"), "3");
    assert_eq!(eval_text("imag 3j4"), "4");
    assert_eq!(eval_text("sqrt -4"), "0j2");
    // A complex that lands on the real line shrinks.
    assert_eq!(eval_text("1j2 + conj 1j2"), "2");
}

#[test]
fn char_code_text_round_trips() {
    assert_eq!(eval_text("char 97"), "a");
    assert_eq!(eval_text("code 'a'"), "97");
    assert_eq!(eval_text("char code 'x'"), "x");
    assert_eq!(eval_text("text 42"), "42");
    assert_eq!(eval_text("2 text 1 / 3"), "0.33");
}

// ─── Configuration-sensitive behavior ────────────────────────────────────────

#[test]
fn origin_zero() {
    let mut config = Config::new();
    config.set_origin(0).unwrap();
    let mut ctx = Context::with_config(config);
    let v = eval_with(&mut ctx, "iota 3");
    assert_eq!(sprint(&ctx.config, &v), "0 1 2");
    let v = eval_with(&mut ctx, "v = 10 20 30; v[0]");
    assert_eq!(v, Value::Int(10));
}

#[test]
fn output_base_sixteen() {
    let mut config = Config::new();
    config.set_base(0, 16).unwrap();
    let mut ctx = Context::with_config(config);
    let v = eval_with(&mut ctx, "255");
    assert_eq!(sprint(&ctx.config, &v), "ff");
}

#[test]
fn seeded_roll_is_reproducible() {
    let run = || {
        let mut config = Config::new();
        config.set_random_seed(1234);
        let mut ctx = Context::with_config(config);
        let v = eval_with(&mut ctx, "? 10 10 10 10 10");
        sprint(&ctx.config, &v)
    };
    assert_eq!(run(), run());
}

// ─── Errors at the statement boundary ────────────────────────────────────────

#[test]
fn error_messages() {
    assert_eq!(eval_err("1 / 0"), "division by zero");
    assert_eq!(eval_err("log 0"), "log of non-positive value");
    assert_eq!(eval_err("asin 2"), "asin argument out of range");
    assert_eq!(eval_err("1 << -3"), "illegal shift count");
    assert_eq!(eval_err("'a' + 1"), "binary + not implemented on type char");
    assert_eq!(eval_err("nope"), "undefined variable \"nope\"");
}

#[test]
fn committed_assignments_survive_later_errors() {
    let mut ctx = Context::new();
    assert!(ctx.run("x = 42; 1 / 0").is_err());
    assert_eq!(ctx.global("x"), Some(&Value::Int(42)));
}

#[test]
fn a_failing_statement_does_not_stop_the_rest() {
    // Errors surface at the statement boundary and the unit keeps going.
    let mut ctx = Context::new();
    let err = ctx.run("1 / 0; x = 5; x + 1").unwrap_err();
    assert_eq!(err.to_string(), "division by zero");
    assert_eq!(ctx.global("x"), Some(&Value::Int(5)));
}

#[test]
fn statement_errors_are_reported_with_their_line() {
    let mut ctx = Context::new();
    let mut reports: Vec<(usize, String)> = Vec::new();
    let had_error = ctx.run_line("x = 3\nnope\nx * 0 - 0; log 0", |ctx, e| {
        reports.push((ctx.current_line(), e.to_string()));
    });
    assert!(had_error);
    assert_eq!(
        reports,
        vec![
            (2, "undefined variable \"nope\"".to_string()),
            (3, "log of non-positive value".to_string()),
        ]
    );
}

#[test]
fn max_bits_guard() {
    let mut config = Config::new();
    config.set_max_bits(1000);
    let mut ctx = Context::with_config(config);
    let err = ctx.run("2 ** 100000").unwrap_err().to_string();
    assert!(err.starts_with("result too large"), "{}", err);
}
