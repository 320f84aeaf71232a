//! Tests for syntax-rules transformation alone, without the lexical
//! scoping machinery: captured-fragment closures are stripped from the
//! rewritten expression before comparing.
use silt_engine::{parse, Env, Error, Handle, Macro, Value};

/// Unwrap symbol and dynamic closures back to plain expressions.
fn strip(value: &Value) -> Value {
    match value {
        Value::DynamicClosure(dc) => strip(&dc.borrow().expr().clone()),
        Value::SymbolClosure(sc) => Value::Symbol(sc.borrow().symbol()),
        Value::Pair(_) => {
            let (first, rest) = value.uncons().unwrap();
            Value::cons(strip(&first), strip(&rest))
        }
        other => other.clone(),
    }
}

fn mac(rules: &str) -> Macro {
    let env = Handle::new(Env::new());
    Macro::new(env, &parse(rules).expect("parse macro")).expect("compile macro")
}

fn trans(mac: &Macro, form: &str) -> silt_engine::Result<Value> {
    let env = Handle::new(Env::new());
    mac.transform(&env, &parse(form).expect("parse form"))
        .map(|(expansion, _closures)| strip(&expansion))
}

fn trans_ok(mac: &Macro, form: &str) -> Value {
    trans(mac, form).expect("transform")
}

fn assert_no_match(mac: &Macro, form: &str) {
    match trans(mac, form) {
        Err(Error::Syntax(_)) => {}
        other => panic!("expected no rule to match {form:?}, got {other:?}"),
    }
}

fn sexp(text: &str) -> Value {
    parse(text).expect("parse expected value")
}

#[test]
fn test_variable() {
    let m = mac("(() ((_ a) a))");
    assert_eq!(trans_ok(&m, "(_ 5)"), Value::Integer(5));
    assert_eq!(trans_ok(&m, "(_ (1 2))"), sexp("(1 2)"));
    assert_no_match(&m, "(_ 1 2)");
}

#[test]
fn test_constant() {
    let m = mac("(() ((_ 0 a b) a) ((_ 1 a b) b))");
    assert_eq!(trans_ok(&m, "(_ 0 5 6)"), Value::Integer(5));
    assert_eq!(trans_ok(&m, "(_ 1 5 6)"), Value::Integer(6));
    assert_no_match(&m, "(_ 2 5 6)");
}

#[test]
fn test_underscore() {
    let m = mac("(() ((_ _ b) b))");
    assert_eq!(trans_ok(&m, "(_ 1 2)"), Value::Integer(2));
    assert_no_match(&m, "(_ 1)");
}

#[test]
fn test_proper_list() {
    let m = mac("(() ((_ a) a) ((_ a b) b) ((_ a b c) c))");
    assert_eq!(trans_ok(&m, "(_ 1)"), Value::Integer(1));
    assert_eq!(trans_ok(&m, "(_ 1 2)"), Value::Integer(2));
    assert_eq!(trans_ok(&m, "(_ 1 2 3)"), Value::Integer(3));
    assert_no_match(&m, "(_)");
}

#[test]
fn test_improper_list() {
    let m = mac("(() ((_ a . b) b))");
    assert_eq!(trans_ok(&m, "(_ 1)"), Value::Nil);
    assert_eq!(trans_ok(&m, "(_ 1 2)"), sexp("(2)"));
    assert_eq!(trans_ok(&m, "(_ 1 . 2)"), Value::Integer(2));
    assert_eq!(trans_ok(&m, "(_ 1 . (2 3))"), sexp("(2 3)"));
    assert_no_match(&m, "(_)");

    let m = mac("(() ((_ a . 2) a))");
    assert_eq!(trans_ok(&m, "(_ 5 . 2)"), Value::Integer(5));
    assert_no_match(&m, "(_ 5 2)");
    assert_no_match(&m, "(_ 5 . 3)");
}

#[test]
fn test_variable_ellipsis() {
    let m = mac("(() ((_ a ...) ((a) ...)))");
    assert_eq!(trans_ok(&m, "(_)"), Value::Nil);
    assert_eq!(trans_ok(&m, "(_ 1)"), sexp("((1))"));
    assert_eq!(trans_ok(&m, "(_ 1 2)"), sexp("((1) (2))"));
    assert_no_match(&m, "(_ 1 . 2)");
}

#[test]
fn test_constant_ellipsis() {
    let m = mac("(() ((_ a b 2 ...) a) ((_ a b 2 ... c) b))");
    assert_eq!(trans_ok(&m, "(_ 5 6)"), Value::Integer(5));
    assert_eq!(trans_ok(&m, "(_ 5 6 2)"), Value::Integer(5));
    assert_eq!(trans_ok(&m, "(_ 5 6 2 2)"), Value::Integer(5));
    assert_eq!(trans_ok(&m, "(_ 5 6 3)"), Value::Integer(6));
    assert_eq!(trans_ok(&m, "(_ 5 6 2 3)"), Value::Integer(6));
    assert_eq!(trans_ok(&m, "(_ 5 6 2 2 3)"), Value::Integer(6));
}

#[test]
fn test_sequence_ellipsis() {
    let m = mac("(() ((_ (a b) ...) (a ... b ...)))");
    assert_eq!(trans_ok(&m, "(_)"), Value::Nil);
    assert_eq!(trans_ok(&m, "(_ (1 2))"), sexp("(1 2)"));
    assert_eq!(trans_ok(&m, "(_ (1 2) (3 4))"), sexp("(1 3 2 4)"));
}

#[test]
fn test_nested_ellipsis() {
    let m = mac("(() ((_ (a ...) ...) ((a) ... ...)))");
    assert_eq!(trans_ok(&m, "(_)"), Value::Nil);
    assert_eq!(trans_ok(&m, "(_ ())"), Value::Nil);
    assert_eq!(trans_ok(&m, "(_ (1))"), sexp("((1))"));
    assert_eq!(trans_ok(&m, "(_ (1 2))"), sexp("((1) (2))"));
    assert_eq!(trans_ok(&m, "(_ (1 2) (3))"), sexp("((1) (2) (3))"));
    assert_eq!(trans_ok(&m, "(_ (1 2) () (3))"), sexp("((1) (2) (3))"));
}

#[test]
fn test_combined_ellipsis() {
    let m = mac("(() ((_ (a ...) (b ...)) ((a b) ...)))");
    assert_eq!(trans_ok(&m, "(_ () ())"), Value::Nil);
    assert_eq!(trans_ok(&m, "(_ (1 2) (3 4))"), sexp("((1 3) (2 4))"));
    // sibling ellipsis variables must agree on a repetition count
    assert!(trans(&m, "(_ (1) (3 4))").is_err());
    assert!(trans(&m, "(_ (1 2) (3))").is_err());
}

// R5RS doesn't require this, but the engine supports ellipsis in front
// of an improper tail.
#[test]
fn test_ellipsis_with_improper_tail() {
    let m = mac("(() ((_ a ... . b) b))");
    assert_eq!(trans_ok(&m, "(_ . 6)"), Value::Integer(6));
    assert_eq!(trans_ok(&m, "(_ 5 . 6)"), Value::Integer(6));
    assert_eq!(trans_ok(&m, "(_ 5 6 . 6)"), Value::Integer(6));
}

#[test]
fn test_first_matching_rule_wins() {
    let m = mac("(() ((_ a) 'one) ((_ a ...) 'many))");
    assert_eq!(trans_ok(&m, "(_ 1)"), sexp("(quote one)"));
    assert_eq!(trans_ok(&m, "(_ 1 2)"), sexp("(quote many)"));
}
