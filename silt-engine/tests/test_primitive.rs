//! Tests for the primitive library and the prelude.
use pretty_assertions::assert_eq;
use silt_engine::{Error, Value};

fn eval(source: &str) -> silt_engine::Result<Value> {
    let mut vm = silt_engine::new_vm()?;
    vm.eval_str(source)
}

fn eval_ok(source: &str) -> Value {
    eval(source).expect("evaluation")
}

#[test]
fn test_arithmetic() {
    assert_eq!(eval_ok("(+ 1 2 3)"), Value::Integer(6));
    assert_eq!(eval_ok("(+)"), Value::Integer(0));
    assert_eq!(eval_ok("(*)"), Value::Integer(1));
    assert_eq!(eval_ok("(* 2 3 4)"), Value::Integer(24));
    assert_eq!(eval_ok("(- 5)"), Value::Integer(-5));
    assert_eq!(eval_ok("(- 10 1 2)"), Value::Integer(7));
    assert_eq!(eval_ok("(+ 1 0.5)"), Value::Real(1.5));
}

#[test]
fn test_division_is_real() {
    // integer division coerces to real
    assert_eq!(eval_ok("(/ 1 2)"), Value::Real(0.5));
    assert_eq!(eval_ok("(/ 4 2)"), Value::Real(2.0));
    assert_eq!(eval_ok("(/ 2)"), Value::Real(0.5));
    assert!(matches!(eval("(/ 1 0)"), Err(Error::Misc(_))));
}

#[test]
fn test_comparison() {
    assert_eq!(eval_ok("(= 1 1 1)"), Value::Bool(true));
    assert_eq!(eval_ok("(= 1 1.0)"), Value::Bool(true));
    assert_eq!(eval_ok("(= 1 2)"), Value::Bool(false));
    assert_eq!(eval_ok("(< 1 2 3)"), Value::Bool(true));
    assert_eq!(eval_ok("(< 1 3 2)"), Value::Bool(false));
    assert_eq!(eval_ok("(> 3 2 1)"), Value::Bool(true));
    assert_eq!(eval_ok("(<= 1 1 2)"), Value::Bool(true));
    assert_eq!(eval_ok("(>= 2 2 1)"), Value::Bool(true));
}

#[test]
fn test_wrong_arg_type() {
    assert!(matches!(eval("(+ 1 'a)"), Err(Error::WrongArgType(_))));
    assert!(matches!(eval("(car 5)"), Err(Error::WrongArgType(_))));
}

#[test]
fn test_pairs() {
    assert_eq!(eval_ok("(car '(1 2))"), Value::Integer(1));
    assert_eq!(eval_ok("(cdr '(1 2))"), Value::list([2.into()]));
    assert_eq!(eval_ok("(cons 1 2)"), Value::cons(1.into(), 2.into()));
    assert_eq!(eval_ok("(first (rest '(1 2 3)))"), Value::Integer(2));
    assert_eq!(
        eval_ok("(begin (define p (cons 1 2)) (set-car! p 9) p)"),
        Value::cons(9.into(), 2.into())
    );
    assert_eq!(
        eval_ok("(begin (define p (cons 1 2)) (set-cdr! p 9) p)"),
        Value::cons(1.into(), 9.into())
    );
}

#[test]
fn test_list_ops() {
    assert_eq!(
        eval_ok("(list 1 2 3)"),
        Value::list([1.into(), 2.into(), 3.into()])
    );
    assert_eq!(eval_ok("(null? '())"), Value::Bool(true));
    assert_eq!(eval_ok("(null? '(1))"), Value::Bool(false));
    assert_eq!(eval_ok("(list? '(1 2))"), Value::Bool(true));
    assert_eq!(eval_ok("(list? '(1 . 2))"), Value::Bool(false));
    // list? detects circular chains
    assert_eq!(
        eval_ok("(begin (define c (list 1 2)) (set-cdr! (cdr c) c) (list? c))"),
        Value::Bool(false)
    );
}

#[test]
fn test_predicates() {
    assert_eq!(eval_ok("(boolean? #f)"), Value::Bool(true));
    assert_eq!(eval_ok("(symbol? 'a)"), Value::Bool(true));
    assert_eq!(eval_ok("(string? \"a\")"), Value::Bool(true));
    assert_eq!(eval_ok("(pair? '(1))"), Value::Bool(true));
    assert_eq!(eval_ok("(pair? '())"), Value::Bool(false));
    assert_eq!(eval_ok("(number? 1.5)"), Value::Bool(true));
    assert_eq!(eval_ok("(integer? 1)"), Value::Bool(true));
    assert_eq!(eval_ok("(integer? 1.0)"), Value::Bool(false));
    assert_eq!(eval_ok("(procedure? car)"), Value::Bool(true));
    assert_eq!(eval_ok("(procedure? (lambda (x) x))"), Value::Bool(true));
    assert_eq!(eval_ok("(exact? 1)"), Value::Bool(true));
    assert_eq!(eval_ok("(exact? 1.0)"), Value::Bool(false));
    assert_eq!(eval_ok("(inexact? 1.5)"), Value::Bool(true));
}

#[test]
fn test_numeric_predicates() {
    assert_eq!(eval_ok("(zero? 0)"), Value::Bool(true));
    assert_eq!(eval_ok("(zero? 0.0)"), Value::Bool(true));
    assert_eq!(eval_ok("(positive? 3)"), Value::Bool(true));
    assert_eq!(eval_ok("(negative? -3)"), Value::Bool(true));
    assert_eq!(eval_ok("(even? 4)"), Value::Bool(true));
    assert_eq!(eval_ok("(odd? 3)"), Value::Bool(true));
}

#[test]
fn test_integer_ops() {
    assert_eq!(eval_ok("(quotient 7 2)"), Value::Integer(3));
    assert_eq!(eval_ok("(remainder -7 2)"), Value::Integer(-1));
    assert_eq!(eval_ok("(modulo -7 2)"), Value::Integer(1));
    assert_eq!(eval_ok("(gcd 12 18)"), Value::Integer(6));
    assert_eq!(eval_ok("(lcm 4 6)"), Value::Integer(12));
    assert_eq!(eval_ok("(max 1 3 2)"), Value::Integer(3));
    assert_eq!(eval_ok("(min 3 1 2)"), Value::Integer(1));
    assert_eq!(eval_ok("(abs -4)"), Value::Integer(4));
    assert_eq!(eval_ok("(expt 2 10)"), Value::Integer(1024));
}

#[test]
fn test_real_ops() {
    assert_eq!(eval_ok("(floor 1.7)"), Value::Real(1.0));
    assert_eq!(eval_ok("(ceiling 1.2)"), Value::Real(2.0));
    assert_eq!(eval_ok("(truncate -1.7)"), Value::Real(-1.0));
    assert_eq!(eval_ok("(sqrt 9)"), Value::Real(3.0));
    assert_eq!(eval_ok("(exp 0)"), Value::Real(1.0));
    assert_eq!(eval_ok("(sin 0)"), Value::Real(0.0));
    assert_eq!(eval_ok("(atan 0)"), Value::Real(0.0));
}

#[test]
fn test_equality() {
    assert_eq!(eval_ok("(equal? '(1 2) '(1 2))"), Value::Bool(true));
    assert_eq!(eval_ok("(eq? (list 1 2) (list 1 2))"), Value::Bool(false));
    assert_eq!(
        eval_ok("(begin (define p '(1 2)) (eq? p p))"),
        Value::Bool(true)
    );
    assert_eq!(eval_ok("(eqv? 'a 'a)"), Value::Bool(true));
    assert_eq!(eval_ok("(eqv? 1 1)"), Value::Bool(true));
    assert_eq!(eval_ok("(not #f)"), Value::Bool(true));
    assert_eq!(eval_ok("(not '())"), Value::Bool(false));
}

#[test]
fn test_apply() {
    assert_eq!(eval_ok("(apply + '(1 2 3))"), Value::Integer(6));
    assert_eq!(eval_ok("(apply + 1 2 '(3 4))"), Value::Integer(10));
    assert_eq!(
        eval_ok("(begin (define (add a b) (+ a b)) (apply add '(1 2)))"),
        Value::Integer(3)
    );
    assert!(matches!(eval("(apply + 1 2)"), Err(Error::WrongArgType(_))));
}

#[test]
fn test_map() {
    assert_eq!(
        eval_ok("(map + '(1 2) '(3 4))"),
        Value::list([4.into(), 6.into()])
    );
    assert_eq!(
        eval_ok("(map (lambda (x) (* x x)) '(1 2 3))"),
        Value::list([1.into(), 4.into(), 9.into()])
    );
    assert!(matches!(eval("(map + '(1 2) '(3))"), Err(Error::Misc(_))));
}

#[test]
fn test_overlapped_context_switch() {
    // machine -> native apply -> machine
    assert_eq!(
        eval_ok(
            "(begin
               (define (myadd a b) (+ a b))
               (define (foo n)
                 (apply myadd '(1 2))
                 (+ n 4))
               (foo 10))"
        ),
        Value::Integer(14)
    );
}

#[test]
fn test_strings_and_symbols() {
    assert_eq!(eval_ok("(string->symbol \"abc\")"), Value::symbol("abc"));
    assert_eq!(eval_ok("(symbol->string 'abc)"), Value::string("abc"));
    assert_eq!(
        eval_ok("(string-append \"foo\" \"-\" \"bar\")"),
        Value::string("foo-bar")
    );
    assert_eq!(eval_ok("(number->string 42)"), Value::string("42"));
    assert_eq!(eval_ok("(number->string 255 16)"), Value::string("FF"));
    assert_eq!(eval_ok("(number->string -5 2)"), Value::string("-101"));
    assert_eq!(eval_ok("(string->number \"42\")"), Value::Integer(42));
    assert_eq!(eval_ok("(string->number \"2.5\")"), Value::Real(2.5));
    assert_eq!(eval_ok("(string->number \"FF\" 16)"), Value::Integer(255));
    assert_eq!(eval_ok("(string->number \"bogus\")"), Value::Bool(false));
}

#[test]
fn test_prelude() {
    assert_eq!(eval_ok("(cadr '(1 2 3))"), Value::Integer(2));
    assert_eq!(eval_ok("(caddr '(1 2 3))"), Value::Integer(3));
    assert_eq!(eval_ok("(length '(1 2 3))"), Value::Integer(3));
    assert_eq!(eval_ok("(length '())"), Value::Integer(0));
    assert_eq!(
        eval_ok("(append '(1 2) '(3 4))"),
        Value::list([1.into(), 2.into(), 3.into(), 4.into()])
    );
    assert_eq!(
        eval_ok("(reverse '(1 2 3))"),
        Value::list([3.into(), 2.into(), 1.into()])
    );
    assert_eq!(
        eval_ok("(member 2 '(1 2 3))"),
        Value::list([2.into(), 3.into()])
    );
    assert_eq!(eval_ok("(member 9 '(1 2 3))"), Value::Bool(false));
    assert_eq!(
        eval_ok("(assq 'b '((a 1) (b 2)))"),
        Value::list([Value::symbol("b"), 2.into()])
    );
}

#[test]
fn test_complex_numbers() {
    assert_eq!(eval_ok("(complex? 3+4i)"), Value::Bool(true));
    assert_eq!(eval_ok("(real? 3+4i)"), Value::Bool(false));
    assert_eq!(
        eval_ok("(+ 3+4i 1)"),
        Value::Complex(num_complex::Complex64::new(4.0, 4.0))
    );
}
