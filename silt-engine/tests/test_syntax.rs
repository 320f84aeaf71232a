//! Tests for the special forms, driven through the whole machine.
use silt_engine::{Error, Value};

fn eval(source: &str) -> silt_engine::Result<Value> {
    let mut vm = silt_engine::new_vm()?;
    vm.eval_str(source)
}

fn eval_ok(source: &str) -> Value {
    eval(source).expect("evaluation")
}

fn assert_syntax_error(source: &str) {
    match eval(source) {
        Err(Error::Syntax(_)) => {}
        other => panic!("expected a syntax error for {source:?}, got {other:?}"),
    }
}

#[test]
fn test_atom() {
    assert_eq!(eval_ok("1"), Value::Integer(1));
    assert_eq!(eval_ok("\"foo\""), Value::string("foo"));
    assert_eq!(eval_ok("#t"), Value::Bool(true));
}

#[test]
fn test_begin() {
    assert_eq!(eval_ok("(begin 1 2 3)"), Value::Integer(3));
    assert_eq!(eval_ok("(begin 1)"), Value::Integer(1));
    assert_eq!(eval_ok("(begin)"), Value::Nil);
}

#[test]
fn test_if() {
    assert_eq!(eval_ok("(if #t 1 2)"), Value::Integer(1));
    assert_eq!(eval_ok("(if #f 1 2)"), Value::Integer(2));
    assert_eq!(eval_ok("(if #t 1)"), Value::Integer(1));
    // one-armed if with a false test yields the empty list
    assert_eq!(eval_ok("(if #f 1)"), Value::Nil);

    assert_syntax_error("(if #t)");
    assert_syntax_error("(if)");
    assert_syntax_error("(if #t 1 2 3)");
}

#[test]
fn test_truthiness() {
    // only #f is false
    assert_eq!(eval_ok("(if 0 'yes 'no)"), Value::symbol("yes"));
    assert_eq!(eval_ok("(if \"\" 'yes 'no)"), Value::symbol("yes"));
    assert_eq!(eval_ok("(if '() 'yes 'no)"), Value::symbol("yes"));
}

#[test]
fn test_lambda() {
    assert_eq!(eval_ok("((lambda (x) x) 5)"), Value::Integer(5));
    assert_eq!(eval_ok("((lambda (x) (+ x 1)) 5)"), Value::Integer(6));
    assert_eq!(eval_ok("((lambda () 5))"), Value::Integer(5));
    assert_eq!(eval_ok("((lambda x (first x)) 1 2)"), Value::Integer(1));
    assert_eq!(
        eval_ok("((lambda x (first x)) 1 2 3 4 5)"),
        Value::Integer(1)
    );
    assert_eq!(eval_ok("((lambda x (first x)) 1)"), Value::Integer(1));
    assert_eq!(
        eval_ok("((lambda x x) 1 2)"),
        Value::list([1.into(), 2.into()])
    );
    assert_eq!(eval_ok("((lambda (x . y) x) 1)"), Value::Integer(1));
    assert_eq!(eval_ok("((lambda (x . y) y) 1)"), Value::Nil);
    assert_eq!(
        eval_ok("((lambda (x . y) (first y)) 1 2 3)"),
        Value::Integer(2)
    );
}

#[test]
fn test_wrong_arg_number() {
    match eval("((lambda (x y) x) 1)") {
        Err(Error::WrongArgNumber(_)) => {}
        other => panic!("expected a wrong-arg-number error, got {other:?}"),
    }
    match eval("((lambda (x . y) x))") {
        Err(Error::WrongArgNumber(_)) => {}
        other => panic!("expected a wrong-arg-number error, got {other:?}"),
    }
}

#[test]
fn test_call() {
    assert_eq!(eval_ok("(- 5 4)"), Value::Integer(1));
}

#[test]
fn test_define() {
    assert_eq!(eval_ok("(begin (define foo 5) foo)"), Value::Integer(5));
    assert_syntax_error("(define)");
    assert_syntax_error("(define foo)");
    assert_syntax_error("(define foo 5 6)");

    assert_eq!(
        eval_ok("(begin (define (foo x) x) (foo 5))"),
        Value::Integer(5)
    );
    assert_eq!(eval_ok("(begin (define (foo)) (foo))"), Value::Nil);

    assert_eq!(
        eval_ok("(begin (define (foo . x) (first x)) (foo 1))"),
        Value::Integer(1)
    );
    assert_eq!(
        eval_ok("(begin (define (foo . x) (first x)) (foo 1 2))"),
        Value::Integer(1)
    );
}

#[test]
fn test_recursive_define() {
    // the defined name is visible to its own body
    assert_eq!(
        eval_ok(
            "(begin
               (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))
               (fact 5))"
        ),
        Value::Integer(120)
    );
}

#[test]
fn test_set() {
    assert_eq!(
        eval_ok(
            "(begin
               (define foo 5)
               (define bar foo)
               (set! foo 6)
               (pair foo bar))"
        ),
        Value::cons(6.into(), 5.into())
    );
    // primitives live in ordinary slots
    assert_eq!(eval_ok("(set! pair 10)"), Value::Integer(10));

    match eval("(set! var-not-exist 10)") {
        Err(Error::UnboundVariable { name }) => assert_eq!(name, "var-not-exist"),
        other => panic!("expected an unbound-variable error, got {other:?}"),
    }
}

#[test]
fn test_unbound_variable_is_a_compile_error() {
    match eval("no-such-variable") {
        Err(Error::UnboundVariable { name }) => assert_eq!(name, "no-such-variable"),
        other => panic!("expected an unbound-variable error, got {other:?}"),
    }
}

#[test]
fn test_let() {
    assert_eq!(
        eval_ok(
            "(let ((a 3) (b 2))
               (+ a b)
               (- a b))"
        ),
        Value::Integer(1)
    );

    // init forms see the outer scope, not the new bindings
    assert_eq!(
        eval_ok(
            "(begin
               (define a 5)
               (let ((a 10) (b a))
                 (- a b)))"
        ),
        Value::Integer(5)
    );

    assert_eq!(eval_ok("(let () #t)"), Value::Bool(true));
    assert_eq!(eval_ok("(let ())"), Value::Nil);
}

#[test]
fn test_letstar() {
    // later inits see earlier bindings
    assert_eq!(
        eval_ok(
            "(let* ((a 2) (b (* a a)))
               (+ a b))"
        ),
        Value::Integer(6)
    );
}

#[test]
fn test_letrec() {
    assert_eq!(
        eval_ok(
            "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                      (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))
               (even? 10))"
        ),
        Value::Bool(true)
    );
}

#[test]
fn test_closures_capture_their_scope() {
    assert_eq!(
        eval_ok(
            "(begin
               (define (adder n) (lambda (x) (+ x n)))
               ((adder 3) 4))"
        ),
        Value::Integer(7)
    );
}

#[test]
fn test_or() {
    assert_eq!(eval_ok("(or)"), Value::Bool(false));
    assert_eq!(eval_ok("(or 1 2)"), Value::Integer(1));
    assert_eq!(eval_ok("(or #f 2)"), Value::Integer(2));
    assert_eq!(eval_ok("(or #f #f)"), Value::Bool(false));
    // short circuit: the second element is never evaluated
    assert_eq!(
        eval_ok("(begin (define hit #f) (or 1 (set! hit #t)) hit)"),
        Value::Bool(false)
    );
}

#[test]
fn test_and() {
    assert_eq!(eval_ok("(and)"), Value::Bool(true));
    assert_eq!(eval_ok("(and 1 2)"), Value::Integer(2));
    assert_eq!(eval_ok("(and #f 2)"), Value::Bool(false));
    assert_eq!(eval_ok("(and 1 #f)"), Value::Bool(false));
}

#[test]
fn test_cond() {
    assert_eq!(
        eval_ok("(cond (#f 1) (#t 2) (else 3))"),
        Value::Integer(2)
    );
    assert_eq!(eval_ok("(cond (#f 1) (else 3))"), Value::Integer(3));
    assert_eq!(eval_ok("(cond (#f 1))"), Value::Nil);
    // a clause with no body yields its test value
    assert_eq!(eval_ok("(cond (#f) (42))"), Value::Integer(42));
    // => calls the receiver with the test value
    assert_eq!(
        eval_ok("(cond ((+ 1 2) => (lambda (v) (* v 10))) (else 0))"),
        Value::Integer(30)
    );
    assert_eq!(
        eval_ok("(cond (#f => (lambda (v) v)) (else 'fell))"),
        Value::symbol("fell")
    );
    assert_syntax_error("(cond (else 1) (#t 2))");
}

#[test]
fn test_do() {
    assert_eq!(
        eval_ok(
            "(do ((i 0 (+ i 1))
                  (acc 1 (* acc (+ i 1))))
                 ((= i 5) acc))"
        ),
        Value::Integer(120)
    );
    // step expressions all see the previous iteration's values
    assert_eq!(
        eval_ok(
            "(do ((a 1 b)
                  (b 2 a)
                  (n 0 (+ n 1)))
                 ((= n 3) (pair a b)))"
        ),
        Value::cons(2.into(), 1.into())
    );
}

#[test]
fn test_quote() {
    assert_eq!(eval_ok("'()"), Value::Nil);
    assert_eq!(eval_ok("'foo"), Value::symbol("foo"));
    assert_eq!(
        eval_ok("'(1 2)"),
        Value::list([1.into(), 2.into()])
    );
    assert_eq!(eval_ok("(quote (1 . 2))"), Value::cons(1.into(), 2.into()));
}

#[test]
fn test_define_inside_body() {
    assert_eq!(
        eval_ok(
            "(begin
               (define (f x)
                 (define y 10)
                 (+ x y))
               (f 5))"
        ),
        Value::Integer(15)
    );
}

#[test]
fn test_spec_let_scenario() {
    assert_eq!(
        eval_ok("(let ((a 3) (b 2)) (+ a b) (- a b))"),
        Value::Integer(1)
    );
}
