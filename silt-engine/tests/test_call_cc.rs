//! Continuation capture and restore.
use silt_engine::{Value, Vm};

fn eval(vm: &mut Vm, source: &str) -> Value {
    vm.eval_str(source).expect("evaluation")
}

#[test]
fn test_unused_continuation() {
    let mut vm = silt_engine::new_vm().unwrap();
    // when k is never invoked, call/cc yields the body's value
    assert_eq!(
        eval(&mut vm, "(call/cc (lambda (k) 42))"),
        Value::Integer(42)
    );
}

#[test]
fn test_escape() {
    let mut vm = silt_engine::new_vm().unwrap();
    // invoking k abandons the rest of the body
    assert_eq!(
        eval(&mut vm, "(+ 1 (call/cc (lambda (k) (k 10) 999)))"),
        Value::Integer(11)
    );
}

#[test]
fn test_escape_from_deep_recursion() {
    let mut vm = silt_engine::new_vm().unwrap();
    assert_eq!(
        eval(
            &mut vm,
            "(begin
               (define (walk lst abort)
                 (if (null? lst)
                     0
                     (if (equal? (first lst) 'stop)
                         (abort 'found)
                         (walk (rest lst) abort))))
               (call/cc (lambda (k) (walk '(1 2 stop 4) k))))"
        ),
        Value::symbol("found")
    );
}

#[test]
fn test_reentrant_continuation() {
    let mut vm = silt_engine::new_vm().unwrap();
    eval(&mut vm, "(define return #f)");
    assert_eq!(
        eval(
            &mut vm,
            "(+ 1 (call/cc
                    (lambda (cont)
                      (set! return cont)
                      1)))"
        ),
        Value::Integer(2)
    );
    // the saved continuation re-enters the finished computation
    assert_eq!(eval(&mut vm, "(return 22)"), Value::Integer(23));
    // and it is multi-shot
    assert_eq!(eval(&mut vm, "(return 100)"), Value::Integer(101));
}

#[test]
fn test_continuation_is_a_value() {
    let mut vm = silt_engine::new_vm().unwrap();
    eval(
        &mut vm,
        "(define k (call/cc (lambda (c) c)))",
    );
    let k = vm.get("k").unwrap();
    assert!(matches!(k, Value::Continuation(_)));
}

#[test]
fn test_call_cc_long_name() {
    let mut vm = silt_engine::new_vm().unwrap();
    assert_eq!(
        eval(
            &mut vm,
            "(call-with-current-continuation (lambda (k) (k 7)))"
        ),
        Value::Integer(7)
    );
}
