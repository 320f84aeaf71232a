//! Core primitive library.
use std::cmp::Ordering;
use std::rc::Rc;

use num_complex::Complex64;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::parser;
use crate::proc::Primitive;
use crate::symbol::Symbol;
use crate::value::{Pair, Value};
use crate::vm::Vm;

/// List helpers derived from the primitives, loaded by `new_vm`.
pub(crate) const PRELUDE: &str = r"
(begin
  (define (cadr lst) (car (cdr lst)))
  (define (caddr lst) (car (cdr (cdr lst))))
  (define (length lst)
    (if (null? lst) 0 (+ 1 (length (cdr lst)))))
  (define (append a b)
    (if (null? a) b (cons (car a) (append (cdr a) b))))
  (define (reverse lst)
    (do ((rest lst (cdr rest))
         (acc '() (cons (car rest) acc)))
        ((null? rest) acc)))
  (define (member x lst)
    (cond ((null? lst) #f)
          ((equal? x (car lst)) lst)
          (else (member x (cdr lst)))))
  (define (assq x lst)
    (cond ((null? lst) #f)
          ((eq? x (car (car lst))) (car lst))
          (else (assq x (cdr lst))))))
";

/// Load the primitive library into an environment.
pub fn load_primitives(env: &Handle<Env>) {
    def(env, "+", (-1, -1), prim_add);
    def(env, "-", (1, -1), prim_sub);
    def(env, "*", (-1, -1), prim_mul);
    def(env, "/", (1, -1), prim_div);
    def(env, "=", (-1, -1), prim_num_equal);
    def(env, "<", (2, -1), prim_less);
    def(env, ">", (2, -1), prim_more);
    def(env, "<=", (2, -1), prim_less_equal);
    def(env, ">=", (2, -1), prim_more_equal);

    def(env, "equal?", (2, 2), prim_equal);
    def(env, "eq?", (2, 2), prim_eqv);
    def(env, "eqv?", (2, 2), prim_eqv);
    def(env, "not", (1, 1), prim_not);

    def(env, "first", (1, 1), prim_first);
    def(env, "rest", (1, 1), prim_rest);
    def(env, "pair", (2, 2), prim_pair);
    def(env, "car", (1, 1), prim_first);
    def(env, "cdr", (1, 1), prim_rest);
    def(env, "cons", (2, 2), prim_pair);
    def(env, "set-first!", (2, 2), prim_set_first);
    def(env, "set-car!", (2, 2), prim_set_first);
    def(env, "set-rest!", (2, 2), prim_set_rest);
    def(env, "set-cdr!", (2, 2), prim_set_rest);
    def(env, "list", (-1, -1), prim_list);
    def(env, "null?", (1, 1), prim_null_p);
    def(env, "list?", (1, 1), prim_list_p);

    predicate(env, "boolean?", |v| matches!(v, Value::Bool(_)));
    predicate(env, "pair?", |v| matches!(v, Value::Pair(_)));
    predicate(env, "symbol?", |v| matches!(v, Value::Symbol(_)));
    predicate(env, "string?", |v| matches!(v, Value::Str(_)));
    predicate(env, "number?", |v| {
        matches!(v, Value::Integer(_) | Value::Real(_) | Value::Complex(_))
    });
    predicate(env, "rational?", |v| {
        matches!(v, Value::Integer(_) | Value::Real(_))
    });
    predicate(env, "real?", |v| {
        matches!(v, Value::Integer(_) | Value::Real(_))
    });
    predicate(env, "complex?", |v| {
        matches!(v, Value::Integer(_) | Value::Real(_) | Value::Complex(_))
    });
    predicate(env, "integer?", |v| matches!(v, Value::Integer(_)));
    predicate(env, "procedure?", |v| {
        matches!(v, Value::Procedure(_) | Value::Primitive(_))
    });

    def(env, "exact?", (1, 1), prim_exact_p);
    def(env, "inexact?", (1, 1), prim_inexact_p);
    def(env, "zero?", (1, 1), prim_zero_p);
    def(env, "positive?", (1, 1), prim_positive_p);
    def(env, "negative?", (1, 1), prim_negative_p);
    def(env, "even?", (1, 1), prim_even_p);
    def(env, "odd?", (1, 1), prim_odd_p);
    def(env, "max", (1, -1), prim_max);
    def(env, "min", (1, -1), prim_min);
    def(env, "abs", (1, 1), prim_abs);
    def(env, "quotient", (2, 2), prim_quotient);
    def(env, "modulo", (2, 2), prim_modulo);
    def(env, "remainder", (2, 2), prim_remainder);
    def(env, "gcd", (-1, -1), prim_gcd);
    def(env, "lcm", (-1, -1), prim_lcm);
    def(env, "floor", (1, 1), |_, args| round_prim(args, f64::floor));
    def(env, "ceiling", (1, 1), |_, args| round_prim(args, f64::ceil));
    def(env, "truncate", (1, 1), |_, args| round_prim(args, f64::trunc));
    def(env, "round", (1, 1), |_, args| round_prim(args, f64::round));
    def(env, "sqrt", (1, 1), prim_sqrt);
    def(env, "expt", (2, 2), prim_expt);
    def(env, "exp", (1, 1), |_, args| real_prim(args, f64::exp));
    def(env, "log", (1, 1), |_, args| real_prim(args, f64::ln));
    def(env, "sin", (1, 1), |_, args| real_prim(args, f64::sin));
    def(env, "cos", (1, 1), |_, args| real_prim(args, f64::cos));
    def(env, "tan", (1, 1), |_, args| real_prim(args, f64::tan));
    def(env, "asin", (1, 1), |_, args| real_prim(args, f64::asin));
    def(env, "acos", (1, 1), |_, args| real_prim(args, f64::acos));
    def(env, "atan", (1, 2), prim_atan);

    def(env, "apply", (1, -1), prim_apply);
    def(env, "map", (2, -1), prim_map);

    def(env, "string->symbol", (1, 1), prim_string_to_symbol);
    def(env, "symbol->string", (1, 1), prim_symbol_to_string);
    def(env, "number->string", (1, 2), prim_number_to_string);
    def(env, "string->number", (1, 2), prim_string_to_number);
    def(env, "string-append", (-1, -1), prim_string_append);
}

fn def(
    env: &Handle<Env>,
    name: &str,
    arity: (isize, isize),
    func: impl Fn(&mut Vm, &[Value]) -> Result<Value> + 'static,
) {
    env.borrow_mut().insert(
        Symbol::intern(name),
        Value::Primitive(Rc::new(Primitive::new(name, arity, func))),
    );
}

fn predicate(env: &Handle<Env>, name: &str, test: fn(&Value) -> bool) {
    def(env, name, (1, 1), move |_, args| Ok(Value::Bool(test(&args[0]))));
}

// ---------------------------------------------------------------------
// Numbers

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Real(f64),
    Complex(Complex64),
}

impl Num {
    fn value(self) -> Value {
        match self {
            Num::Int(n) => Value::Integer(n),
            Num::Real(n) => Value::Real(n),
            Num::Complex(n) => Value::Complex(n),
        }
    }
}

fn number(value: &Value) -> Result<Num> {
    match value {
        Value::Integer(n) => Ok(Num::Int(*n)),
        Value::Real(n) => Ok(Num::Real(*n)),
        Value::Complex(n) => Ok(Num::Complex(*n)),
        other => Err(Error::WrongArgType(format!(
            "expecting a number, but got {}",
            other.repr()
        ))),
    }
}

fn real(value: &Value) -> Result<f64> {
    match value {
        Value::Integer(n) => Ok(*n as f64),
        Value::Real(n) => Ok(*n),
        other => Err(Error::WrongArgType(format!(
            "expecting a real number, but got {}",
            other.repr()
        ))),
    }
}

fn integer(value: &Value) -> Result<i64> {
    value.as_integer().ok_or_else(|| {
        Error::WrongArgType(format!("expecting an integer, but got {}", value.repr()))
    })
}

/// Promote both operands to their common tier.
fn promote(a: Num, b: Num) -> (Num, Num) {
    use Num::*;
    match (a, b) {
        (Int(_), Int(_)) | (Real(_), Real(_)) | (Complex(_), Complex(_)) => (a, b),
        (Int(x), Real(y)) => (Real(x as f64), Real(y)),
        (Real(x), Int(y)) => (Real(x), Real(y as f64)),
        (x, Complex(y)) => (Complex(complexify(x)), Complex(y)),
        (Complex(x), y) => (Complex(x), Complex(complexify(y))),
    }
}

fn complexify(n: Num) -> Complex64 {
    match n {
        Num::Int(x) => Complex64::new(x as f64, 0.0),
        Num::Real(x) => Complex64::new(x, 0.0),
        Num::Complex(x) => x,
    }
}

fn overflow() -> Error {
    Error::Misc("integer overflow".to_string())
}

fn num_add(a: Num, b: Num) -> Result<Num> {
    use Num::*;
    Ok(match promote(a, b) {
        (Int(x), Int(y)) => Int(x.checked_add(y).ok_or_else(overflow)?),
        (Real(x), Real(y)) => Real(x + y),
        (Complex(x), Complex(y)) => Complex(x + y),
        _ => unreachable!(),
    })
}

fn num_sub(a: Num, b: Num) -> Result<Num> {
    use Num::*;
    Ok(match promote(a, b) {
        (Int(x), Int(y)) => Int(x.checked_sub(y).ok_or_else(overflow)?),
        (Real(x), Real(y)) => Real(x - y),
        (Complex(x), Complex(y)) => Complex(x - y),
        _ => unreachable!(),
    })
}

fn num_mul(a: Num, b: Num) -> Result<Num> {
    use Num::*;
    Ok(match promote(a, b) {
        (Int(x), Int(y)) => Int(x.checked_mul(y).ok_or_else(overflow)?),
        (Real(x), Real(y)) => Real(x * y),
        (Complex(x), Complex(y)) => Complex(x * y),
        _ => unreachable!(),
    })
}

/// Division never stays on integers: integer operands are coerced to
/// reals first.
fn num_div(a: Num, b: Num) -> Result<Num> {
    use Num::*;
    let a = match a {
        Int(x) => Real(x as f64),
        other => other,
    };
    Ok(match promote(a, b) {
        (Real(x), Real(y)) => {
            if y == 0.0 {
                return Err(Error::Misc("division by zero".to_string()));
            }
            Real(x / y)
        }
        (Complex(x), Complex(y)) => {
            if y == Complex64::new(0.0, 0.0) {
                return Err(Error::Misc("division by zero".to_string()));
            }
            Complex(x / y)
        }
        _ => unreachable!(),
    })
}

fn num_eq(a: Num, b: Num) -> bool {
    use Num::*;
    match promote(a, b) {
        (Int(x), Int(y)) => x == y,
        (Real(x), Real(y)) => x == y,
        (Complex(x), Complex(y)) => x == y,
        _ => unreachable!(),
    }
}

/// Ordering is defined on reals only.
fn num_cmp(a: &Value, b: &Value) -> Result<Ordering> {
    let x = real(a)?;
    let y = real(b)?;
    x.partial_cmp(&y)
        .ok_or_else(|| Error::Misc("numbers cannot be ordered".to_string()))
}

fn prim_add(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut sum = Num::Int(0);
    for arg in args {
        sum = num_add(sum, number(arg)?)?;
    }
    Ok(sum.value())
}

fn prim_mul(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut product = Num::Int(1);
    for arg in args {
        product = num_mul(product, number(arg)?)?;
    }
    Ok(product.value())
}

fn prim_sub(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut acc = number(&args[0])?;
    if args.len() == 1 {
        return Ok(num_sub(Num::Int(0), acc)?.value());
    }
    for arg in &args[1..] {
        acc = num_sub(acc, number(arg)?)?;
    }
    Ok(acc.value())
}

fn prim_div(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut acc = number(&args[0])?;
    if args.len() == 1 {
        return Ok(num_div(Num::Int(1), acc)?.value());
    }
    for arg in &args[1..] {
        acc = num_div(acc, number(arg)?)?;
    }
    Ok(acc.value())
}

fn prim_num_equal(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    if args.len() < 2 {
        return Ok(Value::Bool(true));
    }
    let first = number(&args[0])?;
    for arg in &args[1..] {
        if !num_eq(first, number(arg)?) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn chain_compare(args: &[Value], accept: fn(Ordering) -> bool) -> Result<Value> {
    for window in args.windows(2) {
        if !accept(num_cmp(&window[0], &window[1])?) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn prim_less(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    chain_compare(args, Ordering::is_lt)
}

fn prim_more(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    chain_compare(args, Ordering::is_gt)
}

fn prim_less_equal(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    chain_compare(args, Ordering::is_le)
}

fn prim_more_equal(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    chain_compare(args, Ordering::is_ge)
}

fn prim_zero_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(num_eq(number(&args[0])?, Num::Int(0))))
}

fn prim_positive_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(real(&args[0])? > 0.0))
}

fn prim_negative_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(real(&args[0])? < 0.0))
}

fn prim_even_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(integer(&args[0])? % 2 == 0))
}

fn prim_odd_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(integer(&args[0])? % 2 != 0))
}

fn prim_exact_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    match number(&args[0])? {
        Num::Int(_) => Ok(Value::Bool(true)),
        // reals and complexes are always inexact here
        _ => Ok(Value::Bool(false)),
    }
}

fn prim_inexact_p(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    match prim_exact_p(vm, args)? {
        Value::Bool(exact) => Ok(Value::Bool(!exact)),
        _ => unreachable!(),
    }
}

fn extremum(args: &[Value], accept: fn(Ordering) -> bool) -> Result<Value> {
    let mut best = args[0].clone();
    real(&best)?;
    for arg in &args[1..] {
        if accept(num_cmp(arg, &best)?) {
            best = arg.clone();
        }
    }
    Ok(best)
}

fn prim_max(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    extremum(args, Ordering::is_gt)
}

fn prim_min(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    extremum(args, Ordering::is_lt)
}

fn prim_abs(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    match number(&args[0])? {
        Num::Int(n) => Ok(Value::Integer(n.checked_abs().ok_or_else(overflow)?)),
        Num::Real(n) => Ok(Value::Real(n.abs())),
        Num::Complex(n) => Ok(Value::Real(n.norm())),
    }
}

fn int_div_args(args: &[Value]) -> Result<(i64, i64)> {
    let a = integer(&args[0])?;
    let b = integer(&args[1])?;
    if b == 0 {
        return Err(Error::Misc("division by zero".to_string()));
    }
    Ok((a, b))
}

fn prim_quotient(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let (a, b) = int_div_args(args)?;
    Ok(Value::Integer(a / b))
}

/// The result takes the sign of the divisor.
fn prim_modulo(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let (a, b) = int_div_args(args)?;
    Ok(Value::Integer(((a % b) + b) % b))
}

/// The result takes the sign of the dividend.
fn prim_remainder(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let (a, b) = int_div_args(args)?;
    Ok(Value::Integer(a % b))
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn prim_gcd(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut acc: i64 = 0;
    for arg in args {
        acc = gcd(acc, integer(arg)?);
    }
    Ok(Value::Integer(acc.abs()))
}

fn prim_lcm(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut acc: i64 = 1;
    for arg in args {
        let n = integer(arg)?;
        if n == 0 {
            return Ok(Value::Integer(0));
        }
        acc = (acc / gcd(acc, n)).checked_mul(n).ok_or_else(overflow)?;
    }
    Ok(Value::Integer(acc.abs()))
}

fn round_prim(args: &[Value], op: fn(f64) -> f64) -> Result<Value> {
    match number(&args[0])? {
        Num::Int(n) => Ok(Value::Integer(n)),
        Num::Real(n) => Ok(Value::Real(op(n))),
        Num::Complex(_) => Err(Error::WrongArgType(
            "expecting a real number, but got a complex".to_string(),
        )),
    }
}

fn real_prim(args: &[Value], op: fn(f64) -> f64) -> Result<Value> {
    Ok(Value::Real(op(real(&args[0])?)))
}

fn prim_sqrt(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    match number(&args[0])? {
        Num::Complex(n) => Ok(Value::Complex(n.sqrt())),
        n => Ok(Value::Real(complexify(n).re.sqrt())),
    }
}

fn prim_expt(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let base = number(&args[0])?;
    let exponent = number(&args[1])?;
    match (base, exponent) {
        (Num::Int(b), Num::Int(e)) if (0..=u32::MAX as i64).contains(&e) => Ok(Value::Integer(
            b.checked_pow(e as u32).ok_or_else(overflow)?,
        )),
        (Num::Complex(b), e) => Ok(Value::Complex(b.powc(complexify(e)))),
        (b, Num::Complex(e)) => Ok(Value::Complex(complexify(b).powc(e))),
        (b, e) => Ok(Value::Real(complexify(b).re.powf(complexify(e).re))),
    }
}

fn prim_atan(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let y = real(&args[0])?;
    match args.get(1) {
        Some(x) => Ok(Value::Real(y.atan2(real(x)?))),
        None => Ok(Value::Real(y.atan())),
    }
}

// ---------------------------------------------------------------------
// Booleans and identity

fn prim_not(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_false()))
}

fn prim_equal(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0] == args[1]))
}

fn prim_eqv(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_identical(&args[1])))
}

// ---------------------------------------------------------------------
// Pairs and lists

fn pair_arg<'a>(args: &'a [Value], idx: usize) -> Result<&'a Handle<Pair>> {
    args[idx].as_pair().ok_or_else(|| {
        Error::WrongArgType(format!(
            "expecting a pair, but got {}",
            args[idx].repr()
        ))
    })
}

fn prim_first(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(pair_arg(args, 0)?.borrow().first.clone())
}

fn prim_rest(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(pair_arg(args, 0)?.borrow().rest.clone())
}

fn prim_pair(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn prim_set_first(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    pair_arg(args, 0)?.borrow_mut().first = args[1].clone();
    Ok(Value::Nil)
}

fn prim_set_rest(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    pair_arg(args, 0)?.borrow_mut().rest = args[1].clone();
    Ok(Value::Nil)
}

fn prim_list(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::list(args.iter().cloned()))
}

fn prim_null_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].is_nil()))
}

/// Proper-list test, safe on circular chains.
fn prim_list_p(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut slow = args[0].clone();
    let mut fast = args[0].clone();
    loop {
        match fast {
            Value::Nil => return Ok(Value::Bool(true)),
            Value::Pair(_) => {}
            _ => return Ok(Value::Bool(false)),
        }
        fast = fast.uncons().unwrap().1;
        match fast {
            Value::Nil => return Ok(Value::Bool(true)),
            Value::Pair(_) => {}
            _ => return Ok(Value::Bool(false)),
        }
        fast = fast.uncons().unwrap().1;
        slow = slow.uncons().unwrap().1;
        if fast.is_identical(&slow) {
            return Ok(Value::Bool(false));
        }
    }
}

// ---------------------------------------------------------------------
// Higher order

/// `(apply f a b '(c d))` calls `f` with the leading arguments
/// followed by the elements of the final list.
fn prim_apply(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let callable = &args[0];
    if args.len() == 1 {
        return vm.apply(callable, &[]);
    }
    let mut argv: Vec<Value> = args[1..args.len() - 1].to_vec();
    let spread = args[args.len() - 1].list_to_vec().map_err(|_| {
        Error::WrongArgType(format!(
            "the last argument of apply should be a proper list, but got {}",
            args[args.len() - 1].repr()
        ))
    })?;
    argv.extend(spread);
    vm.apply(callable, &argv)
}

fn prim_map(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let callable = &args[0];
    let mut cursors: Vec<Value> = args[1..].to_vec();
    let mut results = Vec::new();
    loop {
        let mut step_args = Vec::with_capacity(cursors.len());
        let mut finished = false;
        for cursor in cursors.iter_mut() {
            match cursor.clone() {
                Value::Nil => finished = true,
                Value::Pair(_) => {
                    if finished {
                        return Err(Error::Misc(
                            "lists supplied to map should be all of the same length".to_string(),
                        ));
                    }
                    let (first, rest) = cursor.uncons().unwrap();
                    step_args.push(first);
                    *cursor = rest;
                }
                _ => {
                    return Err(Error::WrongArgType(
                        "arguments of map should be valid lists".to_string(),
                    ))
                }
            }
        }
        if finished {
            if step_args.is_empty() {
                break;
            }
            return Err(Error::Misc(
                "lists supplied to map should be all of the same length".to_string(),
            ));
        }
        results.push(vm.apply(callable, &step_args)?);
    }
    Ok(Value::list(results))
}

// ---------------------------------------------------------------------
// Strings and symbols

fn string_arg<'a>(args: &'a [Value], idx: usize) -> Result<&'a str> {
    args[idx].as_str().ok_or_else(|| {
        Error::WrongArgType(format!(
            "expecting a string, but got {}",
            args[idx].repr()
        ))
    })
}

fn prim_string_to_symbol(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::symbol(string_arg(args, 0)?))
}

fn prim_symbol_to_string(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Symbol(symbol) => Ok(Value::string(symbol.name().as_str())),
        other => Err(Error::WrongArgType(format!(
            "expecting a symbol, but got {}",
            other.repr()
        ))),
    }
}

fn radix_arg(args: &[Value], idx: usize) -> Result<u32> {
    match args.get(idx) {
        None => Ok(10),
        Some(value) => {
            let radix = integer(value)?;
            match radix {
                2 | 8 | 10 | 16 => Ok(radix as u32),
                _ => Err(Error::Misc(format!("unsupported radix {radix}"))),
            }
        }
    }
}

fn prim_number_to_string(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let radix = radix_arg(args, 1)?;
    if radix == 10 {
        number(&args[0])?;
        return Ok(Value::string(args[0].repr().to_string()));
    }
    let n = integer(&args[0])?;
    let magnitude = n.unsigned_abs();
    let digits = match radix {
        2 => format!("{magnitude:b}"),
        8 => format!("{magnitude:o}"),
        16 => format!("{magnitude:X}"),
        _ => unreachable!(),
    };
    if n < 0 {
        Ok(Value::string(format!("-{digits}")))
    } else {
        Ok(Value::string(digits))
    }
}

fn prim_string_to_number(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let text = string_arg(args, 0)?;
    let radix = radix_arg(args, 1)?;
    if let Ok(n) = i64::from_str_radix(text.trim(), radix) {
        return Ok(Value::Integer(n));
    }
    if radix != 10 {
        return Err(Error::Misc(
            "only radix 10 is permitted for decimal numbers".to_string(),
        ));
    }
    // Fall back to the reader for reals and complexes.
    if let Ok(value @ (Value::Integer(_) | Value::Real(_) | Value::Complex(_))) =
        parser::parse(text)
    {
        return Ok(value);
    }
    // a pure imaginary like "4i"
    if let Some(body) = text.strip_suffix('i') {
        if let Ok(im) = body.parse::<f64>() {
            return Ok(Value::Complex(Complex64::new(0.0, im)));
        }
    }
    Ok(Value::Bool(false))
}

fn prim_string_append(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut out = String::new();
    for (idx, _) in args.iter().enumerate() {
        out.push_str(string_arg(args, idx)?);
    }
    Ok(Value::string(out))
}
