//! Host value bridge.
//!
//! Converts between the host representation and Scheme values:
//! lists map to pair chains, maps to association lists, scalars pass
//! through, a host callable becomes a forwarding primitive, and an
//! opaque host object travels through the machine in a tagged box.
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use num_complex::Complex64;
use smol_str::SmolStr;

use crate::error::Result;
use crate::proc::Primitive;
use crate::symbol::Symbol;
use crate::value::Value;

pub type HostFn = Rc<dyn Fn(&[HostValue]) -> HostValue>;

/// The host-side view of a value.
#[derive(Clone)]
pub enum HostValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex64),
    Str(String),
    Symbol(SmolStr),
    List(Vec<HostValue>),
    Map(Vec<(HostValue, HostValue)>),
    Pair(Box<HostValue>, Box<HostValue>),
    /// A host callable; calls from Scheme are forwarded through the
    /// bridge in both directions.
    Callable(HostFn),
    /// An opaque host object.
    Opaque(Rc<dyn Any>),
    /// A Scheme value with no host representation (a procedure, a
    /// continuation); converts back to itself.
    Scheme(Value),
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HostValue::Bool(b) => write!(f, "Bool({b})"),
            HostValue::Int(n) => write!(f, "Int({n})"),
            HostValue::Float(n) => write!(f, "Float({n})"),
            HostValue::Complex(n) => write!(f, "Complex({n})"),
            HostValue::Str(s) => write!(f, "Str({s:?})"),
            HostValue::Symbol(s) => write!(f, "Symbol({s})"),
            HostValue::List(items) => f.debug_tuple("List").field(items).finish(),
            HostValue::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            HostValue::Pair(a, b) => f.debug_tuple("Pair").field(a).field(b).finish(),
            HostValue::Callable(_) => write!(f, "Callable"),
            HostValue::Opaque(_) => write!(f, "Opaque"),
            HostValue::Scheme(v) => write!(f, "Scheme({v:?})"),
        }
    }
}

/// Convert a host value into a Scheme value.
pub fn to_scheme(value: &HostValue) -> Value {
    match value {
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Int(n) => Value::Integer(*n),
        HostValue::Float(n) => Value::Real(*n),
        HostValue::Complex(n) => Value::Complex(*n),
        HostValue::Str(s) => Value::string(s.clone()),
        HostValue::Symbol(name) => Value::Symbol(Symbol::intern(name.as_str())),
        HostValue::List(items) => Value::list(items.iter().map(to_scheme).collect::<Vec<_>>()),
        HostValue::Map(entries) => Value::list(
            entries
                .iter()
                .map(|(key, value)| Value::cons(to_scheme(key), to_scheme(value)))
                .collect::<Vec<_>>(),
        ),
        HostValue::Pair(first, rest) => Value::cons(to_scheme(first), to_scheme(rest)),
        HostValue::Callable(func) => {
            let func = func.clone();
            Value::Primitive(Rc::new(Primitive::new(
                "host-callable",
                (-1, -1),
                move |_, args: &[Value]| -> Result<Value> {
                    let host_args: Vec<HostValue> = args.iter().map(from_scheme).collect();
                    Ok(to_scheme(&func(&host_args)))
                },
            )))
        }
        HostValue::Opaque(object) => Value::Foreign(object.clone()),
        HostValue::Scheme(v) => v.clone(),
    }
}

/// Convert a Scheme value into a host value.
///
/// A proper list whose elements are all pairs converts to a map; any
/// other proper list converts to a list; a bare pair stays a pair.
pub fn from_scheme(value: &Value) -> HostValue {
    match value {
        Value::Nil => HostValue::List(Vec::new()),
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Integer(n) => HostValue::Int(*n),
        Value::Real(n) => HostValue::Float(*n),
        Value::Complex(n) => HostValue::Complex(*n),
        Value::Str(s) => HostValue::Str(s.as_str().to_string()),
        Value::Symbol(symbol) => HostValue::Symbol(symbol.name()),
        Value::Pair(_) => match value.list_to_vec() {
            Ok(items) => {
                if !items.is_empty() && items.iter().all(|item| matches!(item, Value::Pair(_))) {
                    HostValue::Map(
                        items
                            .iter()
                            .map(|item| {
                                let (key, val) = item.uncons().unwrap();
                                (from_scheme(&key), from_scheme(&val))
                            })
                            .collect(),
                    )
                } else {
                    HostValue::List(items.iter().map(from_scheme).collect())
                }
            }
            Err(_) => {
                let (first, rest) = value.uncons().unwrap();
                HostValue::Pair(
                    Box::new(from_scheme(&first)),
                    Box::new(from_scheme(&rest)),
                )
            }
        },
        Value::Foreign(object) => HostValue::Opaque(object.clone()),
        other => HostValue::Scheme(other.clone()),
    }
}
