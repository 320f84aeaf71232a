//! External text representation.
use std::fmt;
use std::fmt::Formatter;
use std::rc::Rc;

use crate::value::{Pair, Value};

pub struct ValueRepr<'a> {
    value: &'a Value,
}

impl<'a> ValueRepr<'a> {
    pub(crate) const fn new(value: &'a Value) -> Self {
        Self { value }
    }

    fn fmt_pair(&self, f: &mut Formatter, pair: &Pair) -> fmt::Result {
        write!(f, "{}", ValueRepr::new(&pair.first))?;
        match &pair.rest {
            Value::Nil => {}
            Value::Pair(inner) => {
                write!(f, " ")?;
                self.fmt_pair(f, &inner.borrow())?;
            }
            rest => write!(f, " . {}", ValueRepr::new(rest))?,
        }
        Ok(())
    }
}

impl<'a> fmt::Display for ValueRepr<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.value {
            Value::Nil => write!(f, "()"),
            Value::Undefined => write!(f, "#!undefined"),
            Value::Bool(boolean) => {
                if *boolean {
                    write!(f, "#t")
                } else {
                    write!(f, "#f")
                }
            }
            Value::Integer(number) => write!(f, "{number}"),
            Value::Real(number) => write!(f, "{number}"),
            Value::Complex(number) => {
                if number.im >= 0.0 {
                    write!(f, "{}+{}i", number.re, number.im)
                } else {
                    write!(f, "{}{}i", number.re, number.im)
                }
            }
            Value::Str(string) => write!(f, "{string}"),
            Value::Symbol(symbol) => write!(f, "{symbol}"),
            Value::Pair(pair) => {
                write!(f, "(")?;
                self.fmt_pair(f, &pair.borrow())?;
                write!(f, ")")?;
                Ok(())
            }
            Value::Procedure(procedure) => {
                write!(f, "<procedure {:?}>", Rc::as_ptr(procedure))
            }
            Value::Primitive(primitive) => {
                write!(f, "<primitive {}>", primitive.name())
            }
            Value::Continuation(_) => write!(f, "<continuation>"),
            Value::Macro(_) => write!(f, "<macro>"),
            Value::SymbolClosure(closure) => {
                write!(f, "{}", closure.borrow().symbol())
            }
            Value::DynamicClosure(closure) => {
                write!(f, "{}", ValueRepr::new(closure.borrow().expr()))
            }
            Value::Foreign(_) => write!(f, "<foreign>"),
        }
    }
}
