//! S-expression reader.
use num_complex::Complex64;

use crate::error::{Error, Result};
use crate::symbol::Symbol;
use crate::value::Value;

/// Parse a single expression.
pub fn parse(text: &str) -> Result<Value> {
    parse_named(text, "<input>")
}

/// Parse a single expression, reporting errors against `name`.
pub fn parse_named(text: &str, name: &str) -> Result<Value> {
    let mut parser = Parser::new(text, name);
    let expr = parser.parse_expr()?;
    parser.skip_all();
    if parser.more() {
        return Err(parser.error("expecting end of code, but more code is got"));
    }
    Ok(expr)
}

/// Parse every expression in the text.
pub fn parse_all(text: &str) -> Result<Vec<Value>> {
    let mut parser = Parser::new(text, "<input>");
    let mut expressions = Vec::new();
    loop {
        parser.skip_all();
        if !parser.more() {
            return Ok(expressions);
        }
        expressions.push(parser.parse_expr()?);
    }
}

/// A simple recursive descent reader.
struct Parser<'a> {
    name: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

enum UNum {
    Int(i64),
    Real(f64),
}

impl UNum {
    fn as_f64(&self) -> f64 {
        match self {
            UNum::Int(n) => *n as f64,
            UNum::Real(n) => *n,
        }
    }
}

impl<'a> Parser<'a> {
    fn new(text: &str, name: &'a str) -> Parser<'a> {
        Parser {
            name,
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn parse_expr(&mut self) -> Result<Value> {
        self.skip_all();
        let Some(ch) = self.peek(0) else {
            return Err(self.error("nothing to be parsed"));
        };

        match ch {
            '#' => self.parse_pound(),
            '(' => self.parse_list(),
            ')' => Err(self.error("unexpected right parenthesis")),
            '\'' | '`' => self.parse_quote(),
            ',' => self.parse_unquote(),
            '"' => self.parse_string(),
            '+' | '-' => {
                if self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.parse_number()
                } else {
                    self.parse_symbol()
                }
            }
            ch if ch.is_ascii_digit() => self.parse_number(),
            _ => self.parse_symbol(),
        }
    }

    fn parse_pound(&mut self) -> Result<Value> {
        match self.peek(1) {
            Some('t') => {
                self.pop(2);
                Ok(Value::Bool(true))
            }
            Some('f') => {
                self.pop(2);
                Ok(Value::Bool(false))
            }
            Some('(') => Err(self.error("vectors are not supported")),
            other => Err(self.error(format!("unknown atom #{}", other.unwrap_or(' ')))),
        }
    }

    fn parse_number(&mut self) -> Result<Value> {
        let negative = if self.eat('-') {
            true
        } else {
            self.eat('+');
            false
        };

        let num1 = self
            .parse_unum()?
            .ok_or_else(|| self.error("invalid number format"))?;

        // `a/b` rationals are coerced to reals
        let mut value = if self.eat('/') {
            let num2 = self
                .parse_unum()?
                .ok_or_else(|| self.error("invalid number format, expecting denominator"))?;
            UNum::Real(num1.as_f64() / num2.as_f64())
        } else {
            num1
        };

        if negative {
            value = match value {
                UNum::Int(n) => UNum::Int(-n),
                UNum::Real(n) => UNum::Real(-n),
            };
        }

        // `a+bi` complexes
        if matches!(self.peek(0), Some('+') | Some('-')) {
            let imaginary_negative = self.eat('-');
            if !imaginary_negative {
                self.eat('+');
            }
            let num2 = self.parse_unum()?.map(|n| n.as_f64()).unwrap_or(1.0);
            if !self.eat('i') {
                return Err(self.error("invalid number format, expecting 'i' for complex"));
            }
            let im = if imaginary_negative { -num2 } else { num2 };
            if im != 0.0 {
                return Ok(Value::Complex(Complex64::new(value.as_f64(), im)));
            }
            return Ok(UNum::Real(value.as_f64()).into_value());
        }

        Ok(value.into_value())
    }

    /// Parse an unsigned integer or real.
    fn parse_unum(&mut self) -> Result<Option<UNum>> {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pop(1);
        }
        let is_real = self.eat('.');
        while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pop(1);
        }
        if self.pos == start {
            return Ok(None);
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        if is_real {
            text.parse::<f64>()
                .map(|n| Some(UNum::Real(n)))
                .map_err(|_| self.error("invalid number format"))
        } else {
            text.parse::<i64>()
                .map(|n| Some(UNum::Int(n)))
                .map_err(|_| self.error("number out of range"))
        }
    }

    fn parse_list(&mut self) -> Result<Value> {
        self.eat('(');
        let mut elems = Vec::new();
        let mut tail = Value::Nil;
        loop {
            self.skip_all();
            match self.peek(0) {
                None => return Err(self.error("expecting right paren ')'")),
                Some(')') => break,
                // A bare dot introduces the improper tail; `...` and
                // friends stay symbols.
                Some('.') if self.peek(1) != Some('.') && !self.peek(1).is_some_and(is_symbol_char_after_dot) => {
                    self.eat('.');
                    tail = self.parse_expr()?;
                    self.skip_all();
                    break;
                }
                Some(_) => elems.push(self.parse_expr()?),
            }
        }
        if !self.eat(')') {
            return Err(self.error("expecting right paren ')'"));
        }

        let mut list = tail;
        for elem in elems.into_iter().rev() {
            list = Value::cons(elem, list);
        }
        Ok(list)
    }

    fn parse_quote(&mut self) -> Result<Value> {
        let symbol = if self.peek(0) == Some('\'') {
            Symbol::intern("quote")
        } else {
            Symbol::intern("quasiquote")
        };
        self.pop(1);
        let quoted = self.parse_expr()?;
        Ok(Value::list([Value::Symbol(symbol), quoted]))
    }

    fn parse_unquote(&mut self) -> Result<Value> {
        self.eat(',');
        let symbol = if self.eat('@') {
            Symbol::intern("unquote-splicing")
        } else {
            Symbol::intern("unquote")
        };
        let quoted = self.parse_expr()?;
        Ok(Value::list([Value::Symbol(symbol), quoted]))
    }

    fn parse_symbol(&mut self) -> Result<Value> {
        let start = self.pos;
        self.pop(1);
        while let Some(ch) = self.peek(0) {
            if ch.is_whitespace() || matches!(ch, '\'' | '(' | ')' | ',' | '@' | ';') {
                break;
            }
            self.pop(1);
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        Ok(Value::symbol(name))
    }

    fn parse_string(&mut self) -> Result<Value> {
        self.eat('"');
        let mut out = String::new();
        loop {
            match self.peek(0) {
                None => return Err(self.error("expecting '\"' to end a string")),
                Some('"') => break,
                Some('\\') => {
                    match self.peek(1) {
                        Some('"') => out.push('"'),
                        Some('\\') => out.push('\\'),
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        // unknown escapes are kept as-is
                        Some(other) => {
                            out.push('\\');
                            out.push(other);
                        }
                        None => return Err(self.error("expecting '\"' to end a string")),
                    }
                    self.pop(2);
                }
                Some(ch) => {
                    if ch == '\n' {
                        self.line += 1;
                    }
                    out.push(ch);
                    self.pop(1);
                }
            }
        }
        self.eat('"');
        Ok(Value::string(out))
    }

    fn skip_all(&mut self) {
        loop {
            self.skip_ws();
            if self.peek(0) == Some(';') {
                while let Some(ch) = self.peek(0) {
                    self.pop(1);
                    if ch == '\n' {
                        self.line += 1;
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek(0) {
            if ch == '\n' {
                self.line += 1;
                self.pop(1);
            } else if ch.is_whitespace() {
                self.pop(1);
            } else {
                break;
            }
        }
    }

    fn more(&self) -> bool {
        self.pos < self.chars.len()
    }

    fn peek(&self, idx: usize) -> Option<char> {
        self.chars.get(self.pos + idx).copied()
    }

    fn pop(&mut self, n: usize) {
        self.pos += n;
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek(0) == Some(ch) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            name: self.name.to_string(),
            line: self.line,
            message: message.into(),
        }
    }
}

impl UNum {
    fn into_value(self) -> Value {
        match self {
            UNum::Int(n) => Value::Integer(n),
            UNum::Real(n) => Value::Real(n),
        }
    }
}

/// After a dot, a digit still reads as a dotted pair (`(1 . 5)`), but
/// any other symbol character means the dot starts a symbol.
fn is_symbol_char_after_dot(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_ascii_digit() && !matches!(ch, '(' | ')' | '\'' | ',' | ';')
}
