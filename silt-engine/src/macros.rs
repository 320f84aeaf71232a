//! The `syntax-rules` engine.
//!
//! A macro compiles into a list of rules, each a matcher tree and a
//! template tree. Matching a use-site form produces a dictionary of
//! captures; expanding the template substitutes them back in.
//!
//! Hygiene works without renaming: every symbol or pair captured from
//! the use site is wrapped in a closure stamped with the use-site
//! lexical environment, so the compiler resolves it there instead of
//! in the environment where the macro body is being compiled.
//! Identifiers introduced by the template are left bare and resolve in
//! the macro's definition environment.
use std::collections::{HashMap, HashSet};

use crate::env::{self, Env, Location};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::proc::Form;
use crate::symbol::Symbol;
use crate::value::Value;

/// An identifier captured at a macro use site, together with the
/// lexical environment it should resolve in.
///
/// The environment is the compile-time use-site environment when the
/// closure is created; a `fix_lexical_pop` at the expansion site
/// re-stamps it with the run-time environment before the expansion
/// executes.
#[derive(Debug)]
pub struct SymbolClosure {
    env: Handle<Env>,
    symbol: Symbol,
}

impl SymbolClosure {
    pub(crate) fn new(env: Handle<Env>, symbol: Symbol) -> Handle<Self> {
        Handle::new(Self { env, symbol })
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub(crate) fn env(&self) -> Handle<Env> {
        self.env.clone()
    }

    pub(crate) fn set_env(&mut self, env: Handle<Env>) {
        self.env = env;
    }
}

/// An expression fragment paired with the environment in which it
/// should be evaluated.
///
/// Carries the compiled form of the fragment once the compiler has
/// processed the expansion site; `dynamic_eval` runs that form in the
/// closure's environment.
#[derive(Debug)]
pub struct DynamicClosure {
    env: Handle<Env>,
    expr: Value,
    pub(crate) form: Option<Form>,
}

impl DynamicClosure {
    pub(crate) fn new(env: Handle<Env>, expr: Value) -> Handle<Self> {
        Handle::new(Self {
            env,
            expr,
            form: None,
        })
    }

    pub fn expr(&self) -> &Value {
        &self.expr
    }

    pub(crate) fn env(&self) -> Handle<Env> {
        self.env.clone()
    }

    pub(crate) fn set_env(&mut self, env: Handle<Env>) {
        self.env = env;
    }
}

/// A compiled `syntax-rules` rewriter.
#[derive(Debug)]
pub struct Macro {
    lexical_parent: Handle<Env>,
    rules: Vec<SyntaxRule>,
}

impl Macro {
    /// Compile a `syntax-rules` body of the shape
    /// `((literal ...) (pattern template) ...)`.
    ///
    /// `env` is the macro's definition environment; template
    /// identifiers and literal bindings resolve against it.
    pub fn new(env: Handle<Env>, body: &Value) -> Result<Macro> {
        let (literals_expr, rules_expr) = body
            .uncons()
            .ok_or_else(|| Error::Syntax("invalid syntax-rules form".to_string()))?;

        let mut literals = Vec::new();
        let mut cursor = literals_expr;
        while let Some((first, rest)) = cursor.uncons() {
            let symbol = first.as_symbol().ok_or_else(|| {
                Error::Syntax(format!(
                    "syntax-rules literals should be symbols, but got {}",
                    first.repr()
                ))
            })?;
            literals.push(symbol);
            cursor = rest;
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax(
                "syntax-rules literals should be a proper list".to_string(),
            ));
        }

        let mut rules = Vec::new();
        let mut cursor = rules_expr;
        while let Some((rule, rest)) = cursor.uncons() {
            rules.push(SyntaxRule::new(&rule, &literals, &env)?);
            cursor = rest;
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax(
                "syntax rules should be a proper list".to_string(),
            ));
        }

        Ok(Macro {
            lexical_parent: env,
            rules,
        })
    }

    /// The macro's definition environment.
    pub fn lexical_parent(&self) -> Handle<Env> {
        self.lexical_parent.clone()
    }

    /// Rewrite a use-site form with the first rule that matches.
    ///
    /// Returns the rewritten expression together with every symbol and
    /// dynamic closure created for captured fragments; the compiler
    /// must fix their lexical environments at the expansion site.
    pub fn transform(&self, env: &Handle<Env>, form: &Value) -> Result<(Value, Vec<Value>)> {
        for rule in &self.rules {
            if let Some(md) = rule.matches(env, form)? {
                return rule.expand(env, &md);
            }
        }
        Err(Error::Syntax(format!(
            "no matching syntax rule for {}",
            form.repr()
        )))
    }
}

/// One `(pattern template)` rule.
#[derive(Debug)]
struct SyntaxRule {
    matcher: Matcher,
    template: Template,
}

impl SyntaxRule {
    fn new(rule: &Value, literals: &[Symbol], env: &Handle<Env>) -> Result<SyntaxRule> {
        let (pattern, rest) = rule.uncons().ok_or_else(|| malformed_rule(rule))?;
        let (template, tail) = rest.uncons().ok_or_else(|| malformed_rule(rule))?;
        if !tail.is_nil() {
            return Err(Error::Syntax(format!(
                "extra expressions in syntax rule: {}",
                rule.repr()
            )));
        }

        let mut compiler = RuleCompiler {
            literals,
            env,
            variables: HashSet::new(),
        };
        let matcher = compiler.compile_pattern(&pattern)?;
        let template = compiler.compile_template(&template);
        Ok(SyntaxRule { matcher, template })
    }

    /// Try this rule against a use-site form. `Ok(None)` means the
    /// rule does not match and the next one should be tried.
    fn matches(&self, env: &Handle<Env>, form: &Value) -> Result<Option<MatchDict>> {
        let (_keyword, rest) = form.uncons().ok_or_else(|| {
            Error::Syntax(format!("invalid macro use against {}", form.repr()))
        })?;

        let mut md = MatchDict::new();
        // The matcher consumes one element per step, so the argument
        // list is wrapped as a single element here.
        match self
            .matcher
            .match_value(env, &Value::cons(rest, Value::Nil), &mut md)
        {
            Ok(_remaining) => Ok(Some(md)),
            Err(MatchFailure) => Ok(None),
        }
    }

    fn expand(&self, env: &Handle<Env>, md: &MatchDict) -> Result<(Value, Vec<Value>)> {
        let mut out = Vec::new();
        let mut closures = Vec::new();
        let mut idx = Vec::new();
        self.template
            .expand(env, md, &mut idx, &mut out, &mut closures)?;
        let expr = out.into_iter().next().unwrap_or(Value::Nil);
        Ok((expr, closures))
    }
}

fn malformed_rule(rule: &Value) -> Error {
    Error::Syntax(format!(
        "expecting (pattern template) for syntax rule, but got {}",
        rule.repr()
    ))
}

struct RuleCompiler<'a> {
    literals: &'a [Symbol],
    env: &'a Handle<Env>,
    variables: HashSet<Symbol>,
}

impl<'a> RuleCompiler<'a> {
    fn compile_pattern(&mut self, pattern: &Value) -> Result<Matcher> {
        // The first element is the macro keyword (or an underscore);
        // it never participates in matching.
        let (_keyword, rest) = pattern.uncons().ok_or_else(|| {
            Error::Syntax(format!("invalid pattern for macro: {}", pattern.repr()))
        })?;
        self.compile_sub_pattern(&rest)
    }

    fn compile_sub_pattern(&mut self, pat: &Value) -> Result<Matcher> {
        if matches!(pat, Value::Pair(_)) {
            let mut sequence = Vec::new();
            let mut cursor = pat.clone();
            while let Some((first, rest)) = cursor.uncons() {
                let mut sub = self.compile_sub_pattern(&first)?;
                cursor = rest;
                if let Some((next, next_rest)) = cursor.uncons() {
                    if next.as_symbol() == Some(Symbol::intern("...")) {
                        sub.set_ellipsis();
                        cursor = next_rest;
                    }
                }
                sequence.push(sub);
            }
            if !cursor.is_nil() {
                // Improper pattern: the tail matcher consumes whatever
                // remains of the use-site list.
                let tail = self.compile_sub_pattern(&cursor)?;
                sequence.push(Matcher::Rest(Box::new(tail)));
            }
            return Ok(Matcher::Sequence {
                sequence,
                ellipsis: false,
            });
        }

        if let Some(symbol) = pat.as_symbol() {
            if self.literals.contains(&symbol) {
                return Ok(Matcher::Literal {
                    name: symbol,
                    location: env::lookup_location(self.env, symbol),
                    ellipsis: false,
                });
            }
            if symbol == Symbol::intern("_") {
                return Ok(Matcher::Underscore { ellipsis: false });
            }
            if !self.variables.insert(symbol) {
                return Err(Error::Syntax(format!(
                    "duplicated pattern variable {symbol}"
                )));
            }
            return Ok(Matcher::Variable {
                name: symbol,
                ellipsis: false,
            });
        }

        Ok(Matcher::Constant {
            value: pat.clone(),
            ellipsis: false,
        })
    }

    fn compile_template(&self, expr: &Value) -> Template {
        if matches!(expr, Value::Pair(_)) {
            let mut elems: Vec<Template> = Vec::new();
            let mut ellipsis_names = Vec::new();
            let mut tail = Template::constant(Value::Nil);

            let mut cursor = expr.clone();
            while let Some((first, rest)) = cursor.uncons() {
                let mut sub = self.compile_template(&first);
                cursor = rest;
                // Each trailing `...` adds one flattening level.
                while let Some((next, next_rest)) = cursor.uncons() {
                    if next.as_symbol() == Some(Symbol::intern("...")) {
                        sub.nflatten += 1;
                        cursor = next_rest;
                    } else {
                        break;
                    }
                }
                sub.collect_names(&mut ellipsis_names);
                elems.push(sub);
            }
            if !cursor.is_nil() {
                let sub = self.compile_template(&cursor);
                sub.collect_names(&mut ellipsis_names);
                tail = sub;
            }

            return Template {
                kind: TemplateKind::Sequence {
                    elems,
                    tail: Box::new(tail),
                    ellipsis_names,
                },
                nflatten: 0,
            };
        }

        if let Some(symbol) = expr.as_symbol() {
            if self.variables.contains(&symbol) {
                return Template {
                    kind: TemplateKind::Variable(symbol),
                    nflatten: 0,
                };
            }
        }

        Template::constant(expr.clone())
    }
}

// ---------------------------------------------------------------------
// Pattern matching

/// Control signal raised when a rule does not match; the rule iterator
/// consumes it and tries the next rule. Never user-visible.
struct MatchFailure;

type MatchResult = std::result::Result<Value, MatchFailure>;

/// A captured value: a single capture, or one bag level per `...`.
#[derive(Debug, Clone)]
enum Binding {
    Single(Value),
    Bag(Vec<Binding>),
}

type MatchDict = HashMap<Symbol, Binding>;

#[derive(Debug)]
enum Matcher {
    /// Matches by structural equality.
    Constant { value: Value, ellipsis: bool },
    /// Matches a symbol whose binding location at the use site equals
    /// its binding location at the definition site, or is unbound in
    /// both.
    Literal {
        name: Symbol,
        location: Option<Location>,
        ellipsis: bool,
    },
    /// Captures one expression, or all remaining under ellipsis.
    Variable { name: Symbol, ellipsis: bool },
    /// Matches one expression and discards it.
    Underscore { ellipsis: bool },
    /// Consumes the improper-list tail.
    Rest(Box<Matcher>),
    /// Matches a list element-wise, looping under ellipsis.
    Sequence {
        sequence: Vec<Matcher>,
        ellipsis: bool,
    },
}

impl Matcher {
    fn set_ellipsis(&mut self) {
        match self {
            Matcher::Constant { ellipsis, .. }
            | Matcher::Literal { ellipsis, .. }
            | Matcher::Variable { ellipsis, .. }
            | Matcher::Underscore { ellipsis }
            | Matcher::Sequence { ellipsis, .. } => *ellipsis = true,
            Matcher::Rest(_) => {}
        }
    }

    /// Match against the head of `expr` and return the remaining
    /// expression.
    fn match_value(&self, env: &Handle<Env>, expr: &Value, md: &mut MatchDict) -> MatchResult {
        match self {
            Matcher::Constant { value, ellipsis } => {
                if *ellipsis {
                    let mut cursor = expr.clone();
                    while let Some((first, rest)) = cursor.uncons() {
                        if &first != value {
                            break;
                        }
                        cursor = rest;
                    }
                    Ok(cursor)
                } else {
                    match expr.uncons() {
                        Some((first, rest)) if &first == value => Ok(rest),
                        _ => Err(MatchFailure),
                    }
                }
            }
            Matcher::Literal {
                name,
                location,
                ellipsis,
            } => {
                let is_same_binding = |candidate: &Value| -> bool {
                    match candidate.as_symbol() {
                        Some(symbol) if symbol == *name => {
                            env::lookup_location(env, symbol) == *location
                        }
                        _ => false,
                    }
                };
                if *ellipsis {
                    let mut cursor = expr.clone();
                    while let Some((first, rest)) = cursor.uncons() {
                        if !is_same_binding(&first) {
                            break;
                        }
                        cursor = rest;
                    }
                    Ok(cursor)
                } else {
                    match expr.uncons() {
                        Some((first, rest)) if is_same_binding(&first) => Ok(rest),
                        _ => Err(MatchFailure),
                    }
                }
            }
            Matcher::Variable { name, ellipsis } => {
                if *ellipsis {
                    // Consume every leading pair; a non-nil remainder
                    // is left for a rest matcher (and trips the
                    // enclosing sequence's completeness check when
                    // there is none).
                    let mut items = Vec::new();
                    let mut cursor = expr.clone();
                    while let Some((first, rest)) = cursor.uncons() {
                        items.push(Binding::Single(first));
                        cursor = rest;
                    }
                    md.insert(*name, Binding::Bag(items));
                    Ok(cursor)
                } else {
                    match expr.uncons() {
                        Some((first, rest)) => {
                            md.insert(*name, Binding::Single(first));
                            Ok(rest)
                        }
                        None => Err(MatchFailure),
                    }
                }
            }
            Matcher::Underscore { ellipsis } => {
                if *ellipsis {
                    let mut cursor = expr.clone();
                    while let Some((_, rest)) = cursor.uncons() {
                        cursor = rest;
                    }
                    Ok(cursor)
                } else {
                    match expr.uncons() {
                        Some((_, rest)) => Ok(rest),
                        None => Err(MatchFailure),
                    }
                }
            }
            Matcher::Rest(inner) => {
                inner.match_value(env, &Value::cons(expr.clone(), Value::Nil), md)
            }
            Matcher::Sequence { sequence, ellipsis } => {
                if *ellipsis {
                    let mut bags = MatchDict::new();
                    let mut cursor = expr.clone();
                    while let Some((_, rest)) = cursor.uncons() {
                        let mut iteration = MatchDict::new();
                        if Self::match_element(sequence, env, &cursor, &mut iteration).is_err() {
                            break;
                        }
                        for (name, binding) in iteration {
                            match bags.entry(name).or_insert_with(|| Binding::Bag(Vec::new())) {
                                Binding::Bag(items) => items.push(binding),
                                Binding::Single(_) => unreachable!(),
                            }
                        }
                        cursor = rest;
                    }
                    md.extend(bags);
                    Ok(cursor)
                } else {
                    if !matches!(expr, Value::Pair(_)) {
                        return Err(MatchFailure);
                    }
                    Self::match_element(sequence, env, expr, md)?;
                    Ok(expr.uncons().unwrap().1)
                }
            }
        }
    }

    /// Run the sub-matchers over the first element of `expr`; the
    /// element must be consumed completely.
    fn match_element(
        sequence: &[Matcher],
        env: &Handle<Env>,
        expr: &Value,
        md: &mut MatchDict,
    ) -> std::result::Result<(), MatchFailure> {
        let mut cursor = expr.uncons().ok_or(MatchFailure)?.0;
        for matcher in sequence {
            cursor = matcher.match_value(env, &cursor, md)?;
        }
        if cursor.is_nil() {
            Ok(())
        } else {
            Err(MatchFailure)
        }
    }
}

// ---------------------------------------------------------------------
// Template expansion

#[derive(Debug)]
struct Template {
    kind: TemplateKind,
    /// Number of trailing `...` tokens after this template in its
    /// enclosing sequence; each strips one bag level on expansion.
    nflatten: usize,
}

#[derive(Debug)]
enum TemplateKind {
    Constant(Value),
    Variable(Symbol),
    Sequence {
        elems: Vec<Template>,
        tail: Box<Template>,
        /// Every pattern variable mentioned beneath this sequence;
        /// their bags must agree on a repetition count.
        ellipsis_names: Vec<Symbol>,
    },
}

impl Template {
    fn constant(value: Value) -> Template {
        Template {
            kind: TemplateKind::Constant(value),
            nflatten: 0,
        }
    }

    fn collect_names(&self, out: &mut Vec<Symbol>) {
        match &self.kind {
            TemplateKind::Variable(name) => out.push(*name),
            TemplateKind::Sequence { ellipsis_names, .. } => {
                out.extend(ellipsis_names.iter().copied())
            }
            TemplateKind::Constant(_) => {}
        }
    }

    /// Expand under the match dictionary, pushing zero or more values
    /// into `out`. `idx` is the current position within each enclosing
    /// ellipsis repetition.
    fn expand(
        &self,
        env: &Handle<Env>,
        md: &MatchDict,
        idx: &mut Vec<usize>,
        out: &mut Vec<Value>,
        closures: &mut Vec<Value>,
    ) -> Result<()> {
        match &self.kind {
            TemplateKind::Constant(value) => {
                out.push(value.clone());
                Ok(())
            }
            TemplateKind::Variable(name) => {
                let binding = descend(lookup(md, *name), idx, *name)?;

                let mut values = vec![binding];
                for _ in 0..self.nflatten {
                    let mut flattened = Vec::new();
                    for binding in values {
                        match binding {
                            Binding::Bag(items) => flattened.extend(items),
                            Binding::Single(_) => return Err(too_many_ellipses(*name)),
                        }
                    }
                    values = flattened;
                }

                for binding in values {
                    match binding {
                        Binding::Single(value) => out.push(wrap_capture(env, value, closures)),
                        Binding::Bag(_) => {
                            return Err(Error::Syntax(format!(
                                "ellipses after variable {name} are fewer than expected"
                            )))
                        }
                    }
                }
                Ok(())
            }
            TemplateKind::Sequence { .. } => {
                self.expand_flatten(env, md, idx, self.nflatten, out, closures)
            }
        }
    }

    fn expand_flatten(
        &self,
        env: &Handle<Env>,
        md: &MatchDict,
        idx: &mut Vec<usize>,
        flatten: usize,
        out: &mut Vec<Value>,
        closures: &mut Vec<Value>,
    ) -> Result<()> {
        let TemplateKind::Sequence {
            elems,
            tail,
            ellipsis_names,
        } = &self.kind
        else {
            unreachable!("expand_flatten on a non-sequence template");
        };

        if flatten == 0 {
            let mut items = Vec::new();
            for tmpl in elems {
                tmpl.expand(env, md, idx, &mut items, closures)?;
            }
            let mut tail_out = Vec::new();
            tail.expand(env, md, idx, &mut tail_out, closures)?;
            let mut rest = tail_out.into_iter().next().unwrap_or(Value::Nil);
            for item in items.into_iter().rev() {
                rest = Value::cons(item, rest);
            }
            out.push(rest);
            return Ok(());
        }

        // The repetition count is the common bag length of every
        // variable below; siblings disagreeing is an error.
        let mut length = 0;
        for name in ellipsis_names {
            let binding = descend(lookup(md, *name), idx, *name)?;
            let Binding::Bag(items) = binding else {
                return Err(too_many_ellipses(*name));
            };
            if length == 0 || length == items.len() {
                length = items.len();
            } else {
                return Err(Error::Syntax(format!(
                    "incompatible ellipsis match counts for variable {name}"
                )));
            }
        }

        if length > 0 {
            idx.push(0);
            for i in 0..length {
                *idx.last_mut().unwrap() = i;
                self.expand_flatten(env, md, idx, flatten - 1, out, closures)?;
            }
            idx.pop();
        }
        Ok(())
    }
}

/// A variable that matched zero ellipsis repetitions has no entry; it
/// behaves as an empty bag.
fn lookup(md: &MatchDict, name: Symbol) -> Binding {
    md.get(&name)
        .cloned()
        .unwrap_or_else(|| Binding::Bag(Vec::new()))
}

fn descend(mut binding: Binding, idx: &[usize], name: Symbol) -> Result<Binding> {
    for &i in idx {
        binding = match binding {
            Binding::Bag(items) => items
                .get(i)
                .cloned()
                .unwrap_or_else(|| Binding::Bag(Vec::new())),
            Binding::Single(_) => return Err(too_many_ellipses(name)),
        };
    }
    Ok(binding)
}

fn too_many_ellipses(name: Symbol) -> Error {
    Error::Syntax(format!("too many ellipses after variable {name}"))
}

/// Stamp a captured fragment with the use-site environment so the
/// compiler resolves it there. Scalars need no stamp, and fragments
/// that are already closures keep the environment they were born with.
fn wrap_capture(env: &Handle<Env>, value: Value, closures: &mut Vec<Value>) -> Value {
    match value {
        Value::Symbol(symbol) => {
            let wrapped = Value::SymbolClosure(SymbolClosure::new(env.clone(), symbol));
            closures.push(wrapped.clone());
            wrapped
        }
        Value::Pair(_) => {
            let wrapped = Value::DynamicClosure(DynamicClosure::new(env.clone(), value));
            closures.push(wrapped.clone());
            wrapped
        }
        other => other,
    }
}
