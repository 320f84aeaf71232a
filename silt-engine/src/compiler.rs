use log::trace;

use crate::builder::{Builder, Label, LocalAction};
use crate::env::{self, Env};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::macros::{DynamicClosure, Macro};
use crate::opcode::Opcode;
use crate::proc::Form;
use crate::symbol::Symbol;
use crate::value::Value;

/// Compile a top-level expression into a form.
///
/// The given environment becomes the environment of the form: names it
/// defines are allocated there at compile time and assigned when the
/// form runs.
pub fn compile(env: Handle<Env>, expr: &Value) -> Result<Form> {
    let mut compiler = Compiler::new();
    let mut bdr = Builder::new(env);
    compiler.generate_expr(&mut bdr, expr, true, false)?;
    bdr.generate_form()
}

/// The syntax-directed translator from s-expressions to bytecode.
///
/// Every generator is parameterised by `keep` (the expression's value
/// stays on the operand stack) and `tail` (the expression sits in tail
/// position, so a call becomes a tail call and a kept value is
/// followed by `ret`). `tail` is never true when `keep` is false.
struct Compiler {
    label_seed: u32,
}

impl Compiler {
    fn new() -> Self {
        Self { label_seed: 0 }
    }

    fn next_label(&mut self) -> Label {
        self.label_seed += 1;
        Label::new(self.label_seed)
    }

    fn generate_expr(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        trace!("generate_expr({expr:?}, keep={keep}, tail={tail})");

        if self_evaluating(expr) {
            if keep {
                bdr.emit_literal(expr.clone());
                if tail {
                    bdr.emit(Opcode::Ret);
                }
            }
            return Ok(());
        }

        match expr {
            Value::Symbol(symbol) => {
                if keep {
                    bdr.emit_local(LocalAction::Push, *symbol, None)?;
                    if tail {
                        bdr.emit(Opcode::Ret);
                    }
                }
                Ok(())
            }
            // An identifier captured by a macro pattern: resolve it in
            // the environment stamped on the closure, not here.
            Value::SymbolClosure(sc) => {
                if keep {
                    let (symbol, sc_env) = {
                        let sc = sc.borrow();
                        (sc.symbol(), sc.env())
                    };
                    bdr.emit_literal(expr.clone());
                    bdr.emit_local(LocalAction::Push, symbol, Some(&sc_env))?;
                    if tail {
                        bdr.emit(Opcode::Ret);
                    }
                }
                Ok(())
            }
            // A fragment captured by a macro pattern: its compiled form
            // is evaluated in the stamped environment.
            Value::DynamicClosure(_) => {
                bdr.emit_literal(expr.clone());
                bdr.emit(Opcode::DynamicEval);
                if !keep {
                    bdr.emit(Opcode::Pop);
                } else if tail {
                    bdr.emit(Opcode::Ret);
                }
                Ok(())
            }
            Value::Pair(_) => self.generate_form_expr(bdr, expr, keep, tail),
            _ => Err(Error::Compile(format!(
                "expecting atom or list, but got {}",
                expr.repr()
            ))),
        }
    }

    fn generate_form_expr(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        let (head, rest) = expr.uncons().expect("form expression must be a pair");

        if let Some(symbol) = head.as_symbol() {
            let name = symbol.name();
            match name.as_str() {
                "if" => return self.generate_if(bdr, &rest, keep, tail),
                "begin" => return self.generate_body(bdr, &rest, keep, tail),
                "lambda" => return self.generate_lambda(bdr, &rest, keep, tail),
                "define" => return self.generate_define(bdr, &rest, keep, tail),
                "set!" => return self.generate_set(bdr, &rest, keep, tail),
                // TODO: quasiquote/unquote parse as plain forms but
                // have no compiler support yet.
                "quote" => return self.generate_quote(bdr, &rest, keep, tail),
                "or" => return self.generate_or(bdr, &rest, keep, tail),
                "and" => return self.generate_and(bdr, &rest, keep, tail),
                "define-syntax" => return self.generate_define_syntax(bdr, &rest, keep, tail),
                "let" => return self.generate_let(bdr, &rest, keep, tail),
                "letrec" => return self.generate_letrec(bdr, &rest, keep, tail),
                "let*" => return self.generate_letstar(bdr, &rest, keep, tail),
                "do" => return self.generate_do(bdr, &rest, keep, tail),
                "cond" => return self.generate_cond(bdr, &rest, keep, tail),
                "call/cc" | "call-with-current-continuation" => {
                    return self.generate_call_cc(bdr, &rest, keep, tail)
                }
                _ => {}
            }

            if let Some(mac) = get_macro(&bdr.env(), symbol) {
                return self.generate_macro_use(bdr, &mac, expr, keep, tail);
            }
        }

        // The default form is a procedure call: arguments first, then
        // the operator on top.
        let mut argc: u32 = 0;
        let mut cursor = rest;
        while let Some((arg, next)) = cursor.uncons() {
            self.generate_expr(bdr, &arg, true, false)?;
            argc += 1;
            cursor = next;
        }
        self.generate_expr(bdr, &head, true, false)?;

        if tail {
            bdr.emit1(Opcode::TailCall, argc);
        } else {
            bdr.emit1(Opcode::Call, argc);
            if !keep {
                bdr.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    /// Generate a sequence of expressions; only the last one's value
    /// is kept, and it inherits the caller's tail position.
    fn generate_body(&mut self, bdr: &mut Builder, body: &Value, keep: bool, tail: bool) -> Result<()> {
        if body.is_nil() {
            if keep {
                bdr.emit(Opcode::PushNil);
                if tail {
                    bdr.emit(Opcode::Ret);
                }
            }
            return Ok(());
        }

        let mut cursor = body.clone();
        while let Some((expr, rest)) = cursor.uncons() {
            let will_keep = keep && rest.is_nil();
            self.generate_expr(bdr, &expr, will_keep, will_keep && tail)?;
            cursor = rest;
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax(format!(
                "expected a proper list of expressions, but got {}",
                cursor.repr()
            )));
        }
        Ok(())
    }

    fn generate_if(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        let (cond, rest) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("missing condition expression in 'if'".to_string()))?;
        let (exp_then, rest) = rest
            .uncons()
            .ok_or_else(|| Error::Syntax("missing 'then' expression in 'if'".to_string()))?;
        let exp_else = match rest.uncons() {
            Some((exp_else, tail_rest)) => {
                if !tail_rest.is_nil() {
                    return Err(Error::Syntax("extra expression in 'if'".to_string()));
                }
                Some(exp_else)
            }
            None if rest.is_nil() => None,
            None => return Err(Error::Syntax("malformed 'if' expression".to_string())),
        };

        self.generate_expr(bdr, &cond, true, false)?;

        if keep {
            let lbl_then = self.next_label();
            let lbl_end = self.next_label();
            bdr.emit_jump(Opcode::GotoIfNotFalse, lbl_then);
            match &exp_else {
                Some(exp_else) => self.generate_expr(bdr, exp_else, true, tail)?,
                None => {
                    bdr.emit(Opcode::PushNil);
                    if tail {
                        bdr.emit(Opcode::Ret);
                    }
                }
            }
            if !tail {
                bdr.emit_jump(Opcode::Goto, lbl_end);
            }
            bdr.def_label(lbl_then)?;
            self.generate_expr(bdr, &exp_then, true, tail)?;
            bdr.def_label(lbl_end)?;
        } else {
            match &exp_else {
                None => {
                    let lbl_end = self.next_label();
                    bdr.emit_jump(Opcode::GotoIfFalse, lbl_end);
                    self.generate_expr(bdr, &exp_then, false, false)?;
                    bdr.def_label(lbl_end)?;
                }
                Some(exp_else) => {
                    let lbl_then = self.next_label();
                    let lbl_end = self.next_label();
                    bdr.emit_jump(Opcode::GotoIfNotFalse, lbl_then);
                    self.generate_expr(bdr, exp_else, false, false)?;
                    bdr.emit_jump(Opcode::Goto, lbl_end);
                    bdr.def_label(lbl_then)?;
                    self.generate_expr(bdr, &exp_then, false, false)?;
                    bdr.def_label(lbl_end)?;
                }
            }
        }
        Ok(())
    }

    /// `(lambda <formals> <body>...)`
    ///
    /// Formals: a proper list gives a fixed arity, a dotted tail binds
    /// the surplus arguments as a list, and a single identifier binds
    /// the whole argument list.
    fn generate_lambda(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        if !keep {
            // a lambda expression has no side effects
            return Ok(());
        }
        let (formals, body) = expr.uncons().ok_or_else(|| {
            Error::Syntax(
                "lambda expects formal parameters followed by a body".to_string(),
            )
        })?;

        let mut args = Vec::new();
        let mut rest_arg = false;
        match &formals {
            Value::Pair(_) => {
                let mut cursor = formals.clone();
                while let Some((param, rest)) = cursor.uncons() {
                    args.push(filter_symbol(&param)?);
                    cursor = rest;
                }
                if !cursor.is_nil() {
                    args.push(filter_symbol(&cursor)?);
                    rest_arg = true;
                }
            }
            Value::Nil => {}
            other => {
                args.push(filter_symbol(other)?);
                rest_arg = true;
            }
        }

        let mut child = bdr.new_proc_builder(args, rest_arg, None);
        self.generate_body(&mut child, &body, true, true)?;
        bdr.emit_proc(child);
        bdr.emit(Opcode::FixLexical);

        if tail {
            bdr.emit(Opcode::Ret);
        }
        Ok(())
    }

    /// `(define name value)` or `(define (name . formals) body...)`.
    ///
    /// The name is allocated before the value is compiled so that
    /// recursive references resolve.
    fn generate_define(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        let (var, rest) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("empty define expression".to_string()))?;

        let var = match &var {
            Value::SymbolClosure(sc) => Value::Symbol(sc.borrow().symbol()),
            other => other.clone(),
        };

        enum Definition {
            Lambda(Value),
            Expr(Value),
        }

        let (name, definition) = match &var {
            Value::Pair(_) => {
                let (name, formals) = var.uncons().unwrap();
                (
                    filter_symbol(&name)?,
                    Definition::Lambda(Value::cons(formals, rest)),
                )
            }
            Value::Symbol(symbol) => {
                let (value, extra) = rest.uncons().ok_or_else(|| {
                    Error::Syntax("missing value for defined variable".to_string())
                })?;
                if !extra.is_nil() {
                    return Err(Error::Syntax("extra expressions in 'define'".to_string()));
                }
                (*symbol, Definition::Expr(value))
            }
            _ => return Err(Error::Syntax("invalid define expression".to_string())),
        };

        bdr.def_local(name);
        match definition {
            Definition::Lambda(lambda) => self.generate_lambda(bdr, &lambda, true, false)?,
            Definition::Expr(value) => self.generate_expr(bdr, &value, true, false)?,
        }
        if keep {
            bdr.emit(Opcode::Dup);
        }
        bdr.emit_local(LocalAction::Set, name, None)?;
        if tail {
            bdr.emit(Opcode::Ret);
        }
        Ok(())
    }

    fn generate_set(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        let (var, rest) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("empty set! expression".to_string()))?;
        let (value, extra) = rest
            .uncons()
            .ok_or_else(|| Error::Syntax("missing value for set! expression".to_string()))?;
        if !extra.is_nil() {
            return Err(Error::Syntax("extra expressions in 'set!'".to_string()));
        }

        self.generate_expr(bdr, &value, true, false)?;
        if keep {
            bdr.emit(Opcode::Dup);
        }

        match &var {
            Value::Symbol(symbol) => {
                bdr.emit_local(LocalAction::Set, *symbol, None)?;
            }
            Value::SymbolClosure(sc) => {
                let (symbol, sc_env) = {
                    let sc = sc.borrow();
                    (sc.symbol(), sc.env())
                };
                bdr.emit_literal(var.clone());
                bdr.emit_local(LocalAction::Set, symbol, Some(&sc_env))?;
            }
            _ => {
                return Err(Error::Syntax(
                    "invalid set! expression, expecting symbol".to_string(),
                ))
            }
        }

        if tail {
            bdr.emit(Opcode::Ret);
        }
        Ok(())
    }

    fn generate_quote(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        let (datum, _) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("quote expects an expression".to_string()))?;
        // a captured fragment quotes to the bare fragment
        let datum = match &datum {
            Value::DynamicClosure(dc) => dc.borrow().expr().clone(),
            Value::SymbolClosure(sc) => Value::Symbol(sc.borrow().symbol()),
            other => other.clone(),
        };
        if keep {
            bdr.emit_literal(datum);
            if tail {
                bdr.emit(Opcode::Ret);
            }
        }
        Ok(())
    }

    fn generate_or(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        let lbl_end = self.next_label();
        let mut generated = false;

        let mut cursor = expr.clone();
        while let Some((el, rest)) = cursor.uncons() {
            cursor = rest;
            // a bare #f contributes nothing to an or
            if el.is_false() {
                continue;
            }
            generated = true;
            self.generate_expr(bdr, &el, true, false)?;
            if keep {
                bdr.emit(Opcode::Dup);
            }
            bdr.emit_jump(Opcode::GotoIfNotFalse, lbl_end);
            if keep && !cursor.is_nil() {
                bdr.emit(Opcode::Pop);
            }
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax(format!(
                "invalid element in or expression: {}",
                cursor.repr()
            )));
        }
        if keep {
            if !generated {
                bdr.emit(Opcode::PushFalse);
            }
            if tail {
                bdr.emit(Opcode::Ret);
            }
        }
        bdr.def_label(lbl_end)?;
        Ok(())
    }

    fn generate_and(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        let lbl_end = self.next_label();
        let mut generated = false;

        let mut cursor = expr.clone();
        while let Some((el, rest)) = cursor.uncons() {
            cursor = rest;
            // a bare #t contributes nothing to an and
            if matches!(el, Value::Bool(true)) {
                continue;
            }
            generated = true;
            self.generate_expr(bdr, &el, true, false)?;
            if keep {
                bdr.emit(Opcode::Dup);
            }
            bdr.emit_jump(Opcode::GotoIfFalse, lbl_end);
            if keep && !cursor.is_nil() {
                bdr.emit(Opcode::Pop);
            }
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax(format!(
                "invalid element in and expression: {}",
                cursor.repr()
            )));
        }
        if keep {
            if !generated {
                bdr.emit(Opcode::PushTrue);
            }
            if tail {
                bdr.emit(Opcode::Ret);
            }
        }
        bdr.def_label(lbl_end)?;
        Ok(())
    }

    fn generate_define_syntax(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        let (name, rest) = expr.uncons().ok_or_else(|| {
            Error::Syntax("invalid define-syntax expression, expecting macro keyword".to_string())
        })?;
        let name = name.as_symbol().ok_or_else(|| {
            Error::Syntax(format!(
                "expecting macro keyword as a symbol, but got {}",
                name.repr()
            ))
        })?;
        let (rules, extra) = rest.uncons().ok_or_else(|| {
            Error::Syntax("expecting syntax-rules in define-syntax".to_string())
        })?;
        if !extra.is_nil() {
            return Err(Error::Syntax(format!(
                "extra expressions in define-syntax: {}",
                extra.repr()
            )));
        }
        let (rules_head, rules_body) = rules.uncons().ok_or_else(|| {
            Error::Syntax(format!("expecting syntax-rules, but got {}", rules.repr()))
        })?;
        if rules_head.as_symbol() != Some(Symbol::intern("syntax-rules")) {
            return Err(Error::Syntax(format!(
                "expecting syntax-rules, but got {}",
                rules.repr()
            )));
        }

        // Allocate the keyword before constructing the macro so the
        // macro can use itself recursively.
        let idx = bdr.def_local(name);
        let mac = Macro::new(bdr.env(), &rules_body)?;
        bdr.env().borrow_mut().assign(idx, Value::Macro(Handle::new(mac)));

        if keep {
            // the macro itself is a compile-time object; the
            // expression's run-time value is nil
            bdr.emit(Opcode::PushNil);
            if tail {
                bdr.emit(Opcode::Ret);
            }
        }
        Ok(())
    }

    /// `(let ((var val)...) body...)` desugars to an immediate lambda
    /// application: push each init, push the procedure, call it.
    fn generate_let(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        let (bindings, body) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("invalid let expression".to_string()))?;

        let mut params = Vec::new();
        let mut inits = Vec::new();
        let mut cursor = bindings.clone();
        if !cursor.is_nil() && !matches!(cursor, Value::Pair(_)) {
            return Err(Error::Syntax(format!(
                "invalid let expression: expecting bindings, but got {}",
                bindings.repr()
            )));
        }
        while let Some((binding, rest)) = cursor.uncons() {
            let (name, init) = split_binding(&binding, "let")?;
            params.push(name);
            inits.push(init);
            cursor = rest;
        }

        for init in &inits {
            self.generate_expr(bdr, init, true, false)?;
        }

        let mut child = bdr.new_proc_builder(params, false, None);
        self.generate_body(&mut child, &body, true, true)?;
        bdr.emit_proc(child);
        bdr.emit(Opcode::FixLexical);

        let argc = inits.len() as u32;
        if tail {
            bdr.emit1(Opcode::TailCall, argc);
        } else {
            bdr.emit1(Opcode::Call, argc);
            if !keep {
                bdr.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    /// `(letrec ((var val)...) body...)`: every binding is allocated
    /// before any init form is compiled, so the inits may refer to any
    /// of the bound names.
    fn generate_letrec(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        let (bindings, body) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("invalid letrec expression".to_string()))?;

        let mut child = bdr.new_proc_builder(Vec::new(), false, None);

        let mut names = Vec::new();
        let mut inits = Vec::new();
        let mut cursor = bindings;
        while let Some((binding, rest)) = cursor.uncons() {
            let (name, init) = split_binding(&binding, "letrec")?;
            child.def_local(name);
            names.push(name);
            inits.push(init);
            cursor = rest;
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax(format!(
                "invalid bindings for letrec expression: {}",
                cursor.repr()
            )));
        }

        for (name, init) in names.iter().zip(&inits) {
            self.generate_expr(&mut child, init, true, false)?;
            child.emit_local(LocalAction::Set, *name, None)?;
        }
        self.generate_body(&mut child, &body, true, true)?;
        bdr.emit_proc(child);
        bdr.emit(Opcode::FixLexical);

        if tail {
            bdr.emit1(Opcode::TailCall, 0);
        } else {
            bdr.emit1(Opcode::Call, 0);
            if !keep {
                bdr.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    /// `(let* ((var val)...) body...)`: one nested environment;
    /// bindings are allocated and assigned in order, so later inits
    /// see earlier bindings.
    fn generate_letstar(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        let (bindings, body) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("invalid let* expression".to_string()))?;

        let mut child = bdr.new_proc_builder(Vec::new(), false, None);

        let mut cursor = bindings;
        while let Some((binding, rest)) = cursor.uncons() {
            let (name, init) = split_binding(&binding, "let*")?;
            child.def_local(name);
            self.generate_expr(&mut child, &init, true, false)?;
            child.emit_local(LocalAction::Set, name, None)?;
            cursor = rest;
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax(format!(
                "invalid bindings for let* expression: {}",
                cursor.repr()
            )));
        }

        self.generate_body(&mut child, &body, true, true)?;
        bdr.emit_proc(child);
        bdr.emit(Opcode::FixLexical);

        if tail {
            bdr.emit1(Opcode::TailCall, 0);
        } else {
            bdr.emit1(Opcode::Call, 0);
            if !keep {
                bdr.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    /// `(do ((var init step)...) (test result...) body...)`
    fn generate_do(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        let (init_spec, rest) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("invalid do expression".to_string()))?;
        let (exit, body) = rest.uncons().ok_or_else(|| {
            Error::Syntax("invalid do expression, expecting (<test> <result>)".to_string())
        })?;
        let (test_expr, result_expr) = exit.uncons().ok_or_else(|| {
            Error::Syntax("invalid do expression, expecting (<test> <result>)".to_string())
        })?;

        let mut variables = Vec::new();
        let mut init_vals = Vec::new();
        let mut steps: Vec<Option<Value>> = Vec::new();
        let mut cursor = init_spec;
        while let Some((spec, rest)) = cursor.uncons() {
            let (var, spec_rest) = spec
                .uncons()
                .ok_or_else(|| invalid_do_spec(&spec))?;
            let (init, step_rest) = spec_rest
                .uncons()
                .ok_or_else(|| invalid_do_spec(&spec))?;
            variables.push(filter_symbol(&var).map_err(|_| invalid_do_spec(&spec))?);
            init_vals.push(init);
            steps.push(step_rest.uncons().map(|(step, _)| step));
            cursor = rest;
        }
        if !cursor.is_nil() {
            return Err(Error::Syntax("invalid init specs for do expression".to_string()));
        }

        for init in &init_vals {
            self.generate_expr(bdr, init, true, false)?;
        }

        let mut child = bdr.new_proc_builder(variables.clone(), false, None);
        let lbl_test = self.next_label();
        let lbl_end = self.next_label();

        child.def_label(lbl_test)?;
        self.generate_expr(&mut child, &test_expr, true, false)?;
        child.emit_jump(Opcode::GotoIfNotFalse, lbl_end);
        self.generate_body(&mut child, &body, false, false)?;

        // Push all step values first, then store them in reverse, so
        // no step observes this iteration's updates.
        for step in &steps {
            if let Some(step) = step {
                self.generate_expr(&mut child, step, true, false)?;
            }
        }
        for (variable, step) in variables.iter().zip(&steps).rev() {
            if step.is_some() {
                child.emit_local(LocalAction::Set, *variable, None)?;
            }
        }

        child.emit_jump(Opcode::Goto, lbl_test);
        child.def_label(lbl_end)?;
        self.generate_body(&mut child, &result_expr, true, true)?;

        bdr.emit_proc(child);
        bdr.emit(Opcode::FixLexical);

        let argc = init_vals.len() as u32;
        if tail {
            bdr.emit1(Opcode::TailCall, argc);
        } else {
            bdr.emit1(Opcode::Call, argc);
            if !keep {
                bdr.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    /// `(cond (test body...)...)` with `else` and `=>` clauses; a
    /// clause with no body yields its test value; no matching clause
    /// yields nil.
    fn generate_cond(&mut self, bdr: &mut Builder, expr: &Value, keep: bool, tail: bool) -> Result<()> {
        if !matches!(expr, Value::Pair(_)) {
            return Err(Error::Syntax("empty cond expression".to_string()));
        }

        let lbl_end = self.next_label();
        let mut lbl_next = self.next_label();
        // `=>` and test-only clauses fall through with their test
        // value still on the stack; the next clause must drop it.
        let mut dangling_test = false;
        let mut saw_else = false;

        let mut cursor = expr.clone();
        while let Some((clause, rest)) = cursor.uncons() {
            cursor = rest;

            bdr.def_label(lbl_next)?;
            lbl_next = self.next_label();
            if dangling_test {
                bdr.emit(Opcode::Pop);
                dangling_test = false;
            }

            let (pred, body) = clause
                .uncons()
                .ok_or_else(|| Error::Syntax(format!("invalid cond clause: {}", clause.repr())))?;

            if pred.as_symbol() == Some(Symbol::intern("else")) {
                match body.uncons() {
                    None if body.is_nil() => bdr.emit(Opcode::PushTrue),
                    None => {
                        return Err(Error::Syntax(format!(
                            "invalid cond clause: {}",
                            clause.repr()
                        )))
                    }
                    Some((first, arrow_rest)) if first.as_symbol() == Some(Symbol::intern("=>")) => {
                        let (receiver, _) = arrow_rest.uncons().ok_or_else(|| {
                            Error::Syntax(
                                "invalid cond clause, expecting expression after =>".to_string(),
                            )
                        })?;
                        bdr.emit(Opcode::PushTrue);
                        self.generate_expr(bdr, &receiver, true, false)?;
                        bdr.emit1(Opcode::Call, 1);
                    }
                    Some(_) => self.generate_body(bdr, &body, true, false)?,
                }
                bdr.emit_jump(Opcode::Goto, lbl_end);
                saw_else = true;
                break;
            }

            self.generate_expr(bdr, &pred, true, false)?;
            match body.uncons() {
                None if body.is_nil() => {
                    // no body: the test value is the clause value
                    bdr.emit(Opcode::Dup);
                    bdr.emit_jump(Opcode::GotoIfFalse, lbl_next);
                    dangling_test = true;
                }
                None => {
                    return Err(Error::Syntax(format!(
                        "invalid cond clause: {}",
                        clause.repr()
                    )))
                }
                Some((first, arrow_rest)) if first.as_symbol() == Some(Symbol::intern("=>")) => {
                    let (receiver, _) = arrow_rest.uncons().ok_or_else(|| {
                        Error::Syntax(
                            "invalid cond clause, expecting expression after =>".to_string(),
                        )
                    })?;
                    bdr.emit(Opcode::Dup);
                    bdr.emit_jump(Opcode::GotoIfFalse, lbl_next);
                    dangling_test = true;
                    self.generate_expr(bdr, &receiver, true, false)?;
                    bdr.emit1(Opcode::Call, 1);
                }
                Some(_) => {
                    bdr.emit_jump(Opcode::GotoIfFalse, lbl_next);
                    self.generate_body(bdr, &body, true, false)?;
                }
            }
            bdr.emit_jump(Opcode::Goto, lbl_end);
        }

        if saw_else && !cursor.is_nil() {
            return Err(Error::Syntax(format!(
                "extra clauses after else in cond expression: {}",
                cursor.repr()
            )));
        }
        if !saw_else && !cursor.is_nil() {
            return Err(Error::Syntax(format!(
                "invalid cond expression: {}",
                cursor.repr()
            )));
        }

        if !saw_else {
            bdr.def_label(lbl_next)?;
            if dangling_test {
                bdr.emit(Opcode::Pop);
            }
            bdr.emit(Opcode::PushNil);
        }
        bdr.def_label(lbl_end)?;

        if !keep {
            bdr.emit(Opcode::Pop);
        }
        if tail {
            bdr.emit(Opcode::Ret);
        }
        Ok(())
    }

    fn generate_call_cc(
        &mut self,
        bdr: &mut Builder,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        let (receiver, rest) = expr
            .uncons()
            .ok_or_else(|| Error::Syntax("empty call/cc expression".to_string()))?;
        if !rest.is_nil() {
            return Err(Error::Syntax(format!(
                "call/cc only takes one argument, but got extra {}",
                rest.repr()
            )));
        }

        self.generate_expr(bdr, &receiver, true, false)?;
        bdr.emit(Opcode::CallCc);
        if tail {
            bdr.emit(Opcode::Ret);
        }
        if !keep {
            bdr.emit(Opcode::Pop);
        }
        Ok(())
    }

    /// Compile a macro use.
    ///
    /// The rewritten expression is compiled against the macro's
    /// definition environment and wrapped in a dynamic closure whose
    /// run-time environment is fixed to the definition scope's
    /// run-time counterpart. Every closure captured from the use site
    /// is fixed to the use-site environment before the expansion runs.
    fn generate_macro_use(
        &mut self,
        bdr: &mut Builder,
        mac: &Handle<Macro>,
        expr: &Value,
        keep: bool,
        tail: bool,
    ) -> Result<()> {
        let use_env = bdr.env();
        let (expansion, dc_list) = mac.borrow().transform(&use_env, expr)?;
        trace!("macro expansion: {expansion:?}");

        let def_env = mac.borrow().lexical_parent();
        let mut form_bdr = Builder::new(def_env.clone());
        self.generate_expr(&mut form_bdr, &expansion, true, false)?;
        let macro_closure = DynamicClosure::new(def_env.clone(), expansion);
        macro_closure.borrow_mut().form = Some(form_bdr.generate_form()?);
        bdr.emit_literal(Value::DynamicClosure(macro_closure));

        let dist = calc_env_distance(&def_env, &use_env)?;
        if dist == 0 {
            bdr.emit(Opcode::FixLexical);
        } else {
            bdr.emit1(Opcode::FixLexicalDepth, dist as u32);
        }

        // fix the lexical environments of the captured fragments
        for dc in dc_list {
            bdr.emit_literal(dc.clone());
            bdr.emit(Opcode::FixLexicalPop);
            if let Value::DynamicClosure(handle) = &dc {
                let fragment = handle.borrow().expr().clone();
                let mut fragment_bdr = Builder::new(bdr.env());
                self.generate_expr(&mut fragment_bdr, &fragment, true, false)?;
                handle.borrow_mut().form = Some(fragment_bdr.generate_form()?);
            }
        }

        bdr.emit(Opcode::DynamicEval);
        if !keep {
            bdr.emit(Opcode::Pop);
        } else if tail {
            bdr.emit(Opcode::Ret);
        }
        Ok(())
    }
}

/// Numbers, strings, booleans and the empty list evaluate to
/// themselves.
fn self_evaluating(expr: &Value) -> bool {
    matches!(
        expr,
        Value::Nil
            | Value::Bool(_)
            | Value::Integer(_)
            | Value::Real(_)
            | Value::Complex(_)
            | Value::Str(_)
    )
}

/// Accept a symbol or a use-site-captured symbol.
fn filter_symbol(expr: &Value) -> Result<Symbol> {
    match expr {
        Value::Symbol(symbol) => Ok(*symbol),
        Value::SymbolClosure(sc) => Ok(sc.borrow().symbol()),
        other => Err(Error::Syntax(format!(
            "expecting symbol, but got {}",
            other.repr()
        ))),
    }
}

/// Look up a macro binding for a form head, if any.
fn get_macro(env: &Handle<Env>, name: Symbol) -> Option<Handle<Macro>> {
    let location = env::lookup_location(env, name)?;
    let value = location.env.borrow().read(location.idx);
    match value {
        Value::Macro(mac) => Some(mac),
        _ => None,
    }
}

/// Number of parent hops from `descendant` up to `ancestor`.
fn calc_env_distance(ancestor: &Handle<Env>, descendant: &Handle<Env>) -> Result<usize> {
    let mut dist = 0;
    let mut cursor = descendant.clone();
    loop {
        if cursor.ptr_eq(ancestor) {
            return Ok(dist);
        }
        let parent = cursor.borrow().parent().cloned();
        match parent {
            Some(parent) => {
                dist += 1;
                cursor = parent;
            }
            None => {
                return Err(Error::Syntax(
                    "attempt to calculate the distance between unrelated environments".to_string(),
                ))
            }
        }
    }
}

/// Split a `(name init)` binding.
fn split_binding(binding: &Value, form: &str) -> Result<(Symbol, Value)> {
    let invalid = || {
        Error::Syntax(format!(
            "invalid binding for {form} expression: {}",
            binding.repr()
        ))
    };
    let (name, rest) = binding.uncons().ok_or_else(invalid)?;
    let (init, extra) = rest.uncons().ok_or_else(invalid)?;
    if !extra.is_nil() {
        return Err(invalid());
    }
    Ok((filter_symbol(&name).map_err(|_| invalid())?, init))
}

fn invalid_do_spec(spec: &Value) -> Error {
    Error::Syntax(format!(
        "invalid init spec for do expression: {}",
        spec.repr()
    ))
}
