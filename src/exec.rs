/// The execution context and expression evaluator.
///
/// `Context` owns the configuration, the global symbol table, the frame
/// stack (one frame per live user-defined operator call), and the operator
/// registry. Early return travels as `Flow::Return` through evaluator
/// results and is caught at the operator-body boundary, never as a panic.
///
/// Evaluation order is right to left everywhere it is observable: binary
/// operands, vector literal elements, and index expressions.
use std::collections::{HashMap, HashSet};
use std::io::Write;

use crate::ast::{Expr, ItemKind, OpDef};
use crate::conf::Config;
use crate::core::value::Value;
use crate::errors::{EvalError, Result};
use crate::fold;
use crate::format;
use crate::index;
use crate::matrix;
use crate::ops;
use crate::parse;
use crate::vector::Vector;

/// The result of evaluating one expression. `Quiet` values suppress REPL
/// echo (assignments); `Return` unwinds to the enclosing operator body.
#[derive(Debug)]
pub enum Flow {
    Value(Value),
    Quiet(Value),
    Return(Value),
}

impl Flow {
    pub fn value(self) -> Value {
        match self {
            Flow::Value(v) | Flow::Quiet(v) | Flow::Return(v) => v,
        }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self, Flow::Quiet(_))
    }
}

/// Variable resolution inside a frame: a name is unknown until first
/// observed, local once assigned first, and pinned to the global once read
/// first.
enum Binding {
    Local(Value),
    Global,
}

struct Frame {
    #[allow(dead_code)]
    name: String,
    vars: HashMap<String, Binding>,
}

pub struct Context {
    pub config: Config,
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    unary_defs: HashMap<String, OpDef>,
    binary_defs: HashMap<String, OpDef>,
    /// Last-set source position: the line of the statement being evaluated.
    line: usize,
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Context::with_config(Config::new())
    }

    pub fn with_config(config: Config) -> Self {
        Context {
            config,
            globals: HashMap::new(),
            frames: Vec::new(),
            unary_defs: HashMap::new(),
            binary_defs: HashMap::new(),
            line: 1,
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// The line of the statement most recently evaluated (or the one whose
    /// parse failed); drivers prefix error reports with it.
    pub fn current_line(&self) -> usize {
        self.line
    }

    // ── Program entry points ─────────────────────────────────────────────────

    /// Parse and evaluate a source unit; the last value is returned (None
    /// when the unit defines operators only). A true colon guard
    /// short-circuits the statement list. A failing statement does not stop
    /// the ones after it; the first error is returned once the unit is done.
    pub fn run(&mut self, src: &str) -> Result<Option<Value>> {
        let mut last = None;
        let mut first: Option<EvalError> = None;
        self.run_each(
            src,
            |_, _, _| {},
            |_, e| {
                if first.is_none() {
                    first = Some(e.clone());
                }
            },
            &mut last,
        );
        match first {
            Some(e) => Err(e),
            None => Ok(last),
        }
    }

    /// Evaluate a source unit, echoing every non-quiet statement value to
    /// the configured output. Each statement error is handed to `on_error`
    /// at its boundary and evaluation continues with the next statement;
    /// true means at least one statement failed.
    pub fn run_line(
        &mut self,
        src: &str,
        on_error: impl FnMut(&Context, &EvalError),
    ) -> bool {
        let mut last = None;
        self.run_each(
            src,
            |ctx, v, quiet| {
                if !quiet {
                    let text = format::sprint(&ctx.config, v);
                    let out = ctx.config.output();
                    let _ = writeln!(out.lock(), "{}", text);
                }
            },
            on_error,
            &mut last,
        )
    }

    fn run_each(
        &mut self,
        src: &str,
        mut emit: impl FnMut(&Context, &Value, bool),
        mut on_error: impl FnMut(&Context, &EvalError),
        last: &mut Option<Value>,
    ) -> bool {
        let items = match parse::parse(
            &self.config,
            src,
            self.unary_defs.keys().cloned().collect::<HashSet<_>>(),
            self.binary_defs.keys().cloned().collect::<HashSet<_>>(),
        ) {
            Ok(items) => items,
            Err((line, e)) => {
                self.line = line;
                on_error(self, &e);
                return true;
            }
        };
        let mut had_error = false;
        for item in items {
            self.line = item.line;
            let flow = match item.kind {
                ItemKind::OpDef(def) => match self.define(def) {
                    Ok(()) => continue,
                    Err(e) => Err(e),
                },
                ItemKind::Expr(e) => self.eval(&e),
            };
            match flow {
                Err(e) => {
                    on_error(self, &e);
                    had_error = true;
                }
                Ok(Flow::Return(v)) => {
                    emit(self, &v, false);
                    *last = Some(v);
                    return had_error;
                }
                Ok(Flow::Quiet(v)) => {
                    emit(self, &v, true);
                    *last = Some(v);
                }
                Ok(Flow::Value(v)) => {
                    emit(self, &v, false);
                    *last = Some(v);
                }
            }
        }
        had_error
    }

    pub fn define(&mut self, def: OpDef) -> Result<()> {
        let clash = match def.left {
            Some(_) => ops::is_binary_op(&def.name),
            None => ops::is_unary_op(&def.name),
        };
        if clash {
            return Err(EvalError::type_err(format!(
                "cannot redefine builtin operator {}",
                def.name
            )));
        }
        if def.left.is_some() {
            self.binary_defs.insert(def.name.clone(), def);
        } else {
            self.unary_defs.insert(def.name.clone(), def);
        }
        Ok(())
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    pub fn eval(&mut self, e: &Expr) -> Result<Flow> {
        match e {
            Expr::Const(v) => Ok(Flow::Value(v.clone())),
            Expr::Var(name) => Ok(Flow::Value(self.read_var(name)?)),
            Expr::Unary { op, right } => self.eval_unary(op, right),
            Expr::Binary { op, left, right } => {
                if op == "=" {
                    return self.eval_assign(left, right);
                }
                self.eval_binary(op, left, right)
            }
            Expr::VectorLit(elems) => {
                let mut values = Vec::with_capacity(elems.len());
                for e in elems.iter().rev() {
                    values.push(self.eval_v(e)?);
                }
                values.reverse();
                Ok(Flow::Value(Value::Vector(Vector::from_values(values))))
            }
            Expr::Index { left, indexes } => {
                let mut resolved = vec![None; indexes.len()];
                for (i, ix) in indexes.iter().enumerate().rev() {
                    if let Some(e) = ix {
                        resolved[i] = Some(self.eval_v(e)?);
                    }
                }
                let base = self.eval_v(left)?;
                Ok(Flow::Value(index::index(&self.config, &base, &resolved)?))
            }
            Expr::Cond { cond, value } => {
                if self.eval_v(cond)?.is_true()? {
                    Ok(Flow::Return(self.eval_v(value)?))
                } else {
                    Ok(Flow::Quiet(Value::zero()))
                }
            }
            Expr::While { cond, body } => {
                loop {
                    if !self.eval_v(cond)?.is_true()? {
                        return Ok(Flow::Quiet(Value::zero()));
                    }
                    for s in body {
                        if let Flow::Return(v) = self.eval(s)? {
                            return Ok(Flow::Return(v));
                        }
                    }
                }
            }
            Expr::If {
                cond,
                then_body,
                else_body,
            } => {
                let branch = if self.eval_v(cond)?.is_true()? {
                    then_body
                } else {
                    else_body
                };
                let mut last = Flow::Quiet(Value::zero());
                for s in branch {
                    let flow = self.eval(s)?;
                    if let Flow::Return(v) = flow {
                        return Ok(Flow::Return(v));
                    }
                    last = flow;
                }
                Ok(last)
            }
            Expr::Ret(inner) => {
                let v = match inner {
                    Some(e) => self.eval_v(e)?,
                    None => Value::zero(),
                };
                Ok(Flow::Return(v))
            }
        }
    }

    /// Evaluate to a plain value; early return is not legal here.
    fn eval_v(&mut self, e: &Expr) -> Result<Value> {
        match self.eval(e)? {
            Flow::Return(_) => Err(EvalError::type_err("ret is only valid as a statement")),
            flow => Ok(flow.value()),
        }
    }

    fn eval_unary(&mut self, op: &str, right: &Expr) -> Result<Flow> {
        if op == "ivy" {
            let v = self.eval_v(right)?;
            let src = char_vector_text(&v)?;
            let out = self.run(&src)?;
            return Ok(Flow::Value(out.unwrap_or_else(Value::zero)));
        }
        let v = self.eval_v(right)?;
        if op == "print" {
            let text = format::sprint(&self.config, &v);
            let out = self.config.output();
            let _ = writeln!(out.lock(), "{}", text);
            return Ok(Flow::Quiet(v));
        }
        if let Some(def) = self.unary_defs.get(op).cloned() {
            return self.call_user(&def, None, v);
        }
        if let Some(base) = op.strip_suffix('/') {
            if self.binary_defs.contains_key(base) {
                return Ok(Flow::Value(self.user_reduce(base, &v)?));
            }
            return Ok(Flow::Value(fold::reduce(&self.config, base, &v)?));
        }
        if let Some(base) = op.strip_suffix('\\') {
            if self.binary_defs.contains_key(base) {
                return Ok(Flow::Value(self.user_scan(base, &v)?));
            }
            return Ok(Flow::Value(fold::scan(&self.config, base, &v)?));
        }
        Ok(Flow::Value(ops::eval_unary(&self.config, op, &v)?))
    }

    fn eval_binary(&mut self, op: &str, left: &Expr, right: &Expr) -> Result<Flow> {
        // Right to left: assignments inside the right operand are visible to
        // the left one.
        let rv = self.eval_v(right)?;
        let lv = self.eval_v(left)?;
        self.apply_binary(op, &lv, &rv).map(Flow::Value)
    }

    /// Dispatch a binary operator by name: products, user-defined, builtin.
    fn apply_binary(&mut self, op: &str, lv: &Value, rv: &Value) -> Result<Value> {
        if let Some(rest) = op.strip_prefix("o.") {
            if self.binary_defs.contains_key(rest) {
                return self.user_outer(rest, lv, rv);
            }
            return fold::outer(&self.config, lv, rest, rv);
        }
        if let Some((lhs, rhs)) = op.split_once('.') {
            if self.binary_defs.contains_key(lhs) || self.binary_defs.contains_key(rhs) {
                return self.user_inner(lhs, rhs, lv, rv);
            }
            return fold::inner(&self.config, lv, lhs, rhs, rv);
        }
        if let Some(def) = self.binary_defs.get(op).cloned() {
            return Ok(self.call_user(&def, Some(lv.clone()), rv.clone())?.value());
        }
        ops::eval_binary(&self.config, lv, op, rv)
    }

    // ── Assignment ───────────────────────────────────────────────────────────

    fn eval_assign(&mut self, target: &Expr, right: &Expr) -> Result<Flow> {
        let value = self.eval_v(right)?;
        self.assign_target(target, value.clone())?;
        Ok(Flow::Quiet(value))
    }

    fn assign_target(&mut self, target: &Expr, value: Value) -> Result<()> {
        match target {
            Expr::Var(name) => {
                self.set_var(name, value);
                Ok(())
            }
            Expr::Index { left, indexes } => {
                let name = match left.as_ref() {
                    Expr::Var(name) => name.clone(),
                    other => {
                        return Err(EvalError::type_err(format!(
                            "cannot assign through {:?}",
                            other
                        )))
                    }
                };
                let mut resolved = vec![None; indexes.len()];
                for (i, ix) in indexes.iter().enumerate().rev() {
                    if let Some(e) = ix {
                        resolved[i] = Some(self.eval_v(e)?);
                    }
                }
                let current = self.read_var(&name)?;
                let updated = index::assign_indexed(&self.config, &current, &resolved, &value)?;
                self.set_var(&name, updated);
                Ok(())
            }
            Expr::VectorLit(elems) => {
                let names: Vec<&String> = elems
                    .iter()
                    .map(|e| match e {
                        Expr::Var(name) => Ok(name),
                        other => Err(EvalError::type_err(format!(
                            "cannot assign to {:?}",
                            other
                        ))),
                    })
                    .collect::<Result<_>>()?;
                let vec = match &value {
                    Value::Vector(v) if v.len() == names.len() => v.clone(),
                    Value::Vector(v) => {
                        return Err(EvalError::shape(format!(
                            "assignment mismatch: {} names, {} values",
                            names.len(),
                            v.len()
                        )))
                    }
                    _ => {
                        return Err(EvalError::type_err(
                            "simultaneous assignment needs a vector",
                        ))
                    }
                };
                for i in (0..names.len()).rev() {
                    let name = names[i].clone();
                    self.set_var(&name, vec.at(i));
                }
                Ok(())
            }
            other => Err(EvalError::type_err(format!(
                "cannot assign to {:?}",
                other
            ))),
        }
    }

    // ── Variables ────────────────────────────────────────────────────────────

    fn read_var(&mut self, name: &str) -> Result<Value> {
        if let Some(frame) = self.frames.last_mut() {
            match frame.vars.get(name) {
                Some(Binding::Local(v)) => return Ok(v.clone()),
                Some(Binding::Global) => {}
                None => {
                    if self.globals.contains_key(name) {
                        // First read pins the name to the global.
                        frame.vars.insert(name.to_string(), Binding::Global);
                    } else {
                        return Err(EvalError::Name(name.to_string()));
                    }
                }
            }
        }
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Name(name.to_string()))
    }

    fn set_var(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            match frame.vars.get(name) {
                Some(Binding::Global) => {
                    self.globals.insert(name.to_string(), value);
                }
                _ => {
                    // First write makes the name local.
                    frame.vars.insert(name.to_string(), Binding::Local(value));
                }
            }
            return;
        }
        self.globals.insert(name.to_string(), value);
    }

    // ── User-defined operators ───────────────────────────────────────────────

    fn call_user(&mut self, def: &OpDef, left: Option<Value>, right: Value) -> Result<Flow> {
        if self.frames.len() >= self.config.max_stack() {
            return Err(EvalError::overflow(format!(
                "stack overflow: {} calls in {}",
                self.frames.len(),
                def.name
            )));
        }
        let mut vars = HashMap::new();
        vars.insert(def.right.clone(), Binding::Local(right));
        if let (Some(value), Some(name)) = (left, def.left.as_ref()) {
            vars.insert(name.clone(), Binding::Local(value));
        }
        self.frames.push(Frame {
            name: def.name.clone(),
            vars,
        });
        let result = self.eval_op_body(&def.body);
        self.frames.pop();
        result.map(Flow::Value)
    }

    /// Run an operator body and catch the early-return unwind.
    fn eval_op_body(&mut self, body: &[Expr]) -> Result<Value> {
        let mut last = Value::zero();
        for s in body {
            match self.eval(s)? {
                Flow::Return(v) => return Ok(v),
                flow => last = flow.value(),
            }
        }
        Ok(last)
    }

    // ── Sequential folds over user-defined operators ─────────────────────────
    //
    // User operators may have side effects, so these never parallelize.

    fn user_apply(&mut self, op: &str, u: &Value, v: &Value) -> Result<Value> {
        self.apply_binary(op, u, v)
    }

    fn user_reduce(&mut self, op: &str, v: &Value) -> Result<Value> {
        match v {
            Value::Vector(vec) => {
                if vec.is_empty() {
                    return Ok(Value::Vector(Vector::empty()));
                }
                let mut acc = vec.at(vec.len() - 1);
                for i in (0..vec.len() - 1).rev() {
                    acc = self.user_apply(op, &vec.at(i), &acc)?;
                }
                Ok(acc)
            }
            Value::Matrix(m) => {
                let width = *m.shape().last().unwrap_or(&0);
                if width == 0 {
                    return fold::reduce(&self.config, op, v);
                }
                let rows = m.elems() / width;
                let data = m.ravel();
                let mut out = Vec::with_capacity(rows);
                for r in 0..rows {
                    let mut acc = data.at((r + 1) * width - 1);
                    for c in (0..width - 1).rev() {
                        acc = self.user_apply(op, &data.at(r * width + c), &acc)?;
                    }
                    out.push(acc);
                }
                matrix::demote(
                    m.shape()[..m.rank() - 1].to_vec(),
                    Vector::from_values(out),
                )
            }
            scalar => Ok(scalar.clone()),
        }
    }

    fn user_scan(&mut self, op: &str, v: &Value) -> Result<Value> {
        match v {
            Value::Vector(vec) => {
                let mut out = Vec::with_capacity(vec.len());
                for i in 0..vec.len() {
                    let prefix = Value::Vector(Vector::from_values(
                        (0..=i).map(|k| vec.at(k)).collect(),
                    ));
                    out.push(self.user_reduce(op, &prefix)?);
                }
                Ok(Value::Vector(Vector::from_values(out)))
            }
            _ => Err(EvalError::type_err(format!(
                "scan of user operator {} needs a vector",
                op
            ))),
        }
    }

    fn user_inner(&mut self, lhs: &str, rhs: &str, u: &Value, v: &Value) -> Result<Value> {
        let (un, uv) = linear_parts(u);
        let (vn, vv) = linear_parts(v);
        if un != vn {
            return Err(EvalError::shape(format!(
                "inner product: length mismatch {} vs {}",
                un, vn
            )));
        }
        if un == 0 {
            return Err(EvalError::shape("inner product over empty axis"));
        }
        let mut terms = Vec::with_capacity(un);
        for k in 0..un {
            terms.push(self.user_apply(rhs, &uv.at(k), &vv.at(k))?);
        }
        self.user_reduce(lhs, &Value::Vector(Vector::from_values(terms)))
    }

    fn user_outer(&mut self, op: &str, u: &Value, v: &Value) -> Result<Value> {
        let (_, uv) = linear_parts(u);
        let (_, vv) = linear_parts(v);
        let mut out = Vec::with_capacity(uv.len() * vv.len());
        for i in 0..uv.len() {
            for j in 0..vv.len() {
                out.push(self.user_apply(op, &uv.at(i), &vv.at(j))?);
            }
        }
        match (u, v) {
            (Value::Vector(a), Value::Vector(b)) => matrix::demote(
                vec![a.len(), b.len()],
                Vector::from_values(out),
            ),
            _ => Ok(Value::Vector(Vector::from_values(out))),
        }
    }
}

fn char_vector_text(v: &Value) -> Result<String> {
    match v {
        Value::Char(c) => Ok(c.to_string()),
        Value::Vector(vec) if vec.all_chars() => Ok(vec
            .iter()
            .map(|c| match c {
                Value::Char(ch) => ch,
                _ => ' ',
            })
            .collect()),
        _ => Err(EvalError::type_err(format!(
            "ivy needs program text, not {}",
            v.type_name()
        ))),
    }
}

fn linear_parts(v: &Value) -> (usize, Vector) {
    match v {
        Value::Vector(vec) => (vec.len(), vec.clone()),
        Value::Matrix(m) => (m.elems(), m.ravel()),
        scalar => (1, Vector::from_values(vec![scalar.clone()])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_last(src: &str) -> Value {
        let mut ctx = Context::new();
        ctx.run(src).unwrap().expect("a value")
    }

    fn sprint_last(src: &str) -> String {
        let mut ctx = Context::new();
        let v = ctx.run(src).unwrap().expect("a value");
        format::sprint(&ctx.config, &v)
    }

    #[test]
    fn right_to_left_arithmetic() {
        assert_eq!(run_last("1 + 2 * 3"), Value::Int(7));
        assert_eq!(run_last("2 * 3 + 1"), Value::Int(8));
    }

    #[test]
    fn assignment_inside_expression() {
        assert_eq!(run_last("x = 1000; x + x = 2"), Value::Int(4));
    }

    #[test]
    fn assignment_is_quiet() {
        let mut ctx = Context::new();
        let items = parse::parse(
            &ctx.config,
            "x = 5",
            HashSet::new(),
            HashSet::new(),
        )
        .unwrap();
        match &items[0].kind {
            ItemKind::Expr(e) => {
                let flow = ctx.eval(e).unwrap();
                assert!(flow.is_quiet());
                assert_eq!(flow.value(), Value::Int(5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn errors_do_not_stop_the_statement_list() {
        let mut ctx = Context::new();
        let err = ctx.run("x = 1; 1 / 0; y = 2").unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
        assert_eq!(ctx.global("x"), Some(&Value::Int(1)));
        assert_eq!(ctx.global("y"), Some(&Value::Int(2)));
    }

    #[test]
    fn statement_errors_carry_their_line() {
        let mut ctx = Context::new();
        let mut reports: Vec<(usize, String)> = Vec::new();
        let had_error = ctx.run_line("nope\nx = 7\n1 / 0", |ctx, e| {
            reports.push((ctx.current_line(), e.to_string()));
        });
        assert!(had_error);
        assert_eq!(
            reports,
            vec![
                (1, "undefined variable \"nope\"".to_string()),
                (3, "division by zero".to_string()),
            ]
        );
        // The statement between the failures still ran.
        assert_eq!(ctx.global("x"), Some(&Value::Int(7)));
    }

    #[test]
    fn parse_errors_report_the_failing_line() {
        let mut ctx = Context::new();
        let mut lines = Vec::new();
        let had_error = ctx.run_line("1 + 2\n3 + ]", |ctx, _| {
            lines.push(ctx.current_line());
        });
        assert!(had_error);
        assert_eq!(lines, vec![2]);
    }

    #[test]
    fn simultaneous_assignment_right_to_left() {
        let mut ctx = Context::new();
        ctx.run("(a b) = 10 20").unwrap();
        assert_eq!(ctx.global("a"), Some(&Value::Int(10)));
        assert_eq!(ctx.global("b"), Some(&Value::Int(20)));
    }

    #[test]
    fn reduction_and_scan() {
        assert_eq!(run_last("+/ iota 100"), Value::Int(5050));
        assert_eq!(sprint_last("+\\ 1 2 3 4"), "1 3 6 10");
        assert_eq!(sprint_last("1 2 3 +.* 4 5 6"), "32");
    }

    #[test]
    fn user_ops_with_early_return() {
        let src = "op fact n = n <= 1: 1; n * fact n-1\nfact 20";
        assert_eq!(sprint_last(src), "2432902008176640000");
        let src = "op fact n = n <= 1: 1; n * fact n-1\nfact 25";
        assert_eq!(sprint_last(src), "15511210043330985984000000");
    }

    #[test]
    fn binary_user_op() {
        let src = "op a gcd b = b == 0: a; b gcd a mod b\n12 gcd 18";
        assert_eq!(run_last(src), Value::Int(6));
    }

    #[test]
    fn user_op_reduction_is_sequential_but_correct() {
        let src = "op a plus b = a + b\nplus/ iota 10";
        assert_eq!(run_last(src), Value::Int(55));
    }

    #[test]
    fn local_and_global_variables() {
        let mut ctx = Context::new();
        // x is read first inside the op, so it stays global; y is assigned
        // first, so it is local.
        ctx.run("x = 1\nop bump n = { x = x + n; y = 99; y }\nbump 5")
            .unwrap();
        assert_eq!(ctx.global("x"), Some(&Value::Int(6)));
        assert_eq!(ctx.global("y"), None);
    }

    #[test]
    fn matrix_scenario() {
        let src = "A = 3 3 rho 1 2 3 4 5 6 7 8 9; A[2; 2]";
        assert_eq!(run_last(src), Value::Int(5));
        let src = "A = 3 3 rho 1 2 3 4 5 6 7 8 9; A[2;2] = 99; +/, A";
        assert_eq!(run_last(src), Value::Int(139));
    }

    #[test]
    fn char_catenation() {
        assert_eq!(sprint_last("'abc' , 'def'"), "abcdef");
    }

    #[test]
    fn while_loop_with_ret() {
        let src = "op countdown n = { while n > 0 { n == 3: 99; n = n - 1 }; n }\ncountdown 10";
        assert_eq!(run_last(src), Value::Int(99));
        let src = "op f n = { while n > 0 { n = n - 1 }; n }\nf 5";
        assert_eq!(run_last(src), Value::Int(0));
    }

    #[test]
    fn if_else_chain() {
        let src = "op sign n = { if n > 0 { 1 } else if n < 0 { 0 - 1 } else { 0 } }\nsign 0 - 5";
        // Right to left: sign (0 - 5).
        assert_eq!(run_last(src), Value::Int(-1));
    }

    #[test]
    fn undefined_variable_reports_name() {
        let mut ctx = Context::new();
        let err = ctx.run("nope + 1").unwrap_err();
        assert_eq!(err.to_string(), "undefined variable \"nope\"");
    }

    #[test]
    fn stack_overflow_guard() {
        let mut ctx = Context::new();
        ctx.config.set_max_stack(100).unwrap();
        let err = ctx.run("op f n = f n\nf 1").unwrap_err();
        assert!(err.to_string().contains("stack overflow"), "{}", err);
    }

    #[test]
    fn ivy_operator_evaluates_text() {
        assert_eq!(run_last("ivy '2 + 3'"), Value::Int(5));
    }

    #[test]
    fn outer_product_through_syntax() {
        assert_eq!(sprint_last("1 2 o.* 10 20"), "10 20\n20 40");
    }

    #[test]
    fn indexing_round_trip_property() {
        let src = "v = 10 20 30; v[2] = 7; v[2]";
        assert_eq!(run_last(src), Value::Int(7));
    }
}
