/// Recursive-descent parser for the right-to-left expression grammar.
///
/// Binary operators share one precedence level and associate to the right;
/// a unary operator binds everything to its right. Adjacent operands
/// juxtapose into a vector literal. The parser is told which identifiers
/// name user-defined operators so applications parse before definitions are
/// evaluated; an `op` definition registers its own name before its body is
/// parsed, which is what makes recursion work.
use std::collections::HashSet;

use crate::ast::{Expr, Item, ItemKind, OpDef};
use crate::core::value::Value;
use crate::errors::{EvalError, Result};
use crate::ops;
use crate::scan::Token;
use crate::vector::Vector;

const KEYWORDS: &[&str] = &["op", "while", "if", "else", "ret"];

/// Punctuation operators that may open an expression as unary.
const UNARY_PUNCT: &[&str] = &["+", "-", "/", ",", "?", "!", "^"];

pub struct Parser {
    tokens: Vec<Token>,
    lines: Vec<usize>,
    pos: usize,
    user_unary: HashSet<String>,
    user_binary: HashSet<String>,
}

impl Parser {
    pub fn new(
        tokens: Vec<(Token, usize)>,
        user_unary: HashSet<String>,
        user_binary: HashSet<String>,
    ) -> Self {
        let (tokens, lines) = tokens.into_iter().unzip();
        Parser {
            tokens,
            lines,
            pos: 0,
            user_unary,
            user_binary,
        }
    }

    /// Source line of the token the parser is looking at.
    pub fn current_line(&self) -> usize {
        let i = self.pos.min(self.lines.len().saturating_sub(1));
        self.lines.get(i).copied().unwrap_or(1)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens.get(self.pos + ahead).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token, context: &str) -> Result<()> {
        let got = self.bump();
        if &got == want {
            Ok(())
        } else {
            Err(EvalError::Parse(format!(
                "expected {:?} in {}, found {:?}",
                want, context, got
            )))
        }
    }

    fn is_unary_name(&self, id: &str) -> bool {
        self.user_unary.contains(id) || ops::is_unary_op(id)
    }

    fn is_binary_name(&self, id: &str) -> bool {
        self.user_binary.contains(id) || ops::is_binary_op(id)
    }

    // ── Program structure ────────────────────────────────────────────────────

    pub fn parse_program(&mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        loop {
            while matches!(self.peek(), Token::Newline | Token::Semicolon) {
                self.pos += 1;
            }
            if self.peek() == &Token::Eof {
                return Ok(items);
            }
            let line = self.current_line();
            let kind = if self.peek() == &Token::Ident("op".into()) {
                ItemKind::OpDef(self.parse_opdef()?)
            } else {
                ItemKind::Expr(self.parse_statement()?)
            };
            items.push(Item { line, kind });
        }
    }

    fn parse_opdef(&mut self) -> Result<OpDef> {
        self.expect(&Token::Ident("op".into()), "operator definition")?;
        let mut names = Vec::new();
        while let Token::Ident(id) = self.peek() {
            names.push(id.clone());
            self.pos += 1;
        }
        self.expect(&Token::Assign, "operator definition")?;
        let (name, left, right) = match names.len() {
            2 => (names[0].clone(), None, names[1].clone()),
            3 => (names[1].clone(), Some(names[0].clone()), names[2].clone()),
            n => {
                return Err(EvalError::Parse(format!(
                    "operator definition takes 2 or 3 names, found {}",
                    n
                )))
            }
        };
        // Visible to its own body, so recursion parses.
        if left.is_some() {
            self.user_binary.insert(name.clone());
        } else {
            self.user_unary.insert(name.clone());
        }
        let body = if self.peek() == &Token::LBrace {
            self.pos += 1;
            let b = self.parse_block()?;
            self.expect(&Token::RBrace, "operator body")?;
            b
        } else {
            let mut b = vec![self.parse_statement()?];
            while self.peek() == &Token::Semicolon {
                self.pos += 1;
                b.push(self.parse_statement()?);
            }
            b
        };
        Ok(OpDef {
            name,
            left,
            right,
            body,
        })
    }

    /// Statements inside braces, separated by semicolons or newlines.
    fn parse_block(&mut self) -> Result<Vec<Expr>> {
        let mut body = Vec::new();
        loop {
            while matches!(self.peek(), Token::Newline | Token::Semicolon) {
                self.pos += 1;
            }
            if matches!(self.peek(), Token::RBrace | Token::Eof) {
                return Ok(body);
            }
            body.push(self.parse_statement()?);
        }
    }

    /// An expression, possibly guarded: `cond : value` returns early from
    /// the enclosing body.
    fn parse_statement(&mut self) -> Result<Expr> {
        let e = self.parse_expr()?;
        if self.peek() == &Token::Colon {
            self.pos += 1;
            let value = self.parse_expr()?;
            return Ok(Expr::Cond {
                cond: Box::new(e),
                value: Box::new(value),
            });
        }
        Ok(e)
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr> {
        match self.peek() {
            Token::Ident(id) if id == "while" => self.parse_while(),
            Token::Ident(id) if id == "if" => self.parse_if(),
            Token::Ident(id) if id == "ret" => {
                self.pos += 1;
                if self.starts_expression() {
                    Ok(Expr::Ret(Some(Box::new(self.parse_expr()?))))
                } else {
                    Ok(Expr::Ret(None))
                }
            }
            _ => self.parse_operator_expr(),
        }
    }

    fn starts_expression(&self) -> bool {
        match self.peek() {
            Token::Number(_) | Token::Str(_) | Token::LParen => true,
            Token::Ident(id) => !matches!(id.as_str(), "else" | "op"),
            Token::Op(o) => UNARY_PUNCT.contains(&o.as_str()),
            _ => false,
        }
    }

    fn parse_while(&mut self) -> Result<Expr> {
        self.pos += 1;
        let cond = self.parse_operator_expr()?;
        self.expect(&Token::LBrace, "while body")?;
        let body = self.parse_block()?;
        self.expect(&Token::RBrace, "while body")?;
        Ok(Expr::While {
            cond: Box::new(cond),
            body,
        })
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.pos += 1;
        let cond = self.parse_operator_expr()?;
        self.expect(&Token::LBrace, "if body")?;
        let then_body = self.parse_block()?;
        self.expect(&Token::RBrace, "if body")?;
        let mut else_body = Vec::new();
        if self.peek() == &Token::Ident("else".into()) {
            self.pos += 1;
            if self.peek() == &Token::Ident("if".into()) {
                // `elif` chains nest as else-if.
                else_body.push(self.parse_if()?);
            } else {
                self.expect(&Token::LBrace, "else body")?;
                else_body = self.parse_block()?;
                self.expect(&Token::RBrace, "else body")?;
            }
        }
        Ok(Expr::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    fn parse_operator_expr(&mut self) -> Result<Expr> {
        if let Some(op) = self.take_prefix_op() {
            return Ok(Expr::Unary {
                op,
                right: Box::new(self.parse_expr()?),
            });
        }
        let operand = self.parse_operand()?;
        match self.peek().clone() {
            Token::Assign => {
                self.pos += 1;
                Ok(Expr::Binary {
                    op: "=".into(),
                    left: Box::new(operand),
                    right: Box::new(self.parse_expr()?),
                })
            }
            Token::Op(o) => {
                self.pos += 1;
                let op = self.finish_product(o)?;
                Ok(Expr::Binary {
                    op,
                    left: Box::new(operand),
                    right: Box::new(self.parse_expr()?),
                })
            }
            Token::Ident(id) if id == "o" && self.peek_at(1) == &Token::Dot => {
                self.pos += 2;
                let rhs = self.take_product_op("outer product")?;
                Ok(Expr::Binary {
                    op: format!("o.{}", rhs),
                    left: Box::new(operand),
                    right: Box::new(self.parse_expr()?),
                })
            }
            Token::Ident(id) if self.is_binary_name(&id) => {
                self.pos += 1;
                let op = self.finish_product(id)?;
                Ok(Expr::Binary {
                    op,
                    left: Box::new(operand),
                    right: Box::new(self.parse_expr()?),
                })
            }
            _ => Ok(operand),
        }
    }

    /// After a binary operator symbol, a dot continues into an inner
    /// product: `lhs.rhs`.
    fn finish_product(&mut self, lhs: String) -> Result<String> {
        if self.peek() == &Token::Dot {
            self.pos += 1;
            let rhs = self.take_product_op("inner product")?;
            return Ok(format!("{}.{}", lhs, rhs));
        }
        Ok(lhs)
    }

    fn take_product_op(&mut self, context: &str) -> Result<String> {
        match self.bump() {
            Token::Op(o) => Ok(o),
            Token::Ident(id) if self.is_binary_name(&id) => Ok(id),
            other => Err(EvalError::Parse(format!(
                "expected operator in {}, found {:?}",
                context, other
            ))),
        }
    }

    /// A reduction, scan, or unary operator opening an expression.
    fn take_prefix_op(&mut self) -> Option<String> {
        match self.peek().clone() {
            Token::Op(o) => {
                // `op/` reduces, `op\` scans.
                if let Token::Op(suffix) = self.peek_at(1) {
                    if (suffix == "/" || suffix == "\\") && ops::is_binary_op(&o) {
                        let name = format!("{}{}", o, suffix);
                        self.pos += 2;
                        return Some(name);
                    }
                }
                // `-3` is a negative literal, not unary minus.
                if o == "-" && matches!(self.peek_at(1), Token::Number(_)) {
                    return None;
                }
                if UNARY_PUNCT.contains(&o.as_str()) {
                    self.pos += 1;
                    return Some(o);
                }
                None
            }
            Token::Ident(id) if !KEYWORDS.contains(&id.as_str()) => {
                if self.is_binary_name(&id) {
                    if let Token::Op(suffix) = self.peek_at(1) {
                        if suffix == "/" || suffix == "\\" {
                            let name = format!("{}{}", id, suffix);
                            self.pos += 2;
                            return Some(name);
                        }
                    }
                }
                if self.is_unary_name(&id) {
                    self.pos += 1;
                    return Some(id);
                }
                None
            }
            _ => None,
        }
    }

    /// Juxtaposed atoms, each with optional index suffixes.
    fn parse_operand(&mut self) -> Result<Expr> {
        let mut elems = Vec::new();
        loop {
            let atom = match self.peek().clone() {
                // A leading minus glued to a number is a negative literal;
                // after the first atom, minus always reads as subtraction.
                Token::Op(o) if o == "-" && elems.is_empty() => {
                    let Token::Number(v) = self.peek_at(1).clone() else {
                        break;
                    };
                    self.pos += 2;
                    Expr::Const(negate_literal(v))
                }
                Token::Number(v) => {
                    self.pos += 1;
                    Expr::Const(v)
                }
                Token::Str(s) => {
                    self.pos += 1;
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Expr::Const(Value::Char(c)),
                        _ => Expr::Const(Value::Vector(Vector::from_chars(&s))),
                    }
                }
                Token::Ident(id)
                    if !KEYWORDS.contains(&id.as_str())
                        && !self.is_unary_name(&id)
                        && !self.is_binary_name(&id)
                        // `o.` opens an outer product, never a variable.
                        && !(id == "o" && self.peek_at(1) == &Token::Dot) =>
                {
                    self.pos += 1;
                    Expr::Var(id)
                }
                Token::LParen => {
                    self.pos += 1;
                    let inner = self.parse_expr()?;
                    self.expect(&Token::RParen, "parenthesized expression")?;
                    inner
                }
                _ => break,
            };
            elems.push(self.parse_index_suffix(atom)?);
        }
        match elems.len() {
            0 => Err(EvalError::Parse(format!(
                "unexpected token {:?}",
                self.peek()
            ))),
            1 => Ok(elems.pop().expect("one element")),
            _ => Ok(Expr::VectorLit(elems)),
        }
    }

    fn parse_index_suffix(&mut self, mut atom: Expr) -> Result<Expr> {
        while self.peek() == &Token::LBracket {
            self.pos += 1;
            let mut indexes = Vec::new();
            loop {
                match self.peek() {
                    Token::Semicolon => {
                        indexes.push(None);
                        self.pos += 1;
                    }
                    Token::RBracket => {
                        if indexes.is_empty() || self.tokens.get(self.pos - 1) == Some(&Token::Semicolon)
                        {
                            indexes.push(None);
                        }
                        self.pos += 1;
                        break;
                    }
                    _ => {
                        indexes.push(Some(self.parse_expr()?));
                        match self.peek() {
                            Token::Semicolon => {
                                self.pos += 1;
                                if self.peek() == &Token::RBracket {
                                    indexes.push(None);
                                    self.pos += 1;
                                    break;
                                }
                            }
                            Token::RBracket => {
                                self.pos += 1;
                                break;
                            }
                            other => {
                                return Err(EvalError::Parse(format!(
                                    "expected ; or ] in index, found {:?}",
                                    other
                                )))
                            }
                        }
                    }
                }
            }
            atom = Expr::Index {
                left: Box::new(atom),
                indexes,
            };
        }
        Ok(atom)
    }
}

/// Negate a numeric literal in place; a complex literal negates its real
/// component.
fn negate_literal(v: Value) -> Value {
    match v {
        Value::Int(i) => Value::from_i64(-i),
        Value::Big(b) => Value::from_big(-b),
        Value::Rat(r) => Value::from_rat(-r),
        Value::Float(f) => Value::Float(f.neg()),
        Value::Complex(c) => Value::complex(negate_literal(c.re.clone()), c.im.clone()),
        other => other,
    }
}

/// Scan and parse one source unit. A failure reports the line the front end
/// had reached, so the driver can prefix its message with a position.
pub fn parse(
    conf: &crate::conf::Config,
    src: &str,
    user_unary: HashSet<String>,
    user_binary: HashSet<String>,
) -> std::result::Result<Vec<Item>, (usize, EvalError)> {
    let tokens = crate::scan::scan(conf, src)?;
    let mut parser = Parser::new(tokens, user_unary, user_binary);
    parser
        .parse_program()
        .map_err(|e| (parser.current_line(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::Config;

    fn parse_one(src: &str) -> Expr {
        let items = parse(&Config::new(), src, HashSet::new(), HashSet::new()).unwrap();
        match items.into_iter().next().unwrap().kind {
            ItemKind::Expr(e) => e,
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn right_associative_binaries() {
        // 1 + 2 * 3 parses as 1 + (2 * 3).
        match parse_one("1 + 2 * 3") {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, "+");
                assert!(matches!(*right, Expr::Binary { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unary_binds_rest_of_expression() {
        match parse_one("abs 3 - 5") {
            Expr::Unary { op, right } => {
                assert_eq!(op, "abs");
                assert!(matches!(*right, Expr::Binary { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn leading_minus_makes_negative_literals() {
        assert!(matches!(parse_one("-3"), Expr::Const(Value::Int(-3))));
        // In a juxtaposed vector the first atom may be negative...
        match parse_one("-1 2") {
            Expr::VectorLit(elems) => {
                assert!(matches!(elems[0], Expr::Const(Value::Int(-1))))
            }
            other => panic!("unexpected {:?}", other),
        }
        // ...but after an operand, minus is subtraction.
        assert!(matches!(parse_one("3 -1"), Expr::Binary { ref op, .. } if op == "-"));
        // Unary minus still applies to non-literal operands.
        assert!(matches!(parse_one("- x"), Expr::Unary { ref op, .. } if op == "-"));
    }

    #[test]
    fn vector_literals_juxtapose() {
        match parse_one("1 2 3") {
            Expr::VectorLit(elems) => assert_eq!(elems.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reductions_scans_products() {
        assert!(matches!(parse_one("+/ 1 2 3"), Expr::Unary { op, .. } if op == "+/"));
        assert!(matches!(parse_one("+\\ 1 2 3"), Expr::Unary { op, .. } if op == "+\\"));
        assert!(matches!(parse_one("min/ 1 2 3"), Expr::Unary { op, .. } if op == "min/"));
        assert!(
            matches!(parse_one("a +.* b"), Expr::Binary { op, .. } if op == "+.*")
        );
        assert!(
            matches!(parse_one("a o.* b"), Expr::Binary { op, .. } if op == "o.*")
        );
    }

    #[test]
    fn indexing_with_placeholders() {
        match parse_one("a[1; 2]") {
            Expr::Index { indexes, .. } => {
                assert_eq!(indexes.len(), 2);
                assert!(indexes.iter().all(Option::is_some));
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse_one("a[; 2]") {
            Expr::Index { indexes, .. } => {
                assert!(indexes[0].is_none());
                assert!(indexes[1].is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn assignment_parses_in_expression_position() {
        match parse_one("x + x = 2") {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, "+");
                assert!(matches!(*right, Expr::Binary { ref op, .. } if op == "="));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn op_definitions() {
        let items = parse(
            &Config::new(),
            "op fact n = n <= 1: 1; n * fact n-1",
            HashSet::new(),
            HashSet::new(),
        )
        .unwrap();
        match &items[0].kind {
            ItemKind::OpDef(def) => {
                assert_eq!(def.name, "fact");
                assert_eq!(def.right, "n");
                assert!(def.left.is_none());
                assert_eq!(def.body.len(), 2);
                assert!(matches!(def.body[0], Expr::Cond { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn binary_op_definition_and_use() {
        let items = parse(
            &Config::new(),
            "op a gcd b = b == 0: a; b gcd a mod b\n12 gcd 18",
            HashSet::new(),
            HashSet::new(),
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].line, 1);
        assert_eq!(items[1].line, 2);
        match &items[1].kind {
            ItemKind::Expr(Expr::Binary { op, .. }) => assert_eq!(op, "gcd"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn control_flow_forms() {
        let e = parse_one("while x > 0 { x = x - 1 }");
        assert!(matches!(e, Expr::While { .. }));
        let e = parse_one("if x { 1 } else if y { 2 } else { 3 }");
        match e {
            Expr::If { else_body, .. } => {
                assert!(matches!(else_body[0], Expr::If { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
