//! Hand-written recursive-descent / Pratt parser (spec §1: the parser is
//! an external collaborator whose AST output is specified in §3; grounded
//! in `original_source/muni2wasm/parser.py`'s precedence table and
//! statement dispatch, extended for generics, list/null/string literals
//! and the compound-assignment sugar of SPEC_FULL §B).
//!
//! Generic type-argument lists (`f<T>(...)`, `Box<int>`) share the `<`/`>`
//! operator tokens with comparisons. Declaration-position types are
//! unambiguous (a type never appears where a comparison could), so
//! `parse_type` consumes `<...>` greedily there. In expression position
//! the parser speculatively parses a `<...>` list and only commits to it
//! if it is immediately followed by `(` — otherwise it backtracks and
//! treats the tokens as comparison operators.

use thiserror::Error;

use crate::ast::{
    BinOp, Expr, FunctionDeclaration, ImportDeclaration, Literal, MethodDeclaration, Position,
    Program, StaticField, Stmt, StructureDeclaration, TopLevel, TypeExpr, UnaryOp,
};
use crate::lexer::{tokenize, LexError, Token, TokenKind};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{pos}: Expected {expected}, got {got}")]
    UnexpectedToken {
        pos: Position,
        expected: String,
        got: String,
    },
    #[error("{pos}: {message}")]
    Message { pos: Position, message: String },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(e) => e.position(),
            ParseError::UnexpectedToken { pos, .. } => *pos,
            ParseError::Message { pos, .. } => *pos,
        }
    }
}

pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn op_precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "==" | "!=" | "<" | "<=" | ">" | ">=" => 5,
        "+" | "-" => 10,
        "*" | "/" | "%" => 20,
        _ => return None,
    })
}

fn binop_of(op: &str) -> BinOp {
    match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "&&" => BinOp::And,
        "||" => BinOp::Or,
        other => unreachable!("not a binary operator: {other}"),
    }
}

fn compound_assign_op(op: &str) -> Option<BinOp> {
    Some(match op {
        "+=" => BinOp::Add,
        "-=" => BinOp::Sub,
        "*=" => BinOp::Mul,
        "/=" => BinOp::Div,
        "%=" => BinOp::Mod,
        _ => return None,
    })
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_token(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn checkpoint(&self) -> usize {
        self.pos
    }

    fn restore(&mut self, cp: usize) {
        self.pos = cp;
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let tok = self.peek_token().clone();
        if tok.kind == kind {
            self.next();
            Ok(tok)
        } else {
            Err(ParseError::UnexpectedToken {
                pos: tok.pos,
                expected: kind.to_string(),
                got: tok.kind.to_string(),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<Token, ParseError> {
        self.expect(TokenKind::Ident)
    }

    fn expect_op(&mut self, op: &'static str) -> Result<Token, ParseError> {
        self.expect(TokenKind::Op(op))
    }

    // ---- top level -----------------------------------------------------

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut items = Vec::new();
        while self.peek() != &TokenKind::Eof {
            if self.peek() == &TokenKind::Import {
                items.push(TopLevel::Import(self.parse_import()?));
            } else if self.peek() == &TokenKind::Structure {
                items.push(TopLevel::Structure(self.parse_structure()?));
            } else if self.at_function_decl() {
                items.push(TopLevel::Function(self.parse_function()?));
            } else {
                items.push(TopLevel::Statement(self.parse_stmt(true)?));
            }
        }
        Ok(Program { items })
    }

    fn at_function_decl(&mut self) -> bool {
        let cp = self.checkpoint();
        let ok = self.parse_function_header_probe().is_ok();
        self.restore(cp);
        ok
    }

    fn parse_function_header_probe(&mut self) -> Result<(), ParseError> {
        self.parse_type()?;
        self.expect_ident()?;
        if self.peek() == &TokenKind::Op("<") {
            self.parse_optional_type_param_names()?;
        }
        self.expect(TokenKind::LParen)?;
        Ok(())
    }

    fn parse_import(&mut self) -> Result<ImportDeclaration, ParseError> {
        let kw = self.expect(TokenKind::Import)?;
        if self.peek() == &TokenKind::StringLit {
            let path_tok = self.next();
            self.expect(TokenKind::Semi)?;
            return Ok(ImportDeclaration {
                source: Some(path_tok.text),
                module: None,
                name: None,
                params: Vec::new(),
                return_type: TypeExpr::void(),
                pos: kw.pos,
            });
        }
        let module_tok = self.expect_ident()?;
        self.expect(TokenKind::Dot)?;
        let name_tok = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                params.push(self.parse_type()?);
                if self.peek() == &TokenKind::Comma {
                    self.next();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Arrow)?;
        let return_type = self.parse_type()?;
        self.expect(TokenKind::Semi)?;
        Ok(ImportDeclaration {
            source: None,
            module: Some(module_tok.text),
            name: Some(name_tok.text),
            params,
            return_type,
            pos: kw.pos,
        })
    }

    fn parse_structure(&mut self) -> Result<StructureDeclaration, ParseError> {
        let kw = self.expect(TokenKind::Structure)?;
        let name_tok = self.expect_ident()?;
        let type_params = self.parse_optional_type_param_names()?;
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut static_fields = Vec::new();
        let mut methods = Vec::new();

        while self.peek() != &TokenKind::RBrace {
            if self.peek() == &TokenKind::Static {
                let cp = self.checkpoint();
                self.next();
                if let Some(sf) = self.try_parse_static_field()? {
                    static_fields.push(sf);
                    continue;
                }
                self.restore(cp);
            } else {
                let cp = self.checkpoint();
                if let Some(f) = self.try_parse_field()? {
                    fields.push(f);
                    continue;
                }
                self.restore(cp);
            }
            methods.push(self.parse_method()?);
        }
        self.expect(TokenKind::RBrace)?;

        Ok(StructureDeclaration {
            name: name_tok.text,
            type_params,
            fields,
            static_fields,
            methods,
            pos: kw.pos,
        })
    }

    /// `static` has already been consumed by the caller; on failure the
    /// caller restores to before it.
    fn try_parse_static_field(&mut self) -> Result<Option<StaticField>, ParseError> {
        let pos = self.peek_token().pos;
        let ty = match self.parse_type() {
            Ok(t) => t,
            Err(_) => return Ok(None),
        };
        if self.peek() != &TokenKind::Ident {
            return Ok(None);
        }
        let name_tok = self.next();
        if self.peek() != &TokenKind::Assign {
            return Ok(None);
        }
        self.next();
        let value = match self.peek().clone() {
            TokenKind::Number => {
                let n: i64 = self.next().text.parse().map_err(|_| ParseError::Message {
                    pos,
                    message: "invalid integer literal".into(),
                })?;
                Literal::Int(n)
            }
            TokenKind::True => {
                self.next();
                Literal::Bool(true)
            }
            TokenKind::False => {
                self.next();
                Literal::Bool(false)
            }
            _ => return Ok(None),
        };
        if self.peek() != &TokenKind::Semi {
            return Ok(None);
        }
        self.next();
        Ok(Some(StaticField {
            name: name_tok.text,
            type_: ty,
            value,
            pos,
        }))
    }

    fn try_parse_field(&mut self) -> Result<Option<(String, TypeExpr)>, ParseError> {
        let ty = match self.parse_type() {
            Ok(t) => t,
            Err(_) => return Ok(None),
        };
        if self.peek() != &TokenKind::Ident {
            return Ok(None);
        }
        let name_tok = self.next();
        if self.peek() != &TokenKind::Semi {
            return Ok(None);
        }
        self.next();
        Ok(Some((name_tok.text, ty)))
    }

    fn parse_method(&mut self) -> Result<MethodDeclaration, ParseError> {
        let pos = self.peek_token().pos;
        let mut is_static = false;
        if self.peek() == &TokenKind::Static {
            is_static = true;
            self.next();
        }
        let return_type = self.parse_type()?;
        let name_tok = self.expect_ident()?;
        let type_params = self.parse_optional_type_param_names()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_param_list()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmts()?;
        self.expect(TokenKind::RBrace)?;
        Ok(MethodDeclaration {
            name: name_tok.text,
            type_params,
            params,
            return_type,
            body,
            is_static,
            pos,
        })
    }

    fn parse_function(&mut self) -> Result<FunctionDeclaration, ParseError> {
        let pos = self.peek_token().pos;
        let return_type = self.parse_type()?;
        let name_tok = self.expect_ident()?;
        let type_params = self.parse_optional_type_param_names()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_param_list()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmts()?;
        self.expect(TokenKind::RBrace)?;
        Ok(FunctionDeclaration {
            name: name_tok.text,
            type_params,
            params,
            return_type,
            body,
            pos,
        })
    }

    fn parse_param_list(&mut self) -> Result<Vec<(String, TypeExpr)>, ParseError> {
        let mut params = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                let ty = self.parse_type()?;
                let name_tok = self.expect_ident()?;
                params.push((name_tok.text, ty));
                if self.peek() == &TokenKind::Comma {
                    self.next();
                    continue;
                }
                break;
            }
        }
        Ok(params)
    }

    fn parse_optional_type_param_names(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = Vec::new();
        if self.peek() == &TokenKind::Op("<") {
            self.next();
            loop {
                names.push(self.expect_ident()?.text);
                if self.peek() == &TokenKind::Comma {
                    self.next();
                    continue;
                }
                break;
            }
            self.expect_op(">")?;
        }
        Ok(names)
    }

    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let tok = self.peek_token().clone();
        let name = match &tok.kind {
            TokenKind::Int => {
                self.next();
                "int".to_string()
            }
            TokenKind::Bool => {
                self.next();
                "boolean".to_string()
            }
            TokenKind::Void => {
                self.next();
                "void".to_string()
            }
            TokenKind::Ident => {
                self.next();
                tok.text
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    pos: tok.pos,
                    expected: "a type".into(),
                    got: other.to_string(),
                })
            }
        };
        let mut params = Vec::new();
        if self.peek() == &TokenKind::Op("<") {
            self.next();
            if self.peek() != &TokenKind::Op(">") {
                loop {
                    params.push(self.parse_type()?);
                    if self.peek() == &TokenKind::Comma {
                        self.next();
                        continue;
                    }
                    break;
                }
            }
            self.expect_op(">")?;
        }
        if name == "string" && params.is_empty() {
            // `string` is sugar for the host-ABI `vec` structure (SPEC_FULL §C).
            return Ok(TypeExpr::simple("vec"));
        }
        Ok(TypeExpr { name, params })
    }

    // ---- statements ------------------------------------------------------

    fn parse_block_stmts(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while self.peek() != &TokenKind::RBrace {
            stmts.push(self.parse_stmt(true)?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self, want_semi: bool) -> Result<Stmt, ParseError> {
        let tok = self.peek_token().clone();
        match tok.kind {
            TokenKind::Return => {
                self.next();
                let expr = if self.peek() != &TokenKind::Semi {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                if want_semi {
                    self.expect(TokenKind::Semi)?;
                }
                Ok(Stmt::Return { expr, pos: tok.pos })
            }
            TokenKind::Break => {
                self.next();
                if want_semi {
                    self.expect(TokenKind::Semi)?;
                }
                Ok(Stmt::Break(tok.pos))
            }
            TokenKind::Continue => {
                self.next();
                if want_semi {
                    self.expect(TokenKind::Semi)?;
                }
                Ok(Stmt::Continue(tok.pos))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Until => self.parse_until(),
            TokenKind::For => self.parse_for(),
            TokenKind::Do => self.parse_do(),
            TokenKind::Int | TokenKind::Bool | TokenKind::Void => self.parse_var_decl(want_semi),
            _ => {
                if let Some(stmt) = self.try_parse_var_decl(want_semi)? {
                    return Ok(stmt);
                }
                self.parse_expr_or_assignment_stmt(want_semi)
            }
        }
    }

    fn parse_var_decl(&mut self, want_semi: bool) -> Result<Stmt, ParseError> {
        let pos = self.peek_token().pos;
        let ty = self.parse_type()?;
        let name_tok = self.expect_ident()?;
        let expr = if self.peek() == &TokenKind::Assign {
            self.next();
            Some(self.parse_expr()?)
        } else {
            None
        };
        if want_semi {
            self.expect(TokenKind::Semi)?;
        }
        Ok(Stmt::VarDecl {
            type_: ty,
            name: name_tok.text,
            expr,
            pos,
        })
    }

    /// Speculative: `Ident ('<' Type,* '>')? Ident ('=' Expr)? ';'`.
    fn try_parse_var_decl(&mut self, want_semi: bool) -> Result<Option<Stmt>, ParseError> {
        if self.peek() != &TokenKind::Ident {
            return Ok(None);
        }
        let cp = self.checkpoint();
        let pos = self.peek_token().pos;
        let ty = match self.parse_type() {
            Ok(t) => t,
            Err(_) => {
                self.restore(cp);
                return Ok(None);
            }
        };
        if self.peek() != &TokenKind::Ident {
            self.restore(cp);
            return Ok(None);
        }
        let name_tok = self.next();
        let expr = if self.peek() == &TokenKind::Assign {
            self.next();
            match self.parse_expr() {
                Ok(e) => Some(e),
                Err(_) => {
                    self.restore(cp);
                    return Ok(None);
                }
            }
        } else {
            None
        };
        if want_semi && self.peek() != &TokenKind::Semi {
            self.restore(cp);
            return Ok(None);
        }
        if want_semi {
            self.next();
        }
        Ok(Some(Stmt::VarDecl {
            type_: ty,
            name: name_tok.text,
            expr,
            pos,
        }))
    }

    fn parse_expr_or_assignment_stmt(&mut self, want_semi: bool) -> Result<Stmt, ParseError> {
        let pos = self.peek_token().pos;
        let expr = self.parse_expr()?;

        if self.peek() == &TokenKind::Assign {
            self.next();
            let rhs = self.parse_expr()?;
            if want_semi {
                self.expect(TokenKind::Semi)?;
            }
            return self.build_assignment(expr, rhs, pos);
        }

        if let &TokenKind::Op(op) = self.peek() {
            if let Some(binop) = compound_assign_op(op) {
                self.next();
                let rhs = self.parse_expr()?;
                if want_semi {
                    self.expect(TokenKind::Semi)?;
                }
                let desugared = Expr::Binary(binop, Box::new(expr.clone()), Box::new(rhs), pos);
                return self.build_assignment(expr, desugared, pos);
            }
            if op == "++" || op == "--" {
                self.next();
                if want_semi {
                    self.expect(TokenKind::Semi)?;
                }
                let binop = if op == "++" { BinOp::Add } else { BinOp::Sub };
                let one = Expr::Int(1, pos);
                let desugared = Expr::Binary(binop, Box::new(expr.clone()), Box::new(one), pos);
                return self.build_assignment(expr, desugared, pos);
            }
        }

        if want_semi {
            self.expect(TokenKind::Semi)?;
        }
        Ok(Stmt::Expr(expr, pos))
    }

    fn build_assignment(&self, target: Expr, rhs: Expr, pos: Position) -> Result<Stmt, ParseError> {
        if !target.is_lvalue_shape() {
            return Err(ParseError::Message {
                pos: target.pos(),
                message: "invalid assignment target".into(),
            });
        }
        match target {
            Expr::Ident(name, _) => Ok(Stmt::VarAssign { name, expr: rhs, pos }),
            Expr::MemberAccess(m) => Ok(Stmt::MemberAssign {
                object: m.object,
                field: m.field,
                expr: rhs,
                pos,
            }),
            _ => unreachable!("is_lvalue_shape guarantees Ident or MemberAccess"),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let then_body = self.parse_block_stmts()?;
        self.expect(TokenKind::RBrace)?;
        let else_body = self.parse_optional_else()?;
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            pos: kw.pos,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmts()?;
        self.expect(TokenKind::RBrace)?;
        let else_body = self.parse_optional_else()?;
        Ok(Stmt::While {
            cond,
            body,
            else_body,
            pos: kw.pos,
        })
    }

    fn parse_until(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::Until)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmts()?;
        self.expect(TokenKind::RBrace)?;
        let else_body = self.parse_optional_else()?;
        Ok(Stmt::Until {
            cond,
            body,
            else_body,
            pos: kw.pos,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        let init = if self.peek() != &TokenKind::Semi {
            Some(Box::new(self.parse_stmt(false)?))
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;

        let cond = if self.peek() != &TokenKind::Semi {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;

        let post = if self.peek() != &TokenKind::RParen {
            Some(Box::new(self.parse_stmt(false)?))
        } else {
            None
        };
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmts()?;
        self.expect(TokenKind::RBrace)?;
        let else_body = self.parse_optional_else()?;

        Ok(Stmt::For {
            init,
            cond,
            post,
            body,
            else_body,
            pos: kw.pos,
        })
    }

    fn parse_do(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::Do)?;
        let count = if self.peek() != &TokenKind::LBrace {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmts()?;
        self.expect(TokenKind::RBrace)?;

        let cond = if self.peek() == &TokenKind::While {
            self.next();
            self.expect(TokenKind::LParen)?;
            let c = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            Some(c)
        } else {
            None
        };

        let else_body = self.parse_optional_else()?;

        Ok(Stmt::Do {
            count,
            cond,
            body,
            else_body,
            pos: kw.pos,
        })
    }

    fn parse_optional_else(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.peek() == &TokenKind::Else {
            self.next();
            self.expect(TokenKind::LBrace)?;
            let body = self.parse_block_stmts()?;
            self.expect(TokenKind::RBrace)?;
            Ok(body)
        } else {
            Ok(Vec::new())
        }
    }

    // ---- expressions -----------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(s) => *s,
                _ => break,
            };
            let Some(prec) = op_precedence(op) else { break };
            if prec < min_prec {
                break;
            }
            let pos = self.peek_token().pos;
            self.next();
            let rhs = self.parse_expr_bp(prec + 1)?;
            lhs = Expr::Binary(binop_of(op), Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek_token().clone();
        if tok.kind == TokenKind::Op("!") {
            self.next();
            let e = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(e), tok.pos));
        }
        if tok.kind == TokenKind::Op("-") {
            self.next();
            let e = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(e), tok.pos));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            if self.peek() == &TokenKind::Dot {
                self.next();
                let field_tok = self.expect_ident()?;
                let method_type_args = self.try_call_type_args();
                if self.peek() == &TokenKind::LParen {
                    let args = self.parse_call_args()?;
                    node = Expr::method_call(node, field_tok.text, method_type_args, args, field_tok.pos);
                } else {
                    node = Expr::member_access(node, field_tok.text, field_tok.pos);
                }
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek_token().clone();
        match tok.kind {
            TokenKind::Number => {
                self.next();
                let n: i64 = tok.text.parse().map_err(|_| ParseError::Message {
                    pos: tok.pos,
                    message: "invalid integer literal".into(),
                })?;
                Ok(Expr::Int(n, tok.pos))
            }
            TokenKind::True => {
                self.next();
                Ok(Expr::Bool(true, tok.pos))
            }
            TokenKind::False => {
                self.next();
                Ok(Expr::Bool(false, tok.pos))
            }
            TokenKind::Null => {
                self.next();
                Ok(Expr::Null(tok.pos))
            }
            TokenKind::StringLit => {
                self.next();
                Ok(Expr::StringLit(tok.text, tok.pos))
            }
            TokenKind::LBracket => self.parse_list_literal(),
            TokenKind::LParen => {
                self.next();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::Ident => {
                self.next();
                let name = tok.text;
                let type_args = self.try_call_type_args();
                if self.peek() == &TokenKind::LParen {
                    let args = self.parse_call_args()?;
                    Ok(Expr::call(name, type_args, args, tok.pos))
                } else {
                    Ok(Expr::Ident(name, tok.pos))
                }
            }
            other => Err(ParseError::UnexpectedToken {
                pos: tok.pos,
                expected: "an expression".into(),
                got: other.to_string(),
            }),
        }
    }

    fn parse_list_literal(&mut self) -> Result<Expr, ParseError> {
        let tok = self.expect(TokenKind::LBracket)?;
        let mut elems = Vec::new();
        if self.peek() != &TokenKind::RBracket {
            loop {
                elems.push(self.parse_expr()?);
                if self.peek() == &TokenKind::Comma {
                    self.next();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::ListLiteral(elems, tok.pos))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                args.push(self.parse_expr()?);
                if self.peek() == &TokenKind::Comma {
                    self.next();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    /// Speculatively parses `'<' Type,* '>'` only when followed by `(`,
    /// otherwise leaves the token stream untouched and returns an empty
    /// list (so that e.g. `a < b` is never mistaken for a generic call).
    fn try_call_type_args(&mut self) -> Vec<TypeExpr> {
        if self.peek() != &TokenKind::Op("<") {
            return Vec::new();
        }
        let cp = self.checkpoint();
        match self.attempt_call_type_args() {
            Some(args) => args,
            None => {
                self.restore(cp);
                Vec::new()
            }
        }
    }

    fn attempt_call_type_args(&mut self) -> Option<Vec<TypeExpr>> {
        self.next();
        let mut args = Vec::new();
        if self.peek() != &TokenKind::Op(">") {
            loop {
                args.push(self.parse_type().ok()?);
                if self.peek() == &TokenKind::Comma {
                    self.next();
                    continue;
                }
                break;
            }
        }
        if self.peek() != &TokenKind::Op(">") {
            return None;
        }
        self.next();
        if self.peek() != &TokenKind::LParen {
            return None;
        }
        Some(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_function_with_arithmetic_precedence() {
        let prog = parse("void main() { write_int(1 + 2 * 3); }").unwrap();
        let main = prog.find_function("main").unwrap();
        match &main.body[0] {
            Stmt::Expr(Expr::Call(c), _) => {
                assert_eq!(c.name, "write_int");
                match &c.args[0] {
                    Expr::Binary(BinOp::Add, l, r, _) => {
                        assert!(matches!(**l, Expr::Int(1, _)));
                        assert!(matches!(**r, Expr::Binary(BinOp::Mul, ..)));
                    }
                    other => panic!("unexpected arg: {other:?}"),
                }
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn parses_generic_struct_and_constructor_call() {
        let src = "structure Box<T> { T value; static Box<T> Box(T v) { this.value = v; } T get() { return this.value; } } void main() { Box<int> b = Box<int>(42); }";
        let prog = parse(src).unwrap();
        let sd = prog.find_struct("Box").unwrap();
        assert_eq!(sd.type_params, vec!["T".to_string()]);
        assert!(sd.constructor().is_some());
        let main = prog.find_function("main").unwrap();
        match &main.body[0] {
            Stmt::VarDecl { type_, expr: Some(Expr::Call(c)), .. } => {
                assert_eq!(type_.name, "Box");
                assert_eq!(type_.params[0], TypeExpr::int());
                assert_eq!(c.name, "Box");
                assert_eq!(c.type_args, vec![TypeExpr::int()]);
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn comparison_is_not_mistaken_for_generic_call() {
        let prog = parse("void main() { int x = 0; if (x < 1) { x = x + 1; } }").unwrap();
        let main = prog.find_function("main").unwrap();
        match &main.body[1] {
            Stmt::If { cond: Expr::Binary(BinOp::Lt, ..), .. } => {}
            other => panic!("expected a comparison if, got {other:?}"),
        }
    }

    #[test]
    fn compound_assignment_desugars_to_binary() {
        let prog = parse("void main() { int x = 1; x += 2; x++; }").unwrap();
        let main = prog.find_function("main").unwrap();
        match &main.body[1] {
            Stmt::VarAssign { expr: Expr::Binary(BinOp::Add, ..), .. } => {}
            other => panic!("unexpected: {other:?}"),
        }
        match &main.body[2] {
            Stmt::VarAssign { expr: Expr::Binary(BinOp::Add, _, r, _), .. } => {
                assert!(matches!(**r, Expr::Int(1, _)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_host_import_declaration() {
        let prog = parse("import env.print(int) -> void;").unwrap();
        let imp = prog.imports().next().unwrap();
        assert_eq!(imp.module.as_deref(), Some("env"));
        assert_eq!(imp.name.as_deref(), Some("print"));
        assert_eq!(imp.params, vec![TypeExpr::int()]);
    }

    #[test]
    fn parses_file_import_declaration() {
        let prog = parse("import \"std/io.mun\";").unwrap();
        let imp = prog.imports().next().unwrap();
        assert_eq!(imp.source.as_deref(), Some("std/io.mun"));
    }

    #[test]
    fn parses_list_literal() {
        let prog = parse("void main() { int a = 0; [1, 2, 3]; }").unwrap();
        let main = prog.find_function("main").unwrap();
        assert!(matches!(&main.body[1], Stmt::Expr(Expr::ListLiteral(elems, _), _) if elems.len() == 3));
    }
}
