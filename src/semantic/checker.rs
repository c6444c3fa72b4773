//! The pure, instantiation-parameterized type-checking core (spec §4.1,
//! §4.2). Both the semantic analyzer (`super::Analyzer`) and the code
//! generator call into this module; neither mutates the AST to cache a
//! node's type the way `original_source/muni2wasm/semantics.py` annotates
//! nodes in place, because the same shared body is re-checked once per
//! generic instantiation under a different substitution — a cached
//! annotation would only ever hold the last pass's answer. Instead every
//! entry point here takes an explicit `Subst` and recomputes from scratch.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ast::{Expr, Stmt, StructureDeclaration, TypeExpr, UnaryOp};
use crate::subst::{self, Subst};

use super::errors::SemanticError;

pub type TypeEnv = HashMap<String, TypeExpr>;

#[derive(Debug, Clone)]
pub struct FuncSig {
    pub type_params: Vec<String>,
    pub params: Vec<TypeExpr>,
    pub return_type: TypeExpr,
}

/// Everything the checker needs to know about declared names. Built once
/// from the fully-inlined `Program` and shared (read-only) across every
/// instantiation that gets checked. `IndexMap`, not `HashMap`: iteration
/// order here (declaration order) feeds directly into the analyzer's
/// instantiation-discovery seeding, which in turn determines codegen's
/// emission order — `HashMap`'s per-instance randomized hasher would make
/// compiling the same program twice produce byte-different WAT (spec §8
/// determinism invariant).
pub struct Ctx<'a> {
    pub structs: IndexMap<&'a str, &'a StructureDeclaration>,
    pub func_sigs: IndexMap<&'a str, FuncSig>,
}

impl<'a> Ctx<'a> {
    pub fn is_struct(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn is_struct_closure(&self) -> impl Fn(&str) -> bool + '_ {
        move |name: &str| self.is_struct(name)
    }
}

/// Receives instantiation facts discovered while checking an expression or
/// statement tree. The semantic analyzer records these to drive its
/// worklist; the code generator, which runs after the analyzer has already
/// reached a fixed point, uses `NullSink` since nothing new should appear.
pub trait InstSink {
    fn record_struct(&mut self, name: &str, type_args: &[TypeExpr]);
    fn record_fn(&mut self, name: &str, type_args: &[TypeExpr]);
    fn record_method(&mut self, struct_name: &str, struct_args: &[TypeExpr], method_name: &str, method_args: &[TypeExpr]);
}

pub struct NullSink;

impl InstSink for NullSink {
    fn record_struct(&mut self, _name: &str, _type_args: &[TypeExpr]) {}
    fn record_fn(&mut self, _name: &str, _type_args: &[TypeExpr]) {}
    fn record_method(&mut self, _struct_name: &str, _struct_args: &[TypeExpr], _method_name: &str, _method_args: &[TypeExpr]) {}
}

fn resolve(sigma: &Subst, ty: &TypeExpr) -> TypeExpr {
    subst::subst(sigma, ty)
}

fn types_compatible(ctx: &Ctx, expected: &TypeExpr, actual: &TypeExpr) -> bool {
    subst::types_compatible(expected, actual, ctx.is_struct_closure())
}

pub fn infer_expr(
    ctx: &Ctx,
    env: &TypeEnv,
    sigma: &Subst,
    sink: &mut dyn InstSink,
    expr: &Expr,
) -> Result<TypeExpr, SemanticError> {
    match expr {
        Expr::Int(_, _) => Ok(TypeExpr::int()),
        Expr::Bool(_, _) => Ok(TypeExpr::boolean()),
        Expr::Null(_) => Ok(TypeExpr::wildcard()),
        Expr::StringLit(_, pos) => {
            if !ctx.structs.contains_key("vec") {
                return Err(SemanticError::new(
                    "No structure 'vec' defined for string literal (missing std/string.mun)",
                    *pos,
                ));
            }
            Ok(TypeExpr::simple("vec"))
        }

        Expr::Ident(name, pos) => env
            .get(name)
            .cloned()
            .ok_or_else(|| SemanticError::new(format!("Undefined variable '{name}'"), *pos)),

        Expr::Unary(op, inner, pos) => {
            let t = infer_expr(ctx, env, sigma, sink, inner)?;
            match op {
                UnaryOp::Not => {
                    if t != TypeExpr::boolean() {
                        return Err(SemanticError::new(format!("Operator '!' expects boolean, got {t}"), *pos));
                    }
                    Ok(TypeExpr::boolean())
                }
                UnaryOp::Neg => {
                    if t != TypeExpr::int() {
                        return Err(SemanticError::new(format!("Unary '-' expects int, got {t}"), *pos));
                    }
                    Ok(TypeExpr::int())
                }
            }
        }

        Expr::Binary(op, l, r, pos) => {
            let lt = infer_expr(ctx, env, sigma, sink, l)?;
            let rt = infer_expr(ctx, env, sigma, sink, r)?;
            if op.is_arithmetic() {
                if lt == TypeExpr::int() && rt == TypeExpr::int() {
                    return Ok(TypeExpr::int());
                }
                return Err(SemanticError::new(format!("Arithmetic '{}' expects ints, got {lt}, {rt}", op.text()), *pos));
            }
            if op.is_ordered_comparison() {
                if lt == TypeExpr::int() && rt == TypeExpr::int() {
                    return Ok(TypeExpr::boolean());
                }
                return Err(SemanticError::new(format!("Comparison '{}' expects ints, got {lt}, {rt}", op.text()), *pos));
            }
            if op.is_equality() {
                if types_compatible(ctx, &lt, &rt) {
                    return Ok(TypeExpr::boolean());
                }
                return Err(SemanticError::new(format!("Cannot compare {lt} {} {rt}", op.text()), *pos));
            }
            if op.is_logical() {
                if lt == TypeExpr::boolean() && rt == TypeExpr::boolean() {
                    return Ok(TypeExpr::boolean());
                }
                return Err(SemanticError::new(format!("Logical '{}' expects booleans, got {lt}, {rt}", op.text()), *pos));
            }
            unreachable!("every BinOp matches one of the categories above")
        }

        Expr::ListLiteral(elems, pos) => {
            if elems.is_empty() {
                return Err(SemanticError::new("Cannot create empty list literal", *pos));
            }
            let elem_ty = infer_expr(ctx, env, sigma, sink, &elems[0])?;
            for e in &elems[1..] {
                let t = infer_expr(ctx, env, sigma, sink, e)?;
                if t != elem_ty {
                    return Err(SemanticError::new(format!("List literal elements must all be {elem_ty}, got {t}"), e.pos()));
                }
            }
            let sd = ctx
                .structs
                .get("list")
                .ok_or_else(|| SemanticError::new("No structure 'list' defined for list literal", *pos))?;
            if sd.type_params.len() != 1 {
                return Err(SemanticError::new("Structure 'list' must take exactly one type parameter", *pos));
            }
            let ctor = sd
                .constructor()
                .ok_or_else(|| SemanticError::new("Structure 'list' has no constructor", *pos))?;
            if ctor.params.len() != 1 || ctor.params[0].1 != TypeExpr::simple(&sd.type_params[0]) {
                return Err(SemanticError::new(format!("Constructor list({:?}) not compatible with element type {elem_ty}", ctor.params), *pos));
            }
            let struct_args = vec![elem_ty.clone()];
            sink.record_struct("list", &struct_args);
            sink.record_method("list", &struct_args, &ctor.name, &[]);
            Ok(TypeExpr::generic("list", struct_args))
        }

        Expr::MemberAccess(m) => {
            if let Expr::Ident(name, _) = &m.object {
                if let Some(sd) = ctx.structs.get(name.as_str()) {
                    if let Some(sf) = sd.static_field(&m.field) {
                        return Ok(sf.type_.clone());
                    }
                }
            }
            let obj_t = infer_expr(ctx, env, sigma, sink, &m.object)?;
            let sd = ctx
                .structs
                .get(obj_t.name.as_str())
                .ok_or_else(|| SemanticError::new(format!("Cannot access field on non-structure '{obj_t}'"), m.pos))?;
            let field_ty = sd
                .field(&m.field)
                .ok_or_else(|| SemanticError::new(format!("Structure '{obj_t}' has no field '{}'", m.field), m.pos))?;
            let field_subst = Subst::from_pairs(&sd.type_params, &obj_t.params);
            Ok(resolve(&field_subst, field_ty))
        }

        Expr::MethodCall(m) => {
            if let Expr::Ident(name, _) = &m.receiver {
                if ctx.is_struct(name) && !env.contains_key(name) {
                    let sd = ctx.structs[name.as_str()];
                    let md = sd
                        .method(&m.method)
                        .ok_or_else(|| SemanticError::new(format!("Structure '{name}' has no method '{}'", m.method), m.pos))?;
                    if !md.is_static {
                        return Err(SemanticError::new(format!("Cannot call instance method '{}' without an object", m.method), m.pos));
                    }
                    if !sd.type_params.is_empty() {
                        return Err(SemanticError::new(format!("Cannot call static method '{}' on generic structure '{name}' without type arguments", m.method), m.pos));
                    }
                    if m.args.len() != md.params.len() {
                        return Err(SemanticError::new(format!("Static method '{name}.{}' expects {} args, got {}", m.method, md.params.len(), m.args.len()), m.pos));
                    }
                    let method_args = subst::subst_all(sigma, &m.method_type_args);
                    let method_subst = Subst::from_pairs(&md.type_params, &method_args);
                    for (arg, (_, pty)) in m.args.iter().zip(&md.params) {
                        let at = infer_expr(ctx, env, sigma, sink, arg)?;
                        let expected = resolve(&method_subst, pty);
                        if !types_compatible(ctx, &expected, &at) {
                            return Err(SemanticError::new(format!("In call to '{name}.{}', expected {expected}, got {at}", m.method), arg.pos()));
                        }
                    }
                    sink.record_method(name, &[], &md.name, &method_args);
                    return Ok(resolve(&method_subst, &md.return_type));
                }
            }

            let recv_t = infer_expr(ctx, env, sigma, sink, &m.receiver)?;
            let sd = ctx
                .structs
                .get(recv_t.name.as_str())
                .ok_or_else(|| SemanticError::new(format!("Cannot call method '{}' on non-struct '{recv_t}'", m.method), m.pos))?;
            let md = sd
                .method(&m.method)
                .ok_or_else(|| SemanticError::new(format!("Structure '{recv_t}' has no method '{}'", m.method), m.pos))?;
            if md.is_static {
                return Err(SemanticError::new(format!("Cannot call static method '{}' on instance", m.method), m.pos));
            }
            if m.args.len() != md.params.len() {
                return Err(SemanticError::new(format!("Method '{recv_t}.{}' expects {} args, got {}", m.method, md.params.len(), m.args.len()), m.pos));
            }
            let struct_subst = Subst::from_pairs(&sd.type_params, &recv_t.params);
            let method_args = subst::subst_all(sigma, &m.method_type_args);
            let method_subst = struct_subst.extended(&md.type_params, &method_args);
            for (arg, (_, pty)) in m.args.iter().zip(&md.params) {
                let at = infer_expr(ctx, env, sigma, sink, arg)?;
                let expected = resolve(&method_subst, pty);
                if !types_compatible(ctx, &expected, &at) {
                    return Err(SemanticError::new(format!("In call to '{recv_t}.{}', expected {expected}, got {at}", m.method), arg.pos()));
                }
            }
            sink.record_method(&sd.name, &recv_t.params, &md.name, &method_args);
            Ok(resolve(&method_subst, &md.return_type))
        }

        Expr::Call(c) => {
            if let Some(sd) = ctx.structs.get(c.name.as_str()) {
                let ctor = sd
                    .constructor()
                    .ok_or_else(|| SemanticError::new(format!("Structure '{}' has no constructor", c.name), c.pos))?;
                if c.args.len() != ctor.params.len() {
                    return Err(SemanticError::new(format!("{}() expects {} args, got {}", c.name, ctor.params.len(), c.args.len()), c.pos));
                }
                let struct_args = subst::subst_all(sigma, &c.type_args);
                if struct_args.len() != sd.type_params.len() {
                    return Err(SemanticError::new(format!("Structure '{}' expects {} type arguments, got {}", c.name, sd.type_params.len(), struct_args.len()), c.pos));
                }
                let struct_subst = Subst::from_pairs(&sd.type_params, &struct_args);
                for (arg, (pname, pty)) in c.args.iter().zip(&ctor.params) {
                    let at = infer_expr(ctx, env, sigma, sink, arg)?;
                    let expected = resolve(&struct_subst, pty);
                    if !types_compatible(ctx, &expected, &at) {
                        return Err(SemanticError::new(format!("In constructor {}(), field '{pname}' expects {expected}, got {at}", c.name), arg.pos()));
                    }
                }
                sink.record_struct(&c.name, &struct_args);
                sink.record_method(&c.name, &struct_args, &ctor.name, &[]);
                return Ok(TypeExpr::generic(c.name.clone(), struct_args));
            }

            let sig = ctx
                .func_sigs
                .get(c.name.as_str())
                .ok_or_else(|| SemanticError::new(format!("Call to undefined function '{}'", c.name), c.pos))?
                .clone();
            let fn_args = subst::subst_all(sigma, &c.type_args);
            if fn_args.len() != sig.type_params.len() {
                return Err(SemanticError::new(format!("Function '{}' expects {} type arguments, got {}", c.name, sig.type_params.len(), fn_args.len()), c.pos));
            }
            let fn_subst = Subst::from_pairs(&sig.type_params, &fn_args);
            if c.args.len() != sig.params.len() {
                return Err(SemanticError::new(format!("Function '{}' expects {} args, got {}", c.name, sig.params.len(), c.args.len()), c.pos));
            }
            for (arg, pty) in c.args.iter().zip(&sig.params) {
                let at = infer_expr(ctx, env, sigma, sink, arg)?;
                let expected = resolve(&fn_subst, pty);
                if !types_compatible(ctx, &expected, &at) {
                    return Err(SemanticError::new(format!("In call to '{}', expected {expected}, got {at}", c.name), c.pos));
                }
            }
            sink.record_fn(&c.name, &fn_args);
            Ok(resolve(&fn_subst, &sig.return_type))
        }
    }
}

pub fn check_block(
    ctx: &Ctx,
    env: &mut TypeEnv,
    sigma: &Subst,
    sink: &mut dyn InstSink,
    stmts: &[Stmt],
    expected_ret: &TypeExpr,
    in_loop: bool,
) -> Result<(), SemanticError> {
    for stmt in stmts {
        check_stmt(ctx, env, sigma, sink, stmt, expected_ret, in_loop)?;
    }
    Ok(())
}

fn check_stmt(
    ctx: &Ctx,
    env: &mut TypeEnv,
    sigma: &Subst,
    sink: &mut dyn InstSink,
    stmt: &Stmt,
    expected_ret: &TypeExpr,
    in_loop: bool,
) -> Result<(), SemanticError> {
    match stmt {
        Stmt::VarDecl { type_, name, expr, pos } => {
            if env.contains_key(name) {
                return Err(SemanticError::new(format!("Redeclaration of '{name}'"), *pos));
            }
            let declared = resolve(sigma, type_);
            if declared == TypeExpr::void() {
                if expr.is_some() {
                    return Err(SemanticError::new(format!("Cannot initialize void variable '{name}'"), *pos));
                }
                env.insert(name.clone(), declared);
            } else {
                let e = expr.as_ref().ok_or_else(|| SemanticError::new(format!("Missing initializer for '{name}'"), *pos))?;
                let rt = infer_expr(ctx, env, sigma, sink, e)?;
                if !types_compatible(ctx, &declared, &rt) {
                    return Err(SemanticError::new(format!("Cannot assign {rt} to {declared} '{name}'"), *pos));
                }
                env.insert(name.clone(), declared);
            }
            Ok(())
        }

        Stmt::VarAssign { name, expr, pos } => {
            let lt = env
                .get(name)
                .cloned()
                .ok_or_else(|| SemanticError::new(format!("Assignment to undefined '{name}'"), *pos))?;
            let rt = infer_expr(ctx, env, sigma, sink, expr)?;
            if !types_compatible(ctx, &lt, &rt) {
                return Err(SemanticError::new(format!("Cannot assign {rt} to {lt} '{name}'"), *pos));
            }
            Ok(())
        }

        Stmt::MemberAssign { object, field, expr, pos } => {
            if let Expr::Ident(name, _) = object {
                if let Some(sd) = ctx.structs.get(name.as_str()) {
                    if sd.static_field(field).is_some() {
                        return Err(SemanticError::new(format!("Cannot assign to static field '{field}'"), *pos));
                    }
                }
            }
            let obj_t = infer_expr(ctx, env, sigma, sink, object)?;
            let sd = ctx
                .structs
                .get(obj_t.name.as_str())
                .ok_or_else(|| SemanticError::new("Invalid left-hand side in member assignment", *pos))?;
            let field_ty = sd
                .field(field)
                .ok_or_else(|| SemanticError::new(format!("Structure '{obj_t}' has no field '{field}'"), *pos))?;
            let field_subst = Subst::from_pairs(&sd.type_params, &obj_t.params);
            let lhs_t = resolve(&field_subst, field_ty);
            let rt = infer_expr(ctx, env, sigma, sink, expr)?;
            if !types_compatible(ctx, &lhs_t, &rt) {
                return Err(SemanticError::new(format!("Cannot assign {rt} to field '{field}' of type {lhs_t}"), *pos));
            }
            Ok(())
        }

        Stmt::Return { expr, pos } => {
            if *expected_ret == TypeExpr::void() {
                if expr.is_some() {
                    return Err(SemanticError::new("Cannot return a value from void function", *pos));
                }
                Ok(())
            } else {
                let e = expr
                    .as_ref()
                    .ok_or_else(|| SemanticError::new(format!("Missing return value in function returning '{expected_ret}'"), *pos))?;
                let rt = infer_expr(ctx, env, sigma, sink, e)?;
                if !types_compatible(ctx, expected_ret, &rt) {
                    return Err(SemanticError::new(format!("Return type mismatch: expected {expected_ret}, got {rt}"), *pos));
                }
                Ok(())
            }
        }

        Stmt::If { cond, then_body, else_body, pos } => {
            let ct = infer_expr(ctx, env, sigma, sink, cond)?;
            if ct != TypeExpr::boolean() {
                return Err(SemanticError::new(format!("Condition of if must be boolean, got {ct}"), *pos));
            }
            let mut then_env = env.clone();
            check_block(ctx, &mut then_env, sigma, sink, then_body, expected_ret, in_loop)?;
            let mut else_env = env.clone();
            check_block(ctx, &mut else_env, sigma, sink, else_body, expected_ret, in_loop)
        }

        Stmt::While { cond, body, else_body, pos } => {
            let ct = infer_expr(ctx, env, sigma, sink, cond)?;
            if ct != TypeExpr::boolean() {
                return Err(SemanticError::new(format!("Condition of while must be boolean, got {ct}"), *pos));
            }
            let mut table = env.clone();
            check_block(ctx, &mut table, sigma, sink, body, expected_ret, true)?;
            check_block(ctx, &mut table, sigma, sink, else_body, expected_ret, in_loop)
        }

        Stmt::Until { cond, body, else_body, pos } => {
            let ct = infer_expr(ctx, env, sigma, sink, cond)?;
            if ct != TypeExpr::boolean() {
                return Err(SemanticError::new(format!("Condition of until must be boolean, got {ct}"), *pos));
            }
            let mut table = env.clone();
            check_block(ctx, &mut table, sigma, sink, body, expected_ret, true)?;
            check_block(ctx, &mut table, sigma, sink, else_body, expected_ret, in_loop)
        }

        Stmt::For { init, cond, post, body, else_body, pos: _ } => {
            let snapshot = env.clone();
            if let Some(init) = init {
                check_stmt(ctx, env, sigma, sink, init, expected_ret, in_loop)?;
            }
            if let Some(cond) = cond {
                let ct = infer_expr(ctx, env, sigma, sink, cond)?;
                if ct != TypeExpr::boolean() {
                    return Err(SemanticError::new(format!("Condition of if must be boolean, got {ct}"), cond.pos()));
                }
            }
            if let Some(post) = post {
                check_stmt(ctx, env, sigma, sink, post, expected_ret, in_loop)?;
            }
            check_block(ctx, env, sigma, sink, body, expected_ret, true)?;
            check_block(ctx, env, sigma, sink, else_body, expected_ret, in_loop)?;
            *env = snapshot;
            Ok(())
        }

        Stmt::Do { count, cond, body, else_body, pos: _ } => {
            if let Some(count) = count {
                let ct = infer_expr(ctx, env, sigma, sink, count)?;
                if ct != TypeExpr::int() {
                    return Err(SemanticError::new(format!("Count in do-repeat must be int, got {ct}"), count.pos()));
                }
            }
            let mut table = env.clone();
            check_block(ctx, &mut table, sigma, sink, body, expected_ret, true)?;
            if let Some(cond) = cond {
                // Matches a quirk of the original: the while-condition is
                // checked against the pre-body scope, not `table`.
                let ct = infer_expr(ctx, env, sigma, sink, cond)?;
                if ct != TypeExpr::boolean() {
                    return Err(SemanticError::new(format!("Condition of do-while must be boolean, got {ct}"), cond.pos()));
                }
            }
            check_block(ctx, &mut table, sigma, sink, else_body, expected_ret, in_loop)
        }

        Stmt::Break(pos) => {
            if !in_loop {
                return Err(SemanticError::new("'break' outside of loop", *pos));
            }
            Ok(())
        }

        Stmt::Continue(pos) => {
            if !in_loop {
                return Err(SemanticError::new("'continue' outside of loop", *pos));
            }
            Ok(())
        }

        Stmt::Expr(e, _pos) => {
            infer_expr(ctx, env, sigma, sink, e)?;
            Ok(())
        }
    }
}

/// True if every control path through `stmts` unconditionally returns.
pub fn block_returns(stmts: &[Stmt]) -> bool {
    for stmt in stmts {
        match stmt {
            Stmt::Return { .. } => return true,
            Stmt::If { then_body, else_body, .. } => {
                if block_returns(then_body) && block_returns(else_body) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}
