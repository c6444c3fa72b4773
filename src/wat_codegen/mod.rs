//! WebAssembly text (WAT) code generator (spec §4.3).
//!
//! Runs after the semantic analyzer has reached a fixed point over the
//! program's generic instantiations. It never re-decides *which*
//! instantiations exist — it only lowers the ones `AnalysisResult` already
//! discovered, in their insertion order, which is what makes two runs over
//! the same input byte-identical (spec §5, §8).
//!
//! Like the analyzer, it reuses `semantic::checker::infer_expr`/`check_block`
//! (with `NullSink`) to recover the concrete type of a subexpression whenever
//! a lowering decision needs one (a field offset, a method's mangled target).
//! The AST carries no cached type annotations; recomputing per instantiation
//! is the same design the analyzer uses, for the same reason (see
//! `semantic::checker`'s module doc).
//!
//! `array<T>`, `list<T>` and `vec` (the `string` alias target) are lowered
//! by hand in `intrinsics.rs` rather than from their declared bodies — see
//! `semantic::INTRINSIC_STRUCTS`.

mod intrinsics;
pub mod errors;

use indexmap::IndexSet;

use crate::ast::{BinOp, Expr, Literal, Program, Stmt, StructureDeclaration, TypeExpr, UnaryOp};
use crate::semantic::checker::{self, Ctx, NullSink, TypeEnv};
use crate::semantic::{self, AnalysisResult, INTRINSIC_STRUCTS};
use crate::subst::{self, Subst};

pub use errors::CodegenError;

/// Scratch locals every function carries regardless of whether it uses
/// them, matching spec §4.3's fixed locals-hoisting rule.
const SCRATCH_STRUCT_PTR: &str = "__struct_ptr";
const SCRATCH_LIT: &str = "__lit";

pub fn generate(program: &Program, analysis: &AnalysisResult) -> Result<String, CodegenError> {
    let ctx = semantic::build_ctx(program)?;
    let mut emitter = Emitter { ctx, program, out: String::new() };
    emitter.emit_module(analysis)?;
    Ok(emitter.out)
}

fn mangle_type(t: &TypeExpr) -> String {
    if t.params.is_empty() {
        t.name.clone()
    } else {
        let parts: Vec<String> = t.params.iter().map(mangle_type).collect();
        format!("{}_{}", t.name, parts.join("_"))
    }
}

/// `${base}` with no type args, else `${base}__{T1}_{T2}_…` (spec §4.3).
fn mangle(base: &str, type_args: &[TypeExpr]) -> String {
    if type_args.is_empty() {
        format!("${base}")
    } else {
        let parts: Vec<String> = type_args.iter().map(mangle_type).collect();
        format!("${base}__{}", parts.join("_"))
    }
}

fn opcode(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "i32.add",
        BinOp::Sub => "i32.sub",
        BinOp::Mul => "i32.mul",
        BinOp::Div => "i32.div_s",
        BinOp::Mod => "i32.rem_s",
        BinOp::Lt => "i32.lt_s",
        BinOp::Le => "i32.le_s",
        BinOp::Gt => "i32.gt_s",
        BinOp::Ge => "i32.ge_s",
        BinOp::Eq => "i32.eq",
        BinOp::Ne => "i32.ne",
        BinOp::And => "i32.and",
        BinOp::Or => "i32.or",
    }
}

/// Walks a statement list collecting every `VarDecl` name, including ones
/// nested inside loop/if bodies and `for`'s own init statement — the full
/// set of locals the function header must declare (spec §4.3: "all locals
/// are `i32`, no shadowing since the grammar disallows it").
fn collect_locals(stmts: &[Stmt], out: &mut IndexSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::VarDecl { name, .. } => {
                out.insert(name.clone());
            }
            Stmt::If { then_body, else_body, .. } => {
                collect_locals(then_body, out);
                collect_locals(else_body, out);
            }
            Stmt::While { body, else_body, .. } | Stmt::Until { body, else_body, .. } => {
                collect_locals(body, out);
                collect_locals(else_body, out);
            }
            Stmt::For { init, post, body, else_body, .. } => {
                if let Some(init) = init {
                    collect_locals(std::slice::from_ref(init.as_ref()), out);
                }
                if let Some(post) = post {
                    collect_locals(std::slice::from_ref(post.as_ref()), out);
                }
                collect_locals(body, out);
                collect_locals(else_body, out);
            }
            Stmt::Do { body, else_body, .. } => {
                collect_locals(body, out);
                collect_locals(else_body, out);
            }
            Stmt::VarAssign { .. }
            | Stmt::MemberAssign { .. }
            | Stmt::Return { .. }
            | Stmt::Break(_)
            | Stmt::Continue(_)
            | Stmt::Expr(_, _) => {}
        }
    }
}

struct Emitter<'a> {
    ctx: Ctx<'a>,
    program: &'a Program,
    out: String,
}

impl<'a> Emitter<'a> {
    fn w(&mut self, line: &str) {
        self.out.push_str("    ");
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn infer(&self, env: &TypeEnv, sigma: &Subst, expr: &Expr) -> Result<TypeExpr, CodegenError> {
        Ok(checker::infer_expr(&self.ctx, env, sigma, &mut NullSink, expr)?)
    }

    fn emit_module(&mut self, analysis: &AnalysisResult) -> Result<(), CodegenError> {
        self.out.push_str("(module\n");

        for imp in self.program.imports().filter(|i| i.source.is_none()) {
            let module = imp.module.as_deref().unwrap_or("env");
            let name = imp.name.as_deref().unwrap_or("");
            let params = "(param i32) ".repeat(imp.params.len());
            let result = if imp.return_type == TypeExpr::void() {
                String::new()
            } else {
                " (result i32)".to_string()
            };
            self.w(&format!("(import \"{module}\" \"{name}\" (func ${name} {params}{result}))"));
        }

        self.w("(memory $mem 1)");
        self.w("(export \"memory\" (memory $mem))");
        self.w("(global $heap (mut i32) (i32.const 4))");
        self.w("(func $malloc (param $n i32) (result i32)");
        self.w("  (local $p i32)");
        self.w("  global.get $heap");
        self.w("  local.set $p");
        self.w("  global.get $heap");
        self.w("  local.get $n");
        self.w("  i32.add");
        self.w("  global.set $heap");
        self.w("  local.get $p");
        self.w("  return)");
        self.w("(export \"malloc\" (func $malloc))");

        for sd in self.program.structures() {
            for sf in &sd.static_fields {
                let value = match sf.value {
                    Literal::Int(n) => n,
                    Literal::Bool(b) => i64::from(b),
                };
                self.w(&format!("(global ${}_{} i32 (i32.const {}))", sd.name, sf.name, value));
            }
        }

        for (struct_name, struct_args, method_name, method_args) in &analysis.method_insts {
            self.emit_method(struct_name, struct_args, method_name, method_args)?;
        }
        for (fn_name, type_args) in &analysis.fn_insts {
            self.emit_function(fn_name, type_args)?;
        }

        if analysis.has_main {
            self.w("(export \"main\" (func $main))");
        } else {
            let top_stmts: Vec<Stmt> = self.program.top_level_statements().cloned().collect();
            if !top_stmts.is_empty() {
                self.emit_function_body(
                    "main",
                    &[],
                    false,
                    false,
                    TypeEnv::new(),
                    Subst::new(),
                    &top_stmts,
                    &TypeExpr::void(),
                )?;
                self.w("(export \"main\" (func $main))");
            }
        }

        self.out.push_str(")\n");
        Ok(())
    }

    fn emit_function(&mut self, fn_name: &str, type_args: &[TypeExpr]) -> Result<(), CodegenError> {
        let fd = self.program.find_function(fn_name).ok_or_else(|| {
            CodegenError::Invariant(format!("discovered function '{fn_name}' must exist"))
        })?;
        let sigma = Subst::from_pairs(&fd.type_params, type_args);
        let mut env = TypeEnv::new();
        let mut params: Vec<String> = Vec::new();
        for (pname, pty) in &fd.params {
            env.insert(pname.clone(), subst::subst(&sigma, pty));
            params.push(pname.clone());
        }
        let expected_ret = subst::subst(&sigma, &fd.return_type);
        let body = fd.body.clone();
        self.emit_function_body(&mangle(fn_name, type_args)[1..], &params, false, false, env, sigma, &body, &expected_ret)
    }

    fn emit_method(
        &mut self,
        struct_name: &str,
        struct_args: &[TypeExpr],
        method_name: &str,
        method_args: &[TypeExpr],
    ) -> Result<(), CodegenError> {
        if INTRINSIC_STRUCTS.contains(&struct_name) {
            return intrinsics::emit(self, struct_name, struct_args, method_name, method_args);
        }

        let sd: &StructureDeclaration = *self
            .ctx
            .structs
            .get(struct_name)
            .ok_or_else(|| CodegenError::Invariant(format!("discovered structure '{struct_name}' must exist")))?;
        let md = sd
            .method(method_name)
            .ok_or_else(|| CodegenError::Invariant(format!("discovered method '{struct_name}.{method_name}' must exist")))?;

        let struct_subst = Subst::from_pairs(&sd.type_params, struct_args);
        let sigma = struct_subst.extended(&md.type_params, method_args);
        let is_constructor = md.is_constructor_of(struct_name);
        let has_this = !md.is_static || is_constructor;

        let mut env = TypeEnv::new();
        if has_this {
            env.insert("this".to_string(), TypeExpr::generic(struct_name.to_string(), struct_args.to_vec()));
        }
        let mut params: Vec<String> = Vec::new();
        for (pname, pty) in &md.params {
            env.insert(pname.clone(), subst::subst(&sigma, pty));
            params.push(pname.clone());
        }
        let expected_ret = subst::subst(&sigma, &md.return_type);
        let combined_args: Vec<TypeExpr> = struct_args.iter().chain(method_args.iter()).cloned().collect();
        let mangled = mangle(&format!("{struct_name}_{method_name}"), &combined_args);
        let body = md.body.clone();
        self.emit_function_body(&mangled[1..], &params, has_this, is_constructor, env, sigma, &body, &expected_ret)
    }

    /// Emits `(func ${name} ...)` for either a plain function, a method (with
    /// or without `this`), or the script-mode synthetic `main`.
    #[allow(clippy::too_many_arguments)]
    fn emit_function_body(
        &mut self,
        mangled_name: &str,
        params: &[String],
        has_this: bool,
        is_ctor: bool,
        mut env: TypeEnv,
        sigma: Subst,
        body: &[Stmt],
        expected_ret: &TypeExpr,
    ) -> Result<(), CodegenError> {
        let is_void = *expected_ret == TypeExpr::void();

        let mut header = format!("(func ${mangled_name}");
        if has_this {
            header.push_str(" (param $this i32)");
        }
        for pname in params {
            header.push_str(&format!(" (param ${pname} i32)"));
        }
        if is_ctor || !is_void {
            header.push_str(" (result i32)");
        }
        self.w(&header);

        let mut locals = IndexSet::new();
        collect_locals(body, &mut locals);
        for name in &locals {
            self.w(&format!("  (local ${name} i32)"));
        }
        self.w(&format!("  (local ${SCRATCH_STRUCT_PTR} i32)"));
        self.w(&format!("  (local ${SCRATCH_LIT} i32)"));

        self.emit_block(&mut env, &sigma, body, expected_ret)?;

        if is_ctor {
            self.w("  local.get $this");
            self.w("  return");
        } else if is_void {
            self.w("  return");
        } else {
            self.w("  unreachable");
        }
        self.w(")");
        Ok(())
    }

    fn emit_block(&mut self, env: &mut TypeEnv, sigma: &Subst, stmts: &[Stmt], expected_ret: &TypeExpr) -> Result<(), CodegenError> {
        for stmt in stmts {
            self.emit_stmt(env, sigma, stmt, expected_ret)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, env: &mut TypeEnv, sigma: &Subst, stmt: &Stmt, expected_ret: &TypeExpr) -> Result<(), CodegenError> {
        match stmt {
            Stmt::VarDecl { type_, name, expr, .. } => {
                let declared = subst::subst(sigma, type_);
                if let Some(e) = expr {
                    self.emit_expr(env, sigma, e)?;
                    self.w(&format!("  local.set ${name}"));
                }
                env.insert(name.clone(), declared);
                Ok(())
            }
            Stmt::VarAssign { name, expr, .. } => {
                self.emit_expr(env, sigma, expr)?;
                self.w(&format!("  local.set ${name}"));
                Ok(())
            }
            Stmt::MemberAssign { object, field, expr, .. } => {
                let obj_t = self.infer(env, sigma, object)?;
                let sd = *self
                    .ctx
                    .structs
                    .get(obj_t.name.as_str())
                    .ok_or_else(|| CodegenError::Invariant(format!("'{obj_t}' is not a structure")))?;
                let offset = sd
                    .field_offset(field)
                    .ok_or_else(|| CodegenError::Invariant(format!("'{obj_t}' has no field '{field}'")))?;
                self.emit_expr(env, sigma, object)?;
                self.emit_expr(env, sigma, expr)?;
                self.w(&format!("  i32.store offset={offset}"));
                Ok(())
            }
            Stmt::Return { expr, .. } => {
                if let Some(e) = expr {
                    self.emit_expr(env, sigma, e)?;
                }
                self.w("  return");
                Ok(())
            }
            Stmt::If { cond, then_body, else_body, .. } => {
                self.emit_expr(env, sigma, cond)?;
                self.w("  if");
                let mut then_env = env.clone();
                self.emit_block(&mut then_env, sigma, then_body, expected_ret)?;
                if !else_body.is_empty() {
                    self.w("  else");
                    let mut else_env = env.clone();
                    self.emit_block(&mut else_env, sigma, else_body, expected_ret)?;
                }
                self.w("  end");
                Ok(())
            }
            Stmt::While { cond, body, else_body, .. } => {
                self.w("  block $break");
                self.w("  block $exit");
                self.w("  loop $head");
                self.emit_expr(env, sigma, cond)?;
                self.w("  i32.eqz");
                self.w("  br_if $exit");
                self.w("  block $continue");
                let mut table = env.clone();
                self.emit_block(&mut table, sigma, body, expected_ret)?;
                self.w("  end");
                self.w("  br $head");
                self.w("  end");
                self.w("  end");
                self.emit_block(&mut table, sigma, else_body, expected_ret)?;
                self.w("  end");
                Ok(())
            }
            Stmt::Until { cond, body, else_body, .. } => {
                self.w("  block $break");
                self.w("  block $exit");
                self.w("  loop $head");
                self.emit_expr(env, sigma, cond)?;
                self.w("  br_if $exit");
                self.w("  block $continue");
                let mut table = env.clone();
                self.emit_block(&mut table, sigma, body, expected_ret)?;
                self.w("  end");
                self.w("  br $head");
                self.w("  end");
                self.w("  end");
                self.emit_block(&mut table, sigma, else_body, expected_ret)?;
                self.w("  end");
                Ok(())
            }
            Stmt::For { init, cond, post, body, else_body, .. } => {
                let snapshot = env.clone();
                if let Some(init) = init {
                    self.emit_stmt(env, sigma, init, expected_ret)?;
                }
                self.w("  block $break");
                self.w("  block $exit");
                self.w("  loop $head");
                if let Some(cond) = cond {
                    self.emit_expr(env, sigma, cond)?;
                    self.w("  i32.eqz");
                    self.w("  br_if $exit");
                }
                self.w("  block $continue");
                self.emit_block(env, sigma, body, expected_ret)?;
                self.w("  end");
                if let Some(post) = post {
                    self.emit_stmt(env, sigma, post, expected_ret)?;
                }
                self.w("  br $head");
                self.w("  end");
                self.w("  end");
                self.emit_block(env, sigma, else_body, expected_ret)?;
                self.w("  end");
                *env = snapshot;
                Ok(())
            }
            Stmt::Do { count, cond, body, else_body, .. } => {
                self.w("  block $break");
                let mut table = env.clone();
                if let Some(count) = count {
                    self.emit_expr(env, sigma, count)?;
                    self.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
                    self.w("  loop $head");
                    self.w("  block $continue");
                    self.emit_block(&mut table, sigma, body, expected_ret)?;
                    self.w("  end");
                    self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
                    self.w("  i32.const 1");
                    self.w("  i32.sub");
                    self.w(&format!("  local.tee ${SCRATCH_STRUCT_PTR}"));
                    self.w("  br_if $head");
                    self.w("  end");
                }
                if let Some(cond) = cond {
                    self.w("  loop $head");
                    self.w("  block $continue");
                    self.emit_block(&mut table, sigma, body, expected_ret)?;
                    self.w("  end");
                    self.emit_expr(env, sigma, cond)?;
                    self.w("  br_if $head");
                    self.w("  end");
                }
                self.emit_block(&mut table, sigma, else_body, expected_ret)?;
                self.w("  end");
                Ok(())
            }
            Stmt::Break(_) => {
                self.w("  br $break");
                Ok(())
            }
            Stmt::Continue(_) => {
                self.w("  br $continue");
                Ok(())
            }
            Stmt::Expr(e, _) => {
                let t = self.infer(env, sigma, e)?;
                self.emit_expr(env, sigma, e)?;
                if t != TypeExpr::void() {
                    self.w("  drop");
                }
                Ok(())
            }
        }
    }

    fn emit_expr(&mut self, env: &TypeEnv, sigma: &Subst, expr: &Expr) -> Result<(), CodegenError> {
        match expr {
            Expr::Int(n, _) => {
                self.w(&format!("  i32.const {n}"));
                Ok(())
            }
            Expr::Bool(b, _) => {
                self.w(&format!("  i32.const {}", i32::from(*b)));
                Ok(())
            }
            Expr::Null(_) => {
                self.w("  i32.const 0");
                Ok(())
            }
            Expr::StringLit(s, _) => self.emit_string_literal(s),
            Expr::Ident(name, _) => {
                self.w(&format!("  local.get ${name}"));
                Ok(())
            }
            Expr::Unary(op, inner, _) => {
                match op {
                    UnaryOp::Neg => {
                        self.w("  i32.const 0");
                        self.emit_expr(env, sigma, inner)?;
                        self.w("  i32.sub");
                    }
                    UnaryOp::Not => {
                        self.emit_expr(env, sigma, inner)?;
                        self.w("  i32.eqz");
                    }
                }
                Ok(())
            }
            Expr::Binary(op, l, r, _) => {
                self.emit_expr(env, sigma, l)?;
                self.emit_expr(env, sigma, r)?;
                self.w(&format!("  {}", opcode(*op)));
                Ok(())
            }
            Expr::ListLiteral(elems, _) => self.emit_list_literal(env, sigma, elems),
            Expr::MemberAccess(m) => {
                if let Expr::Ident(name, _) = &m.object {
                    if let Some(sd) = self.ctx.structs.get(name.as_str()) {
                        if sd.static_field(&m.field).is_some() {
                            self.w(&format!("  global.get ${name}_{}", m.field));
                            return Ok(());
                        }
                    }
                }
                let obj_t = self.infer(env, sigma, &m.object)?;
                let sd = *self
                    .ctx
                    .structs
                    .get(obj_t.name.as_str())
                    .ok_or_else(|| CodegenError::Invariant(format!("'{obj_t}' is not a structure")))?;
                let offset = sd
                    .field_offset(&m.field)
                    .ok_or_else(|| CodegenError::Invariant(format!("'{obj_t}' has no field '{}'", m.field)))?;
                self.emit_expr(env, sigma, &m.object)?;
                self.w(&format!("  i32.load offset={offset}"));
                Ok(())
            }
            Expr::MethodCall(m) => {
                if let Expr::Ident(name, _) = &m.receiver {
                    if self.ctx.is_struct(name) && !env.contains_key(name) {
                        let sd = *self.ctx.structs.get(name.as_str()).unwrap();
                        let md = sd
                            .method(&m.method)
                            .ok_or_else(|| CodegenError::Invariant(format!("'{name}' has no method '{}'", m.method)))?;
                        let method_args = subst::subst_all(sigma, &m.method_type_args);
                        for arg in &m.args {
                            self.emit_expr(env, sigma, arg)?;
                        }
                        let mangled = mangle(&format!("{name}_{}", md.name), &method_args);
                        self.w(&format!("  call {mangled}"));
                        return Ok(());
                    }
                }
                let recv_t = self.infer(env, sigma, &m.receiver)?;
                let sd = *self
                    .ctx
                    .structs
                    .get(recv_t.name.as_str())
                    .ok_or_else(|| CodegenError::Invariant(format!("'{recv_t}' is not a structure")))?;
                let md = sd
                    .method(&m.method)
                    .ok_or_else(|| CodegenError::Invariant(format!("'{recv_t}' has no method '{}'", m.method)))?;
                self.emit_expr(env, sigma, &m.receiver)?;
                for arg in &m.args {
                    self.emit_expr(env, sigma, arg)?;
                }
                let method_args = subst::subst_all(sigma, &m.method_type_args);
                let combined: Vec<TypeExpr> = recv_t.params.iter().chain(method_args.iter()).cloned().collect();
                let mangled = mangle(&format!("{}_{}", sd.name, md.name), &combined);
                self.w(&format!("  call {mangled}"));
                Ok(())
            }
            Expr::Call(c) => {
                if let Some(sd) = self.ctx.structs.get(c.name.as_str()) {
                    let sd = *sd;
                    let struct_args = subst::subst_all(sigma, &c.type_args);
                    let ctor = sd
                        .constructor()
                        .ok_or_else(|| CodegenError::Invariant(format!("'{}' has no constructor", sd.name)))?;
                    self.w(&format!("  i32.const {}", sd.size_bytes()));
                    self.w("  call $malloc");
                    self.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
                    self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
                    for arg in &c.args {
                        self.emit_expr(env, sigma, arg)?;
                    }
                    let mangled = mangle(&format!("{}_{}", sd.name, ctor.name), &struct_args);
                    self.w(&format!("  call {mangled}"));
                    return Ok(());
                }
                if !self.ctx.func_sigs.contains_key(c.name.as_str()) {
                    return Err(CodegenError::Invariant(format!("call to undefined function '{}'", c.name)));
                }
                let fn_args = subst::subst_all(sigma, &c.type_args);
                for arg in &c.args {
                    self.emit_expr(env, sigma, arg)?;
                }
                let mangled = mangle(&c.name, &fn_args);
                self.w(&format!("  call {mangled}"));
                Ok(())
            }
        }
    }

    /// `[e1, …, eN]` lowers to `list<T>(e1)` (the head), then repeated
    /// `append` calls, leaving only the head pointer on the stack
    /// (spec §4.3; `list<T>.append` is a void intrinsic — see
    /// `intrinsics.rs` — so no extra value needs dropping per iteration).
    fn emit_list_literal(&mut self, env: &TypeEnv, sigma: &Subst, elems: &[Expr]) -> Result<(), CodegenError> {
        let elem_ty = self.infer(env, sigma, &elems[0])?;
        let struct_args = [elem_ty];
        let sd = *self
            .ctx
            .structs
            .get("list")
            .ok_or_else(|| CodegenError::Invariant("no structure 'list' defined".to_string()))?;
        let ctor = sd
            .constructor()
            .ok_or_else(|| CodegenError::Invariant("'list' has no constructor".to_string()))?;
        let append = sd
            .method("append")
            .ok_or_else(|| CodegenError::Invariant("'list' has no method 'append'".to_string()))?;
        let ctor_mangled = mangle(&format!("list_{}", ctor.name), &struct_args);
        let append_mangled = mangle(&format!("list_{}", append.name), &struct_args);
        let size = sd.size_bytes();

        self.w(&format!("  i32.const {size}"));
        self.w("  call $malloc");
        self.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
        self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
        self.emit_expr(env, sigma, &elems[0])?;
        self.w(&format!("  call {ctor_mangled}"));
        self.w(&format!("  local.set ${SCRATCH_LIT}"));

        for e in &elems[1..] {
            self.w(&format!("  i32.const {size}"));
            self.w("  call $malloc");
            self.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
            self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
            self.emit_expr(env, sigma, e)?;
            self.w(&format!("  call {ctor_mangled}"));
            self.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
            self.w(&format!("  local.get ${SCRATCH_LIT}"));
            self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
            self.w(&format!("  call {append_mangled}"));
        }
        self.w(&format!("  local.get ${SCRATCH_LIT}"));
        Ok(())
    }

    /// Builds the host-ABI memory layout directly (spec §6): a flat byte
    /// buffer wrapped by an `array<int>`-shaped node, wrapped by a
    /// `vec`-shaped node — bypassing user-space constructors entirely,
    /// since string literals are a parse-time alias (SPEC_FULL §C), not a
    /// value the language's own constructor-call syntax ever produces.
    fn emit_string_literal(&mut self, s: &str) -> Result<(), CodegenError> {
        let bytes: Vec<u8> = s.bytes().collect();
        let n = bytes.len();

        self.w(&format!("  i32.const {}", n * 4));
        self.w("  call $malloc");
        self.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
        for (i, b) in bytes.iter().enumerate() {
            self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
            self.w(&format!("  i32.const {b}"));
            self.w(&format!("  i32.store offset={}", i * 4));
        }

        self.w("  i32.const 8");
        self.w("  call $malloc");
        self.w(&format!("  local.set ${SCRATCH_LIT}"));
        self.w(&format!("  local.get ${SCRATCH_LIT}"));
        self.w(&format!("  i32.const {n}"));
        self.w("  i32.store offset=0");
        self.w(&format!("  local.get ${SCRATCH_LIT}"));
        self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
        self.w("  i32.store offset=4");

        self.w("  i32.const 12");
        self.w("  call $malloc");
        self.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
        self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
        self.w(&format!("  local.get ${SCRATCH_LIT}"));
        self.w("  i32.store offset=0");
        self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
        self.w(&format!("  i32.const {n}"));
        self.w("  i32.store offset=4");
        self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
        self.w(&format!("  i32.const {n}"));
        self.w("  i32.store offset=8");
        self.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    #[test]
    fn mangle_with_no_type_args_is_bare_dollar_name() {
        assert_eq!(mangle("main", &[]), "$main");
    }

    #[test]
    fn mangle_with_simple_type_args() {
        assert_eq!(mangle("Box_get", &[TypeExpr::int()]), "$Box_get__int");
    }

    #[test]
    fn mangle_with_nested_generic_type_args() {
        let list_of_int = TypeExpr::generic("list", vec![TypeExpr::int()]);
        assert_eq!(mangle("f", &[list_of_int]), "$f__list_int");
    }

    #[test]
    fn generate_emits_mangled_entry_point_and_malloc() {
        let program = parser::parse("void main() { write_int(1); }").unwrap();
        let std_dir = std::path::PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/std"));
        let program = crate::importer::import_standard_files(program, &std_dir).unwrap();
        let analysis = semantic::analyze(&program).unwrap();
        let wat = generate(&program, &analysis).unwrap();
        assert!(wat.contains("$main"));
        assert!(wat.contains("(export \"main\""));
        assert!(wat.contains("(export \"memory\""));
    }
}
