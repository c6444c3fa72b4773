//! Semantic analyzer (spec §4.2): validates a fully import-inlined
//! `Program` and discovers the set of concrete generic instantiations the
//! code generator must emit, by type-checking each function/method body
//! once per instantiation via `checker::check_block` (shared with codegen;
//! see that module's doc comment for why the AST itself stays immutable).

pub mod checker;
pub mod errors;

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::ast::{Literal, Position, Program, Stmt, StructureDeclaration, TypeExpr};
use crate::subst::{self, Subst};

pub use errors::SemanticError;
use checker::{Ctx, FuncSig, InstSink, TypeEnv};

/// Structures the code generator lowers by hand instead of compiling their
/// declared bodies (spec §C): the language has no raw memory primitive, so
/// `array<T>`'s indexed access and `list<T>`'s pointer-chasing `append` and
/// `vec`'s field wiring cannot be *written* in the language itself. Their
/// `std/*.mun` declarations exist only to give the checker real field/method
/// signatures to type-check user code against; the bodies are empty and
/// never checked or emitted.
pub const INTRINSIC_STRUCTS: &[&str] = &["array", "list", "vec"];

/// The closed set of instantiations a program actually needs, in discovery
/// (insertion) order — codegen relies on this order for determinism
/// (spec §5, §8).
pub struct AnalysisResult {
    pub struct_insts: IndexSet<(String, Vec<TypeExpr>)>,
    pub fn_insts: IndexSet<(String, Vec<TypeExpr>)>,
    pub method_insts: IndexSet<(String, Vec<TypeExpr>, String, Vec<TypeExpr>)>,
    /// Whether the program declares `main` (script-mode otherwise; spec
    /// §4.2.6). Codegen uses this to decide the module's entry point.
    pub has_main: bool,
}

#[derive(Debug, Clone)]
enum Job {
    Function {
        name: String,
        type_args: Vec<TypeExpr>,
    },
    Method {
        struct_name: String,
        struct_args: Vec<TypeExpr>,
        method_name: String,
        method_args: Vec<TypeExpr>,
    },
    TopLevel,
}

#[derive(Default)]
struct Discovered {
    struct_insts: IndexSet<(String, Vec<TypeExpr>)>,
    fn_insts: IndexSet<(String, Vec<TypeExpr>)>,
    method_insts: IndexSet<(String, Vec<TypeExpr>, String, Vec<TypeExpr>)>,
    worklist: VecDeque<Job>,
}

impl InstSink for Discovered {
    fn record_struct(&mut self, name: &str, type_args: &[TypeExpr]) {
        self.struct_insts.insert((name.to_string(), type_args.to_vec()));
    }

    fn record_fn(&mut self, name: &str, type_args: &[TypeExpr]) {
        let key = (name.to_string(), type_args.to_vec());
        if self.fn_insts.insert(key.clone()) {
            self.worklist.push_back(Job::Function { name: key.0, type_args: key.1 });
        }
    }

    fn record_method(&mut self, struct_name: &str, struct_args: &[TypeExpr], method_name: &str, method_args: &[TypeExpr]) {
        let key = (
            struct_name.to_string(),
            struct_args.to_vec(),
            method_name.to_string(),
            method_args.to_vec(),
        );
        if self.method_insts.insert(key.clone()) {
            self.worklist.push_back(Job::Method {
                struct_name: key.0,
                struct_args: key.1,
                method_name: key.2,
                method_args: key.3,
            });
        }
    }
}

struct Analyzer<'a> {
    program: &'a Program,
    ctx: Ctx<'a>,
    discovered: Discovered,
}

/// Builds the read-only `Ctx` (declared structs + function signatures) from
/// a fully import-inlined `Program`, rejecting top-level name collisions.
/// Shared by the analyzer and by codegen, which re-invokes `checker`'s pure
/// functions once per already-discovered instantiation (see
/// `crate::wat_codegen`).
pub fn build_ctx(program: &Program) -> Result<Ctx<'_>, SemanticError> {
    let mut structs: IndexMap<&str, &StructureDeclaration> = IndexMap::new();
    for sd in program.structures() {
        if structs.insert(sd.name.as_str(), sd).is_some() {
            return Err(SemanticError::new(format!("Structure '{}' redefined", sd.name), sd.pos));
        }
    }
    validate_static_fields(&structs)?;
    validate_constructor_return_types(&structs)?;
    validate_declared_types(program, &structs)?;

    let mut func_sigs: IndexMap<&str, FuncSig> = IndexMap::new();
    for fd in program.functions() {
        if func_sigs.contains_key(fd.name.as_str()) {
            return Err(SemanticError::new(format!("Function '{}' redefined", fd.name), fd.pos));
        }
        func_sigs.insert(
            fd.name.as_str(),
            FuncSig {
                type_params: fd.type_params.clone(),
                params: fd.params.iter().map(|(_, t)| t.clone()).collect(),
                return_type: fd.return_type.clone(),
            },
        );
    }
    for imp in program.imports() {
        if let Some(name) = &imp.name {
            if func_sigs.contains_key(name.as_str()) {
                return Err(SemanticError::new(format!("Function '{name}' redefined"), imp.pos));
            }
            func_sigs.insert(
                name.as_str(),
                FuncSig {
                    type_params: Vec::new(),
                    params: imp.params.clone(),
                    return_type: imp.return_type.clone(),
                },
            );
        }
    }

    Ok(Ctx { structs, func_sigs })
}

pub fn analyze(program: &Program) -> Result<AnalysisResult, SemanticError> {
    let ctx = build_ctx(program)?;

    // Collected before `ctx` moves into the `Analyzer`, since seeding
    // doesn't need the borrowed maps once it has these plain names.
    let seed_structs: Vec<(String, Vec<String>)> = ctx
        .structs
        .values()
        .filter(|sd| sd.type_params.is_empty())
        .map(|sd| {
            let methods = sd
                .methods
                .iter()
                .filter(|m| m.type_params.is_empty())
                .map(|m| m.name.clone())
                .collect();
            (sd.name.clone(), methods)
        })
        .collect();
    let seed_fns: Vec<String> = program
        .functions()
        .filter(|fd| fd.type_params.is_empty())
        .map(|fd| fd.name.clone())
        .collect();

    let has_main = ctx.func_sigs.contains_key("main");
    let top_stmts: Vec<&Stmt> = program.top_level_statements().collect();
    if has_main && !top_stmts.is_empty() {
        return Err(SemanticError::new(
            "Top-level statements not allowed when 'main' is defined",
            top_stmts[0].pos(),
        ));
    }
    let run_top_level = !has_main && !top_stmts.is_empty();

    let mut analyzer = Analyzer {
        program,
        ctx,
        discovered: Discovered::default(),
    };

    for (name, _) in &seed_structs {
        analyzer.discovered.record_struct(name, &[]);
    }
    for (struct_name, methods) in &seed_structs {
        for method_name in methods {
            analyzer.discovered.record_method(struct_name, &[], method_name, &[]);
        }
    }
    for name in &seed_fns {
        analyzer.discovered.record_fn(name, &[]);
    }
    if run_top_level {
        analyzer.discovered.worklist.push_back(Job::TopLevel);
    }

    analyzer.drain_worklist()?;

    Ok(AnalysisResult {
        struct_insts: analyzer.discovered.struct_insts,
        fn_insts: analyzer.discovered.fn_insts,
        method_insts: analyzer.discovered.method_insts,
        has_main,
    })
}

fn validate_static_fields(structs: &IndexMap<&str, &StructureDeclaration>) -> Result<(), SemanticError> {
    for sd in structs.values() {
        for sf in &sd.static_fields {
            let init_t = match sf.value {
                Literal::Int(_) => TypeExpr::int(),
                Literal::Bool(_) => TypeExpr::boolean(),
            };
            if init_t != sf.type_ {
                return Err(SemanticError::new(
                    format!("Cannot assign {init_t} to static {} '{}'", sf.type_, sf.name),
                    sf.pos,
                ));
            }
        }
    }
    Ok(())
}

/// Spec §3 invariant 4: a constructor's declared return type must be its
/// enclosing struct applied to its own type parameters (e.g. `Box<T>`
/// inside `structure Box<T>`), even though the constructor implicitly
/// returns the pre-allocated `this` rather than an explicit value.
fn validate_constructor_return_types(structs: &IndexMap<&str, &StructureDeclaration>) -> Result<(), SemanticError> {
    for sd in structs.values() {
        if let Some(ctor) = sd.constructor() {
            let expected = TypeExpr::generic(sd.name.clone(), sd.type_params.iter().map(TypeExpr::simple).collect());
            if ctor.return_type != expected {
                return Err(SemanticError::new(
                    format!("Constructor '{}' must return {expected}, got {}", sd.name, ctor.return_type),
                    ctor.pos,
                ));
            }
        }
    }
    Ok(())
}

/// Checks a single `TypeExpr` against the rule spec §4.2 step 2(b)(c) /
/// invariant 3 states: it must be a built-in atom, an in-scope type
/// variable (with no type arguments of its own), or a declared structure
/// applied to exactly as many type arguments as it declares parameters
/// (each itself validated recursively).
fn validate_type_expr(
    structs: &IndexMap<&str, &StructureDeclaration>,
    scope: &[String],
    ty: &TypeExpr,
    pos: Position,
) -> Result<(), SemanticError> {
    if ty.is_builtin_atom() {
        return Ok(());
    }
    if scope.iter().any(|v| v == &ty.name) {
        if !ty.params.is_empty() {
            return Err(SemanticError::new(
                format!("Type parameter '{}' cannot itself take type arguments", ty.name),
                pos,
            ));
        }
        return Ok(());
    }
    match structs.get(ty.name.as_str()) {
        Some(sd) => {
            if sd.type_params.len() != ty.params.len() {
                return Err(SemanticError::new(
                    format!(
                        "Structure '{}' expects {} type argument(s), got {}",
                        ty.name,
                        sd.type_params.len(),
                        ty.params.len()
                    ),
                    pos,
                ));
            }
            for p in &ty.params {
                validate_type_expr(structs, scope, p, pos)?;
            }
            Ok(())
        }
        None => Err(SemanticError::new(format!("Unknown type '{}'", ty.name), pos)),
    }
}

/// spec §4.2 step 2(b)(c), invariant 3: every declared field type and every
/// method/function/import signature type must be well-formed independent
/// of whether the declaring struct or function is ever instantiated.
/// `checker::infer_expr`'s arity checks (e.g. `checker.rs`'s constructor
/// and call-site checks) only run against types that actually appear at a
/// call site reached by the on-demand instantiation worklist; an unused
/// generic structure's field of the wrong arity would otherwise compile
/// silently, so this walks every declaration unconditionally instead.
fn validate_declared_types(program: &Program, structs: &IndexMap<&str, &StructureDeclaration>) -> Result<(), SemanticError> {
    for sd in structs.values() {
        for (_, field_ty) in &sd.fields {
            validate_type_expr(structs, &sd.type_params, field_ty, sd.pos)?;
        }
        for sf in &sd.static_fields {
            validate_type_expr(structs, &sd.type_params, &sf.type_, sf.pos)?;
        }
        for md in &sd.methods {
            let scope: Vec<String> = sd.type_params.iter().chain(md.type_params.iter()).cloned().collect();
            for (_, param_ty) in &md.params {
                validate_type_expr(structs, &scope, param_ty, md.pos)?;
            }
            validate_type_expr(structs, &scope, &md.return_type, md.pos)?;
        }
    }
    for fd in program.functions() {
        for (_, param_ty) in &fd.params {
            validate_type_expr(structs, &fd.type_params, param_ty, fd.pos)?;
        }
        validate_type_expr(structs, &fd.type_params, &fd.return_type, fd.pos)?;
    }
    for imp in program.imports() {
        for param_ty in &imp.params {
            validate_type_expr(structs, &[], param_ty, imp.pos)?;
        }
        validate_type_expr(structs, &[], &imp.return_type, imp.pos)?;
    }
    Ok(())
}

impl<'a> Analyzer<'a> {
    fn drain_worklist(&mut self) -> Result<(), SemanticError> {
        while let Some(job) = self.discovered.worklist.pop_front() {
            match job {
                Job::Function { name, type_args } => self.check_function(&name, &type_args)?,
                Job::Method {
                    struct_name,
                    struct_args,
                    method_name,
                    method_args,
                } => self.check_method(&struct_name, &struct_args, &method_name, &method_args)?,
                Job::TopLevel => self.check_top_level()?,
            }
        }
        Ok(())
    }

    fn check_function(&mut self, name: &str, type_args: &[TypeExpr]) -> Result<(), SemanticError> {
        let fd = self
            .program
            .find_function(name)
            .unwrap_or_else(|| panic!("discovered function '{name}' must exist"));
        let sigma = Subst::from_pairs(&fd.type_params, type_args);
        let mut env = TypeEnv::new();
        for (pname, pty) in &fd.params {
            env.insert(pname.clone(), subst::subst(&sigma, pty));
        }
        let expected_ret = subst::subst(&sigma, &fd.return_type);
        checker::check_block(&self.ctx, &mut env, &sigma, &mut self.discovered, &fd.body, &expected_ret, false)?;
        if expected_ret != TypeExpr::void() && !checker::block_returns(&fd.body) {
            return Err(SemanticError::new(
                format!("Function '{name}' may exit without returning a value"),
                fd.pos,
            ));
        }
        Ok(())
    }

    fn check_method(
        &mut self,
        struct_name: &str,
        struct_args: &[TypeExpr],
        method_name: &str,
        method_args: &[TypeExpr],
    ) -> Result<(), SemanticError> {
        let sd = *self
            .ctx
            .structs
            .get(struct_name)
            .unwrap_or_else(|| panic!("discovered structure '{struct_name}' must exist"));
        let md = sd
            .method(method_name)
            .unwrap_or_else(|| panic!("discovered method '{struct_name}.{method_name}' must exist"));

        if INTRINSIC_STRUCTS.contains(&struct_name) {
            return Ok(());
        }

        let struct_subst = Subst::from_pairs(&sd.type_params, struct_args);
        let sigma = struct_subst.extended(&md.type_params, method_args);

        let mut env = TypeEnv::new();
        let is_constructor = md.is_constructor_of(struct_name);
        if !md.is_static || is_constructor {
            env.insert("this".to_string(), TypeExpr::generic(struct_name.to_string(), struct_args.to_vec()));
        }
        for (pname, pty) in &md.params {
            env.insert(pname.clone(), subst::subst(&sigma, pty));
        }
        let expected_ret = subst::subst(&sigma, &md.return_type);
        checker::check_block(&self.ctx, &mut env, &sigma, &mut self.discovered, &md.body, &expected_ret, false)?;
        if expected_ret != TypeExpr::void() && !is_constructor && !checker::block_returns(&md.body) {
            return Err(SemanticError::new(
                format!("Method '{struct_name}.{method_name}' may exit without returning a value"),
                md.pos,
            ));
        }
        Ok(())
    }

    fn check_top_level(&mut self) -> Result<(), SemanticError> {
        let stmts: Vec<Stmt> = self.program.top_level_statements().cloned().collect();
        let sigma = Subst::new();
        let mut env = TypeEnv::new();
        checker::check_block(&self.ctx, &mut env, &sigma, &mut self.discovered, &stmts, &TypeExpr::void(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn analyze_src(src: &str) -> Result<AnalysisResult, SemanticError> {
        let program = parser::parse(src).expect("parse failed");
        analyze(&program)
    }

    #[test]
    fn script_mode_runs_top_level_statements_when_no_main() {
        let result = analyze_src("int x = 1 + 2;").unwrap();
        assert!(!result.has_main);
    }

    #[test]
    fn top_level_statements_with_main_is_an_error() {
        let err = analyze_src("void main() {} int x = 1;").unwrap_err();
        assert!(err.to_string().contains("Top-level statements not allowed"));
    }

    #[test]
    fn redefined_function_is_an_error() {
        let err = analyze_src("void f() {} void f() {}").unwrap_err();
        assert!(err.to_string().contains("Function 'f' redefined"));
    }

    #[test]
    fn redefined_structure_is_an_error() {
        let err = analyze_src("structure S { int x; } structure S { int y; }").unwrap_err();
        assert!(err.to_string().contains("Structure 'S' redefined"));
    }

    #[test]
    fn constructor_must_return_its_own_generic_form() {
        let err = analyze_src("structure Box<T> { T value; static int Box(T v) {} }").unwrap_err();
        assert!(err.to_string().contains("must return Box<T>"));
    }

    #[test]
    fn non_void_function_without_return_on_all_paths_is_an_error() {
        let err = analyze_src("int f(bool b) { if (b) { return 1; } }").unwrap_err();
        assert!(err.to_string().contains("may exit without returning a value"));
    }

    #[test]
    fn generic_function_instantiation_is_discovered_per_call_site() {
        let result =
            analyze_src("T id<T>(T x) { return x; } void main() { int a = id<int>(1); bool b = id<bool>(true); }")
                .unwrap();
        assert!(result.fn_insts.contains(&("id".to_string(), vec![TypeExpr::int()])));
        assert!(result.fn_insts.contains(&("id".to_string(), vec![TypeExpr::boolean()])));
    }

    #[test]
    fn field_type_arity_mismatch_is_rejected_even_if_never_instantiated() {
        let err = analyze_src(
            "structure Box<T> { T value; } \
             structure Oops { Box<int, int> broken; } \
             void main() {}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Structure 'Box' expects 1 type argument"));
    }

    #[test]
    fn method_signature_with_unknown_type_is_rejected_even_if_never_instantiated() {
        let err = analyze_src(
            "structure Holder { int x; void useless(NoSuchType n) {} } \
             void main() {}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown type 'NoSuchType'"));
    }

    #[test]
    fn function_signature_well_formedness_is_checked_unconditionally() {
        let err = analyze_src("void unused(NoSuchType n) {} void main() {}").unwrap_err();
        assert!(err.to_string().contains("Unknown type 'NoSuchType'"));
    }

    #[test]
    fn intrinsic_struct_methods_are_not_type_checked() {
        // array's declared bodies are empty; if the analyzer tried to
        // type-check them as ordinary methods this would fail to find a
        // concrete body to validate against. It should succeed trivially.
        let result = analyze_src(
            "structure array<T> { \
                 int length; int buffer; \
                 static array<T> array(int length) {} \
                 T get(int i) {} \
                 void set(int i, T v) {} \
             } \
             void main() { array<int> a = array<int>(3); a.set(0, 1); int x = a.get(0); }",
        )
        .unwrap();
        assert!(result
            .method_insts
            .iter()
            .any(|(s, _, m, _)| s == "array" && m == "get"));
    }
}
