//! Type substitution and the structural equality rule used throughout
//! type checking (spec §4.1).

use std::collections::HashMap;

use crate::ast::TypeExpr;

/// A substitution `TypeVarName -> TypeExpr`. Applied recursively: a type
/// parameter's own parameters are substituted first, then the head name is
/// looked up.
#[derive(Debug, Clone, Default)]
pub struct Subst(HashMap<String, TypeExpr>);

impl Subst {
    pub fn new() -> Self {
        Subst(HashMap::new())
    }

    /// Builds a substitution mapping `names[i] -> args[i]`. Panics if the
    /// lengths differ; callers must check arity before calling this (the
    /// semantic analyzer always does, as a `SemanticError`).
    pub fn from_pairs(names: &[String], args: &[TypeExpr]) -> Self {
        assert_eq!(names.len(), args.len(), "type-arg arity mismatch");
        Subst(
            names
                .iter()
                .cloned()
                .zip(args.iter().cloned())
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&TypeExpr> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new substitution with `names[i] -> args[i]` added on top of
    /// `self` (used to combine a struct's substitution with its method's
    /// own type parameters, which live in a distinct namespace).
    pub fn extended(&self, names: &[String], args: &[TypeExpr]) -> Self {
        assert_eq!(names.len(), args.len(), "type-arg arity mismatch");
        let mut map = self.0.clone();
        for (n, a) in names.iter().cloned().zip(args.iter().cloned()) {
            map.insert(n, a);
        }
        Subst(map)
    }
}

/// Applies `sigma` to `ty`, recursively substituting type-parameter names
/// that `sigma` binds and leaving everything else (built-in atoms,
/// declared struct names, unbound names) unchanged.
pub fn subst(sigma: &Subst, ty: &TypeExpr) -> TypeExpr {
    if ty.params.is_empty() {
        if let Some(bound) = sigma.get(&ty.name) {
            return bound.clone();
        }
        return ty.clone();
    }
    TypeExpr {
        name: ty.name.clone(),
        params: ty.params.iter().map(|p| subst(sigma, p)).collect(),
    }
}

/// Applies `sigma` to every type in `args`.
pub fn subst_all(sigma: &Subst, args: &[TypeExpr]) -> Vec<TypeExpr> {
    args.iter().map(|a| subst(sigma, a)).collect()
}

/// Structural type equality with the wildcard rule: `*` (the type of
/// `null`) is assignable to any declared struct type and to itself, but
/// not to `int`/`boolean`. `is_struct` must answer whether a bare name is
/// a declared structure (regardless of its own type parameters, since
/// `*` carries none).
///
/// This mirrors `original_source/muni2wasm/semantics.py`'s repeated
/// inline check `rt == lt or (rt == "*" and lt in structs)`, generalized
/// to be symmetric (either side may be the wildcard) and to compare full
/// `TypeExpr` trees rather than bare names.
pub fn types_compatible(expected: &TypeExpr, actual: &TypeExpr, is_struct: impl Fn(&str) -> bool) -> bool {
    if expected == actual {
        return true;
    }
    if actual.name == "*" && actual.params.is_empty() && is_struct(&expected.name) {
        return true;
    }
    if expected.name == "*" && expected.params.is_empty() && is_struct(&actual.name) {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subst_replaces_bound_type_vars_only() {
        let sigma = Subst::from_pairs(&["T".to_string()], &[TypeExpr::int()]);
        let ty = TypeExpr::generic("Box", vec![TypeExpr::simple("T")]);
        assert_eq!(subst(&sigma, &ty), TypeExpr::generic("Box", vec![TypeExpr::int()]));
        assert_eq!(subst(&sigma, &TypeExpr::simple("U")), TypeExpr::simple("U"));
    }

    #[test]
    fn wildcard_matches_struct_not_primitive() {
        let is_struct = |n: &str| n == "Box";
        assert!(types_compatible(&TypeExpr::simple("Box"), &TypeExpr::wildcard(), is_struct));
        assert!(types_compatible(&TypeExpr::wildcard(), &TypeExpr::simple("Box"), is_struct));
        assert!(!types_compatible(&TypeExpr::int(), &TypeExpr::wildcard(), is_struct));
        assert!(!types_compatible(&TypeExpr::wildcard(), &TypeExpr::boolean(), is_struct));
    }

    #[test]
    fn wildcard_matches_itself() {
        let is_struct = |_: &str| false;
        assert!(types_compatible(&TypeExpr::wildcard(), &TypeExpr::wildcard(), is_struct));
    }
}
