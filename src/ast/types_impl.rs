//! Constructors for AST nodes, kept apart from the type definitions
//! themselves (mirrors the teacher's `types.rs` / `types_impl.rs` split).

use super::types::{
    CallExpr, Expr, MemberAccessExpr, MethodCallExpr, Position, TypeExpr,
};

impl Expr {
    pub fn member_access(object: Expr, field: impl Into<String>, pos: Position) -> Self {
        Expr::MemberAccess(Box::new(MemberAccessExpr {
            object,
            field: field.into(),
            pos,
        }))
    }

    pub fn method_call(
        receiver: Expr,
        method: impl Into<String>,
        method_type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
        pos: Position,
    ) -> Self {
        Expr::MethodCall(Box::new(MethodCallExpr {
            receiver,
            method: method.into(),
            method_type_args,
            args,
            pos,
        }))
    }

    pub fn call(name: impl Into<String>, type_args: Vec<TypeExpr>, args: Vec<Expr>, pos: Position) -> Self {
        Expr::Call(Box::new(CallExpr {
            name: name.into(),
            type_args,
            args,
            pos,
        }))
    }

    pub fn is_lvalue_shape(&self) -> bool {
        matches!(self, Expr::Ident(..) | Expr::MemberAccess(..))
    }
}
