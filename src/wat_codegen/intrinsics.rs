//! Hand-lowered bodies for the three built-in container structures
//! (`semantic::INTRINSIC_STRUCTS`). The language has no raw memory-access
//! primitive, so `array<T>.get/set`'s indexed load/store and
//! `list<T>.append`'s pointer-chasing cannot be *written* in the language
//! itself — these are compiler intrinsics, the same way a real compiler's
//! runtime prelude often contains a handful of primitives no amount of
//! user-level code could express. `std/array.mun`, `std/list.mun` and
//! `std/string.mun` declare these structures with empty method bodies
//! purely so the checker has real field/method signatures to validate user
//! code against; `semantic::check_method` skips type-checking their bodies,
//! and this module supplies what actually gets emitted.
//!
//! Field layout is fixed and must match the corresponding `std/*.mun`
//! declaration's field order exactly, since ordinary `MemberAccess` on
//! these types (e.g. `s.size`) computes its offset from that declared
//! order:
//!   - `array<T>`: `length` (offset 0), `buffer` (offset 4, pointer to a
//!     flat block of 4-byte cells).
//!   - `list<T>`: `value` (offset 0), `next` (offset 4, 0 = end of chain).
//!   - `vec`: `data` (offset 0, pointer to an `array<int>`), `size`
//!     (offset 4), `capacity` (offset 8).

use crate::ast::TypeExpr;

use super::{mangle, CodegenError, Emitter, SCRATCH_LIT, SCRATCH_STRUCT_PTR};

pub(super) fn emit(
    emitter: &mut Emitter<'_>,
    struct_name: &str,
    struct_args: &[TypeExpr],
    method_name: &str,
    _method_args: &[TypeExpr],
) -> Result<(), CodegenError> {
    match (struct_name, method_name) {
        ("array", "array") => emit_array_ctor(emitter, struct_args),
        ("array", "get") => emit_array_get(emitter, struct_args),
        ("array", "set") => emit_array_set(emitter, struct_args),
        ("list", "list") => emit_list_ctor(emitter, struct_args),
        ("list", "append") => emit_list_append(emitter, struct_args),
        ("vec", "vec") => emit_vec_ctor(emitter, struct_args),
        _ => Err(CodegenError::Invariant(format!(
            "no intrinsic lowering for '{struct_name}.{method_name}'"
        ))),
    }
}

fn header(emitter: &mut Emitter<'_>, base: &str, struct_args: &[TypeExpr], params: &[&str], non_void: bool) {
    let mangled = mangle(base, struct_args);
    let mut line = format!("(func {mangled} (param $this i32)");
    for p in params {
        line.push_str(&format!(" (param ${p} i32)"));
    }
    if non_void {
        line.push_str(" (result i32)");
    }
    emitter.w(&line);
    emitter.w(&format!("  (local ${SCRATCH_STRUCT_PTR} i32)"));
    emitter.w(&format!("  (local ${SCRATCH_LIT} i32)"));
}

/// `array<T>(int length)`: stores `length`, then mallocs `length * 4`
/// bytes for `buffer`.
fn emit_array_ctor(emitter: &mut Emitter<'_>, struct_args: &[TypeExpr]) -> Result<(), CodegenError> {
    header(emitter, "array_array", struct_args, &["length"], true);
    emitter.w("  local.get $this");
    emitter.w("  local.get $length");
    emitter.w("  i32.store offset=0");
    emitter.w("  local.get $this");
    emitter.w("  local.get $length");
    emitter.w("  i32.const 4");
    emitter.w("  i32.mul");
    emitter.w("  call $malloc");
    emitter.w("  i32.store offset=4");
    emitter.w("  local.get $this");
    emitter.w("  return");
    emitter.w(")");
    Ok(())
}

/// `T get(int i)`: `i32.load offset=0` at `buffer + i*4`.
fn emit_array_get(emitter: &mut Emitter<'_>, struct_args: &[TypeExpr]) -> Result<(), CodegenError> {
    header(emitter, "array_get", struct_args, &["i"], true);
    emitter.w("  local.get $this");
    emitter.w("  i32.load offset=4");
    emitter.w("  local.get $i");
    emitter.w("  i32.const 4");
    emitter.w("  i32.mul");
    emitter.w("  i32.add");
    emitter.w("  i32.load offset=0");
    emitter.w("  return");
    emitter.w(")");
    Ok(())
}

/// `void set(int i, T v)`: `i32.store offset=0` at `buffer + i*4`.
fn emit_array_set(emitter: &mut Emitter<'_>, struct_args: &[TypeExpr]) -> Result<(), CodegenError> {
    header(emitter, "array_set", struct_args, &["i", "v"], false);
    emitter.w("  local.get $this");
    emitter.w("  i32.load offset=4");
    emitter.w("  local.get $i");
    emitter.w("  i32.const 4");
    emitter.w("  i32.mul");
    emitter.w("  i32.add");
    emitter.w("  local.get $v");
    emitter.w("  i32.store offset=0");
    emitter.w("  return");
    emitter.w(")");
    Ok(())
}

/// `list<T>(T value)`: stores `value`, `next = 0`.
fn emit_list_ctor(emitter: &mut Emitter<'_>, struct_args: &[TypeExpr]) -> Result<(), CodegenError> {
    header(emitter, "list_list", struct_args, &["value"], true);
    emitter.w("  local.get $this");
    emitter.w("  local.get $value");
    emitter.w("  i32.store offset=0");
    emitter.w("  local.get $this");
    emitter.w("  i32.const 0");
    emitter.w("  i32.store offset=4");
    emitter.w("  local.get $this");
    emitter.w("  return");
    emitter.w(")");
    Ok(())
}

/// `void append(list<T> other)`: walks `next` pointers to the tail, then
/// links `other` on. Mutates in place; returns nothing, so a list literal's
/// repeated `append` calls need no intermediate `drop`.
fn emit_list_append(emitter: &mut Emitter<'_>, struct_args: &[TypeExpr]) -> Result<(), CodegenError> {
    header(emitter, "list_append", struct_args, &["other"], false);
    emitter.w("  local.get $this");
    emitter.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
    emitter.w("  block $break");
    emitter.w("  loop $head");
    emitter.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
    emitter.w("  i32.load offset=4");
    emitter.w(&format!("  local.tee ${SCRATCH_LIT}"));
    emitter.w("  i32.eqz");
    emitter.w("  br_if $break");
    emitter.w(&format!("  local.get ${SCRATCH_LIT}"));
    emitter.w(&format!("  local.set ${SCRATCH_STRUCT_PTR}"));
    emitter.w("  br $head");
    emitter.w("  end");
    emitter.w("  end");
    emitter.w(&format!("  local.get ${SCRATCH_STRUCT_PTR}"));
    emitter.w("  local.get $other");
    emitter.w("  i32.store offset=4");
    emitter.w("  return");
    emitter.w(")");
    Ok(())
}

/// `vec(int data, int size, int capacity)`: stores the three fields
/// verbatim. Not used by string-literal lowering (`Emitter::emit_string_literal`
/// builds `vec` instances directly), only by explicit user-level
/// construction, if any.
fn emit_vec_ctor(emitter: &mut Emitter<'_>, struct_args: &[TypeExpr]) -> Result<(), CodegenError> {
    header(emitter, "vec_vec", struct_args, &["data", "size", "capacity"], true);
    emitter.w("  local.get $this");
    emitter.w("  local.get $data");
    emitter.w("  i32.store offset=0");
    emitter.w("  local.get $this");
    emitter.w("  local.get $size");
    emitter.w("  i32.store offset=4");
    emitter.w("  local.get $this");
    emitter.w("  local.get $capacity");
    emitter.w("  i32.store offset=8");
    emitter.w("  local.get $this");
    emitter.w("  return");
    emitter.w(")");
    Ok(())
}
