//! Literal end-to-end scenarios: source text in, observable behavior out,
//! driving the full lex/parse/import/semantic/codegen pipeline and then
//! executing the resulting module through `wasmtime` directly (which accepts
//! WAT text as well as binary, so these tests don't depend on an external
//! `wat2wasm` being installed).

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use wasmtime::{Engine, Linker, Module, Store};

fn std_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/std"))
}

/// Compiles `source` to WAT and runs its `main`, collecting everything the
/// host `print`/`write_chr`/`print_str` imports would have written to stdout
/// as a list of whitespace-trimmed lines, mirroring `driver::run_wasm` but
/// capturing output instead of writing to the real stdout.
fn run_and_capture(source: &str) -> Vec<String> {
    let wat = munic::compile_to_wat(source, &std_dir(), &std_dir()).expect("compilation failed");

    let engine = Engine::default();
    let module = Module::new(&engine, &wat).expect("wasmtime failed to assemble WAT");
    let mut store = Store::new(&engine, ());
    let mut linker: Linker<()> = Linker::new(&engine);

    let output = Rc::new(RefCell::new(String::new()));

    let out = Rc::clone(&output);
    linker
        .func_wrap("env", "print", move |n: i32| {
            out.borrow_mut().push_str(&format!("{n}\n"));
        })
        .unwrap();
    let out = Rc::clone(&output);
    linker
        .func_wrap("env", "write_chr", move |n: i32| {
            if let Some(c) = char::from_u32(n as u32) {
                out.borrow_mut().push(c);
            }
        })
        .unwrap();
    let out = Rc::clone(&output);
    linker
        .func_wrap("env", "print_str", move |caller: wasmtime::Caller<'_, ()>, vec_ptr: i32| {
            let memory = caller.get_export("memory").and_then(|e| e.into_memory()).unwrap();
            let read_i32 = |caller: &wasmtime::Caller<'_, ()>, addr: i32| -> i32 {
                let mut buf = [0u8; 4];
                memory.read(caller, addr as usize, &mut buf).unwrap();
                i32::from_le_bytes(buf)
            };
            let data_ptr = read_i32(&caller, vec_ptr);
            let size = read_i32(&caller, vec_ptr + 4);
            let buf_ptr = read_i32(&caller, data_ptr + 4);
            let mut bytes = Vec::with_capacity(size.max(0) as usize);
            for i in 0..size {
                bytes.push(read_i32(&caller, buf_ptr + i * 4) as u8);
            }
            out.borrow_mut().push_str(&String::from_utf8_lossy(&bytes));
        })
        .unwrap();

    let instance = linker.instantiate(&mut store, &module).unwrap();
    let main_fn = instance.get_typed_func::<(), ()>(&mut store, "main").unwrap();
    main_fn.call(&mut store, ()).unwrap();

    output
        .borrow()
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[test]
fn arithmetic_precedence() {
    let lines = run_and_capture("void main() { write_int(1 + 2 * 3); write_int((1+2)*3); }");
    assert_eq!(lines, vec!["7", "9"]);
}

#[test]
fn do_loop_runs_fixed_count() {
    let lines = run_and_capture("void main() { int i = 0; do 3 { i = i + 1; } write_int(i); }");
    assert_eq!(lines, vec!["3"]);
}

#[test]
fn while_loop_runs_until_condition() {
    let lines = run_and_capture("void main() { int x = 0; while (x != 5) { x = x + 1; } write_int(x); }");
    assert_eq!(lines, vec!["5"]);
}

#[test]
fn recursive_factorial() {
    let source = "int fact(int n) { if (n <= 1) { return 1; } return n * fact(n-1); } \
                  void main() { write_int(fact(5)); }";
    let lines = run_and_capture(source);
    assert_eq!(lines, vec!["120"]);
}

#[test]
fn generic_struct_instantiation_mangles_by_type_argument() {
    let source = "structure Box<T> { \
                      T value; \
                      static Box<T> Box(T v) { this.value = v; } \
                      T get() { return this.value; } \
                  } \
                  void main() { Box<int> b = Box<int>(42); write_int(b.get()); }";
    let wat = munic::compile_to_wat(source, &std_dir(), &std_dir()).expect("compilation failed");
    assert!(wat.contains("$Box_Box__int"), "missing mangled constructor:\n{wat}");
    assert!(wat.contains("$Box_get__int"), "missing mangled method:\n{wat}");

    let lines = run_and_capture(source);
    assert_eq!(lines, vec!["42"]);
}

#[test]
fn loop_runs_else_when_it_exits_via_its_condition() {
    let source = "void main() { \
                      int x = 0; \
                      while (x < 3) { x = x + 1; } else { write_int(100); } \
                      write_int(x); \
                  }";
    let lines = run_and_capture(source);
    assert_eq!(lines, vec!["100", "3"]);
}

#[test]
fn loop_skips_else_when_it_exits_via_break() {
    let source = "void main() { \
                      int x = 0; \
                      while (x < 3) { if (x == 1) { break; } x = x + 1; } else { write_int(100); } \
                      write_int(x); \
                  }";
    let lines = run_and_capture(source);
    assert_eq!(lines, vec!["1"]);
}

#[test]
fn struct_layout_is_one_word_per_field_in_declaration_order() {
    let source = "structure Triple { int a; int b; int c; } void main() {}";
    let program = munic::parser::parse(source).unwrap();
    let sd = program.find_struct("Triple").unwrap();
    assert_eq!(sd.size_bytes(), 12);
    assert_eq!(sd.field_offset("a"), Some(0));
    assert_eq!(sd.field_offset("b"), Some(4));
    assert_eq!(sd.field_offset("c"), Some(8));
}

#[test]
fn struct_constructor_allocates_exactly_its_own_size() {
    let source = "structure Triple { \
                      int a; int b; int c; \
                      static Triple Triple(int a, int b, int c) { \
                          this.a = a; this.b = b; this.c = c; \
                      } \
                  } \
                  void main() { Triple t = Triple(1, 2, 3); }";
    let wat = munic::compile_to_wat(source, &std_dir(), &std_dir()).expect("compilation failed");
    let alloc_line = wat
        .lines()
        .find(|l| l.contains("i32.const"))
        .map(str::trim)
        .unwrap_or_default();
    assert!(
        wat.contains("i32.const 12") && wat.contains("call $malloc"),
        "constructor should malloc exactly 12 bytes for 3 i32 fields (first i32.const line: {alloc_line}):\n{wat}"
    );
    assert!(wat.contains("i32.store offset=0"));
    assert!(wat.contains("i32.store offset=4"));
    assert!(wat.contains("i32.store offset=8"));
}

#[test]
fn generic_function_called_twice_with_same_type_args_emits_one_function() {
    let source = "T id<T>(T x) { return x; } \
                  void main() { write_int(id<int>(1)); write_int(id<int>(2)); }";
    let wat = munic::compile_to_wat(source, &std_dir(), &std_dir()).expect("compilation failed");
    let occurrences = wat.matches("(func $id__int ").count();
    assert_eq!(occurrences, 1, "expected exactly one monomorphized body:\n{wat}");

    let lines = run_and_capture(source);
    assert_eq!(lines, vec!["1", "2"]);
}

#[test]
fn compiling_the_same_source_twice_is_deterministic() {
    let source = "structure Box<T> { \
                      T value; \
                      static Box<T> Box(T v) { this.value = v; } \
                      T get() { return this.value; } \
                  } \
                  void main() { Box<int> a = Box<int>(1); Box<bool> b = Box<bool>(true); write_int(a.get()); }";
    let first = munic::compile_to_wat(source, &std_dir(), &std_dir()).expect("first compile failed");
    let second = munic::compile_to_wat(source, &std_dir(), &std_dir()).expect("second compile failed");
    assert_eq!(first, second);
}

#[test]
fn redeclaration_in_block_is_a_semantic_error() {
    let source = "void main() { int a = 1; int a = 2; }";
    let err = munic::compile_to_wat(source, &std_dir(), &std_dir()).unwrap_err();
    assert!(
        err.to_string().contains("Redeclaration of 'a'"),
        "unexpected error: {err}"
    );
}
