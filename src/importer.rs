//! File-import inlining and standard-library loading (spec §6; grounded in
//! `original_source/muni2wasm/importer.py`).
//!
//! Both passes run after parsing and before semantic analysis: the AST a
//! program hands to the analyzer already has every `import "path";` spliced
//! in as ordinary top-level items, and every `.mun` file under the standard
//! library directory appended in sorted filename order. Host imports
//! (`import env.print(int) -> void;`) are left untouched here; the semantic
//! analyzer resolves those against the host ABI.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ast::{Program, TopLevel};
use crate::parser::{self, ParseError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// Recursively inlines `import "relative/path.mun";` declarations, splicing
/// the imported file's top-level items in place of the import. `seen`
/// guards against cyclic imports: a path already inlined on the current
/// chain is silently skipped, matching the original's behavior.
pub fn inline_file_imports(program: Program, base_dir: &Path) -> Result<Program, ImportError> {
    let mut seen = HashSet::new();
    inline_file_imports_rec(program, base_dir, &mut seen)
}

fn inline_file_imports_rec(
    program: Program,
    base_dir: &Path,
    seen: &mut HashSet<PathBuf>,
) -> Result<Program, ImportError> {
    let mut items = Vec::with_capacity(program.items.len());
    for item in program.items {
        match item {
            TopLevel::Import(ref imp) if imp.source.is_some() => {
                let source = imp.source.as_ref().unwrap();
                let import_path = normalize(&base_dir.join(source));
                if seen.contains(&import_path) {
                    continue;
                }
                if !import_path.is_file() {
                    return Err(ImportError::NotFound { path: import_path });
                }
                seen.insert(import_path.clone());

                let child = parse_file(&import_path)?;
                let child_dir = import_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                let child = inline_file_imports_rec(child, &child_dir, seen)?;
                items.extend(child.items);
            }
            other => items.push(other),
        }
    }
    Ok(Program { items })
}

/// Appends every `.mun` file under `std_dir`, in sorted filename order, to
/// `program`. Each standard library file has its own file-imports inlined
/// first. Returns `program` unchanged if `std_dir` does not exist.
pub fn import_standard_files(mut program: Program, std_dir: &Path) -> Result<Program, ImportError> {
    if !std_dir.is_dir() {
        return Ok(program);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(std_dir)
        .map_err(|source| ImportError::Io {
            path: std_dir.to_path_buf(),
            source,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "mun").unwrap_or(false))
        .collect();
    entries.sort();

    for path in entries {
        let child = parse_file(&path)?;
        let child_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let child = inline_file_imports(child, &child_dir)?;
        program.items.extend(child.items);
    }

    Ok(program)
}

fn parse_file(path: &Path) -> Result<Program, ImportError> {
    let src = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parser::parse(&src).map_err(|source| ImportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn inlines_a_single_file_import() {
        let dir = tempfile::tempdir().unwrap();
        write_tmp(dir.path(), "helper.mun", "void helper() { }");
        let main_src = "import \"helper.mun\";\nvoid main() { helper(); }";
        let program = parser::parse(main_src).unwrap();
        let program = inline_file_imports(program, dir.path()).unwrap();
        assert!(program.find_function("helper").is_some());
        assert!(program.find_function("main").is_some());
        assert!(program.imports().next().is_none());
    }

    #[test]
    fn cyclic_file_imports_are_skipped_not_infinite() {
        let dir = tempfile::tempdir().unwrap();
        write_tmp(dir.path(), "a.mun", "import \"b.mun\";\nvoid fa() { }");
        write_tmp(dir.path(), "b.mun", "import \"a.mun\";\nvoid fb() { }");
        let program = parse_file(&dir.path().join("a.mun")).unwrap();
        let program = inline_file_imports(program, dir.path()).unwrap();
        assert!(program.find_function("fa").is_some());
        assert!(program.find_function("fb").is_some());
    }

    #[test]
    fn missing_import_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let program = parser::parse("import \"nope.mun\";").unwrap();
        let err = inline_file_imports(program, dir.path()).unwrap_err();
        assert!(matches!(err, ImportError::NotFound { .. }));
    }

    #[test]
    fn standard_library_files_load_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write_tmp(dir.path(), "b_second.mun", "void second() { }");
        write_tmp(dir.path(), "a_first.mun", "void first() { }");
        let program = Program::default();
        let program = import_standard_files(program, dir.path()).unwrap();
        let names: Vec<&str> = program.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
