//! Package loading.
//!
//! `(import name)` resolves `name.nc` against the search path, runs the
//! package's items through the same pipeline as the main program, and
//! exposes the package as a record. The type side happens here (sharing the
//! caller's arena and substitution, with a package-local top scope); the
//! value side is computed lazily by the VM the first time the package is
//! imported at runtime.

use std::{fs, path::PathBuf, rc::Rc};

use ahash::AHashMap;

use crate::{
    ast::Expr,
    error::{ErrorKind, NacreError, Phase, TypeResult},
    infer::Infer,
    intern::Symbol,
    parse,
    types::{EMPTY, Poly},
    value::Value,
};

/// The file extension packages are resolved with.
pub const PACKAGE_EXTENSION: &str = "nc";

/// A loaded package: its record signature, its exported names in definition
/// order, its elaborated items, and (once the VM has imported it) its record
/// value.
#[derive(Debug)]
pub struct Package {
    pub sig: Poly,
    pub exports: Vec<Symbol>,
    pub items: Rc<[Expr]>,
    pub value: Option<Value>,
}

/// Cache of loaded packages plus the search path.
#[derive(Debug)]
pub struct PackageStore {
    pub path: Vec<PathBuf>,
    cache: AHashMap<Symbol, Package>,
    loading: Vec<Symbol>,
}

impl PackageStore {
    pub fn new(path: Vec<PathBuf>) -> Self {
        Self {
            path,
            cache: AHashMap::new(),
            loading: Vec::new(),
        }
    }

    pub fn get(&self, name: Symbol) -> Option<&Package> {
        self.cache.get(&name)
    }

    pub fn set_value(&mut self, name: Symbol, value: Value) {
        if let Some(package) = self.cache.get_mut(&name) {
            package.value = Some(value);
        }
    }

    /// Finds `<name>.nc` on the search path.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.path
            .iter()
            .map(|dir| dir.join(format!("{name}.{PACKAGE_EXTENSION}")))
            .find(|candidate| candidate.is_file())
    }
}

/// Loads a package's types, caching the result. Returns its record
/// signature: every exported binding instantiated into one row.
pub fn load_types(infer: &mut Infer<'_>, name: Symbol) -> TypeResult<Poly> {
    if let Some(package) = infer.packages.get(name) {
        return Ok(package.sig.clone());
    }
    if infer.packages.loading.contains(&name) {
        return Err(NacreError::new(
            Phase::Type,
            ErrorKind::Unsupported,
            format!("circular import of package \"{}\"", infer.interner.resolve(name)),
        ));
    }

    let name_str = infer.interner.resolve(name).to_owned();
    let Some(path) = infer.packages.resolve(&name_str) else {
        return Err(NacreError::new(
            Phase::Type,
            ErrorKind::Unbound,
            format!("package \"{name_str}\" not found"),
        ));
    };
    let source = fs::read_to_string(&path).map_err(|err| {
        NacreError::new(
            Phase::Type,
            ErrorKind::Unbound,
            format!("package \"{name_str}\" unreadable: {err}"),
        )
    })?;

    let sexprs = parse::parse_program(&source, infer.interner)?;
    let mut items = Vec::with_capacity(sexprs.len());
    for sexpr in &sexprs {
        items.push(Expr::toplevel(sexpr, infer.interner)?);
    }

    infer.packages.loading.push(name);
    let saved = infer.env.begin_package();
    let inferred: TypeResult<()> = items.iter().try_for_each(|item| infer.infer(item).map(|_| ()));
    let bindings = infer.env.end_package(saved);
    infer.packages.loading.pop();
    inferred?;

    // the package signature is the record of its exports
    let mut row = EMPTY;
    let mut exports = Vec::with_capacity(bindings.len());
    for (export, poly) in bindings.into_iter().rev() {
        let instance = infer.env.instantiate(&poly);
        row = infer.env.store.ext_row(export, instance, row)?;
        exports.push(export);
    }
    exports.reverse();
    let record = infer.env.store.record_of(row);
    let sig = infer.env.generalize(record);

    infer.packages.cache.insert(
        name,
        Package {
            sig: sig.clone(),
            exports,
            items: items.into(),
            value: None,
        },
    );
    Ok(sig)
}
