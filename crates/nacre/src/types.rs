//! Type terms: monotypes, polytypes, and the arena that owns them.
//!
//! Monotypes are `Copy` handles into a [`TypeStore`]: constants, variables
//! (identity-equal, carrying a birth level), and kind-checked constructor
//! applications. The core constants live at fixed ids so they can be named
//! as consts; row-extension constants are cached per attribute symbol.

use ahash::AHashMap;

use crate::{
    error::{NacreError, TypeResult},
    intern::Symbol,
    kind::Kind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CstId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(u32);

/// A monotype handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mono {
    Cst(CstId),
    Var(VarId),
    App(AppId),
}

/// A polytype: a monotype quantified over a set of variables.
///
/// The `forall` list is kept in first-occurrence order so that display names
/// are stable; membership is what matters semantically.
#[derive(Debug, Clone)]
pub struct Poly {
    pub forall: Vec<VarId>,
    pub body: Mono,
}

impl Poly {
    /// Wraps a monotype with no quantified variables.
    pub fn mono(body: Mono) -> Self {
        Self { forall: Vec::new(), body }
    }
}

// Core constants, in the order `TypeStore::new` interns them.
pub const UNIT: Mono = Mono::Cst(CstId(0));
pub const BOOLEAN: Mono = Mono::Cst(CstId(1));
pub const INTEGER: Mono = Mono::Cst(CstId(2));
pub const REAL: Mono = Mono::Cst(CstId(3));
pub const STRING: Mono = Mono::Cst(CstId(4));
/// The function constructor `->` of kind `* -> * -> *`.
pub const FUNC: Mono = Mono::Cst(CstId(5));
pub const IO: Mono = Mono::Cst(CstId(6));
pub const LIST: Mono = Mono::Cst(CstId(7));
/// The record constructor of kind `@ -> *`.
pub const RECORD: Mono = Mono::Cst(CstId(8));
/// The sum constructor of kind `@ -> *`.
pub const SUM: Mono = Mono::Cst(CstId(9));
/// The empty row `{}` of kind `@`.
pub const EMPTY: Mono = Mono::Cst(CstId(10));
/// The reification constructor `type` of kind `* -> *`.
pub const TYPE: Mono = Mono::Cst(CstId(11));
/// The constructor-reification constant `ctor` of kind `(* -> *) -> *`.
pub const CTOR: Mono = Mono::Cst(CstId(12));

#[derive(Debug, Clone)]
pub enum CstName {
    Named(&'static str),
    /// The row-extension constant for one attribute; displays as `attr:`.
    RowExt(Symbol),
}

#[derive(Debug, Clone)]
struct CstInfo {
    name: CstName,
    kind: Kind,
}

#[derive(Debug, Clone)]
struct VarInfo {
    level: usize,
    kind: Kind,
}

#[derive(Debug, Clone)]
struct AppInfo {
    ctor: Mono,
    arg: Mono,
    kind: Kind,
}

/// A destructured row extension `ext(attr)(head)(tail)`.
#[derive(Debug, Clone, Copy)]
pub struct RowExt {
    pub attr: Symbol,
    pub head: Mono,
    pub tail: Mono,
}

/// Arena for type terms.
#[derive(Debug)]
pub struct TypeStore {
    csts: Vec<CstInfo>,
    vars: Vec<VarInfo>,
    apps: Vec<AppInfo>,
    ext_cache: AHashMap<Symbol, CstId>,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self {
            csts: Vec::with_capacity(16),
            vars: Vec::new(),
            apps: Vec::new(),
            ext_cache: AHashMap::new(),
        };
        let term = || Kind::Term;
        let unary = || Kind::arrow(Kind::Term, Kind::Term);
        store.intern_cst("unit", term());
        store.intern_cst("boolean", term());
        store.intern_cst("integer", term());
        store.intern_cst("real", term());
        store.intern_cst("string", term());
        store.intern_cst("->", Kind::arrow(Kind::Term, unary()));
        store.intern_cst("io", unary());
        store.intern_cst("list", unary());
        store.intern_cst("record", Kind::arrow(Kind::Row, Kind::Term));
        store.intern_cst("sum", Kind::arrow(Kind::Row, Kind::Term));
        store.intern_cst("{}", Kind::Row);
        store.intern_cst("type", unary());
        store.intern_cst("ctor", Kind::arrow(unary(), Kind::Term));
        store
    }

    fn intern_cst(&mut self, name: &'static str, kind: Kind) -> CstId {
        let id = CstId(u32::try_from(self.csts.len()).expect("constant arena overflow"));
        self.csts.push(CstInfo {
            name: CstName::Named(name),
            kind,
        });
        id
    }

    /// Allocates a fresh type variable at the given level.
    pub fn fresh_var(&mut self, level: usize, kind: Kind) -> Mono {
        let id = VarId(u32::try_from(self.vars.len()).expect("variable arena overflow"));
        self.vars.push(VarInfo { level, kind });
        Mono::Var(id)
    }

    pub fn var_level(&self, var: VarId) -> usize {
        self.vars[var.0 as usize].level
    }

    pub fn var_kind(&self, var: VarId) -> &Kind {
        &self.vars[var.0 as usize].kind
    }

    pub fn cst_name(&self, cst: CstId) -> &CstName {
        &self.csts[cst.0 as usize].name
    }

    pub fn app_parts(&self, app: AppId) -> (Mono, Mono) {
        let info = &self.apps[app.0 as usize];
        (info.ctor, info.arg)
    }

    /// The row-extension constant for an attribute, of kind `* -> @ -> @`.
    pub fn ext(&mut self, attr: Symbol) -> Mono {
        if let Some(&id) = self.ext_cache.get(&attr) {
            return Mono::Cst(id);
        }
        let id = CstId(u32::try_from(self.csts.len()).expect("constant arena overflow"));
        self.csts.push(CstInfo {
            name: CstName::RowExt(attr),
            kind: Kind::arrow(Kind::Term, Kind::arrow(Kind::Row, Kind::Row)),
        });
        self.ext_cache.insert(attr, id);
        Mono::Cst(id)
    }

    pub fn kind_of(&self, t: Mono) -> &Kind {
        match t {
            Mono::Cst(id) => &self.csts[id.0 as usize].kind,
            Mono::Var(id) => &self.vars[id.0 as usize].kind,
            Mono::App(id) => &self.apps[id.0 as usize].kind,
        }
    }

    /// Builds a constructor application, checking kinds.
    pub fn app(&mut self, ctor: Mono, arg: Mono) -> TypeResult<Mono> {
        let Some((from, to)) = self.kind_of(ctor).as_arrow() else {
            return Err(NacreError::kind_mismatch("type constructor must have constructor kind"));
        };
        if from != self.kind_of(arg) {
            return Err(NacreError::kind_mismatch("argument does not have the expected kind"));
        }
        let kind = to.clone();
        let id = AppId(u32::try_from(self.apps.len()).expect("application arena overflow"));
        self.apps.push(AppInfo { ctor, arg, kind });
        Ok(Mono::App(id))
    }

    fn app_known(&mut self, ctor: Mono, arg: Mono) -> Mono {
        self.app(ctor, arg).expect("core constructor application is well-kinded")
    }

    /// `from -> to`.
    pub fn func(&mut self, from: Mono, to: Mono) -> Mono {
        let partial = self.app_known(FUNC, from);
        self.app_known(partial, to)
    }

    /// Curried function type over several arguments.
    pub fn func_chain(&mut self, args: &[Mono], result: Mono) -> Mono {
        args.iter().rev().fold(result, |acc, &arg| self.func(arg, acc))
    }

    pub fn io_of(&mut self, t: Mono) -> Mono {
        self.app_known(IO, t)
    }

    pub fn ty_of(&mut self, t: Mono) -> Mono {
        self.app_known(TYPE, t)
    }

    pub fn list_of(&mut self, t: Mono) -> Mono {
        self.app_known(LIST, t)
    }

    pub fn record_of(&mut self, row: Mono) -> Mono {
        self.app_known(RECORD, row)
    }

    pub fn sum_of(&mut self, row: Mono) -> Mono {
        self.app_known(SUM, row)
    }

    /// `ext(attr)(head)(tail)`.
    pub fn ext_row(&mut self, attr: Symbol, head: Mono, tail: Mono) -> TypeResult<Mono> {
        let ext = self.ext(attr);
        let partial = self.app(ext, head)?;
        self.app(partial, tail)
    }

    /// Destructures a row extension, if `t` has that shape.
    pub fn unpack_ext(&self, t: Mono) -> Option<RowExt> {
        let Mono::App(outer) = t else { return None };
        let (partial, tail) = self.app_parts(outer);
        let Mono::App(inner) = partial else { return None };
        let (ext, head) = self.app_parts(inner);
        let Mono::Cst(cst) = ext else { return None };
        match self.cst_name(cst) {
            CstName::RowExt(attr) => Some(RowExt { attr: *attr, head, tail }),
            CstName::Named(_) => None,
        }
    }

    /// Collects the attributes of a (zonked) row, plus its open tail if any.
    pub fn row_entries(&self, row: Mono) -> (Vec<(Symbol, Mono)>, Option<Mono>) {
        let mut entries = Vec::new();
        let mut cursor = row;
        loop {
            match self.unpack_ext(cursor) {
                Some(ext) => {
                    entries.push((ext.attr, ext.head));
                    cursor = ext.tail;
                }
                None if cursor == EMPTY => return (entries, None),
                None => return (entries, Some(cursor)),
            }
        }
    }

    /// Structural equality; variables and constants compare by identity.
    pub fn equal(&self, a: Mono, b: Mono) -> bool {
        match (a, b) {
            (Mono::Cst(x), Mono::Cst(y)) => x == y,
            (Mono::Var(x), Mono::Var(y)) => x == y,
            (Mono::App(x), Mono::App(y)) => {
                let (xc, xa) = self.app_parts(x);
                let (yc, ya) = self.app_parts(y);
                self.equal(xc, yc) && self.equal(xa, ya)
            }
            _ => false,
        }
    }

    /// Whether `v` occurs anywhere in `t`.
    pub fn occurs(&self, v: VarId, t: Mono) -> bool {
        match t {
            Mono::Cst(_) => false,
            Mono::Var(w) => v == w,
            Mono::App(id) => {
                let (ctor, arg) = self.app_parts(id);
                self.occurs(v, ctor) || self.occurs(v, arg)
            }
        }
    }

    /// The constant at the head of a (possibly applied) type, if any.
    pub fn head_ctor(&self, t: Mono) -> Option<CstId> {
        match t {
            Mono::Cst(id) => Some(id),
            Mono::Var(_) => None,
            Mono::App(id) => self.head_ctor(self.app_parts(id).0),
        }
    }

    /// Collects, in first-occurrence order, the variables of `t` whose level
    /// is at least `level`.
    pub fn vars_at_or_above(&self, t: Mono, level: usize, out: &mut Vec<VarId>) {
        match t {
            Mono::Cst(_) => {}
            Mono::Var(v) => {
                if self.var_level(v) >= level && !out.contains(&v) {
                    out.push(v);
                }
            }
            Mono::App(id) => {
                let (ctor, arg) = self.app_parts(id);
                self.vars_at_or_above(ctor, level, out);
                self.vars_at_or_above(arg, level, out);
            }
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn core_constants_have_expected_kinds() {
        let store = TypeStore::new();
        assert_eq!(*store.kind_of(INTEGER), Kind::Term);
        assert_eq!(*store.kind_of(EMPTY), Kind::Row);
        assert_eq!(store.kind_of(FUNC).to_string(), "* -> * -> *");
        assert_eq!(store.kind_of(RECORD).to_string(), "@ -> *");
        assert_eq!(store.kind_of(CTOR).to_string(), "(* -> *) -> *");
    }

    #[test]
    fn applications_are_kind_checked() {
        let mut store = TypeStore::new();
        let f = store.func(INTEGER, BOOLEAN);
        assert_eq!(*store.kind_of(f), Kind::Term);

        // record expects a row, not a term
        assert!(store.app(RECORD, INTEGER).is_err());
        // a non-constructor head is rejected
        assert!(store.app(INTEGER, BOOLEAN).is_err());
    }

    #[test]
    fn ext_constants_are_cached() {
        let mut store = TypeStore::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        assert_eq!(store.ext(x), store.ext(x));
    }

    #[test]
    fn rows_pack_and_unpack() {
        let mut store = TypeStore::new();
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let y = interner.intern("y");

        let inner = store.ext_row(y, BOOLEAN, EMPTY).unwrap();
        let row = store.ext_row(x, INTEGER, inner).unwrap();
        assert_eq!(*store.kind_of(row), Kind::Row);

        let ext = store.unpack_ext(row).unwrap();
        assert_eq!(ext.attr, x);
        assert!(store.equal(ext.head, INTEGER));

        let (entries, tail) = store.row_entries(row);
        assert_eq!(entries, vec![(x, INTEGER), (y, BOOLEAN)]);
        assert!(tail.is_none());
    }

    #[test]
    fn occurs_sees_through_applications() {
        let mut store = TypeStore::new();
        let v = store.fresh_var(0, Kind::Term);
        let Mono::Var(var) = v else { unreachable!() };
        let f = store.func(v, INTEGER);
        assert!(store.occurs(var, f));
        assert!(!store.occurs(var, INTEGER));
    }

    #[test]
    fn variables_are_identity_equal() {
        let mut store = TypeStore::new();
        let a = store.fresh_var(0, Kind::Term);
        let b = store.fresh_var(0, Kind::Term);
        assert!(store.equal(a, a));
        assert!(!store.equal(a, b));
    }
}
