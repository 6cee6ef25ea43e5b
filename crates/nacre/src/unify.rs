//! First-order unification with row rewriting and level upgrade.

use crate::{
    error::{NacreError, TypeResult},
    intern::{Interner, Symbol},
    kind::Kind,
    pretty::TypePrinter,
    subst::Subst,
    types::{EMPTY, Mono, RowExt, TypeStore, VarId},
};

/// Unifies two monotypes, linking variables in `sub`.
///
/// `level` is the generalization rank of the calling inference state; fresh
/// variables minted while rewriting rows are born at this level.
pub fn unify(
    store: &mut TypeStore,
    sub: &mut Subst,
    interner: &Interner,
    level: usize,
    from: Mono,
    to: Mono,
) -> TypeResult<()> {
    let from = sub.substitute(store, from);
    let to = sub.substitute(store, to);

    if store.kind_of(from) != store.kind_of(to) {
        return Err(NacreError::kind_mismatch(format!(
            "cannot unify types of different kinds ({} and {})",
            store.kind_of(from),
            store.kind_of(to),
        )));
    }

    if let Mono::Var(v) = from {
        return link(store, sub, interner, v, to);
    }
    if let Mono::Var(v) = to {
        return link(store, sub, interner, v, from);
    }

    if let (Mono::App(f), Mono::App(t)) = (from, to) {
        // row polymorphism
        if *store.kind_of(from) == Kind::Row {
            return unify_rows(store, sub, interner, level, from, to);
        }
        let (fc, fa) = store.app_parts(f);
        let (tc, ta) = store.app_parts(t);
        unify(store, sub, interner, level, fc, tc)?;
        return unify(store, sub, interner, level, fa, ta);
    }

    if store.equal(from, to) {
        Ok(())
    } else {
        let mut printer = TypePrinter::new(store, interner);
        let lhs = printer.mono(from);
        let rhs = printer.mono(to);
        Err(NacreError::mismatch(&lhs, &rhs))
    }
}

/// Links `v` to a (zonked) monotype, after the occurs check, then demotes
/// any deeper variable reachable from the link target to `v`'s level.
fn link(store: &mut TypeStore, sub: &mut Subst, interner: &Interner, v: VarId, to: Mono) -> TypeResult<()> {
    if to == Mono::Var(v) {
        return Ok(());
    }
    if store.occurs(v, to) {
        let mut printer = TypePrinter::new(store, interner);
        let var = printer.mono(Mono::Var(v));
        let ty = printer.mono(to);
        return Err(NacreError::occurs_check(&var, &ty));
    }
    let level = store.var_level(v);
    sub.link(v, to);
    upgrade(store, sub, to, level);
    Ok(())
}

/// Ensures every variable reachable from `t` sits at or above `level` in the
/// generalization order: deeper variables are re-linked to fresh ones at
/// `level`. This keeps a variable's effective level from exceeding the level
/// at which it is reachable, which is what makes let-generalization sound.
fn upgrade(store: &mut TypeStore, sub: &mut Subst, t: Mono, level: usize) {
    match t {
        Mono::Cst(_) => {}
        Mono::Var(v) => {
            let resolved = sub.substitute(store, t);
            if resolved != t {
                upgrade(store, sub, resolved, level);
            } else if store.var_level(v) > level {
                let kind = store.var_kind(v).clone();
                let fresh = store.fresh_var(level, kind);
                sub.link(v, fresh);
            }
        }
        Mono::App(id) => {
            let (ctor, arg) = store.app_parts(id);
            upgrade(store, sub, ctor, level);
            upgrade(store, sub, arg, level);
        }
    }
}

fn unify_rows(
    store: &mut TypeStore,
    sub: &mut Subst,
    interner: &Interner,
    level: usize,
    from: Mono,
    to: Mono,
) -> TypeResult<()> {
    let Some(ext) = store.unpack_ext(from) else {
        let mut printer = TypePrinter::new(store, interner);
        let lhs = printer.mono(from);
        let rhs = printer.mono(to);
        return Err(NacreError::mismatch(&lhs, &rhs));
    };

    // rewrite `to` so its leftmost attribute lines up with `from`'s
    match rewrite(store, sub, interner, level, ext.attr, to)? {
        Some(rewritten) => {
            unify(store, sub, interner, level, ext.head, rewritten.head)?;
            unify(store, sub, interner, level, ext.tail, rewritten.tail)
        }
        None => {
            let attr = interner.resolve(ext.attr).to_owned();
            let row = {
                let record = store.record_of(to);
                TypePrinter::new(store, interner).mono(record)
            };
            Err(NacreError::missing_field(&attr, &row))
        }
    }
}

/// Rewrites a row so that `attr` becomes its leftmost attribute, returning
/// the exposed head and the remaining tail. `None` means the row is closed
/// and lacks the attribute.
fn rewrite(
    store: &mut TypeStore,
    sub: &mut Subst,
    interner: &Interner,
    level: usize,
    attr: Symbol,
    row: Mono,
) -> TypeResult<Option<RowExt>> {
    if let Some(ext) = store.unpack_ext(row) {
        if ext.attr == attr {
            return Ok(Some(ext));
        }
        // look for the attribute deeper in the row, then hoist it past this
        // extension
        let Some(inner) = rewrite(store, sub, interner, level, attr, ext.tail)? else {
            return Ok(None);
        };
        let tail = store.ext_row(ext.attr, ext.head, inner.tail)?;
        return Ok(Some(RowExt {
            attr,
            head: inner.head,
            tail,
        }));
    }

    match row {
        // an open row extends: mint the attribute and a fresh tail, and
        // constrain the row variable accordingly
        Mono::Var(_) => {
            let head = store.fresh_var(level, Kind::Term);
            let tail = store.fresh_var(level, Kind::Row);
            let extended = store.ext_row(attr, head, tail)?;
            unify(store, sub, interner, level, row, extended)?;
            Ok(Some(RowExt { attr, head, tail }))
        }
        // a closed row is missing the attribute
        _ => {
            debug_assert!(store.equal(row, EMPTY), "row constants are empty or extensions");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::ErrorKind,
        types::{BOOLEAN, INTEGER},
    };

    struct Fixture {
        store: TypeStore,
        sub: Subst,
        interner: Interner,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: TypeStore::new(),
                sub: Subst::new(),
                interner: Interner::new(),
            }
        }

        fn unify(&mut self, a: Mono, b: Mono) -> TypeResult<()> {
            unify(&mut self.store, &mut self.sub, &self.interner, 0, a, b)
        }

        fn zonk(&mut self, t: Mono) -> Mono {
            self.sub.substitute(&mut self.store, t)
        }
    }

    #[test]
    fn unified_types_substitute_equal() {
        let mut fx = Fixture::new();
        let a = fx.store.fresh_var(0, Kind::Term);
        let b = fx.store.fresh_var(0, Kind::Term);
        let lhs = fx.store.func(a, INTEGER);
        let rhs = fx.store.func(BOOLEAN, b);

        fx.unify(lhs, rhs).unwrap();
        let lhs = fx.zonk(lhs);
        let rhs = fx.zonk(rhs);
        assert!(fx.store.equal(lhs, rhs));
        let zonked_a = fx.zonk(a);
        assert!(fx.store.equal(zonked_a, BOOLEAN));
    }

    #[test]
    fn constant_mismatch() {
        let mut fx = Fixture::new();
        let err = fx.unify(INTEGER, BOOLEAN).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mismatch);
        assert_eq!(err.to_string(), "type error: cannot unify types \"integer\" and \"boolean\"");
    }

    #[test]
    fn kind_mismatch() {
        let mut fx = Fixture::new();
        let err = fx.unify(INTEGER, crate::types::EMPTY).unwrap_err();
        assert_eq!(err.kind, ErrorKind::KindMismatch);
    }

    #[test]
    fn occurs_check_rejects_infinite_types() {
        let mut fx = Fixture::new();
        let a = fx.store.fresh_var(0, Kind::Term);
        let f = fx.store.func(a, a);
        let err = fx.unify(a, f).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OccursCheck);
    }

    #[test]
    fn rows_unify_up_to_attribute_order() {
        let mut fx = Fixture::new();
        let x = fx.interner.intern("x");
        let y = fx.interner.intern("y");

        let tail = fx.store.ext_row(y, BOOLEAN, EMPTY).unwrap();
        let xy = fx.store.ext_row(x, INTEGER, tail).unwrap();
        let tail = fx.store.ext_row(x, INTEGER, EMPTY).unwrap();
        let yx = fx.store.ext_row(y, BOOLEAN, tail).unwrap();

        fx.unify(xy, yx).unwrap();
    }

    #[test]
    fn open_rows_collect_remaining_attributes() {
        let mut fx = Fixture::new();
        let x = fx.interner.intern("x");
        let y = fx.interner.intern("y");

        // {x: integer | r} against the closed {y: boolean; x: integer}
        let rho = fx.store.fresh_var(0, Kind::Row);
        let open = fx.store.ext_row(x, INTEGER, rho).unwrap();
        let tail = fx.store.ext_row(x, INTEGER, EMPTY).unwrap();
        let closed = fx.store.ext_row(y, BOOLEAN, tail).unwrap();

        fx.unify(open, closed).unwrap();

        // the tail variable picked up the leftover attribute
        let got = fx.zonk(rho);
        let (entries, tail) = fx.store.row_entries(got);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, y);
        let zonked_entry = fx.zonk(entries[0].1);
        assert!(fx.store.equal(zonked_entry, BOOLEAN));
        assert!(tail.is_none());
    }

    #[test]
    fn closed_rows_report_missing_fields() {
        let mut fx = Fixture::new();
        let x = fx.interner.intern("x");
        let y = fx.interner.intern("y");

        let want = fx.store.ext_row(x, INTEGER, EMPTY).unwrap();
        let have = fx.store.ext_row(y, INTEGER, EMPTY).unwrap();
        let err = fx.unify(want, have).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingField);
        assert!(err.message().contains("\"x\""));
    }

    #[test]
    fn rewriting_a_present_attribute_adds_no_constraints() {
        let mut fx = Fixture::new();
        let x = fx.interner.intern("x");
        let y = fx.interner.intern("y");

        let tail = fx.store.ext_row(y, BOOLEAN, EMPTY).unwrap();
        let row = fx.store.ext_row(x, INTEGER, tail).unwrap();

        let ext = rewrite(&mut fx.store, &mut fx.sub, &fx.interner, 0, y, row)
            .unwrap()
            .unwrap();
        assert_eq!(ext.attr, y);
        assert!(fx.store.equal(ext.head, BOOLEAN));
        // the rewritten spelling unifies with the original without linking
        // anything new
        let respelled = fx.store.ext_row(ext.attr, ext.head, ext.tail).unwrap();
        fx.unify(row, respelled).unwrap();
    }

    #[test]
    fn level_upgrade_demotes_deep_variables() {
        let mut fx = Fixture::new();
        let shallow = fx.store.fresh_var(0, Kind::Term);
        let deep = fx.store.fresh_var(3, Kind::Term);
        let deep_func = fx.store.func(deep, INTEGER);

        fx.unify(shallow, deep_func).unwrap();

        // `deep` is reachable from a level-0 variable, so its substitute
        // must now live at level 0
        let resolved = fx.zonk(deep);
        let Mono::Var(v) = resolved else {
            panic!("expected an upgraded variable")
        };
        assert_eq!(fx.store.var_level(v), 0);
    }
}
