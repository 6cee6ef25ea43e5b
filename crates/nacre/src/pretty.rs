//! Type display.
//!
//! Quantified variables print as `'a`, `'b`, ... in first-appearance order;
//! free variables print as `!a`. Function types are infix and associate to
//! the right, records and open rows print braced: `{x: integer | !r}`.

use ahash::AHashMap;

use crate::{
    intern::Interner,
    kind::Kind,
    types::{CstName, FUNC, Mono, Poly, RECORD, TypeStore, VarId},
};

/// Renders types against one shared variable-naming table, so several types
/// in the same message use consistent names.
pub struct TypePrinter<'a> {
    store: &'a TypeStore,
    interner: &'a Interner,
    names: AHashMap<VarId, usize>,
}

impl<'a> TypePrinter<'a> {
    pub fn new(store: &'a TypeStore, interner: &'a Interner) -> Self {
        Self {
            store,
            interner,
            names: AHashMap::new(),
        }
    }

    pub fn poly(&mut self, poly: &Poly) -> String {
        let mut out = String::new();
        self.write(&mut out, poly.body, &poly.forall);
        out
    }

    pub fn mono(&mut self, t: Mono) -> String {
        let mut out = String::new();
        self.write(&mut out, t, &[]);
        out
    }

    fn var_name(&mut self, var: VarId) -> String {
        let next = self.names.len();
        let index = *self.names.entry(var).or_insert(next);
        let letter = char::from(b'a' + (index % 26) as u8);
        if index < 26 {
            letter.to_string()
        } else {
            format!("{letter}{}", index / 26)
        }
    }

    fn write(&mut self, out: &mut String, t: Mono, forall: &[VarId]) {
        match t {
            Mono::Cst(cst) => match self.store.cst_name(cst) {
                CstName::Named(name) => out.push_str(name),
                CstName::RowExt(attr) => {
                    out.push_str(self.interner.resolve(*attr));
                    out.push(':');
                }
            },
            Mono::Var(var) => {
                out.push(if forall.contains(&var) { '\'' } else { '!' });
                let name = self.var_name(var);
                out.push_str(&name);
            }
            Mono::App(id) => {
                let (ctor, arg) = self.store.app_parts(id);
                // records print as their braced row
                if ctor == RECORD {
                    self.write_braced_row(out, arg, forall);
                    return;
                }
                // full function applications print infix
                if let Some((lhs, rhs)) = self.as_func(t) {
                    if self.as_func(lhs).is_some() {
                        out.push('(');
                        self.write(out, lhs, forall);
                        out.push(')');
                    } else {
                        self.write(out, lhs, forall);
                    }
                    out.push_str(" -> ");
                    self.write(out, rhs, forall);
                    return;
                }
                self.write(out, ctor, forall);
                out.push(' ');
                if *self.store.kind_of(arg) == Kind::Row {
                    self.write_braced_row(out, arg, forall);
                } else if matches!(arg, Mono::App(_)) && !self.is_record(arg) {
                    out.push('(');
                    self.write(out, arg, forall);
                    out.push(')');
                } else {
                    // records bring their own braces
                    self.write(out, arg, forall);
                }
            }
        }
    }

    fn write_braced_row(&mut self, out: &mut String, row: Mono, forall: &[VarId]) {
        let (entries, tail) = self.store.row_entries(row);
        out.push('{');
        for (i, (attr, head)) in entries.iter().enumerate() {
            if i > 0 {
                out.push_str("; ");
            }
            out.push_str(self.interner.resolve(*attr));
            out.push_str(": ");
            self.write(out, *head, forall);
        }
        if let Some(tail) = tail {
            if !entries.is_empty() {
                out.push_str(" | ");
            }
            self.write(out, tail, forall);
        }
        out.push('}');
    }

    fn is_record(&self, t: Mono) -> bool {
        match t {
            Mono::App(id) => self.store.app_parts(id).0 == RECORD,
            _ => false,
        }
    }

    fn as_func(&self, t: Mono) -> Option<(Mono, Mono)> {
        let Mono::App(outer) = t else { return None };
        let (partial, rhs) = self.store.app_parts(outer);
        let Mono::App(inner) = partial else { return None };
        let (head, lhs) = self.store.app_parts(inner);
        (head == FUNC).then_some((lhs, rhs))
    }
}

/// One-shot monotype rendering.
pub fn render_mono(store: &TypeStore, interner: &Interner, t: Mono) -> String {
    TypePrinter::new(store, interner).mono(t)
}
