//! Type inference.
//!
//! A Hindley-Milner elaborator with level-based let-generalization,
//! row-polymorphic records, reified types for annotations, and the
//! signature-unwrapping retry on applications. The typing state is a stack
//! of scopes over one shared arena and substitution; entering a let or
//! lambda body pushes a scope one level deeper.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{Arg, Attr, Binding, Expr, Literal},
    error::{ErrorKind, NacreError, Phase, TypeResult},
    intern::{Interner, Symbol},
    kind::Kind,
    package::{self, PackageStore},
    pretty::TypePrinter,
    subst::Subst,
    types::{BOOLEAN, CstId, CstName, EMPTY, INTEGER, Mono, Poly, REAL, STRING, TypeStore, UNIT, VarId},
    unify,
};

/// The persistent typing state: arena, substitution, signatures, and the
/// lexical scope stack. Scope zero holds the builtin bindings and the
/// program's top-level definitions, both at level 0.
#[derive(Debug)]
pub struct TypeEnv {
    pub store: TypeStore,
    pub sub: Subst,
    /// Nominal-constructor signatures, keyed by constructor constant.
    pub sigs: AHashMap<CstId, Poly>,
    scopes: Vec<Scope>,
    /// The builtin bindings, kept separately so package scopes can start
    /// from them.
    builtin_template: IndexMap<Symbol, Poly>,
}

#[derive(Debug)]
pub(crate) struct Scope {
    level: usize,
    vars: IndexMap<Symbol, Poly>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self {
            store: TypeStore::new(),
            sub: Subst::new(),
            sigs: AHashMap::new(),
            scopes: vec![Scope {
                level: 0,
                vars: IndexMap::new(),
            }],
            builtin_template: IndexMap::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.scopes.last().expect("scope stack is non-empty").level
    }

    fn parent_level(&self) -> usize {
        match self.scopes.len() {
            0 | 1 => 0,
            n => self.scopes[n - 2].level,
        }
    }

    fn enter(&mut self) {
        let level = self.level() + 1;
        self.scopes.push(Scope {
            level,
            vars: IndexMap::new(),
        });
    }

    fn exit(&mut self) {
        assert!(self.scopes.len() > 1, "cannot exit the global scope");
        self.scopes.pop();
    }

    /// A fresh variable at the current level.
    pub fn fresh(&mut self, kind: Kind) -> Mono {
        let level = self.level();
        self.store.fresh_var(level, kind)
    }

    pub fn lookup(&self, name: Symbol) -> Option<&Poly> {
        self.scopes.iter().rev().find_map(|scope| scope.vars.get(&name))
    }

    fn current_scope_has(&self, name: Symbol) -> bool {
        self.scopes
            .last()
            .expect("scope stack is non-empty")
            .vars
            .contains_key(&name)
    }

    fn bind(&mut self, name: Symbol, poly: Poly) {
        self.scopes
            .last_mut()
            .expect("scope stack is non-empty")
            .vars
            .insert(name, poly);
    }

    /// Fully resolves a monotype against the substitution.
    pub fn zonk(&mut self, t: Mono) -> Mono {
        self.sub.substitute(&mut self.store, t)
    }

    /// Quantifies the variables of `t` at or below the current level.
    pub fn generalize(&mut self, t: Mono) -> Poly {
        let level = self.level();
        self.generalize_at(level, t)
    }

    /// Quantifies the variables of `t` born at `level` or deeper.
    pub(crate) fn generalize_at(&mut self, level: usize, t: Mono) -> Poly {
        let body = self.zonk(t);
        let mut forall = Vec::new();
        self.store.vars_at_or_above(body, level, &mut forall);
        Poly { forall, body }
    }

    /// Replaces quantified variables with fresh ones at the current level.
    pub fn instantiate(&mut self, poly: &Poly) -> Mono {
        if poly.forall.is_empty() {
            return poly.body;
        }
        let level = self.level();
        let mut map = AHashMap::with_capacity(poly.forall.len());
        for &var in &poly.forall {
            let kind = self.store.var_kind(var).clone();
            map.insert(var, self.store.fresh_var(level, kind));
        }
        rewrite_vars(&mut self.store, &map, poly.body)
    }

    /// Installs a builtin binding into the global scope and the template
    /// package scopes start from.
    pub fn define_builtin(&mut self, name: Symbol, poly: Poly) {
        self.builtin_template.insert(name, poly.clone());
        self.scopes[0].vars.insert(name, poly);
    }

    /// Swaps in a fresh top-level scope seeded with the builtins, for
    /// inferring a package. Returns the saved scopes for [`Self::end_package`].
    pub(crate) fn begin_package(&mut self) -> Vec<Scope> {
        let fresh = Scope {
            level: 0,
            vars: self.builtin_template.clone(),
        };
        std::mem::replace(&mut self.scopes, vec![fresh])
    }

    /// Restores the saved scopes and returns the package's own bindings in
    /// definition order.
    pub(crate) fn end_package(&mut self, saved: Vec<Scope>) -> Vec<(Symbol, Poly)> {
        let package_scope = std::mem::replace(&mut self.scopes, saved)
            .into_iter()
            .next()
            .expect("package scope stack is non-empty");
        package_scope
            .vars
            .into_iter()
            .skip(self.builtin_template.len())
            .collect()
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

fn rewrite_vars(store: &mut TypeStore, map: &AHashMap<VarId, Mono>, t: Mono) -> Mono {
    match t {
        Mono::Cst(_) => t,
        Mono::Var(var) => map.get(&var).copied().unwrap_or(t),
        Mono::App(id) => {
            let (ctor, arg) = store.app_parts(id);
            let ctor_new = rewrite_vars(store, map, ctor);
            let arg_new = rewrite_vars(store, map, arg);
            if ctor_new == ctor && arg_new == arg {
                t
            } else {
                store.app(ctor_new, arg_new).expect("instantiation preserves kinds")
            }
        }
    }
}

/// One inference pass over an expression, borrowing the shared state.
pub struct Infer<'a> {
    pub env: &'a mut TypeEnv,
    pub interner: &'a mut Interner,
    pub packages: &'a mut PackageStore,
    /// Bound on reified-type reconstruction depth.
    pub max_type_depth: usize,
}

impl Infer<'_> {
    pub fn infer(&mut self, expr: &Expr) -> TypeResult<Mono> {
        match expr {
            Expr::Lit(lit) => Ok(match lit {
                Literal::Unit => UNIT,
                Literal::Bool(_) => BOOLEAN,
                Literal::Int(_) => INTEGER,
                Literal::Real(_) => REAL,
                Literal::Str(_) => STRING,
            }),
            Expr::Var(name) => match self.env.lookup(*name) {
                Some(poly) => {
                    let poly = poly.clone();
                    Ok(self.env.instantiate(&poly))
                }
                None => Err(NacreError::unbound(self.interner.resolve(*name))),
            },
            Expr::Sel(attr) => {
                let tail = self.env.fresh(Kind::Row);
                let head = self.env.fresh(Kind::Term);
                let row = self.env.store.ext_row(*attr, head, tail)?;
                let record = self.env.store.record_of(row);
                Ok(self.env.store.func(record, head))
            }
            Expr::Abs { args, body } => self.infer_abs(args, body),
            Expr::App { func, args } => self.infer_app(func, args),
            Expr::Let { defs, body } => self.infer_let(defs, body),
            Expr::Cond { test, conseq, alt } => {
                let test = self.infer(test)?;
                self.unify(test, BOOLEAN)?;
                let conseq = self.infer(conseq)?;
                let alt = self.infer(alt)?;
                let result = self.env.fresh(Kind::Term);
                self.unify(result, conseq)?;
                self.unify(result, alt)?;
                Ok(result)
            }
            Expr::Record { attrs } => {
                let row = self.infer_row(attrs)?;
                Ok(self.env.store.record_of(row))
            }
            Expr::Make { name, attrs } => self.infer_make(*name, attrs),
            Expr::Use { env, body } => self.infer_use(env, body),
            Expr::Import(name) => self.infer_import(*name),
            Expr::Def { name, value } => self.infer_def(*name, value),
            Expr::Seq { items } => {
                let mut last = None;
                for item in items {
                    last = Some(self.infer(item)?);
                }
                match last {
                    Some(t) => Ok(t),
                    None => Ok(self.env.store.io_of(UNIT)),
                }
            }
            Expr::Inj(tag) => Err(NacreError::unsupported(&format!(
                "injection \"|{}\"",
                self.interner.resolve(*tag)
            ))),
            Expr::Match { .. } => Err(NacreError::unsupported("match")),
        }
    }

    fn unify(&mut self, from: Mono, to: Mono) -> TypeResult<()> {
        let level = self.env.level();
        self.unify_at(level, from, to)
    }

    fn unify_at(&mut self, level: usize, from: Mono, to: Mono) -> TypeResult<()> {
        unify::unify(&mut self.env.store, &mut self.env.sub, self.interner, level, from, to)
    }

    fn cst_display(&self, cst: CstId) -> String {
        match self.env.store.cst_name(cst) {
            CstName::Named(name) => (*name).to_owned(),
            CstName::RowExt(attr) => format!("{}:", self.interner.resolve(*attr)),
        }
    }

    /// Infers a record row, attributes left to right, row built rightmost
    /// first.
    fn infer_row(&mut self, attrs: &[Attr]) -> TypeResult<Mono> {
        let mut heads = Vec::with_capacity(attrs.len());
        for attr in attrs {
            heads.push((attr.name, self.infer(&attr.value)?));
        }
        let mut row = EMPTY;
        for (name, head) in heads.into_iter().rev() {
            row = self.env.store.ext_row(name, head, row)?;
        }
        Ok(row)
    }

    fn infer_abs(&mut self, args: &[Arg], body: &Expr) -> TypeResult<Mono> {
        // annotation expressions are inferred in the enclosing scope
        let mut annotations = Vec::with_capacity(args.len());
        for arg in args {
            annotations.push(match arg {
                Arg::Plain(_) => None,
                Arg::Typed { ty, .. } => Some(self.infer(ty)?),
            });
        }

        let result = self.env.fresh(Kind::Term);
        self.env.enter();
        let arg_tys = self.infer_abs_args(args, &annotations);
        let body_ty = arg_tys.as_ref().ok().map(|_| self.infer(body));
        self.env.exit();

        let arg_tys = arg_tys?;
        let body_ty = body_ty.expect("body inferred when arguments succeeded")?;
        self.unify(result, body_ty)?;
        Ok(self.env.store.func_chain(&arg_tys, result))
    }

    /// Binds the arguments in the (already entered) function scope and
    /// returns their types in order.
    fn infer_abs_args(&mut self, args: &[Arg], annotations: &[Option<Mono>]) -> TypeResult<Vec<Mono>> {
        let parent = self.env.parent_level();
        let mut arg_tys = Vec::with_capacity(args.len());
        for (arg, annotation) in args.iter().zip(annotations) {
            let formal = match annotation {
                // untyped arguments are fresh, one level up: formals must
                // not be captured by generalization inside the body
                None => self.env.store.fresh_var(parent, Kind::Term),
                Some(reified) => {
                    let reified = self.env.zonk(*reified);
                    let underlying = self.reconstruct(reified, self.max_type_depth)?;
                    let sig = self.signature_of(underlying)?;
                    let sig_inst = self.env.instantiate(&sig);
                    let outer = self.env.store.fresh_var(parent, Kind::Term);
                    let inner = self.env.fresh(Kind::Term);
                    let shape = self.env.store.func(outer, inner);
                    self.unify(shape, sig_inst)?;
                    // the annotation constrains the formal
                    self.unify(underlying, outer)?;
                    outer
                }
            };
            self.env.bind(arg.name(), Poly::mono(formal));
            arg_tys.push(formal);
        }
        Ok(arg_tys)
    }

    /// The registered signature for the head constructor of `t`.
    fn signature_of(&mut self, t: Mono) -> TypeResult<Poly> {
        let zonked = self.env.zonk(t);
        let Some(cst) = self.env.store.head_ctor(zonked) else {
            return Err(NacreError::new(
                Phase::Type,
                ErrorKind::Mismatch,
                "type constructor must be a constant",
            ));
        };
        self.env
            .sigs
            .get(&cst)
            .cloned()
            .ok_or_else(|| NacreError::unknown_signature(&self.cst_display(cst)))
    }

    /// Extracts the underlying type from a reified one: peels `type t` or
    /// walks down the result side of arrows until one appears.
    fn reconstruct(&mut self, t: Mono, depth: usize) -> TypeResult<Mono> {
        if depth == 0 {
            return Err(NacreError::new(
                Phase::Type,
                ErrorKind::DepthLimit,
                "type annotation is nested too deeply",
            ));
        }
        if let Mono::App(id) = t {
            let (ctor, arg) = self.env.store.app_parts(id);
            if ctor == crate::types::TYPE {
                return Ok(arg);
            }
        }
        let from = self.env.fresh(Kind::Term);
        let to = self.env.fresh(Kind::Term);
        let shape = self.env.store.func(from, to);
        self.unify(shape, t)?;
        let to = self.env.zonk(to);
        self.reconstruct(to, depth - 1)
    }

    fn infer_app(&mut self, func: &Expr, args: &[Expr]) -> TypeResult<Mono> {
        // zero-argument application is the function itself
        let Some((last, init)) = args.split_last() else {
            return self.infer(func);
        };
        if init.is_empty() {
            return self.infer_unary_app(func, last);
        }
        // normalize to nested unary applications
        let mut inner = func.clone();
        for arg in init {
            inner = Expr::App {
                func: Box::new(inner),
                args: vec![arg.clone()],
            };
        }
        self.infer_unary_app(&inner, last)
    }

    /// The plain application rule, then up to three retries that unwrap the
    /// signature of the function side, the argument side, or both. Each
    /// attempt runs in its own substitution scope: merged on success,
    /// discarded on failure.
    fn infer_unary_app(&mut self, func: &Expr, arg: &Expr) -> TypeResult<Mono> {
        match self.try_app(func, arg, false, false) {
            Ok(t) => Ok(t),
            Err(original) if original.is_retryable() => {
                for (open_func, open_arg) in [(true, false), (false, true), (true, true)] {
                    if let Ok(t) = self.try_app(func, arg, open_func, open_arg) {
                        return Ok(t);
                    }
                }
                Err(original)
            }
            Err(err) => Err(err),
        }
    }

    fn try_app(&mut self, func: &Expr, arg: &Expr, open_func: bool, open_arg: bool) -> TypeResult<Mono> {
        self.env.sub.push_scope();
        let result = self.try_app_inner(func, arg, open_func, open_arg);
        if result.is_ok() {
            self.env.sub.merge_scope();
        } else {
            self.env.sub.pop_scope();
        }
        result
    }

    fn try_app_inner(&mut self, func: &Expr, arg: &Expr, open_func: bool, open_arg: bool) -> TypeResult<Mono> {
        let mut func_ty = self.infer(func)?;
        let mut arg_ty = self.infer(arg)?;
        if open_func {
            func_ty = self.inner_type(func_ty)?;
        }
        if open_arg {
            arg_ty = self.inner_type(arg_ty)?;
        }
        let result = self.env.fresh(Kind::Term);
        let expected = self.env.store.func(arg_ty, result);
        self.unify(func_ty, expected)?;
        Ok(result)
    }

    /// Unwraps one level of declared signature: given `t` whose head
    /// constructor has signature `sig`, the inner type `u` with
    /// `sig ~ t -> u`.
    fn inner_type(&mut self, t: Mono) -> TypeResult<Mono> {
        let sig = self.signature_of(t)?;
        let inner = self.env.fresh(Kind::Term);
        let shape = self.env.store.func(t, inner);
        let sig_inst = self.env.instantiate(&sig);
        self.unify(shape, sig_inst)?;
        Ok(inner)
    }

    fn infer_let(&mut self, defs: &[Binding], body: &Expr) -> TypeResult<Mono> {
        let recursive = defs.iter().any(|def| matches!(def.value, Expr::Abs { .. }));
        if !recursive {
            return self.infer_let_nonrec(defs, body);
        }
        self.env.enter();
        let result = self.infer_let_rec(defs, body);
        self.env.exit();
        result
    }

    /// Recursive let: rewrite every lambda binding `x = e` into
    /// `x = __fix__ (func (x) e)`, with `__fix__ : forall a. (a -> a) -> a`
    /// in scope, then proceed non-recursively.
    fn infer_let_rec(&mut self, defs: &[Binding], body: &Expr) -> TypeResult<Mono> {
        let fix = self.interner.intern("__fix__");
        let a = self.env.fresh(Kind::Term);
        let aa = self.env.store.func(a, a);
        let fix_ty = self.env.store.func(aa, a);
        let fix_poly = self.env.generalize(fix_ty);
        self.env.bind(fix, fix_poly);

        let rewritten: Vec<Binding> = defs
            .iter()
            .map(|def| match &def.value {
                Expr::Abs { .. } => Binding {
                    name: def.name,
                    value: Expr::App {
                        func: Box::new(Expr::Var(fix)),
                        args: vec![Expr::Abs {
                            args: vec![Arg::Plain(def.name)],
                            body: Box::new(def.value.clone()),
                        }],
                    },
                },
                _ => def.clone(),
            })
            .collect();
        self.infer_let_nonrec(&rewritten, body)
    }

    /// Non-recursive let: bindings are inferred in order inside the child
    /// scope (so later bindings see earlier ones), generalized at the
    /// enclosing level, and the body is inferred with all of them bound.
    fn infer_let_nonrec(&mut self, defs: &[Binding], body: &Expr) -> TypeResult<Mono> {
        let outer_level = self.env.level();
        self.env.enter();
        let result = self.infer_let_nonrec_inner(outer_level, defs, body);
        self.env.exit();
        result
    }

    fn infer_let_nonrec_inner(&mut self, outer_level: usize, defs: &[Binding], body: &Expr) -> TypeResult<Mono> {
        for def in defs {
            let t = self.infer(&def.value)?;
            let poly = self.env.generalize_at(outer_level, t);
            self.env.bind(def.name, poly);
        }
        self.infer(body)
    }

    /// `def` behaves like a top-level let insertion of a (possibly
    /// recursive) binding; its own type is `io unit`.
    fn infer_def(&mut self, name: Symbol, value: &Expr) -> TypeResult<Mono> {
        let wrapped = Expr::Let {
            defs: vec![Binding {
                name,
                value: value.clone(),
            }],
            body: Box::new(Expr::Var(name)),
        };
        let t = self.infer(&wrapped)?;
        if self.env.current_scope_has(name) {
            return Err(NacreError::redefined(self.interner.resolve(name)));
        }
        let poly = self.env.generalize(t);
        self.env.bind(name, poly);
        Ok(self.env.store.io_of(UNIT))
    }

    fn infer_use(&mut self, env_expr: &Expr, body: &Expr) -> TypeResult<Mono> {
        let value_ty = self.infer(env_expr)?;
        let row = self.env.fresh(Kind::Row);
        let record = self.env.store.record_of(row);
        self.unify(value_ty, record)?;

        let row = self.env.zonk(row);
        let (entries, _open_tail) = self.env.store.row_entries(row);
        self.env.enter();
        for (attr, t) in entries {
            let poly = self.env.generalize(t);
            self.env.bind(attr, poly);
        }
        let result = self.infer(body);
        self.env.exit();
        result
    }

    fn infer_import(&mut self, name: Symbol) -> TypeResult<Mono> {
        if self.env.current_scope_has(name) {
            return Err(NacreError::new(
                Phase::Type,
                ErrorKind::Redefined,
                format!("variable \"{}\" already defined", self.interner.resolve(name)),
            ));
        }
        let sig = package::load_types(self, name)?;
        self.env.bind(name, sig);
        Ok(self.env.store.io_of(UNIT))
    }

    /// `make` instantiates the named signature `type outer -> type inner`,
    /// unifies `inner` with the provided record, and checks that no
    /// parametric field got specialized in the process.
    fn infer_make(&mut self, name: Symbol, attrs: &[Attr]) -> TypeResult<Mono> {
        let Some(sig) = self.env.lookup(name).cloned() else {
            return Err(NacreError::unbound(self.interner.resolve(name)));
        };
        let outer = self.env.fresh(Kind::Term);
        self.env.enter();
        let result = self.infer_make_inner(&sig, outer, attrs);
        self.env.exit();
        result?;
        Ok(outer)
    }

    fn infer_make_inner(&mut self, sig: &Poly, outer: Mono, attrs: &[Attr]) -> TypeResult<()> {
        let parent = self.env.parent_level();
        let inner = self.env.fresh(Kind::Term);

        // instantiating at the inner level keeps the contravariant side from
        // generalizing
        let sig_inst = self.env.instantiate(sig);
        let ty_outer = self.env.store.ty_of(outer);
        let ty_inner = self.env.store.ty_of(inner);
        let shape = self.env.store.func(ty_outer, ty_inner);
        self.unify_at(parent, shape, sig_inst)?;

        // the covariant type before seeing the provided attributes
        let reference = self.env.generalize(inner);

        let row = self.infer_row(attrs)?;
        let provided = self.env.store.record_of(row);
        self.unify_at(parent, inner, provided)?;

        let generalized = self.env.generalize(inner);
        for &var in &reference.forall {
            let resolved = self.env.zonk(Mono::Var(var));
            if let Mono::Var(resolved) = resolved {
                if generalized.forall.contains(&resolved) {
                    continue;
                }
            }
            let mut printer = TypePrinter::new(&self.env.store, self.interner);
            let lhs = printer.poly(&generalized);
            let rhs = printer.poly(&reference);
            return Err(NacreError::generalization_lost(&lhs, &rhs));
        }
        Ok(())
    }
}
