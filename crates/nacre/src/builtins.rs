//! The initial environment: primitive operators, type constants and
//! constructors with their signatures, and the list package.

use ahash::AHashMap;

use crate::{
    error::{ErrorKind, NacreError, RunResult},
    infer::TypeEnv,
    intern::{Interner, Symbol},
    kind::Kind,
    types::{BOOLEAN, CTOR, FUNC, INTEGER, LIST, Mono, Poly, TYPE, UNIT},
    value::{List, Value},
};

/// Builtin functions, dispatched by the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Add,
    Mul,
    Sub,
    Eq,
    /// List construction.
    Cons,
    /// The type-level `->` constructor; runtime-inert.
    Arrow,
    /// The type-level `type` constructor; runtime-inert.
    Type,
    /// The type-level `ctor` constructor; runtime-inert.
    Ctor,
    /// The type-level `list` constructor; runtime-inert.
    ListType,
}

impl Builtin {
    pub fn argc(self) -> usize {
        match self {
            Self::Add | Self::Mul | Self::Sub | Self::Eq | Self::Cons | Self::Arrow => 2,
            Self::Type | Self::Ctor | Self::ListType => 1,
        }
    }

    pub fn call(self, args: &[Value]) -> RunResult<Value> {
        match self {
            Self::Add => Ok(Value::Int(int(&args[0])?.wrapping_add(int(&args[1])?))),
            Self::Mul => Ok(Value::Int(int(&args[0])?.wrapping_mul(int(&args[1])?))),
            Self::Sub => Ok(Value::Int(int(&args[0])?.wrapping_sub(int(&args[1])?))),
            Self::Eq => Ok(Value::Bool(int(&args[0])? == int(&args[1])?)),
            Self::Cons => match &args[1] {
                Value::List(tail) => Ok(Value::List(List::cons(args[0].clone(), tail.clone()))),
                other => Err(type_error("list", other)),
            },
            // type constructors evaluate their reified arguments away
            Self::Arrow | Self::Type | Self::Ctor | Self::ListType => Ok(Value::Unit),
        }
    }
}

fn int(value: &Value) -> RunResult<i64> {
    match value {
        Value::Int(v) => Ok(*v),
        other => Err(type_error("integer", other)),
    }
}

fn type_error(expected: &str, got: &Value) -> NacreError {
    NacreError::runtime(
        ErrorKind::Mismatch,
        format!("expected {expected}, got {}", got.type_name()),
    )
}

fn define(
    env: &mut TypeEnv,
    interner: &mut Interner,
    globals: &mut AHashMap<Symbol, Value>,
    name: &str,
    poly: Poly,
    value: Value,
) {
    let symbol = interner.intern(name);
    env.define_builtin(symbol, poly);
    globals.insert(symbol, value);
}

/// Seeds the typing state with the builtin bindings and signatures and
/// returns the matching runtime globals.
pub fn install(env: &mut TypeEnv, interner: &mut Interner) -> AHashMap<Symbol, Value> {
    let mut globals = AHashMap::new();

    // integer arithmetic
    let int2 = env.store.func_chain(&[INTEGER, INTEGER], INTEGER);
    define(env, interner, &mut globals, "+", Poly::mono(int2), Value::Builtin(Builtin::Add));
    define(env, interner, &mut globals, "*", Poly::mono(int2), Value::Builtin(Builtin::Mul));
    define(env, interner, &mut globals, "-", Poly::mono(int2), Value::Builtin(Builtin::Sub));
    let cmp = env.store.func_chain(&[INTEGER, INTEGER], BOOLEAN);
    define(env, interner, &mut globals, "=", Poly::mono(cmp), Value::Builtin(Builtin::Eq));

    // reified type constants, with identity-shaped signatures so they work
    // as argument annotations
    for (name, t) in [("integer", INTEGER), ("boolean", BOOLEAN), ("unit", UNIT)] {
        let reified = env.store.ty_of(t);
        define(env, interner, &mut globals, name, Poly::mono(reified), Value::Unit);
        let Mono::Cst(cst) = t else { unreachable!() };
        let sig = env.store.func(t, t);
        env.sigs.insert(cst, Poly::mono(sig));
    }

    let Mono::Cst(func_cst) = FUNC else { unreachable!() };
    let Mono::Cst(type_cst) = TYPE else { unreachable!() };
    let Mono::Cst(ctor_cst) = CTOR else { unreachable!() };
    let Mono::Cst(list_cst) = LIST else { unreachable!() };

    // the function constructor: type a -> type b -> type (a -> b)
    {
        let a = env.fresh(Kind::Term);
        let b = env.fresh(Kind::Term);
        let ab = env.store.func(a, b);
        let ty_a = env.store.ty_of(a);
        let ty_b = env.store.ty_of(b);
        let ty_ab = env.store.ty_of(ab);
        let t = env.store.func_chain(&[ty_a, ty_b], ty_ab);
        let poly = env.generalize(t);
        define(env, interner, &mut globals, "->", poly, Value::Builtin(Builtin::Arrow));
    }
    // its signature: (a -> b) -> (a -> b)
    {
        let a = env.fresh(Kind::Term);
        let b = env.fresh(Kind::Term);
        let ab = env.store.func(a, b);
        let sig = env.store.func(ab, ab);
        let sig = env.generalize(sig);
        env.sigs.insert(func_cst, sig);
    }

    // type: type a -> type (type a), with signature type a -> type a
    {
        let a = env.fresh(Kind::Term);
        let ty_a = env.store.ty_of(a);
        let ty_ty_a = env.store.ty_of(ty_a);
        let t = env.store.func(ty_a, ty_ty_a);
        let poly = env.generalize(t);
        define(env, interner, &mut globals, "type", poly, Value::Builtin(Builtin::Type));
    }
    {
        let a = env.fresh(Kind::Term);
        let ty_a = env.store.ty_of(a);
        let sig = env.store.func(ty_a, ty_a);
        let sig = env.generalize(sig);
        env.sigs.insert(type_cst, sig);
    }

    // ctor: ctor c -> type (ctor c), with signature
    // ctor c -> type a -> type (c a)
    {
        let c = env.fresh(Kind::arrow(Kind::Term, Kind::Term));
        let ctor_c = env.store.app(CTOR, c).expect("ctor application is well-kinded");
        let ty_ctor_c = env.store.ty_of(ctor_c);
        let t = env.store.func(ctor_c, ty_ctor_c);
        let poly = env.generalize(t);
        define(env, interner, &mut globals, "ctor", poly, Value::Builtin(Builtin::Ctor));
    }
    {
        let c = env.fresh(Kind::arrow(Kind::Term, Kind::Term));
        let a = env.fresh(Kind::Term);
        let ctor_c = env.store.app(CTOR, c).expect("ctor application is well-kinded");
        let c_a = env.store.app(c, a).expect("constructor variable application is well-kinded");
        let ty_a = env.store.ty_of(a);
        let ty_c_a = env.store.ty_of(c_a);
        let inner = env.store.func(ty_a, ty_c_a);
        let sig = env.store.func(ctor_c, inner);
        let sig = env.generalize(sig);
        env.sigs.insert(ctor_cst, sig);
    }

    // list: type a -> type (list a), with the structural sum signature
    // list a -> sum {cons: {head: a; tail: list a}; nil: unit}
    {
        let a = env.fresh(Kind::Term);
        let ty_a = env.store.ty_of(a);
        let list_a = env.store.list_of(a);
        let ty_list_a = env.store.ty_of(list_a);
        let t = env.store.func(ty_a, ty_list_a);
        let poly = env.generalize(t);
        define(env, interner, &mut globals, "list", poly, Value::Builtin(Builtin::ListType));
    }
    {
        let head = interner.intern("head");
        let tail = interner.intern("tail");
        let cons = interner.intern("cons");
        let nil = interner.intern("nil");

        let a = env.fresh(Kind::Term);
        let list_a = env.store.list_of(a);
        let tail_row = env
            .store
            .ext_row(tail, list_a, crate::types::EMPTY)
            .expect("list signature row is well-kinded");
        let cell_row = env
            .store
            .ext_row(head, a, tail_row)
            .expect("list signature row is well-kinded");
        let cell = env.store.record_of(cell_row);
        let nil_row = env
            .store
            .ext_row(nil, UNIT, crate::types::EMPTY)
            .expect("list signature row is well-kinded");
        let sum_row = env
            .store
            .ext_row(cons, cell, nil_row)
            .expect("list signature row is well-kinded");
        let shape = env.store.sum_of(sum_row);
        let sig = env.store.func(list_a, shape);
        let sig = env.generalize(sig);
        env.sigs.insert(list_cst, sig);
    }

    // list constructors
    {
        let a = env.fresh(Kind::Term);
        let list_a = env.store.list_of(a);
        let poly = env.generalize(list_a);
        define(env, interner, &mut globals, "nil", poly, Value::List(List::nil()));
    }
    {
        let a = env.fresh(Kind::Term);
        let list_a = env.store.list_of(a);
        let t = env.store.func_chain(&[a, list_a], list_a);
        let poly = env.generalize(t);
        define(env, interner, &mut globals, "cons", poly, Value::Builtin(Builtin::Cons));
    }

    globals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_dispatch() {
        let args = [Value::Int(20), Value::Int(22)];
        assert_eq!(Builtin::Add.call(&args).unwrap(), Value::Int(42));
        assert_eq!(Builtin::Sub.call(&args).unwrap(), Value::Int(-2));
        assert_eq!(Builtin::Eq.call(&args).unwrap(), Value::Bool(false));
    }

    #[test]
    fn cons_builds_lists() {
        let args = [Value::Int(1), Value::List(List::nil())];
        let Value::List(list) = Builtin::Cons.call(&args).unwrap() else {
            panic!("expected a list")
        };
        assert_eq!(list.iter().count(), 1);
    }

    #[test]
    fn install_registers_signatures() {
        let mut env = TypeEnv::new();
        let mut interner = Interner::new();
        let globals = install(&mut env, &mut interner);

        let plus = interner.intern("+");
        assert!(env.lookup(plus).is_some());
        assert!(globals.contains_key(&plus));

        let Mono::Cst(func_cst) = FUNC else { unreachable!() };
        let Mono::Cst(list_cst) = LIST else { unreachable!() };
        assert!(env.sigs.contains_key(&func_cst));
        assert!(env.sigs.contains_key(&list_cst));
    }
}
