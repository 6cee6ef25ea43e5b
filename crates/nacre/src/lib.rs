//! nacre: an interpreter for a small statically-typed functional language
//! with S-expression surface syntax.
//!
//! Source text is parsed to S-expressions, elaborated into an AST,
//! type-checked with Hindley-Milner inference extended with row-polymorphic
//! records and reified types, lowered to an IR with explicit captures and
//! locals, and evaluated on a stack-based VM with curried closures and
//! builtins.

mod ast;
mod builtins;
mod error;
mod infer;
mod intern;
mod ir;
mod kind;
mod lower;
mod package;
mod parse;
mod pretty;
mod run;
mod sexpr;
mod subst;
mod tracer;
mod types;
mod unify;
mod value;
mod vm;

pub use crate::{
    builtins::Builtin,
    error::{ErrorKind, NacreError, Phase},
    intern::{Interner, Symbol},
    run::{ExecOutcome, Options, Runner},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, VmTracer},
    value::{Captures, Closure, List, RecordValue, SumValue, Value},
};
