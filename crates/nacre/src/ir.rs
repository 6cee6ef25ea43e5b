//! The intermediate representation evaluated by the VM.
//!
//! Lexical names are resolved away: an `Ir` refers to values by frame-local
//! index, capture index, or global symbol. Closure bodies are shared behind
//! `Rc` so closure values can hold them without cloning the tree.

use std::{fmt, rc::Rc};

use crate::intern::{Interner, Symbol};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Ir {
    Unit,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(Rc<str>),
    /// A slot of the current frame, relative to its stack base.
    Local(usize),
    /// A value captured at closure-creation time.
    Capture(usize),
    Global(Symbol),
    /// Plain sequencing; the value is the last item's (unit when empty).
    Block(Vec<Ir>),
    /// Let-bracketing: allocate one slot per def (initialized to the
    /// recursion sentinel), evaluate each def into its slot, evaluate the
    /// body, then pop the slots.
    Scope { defs: Vec<Ir>, body: Box<Ir> },
    Call { func: Box<Ir>, args: Vec<Ir> },
    /// Capture initializers are evaluated in the enclosing frame when the
    /// closure value is created.
    Closure {
        argc: usize,
        captures: Vec<Ir>,
        body: Rc<Ir>,
    },
    Cond {
        test: Box<Ir>,
        conseq: Box<Ir>,
        alt: Box<Ir>,
    },
    /// Record construction from evaluated attributes.
    Record(Vec<(Symbol, Ir)>),
    /// Field selection on an evaluated record.
    Sel { attr: Symbol, object: Box<Ir> },
    /// Top-level definition of the evaluated value.
    Def { name: Symbol, value: Box<Ir> },
    /// Load a package, producing its record of exports.
    Import(Symbol),
    /// Bind every attribute of the evaluated record as a global, then
    /// evaluate the body.
    Use { env: Box<Ir>, body: Box<Ir> },
}

impl Ir {
    /// Renders the node S-expression style, for debugging and tests.
    pub fn repr<'a>(&'a self, interner: &'a Interner) -> DisplayIr<'a> {
        DisplayIr { ir: self, interner }
    }
}

pub struct DisplayIr<'a> {
    ir: &'a Ir,
    interner: &'a Interner,
}

impl<'a> DisplayIr<'a> {
    fn with(&self, ir: &'a Ir) -> Self {
        Self {
            ir,
            interner: self.interner,
        }
    }
}

impl fmt::Display for DisplayIr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |s: Symbol| self.interner.resolve(s);
        match self.ir {
            Ir::Unit => f.write_str("()"),
            Ir::Bool(v) => write!(f, "{v}"),
            Ir::Int(v) => write!(f, "{v}"),
            Ir::Real(v) => f.write_str(ryu::Buffer::new().format(*v)),
            Ir::Str(v) => write!(f, "{v:?}"),
            Ir::Local(i) => write!(f, "(var {i})"),
            Ir::Capture(i) => write!(f, "(cap {i})"),
            Ir::Global(n) => write!(f, "(glob {})", name(*n)),
            Ir::Block(items) => {
                f.write_str("(block")?;
                for item in items {
                    write!(f, " {}", self.with(item))?;
                }
                f.write_str(")")
            }
            Ir::Scope { defs, body } => {
                f.write_str("(scope (")?;
                for (i, def) in defs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", self.with(def))?;
                }
                write!(f, ") {})", self.with(body))
            }
            Ir::Call { func, args } => {
                write!(f, "(call {}", self.with(func))?;
                for arg in args {
                    write!(f, " {}", self.with(arg))?;
                }
                f.write_str(")")
            }
            Ir::Closure { argc, captures, body } => {
                write!(f, "(closure {argc} (")?;
                for (i, capture) in captures.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", self.with(capture))?;
                }
                write!(f, ") {})", self.with(body))
            }
            Ir::Cond { test, conseq, alt } => {
                write!(f, "(cond {} {} {})", self.with(test), self.with(conseq), self.with(alt))
            }
            Ir::Record(attrs) => {
                f.write_str("(record")?;
                for (attr, value) in attrs {
                    write!(f, " ({} {})", name(*attr), self.with(value))?;
                }
                f.write_str(")")
            }
            Ir::Sel { attr, object } => write!(f, "(sel {} {})", name(*attr), self.with(object)),
            Ir::Def { name: n, value } => write!(f, "(def {} {})", name(*n), self.with(value)),
            Ir::Import(n) => write!(f, "(import {})", name(*n)),
            Ir::Use { env, body } => write!(f, "(use {} {})", self.with(env), self.with(body)),
        }
    }
}
