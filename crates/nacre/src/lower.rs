//! Lowering: resolve lexical names and make closures explicit.
//!
//! Each lambda opens a compilation context with its arguments as locals.
//! A name resolves to a frame-local slot, then to an already-allocated
//! capture, and otherwise either to a global (outermost context) or to a
//! freshly allocated capture whose initializer is resolved in the enclosing
//! context when the closure node is built. `let` pre-allocates one slot per
//! binding before compiling the bound values, which is what lets a lambda
//! refer to its own binding (the slot holds the recursion sentinel until the
//! value lands).

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    ast::{Arg, Binding, Expr, Literal},
    error::{NacreError, RunResult},
    intern::{Interner, Symbol},
    ir::Ir,
};

/// Compiles one top-level item.
pub fn compile(expr: &Expr, interner: &Interner) -> RunResult<Ir> {
    let mut lowerer = Lowerer {
        ctxs: vec![FnCtx::default()],
        interner,
    };
    lowerer.compile(expr)
}

#[derive(Default)]
struct FnCtx {
    locals: AHashMap<Symbol, usize>,
    n_locals: usize,
    captures: AHashMap<Symbol, usize>,
    capture_order: Vec<Symbol>,
}

impl FnCtx {
    fn def(&mut self, name: Symbol) -> usize {
        let index = self.n_locals;
        self.locals.insert(name, index);
        self.n_locals += 1;
        index
    }
}

struct Lowerer<'a> {
    ctxs: Vec<FnCtx>,
    interner: &'a Interner,
}

impl Lowerer<'_> {
    fn at_toplevel(&self) -> bool {
        self.ctxs.len() == 1
    }

    fn resolve(&mut self, name: Symbol) -> Ir {
        let at_toplevel = self.at_toplevel();
        let ctx = self.ctxs.last_mut().expect("context stack is non-empty");
        if let Some(&index) = ctx.locals.get(&name) {
            return Ir::Local(index);
        }
        if let Some(&index) = ctx.captures.get(&name) {
            return Ir::Capture(index);
        }
        if at_toplevel {
            return Ir::Global(name);
        }
        let index = ctx.capture_order.len();
        ctx.captures.insert(name, index);
        ctx.capture_order.push(name);
        Ir::Capture(index)
    }

    fn compile(&mut self, expr: &Expr) -> RunResult<Ir> {
        match expr {
            Expr::Lit(lit) => Ok(match lit {
                Literal::Unit => Ir::Unit,
                Literal::Bool(value) => Ir::Bool(*value),
                Literal::Int(value) => Ir::Int(*value),
                Literal::Real(value) => Ir::Real(*value),
                Literal::Str(value) => Ir::Str(Rc::from(value.as_str())),
            }),
            Expr::Var(name) => Ok(self.resolve(*name)),
            // a first-class selector becomes a unary closure
            Expr::Sel(attr) => Ok(Ir::Closure {
                argc: 1,
                captures: Vec::new(),
                body: Rc::new(Ir::Sel {
                    attr: *attr,
                    object: Box::new(Ir::Local(0)),
                }),
            }),
            Expr::Abs { args, body } => self.compile_abs(args, body),
            Expr::App { func, args } => self.compile_app(func, args),
            Expr::Let { defs, body } => self.compile_let(defs, body),
            Expr::Cond { test, conseq, alt } => Ok(Ir::Cond {
                test: Box::new(self.compile(test)?),
                conseq: Box::new(self.compile(conseq)?),
                alt: Box::new(self.compile(alt)?),
            }),
            Expr::Record { attrs } | Expr::Make { attrs, .. } => {
                // the nominal wrapper of `make` has no runtime representation
                let attrs = attrs
                    .iter()
                    .map(|attr| Ok((attr.name, self.compile(&attr.value)?)))
                    .collect::<RunResult<Vec<_>>>()?;
                Ok(Ir::Record(attrs))
            }
            Expr::Seq { items } => {
                let items = items
                    .iter()
                    .map(|item| self.compile(item))
                    .collect::<RunResult<Vec<_>>>()?;
                Ok(Ir::Block(items))
            }
            Expr::Def { name, value } => {
                if !self.at_toplevel() {
                    return Err(NacreError::unsupported("non-top-level def"));
                }
                // a def is a let insertion: the binding sees its own slot,
                // so recursive definitions resolve through the sentinel
                let wrapped = Expr::Let {
                    defs: vec![Binding {
                        name: *name,
                        value: (**value).clone(),
                    }],
                    body: Box::new(Expr::Var(*name)),
                };
                Ok(Ir::Def {
                    name: *name,
                    value: Box::new(self.compile(&wrapped)?),
                })
            }
            Expr::Import(package) => {
                if !self.at_toplevel() {
                    return Err(NacreError::unsupported("non-top-level import"));
                }
                Ok(Ir::Def {
                    name: *package,
                    value: Box::new(Ir::Import(*package)),
                })
            }
            Expr::Use { env, body } => {
                if !self.at_toplevel() {
                    return Err(NacreError::unsupported("non-top-level use"));
                }
                Ok(Ir::Use {
                    env: Box::new(self.compile(env)?),
                    body: Box::new(self.compile(body)?),
                })
            }
            Expr::Inj(tag) => Err(NacreError::unsupported(&format!(
                "injection \"|{}\"",
                self.interner.resolve(*tag)
            ))),
            Expr::Match { .. } => Err(NacreError::unsupported("match")),
        }
    }

    fn compile_abs(&mut self, args: &[Arg], body: &Expr) -> RunResult<Ir> {
        let mut ctx = FnCtx::default();
        for arg in args {
            ctx.def(arg.name());
        }
        self.ctxs.push(ctx);
        let body = self.compile(body);
        let ctx = self.ctxs.pop().expect("pushed context is still there");
        let body = body?;

        // capture initializers resolve in the enclosing context, in capture
        // index order
        let captures = ctx
            .capture_order
            .iter()
            .map(|&name| self.resolve(name))
            .collect();

        Ok(Ir::Closure {
            argc: args.len(),
            captures,
            body: Rc::new(body),
        })
    }

    fn compile_app(&mut self, func: &Expr, args: &[Expr]) -> RunResult<Ir> {
        // a zero-argument application is just the function expression
        let Some((first, rest)) = args.split_first() else {
            return self.compile(func);
        };
        // selection in call position skips the closure wrapper
        if let Expr::Sel(attr) = func {
            let sel = Ir::Sel {
                attr: *attr,
                object: Box::new(self.compile(first)?),
            };
            if rest.is_empty() {
                return Ok(sel);
            }
            let rest = rest.iter().map(|arg| self.compile(arg)).collect::<RunResult<Vec<_>>>()?;
            return Ok(Ir::Call {
                func: Box::new(sel),
                args: rest,
            });
        }
        let func = self.compile(func)?;
        let args = args.iter().map(|arg| self.compile(arg)).collect::<RunResult<Vec<_>>>()?;
        Ok(Ir::Call {
            func: Box::new(func),
            args,
        })
    }

    fn compile_let(&mut self, defs: &[Binding], body: &Expr) -> RunResult<Ir> {
        let (snapshot_locals, snapshot_count) = {
            let ctx = self.ctxs.last().expect("context stack is non-empty");
            (ctx.locals.clone(), ctx.n_locals)
        };

        // pre-allocate slots so bound lambdas can see their own names
        let ctx = self.ctxs.last_mut().expect("context stack is non-empty");
        for def in defs {
            ctx.def(def.name);
        }

        let result = (|| {
            let compiled = defs
                .iter()
                .map(|def| self.compile(&def.value))
                .collect::<RunResult<Vec<_>>>()?;
            let body = self.compile(body)?;
            Ok(Ir::Scope {
                defs: compiled,
                body: Box::new(body),
            })
        })();

        let ctx = self.ctxs.last_mut().expect("context stack is non-empty");
        ctx.locals = snapshot_locals;
        ctx.n_locals = snapshot_count;
        result
    }
}
