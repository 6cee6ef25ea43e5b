//! The stack-based evaluator.
//!
//! One contiguous value stack holds every frame's arguments and let-locals;
//! frames record their stack base, the active closure (for captures and for
//! the recursion sentinel), and nest strictly. Saturation mismatches are
//! resolved by `apply`: under-saturation builds a partial closure over the
//! provided arguments, over-saturation applies in two steps.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    error::{ErrorKind, NacreError, RunResult},
    intern::{Interner, Symbol},
    ir::Ir,
    lower,
    package::PackageStore,
    tracer::{NoopTracer, VmTracer},
    value::{Captures, Closure, RecordValue, Value},
};

/// Shared context the VM needs while evaluating: name resolution for error
/// messages and the package cache for imports.
pub struct RunCx<'a> {
    pub interner: &'a Interner,
    pub packages: &'a mut PackageStore,
}

#[derive(Debug)]
struct Frame {
    /// Stack index of the frame base (its first argument slot).
    sp: usize,
    /// The closure being executed; `None` for the root frame.
    closure: Option<Rc<Closure>>,
}

#[derive(Debug)]
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    pub globals: AHashMap<Symbol, Value>,
    /// Template the globals of freshly imported packages start from.
    builtin_globals: AHashMap<Symbol, Value>,
    depth: usize,
    max_depth: usize,
    tracer: Box<dyn VmTracer>,
}

/// The value a pre-allocated let slot holds until its definition lands.
/// Applying it resolves to the closure of the innermost active frame.
const RECURSION_SENTINEL: Value = Value::Unit;

impl Vm {
    pub fn new(builtin_globals: AHashMap<Symbol, Value>, max_depth: usize) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: vec![Frame { sp: 0, closure: None }],
            globals: builtin_globals.clone(),
            builtin_globals,
            depth: 0,
            max_depth,
            tracer: Box::new(NoopTracer),
        }
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) {
        self.tracer = tracer;
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is non-empty")
    }

    pub fn eval(&mut self, cx: &mut RunCx<'_>, ir: &Ir) -> RunResult<Value> {
        match ir {
            Ir::Unit => Ok(Value::Unit),
            Ir::Bool(value) => Ok(Value::Bool(*value)),
            Ir::Int(value) => Ok(Value::Int(*value)),
            Ir::Real(value) => Ok(Value::Real(*value)),
            Ir::Str(value) => Ok(Value::Str(value.clone())),
            Ir::Local(index) => Ok(self.stack[self.frame().sp + index].clone()),
            Ir::Capture(index) => {
                let closure = self
                    .frame()
                    .closure
                    .as_ref()
                    .expect("capture access outside a closure frame");
                Ok(closure.captures[*index].clone())
            }
            Ir::Global(name) => match self.globals.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(NacreError::runtime(
                    ErrorKind::Unbound,
                    format!("unbound variable \"{}\"", cx.interner.resolve(*name)),
                )),
            },
            Ir::Block(items) => {
                let mut result = Value::Unit;
                for item in items {
                    result = self.eval(cx, item)?;
                }
                Ok(result)
            }
            Ir::Scope { defs, body } => {
                let base = self.stack.len();
                self.stack.extend(std::iter::repeat_n(RECURSION_SENTINEL, defs.len()));
                let result = self.eval_scope(cx, base, defs, body);
                self.stack.truncate(base);
                result
            }
            Ir::Cond { test, conseq, alt } => match self.eval(cx, test)? {
                Value::Bool(true) => self.eval(cx, conseq),
                Value::Bool(false) => self.eval(cx, alt),
                other => Err(NacreError::runtime(
                    ErrorKind::Mismatch,
                    format!("condition must be a boolean, got {}", other.type_name()),
                )),
            },
            Ir::Closure { argc, captures, body } => {
                let mut values = Captures::with_capacity(captures.len());
                for capture in captures {
                    values.push(self.eval(cx, capture)?);
                }
                Ok(Value::Closure(Rc::new(Closure {
                    argc: *argc,
                    captures: values,
                    body: body.clone(),
                })))
            }
            Ir::Call { func, args } => {
                let func = self.eval(cx, func)?;
                let start = self.stack.len();
                let result = self.push_args_and_apply(cx, func, args, start);
                self.stack.truncate(start);
                result
            }
            Ir::Record(attrs) => {
                let mut values = IndexMap::with_capacity(attrs.len());
                for (name, value) in attrs {
                    values.insert(*name, self.eval(cx, value)?);
                }
                Ok(Value::Record(Rc::new(RecordValue { attrs: values })))
            }
            Ir::Sel { attr, object } => match self.eval(cx, object)? {
                Value::Record(record) => record.attrs.get(attr).cloned().ok_or_else(|| {
                    NacreError::runtime(
                        ErrorKind::MissingField,
                        format!("record has no attribute \"{}\"", cx.interner.resolve(*attr)),
                    )
                }),
                other => Err(NacreError::runtime(
                    ErrorKind::Mismatch,
                    format!("selection needs a record, got {}", other.type_name()),
                )),
            },
            Ir::Def { name, value } => {
                let value = self.eval(cx, value)?;
                if self.globals.contains_key(name) {
                    return Err(NacreError::runtime(
                        ErrorKind::Redefined,
                        format!("redefined variable \"{}\"", cx.interner.resolve(*name)),
                    ));
                }
                self.tracer.define(cx.interner.resolve(*name));
                self.globals.insert(*name, value);
                Ok(Value::Unit)
            }
            Ir::Import(name) => self.import_package(cx, *name),
            Ir::Use { env, body } => match self.eval(cx, env)? {
                Value::Record(record) => {
                    // unlike def, use may overwrite existing globals
                    for (name, value) in &record.attrs {
                        self.globals.insert(*name, value.clone());
                    }
                    self.eval(cx, body)
                }
                other => Err(NacreError::runtime(
                    ErrorKind::Mismatch,
                    format!("use needs a record, got {}", other.type_name()),
                )),
            },
        }
    }

    fn eval_scope(&mut self, cx: &mut RunCx<'_>, base: usize, defs: &[Ir], body: &Ir) -> RunResult<Value> {
        for (index, def) in defs.iter().enumerate() {
            let value = self.eval(cx, def)?;
            self.stack[base + index] = value;
        }
        self.eval(cx, body)
    }

    fn push_args_and_apply(&mut self, cx: &mut RunCx<'_>, func: Value, args: &[Ir], start: usize) -> RunResult<Value> {
        for arg in args {
            let value = self.eval(cx, arg)?;
            self.stack.push(value);
        }
        self.apply(cx, func, start, args.len())
    }

    /// Applies `func` to `argc` values sitting at `stack[start..]`.
    fn apply(&mut self, cx: &mut RunCx<'_>, func: Value, start: usize, argc: usize) -> RunResult<Value> {
        if self.depth >= self.max_depth {
            return Err(NacreError::runtime(
                ErrorKind::DepthLimit,
                format!("call depth limit of {} exceeded", self.max_depth),
            ));
        }
        self.depth += 1;
        self.tracer.apply(self.depth, argc);
        let result = self.apply_inner(cx, func, start, argc);
        self.depth -= 1;
        result
    }

    fn apply_inner(&mut self, cx: &mut RunCx<'_>, func: Value, start: usize, argc: usize) -> RunResult<Value> {
        match func {
            Value::Closure(closure) => {
                if closure.argc != argc {
                    let expected = closure.argc;
                    return self.unsaturated(cx, Value::Closure(closure), expected, start, argc);
                }
                let body = closure.body.clone();
                self.frames.push(Frame {
                    sp: start,
                    closure: Some(closure),
                });
                let result = self.eval(cx, &body);
                self.frames.pop();
                result
            }
            Value::Builtin(builtin) => {
                if builtin.argc() != argc {
                    let expected = builtin.argc();
                    return self.unsaturated(cx, Value::Builtin(builtin), expected, start, argc);
                }
                builtin.call(&self.stack[start..start + argc])
            }
            // the recursion sentinel resolves to the active closure
            Value::Unit => match self.frame().closure.clone() {
                Some(closure) => self.apply_inner(cx, Value::Closure(closure), start, argc),
                None => Err(NacreError::not_callable("()")),
            },
            other => Err(NacreError::not_callable(other.type_name())),
        }
    }

    /// Saturation repair: build a partial closure when arguments are
    /// missing, split the application when there are too many.
    fn unsaturated(
        &mut self,
        cx: &mut RunCx<'_>,
        func: Value,
        expected: usize,
        start: usize,
        argc: usize,
    ) -> RunResult<Value> {
        if expected > argc {
            let mut captures: Captures = self.stack[start..start + argc].iter().cloned().collect();
            captures.push(func);
            let missing = expected - argc;
            let mut call_args: Vec<Ir> = (0..argc).map(Ir::Capture).collect();
            call_args.extend((0..missing).map(Ir::Local));
            let body = Ir::Call {
                func: Box::new(Ir::Capture(argc)),
                args: call_args,
            };
            Ok(Value::Closure(Rc::new(Closure {
                argc: missing,
                captures,
                body: Rc::new(body),
            })))
        } else {
            let applied = self.apply(cx, func, start, expected)?;
            self.apply(cx, applied, start + expected, argc - expected)
        }
    }

    /// Evaluates an imported package once, in a fresh global namespace
    /// seeded with the builtins, and caches its record of exports.
    fn import_package(&mut self, cx: &mut RunCx<'_>, name: Symbol) -> RunResult<Value> {
        match cx.packages.get(name) {
            Some(package) => {
                if let Some(value) = &package.value {
                    return Ok(value.clone());
                }
            }
            None => {
                return Err(NacreError::runtime(
                    ErrorKind::Unbound,
                    format!("package \"{}\" not loaded", cx.interner.resolve(name)),
                ));
            }
        }
        let (items, exports) = {
            let package = cx.packages.get(name).expect("package presence checked above");
            (package.items.clone(), package.exports.clone())
        };
        self.tracer.import(cx.interner.resolve(name));

        let saved_globals = std::mem::replace(&mut self.globals, self.builtin_globals.clone());
        let result = self.eval_package_items(cx, &items, &exports);
        self.globals = saved_globals;

        let value = result?;
        cx.packages.set_value(name, value.clone());
        Ok(value)
    }

    fn eval_package_items(
        &mut self,
        cx: &mut RunCx<'_>,
        items: &[crate::ast::Expr],
        exports: &[Symbol],
    ) -> RunResult<Value> {
        for item in items {
            let ir = lower::compile(item, cx.interner)?;
            self.eval(cx, &ir)?;
        }
        let mut attrs = IndexMap::with_capacity(exports.len());
        for &export in exports {
            let value = self.globals.get(&export).cloned().ok_or_else(|| {
                NacreError::runtime(
                    ErrorKind::Unbound,
                    format!("package export \"{}\" missing", cx.interner.resolve(export)),
                )
            })?;
            attrs.insert(export, value);
        }
        Ok(Value::Record(Rc::new(RecordValue { attrs })))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builtins::Builtin;

    fn setup() -> (Vm, Interner, PackageStore) {
        let mut interner = Interner::new();
        let plus = interner.intern("+");
        let mut globals = AHashMap::new();
        globals.insert(plus, Value::Builtin(Builtin::Add));
        (Vm::new(globals, 64), interner, PackageStore::new(Vec::new()))
    }

    /// `(func (x y) (+ x y))` as a raw closure node.
    fn add2(plus: Symbol) -> Ir {
        Ir::Closure {
            argc: 2,
            captures: vec![],
            body: Rc::new(Ir::Call {
                func: Box::new(Ir::Global(plus)),
                args: vec![Ir::Local(0), Ir::Local(1)],
            }),
        }
    }

    #[test]
    fn saturated_call() {
        let (mut vm, interner, mut packages) = setup();
        let plus = interner.get("+").unwrap();
        let mut cx = RunCx {
            interner: &interner,
            packages: &mut packages,
        };
        let ir = Ir::Call {
            func: Box::new(add2(plus)),
            args: vec![Ir::Int(1), Ir::Int(41)],
        };
        assert_eq!(vm.eval(&mut cx, &ir).unwrap(), Value::Int(42));
    }

    #[test]
    fn under_saturation_builds_a_partial_closure() {
        let (mut vm, interner, mut packages) = setup();
        let plus = interner.get("+").unwrap();
        let mut cx = RunCx {
            interner: &interner,
            packages: &mut packages,
        };
        // ((add 1) 41)
        let partial = Ir::Call {
            func: Box::new(add2(plus)),
            args: vec![Ir::Int(1)],
        };
        let ir = Ir::Call {
            func: Box::new(partial),
            args: vec![Ir::Int(41)],
        };
        assert_eq!(vm.eval(&mut cx, &ir).unwrap(), Value::Int(42));
    }

    #[test]
    fn under_saturated_builtins_curry_too() {
        let (mut vm, interner, mut packages) = setup();
        let plus = interner.get("+").unwrap();
        let mut cx = RunCx {
            interner: &interner,
            packages: &mut packages,
        };
        let partial = Ir::Call {
            func: Box::new(Ir::Global(plus)),
            args: vec![Ir::Int(40)],
        };
        let ir = Ir::Call {
            func: Box::new(partial),
            args: vec![Ir::Int(2)],
        };
        assert_eq!(vm.eval(&mut cx, &ir).unwrap(), Value::Int(42));
    }

    #[test]
    fn over_saturation_applies_in_two_steps() {
        let (mut vm, interner, mut packages) = setup();
        let plus = interner.get("+").unwrap();
        let mut cx = RunCx {
            interner: &interner,
            packages: &mut packages,
        };
        // ((func (x) (func (y) (+ x y))) 1 41)
        let inner = Ir::Closure {
            argc: 1,
            captures: vec![Ir::Local(0)],
            body: Rc::new(Ir::Call {
                func: Box::new(Ir::Global(plus)),
                args: vec![Ir::Capture(0), Ir::Local(0)],
            }),
        };
        let outer = Ir::Closure {
            argc: 1,
            captures: vec![],
            body: Rc::new(inner),
        };
        let ir = Ir::Call {
            func: Box::new(outer),
            args: vec![Ir::Int(1), Ir::Int(41)],
        };
        assert_eq!(vm.eval(&mut cx, &ir).unwrap(), Value::Int(42));
    }

    #[test]
    fn sentinel_recursion_hits_the_depth_limit() {
        let (mut vm, interner, mut packages) = setup();
        let mut cx = RunCx {
            interner: &interner,
            packages: &mut packages,
        };
        // (let ((f (func (n) (f n)))) (f 0)) — f's capture holds the
        // sentinel, so the recursive call goes through the active frame
        let closure = Ir::Closure {
            argc: 1,
            captures: vec![Ir::Local(0)],
            body: Rc::new(Ir::Call {
                func: Box::new(Ir::Capture(0)),
                args: vec![Ir::Local(0)],
            }),
        };
        let ir = Ir::Scope {
            defs: vec![closure],
            body: Box::new(Ir::Call {
                func: Box::new(Ir::Local(0)),
                args: vec![Ir::Int(0)],
            }),
        };
        let err = vm.eval(&mut cx, &ir).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DepthLimit);
    }

    #[test]
    fn applying_a_non_function_fails() {
        let (mut vm, interner, mut packages) = setup();
        let mut cx = RunCx {
            interner: &interner,
            packages: &mut packages,
        };
        let ir = Ir::Call {
            func: Box::new(Ir::Int(3)),
            args: vec![Ir::Int(1)],
        };
        let err = vm.eval(&mut cx, &ir).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotCallable);
    }

    #[test]
    fn let_slots_hold_the_sentinel_until_defined() {
        let (mut vm, interner, mut packages) = setup();
        let mut cx = RunCx {
            interner: &interner,
            packages: &mut packages,
        };
        // a closure created in slot 0 captures slot 1 before it is filled
        let ir = Ir::Scope {
            defs: vec![
                Ir::Closure {
                    argc: 1,
                    captures: vec![Ir::Local(1)],
                    body: Rc::new(Ir::Capture(0)),
                },
                Ir::Int(7),
            ],
            body: Box::new(Ir::Call {
                func: Box::new(Ir::Local(0)),
                args: vec![Ir::Unit],
            }),
        };
        // the capture was taken while slot 1 still held the sentinel
        assert_eq!(vm.eval(&mut cx, &ir).unwrap(), Value::Unit);
    }
}
