//! Public interface for running nacre code.

use std::path::PathBuf;

use crate::{
    ast::Expr,
    builtins,
    error::NacreError,
    infer::{Infer, TypeEnv},
    intern::Interner,
    lower,
    parse::parse_program,
    pretty::TypePrinter,
    package::PackageStore,
    tracer::VmTracer,
    value::Value,
    vm::{RunCx, Vm},
};

/// Tunables for a [`Runner`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Directories searched for `(import name)` packages, in order.
    pub search_path: Vec<PathBuf>,
    /// Bound on nested VM calls.
    pub max_call_depth: usize,
    /// Bound on reified-type reconstruction during inference.
    pub max_type_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            search_path: vec![PathBuf::from(".")],
            max_call_depth: 1000,
            max_type_depth: 256,
        }
    }
}

/// The result of one top-level item: its generalized type, rendered, and
/// its value.
#[derive(Debug)]
pub struct ExecOutcome {
    pub ty: String,
    pub value: Value,
}

/// Owns the whole pipeline: interner, typing state, package cache, and VM.
///
/// Each top-level item is inferred, generalized, lowered, and evaluated in
/// order. A failed item leaves the runtime globals untouched.
///
/// # Example
/// ```
/// use nacre::{Options, Runner, Value};
///
/// let mut runner = Runner::new(Options::default());
/// let outcomes = runner.exec_program("(+ 1 2)").unwrap();
/// assert_eq!(outcomes[0].value, Value::Int(3));
/// assert_eq!(outcomes[0].ty, "integer");
/// ```
#[derive(Debug)]
pub struct Runner {
    interner: Interner,
    env: TypeEnv,
    packages: PackageStore,
    vm: Vm,
    options: Options,
    pending: Vec<Expr>,
}

/// The serializable part of a prepared program: the interner and the
/// elaborated top-level items.
#[derive(serde::Serialize, serde::Deserialize)]
struct ProgramImage {
    interner: Interner,
    pending: Vec<Expr>,
}

impl Runner {
    pub fn new(options: Options) -> Self {
        let mut interner = Interner::new();
        let mut env = TypeEnv::new();
        let globals = builtins::install(&mut env, &mut interner);
        let vm = Vm::new(globals, options.max_call_depth);
        let packages = PackageStore::new(options.search_path.clone());
        Self {
            interner,
            env,
            packages,
            vm,
            options,
            pending: Vec::new(),
        }
    }

    /// Parses and elaborates a program, storing its items for execution.
    pub fn prepare(&mut self, source: &str) -> Result<(), NacreError> {
        let sexprs = parse_program(source, &mut self.interner)?;
        let mut items = Vec::with_capacity(sexprs.len());
        for sexpr in &sexprs {
            items.push(Expr::toplevel(sexpr, &mut self.interner)?);
        }
        self.pending.extend(items);
        Ok(())
    }

    /// Executes every prepared item in order.
    pub fn run_prepared(&mut self) -> Result<Vec<ExecOutcome>, NacreError> {
        let pending = std::mem::take(&mut self.pending);
        let mut outcomes = Vec::with_capacity(pending.len());
        for item in &pending {
            outcomes.push(self.exec(item)?);
        }
        Ok(outcomes)
    }

    /// Parses, elaborates, and executes a whole program.
    pub fn exec_program(&mut self, source: &str) -> Result<Vec<ExecOutcome>, NacreError> {
        self.prepare(source)?;
        self.run_prepared()
    }

    /// Runs one top-level item through the full pipeline.
    pub fn exec(&mut self, item: &Expr) -> Result<ExecOutcome, NacreError> {
        let mono = Infer {
            env: &mut self.env,
            interner: &mut self.interner,
            packages: &mut self.packages,
            max_type_depth: self.options.max_type_depth,
        }
        .infer(item)?;
        let poly = self.env.generalize(mono);
        let ty = TypePrinter::new(&self.env.store, &self.interner).poly(&poly);

        let ir = lower::compile(item, &self.interner)?;
        let mut cx = RunCx {
            interner: &self.interner,
            packages: &mut self.packages,
        };
        let value = self.vm.eval(&mut cx, &ir)?;
        Ok(ExecOutcome { ty, value })
    }

    /// Renders a value against this runner's interner.
    pub fn display_value(&self, value: &Value) -> String {
        value.display(&self.interner).to_string()
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) {
        self.vm.set_tracer(tracer);
    }

    /// Serializes the prepared (not yet executed) program.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(&ProgramImage {
            interner: self.interner.clone(),
            pending: self.pending.clone(),
        })
    }

    /// Restores a runner from [`Self::dump`] output.
    ///
    /// The builtin environment is reseeded first; its interned symbols get
    /// the same ids they had when the image was produced, so the restored
    /// items resolve identically.
    pub fn load(bytes: &[u8], options: Options) -> Result<Self, postcard::Error> {
        let image: ProgramImage = postcard::from_bytes(bytes)?;
        let mut runner = Self::new(options);
        runner.interner = image.interner;
        runner.pending = image.pending;
        Ok(runner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn dump_load_round_trips() {
        let mut runner = Runner::new(Options::default());
        runner.prepare("(let ((id (func (x) x))) (id 7))").unwrap();
        let bytes = runner.dump().unwrap();

        let mut restored = Runner::load(&bytes, Options::default()).unwrap();
        let outcomes = restored.run_prepared().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].value, Value::Int(7));
        assert_eq!(outcomes[0].ty, "integer");
    }

    #[test]
    fn failed_items_leave_globals_alone() {
        let mut runner = Runner::new(Options::default());
        runner.exec_program("(def x 1)").unwrap();
        let err = runner.exec_program("(do (def y 2) (+ 1 true))").unwrap_err();
        assert_eq!(err.to_string(), "type error: cannot unify types \"integer\" and \"boolean\"");

        // y was never evaluated; x is still there
        let outcomes = runner.exec_program("x").unwrap();
        assert_eq!(outcomes[0].value, Value::Int(1));
        assert!(runner.exec_program("y").is_err());
    }
}
