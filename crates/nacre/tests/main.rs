//! End-to-end evaluation through the public API.

use nacre::{ErrorKind, Options, Phase, Runner, Value};
use pretty_assertions::assert_eq;

fn run_one(src: &str) -> Value {
    let mut runner = Runner::new(Options::default());
    let outcomes = runner.exec_program(src).unwrap();
    outcomes.into_iter().last().expect("program has items").value
}

#[test]
fn arithmetic() {
    let mut runner = Runner::new(Options::default());
    let outcomes = runner.exec_program("(+ 1 2)").unwrap();
    assert_eq!(outcomes[0].value, Value::Int(3));
    assert_eq!(outcomes[0].ty, "integer");
}

#[test]
fn polymorphic_identity() {
    assert_eq!(run_one("(let ((id (func (x) x))) (id 7))"), Value::Int(7));
    // the same binding is used at boolean and at integer
    assert_eq!(
        run_one("(let ((id (func (x) x))) (if (id true) (id 7) (id 0)))"),
        Value::Int(7)
    );
}

#[test]
fn zero_argument_application_passes_through() {
    assert_eq!(run_one("(let ((id (func (x) x))) ((id true)))"), Value::Bool(true));
}

#[test]
fn row_polymorphic_selection() {
    assert_eq!(run_one("((func (r) (.x r)) (record (x 1) (y 2)))"), Value::Int(1));
}

#[test]
fn records_extend() {
    assert_eq!(
        run_one("(let ((p (record (x 1) (y 2)))) (+ (.x p) (.y p)))"),
        Value::Int(3)
    );
}

#[test]
fn recursive_function_via_let() {
    assert_eq!(
        run_one("(let ((fact (func (n) (if (= n 0) 1 (* n (fact (- n 1))))))) (fact 5))"),
        Value::Int(120)
    );
}

#[test]
fn recursive_function_via_def() {
    let mut runner = Runner::new(Options::default());
    let outcomes = runner
        .exec_program(
            "(def fact (func (n) (if (= n 0) 1 (* n (fact (- n 1))))))
             (fact 5)",
        )
        .unwrap();
    assert_eq!(outcomes[0].ty, "io unit");
    assert_eq!(outcomes[1].value, Value::Int(120));
}

#[test]
fn currying() {
    assert_eq!(
        run_one("(let ((add (func (x y) (+ x y))) (inc (add 1))) (inc 41))"),
        Value::Int(42)
    );
}

#[test]
fn saturation_is_associative() {
    // one call with both arguments ...
    assert_eq!(run_one("(let ((add (func (x y) (+ x y)))) (add 1 41))"), Value::Int(42));
    // ... equals partial application then the rest ...
    assert_eq!(
        run_one("(let ((add (func (x y) (+ x y)))) ((add 1) 41))"),
        Value::Int(42)
    );
    // ... and an over-saturated call applies in two steps
    assert_eq!(
        run_one("(let ((konst (func (x) (func (y) x)))) (konst 7 9))"),
        Value::Int(7)
    );
}

#[test]
fn builtins_curry() {
    assert_eq!(run_one("(let ((inc (+ 1))) (inc 41))"), Value::Int(42));
}

#[test]
fn first_class_selector() {
    assert_eq!(
        run_one("(let ((get-x .x)) (get-x (record (x 5))))"),
        Value::Int(5)
    );
}

#[test]
fn qualified_names_select() {
    assert_eq!(run_one("(let ((p (record (x (record (y 3)))))) p.x.y)"), Value::Int(3));
}

#[test]
fn shadowing_in_nested_lets() {
    assert_eq!(run_one("(let ((x 1)) (let ((x 2)) x))"), Value::Int(2));
    assert_eq!(run_one("(let ((x 1)) (+ (let ((x 10)) x) x))"), Value::Int(11));
}

#[test]
fn closures_capture_their_environment() {
    assert_eq!(
        run_one("(let ((a 1)) (let ((f (func (x) (+ x a)))) (f 41)))"),
        Value::Int(42)
    );
    // captures resolve through two lambda levels
    assert_eq!(
        run_one("(((func (x) (func (y) (+ x y))) 40) 2)"),
        Value::Int(42)
    );
}

#[test]
fn do_sequences_and_defines() {
    let mut runner = Runner::new(Options::default());
    let outcomes = runner.exec_program("(do (def x 40) (+ x 2)) x").unwrap();
    assert_eq!(outcomes[0].value, Value::Int(42));
    assert_eq!(outcomes[1].value, Value::Int(40));
}

#[test]
fn lists_build_and_display() {
    let mut runner = Runner::new(Options::default());
    let outcomes = runner.exec_program("(cons 1 (cons 2 nil))").unwrap();
    assert_eq!(outcomes[0].ty, "list integer");
    assert_eq!(runner.display_value(&outcomes[0].value), "(1 2)");
}

#[test]
fn record_display() {
    let mut runner = Runner::new(Options::default());
    let outcomes = runner.exec_program("(record (x 1) (y true))").unwrap();
    assert_eq!(runner.display_value(&outcomes[0].value), "{x: 1; y: true}");
}

#[test]
fn typed_arguments_check_and_run() {
    assert_eq!(run_one("((func ((integer n)) (+ n 1)) 41)"), Value::Int(42));
}

#[test]
fn reals_evaluate() {
    let mut runner = Runner::new(Options::default());
    let outcomes = runner.exec_program("1.5").unwrap();
    assert_eq!(outcomes[0].ty, "real");
    assert_eq!(outcomes[0].value, Value::Real(1.5));
}

#[test]
fn tracers_observe_calls_and_definitions() {
    let mut runner = Runner::new(Options::default());
    runner.set_tracer(Box::new(nacre::RecordingTracer::default()));
    runner.exec_program("(def answer (+ 40 2))").unwrap();
    // the tracer is write-only from out here; this just proves the hook
    // wiring does not disturb evaluation
    let outcomes = runner.exec_program("answer").unwrap();
    assert_eq!(outcomes[0].value, Value::Int(42));
}

#[test]
fn empty_program_is_fine() {
    let mut runner = Runner::new(Options::default());
    assert!(runner.exec_program("; nothing here\n").unwrap().is_empty());
}

#[test]
fn runaway_recursion_hits_the_depth_limit() {
    let mut runner = Runner::new(Options {
        max_call_depth: 64,
        ..Options::default()
    });
    let err = runner
        .exec_program("(let ((spin (func (n) (spin n)))) (spin 0))")
        .unwrap_err();
    assert_eq!(err.phase, Phase::Run);
    assert_eq!(err.kind, ErrorKind::DepthLimit);
}

#[test]
fn type_errors_do_not_define_globals() {
    let mut runner = Runner::new(Options::default());
    let err = runner.exec_program("(do (def leak 1) (+ 1 true))").unwrap_err();
    assert_eq!(err.phase, Phase::Type);
    // leak was type-checked but never evaluated
    assert!(runner.exec_program("leak").is_err());
}

mod packages {
    use std::{fs, path::PathBuf};

    use super::*;
    use pretty_assertions::assert_eq;

    /// Creates a scratch directory holding `<name>.nc` with the given
    /// source, for exercising the package loader.
    fn package_dir(test: &str, name: &str, source: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nacre-{}-{test}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.nc")), source).unwrap();
        dir
    }

    fn runner_with(dir: PathBuf) -> Runner {
        Runner::new(Options {
            search_path: vec![dir],
            ..Options::default()
        })
    }

    #[test]
    fn import_binds_the_package_record() {
        let dir = package_dir("import", "mylib", "(def a 1) (def b 2)");
        let mut runner = runner_with(dir);
        let outcomes = runner.exec_program("(import mylib) (+ (.a mylib) (.b mylib))").unwrap();
        assert_eq!(outcomes[0].ty, "io unit");
        assert_eq!(outcomes[1].value, Value::Int(3));
    }

    #[test]
    fn use_unpacks_a_package_into_scope() {
        let dir = package_dir("use", "mylib", "(def a 20) (def b 22)");
        let mut runner = runner_with(dir);
        let outcomes = runner.exec_program("(import mylib) (use mylib (+ a b))").unwrap();
        assert_eq!(outcomes[1].value, Value::Int(42));
    }

    #[test]
    fn package_functions_work() {
        let dir = package_dir("funcs", "mathlib", "(def double (func (x) (* x 2)))");
        let mut runner = runner_with(dir);
        let outcomes = runner.exec_program("(import mathlib) ((.double mathlib) 21)").unwrap();
        assert_eq!(outcomes[1].value, Value::Int(42));
    }

    #[test]
    fn missing_package_is_a_type_error() {
        let mut runner = runner_with(std::env::temp_dir().join("nacre-definitely-missing"));
        let err = runner.exec_program("(import nope)").unwrap_err();
        assert_eq!(err.phase, Phase::Type);
        assert!(err.message().contains("not found"));
    }

    #[test]
    fn importing_twice_is_an_error() {
        let dir = package_dir("twice", "mylib", "(def a 1)");
        let mut runner = runner_with(dir);
        runner.exec_program("(import mylib)").unwrap();
        let err = runner.exec_program("(import mylib)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Redefined);
    }
}
