//! Pluggable VM tracing.
//!
//! The VM reports calls, definitions, and package imports to a tracer.
//! `NoopTracer` (the default) compiles away; `StderrTracer` is a debugging
//! aid for watching evaluation.

/// Observer for VM events.
pub trait VmTracer: std::fmt::Debug {
    fn apply(&mut self, depth: usize, argc: usize) {
        let _ = (depth, argc);
    }

    fn define(&mut self, name: &str) {
        let _ = name;
    }

    fn import(&mut self, package: &str) {
        let _ = package;
    }
}

/// Does nothing.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Logs every event to stderr.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn apply(&mut self, depth: usize, argc: usize) {
        eprintln!("{:depth$}apply/{argc}", "");
    }

    fn define(&mut self, name: &str) {
        eprintln!("def {name}");
    }

    fn import(&mut self, package: &str) {
        eprintln!("import {package}");
    }
}

/// Records events for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub applies: usize,
    pub defines: Vec<String>,
    pub imports: Vec<String>,
}

impl VmTracer for RecordingTracer {
    fn apply(&mut self, _depth: usize, _argc: usize) {
        self.applies += 1;
    }

    fn define(&mut self, name: &str) {
        self.defines.push(name.to_owned());
    }

    fn import(&mut self, package: &str) {
        self.imports.push(package.to_owned());
    }
}
