//! Error taxonomy shared by the whole pipeline.
//!
//! Every phase reports through [`NacreError`]: a phase tag, a machine-readable
//! kind, and a rendered message. Messages are rendered at the point where the
//! interner and type store are still in scope, so errors stay self-contained
//! once they leave the pipeline.

use std::fmt;

use strum::{Display, IntoStaticStr};

/// Result alias for the surface parser.
pub type ParseResult<T> = Result<T, NacreError>;
/// Result alias for elaboration and type inference.
pub type TypeResult<T> = Result<T, NacreError>;
/// Result alias for lowering and evaluation.
pub type RunResult<T> = Result<T, NacreError>;

/// Which stage of the pipeline produced an error.
///
/// This is what user-facing output keys on: `parse error`, `type error`,
/// `runtime error`. Elaboration failures (malformed special forms, reserved
/// identifiers) count as parse errors since they concern program shape, not
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    Parse,
    Type,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => f.write_str("parse error"),
            Self::Type => f.write_str("type error"),
            Self::Run => f.write_str("runtime error"),
        }
    }
}

/// Machine-readable error discriminant.
///
/// `Unbound` and `NotCallable` can surface from both inference and
/// evaluation; the [`Phase`] on the error disambiguates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Malformed S-expression.
    Syntax,
    /// S-expression does not match a special form's shape.
    Form,
    /// Reserved keyword used as a variable name.
    ReservedIdentifier,
    /// Variable not in scope.
    Unbound,
    /// Same name defined twice in one binding group.
    Redefined,
    /// Ill-kinded type application or mixed-kind unification.
    KindMismatch,
    /// Unification would build an infinite type.
    OccursCheck,
    /// Structural mismatch between two types.
    Mismatch,
    /// Record lacks an attribute required by unification.
    MissingField,
    /// No signature registered for a type constructor.
    UnknownSignature,
    /// `make` would specialize a parametric field.
    GeneralizationLost,
    /// Applying a non-function value.
    NotCallable,
    /// Form is recognized but has no semantics yet.
    Unsupported,
    /// Recursion or evaluation depth limit hit.
    DepthLimit,
}

/// An error from any stage of the pipeline.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NacreError {
    pub phase: Phase,
    pub kind: ErrorKind,
    message: String,
}

impl NacreError {
    pub fn new(phase: Phase, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(Phase::Parse, ErrorKind::Syntax, message)
    }

    pub fn form(message: impl Into<String>) -> Self {
        Self::new(Phase::Parse, ErrorKind::Form, message)
    }

    pub fn reserved(name: &str) -> Self {
        Self::new(
            Phase::Parse,
            ErrorKind::ReservedIdentifier,
            format!("\"{name}\" is a reserved keyword and cannot be used as a variable name"),
        )
    }

    pub fn unbound(name: &str) -> Self {
        Self::new(Phase::Type, ErrorKind::Unbound, format!("unbound variable \"{name}\""))
    }

    pub fn redefined(name: &str) -> Self {
        Self::new(Phase::Type, ErrorKind::Redefined, format!("redefined variable \"{name}\""))
    }

    pub fn kind_mismatch(message: impl Into<String>) -> Self {
        Self::new(Phase::Type, ErrorKind::KindMismatch, message)
    }

    pub fn occurs_check(var: &str, ty: &str) -> Self {
        Self::new(
            Phase::Type,
            ErrorKind::OccursCheck,
            format!("type variable {var} occurs in type {ty}"),
        )
    }

    pub fn mismatch(lhs: &str, rhs: &str) -> Self {
        Self::new(
            Phase::Type,
            ErrorKind::Mismatch,
            format!("cannot unify types \"{lhs}\" and \"{rhs}\""),
        )
    }

    pub fn missing_field(attr: &str, row: &str) -> Self {
        Self::new(
            Phase::Type,
            ErrorKind::MissingField,
            format!("expected attribute \"{attr}\" in record type \"{row}\""),
        )
    }

    pub fn unknown_signature(ctor: &str) -> Self {
        Self::new(
            Phase::Type,
            ErrorKind::UnknownSignature,
            format!("unknown signature \"{ctor}\""),
        )
    }

    pub fn generalization_lost(r#gen: &str, reference: &str) -> Self {
        Self::new(
            Phase::Type,
            ErrorKind::GeneralizationLost,
            format!("failed to generalize {} as {reference}", r#gen),
        )
    }

    pub fn unsupported(what: &str) -> Self {
        Self::new(Phase::Type, ErrorKind::Unsupported, format!("unsupported form: {what}"))
    }

    pub fn not_callable(what: &str) -> Self {
        Self::new(
            Phase::Run,
            ErrorKind::NotCallable,
            format!("cannot apply non-function value {what}"),
        )
    }

    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(Phase::Run, kind, message)
    }

    /// True when a retried application is allowed to swallow this error.
    ///
    /// Kind mismatches are structural facts about the program and are never
    /// recovered by unwrapping constructor signatures.
    pub fn is_retryable(&self) -> bool {
        self.phase == Phase::Type && self.kind != ErrorKind::KindMismatch
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NacreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.phase, self.message)
    }
}

impl std::error::Error for NacreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_phase() {
        let err = NacreError::unbound("x");
        assert_eq!(err.to_string(), "type error: unbound variable \"x\"");
        assert_eq!(err.kind, ErrorKind::Unbound);
    }

    #[test]
    fn kind_errors_are_not_retryable() {
        assert!(!NacreError::kind_mismatch("boom").is_retryable());
        assert!(NacreError::mismatch("integer", "boolean").is_retryable());
        assert!(!NacreError::not_callable("1").is_retryable());
    }
}
