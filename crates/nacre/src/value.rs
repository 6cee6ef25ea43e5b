//! Runtime values.
//!
//! Small values are stored inline; closures, records, sums, and list cells
//! are reference-counted. `Clone` is cheap everywhere.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    builtins::Builtin,
    intern::{Interner, Symbol},
    ir::Ir,
};

/// Capture buffer; most closures capture only a handful of values.
pub type Captures = SmallVec<[Value; 4]>;

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(Rc<str>),
    Builtin(Builtin),
    Closure(Rc<Closure>),
    Record(Rc<RecordValue>),
    List(List),
    /// A tagged injection into a sum. Reserved alongside `match`.
    Sum(Rc<SumValue>),
}

/// A closure value: arity, captured values, and the shared body.
#[derive(Debug)]
pub struct Closure {
    pub argc: usize,
    pub captures: Captures,
    pub body: Rc<Ir>,
}

/// A record value; attributes keep insertion order for display.
#[derive(Debug, PartialEq)]
pub struct RecordValue {
    pub attrs: IndexMap<Symbol, Value>,
}

#[derive(Debug, PartialEq)]
pub struct SumValue {
    pub tag: Symbol,
    pub data: Value,
}

/// An immutable linked list.
#[derive(Debug, Clone, Default)]
pub struct List(Option<Rc<ListNode>>);

#[derive(Debug)]
pub struct ListNode {
    pub head: Value,
    pub tail: List,
}

impl List {
    pub fn nil() -> Self {
        Self(None)
    }

    pub fn cons(head: Value, tail: Self) -> Self {
        Self(Some(Rc::new(ListNode { head, tail })))
    }

    pub fn iter(&self) -> ListIter<'_> {
        ListIter { cursor: &self.0 }
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }
}

pub struct ListIter<'a> {
    cursor: &'a Option<Rc<ListNode>>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor.as_ref()?;
        self.cursor = &node.tail.0;
        Some(&node.head)
    }
}

impl Value {
    /// A short name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Real(_) => "real",
            Self::Str(_) => "string",
            Self::Builtin(_) => "builtin",
            Self::Closure(_) => "closure",
            Self::Record(_) => "record",
            Self::List(_) => "list",
            Self::Sum(_) => "sum",
        }
    }

    pub fn display<'a>(&'a self, interner: &'a Interner) -> DisplayValue<'a> {
        DisplayValue { value: self, interner }
    }
}

/// Structural equality for data; closures compare by identity and never
/// equal anything else.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::List(a), Self::List(b)) => a.iter().eq(b.iter()),
            (Self::Sum(a), Self::Sum(b)) => a == b,
            _ => false,
        }
    }
}

pub struct DisplayValue<'a> {
    value: &'a Value,
    interner: &'a Interner,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Unit => f.write_str("()"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Real(value) => f.write_str(ryu::Buffer::new().format(*value)),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Builtin(_) => f.write_str("#<builtin>"),
            Value::Closure(_) => f.write_str("#<closure>"),
            Value::Record(record) => {
                f.write_str("{")?;
                for (i, (attr, value)) in record.attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}: {}", self.interner.resolve(*attr), value.display(self.interner))?;
                }
                f.write_str("}")
            }
            Value::List(list) => {
                f.write_str("(")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item.display(self.interner))?;
                }
                f.write_str(")")
            }
            Value::Sum(sum) => {
                write!(
                    f,
                    "|{} {}",
                    self.interner.resolve(sum.tag),
                    sum.data.display(self.interner)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_iterate_in_order() {
        let list = List::cons(Value::Int(1), List::cons(Value::Int(2), List::nil()));
        let items: Vec<i64> = list
            .iter()
            .map(|v| match v {
                Value::Int(i) => *i,
                _ => panic!("expected integer"),
            })
            .collect();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn data_equality_is_structural() {
        let a = List::cons(Value::Int(1), List::nil());
        let b = List::cons(Value::Int(1), List::nil());
        assert_eq!(Value::List(a), Value::List(b));
        assert_ne!(Value::Int(1), Value::Bool(true));
    }

    #[test]
    fn display_formats() {
        let interner = Interner::new();
        assert_eq!(Value::Unit.display(&interner).to_string(), "()");
        assert_eq!(Value::Real(1.5).display(&interner).to_string(), "1.5");
        let list = Value::List(List::cons(Value::Int(1), List::cons(Value::Int(2), List::nil())));
        assert_eq!(list.display(&interner).to_string(), "(1 2)");
    }
}
