//! Kinds of types: terms (`*`), rows (`@`), and constructor arrows.

use std::fmt;

/// The kind of a type term or constructor.
///
/// Arrows associate to the right: `k1 >>= k2 >>= k3` is `k1 >>= (k2 >>= k3)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Kind {
    /// The kind of inhabited types, written `*`.
    Term,
    /// The kind of rows, written `@`.
    Row,
    /// A constructor kind `from -> to`.
    Arrow(Box<Kind>, Box<Kind>),
}

impl Kind {
    pub fn arrow(from: Self, to: Self) -> Self {
        Self::Arrow(Box::new(from), Box::new(to))
    }

    /// The argument and result kinds, if this is a constructor kind.
    pub fn as_arrow(&self) -> Option<(&Self, &Self)> {
        match self {
            Self::Arrow(from, to) => Some((from, to)),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term => f.write_str("*"),
            Self::Row => f.write_str("@"),
            Self::Arrow(from, to) => {
                if matches!(**from, Self::Arrow(..)) {
                    write!(f, "({from}) -> {to}")
                } else {
                    write!(f, "{from} -> {to}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_display_right_associated() {
        let k = Kind::arrow(Kind::Term, Kind::arrow(Kind::Row, Kind::Row));
        assert_eq!(k.to_string(), "* -> @ -> @");
        let hk = Kind::arrow(Kind::arrow(Kind::Term, Kind::Term), Kind::Term);
        assert_eq!(hk.to_string(), "(* -> *) -> *");
    }

    #[test]
    fn as_arrow_destructures() {
        let k = Kind::arrow(Kind::Term, Kind::Row);
        let (from, to) = k.as_arrow().unwrap();
        assert_eq!(*from, Kind::Term);
        assert_eq!(*to, Kind::Row);
        assert!(Kind::Term.as_arrow().is_none());
    }
}
