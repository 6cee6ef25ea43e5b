//! Language-level terms and their elaboration from S-expressions.
//!
//! Elaboration validates special forms against their shapes, enforces the
//! reserved-word rules, strips the `.`/`|` prefixes into selection and
//! injection nodes, and turns `true`/`false` symbols into literals.

use std::str::FromStr;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    error::{NacreError, TypeResult},
    intern::{Interner, Symbol},
    sexpr::Sexpr,
};

/// Reserved keywords; none of these may be used as a variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Func,
    Let,
    Do,
    Def,
    If,
    Record,
    Match,
    Make,
    Use,
    Import,
    Product,
    Coproduct,
    #[strum(serialize = "_")]
    Wildcard,
}

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Lit(Literal),
    Var(Symbol),
    /// `(func (arg ...) body)`
    Abs { args: Vec<Arg>, body: Box<Expr> },
    App { func: Box<Expr>, args: Vec<Expr> },
    /// `(let ((name expr) ...) body)`; recursive when any bound value is a
    /// lambda (see the fix rewrite in inference).
    Let { defs: Vec<Binding>, body: Box<Expr> },
    Cond {
        test: Box<Expr>,
        conseq: Box<Expr>,
        alt: Box<Expr>,
    },
    /// `(record (name expr) ...)`; attribute names are unique.
    Record { attrs: Vec<Attr> },
    /// A record-field selector `.name`, a function from `{name: a | r}` to `a`.
    Sel(Symbol),
    /// A sum injection `|name`. Reserved: elaborated but not yet inferable.
    Inj(Symbol),
    /// Reserved: elaborated but not yet inferable.
    Match { cases: Vec<MatchCase> },
    /// `(make type (name expr) ...)`: packs a record at a declared nominal type.
    Make { name: Symbol, attrs: Vec<Attr> },
    /// `(use env body)`: imports the fields of a record value into scope.
    Use { env: Box<Expr>, body: Box<Expr> },
    /// `(import package)`: loads a package, binding it by its name.
    Import(Symbol),
    /// `(def name expr)`: top-level definition producing `io unit`.
    Def { name: Symbol, value: Box<Expr> },
    /// `(do item ...)`: statement sequence producing the value of the last.
    Seq { items: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Literal {
    Unit,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

/// A function argument: bare name or `(type-expr name)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Arg {
    Plain(Symbol),
    Typed { ty: Expr, name: Symbol },
}

impl Arg {
    pub fn name(&self) -> Symbol {
        match self {
            Self::Plain(name) | Self::Typed { name, .. } => *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Binding {
    pub name: Symbol,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attr {
    pub name: Symbol,
    pub value: Expr,
}

/// One `(tag arg expr)` handler of a `match` form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchCase {
    pub tag: Symbol,
    pub binding: Arg,
    pub value: Expr,
}

impl Expr {
    /// Elaborates an expression-position S-expression.
    pub fn check(sexpr: &Sexpr, interner: &mut Interner) -> TypeResult<Self> {
        match sexpr {
            Sexpr::Int(value) => Ok(Self::Lit(Literal::Int(*value))),
            Sexpr::Real(value) => Ok(Self::Lit(Literal::Real(*value))),
            Sexpr::Bool(value) => Ok(Self::Lit(Literal::Bool(*value))),
            Sexpr::Sym(symbol) => check_symbol(*symbol, interner),
            Sexpr::List(items) => check_list(items, interner),
        }
    }

    /// Elaborates a top-level item: `(def name expr)` or any expression.
    pub fn toplevel(sexpr: &Sexpr, interner: &mut Interner) -> TypeResult<Self> {
        check_io(sexpr, interner)
    }
}

fn keyword_of(symbol: Symbol, interner: &Interner) -> Option<Keyword> {
    Keyword::from_str(interner.resolve(symbol)).ok()
}

/// Checks that a symbol is usable as a binder name.
fn check_name(symbol: Symbol, interner: &Interner) -> TypeResult<Symbol> {
    let text = interner.resolve(symbol);
    if Keyword::from_str(text).is_ok() {
        return Err(NacreError::reserved(text));
    }
    if text.starts_with('.') || text.starts_with('|') {
        return Err(NacreError::form(format!("\"{text}\" cannot be used as a variable name")));
    }
    Ok(symbol)
}

fn check_symbol(symbol: Symbol, interner: &mut Interner) -> TypeResult<Expr> {
    let text = interner.resolve(symbol);
    if let Some(stripped) = text.strip_prefix('.') {
        if stripped.is_empty() {
            return Err(NacreError::form("empty attribute name"));
        }
        let stripped = stripped.to_owned();
        return Ok(Expr::Sel(interner.intern(&stripped)));
    }
    if let Some(stripped) = text.strip_prefix('|') {
        if stripped.is_empty() {
            return Err(NacreError::form("empty injection name"));
        }
        let stripped = stripped.to_owned();
        return Ok(Expr::Inj(interner.intern(&stripped)));
    }
    match text {
        "true" => return Ok(Expr::Lit(Literal::Bool(true))),
        "false" => return Ok(Expr::Lit(Literal::Bool(false))),
        _ => {}
    }
    if Keyword::from_str(text).is_ok() {
        return Err(NacreError::reserved(text));
    }
    Ok(Expr::Var(symbol))
}

fn check_list(items: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let Some((head, rest)) = items.split_first() else {
        // the empty list is the unit literal
        return Ok(Expr::Lit(Literal::Unit));
    };
    if let Some(symbol) = head.as_symbol() {
        if let Some(keyword) = keyword_of(symbol, interner) {
            return check_special(keyword, rest, interner);
        }
    }
    // function application
    let func = Expr::check(head, interner)?;
    let args = rest
        .iter()
        .map(|arg| Expr::check(arg, interner))
        .collect::<TypeResult<Vec<_>>>()?;
    Ok(Expr::App {
        func: Box::new(func),
        args,
    })
}

/// Elaborates an item of a `do` sequence or a top-level form: a `def` or an
/// expression.
fn check_io(sexpr: &Sexpr, interner: &mut Interner) -> TypeResult<Expr> {
    if let Sexpr::List(items) = sexpr {
        if let Some((head, rest)) = items.split_first() {
            if head.as_symbol().and_then(|s| keyword_of(s, interner)) == Some(Keyword::Def) {
                return check_def(rest, interner);
            }
        }
    }
    Expr::check(sexpr, interner)
}

fn check_special(keyword: Keyword, rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    match keyword {
        Keyword::Func => check_abs(rest, interner),
        Keyword::Let => check_let(rest, interner),
        Keyword::Do => {
            let items = rest
                .iter()
                .map(|item| check_io(item, interner))
                .collect::<TypeResult<Vec<_>>>()?;
            Ok(Expr::Seq { items })
        }
        Keyword::If => check_cond(rest, interner),
        Keyword::Record => Ok(Expr::Record {
            attrs: check_attrs(rest, interner)?,
        }),
        Keyword::Make => check_make(rest, interner),
        Keyword::Use => check_use(rest, interner),
        Keyword::Import => check_import(rest, interner),
        Keyword::Match => check_match(rest, interner),
        Keyword::Def => Err(NacreError::form(
            "(def `name` `expr`) is only allowed at top level or inside (do ...)",
        )),
        Keyword::Product | Keyword::Coproduct | Keyword::Wildcard => {
            Err(NacreError::form(format!("\"{keyword}\" cannot start a form")))
        }
    }
}

fn check_abs(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let [args, body] = rest else {
        return Err(NacreError::form("expected (func (`arg` ...) `expr`)"));
    };
    let Some(args) = args.as_list() else {
        return Err(NacreError::form("expected (func (`arg` ...) `expr`)"));
    };
    let args = args
        .iter()
        .map(|arg| check_arg(arg, interner))
        .collect::<TypeResult<Vec<_>>>()?;
    let mut seen = Vec::with_capacity(args.len());
    for arg in &args {
        if seen.contains(&arg.name()) {
            return Err(NacreError::redefined(interner.resolve(arg.name())));
        }
        seen.push(arg.name());
    }
    Ok(Expr::Abs {
        args,
        body: Box::new(Expr::check(body, interner)?),
    })
}

fn check_arg(sexpr: &Sexpr, interner: &mut Interner) -> TypeResult<Arg> {
    match sexpr {
        Sexpr::Sym(symbol) => Ok(Arg::Plain(check_name(*symbol, interner)?)),
        Sexpr::List(items) => {
            let [ty, Sexpr::Sym(name)] = items.as_slice() else {
                return Err(NacreError::form("expected `name` or (`type-expr` `name`) argument"));
            };
            Ok(Arg::Typed {
                ty: Expr::check(ty, interner)?,
                name: check_name(*name, interner)?,
            })
        }
        _ => Err(NacreError::form("expected `name` or (`type-expr` `name`) argument")),
    }
}

fn check_let(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let [bindings, body] = rest else {
        return Err(NacreError::form("expected (let ((`name` `expr`) ...) `expr`)"));
    };
    let Some(bindings) = bindings.as_list() else {
        return Err(NacreError::form("expected (let ((`name` `expr`) ...) `expr`)"));
    };
    let mut defs = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let Some([Sexpr::Sym(name), value]) = binding.as_list() else {
            return Err(NacreError::form("expected (`name` `expr`) binding"));
        };
        let name = check_name(*name, interner)?;
        if defs.iter().any(|def: &Binding| def.name == name) {
            return Err(NacreError::redefined(interner.resolve(name)));
        }
        defs.push(Binding {
            name,
            value: Expr::check(value, interner)?,
        });
    }
    Ok(Expr::Let {
        defs,
        body: Box::new(Expr::check(body, interner)?),
    })
}

fn check_cond(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let [test, conseq, alt] = rest else {
        return Err(NacreError::form("expected (if `expr` `expr` `expr`)"));
    };
    Ok(Expr::Cond {
        test: Box::new(Expr::check(test, interner)?),
        conseq: Box::new(Expr::check(conseq, interner)?),
        alt: Box::new(Expr::check(alt, interner)?),
    })
}

fn check_attrs(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Vec<Attr>> {
    let mut attrs: Vec<Attr> = Vec::with_capacity(rest.len());
    for attr in rest {
        let Some([Sexpr::Sym(name), value]) = attr.as_list() else {
            return Err(NacreError::form("expected (`name` `expr`) attribute"));
        };
        let name = check_name(*name, interner)?;
        if attrs.iter().any(|attr| attr.name == name) {
            return Err(NacreError::redefined(interner.resolve(name)));
        }
        attrs.push(Attr {
            name,
            value: Expr::check(value, interner)?,
        });
    }
    Ok(attrs)
}

fn check_make(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let Some((Sexpr::Sym(name), attrs)) = rest.split_first() else {
        return Err(NacreError::form("expected (make `type` (`name` `expr`) ...)"));
    };
    Ok(Expr::Make {
        name: check_name(*name, interner)?,
        attrs: check_attrs(attrs, interner)?,
    })
}

fn check_use(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let [env, body] = rest else {
        return Err(NacreError::form("expected (use `expr` `expr`)"));
    };
    Ok(Expr::Use {
        env: Box::new(Expr::check(env, interner)?),
        body: Box::new(Expr::check(body, interner)?),
    })
}

fn check_import(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let [Sexpr::Sym(name)] = rest else {
        return Err(NacreError::form("expected (import `name`)"));
    };
    Ok(Expr::Import(check_name(*name, interner)?))
}

fn check_def(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let [Sexpr::Sym(name), value] = rest else {
        return Err(NacreError::form("expected (def `name` `expr`)"));
    };
    Ok(Expr::Def {
        name: check_name(*name, interner)?,
        value: Box::new(Expr::check(value, interner)?),
    })
}

fn check_match(rest: &[Sexpr], interner: &mut Interner) -> TypeResult<Expr> {
    let mut cases = Vec::with_capacity(rest.len());
    for case in rest {
        let Some([Sexpr::Sym(tag), binding, value]) = case.as_list() else {
            return Err(NacreError::form("expected (`tag` `arg` `expr`) handler"));
        };
        cases.push(MatchCase {
            tag: *tag,
            binding: check_arg(binding, interner)?,
            value: Expr::check(value, interner)?,
        });
    }
    Ok(Expr::Match { cases })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{error::ErrorKind, parse::parse_one};

    fn elaborate(src: &str) -> (TypeResult<Expr>, Interner) {
        let mut interner = Interner::new();
        let sexpr = parse_one(src, &mut interner).unwrap();
        let expr = Expr::toplevel(&sexpr, &mut interner);
        (expr, interner)
    }

    #[test]
    fn application() {
        let (expr, interner) = elaborate("(+ 1 2)");
        let Expr::App { func, args } = expr.unwrap() else {
            panic!("expected application")
        };
        assert_eq!(*func, Expr::Var(interner.get("+").unwrap()));
        assert_eq!(args, vec![Expr::Lit(Literal::Int(1)), Expr::Lit(Literal::Int(2))]);
    }

    #[test]
    fn empty_list_is_unit() {
        let (expr, _) = elaborate("()");
        assert_eq!(expr.unwrap(), Expr::Lit(Literal::Unit));
    }

    #[test]
    fn booleans_are_literals() {
        let (expr, _) = elaborate("true");
        assert_eq!(expr.unwrap(), Expr::Lit(Literal::Bool(true)));
    }

    #[test]
    fn selection_symbol() {
        let (expr, interner) = elaborate(".x");
        assert_eq!(expr.unwrap(), Expr::Sel(interner.get("x").unwrap()));
    }

    #[test]
    fn typed_and_plain_args() {
        let (expr, interner) = elaborate("(func (x (integer n)) x)");
        let Expr::Abs { args, .. } = expr.unwrap() else {
            panic!("expected lambda")
        };
        assert_eq!(args[0], Arg::Plain(interner.get("x").unwrap()));
        assert!(matches!(args[1], Arg::Typed { .. }));
    }

    #[test]
    fn reserved_keyword_as_variable() {
        let (expr, _) = elaborate("(func (let) 1)");
        assert_eq!(expr.unwrap_err().kind, ErrorKind::ReservedIdentifier);
    }

    #[test]
    fn duplicate_let_binding() {
        let (expr, _) = elaborate("(let ((x 1) (x 2)) x)");
        assert_eq!(expr.unwrap_err().kind, ErrorKind::Redefined);
    }

    #[test]
    fn duplicate_record_attribute() {
        let (expr, _) = elaborate("(record (x 1) (x 2))");
        assert_eq!(expr.unwrap_err().kind, ErrorKind::Redefined);
    }

    #[test]
    fn malformed_let_shape() {
        let (expr, _) = elaborate("(let x)");
        let err = expr.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Form);
        assert!(err.message().contains("(let ((`name` `expr`) ...) `expr`)"));
    }

    #[test]
    fn def_only_at_toplevel_or_do() {
        let (expr, _) = elaborate("(+ (def x 1) 2)");
        assert_eq!(expr.unwrap_err().kind, ErrorKind::Form);
    }

    #[test]
    fn def_inside_do() {
        let (expr, _) = elaborate("(do (def x 1) x)");
        let Expr::Seq { items } = expr.unwrap() else {
            panic!("expected sequence")
        };
        assert!(matches!(items[0], Expr::Def { .. }));
    }
}
