//! Surface parser: source text to S-expressions.
//!
//! A hand-written recursive-descent scanner. Atoms are numbers, identifiers,
//! operators, and the `.`/`|` prefixed selection and injection symbols;
//! `;` starts a comment running to end of line. Qualified names `a.b.c`
//! desugar directly to nested selection applications.

use crate::{
    error::{NacreError, ParseResult},
    intern::Interner,
    sexpr::Sexpr,
};

/// Multi-character operators, longest first so `>>=` wins over `>=` and `>`.
const OPERATORS: &[&str] = &[">>=", "!=", "<=", ">=", "->", "=>"];
const SINGLE_OPERATORS: &[u8] = b"+-*/=<>%";

const SELECTION_PREFIX: char = '.';
const INJECTION_PREFIX: char = '|';

/// Parses a whole program: a sequence of S-expressions up to end of input.
pub fn parse_program(source: &str, interner: &mut Interner) -> ParseResult<Vec<Sexpr>> {
    let mut parser = Parser { source, pos: 0, interner };
    let mut items = Vec::new();
    loop {
        parser.skip_trivia();
        if parser.at_end() {
            return Ok(items);
        }
        items.push(parser.expr()?);
    }
}

/// Parses a single S-expression, failing on trailing input.
pub fn parse_one(source: &str, interner: &mut Interner) -> ParseResult<Sexpr> {
    let mut parser = Parser { source, pos: 0, interner };
    parser.skip_trivia();
    let expr = parser.expr()?;
    parser.skip_trivia();
    if parser.at_end() {
        Ok(expr)
    } else {
        Err(NacreError::syntax("trailing input after expression"))
    }
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    interner: &'a mut Interner,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn rest(&self) -> &str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(';') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn expr(&mut self) -> ParseResult<Sexpr> {
        match self.peek() {
            None => Err(NacreError::syntax("unexpected end of input")),
            Some('(') => self.list(),
            Some(')') => Err(NacreError::syntax("unexpected \")\"")),
            Some(SELECTION_PREFIX) => self.prefixed(SELECTION_PREFIX),
            Some(INJECTION_PREFIX) => self.prefixed(INJECTION_PREFIX),
            Some(c) if c.is_ascii_digit() => self.number(),
            Some('-') if self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) => self.number(),
            Some(c) if is_identifier_start(c) => self.identifier(),
            Some(_) => self.operator(),
        }
    }

    fn list(&mut self) -> ParseResult<Sexpr> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(NacreError::syntax("unterminated list")),
                Some(')') => {
                    self.bump();
                    return Ok(Sexpr::List(items));
                }
                Some(_) => items.push(self.expr()?),
            }
        }
    }

    /// A number is a real iff it contains a decimal point.
    fn number(&mut self) -> ParseResult<Sexpr> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        let mut is_real = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' && !is_real && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) {
                is_real = true;
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        if is_real {
            text.parse::<f64>()
                .map(Sexpr::Real)
                .map_err(|_| NacreError::syntax(format!("malformed real \"{text}\"")))
        } else {
            text.parse::<i64>()
                .map(Sexpr::Int)
                .map_err(|_| NacreError::syntax(format!("integer out of range \"{text}\"")))
        }
    }

    fn identifier_range(&mut self) -> ParseResult<std::ops::Range<usize>> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_identifier_start(c) => {
                self.bump();
            }
            _ => return Err(NacreError::syntax("expected identifier")),
        }
        while let Some(c) = self.peek() {
            if is_identifier_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(start..self.pos)
    }

    /// An identifier, possibly continuing into a qualified name `a.b.c`,
    /// which desugars to the selection chain `(.c (.b a))`.
    fn identifier(&mut self) -> ParseResult<Sexpr> {
        let source = self.source;
        let range = self.identifier_range()?;
        let mut expr = Sexpr::Sym(self.interner.intern(&source[range]));
        while self.peek() == Some(SELECTION_PREFIX) {
            self.bump();
            let range = self.identifier_range()?;
            let selector = format!("{SELECTION_PREFIX}{}", &source[range]);
            let selector = Sexpr::Sym(self.interner.intern(&selector));
            expr = Sexpr::List(vec![selector, expr]);
        }
        Ok(expr)
    }

    /// A `.name` selection or `|name` injection symbol; the prefix is kept
    /// on the symbol and stripped during elaboration.
    fn prefixed(&mut self, prefix: char) -> ParseResult<Sexpr> {
        let source = self.source;
        self.bump();
        let range = self
            .identifier_range()
            .map_err(|_| NacreError::syntax(format!("expected attribute name after \"{prefix}\"")))?;
        let name = format!("{prefix}{}", &source[range]);
        Ok(Sexpr::Sym(self.interner.intern(&name)))
    }

    fn operator(&mut self) -> ParseResult<Sexpr> {
        for op in OPERATORS {
            if self.rest().starts_with(op) {
                self.pos += op.len();
                return Ok(Sexpr::Sym(self.interner.intern(op)));
            }
        }
        match self.peek() {
            Some(c) if c.is_ascii() && SINGLE_OPERATORS.contains(&(c as u8)) => {
                self.bump();
                let mut buf = [0u8; 4];
                Ok(Sexpr::Sym(self.interner.intern(c.encode_utf8(&mut buf))))
            }
            Some(c) => Err(NacreError::syntax(format!("unexpected character \"{c}\""))),
            None => Err(NacreError::syntax("unexpected end of input")),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(src: &str) -> (Vec<Sexpr>, Interner) {
        let mut interner = Interner::new();
        let items = parse_program(src, &mut interner).unwrap();
        (items, interner)
    }

    fn render(src: &str) -> String {
        let (items, interner) = parse(src);
        items
            .iter()
            .map(|e| e.display(&interner).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn atoms() {
        let (items, _) = parse("42 -7 1.5 -0.25 foo foo-bar _x");
        assert_eq!(items[0], Sexpr::Int(42));
        assert_eq!(items[1], Sexpr::Int(-7));
        assert_eq!(items[2], Sexpr::Real(1.5));
        assert_eq!(items[3], Sexpr::Real(-0.25));
        assert!(matches!(items[4], Sexpr::Sym(_)));
        assert_eq!(items.len(), 7);
    }

    #[test]
    fn operators() {
        let (items, interner) = parse("+ - >>= <= -> %");
        let names: Vec<&str> = items
            .iter()
            .map(|e| interner.resolve(e.as_symbol().unwrap()))
            .collect();
        assert_eq!(names, vec!["+", "-", ">>=", "<=", "->", "%"]);
    }

    #[test]
    fn minus_before_digit_is_a_number() {
        let (items, _) = parse("(- 1 2) -3");
        assert_eq!(items[1], Sexpr::Int(-3));
        let inner = items[0].as_list().unwrap();
        assert_eq!(inner.len(), 3);
    }

    #[test]
    fn lists_nest() {
        assert_eq!(render("(+ (a b) 1) ; comment\n()"), "(+ (a b) 1) ()");
    }

    #[test]
    fn selection_prefix() {
        assert_eq!(render("(.x r)"), "(.x r)");
    }

    #[test]
    fn qualified_names_desugar() {
        assert_eq!(render("a.b.c"), "(.c (.b a))");
    }

    #[test]
    fn injection_prefix() {
        assert_eq!(render("|cons"), "|cons");
    }

    #[test]
    fn unterminated_list_fails() {
        let mut interner = Interner::new();
        let err = parse_program("(+ 1", &mut interner).unwrap_err();
        assert_eq!(err.to_string(), "parse error: unterminated list");
    }

    #[test]
    fn stray_close_fails() {
        let mut interner = Interner::new();
        assert!(parse_program(") oops", &mut interner).is_err());
    }
}
