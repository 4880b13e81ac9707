//! Expression parser.
//!
//! Converts lexer [`Token`]s into an [`Expr`] tree using precedence climbing.
//! A top-level `{{ }}` body, `if` condition, or `for` collection is parsed as
//! a [`Pipeline`]: a base expression followed by `| filter(args)` calls.
//!
//! | Precedence | Operators |
//! |---|---|
//! | 10 | `or` |
//! | 20 | `and` |
//! | 30 | unary `not` |
//! | 40 | `==` `!=` `<` `<=` `>` `>=` `in` `not in` `is` `is not` |
//! | 50 | `+` `-` |
//! | 60 | `*` `/` `//` `%` |
//! | 70 | `**` (right-associative) |

use ajinja_rs_core::error::JinjaError;

use crate::lexer::{tokenize, Operator, Token, TokenKind};
use crate::value::Value;

/// A prefix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal scalar.
    Literal(Value),
    /// A variable or function name.
    Identifier(String),
    /// `not x`, `-x`, `+x`.
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `left <op> right`. The operator is never [`Operator::Not`].
    Binary {
        op: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `object.name`
    Attribute { object: Box<Expr>, name: String },
    /// `object[key]`
    Subscript { object: Box<Expr>, key: Box<Expr> },
    /// `callee(args...)`
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `[a, b, ...]`
    List(Vec<Expr>),
    /// `{k: v, ...}`. Keys are stringified when the map is built.
    Dict(Vec<(Expr, Expr)>),
}

impl Expr {
    /// Returns `true` for an identifier optionally followed by attribute and
    /// subscript accesses, e.g. `user.address["city"]`.
    ///
    /// Only such paths take part in the undefined-variable rescue.
    pub fn is_variable_path(&self) -> bool {
        match self {
            Self::Identifier(_) => true,
            Self::Attribute { object, .. } | Self::Subscript { object, .. } => {
                object.is_variable_path()
            }
            _ => false,
        }
    }
}

/// A parsed filter call: `| name(args...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    /// The filter name (e.g., `default`, `join`).
    pub name: String,
    /// Argument expressions, evaluated before the filter is applied.
    pub args: Vec<Expr>,
}

/// A base expression and the filters applied to it, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub base: Expr,
    pub filters: Vec<FilterCall>,
}

/// Parses a bare expression (no filters) from tokens.
///
/// # Errors
///
/// Returns [`JinjaError::SyntaxError`] on an unexpected or missing token, or
/// on tokens left over after a complete expression.
pub fn parse(tokens: &[Token]) -> Result<Expr, JinjaError> {
    let mut state = ParserState::new(tokens);
    let expr = state.expression(0)?;
    state.expect_end()?;
    Ok(expr)
}

/// Lexes and parses a bare expression.
pub fn parse_expression(source: &str) -> Result<Expr, JinjaError> {
    parse(&tokenize(source)?)
}

/// Lexes and parses an expression with an optional filter chain.
///
/// An empty or whitespace-only source parses as a lookup of the variable
/// named `""`.
pub fn parse_pipeline(source: &str) -> Result<Pipeline, JinjaError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Ok(Pipeline {
            base: Expr::Identifier(String::new()),
            filters: Vec::new(),
        });
    }

    let mut state = ParserState::new(&tokens);
    let base = state.expression(0)?;
    let mut filters = Vec::new();
    while state.eat(TokenKind::Pipe) {
        filters.push(state.filter_call()?);
    }
    state.expect_end()?;
    Ok(Pipeline { base, filters })
}

const fn binary_precedence(op: Operator) -> Option<u8> {
    match op {
        Operator::Or => Some(10),
        Operator::And => Some(20),
        Operator::Eq
        | Operator::Ne
        | Operator::Lt
        | Operator::Le
        | Operator::Gt
        | Operator::Ge
        | Operator::In
        | Operator::NotIn
        | Operator::Is
        | Operator::IsNot => Some(40),
        Operator::Add | Operator::Sub => Some(50),
        Operator::Mul | Operator::Div | Operator::FloorDiv | Operator::Mod => Some(60),
        Operator::Pow => Some(70),
        Operator::Not => None,
    }
}

const NOT_PRECEDENCE: u8 = 30;
const SIGN_PRECEDENCE: u8 = 50;

struct ParserState<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ParserState<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'a Token, JinjaError> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(JinjaError::SyntaxError(format!(
                "expected {what} but found '{}' at position {}",
                token.text, token.position
            ))),
            None => Err(JinjaError::SyntaxError(format!(
                "expected {what} but reached end of expression"
            ))),
        }
    }

    fn expect_end(&self) -> Result<(), JinjaError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(JinjaError::SyntaxError(format!(
                "unexpected trailing token '{}' at position {}",
                token.text, token.position
            ))),
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr, JinjaError> {
        let mut left = self.unary()?;

        while let Some(TokenKind::Operator(op)) = self.peek_kind() {
            let Some(precedence) = binary_precedence(op) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;

            let next_min = if op == Operator::Pow {
                precedence
            } else {
                precedence + 1
            };
            let right = self.expression(next_min)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Prefix operators bind tighter than the binary operators of their own
    /// level, so `not a == b` is `not (a == b)` and `-a + b` is `(-a) + b`.
    fn unary(&mut self) -> Result<Expr, JinjaError> {
        let (op, precedence) = match self.peek_kind() {
            Some(TokenKind::Operator(Operator::Not)) => (UnaryOp::Not, NOT_PRECEDENCE),
            Some(TokenKind::Operator(Operator::Sub)) => (UnaryOp::Neg, SIGN_PRECEDENCE),
            Some(TokenKind::Operator(Operator::Add)) => (UnaryOp::Pos, SIGN_PRECEDENCE),
            _ => return self.postfix(),
        };
        self.pos += 1;
        if op == UnaryOp::Neg {
            if let Some(literal) = self.negated_min_int() {
                return Ok(literal);
            }
        }
        let operand = self.expression(precedence + 1)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Folds `-9223372036854775808` into a literal, since its magnitude alone
    /// does not fit in an `i64`. Left alone when followed by `**`.
    fn negated_min_int(&mut self) -> Option<Expr> {
        let token = self
            .peek()
            .filter(|t| t.kind == TokenKind::Int && t.text.parse::<i64>().is_err())?;
        let next = self.tokens.get(self.pos + 1).map(|t| t.kind);
        if next == Some(TokenKind::Operator(Operator::Pow)) {
            return None;
        }
        let value = format!("-{}", token.text).parse::<i64>().ok()?;
        self.pos += 1;
        Some(Expr::Literal(Value::Int(value)))
    }

    fn postfix(&mut self) -> Result<Expr, JinjaError> {
        let mut expr = self.primary()?;

        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let name = match self.advance() {
                        Some(t) if matches!(t.kind, TokenKind::Identifier | TokenKind::Int) => {
                            t.text.clone()
                        }
                        Some(t) => {
                            return Err(JinjaError::SyntaxError(format!(
                                "expected attribute name after '.' but found '{}' at position {}",
                                t.text, t.position
                            )))
                        }
                        None => {
                            return Err(JinjaError::SyntaxError(
                                "expected attribute name after '.'".to_string(),
                            ))
                        }
                    };
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    let key = self.expression(0)?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Subscript {
                        object: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Some(TokenKind::LParen) => {
                    self.pos += 1;
                    let args = self.sequence(TokenKind::RParen, "')'")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, JinjaError> {
        let Some(token) = self.advance() else {
            return Err(JinjaError::SyntaxError(
                "unexpected end of expression".to_string(),
            ));
        };

        let expr = match token.kind {
            TokenKind::Int => Expr::Literal(Value::Int(token.text.parse().map_err(|_| {
                JinjaError::SyntaxError(format!("invalid integer '{}'", token.text))
            })?)),
            TokenKind::Float => Expr::Literal(Value::Float(token.text.parse().map_err(|_| {
                JinjaError::SyntaxError(format!("invalid float '{}'", token.text))
            })?)),
            TokenKind::String => Expr::Literal(Value::String(token.text.clone())),
            TokenKind::True => Expr::Literal(Value::Bool(true)),
            TokenKind::False => Expr::Literal(Value::Bool(false)),
            TokenKind::None => Expr::Literal(Value::Null),
            TokenKind::Identifier => Expr::Identifier(token.text.clone()),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::LBracket => Expr::List(self.sequence(TokenKind::RBracket, "']'")?),
            TokenKind::LBrace => self.dict()?,
            _ => {
                return Err(JinjaError::SyntaxError(format!(
                    "unexpected token '{}' at position {}",
                    token.text, token.position
                )))
            }
        };
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`. A trailing comma is allowed.
    fn sequence(&mut self, close: TokenKind, what: &str) -> Result<Vec<Expr>, JinjaError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.expression(0)?);
            if !self.eat(TokenKind::Comma) {
                self.expect(close, what)?;
                return Ok(items);
            }
        }
    }

    fn dict(&mut self) -> Result<Expr, JinjaError> {
        let mut pairs = Vec::new();
        loop {
            if self.eat(TokenKind::RBrace) {
                return Ok(Expr::Dict(pairs));
            }
            let key = self.expression(0)?;
            self.expect(TokenKind::Colon, "':' after dict key")?;
            let value = self.expression(0)?;
            pairs.push((key, value));
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RBrace, "'}'")?;
                return Ok(Expr::Dict(pairs));
            }
        }
    }

    fn filter_call(&mut self) -> Result<FilterCall, JinjaError> {
        let name = self.expect(TokenKind::Identifier, "filter name after '|'")?;
        let args = if self.eat(TokenKind::LParen) {
            self.sequence(TokenKind::RParen, "')'")?
        } else {
            Vec::new()
        };
        Ok(FilterCall {
            name: name.text.clone(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_string())
    }

    fn int(i: i64) -> Expr {
        Expr::Literal(Value::Int(i))
    }

    fn binary(op: Operator, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expression("42").unwrap(), int(42));
        assert_eq!(
            parse_expression("2.5").unwrap(),
            Expr::Literal(Value::Float(2.5))
        );
        assert_eq!(
            parse_expression("'hi'").unwrap(),
            Expr::Literal(Value::from("hi"))
        );
        assert_eq!(
            parse_expression("True").unwrap(),
            Expr::Literal(Value::Bool(true))
        );
        assert_eq!(parse_expression("none").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(
            parse_expression("1 + 2 * 3").unwrap(),
            binary(Operator::Add, int(1), binary(Operator::Mul, int(2), int(3)))
        );
    }

    #[test]
    fn test_parentheses_reset_precedence() {
        assert_eq!(
            parse_expression("(1 + 2) * 3").unwrap(),
            binary(Operator::Mul, binary(Operator::Add, int(1), int(2)), int(3))
        );
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        assert_eq!(
            parse_expression("10 - 3 - 2").unwrap(),
            binary(Operator::Sub, binary(Operator::Sub, int(10), int(3)), int(2))
        );
    }

    #[test]
    fn test_power_is_right_associative() {
        assert_eq!(
            parse_expression("2 ** 3 ** 2").unwrap(),
            binary(Operator::Pow, int(2), binary(Operator::Pow, int(3), int(2)))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            parse_expression("a or b and c").unwrap(),
            binary(
                Operator::Or,
                ident("a"),
                binary(Operator::And, ident("b"), ident("c"))
            )
        );
    }

    #[test]
    fn test_not_wraps_comparison() {
        assert_eq!(
            parse_expression("not a == b").unwrap(),
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(binary(Operator::Eq, ident("a"), ident("b"))),
            }
        );
    }

    #[test]
    fn test_not_stops_at_and() {
        assert_eq!(
            parse_expression("not a and b").unwrap(),
            binary(
                Operator::And,
                Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(ident("a")),
                },
                ident("b")
            )
        );
    }

    #[test]
    fn test_negation_binds_to_operand() {
        assert_eq!(
            parse_expression("-a + b").unwrap(),
            binary(
                Operator::Add,
                Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(ident("a")),
                },
                ident("b")
            )
        );
    }

    #[test]
    fn test_negated_min_integer_literal() {
        assert_eq!(
            parse_expression("-9223372036854775808").unwrap(),
            int(i64::MIN)
        );
        assert_eq!(
            parse_expression("1 + -9223372036854775808").unwrap(),
            binary(Operator::Add, int(1), int(i64::MIN))
        );
        assert!(matches!(
            parse_expression("-9223372036854775808 ** 2"),
            Err(JinjaError::SyntaxError(_))
        ));
        assert!(matches!(
            parse_expression("9223372036854775808"),
            Err(JinjaError::LexError { .. })
        ));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_expression("a.b[0](x).c").unwrap();
        let expected = Expr::Attribute {
            object: Box::new(Expr::Call {
                callee: Box::new(Expr::Subscript {
                    object: Box::new(Expr::Attribute {
                        object: Box::new(ident("a")),
                        name: "b".into(),
                    }),
                    key: Box::new(int(0)),
                }),
                args: vec![ident("x")],
            }),
            name: "c".into(),
        };
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_numeric_attribute() {
        assert_eq!(
            parse_expression("items.0").unwrap(),
            Expr::Attribute {
                object: Box::new(ident("items")),
                name: "0".into(),
            }
        );
    }

    #[test]
    fn test_list_and_dict_literals() {
        assert_eq!(parse_expression("[]").unwrap(), Expr::List(vec![]));
        assert_eq!(parse_expression("{}").unwrap(), Expr::Dict(vec![]));
        assert_eq!(
            parse_expression("[1, 2,]").unwrap(),
            Expr::List(vec![int(1), int(2)])
        );
        assert_eq!(
            parse_expression("{'a': 1, 2: x}").unwrap(),
            Expr::Dict(vec![
                (Expr::Literal(Value::from("a")), int(1)),
                (int(2), ident("x")),
            ])
        );
    }

    #[test]
    fn test_membership_operators() {
        assert_eq!(
            parse_expression("x not in [1]").unwrap(),
            binary(Operator::NotIn, ident("x"), Expr::List(vec![int(1)]))
        );
        assert_eq!(
            parse_expression("x is not none").unwrap(),
            binary(Operator::IsNot, ident("x"), Expr::Literal(Value::Null))
        );
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "1 +",
            "(1 + 2",
            "[1, 2",
            "{'a' 1}",
            "{'a': 1",
            "a b",
            "f(1,",
            "a.",
            "a.(b)",
            ")",
            "*",
            "",
        ] {
            let result = parse_expression(source);
            assert!(
                matches!(result, Err(JinjaError::SyntaxError(_))),
                "expected syntax error for {source:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_lex_errors_propagate() {
        assert!(matches!(
            parse_expression("'open"),
            Err(JinjaError::LexError { .. })
        ));
    }

    #[test]
    fn test_pipeline_filters() {
        let pipeline = parse_pipeline("name | default('x') | upper").unwrap();
        assert_eq!(pipeline.base, ident("name"));
        assert_eq!(
            pipeline.filters,
            vec![
                FilterCall {
                    name: "default".into(),
                    args: vec![Expr::Literal(Value::from("x"))],
                },
                FilterCall {
                    name: "upper".into(),
                    args: vec![],
                },
            ]
        );
    }

    #[test]
    fn test_pipeline_binds_after_whole_expression() {
        let pipeline = parse_pipeline("a + b | string").unwrap();
        assert_eq!(pipeline.base, binary(Operator::Add, ident("a"), ident("b")));
        assert_eq!(pipeline.filters.len(), 1);
    }

    #[test]
    fn test_pipeline_empty_source() {
        let pipeline = parse_pipeline("   ").unwrap();
        assert_eq!(pipeline.base, ident(""));
        assert!(pipeline.filters.is_empty());
    }

    #[test]
    fn test_pipeline_errors() {
        assert!(parse_pipeline("x |").is_err());
        assert!(parse_pipeline("x | 'upper'").is_err());
        assert!(parse_pipeline("x | join(',' ").is_err());
        assert!(parse_pipeline("x | upper extra").is_err());
    }

    #[test]
    fn test_bare_parse_rejects_pipes() {
        assert!(parse_expression("x | upper").is_err());
    }

    #[test]
    fn test_is_variable_path() {
        assert!(parse_expression("a").unwrap().is_variable_path());
        assert!(parse_expression("a.b['c'][0]").unwrap().is_variable_path());
        assert!(!parse_expression("a.b()").unwrap().is_variable_path());
        assert!(!parse_expression("'s'.upper").unwrap().is_variable_path());
        assert!(!parse_expression("a + b").unwrap().is_variable_path());
    }
}
