//! Edge/branch condition evaluator: a small recursive-descent boolean
//! expression evaluator over a name/literal grammar, in the style of the
//! hand-owned small parsers elsewhere in this crate (`template::render`,
//! `parser::env::parse_dotenv`) rather than a pulled-in expression crate.
//!
//! Grammar (lowest to highest precedence):
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( "||" and_expr )*
//! and_expr   := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := primary ( ("==" | "!=" | "<" | "<=" | ">" | ">=") primary )?
//! primary    := "true" | "false" | "null" | number | string | path | "(" expr ")"
//! ```
//! `path` is a dotted identifier (`score`, `output.items.count`) resolved
//! against the bound context via [`crate::value::Value::get_path`].

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(format!("unterminated string literal in condition '{src}'"));
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number literal '{text}' in condition '{src}'"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(text),
                });
            }
            other => {
                return Err(format!("unexpected character '{other}' in condition '{src}'"));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: &Token) -> Result<(), String> {
        if self.peek() == Some(tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected {tok:?}, found {:?}", self.peek()))
        }
    }

    fn parse_expr(&mut self, ctx: &Value) -> Result<Value, String> {
        self.parse_or(ctx)
    }

    fn parse_or(&mut self, ctx: &Value) -> Result<Value, String> {
        let mut lhs = self.parse_and(ctx)?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and(ctx)?;
            lhs = Value::Bool(truthy(&lhs) || truthy(&rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self, ctx: &Value) -> Result<Value, String> {
        let mut lhs = self.parse_unary(ctx)?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_unary(ctx)?;
            lhs = Value::Bool(truthy(&lhs) && truthy(&rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, ctx: &Value) -> Result<Value, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let v = self.parse_unary(ctx)?;
            return Ok(Value::Bool(!truthy(&v)));
        }
        self.parse_comparison(ctx)
    }

    fn parse_comparison(&mut self, ctx: &Value) -> Result<Value, String> {
        let lhs = self.parse_primary(ctx)?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(Token::Eq),
            Some(Token::Ne) => Some(Token::Ne),
            Some(Token::Lt) => Some(Token::Lt),
            Some(Token::Le) => Some(Token::Le),
            Some(Token::Gt) => Some(Token::Gt),
            Some(Token::Ge) => Some(Token::Ge),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_primary(ctx)?;
        Ok(Value::Bool(compare(&op, &lhs, &rhs)?))
    }

    fn parse_primary(&mut self, ctx: &Value) -> Result<Value, String> {
        match self.advance().cloned() {
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Ident(name)) => Ok(ctx.get_path(&name).cloned().unwrap_or(Value::Null)),
            Some(Token::LParen) => {
                let v = self.parse_expr(ctx)?;
                self.expect(&Token::RParen)?;
                Ok(v)
            }
            other => Err(format!("unexpected token {other:?} while parsing condition")),
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => *n != 0.0,
        Value::Integer(i) => *i != 0,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Map(m) => !m.is_empty(),
    }
}

fn compare(op: &Token, lhs: &Value, rhs: &Value) -> Result<bool, String> {
    if matches!(op, Token::Eq | Token::Ne) {
        let eq = values_equal(lhs, rhs);
        return Ok(if matches!(op, Token::Eq) { eq } else { !eq });
    }

    let (Some(l), Some(r)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(format!(
            "ordering comparison requires numeric operands, got {lhs:?} and {rhs:?}"
        ));
    };
    Ok(match op {
        Token::Lt => l < r,
        Token::Le => l <= r,
        Token::Gt => l > r,
        Token::Ge => l >= r,
        _ => unreachable!(),
    })
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if let (Some(l), Some(r)) = (lhs.as_f64(), rhs.as_f64()) {
        return l == r;
    }
    lhs == rhs
}

/// Evaluate a condition expression against a bound context. Per spec.md
/// §4.3, edge conditions see `output` bound to the source node's output
/// plus all of that output's top-level fields also bound by name; the
/// caller is responsible for constructing `context` that way (see
/// `executor::condition_context`).
///
/// A parse or evaluation error is treated as `Ok(false)` by callers that
/// apply spec.md's "condition evaluation errors are treated as false"
/// rule; this function itself returns the error so callers can log it.
pub fn evaluate(expr: &str, context: &Value) -> Result<bool, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let result = parser.parse_expr(context)?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing tokens after parsing condition '{expr}'"));
    }
    Ok(truthy(&result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ctx(pairs: &[(&str, Value)]) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        Value::Map(m)
    }

    #[test]
    fn numeric_comparison() {
        let c = ctx(&[("score", Value::Integer(7))]);
        assert!(evaluate("score > 5", &c).unwrap());
        assert!(!evaluate("score > 10", &c).unwrap());
    }

    #[test]
    fn integer_and_number_compare_equal() {
        let c = ctx(&[("score", Value::Integer(5))]);
        assert!(evaluate("score == 5", &c).unwrap());
    }

    #[test]
    fn boolean_and_or() {
        let c = ctx(&[("a", Value::Bool(true)), ("b", Value::Bool(false))]);
        assert!(evaluate("a || b", &c).unwrap());
        assert!(!evaluate("a && b", &c).unwrap());
    }

    #[test]
    fn negation() {
        let c = ctx(&[("a", Value::Bool(false))]);
        assert!(evaluate("!a", &c).unwrap());
    }

    #[test]
    fn dotted_path_into_nested_output() {
        let mut inner = BTreeMap::new();
        inner.insert("count".to_string(), Value::Integer(3));
        let c = ctx(&[("output", Value::Map(inner))]);
        assert!(evaluate("output.count < 10", &c).unwrap());
    }

    #[test]
    fn string_equality() {
        let c = ctx(&[("status", Value::String("ok".into()))]);
        assert!(evaluate("status == \"ok\"", &c).unwrap());
        assert!(evaluate("status != 'failed'", &c).unwrap());
    }

    #[test]
    fn parenthesized_precedence() {
        let c = ctx(&[("a", Value::Bool(true)), ("b", Value::Bool(false)), ("c", Value::Bool(false))]);
        assert!(evaluate("a && (b || !c)", &c).unwrap());
    }

    #[test]
    fn missing_field_is_null_and_falsy() {
        let c = ctx(&[]);
        assert!(!evaluate("missing_field", &c).unwrap());
    }

    #[test]
    fn ordering_on_non_numeric_is_an_error() {
        let c = ctx(&[("status", Value::String("ok".into()))]);
        assert!(evaluate("status > 5", &c).is_err());
    }

    #[test]
    fn unterminated_string_is_a_parse_error() {
        let c = ctx(&[]);
        assert!(evaluate("x == \"unterminated", &c).is_err());
    }
}
