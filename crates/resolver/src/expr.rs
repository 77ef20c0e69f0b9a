//! Constrained expression evaluation for `{{ ... }}` placeholders.
//!
//! Expressions are interpreted by a small hand-written lexer/parser over a
//! closed grammar: number/string/boolean/null literals, dot-path property
//! access rooted at the supplied namespace, unary minus, `+ - * / %`, and
//! parentheses. There are no function calls and no way to reach anything
//! outside the namespace value, so a placeholder can never touch process
//! environment, filesystem, or network state.

use lowdeck_error::{closest_match, ErrorCode, ErrorContext, LowdeckError, Result};
use serde_json::Value;

/// Evaluate `expression` (placeholder text with the braces stripped) against
/// `namespace`, the single object exposed to queries.
pub fn evaluate(expression: &str, namespace: &Value) -> Result<Value> {
    let tokens = tokenize(expression).map_err(|msg| syntax_error(expression, msg))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: expression,
        namespace,
    };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(syntax_error(
            expression,
            "Unexpected trailing input".to_string(),
        ));
    }
    Ok(value)
}

fn syntax_error(expression: &str, message: String) -> LowdeckError {
    LowdeckError::new(ErrorCode::ExpressionSyntax, message).with_context(ErrorContext::Expression {
        expression: expression.to_string(),
    })
}

fn type_error(expression: &str, message: String) -> LowdeckError {
    LowdeckError::new(ErrorCode::TypeMismatch, message).with_context(ErrorContext::Expression {
        expression: expression.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    if ch == '\\' {
                        match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some(other) => literal.push(other),
                            None => return Err("Unterminated escape sequence".to_string()),
                        }
                    } else {
                        literal.push(ch);
                    }
                }
                if !closed {
                    return Err("Unterminated string literal".to_string());
                }
                tokens.push(Token::Str(literal));
            }
            '0'..='9' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        // A dot followed by a non-digit is property access on a
                        // number literal, which the grammar does not allow.
                        if d == '.' && literal.contains('.') {
                            break;
                        }
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number: f64 = literal
                    .parse()
                    .map_err(|_| format!("Invalid number literal '{}'", literal))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '$' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("Unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
    namespace: &'a Value,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax_error(self.source, format!("Expected {}", what)))
        }
    }

    fn expression(&mut self) -> Result<Value> {
        let mut left = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    let right = self.term()?;
                    left = self.add(left, right)?;
                }
                Token::Minus => {
                    self.pos += 1;
                    let right = self.term()?;
                    let (a, b) = self.numeric_operands(&left, &right, "-")?;
                    left = number_value(a - b);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Value> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    let right = self.unary()?;
                    let (a, b) = self.numeric_operands(&left, &right, "*")?;
                    left = number_value(a * b);
                }
                Token::Slash => {
                    self.pos += 1;
                    let right = self.unary()?;
                    let (a, b) = self.numeric_operands(&left, &right, "/")?;
                    if b == 0.0 {
                        return Err(type_error(self.source, "Division by zero".to_string()));
                    }
                    left = number_value(a / b);
                }
                Token::Percent => {
                    self.pos += 1;
                    let right = self.unary()?;
                    let (a, b) = self.numeric_operands(&left, &right, "%")?;
                    if b == 0.0 {
                        return Err(type_error(self.source, "Division by zero".to_string()));
                    }
                    left = number_value(a % b);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let value = self.unary()?;
            let number = self.as_number(&value, "unary -")?;
            return Ok(number_value(-number));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(number_value(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(Token::RParen, "closing parenthesis")?;
                Ok(value)
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                _ => self.path(ident),
            },
            _ => Err(syntax_error(self.source, "Expected a value".to_string())),
        }
    }

    /// Resolve a dot path (`globals.environmentVariables.server.KEY`) against
    /// the namespace.
    fn path(&mut self, root: String) -> Result<Value> {
        let mut segments = vec![root];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.advance() {
                Some(Token::Ident(segment)) => segments.push(segment),
                _ => {
                    return Err(syntax_error(
                        self.source,
                        "Expected a property name after '.'".to_string(),
                    ))
                }
            }
        }

        let mut current = self.namespace;
        for segment in &segments {
            match current.get(segment.as_str()) {
                Some(next) => current = next,
                None => return Err(self.unknown_reference(segment, current)),
            }
        }
        Ok(current.clone())
    }

    fn unknown_reference(&self, segment: &str, scope: &Value) -> LowdeckError {
        let mut error = LowdeckError::new(
            ErrorCode::UnknownReference,
            format!("Unknown reference '{}'", segment),
        )
        .with_context(ErrorContext::Expression {
            expression: self.source.to_string(),
        });

        if let Some(object) = scope.as_object() {
            let available: Vec<String> = object.keys().cloned().collect();
            if let Some(closest) = closest_match(segment, &available) {
                error = error.with_hint(format!("Did you mean '{}'?", closest));
            }
        }
        error
    }

    fn add(&self, left: Value, right: Value) -> Result<Value> {
        // `+` concatenates as soon as either side is a string.
        if left.is_string() || right.is_string() {
            return Ok(Value::String(format!(
                "{}{}",
                display_fragment(&left),
                display_fragment(&right)
            )));
        }
        let (a, b) = self.numeric_operands(&left, &right, "+")?;
        Ok(number_value(a + b))
    }

    fn numeric_operands(&self, left: &Value, right: &Value, op: &str) -> Result<(f64, f64)> {
        Ok((self.as_number(left, op)?, self.as_number(right, op)?))
    }

    fn as_number(&self, value: &Value, op: &str) -> Result<f64> {
        value.as_f64().ok_or_else(|| {
            type_error(
                self.source,
                format!("Operator '{}' requires numeric operands", op),
            )
        })
    }
}

/// Render a value for string concatenation inside an expression.
fn display_fragment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Emit integers for whole results so `1+1` yields `2`, not `2.0`.
fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
