//! Parser for textual policy rules.
//!
//! Supported syntax (keywords are case-insensitive):
//! - `[principals] can|cannot actions [resources] [when conditions]`
//! - Principals and resources: words or `"strings"` separated by `,` or `and`
//! - Actions: words separated by `,`
//! - Conditions: `attr = value`, `!=`, `<`, `>`, `<=`, `>=`, `attr in (a, b)`,
//!   combined with `and`, `or`, `not` and parentheses
//!
//! Condition values are typed through the attribute type table, so
//! `ip = 10.0.0.0/8` only parses when `10.0.0.0/8` is a valid CIDR.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};

use super::types::*;
use super::{RuleParser, RuleSyntaxError};

// ─── Tokens ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Comma,
    LParen,
    RParen,
    Eq, // =
    Ne, // !=
    Lt, // <
    Gt, // >
    Le, // <=
    Ge, // >=
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

const KEYWORDS: &[&str] = &["can", "cannot", "and", "or", "not", "when", "in"];

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, ',' | '(' | ')' | '=' | '<' | '>' | '!' | '"')
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => {
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '"' => {
                i += 1;
                let mut s = String::new();
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated string literal".into());
                }
                tokens.push(Token::Str(s));
                i += 1; // closing quote
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            c => return Err(format!("unexpected character `{c}`")),
        }
    }
    Ok(tokens)
}

// ─── Parser ─────────────────────────────────────────────────────────────

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    types: &'a HashMap<String, ValueType>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().map(|t| t.is_keyword(keyword)).unwrap_or(false)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// A word that is not a keyword, or a quoted string.
    fn item(&mut self, what: &str) -> Result<String, String> {
        match self.advance() {
            Some(Token::Word(w)) if !KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) => Ok(w),
            Some(Token::Str(s)) => Ok(s),
            other => Err(format!("expected {what}, found {}", describe(other.as_ref()))),
        }
    }

    /// rule = [list "can"|"cannot"] actions [list] ["when" or_expr]
    fn parse_rule(&mut self) -> Result<ParsedRule, String> {
        let mut principals = Vec::new();
        if !self.at_keyword("can") && !self.at_keyword("cannot") {
            principals = self.parse_list("principal")?;
        }

        let effect = if self.eat_keyword("can") {
            Effect::Allow
        } else if self.eat_keyword("cannot") {
            Effect::Deny
        } else {
            return Err(format!(
                "expected `can` or `cannot`, found {}",
                describe(self.peek())
            ));
        };

        let mut actions = vec![self.item("an action")?];
        while self.peek() == Some(&Token::Comma) {
            self.advance();
            actions.push(self.item("an action")?);
        }

        let mut resources = Vec::new();
        if self.peek().is_some() && !self.at_keyword("when") {
            resources = self.parse_list("resource")?;
        }

        let mut conditions = None;
        if self.eat_keyword("when") {
            conditions = Some(self.parse_or()?);
        }

        if let Some(tok) = self.peek() {
            return Err(format!("unexpected trailing token {}", describe(Some(tok))));
        }

        Ok(ParsedRule {
            principals,
            effect,
            actions,
            resources,
            conditions,
        })
    }

    /// list = item (("," | "and") item)*
    fn parse_list(&mut self, what: &str) -> Result<Vec<String>, String> {
        let mut items = vec![self.item(&format!("a {what}"))?];
        while self.peek() == Some(&Token::Comma) || self.at_keyword("and") {
            self.advance();
            items.push(self.item(&format!("a {what}"))?);
        }
        Ok(items)
    }

    /// or_expr = and_expr ("or" and_expr)*
    fn parse_or(&mut self) -> Result<Condition, String> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Condition::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// and_expr = unary ("and" unary)*
    fn parse_and(&mut self) -> Result<Condition, String> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("and") {
            let right = self.parse_unary()?;
            left = Condition::And {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// unary = "not" unary | primary
    fn parse_unary(&mut self) -> Result<Condition, String> {
        if self.eat_keyword("not") {
            let inner = self.parse_unary()?;
            return Ok(Condition::Not {
                inner: Box::new(inner),
            });
        }
        self.parse_primary()
    }

    /// primary = "(" or_expr ")" | attr op value | attr "in" "(" value ("," value)* ")"
    fn parse_primary(&mut self) -> Result<Condition, String> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let expr = self.parse_or()?;
            self.expect(Token::RParen, "closing parenthesis `)`")?;
            return Ok(expr);
        }

        let attribute = self.item("a condition attribute")?;

        if self.eat_keyword("in") {
            self.expect(Token::LParen, "`(` after `in`")?;
            let mut values = vec![self.value(&attribute)?];
            while self.peek() == Some(&Token::Comma) {
                self.advance();
                values.push(self.value(&attribute)?);
            }
            self.expect(Token::RParen, "closing parenthesis `)`")?;
            return Ok(Condition::In { attribute, values });
        }

        let comparison = match self.advance() {
            Some(Token::Eq) => Comparison::Eq,
            Some(Token::Ne) => Comparison::Ne,
            Some(Token::Lt) => Comparison::Lt,
            Some(Token::Gt) => Comparison::Gt,
            Some(Token::Le) => Comparison::Le,
            Some(Token::Ge) => Comparison::Ge,
            other => {
                return Err(format!(
                    "expected a comparison after `{attribute}`, found {}",
                    describe(other.as_ref())
                ))
            }
        };
        let value = self.value(&attribute)?;

        Ok(Condition::Compare {
            attribute,
            comparison,
            value,
        })
    }

    fn expect(&mut self, want: Token, what: &str) -> Result<(), String> {
        let found = self.advance();
        if found.as_ref() != Some(&want) {
            return Err(format!("expected {what}, found {}", describe(found.as_ref())));
        }
        Ok(())
    }

    fn value(&mut self, attribute: &str) -> Result<Literal, String> {
        let raw = match self.advance() {
            Some(Token::Word(w)) => w,
            Some(Token::Str(s)) => s,
            other => {
                return Err(format!(
                    "expected a value for `{attribute}`, found {}",
                    describe(other.as_ref())
                ))
            }
        };
        let ty = self
            .types
            .get(&attribute.to_ascii_lowercase())
            .copied()
            .unwrap_or(ValueType::String);
        typed_literal(attribute, &raw, ty)
    }
}

fn describe(tok: Option<&Token>) -> String {
    match tok {
        None => "end of rule".into(),
        Some(Token::Word(w)) => format!("`{w}`"),
        Some(Token::Str(s)) => format!("\"{s}\""),
        Some(other) => format!("{other:?}"),
    }
}

fn typed_literal(attribute: &str, raw: &str, ty: ValueType) -> Result<Literal, String> {
    match ty {
        ValueType::String => Ok(Literal::String(raw.to_string())),
        ValueType::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Literal::Number)
            .ok_or_else(|| format!("`{raw}` is not a number (attribute `{attribute}`)")),
        ValueType::Ip => parse_ip(raw)
            .map(|(addr, prefix)| Literal::Ip { addr, prefix })
            .ok_or_else(|| format!("`{raw}` is not an IP address or CIDR (attribute `{attribute}`)")),
        ValueType::Date => DateTime::parse_from_rfc3339(raw)
            .map(|d| Literal::Date(d.with_timezone(&Utc)))
            .map_err(|_| format!("`{raw}` is not an RFC 3339 date (attribute `{attribute}`)")),
        ValueType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Literal::Boolean(true)),
            "false" => Ok(Literal::Boolean(false)),
            _ => Err(format!("`{raw}` is not a boolean (attribute `{attribute}`)")),
        },
    }
}

fn parse_ip(raw: &str) -> Option<(IpAddr, u8)> {
    let (addr, prefix) = match raw.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (raw, None),
    };
    let addr: IpAddr = addr.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix {
        Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max)?,
        None => max,
    };
    Some((addr, prefix))
}

// ─── Public parser ──────────────────────────────────────────────────────

/// Deterministic rule parser configured with an attribute type table.
#[derive(Debug, Clone, Default)]
pub struct StatementParser {
    types: HashMap<String, ValueType>,
}

impl StatementParser {
    pub fn new(types: HashMap<String, ValueType>) -> Self {
        let types = types
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self { types }
    }
}

impl RuleParser for StatementParser {
    fn parse(&self, text: &str) -> Result<ParsedRule, RuleSyntaxError> {
        let fail = |reason: String| RuleSyntaxError {
            rule: text.to_string(),
            reason,
        };

        let tokens = tokenize(text).map_err(fail)?;
        if tokens.is_empty() {
            return Err(fail("empty rule".into()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            types: &self.types,
        };
        parser.parse_rule().map_err(fail)
    }
}
