#![forbid(unsafe_code)]

//! Condition expressions: one operator followed by a single-quoted literal,
//! or two such expressions joined by `||` / `&&`.
//!
//! The literal spans from the first quote to the last quote of the
//! expression, so embedded quotes are kept as literal content. Literals are
//! always returned as bind values; the rendered SQL carries placeholders only.

use smallvec::SmallVec;

use crate::types::{QueryError, Result};

use super::dialect::Dialect;

/// Longest accepted operator text (`not between`).
const MAX_OPERATOR_LEN: usize = 11;

/// Comparison operator of a simple condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>` or `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `like`
    Like,
    /// `not like`
    NotLike,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `between`
    Between,
    /// `not between`
    NotBetween,
    /// Prefix match.
    BeginOf,
}

impl Operator {
    /// Parses operator text, ignoring case and repeated whitespace.
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" => Operator::Eq,
            "<>" | "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "between" => Operator::Between,
            "not between" => Operator::NotBetween,
            "begin_of" => Operator::BeginOf,
            _ => return None,
        };
        Some(op)
    }

    fn sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "like",
            Operator::NotLike => "not like",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Between => "between",
            Operator::NotBetween => "not between",
            Operator::BeginOf => "begin_of",
        }
    }

    fn takes_range(self) -> bool {
        matches!(self, Operator::Between | Operator::NotBetween)
    }
}

/// Boolean connective of a compound condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// `||`
    Or,
    /// `&&`
    And,
}

impl Connective {
    /// SQL keyword.
    pub fn sql(self) -> &'static str {
        match self {
            Connective::Or => "OR",
            Connective::And => "AND",
        }
    }
}

/// One operator with its literal(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCondition {
    /// Operator.
    pub operator: Operator,
    /// One literal, or two for `between`.
    pub literals: SmallVec<[String; 2]>,
    /// Compare the column as a decimal (`n<`, `n>`, `n=` prefix).
    pub numeric: bool,
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCondition {
    /// Single operator and literal.
    Simple(SimpleCondition),
    /// Two simple conditions on the same column.
    Compound {
        /// How the parts are combined.
        connective: Connective,
        /// Part before the connective.
        left: SimpleCondition,
        /// Part after the connective.
        right: SimpleCondition,
    },
}

/// SQL fragment with its bind values in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// SQL text containing `?` placeholders.
    pub sql: String,
    /// Values for the placeholders.
    pub binds: Vec<String>,
}

/// Parses a condition expression.
pub fn parse_condition(expression: &str) -> Result<ParsedCondition> {
    match split_compound(expression) {
        None => Ok(ParsedCondition::Simple(parse_simple(expression)?)),
        Some((connective, left, right)) => {
            if split_compound(left).is_some() || split_compound(right).is_some() {
                return Err(QueryError::condition(
                    expression,
                    "nested compound conditions are not supported",
                ));
            }
            Ok(ParsedCondition::Compound {
                connective,
                left: parse_simple(left)?,
                right: parse_simple(right)?,
            })
        }
    }
}

/// Splits on the first `||` that joins two conditions, or failing that the
/// first such `&&`. A connective only joins conditions when a closing quote
/// precedes it and an operator with an opening quote follows it, so quotes
/// and connectives inside a literal are content.
fn split_compound(expression: &str) -> Option<(Connective, &str, &str)> {
    let (connective, at) = match find_connective(expression, "||") {
        Some(at) => (Connective::Or, at),
        None => (Connective::And, find_connective(expression, "&&")?),
    };
    Some((connective, &expression[..at], &expression[at + 2..]))
}

fn find_connective(text: &str, needle: &str) -> Option<usize> {
    text.match_indices(needle).map(|(at, _)| at).find(|&at| {
        text[..at].trim_end().ends_with('\'') && starts_with_operator(&text[at + needle.len()..])
    })
}

fn starts_with_operator(text: &str) -> bool {
    let (_, text) = strip_numeric_prefix(text.trim_start());
    match text.find('\'') {
        Some(quote) => Operator::parse(&text[..quote]).is_some(),
        None => false,
    }
}

/// Parses one operator and its quoted literal.
pub fn parse_simple(expression: &str) -> Result<SimpleCondition> {
    let text = expression.trim_start();
    let (numeric, text) = strip_numeric_prefix(text);
    let first = text
        .find('\'')
        .ok_or_else(|| QueryError::condition(expression, "missing quoted literal"))?;
    let last = text
        .rfind('\'')
        .filter(|&last| last > first)
        .ok_or_else(|| QueryError::condition(expression, "unterminated literal"))?;
    if !text[last + 1..].trim().is_empty() {
        return Err(QueryError::condition(
            expression,
            "unexpected text after literal",
        ));
    }
    let op_text = text[..first].trim();
    if op_text.len() > MAX_OPERATOR_LEN {
        return Err(QueryError::condition(expression, "operator text too long"));
    }
    let operator = Operator::parse(op_text)
        .ok_or_else(|| QueryError::condition(expression, "unsupported operator"))?;
    let inner = &text[first + 1..last];
    let literals = if operator.takes_range() {
        let (low, high) = split_range(inner)
            .ok_or_else(|| QueryError::condition(expression, "between requires two literals"))?;
        SmallVec::from_iter([low.to_owned(), high.to_owned()])
    } else {
        SmallVec::from_iter([inner.to_owned()])
    };
    Ok(SimpleCondition {
        operator,
        literals,
        numeric,
    })
}

fn strip_numeric_prefix(text: &str) -> (bool, &str) {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('n'), Some('<' | '>' | '=')) => (true, &text[1..]),
        _ => (false, text),
    }
}

/// Splits `low' 'high` or `low' and 'high` (the content between the outer
/// quotes of a `between` condition).
fn split_range(inner: &str) -> Option<(&str, &str)> {
    for (at, _) in inner.match_indices('\'') {
        let rest = inner[at + 1..].trim_start();
        let rest = match rest.get(..3) {
            Some(word) if word.eq_ignore_ascii_case("and") => rest.get(3..).unwrap_or("").trim_start(),
            _ => rest,
        };
        if let Some(high) = rest.strip_prefix('\'') {
            return Some((&inner[..at], high));
        }
    }
    None
}

impl SimpleCondition {
    /// Renders the condition against `column` (a qualified column reference).
    /// Numeric conditions cast both the column and the placeholders.
    pub fn render(&self, column: &str, dialect: &Dialect) -> Fragment {
        let (column, ph) = if self.numeric {
            (format!("cast({column} as decimal)"), "cast(? as decimal)")
        } else {
            (column.to_owned(), "?")
        };
        let binds: Vec<String> = self.literals.iter().cloned().collect();
        let sql = match self.operator {
            Operator::BeginOf => {
                let len = &dialect.length_function;
                let literal = binds.first().cloned().unwrap_or_default();
                return Fragment {
                    sql: format!("substr({column},1,{len}(?))=? AND {len}({column})>0"),
                    binds: vec![literal.clone(), literal],
                };
            }
            Operator::In | Operator::NotIn => format!("{column} {} ({ph})", self.operator.sql()),
            Operator::Between | Operator::NotBetween => {
                format!("{column} {} {ph} and {ph}", self.operator.sql())
            }
            op => format!("{column} {} {ph}", op.sql()),
        };
        Fragment { sql, binds }
    }
}
