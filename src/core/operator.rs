//! Condition operators and per-property operator sets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A comparison operator of the condition grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
}

impl Operator {
    /// All six operators, in bit order
    pub const ALL: [Operator; 6] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::LessThan,
        Operator::GreaterThan,
        Operator::LessOrEqual,
        Operator::GreaterOrEqual,
    ];

    /// The token used in condition strings
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
        }
    }

    /// Upper-case name as used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::LessThan => "LESS_THAN",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessOrEqual => "LESS_OR_EQUAL",
            Operator::GreaterOrEqual => "GREATER_OR_EQUAL",
        }
    }

    /// Parse an operator token (`=`, `!=`, `<`, `>`, `<=`, `>=`)
    pub fn from_symbol(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == token)
    }

    /// Whether this operator orders its operands
    pub fn is_ordering(self) -> bool {
        !matches!(self, Operator::Equals | Operator::NotEquals)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Accepts either the symbol or the upper-case name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::from_symbol(trimmed)
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|op| op.name().eq_ignore_ascii_case(trimmed))
            })
            .ok_or_else(|| format!("unknown operator '{}'", s))
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.symbol().to_string()
    }
}

/// A set of operators, stored as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorSet(u8);

impl OperatorSet {
    /// Every operator
    pub const ALL: OperatorSet = OperatorSet(0b11_1111);

    /// No operator at all
    pub const NONE: OperatorSet = OperatorSet(0);

    /// `=` and `!=`
    pub const EQUALITY: OperatorSet = OperatorSet(0b11);

    /// Build a set from a list of operators
    pub fn of(operators: &[Operator]) -> Self {
        OperatorSet(operators.iter().fold(0, |acc, op| acc | op.bit()))
    }

    pub fn contains(self, op: Operator) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn with(self, op: Operator) -> Self {
        OperatorSet(self.0 | op.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the members in bit order
    pub fn iter(self) -> impl Iterator<Item = Operator> {
        Operator::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl Default for OperatorSet {
    fn default() -> Self {
        OperatorSet::ALL
    }
}

impl FromIterator<Operator> for OperatorSet {
    fn from_iter<I: IntoIterator<Item = Operator>>(iter: I) -> Self {
        iter.into_iter().fold(OperatorSet::NONE, OperatorSet::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(Operator::from_symbol("=="), None);
        assert_eq!(Operator::from_symbol("!"), None);
    }

    #[test]
    fn test_from_str_accepts_names() {
        assert_eq!("not_equals".parse::<Operator>(), Ok(Operator::NotEquals));
        assert_eq!(">=".parse::<Operator>(), Ok(Operator::GreaterOrEqual));
        assert!("LIKE".parse::<Operator>().is_err());
    }

    #[test]
    fn test_ordering_operators() {
        assert!(!Operator::Equals.is_ordering());
        assert!(!Operator::NotEquals.is_ordering());
        assert!(Operator::LessOrEqual.is_ordering());
    }

    #[test]
    fn test_operator_set_membership() {
        let set = OperatorSet::of(&[Operator::Equals]);
        assert!(set.contains(Operator::Equals));
        assert!(!set.contains(Operator::GreaterThan));
        assert_eq!(OperatorSet::ALL.iter().count(), 6);
        assert_eq!(OperatorSet::EQUALITY.iter().collect::<Vec<_>>(), vec![
            Operator::Equals,
            Operator::NotEquals
        ]);
        assert!(OperatorSet::NONE.is_empty());
    }

    #[test]
    fn test_operator_serde_uses_symbols() {
        let json = serde_json::to_string(&Operator::LessOrEqual).expect("serialize");
        assert_eq!(json, "\"<=\"");
        let op: Operator = serde_json::from_str("\"GREATER_THAN\"").expect("deserialize");
        assert_eq!(op, Operator::GreaterThan);
    }
}
