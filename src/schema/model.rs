//! Program model types: locations, edit operators, ingredients and test sets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single source statement, identified by file and line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Source file path, relative to the source root.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file, self.line)
    }
}

/// Edit operator applicable at a modification point.
///
/// Operator names are matched case-insensitively when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Operator {
    /// Remove the statement.
    Delete,
    /// Replace the statement with an ingredient.
    Replace,
    /// Insert an ingredient before the statement.
    InsertBefore,
}

impl Operator {
    /// All operators, in their canonical order.
    pub const ALL: [Operator; 3] = [Operator::Delete, Operator::Replace, Operator::InsertBefore];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Replace => "Replace",
            Self::InsertBefore => "InsertBefore",
        }
    }

    /// Whether this operator consumes an ingredient.
    pub fn requires_ingredient(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown operator: {s}"))
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Candidate replacement or insertion statement drawn from elsewhere in the program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ingredient {
    /// Stable handle assigned by the model builder.
    pub id: u64,
    /// Statement source text.
    pub source: String,
}

/// An editable location with its allowed operators and ingredients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationPoint {
    pub location: Location,
    /// Source text of the statement at this location.
    #[serde(default)]
    pub statement: String,
    /// Suspiciousness, assigned from the suspicion map.
    #[serde(default)]
    pub suspiciousness: f64,
    /// Ordered candidate ingredients.
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    /// Allowed operators. Always contains `Delete` once normalized.
    #[serde(default = "default_operators")]
    pub operators: Vec<Operator>,
}

fn default_operators() -> Vec<Operator> {
    Operator::ALL.to_vec()
}

impl ModificationPoint {
    pub fn new(location: Location, statement: impl Into<String>) -> Self {
        Self {
            location,
            statement: statement.into(),
            suspiciousness: 0.0,
            ingredients: Vec::new(),
            operators: default_operators(),
        }
    }

    pub fn with_ingredients(mut self, ingredients: Vec<Ingredient>) -> Self {
        self.ingredients = ingredients;
        self
    }

    pub fn with_operators(mut self, operators: Vec<Operator>) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_suspiciousness(mut self, suspiciousness: f64) -> Self {
        self.suspiciousness = suspiciousness;
        self
    }

    /// Drop operators that need ingredients when there are none, remove
    /// duplicates, and force `Delete` into the operator set.
    pub fn normalize_operators(&mut self) {
        let has_ingredients = !self.ingredients.is_empty();
        let mut seen = BTreeSet::new();
        self.operators
            .retain(|op| (has_ingredients || !op.requires_ingredient()) && seen.insert(*op));
        if !self.operators.contains(&Operator::Delete) {
            self.operators.push(Operator::Delete);
        }
    }

    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    pub fn num_ingredients(&self) -> usize {
        self.ingredients.len()
    }
}

/// Disjoint positive (pre-repair passing) and negative (pre-repair failing) tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSets {
    pub positive: BTreeSet<String>,
    pub negative: BTreeSet<String>,
}

impl TestSets {
    pub fn new(positive: BTreeSet<String>, negative: BTreeSet<String>) -> Self {
        Self { positive, negative }
    }

    /// Tests that appear in both sets. Empty for a well-formed classification.
    pub fn overlap(&self) -> Vec<&String> {
        self.positive.intersection(&self.negative).collect()
    }

    /// Stable global ordering over positive ∪ negative tests.
    pub fn ordered(&self) -> Vec<String> {
        self.positive.union(&self.negative).cloned().collect()
    }

    pub fn total(&self) -> usize {
        self.positive.len() + self.negative.len()
    }
}
