//! Typed filter and ordering expressions.
//!
//! Predicates are plain data: they can be built on any thread, serialized,
//! compared in tests and compiled without touching the store.

use serde::{Deserialize, Serialize};

/// Literal compared against an entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<V: Into<FieldValue>> From<Option<V>> for FieldValue {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatch {
    Contains,
    BeginsWith,
    EndsWith,
}

/// Boolean expression evaluated against each candidate entity.
///
/// `Eq`/`Ne` are null-safe: comparing a missing field with `FieldValue::Null`
/// matches, comparing it with anything else does not.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Predicate {
    /// Matches every entity.
    #[default]
    True,
    Compare {
        field: String,
        op: Comparison,
        value: FieldValue,
    },
    Text {
        field: String,
        op: TextMatch,
        needle: String,
        /// ASCII-only case folding.
        case_insensitive: bool,
    },
    And {
        all: Vec<Predicate>,
    },
    Or {
        any: Vec<Predicate>,
    },
    Not {
        inner: Box<Predicate>,
    },
}

impl Predicate {
    /// Starts a condition on one field path.
    pub fn field(path: impl Into<String>) -> Field {
        Field(path.into())
    }

    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::And {
            all: predicates.into_iter().collect(),
        }
    }

    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Or {
            any: predicates.into_iter().collect(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::True => other,
            Self::And { mut all } => {
                all.push(other);
                Self::And { all }
            }
            first => Self::And {
                all: vec![first, other],
            },
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or { mut any } => {
                any.push(other);
                Self::Or { any }
            }
            first => Self::Or {
                any: vec![first, other],
            },
        }
    }

    pub fn negate(self) -> Self {
        Self::Not {
            inner: Box::new(self),
        }
    }

    /// Calls `visit` with every field path referenced by this predicate.
    pub fn for_each_field<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Self::True => {}
            Self::Compare { field, .. } | Self::Text { field, .. } => visit(field),
            Self::And { all: parts } | Self::Or { any: parts } => {
                for part in parts {
                    part.for_each_field(visit);
                }
            }
            Self::Not { inner } => inner.for_each_field(visit),
        }
    }
}

/// Builder returned by [`Predicate::field`].
#[derive(Debug, Clone)]
pub struct Field(String);

impl Field {
    pub fn eq(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(Comparison::Eq, value)
    }

    pub fn ne(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(Comparison::Ne, value)
    }

    pub fn lt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(Comparison::Lt, value)
    }

    pub fn le(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(Comparison::Le, value)
    }

    pub fn gt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(Comparison::Gt, value)
    }

    pub fn ge(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(Comparison::Ge, value)
    }

    pub fn is_null(self) -> Predicate {
        self.compare(Comparison::Eq, FieldValue::Null)
    }

    pub fn is_not_null(self) -> Predicate {
        self.compare(Comparison::Ne, FieldValue::Null)
    }

    pub fn contains(self, needle: impl Into<String>) -> Predicate {
        self.text(TextMatch::Contains, needle, false)
    }

    pub fn contains_ignore_case(self, needle: impl Into<String>) -> Predicate {
        self.text(TextMatch::Contains, needle, true)
    }

    pub fn begins_with(self, needle: impl Into<String>) -> Predicate {
        self.text(TextMatch::BeginsWith, needle, false)
    }

    pub fn ends_with(self, needle: impl Into<String>) -> Predicate {
        self.text(TextMatch::EndsWith, needle, false)
    }

    fn compare(self, op: Comparison, value: impl Into<FieldValue>) -> Predicate {
        Predicate::Compare {
            field: self.0,
            op,
            value: value.into(),
        }
    }

    fn text(self, op: TextMatch, needle: impl Into<String>, case_insensitive: bool) -> Predicate {
        Predicate::Text {
            field: self.0,
            op,
            needle: needle.into(),
            case_insensitive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One ordering directive. Directives apply in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub field: String,
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}
