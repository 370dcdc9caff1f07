//! The filter expression language: conditions joined by AND/OR with no
//! operator precedence, plus an independent time window.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::resolver::RuleLabelResolver;

/// Pseudo-field name that resolves through the rule-label resolver
/// instead of [`Record::fields`].
pub const LABEL_PSEUDO_FIELD: &str = "__label__";

/// Field name given the interface OR-fold treatment (§4.5): a condition
/// on this field matches if either the physical name or the resolved
/// display name satisfies the operator.
const INTERFACE_FIELD: &str = "interface";
const INTERFACE_DISPLAY_FIELD: &str = "interface_display";

/// A single field/operator/value test.
#[derive(Debug)]
pub struct Condition {
    field: String,
    op: Operator,
    value: String,
    case_sensitive: bool,
    negate: bool,
    compiled_regex: OnceCell<Regex>,
}

/// Comparison operators available to a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Neq,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// AND/OR connective joining two adjacent conditions. There is no
/// precedence between them; evaluation is strictly left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
}

/// An inclusive instant range; a record outside `[start, end]` (either
/// bound optional) is rejected before any condition is evaluated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    fn contains(&self, instant: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if instant < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if instant > end {
                return false;
            }
        }
        true
    }
}

/// A compiled filter expression: an ordered list of conditions joined by
/// connectives, plus an optional time window evaluated first.
#[derive(Debug)]
pub struct Predicate {
    conditions: Vec<Condition>,
    connectives: Vec<Connective>,
    time_window: Option<TimeWindow>,
}

/// The serializable value representation of a single [`Condition`] (§9:
/// "Serializable predicate for worker dispatch"). Unlike `Condition`
/// itself, this carries no compiled regex, so it derives `Serialize`/
/// `Deserialize` directly and is cheap to clone across thread or process
/// boundaries; [`Predicate::compile`] turns it into a runtime `Condition`,
/// compiling and memoizing any regex exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub field: String,
    pub op: Operator,
    pub value: String,
    pub case_sensitive: bool,
    #[serde(default)]
    pub negate: bool,
}

/// The serializable value representation of a whole [`Predicate`]: the
/// condition specs, the connective vector, and the optional time window.
/// A host (or a future out-of-process worker) can serialize one of these
/// to JSON and hand it to [`Predicate::compile`] without ever touching a
/// compiled `regex::Regex`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub connectives: Vec<Connective>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

impl Condition {
    /// Builds a condition, compiling its regex eagerly if `op` is
    /// [`Operator::Regex`] so malformed patterns fail at construction
    /// time rather than during evaluation.
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<String>, case_sensitive: bool) -> Result<Self> {
        Self::with_negation(field, op, value, case_sensitive, false)
    }

    pub fn with_negation(
        field: impl Into<String>,
        op: Operator,
        value: impl Into<String>,
        case_sensitive: bool,
        negate: bool,
    ) -> Result<Self> {
        let field = field.into();
        let value = value.into();
        let condition = Condition {
            field: field.clone(),
            op,
            value,
            case_sensitive,
            negate,
            compiled_regex: OnceCell::new(),
        };
        if op == Operator::Regex {
            condition.regex().map_err(|reason| StoreError::PredicateCompile { field, reason })?;
        }
        Ok(condition)
    }

    fn regex(&self) -> std::result::Result<&Regex, String> {
        self.compiled_regex
            .get_or_try_init(|| {
                RegexBuilder::new(&self.value)
                    .case_insensitive(!self.case_sensitive)
                    .build()
                    .map_err(|e| e.to_string())
            })
    }

    /// Evaluates this condition against `record`, applying the interface
    /// OR-fold and `__label__` pseudo-field resolution, then the
    /// condition's own negation flag.
    fn evaluate(&self, record: &Record, rule_label_resolver: Option<&dyn RuleLabelResolver>) -> bool {
        let raw = if self.field == INTERFACE_FIELD {
            let physical = record.field(INTERFACE_FIELD);
            let display = record.field(INTERFACE_DISPLAY_FIELD);
            self.matches_value(physical) || self.matches_value(display)
        } else if self.field == LABEL_PSEUDO_FIELD {
            let rid = record.field("rid");
            let label = rule_label_resolver
                .and_then(|r| r.resolve(rid))
                .unwrap_or_default();
            self.matches_value(&label)
        } else {
            self.matches_value(record.field(&self.field))
        };
        raw ^ self.negate
    }

    fn matches_value(&self, field_value: &str) -> bool {
        match self.op {
            Operator::Eq => self.compare_strings(field_value, |a, b| a == b),
            Operator::Neq => self.compare_strings(field_value, |a, b| a != b),
            Operator::Contains => self.compare_strings(field_value, |a, b| a.contains(b)),
            Operator::StartsWith => self.compare_strings(field_value, |a, b| a.starts_with(b)),
            Operator::EndsWith => self.compare_strings(field_value, |a, b| a.ends_with(b)),
            Operator::Regex => self
                .regex()
                .map(|re| re.is_match(field_value))
                .unwrap_or(false),
            Operator::Gt => self.compare_numeric(field_value, |a, b| a > b),
            Operator::Lt => self.compare_numeric(field_value, |a, b| a < b),
            Operator::Gte => self.compare_numeric(field_value, |a, b| a >= b),
            Operator::Lte => self.compare_numeric(field_value, |a, b| a <= b),
        }
    }

    fn compare_strings(&self, field_value: &str, f: impl Fn(&str, &str) -> bool) -> bool {
        if self.case_sensitive {
            f(field_value, &self.value)
        } else {
            f(&field_value.to_lowercase(), &self.value.to_lowercase())
        }
    }

    fn compare_numeric(&self, field_value: &str, f: impl Fn(f64, f64) -> bool) -> bool {
        match (field_value.parse::<f64>(), self.value.parse::<f64>()) {
            (Ok(a), Ok(b)) => f(a, b),
            _ => false,
        }
    }
}

impl Predicate {
    /// Builds a predicate from parallel `conditions`/`connectives` lists.
    /// `connectives.len()` must equal `conditions.len().saturating_sub(1)`.
    pub fn new(conditions: Vec<Condition>, connectives: Vec<Connective>, time_window: Option<TimeWindow>) -> Self {
        debug_assert_eq!(connectives.len(), conditions.len().saturating_sub(1));
        Predicate { conditions, connectives, time_window }
    }

    /// A predicate with no conditions and no time window; every record matches.
    pub fn match_all() -> Self {
        Predicate { conditions: Vec::new(), connectives: Vec::new(), time_window: None }
    }

    /// Compiles a wire-format [`PredicateSpec`] into a runtime `Predicate`,
    /// eagerly compiling (and memoizing) every regex condition so a
    /// malformed pattern is rejected here rather than during evaluation.
    pub fn compile(spec: PredicateSpec) -> Result<Self> {
        let conditions = spec
            .conditions
            .into_iter()
            .map(|c| Condition::with_negation(c.field, c.op, c.value, c.case_sensitive, c.negate))
            .collect::<Result<Vec<_>>>()?;
        Ok(Predicate::new(conditions, spec.connectives, spec.time_window))
    }

    /// Evaluates the time window (if any) then the condition chain,
    /// strictly left to right with short-circuit AND/OR and no operator
    /// precedence, exactly as specified.
    pub fn matches(&self, record: &Record, rule_label_resolver: Option<&dyn RuleLabelResolver>) -> bool {
        if let Some(window) = &self.time_window {
            if !window.contains(record.timestamp.instant()) {
                return false;
            }
        }

        if self.conditions.is_empty() {
            return true;
        }

        let mut result = self.conditions[0].evaluate(record, rule_label_resolver);
        for (i, connective) in self.connectives.iter().enumerate() {
            match connective {
                Connective::And if !result => return false,
                Connective::Or if result => return true,
                _ => {
                    let next = self.conditions[i + 1].evaluate(record, rule_label_resolver);
                    result = match connective {
                        Connective::And => result && next,
                        Connective::Or => result || next,
                    };
                }
            }
        }
        result
    }
}
