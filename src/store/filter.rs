//! Listing filters: equality terms, comparison conditions, ordering and paging.
//!
//! Records come back ordered by `order_by` when set, then by primary key. Both stores use
//! PostgreSQL's JSONB ordering: values of different JSON types rank
//! `null < string < number < boolean < array < object`; numbers compare numerically and strings
//! by text. Integer-keyed collections therefore list `2` before `10`, while string-keyed ones list
//! `"10"` before `"2"`. A document missing the ordered field sorts after every present value.

use crate::schema::value_eq;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// One `flt` term. A document missing the named field never matches.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Same-type comparison; a field of another JSON type does not match.
    Compare { field: String, op: CompareOp, value: Value },
    /// The string field matches the regular expression somewhere.
    Match { field: String, pattern: String },
    /// The array field has an element equal to `value`.
    Contains { field: String, value: Value },
    HasFields(Vec<String>),
}

impl Condition {
    /// Parse `flt` terms: one object or an array of them.
    ///
    /// `{"op": "<", "lhs": "count", "rhs": 3}`, `{"op": "match", "lhs": "name", "rhs": "^a"}`,
    /// `{"op": "contains", "lhs": "tags", "rhs": "x"}`, `{"op": "has_fields", "fields": ["a"]}`.
    /// A term without `op` is a set of field equalities, as is `{"op": "==", "args": {...}}`.
    pub fn parse_all(flt: &Value) -> Result<Vec<Condition>, String> {
        let terms = match flt {
            Value::Array(terms) => terms.as_slice(),
            single => std::slice::from_ref(single),
        };
        let mut out = Vec::new();
        for term in terms {
            let Value::Object(term) = term else {
                return Err("each filter term must be an object".into());
            };
            Condition::parse_term(term, &mut out)?;
        }
        Ok(out)
    }

    fn parse_term(term: &Map<String, Value>, out: &mut Vec<Condition>) -> Result<(), String> {
        let op = match term.get("op") {
            None => {
                out.extend(equalities(term));
                return Ok(());
            }
            Some(Value::String(op)) => op.as_str(),
            Some(_) => return Err("filter 'op' must be a string".into()),
        };
        let lhs = || match term.get("lhs") {
            Some(Value::String(field)) => Ok(field.clone()),
            _ => Err(format!("filter op '{}' needs a field name in 'lhs'", op)),
        };
        let rhs = || {
            term.get("rhs")
                .cloned()
                .ok_or_else(|| format!("filter op '{}' needs a value in 'rhs'", op))
        };
        match op {
            "==" if term.contains_key("args") => match term.get("args") {
                Some(Value::Object(args)) => out.extend(equalities(args)),
                _ => return Err("filter op '==' needs an object in 'args'".into()),
            },
            "match" => {
                let Value::String(pattern) = rhs()? else {
                    return Err("filter op 'match' needs a pattern string in 'rhs'".into());
                };
                Regex::new(&pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
                out.push(Condition::Match { field: lhs()?, pattern });
            }
            "contains" => out.push(Condition::Contains {
                field: lhs()?,
                value: rhs()?,
            }),
            "has_fields" => {
                let fields = term
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|fs| fs.iter().filter_map(|f| f.as_str().map(str::to_string)).collect::<Vec<_>>())
                    .filter(|fs| !fs.is_empty())
                    .ok_or("filter op 'has_fields' needs a list of names in 'fields'")?;
                out.push(Condition::HasFields(fields));
            }
            other => {
                let op = CompareOp::parse(other).ok_or_else(|| format!("unrecognized filter op '{}'", other))?;
                out.push(Condition::Compare {
                    field: lhs()?,
                    op,
                    value: rhs()?,
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Compare { field, op, value } => doc
                .get(field)
                .and_then(|v| same_type_cmp(v, value))
                .map(|ord| op.accepts(ord))
                .unwrap_or(false),
            Condition::Match { field, pattern } => match (doc.get(field), Regex::new(pattern)) {
                (Some(Value::String(s)), Ok(re)) => re.is_match(s),
                _ => false,
            },
            Condition::Contains { field, value } => match doc.get(field) {
                Some(Value::Array(items)) => items.iter().any(|item| value_eq(item, value)),
                _ => false,
            },
            Condition::HasFields(fields) => fields.iter().all(|f| doc.get(f).is_some()),
        }
    }
}

fn equalities(fields: &Map<String, Value>) -> impl Iterator<Item = Condition> + '_ {
    fields.iter().map(|(field, value)| Condition::Compare {
        field: field.clone(),
        op: CompareOp::Eq,
        value: value.clone(),
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    /// `field` ascends, `-field` descends.
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => OrderBy {
                field: field.to_string(),
                descending: true,
            },
            None => OrderBy {
                field: spec.to_string(),
                descending: false,
            },
        }
    }

    /// Compare two documents by this field; a missing field is greatest.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ord = match (a.get(&self.field), b.get(&self.field)) {
            (Some(x), Some(y)) => json_order(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// Equality terms, conditions, ordering and paging for one listing.
///
/// Every store returns records ordered by `order_by` when set, then by primary key in JSONB order:
/// integer keys numerically, string keys as text (`"10"` before `"2"`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub equals: Vec<(String, Value)>,
    pub conditions: Vec<Condition>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Filter {
    pub fn matches(&self, value: &Value) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| value.get(field).map(|v| value_eq(v, expected)).unwrap_or(false))
            && self.conditions.iter().all(|c| c.matches(value))
    }

    /// The same selection without ordering or paging.
    pub fn unpaged(&self) -> Filter {
        Filter {
            equals: self.equals.clone(),
            conditions: self.conditions.clone(),
            ..Filter::default()
        }
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_type_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    (type_rank(a) == type_rank(b)).then(|| json_order(a, b))
}

/// Total order over JSON values, ranked by type first.
pub fn json_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(a, b)| json_order(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
