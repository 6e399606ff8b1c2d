use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::fmt;

/// Column types the loader knows how to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    BigInt,
    Integer,
    Float,
    Boolean,
    Date,
    Text,
}

impl SqlType {
    pub fn label(self) -> &'static str {
        match self {
            SqlType::BigInt => "bigint",
            SqlType::Integer => "integer",
            SqlType::Float => "float",
            SqlType::Boolean => "boolean",
            SqlType::Date => "date",
            SqlType::Text => "text",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A nullable cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
}

/// Date spellings seen in the exports, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Null, or an empty string (the CSV spelling of null).
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Text form used as a composite-key component. Mirrors what Postgres
    /// prints for `col::text`, so keys read back from a table line up with
    /// keys read from CSV.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) if s.is_empty() => None,
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }

    /// Coerce into the representation bound for `ty`. Missing values become
    /// `Null`; text is parsed. Returns `None` when the text does not parse.
    pub fn coerce(&self, ty: SqlType) -> Option<Value> {
        if self.is_missing() {
            return Some(Value::Null);
        }
        match (ty, self) {
            (SqlType::Text, Value::Text(s)) => Some(Value::Text(s.clone())),
            (SqlType::Text, other) => other.key_text().map(Value::Text),

            (SqlType::BigInt, Value::Int(i)) => Some(Value::Int(*i)),
            (SqlType::Integer, Value::Int(i)) => i32::try_from(*i).ok().map(|_| Value::Int(*i)),
            (SqlType::BigInt, Value::Text(s)) => parse_int(s).map(Value::Int),
            (SqlType::Integer, Value::Text(s)) => parse_int(s)
                .filter(|i| i32::try_from(*i).is_ok())
                .map(Value::Int),

            (SqlType::Float, Value::Float(f)) => Some(Value::Float(*f)),
            (SqlType::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (SqlType::Float, Value::Text(s)) => s.trim().parse::<f64>().ok().map(Value::Float),

            (SqlType::Boolean, Value::Bool(b)) => Some(Value::Bool(*b)),
            (SqlType::Boolean, Value::Text(s)) => parse_bool(s).map(Value::Bool),

            (SqlType::Date, Value::Date(d)) => Some(Value::Date(*d)),
            (SqlType::Date, Value::Text(s)) => parse_date(s).map(Value::Date),

            _ => None,
        }
    }

    /// Ordering used when ranking rows: nulls lowest, numbers numerically,
    /// everything else by its text form.
    pub fn rank_cmp(&self, other: &Value) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => return a.total_cmp(&b),
            (Some(_), None) if other.is_missing() => return Ordering::Greater,
            (None, Some(_)) if self.is_missing() => return Ordering::Less,
            _ => {}
        }
        match (self.key_text(), other.key_text()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_text() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    // exports written through a float column come out as `2000.0`
    let f = s.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "1.0" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "0.0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}
