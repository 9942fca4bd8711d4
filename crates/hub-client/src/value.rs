use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically typed device attribute value.
///
/// The hub reports everything as loosely typed JSON; variant order matters
/// for deserialization so that integers are not eagerly widened to floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
	Bool(bool),
	Int(i64),
	Number(f64),
	Str(String),
	Null,
}

impl AttributeValue {
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Bool(_) => "bool",
			Self::Int(_) => "integer",
			Self::Number(_) => "number",
			Self::Str(_) => "string",
			Self::Null => "null",
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Int(i) => Some(*i as f64),
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Coerce this value to the type of `target`.
	///
	/// Used when ingesting device events: the raw value is reshaped to match
	/// the type of the value it will be compared against. Coercion failures
	/// fall back to the raw value, in which case the comparison itself may
	/// come up empty.
	pub fn coerce_to(&self, target: &Self) -> Self {
		if self.is_null() {
			return Self::Null;
		}
		match target {
			Self::Bool(_) => match self {
				Self::Bool(b) => Self::Bool(*b),
				Self::Str(s) => Self::Bool(matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on" | "active" | "open")),
				Self::Int(i) => Self::Bool(*i != 0),
				Self::Number(n) => Self::Bool(*n != 0.0),
				Self::Null => Self::Null,
			},
			Self::Int(_) => match self {
				Self::Int(i) => Self::Int(*i),
				Self::Number(n) => Self::Int(*n as i64),
				Self::Str(s) => s.trim().parse::<i64>().map_or_else(|_| self.clone(), Self::Int),
				Self::Bool(b) => Self::Int(i64::from(*b)),
				Self::Null => Self::Null,
			},
			Self::Number(_) => match self {
				Self::Int(i) => Self::Number(*i as f64),
				Self::Number(n) => Self::Number(*n),
				Self::Str(s) => s.trim().parse::<f64>().map_or_else(|_| self.clone(), Self::Number),
				Self::Bool(b) => Self::Number(f64::from(u8::from(*b))),
				Self::Null => Self::Null,
			},
			Self::Str(_) => Self::Str(self.to_string()),
			Self::Null => self.clone(),
		}
	}
}

impl fmt::Display for AttributeValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bool(b) => write!(f, "{b}"),
			Self::Int(i) => write!(f, "{i}"),
			Self::Number(n) => write!(f, "{n}"),
			Self::Str(s) => write!(f, "{s}"),
			Self::Null => write!(f, "null"),
		}
	}
}

impl PartialEq for AttributeValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Str(a), Self::Str(b)) => a == b,
			(Self::Null, Self::Null) => true,
			_ => match (self.as_f64(), other.as_f64()) {
				(Some(a), Some(b)) => a == b,
				_ => false,
			},
		}
	}
}

impl PartialOrd for AttributeValue {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		match (self, other) {
			(Self::Str(a), Self::Str(b)) => a.partial_cmp(b),
			(Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
			_ => match (self.as_f64(), other.as_f64()) {
				(Some(a), Some(b)) => a.partial_cmp(&b),
				_ => None,
			},
		}
	}
}

impl From<&str> for AttributeValue {
	fn from(s: &str) -> Self {
		Self::Str(s.to_string())
	}
}

impl From<i64> for AttributeValue {
	fn from(i: i64) -> Self {
		Self::Int(i)
	}
}

impl From<f64> for AttributeValue {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

impl From<bool> for AttributeValue {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}
