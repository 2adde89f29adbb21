use indexmap::IndexMap;
use serde_json::{Number, Value};

/// Set of values a setting currently accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDomain {
    /// Any non-null value.
    Any,
    /// One of an enumerated list; the first entry is the fixup fallback.
    Options(Vec<Value>),
    /// A number within the inclusive range.
    Range { min: f64, max: f64 },
    /// Nothing is valid right now, for example because no ensemble is loaded.
    Unavailable(String),
}

impl ValueDomain {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueDomain::Any => !value.is_null(),
            ValueDomain::Options(options) => options.contains(value),
            ValueDomain::Range { min, max } => value.as_f64().is_some_and(|number| number >= *min && number <= *max),
            ValueDomain::Unavailable(_) => false,
        }
    }

    /// Deterministic repair used when a definition has no custom fixup.
    ///
    /// Keeps a valid current value, then tries the registered default, then the domain's own
    /// fallback (first option, clamped number, range minimum).
    pub fn default_fixup(&self, current: Option<&Value>, default: Option<&Value>) -> Option<Value> {
        if let Some(current) = current
            && self.accepts(current)
        {
            return Some(current.clone());
        }
        if let Some(default) = default
            && self.accepts(default)
        {
            return Some(default.clone());
        }
        match self {
            ValueDomain::Any | ValueDomain::Unavailable(_) => None,
            ValueDomain::Options(options) => options.first().cloned(),
            ValueDomain::Range { min, max } => {
                let clamped = current.and_then(Value::as_f64).map(|number| number.clamp(*min, *max)).unwrap_or(*min);
                Some(number_value(clamped))
            }
        }
    }

    /// Why no value could be produced, for the node's status message.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            ValueDomain::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Integral numbers stay integers so fetch keys do not change between `3` and `3.0`.
fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        return Value::from(number as i64);
    }
    Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

/// Values published by the embedder that domain functions may read.
///
/// Every effective change bumps the revision, which invalidates memoized domains.
#[derive(Debug, Clone, Default)]
pub struct GlobalContext {
    values: IndexMap<String, Value>,
    revision: u64,
}

impl GlobalContext {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns true when the stored value changed.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if self.values.get(&name) == Some(&value) {
            return false;
        }
        self.values.insert(name, value);
        self.revision += 1;
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if self.values.shift_remove(name).is_some() {
            self.revision += 1;
            return true;
        }
        false
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}
