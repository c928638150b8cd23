//! Typed strategy parameters with display metadata and constraints.
//!
//! A bundle declares its parameters as [`Parameter<T>`] values collected in a
//! [`ParameterSet`]. Config overrides are applied before start and validated
//! there; any violation is `InvalidConfig`.

use std::collections::HashMap;
use std::fmt;

use common::{Error, Result, Timeframe};
use serde::{Deserialize, Serialize};

/// Runtime representation of a parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timeframe(Timeframe),
    Securities(Vec<String>),
}

impl ParamValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "number",
            ParamValue::Bool(_) => "bool",
            ParamValue::Text(_) => "string",
            ParamValue::Timeframe(_) => "timeframe",
            ParamValue::Securities(_) => "security list",
        }
    }

    /// Convert a TOML override into the same kind as `self`.
    fn coerce(&self, raw: &toml::Value) -> Option<ParamValue> {
        Some(match (self, raw) {
            (ParamValue::Int(_), toml::Value::Integer(v)) => ParamValue::Int(*v),
            (ParamValue::Float(_), toml::Value::Float(v)) => ParamValue::Float(*v),
            (ParamValue::Float(_), toml::Value::Integer(v)) => ParamValue::Float(*v as f64),
            (ParamValue::Bool(_), toml::Value::Boolean(v)) => ParamValue::Bool(*v),
            (ParamValue::Text(_), toml::Value::String(v)) => ParamValue::Text(v.clone()),
            (ParamValue::Timeframe(_), toml::Value::String(v)) => {
                ParamValue::Timeframe(v.parse().ok()?)
            }
            (ParamValue::Securities(_), toml::Value::Array(items)) => ParamValue::Securities(
                items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()?,
            ),
            _ => return None,
        })
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
            ParamValue::Timeframe(v) => write!(f, "{v}"),
            ParamValue::Securities(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

/// Rust types that can be stored as a [`ParamValue`].
pub trait ParamType: Sized {
    fn into_value(self) -> ParamValue;
    fn from_value(value: &ParamValue) -> Option<Self>;
}

impl ParamType for i64 {
    fn into_value(self) -> ParamValue {
        ParamValue::Int(self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl ParamType for usize {
    fn into_value(self) -> ParamValue {
        ParamValue::Int(self as i64)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl ParamType for u32 {
    fn into_value(self) -> ParamValue {
        ParamValue::Int(i64::from(self))
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl ParamType for f64 {
    fn into_value(self) -> ParamValue {
        ParamValue::Float(self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        value.as_number()
    }
}

impl ParamType for bool {
    fn into_value(self) -> ParamValue {
        ParamValue::Bool(self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl ParamType for String {
    fn into_value(self) -> ParamValue {
        ParamValue::Text(self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ParamType for Timeframe {
    fn into_value(self) -> ParamValue {
        ParamValue::Timeframe(self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Timeframe(v) => Some(*v),
            _ => None,
        }
    }
}

impl ParamType for Vec<String> {
    fn into_value(self) -> ParamValue {
        ParamValue::Securities(self)
    }
    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Securities(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Optimisation sweep for a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizeRange {
    pub from: f64,
    pub to: f64,
    pub step: f64,
}

/// Display metadata for parameter UIs and optimisers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamMeta {
    pub display_name: String,
    pub description: String,
    pub group: String,
    pub optimize: Option<OptimizeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// Strictly greater than zero.
    Positive,
    /// Inclusive bounds.
    Range { min: f64, max: f64 },
}

impl Constraint {
    fn check(&self, name: &str, value: &ParamValue) -> Result<()> {
        let Some(v) = value.as_number() else {
            return Ok(());
        };
        let ok = match *self {
            Constraint::Positive => v > 0.0,
            Constraint::Range { min, max } => v >= min && v <= max,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::invalid_config(format!(
                "parameter '{name}' = {value} violates {self:?}"
            )))
        }
    }
}

/// A named, typed parameter. Consumed by [`ParameterSet::add`].
#[derive(Debug, Clone)]
pub struct Parameter<T> {
    name: String,
    value: T,
    meta: ParamMeta,
    constraint: Option<Constraint>,
}

impl<T: ParamType> Parameter<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        let name = name.into();
        Self {
            meta: ParamMeta {
                display_name: name.clone(),
                ..ParamMeta::default()
            },
            name,
            value,
            constraint: None,
        }
    }

    pub fn display(mut self, display_name: &str, description: &str, group: &str) -> Self {
        self.meta.display_name = display_name.to_string();
        self.meta.description = description.to_string();
        self.meta.group = group.to_string();
        self
    }

    pub fn optimize(mut self, from: f64, to: f64, step: f64) -> Self {
        self.meta.optimize = Some(OptimizeRange { from, to, step });
        self
    }

    pub fn positive(mut self) -> Self {
        self.constraint = Some(Constraint::Positive);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Some(Constraint::Range { min, max });
        self
    }
}

/// One stored parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub name: String,
    pub value: ParamValue,
    pub meta: ParamMeta,
    pub constraint: Option<Constraint>,
}

/// Ordered parameter collection of one strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<ParamEntry>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. A second parameter with the same name replaces the first.
    pub fn add<T: ParamType>(mut self, param: Parameter<T>) -> Self {
        let entry = ParamEntry {
            name: param.name,
            value: param.value.into_value(),
            meta: param.meta,
            constraint: param.constraint,
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Merge another set in; used to append the common "volume"/"candle_type" block.
    pub fn extend(mut self, other: ParameterSet) -> Self {
        for entry in other.entries {
            match self.entries.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => *existing = entry,
                None => self.entries.push(entry),
            }
        }
        self
    }

    pub fn get<T: ParamType>(&self, name: &str) -> Result<T> {
        let entry = self.entry(name)?;
        T::from_value(&entry.value).ok_or_else(|| {
            Error::invalid_config(format!(
                "parameter '{name}' = {} cannot be read as {}",
                entry.value,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn set<T: ParamType>(&mut self, name: &str, value: T) -> Result<()> {
        let entry = self.entry_mut(name)?;
        let value = value.into_value();
        if std::mem::discriminant(&value) != std::mem::discriminant(&entry.value) {
            return Err(Error::invalid_config(format!(
                "parameter '{name}' expects {}, got {}",
                entry.value.kind(),
                value.kind()
            )));
        }
        entry.value = value;
        Ok(())
    }

    /// Apply a `name → value` override map from the config file.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, toml::Value>) -> Result<()> {
        // Sorted so the first reported error is stable.
        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        for key in keys {
            let raw = &overrides[key];
            let entry = self.entry_mut(key)?;
            let value = entry.value.coerce(raw).ok_or_else(|| {
                Error::invalid_config(format!(
                    "parameter '{key}' expects {}, got {raw}",
                    entry.value.kind()
                ))
            })?;
            entry.value = value;
        }
        Ok(())
    }

    /// Check every constraint.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            if let Some(c) = &entry.constraint {
                c.check(&entry.name, &entry.value)?;
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    fn entry(&self, name: &str) -> Result<&ParamEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::invalid_config(format!("unknown parameter '{name}'")))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut ParamEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::invalid_config(format!("unknown parameter '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParameterSet {
        ParameterSet::new()
            .add(
                Parameter::new("rsi_period", 14usize)
                    .display("RSI Period", "Lookback of the RSI", "Indicators")
                    .optimize(5.0, 30.0, 1.0)
                    .positive(),
            )
            .add(Parameter::new("oversold", 30.0).range(0.0, 100.0))
            .add(Parameter::new("allow_short", true))
            .add(Parameter::new("candle_type", Timeframe::minutes(5)))
    }

    #[test]
    fn typed_get() {
        let p = sample();
        assert_eq!(p.get::<usize>("rsi_period").unwrap(), 14);
        assert_eq!(p.get::<f64>("oversold").unwrap(), 30.0);
        assert!(p.get::<bool>("allow_short").unwrap());
        assert_eq!(p.get::<Timeframe>("candle_type").unwrap(), Timeframe::minutes(5));
        assert!(matches!(p.get::<bool>("missing"), Err(Error::InvalidConfig(_))));
        assert!(p.get::<bool>("oversold").is_err());
    }

    #[test]
    fn overrides_coerce_to_declared_kind() {
        let mut p = sample();
        let overrides: HashMap<String, toml::Value> = toml::from_str(
            r#"
            rsi_period = 21
            oversold = 25
            candle_type = "1h"
            "#,
        )
        .unwrap();
        p.apply_overrides(&overrides).unwrap();
        assert_eq!(p.get::<usize>("rsi_period").unwrap(), 21);
        assert_eq!(p.get::<f64>("oversold").unwrap(), 25.0);
        assert_eq!(p.get::<Timeframe>("candle_type").unwrap(), Timeframe::hours(1));
    }

    #[test]
    fn unknown_or_mistyped_override_is_invalid_config() {
        let mut p = sample();
        let mut overrides = HashMap::new();
        overrides.insert("nope".to_string(), toml::Value::Integer(1));
        assert!(matches!(p.apply_overrides(&overrides), Err(Error::InvalidConfig(_))));

        let mut overrides = HashMap::new();
        overrides.insert("rsi_period".to_string(), toml::Value::String("x".into()));
        assert!(p.apply_overrides(&overrides).is_err());
    }

    #[test]
    fn constraints_checked_by_validate() {
        let mut p = sample();
        p.validate().unwrap();
        p.set("oversold", 120.0).unwrap();
        assert!(matches!(p.validate(), Err(Error::InvalidConfig(_))));

        let mut p = sample();
        let mut overrides = HashMap::new();
        overrides.insert("rsi_period".to_string(), toml::Value::Integer(-3));
        p.apply_overrides(&overrides).unwrap();
        assert!(p.validate().is_err());
    }

    #[test]
    fn set_rejects_kind_change() {
        let mut p = sample();
        assert!(p.set("rsi_period", 2.5).is_err());
        p.set("rsi_period", 7usize).unwrap();
        assert_eq!(p.get::<usize>("rsi_period").unwrap(), 7);
    }

    #[test]
    fn metadata_kept() {
        let p = sample();
        let entry = p.iter().next().unwrap();
        assert_eq!(entry.meta.display_name, "RSI Period");
        assert_eq!(entry.meta.optimize.unwrap().to, 30.0);
        assert_eq!(p.len(), 4);
    }
}
