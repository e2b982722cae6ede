//! Structured G-code records
//!
//! Text parsing happens upstream; the controller receives a command token
//! plus a parameter map.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single G-code parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value, parsing text when needed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text view of the value
    pub fn as_text(&self) -> String {
        match self {
            ParamValue::Number(n) => n.to_string(),
            ParamValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Number(v as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// Immutable G-code record: command token plus named parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawGCode", into = "RawGCode")]
pub struct GCode {
    command: String,
    parameters: BTreeMap<String, ParamValue>,
}

/// Wire shape, normalised on the way in
#[derive(Serialize, Deserialize)]
struct RawGCode {
    command: String,
    #[serde(default)]
    parameters: BTreeMap<String, ParamValue>,
}

impl From<RawGCode> for GCode {
    fn from(raw: RawGCode) -> Self {
        GCode::new(raw.command, raw.parameters)
    }
}

impl From<GCode> for RawGCode {
    fn from(g: GCode) -> Self {
        RawGCode {
            command: g.command,
            parameters: g.parameters,
        }
    }
}

impl GCode {
    /// Create a record; the command is upper-cased and keys lower-cased
    pub fn new<K, I>(command: impl AsRef<str>, parameters: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, ParamValue)>,
    {
        Self {
            command: command.as_ref().trim().to_uppercase(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v))
                .collect(),
        }
    }

    /// Record without parameters
    pub fn bare(command: impl AsRef<str>) -> Self {
        Self::new(command, Vec::<(String, ParamValue)>::new())
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    /// Look up a parameter by (case-insensitive) name
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(&name.to_lowercase())
    }
}

impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for (k, v) in &self.parameters {
            write!(f, " {}{}", k.to_uppercase(), v)?;
        }
        Ok(())
    }
}
