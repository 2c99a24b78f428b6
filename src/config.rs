//! Dotted key/value configuration store.
//!
//! Every model component reads its parameters from a [`Configuration`].
//! Keys are addressed as `section.key`; the section is everything before the
//! **last** dot, so `poa.encoder[theta].bits` lives in section
//! `poa.encoder[theta]` under key `bits`. A key without a dot lives in the
//! implied `main` section.
//!
//! Values are typed ([`ConfigValue`]) and round-trip through their string
//! form: `parse(key, &cfg.as_string(key)?)` restores the same value. On disk
//! the store is a JSON object of sections, each an object of keys.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoaError, Result};
use crate::quantity::{Dimension, GenerativeQuantity};

/// Section used for keys that carry no section prefix.
pub const IMPLIED_SECTION: &str = "main";

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    /// Infer a typed value from its literal text form.
    ///
    /// Integers, floats and booleans are recognized first; a double-quoted
    /// literal is unescaped; anything else is taken verbatim as a string.
    pub fn parse_literal(text: &str) -> Self {
        let t = text.trim();
        if let Ok(i) = t.parse::<i64>() {
            return ConfigValue::Int(i);
        }
        if let Ok(f) = t.parse::<f64>() {
            return ConfigValue::Float(f);
        }
        match t {
            "true" | "True" => return ConfigValue::Bool(true),
            "false" | "False" => return ConfigValue::Bool(false),
            _ => {}
        }
        if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
            return ConfigValue::Str(unescape(&t[1..t.len() - 1]));
        }
        ConfigValue::Str(t.to_string())
    }

    fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            // Debug formatting keeps a trailing ".0" so floats stay floats
            ConfigValue::Float(x) => write!(f, "{x:?}"),
            ConfigValue::Str(s) => write!(f, "\"{}\"", escape(s)),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<usize> for ConfigValue {
    fn from(v: usize) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

/// Sectioned key/value store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    sections: BTreeMap<String, BTreeMap<String, ConfigValue>>,
}

/// Split `section.key` at the last dot.
fn split_key(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((section, key)) => (section, key),
        None => (IMPLIED_SECTION, name),
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key holds a value.
    pub fn have(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn have_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        let (section, key) = split_key(name);
        self.sections.get(section).and_then(|s| s.get(key))
    }

    /// Insert or replace a value.
    pub fn set(&mut self, name: &str, value: impl Into<ConfigValue>) {
        let (section, key) = split_key(name);
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Insert a value only if the key is not already present.
    pub fn set_default(&mut self, name: &str, value: impl Into<ConfigValue>) {
        if !self.have(name) {
            self.set(name, value);
        }
    }

    /// Parse a literal and store it under `name`.
    pub fn parse(&mut self, name: &str, text: &str) {
        self.set(name, ConfigValue::parse_literal(text));
    }

    /// String form of a value, suitable for [`Configuration::parse`].
    pub fn as_string(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.to_string())
    }

    /// Copy every entry of `other` into this store, overwriting existing keys.
    pub fn copy_from(&mut self, other: &Configuration) {
        for (section, entries) in &other.sections {
            let target = self.sections.entry(section.clone()).or_default();
            for (key, value) in entries {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    /// All fully qualified keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(|(section, entries)| {
                entries.keys().map(move |k| format!("{section}.{k}"))
            })
            .collect()
    }

    fn require(&self, name: &str) -> Result<&ConfigValue> {
        self.get(name)
            .ok_or_else(|| PoaError::Config(format!("missing key `{name}`")))
    }

    fn wrong_type(name: &str, expected: &str, got: &ConfigValue) -> PoaError {
        PoaError::Config(format!(
            "key `{name}` must be {expected}, found {}",
            got.type_name()
        ))
    }

    pub fn get_f64(&self, name: &str) -> Result<f64> {
        match self.require(name)? {
            ConfigValue::Float(x) => Ok(*x),
            ConfigValue::Int(i) => Ok(*i as f64),
            other => Err(Self::wrong_type(name, "a number", other)),
        }
    }

    pub fn get_i64(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            ConfigValue::Int(i) => Ok(*i),
            other => Err(Self::wrong_type(name, "an integer", other)),
        }
    }

    /// Non-negative integer lookup.
    pub fn get_usize(&self, name: &str) -> Result<usize> {
        let v = self.get_i64(name)?;
        usize::try_from(v)
            .map_err(|_| PoaError::Config(format!("key `{name}` must be non-negative, got {v}")))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.require(name)? {
            ConfigValue::Bool(b) => Ok(*b),
            other => Err(Self::wrong_type(name, "a boolean", other)),
        }
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            ConfigValue::Str(s) => Ok(s.as_str()),
            other => Err(Self::wrong_type(name, "a string", other)),
        }
    }

    /// Parse a string value as a quantity descriptor (`"0.2 +/- 1e-6 m (flat)"`).
    pub fn get_quantity(&self, name: &str) -> Result<GenerativeQuantity> {
        match self.require(name)? {
            ConfigValue::Str(s) => GenerativeQuantity::parse(s),
            other => Err(Self::wrong_type(name, "a quantity descriptor", other)),
        }
    }

    /// Quantity of the given dimension, converted to its SI unit.
    pub fn get_si_quantity(&self, name: &str, dimension: Dimension) -> Result<GenerativeQuantity> {
        let q = self.get_quantity(name)?;
        if q.unit().dimension() != dimension {
            return Err(PoaError::Config(format!(
                "key `{name}` must be {dimension:?}, got unit `{}`",
                q.unit()
            )));
        }
        q.to_si()
    }

    /// Apply a `key=value` override, as given on a command line.
    pub fn apply_override(&mut self, tweak: &str) -> Result<()> {
        let (key, value) = tweak
            .split_once('=')
            .ok_or_else(|| PoaError::Config(format!("override `{tweak}` is not key=value")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(PoaError::Config(format!("override `{tweak}` has an empty key")));
        }
        self.parse(key, value);
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
