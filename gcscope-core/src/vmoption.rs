//! JVM command-line option parsing.
//!
//! Understands `-XX:+Flag`, `-XX:-Flag`, `-XX:Name=Value`, the `-Xmx`,
//! `-Xms`, `-Xmn` and `-Xss` shorthands, `-Dkey=value` system properties
//! and plain `-flag` / `-flag:value` switches.

use crate::error::{Error, Result};
use crate::model::CollectorFamily;
use serde::Serialize;
use std::collections::BTreeMap;

/// Typed option value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VmOptionValue {
    Bool(bool),
    Int(i64),
    /// Bytes, from a value carrying a k/m/g/t suffix
    Size(u64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VmOptions {
    options: BTreeMap<String, VmOptionValue>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
}

/// Parse a size like `512m`, `4G` or `1048576` into bytes.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let (digits, multiplier) = match text.chars().last()? {
        'k' | 'K' => (&text[..text.len() - 1], 1u64 << 10),
        'm' | 'M' => (&text[..text.len() - 1], 1 << 20),
        'g' | 'G' => (&text[..text.len() - 1], 1 << 30),
        't' | 'T' => (&text[..text.len() - 1], 1 << 40),
        _ => (text, 1),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

fn parse_value(raw: &str) -> VmOptionValue {
    if let Ok(int) = raw.parse::<i64>() {
        return VmOptionValue::Int(int);
    }
    match raw {
        "true" => return VmOptionValue::Bool(true),
        "false" => return VmOptionValue::Bool(false),
        _ => {}
    }
    match parse_size(raw) {
        Some(bytes) => VmOptionValue::Size(bytes),
        None => VmOptionValue::Text(raw.to_string()),
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn malformed(token: &str, why: &str) -> Error {
    Error::MalformedVmOption(format!("'{token}': {why}"))
}

impl VmOptions {
    /// Parse a whitespace separated option string.
    pub fn parse(text: &str) -> Result<Self> {
        let mut options = VmOptions::default();
        for token in text.split_whitespace() {
            options.parse_token(token)?;
        }
        Ok(options)
    }

    fn parse_token(&mut self, token: &str) -> Result<()> {
        let body = token
            .strip_prefix('-')
            .ok_or_else(|| malformed(token, "options start with '-'"))?;

        if let Some(xx) = body.strip_prefix("XX:") {
            return self.parse_xx(token, xx);
        }
        if let Some(prop) = body.strip_prefix('D') {
            let (key, value) = prop.split_once('=').unwrap_or((prop, ""));
            if key.is_empty() {
                return Err(malformed(token, "empty property name"));
            }
            self.properties.insert(key.to_string(), value.to_string());
            return Ok(());
        }
        for (prefix, names) in [
            ("Xmx", &["MaxHeapSize"][..]),
            ("Xms", &["InitialHeapSize"][..]),
            ("Xmn", &["NewSize", "MaxNewSize"][..]),
            ("Xss", &["ThreadStackSize"][..]),
        ] {
            if let Some(size) = body.strip_prefix(prefix) {
                let bytes = parse_size(size).ok_or_else(|| malformed(token, "bad size"))?;
                for name in names {
                    self.options
                        .insert((*name).to_string(), VmOptionValue::Size(bytes));
                }
                return Ok(());
            }
        }
        if body.is_empty() {
            return Err(malformed(token, "empty option"));
        }
        match body.split_once(':') {
            Some((name, value)) => {
                self.options
                    .insert(name.to_string(), VmOptionValue::Text(value.to_string()));
            }
            None => {
                self.options.insert(body.to_string(), VmOptionValue::Bool(true));
            }
        }
        Ok(())
    }

    fn parse_xx(&mut self, token: &str, xx: &str) -> Result<()> {
        if let Some(name) = xx.strip_prefix('+') {
            if !valid_name(name) {
                return Err(malformed(token, "bad flag name"));
            }
            self.options.insert(name.to_string(), VmOptionValue::Bool(true));
            return Ok(());
        }
        if let Some(name) = xx.strip_prefix('-') {
            if !valid_name(name) {
                return Err(malformed(token, "bad flag name"));
            }
            self.options.insert(name.to_string(), VmOptionValue::Bool(false));
            return Ok(());
        }
        let (name, value) = xx
            .split_once('=')
            .ok_or_else(|| malformed(token, "expected +Flag, -Flag or Name=Value"))?;
        if !valid_name(name) {
            return Err(malformed(token, "bad option name"));
        }
        if value.is_empty() {
            return Err(malformed(token, "missing value"));
        }
        self.options.insert(name.to_string(), parse_value(value));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn get(&self, name: &str) -> Option<&VmOptionValue> {
        self.options.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            VmOptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            VmOptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Size in bytes. Plain integers count as bytes.
    pub fn get_size(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            VmOptionValue::Size(bytes) => Some(*bytes),
            VmOptionValue::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VmOptionValue)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Collector selected by `-XX:+Use...GC`, if any.
    pub fn collector_family(&self) -> Option<CollectorFamily> {
        [
            ("UseG1GC", CollectorFamily::G1),
            ("UseZGC", CollectorFamily::Zgc),
            ("UseShenandoahGC", CollectorFamily::Shenandoah),
            ("UseEpsilonGC", CollectorFamily::Epsilon),
            ("UseConcMarkSweepGC", CollectorFamily::Cms),
            ("UseParallelGC", CollectorFamily::Parallel),
            ("UseParallelOldGC", CollectorFamily::Parallel),
            ("UseSerialGC", CollectorFamily::Serial),
        ]
        .into_iter()
        .find(|(flag, _)| self.get_bool(flag) == Some(true))
        .map(|(_, family)| family)
    }

    /// Later values win.
    pub fn extend(&mut self, other: VmOptions) {
        self.options.extend(other.options);
        self.properties.extend(other.properties);
    }
}
