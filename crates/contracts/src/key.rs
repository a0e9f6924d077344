//! Chunk key specification and metadata keys
//!
//! 一个 `ChunkKeySpec` 描述哪些维度参与分块;`MetadataKey` 是每条事件算出的复合键。

use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::OutputError;

/// Reserved chunk key selecting the time bucket dimension
pub const TIME_CHUNK_KEY: &str = "time";
/// Reserved chunk key selecting the tag dimension
pub const TAG_CHUNK_KEY: &str = "tag";

/// Which dimensions participate in key derivation
///
/// Fields are private: every instance went through validation, so a bucket
/// width is always positive and variable names are unique and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkKeySpec {
    timekey_range: Option<i64>,
    tag: bool,
    variables: Vec<String>,
}

impl ChunkKeySpec {
    /// Build a validated specification
    ///
    /// # Errors
    /// `Configuration` when the bucket width is not positive, or a variable
    /// name is empty, duplicated or reserved.
    pub fn new(
        timekey_range: Option<i64>,
        tag: bool,
        variables: Vec<String>,
    ) -> Result<Self, OutputError> {
        if let Some(w) = timekey_range {
            if w <= 0 {
                return Err(OutputError::configuration(
                    "timekey_range",
                    format!("time bucket width must be > 0, got {w}"),
                ));
            }
        }

        let mut seen = HashSet::with_capacity(variables.len());
        for name in &variables {
            if name.is_empty() {
                return Err(OutputError::configuration(
                    "chunk_keys",
                    "chunk key name cannot be empty",
                ));
            }
            if name == TIME_CHUNK_KEY || name == TAG_CHUNK_KEY {
                return Err(OutputError::configuration(
                    "chunk_keys",
                    format!("'{name}' is reserved and cannot be a variable key"),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(OutputError::configuration(
                    "chunk_keys",
                    format!("duplicate chunk key '{name}'"),
                ));
            }
        }

        Ok(Self {
            timekey_range,
            tag,
            variables,
        })
    }

    /// No dimension: every event collapses to one key
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from a chunk key list where `time` and `tag` are reserved names
    ///
    /// # Errors
    /// `Configuration` when `time` is listed without a range, a range is
    /// given without `time`, or any rule of [`ChunkKeySpec::new`] fails.
    pub fn from_chunk_keys(
        keys: &[String],
        timekey_range: Option<i64>,
    ) -> Result<Self, OutputError> {
        let mut time = false;
        let mut tag = false;
        let mut variables = Vec::new();

        for key in keys {
            match key.as_str() {
                TIME_CHUNK_KEY if time => {
                    return Err(OutputError::configuration(
                        "chunk_keys",
                        "duplicate chunk key 'time'",
                    ))
                }
                TIME_CHUNK_KEY => time = true,
                TAG_CHUNK_KEY if tag => {
                    return Err(OutputError::configuration(
                        "chunk_keys",
                        "duplicate chunk key 'tag'",
                    ))
                }
                TAG_CHUNK_KEY => tag = true,
                _ => variables.push(key.clone()),
            }
        }

        match (time, timekey_range) {
            (true, None) => Err(OutputError::configuration(
                "timekey_range",
                "chunk key 'time' requires timekey_range",
            )),
            (false, Some(_)) => Err(OutputError::configuration(
                "timekey_range",
                "timekey_range is set but 'time' is not a chunk key",
            )),
            (_, range) => Self::new(range, tag, variables),
        }
    }

    /// Parse a comma separated chunk key list, e.g. `"time,tag,host"`
    pub fn parse(keys: &str, timekey_range: Option<i64>) -> Result<Self, OutputError> {
        let keys: Vec<String> = keys
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self::from_chunk_keys(&keys, timekey_range)
    }

    #[inline]
    pub fn timekey_range(&self) -> Option<i64> {
        self.timekey_range
    }

    #[inline]
    pub fn tag(&self) -> bool {
        self.tag
    }

    #[inline]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// True when no dimension is configured
    pub fn is_empty(&self) -> bool {
        self.timekey_range.is_none() && !self.tag && self.variables.is_empty()
    }

    /// Chunk key list in configuration form
    pub fn chunk_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.variables.len() + 2);
        if self.timekey_range.is_some() {
            keys.push(TIME_CHUNK_KEY.to_string());
        }
        if self.tag {
            keys.push(TAG_CHUNK_KEY.to_string());
        }
        keys.extend(self.variables.iter().cloned());
        keys
    }
}

/// Variable-field component of a metadata key, in configured order
///
/// A field missing from the record is stored as `Value::Null`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Variables(Vec<(String, Value)>);

impl Variables {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self(entries)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Hash for Variables {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.len());
        for (name, value) in &self.0 {
            name.hash(state);
            hash_value(value, state);
        }
    }
}

// serde_json::Value is Eq but not Hash
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => state.write_u8(0),
        Value::Bool(b) => {
            state.write_u8(1);
            b.hash(state);
        }
        Value::Number(n) => {
            state.write_u8(2);
            hash_number(n, state);
        }
        Value::String(s) => {
            state.write_u8(3);
            s.hash(state);
        }
        Value::Array(items) => {
            state.write_u8(4);
            state.write_usize(items.len());
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            state.write_u8(5);
            state.write_usize(map.len());
            for (k, v) in map {
                k.hash(state);
                hash_value(v, state);
            }
        }
    }
}

// Integers and floats never compare equal to each other, floats compare
// numerically, so -0.0 and 0.0 must share a hash
fn hash_number<H: Hasher>(n: &Number, state: &mut H) {
    if let Some(u) = n.as_u64() {
        state.write_u8(0);
        state.write_u64(u);
    } else if let Some(i) = n.as_i64() {
        state.write_u8(1);
        state.write_i64(i);
    } else if let Some(f) = n.as_f64() {
        state.write_u8(2);
        let f = if f == 0.0 { 0.0 } else { f };
        state.write_u64(f.to_bits());
    }
}

/// Composite grouping key of a chunk
///
/// Components for dimensions that are not configured stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct MetadataKey {
    pub timekey: Option<i64>,
    pub tag: Option<String>,
    pub variables: Option<Variables>,
}

impl MetadataKey {
    pub fn new(timekey: Option<i64>, tag: Option<String>, variables: Option<Variables>) -> Self {
        Self {
            timekey,
            tag,
            variables,
        }
    }

    /// Key with every component absent
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.timekey.is_none() && self.tag.is_none() && self.variables.is_none()
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut sep = "";
        if let Some(t) = self.timekey {
            write!(f, "timekey={t}")?;
            sep = ", ";
        }
        if let Some(tag) = &self.tag {
            write!(f, "{sep}tag={tag}")?;
            sep = ", ";
        }
        if let Some(vars) = &self.variables {
            for (name, value) in vars.iter() {
                write!(f, "{sep}{name}={value}")?;
                sep = ", ";
            }
        }
        write!(f, "}}")
    }
}
