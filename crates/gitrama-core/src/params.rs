//! Enumerated tool parameters and shared validation helpers.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{ToolError, ToolResult};

pub const COMMIT_QUALITY_MIN: u32 = 1;
pub const COMMIT_QUALITY_MAX: u32 = 50;
pub const COMMIT_QUALITY_DEFAULT: u32 = 10;

// ── Enumerations ──

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $param:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ToolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        ToolError::validation(format!(
                            "invalid {}: \"{s}\" (expected one of: {})",
                            $param,
                            allowed.join(", ")
                        ))
                    })
            }
        }
    };
}

string_enum!(
    /// Commit message style understood by `gtr commit --type`.
    MessageType, "message_type", {
        Conventional => "conventional",
        Detailed => "detailed",
        Simple => "simple",
    }
);

string_enum!(
    /// Context scope for `gtr ask`.
    Scope, "scope", {
        Auto => "auto",
        Branch => "branch",
        Full => "full",
        Staged => "staged",
    }
);

string_enum!(
    ChangelogFormat, "format", {
        Markdown => "markdown",
        Json => "json",
    }
);

/// Parse an optional enumerated parameter; empty means the default variant.
pub fn parse_or_default<T>(raw: Option<&str>) -> ToolResult<T>
where
    T: FromStr<Err = ToolError> + Default,
{
    match raw.map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(s) => s.parse(),
    }
}

// ── Scalar checks ──

/// Require a non-blank string parameter; returns it trimmed.
pub fn require_non_empty<'a>(param: &str, value: Option<&'a str>) -> ToolResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ToolError::validation(format!("{param} is required"))),
    }
}

/// Trimmed optional string; blank collapses to `None`.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Range-check the commit-quality window (inclusive on both ends).
pub fn validate_count(count: Option<i64>) -> ToolResult<u32> {
    let count = count.unwrap_or(i64::from(COMMIT_QUALITY_DEFAULT));
    if count < i64::from(COMMIT_QUALITY_MIN) || count > i64::from(COMMIT_QUALITY_MAX) {
        return Err(ToolError::validation(format!(
            "count must be between {COMMIT_QUALITY_MIN} and {COMMIT_QUALITY_MAX} (got {count})"
        )));
    }
    Ok(count as u32)
}

// ── Loosely typed wire values ──
//
// MCP clients do not agree on JSON types: `"10"` and `10.0` both show up for
// integers, `"yes"` for booleans. These accept the unambiguous spellings and
// turn everything else into a validation error instead of a decode failure.

/// Read an optional integer parameter. Blank strings and `null` mean unset.
pub fn json_int(param: &str, value: Option<&Value>) -> ToolResult<Option<i64>> {
    let invalid = |v: &Value| ToolError::validation(format!("{param} must be an integer (got {v})"));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                // Exact in f64, so the cast cannot round or saturate.
                Some(f) if f.fract() == 0.0 && f.abs() <= 9_007_199_254_740_992.0 => {
                    Ok(Some(f as i64))
                }
                Some(f) if f.fract() == 0.0 => Err(ToolError::validation(format!(
                    "{param} is out of range (got {v})"
                ))),
                _ => Err(invalid(v)),
            }
        }
        Some(v @ Value::String(s)) => match s.trim() {
            "" => Ok(None),
            t => t.parse().map(Some).map_err(|_| invalid(v)),
        },
        Some(v) => Err(invalid(v)),
    }
}

/// Read an optional boolean parameter. Accepts `0`/`1` and
/// `true/false/yes/no/on/off` strings in any case.
pub fn json_bool(param: &str, value: Option<&Value>) -> ToolResult<Option<bool>> {
    let invalid = |v: &Value| ToolError::validation(format!("{param} must be a boolean (got {v})"));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(v @ Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(invalid(v)),
        },
        Some(v @ Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(invalid(v)),
        },
        Some(v) => Err(invalid(v)),
    }
}

/// Split a `files` parameter for `git add`. `"."` stages everything.
///
/// Paths beginning with `-` are rejected so a value can never be read as a
/// git option.
pub fn parse_files(files: Option<&str>) -> ToolResult<Vec<String>> {
    let raw = non_blank(files).unwrap_or(".");
    let list: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if let Some(bad) = list.iter().find(|f| f.starts_with('-')) {
        return Err(ToolError::validation(format!(
            "invalid file path \"{bad}\": paths must not start with '-'"
        )));
    }
    Ok(list)
}
