//! Static validation schema for resolved values
//!
//! Rules are keyed by path patterns where `*` matches any single segment
//! (`hotwords.*.sensitivity`). A leaf may match several rules; all of them
//! must pass.

use serde_json::Value;

use crate::path::ConfigPath;

/// Expected shape of a leaf value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Integer,
    Number,
    String,
    Sequence,
}

impl ValueKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Sequence => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Sequence => "sequence",
        }
    }
}

/// A single check applied to a leaf
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Kind(ValueKind),
    /// Inclusive numeric range
    Range { min: f64, max: f64 },
    /// String drawn from a fixed set
    OneOf(Vec<String>),
}

impl Constraint {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Check a value, returning a description of the failure.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Kind(kind) if kind.matches(value) => Ok(()),
            Self::Kind(kind) => Err(format!("expected {}, found {}", kind.name(), value)),
            Self::Range { min, max } => match value.as_f64() {
                Some(n) if n >= *min && n <= *max => Ok(()),
                Some(n) => Err(format!("{n} is outside [{min}, {max}]")),
                None => Err(format!("expected number in [{min}, {max}], found {value}")),
            },
            Self::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => Ok(()),
                _ => Err(format!(
                    "expected one of {}, found {}",
                    allowed.join(", "),
                    value
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Wildcard,
}

/// A path pattern with `*` wildcard segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|s| match s {
                "*" => Segment::Wildcard,
                key => Segment::Key(key.to_string()),
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &ConfigPath) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path.segments())
                .all(|(pattern, key)| match pattern {
                    Segment::Wildcard => true,
                    Segment::Key(expected) => expected == key,
                })
    }
}

#[derive(Debug, Clone)]
pub struct SchemaRule {
    pub pattern: PathPattern,
    pub constraint: Constraint,
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    rules: Vec<SchemaRule>,
}

impl Schema {
    /// A schema with no rules; every value passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn rule(mut self, pattern: &str, constraint: Constraint) -> Self {
        self.rules.push(SchemaRule {
            pattern: PathPattern::new(pattern),
            constraint,
        });
        self
    }

    /// Rules for the settings shipped in the default document.
    pub fn builtin() -> Self {
        use Constraint::{Kind, Range};
        use ValueKind::{Bool, Integer, Number, Sequence, String};

        Self::new()
            .rule("lang", Kind(String))
            .rule("system_unit", Constraint::one_of(["metric", "english"]))
            .rule("time_format", Constraint::one_of(["half", "full"]))
            .rule("date_format", Constraint::one_of(["MDY", "DMY"]))
            .rule("opt_in", Kind(Bool))
            .rule("confirm_listening", Kind(Bool))
            .rule(
                "log_level",
                Constraint::one_of(["CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG"]),
            )
            .rule("skills.update_interval", Kind(Number))
            .rule("skills.update_interval", Range { min: 0.0, max: 8760.0 })
            .rule("skills.priority_skills", Kind(Sequence))
            .rule("skills.blacklisted_skills", Kind(Sequence))
            .rule("server.update", Kind(Bool))
            .rule("server.metrics", Kind(Bool))
            .rule("websocket.port", Kind(Integer))
            .rule("websocket.port", Range { min: 1.0, max: 65535.0 })
            .rule("websocket.ssl", Kind(Bool))
            .rule("listener.sample_rate", Kind(Integer))
            .rule("listener.channels", Kind(Integer))
            .rule("listener.phoneme_duration", Kind(Integer))
            .rule("listener.multiplier", Kind(Number))
            .rule("listener.energy_ratio", Kind(Number))
            .rule("listener.wake_word", Kind(String))
            .rule("listener.record_wake_words", Kind(Bool))
            .rule("hotwords.*.module", Kind(String))
            .rule("hotwords.*.threshold", Kind(Number))
            .rule("hotwords.*.sensitivity", Range { min: 0.0, max: 1.0 })
            .rule("hotwords.*.trigger_level", Kind(Integer))
            .rule("stt.module", Kind(String))
            .rule("tts.module", Kind(String))
            .rule("tts.pulse_duck", Kind(Bool))
            .rule("audio_ducking.volume", Range { min: 0.0, max: 1.0 })
    }

    pub fn rules(&self) -> &[SchemaRule] {
        &self.rules
    }

    /// Validate one leaf against every matching rule.
    pub fn validate(&self, path: &ConfigPath, value: &Value) -> Result<(), String> {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.matches(path))
            .try_for_each(|rule| rule.constraint.check(value))
    }
}
