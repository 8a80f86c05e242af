//! Field schemas for tool arguments and structured results.
//!
//! A [`ObjectSchema`] is a flat list of typed fields. It backs both the
//! argument contract of every tool and the [`ResultSchema`] an agent's final
//! answer must satisfy. Schemas are checked for coherence when built and are
//! never mutated afterwards.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Number, Value};
use thiserror::Error;

/// Schema construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("field name must not be empty")]
    EmptyName,

    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("field '{0}' has numeric bounds but is not numeric")]
    BoundsOnNonNumeric(String),

    #[error("field '{0}' has length bounds but is not a string")]
    LengthOnNonString(String),

    #[error("field '{0}' has an empty range")]
    InvertedRange(String),
}

/// Primitive field types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Number)
    }

    /// Lax coercion: integral floats and numeric strings become integers,
    /// numeric strings become numbers, "true"/"false" become booleans.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        match (self, value) {
            (FieldKind::String, Value::String(_)) => Ok(value.clone()),
            (FieldKind::String, _) => Err(format!("expected a string, got {}", describe(value))),

            (FieldKind::Integer, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Ok(Value::from(f as i64))
                        }
                        _ => Err(format!("expected an integer, got {}", n)),
                    }
                }
            }
            (FieldKind::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("expected an integer, got \"{}\"", s)),
            (FieldKind::Integer, _) => {
                Err(format!("expected an integer, got {}", describe(value)))
            }

            (FieldKind::Number, Value::Number(_)) => Ok(value.clone()),
            (FieldKind::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected a number, got \"{}\"", s)),
            (FieldKind::Number, _) => Err(format!("expected a number, got {}", describe(value))),

            (FieldKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (FieldKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("expected a boolean, got \"{}\"", s)),
            },
            (FieldKind::Boolean, _) => Err(format!("expected a boolean, got {}", describe(value))),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One named, typed field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
    pub required: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: true,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Inclusive numeric bounds
    pub fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Inclusive string length bounds, in characters
    pub fn length(mut self, min_length: Option<usize>, max_length: Option<usize>) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    fn check(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyName);
        }
        let has_bounds = self.minimum.is_some() || self.maximum.is_some();
        if has_bounds && !self.kind.is_numeric() {
            return Err(SchemaError::BoundsOnNonNumeric(self.name.clone()));
        }
        let has_length = self.min_length.is_some() || self.max_length.is_some();
        if has_length && self.kind != FieldKind::String {
            return Err(SchemaError::LengthOnNonString(self.name.clone()));
        }
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(SchemaError::InvertedRange(self.name.clone()));
            }
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(SchemaError::InvertedRange(self.name.clone()));
            }
        }
        Ok(())
    }

    /// Coerce a present value and check its constraints
    fn validate(&self, value: &Value) -> Result<Value, String> {
        let value = self.kind.coerce(value)?;

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(format!("must be >= {}, got {}", fmt_bound(min), value));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(format!("must be <= {}, got {}", fmt_bound(max), value));
                }
            }
        }

        if let Some(s) = value.as_str() {
            let len = s.chars().count();
            if let Some(min) = self.min_length {
                if len < min {
                    return Err(format!("must have at least {} characters", min));
                }
            }
            if let Some(max) = self.max_length {
                if len > max {
                    return Err(format!("must have at most {} characters", max));
                }
            }
        }

        Ok(value)
    }

    fn json_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.kind.json_type()));
        if let Some(desc) = &self.description {
            prop.insert("description".into(), json!(desc));
        }
        if let Some(min) = self.minimum {
            prop.insert("minimum".into(), bound_value(self.kind, min));
        }
        if let Some(max) = self.maximum {
            prop.insert("maximum".into(), bound_value(self.kind, max));
        }
        if let Some(min) = self.min_length {
            prop.insert("minLength".into(), json!(min));
        }
        if let Some(max) = self.max_length {
            prop.insert("maxLength".into(), json!(max));
        }
        Value::Object(prop)
    }
}

fn fmt_bound(bound: f64) -> String {
    if bound.fract() == 0.0 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}

fn bound_value(kind: FieldKind, bound: f64) -> Value {
    if kind == FieldKind::Integer && bound.fract() == 0.0 {
        json!(bound as i64)
    } else {
        json!(bound)
    }
}

/// A field that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub reason: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every reason a payload was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue::new(field, reason)],
        }
    }

    /// Names of the failing fields, in schema order
    pub fn fields(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.field.as_str()).collect()
    }

    /// Corrective text handed back to the model
    pub fn correction(&self) -> String {
        format!("{}\n\nFix the errors and try again.", self)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.issues.len();
        write!(
            f,
            "{} validation error{}:",
            n,
            if n == 1 { "" } else { "s" }
        )?;
        for issue in &self.issues {
            write!(f, "\n- {}: {}", issue.field, issue.reason)?;
        }
        Ok(())
    }
}

/// Flat object schema: tool arguments and result payloads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    fields: Vec<FieldSpec>,
}

/// Tool argument contract
pub type ArgSchema = ObjectSchema;

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unchecked; call [`ObjectSchema::check`] before use
    pub fn from_fields(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn check(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            field.check()?;
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(())
    }

    /// Coerce and check every declared field; unknown fields are dropped.
    pub fn validate_object(&self, object: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
        let mut out = Map::new();
        let mut issues = Vec::new();

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    issues.push(FieldIssue::new(&field.name, "field required"));
                }
                None | Some(Value::Null) => {}
                Some(value) => match field.validate(value) {
                    Ok(v) => {
                        out.insert(field.name.clone(), v);
                    }
                    Err(reason) => issues.push(FieldIssue::new(&field.name, reason)),
                },
            }
        }

        if issues.is_empty() {
            Ok(out)
        } else {
            Err(ValidationError { issues })
        }
    }

    /// JSON schema advertised to the model
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Shape an agent's final answer must satisfy
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSchema {
    name: String,
    description: Option<String>,
    fields: ObjectSchema,
}

impl ResultSchema {
    pub fn builder(name: impl Into<String>) -> ResultSchemaBuilder {
        ResultSchemaBuilder {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        self.fields.fields()
    }

    pub fn to_json_schema(&self) -> Value {
        let mut schema = self.fields.to_json_schema();
        if let (Some(desc), Value::Object(map)) = (&self.description, &mut schema) {
            map.insert("description".into(), json!(desc));
        }
        schema
    }

    /// Validate a structured payload (tool-call arguments)
    pub fn validate_value(&self, value: &Value) -> Result<Value, ValidationError> {
        match value {
            Value::Object(object) => self.fields.validate_object(object).map(Value::Object),
            // Some models send the arguments as an encoded string
            Value::String(text) => self.validate(text),
            other => Err(ValidationError::single(
                "response",
                format!("expected a JSON object, got {}", describe(other)),
            )),
        }
    }

    /// Validate a text answer, extracting the JSON object it carries
    pub fn validate(&self, text: &str) -> Result<Value, ValidationError> {
        let object = extract_json_object(text).ok_or_else(|| {
            ValidationError::single("response", "no JSON object found in the answer")
        })?;
        self.fields.validate_object(&object).map(Value::Object)
    }
}

pub struct ResultSchemaBuilder {
    name: String,
    description: Option<String>,
    fields: Vec<FieldSpec>,
}

impl ResultSchemaBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(FieldSpec::string(name).describe(description))
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(FieldSpec::integer(name).describe(description))
    }

    pub fn number(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(FieldSpec::number(name).describe(description))
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field(FieldSpec::boolean(name).describe(description))
    }

    /// Integer with inclusive bounds
    pub fn int_range(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        min: i64,
        max: i64,
    ) -> Self {
        self.field(
            FieldSpec::integer(name)
                .describe(description)
                .range(Some(min as f64), Some(max as f64)),
        )
    }

    pub fn build(self) -> Result<ResultSchema, SchemaError> {
        let fields = ObjectSchema::from_fields(self.fields);
        fields.check()?;
        Ok(ResultSchema {
            name: self.name,
            description: self.description,
            fields,
        })
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Find the JSON object in a model's text answer: the whole text, a fenced
/// block, or the outermost braces.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Some(map);
    }

    if let Some(re) = fence_regex() {
        for caps in re.captures_iter(trimmed) {
            if let Some(m) = caps.get(1) {
                if let Ok(Value::Object(map)) = serde_json::from_str(m.as_str()) {
                    return Some(map);
                }
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
