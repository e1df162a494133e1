//! Structural validator for configuration documents.
//!
//! Documents are checked as untyped `serde_json::Value`s against a declarative
//! schema before anything is decoded into [`Configuration`]. Passing validation
//! is the single gate between untrusted input (operator files, hand-built
//! values) and typed access.
//!
//! The walk is top-down and collects every violation instead of stopping at
//! the first. For each object the order is: type, missing required keys
//! (schema order), unexpected keys (document order), then the declared
//! properties in schema order. Arrays report a length violation and still
//! check every item that is present.
//!
//! Paths are JSON pointers into the document, e.g. `/imu/roll/cc`.

use crate::config::model::{
    Configuration, CHANNEL_COUNT, INTERFACE_COUNT, MESSAGE_TYPE_COUNT, SAVE_COMMAND,
};
use serde_json::Value;
use std::fmt;

/// Schema node.
#[derive(Debug)]
enum Schema {
    Boolean,
    /// Whole number within an inclusive range.
    Integer { min: i64, max: i64 },
    /// Any number within an inclusive range.
    Number { min: f64, max: f64 },
    /// String that must equal the literal.
    Literal(&'static str),
    /// Array of exactly `len` items.
    Array { len: usize, items: &'static Schema },
    /// Object with a closed property set.
    Object { properties: &'static [Property] },
}

#[derive(Debug)]
struct Property {
    name: &'static str,
    schema: &'static Schema,
    required: bool,
    /// `null` counts as absent.
    nullable: bool,
}

const fn required(name: &'static str, schema: &'static Schema) -> Property {
    Property {
        name,
        schema,
        required: true,
        nullable: false,
    }
}

static BOOLEAN: Schema = Schema::Boolean;
static CHANNEL: Schema = Schema::Integer { min: 1, max: 16 };
static MIDI_DATA: Schema = Schema::Integer { min: 0, max: 127 };
static SENSITIVITY: Schema = Schema::Number {
    min: 0.1,
    max: 10.0,
};
static RANGE: Schema = Schema::Number {
    min: 5.0,
    max: 180.0,
};

static AXIS_PROPERTIES: [Property; 9] = [
    required("enabled", &BOOLEAN),
    required("channel", &CHANNEL),
    required("cc", &MIDI_DATA),
    required("defaultValue", &MIDI_DATA),
    required("toSerial", &BOOLEAN),
    required("toUSBDevice", &BOOLEAN),
    required("toUSBHost", &BOOLEAN),
    required("sensitivity", &SENSITIVITY),
    required("range", &RANGE),
];
static AXIS: Schema = Schema::Object {
    properties: &AXIS_PROPERTIES,
};

static IMU_PROPERTIES: [Property; 4] = [
    required("enabled", &BOOLEAN),
    required("roll", &AXIS),
    required("pitch", &AXIS),
    required("yaw", &AXIS),
];
static IMU: Schema = Schema::Object {
    properties: &IMU_PROPERTIES,
};

static COMMAND: Schema = Schema::Literal(SAVE_COMMAND);
static FILTER_ROW: Schema = Schema::Array {
    len: MESSAGE_TYPE_COUNT,
    items: &BOOLEAN,
};
static FILTERS: Schema = Schema::Array {
    len: INTERFACE_COUNT,
    items: &FILTER_ROW,
};
static CHANNELS: Schema = Schema::Array {
    len: CHANNEL_COUNT,
    items: &BOOLEAN,
};

static CONFIGURATION_PROPERTIES: [Property; 4] = [
    required("command", &COMMAND),
    required("filters", &FILTERS),
    required("channels", &CHANNELS),
    Property {
        name: "imu",
        schema: &IMU,
        required: false,
        nullable: true,
    },
];
static CONFIGURATION: Schema = Schema::Object {
    properties: &CONFIGURATION_PROPERTIES,
};

/// The check that a [`Violation`] failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Value has the wrong JSON type.
    Type,
    /// Value differs from the required literal.
    Const,
    /// A required key is missing.
    Required,
    /// A key outside the closed property set is present.
    AdditionalProperty,
    /// Array is shorter than its fixed length.
    MinItems,
    /// Array is longer than its fixed length.
    MaxItems,
    /// Number is below its inclusive lower bound.
    Minimum,
    /// Number is above its inclusive upper bound.
    Maximum,
}

impl Rule {
    /// Schema keyword naming this rule.
    pub fn keyword(self) -> &'static str {
        match self {
            Rule::Type => "type",
            Rule::Const => "const",
            Rule::Required => "required",
            Rule::AdditionalProperty => "additionalProperty",
            Rule::MinItems => "minItems",
            Rule::MaxItems => "maxItems",
            Rule::Minimum => "minimum",
            Rule::Maximum => "maximum",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One failed check, naming the offending field path.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// JSON pointer of the offending value (or of the missing/unexpected key).
    pub path: String,
    /// The rule that failed.
    pub rule: Rule,
    /// Operator-facing description.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {} ({})", path, self.message, self.rule)
    }
}

/// Rejection of a configuration document, carrying every violation in walk order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    /// The ordered violation list.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for (i, violation) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Lists every violation of `document`, in walk order. Empty means accepted.
pub fn check(document: &Value) -> Vec<Violation> {
    let mut walker = Walker::default();
    walker.visit(String::new(), &CONFIGURATION, document);
    walker.violations
}

/// Accepts or rejects `document`.
pub fn validate(document: &Value) -> Result<(), ValidationError> {
    let violations = check(document);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

/// Validates a typed configuration by way of its wire encoding.
///
/// Typed values can still be out of range (e.g. `cc = 200` fits a `u8`).
pub fn validate_configuration(
    config: &Configuration,
) -> Result<Value, crate::error::ConfiguratorError> {
    let document = serde_json::to_value(config)?;
    validate(&document)?;
    Ok(document)
}

#[derive(Default)]
struct Walker {
    violations: Vec<Violation>,
}

impl Walker {
    fn report(&mut self, path: &str, rule: Rule, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.to_string(),
            rule,
            message: message.into(),
        });
    }

    fn visit(&mut self, path: String, schema: &Schema, value: &Value) {
        match schema {
            Schema::Boolean => {
                if !value.is_boolean() {
                    self.report(&path, Rule::Type, "must be boolean");
                }
            }
            Schema::Integer { min, max } => match integer(value) {
                Some(n) if n < *min => {
                    self.report(&path, Rule::Minimum, format!("must be >= {min}"))
                }
                Some(n) if n > *max => {
                    self.report(&path, Rule::Maximum, format!("must be <= {max}"))
                }
                Some(_) => {}
                None => self.report(&path, Rule::Type, "must be integer"),
            },
            Schema::Number { min, max } => match value.as_f64() {
                Some(n) if n < *min => {
                    self.report(&path, Rule::Minimum, format!("must be >= {min}"))
                }
                Some(n) if n > *max => {
                    self.report(&path, Rule::Maximum, format!("must be <= {max}"))
                }
                Some(_) => {}
                None => self.report(&path, Rule::Type, "must be number"),
            },
            Schema::Literal(expected) => match value.as_str() {
                Some(actual) if actual == *expected => {}
                Some(_) => self.report(
                    &path,
                    Rule::Const,
                    format!("must be equal to \"{expected}\""),
                ),
                None => self.report(&path, Rule::Type, "must be string"),
            },
            Schema::Array { len, items } => {
                let Some(elements) = value.as_array() else {
                    self.report(&path, Rule::Type, "must be array");
                    return;
                };
                if elements.len() < *len {
                    self.report(
                        &path,
                        Rule::MinItems,
                        format!("must have exactly {len} items, found {}", elements.len()),
                    );
                } else if elements.len() > *len {
                    self.report(
                        &path,
                        Rule::MaxItems,
                        format!("must have exactly {len} items, found {}", elements.len()),
                    );
                }
                for (i, element) in elements.iter().enumerate() {
                    self.visit(format!("{path}/{i}"), items, element);
                }
            }
            Schema::Object { properties } => {
                let Some(object) = value.as_object() else {
                    self.report(&path, Rule::Type, "must be object");
                    return;
                };
                for property in properties.iter().filter(|p| p.required) {
                    if !object.contains_key(property.name) {
                        let at = format!("{path}/{}", property.name);
                        self.report(&at, Rule::Required, "is required");
                    }
                }
                for key in object.keys() {
                    if !properties.iter().any(|p| p.name == key) {
                        let at = format!("{path}/{key}");
                        self.report(&at, Rule::AdditionalProperty, "is not allowed");
                    }
                }
                for property in properties.iter() {
                    match object.get(property.name) {
                        None => {}
                        Some(Value::Null) if property.nullable => {}
                        Some(child) => {
                            let at = format!("{path}/{}", property.name);
                            self.visit(at, property.schema, child);
                        }
                    }
                }
            }
        }
    }
}

/// Integer view of a JSON number; floats (even integral ones) are not integers.
fn integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Axis, AxisConfig};
    use serde_json::json;

    fn rules(document: &Value) -> Vec<(String, Rule)> {
        check(document)
            .into_iter()
            .map(|v| (v.path, v.rule))
            .collect()
    }

    fn minimal() -> Value {
        json!({
            "command": "SAVEALL",
            "filters": vec![vec![false; 8]; 3],
            "channels": vec![true; 16],
        })
    }

    #[test]
    fn minimal_document_without_imu_is_accepted() {
        assert!(validate(&minimal()).is_ok());
    }

    #[test]
    fn null_imu_counts_as_absent() {
        let mut doc = minimal();
        doc["imu"] = Value::Null;
        assert!(validate(&doc).is_ok());

        let config: Configuration = serde_json::from_value(doc).unwrap();
        assert!(config.imu.is_none());
    }

    #[test]
    fn null_is_still_a_type_violation_below_imu() {
        let mut doc = minimal();
        doc["imu"] = json!({
            "enabled": true,
            "roll": AxisConfig::default_for(Axis::Roll),
            "pitch": Value::Null,
            "yaw": AxisConfig::default_for(Axis::Yaw),
        });
        assert_eq!(rules(&doc), vec![("/imu/pitch".to_string(), Rule::Type)]);
    }

    #[test]
    fn wrong_command_literal_is_const_violation() {
        let mut doc = minimal();
        doc["command"] = json!("READALL");
        assert_eq!(rules(&doc), vec![("/command".to_string(), Rule::Const)]);

        doc["command"] = json!(1);
        assert_eq!(rules(&doc), vec![("/command".to_string(), Rule::Type)]);
    }

    #[test]
    fn short_row_reports_length_and_still_checks_items() {
        let mut doc = minimal();
        doc["filters"][1] = json!([false, "no", false]);
        assert_eq!(
            rules(&doc),
            vec![
                ("/filters/1".to_string(), Rule::MinItems),
                ("/filters/1/1".to_string(), Rule::Type),
            ]
        );
    }

    #[test]
    fn long_channel_list_is_max_items_violation() {
        let mut doc = minimal();
        doc["channels"] = json!(vec![true; 17]);
        assert_eq!(rules(&doc), vec![("/channels".to_string(), Rule::MaxItems)]);
    }

    #[test]
    fn integral_float_is_not_an_integer() {
        let mut doc = minimal();
        doc["imu"] = json!({
            "enabled": true,
            "roll": AxisConfig::default_for(Axis::Roll),
            "pitch": AxisConfig::default_for(Axis::Pitch),
            "yaw": AxisConfig::default_for(Axis::Yaw),
        });
        doc["imu"]["yaw"]["channel"] = json!(2.0);
        assert_eq!(rules(&doc), vec![("/imu/yaw/channel".to_string(), Rule::Type)]);
    }

    #[test]
    fn display_lists_every_violation() {
        let err = validate(&json!({"command": "SAVEALL"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "2 violation(s): /filters: is required (required); /channels: is required (required)"
        );
    }

    #[test]
    fn non_object_root_is_a_single_type_violation() {
        let violations = check(&json!([1, 2, 3]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].to_string(), "/: must be object (type)");
    }
}
