//! Style expression decoding
//!
//! Style values reach the bridge as JSON text in the engine's expression syntax, e.g.
//! `["interpolate", ["linear"], ["zoom"], 0, 4, 12, 18]`. This module decodes that text into an
//! [`Expression`] tree and defines the typed style values ([`StyleValue`], [`StyleColor`]) that
//! either hold a constant or an expression.
//!
//! Decoding is a pure function: every call re-parses its input and nothing is cached.

use crate::{BridgeError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Operators understood by the engine's expression evaluator
const KNOWN_OPERATORS: &[&str] = &[
    // Types
    "array", "boolean", "collator", "format", "image", "literal", "number", "number-format",
    "object", "string", "to-boolean", "to-color", "to-number", "to-string", "typeof",
    // Feature data
    "accumulated", "feature-state", "geometry-type", "id", "line-progress", "properties",
    // Lookup
    "at", "config", "get", "has", "in", "index-of", "length", "slice",
    // Decision
    "!", "!=", "<", "<=", "==", ">", ">=", "all", "any", "case", "coalesce", "match", "within",
    // Ramps, scales, curves
    "interpolate", "interpolate-hcl", "interpolate-lab", "step", "linear", "exponential",
    "cubic-bezier",
    // Variable binding
    "let", "var",
    // String
    "concat", "downcase", "is-supported-script", "resolved-locale", "upcase",
    // Color
    "hsl", "hsla", "rgb", "rgba", "to-rgba",
    // Math
    "-", "*", "/", "%", "^", "+", "abs", "acos", "asin", "atan", "ceil", "cos", "distance", "e",
    "floor", "ln", "ln2", "log10", "log2", "max", "min", "pi", "random", "round", "sin", "sqrt",
    "tan",
    // Camera
    "distance-from-center", "pitch", "zoom",
    // Heatmap and lights
    "heatmap-density", "measure-light", "raster-value", "sky-radial-progress",
];

/// Whether `name` is an operator of the expression language
pub fn is_known_operator(name: &str) -> bool {
    KNOWN_OPERATORS.contains(&name)
}

/// A decoded style expression
///
/// An expression is either a literal JSON value or an operator applied to argument expressions.
/// Nested arrays that do not start with an operator (for example `match` labels) are kept as
/// literals.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Operation {
        operator: String,
        arguments: Vec<Expression>,
    },
}

/// Decode JSON expression text into an [`Expression`]
///
/// Fails with [`BridgeError::MalformedExpression`] if the text is not JSON, or if it is not an
/// array headed by a known operator.
pub fn decode(json_text: &str) -> Result<Expression> {
    #[cfg(feature = "profiling")]
    profiling::scope!("expression::decode");

    let value: Value = serde_json::from_str(json_text)
        .map_err(|e| BridgeError::malformed(format!("invalid JSON: {e}")))?;
    Expression::from_json(&value)
}

impl Expression {
    /// Decode an already-parsed JSON value
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Array(items) = value else {
            return Err(BridgeError::malformed(format!(
                "expected an expression array, found {}",
                json_type_name(value)
            )));
        };
        let Some((head, rest)) = items.split_first() else {
            return Err(BridgeError::malformed("expression array is empty"));
        };
        let Some(operator) = head.as_str() else {
            return Err(BridgeError::malformed(format!(
                "expression operator must be a string, found {}",
                json_type_name(head)
            )));
        };
        if !is_known_operator(operator) {
            return Err(BridgeError::malformed(format!(
                "unknown expression operator `{operator}`"
            )));
        }

        let arguments = if operator == "literal" {
            // Operands of `literal` are data, never sub-expressions
            rest.iter().cloned().map(Expression::Literal).collect()
        } else {
            rest.iter()
                .map(Self::decode_argument)
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Expression::Operation {
            operator: operator.to_string(),
            arguments,
        })
    }

    fn decode_argument(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items)
                if items
                    .first()
                    .and_then(Value::as_str)
                    .is_some_and(is_known_operator) =>
            {
                Self::from_json(value)
            }
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    /// `["get", property]`
    pub fn get(property: &str) -> Self {
        Expression::Operation {
            operator: "get".to_string(),
            arguments: vec![Expression::Literal(Value::String(property.to_string()))],
        }
    }

    /// The operator name, or `None` for a literal
    pub fn operator(&self) -> Option<&str> {
        match self {
            Expression::Literal(_) => None,
            Expression::Operation { operator, .. } => Some(operator),
        }
    }

    /// Render the expression back into the engine's JSON form
    pub fn to_json(&self) -> Value {
        match self {
            Expression::Literal(value) => value.clone(),
            Expression::Operation {
                operator,
                arguments,
            } => {
                let mut items = Vec::with_capacity(arguments.len() + 1);
                items.push(Value::String(operator.clone()));
                items.extend(arguments.iter().map(Expression::to_json));
                Value::Array(items)
            }
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A style property value: either a constant or data-driven through an expression
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StyleValue<T> {
    Constant(T),
    Expression(Expression),
}

impl<T> StyleValue<T> {
    pub fn is_expression(&self) -> bool {
        matches!(self, StyleValue::Expression(_))
    }

    pub fn as_constant(&self) -> Option<&T> {
        match self {
            StyleValue::Constant(value) => Some(value),
            StyleValue::Expression(_) => None,
        }
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match self {
            StyleValue::Constant(_) => None,
            StyleValue::Expression(expression) => Some(expression),
        }
    }
}

/// An RGBA color as the engine's style layer expects it
///
/// Serializes to the `rgba(r, g, b, a)` string form used in style JSON.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Opacity in `0.0..=1.0`
    pub alpha: f64,
}

impl StyleColor {
    pub const BLACK: StyleColor = StyleColor::rgb(0, 0, 0);
    pub const WHITE: StyleColor = StyleColor::rgb(255, 255, 255);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: 1.0,
        }
    }

    /// Pack into a `0xAARRGGBB` integer, the host's color encoding
    pub fn to_argb(&self) -> u32 {
        let alpha = (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u32;
        (alpha << 24) | ((self.red as u32) << 16) | ((self.green as u32) << 8) | self.blue as u32
    }

    /// Unpack a `0xAARRGGBB` integer
    pub fn from_argb(argb: u32) -> Self {
        Self {
            red: (argb >> 16) as u8,
            green: (argb >> 8) as u8,
            blue: argb as u8,
            alpha: f64::from((argb >> 24) as u8) / 255.0,
        }
    }
}

impl fmt::Display for StyleColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rgba({}, {}, {}, {})",
            self.red, self.green, self.blue, self.alpha
        )
    }
}

impl FromStr for StyleColor {
    type Err = String;

    /// Parses `rgba(r, g, b, a)`, `rgb(r, g, b)` and `#rrggbb`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 {
                return Err(format!("expected #rrggbb, found `{s}`"));
            }
            let value = u32::from_str_radix(hex, 16).map_err(|e| format!("`{s}`: {e}"))?;
            return Ok(Self::from_argb(0xFF00_0000 | value));
        }

        let (body, expected) = if let Some(body) = s.strip_prefix("rgba(") {
            (body, 4)
        } else if let Some(body) = s.strip_prefix("rgb(") {
            (body, 3)
        } else {
            return Err(format!("unrecognized color `{s}`"));
        };
        let body = body
            .strip_suffix(')')
            .ok_or_else(|| format!("unterminated color `{s}`"))?;
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() != expected {
            return Err(format!("expected {expected} components in `{s}`"));
        }

        let channel = |part: &str| {
            part.parse::<u8>()
                .map_err(|e| format!("bad channel `{part}` in `{s}`: {e}"))
        };
        let alpha = match parts.get(3) {
            Some(part) => part
                .parse::<f64>()
                .map_err(|e| format!("bad alpha `{part}` in `{s}`: {e}"))?,
            None => 1.0,
        };

        Ok(Self {
            red: channel(parts[0])?,
            green: channel(parts[1])?,
            blue: channel(parts[2])?,
            alpha,
        })
    }
}

impl Serialize for StyleColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StyleColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_simple_get() {
        let expression = decode(r#"["get", "point_count"]"#).unwrap();
        assert_eq!(expression, Expression::get("point_count"));
        assert_eq!(expression.operator(), Some("get"));
    }

    #[test]
    fn test_decode_nested_expression() {
        let text = r#"["interpolate", ["linear"], ["zoom"], 0, 4, 12, 18]"#;
        let expression = decode(text).unwrap();

        let Expression::Operation { arguments, .. } = &expression else {
            panic!("expected an operation");
        };
        assert_eq!(arguments.len(), 6);
        assert_eq!(arguments[0].operator(), Some("linear"));
        assert_eq!(arguments[1].operator(), Some("zoom"));
        assert_eq!(arguments[2], Expression::Literal(json!(0)));
    }

    #[test]
    fn test_decode_step_color_expression() {
        let text = r##"["step", ["get", "point_count"], "#51bbd6", 100, "#f1f075", 750, "#f28cb1"]"##;
        let expression = decode(text).unwrap();
        assert_eq!(expression.operator(), Some("step"));
        assert_eq!(expression.to_json(), serde_json::from_str::<Value>(text).unwrap());
    }

    #[test]
    fn test_match_labels_stay_literal() {
        let text = r#"["match", ["get", "kind"], ["park", "garden"], "green", "gray"]"#;
        let expression = decode(text).unwrap();

        let Expression::Operation { arguments, .. } = &expression else {
            panic!("expected an operation");
        };
        assert_eq!(arguments[1], Expression::Literal(json!(["park", "garden"])));
    }

    #[test]
    fn test_literal_operands_are_not_decoded() {
        // "zoom" inside a literal array is data, not an operator
        let expression = decode(r#"["literal", ["zoom", 1]]"#).unwrap();
        let Expression::Operation { arguments, .. } = &expression else {
            panic!("expected an operation");
        };
        assert_eq!(arguments, &vec![Expression::Literal(json!(["zoom", 1]))]);
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let error = decode("{not json").unwrap_err();
        assert!(matches!(error, BridgeError::MalformedExpression { field: None, .. }));
    }

    #[test]
    fn test_non_array_is_malformed() {
        for text in [r#"{"get": "x"}"#, "42", r#""get""#, "null"] {
            let error = decode(text).unwrap_err();
            assert!(
                matches!(error, BridgeError::MalformedExpression { .. }),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_array_is_malformed() {
        assert!(matches!(
            decode("[]"),
            Err(BridgeError::MalformedExpression { .. })
        ));
    }

    #[test]
    fn test_unknown_operator_is_malformed() {
        let error = decode(r#"["explode", 1]"#).unwrap_err();
        match error {
            BridgeError::MalformedExpression { reason, .. } => assert!(reason.contains("explode")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_non_string_operator_is_malformed() {
        assert!(decode("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_unknown_operator_in_nested_position_is_literal() {
        // Only the head of the whole expression is required to be an operator
        let expression = decode(r#"["coalesce", ["unknown-op", 1], 0]"#).unwrap();
        let Expression::Operation { arguments, .. } = &expression else {
            panic!("expected an operation");
        };
        assert_eq!(arguments[0], Expression::Literal(json!(["unknown-op", 1])));
    }

    #[test]
    fn test_expression_serializes_as_engine_json() {
        let expression = Expression::get("point_count");
        assert_eq!(
            serde_json::to_value(&expression).unwrap(),
            json!(["get", "point_count"])
        );
    }

    #[test]
    fn test_style_value_serialization() {
        let constant: StyleValue<f64> = StyleValue::Constant(18.0);
        assert_eq!(serde_json::to_value(&constant).unwrap(), json!(18.0));

        let expression: StyleValue<f64> = StyleValue::Expression(decode(r#"["zoom"]"#).unwrap());
        assert_eq!(serde_json::to_value(&expression).unwrap(), json!(["zoom"]));
        assert!(expression.is_expression());
        assert!(expression.as_constant().is_none());
    }

    #[test]
    fn test_style_color_display_and_parse() {
        assert_eq!(StyleColor::BLACK.to_string(), "rgba(0, 0, 0, 1)");
        assert_eq!("rgba(255, 255, 255, 1)".parse::<StyleColor>().unwrap(), StyleColor::WHITE);
        assert_eq!("rgb(10, 20, 30)".parse::<StyleColor>().unwrap(), StyleColor::rgb(10, 20, 30));
        assert_eq!("#ff8000".parse::<StyleColor>().unwrap(), StyleColor::rgb(255, 128, 0));
        assert!("hsl(0, 0%, 0%)".parse::<StyleColor>().is_err());
        assert!("rgba(1, 2, 3)".parse::<StyleColor>().is_err());
    }

    #[test]
    fn test_style_color_argb() {
        assert_eq!(StyleColor::BLACK.to_argb(), 0xFF00_0000);
        assert_eq!(StyleColor::WHITE.to_argb(), 0xFFFF_FFFF);
        assert_eq!(StyleColor::from_argb(0xFF33_66CC), StyleColor::rgb(0x33, 0x66, 0xCC));
    }

    #[test]
    fn test_decode_is_not_cached() {
        let first = decode(r#"["get", "a"]"#).unwrap();
        let second = decode(r#"["get", "b"]"#).unwrap();
        assert_ne!(first, second);
    }
}
