//! Declarative style expressions.
//!
//! Layers are styled with small expression trees that are evaluated against each feature's
//! properties, in the same spirit as the array expressions of vector-tile style JSON:
//!
//! ```text
//! ["match", ["%", ["get", "id"], 8], 0, "rgba(0, 63, 92, 1)", 1, "rgba(212, 80, 135, 1)", ...]
//! ```
//!
//! Expressions serialize to exactly that array form, so a style built here can be handed to a
//! web renderer unchanged.

use egui::{Color32, Stroke};
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

/// An RGB palette entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub [u8; 3]);

/// The palette used to tell neighbouring edges and nodes apart.
pub const DEFAULT_PALETTE: [Rgb; 8] = [
    Rgb([0, 63, 92]),
    Rgb([212, 80, 135]),
    Rgb([47, 75, 124]),
    Rgb([249, 93, 106]),
    Rgb([102, 81, 145]),
    Rgb([255, 124, 67]),
    Rgb([160, 81, 149]),
    Rgb([255, 166, 0]),
];

impl Rgb {
    /// Formats the colour as an `rgba(r, g, b, a)` string.
    pub fn to_rgba_string(self, opacity: f32) -> String {
        let [r, g, b] = self.0;
        format!("rgba({}, {}, {}, {})", r, g, b, opacity)
    }
}

/// A literal value, either as an expression constant or as the result of evaluating one.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Missing or not computable.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string, colours included.
    String(String),
}

impl Value {
    /// The value as a number, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The value in a numeric context: numbers as they are, booleans as 1 and 0.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// The value as a colour, if it is a string `parse_color` understands.
    pub fn as_color(&self) -> Option<Color32> {
        match self {
            Value::String(s) => parse_color(s),
            _ => None,
        }
    }
}

impl From<&JsonValue> for Value {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            JsonValue::String(s) => Value::String(s.clone()),
            _ => Value::Null,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            // Integral numbers are written without a fraction, as case keys are compared textually
            // by some renderers.
            Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
        }
    }
}

/// A style expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A constant.
    Literal(Value),
    /// Reads a feature property.
    Get(String),
    /// Remainder of the first operand divided by the second, keeping the sign of the first.
    /// Booleans count as 1 and 0.
    Modulo(Box<Expression>, Box<Expression>),
    /// Compares `input` against each case key and yields the first matching output, or
    /// `fallback` when none matches.
    Match {
        /// The value being matched.
        input: Box<Expression>,
        /// `(key, output)` pairs, tried in order.
        cases: Vec<(Value, Expression)>,
        /// Output when no case matches.
        fallback: Box<Expression>,
    },
}

impl Expression {
    /// A constant expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    /// `["get", attr]`
    pub fn get(attr: impl Into<String>) -> Self {
        Expression::Get(attr.into())
    }

    /// `["%", self, divisor]`
    pub fn modulo(self, divisor: Expression) -> Self {
        Expression::Modulo(Box::new(self), Box::new(divisor))
    }

    /// `["match", self, key, output, ..., fallback]`
    pub fn matching(self, cases: Vec<(Value, Expression)>, fallback: Expression) -> Self {
        Expression::Match {
            input: Box::new(self),
            cases,
            fallback: Box::new(fallback),
        }
    }

    /// Evaluates the expression against a feature's properties.
    pub fn evaluate(&self, properties: &Map<String, JsonValue>) -> Value {
        match self {
            Expression::Literal(value) => value.clone(),
            Expression::Get(attr) => properties.get(attr).map_or(Value::Null, Value::from),
            Expression::Modulo(lhs, rhs) => {
                let lhs = lhs.evaluate(properties).to_number();
                let rhs = rhs.evaluate(properties).to_number();
                match (lhs, rhs) {
                    (Some(a), Some(b)) if b != 0.0 => Value::Number(a % b),
                    _ => Value::Null,
                }
            }
            Expression::Match {
                input,
                cases,
                fallback,
            } => {
                let input = input.evaluate(properties);
                cases
                    .iter()
                    .find(|(key, _)| *key == input)
                    .map_or_else(|| fallback.evaluate(properties), |(_, output)| {
                        output.evaluate(properties)
                    })
            }
        }
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Expression::Literal(value) => value.serialize(serializer),
            Expression::Get(attr) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("get")?;
                seq.serialize_element(attr)?;
                seq.end()
            }
            Expression::Modulo(lhs, rhs) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("%")?;
                seq.serialize_element(lhs)?;
                seq.serialize_element(rhs)?;
                seq.end()
            }
            Expression::Match {
                input,
                cases,
                fallback,
            } => {
                let mut seq = serializer.serialize_seq(Some(3 + cases.len() * 2))?;
                seq.serialize_element("match")?;
                seq.serialize_element(input)?;
                for (key, output) in cases {
                    seq.serialize_element(key)?;
                    seq.serialize_element(output)?;
                }
                seq.serialize_element(fallback)?;
                seq.end()
            }
        }
    }
}

/// Builds an expression that colours features by `attr` modulo the palette size.
///
/// Every palette entry but the last is keyed by its index; the last entry is the fallback.
/// `opacity` defaults to fully opaque.
pub fn make_match_expression(palette: &[Rgb], opacity: Option<f32>, attr: &str) -> Expression {
    let opacity = opacity.unwrap_or(1.0);
    let input = Expression::get(attr).modulo(Expression::literal(palette.len() as f64));

    let Some((last, rest)) = palette.split_last() else {
        return input.matching(vec![], Expression::literal("rgba(0, 0, 0, 0)"));
    };

    let cases = rest
        .iter()
        .enumerate()
        .map(|(i, rgb)| {
            (
                Value::Number(i as f64),
                Expression::literal(rgb.to_rgba_string(opacity).as_str()),
            )
        })
        .collect();

    input.matching(cases, Expression::literal(last.to_rgba_string(opacity).as_str()))
}

/// Parses `rgba(r, g, b, a)`, `rgb(r, g, b)`, `#rrggbb` and `#rrggbbaa` colours.
///
/// The alpha of `rgba()` is a fraction between 0 and 1.
pub fn parse_color(s: &str) -> Option<Color32> {
    let s = s.trim();
    if s.starts_with('#') {
        return Color32::from_hex(s).ok();
    }

    let (body, has_alpha) = if let Some(body) = s.strip_prefix("rgba(") {
        (body, true)
    } else if let Some(body) = s.strip_prefix("rgb(") {
        (body, false)
    } else {
        return None;
    };
    let parts: Vec<&str> = body.strip_suffix(')')?.split(',').map(str::trim).collect();

    let channel = |part: &str| part.parse::<f32>().ok().map(|c| c.clamp(0.0, 255.0).round() as u8);
    match (has_alpha, parts.as_slice()) {
        (true, [r, g, b, a]) => {
            let alpha = a.parse::<f32>().ok()?.clamp(0.0, 1.0);
            Some(Color32::from_rgba_unmultiplied(
                channel(r)?,
                channel(g)?,
                channel(b)?,
                (alpha * 255.0).round() as u8,
            ))
        }
        (false, [r, g, b]) => Some(Color32::from_rgb(channel(r)?, channel(g)?, channel(b)?)),
        _ => None,
    }
}

/// How point features are drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct CircleStyle {
    /// Radius in screen points.
    pub radius: Expression,
    /// Fill colour.
    pub fill_color: Expression,
    /// Outline colour.
    pub stroke_color: Expression,
    /// Outline width in screen points.
    pub stroke_width: Expression,
}

/// A circle style resolved for one feature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedCircle {
    /// Radius in screen points.
    pub radius: f32,
    /// Fill colour.
    pub fill: Color32,
    /// Outline.
    pub stroke: Stroke,
}

impl Default for CircleStyle {
    fn default() -> Self {
        Self {
            radius: Expression::literal(5.0),
            fill_color: Expression::literal("rgba(255, 0, 0, 0.5)"),
            stroke_color: Expression::literal("rgba(255, 0, 0, 1)"),
            stroke_width: Expression::literal(2.0),
        }
    }
}

impl CircleStyle {
    /// Evaluates every expression for one feature. Values that are not usable fall back to a
    /// 5 point radius, transparent fill, and a 1 point black outline.
    pub fn resolve(&self, properties: &Map<String, JsonValue>) -> ResolvedCircle {
        ResolvedCircle {
            radius: self.radius.evaluate(properties).as_f64().unwrap_or(5.0) as f32,
            fill: self
                .fill_color
                .evaluate(properties)
                .as_color()
                .unwrap_or(Color32::TRANSPARENT),
            stroke: Stroke::new(
                self.stroke_width.evaluate(properties).as_f64().unwrap_or(1.0) as f32,
                self.stroke_color
                    .evaluate(properties)
                    .as_color()
                    .unwrap_or(Color32::BLACK),
            ),
        }
    }
}

/// How line and polygon outlines are drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeStyle {
    /// Line colour.
    pub color: Expression,
    /// Line width in screen points.
    pub width: Expression,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Expression::literal("rgba(51, 153, 204, 1)"),
            width: Expression::literal(1.25),
        }
    }
}

impl StrokeStyle {
    /// Evaluates the stroke for one feature, defaulting to a 1 point black line.
    pub fn resolve(&self, properties: &Map<String, JsonValue>) -> Stroke {
        Stroke::new(
            self.width.evaluate(properties).as_f64().unwrap_or(1.0) as f32,
            self.color
                .evaluate(properties)
                .as_color()
                .unwrap_or(Color32::BLACK),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn match_expression_serializes_to_array_form() {
        let palette = [Rgb([1, 2, 3]), Rgb([4, 5, 6]), Rgb([7, 8, 9])];
        let expression = make_match_expression(&palette, Some(0.5), "id");

        assert_eq!(
            serde_json::to_value(&expression).unwrap(),
            json!([
                "match",
                ["%", ["get", "id"], 3],
                0,
                "rgba(1, 2, 3, 0.5)",
                1,
                "rgba(4, 5, 6, 0.5)",
                "rgba(7, 8, 9, 0.5)"
            ])
        );
    }

    #[test]
    fn missing_opacity_is_opaque() {
        let expression = make_match_expression(&DEFAULT_PALETTE, None, "forward");
        let json = serde_json::to_value(&expression).unwrap();
        let items = json.as_array().unwrap();
        // "match", input, 7 cases of two entries, fallback.
        assert_eq!(items.len(), 2 + 7 * 2 + 1);
        assert_eq!(items[3], json!("rgba(0, 63, 92, 1)"));
        assert_eq!(items[16], json!("rgba(255, 166, 0, 1)"));
    }

    #[test]
    fn palette_colour_is_picked_by_attribute_modulo() {
        let expression = make_match_expression(&DEFAULT_PALETTE, Some(0.5), "id");

        let color = expression.evaluate(&props(json!({ "id": 9 })));
        assert_eq!(color, Value::from("rgba(212, 80, 135, 0.5)"));

        // 7 % 8 has no case of its own and lands on the fallback.
        let color = expression.evaluate(&props(json!({ "id": 7 })));
        assert_eq!(color, Value::from("rgba(255, 166, 0, 0.5)"));
    }

    #[test]
    fn missing_and_non_numeric_attributes_fall_back() {
        let expression = make_match_expression(&DEFAULT_PALETTE, None, "name");
        let fallback = Value::from("rgba(255, 166, 0, 1)");

        assert_eq!(expression.evaluate(&Map::new()), fallback);
        assert_eq!(expression.evaluate(&props(json!({ "name": "Main" }))), fallback);
        assert_eq!(expression.evaluate(&props(json!({ "name": -1 }))), fallback);
    }

    #[test]
    fn booleans_count_as_one_and_zero() {
        let expression = make_match_expression(&DEFAULT_PALETTE, None, "forward");
        assert_eq!(
            expression.evaluate(&props(json!({ "forward": true }))),
            Value::from("rgba(212, 80, 135, 1)")
        );
        assert_eq!(
            expression.evaluate(&props(json!({ "forward": false }))),
            Value::from("rgba(0, 63, 92, 1)")
        );
    }

    #[test]
    fn empty_palette_is_transparent() {
        let expression = make_match_expression(&[], None, "id");
        let color = expression.evaluate(&props(json!({ "id": 3 })));
        assert_eq!(color.as_color(), Some(Color32::TRANSPARENT));
    }

    #[test]
    fn match_on_booleans() {
        let width = Expression::get("deadend").matching(
            vec![
                (Value::Bool(true), Expression::literal(5.0)),
                (Value::Bool(false), Expression::literal(2.0)),
            ],
            Expression::literal(2.0),
        );
        assert_eq!(width.evaluate(&props(json!({ "deadend": true }))), Value::Number(5.0));
        assert_eq!(width.evaluate(&props(json!({ "deadend": false }))), Value::Number(2.0));
        assert_eq!(width.evaluate(&Map::new()), Value::Number(2.0));
    }

    #[test]
    fn parses_css_like_colours() {
        assert_eq!(
            parse_color("rgba(255, 0, 0, 0.5)"),
            Some(Color32::from_rgba_unmultiplied(255, 0, 0, 128))
        );
        assert_eq!(parse_color("rgb(1,2,3)"), Some(Color32::from_rgb(1, 2, 3)));
        assert_eq!(parse_color("#ff0000"), Some(Color32::from_rgb(255, 0, 0)));
        assert_eq!(parse_color("rgba(1, 2, 3)"), None);
        assert_eq!(parse_color("red"), None);
    }

    #[test]
    fn circle_style_resolves_per_feature() {
        let style = CircleStyle {
            radius: Expression::get("id").modulo(Expression::literal(2.0)).matching(
                vec![(Value::Number(0.0), Expression::literal(12.0))],
                Expression::literal(7.0),
            ),
            fill_color: make_match_expression(&DEFAULT_PALETTE, Some(0.5), "id"),
            stroke_color: make_match_expression(&DEFAULT_PALETTE, None, "id"),
            stroke_width: Expression::literal(2.0),
        };

        let even = style.resolve(&props(json!({ "id": 0 })));
        assert_eq!(even.radius, 12.0);
        assert_eq!(even.fill, Color32::from_rgba_unmultiplied(0, 63, 92, 128));
        assert_eq!(even.stroke, Stroke::new(2.0, Color32::from_rgb(0, 63, 92)));

        let odd = style.resolve(&props(json!({ "id": 1 })));
        assert_eq!(odd.radius, 7.0);
    }

    #[test]
    fn stroke_style_defaults_when_unresolvable() {
        let style = StrokeStyle {
            color: Expression::get("color"),
            width: Expression::get("width"),
        };
        assert_eq!(style.resolve(&Map::new()), Stroke::new(1.0, Color32::BLACK));
    }
}
