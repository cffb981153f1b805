//! Annotation representations
//!
//! Two views of the same tapped shape live here:
//!
//! - [`NativeAnnotation`]: what the engine hands over on a tap, with geometry in `geo` types and
//!   colors as [`StyleColor`]. The engine may also report annotation types the bridge does not
//!   know, which end up in [`NativeAnnotation::Unrecognized`].
//! - [`Annotation`]: the bridge's serializable form sent to the host, with camelCase fields,
//!   `[lng, lat]` coordinate arrays and colors packed as ARGB integers.

use crate::expression::StyleColor;
use geo::{LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The four annotation shapes, shared by managers and annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Circle,
    Point,
    Polygon,
    Polyline,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 4] = [
        AnnotationKind::Circle,
        AnnotationKind::Point,
        AnnotationKind::Polygon,
        AnnotationKind::Polyline,
    ];

    /// Wire name used in `annotation#create_manager`
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Circle => "circle",
            AnnotationKind::Point => "point",
            AnnotationKind::Polygon => "polygon",
            AnnotationKind::Polyline => "polyline",
        }
    }

    /// Outbound channel for taps on this kind, e.g. `annotation#on_circle_annotation_click`
    pub fn click_channel(&self) -> String {
        format!("annotation#on_{}_annotation_click", self.as_str())
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationKind {
    type Err = crate::BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "circle" => Ok(AnnotationKind::Circle),
            "point" => Ok(AnnotationKind::Point),
            "polygon" => Ok(AnnotationKind::Polygon),
            "polyline" => Ok(AnnotationKind::Polyline),
            other => Err(crate::BridgeError::UnsupportedKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine-side annotations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCircleAnnotation {
    pub id: String,
    pub manager_id: String,
    pub center: Point<f64>,
    pub circle_radius: Option<f64>,
    pub circle_color: Option<StyleColor>,
    pub circle_opacity: Option<f64>,
    pub circle_blur: Option<f64>,
    pub circle_stroke_width: Option<f64>,
    pub circle_stroke_color: Option<StyleColor>,
    pub circle_sort_key: Option<f64>,
    #[serde(default)]
    pub is_draggable: bool,
    pub user_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativePointAnnotation {
    pub id: String,
    pub manager_id: String,
    pub point: Point<f64>,
    pub icon_image: Option<String>,
    pub icon_size: Option<f64>,
    pub icon_rotate: Option<f64>,
    pub icon_color: Option<StyleColor>,
    pub text_field: Option<String>,
    pub text_size: Option<f64>,
    pub text_color: Option<StyleColor>,
    pub symbol_sort_key: Option<f64>,
    #[serde(default)]
    pub is_draggable: bool,
    pub user_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativePolygonAnnotation {
    pub id: String,
    pub manager_id: String,
    pub polygon: Polygon<f64>,
    pub fill_color: Option<StyleColor>,
    pub fill_opacity: Option<f64>,
    pub fill_outline_color: Option<StyleColor>,
    pub fill_sort_key: Option<f64>,
    #[serde(default)]
    pub is_draggable: bool,
    pub user_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativePolylineAnnotation {
    pub id: String,
    pub manager_id: String,
    pub line: LineString<f64>,
    pub line_color: Option<StyleColor>,
    pub line_width: Option<f64>,
    pub line_opacity: Option<f64>,
    pub line_blur: Option<f64>,
    pub line_gap_width: Option<f64>,
    pub line_sort_key: Option<f64>,
    #[serde(default)]
    pub is_draggable: bool,
    pub user_info: Option<Value>,
}

/// An annotation as reported by the engine on a tap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NativeAnnotation {
    Circle(NativeCircleAnnotation),
    Point(NativePointAnnotation),
    Polygon(NativePolygonAnnotation),
    Polyline(NativePolylineAnnotation),
    /// An engine annotation type with no bridge counterpart
    #[serde(rename_all = "camelCase")]
    Unrecognized { type_name: String },
}

impl NativeAnnotation {
    pub fn kind(&self) -> Option<AnnotationKind> {
        match self {
            NativeAnnotation::Circle(_) => Some(AnnotationKind::Circle),
            NativeAnnotation::Point(_) => Some(AnnotationKind::Point),
            NativeAnnotation::Polygon(_) => Some(AnnotationKind::Polygon),
            NativeAnnotation::Polyline(_) => Some(AnnotationKind::Polyline),
            NativeAnnotation::Unrecognized { .. } => None,
        }
    }

    /// Identifier of the manager that owns this annotation
    pub fn manager_id(&self) -> Option<&str> {
        match self {
            NativeAnnotation::Circle(a) => Some(&a.manager_id),
            NativeAnnotation::Point(a) => Some(&a.manager_id),
            NativeAnnotation::Polygon(a) => Some(&a.manager_id),
            NativeAnnotation::Polyline(a) => Some(&a.manager_id),
            NativeAnnotation::Unrecognized { .. } => None,
        }
    }

    /// Convert to the serializable bridge form; `None` for unrecognized types
    pub fn to_bridge(&self) -> Option<Annotation> {
        match self {
            NativeAnnotation::Circle(a) => Some(Annotation::Circle(a.into())),
            NativeAnnotation::Point(a) => Some(Annotation::Point(a.into())),
            NativeAnnotation::Polygon(a) => Some(Annotation::Polygon(a.into())),
            NativeAnnotation::Polyline(a) => Some(Annotation::Polyline(a.into())),
            NativeAnnotation::Unrecognized { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Bridge-side annotations
// ---------------------------------------------------------------------------

/// `[longitude, latitude]`
pub type Position = [f64; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleAnnotation {
    pub id: String,
    pub manager_id: String,
    pub geometry: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_blur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_stroke_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_sort_key: Option<f64>,
    pub is_draggable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointAnnotation {
    pub id: String,
    pub manager_id: String,
    pub geometry: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_rotate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_sort_key: Option<f64>,
    pub is_draggable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonAnnotation {
    pub id: String,
    pub manager_id: String,
    /// Exterior ring first, then holes
    pub geometry: Vec<Vec<Position>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_outline_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_sort_key: Option<f64>,
    pub is_draggable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolylineAnnotation {
    pub id: String,
    pub manager_id: String,
    pub geometry: Vec<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_blur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_gap_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_sort_key: Option<f64>,
    pub is_draggable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

/// A tapped annotation as delivered to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Annotation {
    Circle(CircleAnnotation),
    Point(PointAnnotation),
    Polygon(PolygonAnnotation),
    Polyline(PolylineAnnotation),
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Annotation::Circle(_) => AnnotationKind::Circle,
            Annotation::Point(_) => AnnotationKind::Point,
            Annotation::Polygon(_) => AnnotationKind::Polygon,
            Annotation::Polyline(_) => AnnotationKind::Polyline,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Annotation::Circle(a) => &a.id,
            Annotation::Point(a) => &a.id,
            Annotation::Polygon(a) => &a.id,
            Annotation::Polyline(a) => &a.id,
        }
    }
}

fn position(point: &Point<f64>) -> Position {
    [point.x(), point.y()]
}

fn line_positions(line: &LineString<f64>) -> Vec<Position> {
    line.coords().map(|coord| [coord.x, coord.y]).collect()
}

fn argb(color: &Option<StyleColor>) -> Option<u32> {
    color.as_ref().map(StyleColor::to_argb)
}

impl From<&NativeCircleAnnotation> for CircleAnnotation {
    fn from(native: &NativeCircleAnnotation) -> Self {
        Self {
            id: native.id.clone(),
            manager_id: native.manager_id.clone(),
            geometry: position(&native.center),
            circle_radius: native.circle_radius,
            circle_color: argb(&native.circle_color),
            circle_opacity: native.circle_opacity,
            circle_blur: native.circle_blur,
            circle_stroke_width: native.circle_stroke_width,
            circle_stroke_color: argb(&native.circle_stroke_color),
            circle_sort_key: native.circle_sort_key,
            is_draggable: native.is_draggable,
            user_info: native.user_info.clone(),
        }
    }
}

impl From<&NativePointAnnotation> for PointAnnotation {
    fn from(native: &NativePointAnnotation) -> Self {
        Self {
            id: native.id.clone(),
            manager_id: native.manager_id.clone(),
            geometry: position(&native.point),
            icon_image: native.icon_image.clone(),
            icon_size: native.icon_size,
            icon_rotate: native.icon_rotate,
            icon_color: argb(&native.icon_color),
            text_field: native.text_field.clone(),
            text_size: native.text_size,
            text_color: argb(&native.text_color),
            symbol_sort_key: native.symbol_sort_key,
            is_draggable: native.is_draggable,
            user_info: native.user_info.clone(),
        }
    }
}

impl From<&NativePolygonAnnotation> for PolygonAnnotation {
    fn from(native: &NativePolygonAnnotation) -> Self {
        let mut rings = Vec::with_capacity(1 + native.polygon.interiors().len());
        rings.push(line_positions(native.polygon.exterior()));
        rings.extend(native.polygon.interiors().iter().map(line_positions));
        Self {
            id: native.id.clone(),
            manager_id: native.manager_id.clone(),
            geometry: rings,
            fill_color: argb(&native.fill_color),
            fill_opacity: native.fill_opacity,
            fill_outline_color: argb(&native.fill_outline_color),
            fill_sort_key: native.fill_sort_key,
            is_draggable: native.is_draggable,
            user_info: native.user_info.clone(),
        }
    }
}

impl From<&NativePolylineAnnotation> for PolylineAnnotation {
    fn from(native: &NativePolylineAnnotation) -> Self {
        Self {
            id: native.id.clone(),
            manager_id: native.manager_id.clone(),
            geometry: line_positions(&native.line),
            line_color: argb(&native.line_color),
            line_width: native.line_width,
            line_opacity: native.line_opacity,
            line_blur: native.line_blur,
            line_gap_width: native.line_gap_width,
            line_sort_key: native.line_sort_key,
            is_draggable: native.is_draggable,
            user_info: native.user_info.clone(),
        }
    }
}
