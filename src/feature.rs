//! The in-memory feature model shared by both conversion directions.
//!
//! A [`FeatureCollection`] is an ordered list of [`Feature`]s, each carrying an
//! optional [`Geometry`] and an insertion-ordered [`Properties`] map. The model
//! only knows the three geometry kinds KML placemarks are converted from and
//! to: points, line strings and polygons with holes.
use std::fmt::{self, Display};

use geo::{LineString, Point};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single property value.
///
/// `Invalid` keeps the raw text of a typed value that failed to parse, so a
/// bad number in a KML document stays visible instead of turning into zero.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Invalid(String),
}

impl PropertyValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::String(v) | PropertyValue::Invalid(v) => f.write_str(v),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(i64::from(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

/// Insertion-ordered property map with unique keys.
///
/// Re-inserting a key replaces its value but keeps its position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties {
    entries: IndexMap<String, PropertyValue>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: PropertyValue,
    ) -> Option<PropertyValue> {
        self.entries.insert(key.into(), value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, PropertyValue)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, PropertyValue)>>(iter: T) -> Self {
        let mut properties = Properties::new();
        for (k, v) in iter {
            properties.insert(k, v);
        }
        properties
    }
}

/// The geometry kinds a KML placemark can carry in this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    /// Ring 0 is the outer boundary, the rest are holes. Rings are kept as
    /// read; closure is not enforced.
    Polygon(Vec<LineString>),
}

impl Geometry {
    #[must_use]
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
        }
    }

    #[must_use]
    pub fn new_point(x: f64, y: f64) -> Self {
        Geometry::Point(Point::new(x, y))
    }

    #[must_use]
    pub fn new_line_string(coords: Vec<[f64; 2]>) -> Self {
        Geometry::LineString(LineString::from(coords))
    }

    #[must_use]
    pub fn new_polygon(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Geometry::Polygon(rings.into_iter().map(LineString::from).collect())
    }
}

impl TryFrom<geo::Geometry> for Geometry {
    type Error = Error;

    fn try_from(geometry: geo::Geometry) -> Result<Self> {
        let unsupported =
            |name: &str| -> Result<Self> { Err(Error::UnsupportedGeometry(name.to_string())) };
        match geometry {
            geo::Geometry::Point(p) => Ok(Geometry::Point(p)),
            geo::Geometry::LineString(ls) => Ok(Geometry::LineString(ls)),
            geo::Geometry::Polygon(p) => {
                let (exterior, interiors) = p.into_inner();
                let mut rings = Vec::with_capacity(interiors.len() + 1);
                rings.push(exterior);
                rings.extend(interiors);
                Ok(Geometry::Polygon(rings))
            }
            geo::Geometry::Line(_) => unsupported("Line"),
            geo::Geometry::MultiPoint(_) => unsupported("MultiPoint"),
            geo::Geometry::MultiLineString(_) => unsupported("MultiLineString"),
            geo::Geometry::MultiPolygon(_) => unsupported("MultiPolygon"),
            geo::Geometry::GeometryCollection(_) => unsupported("GeometryCollection"),
            geo::Geometry::Rect(_) => unsupported("Rect"),
            geo::Geometry::Triangle(_) => unsupported("Triangle"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub properties: Properties,
}

impl Feature {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            properties: Properties::new(),
        }
    }

    pub fn set_property<T>(&mut self, key: impl Into<String>, value: T)
    where
        PropertyValue: From<T>,
    {
        self.properties.insert(key, PropertyValue::from(value));
    }

    #[must_use]
    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry.as_ref().map(Geometry::geometry_type)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// The geometry type of the first feature that has one.
    ///
    /// KML document-level styling assumes a single geometry type per document,
    /// so the first feature decides.
    #[must_use]
    pub fn dominant_geometry_type(&self) -> Option<GeometryType> {
        self.features.iter().find_map(Feature::geometry_type)
    }

    /// Whether every feature with a geometry shares the dominant type.
    #[must_use]
    pub fn is_homogeneous(&self) -> bool {
        let Some(dominant) = self.dominant_geometry_type() else {
            return true;
        };
        self.features
            .iter()
            .filter_map(Feature::geometry_type)
            .all(|t| t == dominant)
    }
}
