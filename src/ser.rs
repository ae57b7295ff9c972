//! GeoJSON serialization of the feature model, and conversion of geozero
//! column values into [`PropertyValue`]s.
use geo::LineString;
use geozero::ColumnValue;
use serde::ser::{self, SerializeMap, SerializeStruct};

use crate::{
    error,
    feature::{Feature, FeatureCollection, Geometry, Properties, PropertyValue},
};

impl From<&ColumnValue<'_>> for PropertyValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: &ColumnValue<'_>) -> Self {
        match value {
            ColumnValue::Byte(val) => PropertyValue::Int(i64::from(*val)),
            ColumnValue::UByte(val) => PropertyValue::Int(i64::from(*val)),
            ColumnValue::Bool(val) => PropertyValue::Bool(*val),
            ColumnValue::Short(val) => PropertyValue::Int(i64::from(*val)),
            ColumnValue::UShort(val) => PropertyValue::Int(i64::from(*val)),
            ColumnValue::Int(val) => PropertyValue::Int(i64::from(*val)),
            ColumnValue::UInt(val) => PropertyValue::Int(i64::from(*val)),
            ColumnValue::Long(val) => PropertyValue::Int(*val),
            ColumnValue::ULong(val) => match i64::try_from(*val) {
                Ok(v) => PropertyValue::Int(v),
                Err(_) => PropertyValue::Float(*val as f64),
            },
            ColumnValue::Float(val) => PropertyValue::Float(f64::from(*val)),
            ColumnValue::Double(val) => PropertyValue::Float(*val),
            ColumnValue::String(val) | ColumnValue::Json(val) | ColumnValue::DateTime(val) => {
                PropertyValue::String((*val).to_string())
            }
            ColumnValue::Binary(val) => {
                PropertyValue::String(String::from_utf8_lossy(val).into_owned())
            }
        }
    }
}

impl ser::Serialize for PropertyValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match self {
            PropertyValue::Null | PropertyValue::Invalid(_) => serializer.serialize_unit(),
            PropertyValue::Bool(val) => serializer.serialize_bool(*val),
            PropertyValue::Int(val) => serializer.serialize_i64(*val),
            PropertyValue::Float(val) => serializer.serialize_f64(*val),
            PropertyValue::String(val) => serializer.serialize_str(val),
        }
    }
}

impl ser::Serialize for Properties {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn positions(line: &LineString) -> Vec<[f64; 2]> {
    line.coords().map(|c| [c.x, c.y]).collect()
}

impl ser::Serialize for Geometry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        let mut state = serializer.serialize_struct("Geometry", 2)?;
        state.serialize_field("type", &self.geometry_type())?;
        match self {
            Geometry::Point(p) => state.serialize_field("coordinates", &[p.x(), p.y()])?,
            Geometry::LineString(ls) => state.serialize_field("coordinates", &positions(ls))?,
            Geometry::Polygon(rings) => {
                let rings: Vec<Vec<[f64; 2]>> = rings.iter().map(positions).collect();
                state.serialize_field("coordinates", &rings)?;
            }
        }
        state.end()
    }
}

impl ser::Serialize for Feature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        let mut state = serializer.serialize_struct("Feature", 3)?;
        state.serialize_field("type", "Feature")?;
        state.serialize_field("geometry", &self.geometry)?;
        state.serialize_field("properties", &self.properties)?;
        state.end()
    }
}

impl ser::Serialize for FeatureCollection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        let mut state = serializer.serialize_struct("FeatureCollection", 2)?;
        state.serialize_field("type", "FeatureCollection")?;
        state.serialize_field("features", &self.features)?;
        state.end()
    }
}

impl FeatureCollection {
    /// Serializes the collection as a GeoJSON `FeatureCollection`.
    ///
    /// Invalid property values and `NaN` coordinates are written as `null`.
    ///
    /// # Errors
    ///
    /// Returns [`error::Error::SerdeError`] if serialization fails.
    pub fn to_geojson(&self) -> error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
