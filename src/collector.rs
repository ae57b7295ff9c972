//! A collector turning any geozero datasource into a [`FeatureCollection`].
//!
//! [`GeozeroCollector`] implements the geozero processor traits, building each
//! geometry with geozero's `GeoWriter` and each property with the
//! [`PropertyValue`] conversion of geozero column values. Geometries outside the
//! Point, LineString and Polygon model are rejected.
//!
//! # Example
//!
//! ```rust
//! use geozero::GeozeroDatasource;
//! use geokml::{collector::GeozeroCollector, Geometry, PropertyValue};
//!
//! let harbor = r#"{
//!     "type": "Feature",
//!     "geometry": { "type": "Point", "coordinates": [-70.25, 43.64] },
//!     "properties": { "berths": 12 }
//! }"#;
//!
//! let mut collector = GeozeroCollector::new();
//! geozero::geojson::GeoJsonReader(harbor.as_bytes())
//!     .process(&mut collector)
//!     .unwrap();
//!
//! let feature = &collector.into_collection().features[0];
//! assert!(matches!(feature.geometry, Some(Geometry::Point(_))));
//! assert_eq!(feature.properties.get("berths"), Some(&PropertyValue::Int(12)));
//! ```
use geozero::{
    error::GeozeroError, geo_types::GeoWriter, ColumnValue, FeatureProcessor, GeomProcessor,
    PropertyProcessor,
};

use crate::{
    error::Error,
    feature::{Feature, FeatureCollection, Geometry, Properties, PropertyValue},
};

pub struct GeozeroCollector {
    pub features: Vec<Feature>,

    current_geometry: GeoWriter,
    current_properties: Properties,
    rejected: Option<Error>,
}

impl GeozeroCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            current_geometry: GeoWriter::new(),
            current_properties: Properties::new(),
            rejected: None,
        }
    }

    /// The conversion error that made the last `feature_end` fail, if any.
    ///
    /// geozero only carries its own error type through `process`, so the
    /// original error is parked here.
    pub fn take_rejection(&mut self) -> Option<Error> {
        self.rejected.take()
    }

    #[must_use]
    pub fn into_collection(self) -> FeatureCollection {
        FeatureCollection::new(self.features)
    }
}

impl Default for GeozeroCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyProcessor for GeozeroCollector {
    fn property(
        &mut self,
        _idx: usize,
        name: &str,
        value: &ColumnValue,
    ) -> geozero::error::Result<bool> {
        self.current_properties
            .insert(name, PropertyValue::from(value));
        Ok(false)
    }
}

/// Implements `GeomProcessor` callbacks by handing them to the `GeoWriter`
/// that builds the current geometry.
macro_rules! forward_to_writer {
    ($($method:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> geozero::error::Result<()> {
                self.current_geometry.$method($($arg),*)
            }
        )*
    };
}

impl GeomProcessor for GeozeroCollector {
    fn dimensions(&self) -> geozero::CoordDimensions {
        self.current_geometry.dimensions()
    }

    fn multi_dim(&self) -> bool {
        self.current_geometry.multi_dim()
    }

    forward_to_writer! {
        srid(srid: Option<i32>);
        xy(x: f64, y: f64, idx: usize);
        coordinate(
            x: f64,
            y: f64,
            z: Option<f64>,
            m: Option<f64>,
            t: Option<f64>,
            tm: Option<u64>,
            idx: usize
        );
        empty_point(idx: usize);
        point_begin(idx: usize);
        point_end(idx: usize);
        multipoint_begin(size: usize, idx: usize);
        multipoint_end(idx: usize);
        linestring_begin(tagged: bool, size: usize, idx: usize);
        linestring_end(tagged: bool, idx: usize);
        multilinestring_begin(size: usize, idx: usize);
        multilinestring_end(idx: usize);
        polygon_begin(tagged: bool, size: usize, idx: usize);
        polygon_end(tagged: bool, idx: usize);
        multipolygon_begin(size: usize, idx: usize);
        multipolygon_end(idx: usize);
        geometrycollection_begin(size: usize, idx: usize);
        geometrycollection_end(idx: usize);
    }
}

impl FeatureProcessor for GeozeroCollector {
    fn properties_begin(&mut self) -> geozero::error::Result<()> {
        self.current_properties = Properties::new();
        Ok(())
    }

    fn feature_end(&mut self, _idx: u64) -> geozero::error::Result<()> {
        let geometry = match self.current_geometry.take_geometry().map(Geometry::try_from) {
            Some(Ok(geometry)) => Some(geometry),
            Some(Err(err)) => {
                let message = err.to_string();
                self.rejected = Some(err);
                return Err(GeozeroError::Geometry(message));
            }
            None => None,
        };

        self.features.push(Feature {
            geometry,
            properties: std::mem::take(&mut self.current_properties),
        });
        Ok(())
    }

    fn geometry_begin(&mut self) -> geozero::error::Result<()> {
        self.current_geometry = GeoWriter::new();
        Ok(())
    }
}
