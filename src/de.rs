use geozero::GeozeroDatasource;

use crate::{
    collector::GeozeroCollector,
    error::{Error, Result},
    feature::FeatureCollection,
};

/// Reads every feature of a `GeozeroDatasource` into a [`FeatureCollection`].
///
/// # Examples
///
/// ```
/// use geokml::{from_datasource, GeometryType, PropertyValue};
///
/// let trails = r#"{
///     "type": "FeatureCollection",
///     "features": [{
///         "type": "Feature",
///         "geometry": { "type": "LineString", "coordinates": [[8.5, 47.3], [8.6, 47.4]] },
///         "properties": { "trail": "Uetliberg", "length_km": 9.2 }
///     }]
/// }"#;
///
/// let mut reader = geozero::geojson::GeoJsonReader(trails.as_bytes());
/// let collection = from_datasource(&mut reader).unwrap();
///
/// assert_eq!(collection.dominant_geometry_type(), Some(GeometryType::LineString));
/// assert_eq!(
///     collection.features[0].properties.get("length_km"),
///     Some(&PropertyValue::Float(9.2))
/// );
/// ```
///
/// # Errors
///
/// Returns an error if the datasource processing fails, including when a
/// feature carries a geometry other than Point, LineString or Polygon.
pub fn from_datasource<S: GeozeroDatasource>(processor: &mut S) -> Result<FeatureCollection> {
    let mut collector = GeozeroCollector::new();
    if let Err(err) = processor.process(&mut collector) {
        return Err(collector.take_rejection().unwrap_or_else(|| Error::from(err)));
    }
    log::debug!("collected {} features", collector.features.len());
    Ok(collector.into_collection())
}

impl FeatureCollection {
    /// Parses GeoJSON text holding a `FeatureCollection` or a single `Feature`.
    ///
    /// # Errors
    ///
    /// Fails on malformed GeoJSON and on unsupported geometry types.
    pub fn from_geojson(geojson: &str) -> Result<Self> {
        from_datasource(&mut geozero::geojson::GeoJsonReader(geojson.as_bytes()))
    }
}
