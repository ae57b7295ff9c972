//! # geokml
//!
//! A library for converting between `GeoJSON` feature collections and KML
//! documents, with optional per-feature symbol styling.
//!
//! ## Features
//!
//! - Read KML files (any text encoding known to `encoding_rs`) into feature collections
//! - Honour typed `<Schema>` declarations when reading `<SchemaData>` fields
//! - Collect features from any geozero datasource, `GeoJSON` included
//! - Write feature collections as KML, with deduplicated `<Style>` blocks
//!
//! ## Main Components
//!
//! - [`read_kml`] / [`parse_kml`] - KML to [`FeatureCollection`]
//! - [`write_kml`] / [`to_kml_string`] - [`FeatureCollection`] to KML
//! - [`from_datasource`] - Helper function to collect features from any `GeozeroDatasource`
//! - [`Symbol`] and [`SymbolSpec`] - Styling of written placemarks
//! - [`error::Error`] - Custom error types for the library
//!
//! ## Example
//!
//! ```rust
//! use geokml::{
//!     parse_kml, to_kml_string, Color, EncodeOptions, FeatureCollection, PropertyValue, Symbol,
//!     SymbolSpec,
//! };
//!
//! let geojson = r#"{
//!     "type": "FeatureCollection",
//!     "features": [{
//!         "type": "Feature",
//!         "geometry": { "type": "Point", "coordinates": [13.4, 52.5] },
//!         "properties": { "name": "Berlin", "population": 3669495 }
//!     }]
//! }"#;
//!
//! let cities = FeatureCollection::from_geojson(geojson).unwrap();
//!
//! let options = EncodeOptions::default().with_symbol(SymbolSpec::Uniform(Symbol {
//!     color: Some(Color::Hex("#ff0000".to_string())),
//!     ..Symbol::default()
//! }));
//! let kml = to_kml_string(&cities, &options).unwrap();
//! assert!(kml.contains("<color>ff0000ff</color>"));
//!
//! let decoded = parse_kml(&kml).unwrap();
//! assert_eq!(
//!     decoded.features[0].properties.get("population"),
//!     Some(&PropertyValue::from("3669495"))
//! );
//! ```
//!
//! ## Modules
//!
//! - [`collector`] - Contains the `GeozeroCollector` implementation
//! - [`de`] - Reading from geozero datasources
//! - [`encode`] - KML output
//! - [`extract`] - KML input
//! - [`feature`] - The feature model shared by both directions
//! - [`geometry`] - KML geometry nodes
//! - [`schema`] - Typed `<Schema>` fields
//! - [`style`] - Symbols and `<Style>` blocks
//! - [`xml`] - The element tree both directions work on
//! - [`error`] - Error types and handling

pub mod collector;
#[allow(clippy::module_name_repetitions)]
pub mod de;
pub mod encode;
pub mod error;
pub mod extract;
pub mod feature;
pub mod geometry;
pub mod schema;
mod ser;
pub mod style;
pub mod xml;

pub use de::from_datasource;
pub use encode::{
    encode_document, to_kml_string, write_kml, EncodeOptions, Encoded, DEFAULT_STYLE_KEY,
};
pub use error::{Error, Result};
pub use extract::{extract_features, parse_kml, read_kml, DecodeOptions};
pub use feature::{
    Feature, FeatureCollection, Geometry, GeometryType, Properties, PropertyValue,
};
pub use style::{Color, StyleDescriptor, StyleTable, Symbol, SymbolSpec};
