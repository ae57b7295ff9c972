//! KML to feature collection.
use std::path::Path;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    feature::{Feature, FeatureCollection, Properties, PropertyValue},
    geometry::read_geometry,
    schema::SchemaTable,
    xml::Element,
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Label of the source text encoding, as understood by the WHATWG
    /// encoding standard (`utf-8`, `windows-1252`, `latin1`, ...).
    pub encoding: String,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
        }
    }
}

impl DecodeOptions {
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }
}

/// Reads a KML file into a feature collection.
///
/// # Errors
///
/// Returns [`Error::InputNotFound`] for a missing file,
/// [`Error::UnknownEncoding`] for an unrecognized encoding label, and any read
/// or parse error.
pub fn read_kml(path: impl AsRef<Path>, options: &DecodeOptions) -> Result<FeatureCollection> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::InputNotFound(path.to_path_buf()));
    }

    let encoding = encoding_rs::Encoding::for_label(options.encoding.as_bytes())
        .ok_or_else(|| Error::UnknownEncoding(options.encoding.clone()))?;
    let bytes = std::fs::read(path)?;
    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        log::warn!("{path:?} contains byte sequences invalid in {}", used.name());
    }
    log::debug!("reading {path:?} as {}", used.name());

    parse_kml(&text)
}

/// Parses KML text into a feature collection.
///
/// # Errors
///
/// Fails if the text is not well-formed XML.
pub fn parse_kml(text: &str) -> Result<FeatureCollection> {
    let root = Element::parse(text)?;
    Ok(extract_features(&root))
}

/// Converts every `<Placemark>` of a parsed document, in document order.
#[must_use]
pub fn extract_features(root: &Element) -> FeatureCollection {
    let schemas = SchemaTable::from_document(root);
    let features: Vec<Feature> = root
        .descendants("Placemark")
        .into_iter()
        .map(|placemark| Feature {
            geometry: read_geometry(placemark),
            properties: read_properties(placemark, schemas.as_ref()),
        })
        .collect();

    log::info!("extracted {} features", features.len());
    FeatureCollection::new(features)
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.is_empty())
}

/// Builds the property map of a placemark.
///
/// `name` and `description` come first, then typed `SchemaData` fields, then
/// untyped `Data` fields. A `Data` field overwrites a typed field of the same
/// name.
fn read_properties(placemark: &Element, schemas: Option<&SchemaTable>) -> Properties {
    let mut properties = Properties::new();

    if let Some(name) = non_empty(placemark.find_text("name")) {
        properties.insert("name", PropertyValue::from(name));
    }
    if let Some(description) = non_empty(placemark.find_text("description")) {
        properties.insert("description", PropertyValue::from(description));
    }

    if let Some(schemas) = schemas {
        for data in placemark.find_all("ExtendedData/SchemaData") {
            let reference = data.attribute("schemaUrl").unwrap_or_default();
            let fields = schemas.get(reference);
            if fields.is_none() {
                log::warn!("SchemaData references unknown schema {reference:?}");
            }

            for field in data.children_named("SimpleData") {
                let (Some(name), Some(text)) = (field.attribute("name"), field.text.as_deref())
                else {
                    continue;
                };
                let value = match fields.and_then(|f| f.get(name)) {
                    Some(field_type) => field_type.coerce(text),
                    None => PropertyValue::from(text),
                };
                properties.insert(name, value);
            }
        }
    }

    for data in placemark.find_all("ExtendedData/Data") {
        if let (Some(name), Some(value)) = (data.attribute("name"), data.find_text("value")) {
            properties.insert(name, PropertyValue::from(value));
        }
    }

    properties
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::Geometry;
    use approx::assert_relative_eq;

    const POINTS: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
<Document>
  <Schema name="points" id="points">
    <SimpleField name="id" type="int"/>
    <SimpleField name="visible" type="bool"/>
    <SimpleField name="height" type="double"/>
  </Schema>
  <Placemark>
    <ExtendedData><Data name="id"><value>1</value></Data></ExtendedData>
    <Point><coordinates>-70.2532459795475,43.6399758607149</coordinates></Point>
  </Placemark>
  <Placemark>
    <name>Point2</name>
    <description>test</description>
    <Point><coordinates>-70.1,43.5</coordinates></Point>
  </Placemark>
  <Placemark>
    <ExtendedData>
      <SchemaData schemaUrl="#points">
        <SimpleData name="id">1</SimpleData>
        <SimpleData name="visible">True</SimpleData>
        <SimpleData name="height">tall</SimpleData>
        <SimpleData name="note">free text</SimpleData>
        <SimpleData name="empty"></SimpleData>
      </SchemaData>
    </ExtendedData>
    <Point><coordinates>-70.0,43.0</coordinates></Point>
  </Placemark>
  <Folder>
    <Placemark>
      <name></name>
      <ExtendedData>
        <SchemaData schemaUrl="#points"><SimpleData name="id">5</SimpleData></SchemaData>
        <Data name="id"><value>five</value></Data>
        <Data name="missing"></Data>
      </ExtendedData>
    </Placemark>
  </Folder>
</Document>
</kml>"##;

    #[test]
    fn test_extract_points() -> Result<()> {
        let collection = parse_kml(POINTS)?;
        let features = &collection.features;
        assert_eq!(features.len(), 4);

        // untyped Data stays text
        assert_eq!(features[0].properties.get("id"), Some(&PropertyValue::from("1")));
        match &features[0].geometry {
            Some(Geometry::Point(point)) => {
                assert_relative_eq!(point.x(), -70.253_245_979_547_5);
                assert_relative_eq!(point.y(), 43.639_975_860_714_9);
            }
            other => panic!("Expected Point geometry, got {other:?}"),
        }

        // name and description
        let keys: Vec<&str> = features[1].properties.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "description"]);
        assert_eq!(features[1].properties.get("name"), Some(&PropertyValue::from("Point2")));

        // typed SchemaData
        let typed = &features[2].properties;
        assert_eq!(typed.get("id"), Some(&PropertyValue::Int(1)));
        assert_eq!(typed.get("visible"), Some(&PropertyValue::Bool(true)));
        assert_eq!(typed.get("height"), Some(&PropertyValue::Invalid("tall".into())));
        assert_eq!(typed.get("note"), Some(&PropertyValue::from("free text")));
        assert!(!typed.contains_key("empty"));
        Ok(())
    }

    #[test]
    fn test_untyped_data_overwrites_typed_field() -> Result<()> {
        let collection = parse_kml(POINTS)?;
        let nested = &collection.features[3];

        assert!(nested.geometry.is_none());
        assert!(!nested.properties.contains_key("name"));
        assert!(!nested.properties.contains_key("missing"));
        assert_eq!(nested.properties.get("id"), Some(&PropertyValue::from("five")));
        Ok(())
    }

    #[test]
    fn test_schema_data_without_schemas_is_ignored() -> Result<()> {
        let collection = parse_kml(
            r##"<kml><Document><Placemark>
                <ExtendedData><SchemaData schemaUrl="#s"><SimpleData name="id">1</SimpleData></SchemaData></ExtendedData>
            </Placemark></Document></kml>"##,
        )?;
        assert!(collection.features[0].properties.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_schema_passes_text_through() -> Result<()> {
        let collection = parse_kml(
            r##"<kml><Document>
                <Schema id="a"><SimpleField name="id" type="int"/></Schema>
                <Placemark><ExtendedData><SchemaData schemaUrl="#b">
                    <SimpleData name="id">1</SimpleData>
                </SchemaData></ExtendedData></Placemark>
            </Document></kml>"##,
        )?;
        assert_eq!(
            collection.features[0].properties.get("id"),
            Some(&PropertyValue::from("1"))
        );
        Ok(())
    }

    #[test]
    fn test_mixed_geometries_keep_document_order() -> Result<()> {
        let collection = parse_kml(
            r"<kml><Document>
                <Placemark><LineString><coordinates>0,0 1,1</coordinates></LineString></Placemark>
                <Placemark><Point><coordinates>2,2</coordinates></Point></Placemark>
                <Placemark><Polygon><outerBoundaryIs><LinearRing>
                    <coordinates>0,0 1,0 1,1 0,0</coordinates>
                </LinearRing></outerBoundaryIs></Polygon></Placemark>
            </Document></kml>",
        )?;
        let types: Vec<_> = collection
            .features
            .iter()
            .map(|f| f.geometry_type().map(|t| t.to_string()))
            .collect();
        assert_eq!(
            types,
            vec![
                Some("LineString".to_string()),
                Some("Point".to_string()),
                Some("Polygon".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_read_kml_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("latin.kml");
        let mut bytes = b"<kml><Document><Placemark><name>Caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</name></Placemark></Document></kml>");
        std::fs::write(&path, bytes)?;

        let collection = read_kml(&path, &DecodeOptions::default().with_encoding("latin1"))?;
        assert_eq!(
            collection.features[0].properties.get("name"),
            Some(&PropertyValue::from("Café"))
        );

        assert!(matches!(
            read_kml(&path, &DecodeOptions::default().with_encoding("klingon")),
            Err(Error::UnknownEncoding(_))
        ));
        assert!(matches!(
            read_kml(dir.path().join("missing.kml"), &DecodeOptions::default()),
            Err(Error::InputNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_decode_options_from_json() -> anyhow::Result<()> {
        let options: DecodeOptions = serde_json::from_str(r#"{"encoding": "windows-1252"}"#)?;
        assert_eq!(options.encoding, "windows-1252");
        let options: DecodeOptions = serde_json::from_str("{}")?;
        assert_eq!(options, DecodeOptions::default());
        Ok(())
    }
}
