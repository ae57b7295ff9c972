//! Feature collection to KML.
use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    feature::{Feature, FeatureCollection, PropertyValue},
    geometry::write_geometry,
    style::{apply_styles, StyleDescriptor, StyleTable, SymbolSpec},
    xml::Element,
};

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// Property that carries a feature's style id into its placemark while the
/// document is built. It never survives into the written document.
pub const DEFAULT_STYLE_KEY: &str = "__kml_style_id";

#[derive(Clone, Debug)]
pub struct EncodeOptions {
    /// Property written as the placemark `<name>`.
    pub name_field: String,
    /// Property written as the placemark `<description>`.
    pub description_field: String,
    pub document_title: Option<String>,
    pub document_description: Option<String>,
    pub symbol: Option<SymbolSpec>,
    pub feature_style_key: String,
    pub pretty: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            name_field: "name".to_string(),
            description_field: "description".to_string(),
            document_title: None,
            document_description: None,
            symbol: None,
            feature_style_key: DEFAULT_STYLE_KEY.to_string(),
            pretty: false,
        }
    }
}

impl EncodeOptions {
    #[must_use]
    pub fn with_name_field(mut self, field: impl Into<String>) -> Self {
        self.name_field = field.into();
        self
    }

    #[must_use]
    pub fn with_description_field(mut self, field: impl Into<String>) -> Self {
        self.description_field = field.into();
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.document_title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.document_description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_symbol(mut self, symbol: SymbolSpec) -> Self {
        self.symbol = Some(symbol);
        self
    }

    #[must_use]
    pub fn with_feature_style_key(mut self, key: impl Into<String>) -> Self {
        self.feature_style_key = key.into();
        self
    }

    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Result of [`write_kml`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    /// The document was written to this path.
    File(PathBuf),
    /// The document text, with its format tag (`"kml"`).
    Data { data: String, format: &'static str },
}

/// Assigns a style id to every feature with a geometry and records it under
/// `linkage_key`.
fn tag_features(
    collection: &mut FeatureCollection,
    spec: &SymbolSpec,
    linkage_key: &str,
) -> Result<StyleTable> {
    let mut styles = StyleTable::new();
    for feature in &mut collection.features {
        if feature.properties.contains_key(linkage_key) {
            return Err(Error::ReservedKey(linkage_key.to_string()));
        }
        let Some(geom_type) = feature.geometry_type() else {
            continue;
        };
        let id = styles.insert(StyleDescriptor {
            geom_type,
            symbol: spec.resolve(feature),
        })?;
        feature
            .properties
            .insert(linkage_key, PropertyValue::String(id));
    }
    Ok(styles)
}

fn text_property<'a>(feature: &'a Feature, field: &str) -> Option<&'a PropertyValue> {
    feature.properties.get(field).filter(|v| !v.is_null())
}

fn placemark(feature: &Feature, options: &EncodeOptions) -> Element {
    let mut placemark = Element::new("Placemark");

    if let Some(name) = text_property(feature, &options.name_field) {
        placemark.push(Element::with_text("name", name.to_string()));
    }
    if let Some(description) = text_property(feature, &options.description_field) {
        placemark.push(Element::with_text("description", description.to_string()));
    }

    let data: Vec<Element> = feature
        .properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            Element::new("Data")
                .with_attribute("name", key)
                .with_child(Element::with_text("value", value.to_string()))
        })
        .collect();
    if !data.is_empty() {
        placemark.push(Element {
            children: data,
            ..Element::new("ExtendedData")
        });
    }

    if let Some(node) = feature.geometry.as_ref().and_then(write_geometry) {
        placemark.push(node);
    }
    placemark
}

fn base_document(collection: &FeatureCollection, options: &EncodeOptions) -> Element {
    let mut document = Element::new("Document");
    if let Some(title) = &options.document_title {
        document.push(Element::with_text("name", title));
    }
    if let Some(description) = &options.document_description {
        document.push(Element::with_text("description", description));
    }
    for feature in &collection.features {
        document.push(placemark(feature, options));
    }

    Element::new("kml")
        .with_attribute("xmlns", KML_NAMESPACE)
        .with_child(document)
}

/// Builds the styled KML tree for a collection. The collection itself is left
/// untouched.
///
/// # Errors
///
/// Returns [`Error::ReservedKey`] if a feature already carries the linkage
/// property, and [`Error::InvalidColor`] for a malformed symbol color.
pub fn encode_document(collection: &FeatureCollection, options: &EncodeOptions) -> Result<Element> {
    let Some(spec) = &options.symbol else {
        return Ok(base_document(collection, options));
    };

    if !collection.is_homogeneous() {
        log::warn!(
            "styling a collection with mixed geometry types, dominant type is {:?}",
            collection.dominant_geometry_type()
        );
    }

    let mut tagged = collection.clone();
    let styles = tag_features(&mut tagged, spec, &options.feature_style_key)?;
    let mut kml = base_document(&tagged, options);
    apply_styles(&mut kml, &styles, &options.feature_style_key)?;
    Ok(kml)
}

/// Encodes a collection as KML text.
///
/// # Errors
///
/// See [`encode_document`].
pub fn to_kml_string(collection: &FeatureCollection, options: &EncodeOptions) -> Result<String> {
    encode_document(collection, options)?.to_xml(options.pretty)
}

/// Appends `.kml` unless the file name already ends with it.
fn with_kml_extension(path: &Path) -> PathBuf {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("kml"));
    if has_extension {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".kml");
        PathBuf::from(name)
    }
}

/// Encodes a collection and writes it to `path`, or returns the text when no
/// path is given.
///
/// The document is fully serialized before anything is written.
///
/// # Errors
///
/// Fails like [`encode_document`], or with [`Error::Io`] if the file cannot
/// be written.
pub fn write_kml(
    collection: &FeatureCollection,
    path: Option<&Path>,
    options: &EncodeOptions,
) -> Result<Encoded> {
    let data = to_kml_string(collection, options)?;
    match path {
        Some(path) => {
            let path = with_kml_extension(path);
            std::fs::write(&path, data)?;
            log::info!("wrote {} features to {path:?}", collection.features.len());
            Ok(Encoded::File(path))
        }
        None => Ok(Encoded::Data {
            data,
            format: "kml",
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        extract::parse_kml,
        feature::Geometry,
        style::{Color, Symbol},
    };

    fn polygon_collection() -> FeatureCollection {
        let mut feature = Feature::new(Geometry::new_polygon(vec![vec![
            [-70.2, 43.6],
            [-74.2, 40.6],
            [-62.0, 35.0],
            [-70.2, 43.6],
        ]]));
        feature.set_property("id", 1);
        feature.set_property("name", "test");
        FeatureCollection::new(vec![feature])
    }

    fn polygon_symbol() -> Symbol {
        Symbol {
            color: Some(Color::Hex("#fff".to_string())),
            fill: Some(true),
            outline: Some(false),
            ..Symbol::default()
        }
    }

    #[test]
    fn test_unstyled_document() -> Result<()> {
        let mut collection = polygon_collection();
        collection.features[0].properties.insert("gone", PropertyValue::Null);
        let kml = encode_document(&collection, &EncodeOptions::default())?;

        assert_eq!(kml.attribute("xmlns"), Some(KML_NAMESPACE));
        let document = kml.child("Document").expect("Document present");
        assert!(document.child("name").is_none());
        assert_eq!(document.descendants("Style").len(), 0);
        assert_eq!(document.descendants("styleUrl").len(), 0);

        let placemark = document.child("Placemark").expect("Placemark present");
        assert_eq!(placemark.find_text("name"), Some("test"));
        assert!(placemark.child("description").is_none());
        let names: Vec<_> = placemark
            .find_all("ExtendedData/Data")
            .iter()
            .filter_map(|d| d.attribute("name"))
            .collect();
        assert_eq!(names, vec!["id", "name"]);
        assert!(placemark.child("Polygon").is_some());
        Ok(())
    }

    #[test]
    fn test_document_title_and_fields() -> Result<()> {
        let mut feature = Feature::new(Geometry::new_point(1.0, 2.0));
        feature.set_property("Name", "upper");
        feature.set_property("notes", "some notes");
        let collection = FeatureCollection::new(vec![feature, Feature::default()]);

        let options = EncodeOptions::default()
            .with_title("Title")
            .with_description("About")
            .with_name_field("Name")
            .with_description_field("notes");
        let kml = encode_document(&collection, &options)?;

        assert_eq!(kml.find_text("Document/name"), Some("Title"));
        assert_eq!(kml.find_text("Document/description"), Some("About"));
        assert_eq!(kml.find_text("Document/Placemark/name"), Some("upper"));
        assert_eq!(kml.find_text("Document/Placemark/description"), Some("some notes"));

        let placemarks = kml.find_all("Document/Placemark");
        assert!(placemarks[1].children.is_empty());
        Ok(())
    }

    #[test]
    fn test_polygon_style() -> Result<()> {
        let options =
            EncodeOptions::default().with_symbol(SymbolSpec::Uniform(polygon_symbol()));
        let kml = encode_document(&polygon_collection(), &options)?;
        let document = kml.child("Document").expect("Document present");

        let style = document.child("Style").expect("Style present");
        assert_eq!(style.find_text("PolyStyle/color"), Some("ffffffff"));
        assert_eq!(style.find_text("PolyStyle/fill"), Some("1"));
        assert_eq!(style.find_text("PolyStyle/outline"), Some("0"));

        let placemark = document.child("Placemark").expect("Placemark present");
        let id = style.attribute("id").expect("Style id");
        assert_eq!(placemark.find_text("styleUrl"), Some(format!("#{id}").as_str()));
        let names: Vec<_> = placemark
            .find_all("ExtendedData/Data")
            .iter()
            .filter_map(|d| d.attribute("name"))
            .collect();
        assert_eq!(names, vec!["id", "name"]);
        Ok(())
    }

    #[test]
    fn test_styles_are_deduplicated() -> Result<()> {
        let features = (0..10)
            .map(|i| {
                let mut feature = Feature::new(Geometry::new_point(f64::from(i), 0.0));
                feature.set_property("kind", if i % 3 == 0 { "a" } else { "b" });
                feature
            })
            .collect();
        let collection = FeatureCollection::new(features);

        let spec = SymbolSpec::per_feature(|feature: &Feature| {
            let red = feature.properties.get("kind") == Some(&PropertyValue::from("a"));
            Symbol {
                color: Some(Color::Rgb(if red { [255, 0, 0] } else { [0, 0, 255] })),
                ..Symbol::default()
            }
        });
        let options = EncodeOptions::default().with_symbol(spec);

        let first = encode_document(&collection, &options)?;
        let second = encode_document(&collection, &options)?;
        let ids = |kml: &Element| -> Vec<String> {
            kml.descendants("Style")
                .iter()
                .filter_map(|s| s.attribute("id").map(str::to_string))
                .collect()
        };

        assert_eq!(ids(&first).len(), 2);
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.descendants("styleUrl").len(), 10);
        assert!(!first.descendants("ExtendedData").is_empty());
        assert!(first
            .descendants("Data")
            .iter()
            .all(|d| d.attribute("name") != Some(DEFAULT_STYLE_KEY)));
        Ok(())
    }

    #[test]
    fn test_linkage_key_is_removed_with_empty_container() -> Result<()> {
        let collection = FeatureCollection::new(vec![Feature::new(Geometry::new_line_string(
            vec![[-70.2, 43.6], [-74.2, 40.6]],
        ))]);
        let options = EncodeOptions::default().with_symbol(SymbolSpec::Uniform(Symbol {
            color: Some(Color::Hex("#2dcd86".to_string())),
            width: Some(2.0),
            ..Symbol::default()
        }));
        let kml = encode_document(&collection, &options)?;

        assert!(kml.descendants("ExtendedData").is_empty());
        assert_eq!(kml.find_text("Document/Style/LineStyle/width"), Some("2"));
        Ok(())
    }

    #[test]
    fn test_reserved_key_collision() {
        let mut collection = polygon_collection();
        collection.features[0].set_property(DEFAULT_STYLE_KEY, "mine");
        let options =
            EncodeOptions::default().with_symbol(SymbolSpec::Uniform(polygon_symbol()));

        assert!(matches!(
            encode_document(&collection, &options),
            Err(Error::ReservedKey(key)) if key == DEFAULT_STYLE_KEY
        ));
    }

    #[test]
    fn test_invalid_color_aborts() {
        let options = EncodeOptions::default().with_symbol(SymbolSpec::Uniform(Symbol {
            color: Some(Color::Hex("#12345".to_string())),
            ..Symbol::default()
        }));
        assert!(matches!(
            encode_document(&polygon_collection(), &options),
            Err(Error::InvalidColor(_))
        ));
    }

    #[test]
    fn test_geometryless_feature_falls_back_to_linkage_key() -> Result<()> {
        let mut lonely = Feature::default();
        lonely.set_property("name", "nowhere");
        let mut collection = polygon_collection();
        collection.features.push(lonely);

        let options = EncodeOptions::default()
            .with_symbol(SymbolSpec::Uniform(polygon_symbol()))
            .with_feature_style_key("style_ref");
        let kml = encode_document(&collection, &options)?;

        let placemarks = kml.find_all("Document/Placemark");
        assert_eq!(placemarks[1].find_text("styleUrl"), Some("#style_ref"));
        assert_eq!(kml.descendants("Style").len(), 1);
        Ok(())
    }

    #[test]
    fn test_write_kml_to_memory_and_file() -> anyhow::Result<()> {
        let collection = polygon_collection();
        let options = EncodeOptions::default().with_pretty(true);

        let Encoded::Data { data, format } = write_kml(&collection, None, &options)? else {
            panic!("Expected in-memory output");
        };
        assert_eq!(format, "kml");
        assert!(data.starts_with("<?xml"));
        assert!(data.contains("\n  <Document>"));

        let dir = tempfile::tempdir()?;
        let written = write_kml(&collection, Some(&dir.path().join("out")), &options)?;
        let expected = dir.path().join("out.kml");
        assert_eq!(written, Encoded::File(expected.clone()));
        assert_eq!(std::fs::read_to_string(&expected)?, data);

        let kept = write_kml(&collection, Some(&dir.path().join("same.KML")), &options)?;
        assert_eq!(kept, Encoded::File(dir.path().join("same.KML")));

        let reparsed = parse_kml(&data)?;
        assert_eq!(reparsed.features.len(), 1);
        Ok(())
    }

    #[test]
    fn test_geojson_round_trip() -> Result<()> {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-70.2532459795475, 43.6399758607149] },
                    "properties": { "name": "Portland", "description": "harbor", "rank": 3 }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "LineString", "coordinates": [[-70.2, 43.6], [-74.2, 40.6]] },
                    "properties": { "name": "route" }
                }
            ]
        }"#;
        let collection = FeatureCollection::from_geojson(geojson)?;
        let options = EncodeOptions::default().with_symbol(SymbolSpec::Uniform(Symbol {
            color: Some(Color::Rgb([45, 205, 134])),
            scale: Some(1.5),
            ..Symbol::default()
        }));

        let decoded = parse_kml(&to_kml_string(&collection, &options)?)?;
        assert_eq!(decoded.features.len(), 2);

        let first = &decoded.features[0];
        match &first.geometry {
            Some(Geometry::Point(point)) => {
                approx::assert_relative_eq!(point.x(), -70.253_245_979_547_5);
                approx::assert_relative_eq!(point.y(), 43.639_975_860_714_9);
            }
            other => panic!("Expected Point geometry, got {other:?}"),
        }
        assert_eq!(first.properties.get("name"), Some(&PropertyValue::from("Portland")));
        assert_eq!(
            first.properties.get("description"),
            Some(&PropertyValue::from("harbor"))
        );
        assert_eq!(first.properties.get("rank"), Some(&PropertyValue::from("3")));
        assert!(decoded
            .features
            .iter()
            .all(|f| !f.properties.contains_key(DEFAULT_STYLE_KEY)));
        assert_eq!(
            decoded.features[1].geometry,
            Some(Geometry::new_line_string(vec![[-70.2, 43.6], [-74.2, 40.6]]))
        );
        Ok(())
    }

    #[test]
    fn test_name_and_description_survive_exactly() -> Result<()> {
        let mut feature = Feature::new(Geometry::new_point(-70.25, 43.64));
        feature.set_property("name", "  Harbor  ");
        feature.set_property("description", "\nline one\nline two\n");
        feature.set_property("note", "fish & chips <fresh> \"daily\"");
        let collection = FeatureCollection::new(vec![feature]);

        for pretty in [false, true] {
            let options = EncodeOptions::default().with_pretty(pretty);
            let decoded = parse_kml(&to_kml_string(&collection, &options)?)?;
            let properties = &decoded.features[0].properties;

            assert_eq!(properties.get("name"), Some(&PropertyValue::from("  Harbor  ")));
            assert_eq!(
                properties.get("description"),
                Some(&PropertyValue::from("\nline one\nline two\n"))
            );
            assert_eq!(
                properties.get("note"),
                Some(&PropertyValue::from("fish & chips <fresh> \"daily\""))
            );
        }
        Ok(())
    }

    #[test]
    fn test_non_string_name_field() -> Result<()> {
        let mut feature = Feature::new(Geometry::new_point(1.0, 2.0));
        feature.set_property("rank", 7);
        feature.set_property("ratio", 0.5);
        let collection = FeatureCollection::new(vec![feature]);

        let options = EncodeOptions::default()
            .with_name_field("rank")
            .with_description_field("ratio");
        let kml = encode_document(&collection, &options)?;
        assert_eq!(kml.find_text("Document/Placemark/name"), Some("7"));
        assert_eq!(kml.find_text("Document/Placemark/description"), Some("0.5"));

        let decoded = parse_kml(&kml.to_xml(false)?)?;
        let properties = &decoded.features[0].properties;
        assert_eq!(properties.get("name"), Some(&PropertyValue::from("7")));
        assert_eq!(properties.get("rank"), Some(&PropertyValue::from("7")));
        Ok(())
    }

    #[test]
    fn test_polygon_without_rings_is_written_without_geometry() -> Result<()> {
        let mut feature = Feature::new(Geometry::Polygon(Vec::new()));
        feature.set_property("name", "void");
        let kml = encode_document(
            &FeatureCollection::new(vec![feature]),
            &EncodeOptions::default(),
        )?;

        assert!(kml.descendants("Polygon").is_empty());
        let decoded = parse_kml(&kml.to_xml(false)?)?;
        assert_eq!(decoded.features.len(), 1);
        assert!(decoded.features[0].geometry.is_none());
        Ok(())
    }

    #[test]
    fn test_write_failure_is_reported() {
        let missing_dir = Path::new("/nonexistent-dir-for-geokml/out");
        assert!(matches!(
            write_kml(&polygon_collection(), Some(missing_dir), &EncodeOptions::default()),
            Err(Error::Io(_))
        ));
    }
}
