//! Typed field declarations from KML `<Schema>` blocks.
use hashbrown::HashMap;

use crate::{feature::PropertyValue, xml::Element};

/// The primitive type of a `<SimpleField>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Int,
    UInt,
    Short,
    UShort,
    Float,
    Double,
    Bool,
    String,
}

impl FieldType {
    /// Maps a KML type tag; anything unknown is treated as a string.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "int" => FieldType::Int,
            "uint" => FieldType::UInt,
            "short" => FieldType::Short,
            "ushort" => FieldType::UShort,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "bool" => FieldType::Bool,
            _ => FieldType::String,
        }
    }

    /// Converts field text into a typed value. Numbers that do not parse
    /// become [`PropertyValue::Invalid`] holding the original text.
    #[must_use]
    pub fn coerce(self, text: &str) -> PropertyValue {
        match self {
            FieldType::Int | FieldType::UInt | FieldType::Short | FieldType::UShort => {
                parse_leading_int(text).unwrap_or_else(|| PropertyValue::Invalid(text.to_string()))
            }
            FieldType::Float | FieldType::Double => text
                .trim()
                .parse::<f64>()
                .map_or_else(|_| PropertyValue::Invalid(text.to_string()), PropertyValue::Float),
            FieldType::Bool => PropertyValue::Bool(text.trim().eq_ignore_ascii_case("true")),
            FieldType::String => PropertyValue::String(text.to_string()),
        }
    }
}

/// Reads an optionally signed run of leading decimal digits, ignoring
/// whatever follows (`"12px"` is 12, `"1.9"` is 1). Runs too long for `i64`
/// are kept as a float.
fn parse_leading_int(text: &str) -> Option<PropertyValue> {
    let text = text.trim_start();
    let sign_len = usize::from(text.starts_with(['-', '+']));
    let digits = text[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    let number = &text[..sign_len + digits];
    match number.parse::<i64>() {
        Ok(value) => Some(PropertyValue::Int(value)),
        Err(_) => number.parse::<f64>().ok().map(PropertyValue::Float),
    }
}

/// Field types by field name for one schema.
pub type SchemaFields = HashMap<String, FieldType>;

/// Field declarations of every schema in a document, keyed by schema id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaTable {
    schemas: HashMap<String, SchemaFields>,
}

impl SchemaTable {
    /// Collects every `<Schema>` in the document. Returns `None` when there
    /// are none.
    #[must_use]
    pub fn from_document(root: &Element) -> Option<SchemaTable> {
        let nodes = root.descendants("Schema");
        if nodes.is_empty() {
            return None;
        }

        let mut schemas = HashMap::new();
        for node in nodes {
            let Some(id) = node.attribute("id").or_else(|| node.attribute("name")) else {
                log::warn!("skipping <Schema> without id");
                continue;
            };
            let fields: SchemaFields = node
                .children_named("SimpleField")
                .filter_map(|field| {
                    let name = field.attribute("name")?;
                    let tag = field.attribute("type").unwrap_or_default();
                    Some((name.to_string(), FieldType::from_tag(tag)))
                })
                .collect();
            schemas.insert(id.to_string(), fields);
        }

        log::debug!("found {} schemas", schemas.len());
        Some(SchemaTable { schemas })
    }

    /// Looks a schema up by id or by `#id` reference.
    #[must_use]
    pub fn get(&self, reference: &str) -> Option<&SchemaFields> {
        self.schemas.get(reference.trim_start_matches('#'))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
