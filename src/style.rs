//! Symbol styling for generated KML.
//!
//! Every styled feature gets a [`StyleDescriptor`] made of its geometry type
//! and its [`Symbol`]. Descriptors are deduplicated by the MD5 digest of their
//! canonical JSON form, so features that look the same share one `<Style>`
//! block. The style id travels from the feature to its placemark through a
//! reserved linkage property, which [`apply_styles`] turns into a
//! `<styleUrl>` and then removes.
use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    feature::{Feature, GeometryType},
    xml::Element,
};

/// A symbol color: a hex string (`#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`) or
/// an `[r, g, b]` triple.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Color {
    Hex(String),
    Rgb([i64; 3]),
}

impl TryFrom<Value> for Color {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match &value {
            Value::String(hex) => return Ok(Color::Hex(hex.clone())),
            Value::Array(channels) if channels.len() == 3 => {
                let channels: Option<Vec<i64>> = channels.iter().map(Value::as_i64).collect();
                if let Some(channels) = channels {
                    return Ok(Color::Rgb([channels[0], channels[1], channels[2]]));
                }
            }
            _ => {}
        }
        Err(Error::InvalidColor(value.to_string()))
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Color::Hex(hex) => serializer.serialize_str(hex),
            Color::Rgb(channels) => channels.serialize(serializer),
        }
    }
}

impl Color {
    /// The color as `bbggrr` plus the alpha channel of the hex form, if it
    /// has one.
    fn bgr(&self) -> Result<(String, Option<u8>)> {
        match self {
            Color::Rgb(channels) => {
                let [r, g, b] = channels.map(|c| c.clamp(0, 255));
                Ok((format!("{b:02x}{g:02x}{r:02x}"), None))
            }
            Color::Hex(hex) => {
                let invalid = || Error::InvalidColor(hex.clone());
                let digits = hex.strip_prefix('#').unwrap_or(hex);
                if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                let digits = match digits.len() {
                    3 | 4 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
                    6 | 8 => digits.to_string(),
                    _ => return Err(invalid()),
                }
                .to_ascii_lowercase();

                let alpha = match digits.get(6..8) {
                    Some(a) => Some(u8::from_str_radix(a, 16).map_err(|_| invalid())?),
                    None => None,
                };
                Ok((format!("{}{}{}", &digits[4..6], &digits[2..4], &digits[0..2]), alpha))
            }
        }
    }
}

/// How a feature is drawn. Only the fields that apply to the feature's
/// geometry type are used.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Symbol {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<u8>,
    /// Points only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Icon URL, points only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Polygons only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
    /// Polygons only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outline: Option<bool>,
    /// Line strings only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

impl Symbol {
    /// Encodes the symbol color as a KML `aabbggrr` string.
    ///
    /// An explicit `alpha` wins over the alpha digits of a hex color; without
    /// either the color is opaque.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidColor`] for hex strings that are not 3, 4, 6 or
    /// 8 hex digits.
    pub fn kml_color(&self) -> Result<Option<String>> {
        let Some(color) = &self.color else {
            return Ok(None);
        };
        let (bgr, hex_alpha) = color.bgr()?;
        let alpha = self.alpha.or(hex_alpha).unwrap_or(u8::MAX);
        Ok(Some(format!("{alpha:02x}{bgr}")))
    }
}

/// The style requested for a conversion: one symbol for every feature, or a
/// function evaluated once per feature.
#[derive(Clone)]
pub enum SymbolSpec {
    Uniform(Symbol),
    PerFeature(Arc<dyn Fn(&Feature) -> Symbol + Send + Sync>),
}

impl SymbolSpec {
    #[must_use]
    pub fn per_feature<F>(f: F) -> Self
    where
        F: Fn(&Feature) -> Symbol + Send + Sync + 'static,
    {
        SymbolSpec::PerFeature(Arc::new(f))
    }

    #[must_use]
    pub fn resolve(&self, feature: &Feature) -> Symbol {
        match self {
            SymbolSpec::Uniform(symbol) => symbol.clone(),
            SymbolSpec::PerFeature(f) => f(feature),
        }
    }
}

impl fmt::Debug for SymbolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolSpec::Uniform(symbol) => f.debug_tuple("Uniform").field(symbol).finish(),
            SymbolSpec::PerFeature(_) => f.debug_tuple("PerFeature").finish(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDescriptor {
    pub geom_type: GeometryType,
    pub symbol: Symbol,
}

/// Writes a JSON value with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

impl StyleDescriptor {
    /// Hex MD5 digest of the canonical JSON form.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor cannot be serialized to JSON.
    pub fn style_id(&self) -> Result<String> {
        let canonical = canonical_json(&serde_json::to_value(self)?);
        Ok(format!("{:x}", md5::compute(canonical.as_bytes())))
    }
}

/// Distinct style descriptors by id, in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct StyleTable {
    styles: IndexMap<String, StyleDescriptor>,
}

impl StyleTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor unless an identical one is present, and returns its
    /// id either way.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor id cannot be computed.
    pub fn insert(&mut self, descriptor: StyleDescriptor) -> Result<String> {
        let id = descriptor.style_id()?;
        self.styles.entry(id.clone()).or_insert(descriptor);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StyleDescriptor> {
        self.styles.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StyleDescriptor)> {
        self.styles.iter().map(|(id, d)| (id.as_str(), d))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// Builds the `<Style>` block for one descriptor.
///
/// # Errors
///
/// Returns [`Error::InvalidColor`] if the symbol color is malformed.
pub fn style_element(id: &str, descriptor: &StyleDescriptor) -> Result<Element> {
    let symbol = &descriptor.symbol;
    let color = symbol.kml_color()?;
    let mut section = match descriptor.geom_type {
        GeometryType::Point => Element::new("IconStyle"),
        GeometryType::Polygon => Element::new("PolyStyle"),
        GeometryType::LineString => Element::new("LineStyle"),
    };
    if let Some(color) = color {
        section.push(Element::with_text("color", color));
    }

    let flag = |on: bool| if on { "1" } else { "0" };
    match descriptor.geom_type {
        GeometryType::Point => {
            if let Some(scale) = symbol.scale {
                section.push(Element::with_text("scale", scale.to_string()));
            }
            if let Some(icon) = &symbol.icon {
                section.push(Element::new("Icon").with_child(Element::with_text("href", icon)));
            }
        }
        GeometryType::Polygon => {
            if let Some(fill) = symbol.fill {
                section.push(Element::with_text("fill", flag(fill)));
            }
            if let Some(outline) = symbol.outline {
                section.push(Element::with_text("outline", flag(outline)));
            }
        }
        GeometryType::LineString => {
            if let Some(width) = symbol.width {
                section.push(Element::with_text("width", width.to_string()));
            }
        }
    }

    Ok(Element::new("Style")
        .with_attribute("id", id)
        .with_child(section))
}

/// Adds the style blocks to `<Document>` and points every placemark at its
/// style.
///
/// A placemark whose linkage value is missing references `#<linkage_key>`.
/// The linkage `Data` entry is removed afterwards, together with its
/// `ExtendedData` container when nothing else is left in it.
///
/// # Errors
///
/// Returns [`Error::MissingElement`] when there is no `<Document>`, and any
/// error raised while building a style block.
pub fn apply_styles(root: &mut Element, styles: &StyleTable, linkage_key: &str) -> Result<()> {
    let document = if root.is("Document") {
        &mut *root
    } else {
        root.child_mut("Document")
            .ok_or_else(|| Error::MissingElement("Document".to_string()))?
    };
    for (id, descriptor) in styles.iter() {
        document.push(style_element(id, descriptor)?);
    }
    log::debug!("added {} style blocks", styles.len());

    root.for_each_descendant_mut("Placemark", &mut |placemark: &mut Element| {
        link_placemark(placemark, linkage_key);
        Ok(())
    })
}

fn is_linkage(element: &Element, linkage_key: &str) -> bool {
    element.is("Data") && element.attribute("name") == Some(linkage_key)
}

fn link_placemark(placemark: &mut Element, linkage_key: &str) {
    let style_id = placemark
        .find_all("ExtendedData/Data")
        .into_iter()
        .find(|data| is_linkage(data, linkage_key))
        .and_then(|data| data.find_text("value"))
        .unwrap_or(linkage_key)
        .to_string();

    let position = placemark
        .children
        .iter()
        .take_while(|c| c.is("name") || c.is("description"))
        .count();
    placemark
        .children
        .insert(position, Element::with_text("styleUrl", format!("#{style_id}")));

    if let Some(extended) = placemark.child_mut("ExtendedData") {
        extended.children.retain(|c| !is_linkage(c, linkage_key));
        if extended.children.is_empty() {
            placemark.children.retain(|c| !c.is("ExtendedData"));
        }
    }
}
