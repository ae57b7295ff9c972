//! Conversion between KML geometry nodes and [`Geometry`].
//!
//! KML stores coordinates as whitespace separated `lon,lat[,alt]` tuples
//! inside `<coordinates>`. Altitude is dropped on the way in and never written
//! on the way out. Numbers that fail to parse become `NaN`.
use geo::{Coord, LineString, Point};

use crate::{feature::Geometry, xml::Element};

const OUTER_RING: &str = "outerBoundaryIs/LinearRing/coordinates";
const INNER_RINGS: &str = "innerBoundaryIs/LinearRing/coordinates";

fn parse_number(token: Option<&str>) -> f64 {
    token
        .and_then(|t| t.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

/// Parses a KML coordinate string into `x, y` pairs.
#[must_use]
pub fn parse_coordinates(text: &str) -> Vec<Coord> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let x = parse_number(parts.next());
            let y = parse_number(parts.next());
            Coord { x, y }
        })
        .collect()
}

fn ring(coordinates: Option<&str>) -> LineString {
    LineString::new(parse_coordinates(coordinates.unwrap_or_default()))
}

/// Reads the geometry of a placemark.
///
/// `Point`, `LineString` and `Polygon` children are probed in that order and
/// the first one present wins; a placemark with none of them has no geometry.
#[must_use]
pub fn read_geometry(placemark: &Element) -> Option<Geometry> {
    if let Some(point) = placemark.child("Point") {
        let coords = parse_coordinates(point.find_text("coordinates").unwrap_or_default());
        let first = coords.first().copied().unwrap_or(Coord {
            x: f64::NAN,
            y: f64::NAN,
        });
        return Some(Geometry::Point(Point::from(first)));
    }

    if let Some(line) = placemark.child("LineString") {
        return Some(Geometry::LineString(ring(line.find_text("coordinates"))));
    }

    if let Some(polygon) = placemark.child("Polygon") {
        let mut rings = vec![ring(polygon.find_text(OUTER_RING))];
        rings.extend(
            polygon
                .find_all(INNER_RINGS)
                .into_iter()
                .map(|node| ring(node.text.as_deref())),
        );
        return Some(Geometry::Polygon(rings));
    }

    None
}

fn format_coordinates<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> String {
    coords
        .into_iter()
        .map(|c| format!("{},{}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn linear_ring(boundary: &str, line: &LineString) -> Element {
    Element::new(boundary).with_child(
        Element::new("LinearRing")
            .with_child(Element::with_text("coordinates", format_coordinates(&line.0))),
    )
}

/// Builds the KML node for a geometry. A polygon without rings has no KML
/// form and yields `None`.
#[must_use]
pub fn write_geometry(geometry: &Geometry) -> Option<Element> {
    let node = match geometry {
        Geometry::Point(point) => Element::new("Point").with_child(Element::with_text(
            "coordinates",
            format_coordinates([&point.0]),
        )),
        Geometry::LineString(line) => Element::new("LineString")
            .with_child(Element::with_text("coordinates", format_coordinates(&line.0))),
        Geometry::Polygon(rings) => {
            let (outer, inner) = rings.split_first()?;
            let mut polygon =
                Element::new("Polygon").with_child(linear_ring("outerBoundaryIs", outer));
            for ring in inner {
                polygon.push(linear_ring("innerBoundaryIs", ring));
            }
            polygon
        }
    };
    Some(node)
}
