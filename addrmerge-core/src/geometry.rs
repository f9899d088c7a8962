//! Geometry reconstruction and geodesic measurements.
//!
//! Coordinates are WGS84 with `x = longitude` and `y = latitude`. Distances
//! are metres on the WGS84 ellipsoid via [`geo::Geodesic`]; nothing here uses
//! planar distances in degrees.
//!
//! Point-to-geometry distances locate the closest point of each boundary
//! segment in a local equirectangular frame centred on the query point, then
//! measure the geodesic distance to it. At the scales address matching works
//! at (metres to a few hundred metres) the frame's distortion is negligible.

use geo::{
    Coord, CoordsIter, Destination, Distance, Geodesic, Geometry, Intersects, Line, LineString,
    Point, Polygon,
};

/// Number of vertices used to approximate a buffered point.
pub const BUFFER_SEGMENTS: u32 = 32;

/// Mean length of one degree of latitude in metres.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Build the geometry of a way from its node references.
///
/// Returns `None` when any reference cannot be resolved or fewer than two
/// nodes are present. A way whose first and last references coincide and that
/// has at least four references becomes a polygon; anything else is a
/// linestring.
pub fn way_geometry<F>(node_refs: &[i64], mut resolve: F) -> Option<Geometry<f64>>
where
    F: FnMut(i64) -> Option<Coord<f64>>,
{
    if node_refs.len() < 2 {
        return None;
    }
    let coords = node_refs
        .iter()
        .map(|node_id| resolve(*node_id))
        .collect::<Option<Vec<_>>>()?;
    let closed = node_refs.len() >= 4 && node_refs.first() == node_refs.last();
    let line = LineString::from(coords);
    Some(if closed {
        Geometry::Polygon(Polygon::new(line, Vec::new()))
    } else {
        Geometry::LineString(line)
    })
}

/// Build a multipolygon relation boundary by concatenating member ways.
///
/// Members are joined in the order given; a vertex repeated at the junction of
/// two consecutive members is kept once. A closed result becomes a polygon,
/// an open one a linestring.
pub fn relation_geometry<'a, I>(member_lines: I) -> Option<Geometry<f64>>
where
    I: IntoIterator<Item = &'a LineString<f64>>,
{
    let mut ring: Vec<Coord<f64>> = Vec::new();
    for line in member_lines {
        for coord in line.coords() {
            if ring.last() != Some(coord) {
                ring.push(*coord);
            }
        }
    }
    if ring.len() < 2 {
        return None;
    }
    let closed = ring.len() >= 4 && ring.first() == ring.last();
    let line = LineString::from(ring);
    Some(if closed {
        Geometry::Polygon(Polygon::new(line, Vec::new()))
    } else {
        Geometry::LineString(line)
    })
}

/// Approximate a geodesic circle of `radius` metres around `centre`.
#[expect(
    clippy::float_arithmetic,
    reason = "buffer vertices are spaced by a fixed bearing step"
)]
pub fn point_buffer(centre: Point<f64>, radius: f64) -> Polygon<f64> {
    let step = 360.0 / f64::from(BUFFER_SEGMENTS);
    let ring: Vec<Coord<f64>> = (0..BUFFER_SEGMENTS)
        .map(|vertex| Geodesic.destination(centre, step * f64::from(vertex), radius).0)
        .collect();
    // `Polygon::new` closes the ring.
    Polygon::new(LineString::from(ring), Vec::new())
}

/// Whether a buffer polygon is a simple, finite, non-degenerate ring.
///
/// Zero-radius buffers collapse onto a point and are invalid, as are rings
/// that cross themselves or wrap across the antimeridian.
#[expect(
    clippy::float_arithmetic,
    reason = "antimeridian detection compares longitude spans"
)]
pub fn is_valid_buffer(buffer: &Polygon<f64>) -> bool {
    let ring = buffer.exterior();
    if ring.0.len() < 4 || !ring.is_closed() {
        return false;
    }
    if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return false;
    }
    let segments: Vec<Line<f64>> = ring.lines().collect();
    if segments
        .iter()
        .any(|segment| (segment.end.x - segment.start.x).abs() > 180.0)
    {
        return false;
    }
    let count = segments.len();
    for (i, first) in segments.iter().enumerate() {
        for (j, second) in segments.iter().enumerate().skip(i + 2) {
            // The closing segment touches the opening one.
            if i == 0 && j + 1 == count {
                continue;
            }
            if first.intersects(second) {
                return false;
            }
        }
    }
    true
}

/// Geodesic distance in metres from a point to a geometry.
///
/// Zero when the point lies inside or on the geometry.
pub fn point_distance(point: Point<f64>, geometry: &Geometry<f64>) -> f64 {
    if geometry.intersects(&point) {
        return 0.0;
    }
    segments(geometry)
        .into_iter()
        .map(|segment| {
            let closest = closest_on_segment(point.0, segment);
            Geodesic.distance(point, Point::from(closest))
        })
        .fold(f64::INFINITY, f64::min)
}

/// Geodesic distance in metres between two geometries.
///
/// Zero when they intersect. Otherwise the minimum distance from any vertex
/// of one to the other, which is exact for non-crossing boundaries.
pub fn geometry_distance(lhs: &Geometry<f64>, rhs: &Geometry<f64>) -> f64 {
    if lhs.intersects(rhs) {
        return 0.0;
    }
    let forward = lhs
        .coords_iter()
        .map(|coord| point_distance(Point::from(coord), rhs));
    let backward = rhs
        .coords_iter()
        .map(|coord| point_distance(Point::from(coord), lhs));
    forward.chain(backward).fold(f64::INFINITY, f64::min)
}

/// Whether two geometries, buffered by `lhs_radius` and `rhs_radius` metres,
/// intersect.
#[expect(
    clippy::float_arithmetic,
    reason = "buffer intersection compares distance with the summed radii"
)]
pub fn buffers_intersect(
    lhs: &Geometry<f64>,
    lhs_radius: f64,
    rhs: &Geometry<f64>,
    rhs_radius: f64,
) -> bool {
    geometry_distance(lhs, rhs) <= lhs_radius + rhs_radius
}

/// Degrees of (longitude, latitude) that cover `metres` around `latitude`.
///
/// Overestimates slightly so envelope prefilters never drop a true match.
#[expect(
    clippy::float_arithmetic,
    reason = "metre to degree conversion scales by latitude"
)]
pub(crate) fn degree_padding(metres: f64, latitude: f64) -> (f64, f64) {
    let lat_pad = metres / METRES_PER_DEGREE * 1.01 + 1e-9;
    let cos_lat = latitude.to_radians().cos().abs().max(1e-6);
    (lat_pad / cos_lat, lat_pad)
}

fn segments(geometry: &Geometry<f64>) -> Vec<Line<f64>> {
    match geometry {
        Geometry::Point(point) => vec![Line::new(point.0, point.0)],
        Geometry::LineString(line) => line.lines().collect(),
        Geometry::Polygon(polygon) => polygon_segments(polygon),
        Geometry::MultiLineString(lines) => lines.iter().flat_map(LineString::lines).collect(),
        Geometry::MultiPolygon(polygons) => polygons.iter().flat_map(polygon_segments).collect(),
        Geometry::Line(line) => vec![*line],
        other => other
            .coords_iter()
            .map(|coord| Line::new(coord, coord))
            .collect(),
    }
}

fn polygon_segments(polygon: &Polygon<f64>) -> Vec<Line<f64>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .flat_map(LineString::lines)
        .collect()
}

#[expect(
    clippy::float_arithmetic,
    reason = "segment projection works in a local planar frame"
)]
fn closest_on_segment(origin: Coord<f64>, segment: Line<f64>) -> Coord<f64> {
    let scale = origin.y.to_radians().cos();
    let ax = (segment.start.x - origin.x) * scale;
    let ay = segment.start.y - origin.y;
    let dx = (segment.end.x - segment.start.x) * scale;
    let dy = segment.end.y - segment.start.y;
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq > 0.0 {
        (-(ax * dx + ay * dy) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Coord {
        x: segment.start.x + (segment.end.x - segment.start.x) * t,
        y: segment.start.y + (segment.end.y - segment.start.y) * t,
    }
}
