use geo::algorithm::contains::Contains;
use geo::algorithm::intersects::Intersects;
use geo::orient::{Direction, Orient};
use geo::{Area, BoundingRect, Centroid, Coord, EuclideanLength, LineString, MultiPolygon, Point, Polygon};
use geo::{Rotate, Translate};
use geo_clipper::{Clipper, EndType, JoinType};

/// Scale factor for geo-clipper (works with integers internally).
/// Projected coordinates are in meters, so this keeps micrometer precision.
pub const CLIPPER_SCALE: f64 = 1e6;

pub fn area(polygon: &Polygon<f64>) -> f64 {
    polygon.unsigned_area()
}

/// Length of all rings, exterior and interiors
pub fn perimeter(polygon: &Polygon<f64>) -> f64 {
    polygon.exterior().euclidean_length()
        + polygon
            .interiors()
            .iter()
            .map(|ring| ring.euclidean_length())
            .sum::<f64>()
}

pub fn centroid(polygon: &Polygon<f64>) -> Option<Coord<f64>> {
    polygon.centroid().map(|p| p.0)
}

pub fn bounding_box_center(polygon: &Polygon<f64>) -> Option<Coord<f64>> {
    polygon.bounding_rect().map(|rect| rect.center())
}

/// Mean of every stored vertex, closing vertices included
///
/// Returns `None` for a polygon without vertices.
pub fn mean_vertex_xy(polygon: &Polygon<f64>) -> Option<Coord<f64>> {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut count = 0usize;

    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
    for coord in rings.flat_map(|ring| ring.coords()) {
        sum_x += coord.x;
        sum_y += coord.y;
        count += 1;
    }

    if count == 0 {
        return None;
    }

    Some(Coord {
        x: sum_x / count as f64,
        y: sum_y / count as f64,
    })
}

/// Exterior counter-clockwise, interiors clockwise
///
/// Clipper fills by winding number, so a hole wound like its exterior would
/// count as filled.
pub fn normalized(polygon: &Polygon<f64>) -> Polygon<f64> {
    polygon.orient(Direction::Default)
}

/// Area of `a ∩ b`, independent of ring winding
pub fn intersection_area(a: &Polygon<f64>, b: &Polygon<f64>) -> f64 {
    if a.exterior().0.is_empty() || b.exterior().0.is_empty() || !a.intersects(b) {
        return 0.0;
    }
    normalized(a)
        .intersection(&normalized(b), CLIPPER_SCALE)
        .unsigned_area()
}

/// Outward buffer with round joins approximated by `quarter_segments` per quarter turn
pub fn buffer(polygon: &Polygon<f64>, distance: f64, quarter_segments: u32) -> MultiPolygon<f64> {
    if distance <= 0.0 {
        return MultiPolygon(vec![polygon.clone()]);
    }

    // Clipper picks steps per full turn as pi / acos(1 - tolerance / delta),
    // so this tolerance yields 4 * quarter_segments steps.
    let step = std::f64::consts::FRAC_PI_4 / quarter_segments.max(1) as f64;
    let arc_tolerance = distance * (1.0 - step.cos()) * CLIPPER_SCALE;

    normalized(polygon).offset(
        distance,
        JoinType::Round(arc_tolerance),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    )
}

pub fn within(point: Coord<f64>, region: &MultiPolygon<f64>) -> bool {
    region.contains(&Point::from(point))
}

/// Rotate clockwise by `degrees` about `about`
pub fn rotate(polygon: &Polygon<f64>, degrees: f64, about: Coord<f64>) -> Polygon<f64> {
    polygon.rotate_around_point(-degrees, Point::from(about))
}

/// Rotate a single coordinate clockwise by `degrees` about `about`
pub fn rotate_coord(coord: Coord<f64>, degrees: f64, about: Coord<f64>) -> Coord<f64> {
    Point::from(coord)
        .rotate_around_point(-degrees, Point::from(about))
        .0
}

pub fn translate(polygon: &Polygon<f64>, dx: f64, dy: f64) -> Polygon<f64> {
    polygon.translate(dx, dy)
}

/// Axis-aligned rectangle of `width` x `height` centered at `center`
pub fn rectangle(center: Coord<f64>, width: f64, height: f64) -> Polygon<f64> {
    let w2 = width / 2.0;
    let h2 = height / 2.0;
    Polygon::new(
        LineString::from(vec![
            (center.x - w2, center.y - h2),
            (center.x + w2, center.y - h2),
            (center.x + w2, center.y + h2),
            (center.x - w2, center.y + h2),
            (center.x - w2, center.y - h2),
        ]),
        vec![],
    )
}

/// Closed ring of `num_points` vertices traced by parametric angle 0..2π
pub fn ellipse(center: Coord<f64>, semi_x: f64, semi_y: f64, num_points: usize) -> Polygon<f64> {
    let mut coords: Vec<Coord<f64>> = (0..num_points)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * (i as f64) / (num_points as f64);
            Coord {
                x: center.x + semi_x * angle.cos(),
                y: center.y + semi_y * angle.sin(),
            }
        })
        .collect();

    if let Some(&first) = coords.first() {
        coords.push(first);
    }

    Polygon::new(LineString::new(coords), vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + side, y0),
                (x0 + side, y0 + side),
                (x0, y0 + side),
                (x0, y0),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_area_and_perimeter() {
        let poly = square(0.0, 0.0, 10.0);
        assert_relative_eq!(area(&poly), 100.0);
        assert_relative_eq!(perimeter(&poly), 40.0);
    }

    #[test]
    fn test_anchor_points() {
        let triangle = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (6.0, 0.0), (0.0, 3.0), (0.0, 0.0)]),
            vec![],
        );
        let c = centroid(&triangle).unwrap();
        assert_relative_eq!(c.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(c.y, 1.0, epsilon = 1e-12);

        let bbox = bounding_box_center(&triangle).unwrap();
        assert_relative_eq!(bbox.x, 3.0);
        assert_relative_eq!(bbox.y, 1.5);

        // closing vertex is counted: (0+6+0+0)/4, (0+0+3+0)/4
        let mean = mean_vertex_xy(&triangle).unwrap();
        assert_relative_eq!(mean.x, 1.5);
        assert_relative_eq!(mean.y, 0.75);
    }

    #[test]
    fn test_mean_vertex_of_empty_polygon() {
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        assert!(mean_vertex_xy(&empty).is_none());
        assert!(centroid(&empty).is_none());
    }

    #[test]
    fn test_intersection_area() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 5.0, 10.0);
        assert_relative_eq!(intersection_area(&a, &b), 25.0, epsilon = 1e-6);

        let far = square(100.0, 100.0, 1.0);
        assert_eq!(intersection_area(&a, &far), 0.0);
    }

    fn square_with_hole(hole_clockwise: bool) -> Polygon<f64> {
        let mut hole = vec![(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0), (2.0, 2.0)];
        if hole_clockwise {
            hole.reverse();
        }
        Polygon::new(square(0.0, 0.0, 10.0).exterior().clone(), vec![LineString::from(hole)])
    }

    #[test]
    fn test_intersection_ignores_hole_winding() {
        let full = square(0.0, 0.0, 10.0);
        for clockwise in [true, false] {
            let stand = square_with_hole(clockwise);
            assert_relative_eq!(area(&stand), 64.0);
            assert_relative_eq!(intersection_area(&stand, &full), 64.0, epsilon = 1e-6);
            assert_relative_eq!(intersection_area(&full, &stand), 64.0, epsilon = 1e-6);
        }

        // clockwise exterior without holes
        let mut reversed = square(0.0, 0.0, 10.0);
        reversed.exterior_mut(|ring| ring.0.reverse());
        assert_relative_eq!(intersection_area(&reversed, &full), 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_buffer_keeps_same_winding_hole_open() {
        let buffered = buffer(&square_with_hole(false), 0.5, 6);
        assert!(!within(Coord { x: 5.0, y: 5.0 }, &buffered));
        assert!(within(Coord { x: 1.0, y: 5.0 }, &buffered));
    }

    #[test]
    fn test_buffer_grows_polygon() {
        let poly = square(0.0, 0.0, 10.0);
        let buffered = buffer(&poly, 0.5, 6);
        assert!(within(Coord { x: -0.25, y: 5.0 }, &buffered));
        assert!(!within(Coord { x: -1.0, y: 5.0 }, &buffered));
        assert!(buffered.unsigned_area() > 100.0);
    }

    #[test]
    fn test_rotate_is_clockwise() {
        let p = rotate_coord(Coord { x: 1.0, y: 0.0 }, 90.0, Coord { x: 0.0, y: 0.0 });
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_constructors() {
        let rect = rectangle(Coord { x: 1.0, y: 2.0 }, 4.0, 2.0);
        assert_relative_eq!(area(&rect), 8.0);
        assert_relative_eq!(centroid(&rect).unwrap().x, 1.0);

        let ring = ellipse(Coord { x: 0.0, y: 0.0 }, 2.0, 1.0, 100);
        assert_eq!(ring.exterior().coords().count(), 101);
        // inscribed 100-gon is within 0.1 % of the true ellipse area
        assert_relative_eq!(area(&ring), std::f64::consts::PI * 2.0, max_relative = 1e-3);
    }
}
