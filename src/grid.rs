//! Regular sample grid inside a fitted rectangle.
//!
//! The grid is laid out axis-aligned around the plot center and then rotated
//! clockwise by the plot's `alpha`. Spacing is taken from the short side so
//! that it always holds exactly `n_points` points; the long side gets as many
//! as fit at the same spacing.

use geo::{Coord, MultiPolygon, Polygon};

use crate::error::{PlotError, Result};
use crate::geometry;

/// Clip buffer distance as a fraction of the long side
pub const BUFFER_PERC: f64 = 0.005;

/// Segments per quarter turn used to round the clip buffer
pub const BUFFER_QUARTER_SEGMENTS: u32 = 6;

/// A grid point and its 1-based position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub coord: Coord<f64>,
    pub row: usize,
    pub column: usize,
}

/// Fitted rectangle a grid is laid out in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridFrame {
    pub center: Coord<f64>,
    pub a: f64,
    pub b: f64,
    /// Clockwise rotation in degrees
    pub alpha: f64,
}

/// The region grid points must fall within when clipping to `polygon`
pub fn clip_region(polygon: &Polygon<f64>, a: f64) -> MultiPolygon<f64> {
    let region = geometry::buffer(polygon, BUFFER_PERC * a, BUFFER_QUARTER_SEGMENTS);
    if region.0.is_empty() {
        log::warn!("clip buffer came out empty, no grid points will survive");
    }
    region
}

/// Lay out the grid for `frame`, keeping only points inside `clip` when given
pub fn generate_grid(
    frame: &GridFrame,
    n_points: usize,
    clip: Option<&MultiPolygon<f64>>,
) -> Result<Vec<GridPoint>> {
    if n_points < 2 {
        return Err(PlotError::InvalidParameter(format!(
            "grid needs at least 2 points per side, got {n_points}"
        )));
    }
    if !(frame.a > 0.0 && frame.b > 0.0) {
        return Err(PlotError::InvalidParameter(format!(
            "grid sides must be positive, got a={} b={}",
            frame.a, frame.b
        )));
    }

    let raw = if frame.b < frame.a {
        columns_along_x(frame, n_points)
    } else {
        rows_along_y(frame, n_points)
    };

    let points = raw
        .into_iter()
        .map(|p| GridPoint {
            coord: geometry::rotate_coord(p.coord, frame.alpha, frame.center),
            ..p
        })
        .filter(|p| clip.map_or(true, |region| geometry::within(p.coord, region)))
        .collect();
    Ok(points)
}

/// `b < a`: `n_points` rows down each column, columns stepped along x
fn columns_along_x(frame: &GridFrame, n_points: usize) -> Vec<GridPoint> {
    let x0 = frame.center.x - frame.a / 2.0;
    let x1 = frame.center.x + frame.a / 2.0;
    let y1 = frame.center.y + frame.b / 2.0;
    let step = frame.b / (n_points - 1) as f64;

    let mut points = Vec::new();
    let mut x = x0;
    let mut column = 1;
    while x < x1 + step / 2.0 {
        let mut y = y1;
        for row in 1..=n_points {
            points.push(GridPoint {
                coord: Coord { x, y },
                row,
                column,
            });
            y -= step;
        }
        x += step;
        column += 1;
    }
    points
}

/// `a <= b`: `n_points` columns across each row, rows stepped down y
fn rows_along_y(frame: &GridFrame, n_points: usize) -> Vec<GridPoint> {
    let x0 = frame.center.x - frame.a / 2.0;
    let y0 = frame.center.y - frame.b / 2.0;
    let y1 = frame.center.y + frame.b / 2.0;
    let step = frame.a / (n_points - 1) as f64;

    let mut points = Vec::new();
    let mut y = y1;
    let mut row = 1;
    while y0 - step / 2.0 <= y {
        let mut x = x0;
        for column in 1..=n_points {
            points.push(GridPoint {
                coord: Coord { x, y },
                row,
                column,
            });
            x += step;
        }
        y -= step;
        row += 1;
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(a: f64, b: f64, alpha: f64) -> GridFrame {
        GridFrame {
            center: Coord { x: 0.0, y: 0.0 },
            a,
            b,
            alpha,
        }
    }

    #[test]
    fn test_unrotated_grid_counts_and_bounds() {
        let points = generate_grid(&frame(100.0, 50.0, 0.0), 5, None).unwrap();
        // step 12.5 over 100 along x gives 9 columns of 5
        assert_eq!(points.len(), 45);
        assert_eq!(points.iter().map(|p| p.column).max(), Some(9));
        assert_eq!(points.iter().map(|p| p.row).max(), Some(5));
        for p in &points {
            assert!(p.coord.x >= -50.0 - 1e-9 && p.coord.x <= 50.0 + 1e-9);
            assert!(p.coord.y >= -25.0 - 1e-9 && p.coord.y <= 25.0 + 1e-9);
        }

        let first = points[0];
        assert_eq!((first.row, first.column), (1, 1));
        assert_relative_eq!(first.coord.x, -50.0);
        assert_relative_eq!(first.coord.y, 25.0);
    }

    #[test]
    fn test_square_frame_uses_rows() {
        let points = generate_grid(&frame(30.0, 30.0, 0.0), 4, None).unwrap();
        assert_eq!(points.len(), 16);
        // rows run top to bottom
        assert!(points[0].coord.y > points[15].coord.y);
        assert_eq!((points[15].row, points[15].column), (4, 4));
    }

    #[test]
    fn test_rotation_is_clockwise_about_center() {
        let flat = generate_grid(&frame(100.0, 50.0, 0.0), 5, None).unwrap();
        let turned = generate_grid(&frame(100.0, 50.0, 90.0), 5, None).unwrap();
        assert_eq!(flat.len(), turned.len());
        for (p, q) in flat.iter().zip(&turned) {
            // clockwise quarter turn maps (x, y) to (y, -x)
            assert_relative_eq!(q.coord.x, p.coord.y, epsilon = 1e-9);
            assert_relative_eq!(q.coord.y, -p.coord.x, epsilon = 1e-9);
            assert_eq!((p.row, p.column), (q.row, q.column));
        }
    }

    #[test]
    fn test_clipped_grid_is_subset() {
        let f = frame(100.0, 50.0, 0.0);
        // left half of the plot only
        let half = geometry::rectangle(Coord { x: -25.0, y: 0.0 }, 50.0, 50.0);
        let region = clip_region(&half, f.a);

        let all = generate_grid(&f, 5, None).unwrap();
        let clipped = generate_grid(&f, 5, Some(&region)).unwrap();
        assert!(!clipped.is_empty());
        assert!(clipped.len() < all.len());
        for p in &clipped {
            assert!(all.contains(p));
            assert!(p.coord.x <= BUFFER_PERC * f.a + 1e-9);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(generate_grid(&frame(100.0, 50.0, 0.0), 1, None).is_err());
        assert!(generate_grid(&frame(0.0, 50.0, 0.0), 5, None).is_err());
    }
}
