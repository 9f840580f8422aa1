//! Closed-form plot dimensions for a given source area and perimeter.
//!
//! Every shape produced here has the same area as the source polygon. For
//! rectangles and ellipses the long/short ratio is clamped to `side_ratio_max`
//! by re-deriving both sides from the area, which keeps the area and gives up
//! on matching the perimeter.

use std::f64::consts::PI;

/// Long side `a` and short side `b` of a plot (full axes for ellipses)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub a: f64,
    pub b: f64,
}

pub fn square(area: f64) -> Dimensions {
    let a = area.sqrt();
    Dimensions { a, b: a }
}

pub fn circle(area: f64) -> Dimensions {
    let a = 2.0 * (area / PI).sqrt();
    Dimensions { a, b: a }
}

/// `sqrt(P² - 16A)`, clamped to zero where the discriminant is not positive
fn discriminant(area: f64, perimeter: f64) -> f64 {
    let d = perimeter * perimeter - 16.0 * area;
    if d > 0.0 {
        d.sqrt()
    } else {
        0.0
    }
}

/// The rectangle with the polygon's area and perimeter
///
/// Compact polygons (`P² <= 16A`) have no such rectangle and get the
/// equal-area square `√A` instead. The closed form with `d = 0` would give
/// `P/4`, which is smaller than `√A` there and loses area.
pub fn rectangle(area: f64, perimeter: f64, side_ratio_max: Option<f64>) -> Dimensions {
    let d = discriminant(area, perimeter);
    if d == 0.0 {
        return square(area);
    }
    let a = (perimeter + d) / 4.0;
    let b = (perimeter - d) / 4.0;

    match side_ratio_max {
        Some(ratio) if ratio * b < a => {
            let b = (area / ratio).sqrt();
            Dimensions { a: area / b, b }
        }
        _ => Dimensions { a, b },
    }
}

/// The ellipse whose axis ratio follows the equal-perimeter rectangle
pub fn ellipse(area: f64, perimeter: f64, side_ratio_max: Option<f64>) -> Dimensions {
    let d = discriminant(area, perimeter);
    let s = if d > 0.0 {
        (perimeter + d) / (perimeter - d)
    } else {
        1.0
    };

    let mut semi_a = (s * area / PI).sqrt();
    let mut semi_b = semi_a / s;

    if let Some(ratio) = side_ratio_max {
        if ratio * semi_b < semi_a {
            semi_a = (ratio * area / PI).sqrt();
            semi_b = semi_a / ratio;
        }
    }

    Dimensions {
        a: 2.0 * semi_a,
        b: 2.0 * semi_b,
    }
}

/// Scale `a` by `1 + perc` and `b` by its inverse, keeping the product.
///
/// Sides are swapped so that `a >= b`, then re-clamped to `side_ratio_max`.
pub fn reshape(dims: Dimensions, perc: f64, side_ratio_max: Option<f64>) -> Dimensions {
    let mut a = dims.a * (1.0 + perc);
    let mut b = dims.b / (1.0 + perc);
    if a < b {
        std::mem::swap(&mut a, &mut b);
    }

    match side_ratio_max {
        Some(ratio) if ratio * b < a => {
            let product = a * b;
            let b = (product / ratio).sqrt();
            Dimensions { a: product / b, b }
        }
        _ => Dimensions { a, b },
    }
}
