//! Square candidate extraction from a thresholded frame.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;

use crate::config::FiducialConfig;
use crate::frame::adaptive_threshold_inv;

/// Four corners in image coordinates, clockwise as displayed (y down).
pub(crate) type Quad = [[f64; 2]; 4];

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Side lengths in corner order: 0-1, 1-2, 2-3, 3-0.
pub(crate) fn side_lengths(q: &Quad) -> [f64; 4] {
    [
        dist(q[0], q[1]),
        dist(q[1], q[2]),
        dist(q[2], q[3]),
        dist(q[3], q[0]),
    ]
}

pub(crate) fn perimeter(q: &Quad) -> f64 {
    side_lengths(q).iter().sum()
}

/// Repeatedly remove the flattest vertex while it lies closer than `tol` to
/// the chord of its neighbours. Also drops the repeated start point of a
/// closed trace.
fn drop_flat_vertices(mut poly: Vec<[f64; 2]>, tol: f64) -> Vec<[f64; 2]> {
    while poly.len() > 3 {
        let n = poly.len();
        let flatness = |i: usize| {
            let (p, c, q) = (poly[(i + n - 1) % n], poly[i], poly[(i + 1) % n]);
            let base = dist(p, q);
            if base < 1e-9 {
                0.0
            } else {
                cross(p, q, c).abs() / base
            }
        };
        let Some((i, d)) = (0..n)
            .map(|i| (i, flatness(i)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            break;
        };
        if d >= tol {
            break;
        }
        poly.remove(i);
    }
    poly
}

/// Strictly convex with consistent winding; reorders to clockwise starting
/// from the top-left-most corner.
fn orient_convex(mut q: Quad) -> Option<Quad> {
    let turns: Vec<f64> = (0..4)
        .map(|i| cross(q[i], q[(i + 1) % 4], q[(i + 2) % 4]))
        .collect();
    let all_pos = turns.iter().all(|&t| t > 0.0);
    let all_neg = turns.iter().all(|&t| t < 0.0);
    if !(all_pos || all_neg) {
        return None;
    }
    if all_neg {
        q.swap(1, 3);
    }
    let start = (0..4)
        .min_by(|&a, &b| (q[a][0] + q[a][1]).total_cmp(&(q[b][0] + q[b][1])))
        .unwrap_or(0);
    q.rotate_left(start);
    Some(q)
}

/// Move each corner half a pixel outward along the center-to-corner
/// direction (per axis), from boundary-pixel centers to pixel edges.
fn expand_to_pixel_edges(q: Quad) -> Quad {
    let cx = q.iter().map(|p| p[0]).sum::<f64>() / 4.0;
    let cy = q.iter().map(|p| p[1]).sum::<f64>() / 4.0;
    q.map(|p| {
        let (dx, dy) = (p[0] - cx, p[1] - cy);
        let n = (dx * dx + dy * dy).sqrt();
        if n < 1e-12 {
            return p;
        }
        let k = 0.5 * std::f64::consts::SQRT_2 / n;
        [p[0] + dx * k, p[1] + dy * k]
    })
}

/// Marker-shaped quads in `gray`, largest perimeter first.
pub(crate) fn find_quads(gray: &GrayImage, cfg: &FiducialConfig) -> Vec<Quad> {
    let thr = adaptive_threshold_inv(gray, cfg.threshold_block, cfg.threshold_offset);
    let mut quads = Vec::new();
    for contour in find_contours::<i32>(&thr) {
        if contour.border_type != BorderType::Outer || contour.points.len() < 4 {
            continue;
        }
        let perim = arc_length(&contour.points, true);
        if perim < cfg.min_perimeter_px {
            continue;
        }
        let epsilon = cfg.polygon_accuracy * perim;
        let poly: Vec<Point<i32>> = approximate_polygon_dp(&contour.points, epsilon, true);
        let poly = drop_flat_vertices(
            poly.iter().map(|p| [p.x as f64, p.y as f64]).collect(),
            epsilon,
        );
        if poly.len() != 4 {
            continue;
        }
        let raw: Quad = [poly[0], poly[1], poly[2], poly[3]];
        let Some(q) = orient_convex(raw) else {
            continue;
        };
        let sides = side_lengths(&q);
        let (min_side, max_side) = sides
            .iter()
            .fold((f64::MAX, 0.0f64), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        if min_side < 1.0 || max_side / min_side > cfg.max_side_ratio {
            continue;
        }
        quads.push(expand_to_pixel_edges(q));
    }
    quads.sort_by(|a, b| perimeter(b).total_cmp(&perimeter(a)));
    tracing::trace!("{} quad candidates", quads.len());
    quads
}
