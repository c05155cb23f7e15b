//! Scanline-free edge-function rasterizer for the CPU backend. Coordinates are
//! snapped to 8 bits of subpixel precision so shared edges are tested exactly,
//! and the top-left rule keeps a pixel on a shared edge in one triangle only.

use oit_core::Fragment;

use crate::scene::Triangle;

const SUBPIXEL_BITS: u32 = 8;
const ONE: i64 = 1 << SUBPIXEL_BITS;
const HALF: i64 = ONE / 2;

#[derive(Clone, Copy, Debug)]
struct Point {
    x: i64,
    y: i64,
}

/// Clip space to fixed-point pixel space (y down).
fn to_screen(position: [f32; 3], width: u32, height: u32) -> Point {
    let sx = (position[0] * 0.5 + 0.5) * width as f32;
    let sy = (0.5 - position[1] * 0.5) * height as f32;
    Point {
        x: (sx * ONE as f32).round() as i64,
        y: (sy * ONE as f32).round() as i64,
    }
}

#[inline]
fn edge(a: Point, b: Point, p: Point) -> i64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Edges whose pixels on the boundary belong to this triangle, for positive area.
#[inline]
fn is_top_left(a: Point, b: Point) -> bool {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    dy < 0 || (dy == 0 && dx > 0)
}

#[inline]
fn covers(w: i64, top_left: bool) -> bool {
    w > 0 || (w == 0 && top_left)
}

/// Call `emit(x, y, depth, color)` for every pixel center the triangle covers,
/// with depth and color interpolated linearly.
pub fn rasterize(tri: &Triangle, width: u32, height: u32, mut emit: impl FnMut(u32, u32, f32, [f32; 4])) {
    let mut v = *tri;
    let mut p = v.map(|vert| to_screen(vert.position, width, height));
    let mut area = edge(p[0], p[1], p[2]);
    if area == 0 {
        return;
    }
    if area < 0 {
        v.swap(1, 2);
        p.swap(1, 2);
        area = -area;
    }

    let min_x = p.iter().map(|q| q.x).min().unwrap_or(0).max(0);
    let min_y = p.iter().map(|q| q.y).min().unwrap_or(0).max(0);
    let max_x = p.iter().map(|q| q.x).max().unwrap_or(0).min(width as i64 * ONE);
    let max_y = p.iter().map(|q| q.y).max().unwrap_or(0).min(height as i64 * ONE);
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    let top_left = [is_top_left(p[1], p[2]), is_top_left(p[2], p[0]), is_top_left(p[0], p[1])];
    let inv_area = 1.0 / area as f32;

    for py in (min_y / ONE)..=((max_y - 1) / ONE) {
        for px in (min_x / ONE)..=((max_x - 1) / ONE) {
            let center = Point { x: px * ONE + HALF, y: py * ONE + HALF };
            let w = [edge(p[1], p[2], center), edge(p[2], p[0], center), edge(p[0], p[1], center)];
            if !(0..3).all(|i| covers(w[i], top_left[i])) {
                continue;
            }
            let b = w.map(|wi| wi as f32 * inv_area);
            let depth = b[0] * v[0].position[2] + b[1] * v[1].position[2] + b[2] * v[2].position[2];
            let mut color = [0.0f32; 4];
            for (c, out) in color.iter_mut().enumerate() {
                *out = b[0] * v[0].color[c] + b[1] * v[1].color[c] + b[2] * v[2].color[c];
            }
            emit(px as u32, py as u32, depth, color);
        }
    }
}

/// Rasterize a batch of triangles into capture fragments.
pub fn fragments(tris: &[Triangle], width: u32, height: u32) -> Vec<Fragment> {
    let mut out = Vec::new();
    for tri in tris {
        rasterize(tri, width, height, |x, y, depth, color| {
            out.push(Fragment::new(x, y, depth, color));
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Vertex;

    const WHITE: [f32; 4] = [1.0; 4];

    fn full_quad(z: f32) -> [Triangle; 2] {
        let bl = Vertex::new([-1.0, -1.0, z], WHITE);
        let br = Vertex::new([1.0, -1.0, z], WHITE);
        let tr = Vertex::new([1.0, 1.0, z], WHITE);
        let tl = Vertex::new([-1.0, 1.0, z], WHITE);
        [[bl, br, tr], [bl, tr, tl]]
    }

    #[test]
    fn shared_diagonal_is_covered_once() {
        let (w, h) = (16, 16);
        let mut hits = vec![0u32; (w * h) as usize];
        for tri in full_quad(0.5) {
            rasterize(&tri, w, h, |x, y, _, _| hits[(y * w + x) as usize] += 1);
        }
        assert!(hits.iter().all(|&n| n == 1), "{hits:?}");
    }

    #[test]
    fn winding_does_not_matter() {
        let [a, _] = full_quad(0.5);
        let mut ccw = 0;
        let mut cw = 0;
        rasterize(&a, 8, 8, |_, _, _, _| ccw += 1);
        rasterize(&[a[0], a[2], a[1]], 8, 8, |_, _, _, _| cw += 1);
        assert_eq!(ccw, cw);
        assert!(ccw > 0);
    }

    #[test]
    fn depth_is_interpolated() {
        // Depth runs 0 at the left edge to 1 at the right edge.
        let tri = [
            Vertex::new([-1.0, -1.0, 0.0], WHITE),
            Vertex::new([3.0, -1.0, 2.0], WHITE),
            Vertex::new([-1.0, 3.0, 0.0], WHITE),
        ];
        let mut depths = vec![f32::NAN; 4];
        rasterize(&tri, 4, 1, |x, _, d, _| depths[x as usize] = d);
        for (x, d) in depths.iter().enumerate() {
            let expected = (x as f32 + 0.5) / 4.0;
            assert!((d - expected).abs() < 1e-4, "x={x}: {d}");
        }
    }

    #[test]
    fn degenerate_and_offscreen_triangles_emit_nothing() {
        let line = [
            Vertex::new([-1.0, -1.0, 0.5], WHITE),
            Vertex::new([0.0, 0.0, 0.5], WHITE),
            Vertex::new([1.0, 1.0, 0.5], WHITE),
        ];
        let offscreen = [
            Vertex::new([2.0, 2.0, 0.5], WHITE),
            Vertex::new([3.0, 2.0, 0.5], WHITE),
            Vertex::new([2.0, 3.0, 0.5], WHITE),
        ];
        assert!(fragments(&[line, offscreen], 8, 8).is_empty());
    }
}
