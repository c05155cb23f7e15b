//! Demo scene: a few opaque shapes behind interpenetrating translucent panels.
//! Everything is specified in clip space (`z` in `0..=1`, nearer is smaller).

use oit_core::gpu::CaptureVertex;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    /// Straight RGBA, linear.
    pub color: [f32; 4],
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    pub fn to_capture(self) -> CaptureVertex {
        let [x, y, z] = self.position;
        CaptureVertex {
            clip_position: [x, y, z, 1.0],
            color: self.color,
        }
    }
}

pub type Triangle = [Vertex; 3];

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub opaque: Vec<Triangle>,
    pub transparent: Vec<Triangle>,
}

impl Scene {
    /// Flattened vertex lists for the GPU path.
    pub fn opaque_vertices(&self) -> Vec<CaptureVertex> {
        flatten(&self.opaque)
    }

    pub fn transparent_vertices(&self) -> Vec<CaptureVertex> {
        flatten(&self.transparent)
    }
}

fn flatten(tris: &[Triangle]) -> Vec<CaptureVertex> {
    tris.iter().flat_map(|t| t.iter().map(|v| v.to_capture())).collect()
}

/// Axis-aligned quad with per-corner depth so panels can be tilted.
/// Corner order: bottom-left, bottom-right, top-right, top-left.
fn quad(min: [f32; 2], max: [f32; 2], z: [f32; 4], color: [f32; 4]) -> [Triangle; 2] {
    let bl = Vertex::new([min[0], min[1], z[0]], color);
    let br = Vertex::new([max[0], min[1], z[1]], color);
    let tr = Vertex::new([max[0], max[1], z[2]], color);
    let tl = Vertex::new([min[0], max[1], z[3]], color);
    [[bl, br, tr], [bl, tr, tl]]
}

pub fn demo_scene() -> Scene {
    let mut scene = Scene::default();

    // Opaque: a far backdrop strip and a near bar crossing the panels.
    scene.opaque.extend(quad([-0.9, -0.9], [0.9, -0.6], [0.95; 4], [0.35, 0.35, 0.35, 1.0]));
    scene.opaque.extend(quad([-0.15, -0.8], [0.15, 0.8], [0.35; 4], [0.9, 0.75, 0.2, 1.0]));

    // Translucent panels. The red one tilts through the other two, so the
    // correct order changes across its surface.
    scene.transparent.extend(quad(
        [-0.7, -0.5],
        [0.3, 0.5],
        [0.2, 0.8, 0.8, 0.2],
        [1.0, 0.1, 0.1, 0.5],
    ));
    scene.transparent.extend(quad([-0.4, -0.3], [0.6, 0.7], [0.5; 4], [0.1, 0.9, 0.2, 0.45]));
    scene.transparent.extend(quad([-0.2, -0.7], [0.8, 0.2], [0.3; 4], [0.1, 0.3, 1.0, 0.4]));
    // Thin film in front of everything
    scene.transparent.extend(quad([-1.0, -1.0], [1.0, 1.0], [0.05; 4], [0.6, 0.8, 1.0, 0.08]));

    scene
}
