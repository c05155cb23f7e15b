use crate::error::{OitError, Result};
use crate::passes::ResolvedPixel;

/// RGBA float image, row-major. Used both for resolve output (alpha holds
/// transmittance) and for the opaque color it is composited onto.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorTarget {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl ColorTarget {
    /// Resolve target with no transparency contribution anywhere.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0, 0.0, 0.0, 1.0])
    }

    pub fn filled(width: u32, height: u32, value: [f32; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn pixels(&self) -> &[[f32; 4]] { &self.pixels }
    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] { &mut self.pixels }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        (x < self.width && y < self.height)
            .then(|| self.pixels[y as usize * self.width as usize + x as usize])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, value: [f32; 4]) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = value;
        }
    }

    pub(crate) fn check_size(&self, what: &'static str, width: u32, height: u32) -> Result<()> {
        check_size(what, self.width, self.height, width, height)
    }

    /// Blend this resolve output over `dst`: `dst.rgb = rgb + dst.rgb * transmittance`.
    pub fn composite_onto(&self, dst: &mut ColorTarget) -> Result<()> {
        dst.check_size("composite destination", self.width, self.height)?;
        for (d, &[r, g, b, transmittance]) in dst.pixels.iter_mut().zip(&self.pixels) {
            let layer = ResolvedPixel { rgb: [r, g, b], transmittance };
            let [dr, dg, db] = layer.over([d[0], d[1], d[2]]);
            *d = [dr, dg, db, d[3]];
        }
        Ok(())
    }
}

/// Depth of previously rendered opaque geometry, in the same space as fragment
/// depths. Starts at +inf (nothing drawn).
#[derive(Clone, Debug, PartialEq)]
pub struct OpaqueDepth {
    width: u32,
    height: u32,
    depths: Vec<f32>,
}

impl OpaqueDepth {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depths: vec![f32::INFINITY; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    /// Keep the nearer of the stored depth and `depth`.
    pub fn write(&mut self, x: u32, y: u32, depth: f32) {
        if x < self.width && y < self.height {
            let d = &mut self.depths[y as usize * self.width as usize + x as usize];
            if depth < *d {
                *d = depth;
            }
        }
    }

    /// `LessEqual` against the opaque surface at `index`.
    #[inline]
    pub fn passes(&self, index: usize, depth: f32) -> bool {
        depth <= self.depths[index]
    }

    pub(crate) fn check_size(&self, width: u32, height: u32) -> Result<()> {
        check_size("opaque depth", self.width, self.height, width, height)
    }
}

fn check_size(what: &'static str, got_w: u32, got_h: u32, want_w: u32, want_h: u32) -> Result<()> {
    if got_w == want_w && got_h == want_h {
        Ok(())
    } else {
        Err(OitError::SizeMismatch { what, got_w, got_h, want_w, want_h })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_uses_transmittance() {
        let mut resolved = ColorTarget::new(2, 1);
        resolved.set_pixel(0, 0, [0.25, 0.0, 0.0, 0.5]);
        let mut dst = ColorTarget::filled(2, 1, [0.0, 1.0, 1.0, 1.0]);
        resolved.composite_onto(&mut dst).unwrap();
        assert_eq!(dst.pixel(0, 0), Some([0.25, 0.5, 0.5, 1.0]));
        // no contribution leaves the background intact
        assert_eq!(dst.pixel(1, 0), Some([0.0, 1.0, 1.0, 1.0]));
    }

    #[test]
    fn composite_rejects_mismatched_sizes() {
        let resolved = ColorTarget::new(2, 2);
        let mut dst = ColorTarget::new(2, 1);
        assert!(matches!(
            resolved.composite_onto(&mut dst),
            Err(OitError::SizeMismatch { want_h: 2, got_h: 1, .. })
        ));
    }

    #[test]
    fn opaque_depth_keeps_nearest() {
        let mut depth = OpaqueDepth::new(1, 1);
        assert!(depth.passes(0, 1.0e9));
        depth.write(0, 0, 0.6);
        depth.write(0, 0, 0.9);
        assert!(depth.passes(0, 0.6));
        assert!(depth.passes(0, 0.3));
        assert!(!depth.passes(0, 0.7));
    }
}
