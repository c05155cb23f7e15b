use anyhow::{Context, Result};
use log::info;
use oit_config::{Backend, DepthKey, EmptyPixel, OitConfig};
use oit_core::{ABuffer, ABufferDesc, ColorTarget, DepthKeyMode, EmptyPixelPolicy, OpaqueDepth};
use palette::{FromColor, LinSrgb, Srgb};

mod gpu;
mod raster;
mod scene;

use scene::Scene;

fn abuffer_desc(config: &OitConfig) -> ABufferDesc {
    let depth_key = match config.resolve.depth_key {
        DepthKey::Raw => DepthKeyMode::Raw,
        DepthKey::Sortable => DepthKeyMode::Sortable,
    };
    let empty_pixel = match config.resolve.empty_pixel {
        EmptyPixel::Discard => EmptyPixelPolicy::Discard,
        EmptyPixel::Transparent => EmptyPixelPolicy::Transparent,
    };
    let mut desc = ABufferDesc::new(config.buffer.width, config.buffer.height)
        .with_max_fragments(config.buffer.max_fragments)
        .with_depth_key(depth_key)
        .with_empty_pixel(empty_pixel);
    if let Some(capacity) = config.buffer.capacity {
        desc = desc.with_capacity(capacity);
    }
    desc
}

/// Linear RGB to sRGB-encoded RGBA8, opaque.
fn encode_srgb8(pixels: &[[f32; 4]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 4);
    for &[r, g, b, _] in pixels {
        let lin = LinSrgb::new(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0));
        let srgb: Srgb = Srgb::from_color(lin);
        out.extend([
            (srgb.red * 255.0).round().clamp(0.0, 255.0) as u8,
            (srgb.green * 255.0).round().clamp(0.0, 255.0) as u8,
            (srgb.blue * 255.0).round().clamp(0.0, 255.0) as u8,
            255,
        ]);
    }
    out
}

fn render_cpu(config: &OitConfig, desc: ABufferDesc, scene: &Scene) -> Result<Vec<u8>> {
    let (width, height) = (desc.width, desc.height);
    let [r, g, b] = config.demo.background;
    let mut color = ColorTarget::filled(width, height, [r, g, b, 1.0]);
    let mut depth = OpaqueDepth::new(width, height);

    // Opaque geometry first, nearest wins.
    for tri in &scene.opaque {
        raster::rasterize(tri, width, height, |x, y, z, c| {
            let index = (y * width + x) as usize;
            if depth.passes(index, z) {
                depth.write(x, y, z);
                color.set_pixel(x, y, [c[0], c[1], c[2], 1.0]);
            }
        });
    }

    let mut abuf = ABuffer::with_threads(desc, config.runtime.threads)?;
    abuf.clear();
    let fragments = raster::fragments(&scene.transparent, width, height);
    let stats = abuf.capture_with_depth(&fragments, &depth)?;
    info!(
        "captured {} of {} fragments ({} occluded, {} dropped on exhaustion)",
        stats.linked,
        fragments.len(),
        stats.occluded,
        stats.exhausted
    );

    let mut resolved = ColorTarget::new(width, height);
    abuf.resolve(&mut resolved)?;
    resolved.composite_onto(&mut color)?;
    Ok(encode_srgb8(color.pixels()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = OitConfig::load();
    let desc = abuffer_desc(&config);
    desc.validate()?;
    info!(
        "{}x{} A-buffer, capacity {}, max {} fragments/pixel, {:?} backend",
        desc.width, desc.height, desc.capacity, desc.max_fragments, config.runtime.backend
    );

    let scene = scene::demo_scene();
    let rgba = match config.runtime.backend {
        Backend::Cpu => render_cpu(&config, desc, &scene)?,
        Backend::Gpu => gpu::render(&config, desc, &scene)?,
    };

    let image = image::RgbaImage::from_raw(desc.width, desc.height, rgba)
        .context("frame buffer does not match the configured resolution")?;
    image
        .save(&config.demo.output)
        .with_context(|| format!("failed to write {}", config.demo.output.display()))?;
    info!("wrote {}", config.demo.output.display());
    Ok(())
}
