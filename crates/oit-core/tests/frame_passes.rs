use std::collections::HashSet;

use anyhow::Result;
use oit_core::passes::{CaptureTargets, capture_fragment, resolve_pixel};
use oit_core::{
    ABuffer, ABufferDesc, ColorTarget, DEFAULT_LAYERS_PER_PIXEL, DepthKeyMode, EmptyPixelPolicy, Fragment, FragmentArena,
    FragmentCounter, FramePhase, HeadTable, LengthTable, OitError, OpaqueDepth, SENTINEL,
    pack_unorm4x8,
};

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

#[test]
fn concurrent_pushes_to_one_pixel_keep_every_node() -> Result<()> {
    const N: u32 = 8_000;
    let mut abuf = ABuffer::with_threads(ABufferDesc::new(4, 4).with_capacity(N), Some(8))?;
    let fragments: Vec<Fragment> = (0..N)
        .map(|i| Fragment::new(2, 1, i as f32 / N as f32, [0.5, 0.5, 0.5, 0.5]))
        .collect();

    let stats = abuf.capture(&fragments)?;
    assert_eq!(stats.linked, N);

    let chain = abuf.chain(2, 1);
    assert_eq!(chain.len(), N as usize);
    let depths: HashSet<u32> = chain.iter().map(|n| n.depth_key).collect();
    assert_eq!(depths.len(), N as usize, "a node was lost or linked twice");
    assert!(chain.last().is_some_and(|n| n.is_tail()));

    let index = abuf.heads().index(2, 1).unwrap();
    assert_eq!(abuf.lengths().length(index), N);
    Ok(())
}

#[test]
fn raw_threads_racing_on_the_kernel_build_a_valid_chain() {
    const THREADS: u32 = 8;
    const PER_THREAD: u32 = 1_000;
    let counter = FragmentCounter::new();
    let heads = HeadTable::new(1, 1);
    let lengths = LengthTable::new(1, 1);
    let arena = FragmentArena::new(THREADS * PER_THREAD);
    let targets = CaptureTargets {
        counter: &counter,
        heads: &heads,
        lengths: &lengths,
        arena: &arena,
        opaque: None,
        depth_key: DepthKeyMode::Raw,
    };

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let targets = &targets;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let depth = (t * PER_THREAD + i) as f32;
                    capture_fragment(targets, &Fragment::new(0, 0, depth, [1.0; 4]));
                }
            });
        }
    });

    // Walk the chain by hand: every slot exactly once, ending at SENTINEL.
    let mut seen = HashSet::new();
    let mut slot = heads.head(0);
    while slot != SENTINEL {
        assert!(seen.insert(slot), "slot {slot} reached twice");
        slot = oit_core::NodeSource::node(&arena, slot).unwrap().next;
    }
    assert_eq!(seen.len() as u32, THREADS * PER_THREAD);
    assert_eq!(lengths.length(0), THREADS * PER_THREAD);
}

#[test]
fn traversal_is_reverse_insertion_order() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(2, 2))?;
    for color in [RED, GREEN, BLUE] {
        abuf.capture(&[Fragment::new(0, 0, 0.5, color)])?;
    }
    let order: Vec<u32> = abuf.chain(0, 0).iter().map(|n| n.packed_color).collect();
    assert_eq!(order, vec![pack_unorm4x8(BLUE), pack_unorm4x8(GREEN), pack_unorm4x8(RED)]);
    Ok(())
}

#[test]
fn reused_target_does_not_keep_last_frames_layers() -> Result<()> {
    for policy in [EmptyPixelPolicy::Discard, EmptyPixelPolicy::Transparent] {
        let mut abuf = ABuffer::new(ABufferDesc::new(2, 1).with_empty_pixel(policy))?;
        let mut resolved = ColorTarget::new(2, 1);

        // frame 1: red at (0, 0) only
        abuf.capture(&[Fragment::new(0, 0, 0.5, RED)])?;
        abuf.resolve(&mut resolved)?;
        assert_eq!(resolved.pixel(0, 0), Some([1.0, 0.0, 0.0, 0.0]));

        // frame 2: nothing captured, same resolve target
        abuf.clear();
        abuf.resolve(&mut resolved)?;
        assert_eq!(resolved.pixel(0, 0), Some([0.0, 0.0, 0.0, 1.0]), "{policy:?}");
        assert_eq!(resolved.pixel(1, 0), Some([0.0, 0.0, 0.0, 1.0]), "{policy:?}");

        let mut color = ColorTarget::filled(2, 1, BLUE);
        resolved.composite_onto(&mut color)?;
        assert_eq!(color.pixel(0, 0), Some(BLUE), "{policy:?}");
        assert_eq!(color.pixel(1, 0), Some(BLUE), "{policy:?}");
    }
    Ok(())
}

#[test]
fn empty_pixels_are_overwritten_with_no_contribution() -> Result<()> {
    let marker = [0.3, 0.6, 0.9, 0.5];
    let mut abuf = ABuffer::new(ABufferDesc::new(2, 1))?;
    abuf.capture(&[Fragment::new(1, 0, 0.5, RED)])?;
    let mut target = ColorTarget::filled(2, 1, marker);
    abuf.resolve(&mut target)?;
    assert_eq!(target.pixel(0, 0), Some([0.0, 0.0, 0.0, 1.0]));
    assert_eq!(target.pixel(1, 0), Some([1.0, 0.0, 0.0, 0.0]));
    Ok(())
}

#[test]
fn three_opaque_layers_fully_occlude() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(1, 1))?;
    abuf.capture(&[
        Fragment::new(0, 0, 0.2, RED),
        Fragment::new(0, 0, 0.8, GREEN),
        Fragment::new(0, 0, 0.5, BLUE),
    ])?;
    let mut target = ColorTarget::new(1, 1);
    abuf.resolve(&mut target)?;
    // nearest (0.2) is painted last
    assert_eq!(target.pixel(0, 0), Some([1.0, 0.0, 0.0, 0.0]));
    Ok(())
}

#[test]
fn clear_is_idempotent() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(3, 3))?;
    abuf.capture(&[Fragment::new(1, 1, 0.5, RED), Fragment::new(2, 0, 0.5, RED)])?;
    abuf.clear();
    abuf.clear();
    assert!(abuf.heads().snapshot().iter().all(|&h| h == SENTINEL));
    assert!(abuf.lengths().snapshot().iter().all(|&l| l == 0));
    assert_eq!(abuf.counter().allocated(), 0);
    assert_eq!(abuf.phase(), FramePhase::Cleared);
    Ok(())
}

#[test]
fn overflow_keeps_exactly_capacity_nodes() -> Result<()> {
    const CAPACITY: u32 = 8;
    let mut abuf = ABuffer::new(ABufferDesc::new(2, 2).with_capacity(CAPACITY))?;
    let fragments: Vec<Fragment> = (0..=CAPACITY)
        .map(|i| Fragment::new(1, 1, i as f32 * 0.1, [0.2, 0.2, 0.2, 0.2]))
        .collect();
    let stats = abuf.capture(&fragments)?;
    assert_eq!(stats.linked, CAPACITY);
    assert_eq!(stats.exhausted, 1);
    assert_eq!(abuf.counter().allocated(), CAPACITY + 1);
    assert_eq!(abuf.chain(1, 1).len(), CAPACITY as usize);

    let index = abuf.heads().index(1, 1).unwrap();
    assert_eq!(abuf.lengths().length(index), CAPACITY);

    let expected_t = 0.8_f32.powi(CAPACITY as i32);
    let mut target = ColorTarget::new(2, 2);
    abuf.resolve(&mut target)?;
    assert!(approx(target.pixel(1, 1).unwrap()[3], expected_t));

    // An overstated length still stops at the end of the chain.
    let mut scratch = Vec::new();
    let head = abuf.heads().head(index);
    let overstated = abuf.lengths().length(index) + 1;
    let pixel = resolve_pixel(head, overstated, 16, abuf.arena(), &mut scratch).unwrap();
    assert_eq!(scratch.len(), CAPACITY as usize);
    assert!(approx(pixel.transmittance, expected_t));
    Ok(())
}

#[test]
fn exhaustion_starves_later_pixels() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(2, 1).with_capacity(2))?;
    abuf.capture(&[Fragment::new(0, 0, 0.1, RED), Fragment::new(0, 0, 0.2, RED)])?;
    let stats = abuf.capture(&[Fragment::new(1, 0, 0.3, BLUE)])?;
    assert_eq!(stats.exhausted, 1);
    assert!(abuf.chain(1, 0).is_empty());
    assert_eq!(abuf.lengths().length(1), 0);
    Ok(())
}

#[test]
fn per_pixel_overflow_error_is_bounded() -> Result<()> {
    const LAYERS: u32 = 20;
    let mut abuf = ABuffer::new(ABufferDesc::new(1, 1).with_capacity(64))?;
    let fragments: Vec<Fragment> = (0..LAYERS)
        .map(|i| Fragment::new(0, 0, i as f32, [0.6, 0.6, 0.6, 0.2]))
        .collect();
    abuf.capture(&fragments)?;
    let mut target = ColorTarget::new(1, 1);
    abuf.resolve(&mut target)?;
    let [r, _, _, t] = target.pixel(0, 0).unwrap();

    let truncated_t = 0.8_f32.powi(16);
    let full_t = 0.8_f32.powi(LAYERS as i32);
    assert!(approx(t, truncated_t));
    // The dropped layers could only have removed this much more transmittance.
    assert!(t >= full_t && t - full_t <= truncated_t);
    assert!((0.0..=1.0).contains(&r));
    let full_rgb = 0.6 * (1.0 - full_t);
    assert!((full_rgb - r).abs() <= 0.6 * truncated_t + 1e-5);
    Ok(())
}

#[test]
fn sortable_keys_fix_sign_crossing_depths() -> Result<()> {
    let fragments = [Fragment::new(0, 0, -0.5, RED), Fragment::new(0, 0, 0.5, BLUE)];

    let mut sortable = ABuffer::new(ABufferDesc::new(1, 1).with_depth_key(DepthKeyMode::Sortable))?;
    sortable.capture(&fragments)?;
    let mut target = ColorTarget::new(1, 1);
    sortable.resolve(&mut target)?;
    assert_eq!(target.pixel(0, 0), Some([1.0, 0.0, 0.0, 0.0]));

    // Raw bits treat the negative depth as farthest.
    let mut raw = ABuffer::new(ABufferDesc::new(1, 1))?;
    raw.capture(&fragments)?;
    let mut target = ColorTarget::new(1, 1);
    raw.resolve(&mut target)?;
    assert_eq!(target.pixel(0, 0), Some([0.0, 0.0, 1.0, 0.0]));
    Ok(())
}

#[test]
fn early_depth_test_skips_occluded_fragments() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(2, 1))?;
    let mut opaque = OpaqueDepth::new(2, 1);
    opaque.write(0, 0, 0.5);
    let stats = abuf.capture_with_depth(
        &[
            Fragment::new(0, 0, 0.3, RED),
            Fragment::new(0, 0, 0.7, GREEN),
            Fragment::new(1, 0, 0.7, GREEN),
        ],
        &opaque,
    )?;
    assert_eq!(stats.linked, 2);
    assert_eq!(stats.occluded, 1);
    assert_eq!(abuf.counter().allocated(), 2);
    assert_eq!(abuf.chain(0, 0).len(), 1);
    Ok(())
}

#[test]
fn frame_phases_are_enforced() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(2, 2))?;
    let mut target = ColorTarget::new(2, 2);
    abuf.capture(&[Fragment::new(0, 0, 0.5, RED)])?;
    assert_eq!(abuf.phase(), FramePhase::Capturing);
    abuf.resolve(&mut target)?;
    assert_eq!(abuf.phase(), FramePhase::Resolved);

    assert!(matches!(abuf.resolve(&mut target), Err(OitError::FrameResolved)));
    assert!(matches!(abuf.capture(&[]), Err(OitError::FrameResolved)));

    abuf.clear();
    abuf.capture(&[Fragment::new(0, 0, 0.5, RED)])?;
    abuf.resolve(&mut target)?;
    Ok(())
}

#[test]
fn mismatched_buffers_are_rejected() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(4, 4))?;
    let mut small = ColorTarget::new(4, 3);
    assert!(matches!(abuf.resolve(&mut small), Err(OitError::SizeMismatch { .. })));
    let depth = OpaqueDepth::new(3, 4);
    assert!(matches!(abuf.capture_with_depth(&[], &depth), Err(OitError::SizeMismatch { .. })));
    assert!(matches!(ABuffer::new(ABufferDesc::new(4, 4).with_capacity(0)), Err(OitError::InvalidDescriptor(_))));
    Ok(())
}

#[test]
fn resize_reallocates_cleared_tables() -> Result<()> {
    let mut abuf = ABuffer::new(ABufferDesc::new(2, 2))?;
    abuf.capture(&[Fragment::new(1, 1, 0.5, RED)])?;
    abuf.resize(5, 3)?;
    assert_eq!(abuf.heads().len(), 15);
    assert_eq!(abuf.phase(), FramePhase::Cleared);
    abuf.capture(&[Fragment::new(4, 2, 0.5, RED)])?;
    assert_eq!(abuf.chain(4, 2).len(), 1);
    assert!(abuf.resize(0, 3).is_err());

    // The arena grows with the resolution instead of keeping the 2x2 budget.
    abuf.resize(64, 64)?;
    let expected = 64 * 64 * DEFAULT_LAYERS_PER_PIXEL;
    assert_eq!(abuf.desc().capacity, expected);
    assert_eq!(abuf.arena().capacity(), expected);
    let layers: Vec<Fragment> = (0..64 * 64)
        .flat_map(|i| (0..DEFAULT_LAYERS_PER_PIXEL).map(move |l| Fragment::new(i % 64, i / 64, l as f32 * 0.1, RED)))
        .collect();
    let stats = abuf.capture(&layers)?;
    assert_eq!(stats.linked, expected);
    assert_eq!(stats.exhausted, 0);
    Ok(())
}

/// Small deterministic generator so the scene is reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }
}

#[test]
fn matches_per_pixel_reference_composite() -> Result<()> {
    const W: u32 = 16;
    const H: u32 = 8;
    let mut rng = Lcg(7);
    let mut fragments = Vec::new();
    for y in 0..H {
        for x in 0..W {
            let layers = (rng.next_f32() * 6.0) as u32;
            for _ in 0..layers {
                let color = [rng.next_f32(), rng.next_f32(), rng.next_f32(), rng.next_f32()];
                fragments.push(Fragment::new(x, y, rng.next_f32(), color));
            }
        }
    }

    let desc = ABufferDesc::new(W, H)
        .with_capacity(W * H * 8)
        .with_empty_pixel(EmptyPixelPolicy::Transparent);
    let mut abuf = ABuffer::new(desc)?;
    abuf.capture(&fragments)?;
    let mut target = ColorTarget::new(W, H);
    abuf.resolve(&mut target)?;

    for y in 0..H {
        for x in 0..W {
            let mut layers: Vec<_> = fragments
                .iter()
                .filter(|f| f.x == x && f.y == y)
                .map(|f| (oit_core::unpack_unorm4x8(pack_unorm4x8(f.color)), f.depth))
                .collect();
            layers.sort_by(|a, b| b.1.total_cmp(&a.1));
            let mut rgb = [0.0f32; 3];
            let mut t = 1.0f32;
            for (c, _) in &layers {
                for k in 0..3 {
                    rgb[k] = c[k] * c[3] + rgb[k] * (1.0 - c[3]);
                }
                t *= 1.0 - c[3];
            }
            let got = target.pixel(x, y).unwrap();
            for k in 0..3 {
                assert!((got[k] - rgb[k]).abs() < 1e-4, "pixel ({x}, {y}) channel {k}");
            }
            assert!((got[3] - t).abs() < 1e-4, "pixel ({x}, {y}) transmittance");
        }
    }
    Ok(())
}
