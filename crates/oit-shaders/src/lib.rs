//! oit-shaders: WGSL sources for the per-pixel linked-list OIT passes and the
//! POD structs that mirror their uniform and vertex layouts.

use bytemuck::{Pod, Zeroable};

/// Per-frame uniform shared by all three passes (binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameParams {
    pub width: u32,
    pub height: u32,
    /// Arena slots available this frame (`OffsetMax`).
    pub capacity: u32,
    pub max_fragments: u32,
}

/// Vertex consumed by the capture pipeline. Positions are already in clip space;
/// camera math happens upstream.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CaptureVertex {
    pub clip_position: [f32; 4],
    /// Straight (non-premultiplied) RGBA.
    pub color: [f32; 4],
}

/// Fragment requests per frame after which the capture counter stops growing,
/// so an overrunning frame never wraps back into valid slots. Arena capacity
/// must not exceed it.
pub const COUNTER_LIMIT: u32 = 1 << 31;

/// Clear kernel workgroup edge, in pixels.
pub const CLEAR_WORKGROUP_SIZE: u32 = 8;

/// Bindings shared by every OIT kernel. Head/Length are row-major `width * height`
/// arrays; `nodes` has a 12-byte stride with no padding.
pub const OIT_BINDINGS_WGSL: &str = r#"
struct FrameParams {
    width: u32,
    height: u32,
    capacity: u32,
    max_fragments: u32,
};

struct ListNode {
    packed_color: u32,
    depth: u32,
    next: u32,
};

const SENTINEL: u32 = 0xffffffffu;
const COUNTER_LIMIT: u32 = 0x80000000u;

@group(0) @binding(0) var<uniform> params: FrameParams;
@group(0) @binding(1) var<storage, read_write> counter: atomic<u32>;
@group(0) @binding(2) var<storage, read_write> heads: array<atomic<u32>>;
@group(0) @binding(3) var<storage, read_write> lengths: array<atomic<u32>>;
@group(0) @binding(4) var<storage, read_write> nodes: array<ListNode>;
"#;

/// Reset Head to SENTINEL and Length to zero; invocation (0, 0) also resets the counter.
pub const CLEAR_WGSL: &str = r#"
@compute @workgroup_size(8, 8)
fn cs_clear(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let p = gid.y * params.width + gid.x;
    atomicStore(&heads[p], SENTINEL);
    atomicStore(&lengths[p], 0u);
    if (gid.x == 0u && gid.y == 0u) {
        atomicStore(&counter, 0u);
    }
}
"#;

/// Capture pass: one invocation per covered transparent fragment.
pub const CAPTURE_WGSL: &str = r#"
struct CaptureIn {
    @location(0) clip_position: vec4<f32>,
    @location(1) color: vec4<f32>,
};

struct CaptureOut {
    @builtin(position) position: vec4<f32>,
    @location(0) depth: f32,
    @location(1) color: vec4<f32>,
};

@vertex
fn vs_capture(input: CaptureIn) -> CaptureOut {
    var out: CaptureOut;
    out.position = input.clip_position;
    // Pre-division clip-space z
    out.depth = input.clip_position.z;
    out.color = input.color;
    return out;
}

// Side effects must not run for occluded fragments, so force the depth test
// ahead of the shader.
@fragment @early_depth_test
fn fs_capture(input: CaptureOut) {
    let slot = atomicAdd(&counter, 1u);
    if (slot >= params.capacity) {
        if (slot >= COUNTER_LIMIT) {
            atomicStore(&counter, COUNTER_LIMIT);
        }
        discard;
    }
    let p = u32(input.position.y) * params.width + u32(input.position.x);
    let prev = atomicExchange(&heads[p], slot);
    atomicAdd(&lengths[p], 1u);
    nodes[slot].packed_color = pack4x8unorm(input.color);
    nodes[slot].depth = depth_key(input.depth);
    nodes[slot].next = prev;
}
"#;

/// Opaque geometry: same vertex layout as capture, writes color and depth.
/// Carries no OIT bindings.
pub const OPAQUE_WGSL: &str = r#"
struct OpaqueIn {
    @location(0) clip_position: vec4<f32>,
    @location(1) color: vec4<f32>,
};

struct OpaqueOut {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_opaque(input: OpaqueIn) -> OpaqueOut {
    var out: OpaqueOut;
    out.position = input.clip_position;
    out.color = input.color;
    return out;
}

@fragment
fn fs_opaque(input: OpaqueOut) -> @location(0) vec4<f32> {
    return vec4<f32>(input.color.rgb, 1.0);
}
"#;

const DEPTH_KEY_RAW_WGSL: &str = r#"
fn depth_key(d: f32) -> u32 {
    return bitcast<u32>(d);
}
"#;

const DEPTH_KEY_SORTABLE_WGSL: &str = r#"
fn depth_key(d: f32) -> u32 {
    let bits = bitcast<u32>(d);
    if ((bits & 0x80000000u) != 0u) {
        return ~bits;
    }
    return bits ^ 0x80000000u;
}
"#;

/// Resolve pass: fullscreen triangle, one invocation per pixel.
/// `{{MAX_FRAGMENTS}}` and `{{EMPTY_PIXEL}}` are substituted by [`resolve_wgsl`].
const RESOLVE_TEMPLATE_WGSL: &str = r#"
struct Entry {
    packed_color: u32,
    depth: u32,
};

@vertex
fn vs_resolve(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4<f32> {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0),
    );
    return vec4<f32>(pos[vi], 0.0, 1.0);
}

@fragment
fn fs_resolve(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let p = u32(frag.y) * params.width + u32(frag.x);
    var index = atomicLoad(&heads[p]);
    if (index == SENTINEL) {
        {{EMPTY_PIXEL}}
    }

    let len = min(atomicLoad(&lengths[p]), min(params.max_fragments, {{MAX_FRAGMENTS}}u));

    var sorted: array<Entry, {{MAX_FRAGMENTS}}>;
    var count = 0u;
    loop {
        if (count >= len || index == SENTINEL) {
            break;
        }
        let node = nodes[index];
        sorted[count] = Entry(node.packed_color, node.depth);
        index = node.next;
        count += 1u;
    }

    // Stable insertion sort, farthest first
    for (var i = 1u; i < count; i += 1u) {
        let temp = sorted[i];
        var j = i;
        loop {
            if (j == 0u || sorted[j - 1u].depth >= temp.depth) {
                break;
            }
            sorted[j] = sorted[j - 1u];
            j -= 1u;
        }
        sorted[j] = temp;
    }

    var rgb = vec3<f32>(0.0, 0.0, 0.0);
    var alpha: f32 = 1.0;
    for (var i = 0u; i < count; i += 1u) {
        let color = unpack4x8unorm(sorted[i].packed_color);
        alpha *= (1.0 - color.a);
        rgb = mix(rgb, color.rgb, color.a);
    }

    return vec4<f32>(rgb, alpha);
}
"#;

/// Full clear module source.
pub fn clear_wgsl() -> String {
    format!("{OIT_BINDINGS_WGSL}{CLEAR_WGSL}")
}

/// Full capture module source. `sortable_depth` selects the sign-safe depth key
/// instead of the raw float bit pattern.
pub fn capture_wgsl(sortable_depth: bool) -> String {
    let depth_key = if sortable_depth {
        DEPTH_KEY_SORTABLE_WGSL
    } else {
        DEPTH_KEY_RAW_WGSL
    };
    format!("{OIT_BINDINGS_WGSL}{depth_key}{CAPTURE_WGSL}")
}

/// Full resolve module source with the local sort buffer sized to `max_fragments`.
/// Empty pixels either `discard` (leaving the target untouched) or emit a fully
/// transparent contribution.
pub fn resolve_wgsl(max_fragments: u32, discard_empty: bool) -> String {
    let empty = if discard_empty {
        "discard;"
    } else {
        "return vec4<f32>(0.0, 0.0, 0.0, 1.0);"
    };
    let body = RESOLVE_TEMPLATE_WGSL
        .replace("{{MAX_FRAGMENTS}}", &max_fragments.max(1).to_string())
        .replace("{{EMPTY_PIXEL}}", empty);
    format!("{OIT_BINDINGS_WGSL}{body}")
}
