//! OIT configuration
//!
//! Loads A-buffer, resolve and runtime settings from `oit.toml`, with
//! `OIT_*` environment variables as overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OitConfig {
    /// A-buffer sizing
    pub buffer: BufferConfig,
    /// Resolve pass settings
    pub resolve: ResolveConfig,
    /// Execution backend settings
    pub runtime: RuntimeConfig,
    /// Demo output settings
    pub demo: DemoConfig,
}

/// A-buffer sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub width: u32,
    pub height: u32,
    /// Arena capacity in nodes (default: a few layers per pixel)
    pub capacity: Option<u32>,
    /// Per-pixel traversal limit in the resolve pass
    pub max_fragments: u32,
}

/// Resolve pass configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub empty_pixel: EmptyPixel,
    pub depth_key: DepthKey,
}

/// What resolve writes for a pixel with no fragments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPixel {
    /// Leave the target untouched
    #[default]
    Discard,
    /// Write the empty result (no color, full transmittance)
    Transparent,
}

/// How fragment depth becomes the sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthKey {
    /// Raw float bits; correct for non-negative depths
    #[default]
    Raw,
    /// Order-preserving transform; correct across the sign boundary
    Sortable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

/// Execution backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub backend: Backend,
    /// CPU worker threads (default: one per core)
    pub threads: Option<usize>,
}

/// Demo application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Where the resolved frame is written (PNG)
    pub output: PathBuf,
    /// Opaque background color, linear RGB
    pub background: [f32; 3],
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            capacity: None,
            max_fragments: 16,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("oit.png"),
            background: [0.02, 0.02, 0.03],
        }
    }
}

impl std::str::FromStr for EmptyPixel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "transparent" => Ok(Self::Transparent),
            other => Err(format!("unknown empty pixel policy: {}", other)),
        }
    }
}

impl std::str::FromStr for DepthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "sortable" => Ok(Self::Sortable),
            other => Err(format!("unknown depth key mode: {}", other)),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// Parse `name` into `slot` if set and valid; invalid values are ignored.
fn env_parse<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(name) {
        if let Ok(parsed) = val.parse::<T>() {
            *slot = parsed;
        }
    }
}

impl OitConfig {
    /// Load configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(OitConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Load `oit.toml` from the current directory, or defaults if it doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("oit.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    pub fn merge_with_env(&mut self) {
        // Buffer settings
        env_parse("OIT_WIDTH", &mut self.buffer.width);
        env_parse("OIT_HEIGHT", &mut self.buffer.height);
        if let Ok(val) = std::env::var("OIT_CAPACITY") {
            if let Ok(capacity) = val.parse::<u32>() {
                self.buffer.capacity = Some(capacity);
            }
        }
        env_parse("OIT_MAX_FRAGMENTS", &mut self.buffer.max_fragments);

        // Resolve settings
        env_parse("OIT_EMPTY_PIXEL", &mut self.resolve.empty_pixel);
        env_parse("OIT_DEPTH_KEY", &mut self.resolve.depth_key);

        // Runtime settings
        env_parse("OIT_BACKEND", &mut self.runtime.backend);
        if let Ok(val) = std::env::var("OIT_THREADS") {
            if let Ok(threads) = val.parse::<usize>() {
                self.runtime.threads = Some(threads);
            }
        }

        // Demo settings
        if let Ok(path) = std::env::var("OIT_OUTPUT") {
            self.demo.output = PathBuf::from(path);
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// 1. Load from oit.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}
