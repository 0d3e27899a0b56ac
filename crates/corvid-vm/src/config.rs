//! Heap and VM configuration.
//!
//! ```toml
//! [capacity]
//! pairs = 262144
//! closures = 32768
//!
//! [gc]
//! headroom = 0.03125
//! reclaim_symbols = false
//!
//! [vm]
//! max_nesting = 24
//! max_frames = 65536
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gc::slab::SlabClass;

/// Largest capacity a slab may be configured with.
pub const MAX_SLAB_CAPACITY: usize = 1 << 28;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Slab sizes
    pub capacity: SlabCapacities,
    /// Collector tuning
    pub gc: GcConfig,
    /// Interpreter limits
    pub vm: VmConfig,
}

/// Number of objects each slab can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct SlabCapacities {
    pub pairs: usize,
    pub strings: usize,
    /// Also the size of the symbol index.
    pub symbols: usize,
    pub closures: usize,
    pub trees: usize,
    pub arrays: usize,
    pub bytecode: usize,
    pub natives: usize,
    pub buffers: usize,
    pub tree_boxes: usize,
}

/// Collector tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Fraction of a slab's capacity that, once it is all that remains,
    /// schedules a collection at the next opcode boundary.
    pub headroom: f64,
    /// Sweep unreachable symbols instead of keeping every interned name.
    pub reclaim_symbols: bool,
}

/// Interpreter limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Nested evaluator invocations before `too-deep` is raised.
    ///
    /// Every level holds an interpreter and a host call on the native
    /// stack. The default fits a 2 MiB thread in an unoptimized build.
    pub max_nesting: usize,
    /// Closure-stack frames per invocation before `too-deep` is raised.
    pub max_frames: usize,
    /// Initial value-stack capacity.
    pub value_stack: usize,
    /// Initial closure-stack capacity.
    pub closure_stack: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            capacity: SlabCapacities::default(),
            gc: GcConfig::default(),
            vm: VmConfig::default(),
        }
    }
}

impl Default for SlabCapacities {
    fn default() -> Self {
        Self {
            pairs: 1 << 18,
            strings: 1 << 14,
            symbols: 1 << 14,
            closures: 1 << 15,
            trees: 1 << 17,
            arrays: 1 << 13,
            bytecode: 1 << 13,
            natives: 1 << 10,
            buffers: 1 << 12,
            tree_boxes: 1 << 13,
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            headroom: 1.0 / 32.0,
            reclaim_symbols: false,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_nesting: 24,
            max_frames: 1 << 16,
            value_stack: 64,
            closure_stack: 16,
        }
    }
}

impl SlabCapacities {
    /// Capacity configured for `class`.
    pub fn of(&self, class: SlabClass) -> usize {
        match class {
            SlabClass::Pair => self.pairs,
            SlabClass::String => self.strings,
            SlabClass::Symbol => self.symbols,
            SlabClass::Closure => self.closures,
            SlabClass::Tree => self.trees,
            SlabClass::Array => self.arrays,
            SlabClass::Bytecode => self.bytecode,
            SlabClass::Native => self.natives,
            SlabClass::Buffer => self.buffers,
            SlabClass::TreeBox => self.tree_boxes,
        }
    }

    /// Every slab at the same capacity.
    pub fn uniform(capacity: usize) -> Self {
        Self {
            pairs: capacity,
            strings: capacity,
            symbols: capacity,
            closures: capacity,
            trees: capacity,
            arrays: capacity,
            bytecode: capacity,
            natives: capacity,
            buffers: capacity,
            tree_boxes: capacity,
        }
    }
}

impl HeapConfig {
    /// A compact heap, suited to embedding and tests.
    pub fn small() -> Self {
        Self {
            capacity: SlabCapacities::uniform(1 << 12),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: HeapConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file, then applies `CORVID_*` overrides from
    /// the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: HeapConfig = toml::from_str(&content)?;
        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Applies `CORVID_*` environment variables.
    pub fn load_from_env(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(key) = key.strip_prefix("CORVID_") {
                let key = key.to_lowercase().replace('_', "-");
                self.set(&key, &value);
            }
        }
    }

    /// Sets a single option by its dashed name. Unknown keys and
    /// unparsable values are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "gc-headroom" => {
                if let Ok(v) = value.parse() {
                    self.gc.headroom = v;
                }
            }
            "reclaim-symbols" => self.gc.reclaim_symbols = value == "true",
            "max-nesting" => {
                if let Ok(v) = value.parse() {
                    self.vm.max_nesting = v;
                }
            }
            "max-frames" => {
                if let Ok(v) = value.parse() {
                    self.vm.max_frames = v;
                }
            }
            _ => {
                tracing::debug!(key, "ignoring unknown configuration key");
            }
        }
    }

    /// Rejects configurations the heap cannot honor.
    pub fn validate(&self) -> Result<()> {
        for class in SlabClass::ALL {
            let capacity = self.capacity.of(class);
            if capacity == 0 || capacity > MAX_SLAB_CAPACITY {
                return Err(Error::config(format!(
                    "{} capacity must be between 1 and {}, got {}",
                    class, MAX_SLAB_CAPACITY, capacity
                )));
            }
        }
        if !(0.0..1.0).contains(&self.gc.headroom) {
            return Err(Error::config(format!(
                "gc.headroom must be in [0, 1), got {}",
                self.gc.headroom
            )));
        }
        if self.vm.max_nesting == 0 || self.vm.max_frames < 2 {
            return Err(Error::config("vm.max_nesting and vm.max_frames are too small"));
        }
        Ok(())
    }

    /// Headroom of `class` in slots.
    pub(crate) fn headroom_slots(&self, class: SlabClass) -> usize {
        ((self.capacity.of(class) as f64) * self.gc.headroom) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(HeapConfig::default().validate().is_ok());
        assert!(HeapConfig::small().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HeapConfig::from_toml_str(
            r#"
            [capacity]
            pairs = 1024

            [vm]
            max_nesting = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.capacity.pairs, 1024);
        assert_eq!(config.capacity.trees, SlabCapacities::default().trees);
        assert_eq!(config.vm.max_nesting, 8);
        assert_eq!(config.vm.max_frames, VmConfig::default().max_frames);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = HeapConfig::from_toml_str("[capacity]\nclosures = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_bad_headroom() {
        let err = HeapConfig::from_toml_str("[gc]\nheadroom = 1.5\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = HeapConfig::from_toml_str("[capacity\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gc]\nreclaim_symbols = true").unwrap();
        let config = HeapConfig::load(file.path()).unwrap();
        assert!(config.gc.reclaim_symbols);
    }

    #[test]
    fn test_set_by_dashed_name() {
        let mut config = HeapConfig::default();
        config.set("max-frames", "512");
        config.set("gc-headroom", "not a number");
        config.set("no-such-key", "1");
        assert_eq!(config.vm.max_frames, 512);
        assert_eq!(config.gc.headroom, GcConfig::default().headroom);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = HeapConfig::small();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(HeapConfig::from_toml_str(&text).unwrap(), config);
    }
}
