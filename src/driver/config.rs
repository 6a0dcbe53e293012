//! Compiler options.
//!
//! The option bag carried by the driver and passed by reference to every
//! pass: per-optimization toggles, the class inliner's instruction ceiling,
//! worker-pool sizing, main-dex roots, and the writer's partition limit. No
//! environment variables are consulted anywhere in the core.

/// The active option set for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Shorten names in the final pass.
    pub minification: bool,

    /// Fold superclasses into their sole subclass where safe.
    pub enable_vertical_class_merging: bool,

    /// Fuse observationally interchangeable classes.
    pub enable_horizontal_class_merging: bool,

    /// Rewrite eligible enums to integer constants.
    pub enable_enum_unboxing: bool,

    /// Canonicalize method parameter orderings.
    pub enable_proto_normalization: bool,

    /// Eliminate short-lived local objects.
    pub enable_class_inlining: bool,

    /// Combined estimated-instruction ceiling for the class inliner's forced
    /// inlines, per outer method.
    pub class_inliner_instruction_limit: usize,

    /// Worker threads for per-method and per-class work; `0` uses the rayon
    /// default.
    pub threads: usize,

    /// Descriptors of classes required in the primary dex partition.
    pub main_dex_descriptors: Vec<String>,

    /// Writer-side limit on method definitions per partition.
    pub max_methods_per_partition: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            minification: true,
            enable_vertical_class_merging: true,
            enable_horizontal_class_merging: true,
            enable_enum_unboxing: true,
            enable_proto_normalization: true,
            enable_class_inlining: true,
            class_inliner_instruction_limit: 80,
            threads: 0,
            main_dex_descriptors: Vec::new(),
            max_methods_per_partition: 65_536,
        }
    }
}

impl CompilerOptions {
    /// A configuration with every optimization disabled; the pipeline only
    /// shakes and (optionally) minifies.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            minification: false,
            enable_vertical_class_merging: false,
            enable_horizontal_class_merging: false,
            enable_enum_unboxing: false,
            enable_proto_normalization: false,
            enable_class_inlining: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::default();
        assert!(options.minification);
        assert!(options.enable_class_inlining);
        assert_eq!(options.max_methods_per_partition, 65_536);
    }

    #[test]
    fn test_passthrough() {
        let options = CompilerOptions::passthrough();
        assert!(!options.minification);
        assert!(!options.enable_horizontal_class_merging);
    }
}
