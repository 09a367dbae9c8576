//! Configuration enumeration
//!
//! Supplies the `(tag, descriptor)` list that a benchmark run compiles and
//! measures. The list is always fully materialized before dispatch.

use std::path::Path;

use crate::config::{ConvConfig, ConvLayout, DType, TaggedConfig};
use crate::error::{ConvBenchError, Result};

/// Batch sizes swept by the built-in problem set
pub const DEFAULT_BATCH_SIZES: &[u64] = &[1, 2, 4, 8];

/// UNet-style 3x3 convolutions: (spatial extent, input channels, filters)
const UNET_SHAPES: &[(u64, u64, u64)] = &[
    (128, 4, 320),
    (128, 320, 320),
    (64, 320, 640),
    (64, 640, 640),
    (32, 640, 1280),
    (32, 1280, 1280),
];

/// ResNet-50 stage convolutions: (output extent, input channels, filters, window, stride)
const RESNET_SHAPES: &[(u64, u64, u64, u64, u64)] = &[
    (112, 3, 64, 7, 2),
    (56, 64, 64, 1, 1),
    (56, 64, 64, 3, 1),
    (56, 64, 256, 1, 1),
    (28, 128, 128, 3, 1),
    (28, 128, 512, 1, 1),
    (14, 256, 256, 3, 1),
    (14, 256, 1024, 1, 1),
    (7, 512, 512, 3, 1),
    (7, 512, 2048, 1, 1),
];

/// Built-in problem set tagged `unet` and `resnet`
#[must_use]
pub fn default_configs() -> Vec<TaggedConfig> {
    let mut configs = Vec::new();
    for layout in [ConvLayout::NhwcHwcf, ConvLayout::NchwFchw] {
        configs.extend(
            unet_sweep(DType::F16, DType::F32, layout)
                .into_iter()
                .map(|c| TaggedConfig::new("unet", c)),
        );
    }
    configs.extend(
        resnet_sweep(DType::F16, DType::F32)
            .into_iter()
            .map(|c| TaggedConfig::new("resnet", c)),
    );
    configs
}

/// 3x3 stride-1 convolutions from a diffusion UNet
#[must_use]
pub fn unet_sweep(input: DType, output: DType, layout: ConvLayout) -> Vec<ConvConfig> {
    let mut configs = Vec::new();
    for &n in DEFAULT_BATCH_SIZES {
        for &(hw, c, f) in UNET_SHAPES {
            configs.push(ConvConfig::new(n, hw, hw, c, 3, 3, f, 1, input, output).with_layout(layout));
        }
    }
    configs
}

/// ResNet-50 convolutions in NHWC
#[must_use]
pub fn resnet_sweep(input: DType, output: DType) -> Vec<ConvConfig> {
    let mut configs = Vec::new();
    for &n in DEFAULT_BATCH_SIZES {
        for &(hw, c, f, window, stride) in RESNET_SHAPES {
            configs.push(ConvConfig::new(
                n, hw, hw, c, window, window, f, stride, input, output,
            ));
        }
    }
    configs
}

/// Load a problem set from a JSON array of `{"tag": .., "config": {..}}`
///
/// # Errors
///
/// Fails if the file cannot be read, is not valid JSON, is empty, or holds a
/// degenerate configuration.
pub fn load_configs(path: &Path) -> Result<Vec<TaggedConfig>> {
    let text = std::fs::read_to_string(path).map_err(|e| ConvBenchError::io(path, &e))?;
    let configs: Vec<TaggedConfig> =
        serde_json::from_str(&text).map_err(|e| ConvBenchError::FormatError {
            reason: format!("{}: {e}", path.display()),
        })?;
    if configs.is_empty() {
        return Err(ConvBenchError::InvalidConfiguration(format!(
            "{} contains no configurations",
            path.display()
        )));
    }
    for tagged in &configs {
        tagged.config.validate()?;
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    #[test]
    fn test_default_configs_tags_and_count() {
        let configs = default_configs();
        let unet = configs.iter().filter(|c| c.tag == "unet").count();
        let resnet = configs.iter().filter(|c| c.tag == "resnet").count();
        assert_eq!(unet, 2 * DEFAULT_BATCH_SIZES.len() * UNET_SHAPES.len());
        assert_eq!(resnet, DEFAULT_BATCH_SIZES.len() * RESNET_SHAPES.len());
        assert_eq!(configs.len(), unet + resnet);
    }

    #[test]
    fn test_default_config_names_are_unique() {
        let configs = default_configs();
        let names: HashSet<String> = configs.iter().map(|c| c.config.name()).collect();
        assert_eq!(names.len(), configs.len());
    }

    #[test]
    fn test_default_configs_are_valid() {
        for tagged in default_configs() {
            tagged.config.validate().unwrap();
        }
    }

    #[test]
    fn test_load_configs_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"tag":"custom","config":{{"N":4,"H":16,"W":16,"C":8,"P":3,"Q":3,"F":32,"S":1,
                 "input_dtype":"i8","output_dtype":"i32","layout":"nchw_fchw"}}}}]"#
        )
        .unwrap();

        let configs = load_configs(file.path()).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].tag, "custom");
        assert_eq!(configs[0].config.layout(), ConvLayout::NchwFchw);
        assert_eq!(configs[0].config.output_dtype(), DType::I32);
    }

    #[test]
    fn test_load_configs_rejects_empty_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        let err = load_configs(file.path()).unwrap_err();
        assert!(matches!(err, ConvBenchError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_load_configs_rejects_overflowing_shape() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"tag":"huge","config":{{"N":4294967296,"H":4294967296,"W":16,"C":8,"P":3,"Q":3,
                 "F":32,"S":1,"input_dtype":"f16","output_dtype":"f32"}}}}]"#
        )
        .unwrap();
        let err = load_configs(file.path()).unwrap_err();
        assert!(matches!(err, ConvBenchError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_load_configs_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_configs(file.path()).unwrap_err();
        assert!(matches!(err, ConvBenchError::FormatError { .. }));
    }

    #[test]
    fn test_load_configs_missing_file() {
        let err = load_configs(Path::new("/nonexistent/configs.json")).unwrap_err();
        assert!(matches!(err, ConvBenchError::IoError { .. }));
    }
}
