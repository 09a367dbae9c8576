//! Convolution configuration descriptors
//!
//! A [`ConvConfig`] describes one 2-D convolution problem: batch `N`, output
//! spatial extent `H`x`W`, input channels `C`, filter window `P`x`Q`, filter
//! count `F`, stride `S`, and the element types of the operands and result.
//!
//! The input image extent is not stored; it is derived from the output
//! extent, stride and filter window (`H*S + P - 1`). Every derived quantity
//! (tensor shapes, FLOPs, bytes moved, name) is recomputed from the fields on
//! each call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConvBenchError, Result};

/// Element type of a convolution operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit IEEE float
    #[serde(rename = "f32")]
    F32,
    /// 16-bit IEEE float
    #[serde(rename = "f16")]
    F16,
    /// bfloat16
    #[serde(rename = "bf16")]
    Bf16,
    /// 8-bit float, 4 exponent / 3 mantissa bits, no infinities, unsigned zero
    #[serde(rename = "f8E4M3FNUZ")]
    F8E4M3Fnuz,
    /// 8-bit signed integer
    #[serde(rename = "i8")]
    I8,
    /// 32-bit signed integer
    #[serde(rename = "i32")]
    I32,
}

impl DType {
    /// MLIR spelling of the element type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::Bf16 => "bf16",
            Self::F8E4M3Fnuz => "f8E4M3FNUZ",
            Self::I8 => "i8",
            Self::I32 => "i32",
        }
    }

    /// Parse from the MLIR spelling
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "f32" => Some(Self::F32),
            "f16" => Some(Self::F16),
            "bf16" => Some(Self::Bf16),
            "f8E4M3FNUZ" => Some(Self::F8E4M3Fnuz),
            "i8" => Some(Self::I8),
            "i32" => Some(Self::I32),
            _ => None,
        }
    }

    /// Storage size of one element in bytes
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::Bf16 => 2,
            Self::F8E4M3Fnuz | Self::I8 => 1,
        }
    }

    /// Whether this is a floating point type
    #[must_use]
    pub fn is_float(&self) -> bool {
        !matches!(self, Self::I8 | Self::I32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operand layout of the convolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvLayout {
    /// Image `NxHxWxC`, filter `PxQxCxF`
    #[default]
    NhwcHwcf,
    /// Image `NxCxHxW`, filter `FxCxPxQ`
    NchwFchw,
}

impl ConvLayout {
    /// Suffix used in the `linalg.conv_2d_*` op name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NhwcHwcf => "nhwc_hwcf",
            Self::NchwFchw => "nchw_fchw",
        }
    }
}

/// One convolution problem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvConfig {
    #[serde(rename = "N")]
    n: u64,
    #[serde(rename = "H")]
    h: u64,
    #[serde(rename = "W")]
    w: u64,
    #[serde(rename = "C")]
    c: u64,
    #[serde(rename = "P")]
    p: u64,
    #[serde(rename = "Q")]
    q: u64,
    #[serde(rename = "F")]
    f: u64,
    #[serde(rename = "S")]
    s: u64,
    input_dtype: DType,
    output_dtype: DType,
    #[serde(default)]
    layout: ConvLayout,
}

impl ConvConfig {
    /// Create an NHWC/HWCF configuration
    #[must_use]
    #[allow(clippy::too_many_arguments, clippy::many_single_char_names)]
    pub fn new(
        n: u64,
        h: u64,
        w: u64,
        c: u64,
        p: u64,
        q: u64,
        f: u64,
        s: u64,
        input_dtype: DType,
        output_dtype: DType,
    ) -> Self {
        Self {
            n,
            h,
            w,
            c,
            p,
            q,
            f,
            s,
            input_dtype,
            output_dtype,
            layout: ConvLayout::NhwcHwcf,
        }
    }

    /// Use a different operand layout
    #[must_use]
    pub fn with_layout(mut self, layout: ConvLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Reject degenerate geometry
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if any extent, channel count or the
    /// stride is zero, or if the FLOP or byte count does not fit in a `u64`.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("N", self.n),
            ("H", self.h),
            ("W", self.w),
            ("C", self.c),
            ("P", self.p),
            ("Q", self.q),
            ("F", self.f),
            ("S", self.s),
        ];
        if let Some((field, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(ConvBenchError::InvalidConfiguration(format!(
                "{}: field {field} must be non-zero",
                self.name()
            )));
        }
        if self.checked_flops().is_none() || self.checked_byte_count().is_none() {
            return Err(ConvBenchError::InvalidConfiguration(format!(
                "{}: dimensions too large, FLOP or byte count overflows u64",
                self.name()
            )));
        }
        Ok(())
    }

    /// Batch size
    #[must_use]
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Output height
    #[must_use]
    pub fn h(&self) -> u64 {
        self.h
    }

    /// Output width
    #[must_use]
    pub fn w(&self) -> u64 {
        self.w
    }

    /// Input channels
    #[must_use]
    pub fn c(&self) -> u64 {
        self.c
    }

    /// Filter height
    #[must_use]
    pub fn p(&self) -> u64 {
        self.p
    }

    /// Filter width
    #[must_use]
    pub fn q(&self) -> u64 {
        self.q
    }

    /// Filter count (output channels)
    #[must_use]
    pub fn f(&self) -> u64 {
        self.f
    }

    /// Stride in both spatial dimensions
    #[must_use]
    pub fn s(&self) -> u64 {
        self.s
    }

    /// Operand element type
    #[must_use]
    pub fn input_dtype(&self) -> DType {
        self.input_dtype
    }

    /// Result element type
    #[must_use]
    pub fn output_dtype(&self) -> DType {
        self.output_dtype
    }

    /// Operand layout
    #[must_use]
    pub fn layout(&self) -> ConvLayout {
        self.layout
    }

    /// Input image height
    #[must_use]
    pub fn input_height(&self) -> u64 {
        input_extent(self.h, self.s, self.p).unwrap_or(u64::MAX)
    }

    /// Input image width
    #[must_use]
    pub fn input_width(&self) -> u64 {
        input_extent(self.w, self.s, self.q).unwrap_or(u64::MAX)
    }

    /// Unique, filesystem-safe name; doubles as the artifact file stem
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "conv_2d_{}_{}x{}x{}x{}x{}x{}x{}_{}x{}x{}_stride{}",
            self.layout.as_str(),
            self.n,
            self.h,
            self.w,
            self.c,
            self.p,
            self.q,
            self.f,
            self.input_dtype,
            self.input_dtype,
            self.output_dtype,
            self.s
        )
    }

    /// Image tensor dims without the element type
    #[must_use]
    pub fn image_dims(&self) -> [u64; 4] {
        let (ih, iw) = (self.input_height(), self.input_width());
        match self.layout {
            ConvLayout::NhwcHwcf => [self.n, ih, iw, self.c],
            ConvLayout::NchwFchw => [self.n, self.c, ih, iw],
        }
    }

    /// Filter tensor dims without the element type
    #[must_use]
    pub fn filter_dims(&self) -> [u64; 4] {
        match self.layout {
            ConvLayout::NhwcHwcf => [self.p, self.q, self.c, self.f],
            ConvLayout::NchwFchw => [self.f, self.c, self.p, self.q],
        }
    }

    /// Output tensor dims without the element type
    #[must_use]
    pub fn output_dims(&self) -> [u64; 4] {
        match self.layout {
            ConvLayout::NhwcHwcf => [self.n, self.h, self.w, self.f],
            ConvLayout::NchwFchw => [self.n, self.f, self.h, self.w],
        }
    }

    /// Image shape as passed to the runner, e.g. `2x34x34x64xf16`
    #[must_use]
    pub fn image_shape(&self) -> String {
        shape_string(&self.image_dims(), self.input_dtype)
    }

    /// Filter shape as passed to the runner, e.g. `3x3x64x128xf16`
    #[must_use]
    pub fn filter_shape(&self) -> String {
        shape_string(&self.filter_dims(), self.input_dtype)
    }

    /// Output shape, e.g. `2x32x32x128xf32`
    #[must_use]
    pub fn output_shape(&self) -> String {
        shape_string(&self.output_dims(), self.output_dtype)
    }

    /// Multiply-accumulate count times two
    ///
    /// Saturates at `u64::MAX`; [`validate`](Self::validate) rejects
    /// configurations where that would happen.
    #[must_use]
    pub fn flops(&self) -> u64 {
        self.checked_flops().unwrap_or(u64::MAX)
    }

    /// Bytes read (image, filter) plus bytes written (output)
    ///
    /// Saturates at `u64::MAX` like [`flops`](Self::flops).
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.checked_byte_count().unwrap_or(u64::MAX)
    }

    fn checked_flops(&self) -> Option<u64> {
        checked_product(&[2, self.n, self.h, self.w, self.f, self.c, self.p, self.q])
    }

    fn checked_byte_count(&self) -> Option<u64> {
        let in_h = input_extent(self.h, self.s, self.p)?;
        let in_w = input_extent(self.w, self.s, self.q)?;
        let in_bytes = self.input_dtype.size_bytes();
        let out_bytes = self.output_dtype.size_bytes();
        let image = checked_product(&[self.n, self.c, in_h, in_w, in_bytes])?;
        let output = checked_product(&[self.n, self.f, self.h, self.w, out_bytes])?;
        let filter = checked_product(&[self.p, self.q, self.c, self.f, in_bytes])?;
        image.checked_add(output)?.checked_add(filter)
    }
}

/// `out * stride + window - 1`
fn input_extent(out: u64, stride: u64, window: u64) -> Option<u64> {
    out.checked_mul(stride)?
        .checked_add(window)
        .map(|v| v.saturating_sub(1))
}

fn checked_product(factors: &[u64]) -> Option<u64> {
    factors
        .iter()
        .try_fold(1u64, |acc, &v| acc.checked_mul(v))
}

impl fmt::Display for ConvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn shape_string(dims: &[u64], dtype: DType) -> String {
    let mut out = String::new();
    for d in dims {
        out.push_str(&d.to_string());
        out.push('x');
    }
    out.push_str(dtype.as_str());
    out
}

/// A configuration together with the caller-supplied category tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedConfig {
    /// Grouping label, e.g. the model family the shape came from
    pub tag: String,
    /// The convolution problem
    pub config: ConvConfig,
}

impl TaggedConfig {
    /// Pair a tag with a configuration
    #[must_use]
    pub fn new(tag: impl Into<String>, config: ConvConfig) -> Self {
        Self {
            tag: tag.into(),
            config,
        }
    }
}
