//! The options of one pipeline run.

use sensor_analysis::CalibrationSettings;

use crate::align::AlignSettings;
use crate::false_color::Colormap;
use crate::fusion::FusionSettings;
use crate::tonemap::DEFAULT_BIAS;

/// Exposure time assumed for a frame whose metadata doesn't provide one.
pub const DEFAULT_EXPOSURE_TIME: f32 = 0.033;

/// Everything that controls a single run of the pipeline.
///
/// Built once per request and passed by reference; the pipeline never
/// modifies it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Compensate handheld misregistration before merging.
    pub align: bool,

    /// Run local contrast equalization on the result to tame glare.
    pub suppress_flare: bool,

    /// Blend the frames directly with exposure fusion instead of merging
    /// a radiance map and tone mapping it.  Overridden by `external_curve`.
    pub ghost_resistant: bool,

    /// Polynomial response curve text.  Supplying one selects the radiance
    /// merge; when malformed the response is calibrated from the stack.
    pub external_curve: Option<String>,

    /// Shadow boost of the tone mapper.
    pub tone_bias: f32,

    pub colormap: Colormap,
    pub alignment: AlignSettings,
    pub calibration: CalibrationSettings,
    pub fusion: FusionSettings,
    pub exposure_fallback: ExposureFallback,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            align: false,
            suppress_flare: false,
            ghost_resistant: true,
            external_curve: None,
            tone_bias: DEFAULT_BIAS,
            colormap: Colormap::default(),
            alignment: AlignSettings::default(),
            calibration: CalibrationSettings::default(),
            fusion: FusionSettings::default(),
            exposure_fallback: ExposureFallback::default(),
        }
    }
}

impl PipelineConfig {
    /// Whether this run merges a radiance map rather than fusing.
    pub fn merges_radiance(&self) -> bool {
        !self.ghost_resistant || self.external_curve.is_some()
    }
}

/// Synthetic exposure times used when a stack's metadata can't tell
/// the frames apart.
///
/// This is a placeholder heuristic: frame `i` gets `base * ratio^i`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ExposureFallback {
    pub base: f32,
    pub ratio: f32,
}

impl Default for ExposureFallback {
    fn default() -> ExposureFallback {
        ExposureFallback {
            base: DEFAULT_EXPOSURE_TIME,
            ratio: 0.5,
        }
    }
}

impl ExposureFallback {
    /// A strictly decreasing series of `count` exposure times.
    pub fn series(&self, count: usize) -> Vec<f32> {
        (0..count)
            .map(|i| self.base * self.ratio.powi(i as i32))
            .collect()
    }
}
