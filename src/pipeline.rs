//! The full processing chain, from a validated stack to display images.

use tracing::{info, warn};

use sensor_analysis::{calibrate_debevec, ResponseCurve};

use crate::align::align_stack;
use crate::clahe::suppress_flare;
use crate::false_color::false_color;
use crate::fusion::fuse_exposures;
use crate::merge::{merge_radiance, RadianceMap};
use crate::normalize::normalize_frames;
use crate::tonemap::tone_map;
use crate::{ExposureStack, Frame, PipelineConfig, Result};

/// Where the response curve of a radiance merge came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CurveSource {
    /// Parsed from the supplied polynomial text.
    External,
    /// Solved from the stack itself.
    Calibrated,
    /// Calibration failed; a linear response was assumed.
    LinearFallback,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The 8-bit result, tone mapped or fused.
    pub preview: Frame,
    pub false_color: Frame,

    /// Only present when the radiance path was taken.
    pub radiance: Option<RadianceMap>,

    /// Translation applied to each frame, all zero without alignment.
    pub offsets: Vec<(i32, i32)>,

    /// Exposure times actually used, after any fallback.
    pub exposure_times: Vec<f32>,

    pub curve_source: Option<CurveSource>,
    pub status: String,
}

/// Runs the whole pipeline on `stack`.
pub fn run(mut stack: ExposureStack, config: &PipelineConfig) -> Result<PipelineOutput> {
    info!("Processing {} frames", stack.len());

    if stack.ensure_distinct_exposures(&config.exposure_fallback)? {
        warn!(
            "Exposure times are not distinct, substituting {:?}",
            stack.exposure_times()
        );
    }
    let (frames, exposure_times) = stack.into_parts();
    let mut frames = normalize_frames(frames)?;

    let offsets = if config.align {
        align_stack(&mut frames, &config.alignment)
    } else {
        vec![(0, 0); frames.len()]
    };

    let (preview, radiance, curve_source) = if !config.merges_radiance() {
        info!("Blending with exposure fusion");
        (fuse_exposures(&frames, &config.fusion), None, None)
    } else {
        if config.ghost_resistant {
            info!("Response curve supplied, merging radiance instead of fusing");
        }
        let (curve, source) = response_curve(&frames, &exposure_times, config);
        info!("Merging radiance ({:?} response)", source);
        let map = merge_radiance(&frames, &exposure_times, &curve);
        (tone_map(&map, config.tone_bias), Some(map), Some(source))
    };

    let preview = if config.suppress_flare {
        info!("Suppressing flare");
        suppress_flare(&preview)
    } else {
        preview
    };

    let false_color = false_color(&preview, config.colormap);

    let method = match curve_source {
        None => "exposure fusion".to_string(),
        Some(CurveSource::External) => "radiance merge (external response)".to_string(),
        Some(CurveSource::Calibrated) => "radiance merge (calibrated response)".to_string(),
        Some(CurveSource::LinearFallback) => "radiance merge (linear response)".to_string(),
    };
    let mut status = format!("Processed {} images via {}", frames.len(), method);
    if config.align {
        status.push_str(", aligned");
    }
    if config.suppress_flare {
        status.push_str(", flare suppressed");
    }
    info!("{}", status);

    Ok(PipelineOutput {
        preview: preview,
        false_color: false_color,
        radiance: radiance,
        offsets: offsets,
        exposure_times: exposure_times,
        curve_source: curve_source,
        status: status,
    })
}

/// Picks the response curve for a radiance merge: the external curve if
/// it parses, else a calibrated one, else linear.
fn response_curve(
    frames: &[Frame],
    exposure_times: &[f32],
    config: &PipelineConfig,
) -> (ResponseCurve, CurveSource) {
    if let Some(text) = config.external_curve.as_ref() {
        match ResponseCurve::from_polynomial_text(text) {
            Ok(curve) => return (curve, CurveSource::External),
            Err(e) => warn!("Discarding external response curve: {}", e),
        }
    }

    let raw: Vec<&[u8]> = frames.iter().map(|f| f.as_raw().as_slice()).collect();
    match calibrate_debevec(&raw, exposure_times, &config.calibration) {
        Ok(curve) => (curve, CurveSource::Calibrated),
        Err(e) => {
            warn!("Calibration failed, assuming a linear response: {}", e);
            (ResponseCurve::linear(), CurveSource::LinearFallback)
        }
    }
}
