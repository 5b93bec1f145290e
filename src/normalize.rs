use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{Frame, PipelineError, Result};

/// Resamples every frame to the dimensions of the first one.
///
/// Frames that already match are passed through untouched.
pub fn normalize_frames(frames: Vec<Frame>) -> Result<Vec<Frame>> {
    let (width, height) = frames.first().ok_or(PipelineError::EmptyStack)?.dimensions();

    Ok(frames
        .into_iter()
        .enumerate()
        .map(|(i, frame)| {
            if frame.dimensions() == (width, height) {
                frame
            } else {
                debug!(
                    "Resizing frame {} from {}x{} to {}x{}",
                    i,
                    frame.width(),
                    frame.height(),
                    width,
                    height
                );
                imageops::resize(&frame, width, height, FilterType::Triangle)
            }
        })
        .collect())
}
