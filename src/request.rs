//! Boundary between callers handing in encoded images and the pipeline.
//!
//! Nothing here panics or returns a bare error: every request ends in a
//! `ProcessOutcome`, and failures carry a message meant for the caller.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::DEFAULT_EXPOSURE_TIME;
use crate::metadata::read_exposure_time;
use crate::{pipeline, ExposureStack, Frame, PipelineConfig, PipelineError, PipelineOutput};

/// One encoded image as received.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Used only in log messages.
    pub name: String,
    pub bytes: Vec<u8>,

    /// Overrides whatever the image's metadata says.
    pub exposure_time: Option<f32>,
}

impl Upload {
    pub fn new<S: Into<String>>(name: S, bytes: Vec<u8>) -> Upload {
        Upload {
            name: name.into(),
            bytes: bytes,
            exposure_time: None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Upload> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(Upload::new(path.display().to_string(), bytes))
    }

    pub fn with_exposure_time(mut self, seconds: f32) -> Upload {
        self.exposure_time = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    pub uploads: Vec<Upload>,
    pub config: PipelineConfig,
}

#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Success(PipelineOutput),
    Failure { message: String },
}

impl ProcessOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(*self, ProcessOutcome::Failure { .. })
    }

    /// The status line on success, the error message on failure.
    pub fn message(&self) -> &str {
        match *self {
            ProcessOutcome::Success(ref output) => &output.status,
            ProcessOutcome::Failure { ref message } => message,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not decode {name}: {source}")]
    Image {
        name: String,
        #[source]
        source: image::ImageError,
    },
}

/// Decodes an upload to 8-bit RGB, whatever its source format.
pub fn decode_upload(upload: &Upload) -> Result<Frame, DecodeError> {
    image::load_from_memory(&upload.bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| DecodeError::Image {
            name: upload.name.clone(),
            source: e,
        })
}

/// Exposure time of an upload: explicit, else from EXIF, else the default.
fn exposure_time_of(upload: &Upload) -> f32 {
    match upload.exposure_time.filter(|t| t.is_finite() && *t > 0.0) {
        Some(t) => t,
        None => match read_exposure_time(&upload.bytes) {
            Some(t) => t,
            None => {
                debug!("No exposure time for {}, assuming {}s", upload.name, DEFAULT_EXPOSURE_TIME);
                DEFAULT_EXPOSURE_TIME
            }
        },
    }
}

/// Processes one request end to end.
pub fn process(request: ProcessRequest) -> ProcessOutcome {
    let ProcessRequest { uploads, config } = request;

    let mut frames = Vec::with_capacity(uploads.len());
    let mut exposure_times = Vec::with_capacity(uploads.len());
    for upload in uploads.iter() {
        match decode_upload(upload) {
            Ok(frame) => {
                frames.push(frame);
                exposure_times.push(exposure_time_of(upload));
            }
            Err(e) => warn!("Dropping upload: {}", e),
        }
    }

    if frames.len() < 2 {
        return ProcessOutcome::Failure {
            message: PipelineError::InsufficientFrames(frames.len()).to_string(),
        };
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let stack = ExposureStack::new(frames, exposure_times)?;
        pipeline::run(stack, &config)
    }));

    match result {
        Ok(Ok(output)) => ProcessOutcome::Success(output),
        Ok(Err(e @ PipelineError::InsufficientFrames(_))) => ProcessOutcome::Failure {
            message: e.to_string(),
        },
        Ok(Err(e)) => {
            error!("Pipeline failed: {}", e);
            ProcessOutcome::Failure {
                message: format!("internal error: {}", e),
            }
        }
        Err(payload) => {
            let reason = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            error!("Pipeline panicked: {}", reason);
            ProcessOutcome::Failure {
                message: format!("internal error: {}", reason),
            }
        }
    }
}
