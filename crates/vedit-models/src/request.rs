//! Transformation request descriptor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateUrl, ValidationError};

/// Where the source media comes from.
///
/// Absent and empty values are both treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Remote URL readable by FFmpeg
    #[serde(rename = "file_url", default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// File previously staged by the intake layer
    #[serde(rename = "uploaded_file_path", default, skip_serializing_if = "Option::is_none")]
    pub local_file_path: Option<String>,
}

impl Input {
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            local_file_path: None,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            source_url: None,
            local_file_path: Some(path.into()),
        }
    }
}

/// Output description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Output {
    /// Output file name, optionally with a `%0Nd` sequence placeholder
    #[serde(default)]
    #[validate(length(min = 1, message = "output.file_pattern is required"))]
    pub file_pattern: String,
    /// Callback notified once the job finishes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_webhook_url"))]
    pub webhook_url: Option<String>,
}

impl Output {
    pub fn new(file_pattern: impl Into<String>) -> Self {
        Self {
            file_pattern: file_pattern.into(),
            webhook_url: None,
        }
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}

/// A transformation request as accepted by the intake API.
///
/// `codec`, `bitrate`, `resolution`, `audio_codec` and `audio_bitrate` are
/// carried for producers that set them but do not map to FFmpeg arguments;
/// use `extra_options` for encoder flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TransformRequest {
    #[serde(default)]
    pub input: Input,

    #[serde(default)]
    #[validate(nested)]
    pub output: Output,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,

    /// Filter name to options. Kept sorted so the filter graph is reproducible.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,

    /// Raw, space-delimited FFmpeg tokens appended before the output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_options: Option<String>,

    /// Seek position passed to `-ss`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// Frame count passed to `-frames:v`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<String>,
}

/// An empty webhook URL means "no webhook" and is not an error.
fn validate_webhook_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() || url.validate_url() {
        Ok(())
    } else {
        Err(ValidationError::new("url")
            .with_message("output.webhook_url must be a valid URL".into()))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl TransformRequest {
    pub fn new(output: Output) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: Input) -> Self {
        self.input = input;
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, options: impl Into<String>) -> Self {
        self.filters.insert(name.into(), options.into());
        self
    }

    pub fn with_start_time(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }

    pub fn with_frames(mut self, frames: impl Into<String>) -> Self {
        self.frames = Some(frames.into());
        self
    }

    pub fn with_extra_options(mut self, options: impl Into<String>) -> Self {
        self.extra_options = Some(options.into());
        self
    }

    /// Resolve the input: the remote URL wins over a staged local file.
    pub fn source(&self) -> Option<&str> {
        non_empty(&self.input.source_url).or_else(|| non_empty(&self.input.local_file_path))
    }

    pub fn start_time(&self) -> Option<&str> {
        non_empty(&self.start_time)
    }

    pub fn frames(&self) -> Option<&str> {
        non_empty(&self.frames)
    }

    pub fn extra_options(&self) -> Option<&str> {
        non_empty(&self.extra_options)
    }

    pub fn webhook_url(&self) -> Option<&str> {
        non_empty(&self.output.webhook_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_prefers_remote_url() {
        let request = TransformRequest::new(Output::new("out.mp4")).with_input(Input {
            source_url: Some("https://example.com/a.mp4".into()),
            local_file_path: Some("/data/input/a.mp4".into()),
        });
        assert_eq!(request.source(), Some("https://example.com/a.mp4"));
    }

    #[test]
    fn test_source_falls_back_to_local_file() {
        let request = TransformRequest::new(Output::new("out.mp4")).with_input(Input {
            source_url: Some(String::new()),
            local_file_path: Some("/data/input/a.mp4".into()),
        });
        assert_eq!(request.source(), Some("/data/input/a.mp4"));
    }

    #[test]
    fn test_source_missing() {
        let request = TransformRequest::new(Output::new("out.mp4"));
        assert_eq!(request.source(), None);
    }

    #[test]
    fn test_validation_requires_file_pattern() {
        let request: TransformRequest = serde_json::from_str(r#"{"input": {}}"#).unwrap();
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("file_pattern"));
    }

    #[test]
    fn test_validation_rejects_bad_webhook() {
        let request = TransformRequest::new(Output::new("out.jpg").with_webhook("not a url"));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_empty_webhook_is_unset() {
        let request = TransformRequest::new(Output::new("out.jpg").with_webhook(""));
        assert!(request.validate().is_ok());
        assert_eq!(request.webhook_url(), None);
    }

    #[test]
    fn test_validation_accepts_minimal_request() {
        let request = TransformRequest::new(
            Output::new("out_%03d.jpg").with_webhook("https://hooks.example.com/x"),
        );
        assert!(request.validate().is_ok());
    }
}
