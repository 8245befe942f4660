//! Photo → InstrumentDescription
//!
//! Steps (phase `vision`):
//! 0. input preparation: size checks on the raw upload
//! 1. image normalization: magic-byte format detection, base64 `data:` URL
//! 2. visual inference: one vision-model call
//! 3. structured extraction: JSON extraction + schema validation

use base64::Engine as _;
use ivs_common::events::{log_codes, MetaValue, Phase};
use ivs_common::extract::extract_and_validate;
use ivs_common::InstrumentDescription;
use std::sync::Arc;
use tracing::info;

use super::{meta, EventSink, PipelineError};
use crate::model::VisionModel;

/// Raw uploaded image plus what the client declared about it
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// Content type from the multipart field, if any
    pub declared_type: Option<String>,
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, declared_type: Option<String>) -> Self {
        Self {
            bytes,
            declared_type,
            file_name: None,
        }
    }
}

/// Normalized image ready for the vision model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime: String,
    pub data_url: String,
}

/// Pick the MIME type from the bytes themselves. The declared type is
/// trusted only when it is `image/*` and the bytes match no known format.
pub fn detect_image_mime(bytes: &[u8], declared: Option<&str>) -> Result<String, PipelineError> {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
            Ok(kind.mime_type().to_string())
        }
        Some(kind) => Err(PipelineError::InvalidInput(format!(
            "Unsupported file type: {}",
            kind.mime_type()
        ))),
        None => match declared {
            Some(declared) if declared.starts_with("image/") => Ok(declared.to_string()),
            _ => Err(PipelineError::InvalidInput(
                "Unsupported file type".to_string(),
            )),
        },
    }
}

pub fn encode_image(upload: &ImageUpload) -> Result<EncodedImage, PipelineError> {
    let mime = detect_image_mime(&upload.bytes, upload.declared_type.as_deref())?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&upload.bytes);
    Ok(EncodedImage {
        data_url: format!("data:{mime};base64,{encoded}"),
        mime,
    })
}

pub struct DescriptionPipeline {
    model: Arc<dyn VisionModel>,
    max_upload_bytes: usize,
}

impl DescriptionPipeline {
    pub fn new(model: Arc<dyn VisionModel>, max_upload_bytes: usize) -> Self {
        Self {
            model,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    fn check_upload(&self, upload: &ImageUpload) -> Result<(), PipelineError> {
        if upload.bytes.is_empty() {
            return Err(PipelineError::InvalidInput("Uploaded image is empty".to_string()));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(PipelineError::InvalidInput(format!(
                "Uploaded image exceeds {} bytes",
                self.max_upload_bytes
            )));
        }
        Ok(())
    }

    /// Run every step, reporting through `sink`
    pub async fn run(
        &self,
        upload: ImageUpload,
        sink: &EventSink,
    ) -> Result<InstrumentDescription, PipelineError> {
        sink.start(0).await?;
        sink.log_with(
            log_codes::VISION_UPLOAD_RECEIVED,
            meta([("bytes", MetaValue::from(upload.bytes.len()))]),
        )
        .await?;
        self.check_upload(&upload)?;
        sink.done(0).await?;

        sink.start(1).await?;
        let image = encode_image(&upload)?;
        drop(upload);
        sink.log_with(
            log_codes::VISION_IMAGE_ENCODED,
            meta([("mime", MetaValue::from(image.mime.as_str()))]),
        )
        .await?;
        sink.done(1).await?;

        sink.start(2).await?;
        sink.log(log_codes::VISION_REQUEST_SENT).await?;
        let reply = sink.guard(self.model.describe_image(&image.data_url)).await??;
        sink.report_reply(log_codes::VISION_REASONING, log_codes::VISION_USAGE, &reply)
            .await?;
        sink.done(2).await?;

        sink.start(3).await?;
        let description: InstrumentDescription = extract_and_validate(&reply.text)?;
        sink.log(log_codes::VISION_RESPONSE_PARSED).await?;
        sink.done(3).await?;

        info!(
            category = %description.category,
            brand = %description.brand,
            model = %description.model,
            "Instrument described"
        );
        Ok(description)
    }

    /// Synchronous variant: same steps, no events
    pub async fn describe(&self, upload: ImageUpload) -> Result<InstrumentDescription, PipelineError> {
        self.run(upload, &EventSink::detached(Phase::Vision)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_sniffed_type_wins_over_declared() {
        let mime = detect_image_mime(PNG_HEADER, Some("image/jpeg")).unwrap();
        assert_eq!(mime, "image/png");
        let mime = detect_image_mime(JPEG_HEADER, None).unwrap();
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn test_non_image_payload_is_rejected() {
        let pdf = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3";
        let err = detect_image_mime(pdf, Some("image/png")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(m) if m.contains("application/pdf")));
    }

    #[test]
    fn test_unknown_bytes_fall_back_to_declared_image_type() {
        let bytes = b"not a known magic number";
        assert_eq!(
            detect_image_mime(bytes, Some("image/heic")).unwrap(),
            "image/heic"
        );
        assert!(detect_image_mime(bytes, Some("text/plain")).is_err());
        assert!(detect_image_mime(bytes, None).is_err());
    }

    #[test]
    fn test_data_url_uses_detected_type() {
        let upload = ImageUpload::new(PNG_HEADER.to_vec(), Some("image/jpeg".into()));
        let image = encode_image(&upload).unwrap();
        assert!(image.data_url.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }
}
