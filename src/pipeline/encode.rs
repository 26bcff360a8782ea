//! Image encoding: slide image file → base64 payload for the inference API.
//!
//! Ollama's `/api/chat` takes raw base64 strings in `images`; hosted
//! providers take a base64 body plus a MIME type. Extracted images are sent
//! byte-for-byte as the converter wrote them: re-encoding would only cost
//! time, and the converter already picked a format the models accept.

use crate::error::AnnotationError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// A base64-encoded image ready to attach to an inference request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Standard base64, no data-URI prefix.
    pub data: String,
    /// e.g. `image/png`, `image/jpeg`.
    pub mime_type: &'static str,
}

/// Read an image file and base64-encode it.
///
/// The MIME type is taken from the file extension, falling back to sniffing
/// the leading bytes and finally to `image/png`.
pub async fn encode_image_file(path: &Path) -> Result<EncodedImage, AnnotationError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AnnotationError::ImageRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if bytes.is_empty() {
        return Err(AnnotationError::ImageRead {
            path: path.to_path_buf(),
            detail: "file is empty".into(),
        });
    }

    let mime_type = detect_mime_type(path, &bytes);
    let data = STANDARD.encode(&bytes);
    debug!(
        "Encoded {} ({}) → {} bytes base64",
        path.display(),
        mime_type,
        data.len()
    );

    Ok(EncodedImage { data, mime_type })
}

fn detect_mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(bytes))
        .map(|format| format.to_mime_type())
        .unwrap_or("image/png")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[tokio::test]
    async fn encode_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slide.png");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let encoded = encode_image_file(&path).await.expect("encode should succeed");
        assert_eq!(encoded.mime_type, "image/png");
        let decoded = STANDARD.decode(&encoded.data).expect("valid base64");
        assert_eq!(decoded, PNG_MAGIC);
    }

    #[tokio::test]
    async fn extension_decides_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_page_0_Picture_1.jpeg");
        std::fs::write(&path, b"\xFF\xD8\xFF\xE0 not really a jpeg").unwrap();

        let encoded = encode_image_file(&path).await.unwrap();
        assert_eq!(encoded.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn sniffs_when_extension_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("figure.bin");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let encoded = encode_image_file(&path).await.unwrap();
        assert_eq!(encoded.mime_type, "image/png");
    }

    #[tokio::test]
    async fn missing_file_is_image_read_error() {
        let err = encode_image_file(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnnotationError::ImageRead { .. }));
    }

    #[tokio::test]
    async fn empty_file_is_image_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").unwrap();

        let err = encode_image_file(&path).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
