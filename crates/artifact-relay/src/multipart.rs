//! Streaming `multipart/form-data` encoder for the artifact upload.
//!
//! The body is written part by part into a [`ConduitWriter`], so the artifact
//! content is never held in memory as a whole:
//!
//! ```text
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="description"\r\n\r\n
//! Artifact description
//! \r\n--{boundary}\r\n
//! Content-Disposition: form-data; name="artifact"; filename="{container}"\r\n
//! Content-Type: application/octet-stream\r\n\r\n
//! <blob bytes>
//! \r\n--{boundary}--\r\n
//! ```

use std::io;

use bytes::Bytes;
use futures_util::StreamExt;
use relay_blob::ByteStream;
use uuid::Uuid;

use crate::conduit::ConduitWriter;

pub const DESCRIPTION_FIELD: &str = "description";
pub const DESCRIPTION_TEXT: &str = "Artifact description";
pub const ARTIFACT_FIELD: &str = "artifact";

#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    boundary: String,
    parts: usize,
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartEncoder {
    pub fn new() -> Self {
        Self::with_boundary(Uuid::new_v4().simple().to_string())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn delimiter(&mut self) -> String {
        let prefix = if self.parts == 0 { "" } else { "\r\n" };
        self.parts += 1;
        format!("{prefix}--{}\r\n", self.boundary)
    }

    /// Delimiter and headers of a text field.
    pub fn text_field_head(&mut self, name: &str) -> Bytes {
        let delimiter = self.delimiter();
        Bytes::from(format!(
            "{delimiter}Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
            escape_quotes(name)
        ))
    }

    /// Delimiter and headers of a binary file field.
    pub fn file_field_head(&mut self, name: &str, filename: &str) -> Bytes {
        let delimiter = self.delimiter();
        Bytes::from(format!(
            "{delimiter}Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            escape_quotes(name),
            escape_quotes(filename)
        ))
    }

    pub fn closing(&self) -> Bytes {
        Bytes::from(format!("\r\n--{}--\r\n", self.boundary))
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Encode the full upload form into `writer`, copying `content` chunk by
/// chunk. Returns the number of artifact bytes copied.
pub async fn write_artifact_form(
    encoder: &mut MultipartEncoder,
    filename: &str,
    mut content: ByteStream,
    writer: &mut ConduitWriter,
) -> io::Result<u64> {
    writer.write(encoder.text_field_head(DESCRIPTION_FIELD)).await?;
    writer.write(Bytes::from_static(DESCRIPTION_TEXT.as_bytes())).await?;
    writer
        .write(encoder.file_field_head(ARTIFACT_FIELD, filename))
        .await?;

    let mut copied = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        copied += chunk.len() as u64;
        writer.write(chunk).await?;
    }

    writer.write(encoder.closing()).await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::conduit::{ConduitConfig, conduit};

    async fn collect(reader: crate::conduit::ConduitReader) -> io::Result<Vec<u8>> {
        let chunks: Vec<io::Result<Bytes>> = reader.collect().await;
        let mut body = Vec::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    }

    #[test]
    fn first_part_has_no_leading_crlf() {
        let mut encoder = MultipartEncoder::with_boundary("B");

        let first = encoder.text_field_head("description");
        let second = encoder.file_field_head("artifact", "c1");

        assert!(first.starts_with(b"--B\r\n"));
        assert!(second.starts_with(b"\r\n--B\r\n"));
    }

    #[test]
    fn quotes_in_filename_are_escaped() {
        let mut encoder = MultipartEncoder::with_boundary("B");

        let head = encoder.file_field_head("artifact", "we\"ird");

        let text = String::from_utf8(head.to_vec()).unwrap();
        assert!(text.contains(r#"filename="we\"ird""#));
    }

    #[test]
    fn content_type_carries_boundary() {
        let encoder = MultipartEncoder::with_boundary("abc123");
        assert_eq!(
            encoder.content_type(),
            "multipart/form-data; boundary=abc123"
        );
    }

    #[test]
    fn generated_boundaries_differ() {
        assert_ne!(
            MultipartEncoder::new().boundary(),
            MultipartEncoder::new().boundary()
        );
    }

    #[tokio::test]
    async fn writes_complete_form() {
        let (mut writer, reader) = conduit(ConduitConfig::default());
        let mut encoder = MultipartEncoder::with_boundary("B");
        let content: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ])
        .boxed();

        let copied = write_artifact_form(&mut encoder, "c1", content, &mut writer)
            .await
            .unwrap();
        drop(writer);
        let body = collect(reader).await.unwrap();

        assert_eq!(copied, 6);
        let expected = "--B\r\n\
            Content-Disposition: form-data; name=\"description\"\r\n\r\n\
            Artifact description\
            \r\n--B\r\n\
            Content-Disposition: form-data; name=\"artifact\"; filename=\"c1\"\r\n\
            Content-Type: application/octet-stream\r\n\r\n\
            abcdef\
            \r\n--B--\r\n";
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }

    #[tokio::test]
    async fn source_error_stops_before_closing_boundary() {
        let (mut writer, reader) = conduit(ConduitConfig::default());
        let mut encoder = MultipartEncoder::with_boundary("B");
        let content: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone")),
        ])
        .boxed();

        let err = write_artifact_form(&mut encoder, "c1", content, &mut writer)
            .await
            .unwrap_err();
        drop(writer);
        let body = collect(reader).await.unwrap();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(!String::from_utf8(body).unwrap().contains("--B--"));
    }
}
