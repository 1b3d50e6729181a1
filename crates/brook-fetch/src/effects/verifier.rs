//! Streaming integrity verification over a gated body.
//!
//! The verifier owns the real body stream and the writer half of a
//! placeholder stream the caller already handed out (inside a response
//! body). It buffers every chunk; on clean completion it checks the
//! metadata digest and resolves the placeholder with either the verified
//! bytes or an error, so a reader attached to the placeholder before the
//! verdict sees the bytes from the start, or terminates deterministically.
//!
//! The placeholder writer is consumed by the resolution, so the
//! write-once invariant holds by construction.

use brook_stream::{ByteStream, StreamWriter};
use bytes::Bytes;
use tracing::warn;

use crate::core::integrity;

/// Fixed message surfaced through the placeholder on any failure.
const FAILURE_MESSAGE: &str = "integrity verification failed";

/// Terminal verdicts of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierState {
    /// The digest matched; the placeholder replays the verified bytes.
    Verified,
    /// Digest mismatch, unusable metadata, or a body stream error; the
    /// placeholder is errored.
    Failed,
}

/// Buffers a gated body and settles its placeholder. See the module docs.
pub struct IntegrityVerifier {
    metadata: String,
}

impl IntegrityVerifier {
    /// A verifier for the given (non-empty) metadata string.
    pub fn new(metadata: impl Into<String>) -> Self {
        Self {
            metadata: metadata.into(),
        }
    }

    /// Consume `body` to completion and resolve `placeholder`.
    pub async fn run(self, body: ByteStream, placeholder: StreamWriter) -> VerifierState {
        let mut reader = match body.attach_reader() {
            Ok(reader) => reader,
            Err(_) => {
                placeholder.error(FAILURE_MESSAGE);
                return VerifierState::Failed;
            }
        };

        let mut buffered = Vec::new();
        loop {
            match reader.next_chunk().await {
                Ok(Some(chunk)) => buffered.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(_) => {
                    // A body error before Done is indistinguishable from a
                    // mismatch for the caller.
                    placeholder.error(FAILURE_MESSAGE);
                    return VerifierState::Failed;
                }
            }
        }

        if integrity::check_integrity(&self.metadata, &buffered) {
            placeholder.resolve(Ok(Bytes::from(buffered)));
            VerifierState::Verified
        } else {
            warn!(
                metadata = %self.metadata,
                bytes = buffered.len(),
                "integrity digest mismatch"
            );
            placeholder.resolve(Err(FAILURE_MESSAGE.to_string()));
            VerifierState::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use brook_stream::StreamError;
    use sha2::{Digest, Sha256};

    fn sha256_token(data: &[u8]) -> String {
        format!("sha256-{}", STANDARD.encode(Sha256::digest(data)))
    }

    async fn read_all(stream: &ByteStream) -> Result<Vec<u8>, StreamError> {
        let mut reader = stream.attach_reader()?;
        let mut out = Vec::new();
        while let Some(chunk) = reader.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_matching_digest_replays_bytes() {
        let body = ByteStream::from_bytes(&b"verified payload"[..]);
        let (writer, placeholder) = ByteStream::channel();
        let verifier = IntegrityVerifier::new(sha256_token(b"verified payload"));
        assert_eq!(
            verifier.run(body, writer).await,
            VerifierState::Verified
        );
        assert_eq!(read_all(&placeholder).await.unwrap(), b"verified payload");
    }

    #[tokio::test]
    async fn test_reader_attached_before_verdict_sees_all_bytes() {
        let (body_writer, body) = ByteStream::channel();
        let (writer, placeholder) = ByteStream::channel();

        // Attach before the verifier has settled.
        let reader_task = tokio::spawn(async move {
            read_all(&placeholder).await
        });

        let verifier = IntegrityVerifier::new(sha256_token(b"late bytes"));
        let run = tokio::spawn(verifier.run(body, writer));
        body_writer.write(&b"late "[..]);
        body_writer.write(&b"bytes"[..]);
        body_writer.close();

        assert_eq!(run.await.unwrap(), VerifierState::Verified);
        assert_eq!(reader_task.await.unwrap().unwrap(), b"late bytes");
    }

    #[tokio::test]
    async fn test_mismatch_errors_placeholder() {
        let body = ByteStream::from_bytes(&b"tampered"[..]);
        let (writer, placeholder) = ByteStream::channel();
        let verifier = IntegrityVerifier::new(sha256_token(b"original"));
        assert_eq!(verifier.run(body, writer).await, VerifierState::Failed);
        assert!(matches!(
            read_all(&placeholder).await,
            Err(StreamError::Errored(m)) if m == FAILURE_MESSAGE
        ));
    }

    #[tokio::test]
    async fn test_body_error_treated_as_failure() {
        let (body_writer, body) = ByteStream::channel();
        body_writer.write(&b"partial"[..]);
        body_writer.error("connection reset");
        let (writer, placeholder) = ByteStream::channel();
        let verifier = IntegrityVerifier::new(sha256_token(b"partial"));
        assert_eq!(verifier.run(body, writer).await, VerifierState::Failed);
        assert!(read_all(&placeholder).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_metadata_fails() {
        let body = ByteStream::from_bytes(&b"payload"[..]);
        let (writer, _placeholder) = ByteStream::channel();
        let verifier = IntegrityVerifier::new("not-valid-metadata");
        assert_eq!(verifier.run(body, writer).await, VerifierState::Failed);
    }
}
