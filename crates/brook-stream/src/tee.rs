//! Stream duplication.

use crate::error::{Result, StreamError};
use crate::stream::ByteStream;

/// Split `source` into two independent streams that replay the same byte
/// sequence and terminal state.
///
/// A single pump task owns the source's reader; each chunk it pulls is
/// appended to both outputs' queues before either output's pending read is
/// satisfied. The sides may be read in any order and at different paces; a
/// side that is never read accumulates an unbounded queue; there is no
/// cross-side backpressure.
///
/// If the source errors mid-stream, both outputs keep their queued prefix
/// readable and surface the error once that prefix is exhausted.
///
/// Fails if the source already has a reader attached. Requires a tokio
/// runtime.
pub fn tee(source: ByteStream) -> Result<(ByteStream, ByteStream)> {
    let mut reader = source.attach_reader()?;
    let (writer_a, out_a) = ByteStream::channel();
    let (writer_b, out_b) = ByteStream::channel();

    tokio::spawn(async move {
        // Keep the source handle alive for the lifetime of the pump.
        let _source = source;
        loop {
            match reader.next_chunk().await {
                Ok(Some(chunk)) => {
                    writer_a.write(chunk.clone());
                    writer_b.write(chunk);
                }
                Ok(None) => {
                    writer_a.close();
                    writer_b.close();
                    return;
                }
                Err(e) => {
                    let message = match e {
                        StreamError::Errored(m) => m,
                        other => other.to_string(),
                    };
                    writer_a.error(message.clone());
                    writer_b.error(message);
                    return;
                }
            }
        }
    });

    Ok((out_a, out_b))
}
