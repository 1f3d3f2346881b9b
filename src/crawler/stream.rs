//! Archiving exchanges captured as live byte streams
//!
//! When an exchange arrives as two open streams (request and response)
//! rather than a finished response, each side is drained by its own task.
//! Draining them one after the other can deadlock: a transport may not make
//! progress on one side until the other is being read too.

use crate::crawler::fetcher::ByteStream;
use crate::warc::{Record, RecordBatch, RecordContent, WriterHandle};
use crate::ArchiverError;
use std::io;
use tokio::io::AsyncReadExt;
use url::Url;

/// Drains both sides concurrently, then submits `[request, response]`
///
/// Both drain tasks must finish before the batch is assembled; if either
/// fails nothing is written.
pub async fn write_exchange_from_streams(
    writer: &WriterHandle,
    url: &Url,
    request: ByteStream,
    response: ByteStream,
) -> Result<(), ArchiverError> {
    let request_task = tokio::spawn(drain(request));
    let response_task = tokio::spawn(drain(response));

    let (request_bytes, response_bytes) = tokio::join!(request_task, response_task);
    let request_bytes = request_bytes??;
    let response_bytes = response_bytes??;

    let (batch, _) = RecordBatch::assemble(vec![
        Record::request(url, RecordContent::Memory(request_bytes)),
        Record::response(url, RecordContent::Memory(response_bytes)),
    ]);
    writer.submit(batch).await
}

async fn drain(mut stream: ByteStream) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}
