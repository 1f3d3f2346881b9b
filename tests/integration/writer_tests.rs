//! Integration tests for the WARC writer
//!
//! These run the writer end-to-end: batches go in through a
//! [`WriterHandle`], segments come out on disk and are decoded again.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sumi_archiver::spool::SpoolSettings;
use sumi_archiver::warc::{Record, RecordBatch, RecordContent, RotatorSettings, WarcWriter};
use sumi_archiver::ArchiverError;
use tokio::io::AsyncWriteExt;
use url::Url;

fn spool_settings(job: &Path) -> SpoolSettings {
    SpoolSettings {
        dir: job.join("temp"),
        sweep_interval: Duration::from_secs(60),
        grace_period: Duration::from_secs(600),
    }
}

fn read_segment(path: &Path) -> String {
    let mut text = String::new();
    MultiGzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

fn segments(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    paths.sort();
    paths
}

fn exchange(path: &str, body: &str) -> RecordBatch {
    let url = Url::parse(&format!("https://example.com{}", path)).unwrap();
    let response = format!("HTTP/1.1 200 OK\r\n\r\n{}", body);
    let request = format!("GET {} HTTP/1.1\r\nHost: example.com\r\n\r\n", path);
    let (batch, done) = RecordBatch::assemble(vec![
        Record::response(&url, RecordContent::Memory(response.into_bytes())),
        Record::request(&url, RecordContent::Memory(request.into_bytes())),
    ]);
    assert!(done.is_none());
    batch
}

#[tokio::test]
async fn test_batches_are_written_in_submission_order() {
    let job = tempfile::tempdir().unwrap();
    let output = job.path().join("warcs");
    let writer = WarcWriter::start(
        RotatorSettings::new(&output, "ORDER"),
        spool_settings(job.path()),
    )
    .await
    .unwrap();

    let handle = writer.handle();
    handle.submit(exchange("/a", "first")).await.unwrap();
    handle.submit(exchange("/b", "second")).await.unwrap();
    drop(handle);

    let summary = writer.shutdown().await.unwrap();
    assert_eq!(summary.segments, 1);
    assert_eq!(summary.records, 4);

    let files = segments(&output);
    assert_eq!(files, vec![output.join("ORDER-00000.warc.gz")]);

    let text = read_segment(&files[0]);
    assert!(text.starts_with("WARC/1.1\r\nWARC-Type: warcinfo\r\n"));
    assert!(text.contains("WARC-Filename: ORDER-00000.warc.gz\r\n"));

    let a = text.find("WARC-Target-URI: https://example.com/a").unwrap();
    let b = text.find("WARC-Target-URI: https://example.com/b").unwrap();
    assert!(a < b);

    // Within a batch the response precedes its request
    let a_request = text.find("GET /a HTTP/1.1").unwrap();
    let a_response = text.find("first").unwrap();
    assert!(a_response < a_request);
    assert!(a_request < b);
}

#[tokio::test]
async fn test_rotation_by_record_count() {
    let job = tempfile::tempdir().unwrap();
    let output = job.path().join("warcs");
    let mut settings = RotatorSettings::new(&output, "ROT");
    settings.max_segment_records = 2;

    let writer = WarcWriter::start(settings, spool_settings(job.path()))
        .await
        .unwrap();
    let handle = writer.handle();
    for path in ["/one", "/two", "/three"] {
        handle.submit(exchange(path, "body")).await.unwrap();
    }
    drop(handle);

    let summary = writer.shutdown().await.unwrap();
    assert_eq!(summary.segments, 3);
    assert_eq!(summary.records, 6);

    let files = segments(&output);
    assert_eq!(
        files,
        vec![
            output.join("ROT-00000.warc.gz"),
            output.join("ROT-00001.warc.gz"),
            output.join("ROT-00002.warc.gz"),
        ]
    );

    // A batch never straddles segments, and each one opens with warcinfo
    for (file, path) in files.iter().zip(["/one", "/two", "/three"]) {
        let text = read_segment(file);
        assert_eq!(text.matches("WARC-Type: warcinfo").count(), 1);
        assert_eq!(text.matches("WARC-Type: response").count(), 1);
        assert_eq!(text.matches("WARC-Type: request").count(), 1);
        assert!(text.contains(&format!("https://example.com{}", path)));
    }
}

#[tokio::test]
async fn test_rotation_by_segment_size() {
    let job = tempfile::tempdir().unwrap();
    let output = job.path().join("warcs");
    let mut settings = RotatorSettings::new(&output, "SIZE");
    // Any segment holding a batch is over this limit
    settings.max_segment_size = 64;

    let writer = WarcWriter::start(settings, spool_settings(job.path()))
        .await
        .unwrap();
    let handle = writer.handle();
    for path in ["/one", "/two", "/three"] {
        handle.submit(exchange(path, &"z".repeat(200))).await.unwrap();
    }
    drop(handle);

    let summary = writer.shutdown().await.unwrap();
    assert_eq!(summary.segments, 3);
    assert_eq!(summary.records, 6);

    let files = segments(&output);
    assert_eq!(files.len(), 3);
    for (file, path) in files.iter().zip(["/one", "/two", "/three"]) {
        let text = read_segment(file);
        assert_eq!(text.matches("WARC-Type: warcinfo").count(), 1);
        assert_eq!(
            text.matches(&format!("WARC-Target-URI: https://example.com{}\r\n", path))
                .count(),
            2
        );
        assert_eq!(text.matches("WARC-Target-URI:").count(), 2);
    }
}

#[tokio::test]
async fn test_sequence_continues_after_existing_segments() {
    let job = tempfile::tempdir().unwrap();
    let output = job.path().join("warcs");
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("JOB-00004.warc.gz"), b"").unwrap();

    let writer = WarcWriter::start(
        RotatorSettings::new(&output, "JOB"),
        spool_settings(job.path()),
    )
    .await
    .unwrap();
    writer.shutdown().await.unwrap();

    assert!(output.join("JOB-00005.warc.gz").exists());
}

#[tokio::test]
async fn test_spooled_batch_round_trip() {
    let job = tempfile::tempdir().unwrap();
    let output = job.path().join("warcs");
    let writer = WarcWriter::start(
        RotatorSettings::new(&output, "SPOOL"),
        spool_settings(job.path()),
    )
    .await
    .unwrap();

    let payload = "p".repeat(100_000);
    let (guard, mut file) = writer.spool().allocate().await.unwrap();
    file.write_all(payload.as_bytes()).await.unwrap();
    file.flush().await.unwrap();
    drop(file);

    let url = Url::parse("https://example.com/large").unwrap();
    let head = b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\r\n".to_vec();
    let head_len = head.len();
    let (batch, done) = RecordBatch::assemble(vec![Record::response(
        &url,
        RecordContent::Spooled {
            head,
            payload_path: guard.path().to_path_buf(),
        },
    )]);
    assert!(batch.is_spooled());

    writer.handle().submit(batch).await.unwrap();
    done.unwrap().wait().await.unwrap();

    // The writer is done with the file once the batch completes
    guard.remove().await.unwrap();
    let summary = writer.shutdown().await.unwrap();
    assert_eq!(summary.records, 1);

    let text = read_segment(&output.join("SPOOL-00000.warc.gz"));
    assert!(text.contains(&format!("Content-Length: {}\r\n", head_len + payload.len())));
    assert!(text.contains(&payload));
    assert_eq!(std::fs::read_dir(job.path().join("temp")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_missing_spool_payload_rejects_only_that_batch() {
    let job = tempfile::tempdir().unwrap();
    let output = job.path().join("warcs");
    let writer = WarcWriter::start(
        RotatorSettings::new(&output, "MISS"),
        spool_settings(job.path()),
    )
    .await
    .unwrap();

    let url = Url::parse("https://example.com/gone").unwrap();
    let (batch, done) = RecordBatch::assemble(vec![Record::response(
        &url,
        RecordContent::Spooled {
            head: b"HTTP/1.1 200 OK\r\n\r\n".to_vec(),
            payload_path: job.path().join("temp").join("does-not-exist.temp"),
        },
    )]);

    let handle = writer.handle();
    handle.submit(batch).await.unwrap();
    let result = done.unwrap().wait().await;
    assert!(matches!(result, Err(ArchiverError::BatchRejected(_))));

    // The writer keeps going
    handle.submit(exchange("/after", "still here")).await.unwrap();
    drop(handle);

    let summary = writer.shutdown().await.unwrap();
    assert_eq!(summary.rejected_batches, 1);
    assert_eq!(summary.records, 2);

    let text = read_segment(&output.join("MISS-00000.warc.gz"));
    assert!(!text.contains("https://example.com/gone"));
    assert!(text.contains("https://example.com/after"));
}
