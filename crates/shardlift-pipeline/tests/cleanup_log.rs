//! Runs in its own process so the global subscriber only sees this run.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use shardlift_pipeline::{DryRunPublisher, ExtractionStrategy, FailureKind, Orchestrator, PipelineConfig};
use shardlift_source::{DEFAULT_PATTERN, Destination, discover};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_tar(path: &Path, name: &str, data: &[u8]) {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    let gnu = header.as_gnu_mut().unwrap();
    gnu.name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data).unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, builder.into_inner().unwrap()).unwrap();
}

#[test]
fn every_workspace_removal_is_logged_at_info() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    write_tar(&source.join("good/part.tar"), "a.txt", b"alpha");
    write_tar(&source.join("evil/part.tar"), "../../x.txt", b"x");

    let jobs = discover(&source, DEFAULT_PATTERN, &Destination::parse("gs://bucket").unwrap()).unwrap();
    let summary = Orchestrator::new(
        PipelineConfig::new(dir.path().join("stage")).concurrency(1),
        ExtractionStrategy::in_process(),
        Arc::new(DryRunPublisher::default()),
    )
    .run(jobs)
    .unwrap();

    assert_eq!((summary.successful, summary.failed), (1, 1));
    assert_eq!(summary.failures[0].1.kind, FailureKind::PathTraversal);
    let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert_eq!(log.matches("workspace removed").count(), 2, "{log}");
}
