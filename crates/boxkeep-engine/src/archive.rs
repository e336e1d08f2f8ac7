//! Gzip/tar helpers for image archives.
//!
//! An image archive is the engine's `save` tarball, gzip-compressed. The tarball
//! carries a `manifest.json` naming the tags it was saved under, which is how a
//! restore learns the image reference without loading anything.
//!
//! Archives never pass through memory whole. Compression and decompression
//! run on blocking tasks and hand chunks across a bounded channel.

use boxkeep_common::{BoxkeepError, Result as CommonResult};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MANIFEST: &str = "manifest.json";

/// Size of the pieces a decompressed archive is handed to the engine in.
pub const CHUNK_SIZE: usize = 1 << 20;

// Chunks in flight between a blocking task and its async side
const CHANNEL_DEPTH: usize = 4;

#[derive(Deserialize)]
struct ManifestEntry {
    #[serde(rename = "RepoTags")]
    repo_tags: Option<Vec<String>>,
}

/// Splits `repo[:tag]` into repository and tag, defaulting the tag to `latest`.
/// A colon inside a registry host (`host:5000/repo`) is not a tag separator.
pub fn split_image_ref(image_ref: &str) -> (&str, &str) {
    match image_ref.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image_ref, "latest"),
    }
}

/// Reads `reader` to the end in chunks of at most `chunk_size` bytes, passing
/// each to `sink`. Fails with `BrokenPipe` once `sink` returns false.
/// Returns the number of bytes read.
pub fn read_chunks<R: Read>(
    mut reader: R,
    chunk_size: usize,
    mut sink: impl FnMut(Bytes) -> bool,
) -> io::Result<u64> {
    let chunk_size = chunk_size.max(1);
    let mut total = 0u64;
    loop {
        let mut buf = vec![0u8; chunk_size];
        let mut filled = 0;
        while filled < chunk_size {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        if filled == 0 {
            return Ok(total);
        }

        buf.truncate(filled);
        total += filled as u64;
        if !sink(Bytes::from(buf)) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "archive consumer went away",
            ));
        }
        if filled < chunk_size {
            return Ok(total);
        }
    }
}

/// Decompresses the gzip file at `path` on a blocking task, yielding the
/// result as a stream of chunks. The handle reports how many bytes were
/// produced, or why decompression stopped early. Must be called from within
/// a tokio runtime.
pub fn gunzip_chunks(
    path: PathBuf,
    chunk_size: usize,
) -> (
    impl Stream<Item = Bytes> + Send + 'static,
    JoinHandle<io::Result<u64>>,
) {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);
    let reader = tokio::task::spawn_blocking(move || {
        let decoder = GzDecoder::new(BufReader::new(File::open(&path)?));
        read_chunks(decoder, chunk_size, |chunk| tx.blocking_send(chunk).is_ok())
    });
    let chunks = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    (chunks, reader)
}

/// Spawns a blocking task that gzips every chunk sent to it into `dest`.
/// Dropping the sender finishes the file; the handle then reports the number
/// of uncompressed bytes written. Must be called from within a tokio runtime.
pub fn spawn_gzip_writer(dest: PathBuf) -> (mpsc::Sender<Bytes>, JoinHandle<io::Result<u64>>) {
    let (tx, mut rx) = mpsc::channel::<Bytes>(CHANNEL_DEPTH);
    let writer = tokio::task::spawn_blocking(move || {
        let file = File::create(&dest)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut written = 0u64;
        while let Some(chunk) = rx.blocking_recv() {
            encoder.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        encoder.finish()?.flush()?;
        Ok(written)
    });
    (tx, writer)
}

/// Reads the first repository tag recorded in an image archive's manifest.
pub fn image_repo_tag(path: &Path) -> CommonResult<String> {
    let failure = |reason: String| {
        BoxkeepError::ArchiveFailure(format!("{}: {reason}", path.display()))
    };

    let file = File::open(path).map_err(|e| failure(e.to_string()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = archive.entries().map_err(|e| failure(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| failure(e.to_string()))?;
        let is_manifest = entry
            .path()
            .map(|p| &*p == Path::new(MANIFEST))
            .map_err(|e| failure(e.to_string()))?;
        if !is_manifest {
            continue;
        }

        let mut raw = String::new();
        entry
            .read_to_string(&mut raw)
            .map_err(|e| failure(e.to_string()))?;
        let manifest: Vec<ManifestEntry> =
            serde_json::from_str(&raw).map_err(|e| failure(format!("bad manifest: {e}")))?;

        return manifest
            .into_iter()
            .filter_map(|m| m.repo_tags)
            .flatten()
            .next()
            .ok_or_else(|| failure("image archive carries no tag".to_string()));
    }

    Err(failure(format!("no {MANIFEST} in image archive")))
}
