//! The individual steps of compacting one hour, each taking the previous
//! step's output file and producing the next.

use crate::fragment::file_name;
use crate::store::{ObjectStore, StoreError};
use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

/// First lines of every archive, replacing the per-fragment headers.
pub const ARCHIVE_HEADER: &str = "#Version: 1.0\n#Fields: date time x-edge-location sc-bytes c-ip cs-method cs(Host) cs-uri-stem sc-status cs(Referer) cs(User-Agent) cs-uri-query cs(Cookie) x-edge-result-type x-edge-request-id x-host-header cs-protocol cs-bytes time-taken x-forwarded-for ssl-protocol ssl-cipher x-edge-response-result-type cs-protocol-version";

const COMMENT_MARKER: u8 = b'#';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    List,
    Download,
    Concatenate,
    Decompress,
    Filter,
    Recompress,
    Upload,
    DeleteSource,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::List => "list",
            Stage::Download => "download",
            Stage::Concatenate => "concatenate",
            Stage::Decompress => "decompress",
            Stage::Filter => "filter",
            Stage::Recompress => "recompress",
            Stage::Upload => "upload",
            Stage::DeleteSource => "delete-source",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Line counts from the filter step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub kept: u64,
    pub dropped: u64,
}

/// Every fragment key for the hour, in listing order.
pub async fn list_fragments(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<String>, StoreError> {
    let keys = store.list_all(prefix).await?;
    Ok(keys
        .into_iter()
        .filter(|key| !file_name(key).is_empty())
        .collect())
}

/// Download each fragment into `dir`, at most `concurrency` at a time.
///
/// Returned paths are in the same order as `keys`. The first failed
/// transfer fails the whole step.
pub async fn download_fragments(
    store: &dyn ObjectStore,
    keys: &[String],
    dir: &Path,
    concurrency: usize,
) -> Result<(Vec<PathBuf>, u64), StoreError> {
    tokio::fs::create_dir_all(dir).await?;

    // Collected first so the enclosing async_trait future stays Send
    let transfers: Vec<_> = keys
        .iter()
        .map(|key| {
            let dest = dir.join(file_name(key));
            async move {
                let bytes = store.download(key, &dest).await?;
                Ok::<_, StoreError>((dest, bytes))
            }
        })
        .collect();

    let downloads: Vec<(PathBuf, u64)> = stream::iter(transfers)
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let total = downloads.iter().map(|(_, bytes)| bytes).sum();
    let paths = downloads.into_iter().map(|(path, _)| path).collect();
    Ok((paths, total))
}

/// Append `parts` byte-for-byte, in order, into `dest`.
pub async fn concatenate(parts: &[PathBuf], dest: &Path) -> io::Result<u64> {
    let mut out = File::create(dest).await?;
    let mut total = 0;

    for part in parts {
        let mut input = File::open(part).await?;
        total += tokio::io::copy(&mut input, &mut out).await?;
    }

    out.flush().await?;
    Ok(total)
}

/// Gunzip `src` into `dest`. The input is a run of gzip members, one per
/// fragment, and all of them are decoded.
pub async fn decompress(src: &Path, dest: &Path) -> io::Result<u64> {
    let input = BufReader::new(File::open(src).await?);
    let mut decoder = GzipDecoder::new(input);
    decoder.multiple_members(true);

    let mut out = BufWriter::new(File::create(dest).await?);
    let written = tokio::io::copy(&mut decoder, &mut out).await?;
    out.flush().await?;
    Ok(written)
}

/// Write [`ARCHIVE_HEADER`] followed by every line of `src` that doesn't
/// start with `#`. Blank lines are data and are kept.
pub async fn filter_lines(src: &Path, dest: &Path) -> io::Result<FilterStats> {
    let mut input = BufReader::new(File::open(src).await?);
    let mut out = BufWriter::new(File::create(dest).await?);
    let mut stats = FilterStats::default();

    out.write_all(ARCHIVE_HEADER.as_bytes()).await?;
    out.write_all(b"\n").await?;

    let mut line = Vec::new();
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        let content = trim_line_ending(&line);
        match content.first() {
            Some(&COMMENT_MARKER) => stats.dropped += 1,
            _ => {
                out.write_all(content).await?;
                out.write_all(b"\n").await?;
                stats.kept += 1;
            }
        }
    }

    out.flush().await?;
    Ok(stats)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Gzip `src` into `dest`, returning the compressed size.
pub async fn recompress(src: &Path, dest: &Path) -> io::Result<u64> {
    let mut input = BufReader::new(File::open(src).await?);
    let mut encoder = GzipEncoder::new(File::create(dest).await?);

    tokio::io::copy_buf(&mut input, &mut encoder).await?;
    encoder.shutdown().await?;

    Ok(tokio::fs::metadata(dest).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_download_future_is_send() {
        let store = crate::store::MemoryStore::new();
        let keys = vec!["web123.2023-05-01-00.a.gz".to_string()];
        let dir = tempfile::tempdir().unwrap();

        let transfer = download_fragments(&store, &keys, dir.path(), 2);
        assert_send(&transfer);
    }

    #[tokio::test]
    async fn test_download_keeps_key_order() {
        let store = crate::store::MemoryStore::new();
        let keys: Vec<String> = (0..5).map(|i| format!("logs/web123.2023-05-01-00.f{}.gz", i)).collect();
        for (i, key) in keys.iter().enumerate() {
            store.insert(key.clone(), vec![b'x'; i + 1]);
        }
        let dir = tempfile::tempdir().unwrap();

        let (paths, bytes) = download_fragments(&store, &keys, dir.path(), 3).await.unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        let expected: Vec<String> = (0..5).map(|i| format!("web123.2023-05-01-00.f{}.gz", i)).collect();
        assert_eq!(names, expected);
        assert_eq!(bytes, 15);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::DeleteSource.to_string(), "delete-source");
        assert_eq!(Stage::Decompress.to_string(), "decompress");
    }

    #[tokio::test]
    async fn test_concatenated_members_decompress_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.gz");
        let b = dir.path().join("b.gz");
        std::fs::write(&a, gzip("first\n")).unwrap();
        std::fs::write(&b, gzip("second\n")).unwrap();

        let joined = dir.path().join("joined.gz");
        let plain = dir.path().join("joined.log");
        concatenate(&[a, b], &joined).await.unwrap();
        decompress(&joined, &plain).await.unwrap();

        assert_eq!(std::fs::read_to_string(&plain).unwrap(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_filter_drops_comments_and_keeps_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.log");
        let dest = dir.path().join("out.log");
        std::fs::write(
            &src,
            "#Version: 1.0\n#Fields: a b\nline one\r\n\n  # not a comment\n#trailing\nlast",
        )
        .unwrap();

        let stats = filter_lines(&src, &dest).await.unwrap();
        assert_eq!(stats, FilterStats { kept: 4, dropped: 3 });

        let output = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(
            output,
            format!("{}\nline one\n\n  # not a comment\nlast\n", ARCHIVE_HEADER)
        );
    }

    #[tokio::test]
    async fn test_filter_keeps_blank_line_between_rows() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.log");
        let dest = dir.path().join("out.log");
        std::fs::write(&src, "#c\nrow1\n\nrow2\n").unwrap();

        filter_lines(&src, &dest).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            format!("{}\nrow1\n\nrow2\n", ARCHIVE_HEADER)
        );
    }

    #[tokio::test]
    async fn test_recompress_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("plain");
        let dest = dir.path().join("plain.gz");
        std::fs::write(&src, "hello archive\n").unwrap();

        let size = recompress(&src, &dest).await.unwrap();
        assert!(size > 0);

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(&dest).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "hello archive\n");
    }
}
