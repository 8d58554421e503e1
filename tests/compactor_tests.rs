// Hour compaction against the in-memory store: archive contents, source
// cleanup, and what is left behind when a stage fails.

use cf_log_compactor::compactor::{
    CompactorSettings, HourCompactor, HourProcessor, Stage, ARCHIVE_HEADER,
};
use cf_log_compactor::day::HourJob;
use cf_log_compactor::fragment::LogDate;
use cf_log_compactor::store::MemoryStore;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::Arc;
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT_HEADER: &str = "#Version: 1.0\n#Fields: date time x-edge-location\n";

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn gunzip(body: &[u8]) -> String {
        let mut text = String::new();
        GzDecoder::new(body).read_to_string(&mut text).unwrap();
        text
    }

    fn job(directory: &str, hour: u32) -> HourJob {
        HourJob {
            distribution_id: "web123".to_string(),
            date: LogDate::new(2023, 5, 1),
            hour,
            directory: directory.to_string(),
        }
    }

    fn compactor(store: &Arc<MemoryStore>, scratch: &TempDir) -> HourCompactor {
        HourCompactor::new(
            store.clone(),
            CompactorSettings {
                download_concurrency: 2,
                scratch_root: Some(scratch.path().to_path_buf()),
            },
        )
    }

    fn scratch_is_empty(scratch: &TempDir) -> bool {
        std::fs::read_dir(scratch.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_hour_is_archived_and_sources_deleted() {
        let store = Arc::new(MemoryStore::new());
        let scratch = TempDir::new().unwrap();

        store.insert(
            "web123.2023-05-01-00.aaa.gz",
            gzip(&format!("{}line a1\nline a2\n", FRAGMENT_HEADER)),
        );
        store.insert(
            "web123.2023-05-01-00.bbb.gz",
            gzip(&format!("{}line b1\nline b2\n", FRAGMENT_HEADER)),
        );
        // Neighbouring hour must not be touched
        store.insert("web123.2023-05-01-01.ccc.gz", gzip("line c1\n"));

        let report = compactor(&store, &scratch).process(job("", 0)).await.unwrap();

        assert_eq!(report.fragments, 2);
        assert_eq!(report.lines_kept, 4);
        assert_eq!(
            report.archive_key.as_deref(),
            Some("processed/web123/2023/05/01/00.gz")
        );

        let archive = store.get("processed/web123/2023/05/01/00.gz").unwrap();
        assert_eq!(report.archive_bytes, archive.len() as u64);
        assert_eq!(
            gunzip(&archive),
            format!("{}\nline a1\nline a2\nline b1\nline b2\n", ARCHIVE_HEADER)
        );

        assert!(!store.contains("web123.2023-05-01-00.aaa.gz"));
        assert!(!store.contains("web123.2023-05-01-00.bbb.gz"));
        assert!(store.contains("web123.2023-05-01-01.ccc.gz"));
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_archive_is_rooted_at_fragment_directory() {
        let store = Arc::new(MemoryStore::new());
        let scratch = TempDir::new().unwrap();

        store.insert("cf/web123.2023-05-01-07.aaa.gz", gzip("only line\n"));

        let report = compactor(&store, &scratch)
            .process(job("cf/", 7))
            .await
            .unwrap();

        assert_eq!(
            report.archive_key.as_deref(),
            Some("cf/processed/web123/2023/05/01/07.gz")
        );
        assert_eq!(
            gunzip(&store.get("cf/processed/web123/2023/05/01/07.gz").unwrap()),
            format!("{}\nonly line\n", ARCHIVE_HEADER)
        );
    }

    #[tokio::test]
    async fn test_empty_hour_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let scratch = TempDir::new().unwrap();
        store.insert("web123.2023-05-01-05.aaa.gz", gzip("not this hour\n"));

        let report = compactor(&store, &scratch).process(job("", 4)).await.unwrap();

        assert!(!report.archived());
        assert_eq!(report.fragments, 0);
        assert_eq!(store.put_calls(), 0);
        assert_eq!(store.delete_calls(), 0);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_download_failure_keeps_sources() {
        let store = Arc::new(MemoryStore::new());
        let scratch = TempDir::new().unwrap();

        store.insert("web123.2023-05-01-03.aaa.gz", gzip("a\n"));
        store.insert("web123.2023-05-01-03.bbb.gz", gzip("b\n"));
        store.fail_download_of("web123.2023-05-01-03.bbb.gz");

        let err = compactor(&store, &scratch)
            .process(job("", 3))
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Download);
        assert_eq!(err.job.hour, 3);
        assert!(store.contains("web123.2023-05-01-03.aaa.gz"));
        assert!(store.contains("web123.2023-05-01-03.bbb.gz"));
        assert!(!store.contains("processed/web123/2023/05/01/03.gz"));
        assert_eq!(store.put_calls(), 0);
        assert_eq!(store.delete_calls(), 0);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_corrupt_fragment_fails_before_upload() {
        let store = Arc::new(MemoryStore::new());
        let scratch = TempDir::new().unwrap();

        store.insert("web123.2023-05-01-09.aaa.gz", b"definitely not gzip".to_vec());

        let err = compactor(&store, &scratch)
            .process(job("", 9))
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Decompress);
        assert!(store.contains("web123.2023-05-01-09.aaa.gz"));
        assert_eq!(store.put_calls(), 0);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_many_fragments_keep_listing_order() {
        let store = Arc::new(MemoryStore::new());
        let scratch = TempDir::new().unwrap();

        for i in 0..12 {
            store.insert(
                format!("web123.2023-05-01-12.f{:02}.gz", i),
                gzip(&format!("{}entry {:02}\n", FRAGMENT_HEADER, i)),
            );
        }

        let report = compactor(&store, &scratch)
            .process(job("", 12))
            .await
            .unwrap();
        assert_eq!(report.fragments, 12);

        let text = gunzip(&store.get("processed/web123/2023/05/01/12.gz").unwrap());
        let entries: Vec<&str> = text.lines().skip(2).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("entry {:02}", i)).collect();
        assert_eq!(entries, expected);
        assert_eq!(store.keys(), vec!["processed/web123/2023/05/01/12.gz"]);
    }
}
