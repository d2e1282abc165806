//! Snapshot fetching.
//!
//! Each record is synced in manifest order:
//!
//! 1. Wipe and recreate `<root>/<path>`
//! 2. Download `<mirror><repo>/+archive/<sha>.tar.gz` to `<path>/<name>.tar.gz`
//! 3. Extract in place, then delete the archive
//!
//! The first failure stops the run. Directories already synced stay as they are.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::manifest::DependencyRecord;
use colored::*;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

/// Retrieves a URL into a file. Must fail on any non-success outcome.
pub trait Downloader {
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Unpacks an archive into a directory.
pub trait Extractor {
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
}

/// HTTPS downloader; redirects are followed and non-2xx statuses are errors.
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let download_err = |reason: String| SyncError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| download_err(e.to_string()))?;

        let total_size = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let file = File::create(dest).map_err(|e| SyncError::io(dest, e))?;
        let pb = ProgressBar::new(total_size).with_style(archive_progress_style());
        let mut reader = response.into_body().into_reader();
        let mut writer = pb.wrap_write(BufWriter::new(file));

        io::copy(&mut reader, &mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| download_err(format!("transfer to {} interrupted: {}", dest.display(), e)))?;

        pb.finish_and_clear();
        Ok(())
    }
}

fn archive_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.cyan} {bar:30.cyan/blue} {bytes}/{total_bytes} {bytes_per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Extracts gzip-compressed tarballs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExtractor;

impl Extractor for TarGzExtractor {
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let extract_err = |reason: String| SyncError::Extraction {
            archive: archive_path.to_path_buf(),
            reason,
        };

        let file = File::open(archive_path).map_err(|e| extract_err(e.to_string()))?;
        let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        let entries = archive.entries().map_err(|e| extract_err(e.to_string()))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| extract_err(e.to_string()))?;
            let unpacked = entry
                .unpack_in(dest_dir)
                .map_err(|e| extract_err(e.to_string()))?;
            if !unpacked {
                let name = entry
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                return Err(extract_err(format!("entry escapes target: {}", name)));
            }
        }
        Ok(())
    }
}

/// Applies parsed records to the filesystem under a fixed root.
pub struct Fetcher<D = HttpDownloader, E = TarGzExtractor> {
    root: PathBuf,
    config: SyncConfig,
    downloader: D,
    extractor: E,
}

impl Fetcher {
    pub fn new(root: impl Into<PathBuf>, config: SyncConfig) -> Self {
        Self::with_tools(root, config, HttpDownloader::new(), TarGzExtractor)
    }
}

impl<D: Downloader, E: Extractor> Fetcher<D, E> {
    pub fn with_tools(
        root: impl Into<PathBuf>,
        config: SyncConfig,
        downloader: D,
        extractor: E,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            downloader,
            extractor,
        }
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Sync every record in order; returns how many were synced.
    pub fn fetch_all(&self, records: &[DependencyRecord]) -> Result<usize> {
        for record in records {
            self.fetch_one(record)?;
        }
        Ok(records.len())
    }

    pub fn fetch_one(&self, record: &DependencyRecord) -> Result<()> {
        let url = self.download_url(record)?;
        let target = self.target_dir(record)?;

        if target.is_dir() {
            fs::remove_dir_all(&target).map_err(|e| SyncError::io(&target, e))?;
        }
        fs::create_dir_all(&target).map_err(|e| SyncError::io(&target, e))?;

        println!("   {} {} {}", "⬇".blue(), record.name.bold(), url.dimmed());
        let archive = target.join(format!("{}.tar.gz", record.name));
        self.downloader.download(&url, &archive)?;
        self.extractor.extract(&archive, &target)?;
        fs::remove_file(&archive).map_err(|e| SyncError::io(&archive, e))?;

        println!("   {} {} -> {}", "✓".green(), record.name, record.path);
        Ok(())
    }

    /// `<root>/<path>`, provided the path only descends below the root.
    fn target_dir(&self, record: &DependencyRecord) -> Result<PathBuf> {
        let relative = Path::new(&record.path);
        let mut components = relative.components().peekable();
        let descends = components.peek().is_some()
            && components.all(|c| matches!(c, Component::Normal(_)));
        if !descends {
            return Err(SyncError::UnsafePath {
                name: record.name.clone(),
                path: record.path.clone(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn download_url(&self, record: &DependencyRecord) -> Result<String> {
        let missing = |field| SyncError::IncompleteRecord {
            name: record.name.clone(),
            path: record.path.clone(),
            missing: field,
        };
        let repository = record
            .repository_url
            .as_deref()
            .ok_or_else(|| missing("repository URL"))?;
        let commit = record
            .commit_hash
            .as_deref()
            .ok_or_else(|| missing("commit hash"))?;
        Ok(self.config.archive_url(repository, commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingDownloader {
        urls: RefCell<Vec<String>>,
    }

    impl Downloader for RecordingDownloader {
        fn download(&self, url: &str, dest: &Path) -> Result<()> {
            self.urls.borrow_mut().push(url.to_string());
            fs::write(dest, b"archive").map_err(|e| SyncError::io(dest, e))
        }
    }

    struct FailingExtractor;

    impl Extractor for FailingExtractor {
        fn extract(&self, archive: &Path, _dest_dir: &Path) -> Result<()> {
            Err(SyncError::Extraction {
                archive: archive.to_path_buf(),
                reason: "corrupt".to_string(),
            })
        }
    }

    struct NoopExtractor;

    impl Extractor for NoopExtractor {
        fn extract(&self, _archive: &Path, _dest_dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn record(repository_url: Option<&str>, commit_hash: Option<&str>) -> DependencyRecord {
        DependencyRecord {
            path: "third_party/lss/lss".to_string(),
            name: "lss".to_string(),
            repository_url: repository_url.map(str::to_string),
            commit_hash: commit_hash.map(str::to_string),
        }
    }

    #[test]
    fn test_incomplete_record_leaves_disk_untouched() {
        let root = tempfile::tempdir().unwrap();
        let existing = root.path().join("third_party/lss/lss");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("keep.h"), "").unwrap();

        let fetcher = Fetcher::with_tools(
            root.path(),
            SyncConfig::default(),
            RecordingDownloader::default(),
            NoopExtractor,
        );
        let err = fetcher
            .fetch_one(&record(Some("/linux-syscall-support"), None))
            .unwrap_err();

        assert!(matches!(err, SyncError::IncompleteRecord { missing: "commit hash", .. }));
        assert!(existing.join("keep.h").exists());
        assert!(fetcher.downloader.urls.borrow().is_empty());
    }

    #[test]
    fn test_download_url_uses_mirror() {
        let root = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            mirror_base: "https://mirror.test/cache/".to_string(),
            ..SyncConfig::default()
        };
        let fetcher = Fetcher::with_tools(
            root.path(),
            config,
            RecordingDownloader::default(),
            NoopExtractor,
        );
        let sha = "7bde79cc274d06451bf65ae82c012a5d3e476b5a";
        fetcher
            .fetch_one(&record(Some("/linux-syscall-support"), Some(sha)))
            .unwrap();

        assert_eq!(
            *fetcher.downloader.urls.borrow(),
            vec![format!(
                "https://mirror.test/cache/linux-syscall-support/+archive/{sha}.tar.gz"
            )]
        );
        assert!(!root.path().join("third_party/lss/lss/lss.tar.gz").exists());
    }

    #[test]
    fn test_extraction_failure_keeps_archive() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::with_tools(
            root.path(),
            SyncConfig::default(),
            RecordingDownloader::default(),
            FailingExtractor,
        );
        let err = fetcher
            .fetch_one(&record(
                Some("/linux-syscall-support"),
                Some("7bde79cc274d06451bf65ae82c012a5d3e476b5a"),
            ))
            .unwrap_err();

        assert!(matches!(err, SyncError::Extraction { .. }));
        assert!(root.path().join("third_party/lss/lss/lss.tar.gz").exists());
    }

    #[test]
    fn test_path_outside_root_rejected() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("root");
        let victim = base.path().join("victim");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("precious.txt"), "keep").unwrap();

        let fetcher = Fetcher::with_tools(
            &root,
            SyncConfig::default(),
            RecordingDownloader::default(),
            NoopExtractor,
        );
        let sha = "7bde79cc274d06451bf65ae82c012a5d3e476b5a";
        let absolute = victim.display().to_string();

        for path in ["../victim", "third_party/../../victim", absolute.as_str(), "", "./lss"] {
            let escaping = DependencyRecord {
                path: path.to_string(),
                ..record(Some("/linux-syscall-support"), Some(sha))
            };
            let err = fetcher.fetch_one(&escaping).unwrap_err();
            assert!(
                matches!(err, SyncError::UnsafePath { .. }),
                "path {path:?} gave {err:?}"
            );
        }

        assert!(victim.join("precious.txt").exists());
        assert!(fetcher.downloader.urls.borrow().is_empty());
    }

    #[test]
    fn test_tar_gz_extractor_rejects_parent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir_all(&target).unwrap();

        // Builder::append_data refuses `..`, so write the name bytes directly.
        let content = b"escaped";
        let mut header = tar::Header::new_gnu();
        let name = b"../escape.txt";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        let encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append(&header, &content[..]).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let archive = target.join("evil.tar.gz");
        fs::write(&archive, bytes).unwrap();

        let err = TarGzExtractor.extract(&archive, &target).unwrap_err();
        assert!(matches!(err, SyncError::Extraction { .. }));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_tar_gz_extractor_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar.gz");
        fs::write(&archive, b"not a gzip stream").unwrap();

        let err = TarGzExtractor.extract(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, SyncError::Extraction { .. }));
    }
}
