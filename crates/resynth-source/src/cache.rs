//! Shared per-file analysis cache.
//!
//! [`SourceCache`] memoizes [`FileAnalysis`] results by path. It is `Sync`
//! and meant to be shared (behind an `Arc`) by every synthesis session of a
//! process. Entries are immutable once stored. A miss holds the entry's
//! shard while the file is read, so concurrent misses on one path analyze
//! it once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use resynth_core::SynthError;

use crate::analyze::FileAnalysis;

#[derive(Debug, Default)]
pub struct SourceCache {
    files: DashMap<PathBuf, Arc<FileAnalysis>>,
    reads: AtomicUsize,
}

impl SourceCache {
    pub fn new() -> Self {
        SourceCache {
            files: DashMap::new(),
            reads: AtomicUsize::new(0),
        }
    }

    /// Returns the analysis of `path`, reading and analyzing the file on
    /// first use. The file is closed before this returns.
    pub fn analyze(&self, path: &Path) -> Result<Arc<FileAnalysis>, SynthError> {
        if let Some(hit) = self.files.get(path) {
            tracing::trace!(path = %path.display(), "source analysis cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let stored = self.files.entry(path.to_path_buf()).or_try_insert_with(|| {
            tracing::trace!(path = %path.display(), "analyzing source file");
            self.reads.fetch_add(1, Ordering::Relaxed);
            let text = std::fs::read_to_string(path).map_err(|e| SynthError::io(path, e))?;
            Ok::<_, SynthError>(Arc::new(FileAnalysis::from_text(&text)))
        })?;
        Ok(Arc::clone(stored.value()))
    }

    /// Seeds the cache with already-known text for `path`, e.g. source that
    /// never touched the filesystem. An existing entry is kept.
    pub fn insert_text(&self, path: impl Into<PathBuf>, text: &str) -> Arc<FileAnalysis> {
        self.files
            .entry(path.into())
            .or_insert_with(|| Arc::new(FileAnalysis::from_text(text)))
            .value()
            .clone()
    }

    /// Number of files read from disk so far.
    pub fn files_read(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn analysis_is_memoized() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "def f():\n    return 1").unwrap();

        let cache = SourceCache::new();
        let first = cache.analyze(file.path()).unwrap();
        assert_eq!(first.definition_end(0), Some(Some(2)));

        // Rewriting the file does not change the cached result.
        std::fs::write(file.path(), "x = 1\n").unwrap();
        let second = cache.analyze(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.files_read(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let cache = SourceCache::new();
        let err = cache.analyze(Path::new("/definitely/not/here.py")).unwrap_err();
        assert!(matches!(err, SynthError::Io { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn seeded_text_wins_over_disk() {
        let cache = SourceCache::new();
        let seeded = cache.insert_text("/virtual/job.py", "def g():\n    pass\n");
        let looked_up = cache.analyze(Path::new("/virtual/job.py")).unwrap();
        assert!(Arc::ptr_eq(&seeded, &looked_up));
        assert_eq!(cache.files_read(), 0);
    }

    #[test]
    fn shared_across_threads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "def f():\n    return 1").unwrap();
        let path = file.path().to_path_buf();

        let cache = Arc::new(SourceCache::new());
        let start = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let start = Arc::clone(&start);
                let path = path.clone();
                std::thread::spawn(move || {
                    start.wait();
                    cache.analyze(&path).unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert!(Arc::ptr_eq(r, &results[0]));
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.files_read(), 1);
    }
}
