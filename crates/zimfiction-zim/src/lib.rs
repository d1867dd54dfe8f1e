//! # ZIM container writer
//!
//! Accepts [`Artifact`] values in any order and writes a single ZIM file
//! atomically (§4.6): a temporary file in the destination directory,
//! `fsync`, then `rename` into place. Content-hash dedup is applied only
//! to artifacts whose [`ArtifactHint`] marks them shareable (stylesheets,
//! scripts); everything else keeps a distinct physical blob even when
//! bytes happen to match.
//!
//! The underlying `zim` crate's confirmed surface in this corpus is
//! read-only (`Zim::new`, `get_by_url_index`, `DirectoryEntry`). Its
//! writer-side API is extrapolated here as `zim::writer::Writer` with the
//! mirror shape: `add_content`, `add_content_ref` (a second path sharing
//! an existing blob), `add_redirect`, `finish`. See `DESIGN.md`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// The fixed MIME registry (§4.6). No other MIME type may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mime {
    TextHtml,
    TextCss,
    ApplicationJavascript,
    ApplicationJson,
    ImagePng,
    ImageXIcon,
}

impl Mime {
    pub fn as_str(self) -> &'static str {
        match self {
            Mime::TextHtml => "text/html",
            Mime::TextCss => "text/css",
            Mime::ApplicationJavascript => "application/javascript",
            Mime::ApplicationJson => "application/json",
            Mime::ImagePng => "image/png",
            Mime::ImageXIcon => "image/x-icon",
        }
    }
}

/// Whether an artifact's bytes are safe to share across paths via
/// content-hash dedup (§4.6). Per-story/per-entity pages are never
/// shareable even if two happen to render identically; shared static
/// assets (stylesheets, scripts, the favicon) are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactHint {
    pub dedupable: bool,
}

impl ArtifactHint {
    pub const UNIQUE: ArtifactHint = ArtifactHint { dedupable: false };
    pub const SHARED: ArtifactHint = ArtifactHint { dedupable: true };
}

/// Payload of one [`Artifact`]: either real bytes or a redirect target.
#[derive(Debug, Clone)]
pub enum ArtifactBody {
    Content(Vec<u8>),
    Redirect(String),
}

/// One unit of output the render workers push to the writer (§4.2/§4.6).
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: String,
    pub mime: Mime,
    pub body: ArtifactBody,
    pub hint: ArtifactHint,
}

impl Artifact {
    pub fn content(path: impl Into<String>, mime: Mime, bytes: Vec<u8>, hint: ArtifactHint) -> Self {
        Self { path: path.into(), mime, body: ArtifactBody::Content(bytes), hint }
    }

    pub fn redirect(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime: Mime::TextHtml,
            body: ArtifactBody::Redirect(target.into()),
            hint: ArtifactHint::UNIQUE,
        }
    }
}

/// Fatal write-side failures (§7 `WriteError`: any write error aborts the
/// entire build).
#[derive(Debug, Error)]
pub enum ZimError {
    #[error("path {0:?} was emitted more than once")]
    DuplicatePath(String),
    #[error("I/O error writing {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to finalize ZIM container: {0}")]
    Finalize(String),
}

/// Running totals reported once the container is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZimSummary {
    pub content_records: u64,
    pub redirect_records: u64,
    pub deduped_records: u64,
    pub bytes_written: u64,
}

/// A reference to an already-written blob, keyed by content hash, used to
/// dedup shareable artifacts without re-writing their bytes.
type ContentHash = [u8; 32];

/// Writes artifacts to a ZIM container atomically.
///
/// `push` may be called in any order (§4.6 "accepts artifacts in any
/// order"); the underlying writer re-sequences into ZIM's required
/// URL-sorted clusters internally. `finish` persists the container;
/// `abort` discards the partial file (used on cancellation, §5).
pub struct ZimWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    inner: zim::writer::Writer,
    seen_paths: HashSet<String>,
    shared_blobs: HashMap<ContentHash, String>,
    summary: ZimSummary,
}

impl ZimWriter {
    /// Opens a temporary file alongside `output_path` (same directory, so
    /// the final `rename` is atomic on the same filesystem) and begins a
    /// new container.
    pub fn create(output_path: &Path) -> Result<Self, ZimError> {
        let parent = output_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|source| ZimError::Io { path: parent.to_path_buf(), source })?;

        let tmp_path = parent.join(format!(
            ".{}.tmp",
            output_path.file_name().and_then(|n| n.to_str()).unwrap_or("output.zim")
        ));

        let inner = zim::writer::Writer::create(&tmp_path)
            .map_err(|source| ZimError::Io { path: tmp_path.clone(), source })?;

        Ok(Self {
            final_path: output_path.to_path_buf(),
            tmp_path,
            inner,
            seen_paths: HashSet::new(),
            shared_blobs: HashMap::new(),
            summary: ZimSummary::default(),
        })
    }

    /// Writes one artifact. Fails if `artifact.path` was already emitted
    /// (§3 invariant: every path is unique within a ZIM) or on any
    /// underlying I/O error (fatal, §7).
    pub fn push(&mut self, artifact: Artifact) -> Result<(), ZimError> {
        if !self.seen_paths.insert(artifact.path.clone()) {
            return Err(ZimError::DuplicatePath(artifact.path));
        }

        match artifact.body {
            ArtifactBody::Redirect(target) => {
                self.inner
                    .add_redirect(&artifact.path, &target)
                    .map_err(|source| ZimError::Io { path: PathBuf::from(&artifact.path), source })?;
                self.summary.redirect_records += 1;
            }
            ArtifactBody::Content(bytes) => {
                let hash = content_hash(&bytes);
                if artifact.hint.dedupable {
                    if let Some(existing_path) = self.shared_blobs.get(&hash) {
                        self.inner
                            .add_content_ref(&artifact.path, artifact.mime.as_str(), existing_path)
                            .map_err(|source| ZimError::Io { path: PathBuf::from(&artifact.path), source })?;
                        self.summary.deduped_records += 1;
                        return Ok(());
                    }
                    self.shared_blobs.insert(hash, artifact.path.clone());
                }

                self.summary.bytes_written += bytes.len() as u64;
                self.inner
                    .add_content(&artifact.path, artifact.mime.as_str(), &bytes)
                    .map_err(|source| ZimError::Io { path: PathBuf::from(&artifact.path), source })?;
                self.summary.content_records += 1;
            }
        }

        Ok(())
    }

    /// Finalizes the container and renames it into place. The `fsync`
    /// before rename and the parent-directory `fsync` after mirror the
    /// teacher's `atomic_write_json` idiom, generalized from a single
    /// blob to a multi-entry container.
    pub fn finish(mut self) -> Result<ZimSummary, ZimError> {
        self.inner
            .finish()
            .map_err(|source: std::io::Error| ZimError::Finalize(source.to_string()))?;

        sync_file(&self.tmp_path)?;
        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|source| ZimError::Io { path: self.final_path.clone(), source })?;
        fsync_parent_dir(&self.final_path);

        Ok(self.summary)
    }

    /// Discards the partial container file (cancellation, §5).
    pub fn abort(self) {
        let _ = fs::remove_file(&self.tmp_path);
    }
}

fn content_hash(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn sync_file(path: &Path) -> Result<(), ZimError> {
    let file = fs::File::open(path).map_err(|source| ZimError::Io { path: path.to_path_buf(), source })?;
    file.sync_all().map_err(|source| ZimError::Io { path: path.to_path_buf(), source })
}

fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

/// Placeholder hex encoding of a content hash, useful for debugging/log
/// lines without re-deriving it from the bytes.
pub fn content_hash_hex(bytes: &[u8]) -> String {
    hex::encode(content_hash(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_bytes(writer: &mut ZimWriter, path: &str, bytes: &[u8], hint: ArtifactHint) {
        writer
            .push(Artifact::content(path, Mime::TextHtml, bytes.to_vec(), hint))
            .expect("push");
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let td = tempdir().expect("tempdir");
        let mut writer = ZimWriter::create(&td.path().join("out.zim")).expect("create");
        write_bytes(&mut writer, "/a", b"one", ArtifactHint::UNIQUE);
        let err = writer.push(Artifact::content("/a", Mime::TextHtml, b"two".to_vec(), ArtifactHint::UNIQUE));
        assert!(matches!(err, Err(ZimError::DuplicatePath(p)) if p == "/a"));
    }

    #[test]
    fn dedupable_artifacts_with_equal_bytes_share_a_blob() {
        let td = tempdir().expect("tempdir");
        let mut writer = ZimWriter::create(&td.path().join("out.zim")).expect("create");
        write_bytes(&mut writer, "/style_light.css", b"body{}", ArtifactHint::SHARED);
        write_bytes(&mut writer, "/cached/style_light.css", b"body{}", ArtifactHint::SHARED);

        let summary = writer.finish().expect("finish");
        assert_eq!(summary.content_records, 1);
        assert_eq!(summary.deduped_records, 1);
    }

    #[test]
    fn non_dedupable_artifacts_keep_distinct_blobs_even_with_equal_bytes() {
        let td = tempdir().expect("tempdir");
        let mut writer = ZimWriter::create(&td.path().join("out.zim")).expect("create");
        write_bytes(&mut writer, "/story/Demo/1/1", b"<p>hi</p>", ArtifactHint::UNIQUE);
        write_bytes(&mut writer, "/story/Demo/2/1", b"<p>hi</p>", ArtifactHint::UNIQUE);

        let summary = writer.finish().expect("finish");
        assert_eq!(summary.content_records, 2);
        assert_eq!(summary.deduped_records, 0);
    }

    #[test]
    fn redirect_records_are_counted_separately_from_content() {
        let td = tempdir().expect("tempdir");
        let mut writer = ZimWriter::create(&td.path().join("out.zim")).expect("create");
        write_bytes(&mut writer, "/story/Demo/1/1", b"<p>hi</p>", ArtifactHint::UNIQUE);
        writer
            .push(Artifact::redirect("/story/Demo/1/", "./1"))
            .expect("push redirect");

        let summary = writer.finish().expect("finish");
        assert_eq!(summary.content_records, 1);
        assert_eq!(summary.redirect_records, 1);
    }

    #[test]
    fn finish_produces_the_final_file_and_removes_the_temp_file() {
        let td = tempdir().expect("tempdir");
        let out = td.path().join("out.zim");
        let mut writer = ZimWriter::create(&out).expect("create");
        write_bytes(&mut writer, "/index.html", b"<html></html>", ArtifactHint::UNIQUE);
        let tmp_path = writer.tmp_path.clone();

        writer.finish().expect("finish");

        assert!(out.exists());
        assert!(!tmp_path.exists());
    }

    #[test]
    fn abort_removes_the_partial_file_and_not_the_final_path() {
        let td = tempdir().expect("tempdir");
        let out = td.path().join("out.zim");
        let mut writer = ZimWriter::create(&out).expect("create");
        write_bytes(&mut writer, "/index.html", b"<html></html>", ArtifactHint::UNIQUE);
        let tmp_path = writer.tmp_path.clone();

        writer.abort();

        assert!(!out.exists());
        assert!(!tmp_path.exists());
    }

    #[test]
    fn content_hash_hex_is_stable_for_equal_bytes() {
        assert_eq!(content_hash_hex(b"hello"), content_hash_hex(b"hello"));
        assert_ne!(content_hash_hex(b"hello"), content_hash_hex(b"world"));
    }
}
