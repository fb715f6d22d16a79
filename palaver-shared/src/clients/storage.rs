use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// URL prefix uploaded files are served under.
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Uploaded files on local disk.
///
/// A file stored at `{root}/{relative}` is published as `/uploads/{relative}`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("upload directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `data` under `relative` and returns the public URL.
    /// Every component of `relative` must already be a sanitized name.
    pub async fn save(&self, relative: &str, data: &[u8]) -> Result<String> {
        let path = match self.resolve_relative(relative) {
            Some(path) => path,
            None => bail!("refusing to store outside the upload root: {relative}"),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        info!(path = %path.display(), bytes = data.len(), "stored upload");
        Ok(format!("{UPLOADS_PREFIX}/{relative}"))
    }

    /// Maps a public URL back to its file, if it names one under the root.
    pub fn resolve_url(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(UPLOADS_PREFIX)?.strip_prefix('/')?;
        self.resolve_relative(relative)
    }

    /// Removes the file behind `url`. Returns false when the URL is not
    /// under the root or the file is already gone.
    pub async fn delete_url(&self, url: &str) -> Result<bool> {
        let Some(path) = self.resolve_url(url) else {
            return Ok(false);
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "deleted upload");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "upload already gone");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_relative(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let mut components = relative.components().peekable();
        components.peek()?;
        if !components.all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(relative))
    }
}

/// Reduces a client-supplied file name to a safe single path component.
/// Keeps ASCII letters, digits, `.`, `-` and `_`; whitespace becomes `_`.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Lowercased extension after the last dot.
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
