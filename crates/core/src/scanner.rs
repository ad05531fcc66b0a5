//! Walks the input folder and yields the image files to annotate.

use crate::models::ImageRef;
use anyhow::Context;
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "bmp", "tiff"];

/// A restartable view over the images below `root`.
///
/// [`count`](Self::count) and [`iter`](Self::iter) walk the tree independently
/// with the same filter, so the count matches what `iter` yields as long as
/// the tree is left alone in between.
#[derive(Debug, Clone)]
pub struct ImageScan {
    root: PathBuf,
    recursive: bool,
    matcher: GlobMatcher,
}

impl ImageScan {
    pub fn new(root: &Path, recursive: bool) -> anyhow::Result<Self> {
        let root = std::path::absolute(root)
            .with_context(|| format!("Failed to resolve input folder: {:?}", root))?;
        Ok(Self {
            root,
            recursive,
            matcher: image_matcher()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn count(&self) -> anyhow::Result<usize> {
        let mut n = 0;
        for item in self.iter() {
            item?;
            n += 1;
        }
        Ok(n)
    }

    pub fn iter(&self) -> impl Iterator<Item = anyhow::Result<ImageRef>> + '_ {
        let mut walker = WalkDir::new(&self.root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name();
        if !self.recursive {
            walker = walker.max_depth(1);
        }
        walker
            .into_iter()
            .filter_entry(|e| !is_hidden_dir(e))
            .filter_map(move |entry| match entry {
                Ok(e) => self.image_ref(&e).map(Ok),
                Err(err) => Some(Err(
                    anyhow::Error::new(err).context(format!("Failed to walk {:?}", self.root))
                )),
            })
    }

    fn image_ref(&self, entry: &DirEntry) -> Option<ImageRef> {
        if !entry.file_type().is_file() || !self.matcher.is_match(entry.file_name()) {
            return None;
        }
        let extension = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        Some(ImageRef {
            path: entry.path().to_path_buf(),
            extension,
        })
    }
}

fn image_matcher() -> anyhow::Result<GlobMatcher> {
    let pattern = format!("*.{{{}}}", IMAGE_EXTENSIONS.join(","));
    let glob = GlobBuilder::new(&pattern).case_insensitive(true).build()?;
    Ok(glob.compile_matcher())
}

// Dot-directories below the root are pruned, so nothing under them is visited.
fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}
