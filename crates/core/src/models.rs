use std::path::PathBuf;

/// An image found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Absolute path.
    pub path: PathBuf,
    /// Lower-cased extension without the dot.
    pub extension: String,
}

/// One detected keyword for one image. Several rows share a filepath.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRow {
    pub filepath: String,
    pub keyword: String,
    pub relevance: f32,
}
