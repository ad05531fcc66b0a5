//! In-memory result table and its CSV form.
//!
//! The CSV written here is also the input of the tagging phase, which reads
//! it back from disk rather than sharing the in-memory rows.

use crate::models::AnnotationRow;
use anyhow::{anyhow, Context};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const COL_FILEPATH: &str = "filepath";
pub const COL_KEYWORD: &str = "keyword";
pub const COL_RELEVANCE: &str = "relevance";

/// Separator between keywords in a tag string.
pub const TAG_DELIMITER: &str = ", ";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<AnnotationRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<AnnotationRow>) -> Self {
        Self { rows }
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = AnnotationRow>) {
        self.rows.extend(rows);
    }

    pub fn rows(&self) -> &[AnnotationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Filepath descending, then relevance descending. Stable: rows equal on
    /// both keys keep their insertion order.
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| {
            b.filepath
                .cmp(&a.filepath)
                .then_with(|| b.relevance.total_cmp(&a.relevance))
        });
    }

    /// Keeps the first `max` rows of each filepath. 0 keeps everything.
    /// Call after [`sort`](Self::sort) to keep the most relevant ones.
    pub fn truncate_per_file(&mut self, max: u8) {
        if max == 0 {
            return;
        }
        let mut seen: HashMap<String, usize> = HashMap::new();
        self.rows.retain(|row| {
            let n = seen.entry(row.filepath.clone()).or_default();
            *n += 1;
            *n <= max as usize
        });
    }

    pub fn header(export_score: bool) -> Vec<&'static str> {
        if export_score {
            vec![COL_FILEPATH, COL_KEYWORD, COL_RELEVANCE]
        } else {
            vec![COL_FILEPATH, COL_KEYWORD]
        }
    }

    /// Writes the header row followed by one line per row. No index column.
    pub fn write_to<W: std::io::Write>(&self, out: W, export_score: bool) -> anyhow::Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        wtr.write_record(Self::header(export_score))?;
        for row in &self.rows {
            if export_score {
                let relevance = row.relevance.to_string();
                wtr.write_record([row.filepath.as_str(), row.keyword.as_str(), relevance.as_str()])?;
            } else {
                wtr.write_record([row.filepath.as_str(), row.keyword.as_str()])?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    /// Writes the CSV to a sibling temp file and renames it over `path`.
    pub fn write_csv(&self, path: &Path, export_score: bool) -> anyhow::Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
        self.write_to(&mut tmp, export_score)?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write results to {:?}", path))?;
        Ok(())
    }
}

/// Reads a results CSV and collects each file's keywords in file order,
/// files in ascending path order.
pub fn read_keywords_by_file(path: &Path) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open results file {:?}", path))?;
    let headers = rdr.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow!("results file {:?} has no {:?} column", path, name))
    };
    let file_idx = column(COL_FILEPATH)?;
    let keyword_idx = column(COL_KEYWORD)?;

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Bad record {} in {:?}", line + 2, path))?;
        let (Some(file), Some(keyword)) = (record.get(file_idx), record.get(keyword_idx)) else {
            return Err(anyhow!("short record {} in {:?}", line + 2, path));
        };
        grouped
            .entry(file.to_string())
            .or_default()
            .push(keyword.to_string());
    }
    Ok(grouped)
}

pub fn tag_string(keywords: &[String]) -> String {
    keywords.join(TAG_DELIMITER)
}
