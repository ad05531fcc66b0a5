use crate::config::RunConfig;
use crate::models::AnnotationRow;
use crate::progress::Progress;
use crate::scanner::ImageScan;
use crate::table::ResultTable;
use anyhow::Context;
use providers::Annotator;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Annotates every image under the input folder and writes the results CSV.
///
/// Images are processed one at a time. A failed annotation aborts the run
/// before anything is written. Returns the path of the written file.
pub async fn annotate(
    cfg: &RunConfig,
    annotator: &dyn Annotator,
    progress: &mut dyn Write,
) -> anyhow::Result<PathBuf> {
    let scan = ImageScan::new(&cfg.input_root, cfg.recursive)?;
    let total = scan.count()?;
    info!(
        "Start to generate tags for {} image(s) in {:?}",
        total,
        scan.root()
    );

    let mut table = ResultTable::new();
    let mut counter = Progress::new(total);
    for image in scan.iter() {
        let image = image?;
        let content = tokio::fs::read(&image.path)
            .await
            .with_context(|| format!("Failed to read image {:?}", image.path))?;
        let labels = annotator
            .annotate(&content)
            .await
            .with_context(|| format!("Annotation failed for {:?}", image.path))?;
        debug!(path = ?image.path, labels = labels.len(), "annotated");

        let filepath = image.path.to_string_lossy().into_owned();
        table.extend(labels.into_iter().map(|label| AnnotationRow {
            filepath: filepath.clone(),
            keyword: label.description,
            relevance: label.score,
        }));
        counter.advance(progress)?;
    }

    table.sort();
    table.truncate_per_file(cfg.max_keywords);
    if table.is_empty() {
        warn!("No keywords detected; the results file will only have a header");
    }
    table.write_csv(&cfg.output_path, cfg.export_score)?;
    info!(
        "Exported {} keyword row(s) to {:?}",
        table.len(),
        cfg.output_path
    );
    Ok(cfg.output_path.clone())
}
