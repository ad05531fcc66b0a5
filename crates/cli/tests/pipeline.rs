use providers::noop::NoopAnnotator;
use providers::{Annotator, Label, ProviderError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tagger_core::config::RunConfig;
use tagger_core::{metadata, pipeline, progress};
use tempfile::tempdir;

/// Returns the same labels for every image and counts calls.
struct Scripted {
    labels: Vec<Label>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(labels: &[(&str, f32)]) -> Self {
        Self {
            labels: labels.iter().map(|(d, s)| Label::new(*d, *s)).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Annotator for Scripted {
    async fn annotate(&self, _image: &[u8]) -> Result<Vec<Label>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.labels.clone())
    }
}

struct Failing;

#[async_trait::async_trait]
impl Annotator for Failing {
    async fn annotate(&self, _image: &[u8]) -> Result<Vec<Label>, ProviderError> {
        Err(ProviderError::RequestFailed("quota exceeded".into()))
    }
}

fn run_config(input: &Path, output: PathBuf) -> RunConfig {
    RunConfig {
        credential: input.join("unused.json"),
        input_root: input.to_path_buf(),
        recursive: false,
        output_path: output,
        max_keywords: 0,
        export_score: true,
        insert_tags: false,
        remove_existing_tags: false,
    }
}

fn progress_lines(out: &[u8]) -> Vec<(usize, usize)> {
    String::from_utf8_lossy(out)
        .lines()
        .filter_map(progress::parse_line)
        .collect()
}

fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let headers = rdr.headers().unwrap().iter().map(String::from).collect();
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (headers, rows)
}

fn write_jpeg(path: &Path) {
    image::RgbImage::from_pixel(8, 8, image::Rgb([200, 40, 40]))
        .save(path)
        .unwrap();
}

fn write_png(path: &Path) {
    image::RgbImage::from_pixel(8, 8, image::Rgb([40, 200, 40]))
        .save(path)
        .unwrap();
}

#[tokio::test]
async fn counts_only_images_in_root_folder() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(input.join("sub")).unwrap();
    for name in ["a.jpg", "b.png", "c.gif"] {
        fs::write(input.join(name), b"bytes").unwrap();
    }
    fs::write(input.join("notes.txt"), b"not an image").unwrap();
    fs::write(input.join("sub").join("d.jpg"), b"nested").unwrap();

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let annotator = Scripted::new(&[("Thing", 0.7)]);
    let mut out = Vec::new();
    let written = pipeline::annotate(&cfg, &annotator, &mut out).await.unwrap();

    assert_eq!(written, cfg.output_path);
    assert_eq!(annotator.calls.load(Ordering::SeqCst), 3);
    assert_eq!(progress_lines(&out), vec![(1, 3), (2, 3), (3, 3)]);

    let (headers, rows) = read_csv(&written);
    assert_eq!(headers, vec!["filepath", "keyword", "relevance"]);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| !r[0].ends_with(".txt") && !r[0].ends_with("d.jpg")));
    assert!(rows.iter().all(|r| Path::new(&r[0]).is_absolute()));
}

#[tokio::test]
async fn recursive_run_includes_nested_images() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(input.join("sub")).unwrap();
    fs::create_dir_all(input.join(".git")).unwrap();
    fs::write(input.join("a.jpg"), b"a").unwrap();
    fs::write(input.join("sub").join("b.JPG"), b"b").unwrap();
    fs::write(input.join(".git").join("c.jpg"), b"c").unwrap();

    let mut cfg = run_config(&input, temp.path().join("results.csv"));
    cfg.recursive = true;
    let mut out = Vec::new();
    pipeline::annotate(&cfg, &Scripted::new(&[("x", 0.5)]), &mut out)
        .await
        .unwrap();

    assert_eq!(progress_lines(&out).last(), Some(&(2, 2)));
    let (_, rows) = read_csv(&cfg.output_path);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| !r[0].ends_with("c.jpg")));
}

#[tokio::test]
async fn empty_folder_writes_header_only() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("empty");
    fs::create_dir_all(&input).unwrap();

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let mut out = Vec::new();
    pipeline::annotate(&cfg, &NoopAnnotator, &mut out).await.unwrap();

    assert!(progress_lines(&out).is_empty());
    assert_eq!(
        fs::read_to_string(&cfg.output_path).unwrap(),
        "filepath,keyword,relevance\n"
    );
}

#[tokio::test]
async fn images_without_labels_write_header_only() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("blank.jpg"), b"img").unwrap();

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let mut out = Vec::new();
    pipeline::annotate(&cfg, &NoopAnnotator, &mut out).await.unwrap();

    assert_eq!(progress_lines(&out), vec![(1, 1)]);
    let (headers, rows) = read_csv(&cfg.output_path);
    assert_eq!(headers, vec!["filepath", "keyword", "relevance"]);
    assert!(rows.is_empty());
}

#[tokio::test]
async fn max_keywords_and_no_score_column() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("only.jpg"), b"img").unwrap();

    let mut cfg = run_config(&input, temp.path().join("results.csv"));
    cfg.max_keywords = 2;
    cfg.export_score = false;
    let annotator = Scripted::new(&[
        ("Sky", 0.6),
        ("Cloud", 0.95),
        ("Blue", 0.4),
        ("Daytime", 0.88),
        ("Horizon", 0.3),
    ]);
    let mut out = Vec::new();
    pipeline::annotate(&cfg, &annotator, &mut out).await.unwrap();

    let (headers, rows) = read_csv(&cfg.output_path);
    assert_eq!(headers, vec!["filepath", "keyword"]);
    let keywords: Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
    assert_eq!(keywords, vec!["Cloud", "Daytime"]);
    assert!(rows.iter().all(|r| r.len() == 2));
}

#[tokio::test]
async fn duplicate_keywords_are_kept() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("a.png"), b"img").unwrap();

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let mut out = Vec::new();
    pipeline::annotate(&cfg, &Scripted::new(&[("Cat", 0.9), ("Cat", 0.8)]), &mut out)
        .await
        .unwrap();

    let (_, rows) = read_csv(&cfg.output_path);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r[1] == "Cat"));
}

#[tokio::test]
async fn annotation_failure_aborts_without_output() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("a.jpg"), b"img").unwrap();

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let mut out = Vec::new();
    let err = pipeline::annotate(&cfg, &Failing, &mut out).await.unwrap_err();

    assert!(format!("{:#}", err).contains("quota exceeded"));
    assert!(!cfg.output_path.exists());
    assert!(progress_lines(&out).is_empty());
}

#[tokio::test]
async fn replace_then_append_keywords() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    let photo = input.join("photo.jpg");
    write_jpeg(&photo);

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let annotator = Scripted::new(&[("dog", 0.5), ("cat", 0.9)]);
    let mut out = Vec::new();
    let results = pipeline::annotate(&cfg, &annotator, &mut out).await.unwrap();

    let mut out = Vec::new();
    let summary = metadata::apply_tags(&results, true, &mut out).unwrap();
    assert_eq!(summary.tagged, 1);
    assert_eq!(progress_lines(&out), vec![(1, 1)]);
    assert_eq!(
        metadata::read_keywords(&photo).unwrap().as_deref(),
        Some("cat, dog")
    );

    metadata::write_keywords(&photo, "animal", true).unwrap();
    let mut out = Vec::new();
    metadata::apply_tags(&results, false, &mut out).unwrap();
    assert_eq!(
        metadata::read_keywords(&photo).unwrap().as_deref(),
        Some("animal, cat, dog")
    );

    // Still a decodable JPEG after two rewrites.
    image::open(&photo).unwrap();
}

#[tokio::test]
async fn append_without_prior_keywords_writes_new_value() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    let photo = input.join("leaf.png");
    write_png(&photo);
    assert_eq!(metadata::read_keywords(&photo).unwrap(), None);

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let mut out = Vec::new();
    let results = pipeline::annotate(&cfg, &Scripted::new(&[("Leaf", 0.8)]), &mut out)
        .await
        .unwrap();
    metadata::apply_tags(&results, false, &mut out).unwrap();

    assert_eq!(
        metadata::read_keywords(&photo).unwrap().as_deref(),
        Some("Leaf")
    );
    image::open(&photo).unwrap();
}

#[tokio::test]
async fn gif_is_skipped_while_jpeg_and_tiff_are_tagged() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    write_jpeg(&input.join("a.jpg"));
    fs::write(input.join("b.gif"), b"GIF89a not much else").unwrap();
    image::RgbImage::from_pixel(8, 8, image::Rgb([40, 40, 200]))
        .save(input.join("c.tiff"))
        .unwrap();

    let cfg = run_config(&input, temp.path().join("results.csv"));
    let mut out = Vec::new();
    let results = pipeline::annotate(&cfg, &Scripted::new(&[("Shape", 0.6)]), &mut out)
        .await
        .unwrap();

    let mut out = Vec::new();
    let summary = metadata::apply_tags(&results, true, &mut out).unwrap();
    assert_eq!(summary, metadata::TagSummary { tagged: 2, skipped: 1 });
    assert_eq!(progress_lines(&out), vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(
        metadata::read_keywords(&input.join("c.tiff")).unwrap().as_deref(),
        Some("Shape")
    );
    image::open(input.join("c.tiff")).unwrap();
}

#[tokio::test]
async fn full_run_reports_completion() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("images");
    fs::create_dir_all(&input).unwrap();
    write_jpeg(&input.join("one.jpg"));
    write_jpeg(&input.join("two.jpeg"));

    let mut cfg = run_config(&input, temp.path().join("results.csv"));
    cfg.insert_tags = true;
    cfg.remove_existing_tags = true;
    let mut out = Vec::new();
    cli::run::execute(&cfg, &Scripted::new(&[("Red", 0.99)]), &mut out)
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    let exported = format!("Exported CSV file to {}", cfg.output_path.display());
    assert_eq!(
        lines,
        vec![
            "progress: 1/2",
            "progress: 2/2",
            exported.as_str(),
            "progress: 1/2",
            "progress: 2/2",
            "All processes are successfully executed",
        ]
    );
    for name in ["one.jpg", "two.jpeg"] {
        assert_eq!(
            metadata::read_keywords(&input.join(name)).unwrap().as_deref(),
            Some("Red")
        );
    }
}
