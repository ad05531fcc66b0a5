use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tagger_core::config::RunConfig;

#[derive(Parser, Debug)]
#[command(name = "image-tagger")]
#[command(
    about = "Generate keywords that describe your images, export them to CSV and optionally insert them as EXIF tags",
    long_about = None
)]
pub struct Cli {
    /// Credential file (.json) downloaded from Google Cloud Platform
    pub credential: PathBuf,

    /// Folder containing the images to be tagged
    pub input_folder: PathBuf,

    /// Path for the results .csv file
    pub output_filepath: PathBuf,

    /// Include images in subfolders
    #[arg(short, long)]
    pub recursive: bool,

    /// Whether to export the relevance score of each keyword
    #[arg(short, long, value_enum, default_value_t = ExportScore::Yes)]
    pub export_score: ExportScore,

    /// Maximum number of keywords per image (0-255), 0 for unlimited
    #[arg(short = 'm', long = "maxkeywords", default_value_t = 0)]
    pub max_keywords: u8,

    /// Insert keywords as the images' EXIF tags
    #[arg(short, long)]
    pub tag: bool,

    /// [Irreversible] Remove existing tags before adding the generated ones
    #[arg(long, visible_alias = "rm")]
    pub remove_existing_tags: bool,

    /// Path to settings TOML
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportScore {
    Yes,
    No,
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            credential: self.credential.clone(),
            input_root: self.input_folder.clone(),
            recursive: self.recursive,
            output_path: self.output_filepath.clone(),
            max_keywords: self.max_keywords,
            export_score: self.export_score == ExportScore::Yes,
            insert_tags: self.tag,
            remove_existing_tags: self.remove_existing_tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_plain_run() {
        let cli = Cli::try_parse_from(["image-tagger", "key.json", "imgs", "out.csv"]).unwrap();
        let cfg = cli.run_config();
        assert_eq!(cfg.credential, PathBuf::from("key.json"));
        assert!(!cfg.recursive);
        assert!(cfg.export_score);
        assert_eq!(cfg.max_keywords, 0);
        assert!(!cfg.insert_tags);
        assert!(!cfg.remove_existing_tags);
        assert!(cli.config.is_none());
    }

    #[test]
    fn all_options() {
        let cli = Cli::try_parse_from([
            "image-tagger",
            "key.json",
            "imgs",
            "out.csv",
            "-r",
            "-e",
            "no",
            "-m",
            "5",
            "-t",
            "--rm",
            "-c",
            "settings.toml",
        ])
        .unwrap();
        let cfg = cli.run_config();
        assert!(cfg.recursive);
        assert!(!cfg.export_score);
        assert_eq!(cfg.max_keywords, 5);
        assert!(cfg.insert_tags);
        assert!(cfg.remove_existing_tags);
        assert_eq!(cli.config.as_deref(), Some("settings.toml"));
    }

    #[test]
    fn max_keywords_is_bounded() {
        let base = ["image-tagger", "key.json", "imgs", "out.csv", "--maxkeywords"];
        assert!(Cli::try_parse_from(base.iter().copied().chain(["255"])).is_ok());
        assert!(Cli::try_parse_from(base.iter().copied().chain(["256"])).is_err());
        assert!(Cli::try_parse_from(base.iter().copied().chain(["-1"])).is_err());
    }

    #[test]
    fn export_score_only_accepts_yes_or_no() {
        let res = Cli::try_parse_from([
            "image-tagger",
            "key.json",
            "imgs",
            "out.csv",
            "--export-score",
            "maybe",
        ]);
        assert!(res.is_err());
    }
}
