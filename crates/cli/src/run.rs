use crate::args::Cli;
use providers::vision::GoogleVisionClient;
use providers::Annotator;
use std::io::Write;
use tagger_core::config::{self, RunConfig};
use tagger_core::{metadata, pipeline};
use tracing::{info, warn};

/// Validates the arguments, builds the vision client and runs both phases.
pub async fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let settings = config::load(cli.config.as_deref())?;
    let cfg = cli.run_config();
    cfg.validate()?;
    if cfg.remove_existing_tags && !cfg.insert_tags {
        warn!("--remove-existing-tags has no effect without --tag");
    }

    let client =
        GoogleVisionClient::from_credential_file(&cfg.credential, settings.vision.client_config())?;
    execute(&cfg, &client, out).await
}

/// Annotation, then tagging when requested. Progress and completion lines go to `out`.
pub async fn execute(
    cfg: &RunConfig,
    annotator: &dyn Annotator,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let written = pipeline::annotate(cfg, annotator, out).await?;
    writeln!(out, "Exported CSV file to {}", written.display())?;

    if cfg.insert_tags {
        let summary = metadata::apply_tags(&written, cfg.remove_existing_tags, out)?;
        info!(
            "Tagging complete: {} tagged, {} skipped",
            summary.tagged, summary.skipped
        );
    }

    writeln!(out, "All processes are successfully executed")?;
    Ok(())
}
