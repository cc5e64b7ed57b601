use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use engine::{ProjectSession, SyncEvent};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "imapo",
    about = "Manage translated text for screenshots and sync them to Weblate",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List every image with its unit and translation state.
    Status { project: PathBuf },

    /// Print the segment of an image, creating it if needed.
    Show { project: PathBuf, image: String },

    /// Set the text of an image. An empty text marks it untranslated again.
    #[command(name = "set-text")]
    SetText {
        project: PathBuf,
        image: String,
        text: String,
    },

    /// Upload screenshots and link them to their Weblate units.
    Sync {
        project: PathBuf,
        #[arg(long, env = "WEBLATE_TOKEN", hide_env_values = true)]
        token: String,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match run(cli, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn open(project: &Path) -> Result<ProjectSession> {
    let mut session = ProjectSession::new();
    session
        .open_project(project)
        .with_context(|| format!("failed to open project {}", project.display()))?;
    Ok(session)
}

fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Commands::Status { project } => {
            let session = open(&project)?;
            let settings = session.settings()?;
            for image in session.images()? {
                let unit = settings
                    .unit(image.unit)
                    .map(|unit| unit.name.as_str())
                    .unwrap_or("?");
                let mark = if image.translated { "done" } else { "todo" };
                writeln!(out, "{mark}\t{unit}\t{}", image.path)?;
            }
            for image in &session.segments()?.tree().unassigned {
                writeln!(out, "none\t-\t{image}")?;
            }
        }
        Commands::Show { project, image } => {
            let mut session = open(&project)?;
            let view = session
                .get_or_create_segment(&image)
                .with_context(|| format!("cannot show {image}"))?;
            writeln!(out, "{}\n{}", view.context, view.text)?;
        }
        Commands::SetText {
            project,
            image,
            text,
        } => {
            let mut session = open(&project)?;
            session
                .set_segment_text(&image, &text)
                .with_context(|| format!("cannot update {image}"))?;
            session.close()?;
        }
        Commands::Sync { project, token } => {
            let mut session = open(&project)?;
            let events = session.start_sync(&token).context("cannot start sync")?;
            for event in events.iter() {
                match event {
                    SyncEvent::Status(message) => writeln!(out, "{message}")?,
                    SyncEvent::Finished(report) => {
                        writeln!(
                            out,
                            "sync finished: {} uploaded, {} linked, {} skipped",
                            report.uploaded, report.linked, report.skipped
                        )?;
                        break;
                    }
                    SyncEvent::Failed(message) => bail!("sync failed: {message}"),
                    SyncEvent::Cancelled => bail!("sync cancelled"),
                }
            }
            session.close()?;
        }
    }
    Ok(())
}
