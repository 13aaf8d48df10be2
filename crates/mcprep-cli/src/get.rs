use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mcprep_core::{fetch_all_to_dir, FetchOutcome, FetchSession, PrepError, SessionConfig};

#[derive(Args, Debug)]
pub struct GetArgs {
    /// URIs to download
    #[arg(required = true, value_name = "URI")]
    pub uris: Vec<String>,

    /// Destination directory, or exact file path for a single URI
    #[arg(short, long)]
    pub dest: PathBuf,

    /// Skip the download entirely when the destination file already exists
    #[arg(long)]
    pub skip_existing: bool,

    /// Skip the transfer when the destination already matches the source by
    /// size and modification time
    #[arg(long)]
    pub skip_up_to_date: bool,

    /// Maximum number of concurrent downloads
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// API key header value sent with every request
    #[arg(long, env = "MCPREP_API_KEY")]
    pub api_key: Option<String>,
}

pub async fn run(args: GetArgs) -> Result<()> {
    let mut config = SessionConfig::new();
    if let Some(key) = args.api_key.clone() {
        config = config.with_api_key(key);
    }
    let session = FetchSession::with_config(config)?;

    if args.uris.len() == 1 && !args.dest.is_dir() {
        let uri = &args.uris[0];
        let outcome = session
            .fetch(uri.as_str())
            .skip_existing(args.skip_existing)
            .skip_up_to_date(args.skip_up_to_date)
            .checkpoint(format!("downloading {uri}"))
            .to_file(&args.dest)
            .await?;
        report(&outcome);
        return Ok(());
    }

    if !args.dest.is_dir() {
        return Err(PrepError::InvalidParameter(format!(
            "--dest {} must be an existing directory when downloading multiple URIs",
            args.dest.display()
        ))
        .into());
    }

    let progress = ProgressBar::new(args.uris.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:30.green} {pos}/{len} {msg}")
            .unwrap(),
    );

    let outcomes = fetch_all_to_dir(
        &session,
        &args.uris,
        &args.dest,
        args.concurrency,
        args.skip_existing,
        args.skip_up_to_date,
        |outcome| {
            progress.inc(1);
            if let Some(name) = outcome.path().file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
        },
    )
    .await?;
    progress.finish_and_clear();

    for outcome in &outcomes {
        report(outcome);
    }
    Ok(())
}

fn report(outcome: &FetchOutcome) {
    if outcome.was_skipped() {
        println!(
            "{} {}",
            style("Skipped").yellow(),
            outcome.path().display()
        );
    } else {
        println!(
            "{} {}",
            style("Downloaded").green(),
            outcome.path().display()
        );
    }
}
