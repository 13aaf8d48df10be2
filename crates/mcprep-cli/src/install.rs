use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use mcprep_core::{install, verify, FetchSession, HashSpec, InstallOutcome, Origin};

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Artifact URL to install
    #[arg(value_name = "URL")]
    pub url: String,

    /// Output directory
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Component id the manifest is recorded under
    #[arg(long)]
    pub id: String,

    /// Reinstall even when the recorded origin matches
    #[arg(long)]
    pub force: bool,

    /// Expected hex digest; the algorithm is inferred from its length
    #[arg(long)]
    pub hash: Option<String>,
}

pub async fn run(args: InstallArgs) -> Result<()> {
    let specs = match &args.hash {
        Some(expected) => vec![HashSpec::infer(expected.clone())?],
        None => Vec::new(),
    };

    tokio::fs::create_dir_all(&args.dir).await?;
    let session = FetchSession::new()?;

    let url = args.url.clone();
    let dir = args.dir.clone();
    let origin = Origin::RemoteUrl {
        url: args.url.clone(),
    };

    let outcome = install::install(&args.dir, &args.id, origin, args.force, || async {
        let fetched = session
            .fetch(url.as_str())
            .checkpoint(format!("downloading {url}"))
            .to_dir(&dir)
            .await?;
        verify::verify(fetched.path(), &specs).await?;
        Ok(vec![fetched.path().to_path_buf()])
    })
    .await?;

    match outcome {
        InstallOutcome::UpToDate => {
            println!(
                "{} {} is already up to date",
                style("Skipped").yellow(),
                args.id
            );
        }
        InstallOutcome::Installed { files } => {
            println!(
                "{} {} ({} file{})",
                style("Installed").green().bold(),
                args.id,
                files.len(),
                if files.len() == 1 { "" } else { "s" }
            );
        }
    }
    Ok(())
}
