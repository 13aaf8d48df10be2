mod get;
mod hash;
mod install;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use mcprep_core::PrepError;

#[derive(Parser, Debug)]
#[command(name = "mcprep")]
#[command(about = "Fetch, verify and install server software inside container images")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download one or more URIs to a file or a directory
    Get(get::GetArgs),

    /// Install an artifact into a directory with manifest reconciliation
    Install(install::InstallArgs),

    /// Verify a file against an expected digest
    Hash(hash::HashArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let result = match args.command {
        Commands::Get(args) => get::run(args).await,
        Commands::Install(args) => install::run(args).await,
        Commands::Hash(args) => hash::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let verbose = log::log_enabled!(log::Level::Debug);
            eprintln!(
                "{} {}",
                style("error:").red().bold(),
                render_error(&err, verbose)
            );
            exit_code_for(&err)
        }
    }
}

// With debug logging on, defer to anyhow's report format, which carries the
// full chain and any captured backtrace.
fn render_error(err: &anyhow::Error, verbose: bool) -> String {
    if verbose {
        format!("{err:?}")
    } else {
        let mut out = err.to_string();
        for cause in err.chain().skip(1) {
            out.push_str(&format!("\n  caused by: {cause}"));
        }
        out
    }
}

// Usage errors get their own exit status so orchestrators can tell bad
// invocations apart from transient failures.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<PrepError>() {
        Some(PrepError::InvalidParameter(_)) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chained() -> anyhow::Error {
        anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            .context("writing server.jar")
    }

    #[test]
    fn test_render_error_lists_causes() {
        let out = render_error(&chained(), false);
        assert!(out.starts_with("writing server.jar"));
        assert!(out.contains("caused by: disk full"));
    }

    #[test]
    fn test_render_error_verbose_uses_the_full_report() {
        let out = render_error(&chained(), true);
        assert!(out.contains("writing server.jar"));
        assert!(out.contains("Caused by"));
        assert!(out.contains("disk full"));
    }
}
