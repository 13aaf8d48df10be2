use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use mcprep_core::{verify, HashSpec};

#[derive(Args, Debug)]
pub struct HashArgs {
    /// File to verify
    pub file: PathBuf,

    /// Expected hex digest; the algorithm is inferred from its length
    pub expected: String,
}

pub async fn run(args: HashArgs) -> Result<()> {
    let spec = HashSpec::infer(args.expected.clone())?;
    let algorithm = spec.algorithm;
    verify::verify(&args.file, &[spec]).await?;

    println!(
        "{} {} matches the expected {} digest",
        style("OK").green().bold(),
        args.file.display(),
        algorithm
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_matching_digest_succeeds() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, b"Hello World").unwrap();

        let args = HashArgs {
            file,
            expected: "b10a8db164e0754105b7a99be72e3fe5".to_string(),
        };
        run(args).await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatch_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, b"Hello World").unwrap();

        let args = HashArgs {
            file,
            expected: "00000000000000000000000000000000".to_string(),
        };
        assert!(run(args).await.is_err());
    }
}

