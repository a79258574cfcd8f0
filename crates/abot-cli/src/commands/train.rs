//! `abot train` -- build an intent model offline.
//!
//! ```text
//! abot train corpus.txt intent.bin
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use abot_core::bootstrap::{save_model, train};

/// Arguments for the `abot train` subcommand.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Annotated corpus, one sentence per line (`_C(get) the _O(weather)`).
    pub corpus: PathBuf,

    /// Where to write the binary model.
    pub model: PathBuf,
}

/// Run the `train` command.
pub async fn run(args: TrainArgs) -> anyhow::Result<()> {
    let corpus = tokio::fs::read_to_string(&args.corpus)
        .await
        .with_context(|| format!("failed to read corpus {}", args.corpus.display()))?;

    let tagger = train(corpus).await?;
    let model = tagger.into_classifier();
    let learned = model.learned();
    let words: u64 = model.word_count().iter().sum();

    save_model(model, args.model.clone())
        .await
        .with_context(|| format!("failed to write model {}", args.model.display()))?;
    info!(path = %args.model.display(), learned, "model written");
    println!(
        "trained {learned} examples ({words} words) -> {}",
        args.model.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trains_and_writes_model() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.txt");
        let model = dir.path().join("out").join("intent.bin");
        std::fs::write(&corpus, "_C(get) the _O(weather)\n_C(play) _O(music)\n").unwrap();

        run(TrainArgs {
            corpus,
            model: model.clone(),
        })
        .await
        .unwrap();

        let tagger = abot_core::bootstrap::read_model(&model).unwrap();
        assert!(tagger.classifier().learned() > 0);
    }

    #[tokio::test]
    async fn missing_corpus_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(TrainArgs {
            corpus: dir.path().join("absent.txt"),
            model: dir.path().join("intent.bin"),
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed to read corpus"));
    }
}
