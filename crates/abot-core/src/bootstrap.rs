//! Startup loading of the intent model.
//!
//! The tagger comes from the first source that exists:
//!
//! 1. a binary model at `model_path`,
//! 2. an annotated corpus at `training_path`,
//! 3. the built-in seed corpus.
//!
//! A model trained from a corpus is written back to `model_path` when one is
//! configured, so the next start skips training. Disk work runs on the
//! blocking pool.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use abot_types::config::AbotConfig;
use abot_types::{AbotError, Result};

use crate::classifier::Classifier;
use crate::tagger::{Tagger, SEED_CORPUS};

/// Load or train the tagger described by `config`.
pub async fn load_tagger(config: &AbotConfig) -> Result<Tagger> {
    if let Some(path) = &config.model_path {
        if tokio::fs::try_exists(path).await? {
            let tagger = load_model(path.clone()).await?;
            info!(
                path = %path.display(),
                learned = tagger.classifier().learned(),
                "loaded intent model"
            );
            return Ok(tagger);
        }
        debug!(path = %path.display(), "no model file, training");
    }

    let tagger = match &config.training_path {
        Some(path) => {
            let corpus = tokio::fs::read_to_string(path).await.map_err(|e| {
                AbotError::config(format!("cannot read corpus {}: {e}", path.display()))
            })?;
            train(corpus).await?
        }
        None => train(SEED_CORPUS.to_string()).await?,
    };

    if let Some(path) = &config.model_path {
        if let Err(e) = save_model(tagger.classifier().clone(), path.clone()).await {
            warn!(path = %path.display(), error = %e, "could not save trained model");
        }
    }
    Ok(tagger)
}

/// Train a fresh tagger on an annotated corpus off the async runtime.
///
/// Malformed lines are skipped, but a corpus where every annotated line
/// was rejected is a bad-request.
pub async fn train(corpus: String) -> Result<Tagger> {
    tokio::task::spawn_blocking(move || -> Result<Tagger> {
        let mut tagger = Tagger::new();
        let report = tagger.train_corpus(&corpus);
        if report.sentences == 0 {
            report.strict()?;
        }
        Ok(tagger)
    })
    .await
    .map_err(|e| AbotError::Transport(format!("training task failed: {e}")))?
}

/// Persist a model snapshot off the async runtime.
pub async fn save_model(model: Classifier, path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || model.save(&path))
        .await
        .map_err(|e| AbotError::Transport(format!("save task failed: {e}")))??;
    Ok(())
}

async fn load_model(path: PathBuf) -> Result<Tagger> {
    let model = tokio::task::spawn_blocking(move || Classifier::load(&path))
        .await
        .map_err(|e| AbotError::Transport(format!("load task failed: {e}")))??;
    Ok(Tagger::from_classifier(model)?)
}

/// Read a model file synchronously. Used by offline tooling.
pub fn read_model(path: &Path) -> Result<Tagger> {
    Ok(Tagger::from_classifier(Classifier::load(path)?)?)
}
