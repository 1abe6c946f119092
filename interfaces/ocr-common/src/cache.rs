use crate::FileSource;
use hf_hub::api::sync::{Api, ApiBuilder, ApiError};
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Hugging Face API error: {0}")]
    HuggingFaceApi(#[from] ApiError),
    #[error("Local file {} does not exist", .0.display())]
    MissingLocalFile(PathBuf),
    #[error("{0} is not in the local cache and downloads are disabled")]
    NotCached(FileSource),
}

/// Resolves [`FileSource`]s to paths on disk, downloading hub files when allowed.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    /// The hub cache directory (defaults to the hub's own default, which honors `HF_HOME`)
    location: Option<PathBuf>,
    offline: bool,
}

impl Cache {
    /// Create a new cache with a specific location
    pub fn new(location: PathBuf) -> Self {
        Self {
            location: Some(location),
            ..Self::default()
        }
    }

    /// Only read hub files that are already cached
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Get the file from the cache, downloading it if necessary
    pub fn get(&self, source: &FileSource) -> Result<PathBuf, CacheError> {
        match source {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => {
                let repo =
                    Repo::with_revision(model_id.clone(), RepoType::Model, revision.clone());

                if self.offline {
                    tracing::debug!("Looking up {source} in the local hub cache");
                    return self
                        .hub_cache()
                        .repo(repo)
                        .get(file)
                        .ok_or_else(|| CacheError::NotCached(source.clone()));
                }

                tracing::debug!("Fetching {source}");
                let path = self.api()?.repo(repo).get(file)?;
                tracing::trace!("Resolved {source} to {}", path.display());
                Ok(path)
            }
            FileSource::Local(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(CacheError::MissingLocalFile(path.clone()))
                }
            }
        }
    }

    fn hub_cache(&self) -> hf_hub::Cache {
        match &self.location {
            Some(location) => hf_hub::Cache::new(location.clone()),
            None => hf_hub::Cache::default(),
        }
    }

    fn api(&self) -> Result<Api, ApiError> {
        // Progress bars would interleave with the output streams
        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(location) = &self.location {
            builder = builder.with_cache_dir(location.clone());
        }
        if let Some(token) = self.huggingface_token() {
            builder = builder.with_token(Some(token));
        }
        builder.build()
    }

    /// The token saved by `huggingface-cli login` in this cache, then `HF_TOKEN`
    fn huggingface_token(&self) -> Option<String> {
        self.hub_cache()
            .token()
            .or_else(|| std::env::var("HF_TOKEN").ok())
    }
}
