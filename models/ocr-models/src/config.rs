use crate::OcrError;
use ocr_common::{Cache, FileSource, ModelLocation};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// The `config.json` of a pretrained checkpoint.
#[derive(Debug, Clone)]
pub struct PretrainedConfig {
    path: PathBuf,
    value: Value,
}

impl PretrainedConfig {
    /// The file every checkpoint describes itself with.
    pub const FILE_NAME: &'static str = "config.json";

    /// Fetch and parse the config of the model at `location`.
    pub fn load(cache: &Cache, location: &ModelLocation) -> Result<Self, OcrError> {
        let path = cache.get(&location.file(Self::FILE_NAME))?;
        let contents = std::fs::read_to_string(&path)?;
        Self::parse(path, &contents)
    }

    /// Parse a config read from `path`.
    pub fn parse(path: impl AsRef<Path>, contents: &str) -> Result<Self, OcrError> {
        let path = path.as_ref().to_path_buf();
        let value = serde_json::from_str(contents).map_err(|source| OcrError::ModelConfig {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, value })
    }

    /// The file this config was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The top level `model_type`
    pub fn model_type(&self) -> Option<&str> {
        self.value.get("model_type").and_then(Value::as_str)
    }

    /// The `model_type` of the decoder in an encoder-decoder checkpoint
    pub fn decoder_model_type(&self) -> Option<&str> {
        self.value
            .get("decoder")
            .and_then(|decoder| decoder.get("model_type"))
            .and_then(Value::as_str)
    }

    /// Whether the checkpoint maps its classes to custom code shipped in the repository.
    pub fn declares_remote_code(&self) -> bool {
        self.value.get("auto_map").is_some_and(|map| !map.is_null())
    }

    /// Deserialize the whole config into an architecture specific type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, OcrError> {
        T::deserialize(&self.value).map_err(|source| OcrError::ModelConfig {
            path: self.path.clone(),
            source,
        })
    }
}

/// Refuse checkpoints that declare custom code unless the caller trusts them.
///
/// Custom code is never executed. A trusted checkpoint still has to match a native architecture.
pub fn check_remote_code(
    config: &PretrainedConfig,
    location: &ModelLocation,
    trust_remote_code: bool,
) -> Result<(), OcrError> {
    if !config.declares_remote_code() {
        return Ok(());
    }
    if !trust_remote_code {
        return Err(OcrError::RemoteCodeNotTrusted {
            model: location.to_string(),
        });
    }
    tracing::warn!("{location} declares custom model code, loading it with the native implementation instead");
    Ok(())
}

/// The model architectures with a native implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// A ViT encoder with a TrOCR text decoder
    TrOcr,
}

impl Architecture {
    /// Pick the architecture a config describes.
    pub fn detect(config: &PretrainedConfig) -> Result<Self, OcrError> {
        match (config.model_type(), config.decoder_model_type()) {
            (Some("vision-encoder-decoder"), Some("trocr")) => Ok(Self::TrOcr),
            (Some("vision-encoder-decoder"), decoder) => Err(OcrError::UnsupportedArchitecture(
                format!("vision-encoder-decoder/{}", decoder.unwrap_or("unknown")),
            )),
            (Some(model_type), _) => Err(OcrError::UnsupportedArchitecture(model_type.into())),
            (None, _) => Err(OcrError::MissingModelType(config.path().to_path_buf())),
        }
    }

    /// The tokenizer to use when the checkpoint does not ship a `tokenizer.json`.
    pub fn fallback_tokenizer(self) -> Option<FileSource> {
        match self {
            // The TrOCR checkpoints only ship the slow BPE vocabulary
            Self::TrOcr => Some(FileSource::huggingface(
                "ToluClassics/candle-trocr-tokenizer",
                "main",
                "tokenizer.json",
            )),
        }
    }
}
