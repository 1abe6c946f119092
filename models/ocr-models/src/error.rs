use ocr_common::{CacheError, ModelIdentifierError};
use std::path::PathBuf;

/// An error loading or running an OCR model.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// The image path does not point at a file
    #[error("Image file {} does not exist", .0.display())]
    ImageNotFound(PathBuf),
    /// The image could not be read or decoded
    #[error("Failed to read image {}: {source}", .path.display())]
    ImageDecode {
        /// The image that failed to load
        path: PathBuf,
        /// The underlying decoder error
        #[source]
        source: image::ImageError,
    },
    /// The model identifier could not be parsed
    #[error("Invalid model identifier: {0}")]
    InvalidModelIdentifier(#[from] ModelIdentifierError),
    /// A model file could not be resolved
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// A model config file is not valid
    #[error("Invalid model config {}: {source}", .path.display())]
    ModelConfig {
        /// The config file
        path: PathBuf,
        /// The parse error
        #[source]
        source: serde_json::Error,
    },
    /// A model config file does not name its architecture
    #[error("Model config {} has no `model_type`", .0.display())]
    MissingModelType(PathBuf),
    /// The checkpoint ships custom code and loading it was not explicitly allowed
    #[error("{model} declares custom model code; loading it requires trusting remote code")]
    RemoteCodeNotTrusted {
        /// The model that declares custom code
        model: String,
    },
    /// No native implementation exists for the checkpoint's architecture
    #[error("Unsupported model architecture `{0}`")]
    UnsupportedArchitecture(String),
    /// The tokenizer could not be loaded or failed to decode
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    /// The model failed while loading weights or running
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    /// The inference settings are out of range
    #[error("Invalid inference settings: {0}")]
    InvalidSettings(String),
    /// An IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OcrError {
    /// A stable name for the kind of failure, independent of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageNotFound(_) => "ImageNotFound",
            Self::ImageDecode { .. } => "ImageDecode",
            Self::InvalidModelIdentifier(_) => "InvalidModelIdentifier",
            Self::Cache(CacheError::HuggingFaceApi(_)) => "HubApi",
            Self::Cache(CacheError::MissingLocalFile(_)) => "ModelFileNotFound",
            Self::Cache(CacheError::NotCached(_)) => "NotCached",
            Self::ModelConfig { .. } | Self::MissingModelType(_) => "ModelConfig",
            Self::RemoteCodeNotTrusted { .. } => "RemoteCodeNotTrusted",
            Self::UnsupportedArchitecture(_) => "UnsupportedArchitecture",
            Self::Tokenizer(_) => "Tokenizer",
            Self::Candle(_) => "Candle",
            Self::InvalidSettings(_) => "InvalidSettings",
            Self::Io(_) => "Io",
        }
    }
}
