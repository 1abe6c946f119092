//! # OCR Models
//!
//! Load a pretrained OCR checkpoint by identifier and read the text in an image.
//!
//! The checkpoint's `config.json` picks the implementation. Checkpoints that declare custom code are refused
//! unless remote code is explicitly trusted, and that code is never run: the checkpoint must still match an
//! architecture implemented here.
//!
//! ## Usage
//!
//! ```rust, no_run
//! use ocr_models::*;
//!
//! let mut model = Ocr::builder().build().unwrap();
//! let settings = OcrInferenceSettings::open("page.png")
//!     .unwrap()
//!     .with_prompt("<image>\n<|grounding|>Extract all text from this document.");
//! let text = model.recognize_text(&settings).unwrap();
//!
//! println!("{}", text);
//! ```

#![warn(missing_docs)]
#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

mod config;
pub use config::*;
mod error;
pub use error::*;
mod grounding;
pub use grounding::{RecognizedLine, COORDINATE_BINS};
mod image_processor;
pub mod layout;
mod prompt;
pub use prompt::*;
mod trocr;

use candle_core::{DType, Device};
use image::DynamicImage;
use ocr_common::{
    accelerated_device_if_available, device_name, dtype_supported, Cache, FileSource, ModelLocation,
    Precision,
};
use std::path::Path;
use tokenizers::Tokenizer;

/// A loaded OCR model.
pub trait OcrModel {
    /// Read the text in the image described by `settings`.
    fn infer(
        &mut self,
        tokenizer: &Tokenizer,
        settings: &OcrInferenceSettings,
    ) -> Result<String, OcrError>;
}

impl Architecture {
    fn load(
        self,
        cache: &Cache,
        location: &ModelLocation,
        config: &PretrainedConfig,
        device: &Device,
        dtype: DType,
    ) -> Result<Box<dyn OcrModel>, OcrError> {
        match self {
            Self::TrOcr => Ok(Box::new(trocr::TrOcr::load(
                cache, location, config, device, dtype,
            )?)),
        }
    }
}

/// A builder for [`Ocr`].
#[derive(Default)]
pub struct OcrBuilder {
    source: OcrSource,

    cpu: bool,

    precision: Precision,

    trust_remote_code: bool,

    cache: Cache,
}

impl OcrBuilder {
    /// Sets the source of the model.
    pub fn source(mut self, source: OcrSource) -> Self {
        self.source = source;
        self
    }

    /// Set to true to run the model on CPU.
    pub fn cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }

    /// Sets the precision the weights are loaded in.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set to true to allow checkpoints that declare custom model code.
    pub fn trust_remote_code(mut self, trust_remote_code: bool) -> Self {
        self.trust_remote_code = trust_remote_code;
        self
    }

    /// Sets the cache model files are resolved through.
    pub fn cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    /// Builds the [`Ocr`] model.
    pub fn build(self) -> Result<Ocr, OcrError> {
        Ocr::new(self)
    }
}

/// The source of the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OcrSource {
    model: ModelLocation,
    tokenizer: Option<FileSource>,
}

impl OcrSource {
    /// Creates a new [`OcrSource`].
    pub fn new(model: ModelLocation) -> Self {
        Self {
            model,
            tokenizer: None,
        }
    }

    /// Creates a new [`OcrSource`] from a model identifier, a hub repository or a local directory.
    pub fn from_identifier(identifier: &str) -> Result<Self, OcrError> {
        Ok(Self::new(ModelLocation::parse(identifier)?))
    }

    /// Sets the tokenizer file, instead of the one next to the model.
    pub fn with_tokenizer(mut self, tokenizer: FileSource) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Sets the tokenizer from an identifier: a `tokenizer.json` file, or a directory or hub repository
    /// containing one.
    pub fn with_tokenizer_identifier(self, identifier: &str) -> Result<Self, OcrError> {
        let path = Path::new(identifier);
        let tokenizer = if path.is_file() {
            FileSource::local(path.to_path_buf())
        } else {
            ModelLocation::parse(identifier)?.file(TOKENIZER_FILE)
        };
        Ok(self.with_tokenizer(tokenizer))
    }

    /// The model location
    pub fn model(&self) -> &ModelLocation {
        &self.model
    }

    /// Create the base printed text model source.
    pub fn base_printed() -> Self {
        Self::new(ModelLocation::hub("microsoft/trocr-base-printed", "refs/pr/7"))
    }

    fn tokenizer(&self, cache: &Cache, architecture: Architecture) -> Result<Tokenizer, OcrError> {
        let path = match &self.tokenizer {
            Some(tokenizer) => cache.get(tokenizer)?,
            None => match cache.get(&self.model.file(TOKENIZER_FILE)) {
                Ok(path) => path,
                Err(err) => match architecture.fallback_tokenizer() {
                    Some(fallback) => {
                        tracing::debug!("No tokenizer next to {} ({err}), using {fallback}", self.model);
                        cache.get(&fallback)?
                    }
                    None => return Err(err.into()),
                },
            },
        };
        Tokenizer::from_file(&path).map_err(|err| OcrError::Tokenizer(err.to_string()))
    }
}

impl Default for OcrSource {
    fn default() -> Self {
        Self::base_printed()
    }
}

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Settings for running inference on [`Ocr`].
#[derive(Clone, Debug)]
pub struct OcrInferenceSettings {
    image: DynamicImage,
    prompt: Prompt,
    base_size: u32,
    image_size: u32,
    max_new_tokens: Option<usize>,
}

impl OcrInferenceSettings {
    /// The longest side of the page view, in pixels.
    pub const DEFAULT_BASE_SIZE: u32 = 1024;
    /// The widest region read at once, in pixels of the page view.
    pub const DEFAULT_IMAGE_SIZE: u32 = 640;

    /// Creates a new [`OcrInferenceSettings`] from an image.
    pub fn new(image: impl Into<DynamicImage>) -> Self {
        Self {
            image: image.into(),
            prompt: Prompt::new(""),
            base_size: Self::DEFAULT_BASE_SIZE,
            image_size: Self::DEFAULT_IMAGE_SIZE,
            max_new_tokens: None,
        }
    }

    /// Creates a new [`OcrInferenceSettings`] from an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OcrError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(OcrError::ImageNotFound(path.to_path_buf()));
        }
        let image = image::open(path).map_err(|source| OcrError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(image))
    }

    /// Set the prompt.
    pub fn with_prompt(mut self, prompt: impl Into<Prompt>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the longest side of the page view.
    pub fn with_base_size(mut self, base_size: u32) -> Self {
        self.base_size = base_size;
        self
    }

    /// Set the widest region read at once.
    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }

    /// Limit how many tokens each region may decode to.
    pub fn with_max_new_tokens(mut self, max_new_tokens: Option<usize>) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// Check the sizes are usable.
    pub fn validate(&self) -> Result<(), OcrError> {
        if self.base_size == 0 || self.image_size == 0 {
            return Err(OcrError::InvalidSettings(format!(
                "base size ({}) and image size ({}) must be greater than zero",
                self.base_size, self.image_size
            )));
        }
        if self.max_new_tokens == Some(0) {
            return Err(OcrError::InvalidSettings(
                "max new tokens must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The image to read
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// The prompt
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    /// The longest side of the page view
    pub fn base_size(&self) -> u32 {
        self.base_size
    }

    /// The widest region read at once
    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// The per region token limit, if any
    pub fn max_new_tokens(&self) -> Option<usize> {
        self.max_new_tokens
    }
}

/// A pretrained OCR model with its tokenizer, placed on a device.
pub struct Ocr {
    device: Device,
    dtype: DType,
    tokenizer: Tokenizer,
    model: Box<dyn OcrModel>,
}

impl Ocr {
    /// Creates a new [`OcrBuilder`].
    pub fn builder() -> OcrBuilder {
        OcrBuilder::default()
    }

    fn new(settings: OcrBuilder) -> Result<Self, OcrError> {
        let OcrBuilder {
            source,
            cpu,
            precision,
            trust_remote_code,
            cache,
        } = settings;

        let config = PretrainedConfig::load(&cache, source.model())?;
        check_remote_code(&config, source.model(), trust_remote_code)?;
        let architecture = Architecture::detect(&config)?;
        tracing::debug!("Loading {} as {architecture:?}", source.model());

        let device = accelerated_device_if_available(cpu)?;
        let dtype = precision.dtype(&device);
        if !dtype_supported(dtype, &device) {
            return Err(OcrError::InvalidSettings(format!(
                "{precision} precision is not supported on {}",
                device_name(&device)
            )));
        }

        let tokenizer = source.tokenizer(&cache, architecture)?;

        let model = architecture.load(&cache, source.model(), &config, &device, dtype)?;

        Ok(Self {
            device,
            dtype,
            tokenizer,
            model,
        })
    }

    /// The device the model runs on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The dtype the weights were loaded in
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Read the text in an image.
    ///
    /// # Example
    /// ```rust, no_run
    /// use ocr_models::*;
    ///
    /// let mut model = Ocr::builder().build().unwrap();
    /// let settings = OcrInferenceSettings::open("receipt.png").unwrap();
    /// let text = model.recognize_text(&settings).unwrap();
    ///
    /// println!("{}", text);
    /// ```
    pub fn recognize_text(&mut self, settings: &OcrInferenceSettings) -> Result<String, OcrError> {
        self.model.infer(&self.tokenizer, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ocr-models-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_images_are_reported_before_decoding() {
        let missing = scratch_dir("missing-image").join("page.png");
        let err = OcrInferenceSettings::open(&missing).unwrap_err();
        assert_eq!(err.kind(), "ImageNotFound");
        assert!(err.to_string().contains("page.png"));
    }

    #[test]
    fn unreadable_images_fail_to_decode() {
        let path = scratch_dir("bad-image").join("page.png");
        std::fs::write(&path, b"not a png").unwrap();
        let err = OcrInferenceSettings::open(&path).unwrap_err();
        assert_eq!(err.kind(), "ImageDecode");
    }

    #[test]
    fn settings_default_to_the_documented_sizes() -> anyhow::Result<()> {
        let path = scratch_dir("settings").join("page.png");
        GrayImage::from_pixel(8, 8, Luma([255])).save(&path)?;

        let settings = OcrInferenceSettings::open(&path)?.with_prompt("<image>\nFree OCR.");
        assert_eq!(settings.base_size(), 1024);
        assert_eq!(settings.image_size(), 640);
        assert_eq!(settings.prompt().instruction(), "Free OCR.");
        assert_eq!(settings.image().width(), 8);
        settings.validate()?;

        let zero = settings.clone().with_image_size(0).validate().unwrap_err();
        assert_eq!(zero.kind(), "InvalidSettings");
        let zero = settings.with_max_new_tokens(Some(0)).validate().unwrap_err();
        assert_eq!(zero.kind(), "InvalidSettings");
        Ok(())
    }

    #[test]
    fn tokenizer_identifiers_resolve_to_tokenizer_json() -> anyhow::Result<()> {
        let source = OcrSource::default().with_tokenizer_identifier("ToluClassics/candle-trocr-tokenizer")?;
        assert_eq!(
            source.tokenizer,
            Some(FileSource::huggingface(
                "ToluClassics/candle-trocr-tokenizer",
                "main",
                "tokenizer.json"
            ))
        );

        let file = scratch_dir("tokenizer").join("tokenizer.json");
        std::fs::write(&file, "{}")?;
        let source = OcrSource::default().with_tokenizer_identifier(file.to_str().unwrap())?;
        assert_eq!(source.tokenizer, Some(FileSource::local(file)));
        Ok(())
    }

    #[test]
    fn builds_fail_on_local_models_without_config() {
        let dir = scratch_dir("empty-model");
        let source = OcrSource::from_identifier(dir.to_str().unwrap()).unwrap();
        let err = Ocr::builder().source(source).cpu(true).build().err().unwrap();
        assert_eq!(err.kind(), "ModelFileNotFound");
    }

    #[test]
    fn bf16_is_refused_on_the_cpu() -> anyhow::Result<()> {
        let dir = scratch_dir("bf16-cpu");
        std::fs::write(
            dir.join("config.json"),
            r#"{ "model_type": "vision-encoder-decoder", "decoder": { "model_type": "trocr" } }"#,
        )?;
        let source = OcrSource::from_identifier(dir.to_str().unwrap())?;
        let err = Ocr::builder()
            .source(source)
            .cpu(true)
            .precision(Precision::BF16)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), "InvalidSettings");
        assert!(err.to_string().contains("bf16"));
        Ok(())
    }

    #[test]
    fn builds_refuse_untrusted_remote_code() -> anyhow::Result<()> {
        let dir = scratch_dir("remote-code");
        std::fs::write(
            dir.join("config.json"),
            r#"{ "model_type": "deepseek_vl_v2", "auto_map": { "AutoModel": "modeling.Model" } }"#,
        )?;
        let source = OcrSource::from_identifier(dir.to_str().unwrap())?;

        let err = Ocr::builder().source(source.clone()).cpu(true).build().err().unwrap();
        assert_eq!(err.kind(), "RemoteCodeNotTrusted");

        let err = Ocr::builder()
            .source(source)
            .cpu(true)
            .trust_remote_code(true)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), "UnsupportedArchitecture");
        Ok(())
    }
}
