use crate::{InferenceRequest, RunnerOptions};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use ocr_common::Precision;
use ocr_models::OcrInferenceSettings;
use std::path::PathBuf;

/// The prompt used when none is given.
pub const DEFAULT_PROMPT: &str = "<image>\n<|grounding|>Extract all text from this document.";

/// The model used when none is given.
pub const DEFAULT_MODEL: &str = "microsoft/trocr-base-printed@refs/pr/7";

/// Read the text in an image with a pretrained OCR model and print the result as JSON.
#[derive(Parser, Debug, Clone)]
#[command(name = "ocr-runner", version, about)]
pub struct Args {
    /// The image to read
    pub image_path: PathBuf,

    /// The prompt passed to the model
    #[arg(long, default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// A hub repository (`owner/name[@revision]`) or a local model directory
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Allow checkpoints that declare custom model code
    #[arg(
        long,
        env = "OCR_TRUST_REMOTE_CODE",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub trust_remote_code: bool,

    /// Run on the CPU even if an accelerator is available
    #[arg(long)]
    pub cpu: bool,

    /// The precision weights are loaded in: auto, f32, f16 or bf16
    #[arg(long, default_value = "auto")]
    pub precision: Precision,

    /// The longest side of the page view in pixels
    #[arg(long, default_value_t = OcrInferenceSettings::DEFAULT_BASE_SIZE)]
    pub base_size: u32,

    /// The widest region read at once in pixels
    #[arg(long, default_value_t = OcrInferenceSettings::DEFAULT_IMAGE_SIZE)]
    pub image_size: u32,

    /// A tokenizer.json file, or a directory or hub repository containing one
    #[arg(long)]
    pub tokenizer: Option<String>,

    /// The most tokens each text region may decode to
    #[arg(long)]
    pub max_new_tokens: Option<usize>,

    /// Only use hub files that are already cached
    #[arg(
        long,
        env = "HF_HUB_OFFLINE",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub offline: bool,

    /// The hub cache directory
    #[arg(long, env = "OCR_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl Args {
    /// The image, prompt and model to run.
    pub fn request(&self) -> InferenceRequest {
        InferenceRequest {
            image_path: self.image_path.clone(),
            prompt: self.prompt.clone(),
            model_identifier: self.model.clone(),
        }
    }

    /// How the model is loaded and run.
    pub fn options(&self) -> RunnerOptions {
        RunnerOptions {
            trust_remote_code: self.trust_remote_code,
            cpu: self.cpu,
            precision: self.precision,
            base_size: self.base_size,
            image_size: self.image_size,
            max_new_tokens: self.max_new_tokens,
            tokenizer: self.tokenizer.clone(),
            offline: self.offline,
            cache_dir: self.cache_dir.clone(),
        }
    }
}
