use ocr_common::{device_name, Cache, Precision};
use ocr_models::{Ocr, OcrError, OcrInferenceSettings, OcrSource};
use serde::Serialize;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

/// The confidence reported with every result. The models do not produce a score, so this is a fixed
/// placeholder.
pub const CONFIDENCE_PLACEHOLDER: f64 = 0.85;

/// One image to read with one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    /// The image file
    pub image_path: PathBuf,
    /// The prompt passed to the model
    pub prompt: String,
    /// A hub repository (`owner/name[@revision]`) or a local model directory
    pub model_identifier: String,
}

/// Everything besides the request that changes how a run behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Allow checkpoints that declare custom model code
    pub trust_remote_code: bool,
    /// Never use an accelerator
    pub cpu: bool,
    /// The precision weights are loaded in
    pub precision: Precision,
    /// The longest side of the page view
    pub base_size: u32,
    /// The widest region read at once
    pub image_size: u32,
    /// The per region token limit
    pub max_new_tokens: Option<usize>,
    /// Use this tokenizer instead of the model's
    pub tokenizer: Option<String>,
    /// Only use hub files that are already cached
    pub offline: bool,
    /// The hub cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            trust_remote_code: false,
            cpu: false,
            precision: Precision::default(),
            base_size: OcrInferenceSettings::DEFAULT_BASE_SIZE,
            image_size: OcrInferenceSettings::DEFAULT_IMAGE_SIZE,
            max_new_tokens: None,
            tokenizer: None,
            offline: false,
            cache_dir: None,
        }
    }
}

impl RunnerOptions {
    fn cache(&self) -> Cache {
        let cache = match &self.cache_dir {
            Some(location) => Cache::new(location.clone()),
            None => Cache::default(),
        };
        cache.with_offline(self.offline)
    }
}

/// The text read from an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    /// The recognized text
    pub text: String,
    /// Always [`CONFIDENCE_PLACEHOLDER`]
    pub confidence: f64,
    /// Which model ran where
    pub metadata: InferenceMetadata,
}

/// Which model produced a result, and on which device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceMetadata {
    /// The model identifier as requested
    pub model: String,
    /// `cuda`, `metal` or `cpu`
    pub device: String,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceError {
    /// A human readable message
    #[serde(rename = "error")]
    pub message: String,
    /// A stable name for the kind of failure
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&OcrError> for InferenceError {
    fn from(err: &OcrError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

impl InferenceError {
    fn serialization(err: serde_json::Error) -> Self {
        Self {
            message: err.to_string(),
            kind: "Serialization".to_string(),
        }
    }

    fn output(err: std::io::Error) -> Self {
        Self {
            message: err.to_string(),
            kind: "Output".to_string(),
        }
    }

    /// The error as one line of JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            serde_json::json!({ "error": self.message, "type": self.kind }).to_string()
        })
    }
}

/// The result of one run: exactly one of a result or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The model read the image
    Success(InferenceResult),
    /// Something failed along the way
    Failure(InferenceError),
}

impl Outcome {
    /// The process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success(_) => 0,
            Self::Failure(_) => 1,
        }
    }

    /// Write the outcome as one JSON line, results to `stdout` and errors to `stderr`, and return the exit
    /// code.
    ///
    /// A result that cannot be serialized or written is reported as an error instead.
    pub fn emit(&self, stdout: &mut impl Write, stderr: &mut impl Write) -> u8 {
        let failure = match self {
            Self::Success(result) => {
                let written = serde_json::to_string(result)
                    .map_err(InferenceError::serialization)
                    .and_then(|json| {
                        writeln!(stdout, "{json}")
                            .and_then(|_| stdout.flush())
                            .map_err(InferenceError::output)
                    });
                match written {
                    Ok(()) => return 0,
                    Err(err) => err,
                }
            }
            Self::Failure(err) => err.clone(),
        };
        if let Err(err) = writeln!(stderr, "{}", failure.to_json()).and_then(|_| stderr.flush()) {
            tracing::error!("Failed to report the error: {err}");
        }
        1
    }
}

/// Load the requested model, read the image, and capture the result or the failure.
///
/// Panics in the model stack are captured as failures too.
pub fn run(request: &InferenceRequest, options: &RunnerOptions) -> Outcome {
    match catch_panic(|| infer(request, options)) {
        Ok(Ok(result)) => Outcome::Success(result),
        Ok(Err(err)) => {
            tracing::debug!("Inference failed: {err:?}");
            Outcome::Failure(InferenceError::from(&err))
        }
        Err(err) => Outcome::Failure(err),
    }
}

fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, InferenceError> {
    // Nothing observes the model state after a panic, the process exits right after
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        InferenceError {
            message: format!("Inference panicked: {message}"),
            kind: "Panic".to_string(),
        }
    })
}

fn infer(request: &InferenceRequest, options: &RunnerOptions) -> Result<InferenceResult, OcrError> {
    // Reading the image first keeps a bad path from paying for a model download
    let settings = OcrInferenceSettings::open(&request.image_path)?
        .with_prompt(request.prompt.as_str())
        .with_base_size(options.base_size)
        .with_image_size(options.image_size)
        .with_max_new_tokens(options.max_new_tokens);
    settings.validate()?;

    let mut source = OcrSource::from_identifier(&request.model_identifier)?;
    if let Some(tokenizer) = &options.tokenizer {
        source = source.with_tokenizer_identifier(tokenizer)?;
    }

    let mut model = Ocr::builder()
        .source(source)
        .cpu(options.cpu)
        .precision(options.precision)
        .trust_remote_code(options.trust_remote_code)
        .cache(options.cache())
        .build()?;
    tracing::debug!(
        "Running {} on {} as {:?} (requested {})",
        request.model_identifier,
        device_name(model.device()),
        model.dtype(),
        options.precision
    );

    let text = model.recognize_text(&settings)?;

    Ok(InferenceResult {
        text,
        confidence: CONFIDENCE_PLACEHOLDER,
        metadata: InferenceMetadata {
            model: request.model_identifier.clone(),
            device: device_name(model.device()).to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn success() -> Outcome {
        Outcome::Success(InferenceResult {
            text: "Hello\nWorld".into(),
            confidence: CONFIDENCE_PLACEHOLDER,
            metadata: InferenceMetadata {
                model: "microsoft/trocr-base-printed@refs/pr/7".into(),
                device: "cpu".into(),
            },
        })
    }

    fn emit(outcome: &Outcome) -> (u8, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = outcome.emit(&mut stdout, &mut stderr);
        (
            code,
            String::from_utf8(stdout).unwrap(),
            String::from_utf8(stderr).unwrap(),
        )
    }

    #[test]
    fn results_go_to_stdout() {
        let (code, stdout, stderr) = emit(&success());
        assert_eq!(code, 0);
        assert_eq!(stderr, "");
        assert!(stdout.ends_with('\n'));
        assert_eq!(stdout.lines().count(), 1);

        let value: Value = serde_json::from_str(&stdout).unwrap();
        assert_eq!(
            value,
            json!({
                "text": "Hello\nWorld",
                "confidence": 0.85,
                "metadata": {
                    "model": "microsoft/trocr-base-printed@refs/pr/7",
                    "device": "cpu"
                }
            })
        );
    }

    #[test]
    fn errors_go_to_stderr() {
        let outcome = Outcome::Failure(InferenceError {
            message: "Image file missing.png does not exist".into(),
            kind: "ImageNotFound".into(),
        });
        let (code, stdout, stderr) = emit(&outcome);
        assert_eq!(code, 1);
        assert_eq!(stdout, "");

        let value: Value = serde_json::from_str(&stderr).unwrap();
        assert_eq!(
            value,
            json!({ "error": "Image file missing.png does not exist", "type": "ImageNotFound" })
        );
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unwritable_results_become_errors() {
        let mut stderr = Vec::new();
        let code = success().emit(&mut ClosedPipe, &mut stderr);
        assert_eq!(code, 1);

        let value: Value = serde_json::from_slice(&stderr).unwrap();
        assert_eq!(value["type"], "Output");
        assert!(value["error"].is_string());
    }

    #[test]
    fn missing_images_fail_without_loading_a_model() {
        let request = InferenceRequest {
            image_path: std::env::temp_dir().join("ocr-runner-missing-image.png"),
            prompt: crate::DEFAULT_PROMPT.into(),
            model_identifier: "deepseek-ai/DeepSeek-OCR".into(),
        };
        let options = RunnerOptions {
            offline: true,
            ..RunnerOptions::default()
        };
        match run(&request, &options) {
            Outcome::Failure(err) => assert_eq!(err.kind, "ImageNotFound"),
            Outcome::Success(result) => panic!("unexpected result {result:?}"),
        }
    }

    #[test]
    fn panics_become_failures() {
        let err = catch_panic(|| -> u32 { panic!("attempt to divide by zero") }).unwrap_err();
        assert_eq!(
            err,
            InferenceError {
                message: "Inference panicked: attempt to divide by zero".into(),
                kind: "Panic".into(),
            }
        );

        let index = 7;
        let err = catch_panic(|| -> u32 { panic!("index {index} out of range") }).unwrap_err();
        assert_eq!(err.message, "Inference panicked: index 7 out of range");

        assert_eq!(catch_panic(|| 42), Ok(42));
    }

    #[test]
    fn error_kinds_come_from_the_library() {
        let err = OcrError::UnsupportedArchitecture("deepseek_vl_v2".into());
        assert_eq!(
            InferenceError::from(&err),
            InferenceError {
                message: "Unsupported model architecture `deepseek_vl_v2`".into(),
                kind: "UnsupportedArchitecture".into(),
            }
        );
    }
}
