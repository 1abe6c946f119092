use crate::config::PretrainedConfig;
use crate::grounding::{self, RecognizedLine};
use crate::image_processor::{ProcessorConfig, ViTImageProcessor};
use crate::{layout, OcrError, OcrInferenceSettings, OcrModel};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::{trocr, vit};
use image::DynamicImage;
use ocr_common::{maybe_autoreleasepool, Cache, ModelLocation};
use tokenizers::Tokenizer;

#[derive(serde::Deserialize)]
struct TrOcrConfig {
    encoder: vit::Config,
    decoder: trocr::TrOCRConfig,
}

/// A [TrOCR](https://huggingface.co/docs/transformers/model_doc/trocr) checkpoint.
///
/// TrOCR reads a single line of text, so pages are split into lines first and each line is decoded on
/// its own.
pub(crate) struct TrOcr {
    device: Device,
    dtype: DType,
    model: trocr::TrOCRModel,
    decoder_config: trocr::TrOCRConfig,
    processor: ViTImageProcessor,
}

impl TrOcr {
    pub(crate) const WEIGHTS: &'static str = "model.safetensors";

    pub(crate) fn load(
        cache: &Cache,
        location: &ModelLocation,
        config: &PretrainedConfig,
        device: &Device,
        dtype: DType,
    ) -> Result<Self, OcrError> {
        let TrOcrConfig { encoder, decoder } = config.deserialize()?;

        let weights = cache.get(&location.file(Self::WEIGHTS))?;
        tracing::debug!("Loading {} as {dtype:?}", weights.display());
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], dtype, device)? };
        Self::new(&encoder, decoder, vb)
    }

    fn new(
        encoder: &vit::Config,
        decoder: trocr::TrOCRConfig,
        vb: VarBuilder,
    ) -> Result<Self, OcrError> {
        let device = vb.device().clone();
        let dtype = vb.dtype();
        let model = trocr::TrOCRModel::new(encoder, &decoder, vb)?;
        let processor = ViTImageProcessor::new(&ProcessorConfig::square(encoder.image_size as u32));

        Ok(Self {
            device,
            dtype,
            model,
            decoder_config: decoder,
            processor,
        })
    }

    fn recognize_line(
        &mut self,
        tokenizer: &Tokenizer,
        line: &DynamicImage,
        max_new_tokens: usize,
    ) -> Result<String, OcrError> {
        self.model.reset_kv_cache();

        let pixel_values = self
            .processor
            .preprocess(std::slice::from_ref(line))?
            .to_device(&self.device)?
            .to_dtype(self.dtype)?;
        let encoder_xs = self.model.encoder().forward(&pixel_values)?;

        let mut logits_processor = LogitsProcessor::new(1337, None, None);

        let mut token_ids: Vec<u32> = vec![self.decoder_config.decoder_start_token_id];
        for index in 0..max_new_tokens {
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let mask = causal_mask(input_ids.dim(1)?, self.dtype, &self.device)?;

            let logits =
                self.model
                    .decoder()
                    .forward(&input_ids, Some(&encoder_xs), start_pos, &mask)?;

            let logits = logits.squeeze(0)?;
            let last = logits.dim(0)?.checked_sub(1).ok_or_else(|| {
                candle_core::Error::Msg("the decoder returned no positions".into())
            })?;
            let logits = logits.get(last)?;
            let token = logits_processor.sample(&logits)?;
            tracing::trace!("Sampled token {token} at {index}");
            token_ids.push(token);

            if token == self.decoder_config.eos_token_id {
                break;
            }
        }

        tokenizer
            .decode(&token_ids, true)
            .map_err(|err| OcrError::Tokenizer(err.to_string()))
    }

    /// The most tokens one line may decode to, bounded by the learned position table.
    fn token_limit(&self, requested: Option<usize>) -> usize {
        let positions = self.decoder_config.max_position_embeddings.saturating_sub(1);
        requested.map_or(positions, |requested| requested.min(positions))
    }
}

impl OcrModel for TrOcr {
    fn infer(
        &mut self,
        tokenizer: &Tokenizer,
        settings: &OcrInferenceSettings,
    ) -> Result<String, OcrError> {
        settings.validate()?;
        let prompt = settings.prompt();
        if !prompt.instruction().is_empty() {
            tracing::debug!(
                instruction = prompt.instruction(),
                "TrOCR is not text conditioned, the instruction is not used"
            );
        }

        let page = layout::page_view(settings.image(), settings.base_size());
        let regions = layout::text_lines(&page.to_luma8(), settings.image_size());
        tracing::debug!("Found {} text regions", regions.len());

        let max_new_tokens = self.token_limit(settings.max_new_tokens());
        let mut lines = Vec::with_capacity(regions.len());
        for region in regions {
            let crop = page.crop_imm(region.x, region.y, region.width, region.height);
            let text =
                maybe_autoreleasepool(|| self.recognize_line(tokenizer, &crop, max_new_tokens))?;
            let text = text.trim();
            if !text.is_empty() {
                lines.push(RecognizedLine {
                    region,
                    text: text.to_string(),
                });
            }
        }

        Ok(grounding::render(
            &lines,
            (page.width(), page.height()),
            prompt.grounding(),
        ))
    }
}

/// A `(len, len)` mask hiding future positions, in the model's dtype.
fn causal_mask(len: usize, dtype: DType, device: &Device) -> candle_core::Result<Tensor> {
    let mask: Vec<f32> = (0..len)
        .flat_map(|i| (0..len).map(move |j| if j > i { f32::NEG_INFINITY } else { 0. }))
        .collect();
    Tensor::from_vec(mask, (len, len), device)?.to_dtype(dtype)
}
