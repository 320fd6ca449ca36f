//! Built-in model catalog
//!
//! Each entry binds a user-facing model id to one adapter, the vendor's model
//! reference and a fixed parameter profile.

use std::io::Cursor;

use deckforge_protocol::Modality;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{Map, Value, json};

use super::error::Result;
use super::error::ProviderError;
use super::providers::{google, replicate, xai};
use super::types::{InvokeParams, InvokeRequest, ReferenceImage};

/// Prompt used to probe text models.
pub const TEXT_PROBE_PROMPT: &str = "Generate one word.";
/// System prompt used to probe text models.
pub const TEXT_PROBE_SYSTEM: &str = "Respond briefly.";
/// Token budget of a text probe.
pub const TEXT_PROBE_MAX_TOKENS: u32 = 10;
/// Prompt used to probe image models.
pub const IMAGE_PROBE_PROMPT: &str = "a simple circle";

const PRESENTATION_TEMPLATE: &str = "a photo in the context of a PowerPoint presentation about {prompt}, professional style with soft lighting, high resolution and exceptional clarity";
const FACE_TEMPLATE: &str = "A person img {prompt}, photo in the context of a PowerPoint presentation";
const NEGATIVE_BASIC: &str = "bad quality, worst quality, text, signature, watermark, extra limbs, schematic, diagram, graph, chart, table, text, logo, watermark, comparative, infographic";
const NEGATIVE_FACE: &str = "lowres, bad anatomy, bad hands, text, error, missing fingers, extra digit, fewer digits, cropped, worst quality, low quality, jpeg artifacts, signature, watermark, username, blurry";

/// One model the registry can resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
  /// User-facing id, e.g. `hyper-flux-16step`
  pub id: String,
  pub display_name: String,
  /// Adapter serving this model
  pub provider_id: String,
  /// Vendor-side model reference
  pub vendor_model: String,
  pub profile: ModelProfile,
}

/// Fixed per-model parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelProfile {
  Text(TextProfile),
  Image(ImageProfile),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextProfile {
  /// Extra vendor input sent with every call
  pub input: Map<String, Value>,
  /// Input key for the token budget when the vendor does not use `max_tokens`
  pub max_tokens_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageProfile {
  /// Extra vendor input sent with every call
  pub input: Map<String, Value>,
  /// Keys replaced during a probe to keep it cheap
  pub probe_input: Map<String, Value>,
  /// Prompt wrapper; `{prompt}` is replaced by the translated image prompt
  pub prompt_template: String,
  /// Input key receiving the reference image data URI
  pub reference_image_key: Option<String>,
}

impl ModelEntry {
  pub fn text(id: &str, display_name: &str, provider_id: &str, vendor_model: &str) -> Self {
    Self {
      id: id.to_string(),
      display_name: display_name.to_string(),
      provider_id: provider_id.to_string(),
      vendor_model: vendor_model.to_string(),
      profile: ModelProfile::Text(TextProfile::default()),
    }
  }

  pub fn image(id: &str, display_name: &str, provider_id: &str, vendor_model: &str) -> Self {
    Self {
      id: id.to_string(),
      display_name: display_name.to_string(),
      provider_id: provider_id.to_string(),
      vendor_model: vendor_model.to_string(),
      profile: ModelProfile::Image(ImageProfile {
        input: Map::new(),
        probe_input: Map::new(),
        prompt_template: PRESENTATION_TEMPLATE.to_string(),
        reference_image_key: None,
      }),
    }
  }

  /// Merge fixed vendor input into the profile.
  pub fn with_input(mut self, input: Value) -> Self {
    let target = match &mut self.profile {
      ModelProfile::Text(profile) => &mut profile.input,
      ModelProfile::Image(profile) => &mut profile.input,
    };
    if let Value::Object(map) = input {
      target.extend(map);
    }
    self
  }

  /// Input overrides applied only when probing an image model.
  pub fn with_probe_input(mut self, input: Value) -> Self {
    if let (ModelProfile::Image(profile), Value::Object(map)) = (&mut self.profile, input) {
      profile.probe_input.extend(map);
    }
    self
  }

  pub fn with_prompt_template(mut self, template: &str) -> Self {
    if let ModelProfile::Image(profile) = &mut self.profile {
      profile.prompt_template = template.to_string();
    }
    self
  }

  pub fn with_reference_image(mut self, key: &str) -> Self {
    if let ModelProfile::Image(profile) = &mut self.profile {
      profile.reference_image_key = Some(key.to_string());
    }
    self
  }

  pub fn with_max_tokens_key(mut self, key: &str) -> Self {
    if let ModelProfile::Text(profile) = &mut self.profile {
      profile.max_tokens_key = Some(key.to_string());
    }
    self
  }

  pub fn modality(&self) -> Modality {
    match self.profile {
      ModelProfile::Text(_) => Modality::Text,
      ModelProfile::Image(_) => Modality::Image,
    }
  }

  /// Face-conditioned models cannot run without a reference image.
  pub fn requires_reference_image(&self) -> bool {
    matches!(
      &self.profile,
      ModelProfile::Image(ImageProfile {
        reference_image_key: Some(_),
        ..
      })
    )
  }

  /// Build a text call with this model's fixed parameters.
  pub fn text_request(
    &self,
    prompt: impl Into<String>,
    system_prompt: Option<&str>,
    max_tokens: u32,
  ) -> Result<InvokeRequest> {
    let ModelProfile::Text(profile) = &self.profile else {
      return Err(self.wrong_modality(Modality::Text));
    };

    let mut input = profile.input.clone();
    if let Some(key) = &profile.max_tokens_key {
      input.insert(key.clone(), json!(max_tokens));
    }
    Ok(
      InvokeRequest::text(&self.vendor_model, prompt).with_params(InvokeParams {
        system_prompt: system_prompt.map(str::to_string),
        max_tokens: Some(max_tokens),
        temperature: None,
        input,
      }),
    )
  }

  /// Build an image call: wrap the prompt and attach the reference image.
  pub fn image_request(
    &self,
    prompt: &str,
    reference: Option<&ReferenceImage>,
  ) -> Result<InvokeRequest> {
    let ModelProfile::Image(profile) = &self.profile else {
      return Err(self.wrong_modality(Modality::Image));
    };

    let mut input = profile.input.clone();
    if let Some(key) = &profile.reference_image_key {
      let reference =
        reference.ok_or_else(|| ProviderError::ReferenceImageRequired(self.id.clone()))?;
      input.insert(key.clone(), json!(reference.data_uri()));
    }

    let rendered = profile.prompt_template.replace("{prompt}", prompt);
    Ok(InvokeRequest::image(&self.vendor_model, rendered).with_params(InvokeParams {
      input,
      ..Default::default()
    }))
  }

  /// Cheapest real call that proves the model answers.
  pub fn probe_request(&self) -> Result<InvokeRequest> {
    match &self.profile {
      ModelProfile::Text(_) => self.text_request(
        TEXT_PROBE_PROMPT,
        Some(TEXT_PROBE_SYSTEM),
        TEXT_PROBE_MAX_TOKENS,
      ),
      ModelProfile::Image(profile) => {
        let mut input = profile.input.clone();
        input.extend(profile.probe_input.clone());
        if let Some(key) = &profile.reference_image_key {
          input.insert(key.clone(), json!(probe_reference_data_uri()?));
        }
        Ok(
          InvokeRequest::image(&self.vendor_model, IMAGE_PROBE_PROMPT).with_params(InvokeParams {
            input,
            ..Default::default()
          }),
        )
      }
    }
  }

  fn wrong_modality(&self, wanted: Modality) -> ProviderError {
    ProviderError::UnsupportedModality {
      provider: self.id.clone(),
      modality: wanted.to_string(),
    }
  }
}

/// Small flat image standing in for a face during probes.
fn probe_reference_data_uri() -> Result<String> {
  let img = RgbImage::from_pixel(64, 64, Rgb([200, 200, 200]));
  let mut buffer = Cursor::new(Vec::new());
  img.write_to(&mut buffer, ImageFormat::Png)?;
  Ok(ReferenceImage::from_bytes(buffer.into_inner()).data_uri())
}

/// Models shipped with Deckforge.
pub fn builtin_models() -> Vec<ModelEntry> {
  let rep = replicate::PROVIDER_ID;
  let flux_common = json!({
    "num_outputs": 1,
    "aspect_ratio": "1:1",
    "output_format": "webp",
    "guidance_scale": 3.5,
    "output_quality": 80,
    "disable_safety_checker": true,
  });

  vec![
    // Text
    ModelEntry::text(
      "llama-3.1-405b",
      "Meta Llama 3.1 405B Instruct",
      rep,
      "meta/meta-llama-3.1-405b-instruct",
    )
    .with_input(json!({
      "top_k": 50,
      "top_p": 0.9,
      "min_tokens": 0,
      "temperature": 0.6,
      "presence_penalty": 0,
      "frequency_penalty": 0,
    })),
    ModelEntry::text(
      "claude-3.7-sonnet",
      "Claude 3.7 Sonnet",
      rep,
      "anthropic/claude-3.7-sonnet",
    )
    .with_input(json!({ "max_image_resolution": 0.5 })),
    ModelEntry::text(
      "claude-3.5-sonnet",
      "Claude 3.5 Sonnet",
      rep,
      "anthropic/claude-3.5-sonnet",
    )
    .with_input(json!({ "max_image_resolution": 0.5 })),
    ModelEntry::text("claude-3.5-haiku", "Claude 3.5 Haiku", rep, "anthropic/claude-3.5-haiku"),
    ModelEntry::text("deepseek-r1", "DeepSeek R1", rep, "deepseek-ai/deepseek-r1").with_input(
      json!({
        "top_p": 1,
        "temperature": 0.1,
        "presence_penalty": 0,
        "frequency_penalty": 0,
      }),
    ),
    ModelEntry::text(
      "dolphin-2.9",
      "Dolphin 2.9 Llama3 70B",
      rep,
      "mikeei/dolphin-2.9-llama3-70b-gguf:7cd1882cb3ea90756d09decf4bc8a259353354703f8f385ce588b71f7946f0aa",
    )
    .with_input(json!({
      "temperature": 0.6,
      "repeat_penalty": 1.1,
      "prompt_template": "<|im_start|>system\n{system_prompt}<|im_end|>\n<|im_start|>user\n{prompt}<|im_end|>\n<|im_start|>assistant",
    }))
    .with_max_tokens_key("max_new_tokens"),
    ModelEntry::text("grok-2", "Grok 2", xai::PROVIDER_ID, "grok-2-1212"),
    ModelEntry::text(
      "gemini-2.0-flash",
      "Gemini 2.0 Flash",
      google::PROVIDER_ID,
      "gemini-2.0-flash",
    ),
    // Image
    ModelEntry::image(
      "hyper-flux-16step",
      "Hyper FLUX 16-step",
      rep,
      "bytedance/hyper-flux-16step:382cf8959fb0f0d665b26e7e80b8d6dc3faaef1510f14ce017e8c732bb3d1eb7",
    )
    .with_input(flux_common.clone())
    .with_input(json!({ "num_inference_steps": 16 }))
    .with_probe_input(json!({ "num_inference_steps": 4 })),
    ModelEntry::image(
      "hyper-flux-8step",
      "Hyper FLUX 8-step",
      rep,
      "bytedance/hyper-flux-8step:81946b1e09b256c543b35f37333a30d0d02ee2cd8c4f77cd915873a1ca622bad",
    )
    .with_input(flux_common)
    .with_input(json!({ "num_inference_steps": 8, "negative_prompt": NEGATIVE_BASIC }))
    .with_probe_input(json!({ "num_inference_steps": 4 })),
    ModelEntry::image(
      "sdxl-lightning-4step",
      "SDXL Lightning 4-step",
      rep,
      "bytedance/sdxl-lightning-4step:727e49a643e999d602a896c774a0658ffefea21465756a6ce24b7ea4165eba6a",
    )
    .with_input(json!({
      "width": 1024,
      "height": 1024,
      "scheduler": "K_EULER",
      "num_outputs": 1,
      "guidance_scale": 0,
      "negative_prompt": "worst quality, low quality",
      "num_inference_steps": 4,
      "disable_safety_checker": true,
    }))
    .with_probe_input(json!({ "width": 512, "height": 512 })),
    ModelEntry::image(
      "flux-schnell",
      "FLUX.1 schnell",
      rep,
      "black-forest-labs/flux-schnell",
    )
    .with_input(json!({
      "go_fast": true,
      "megapixels": "1",
      "num_outputs": 1,
      "aspect_ratio": "1:1",
      "output_format": "webp",
      "output_quality": 80,
      "num_inference_steps": 4,
      "disable_safety_checker": true,
    })),
    ModelEntry::image(
      "photomaker",
      "PhotoMaker (faces)",
      rep,
      "tencentarc/photomaker:ddfc2b08d209f9fa8c1eca692712918bd449f695dabb4a958da31802a9570fe4",
    )
    .with_prompt_template(FACE_TEMPLATE)
    .with_reference_image("input_image")
    .with_input(json!({
      "num_steps": 50,
      "style_name": "Photographic (Default)",
      "num_outputs": 1,
      "guidance_scale": 5,
      "negative_prompt": NEGATIVE_FACE,
      "style_strength_ratio": 20,
      "disable_safety_checker": true,
    }))
    .with_probe_input(json!({ "num_steps": 4 })),
    ModelEntry::image(
      "flux-pulid",
      "FLUX PuLID (faces)",
      rep,
      "zsxkib/flux-pulid:8baa7ef2255075b46f4d91cd238c21d31181b3e6a864463f967960bb0112525b",
    )
    .with_prompt_template(FACE_TEMPLATE)
    .with_reference_image("main_face_image")
    .with_input(json!({
      "width": 896,
      "height": 1152,
      "true_cfg": 1,
      "id_weight": 1,
      "num_steps": 20,
      "start_step": 4,
      "num_outputs": 1,
      "output_format": "webp",
      "guidance_scale": 4,
      "output_quality": 80,
      "negative_prompt": NEGATIVE_FACE,
      "max_sequence_length": 128,
      "disable_safety_checker": true,
    }))
    .with_probe_input(json!({ "width": 512, "height": 512, "num_steps": 4 })),
    ModelEntry::image(
      "dgmtnzflux",
      "DGMTNZ FLUX",
      rep,
      "dgmtnz/dgmtnzflux:2df4f3bc8070ddda1854e25218cf5ac159cc0d51c9fcfdd08447712075807e8b",
    )
    .with_prompt_template("DGMTNZ {prompt}, a photo in the context of a PowerPoint presentation")
    .with_input(json!({
      "model": "dev",
      "lora_scale": 1,
      "num_outputs": 1,
      "aspect_ratio": "1:1",
      "output_format": "webp",
      "guidance_scale": 3.5,
      "output_quality": 90,
      "prompt_strength": 0.8,
      "extra_lora_scale": 1,
      "num_inference_steps": 28,
      "disable_safety_checker": true,
    }))
    .with_probe_input(json!({ "num_inference_steps": 4 })),
    ModelEntry::image(
      "sana",
      "NVIDIA Sana",
      rep,
      "nvidia/sana:c6b5d2b7459910fec94432e9e1203c3cdce92d6db20f714f1355747990b52fa6",
    )
    .with_input(json!({
      "width": 1024,
      "height": 1024,
      "model_variant": "1600M-1024px",
      "guidance_scale": 5,
      "negative_prompt": format!("{NEGATIVE_BASIC}, {NEGATIVE_FACE}"),
      "pag_guidance_scale": 2,
      "num_inference_steps": 18,
      "disable_safety_checker": true,
    }))
    .with_probe_input(json!({ "width": 512, "height": 512, "num_inference_steps": 4 })),
    ModelEntry::image("imagen-3", "Imagen 3", rep, "google/imagen-3")
      .with_prompt_template("{prompt}, a photo in the context of a PowerPoint presentation, professional photographers style with soft lighting, high resolution and exceptional clarity")
      .with_input(json!({ "aspect_ratio": "1:1" })),
    ModelEntry::image("imagen-3-fast", "Imagen 3 Fast", rep, "google/imagen-3-fast")
      .with_prompt_template("{prompt}, a photo in the context of a PowerPoint presentation, professional photographers style with soft lighting and exceptional clarity")
      .with_input(json!({ "aspect_ratio": "1:1" })),
    ModelEntry::image(
      "model3-4",
      "Lightweight Model 3.4",
      rep,
      "lightweight-ai/model3_4:3db8401934ab8847047c76cce766bc7390a54ae0a5342e42da8b27098b78f5ca",
    )
    .with_input(json!({
      "width": 1024,
      "height": 1024,
      "scheduler": "K_EULER",
      "num_outputs": 1,
      "guidance_scale": 3.5,
      "negative_prompt": format!("{NEGATIVE_BASIC}, {NEGATIVE_FACE}"),
      "num_inference_steps": 28,
      "output_format": "png",
      "output_quality": 100,
    }))
    .with_probe_input(json!({ "width": 512, "height": 512, "num_inference_steps": 4 })),
    ModelEntry::image(
      "grok-2-image",
      "Grok 2 Image",
      xai::PROVIDER_ID,
      "grok-2-image-1212",
    )
    .with_prompt_template("{prompt}, a photo in the context of a PowerPoint presentation"),
    ModelEntry::image(
      "gemini-2.0-flash-image",
      "Gemini 2.0 Flash Image",
      google::PROVIDER_ID,
      "gemini-2.0-flash-preview-image-generation",
    ),
  ]
}
