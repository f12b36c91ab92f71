use candle_core::{DType, Device};
use pylate_rs::ColBERT;
use tracing::info;

use crate::{
    embedding::Embedder,
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "PAPERSIFT_MODEL";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

fn model_error(e: impl std::fmt::Display) -> Error {
    Error::Model(e.to_string())
}

/// Local ColBERT encoder used as the chunk and query embedder.
///
/// The model is loaded on the first call to [`Embedder::embed`]. Token-level
/// ColBERT outputs are mean-pooled into one vector per text.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    /// Model id from `PAPERSIFT_MODEL`, or [`DEFAULT_MODEL_ID`].
    pub fn new() -> Self {
        let model_id = std::env::var(MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            info!(model = %self.model_id, "loading embedding model");
            let colbert: ColBERT = ColBERT::from(&self.model_id)
                .with_device(default_device())
                .try_into()
                .map_err(model_error)?;
            self.model = Some(colbert);
        }

        self.model
            .as_mut()
            .ok_or_else(|| Error::Model("model failed to load".to_string()))
    }
}

impl ModelManager {
    /// Encode a batch and mean-pool the token embeddings of each text.
    fn encode_pooled(
        &mut self,
        texts: &[String],
        is_query: bool,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.ensure_loaded()?;
        // [batch, tokens, dim] -> [batch, dim]
        let tokens = model.encode(texts, is_query).map_err(model_error)?;
        tokens
            .mean(1)
            .and_then(|pooled| pooled.to_dtype(DType::F32))
            .and_then(|pooled| pooled.to_vec2::<f32>())
            .map_err(model_error)
    }
}

impl Embedder for ModelManager {
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encode_pooled(texts, false)
    }

    fn embed_queries(&mut self, queries: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encode_pooled(queries, true)
    }
}
