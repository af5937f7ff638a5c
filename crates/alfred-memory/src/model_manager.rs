// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model download manager for first-run ONNX embedding model setup.
//!
//! Downloads the all-MiniLM-L6-v2 INT8 quantized model from HuggingFace
//! on request and caches it under `<data_dir>/models/<model_name>`.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::info;

use alfred_core::AlfredError;

/// URLs for model files on HuggingFace.
const MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Manages ONNX model download and path resolution.
pub struct ModelManager {
    data_dir: PathBuf,
    model_name: String,
    /// Serializes downloads between concurrent callers.
    download_lock: Mutex<()>,
}

impl ModelManager {
    pub fn new(data_dir: PathBuf, model_name: &str) -> Self {
        Self {
            data_dir,
            model_name: model_name.to_string(),
            download_lock: Mutex::new(()),
        }
    }

    /// Returns the directory where model files are stored.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join(&self.model_name)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    /// Returns true if both model and tokenizer files exist.
    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Ensures the model is downloaded and available.
    ///
    /// Downloads missing files from HuggingFace; a no-op once both exist.
    pub async fn ensure_model(&self) -> Result<PathBuf, AlfredError> {
        let _guard = self.download_lock.lock().await;
        if self.is_model_available() {
            return Ok(self.model_path());
        }

        info!(model = %self.model_name, "embedding model not found, downloading from HuggingFace");

        let model_dir = self.model_dir();
        tokio::fs::create_dir_all(&model_dir)
            .await
            .map_err(|e| AlfredError::Internal(format!("failed to create model directory: {e}")))?;

        let files = [("model.onnx", MODEL_URL), ("tokenizer.json", TOKENIZER_URL)];

        for (filename, url) in &files {
            let dest = model_dir.join(filename);
            if dest.exists() {
                continue;
            }

            info!(file = %filename, "downloading");
            match download_file(url, &dest).await {
                Ok(size) => info!(file = %filename, bytes = size, "downloaded"),
                Err(e) => {
                    // Remove the partial file so the next run retries.
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(e);
                }
            }
        }

        info!(dir = %model_dir.display(), "embedding model ready");
        Ok(self.model_path())
    }

    /// Load the model files into an owned handle.
    #[cfg(feature = "onnx")]
    pub fn load(&self) -> Result<crate::embedding::OnnxModel, AlfredError> {
        crate::embedding::OnnxModel::load(&self.model_path(), &self.tokenizer_path())
    }
}

/// Download a file from a URL to a local path.
async fn download_file(url: &str, dest: &Path) -> Result<usize, AlfredError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| AlfredError::Internal(format!("failed to download {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(AlfredError::Internal(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AlfredError::Internal(format!("failed to read response body from {url}: {e}")))?;

    let size = bytes.len();
    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| AlfredError::Internal(format!("failed to write {}: {e}", dest.display())))?;

    Ok(size)
}
