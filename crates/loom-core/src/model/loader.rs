//! SafeTensors weight loading utilities.
//!
//! # Example
//!
//! ```ignore
//! use loom_core::model::WeightLoader;
//!
//! let loader = WeightLoader::from_dir("/path/to/model".as_ref(), &Device::Cpu)?;
//! let logits = loader.get_tensor("logits")?;
//! ```

use crate::error::{LoomError, Result};
use candle_core::{Device, Tensor};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Weight loader for SafeTensors format.
pub struct WeightLoader {
    /// Loaded tensors indexed by name.
    tensors: HashMap<String, Tensor>,
}

impl WeightLoader {
    /// Load all .safetensors files in a directory.
    pub fn from_dir(dir: &Path, device: &Device) -> Result<Self> {
        let mut safetensor_files: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "safetensors") {
                safetensor_files.push(path);
            }
        }

        // Sort for deterministic loading order
        safetensor_files.sort();

        if safetensor_files.is_empty() {
            return Err(LoomError::Model(format!(
                "no .safetensors files found in {}",
                dir.display()
            )));
        }

        let mut tensors = HashMap::new();
        for path in &safetensor_files {
            tensors.extend(Self::load_safetensors_file(path, device)?);
        }

        Ok(Self { tensors })
    }

    fn load_safetensors_file(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
        let data = fs::read(path)?;
        let safetensors = SafeTensors::deserialize(&data).map_err(|e| {
            LoomError::Model(format!("failed to deserialize {}: {}", path.display(), e))
        })?;

        safetensors
            .tensors()
            .into_iter()
            .map(|(name, view)| Ok((name, Self::view_to_tensor(&view, device)?)))
            .collect()
    }

    /// Convert a SafeTensors view to an f32 Candle tensor.
    fn view_to_tensor(view: &safetensors::tensor::TensorView, device: &Device) -> Result<Tensor> {
        let shape = view.shape();
        let data = view.data();

        // pod_collect_to_vec copies, so unaligned mmap offsets are fine
        let values: Vec<f32> = match view.dtype() {
            safetensors::Dtype::F32 => bytemuck::pod_collect_to_vec(data),
            safetensors::Dtype::F16 => bytemuck::pod_collect_to_vec::<u8, half::f16>(data)
                .into_iter()
                .map(half::f16::to_f32)
                .collect(),
            safetensors::Dtype::BF16 => bytemuck::pod_collect_to_vec::<u8, half::bf16>(data)
                .into_iter()
                .map(half::bf16::to_f32)
                .collect(),
            other => {
                return Err(LoomError::Model(format!("unsupported dtype: {:?}", other)));
            }
        };

        Ok(Tensor::from_vec(values, shape, device)?)
    }

    /// Get a tensor by name, returning an error if not found.
    pub fn get_tensor(&self, name: &str) -> Result<Tensor> {
        self.tensors
            .get(name)
            .cloned()
            .ok_or_else(|| LoomError::Model(format!("tensor not found: {}", name)))
    }

    /// Get the number of loaded tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if no tensors are loaded.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_from_nonexistent_dir() {
        let result = WeightLoader::from_dir(Path::new("/nonexistent/path"), &Device::Cpu);
        assert!(result.is_err());
    }

    #[test]
    fn loader_empty_dir() {
        let dir = tempfile::tempdir().unwrap();

        let result = WeightLoader::from_dir(dir.path(), &Device::Cpu);
        assert!(matches!(result, Err(LoomError::Model(_))));
    }

    #[test]
    fn loader_reads_saved_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        let table = Tensor::new(&[[0.5f32, 1.5], [2.5, 3.5]], &Device::Cpu).unwrap();
        let mut tensors = HashMap::new();
        tensors.insert("logits".to_string(), table);
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let loader = WeightLoader::from_dir(dir.path(), &Device::Cpu).unwrap();

        assert_eq!(loader.len(), 1);
        let logits = loader.get_tensor("logits").unwrap();
        assert_eq!(
            logits.to_vec2::<f32>().unwrap(),
            vec![vec![0.5, 1.5], vec![2.5, 3.5]]
        );
        assert!(loader.get_tensor("missing").is_err());
    }

    #[test]
    fn loader_widens_half_precision_to_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");
        let table = Tensor::new(&[[0.5f32, -1.0], [2.0, 0.25]], &Device::Cpu)
            .unwrap()
            .to_dtype(candle_core::DType::F16)
            .unwrap();
        let mut tensors = HashMap::new();
        tensors.insert("logits".to_string(), table);
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let logits = WeightLoader::from_dir(dir.path(), &Device::Cpu)
            .unwrap()
            .get_tensor("logits")
            .unwrap();

        assert_eq!(logits.dtype(), candle_core::DType::F32);
        assert_eq!(
            logits.to_vec2::<f32>().unwrap(),
            vec![vec![0.5, -1.0], vec![2.0, 0.25]]
        );
    }
}
