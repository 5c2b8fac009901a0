mod cache;
mod catalog;
mod matting;
mod preprocess;
mod remover;
mod salient;
pub mod types;

pub use cache::{ModelLoader, OnnxModelLoader, SessionCache, SharedModel};
pub use catalog::{MaskDecoding, ModelKind, UnknownModelError};
pub use matting::{alpha_matting_cutout, build_trimap, post_process_mask, MattingParams};
pub use preprocess::Preprocessor;
pub use remover::{BackgroundRemover, ModelFailurePolicy, ParsePolicyError};
pub use salient::SalientObjectModel;
pub use types::{Matte, SegmentationModel};

use anyhow::Result;
use std::path::Path;

/// Load a segmentation model of the given kind straight from an ONNX file
pub fn create_model(kind: ModelKind, model_path: &Path) -> Result<Box<dyn SegmentationModel + Send>> {
    let model = SalientObjectModel::new(kind, model_path)?;
    Ok(Box::new(model))
}
