use super::catalog::{MaskDecoding, ModelKind};
use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};
use anyhow::{ensure, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// Salient-object segmentation network (U²-Net / IS-Net family) run through ONNX Runtime
///
/// The first output is read as either a saliency map or class logits,
/// depending on the model kind.
pub struct SalientObjectModel {
    kind: ModelKind,
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
}

impl SalientObjectModel {
    /// Load `kind` from an ONNX file
    pub fn new<P: AsRef<Path>>(kind: ModelKind, model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading {} model from {}", kind, path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("{} model loaded successfully", kind);

        let (width, height) = kind.input_size();
        let (mean, std) = kind.normalization();
        let preprocessor = Preprocessor::new(width, height, mean, std);

        Ok(Self {
            kind,
            session,
            preprocessor,
            width,
            height,
        })
    }
}

impl SegmentationModel for SalientObjectModel {
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
        let _span = tracing::debug_span!("salient_segment", model = %self.kind).entered();

        let input_tensor = self.preprocessor.preprocess(frame);

        // Run inference
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(&input_tensor)?])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Output 0 is [1, C, H, W]
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        ensure!(shape.len() == 4, "unexpected output rank {}", shape.len());
        let channels = shape[1] as usize;
        let mask_height = shape[2] as u32;
        let mask_width = shape[3] as u32;

        let mask = match self.kind.mask_decoding() {
            MaskDecoding::Saliency => {
                Preprocessor::saliency_to_mask(data, mask_width, mask_height)?
            }
            MaskDecoding::ClassArgmax { classes } => {
                ensure!(
                    channels >= classes,
                    "model produced {} channels, expected {}",
                    channels,
                    classes
                );
                Preprocessor::classes_to_mask(data, classes, mask_width, mask_height)?
            }
        };

        // Postprocess: resize back to original frame dimensions
        let (frame_width, frame_height) = frame.dimensions();
        Ok(Preprocessor::postprocess_matte(mask, frame_width, frame_height))
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
