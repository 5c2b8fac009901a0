use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const UNIT_STD: [f32; 3] = [1.0, 1.0, 1.0];

/// How the raw network output becomes a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDecoding {
    /// Single-channel saliency map, min-max normalised
    Saliency,
    /// Per-class logits; every non-background class counts as foreground
    ClassArgmax { classes: usize },
}

/// Background-removal models that can be selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelKind {
    #[default]
    U2Net,
    U2NetP,
    U2NetHumanSeg,
    U2NetClothSeg,
    Silueta,
    IsNetGeneralUse,
    IsNetAnime,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::U2Net,
        ModelKind::IsNetAnime,
        ModelKind::IsNetGeneralUse,
        ModelKind::U2NetHumanSeg,
        ModelKind::Silueta,
        ModelKind::U2NetClothSeg,
        ModelKind::U2NetP,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::U2Net => "u2net",
            Self::U2NetP => "u2netp",
            Self::U2NetHumanSeg => "u2net_human_seg",
            Self::U2NetClothSeg => "u2net_cloth_seg",
            Self::Silueta => "silueta",
            Self::IsNetGeneralUse => "isnet-general-use",
            Self::IsNetAnime => "isnet-anime",
        }
    }

    /// One-line description shown next to the model choice
    pub fn description(&self) -> &'static str {
        match self {
            Self::U2Net => "general purpose, the most stable choice",
            Self::U2NetP => "lightweight, fastest but coarser edges at low resolution",
            Self::U2NetHumanSeg => "tuned for human silhouettes",
            Self::U2NetClothSeg => "keeps clothing only",
            Self::Silueta => "small and fast, suited to full-body shots",
            Self::IsNetGeneralUse => "newer general model with finer detail than u2net",
            Self::IsNetAnime => "anime and cartoon artwork with clean line art",
        }
    }

    /// Network input size (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        match self {
            Self::U2Net | Self::U2NetP | Self::U2NetHumanSeg | Self::Silueta => (320, 320),
            Self::U2NetClothSeg => (768, 768),
            Self::IsNetGeneralUse | Self::IsNetAnime => (1024, 1024),
        }
    }

    /// Per-channel (mean, std) applied after scaling pixels to [0, 1]
    pub fn normalization(&self) -> ([f32; 3], [f32; 3]) {
        match self {
            Self::IsNetGeneralUse => ([0.5, 0.5, 0.5], UNIT_STD),
            Self::IsNetAnime => (IMAGENET_MEAN, UNIT_STD),
            _ => (IMAGENET_MEAN, IMAGENET_STD),
        }
    }

    pub fn mask_decoding(&self) -> MaskDecoding {
        match self {
            Self::U2NetClothSeg => MaskDecoding::ClassArgmax { classes: 4 },
            _ => MaskDecoding::Saliency,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.onnx", self.name())
    }

    pub fn download_url(&self) -> String {
        format!("{}/{}", MODEL_RELEASE_URL, self.file_name())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model `{name}` (expected one of: {expected})")]
pub struct UnknownModelError {
    name: String,
    expected: String,
}

impl FromStr for ModelKind {
    type Err = UnknownModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| UnknownModelError {
                name: s.to_string(),
                expected: ModelKind::ALL
                    .iter()
                    .map(|k| k.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
