pub mod capture;
pub mod controls;
pub mod error;
pub mod frame;
pub mod output;
pub mod pipeline;
pub mod postprocess;
pub mod segmentation;

pub use error::Rejection;
pub use frame::FrameImage;
pub use pipeline::{ExtractRequest, ExtractResponse, FramePipeline, DEFAULT_DPI};
