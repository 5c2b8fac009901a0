use crate::capture::SamplingMode;

/// Which background-removal inputs of the parameter form are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundControls {
    pub model_selector: bool,
    pub alpha_matting: bool,
}

/// Which sampling inputs are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingControls {
    pub interval_input: bool,
    pub count_input: bool,
}

/// Model choice and matting tunables only matter when removal is on
pub fn background_controls(remove_background: bool) -> BackgroundControls {
    BackgroundControls {
        model_selector: remove_background,
        alpha_matting: remove_background,
    }
}

pub fn sampling_controls(mode: SamplingMode) -> SamplingControls {
    SamplingControls {
        interval_input: mode == SamplingMode::Interval,
        count_input: mode == SamplingMode::Count,
    }
}
