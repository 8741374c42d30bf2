/// Convenience result type used across countick.
pub type CountickResult<T> = Result<T, CountickError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Cache-layer variants (`MissingFrames`, `Extraction`) are contract violations that should not
/// occur when `analyze` is consulted first. Encoder-chain variants are expected and recovered
/// internally up to exhaustion.
#[derive(thiserror::Error, Debug)]
pub enum CountickError {
    /// Non-positive duration, or a duration beyond the supported bound of a path.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// Cache assembly found gaps. Carries every absent remaining-seconds value.
    #[error("cache assembly is missing frames for seconds {missing:?}")]
    MissingFrames {
        /// Absent remaining-seconds keys, ascending.
        missing: Vec<u32>,
    },

    /// Bidirectional donor reuse produced an out-of-range index or a wrong-length sequence.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Every strategy in the encoding chain reported itself unsupported.
    #[error("no encoder available: {0}")]
    NoEncoderAvailable(String),

    /// A supported strategy failed during encoding and the chain is exhausted.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Rendering failed while system memory was degraded.
    #[error("memory pressure: {0}")]
    MemoryPressure(String),

    /// The frame renderer or its worker failed.
    #[error("render surface error: {0}")]
    RenderSurface(String),

    /// Master asset missing or corrupt. Always recoverable by full rendering.
    #[error("trim unavailable: {0}")]
    TrimUnavailable(String),

    /// The caller-configured generation deadline elapsed between chunks.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CountickError {
    /// Build a [`CountickError::InvalidDuration`] value.
    pub fn invalid_duration(msg: impl Into<String>) -> Self {
        Self::InvalidDuration(msg.into())
    }

    /// Build a [`CountickError::Extraction`] value.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Build a [`CountickError::NoEncoderAvailable`] value.
    pub fn no_encoder(msg: impl Into<String>) -> Self {
        Self::NoEncoderAvailable(msg.into())
    }

    /// Build a [`CountickError::Encoding`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Build a [`CountickError::MemoryPressure`] value.
    pub fn memory_pressure(msg: impl Into<String>) -> Self {
        Self::MemoryPressure(msg.into())
    }

    /// Build a [`CountickError::RenderSurface`] value.
    pub fn render_surface(msg: impl Into<String>) -> Self {
        Self::RenderSurface(msg.into())
    }

    /// Build a [`CountickError::TrimUnavailable`] value.
    pub fn trim_unavailable(msg: impl Into<String>) -> Self {
        Self::TrimUnavailable(msg.into())
    }

    /// Build a [`CountickError::DeadlineExceeded`] value.
    pub fn deadline(msg: impl Into<String>) -> Self {
        Self::DeadlineExceeded(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_frames_lists_every_absent_index() {
        let err = CountickError::MissingFrames {
            missing: vec![2, 5, 9],
        };
        let msg = err.to_string();
        assert!(msg.contains("[2, 5, 9]"), "unexpected message: {msg}");
    }

    #[test]
    fn helper_constructors_pick_the_right_variant() {
        assert!(matches!(
            CountickError::invalid_duration("x"),
            CountickError::InvalidDuration(_)
        ));
        assert!(matches!(
            CountickError::no_encoder("x"),
            CountickError::NoEncoderAvailable(_)
        ));
        assert!(matches!(
            CountickError::deadline("x"),
            CountickError::DeadlineExceeded(_)
        ));
    }
}
