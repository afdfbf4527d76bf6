use crate::foundation::core::Resolution;

pub type HullResult<T> = Result<T, HullError>;

#[derive(thiserror::Error, Debug)]
pub enum HullError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("encode error at {resolution} / {rate_kbps} kbps: {message}")]
    Encode {
        resolution: Resolution,
        rate_kbps: u32,
        message: String,
    },

    #[error("score error at {resolution} / {rate_kbps} kbps: {message}")]
    Score {
        resolution: Resolution,
        rate_kbps: u32,
        message: String,
    },

    #[error("probe error: {0}")]
    Probe(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HullError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encode(resolution: Resolution, rate_kbps: u32, msg: impl Into<String>) -> Self {
        Self::Encode {
            resolution,
            rate_kbps,
            message: msg.into(),
        }
    }

    pub fn score(resolution: Resolution, rate_kbps: u32, msg: impl Into<String>) -> Self {
        Self::Score {
            resolution,
            rate_kbps,
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for failures caused by a cancellation signal or an expired deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
