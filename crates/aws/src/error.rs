use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AwsError {
    #[error("{message}")]
    Api {
        /// Provider error code (e.g. "SubscriptionRequiredException"), when
        /// the service returned one.
        code: Option<String>,
        message: String,
    },
    #[error("listing did not terminate after {pages} pages")]
    PageLimitExceeded { pages: usize },
}

impl AwsError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            Self::PageLimitExceeded { .. } => None,
        }
    }

    /// Capture an SDK failure, keeping the provider error code so callers can
    /// special-case conditions like a missing bucket configuration.
    pub fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        Self::Api {
            code: err.code().map(str::to_string),
            message: format!("{}", DisplayErrorContext(&err)),
        }
    }
}
