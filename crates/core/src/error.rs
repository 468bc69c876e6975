use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("whole-file extraction failed: {0}")]
    ExtractionFailed(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Failures of the language model or embedding endpoints.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{backend} returned {status}: {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("an error occurred during input reading: {0}")]
    Io(#[from] std::io::Error),

    #[error("input stream closed before an answer was given")]
    Closed,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index request failed: {0}")]
    Request(String),
}

/// The only error a pipeline run surfaces; the cause is logged, not returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to ingest your data")]
    FailedToIngest,
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
