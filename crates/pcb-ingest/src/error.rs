use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("{file}:{line}: {msg}")]
    ParseError {
        file: String,
        line: usize,
        msg: String,
    },

    #[error("coordinate format error in {file}: {msg}")]
    FormatError { file: String, msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    pub fn parse(file: impl Into<String>, line: usize, msg: impl Into<String>) -> Self {
        IngestError::ParseError {
            file: file.into(),
            line,
            msg: msg.into(),
        }
    }
}
