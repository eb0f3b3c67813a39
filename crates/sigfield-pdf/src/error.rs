use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfEmbedError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Invalid signature image: {0}")]
    Image(String),

    #[error("Failed to draw on page: {0}")]
    Draw(String),

    #[error("Failed to serialize PDF: {0}")]
    Save(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
