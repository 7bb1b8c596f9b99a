use thiserror::Error;

#[derive(Debug, Error)]
pub enum CvError {
    #[error("invalid date '{0}', expected YYYY-MM")]
    InvalidDate(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),
}

impl From<std::io::Error> for CvError {
    fn from(err: std::io::Error) -> Self {
        CvError::Render(err.to_string())
    }
}
