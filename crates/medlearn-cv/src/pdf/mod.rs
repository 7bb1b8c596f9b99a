//! CV to PDF rendering.
//!
//! The output is a self-contained PDF 1.4 file using the standard Helvetica
//! fonts, so no font data is embedded.

pub mod font;
pub mod layout;
mod wrap;
mod writer;

use time::OffsetDateTime;

use crate::error::CvError;
use crate::model::Cv;

pub use layout::{LineRole, Op, Page, layout};
pub use writer::{DocumentInfo, write_pdf};

pub const DEFAULT_MARGIN: f32 = 50.0;
pub const MIN_MARGIN: f32 = 18.0;
pub const MAX_MARGIN: f32 = 150.0;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Page margin in points, clamped to `MIN_MARGIN..=MAX_MARGIN`.
    pub margin: f32,
    /// FlateDecode content streams.
    pub compress: bool,
    /// Creation date written to the info dictionary; defaults to now.
    pub created_at: Option<OffsetDateTime>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            compress: true,
            created_at: None,
        }
    }
}

/// Renders a CV to PDF bytes.
///
/// # Errors
///
/// Returns `CvError::Render` if stream compression fails.
pub fn render_pdf(cv: &Cv, options: &RenderOptions) -> Result<Vec<u8>, CvError> {
    let margin = options.margin.clamp(MIN_MARGIN, MAX_MARGIN);
    let pages = layout(cv, margin);

    let title = if cv.personal.full_name.trim().is_empty() {
        "Curriculum Vitae".to_string()
    } else {
        format!("{} - Curriculum Vitae", cv.personal.full_name.trim())
    };
    let info = DocumentInfo {
        title: &title,
        producer: concat!("MedLearn ", env!("CARGO_PKG_VERSION")),
        created_at: options.created_at.unwrap_or_else(OffsetDateTime::now_utc),
    };

    let bytes = write_pdf(&pages, &info, options.compress)?;
    tracing::debug!(
        pages = pages.len(),
        bytes = bytes.len(),
        compressed = options.compress,
        "Rendered CV PDF"
    );
    Ok(bytes)
}
