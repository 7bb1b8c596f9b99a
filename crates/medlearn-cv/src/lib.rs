//! CV model, validation and PDF export for MedLearn.

pub mod error;
pub mod model;
pub mod pdf;
pub mod validate;

pub use error::CvError;
pub use model::{
    Certification, Cv, Education, Experience, Language, PersonalInfo, Publication, Reference,
    YearMonth, format_period,
};
pub use pdf::{RenderOptions, render_pdf};
pub use validate::{CvIssue, validate};
