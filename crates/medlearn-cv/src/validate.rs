//! Structural validation of a submitted CV.
//!
//! Validation collects every problem instead of stopping at the first one so
//! clients can highlight all offending fields at once.

use crate::model::{Cv, YearMonth};

pub const MAX_ENTRIES: usize = 100;
pub const MAX_SKILLS: usize = 200;
pub const MAX_SUMMARY_CHARS: usize = 5000;
pub const MAX_TEXT_CHARS: usize = 2000;
pub const MAX_NAME_CHARS: usize = 200;

/// One problem found in a CV, addressed by a dotted JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvIssue {
    pub field: String,
    pub message: String,
}

#[derive(Default)]
struct Issues(Vec<CvIssue>);

impl Issues {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(CvIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    fn required(&mut self, field: impl Into<String>, value: &str, max: usize) {
        let field = field.into();
        if value.trim().is_empty() {
            self.push(field, "must not be empty");
        } else {
            self.text(field, value, max);
        }
    }

    fn text(&mut self, field: impl Into<String>, value: &str, max: usize) {
        if value.chars().count() > max {
            self.push(field, format!("must be at most {max} characters"));
        }
    }

    fn optional(&mut self, field: impl Into<String>, value: Option<&String>, max: usize) {
        if let Some(v) = value {
            self.text(field, v, max);
        }
    }

    fn period(&mut self, field: impl Into<String>, start: YearMonth, end: Option<YearMonth>) {
        if let Some(end) = end
            && end < start
        {
            self.push(field, "end must not be before start");
        }
    }

    fn count(&mut self, field: &str, len: usize, max: usize) -> bool {
        if len > max {
            self.push(field, format!("at most {max} entries allowed"));
            return false;
        }
        true
    }
}

/// Returns every issue found; an empty vector means the CV is acceptable.
#[must_use]
pub fn validate(cv: &Cv) -> Vec<CvIssue> {
    let mut issues = Issues::default();

    let p = &cv.personal;
    issues.required("personal.full_name", &p.full_name, MAX_NAME_CHARS);
    issues.optional("personal.title", p.title.as_ref(), MAX_NAME_CHARS);
    issues.optional("personal.email", p.email.as_ref(), MAX_NAME_CHARS);
    issues.optional("personal.phone", p.phone.as_ref(), MAX_NAME_CHARS);
    issues.optional("personal.address", p.address.as_ref(), MAX_TEXT_CHARS);
    issues.optional("personal.nationality", p.nationality.as_ref(), MAX_NAME_CHARS);
    if let Some(dob) = &p.date_of_birth
        && time::Date::parse(dob, time::macros::format_description!("[year]-[month]-[day]"))
            .is_err()
    {
        issues.push("personal.date_of_birth", "must be a date in YYYY-MM-DD form");
    }
    issues.optional("summary", cv.summary.as_ref(), MAX_SUMMARY_CHARS);

    if issues.count("education", cv.education.len(), MAX_ENTRIES) {
        for (i, e) in cv.education.iter().enumerate() {
            let at = |f: &str| format!("education[{i}].{f}");
            issues.required(at("institution"), &e.institution, MAX_NAME_CHARS);
            issues.required(at("degree"), &e.degree, MAX_NAME_CHARS);
            issues.optional(at("field"), e.field.as_ref(), MAX_NAME_CHARS);
            issues.optional(at("description"), e.description.as_ref(), MAX_TEXT_CHARS);
            issues.period(at("end"), e.start, e.end);
        }
    }

    if issues.count("experience", cv.experience.len(), MAX_ENTRIES) {
        for (i, e) in cv.experience.iter().enumerate() {
            let at = |f: &str| format!("experience[{i}].{f}");
            issues.required(at("organization"), &e.organization, MAX_NAME_CHARS);
            issues.required(at("position"), &e.position, MAX_NAME_CHARS);
            issues.optional(at("location"), e.location.as_ref(), MAX_NAME_CHARS);
            issues.optional(at("description"), e.description.as_ref(), MAX_TEXT_CHARS);
            issues.period(at("end"), e.start, e.end);
        }
    }

    if issues.count("certifications", cv.certifications.len(), MAX_ENTRIES) {
        for (i, c) in cv.certifications.iter().enumerate() {
            issues.required(format!("certifications[{i}].name"), &c.name, MAX_NAME_CHARS);
            issues.optional(format!("certifications[{i}].issuer"), c.issuer.as_ref(), MAX_NAME_CHARS);
        }
    }

    if issues.count("publications", cv.publications.len(), MAX_ENTRIES) {
        for (i, p) in cv.publications.iter().enumerate() {
            issues.required(format!("publications[{i}].title"), &p.title, MAX_TEXT_CHARS);
            issues.optional(format!("publications[{i}].journal"), p.journal.as_ref(), MAX_NAME_CHARS);
            issues.optional(format!("publications[{i}].authors"), p.authors.as_ref(), MAX_TEXT_CHARS);
            if let Some(year) = p.year
                && !(1900..=2100).contains(&year)
            {
                issues.push(format!("publications[{i}].year"), "must be between 1900 and 2100");
            }
        }
    }

    if issues.count("skills", cv.skills.len(), MAX_SKILLS) {
        for (i, s) in cv.skills.iter().enumerate() {
            issues.required(format!("skills[{i}]"), s, MAX_NAME_CHARS);
        }
    }

    if issues.count("languages", cv.languages.len(), MAX_ENTRIES) {
        for (i, l) in cv.languages.iter().enumerate() {
            issues.required(format!("languages[{i}].language"), &l.language, MAX_NAME_CHARS);
            issues.optional(format!("languages[{i}].proficiency"), l.proficiency.as_ref(), MAX_NAME_CHARS);
        }
    }

    if issues.count("references", cv.references.len(), MAX_ENTRIES) {
        for (i, r) in cv.references.iter().enumerate() {
            issues.required(format!("references[{i}].name"), &r.name, MAX_NAME_CHARS);
            issues.optional(format!("references[{i}].position"), r.position.as_ref(), MAX_NAME_CHARS);
            issues.optional(format!("references[{i}].contact"), r.contact.as_ref(), MAX_NAME_CHARS);
        }
    }

    issues.0
}
