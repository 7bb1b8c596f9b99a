//! Turns a [`Cv`] into positioned text and rules on A4 pages.
//!
//! Layout happens in two passes. [`Composer`] flattens the CV into a list of
//! lines with fonts, spacing and keep-together hints; [`paginate`] then
//! assigns the lines to pages top-down and adds the page footers.

use super::font::{Font, encode_winansi};
use super::wrap::wrap;
use crate::model::{Cv, PersonalInfo, YearMonth, format_period};

pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;

const NAME_SIZE: f32 = 20.0;
const HEADLINE_SIZE: f32 = 12.0;
const HEADING_SIZE: f32 = 13.0;
const ENTRY_TITLE_SIZE: f32 = 11.0;
const BODY_SIZE: f32 = 10.0;
const BODY_LEADING: f32 = 14.0;
const FOOTER_SIZE: f32 = 9.0;
const RULE_DROP: f32 = 5.0;
const DATE_GAP: f32 = 12.0;

/// What a line is, kept on emitted text so callers and tests can inspect the
/// structure of a laid out page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Name,
    Headline,
    Contact,
    Heading,
    EntryTitle,
    Detail,
    Body,
    Footer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Text {
        role: LineRole,
        font: Font,
        size: f32,
        x: f32,
        y: f32,
        text: Vec<u8>,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<Op>,
}

impl Page {
    /// Roles of the text lines on this page, top to bottom.
    pub fn roles(&self) -> impl Iterator<Item = LineRole> + '_ {
        self.ops.iter().filter_map(|op| match op {
            Op::Text { role, .. } => Some(*role),
            Op::Rule { .. } => None,
        })
    }
}

#[derive(Debug, Clone)]
struct Run {
    font: Font,
    size: f32,
    text: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Line {
    role: LineRole,
    left: Run,
    right: Option<Run>,
    height: f32,
    space_before: f32,
    keep_with_next: bool,
    rule_below: bool,
}

struct Composer {
    width: f32,
    lines: Vec<Line>,
}

impl Composer {
    fn new(content_width: f32) -> Self {
        Self {
            width: content_width,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, role: LineRole, font: Font, size: f32, height: f32, text: Vec<u8>) {
        self.lines.push(Line {
            role,
            left: Run { font, size, text },
            right: None,
            height,
            space_before: 0.0,
            keep_with_next: false,
            rule_below: false,
        });
    }

    /// Wraps `text` and appends one line per wrapped row. Newlines split
    /// paragraphs. Returns the number of lines added.
    fn paragraph(&mut self, role: LineRole, font: Font, size: f32, height: f32, text: &str) -> usize {
        let before = self.lines.len();
        for para in text.split('\n') {
            for row in wrap(&encode_winansi(para), font, size, self.width) {
                self.push(role, font, size, height, row);
            }
        }
        self.lines.len() - before
    }

    fn header(&mut self, p: &PersonalInfo) {
        self.paragraph(LineRole::Name, Font::Bold, NAME_SIZE, 26.0, &p.full_name);
        if let Some(title) = non_empty(p.title.as_deref()) {
            self.paragraph(LineRole::Headline, Font::Regular, HEADLINE_SIZE, 17.0, title);
        }
        let contact: Vec<&str> = [
            p.email.as_deref(),
            p.phone.as_deref(),
            p.address.as_deref(),
            p.nationality.as_deref(),
            p.date_of_birth.as_deref(),
        ]
        .into_iter()
        .filter_map(non_empty)
        .collect();
        if !contact.is_empty() {
            self.paragraph(LineRole::Contact, Font::Regular, BODY_SIZE, BODY_LEADING, &contact.join(" | "));
        }
        if let Some(last) = self.lines.last_mut() {
            last.rule_below = true;
            last.height += 8.0;
        }
    }

    fn heading(&mut self, title: &str) {
        self.push(LineRole::Heading, Font::Bold, HEADING_SIZE, 22.0, encode_winansi(title));
        if let Some(line) = self.lines.last_mut() {
            line.space_before = 14.0;
            line.keep_with_next = true;
            line.rule_below = true;
        }
    }

    /// A bold title with an optional right-aligned date, an optional detail
    /// line and an optional wrapped description.
    fn entry(&mut self, first: bool, title: &str, date: Option<String>, detail: Option<String>, description: Option<&str>) {
        let date = date.map(|d| Run {
            font: Font::Regular,
            size: BODY_SIZE,
            text: encode_winansi(&d),
        });
        let date_width = date
            .as_ref()
            .map(|r| r.font.measure(&r.text, r.size) + DATE_GAP)
            .unwrap_or(0.0);
        let title_width = (self.width - date_width).max(self.width / 3.0);

        let start = self.lines.len();
        let rows = wrap(&encode_winansi(title), Font::Bold, ENTRY_TITLE_SIZE, title_width);
        for row in rows {
            self.push(LineRole::EntryTitle, Font::Bold, ENTRY_TITLE_SIZE, 15.0, row);
        }
        if self.lines.len() == start {
            self.push(LineRole::EntryTitle, Font::Bold, ENTRY_TITLE_SIZE, 15.0, Vec::new());
        }
        let title_end = self.lines.len();
        if let Some(first_line) = self.lines.get_mut(start) {
            first_line.right = date;
            if !first {
                first_line.space_before = 6.0;
            }
        }

        if let Some(detail) = detail {
            self.paragraph(LineRole::Detail, Font::Regular, BODY_SIZE, BODY_LEADING, &detail);
        }
        if let Some(desc) = non_empty(description) {
            self.paragraph(LineRole::Body, Font::Regular, BODY_SIZE, BODY_LEADING, desc);
        }
        // Keep the title rows together with the first line after them.
        let total = self.lines.len();
        for line in &mut self.lines[start..title_end.min(total - 1)] {
            line.keep_with_next = true;
        }
    }

    fn text_section(&mut self, title: &str, text: &str) {
        self.heading(title);
        if self.paragraph(LineRole::Body, Font::Regular, BODY_SIZE, BODY_LEADING, text) == 0 {
            self.lines.pop();
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn joined(parts: &[Option<&str>], sep: &str) -> Option<String> {
    let parts: Vec<&str> = parts.iter().copied().filter_map(non_empty).collect();
    (!parts.is_empty()).then(|| parts.join(sep))
}

fn compose(cv: &Cv, content_width: f32) -> Vec<Line> {
    let mut c = Composer::new(content_width);
    c.header(&cv.personal);

    if let Some(summary) = non_empty(cv.summary.as_deref()) {
        c.text_section("Profile", summary);
    }

    if !cv.experience.is_empty() {
        c.heading("Experience");
        for (i, e) in cv.experience.iter().enumerate() {
            c.entry(
                i == 0,
                &e.position,
                format_period(Some(e.start), e.end),
                joined(&[Some(e.organization.as_str()), e.location.as_deref()], ", "),
                e.description.as_deref(),
            );
        }
    }

    if !cv.education.is_empty() {
        c.heading("Education");
        for (i, e) in cv.education.iter().enumerate() {
            let title = match non_empty(e.field.as_deref()) {
                Some(field) => format!("{} in {}", e.degree, field),
                None => e.degree.clone(),
            };
            c.entry(
                i == 0,
                &title,
                format_period(Some(e.start), e.end),
                joined(&[Some(e.institution.as_str())], ""),
                e.description.as_deref(),
            );
        }
    }

    if !cv.certifications.is_empty() {
        c.heading("Certifications");
        for (i, cert) in cv.certifications.iter().enumerate() {
            c.entry(
                i == 0,
                &cert.name,
                cert.date.as_ref().map(YearMonth::display_short),
                joined(&[cert.issuer.as_deref()], ""),
                None,
            );
        }
    }

    if !cv.publications.is_empty() {
        c.heading("Publications");
        for (i, p) in cv.publications.iter().enumerate() {
            c.entry(
                i == 0,
                &p.title,
                p.year.map(|y| y.to_string()),
                joined(&[p.authors.as_deref(), p.journal.as_deref()], ". "),
                None,
            );
        }
    }

    let skills: Vec<&str> = cv.skills.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if !skills.is_empty() {
        c.text_section("Skills", &skills.join(", "));
    }

    if !cv.languages.is_empty() {
        let langs: Vec<String> = cv
            .languages
            .iter()
            .map(|l| match non_empty(l.proficiency.as_deref()) {
                Some(p) => format!("{} ({})", l.language, p),
                None => l.language.clone(),
            })
            .collect();
        c.text_section("Languages", &langs.join(", "));
    }

    if !cv.references.is_empty() {
        c.heading("References");
        for (i, r) in cv.references.iter().enumerate() {
            c.entry(
                i == 0,
                &r.name,
                None,
                joined(&[r.position.as_deref(), r.contact.as_deref()], " | "),
                None,
            );
        }
    }

    c.lines
}

/// Lays out a CV with the given page margin.
#[must_use]
pub fn layout(cv: &Cv, margin: f32) -> Vec<Page> {
    let lines = compose(cv, PAGE_WIDTH - 2.0 * margin);
    paginate(&lines, margin)
}

/// Height of `lines[start]` plus every line chained to it by keep_with_next.
fn chain_height(lines: &[Line], start: usize) -> f32 {
    let mut height = lines[start].height;
    let mut j = start;
    while lines[j].keep_with_next && j + 1 < lines.len() {
        j += 1;
        height += lines[j].space_before + lines[j].height;
    }
    height
}

fn paginate(lines: &[Line], margin: f32) -> Vec<Page> {
    let top = PAGE_HEIGHT - margin;
    let bottom = margin;
    let right_edge = PAGE_WIDTH - margin;

    let mut pages = vec![Page::default()];
    let mut cursor = top;
    let mut page_empty = true;

    for (i, line) in lines.iter().enumerate() {
        // A chain of keep_with_next lines is placed as a unit from its first
        // line, unless it is taller than a page; then it flows line by line.
        let chained = i > 0 && lines[i - 1].keep_with_next;
        let needed = if chained {
            line.height
        } else {
            let chain = chain_height(lines, i);
            if chain <= top - bottom { chain } else { line.height }
        };

        let mut space_before = if page_empty { 0.0 } else { line.space_before };
        if !page_empty && cursor - space_before - needed < bottom {
            pages.push(Page::default());
            cursor = top;
            space_before = 0.0;
        }
        cursor -= space_before;

        let ascent = line
            .right
            .as_ref()
            .map_or(line.left.size, |r| r.size.max(line.left.size));
        let baseline = cursor - ascent;
        let Some(page) = pages.last_mut() else {
            break;
        };

        if !line.left.text.is_empty() {
            page.ops.push(Op::Text {
                role: line.role,
                font: line.left.font,
                size: line.left.size,
                x: margin,
                y: baseline,
                text: line.left.text.clone(),
            });
        }
        if let Some(right) = &line.right {
            let width = right.font.measure(&right.text, right.size);
            page.ops.push(Op::Text {
                role: line.role,
                font: right.font,
                size: right.size,
                x: right_edge - width,
                y: baseline,
                text: right.text.clone(),
            });
        }
        if line.rule_below {
            page.ops.push(Op::Rule {
                x1: margin,
                x2: right_edge,
                y: baseline - RULE_DROP,
            });
        }

        cursor -= line.height;
        page_empty = false;
    }

    let total = pages.len();
    for (n, page) in pages.iter_mut().enumerate() {
        let text = encode_winansi(&format!("Page {} of {}", n + 1, total));
        let width = Font::Regular.measure(&text, FOOTER_SIZE);
        page.ops.push(Op::Text {
            role: LineRole::Footer,
            font: Font::Regular,
            size: FOOTER_SIZE,
            x: (PAGE_WIDTH - width) / 2.0,
            y: margin / 2.0,
            text,
        });
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Experience, Language, Publication};

    fn ym(y: u16, m: u8) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn base() -> Cv {
        Cv {
            personal: PersonalInfo {
                full_name: "Ada Lovelace".into(),
                title: Some("Registrar in Acute Medicine".into()),
                email: Some("ada@example.org".into()),
                phone: Some("+44 20 7946 0000".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn job(i: usize) -> Experience {
        Experience {
            organization: format!("General Hospital {i}"),
            position: "Specialty Registrar".into(),
            location: Some("London".into()),
            start: ym(2015, 8),
            end: None,
            description: Some(
                "Led the acute medical take, supervised junior doctors and taught \
                 final year students on the wards and in simulation sessions."
                    .into(),
            ),
        }
    }

    fn texts(page: &Page, role: LineRole) -> Vec<String> {
        page.ops
            .iter()
            .filter_map(|op| match op {
                Op::Text { role: r, text, .. } if *r == role => {
                    Some(String::from_utf8_lossy(text).into_owned())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn header_and_empty_sections() {
        let pages = layout(&base(), 50.0);
        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert_eq!(texts(page, LineRole::Name), vec!["Ada Lovelace"]);
        assert_eq!(texts(page, LineRole::Contact), vec!["ada@example.org | +44 20 7946 0000"]);
        assert!(texts(page, LineRole::Heading).is_empty());
        assert_eq!(texts(page, LineRole::Footer), vec!["Page 1 of 1"]);
        // One rule under the header.
        assert_eq!(page.ops.iter().filter(|op| matches!(op, Op::Rule { .. })).count(), 1);
    }

    #[test]
    fn dates_are_right_aligned() {
        let mut cv = base();
        cv.experience.push(job(1));
        let pages = layout(&cv, 50.0);
        let date = pages[0]
            .ops
            .iter()
            .find_map(|op| match op {
                Op::Text { role: LineRole::EntryTitle, x, size, font, text, .. }
                    if text.as_slice() == b"Aug 2015 - Present" =>
                {
                    Some(x + font.measure(text, *size))
                }
                _ => None,
            })
            .expect("date run");
        assert!((date - (PAGE_WIDTH - 50.0)).abs() < 0.01);
    }

    #[test]
    fn sections_in_order_and_skills_joined() {
        let mut cv = base();
        cv.summary = Some("Curious clinician.".into());
        cv.skills = vec!["Suturing".into(), " ".into(), "Ultrasound".into()];
        cv.languages = vec![Language { language: "French".into(), proficiency: Some("B2".into()) }];
        let pages = layout(&cv, 50.0);
        assert_eq!(texts(&pages[0], LineRole::Heading), vec!["Profile", "Skills", "Languages"]);
        let body = texts(&pages[0], LineRole::Body);
        assert!(body.contains(&"Suturing, Ultrasound".to_string()));
        assert!(body.contains(&"French (B2)".to_string()));
    }

    #[test]
    fn long_cv_paginates_with_footers() {
        let mut cv = base();
        cv.experience = (0..40).map(job).collect();
        let pages = layout(&cv, 50.0);
        assert!(pages.len() >= 3, "got {} pages", pages.len());
        let n = pages.len();
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(texts(page, LineRole::Footer), vec![format!("Page {} of {n}", i + 1)]);
            for op in &page.ops {
                if let Op::Text { role, y, .. } = op
                    && *role != LineRole::Footer
                {
                    assert!(*y >= 50.0 && *y <= PAGE_HEIGHT - 50.0, "y={y} out of content box");
                }
            }
        }
    }

    #[test]
    fn headings_never_end_a_page() {
        // Vary the amount of text before a heading so it lands at every
        // possible position near the bottom of the first page.
        for padding in 0..40 {
            let mut cv = base();
            cv.summary = Some(vec!["Line of profile text."; padding].join("\n"));
            cv.experience = vec![job(1), job(2)];
            cv.skills = vec!["Suturing".into()];
            for page in layout(&cv, 50.0) {
                let roles: Vec<LineRole> = page.roles().filter(|r| *r != LineRole::Footer).collect();
                assert_ne!(roles.last(), Some(&LineRole::Heading), "padding {padding}");
                assert_ne!(roles.last(), Some(&LineRole::EntryTitle), "padding {padding}");
            }
        }
    }

    #[test]
    fn title_taller_than_a_page_flows_across_pages() {
        let mut cv = base();
        cv.publications = vec![Publication {
            title: "Outcomes of early mobilisation after hip fracture surgery. "
                .repeat(35)
                .chars()
                .take(2000)
                .collect(),
            journal: Some("Injury".into()),
            year: Some(2021),
            authors: None,
        }];

        let narrow = layout(&cv, 150.0);
        assert!(narrow.len() <= 3, "got {} pages", narrow.len());
        // Every page but the last is filled with title rows, not one row each.
        for (i, page) in narrow[..narrow.len() - 1].iter().enumerate() {
            let rows = texts(page, LineRole::EntryTitle).len();
            assert!(rows >= 10, "page {} holds {rows} title rows", i + 1);
        }
        let rows: usize = narrow.iter().map(|p| texts(p, LineRole::EntryTitle).len()).sum();
        assert!(rows > 30);

        assert_eq!(layout(&cv, 50.0).len(), 1);
    }

    #[test]
    fn wider_margin_means_more_pages() {
        let mut cv = base();
        cv.experience = (0..20).map(job).collect();
        assert!(layout(&cv, 120.0).len() > layout(&cv, 40.0).len());
    }
}
