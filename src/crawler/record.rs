//! Job records produced by the page fetcher and the completeness filter.
//!
//! - `RawJobRecord`: flat string fields as scraped from one listing item
//! - `ValidatedJobRecord`: a raw record that passed `validate`
//!
//! Partially-rendered listing items are expected noise, so incomplete records
//! are dropped without being reported as errors.

use serde::{Deserialize, Serialize};

/// Identifies one page of listings. Pages start at 1.
pub type PageNumber = u32;

/// A job record as extracted from a listing page, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJobRecord {
    pub title: String,
    pub company: String,
    pub location: String,
    pub career: String,
    pub education: String,
    pub salary: String,
    #[serde(default)]
    pub sectors: Vec<String>,
    pub link: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

impl RawJobRecord {
    /// Returns the name of the first required field that is missing, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        let required = [
            ("title", &self.title),
            ("company", &self.company),
            ("location", &self.location),
            ("career", &self.career),
            ("education", &self.education),
            ("salary", &self.salary),
            ("link", &self.link),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Some(name);
            }
        }

        if self.sectors.is_empty() {
            return Some("sectors");
        }

        None
    }

    /// Returns true when every required field is present and non-empty.
    pub fn is_complete(&self) -> bool {
        self.missing_field().is_none()
    }
}

/// A job record that passed the completeness check.
///
/// Only constructible through [`validate`], so holding one is proof that all
/// required fields are populated. Fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidatedJobRecord(RawJobRecord);

impl ValidatedJobRecord {
    pub fn title(&self) -> &str {
        &self.0.title
    }

    pub fn company(&self) -> &str {
        &self.0.company
    }

    pub fn location(&self) -> &str {
        &self.0.location
    }

    pub fn career(&self) -> &str {
        &self.0.career
    }

    pub fn education(&self) -> &str {
        &self.0.education
    }

    pub fn salary(&self) -> &str {
        &self.0.salary
    }

    pub fn sectors(&self) -> &[String] {
        &self.0.sectors
    }

    pub fn link(&self) -> &str {
        &self.0.link
    }

    pub fn position(&self) -> Option<&str> {
        self.0.position.as_deref()
    }

    pub fn tech_stack(&self) -> &[String] {
        &self.0.tech_stack
    }

    /// Borrows the underlying raw record.
    pub fn as_raw(&self) -> &RawJobRecord {
        &self.0
    }

    pub fn into_raw(self) -> RawJobRecord {
        self.0
    }
}

/// Validates a raw record, returning it wrapped when complete.
///
/// Policy: title, company, location, career, education, salary and link must
/// be non-empty after trimming, and the sector list must have at least one
/// entry, blank or not. Blank sector tags are removed from accepted records,
/// which may leave an accepted record with no sectors.
pub fn validate(mut record: RawJobRecord) -> Option<ValidatedJobRecord> {
    if let Some(field) = record.missing_field() {
        tracing::trace!(field, link = %record.link, "Dropping incomplete listing item");
        return None;
    }

    record.sectors.retain(|s| !s.trim().is_empty());
    record.tech_stack.retain(|s| !s.trim().is_empty());
    if record.position.as_deref().is_some_and(|p| p.trim().is_empty()) {
        record.position = None;
    }

    Some(ValidatedJobRecord(record))
}

/// Filters a page worth of raw records, returning survivors and the number
/// of records dropped.
pub fn filter_records(records: Vec<RawJobRecord>) -> (Vec<ValidatedJobRecord>, usize) {
    let total = records.len();
    let kept: Vec<ValidatedJobRecord> = records.into_iter().filter_map(validate).collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

#[cfg(test)]
pub(crate) fn sample_record(link: &str) -> RawJobRecord {
    RawJobRecord {
        title: "Backend Engineer".to_string(),
        company: "Acme Corp".to_string(),
        location: "Seoul Gangnam-gu".to_string(),
        career: "3+ years".to_string(),
        education: "Bachelor's".to_string(),
        salary: "Negotiable".to_string(),
        sectors: vec!["Backend".to_string(), "Server".to_string()],
        link: link.to_string(),
        position: None,
        tech_stack: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_record_is_accepted() {
        let record = sample_record("https://jobs.example.com/view?id=1");
        let validated = validate(record.clone()).expect("complete record should validate");

        assert_eq!(validated.title(), "Backend Engineer");
        assert_eq!(validated.sectors().len(), 2);
        assert_eq!(validated.as_raw(), &record);
    }

    #[test]
    fn test_each_required_field_is_enforced() {
        let clear: [(&str, fn(&mut RawJobRecord)); 7] = [
            ("title", |r| r.title.clear()),
            ("company", |r| r.company.clear()),
            ("location", |r| r.location.clear()),
            ("career", |r| r.career.clear()),
            ("education", |r| r.education.clear()),
            ("salary", |r| r.salary.clear()),
            ("link", |r| r.link.clear()),
        ];

        for (field, apply) in clear {
            let mut record = sample_record("https://jobs.example.com/view?id=2");
            apply(&mut record);
            assert_eq!(record.missing_field(), Some(field));
            assert!(validate(record).is_none(), "record without {field} accepted");
        }
    }

    #[test]
    fn test_whitespace_only_field_is_missing() {
        let mut record = sample_record("https://jobs.example.com/view?id=3");
        record.salary = "   \n ".to_string();
        assert_eq!(record.missing_field(), Some("salary"));
    }

    #[test]
    fn test_sectors_must_be_non_empty() {
        let mut record = sample_record("https://jobs.example.com/view?id=4");
        record.sectors.clear();
        assert_eq!(record.missing_field(), Some("sectors"));
        assert!(validate(record).is_none());
    }

    #[test]
    fn test_blank_sector_tags_count_as_present() {
        let mut record = sample_record("https://jobs.example.com/view?id=8");
        record.sectors = vec![" ".to_string()];
        assert_eq!(record.missing_field(), None);

        let validated = validate(record).expect("blank sector tag still counts");
        assert!(validated.sectors().is_empty());
    }

    #[test]
    fn test_blank_optional_fields_are_normalized() {
        let mut record = sample_record("https://jobs.example.com/view?id=5");
        record.sectors.push("  ".to_string());
        record.position = Some(" ".to_string());
        record.tech_stack = vec!["Rust".to_string(), String::new()];

        let validated = validate(record).expect("should validate");
        assert_eq!(validated.sectors(), ["Backend", "Server"]);
        assert_eq!(validated.position(), None);
        assert_eq!(validated.tech_stack(), ["Rust"]);
    }

    #[test]
    fn test_filter_records_counts_dropped() {
        let mut broken = sample_record("https://jobs.example.com/view?id=6");
        broken.company.clear();

        let (kept, dropped) = filter_records(vec![
            sample_record("https://jobs.example.com/view?id=7"),
            broken,
            RawJobRecord::default(),
        ]);

        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 2);
    }
}
