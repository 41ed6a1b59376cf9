//! Scan page references.
//!
//! A [`ScanRef`] identifies one page image of one chapter. It can only be
//! built from request parameters through [`ScanRef::parse`], so every value
//! in circulation has already passed canonical-form and range validation.

use std::fmt;

use super::error::DomainError;

/// Lowest page number a chapter can contain.
pub const MIN_PAGE: u32 = 1;
/// Default lowest accepted chapter number.
pub const DEFAULT_MIN_CHAPTER: u32 = 1;

/// Accepted chapter numbers. The upper bound is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterRange {
    min: u32,
    max: Option<u32>,
}

impl ChapterRange {
    pub fn new(min: u32, max: Option<u32>) -> Result<Self, DomainError> {
        if let Some(max) = max
            && max < min
        {
            return Err(DomainError::invariant(format!(
                "chapter upper bound {max} is below lower bound {min}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    pub fn contains(&self, chapter: u32) -> bool {
        chapter >= self.min && self.max.is_none_or(|max| chapter <= max)
    }
}

impl Default for ChapterRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_CHAPTER,
            max: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanRef {
    chapter: u32,
    page: u32,
}

impl ScanRef {
    /// Validate raw path parameters and build a reference.
    pub fn parse(chapter: &str, page: &str, range: &ChapterRange) -> Result<Self, DomainError> {
        let chapter = parse_canonical("chapter", chapter)?;
        let page = parse_canonical("page", page)?;

        if !range.contains(chapter) {
            let message = match range.max() {
                Some(max) => format!("must be between {} and {max}", range.min()),
                None => format!("must be at least {}", range.min()),
            };
            return Err(DomainError::validation("chapter", message));
        }
        if page < MIN_PAGE {
            return Err(DomainError::validation(
                "page",
                format!("must be at least {MIN_PAGE}"),
            ));
        }

        Ok(Self { chapter, page })
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Page number zero-padded to two digits. Wider numbers are kept as-is.
    pub fn padded_page(&self) -> String {
        format!("{:02}", self.page)
    }

    /// Path of the page image relative to the origin base URL.
    pub fn origin_path(&self) -> String {
        format!("files/scans/OP{}/{}.png", self.chapter, self.padded_page())
    }
}

impl fmt::Display for ScanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OP{}/{}", self.chapter, self.padded_page())
    }
}

fn parse_canonical(field: &'static str, raw: &str) -> Result<u32, DomainError> {
    if raw.is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::validation(
            field,
            format!("`{raw}` is not a non-negative integer"),
        ));
    }
    if raw.len() > 1 && raw.starts_with('0') {
        let trimmed = raw.trim_start_matches('0');
        let canonical = if trimmed.is_empty() { "0" } else { trimmed };
        return Err(DomainError::validation(
            field,
            format!("`{raw}` has leading zeros; use `{canonical}`"),
        ));
    }
    raw.parse::<u32>()
        .map_err(|_| DomainError::validation(field, format!("`{raw}` is out of range")))
}
