//! Cache key definitions.

use std::fmt;

use crate::domain::scans::ScanRef;

/// Identifies one cached scan page.
///
/// Renders as `ch_<chapter>_pg_<page>` with the page zero-padded to two digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    chapter: u32,
    page: u32,
}

impl From<&ScanRef> for CacheKey {
    fn from(scan: &ScanRef) -> Self {
        Self {
            chapter: scan.chapter(),
            page: scan.page(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch_{}_pg_{:02}", self.chapter, self.page)
    }
}
