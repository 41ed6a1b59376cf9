//! Human-readable byte counts for logs and operator-facing messages.

use std::fmt;

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Displays a byte count in IEC units, e.g. `1.5 KiB` or `10 GiB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scaled = self.0 as f64;
        let mut unit = 0;
        while scaled >= 1024.0 && unit < UNITS.len() - 1 {
            scaled /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            return write!(f, "{} B", self.0);
        }

        let precision = if scaled >= 10.0 { 1 } else { 2 };
        let rendered = format!("{scaled:.precision$}");
        let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
        write!(f, "{trimmed} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::ByteSize;

    #[test]
    fn scales_units() {
        assert_eq!(ByteSize(0).to_string(), "0 B");
        assert_eq!(ByteSize(1023).to_string(), "1023 B");
        assert_eq!(ByteSize(1024).to_string(), "1 KiB");
        assert_eq!(ByteSize(1536).to_string(), "1.5 KiB");
        assert_eq!(ByteSize(10 * 1024 * 1024 * 1024).to_string(), "10 GiB");
        assert_eq!(ByteSize(3 * 1024 * 1024 + 256 * 1024).to_string(), "3.25 MiB");
    }
}
