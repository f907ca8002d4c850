//! Bounded text formatting for telemetry annotations.

use std::fmt::{self, Write};

use crate::error::{PibError, PibResult};

/// Longest annotation the telemetry framer carries, in bytes.
pub const MAX_ANNOTATION_LEN: usize = 100;

struct BoundedWriter {
    buf: String,
    max: usize,
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buf.len() + s.len() > self.max {
            return Err(fmt::Error);
        }
        self.buf.push_str(s);
        Ok(())
    }
}

/// Format `args` into a string of at most `max` bytes.
///
/// Text that would not fit is an error rather than a truncation.
pub fn format_bounded(max: usize, args: fmt::Arguments<'_>) -> PibResult<String> {
    let mut writer = BoundedWriter {
        buf: String::with_capacity(max),
        max,
    };
    writer
        .write_fmt(args)
        .map_err(|_| PibError::TextOverflow { max })?;
    Ok(writer.buf)
}

/// [`format_bounded`] with the annotation limit.
#[macro_export]
macro_rules! annotation {
    ($($arg:tt)*) => {
        $crate::text::format_bounded($crate::text::MAX_ANNOTATION_LEN, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits() {
        let text = format_bounded(16, format_args!("Docking {:.1} revs", 0.5)).unwrap();
        assert_eq!(text, "Docking 0.5 revs");
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = format_bounded(8, format_args!("Retracting {:.1} revs", 4.5)).unwrap_err();
        assert!(matches!(err, PibError::TextOverflow { max: 8 }));
    }

    #[test]
    fn test_annotation_macro_limit() {
        let long = "x".repeat(MAX_ANNOTATION_LEN + 1);
        assert!(crate::annotation!("{}", long).is_err());
        let exact = "x".repeat(MAX_ANNOTATION_LEN);
        assert_eq!(crate::annotation!("{}", exact).unwrap().len(), MAX_ANNOTATION_LEN);
    }
}
