//! Shared error plumbing for the workspace.
//!
//! Every error type in the workspace records where it was raised through an
//! implicit [`Location`] field, and binaries render errors with [`Report`].

#![no_std]

extern crate alloc;

use alloc::{boxed::Box, string::String};
use core::{error::Error, fmt};

use snafu::{GenerateImplicitData, Snafu};

/// Source location captured when an error value is constructed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl Location {
    #[must_use]
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Catch-all error for binaries and tests, built with `snafu::whatever!`.
#[derive(Debug, Snafu)]
#[snafu(whatever, display("{message}"))]
pub struct GenericError {
    message: String,
    #[snafu(implicit)]
    location: Location,
    #[snafu(source(from(Box<dyn Error + Send + Sync>, Some)))]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl GenericError {
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }
}

/// Renders an error followed by its `source()` chain.
///
/// Errors in the chain that are [`GenericError`]s also print where they were
/// raised.
///
/// ```text
/// Error: pool exhausted after 12 allocations
///   at crates/stress/src/main.rs:159:14
///
/// Caused by:
///    0: failed to obtain 64 KiB of backing storage
/// ```
pub struct Report<E> {
    error: E,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.error)?;
        if let Some(loc) = location_of(&self.error) {
            writeln!(f, "  at {loc}")?;
        }
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {s}")?;
            if let Some(loc) = location_of(s) {
                writeln!(f, "      at {loc}")?;
            }
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

fn location_of(error: &(dyn Error + 'static)) -> Option<Location> {
    error.downcast_ref::<GenericError>().map(GenericError::location)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::{format, string::ToString as _};

    use snafu::{ResultExt as _, whatever};

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("inner failure"))]
    struct InnerError;

    fn fails() -> Result<(), GenericError> {
        let res: Result<(), InnerError> = Err(InnerError);
        res.whatever_context("outer failure")?;
        Ok(())
    }

    #[test]
    fn test_report_renders_source_chain() {
        let err = fails().unwrap_err();
        let rendered = format!("{}", Report::new(err));
        assert!(rendered.starts_with("Error: outer failure\n"));
        assert!(rendered.contains("Caused by:"));
        assert!(rendered.contains("   0: inner failure"));
    }

    #[test]
    fn test_report_without_source() {
        fn plain() -> Result<(), GenericError> {
            whatever!("nothing underneath");
        }
        let rendered = Report::new(plain().unwrap_err()).to_string();
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("Error: nothing underneath"));
        assert!(lines.next().is_some_and(|l| l.starts_with("  at ")));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_report_prints_location_of_each_generic_error() {
        fn nested() -> Result<(), GenericError> {
            fails().whatever_context("wrapping failure")?;
            Ok(())
        }
        let err = nested().unwrap_err();
        let outer = err.location();
        let rendered = Report::new(err).to_string();
        let lines = rendered.lines().collect::<alloc::vec::Vec<_>>();
        assert_eq!(lines[0], "Error: wrapping failure");
        assert_eq!(lines[1], format!("  at {outer}"));
        assert_eq!(lines[4], "   0: outer failure");
        assert!(lines[5].starts_with("      at ") && lines[5].contains("lib.rs:"));
        assert_eq!(lines[6], "   1: inner failure");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_location_points_at_caller() {
        let err = fails().unwrap_err();
        assert!(err.location().file().ends_with("lib.rs"));
        assert!(err.location().line() > 0);
    }
}
