//! Verification of `list` output.
//!
//! The first line is a header; every following line starts with a job name.
//! Row order is not meaningful, so names are compared as sets.

use std::collections::BTreeSet;

use crate::error::{Result, VerifyError};

/// Parsed `list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    names: Vec<String>,
}

impl Listing {
    /// Parse raw `list` output.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::MalformedListing`] if there is no row after
    /// the header, or a row is blank.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut lines = trimmed.split('\n');
        let malformed = || VerifyError::MalformedListing {
            output: raw.to_string(),
        };
        let _header = lines.next();
        let names = lines
            .map(|line| line.split_whitespace().next().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;
        if names.is_empty() {
            return Err(malformed());
        }
        Ok(Self { names })
    }

    /// Job names in listing order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Distinct job names.
    #[must_use]
    pub fn name_set(&self) -> BTreeSet<String> {
        self.names.iter().cloned().collect()
    }
}

/// Split a comma-separated list of names into a set, ignoring surrounding
/// whitespace and empty entries.
#[must_use]
pub fn expected_names(expected: &str) -> BTreeSet<String> {
    expected
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fail unless `raw` lists exactly the jobs in `expected`.
///
/// # Errors
///
/// Returns [`VerifyError::MalformedListing`] or
/// [`VerifyError::ListingMismatch`].
pub fn verify_listing(raw: &str, expected: &str) -> Result<()> {
    let actual = Listing::parse(raw)?.name_set();
    let expected = expected_names(expected);
    if actual != expected {
        return Err(VerifyError::ListingMismatch { expected, actual });
    }
    Ok(())
}

/// Fail unless `raw` lists every job in `expected`, possibly among others.
///
/// `list -a` includes other users' jobs, so an all-users check can only
/// require containment.
///
/// # Errors
///
/// Returns [`VerifyError::MalformedListing`] or
/// [`VerifyError::ListingMismatch`].
pub fn verify_listing_contains(raw: &str, expected: &str) -> Result<()> {
    let actual = Listing::parse(raw)?.name_set();
    let expected = expected_names(expected);
    if !actual.is_superset(&expected) {
        return Err(VerifyError::ListingMismatch { expected, actual });
    }
    Ok(())
}
