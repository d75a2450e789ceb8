//! Order independence of listing verification.

use std::fmt::Write as _;

use jobber_verify::listing::{expected_names, verify_listing, verify_listing_contains};
use jobber_verify::{JobDefinition, JobFile, VerifyError};
use proptest::prelude::*;

/// Render `list` output for `names` in the given order.
fn render_listing(names: &[String]) -> String {
    let mut out = String::from("NAME  STATUS  SEC/MIN/HOUR/MDAY/MONTH/WDAY  NEXT RUN TIME  NOTIFY ON ERR\n");
    for name in names {
        writeln!(out, "{name}  Good  * * * * * *  Jan 1 00:00:00 2026  true").unwrap();
    }
    out
}

fn arb_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z][a-z0-9_]{0,11}", 1..8)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: installed job names match the listing whatever order the
    /// scheduler prints them in.
    #[test]
    fn prop_listing_matches_installed_names(names in arb_names(), listed in arb_names()) {
        let file = names
            .iter()
            .fold(JobFile::new(), |file, name| file.with_job(JobDefinition::new(name.clone(), "/bin/true")));

        let mut shuffled = names.clone();
        shuffled.reverse();
        prop_assert!(verify_listing(&render_listing(&shuffled), &file.job_names()).is_ok());

        let same_set = expected_names(&listed.join(",")) == expected_names(&file.job_names());
        prop_assert_eq!(verify_listing(&render_listing(&listed), &file.job_names()).is_ok(), same_set);
    }

    /// Property: containment holds for any subset of the listed names.
    #[test]
    fn prop_listing_contains_every_subset(names in arb_names(), take in 0usize..8) {
        let subset: Vec<_> = names.iter().take(take.max(1)).cloned().collect();
        prop_assert!(verify_listing_contains(&render_listing(&names), &subset.join(",")).is_ok());
    }
}

#[test]
fn header_only_output_is_malformed_not_mismatch() {
    let err = verify_listing(&render_listing(&[]), "foo").unwrap_err();
    assert!(matches!(err, VerifyError::MalformedListing { .. }));
}
