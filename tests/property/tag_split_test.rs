//! Property-based tests for tag string splitting and normalization.
//!
//! These verify that `split_tags` always produces a clean list (no blanks,
//! no duplicates, input order preserved) and that normalization is
//! idempotent under re-splitting.

use proptest::prelude::*;
use utags_store::managers::bookmark_store::{normalize_tag_list, split_tags};

/// Strategy for a single comma-free tag.
fn arb_tag() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_-]{0,11}"
}

/// Strategy for a raw comma-joined input with messy whitespace and empty
/// segments mixed in.
fn arb_raw_input() -> impl Strategy<Value = (Vec<String>, String)> {
    prop::collection::vec(arb_tag(), 0..8).prop_flat_map(|tags| {
        let joined = tags.join(" , ");
        let tags_clone = tags.clone();
        prop_oneof![
            Just(joined.clone()),
            Just(format!(",, {joined} ,")),
            Just(tags_clone.join(",")),
        ]
        .prop_map(move |raw| (tags.clone(), raw))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    // **Property: splitting yields exactly the distinct input tags in
    // first-occurrence order, regardless of whitespace and empty segments.**
    #[test]
    fn split_preserves_distinct_tags_in_order((tags, raw) in arb_raw_input()) {
        let mut expected: Vec<String> = Vec::new();
        for tag in &tags {
            if !expected.contains(tag) {
                expected.push(tag.clone());
            }
        }
        prop_assert_eq!(split_tags(&raw), expected);
    }

    // **Property: the output never contains a blank or duplicate entry.**
    #[test]
    fn split_output_is_clean((_tags, raw) in arb_raw_input()) {
        let out = split_tags(&raw);
        for (i, tag) in out.iter().enumerate() {
            prop_assert!(!tag.is_empty());
            prop_assert_eq!(tag, tag.trim());
            prop_assert!(!out[..i].contains(tag));
        }
    }

    // **Property: re-splitting a joined clean list is the identity.**
    #[test]
    fn split_is_idempotent((_tags, raw) in arb_raw_input()) {
        let once = split_tags(&raw);
        let again = split_tags(&once.join(","));
        prop_assert_eq!(once, again);
    }

    // **Property: list normalization agrees with string splitting.**
    #[test]
    fn normalize_list_matches_split(tags in prop::collection::vec(arb_tag(), 0..8)) {
        let from_list = normalize_tag_list(&tags);
        let from_string = split_tags(&tags.join(","));
        prop_assert_eq!(from_list, from_string);
    }
}
