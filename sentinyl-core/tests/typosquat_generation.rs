//! End-to-end checks of typosquat candidate generation against a real
//! banking-style domain.

use std::collections::HashSet;

use sentinyl_core::fuzzer::DomainFuzzer;

#[test]
fn examplebank_candidates_cover_all_eight_families() {
    let variations = DomainFuzzer::new("examplebank.com").generate_variations();
    let set: HashSet<&str> = variations.iter().map(String::as_str).collect();

    // One witness per permutation family.
    assert!(set.contains("exampebank.com"), "omission");
    assert!(set.contains("eexamplebank.com"), "repetition");
    assert!(set.contains("xeamplebank.com"), "transposition");
    assert!(set.contains("3xamplebank.com"), "homoglyph");
    assert!(set.contains("wxamplebank.com"), "keyboard typo");
    assert!(set.contains("examplebank.net"), "tld swap");
    assert!(set.contains("example-bank.com"), "hyphenation");
    assert!(set.contains("www-examplebank.com"), "subdomain prefix");
}

#[test]
fn candidate_sets_are_reproducible_and_well_formed() {
    let first = DomainFuzzer::new("examplebank.com").generate_variations();
    let second = DomainFuzzer::new("examplebank.com").generate_variations();

    let first_set: HashSet<&str> = first.iter().map(String::as_str).collect();
    let second_set: HashSet<&str> = second.iter().map(String::as_str).collect();
    assert_eq!(first_set, second_set);
    assert_eq!(first.len(), second.len());

    for candidate in &first {
        assert_ne!(candidate, "examplebank.com");
        assert_eq!(candidate.matches('.').count(), 1, "{candidate}");
        let (label, tld) = candidate.rsplit_once('.').unwrap();
        assert!(!label.is_empty() && !tld.is_empty(), "{candidate}");
    }
}

#[test]
fn tld_swaps_cover_the_common_list_except_the_original() {
    let variations = DomainFuzzer::new("examplebank.com").generate_variations();
    let set: HashSet<&str> = variations.iter().map(String::as_str).collect();

    for tld in ["net", "org", "co", "io", "app", "dev", "ai", "info", "biz", "online", "site", "tech", "store"] {
        let candidate = format!("examplebank.{tld}");
        assert!(set.contains(candidate.as_str()), "{candidate}");
    }
    assert!(!set.contains("examplebank.com"));
}
