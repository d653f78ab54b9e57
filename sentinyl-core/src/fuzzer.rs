//! Typosquat candidate generation.
//!
//! Eight permutation families over the registrable label of a domain,
//! deduplicated and with the original removed. Iteration order within a
//! family is insertion order; the overall *set* is stable for a given
//! input.

use std::collections::HashSet;

use tracing::info;

/// TLDs tried by the swap family.
const COMMON_TLDS: &[&str] = &[
    "com", "net", "org", "co", "io", "app", "dev", "ai", "info", "biz", "online", "site", "tech",
    "store",
];

/// Visually confusable substitutions.
const HOMOGLYPHS: &[(char, &[char])] = &[
    ('a', &['4', '@']),
    ('e', &['3']),
    ('i', &['1', 'l']),
    ('o', &['0']),
    ('s', &['5', '$']),
    ('l', &['1', 'i']),
    ('g', &['9']),
    ('b', &['8']),
];

/// QWERTY adjacency; only the first two neighbors of each key are used.
const KEYBOARD: &[(char, &[char])] = &[
    ('q', &['w', 'a']),
    ('w', &['q', 'e', 's']),
    ('e', &['w', 'r', 'd']),
    ('r', &['e', 't', 'f']),
    ('t', &['r', 'y', 'g']),
    ('y', &['t', 'u', 'h']),
    ('u', &['y', 'i', 'j']),
    ('i', &['u', 'o', 'k']),
    ('o', &['i', 'p', 'l']),
    ('p', &['o', 'l']),
    ('a', &['q', 's', 'z']),
    ('s', &['a', 'w', 'd', 'x']),
    ('d', &['s', 'e', 'f', 'c']),
    ('f', &['d', 'r', 'g', 'v']),
    ('g', &['f', 't', 'h', 'b']),
    ('h', &['g', 'y', 'j', 'n']),
    ('j', &['h', 'u', 'k', 'm']),
    ('k', &['j', 'i', 'l']),
    ('l', &['k', 'o']),
    ('z', &['a', 'x']),
    ('x', &['z', 's', 'c']),
    ('c', &['x', 'd', 'v']),
    ('v', &['c', 'f', 'b']),
    ('b', &['v', 'g', 'n']),
    ('n', &['b', 'h', 'm']),
    ('m', &['n', 'j']),
];

const SUBDOMAIN_PREFIXES: &[&str] = &["www", "secure", "login", "account", "verify", "update"];

/// Generates typosquat candidates for one target domain.
#[derive(Debug, Clone)]
pub struct DomainFuzzer {
    domain: String,
    name: String,
    tld: String,
}

impl DomainFuzzer {
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim().to_lowercase();

        let (name, tld) = match domain.rsplit_once('.') {
            Some((name, tld)) => (name.to_string(), tld.to_string()),
            None => (domain.clone(), "com".to_string()),
        };

        info!(
            "Initialized DomainFuzzer for: {} (name={}, tld={})",
            domain, name, tld
        );

        Self { domain, name, tld }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// All candidate domains, deduplicated, original excluded.
    pub fn generate_variations(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut variations = Vec::new();

        let families = [
            self.omission(),
            self.repetition(),
            self.transposition(),
            self.homoglyph(),
            self.keyboard_typos(),
            self.tld_swap(),
            self.hyphenation(),
            self.subdomain_prefix(),
        ];

        for candidate in families.into_iter().flatten() {
            if candidate != self.domain && seen.insert(candidate.clone()) {
                variations.push(candidate);
            }
        }

        info!("Generated {} domain variations", variations.len());
        variations
    }

    fn with_tld(&self, label: String) -> String {
        format!("{label}.{}", self.tld)
    }

    /// Drop each character in turn; labels shorter than 3 are skipped.
    fn omission(&self) -> Vec<String> {
        let chars: Vec<char> = self.name.chars().collect();
        (0..chars.len())
            .filter_map(|i| {
                let mut label = chars.clone();
                label.remove(i);
                if label.len() > 2 {
                    Some(self.with_tld(label.into_iter().collect()))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Double each character in turn.
    fn repetition(&self) -> Vec<String> {
        let chars: Vec<char> = self.name.chars().collect();
        (0..chars.len())
            .map(|i| {
                let mut label = chars.clone();
                label.insert(i, chars[i]);
                self.with_tld(label.into_iter().collect())
            })
            .collect()
    }

    /// Swap each adjacent pair.
    fn transposition(&self) -> Vec<String> {
        let chars: Vec<char> = self.name.chars().collect();
        (0..chars.len().saturating_sub(1))
            .map(|i| {
                let mut label = chars.clone();
                label.swap(i, i + 1);
                self.with_tld(label.into_iter().collect())
            })
            .collect()
    }

    /// Substitute visually similar characters.
    fn homoglyph(&self) -> Vec<String> {
        let chars: Vec<char> = self.name.chars().collect();
        let mut results = Vec::new();
        for (i, c) in chars.iter().enumerate() {
            if let Some((_, substitutes)) = HOMOGLYPHS.iter().find(|(k, _)| k == c) {
                for &sub in *substitutes {
                    let mut label = chars.clone();
                    label[i] = sub;
                    results.push(self.with_tld(label.into_iter().collect()));
                }
            }
        }
        results
    }

    /// Replace each key with its two nearest QWERTY neighbors.
    fn keyboard_typos(&self) -> Vec<String> {
        let chars: Vec<char> = self.name.chars().collect();
        let mut results = Vec::new();
        for (i, c) in chars.iter().enumerate() {
            if let Some((_, adjacent)) = KEYBOARD.iter().find(|(k, _)| k == c) {
                for &neighbor in adjacent.iter().take(2) {
                    let mut label = chars.clone();
                    label[i] = neighbor;
                    results.push(self.with_tld(label.into_iter().collect()));
                }
            }
        }
        results
    }

    /// Same label under the common TLDs.
    fn tld_swap(&self) -> Vec<String> {
        COMMON_TLDS
            .iter()
            .filter(|&&tld| tld != self.tld)
            .map(|tld| format!("{}.{tld}", self.name))
            .collect()
    }

    /// Insert a hyphen at interior positions of labels of length >= 4.
    fn hyphenation(&self) -> Vec<String> {
        let chars: Vec<char> = self.name.chars().collect();
        if chars.len() < 4 {
            return Vec::new();
        }
        (2..chars.len() - 1)
            .map(|i| {
                let mut label = chars.clone();
                label.insert(i, '-');
                self.with_tld(label.into_iter().collect())
            })
            .collect()
    }

    /// Prepend common subdomain-looking prefixes, hyphenated and fused.
    fn subdomain_prefix(&self) -> Vec<String> {
        let mut results = Vec::new();
        for prefix in SUBDOMAIN_PREFIXES {
            results.push(self.with_tld(format!("{prefix}-{}", self.name)));
            results.push(self.with_tld(format!("{prefix}{}", self.name)));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variations(domain: &str) -> Vec<String> {
        DomainFuzzer::new(domain).generate_variations()
    }

    #[test]
    fn contains_one_representative_of_each_family() {
        let vars = variations("examplebank.com");

        assert!(vars.contains(&"exampebank.com".to_string()), "omission");
        assert!(vars.contains(&"eexamplebank.com".to_string()), "repetition");
        assert!(vars.contains(&"xeamplebank.com".to_string()), "transposition");
        assert!(vars.contains(&"3xamplebank.com".to_string()), "homoglyph");
        assert!(vars.contains(&"wxamplebank.com".to_string()), "keyboard");
        assert!(vars.contains(&"examplebank.net".to_string()), "tld swap");
        assert!(vars.contains(&"example-bank.com".to_string()), "hyphenation");
        assert!(
            vars.contains(&"www-examplebank.com".to_string()),
            "subdomain prefix"
        );
        assert!(vars.contains(&"wwwexamplebank.com".to_string()));
    }

    #[test]
    fn never_contains_the_original() {
        for domain in ["example.com", "ab.com", "examplebank.io"] {
            assert!(!variations(domain).contains(&domain.to_string()));
        }
    }

    #[test]
    fn every_candidate_has_one_dot_and_a_label() {
        for candidate in variations("examplebank.com") {
            assert_eq!(candidate.matches('.').count(), 1, "{candidate}");
            let (label, tld) = candidate.rsplit_once('.').unwrap();
            assert!(!label.is_empty(), "{candidate}");
            assert!(!tld.is_empty(), "{candidate}");
        }
    }

    #[test]
    fn set_is_stable_across_runs() {
        let a: HashSet<String> = variations("examplebank.com").into_iter().collect();
        let b: HashSet<String> = variations("examplebank.com").into_iter().collect();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn output_is_deduplicated() {
        let vars = variations("oo.com");
        let unique: HashSet<&String> = vars.iter().collect();
        assert_eq!(unique.len(), vars.len());
    }

    #[test]
    fn input_is_normalized() {
        let fuzzer = DomainFuzzer::new("  ExampleBank.COM ");
        assert_eq!(fuzzer.domain(), "examplebank.com");
    }

    #[test]
    fn dotless_input_defaults_to_com() {
        let vars = variations("examplebank");
        assert!(vars.contains(&"examplebank.net".to_string()));
        assert!(!vars.contains(&"examplebank.com".to_string()));
    }

    #[test]
    fn short_labels_skip_omission_and_hyphenation() {
        let vars = variations("abc.com");
        // Omission would produce 2-char labels; all are filtered.
        for dropped in ["bc.com", "ac.com", "ab.com"] {
            assert!(!vars.contains(&dropped.to_string()), "{dropped}");
        }
        assert!(!vars.contains(&"ab-c.com".to_string()));
    }
}
