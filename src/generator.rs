//! Random run-identifier generation.
//!
//! Every scenario run owns a disjoint set of external resource names derived
//! from a random suffix, so concurrent runs (and retries of the same run)
//! never collide. Collisions are avoided probabilistically rather than
//! structurally; the suffix space makes them astronomically unlikely.

use rand::Rng;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Generate a random lowercase alphanumeric suffix of the given length.
///
/// The first character is always a letter so the result is usable as a
/// leading segment of Kubernetes resource and repository names.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|i| {
            let set = if i == 0 { LETTERS } else { CHARSET };
            set[rng.gen_range(0..set.len())] as char
        })
        .collect()
}

/// Derive a fresh repository name for one scenario run.
///
/// The name is a nine-character random suffix joined with the template name,
/// e.g. `dk3m1xq7p-java-quarkus`. The companion GitOps repository appends
/// `-gitops` to it.
pub fn repository_name(template: &str) -> String {
    format!("{}-{}", random_suffix(9), template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_has_requested_length_and_charset() {
        let s = random_suffix(9);
        assert_eq!(s.len(), 9);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(s.chars().next().unwrap().is_ascii_lowercase());
    }

    #[test]
    fn repository_names_embed_the_template() {
        let name = repository_name("java-quarkus");
        assert!(name.ends_with("-java-quarkus"));
        assert_eq!(name.len(), "java-quarkus".len() + 10);
    }

    /// Fresh identifiers must differ between retry attempts.
    #[test]
    fn successive_names_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            assert!(seen.insert(repository_name("go")));
        }
    }
}
