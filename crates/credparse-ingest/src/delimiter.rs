//! Delimiter resolution
//!
//! Picks which of the configured candidate delimiters splits a given line.

use serde::{Deserialize, Serialize};

/// How a delimiter is chosen when several candidates could apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    /// First candidate, in configuration order, present anywhere in the line
    #[default]
    FirstFound,
    /// Candidate whose earliest occurrence comes first in the line
    LowestIndex,
}

impl std::str::FromStr for ResolveStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "first_found" => Ok(ResolveStrategy::FirstFound),
            "lowest_index" => Ok(ResolveStrategy::LowestIndex),
            _ => Err(format!(
                "Invalid resolve strategy: {s} (expected first-found or lowest-index)"
            )),
        }
    }
}

impl std::fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveStrategy::FirstFound => write!(f, "first-found"),
            ResolveStrategy::LowestIndex => write!(f, "lowest-index"),
        }
    }
}

/// Byte offset of the first occurrence of `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Choose the delimiter for `line`, or `None` when no candidate occurs in it.
///
/// With [`ResolveStrategy::LowestIndex`], candidates sharing the minimal index
/// resolve to the one listed first.
pub fn resolve<'a, D>(line: &[u8], candidates: &'a [D], strategy: ResolveStrategy) -> Option<&'a [u8]>
where
    D: AsRef<[u8]>,
{
    let candidates = candidates
        .iter()
        .map(|candidate| -> &'a [u8] { candidate.as_ref() });

    match strategy {
        ResolveStrategy::FirstFound => candidates
            .into_iter()
            .find(|candidate| find(line, candidate).is_some()),
        ResolveStrategy::LowestIndex => {
            let mut best: Option<(usize, &[u8])> = None;
            for candidate in candidates {
                if let Some(index) = find(line, candidate) {
                    if best.map_or(true, |(lowest, _)| index < lowest) {
                        best = Some((index, candidate));
                    }
                }
            }
            best.map(|(_, candidate)| candidate)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Vec<u8>> {
        vec![b":".to_vec(), b";".to_vec()]
    }

    #[test]
    fn test_find() {
        assert_eq!(find(b"user:pass", b":"), Some(4));
        assert_eq!(find(b"a::b", b"::"), Some(1));
        assert_eq!(find(b"abc", b"abcd"), None);
        assert_eq!(find(b"abc", b""), None);
    }

    #[test]
    fn test_lowest_index_prefers_earliest_occurrence() {
        let candidates = candidates();
        let resolved = resolve(b"a;b:c", &candidates, ResolveStrategy::LowestIndex);
        assert_eq!(resolved, Some(&b";"[..]));
    }

    #[test]
    fn test_first_found_prefers_configuration_order() {
        let candidates = candidates();
        let resolved = resolve(b"a;b:c", &candidates, ResolveStrategy::FirstFound);
        assert_eq!(resolved, Some(&b":"[..]));
    }

    #[test]
    fn test_first_found_falls_through_to_later_candidates() {
        let candidates = candidates();
        let resolved = resolve(b"a;b", &candidates, ResolveStrategy::FirstFound);
        assert_eq!(resolved, Some(&b";"[..]));
    }

    #[test]
    fn test_lowest_index_tie_goes_to_first_candidate() {
        let candidates = vec![b":".to_vec(), b"::".to_vec()];
        let resolved = resolve(b"a::b", &candidates, ResolveStrategy::LowestIndex);
        assert_eq!(resolved, Some(&b":"[..]));

        let reversed = vec![b"::".to_vec(), b":".to_vec()];
        let resolved = resolve(b"a::b", &reversed, ResolveStrategy::LowestIndex);
        assert_eq!(resolved, Some(&b"::"[..]));
    }

    #[test]
    fn test_no_candidate_present() {
        let candidates = candidates();
        for strategy in [ResolveStrategy::FirstFound, ResolveStrategy::LowestIndex] {
            assert_eq!(resolve(b"nothing here", &candidates, strategy), None);
            assert_eq!(resolve(b"", &candidates, strategy), None);
        }
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("FIRST_FOUND".parse(), Ok(ResolveStrategy::FirstFound));
        assert_eq!("first-found".parse(), Ok(ResolveStrategy::FirstFound));
        assert_eq!("LOWEST_INDEX".parse(), Ok(ResolveStrategy::LowestIndex));
        assert_eq!("lowest-index".parse(), Ok(ResolveStrategy::LowestIndex));
        assert!("middle".parse::<ResolveStrategy>().is_err());
    }
}
