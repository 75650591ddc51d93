//! Wildcard channel-pattern compilation and matching.
//!
//! Pattern syntax: dot-separated segments; `*` matches exactly one segment, `>`
//! matches the remainder of the name (only legal as the final segment).

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Star,
    GreaterThan,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn compile(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .enumerate()
            .map(|(i, seg)| match seg {
                "*" => Segment::Star,
                ">" if i == pattern.split('.').count() - 1 => Segment::GreaterThan,
                other => Segment::Literal(other.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern contains no wildcard segments at all.
    pub fn is_concrete(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// The longest fully-literal prefix of this pattern, used to index pending
    /// wildcard subscriptions without a global scan per new channel.
    pub fn concrete_prefix(&self) -> String {
        self.segments
            .iter()
            .take_while(|s| matches!(s, Segment::Literal(_)))
            .map(|s| match s {
                Segment::Literal(l) => l.as_str(),
                _ => unreachable!(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn matches(&self, channel: &str) -> bool {
        let name_segs: Vec<&str> = channel.split('.').collect();
        matches_from(&self.segments, &name_segs)
    }
}

fn matches_from(pattern: &[Segment], name: &[&str]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(Segment::GreaterThan), _) => !name.is_empty(),
        (Some(Segment::Star), Some(_)) => matches_from(&pattern[1..], &name[1..]),
        (Some(Segment::Literal(l)), Some(seg)) => l == seg && matches_from(&pattern[1..], &name[1..]),
        (Some(_), None) => false,
    }
}

pub fn pattern_matches(pattern: &str, channel: &str) -> bool {
    Pattern::compile(pattern).matches(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(pattern_matches("orders.filled", "orders.filled"));
        assert!(!pattern_matches("orders.filled", "orders.new"));
    }

    #[test]
    fn star_matches_one_segment() {
        assert!(pattern_matches("orders.*.filled", "orders.A.filled"));
        assert!(!pattern_matches("orders.*.filled", "orders.A.B.filled"));
        assert!(!pattern_matches("orders.*.filled", "orders.A.new"));
    }

    #[test]
    fn greater_than_matches_suffix() {
        assert!(pattern_matches("orders.>", "orders.A.filled"));
        assert!(pattern_matches("orders.>", "orders.A"));
        assert!(!pattern_matches("orders.>", "orders"));
    }

    #[test]
    fn global_wildcard() {
        assert!(pattern_matches("*", "orders"));
        assert!(!pattern_matches("*", "orders.filled"));
        assert!(pattern_matches(">", "orders.filled.now"));
    }

    #[test]
    fn concrete_prefix_extraction() {
        assert_eq!(Pattern::compile("orders.*.filled").concrete_prefix(), "orders");
        assert_eq!(Pattern::compile("orders.us.>").concrete_prefix(), "orders.us");
        assert_eq!(Pattern::compile("orders.filled").concrete_prefix(), "orders.filled");
        assert!(Pattern::compile("orders.filled").is_concrete());
        assert!(!Pattern::compile("orders.*").is_concrete());
    }

    use proptest::prelude::*;

    #[test]
    fn a_literal_pattern_always_matches_its_own_name() {
        proptest!(|(segs in proptest::collection::vec("[a-z]{1,8}", 1..5))| {
            let name = segs.join(".");
            prop_assert!(pattern_matches(&name, &name));
        });
    }

    #[test]
    fn star_matches_any_value_in_its_segment_but_not_a_split_one() {
        proptest!(|(
            prefix in "[a-z]{1,8}",
            middle in "[a-z]{1,8}",
            suffix in "[a-z]{1,8}"
        )| {
            let pattern = format!("{prefix}.*.{suffix}");
            prop_assert!(pattern_matches(&pattern, &format!("{prefix}.{middle}.{suffix}")));
            prop_assert!(!pattern_matches(&pattern, &format!("{prefix}.{middle}.x.{suffix}")));
        });
    }

    #[test]
    fn concrete_prefix_is_always_a_literal_prefix_of_the_raw_pattern() {
        proptest!(|(segs in proptest::collection::vec("[a-z]{1,8}", 1..4))| {
            let pattern_str = segs.join(".");
            let pattern = Pattern::compile(&pattern_str);
            prop_assert!(pattern.is_concrete());
            prop_assert_eq!(pattern.concrete_prefix(), pattern_str);
        });
    }
}
