//! Search pattern segmentation.
//!
//! A pattern is a mix of literal text and two wildcards: `?` stands for
//! exactly one charset character and `*` for any run of them. A backslash
//! escapes `?`, `*` and itself; before anything else it is kept as-is.

/// One piece of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `?`
    AnyOne,
    /// `*`
    AnyRun,
}

/// Split a pattern into segments. Adjacent literal characters are merged.
pub fn parse_pattern(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&next @ ('?' | '*' | '\\')) => {
                    literal.push(next);
                    chars.next();
                }
                _ => literal.push('\\'),
            },
            '?' | '*' => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(if c == '?' {
                    Segment::AnyOne
                } else {
                    Segment::AnyRun
                });
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Length facts derived from a parsed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternProperties {
    /// Shortest candidate the pattern can produce.
    pub min_length: u32,
    /// Whether the pattern contains a `*`, making its length open-ended.
    pub open_ended: bool,
}

pub fn pattern_properties(segments: &[Segment]) -> PatternProperties {
    let mut min_length: u32 = 0;
    let mut open_ended = false;
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                let len = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
                min_length = min_length.saturating_add(len);
            }
            Segment::AnyOne => min_length = min_length.saturating_add(1),
            Segment::AnyRun => open_ended = true,
        }
    }
    PatternProperties {
        min_length,
        open_ended,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_string())
    }

    #[test]
    fn literal_only() {
        assert_eq!(parse_pattern("abc"), vec![lit("abc")]);
    }

    #[test]
    fn wildcards_split_literals() {
        assert_eq!(
            parse_pattern("ab?c*d"),
            vec![
                lit("ab"),
                Segment::AnyOne,
                lit("c"),
                Segment::AnyRun,
                lit("d")
            ]
        );
    }

    #[test]
    fn escapes_are_literal() {
        assert_eq!(parse_pattern(r"a\?b\*c\\"), vec![lit(r"a?b*c\")]);
    }

    #[test]
    fn backslash_before_other_char_is_kept() {
        assert_eq!(parse_pattern(r"a\b"), vec![lit(r"a\b")]);
        assert_eq!(parse_pattern(r"a\"), vec![lit(r"a\")]);
    }

    #[test]
    fn properties_fixed_length() {
        let props = pattern_properties(&parse_pattern("pw??"));
        assert_eq!(
            props,
            PatternProperties {
                min_length: 4,
                open_ended: false
            }
        );
    }

    #[test]
    fn properties_open_ended() {
        let props = pattern_properties(&parse_pattern("x*?"));
        assert_eq!(props.min_length, 2);
        assert!(props.open_ended);
    }

    #[test]
    fn properties_count_chars_not_bytes() {
        let props = pattern_properties(&parse_pattern("ñ?"));
        assert_eq!(props.min_length, 2);
    }
}
