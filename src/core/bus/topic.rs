use crate::core::error::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `+`: exactly one segment
    Single,
    /// `#`: all remaining segments
    Rest,
}

/// Parsed subscription pattern over `.`-delimited topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        let invalid = |reason: &str| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("empty pattern"));
        }

        let parts: Vec<&str> = pattern.split('.').collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => return Err(invalid("empty segment")),
                "+" => Segment::Single,
                "#" => {
                    if i != parts.len() - 1 {
                        return Err(invalid("'#' must be the last segment"));
                    }
                    Segment::Rest
                }
                literal if literal.contains('+') || literal.contains('#') => {
                    return Err(invalid("wildcards must occupy a whole segment"))
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern has no wildcard segments
    pub fn is_exact(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('.');
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Single => {
                    if parts.next().map_or(true, str::is_empty) {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if parts.next() != Some(lit.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Check that a concrete topic is publishable
pub fn validate_topic(topic: &str) -> Result<(), BusError> {
    if topic.is_empty() || topic.split('.').any(|s| s.is_empty() || s == "+" || s == "#") {
        return Err(BusError::InvalidPattern {
            pattern: topic.to_string(),
            reason: "published topics must be non-empty literal segments".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> TopicPattern {
        TopicPattern::parse(p).unwrap()
    }

    #[test]
    fn test_hash_matches_all_remaining_segments() {
        assert!(pattern("hardware.#").matches("hardware.pump1.state"));
        assert!(pattern("hardware.#").matches("hardware.pump1"));
        assert!(pattern("#").matches("anything.at.all"));
    }

    #[test]
    fn test_plus_matches_exactly_one_segment() {
        assert!(!pattern("hardware.+").matches("hardware.pump1.state"));
        assert!(pattern("hardware.+").matches("hardware.pump1"));
        assert!(pattern("hardware.+.state").matches("hardware.pump1.state"));
        assert!(!pattern("hardware.+").matches("hardware"));
    }

    #[test]
    fn test_exact_match() {
        let p = pattern("sensors.tank1.level");
        assert!(p.is_exact());
        assert!(p.matches("sensors.tank1.level"));
        assert!(!p.matches("sensors.tank1"));
        assert!(!p.matches("sensors.tank1.level.raw"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(TopicPattern::parse("a.#.b").is_err());
        assert!(TopicPattern::parse("a..b").is_err());
        assert!(TopicPattern::parse("a.b+").is_err());
        assert!(TopicPattern::parse("").is_err());
        assert!(validate_topic("a.+").is_err());
        assert!(validate_topic("a.b").is_ok());
    }
}
