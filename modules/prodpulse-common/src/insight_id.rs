use chrono::NaiveDate;

use crate::error::PulseError;

/// Composite insight key: `INSIGHT#<date>#PRIORITY#<score>#ID#<post_id>`.
///
/// The priority component is written as a plain decimal with no zero
/// padding, matching what every existing record already contains. That means
/// the raw string does NOT sort by numeric priority (`PRIORITY#10` <
/// `PRIORITY#2` lexicographically); ranked retrieval must go through the
/// numeric ranking index, never a string range scan on this key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightId {
    pub date: NaiveDate,
    pub priority: u8,
    pub post_id: String,
}

impl InsightId {
    pub fn new(date: NaiveDate, priority: u8, post_id: &str) -> Result<Self, PulseError> {
        if priority > 10 {
            return Err(PulseError::Validation(format!(
                "priority must be 0-10, got {priority}"
            )));
        }
        if post_id.is_empty() || !post_id.chars().all(valid_post_id_char) {
            return Err(PulseError::Validation(format!(
                "invalid post id in insight key: {post_id:?}"
            )));
        }
        Ok(Self {
            date,
            priority,
            post_id: post_id.to_string(),
        })
    }

    /// Parse and validate the composite shape. Rejects malformed ids before
    /// any storage lookup happens.
    pub fn parse(s: &str) -> Result<Self, PulseError> {
        let invalid = || PulseError::Validation(format!("invalid insight id: {s:?}"));

        let parts: Vec<&str> = s.split('#').collect();
        let [tag, date, prio_tag, prio, id_tag, post_id] = parts.as_slice() else {
            return Err(invalid());
        };
        if *tag != "INSIGHT" || *prio_tag != "PRIORITY" || *id_tag != "ID" {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
        let priority: u8 = prio.parse().map_err(|_| invalid())?;
        // Reject zero-padded scores: "08" would alias "8" as a distinct key.
        if prio.len() > 1 && prio.starts_with('0') {
            return Err(invalid());
        }
        Self::new(date, priority, post_id)
    }
}

impl std::fmt::Display for InsightId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "INSIGHT#{}#PRIORITY#{}#ID#{}",
            self.date.format("%Y-%m-%d"),
            self.priority,
            self.post_id
        )
    }
}

fn valid_post_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_the_documented_shape() {
        let id = InsightId::parse("INSIGHT#2025-09-23#PRIORITY#8#ID#abc123").unwrap();
        assert_eq!(id.priority, 8);
        assert_eq!(id.post_id, "abc123");
        assert_eq!(id.to_string(), "INSIGHT#2025-09-23#PRIORITY#8#ID#abc123");
    }

    #[test]
    fn priority_ten_stays_unpadded() {
        let id = InsightId::new(
            NaiveDate::from_ymd_opt(2025, 9, 23).unwrap(),
            10,
            "xyz",
        )
        .unwrap();
        assert_eq!(id.to_string(), "INSIGHT#2025-09-23#PRIORITY#10#ID#xyz");
        assert_eq!(InsightId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in [
            "not-a-valid-id",
            "INSIGHT#2025-09-23#PRIORITY#8",
            "INSIGHT#2025-13-40#PRIORITY#8#ID#abc",
            "INSIGHT#2025-09-23#PRIORITY#11#ID#abc",
            "INSIGHT#2025-09-23#PRIORITY#08#ID#abc",
            "INSIGHT#2025-09-23#PRIORITY#x#ID#abc",
            "INSIGHT#2025-09-23#PRIORITY#8#ID#",
            "insight#2025-09-23#priority#8#id#abc",
        ] {
            assert!(
                matches!(InsightId::parse(bad), Err(PulseError::Validation(_))),
                "expected validation error for {bad:?}"
            );
        }
    }
}
