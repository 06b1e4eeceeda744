use chrono::{SecondsFormat, Utc};

/// Wall-clock timestamp in the RFC 3339 form stored on records and snapshots.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn rfc3339_is_utc_with_millis() {
        let stamp = now_rfc3339();
        assert!(stamp.ends_with('Z'));
        let parsed = DateTime::parse_from_rfc3339(&stamp).expect("parse own timestamp");
        assert_eq!(
            parsed.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true),
            stamp
        );
    }
}
