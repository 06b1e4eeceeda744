use uuid::Uuid;

/// Fresh record id: random 128-bit UUIDv4 in hyphenated form.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_parse_as_v4() {
        let ids: HashSet<String> = (0..1_000).map(|_| new_record_id()).collect();
        assert_eq!(ids.len(), 1_000);
        let sample = ids.iter().next().expect("at least one id");
        let parsed = Uuid::parse_str(sample).expect("valid uuid");
        assert_eq!(parsed.get_version_num(), 4);
    }
}
