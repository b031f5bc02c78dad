use conf_fs::strip_comments;
use proptest::prelude::*;

proptest! {
    #[test]
    fn strip_comments_preserves_string_values(s in "\\PC*") {
        // Serialized JSON strings may contain `//` and `/*` and must survive untouched.
        let document = format!("{{\"value\": {}}}", serde_json::to_string(&s).unwrap());
        prop_assert_eq!(strip_comments(&document), document.clone());

        let parsed: serde_json::Value = serde_json::from_str(&strip_comments(&document)).unwrap();
        prop_assert_eq!(parsed["value"].as_str(), Some(s.as_str()));
    }

    #[test]
    fn strip_comments_preserves_line_count(lines in proptest::collection::vec("[a-z ]{0,10}", 1..8)) {
        let document = lines
            .iter()
            .map(|l| format!("{l} // note"))
            .collect::<Vec<_>>()
            .join("\n");
        let stripped = strip_comments(&document);
        prop_assert_eq!(stripped.lines().count(), document.lines().count());
    }
}
