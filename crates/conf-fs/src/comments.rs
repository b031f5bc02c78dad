//! Comment stripping for commented JSON documents
//!
//! The shipped default document and hand-edited layer files carry `//` line
//! comments and `/* */` block comments. Comments are removed outside string
//! literals only, and newlines are kept so parser line numbers stay accurate.

/// Remove `//` and `/* */` comments from a JSON-like document.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("{\"a\": 1} // trailing", "{\"a\": 1} ")]
    #[case("// header\n{}", "\n{}")]
    #[case("{/* inline */\"a\": 1}", "{\"a\": 1}")]
    #[case("{\"url\": \"https://example.com\"}", "{\"url\": \"https://example.com\"}")]
    #[case("{\"q\": \"say \\\"//hi\\\"\"}", "{\"q\": \"say \\\"//hi\\\"\"}")]
    #[case("/* a\nb */{}", "\n{}")]
    #[case("{\"a\": \"/* not a comment */\"}", "{\"a\": \"/* not a comment */\"}")]
    fn strips_comments_outside_strings(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_comments(input), expected);
    }

    #[test]
    fn unterminated_block_comment_consumes_rest() {
        assert_eq!(strip_comments("{} /* open"), "{} ");
    }
}
