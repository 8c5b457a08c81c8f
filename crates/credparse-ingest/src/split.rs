//! Fixed-width line splitting

/// Split `line` on every `delimiter` into exactly `field_count` fragments.
///
/// Fragments past `field_count - 1` are rejoined with the delimiter into the
/// final field, so a password containing the delimiter survives intact.
/// Lines with fewer fragments are padded with empty fields. A `field_count`
/// of zero is treated as one.
pub fn split_line(line: &[u8], delimiter: &[u8], field_count: usize) -> Vec<Vec<u8>> {
    let field_count = field_count.max(1);
    let mut fields = Vec::with_capacity(field_count);
    let mut rest = line;

    if !delimiter.is_empty() {
        while fields.len() + 1 < field_count {
            match crate::delimiter::find(rest, delimiter) {
                Some(index) => {
                    fields.push(rest[..index].to_vec());
                    rest = &rest[index + delimiter.len()..];
                },
                None => break,
            }
        }
    }

    fields.push(rest.to_vec());
    fields.resize(field_count, Vec::new());
    fields
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(fields: Vec<Vec<u8>>) -> Vec<String> {
        fields
            .into_iter()
            .map(|f| String::from_utf8(f).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_excess_fragments_fold_into_last_field() {
        let fields = split_line(b"user:pass:word", b":", 2);
        assert_eq!(texts(fields), vec!["user", "pass:word"]);
    }

    #[test]
    fn test_exact_fragment_count() {
        let fields = split_line(b"a;b;c", b";", 3);
        assert_eq!(texts(fields), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_short_line_is_padded() {
        let fields = split_line(b"a:b", b":", 4);
        assert_eq!(texts(fields), vec!["a", "b", "", ""]);
    }

    #[test]
    fn test_empty_fragments_are_kept() {
        let fields = split_line(b":pass", b":", 2);
        assert_eq!(texts(fields), vec!["", "pass"]);

        let fields = split_line(b"user:", b":", 2);
        assert_eq!(texts(fields), vec!["user", ""]);
    }

    #[test]
    fn test_multibyte_delimiter() {
        let fields = split_line(b"user::pa:ss::x", b"::", 2);
        assert_eq!(texts(fields), vec!["user", "pa:ss::x"]);
    }

    #[test]
    fn test_degenerate_field_counts() {
        assert_eq!(texts(split_line(b"a:b:c", b":", 1)), vec!["a:b:c"]);
        assert_eq!(texts(split_line(b"a:b:c", b":", 0)), vec!["a:b:c"]);
        assert_eq!(texts(split_line(b"a:b", b"", 2)), vec!["a:b", ""]);
    }

    proptest! {
        #[test]
        fn prop_resolved_split_reconstructs_line(
            parts in proptest::collection::vec("[a-z0-9;:| ]{0,8}", 2..6),
            field_count in 2usize..5,
        ) {
            let candidates = vec![b":".to_vec(), b";".to_vec(), b"|".to_vec()];
            let line = parts.join(":");

            let delimiter = crate::delimiter::resolve(
                line.as_bytes(),
                &candidates,
                crate::delimiter::ResolveStrategy::LowestIndex,
            )
            .expect("line contains ':'");

            let fields = split_line(line.as_bytes(), delimiter, field_count);
            prop_assert_eq!(fields.len(), field_count);

            let fragments = line.matches(std::str::from_utf8(delimiter).unwrap()).count() + 1;
            if fragments >= field_count {
                prop_assert_eq!(fields.join(delimiter), line.as_bytes().to_vec());
            }
        }
    }
}
