//! Line extraction and field splitting for the RFC 1459 subset this server
//! understands. No prefix or tag parsing — every line is just a verb
//! followed by space-separated parameters, the last of which may start
//! with `:` to include embedded spaces.

/// Appends freshly-received bytes to `residue` and pulls out every
/// complete `\r\n`-terminated line now available, leaving any trailing
/// partial line in `residue` for the next call.
pub fn extract_lines(residue: &mut Vec<u8>, data: &[u8]) -> Vec<Vec<u8>> {
    residue.extend_from_slice(data);

    let mut lines = Vec::new();
    loop {
        match find_crlf(residue) {
            Some(pos) => {
                let line: Vec<u8> = residue.drain(..pos).collect();
                residue.drain(..2); // the CRLF itself
                lines.push(line);
            }
            None => break,
        }
    }
    lines
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Splits a line into fields the way `line.strip(b' \r\n').split(b' ')`
/// does: strip leading/trailing spaces, CR and LF first, then split
/// strictly on single spaces (so consecutive spaces produce empty
/// fields in the middle of the line).
pub fn split_fields(line: &[u8]) -> Vec<Vec<u8>> {
    let trimmed = trim(line, b" \r\n");
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split(|&b| b == b' ').map(|s| s.to_vec()).collect()
}

fn trim<'a>(mut s: &'a [u8], cut: &[u8]) -> &'a [u8] {
    while let Some(&b) = s.first() {
        if cut.contains(&b) {
            s = &s[1..];
        } else {
            break;
        }
    }
    while let Some(&b) = s.last() {
        if cut.contains(&b) {
            s = &s[..s.len() - 1];
        } else {
            break;
        }
    }
    s
}

/// Joins fields with a single space, the way `b' '.join(fields)` would.
pub fn join_fields(fields: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(field);
    }
    out
}

/// A nickname or channel-name-minus-hash is valid when it starts with a
/// letter and is otherwise letters, digits, `_` or `-`.
pub fn is_valid_name(name: &[u8]) -> bool {
    match name.split_first() {
        Some((&first, rest)) if first.is_ascii_alphabetic() => {
            rest.iter().all(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_one_line_per_crlf() {
        let mut residue = Vec::new();
        let lines = extract_lines(&mut residue, b"NICK bob\r\nJOIN #rust\r\n");
        assert_eq!(lines, vec![b"NICK bob".to_vec(), b"JOIN #rust".to_vec()]);
        assert!(residue.is_empty());
    }

    #[test]
    fn holds_a_partial_trailing_line_in_residue() {
        let mut residue = Vec::new();
        let lines = extract_lines(&mut residue, b"NICK bob\r\nJOI");
        assert_eq!(lines, vec![b"NICK bob".to_vec()]);
        assert_eq!(residue, b"JOI");
    }

    #[test]
    fn split_fields_keeps_embedded_empty_fields() {
        assert_eq!(split_fields(b"PRIVMSG  #rust :hi  there"), vec![
            b"PRIVMSG".to_vec(),
            b"".to_vec(),
            b"#rust".to_vec(),
            b":hi".to_vec(),
            b"".to_vec(),
            b"there".to_vec(),
        ]);
    }

    #[test]
    fn split_fields_of_blank_line_is_empty() {
        assert!(split_fields(b"   \r\n").is_empty());
    }

    #[test]
    fn validates_names_like_the_reference_pattern() {
        assert!(is_valid_name(b"bob-99"));
        assert!(!is_valid_name(b"9bob"));
        assert!(!is_valid_name(b""));
    }
}
