//! Header lookup over a raw HTTP response (`<headers>\r\n\r\n<body>`).

/// Return the value of the first header line named exactly `name`.
///
/// Only the block before the first blank line is searched, so a body that
/// happens to contain `Name: value` never matches. The name comparison is
/// case-sensitive. Leading whitespace after the colon is dropped. A missing
/// header is `None`; deciding whether that is fatal is up to the caller.
pub fn find_header<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    let head = match raw.split_once("\r\n\r\n") {
        Some((head, _body)) => head,
        None => raw,
    };
    head.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key == name).then(|| value.trim_start())
    })
}
