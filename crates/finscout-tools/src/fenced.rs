/// Return the bodies of every ```` ```<lang> ```` block in `text`, trimmed.
///
/// A marker only counts when the tag ends at a line break, so `read_pdf`
/// does not match a block tagged `read_pdf_v2`. Unclosed blocks are ignored.
#[must_use]
pub fn extract_fenced_blocks<'a>(text: &'a str, lang: &str) -> Vec<&'a str> {
    let marker = format!("```{lang}");
    let marker_len = marker.len();
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(&marker) {
        let after = &rest[start + marker_len..];
        let header_end = after.find('\n').unwrap_or(after.len());
        if !after[..header_end].trim().is_empty() {
            rest = after;
            continue;
        }
        if let Some(end) = after.find("```") {
            blocks.push(after[..end].trim());
            rest = &after[end + 3..];
        } else {
            break;
        }
    }

    blocks
}
