//! Best-effort markup scraping for served pages and SOAP bodies.
//!
//! These helpers intentionally do not parse a DOM. The pages they read are
//! served by a single upstream whose markup shape is stable, and the values
//! they extract (`__VIEWSTATE` and friends) are sometimes legitimately
//! absent depending on page state. Absence is therefore a routine outcome,
//! not an error: every helper degrades to an empty string or `None` on a
//! miss, and callers decide what that means.
//!
//! The trade-off is explicit: a linear scan tolerates malformed HTML that
//! would choke a parser, but it is brittle to attribute-order changes
//! upstream (`value` must follow `id` for [`extract_hidden_field`]).

/// Extracts the value of a hidden form field from page markup.
///
/// Scans for `id="<field_name>" value="` and returns the URL-encoded text up
/// to the next quote. Returns an empty string when the marker is absent, and
/// also when the field exists but the closing quote is missing (malformed
/// markup must not panic).
///
/// The result is URL-encoded because it is destined for an
/// `application/x-www-form-urlencoded` POST body.
pub fn extract_hidden_field(page_html: &str, field_name: &str) -> String {
    let marker = format!("id=\"{field_name}\" value=\"");
    let Some(start) = page_html.find(&marker) else {
        return String::new();
    };
    let value_start = start + marker.len();
    let Some(len) = page_html[value_start..].find('"') else {
        return String::new();
    };
    urlencoding::encode(&page_html[value_start..value_start + len]).into_owned()
}

/// Extracts the `value` attribute of the input element with the given id.
///
/// Unlike [`extract_hidden_field`] this tolerates attributes between the
/// `id` and the `value`: it anchors on `id="<field_name>"` and then scans
/// forward for the next `value="…"` occurrence. Same empty-string-on-miss
/// contract.
pub fn extract_input_field_by_id(page_html: &str, field_name: &str) -> String {
    let anchor = format!("id=\"{field_name}\"");
    let Some(start) = page_html.find(&anchor) else {
        return String::new();
    };
    let rest = &page_html[start + anchor.len()..];
    let Some(value_at) = rest.find("value=\"") else {
        return String::new();
    };
    let value_start = value_at + "value=\"".len();
    let Some(len) = rest[value_start..].find('"') else {
        return String::new();
    };
    urlencoding::encode(&rest[value_start..value_start + len]).into_owned()
}

/// Returns the text between `<tag>` and `</tag>` in an XML body, found by
/// literal substring search.
///
/// This is the same deliberate non-parse used for the digest envelope: the
/// upstream emits a fixed envelope shape, and a substring scan keeps the
/// dependency surface flat. Returns `None` when the start tag is absent or
/// the end tag does not follow it.
pub(crate) fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let start_tag = format!("<{tag}>");
    let end_tag = format!("</{tag}>");
    let start = xml.find(&start_tag)? + start_tag.len();
    let len = xml[start..].find(&end_tag)?;
    Some(&xml[start..start + len])
}
