// src/utils/html.rs

/// Sanitizes author-supplied rich text (quiz descriptions, question text,
/// explanations) with ammonia's whitelist. Safe tags such as `<b>` or `<p>`
/// survive; `<script>` is removed with its content and event attributes are
/// stripped.
///
/// Option texts are not passed through here: they are compared literally
/// during grading and entity-escaping would change them.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Like [`clean_html`] for optional fields.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input.map(clean_html)
}
