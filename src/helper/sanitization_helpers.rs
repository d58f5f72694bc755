use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn code_block_regex() -> &'static Regex {
    static CODE_BLOCK: OnceLock<Regex> = OnceLock::new();
    CODE_BLOCK.get_or_init(|| Regex::new(r"(?s)```.*?```").expect("static regex is valid"))
}

/// Escapes HTML in blog markdown outside fenced code blocks, which are kept
/// verbatim. Entities are decoded first so re-saving a post never
/// double-escapes it.
pub fn sanitize_markdown_content(markdown_input: &str) -> String {
    let mut code_blocks: Vec<String> = Vec::new();

    let with_placeholders = code_block_regex().replace_all(markdown_input, |caps: &regex::Captures| {
        code_blocks.push(caps[0].to_string());
        format!("__CODE_BLOCK_PLACEHOLDER_{}__", code_blocks.len() - 1)
    });

    let decoded = html_escape::decode_html_entities(&with_placeholders);
    let mut output = html_escape::encode_text(&decoded).to_string();

    for (i, block) in code_blocks.iter().enumerate() {
        let placeholder = format!("__CODE_BLOCK_PLACEHOLDER_{}__", i);
        output = output.replacen(&placeholder, block, 1);
    }
    output
}

/// Strips every HTML tag, for names, titles and other one-line fields.
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

pub fn strip_optional(input: Option<&str>) -> Option<String> {
    input
        .map(|value| strip_all_html(value.trim()))
        .filter(|value| !value.is_empty())
}

/// Renders stored (already escaped) markdown to HTML for public readers.
pub fn render_markdown(markdown_input: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown_input, options);
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_removed_from_single_line_fields() {
        assert_eq!(strip_all_html("<b>Rising</b> seas<script>alert(1)</script>"), "Rising seas");
        assert_eq!(strip_optional(Some("   ")), None);
        assert_eq!(strip_optional(Some(" <i>x</i> ")).as_deref(), Some("x"));
    }

    #[test]
    fn markdown_html_is_escaped_but_code_blocks_survive() {
        let input = "Hello <img src=x onerror=alert(1)>\n\n```\n<div>kept</div>\n```";
        let cleaned = sanitize_markdown_content(input);
        assert!(cleaned.contains("&lt;img"));
        assert!(cleaned.contains("```\n<div>kept</div>\n```"));
        assert_eq!(sanitize_markdown_content(&cleaned), cleaned);
    }

    #[test]
    fn markdown_renders_to_html() {
        assert_eq!(render_markdown("# Floods"), "<h1>Floods</h1>\n");
    }
}
