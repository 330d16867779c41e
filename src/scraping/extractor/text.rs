//! Text rendering and normalization

use scraper::Html;

/// Render content HTML as markdown-flavoured plain text
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);

    let mut text = String::new();
    let mut last_was_block = false;
    let mut list_depth: u32 = 0;

    for node in fragment.root_element().descendants() {
        if let Some(text_node) = node.value().as_text() {
            let mut in_pre = false;
            let mut hidden = false;
            for ancestor in node.ancestors() {
                if let Some(elem) = ancestor.value().as_element() {
                    match elem.name() {
                        "pre" | "code" => in_pre = true,
                        "script" | "style" | "noscript" | "template" => hidden = true,
                        _ => {}
                    }
                }
            }
            if hidden {
                continue;
            }

            let t = if in_pre {
                text_node.to_string()
            } else {
                text_node.trim().to_string()
            };
            if !t.is_empty() {
                if last_was_block && !text.is_empty() {
                    text.push('\n');
                } else if !text.is_empty() && !in_pre {
                    text.push(' ');
                }
                text.push_str(&t);
                last_was_block = false;
            }
        } else if let Some(elem) = node.value().as_element() {
            match elem.name() {
                name @ ("h1" | "h2" | "h3" | "h4" | "h5" | "h6") => {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    let level = name[1..].parse::<usize>().unwrap_or(1);
                    text.push_str(&"#".repeat(level));
                    text.push(' ');
                    last_was_block = false;
                }
                "p" | "pre" => {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    last_was_block = false;
                }
                "li" => {
                    text.push('\n');
                    let indent = "  ".repeat(list_depth.saturating_sub(1) as usize);
                    text.push_str(&indent);
                    text.push_str("- ");
                    last_was_block = false;
                }
                "ul" | "ol" => {
                    list_depth += 1;
                    last_was_block = true;
                }
                "div" | "br" | "tr" | "blockquote" | "section" | "article" | "td" | "dd" => {
                    last_was_block = true;
                }
                _ => {}
            }
        }
    }

    normalize_whitespace(&text)
}

/// Collapse runs of spaces on each line and keep paragraph breaks
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut consecutive_newlines = 0u32;

    for line in text.split('\n') {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");

        if trimmed.is_empty() {
            consecutive_newlines += 1;
            continue;
        }

        if !result.is_empty() {
            if consecutive_newlines >= 2 {
                result.push_str("\n\n");
            } else {
                result.push('\n');
            }
        }

        consecutive_newlines = 0;
        result.push_str(&trimmed);
    }

    result
}
