//! WebVTT caption parsing.

use regex::Regex;
use std::sync::OnceLock;

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    // Inline timestamps (<00:00:01.120>) and styling tags (<c>, </c>, <v Speaker>)
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("Invalid regex"))
}

/// Convert a WebVTT document to plain transcript text.
///
/// Cue timings, headers, NOTE/STYLE/REGION blocks and markup are dropped.
/// Consecutive repeated lines (rolling auto-captions) are emitted once.
pub fn vtt_to_text(vtt: &str) -> String {
    let mut lines_out: Vec<String> = Vec::new();
    let mut in_header = true;
    let mut skip_block = false;
    let mut in_cue = false;

    for raw in vtt.lines() {
        let line = raw.trim();

        if line.is_empty() {
            in_header = false;
            skip_block = false;
            in_cue = false;
            continue;
        }
        if in_header || skip_block {
            continue;
        }
        if !in_cue {
            if line.starts_with("NOTE") || line == "STYLE" || line == "REGION" {
                skip_block = true;
                continue;
            }
            if line.contains("-->") {
                in_cue = true;
            }
            // Either the timing line or a cue identifier
            continue;
        }

        let text = decode_entities(&tag_regex().replace_all(line, ""));
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        if lines_out.last().is_some_and(|last| *last == text) {
            continue;
        }
        lines_out.push(text);
    }

    lines_out.join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
