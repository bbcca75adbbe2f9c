use serde::Serialize;

use crate::filesystem::Page;

/// A `[[target]]` or `[[target|label]]` occurrence with its byte span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiLink {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub target: String,
    pub label: Option<String>,
}

impl WikiLink {
    /// `[[+Child]]` links point at sub-pages and are never verified.
    pub fn is_child(&self) -> bool {
        self.target.starts_with('+')
    }

    /// Last `:` segment of the target.
    pub fn target_name(&self) -> &str {
        self.target.rsplit(':').next().unwrap_or(&self.target)
    }
}

/// Every wiki link, child links included.
pub fn extract_links(content: &str) -> Vec<WikiLink> {
    scan_links(content, false)
}

/// Wiki links that reference other pages; child links are not even matched.
pub fn extract_page_links(content: &str) -> Vec<WikiLink> {
    scan_links(content, true)
}

fn scan_links(content: &str, skip_children: bool) -> Vec<WikiLink> {
    let bytes = content.as_bytes();
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor + 1 < bytes.len() {
        if bytes[cursor] != b'[' || bytes[cursor + 1] != b'[' {
            cursor += 1;
            continue;
        }
        if skip_children && bytes.get(cursor + 2) == Some(&b'+') {
            cursor += 1;
            continue;
        }
        match match_link_at(content, cursor) {
            Some(link) => {
                cursor = link.end;
                out.push(link);
            }
            None => cursor += 1,
        }
    }

    out
}

fn match_link_at(content: &str, start: usize) -> Option<WikiLink> {
    let bytes = content.as_bytes();
    let target_start = start + 2;
    let mut target_end = target_start;
    while target_end < bytes.len() && bytes[target_end] != b']' && bytes[target_end] != b'|' {
        target_end += 1;
    }
    if target_end == target_start || target_end >= bytes.len() {
        return None;
    }

    let (label, end) = if bytes[target_end] == b'|' {
        let label_start = target_end + 1;
        let mut label_end = label_start;
        while label_end < bytes.len() && bytes[label_end] != b']' {
            label_end += 1;
        }
        if label_end == label_start || bytes.get(label_end + 1) != Some(&b']') {
            return None;
        }
        (Some(&content[label_start..label_end]), label_end + 2)
    } else {
        if bytes.get(target_end + 1) != Some(&b']') {
            return None;
        }
        (None, target_end + 2)
    };

    Some(WikiLink {
        start,
        end,
        text: content[start..end].to_string(),
        target: content[target_start..target_end].to_string(),
        label: label.map(str::to_string),
    })
}

/// A page split at its backlinks heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections<'a> {
    pub content: &'a str,
    pub backlinks: Option<BacklinksSection<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklinksSection<'a> {
    /// Byte offset of the heading.
    pub start: usize,
    /// Byte offset just past the heading line.
    pub body_start: usize,
    pub body: &'a str,
}

pub fn split_sections<'a>(text: &'a str, header: &str) -> Sections<'a> {
    let Some(start) = text.find(header) else {
        return Sections {
            content: text,
            backlinks: None,
        };
    };

    let after_header = start + header.len();
    let rest = &text[after_header..];
    let body_start = if rest.starts_with("\r\n") {
        after_header + 2
    } else if rest.starts_with('\n') {
        after_header + 1
    } else {
        after_header
    };

    Sections {
        content: &text[..start],
        backlinks: Some(BacklinksSection {
            start,
            body_start,
            body: &text[body_start..],
        }),
    }
}

/// Canonical link text from `source` to `target`.
///
/// Same directory links use the bare name; everything else uses the full zim
/// path with the page name as label. A label that differs from the target
/// name is preserved.
pub fn format_link(source: &Page, target: &Page, label: Option<&str>) -> String {
    let custom_label = label.filter(|label| *label != target.name);
    if source.same_dir(target) {
        match custom_label {
            Some(label) => format!("[[{}|{label}]]", target.name),
            None => format!("[[{}]]", target.name),
        }
    } else {
        format!(
            "[[{}|{}]]",
            target.zim_path,
            custom_label.unwrap_or(&target.name)
        )
    }
}

/// Replace link spans right to left so earlier offsets stay valid.
pub fn rewrite_spans(content: &str, mut replacements: Vec<(usize, usize, String)>) -> String {
    replacements.sort_by(|left, right| right.0.cmp(&left.0));
    let mut output = content.to_string();
    for (start, end, replacement) in replacements {
        output.replace_range(start..end, &replacement);
    }
    output
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{extract_links, extract_page_links, format_link, rewrite_spans, split_sections};
    use crate::filesystem::Page;

    fn page(relative_path: &str) -> Page {
        let zim_path = relative_path.trim_end_matches(".txt").replace('/', ":");
        Page {
            path: PathBuf::from("/root").join(relative_path),
            relative_path: relative_path.to_string(),
            name: zim_path.rsplit(':').next().expect("name").to_string(),
            zim_path,
            text: String::new(),
            is_text: true,
        }
    }

    #[test]
    fn extract_links_parses_targets_labels_and_spans() {
        let content = "see [[alpha]] and [[a:b:beta|Beta]] or [[+child]]";
        let links = extract_links(content);

        assert_eq!(links.len(), 3);
        assert_eq!(links[0].target, "alpha");
        assert_eq!(links[0].label, None);
        assert_eq!(&content[links[0].start..links[0].end], "[[alpha]]");
        assert_eq!(links[1].target, "a:b:beta");
        assert_eq!(links[1].label.as_deref(), Some("Beta"));
        assert_eq!(links[1].target_name(), "beta");
        assert!(links[2].is_child());
    }

    #[test]
    fn page_links_skip_children_without_consuming_them() {
        let links = extract_page_links("[[+child [[inner]] [[+other]]");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "inner");

        let all = extract_links("[[+child [[inner]]");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].target, "+child [[inner");
    }

    #[test]
    fn malformed_links_are_ignored() {
        assert!(extract_links("[[]] [[a|]] [[open ] [[x]").is_empty());
        let links = extract_links("[[[nested]]");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "[nested");
    }

    #[test]
    fn split_sections_separates_backlinks_body() {
        let text = "body [[a]]\n===== Backlinks =====\n[[b]]\n";
        let sections = split_sections(text, "===== Backlinks =====");
        assert_eq!(sections.content, "body [[a]]\n");
        let backlinks = sections.backlinks.expect("section");
        assert_eq!(backlinks.body, "[[b]]\n");
        assert_eq!(&text[backlinks.start..backlinks.body_start], "===== Backlinks =====\n");

        let plain = split_sections("no section", "===== Backlinks =====");
        assert_eq!(plain.content, "no section");
        assert!(plain.backlinks.is_none());
    }

    #[test]
    fn format_link_follows_directory_rules() {
        let source = page("1_Source/module.txt");
        let sibling = page("1_Source/item.txt");
        let remote = page("2_Decl/net/item2.txt");

        assert_eq!(format_link(&source, &sibling, None), "[[item]]");
        assert_eq!(format_link(&source, &sibling, Some("item")), "[[item]]");
        assert_eq!(format_link(&source, &sibling, Some("Item")), "[[item|Item]]");
        assert_eq!(format_link(&source, &remote, None), "[[2_Decl:net:item2|item2]]");
        assert_eq!(
            format_link(&source, &remote, Some("net item")),
            "[[2_Decl:net:item2|net item]]"
        );
    }

    #[test]
    fn rewrite_spans_applies_from_the_end() {
        let content = "[[a]] x [[b]]";
        let rewritten = rewrite_spans(
            content,
            vec![(0, 5, "[[dir:a|a]]".to_string()), (8, 13, "[[b2]]".to_string())],
        );
        assert_eq!(rewritten, "[[dir:a|a]] x [[b2]]");
    }
}
