use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::LinksConfig;
use crate::filesystem::{FileEdit, apply_edits};
use crate::graph::{PageId, PageIndex};
use crate::links::{extract_links, rewrite_spans};

/// Element name (grammar production or page name) -> page.
#[derive(Debug, Clone, Default)]
pub struct ElementIndex {
    elements: BTreeMap<String, PageId>,
}

impl ElementIndex {
    pub fn build(index: &PageIndex) -> Self {
        let mut elements = BTreeMap::new();
        for (id, page) in index.pages() {
            if let Some(name) = grammar_element_name(&page.text) {
                elements.entry(name.to_string()).or_insert(id);
            }
        }
        for (id, page) in index.pages() {
            elements.entry(page.name.replace(' ', "_")).or_insert(id);
        }
        Self { elements }
    }

    pub fn get(&self, name: &str) -> Option<PageId> {
        self.elements.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Left-hand side of the first `name ::=` production line, if any.
pub fn grammar_element_name(text: &str) -> Option<&str> {
    text.lines().find_map(|line| {
        let name_len = line
            .bytes()
            .take_while(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || *byte == b'_')
            .count();
        if name_len == 0 {
            return None;
        }
        let rest = line[name_len..].trim_start();
        rest.starts_with("::=").then(|| &line[..name_len])
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relinked {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRelinkReport {
    pub relative_path: String,
    pub relinked: Vec<Relinked>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelinkReport {
    pub scanned_files: usize,
    pub elements: usize,
    pub files: Vec<FileRelinkReport>,
    pub total_relinked: usize,
    pub dry_run: bool,
    #[serde(skip)]
    pub edits: Vec<FileEdit>,
}

/// Rewrite every link that is not an existing fully qualified path to the
/// full zim path of the page defining the element it names.
pub fn relink_pages(root: &Path, config: &LinksConfig, dry_run: bool) -> Result<RelinkReport> {
    let index = PageIndex::scan(root, config)?;
    let elements = ElementIndex::build(&index);
    info!(pages = index.len(), elements = elements.len(), "relinking");

    let mut files = Vec::new();
    let mut edits = Vec::new();
    for (_, page) in index.pages() {
        if !page.is_text {
            continue;
        }
        let mut relinked = Vec::new();
        let mut replacements = Vec::new();
        for link in extract_links(&page.text) {
            if link.is_child() {
                continue;
            }
            if link.target.contains(':') && index.qualified_path(&link.target).is_file() {
                continue;
            }
            let element = link.target_name();
            let Some(target) = elements.get(element) else {
                continue;
            };
            let label = link.label.as_deref().unwrap_or(element);
            let replacement = format!("[[{}|{label}]]", index.page(target).zim_path);
            if replacement == link.text {
                continue;
            }
            replacements.push((link.start, link.end, replacement.clone()));
            relinked.push(Relinked {
                from: link.text,
                to: replacement,
            });
        }
        if relinked.is_empty() {
            continue;
        }
        debug!(page = %page.relative_path, links = relinked.len(), "relinked page");
        edits.push(FileEdit {
            path: page.path.clone(),
            relative_path: page.relative_path.clone(),
            before: page.text.clone(),
            after: rewrite_spans(&page.text, replacements),
        });
        files.push(FileRelinkReport {
            relative_path: page.relative_path.clone(),
            relinked,
        });
    }

    if !dry_run {
        let written = apply_edits(&edits)?;
        info!(files = written, "relinked pages");
    }

    Ok(RelinkReport {
        scanned_files: index.len(),
        elements: elements.len(),
        total_relinked: files.iter().map(|file| file.relinked.len()).sum(),
        files,
        dry_run,
        edits,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{grammar_element_name, relink_pages};
    use crate::config::LinksConfig;

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("parent");
        fs::create_dir_all(parent).expect("create parent");
        fs::write(path, content).expect("write file");
    }

    #[test]
    fn grammar_element_name_reads_first_production() {
        assert_eq!(
            grammar_element_name("Content-Type: text/x-zim-wiki\n\nmodule_item ::= port_declaration ;\nother ::= x"),
            Some("module_item")
        );
        assert_eq!(grammar_element_name("Module_Item ::= x"), None);
        assert_eq!(grammar_element_name("no production"), None);
    }

    #[test]
    fn relinks_bare_and_misplaced_links_across_the_whole_file() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(
            &root.join("a").join("page.txt"),
            "[[wrong:dir:net]] [[sib]] [[b:net|net]]\n===== Backlinks =====\n[[gone:net]]\n",
        );
        write_file(&root.join("a").join("sib.txt"), "");
        write_file(&root.join("b").join("net.txt"), "");

        let report = relink_pages(root, &LinksConfig::default(), false).expect("relink");
        assert_eq!(report.total_relinked, 3);
        let targets: Vec<&str> = report.files[0]
            .relinked
            .iter()
            .map(|relinked| relinked.to.as_str())
            .collect();
        assert_eq!(targets, vec!["[[b:net|net]]", "[[a:sib|sib]]", "[[b:net|net]]"]);
        assert_eq!(
            fs::read_to_string(root.join("a").join("page.txt")).expect("read"),
            "[[b:net|net]] [[a:sib|sib]] [[b:net|net]]\n===== Backlinks =====\n[[b:net|net]]\n"
        );
    }

    #[test]
    fn relinks_through_grammar_productions_and_keeps_labels() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(
            &root.join("src").join("module.txt"),
            "module ::= [[old:place:module_item]] [[port_list|ports]] [[nowhere]] [[+child]]\n",
        );
        write_file(&root.join("items").join("item page.txt"), "module_item ::= x\n");
        write_file(&root.join("items").join("port_list.txt"), "port_list ::= y\n");
        write_file(&root.join("src").join("port_list.txt"), "port_list ::= z\n");

        let report = relink_pages(root, &LinksConfig::default(), false).expect("relink");
        assert_eq!(report.total_relinked, 2);
        assert_eq!(
            fs::read_to_string(root.join("src").join("module.txt")).expect("read"),
            "module ::= [[items:item page|module_item]] [[items:port_list|ports]] [[nowhere]] [[+child]]\n"
        );
    }

    #[test]
    fn dry_run_leaves_files_untouched() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("a").join("page.txt"), "[[gone:target]]\n");
        write_file(&root.join("b").join("target_page.txt"), "target ::= x\n");

        let report = relink_pages(root, &LinksConfig::default(), true).expect("relink");
        assert_eq!(report.edits.len(), 1);
        assert_eq!(report.edits[0].after, "[[b:target_page|target]]\n");
        assert_eq!(
            fs::read_to_string(root.join("a").join("page.txt")).expect("read"),
            "[[gone:target]]\n"
        );
    }
}
