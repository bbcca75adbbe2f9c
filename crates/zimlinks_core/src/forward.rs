use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::LinksConfig;
use crate::filesystem::{FileEdit, apply_edits};
use crate::graph::{PageId, PageIndex, Resolution};
use crate::links::{extract_page_links, format_link, rewrite_spans, split_sections};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixOptions {
    pub fix: bool,
    pub dry_run: bool,
}

impl FixOptions {
    pub fn check_only() -> Self {
        Self::default()
    }

    pub fn writes(self) -> bool {
        self.fix && !self.dry_run
    }

    pub fn plans_edits(self) -> bool {
        self.fix || self.dry_run
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardIssue {
    Unresolved {
        link: String,
        target: String,
    },
    Ambiguous {
        link: String,
        target: String,
        candidates: Vec<String>,
    },
    WrongFormat {
        current: String,
        correct: String,
        target: String,
    },
}

impl ForwardIssue {
    pub fn is_fixable(&self) -> bool {
        matches!(self, Self::WrongFormat { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileForwardReport {
    pub relative_path: String,
    pub issues: Vec<ForwardIssue>,
    pub fixed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateName {
    pub name: String,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForwardReport {
    pub scanned_files: usize,
    pub duplicates: Vec<DuplicateName>,
    pub files: Vec<FileForwardReport>,
    pub total_issues: usize,
    pub fixable: usize,
    pub total_fixed: usize,
    pub fix_mode: bool,
    pub dry_run: bool,
    #[serde(skip)]
    pub edits: Vec<FileEdit>,
}

impl ForwardReport {
    pub fn unfixed(&self) -> usize {
        self.total_issues - self.total_fixed
    }

    /// Clean tree, or a real `--fix` run that left nothing behind.
    pub fn success(&self) -> bool {
        if self.fix_mode && !self.dry_run {
            self.unfixed() == 0
        } else {
            self.total_issues == 0
        }
    }
}

pub fn verify_forward_links(
    root: &Path,
    config: &LinksConfig,
    options: FixOptions,
) -> Result<ForwardReport> {
    let index = PageIndex::scan(root, config)?;
    info!(pages = index.len(), "checking forward links");

    let duplicates = index
        .duplicate_names()
        .into_iter()
        .map(|(name, ids)| DuplicateName {
            name: name.to_string(),
            locations: ids
                .iter()
                .map(|id| index.page(*id).relative_path.clone())
                .collect(),
        })
        .collect();

    let mut files = Vec::new();
    let mut edits = Vec::new();
    for (id, page) in index.pages() {
        if !page.is_text {
            continue;
        }
        let (issues, edit) = check_page(&index, id, options.plans_edits());
        if issues.is_empty() {
            continue;
        }
        debug!(page = %page.relative_path, issues = issues.len(), "forward link issues");
        let fixable = issues.iter().filter(|issue| issue.is_fixable()).count();
        files.push(FileForwardReport {
            relative_path: page.relative_path.clone(),
            issues,
            fixed: if options.writes() { fixable } else { 0 },
        });
        if let Some(edit) = edit {
            edits.push(edit);
        }
    }

    if options.writes() {
        let written = apply_edits(&edits)?;
        info!(files = written, "rewrote forward links");
    }

    let total_issues = files.iter().map(|file| file.issues.len()).sum();
    let fixable = files
        .iter()
        .flat_map(|file| &file.issues)
        .filter(|issue| issue.is_fixable())
        .count();
    let total_fixed = files.iter().map(|file| file.fixed).sum();

    Ok(ForwardReport {
        scanned_files: index.len(),
        duplicates,
        files,
        total_issues,
        fixable,
        total_fixed,
        fix_mode: options.fix,
        dry_run: options.dry_run,
        edits,
    })
}

fn check_page(index: &PageIndex, id: PageId, plan_edit: bool) -> (Vec<ForwardIssue>, Option<FileEdit>) {
    let page = index.page(id);
    let sections = split_sections(&page.text, index.backlinks_header());

    let mut issues = Vec::new();
    let mut replacements = Vec::new();
    for link in extract_page_links(sections.content) {
        match index.resolve(&link.target, id) {
            Resolution::Unresolved => issues.push(ForwardIssue::Unresolved {
                link: link.text,
                target: link.target,
            }),
            Resolution::Ambiguous(candidates) => issues.push(ForwardIssue::Ambiguous {
                link: link.text,
                target: link.target,
                candidates: candidates
                    .iter()
                    .map(|candidate| index.page(*candidate).relative_path.clone())
                    .collect(),
            }),
            Resolution::Resolved(target) => {
                let target_page = index.page(target);
                let correct = format_link(page, target_page, link.label.as_deref());
                if correct != link.text {
                    replacements.push((link.start, link.end, correct.clone()));
                    issues.push(ForwardIssue::WrongFormat {
                        current: link.text,
                        correct,
                        target: target_page.relative_path.clone(),
                    });
                }
            }
        }
    }

    let edit = (plan_edit && !replacements.is_empty()).then(|| {
        let content = rewrite_spans(sections.content, replacements);
        let backlinks = &page.text[sections.content.len()..];
        FileEdit {
            path: page.path.clone(),
            relative_path: page.relative_path.clone(),
            before: page.text.clone(),
            after: format!("{content}{backlinks}"),
        }
    });
    (issues, edit)
}
