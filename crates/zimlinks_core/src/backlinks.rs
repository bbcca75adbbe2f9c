use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::LinksConfig;
use crate::filesystem::{FileEdit, apply_edits};
use crate::forward::FixOptions;
use crate::graph::{LinkGraph, PageId, PageIndex, UnresolvedLink, build_link_graph};
use crate::links::{extract_links, format_link, split_sections};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacklinkIssue {
    pub relative_path: String,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub expected: Vec<String>,
    pub marker_conflict: bool,
    pub missing_section: bool,
    pub fixed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacklinksReport {
    pub scanned_files: usize,
    pub unresolved: Vec<UnresolvedLink>,
    pub issues: Vec<BacklinkIssue>,
    pub total_fixed: usize,
    pub fix_mode: bool,
    pub dry_run: bool,
    #[serde(skip)]
    pub edits: Vec<FileEdit>,
}

impl BacklinksReport {
    pub fn success(&self) -> bool {
        if self.fix_mode && !self.dry_run {
            self.issues.iter().all(|issue| issue.fixed)
        } else {
            self.issues.is_empty()
        }
    }
}

pub fn verify_backlinks(
    root: &Path,
    config: &LinksConfig,
    options: FixOptions,
) -> Result<BacklinksReport> {
    let index = PageIndex::scan(root, config)?;
    info!(pages = index.len(), "checking backlinks");
    let graph = build_link_graph(&index);

    let mut issues = Vec::new();
    let mut edits = Vec::new();
    for (id, page) in index.pages() {
        if !page.is_text {
            continue;
        }
        let Some((issue, edit)) = check_page(&index, &graph, config, id, options.plans_edits())
        else {
            continue;
        };
        debug!(
            page = %page.relative_path,
            missing = issue.missing.len(),
            extra = issue.extra.len(),
            "backlink issue"
        );
        issues.push(issue);
        if let Some(edit) = edit {
            edits.push(edit);
        }
    }

    let mut total_fixed = 0usize;
    if options.writes() {
        let written = apply_edits(&edits)?;
        info!(files = written, "rewrote backlinks sections");
        for issue in &mut issues {
            issue.fixed = true;
        }
        total_fixed = issues.len();
    }

    Ok(BacklinksReport {
        scanned_files: index.len(),
        unresolved: graph.unresolved,
        issues,
        total_fixed,
        fix_mode: options.fix,
        dry_run: options.dry_run,
        edits,
    })
}

fn check_page(
    index: &PageIndex,
    graph: &LinkGraph,
    config: &LinksConfig,
    id: PageId,
    plan_edit: bool,
) -> Option<(BacklinkIssue, Option<FileEdit>)> {
    let page = index.page(id);
    let sections = split_sections(&page.text, index.backlinks_header());
    let expected = graph.sources_of(id);

    let Some(section) = sections.backlinks else {
        if !config.structure.require_backlinks_section || expected.is_empty() {
            return None;
        }
        let issue = BacklinkIssue {
            relative_path: page.relative_path.clone(),
            missing: sorted_paths(index, expected.iter().copied()),
            extra: Vec::new(),
            expected: sorted_paths(index, expected.iter().copied()),
            marker_conflict: false,
            missing_section: true,
            fixed: false,
        };
        let edit = plan_edit.then(|| {
            let body = render_backlinks_body(index, id, &expected);
            let separator = if page.text.is_empty() || page.text.ends_with('\n') {
                ""
            } else {
                "\n"
            };
            FileEdit {
                path: page.path.clone(),
                relative_path: page.relative_path.clone(),
                before: page.text.clone(),
                after: format!(
                    "{}{separator}\n{}\n{body}",
                    page.text,
                    index.backlinks_header()
                ),
            }
        });
        return Some((issue, edit));
    };

    let current: BTreeSet<PageId> = extract_links(section.body)
        .iter()
        .filter_map(|link| index.resolve(&link.target, id).page())
        .collect();
    let marker_conflict =
        config.is_no_backlinks_marker(section.body.trim()) && !expected.is_empty();
    if current == expected && !marker_conflict {
        return None;
    }

    let issue = BacklinkIssue {
        relative_path: page.relative_path.clone(),
        missing: sorted_paths(index, expected.difference(&current).copied()),
        extra: sorted_paths(index, current.difference(&expected).copied()),
        expected: sorted_paths(index, expected.iter().copied()),
        marker_conflict,
        missing_section: false,
        fixed: false,
    };
    let edit = plan_edit.then(|| {
        let body = render_backlinks_body(index, id, &expected);
        let header = page.text[section.start..section.body_start].trim_end();
        FileEdit {
            path: page.path.clone(),
            relative_path: page.relative_path.clone(),
            before: page.text.clone(),
            after: format!("{}{header}\n{body}", &page.text[..section.start]),
        }
    });
    Some((issue, edit))
}

/// Expected section body: one canonical link per source sorted by name, or
/// `(no backlinks)` when nothing links here.
pub fn render_backlinks_body(index: &PageIndex, target: PageId, sources: &BTreeSet<PageId>) -> String {
    if sources.is_empty() {
        return "(no backlinks)\n".to_string();
    }
    let mut ordered: Vec<PageId> = sources.iter().copied().collect();
    index.sort_by_name(&mut ordered);
    let target_page = index.page(target);
    let mut body = ordered
        .into_iter()
        .map(|source| format_link(target_page, index.page(source), None))
        .collect::<Vec<_>>()
        .join("\n");
    body.push('\n');
    body
}

fn sorted_paths(index: &PageIndex, ids: impl Iterator<Item = PageId>) -> Vec<String> {
    let mut ids: Vec<PageId> = ids.collect();
    index.sort_by_name(&mut ids);
    ids.into_iter()
        .map(|id| index.page(id).relative_path.clone())
        .collect()
}
