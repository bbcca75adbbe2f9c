use std::path::Path;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::config::LinksConfig;
use crate::filesystem::{display_path, validate_scoped_path, zim_to_relative_path};
use crate::graph::{PageIndex, Resolution};
use crate::links::{extract_links, extract_page_links};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Ok,
    Ambiguous,
    Broken,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Ambiguous => "AMBIGUOUS",
            Self::Broken => "BROKEN",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckedLink {
    pub link: String,
    pub status: LinkStatus,
    pub resolved: Option<String>,
    pub expected: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCheckReport {
    pub relative_path: String,
    pub links: Vec<CheckedLink>,
}

impl FileCheckReport {
    pub fn broken(&self) -> usize {
        self.links
            .iter()
            .filter(|link| link.status != LinkStatus::Ok)
            .count()
    }
}

/// Status of every link on one page, backlinks section and child links included.
pub fn check_file(root: &Path, config: &LinksConfig, file: &Path) -> Result<FileCheckReport> {
    validate_scoped_path(root, file)?;
    let index = PageIndex::scan(root, config)?;
    let Some(id) = index.page_by_path(file) else {
        bail!(
            "not a .{} page under {}: {}",
            index.extension(),
            display_path(root),
            display_path(file)
        );
    };
    let page = index.page(id);

    let links = extract_links(&page.text)
        .into_iter()
        .map(|link| {
            let resolution = index.resolve(&link.target, id);
            let status = match &resolution {
                Resolution::Resolved(_) => LinkStatus::Ok,
                Resolution::Ambiguous(_) => LinkStatus::Ambiguous,
                Resolution::Unresolved => LinkStatus::Broken,
            };
            CheckedLink {
                expected: zim_to_relative_path(&link.target, index.extension()),
                resolved: resolution
                    .page()
                    .map(|target| index.page(target).relative_path.clone()),
                link: link.text,
                status,
            }
        })
        .collect();

    Ok(FileCheckReport {
        relative_path: page.relative_path.clone(),
        links,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub link: String,
    pub target: String,
    pub label: Option<String>,
    pub expected: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileBrokenLinks {
    pub relative_path: String,
    pub broken: Vec<BrokenLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokenLinksReport {
    pub scanned_files: usize,
    pub files: Vec<FileBrokenLinks>,
}

impl BrokenLinksReport {
    pub fn total_broken(&self) -> usize {
        self.files.iter().map(|file| file.broken.len()).sum()
    }
}

/// Strict sweep: every link must be a fully qualified path from the root.
pub fn find_broken_links(root: &Path, config: &LinksConfig) -> Result<BrokenLinksReport> {
    let index = PageIndex::scan(root, config)?;
    let mut files = Vec::new();
    for (_, page) in index.pages() {
        if !page.is_text {
            continue;
        }
        let broken: Vec<BrokenLink> = extract_page_links(&page.text)
            .into_iter()
            .filter(|link| !index.qualified_path(&link.target).is_file())
            .map(|link| BrokenLink {
                expected: zim_to_relative_path(&link.target, index.extension()),
                link: link.text,
                target: link.target,
                label: link.label,
            })
            .collect();
        if !broken.is_empty() {
            files.push(FileBrokenLinks {
                relative_path: page.relative_path.clone(),
                broken,
            });
        }
    }
    Ok(BrokenLinksReport {
        scanned_files: index.len(),
        files,
    })
}
