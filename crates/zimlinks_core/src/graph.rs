use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::LinksConfig;
use crate::filesystem::{Page, normalize_pathbuf, scan_pages};
use crate::links::{extract_page_links, split_sections};

pub type PageId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(PageId),
    Ambiguous(Vec<PageId>),
    Unresolved,
}

impl Resolution {
    pub fn page(&self) -> Option<PageId> {
        match self {
            Self::Resolved(id) => Some(*id),
            _ => None,
        }
    }
}

/// All pages under the structure root plus the lookup tables used to resolve links.
#[derive(Debug, Clone)]
pub struct PageIndex {
    root: PathBuf,
    extension: String,
    header: String,
    pages: Vec<Page>,
    by_path: HashMap<PathBuf, PageId>,
    by_name: BTreeMap<String, Vec<PageId>>,
}

impl PageIndex {
    pub fn scan(root: &Path, config: &LinksConfig) -> Result<Self> {
        let pages = scan_pages(root, config.extension())?;
        Ok(Self::from_pages(root, config, pages))
    }

    pub fn from_pages(root: &Path, config: &LinksConfig, pages: Vec<Page>) -> Self {
        let mut by_path = HashMap::with_capacity(pages.len());
        let mut by_name: BTreeMap<String, Vec<PageId>> = BTreeMap::new();
        for (id, page) in pages.iter().enumerate() {
            by_path.insert(normalize_pathbuf(&page.path), id);
            by_name.entry(page.name.clone()).or_default().push(id);
        }
        Self {
            root: root.to_path_buf(),
            extension: config.extension().to_string(),
            header: config.backlinks_header(),
            pages,
            by_path,
            by_name,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn backlinks_header(&self) -> &str {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, id: PageId) -> &Page {
        &self.pages[id]
    }

    pub fn pages(&self) -> impl Iterator<Item = (PageId, &Page)> {
        self.pages.iter().enumerate()
    }

    pub fn page_by_path(&self, path: &Path) -> Option<PageId> {
        self.by_path.get(&normalize_pathbuf(path)).copied()
    }

    pub fn pages_named(&self, name: &str) -> &[PageId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names that exist in more than one directory, sorted by name.
    pub fn duplicate_names(&self) -> Vec<(&str, &[PageId])> {
        self.by_name
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(name, ids)| (name.as_str(), ids.as_slice()))
            .collect()
    }

    /// Path a fully qualified `a:b:name` target refers to.
    pub fn qualified_path(&self, target: &str) -> PathBuf {
        let mut path = self.root.clone();
        let mut segments = target.split(':').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}.{}", self.extension));
            }
        }
        path
    }

    /// Resolve `target` as written on page `source`.
    ///
    /// Qualified targets are looked up from the root, bare names next to the
    /// source page; both fall back to a unique page name match.
    pub fn resolve(&self, target: &str, source: PageId) -> Resolution {
        let direct = if target.contains(':') {
            self.qualified_path(target)
        } else {
            let source_dir = self.pages[source]
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone());
            source_dir.join(format!("{target}.{}", self.extension))
        };
        if let Some(id) = self.page_by_path(&direct) {
            return Resolution::Resolved(id);
        }

        let name = target.rsplit(':').next().unwrap_or(target);
        match self.pages_named(name) {
            [] => Resolution::Unresolved,
            [single] => Resolution::Resolved(*single),
            many => Resolution::Ambiguous(many.to_vec()),
        }
    }

    /// Sort key used wherever page lists are rendered: name, then path.
    pub fn sort_by_name(&self, ids: &mut [PageId]) {
        ids.sort_by(|left, right| {
            self.pages[*left]
                .name
                .cmp(&self.pages[*right].name)
                .then(left.cmp(right))
        });
    }
}

/// A resolved content link, source page to target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEdge {
    pub source: PageId,
    pub target: PageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLink {
    pub source: String,
    pub target: String,
    pub ambiguous: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    pub edges: Vec<LinkEdge>,
    pub reverse: BTreeMap<PageId, BTreeSet<PageId>>,
    pub unresolved: Vec<UnresolvedLink>,
}

impl LinkGraph {
    /// Distinct pages linking to `target`.
    pub fn sources_of(&self, target: PageId) -> BTreeSet<PageId> {
        self.reverse.get(&target).cloned().unwrap_or_default()
    }
}

/// Extract and resolve the content links of every page.
pub fn build_link_graph(index: &PageIndex) -> LinkGraph {
    let mut graph = LinkGraph::default();
    for (source, page) in index.pages() {
        if !page.is_text {
            continue;
        }
        let sections = split_sections(&page.text, index.backlinks_header());
        for link in extract_page_links(sections.content) {
            match index.resolve(&link.target, source) {
                Resolution::Resolved(target) => {
                    graph.reverse.entry(target).or_default().insert(source);
                    graph.edges.push(LinkEdge { source, target });
                }
                resolution => graph.unresolved.push(UnresolvedLink {
                    source: page.relative_path.clone(),
                    target: link.target,
                    ambiguous: matches!(resolution, Resolution::Ambiguous(_)),
                }),
            }
        }
    }
    debug!(
        edges = graph.edges.len(),
        unresolved = graph.unresolved.len(),
        "built link graph"
    );
    graph
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{PageIndex, Resolution, build_link_graph};
    use crate::config::LinksConfig;

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("parent");
        fs::create_dir_all(parent).expect("create parent");
        fs::write(path, content).expect("write file");
    }

    fn id_of(index: &PageIndex, relative: &str) -> usize {
        index
            .pages()
            .find(|(_, page)| page.relative_path == relative)
            .map(|(id, _)| id)
            .expect("page id")
    }

    #[test]
    fn resolve_prefers_direct_paths_then_unique_names() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("src").join("module.txt"), "");
        write_file(&root.join("src").join("item.txt"), "");
        write_file(&root.join("decl").join("item.txt"), "");
        write_file(&root.join("decl").join("net.txt"), "");

        let index = PageIndex::scan(root, &LinksConfig::default()).expect("scan");
        let module = id_of(&index, "src/module.txt");
        let src_item = id_of(&index, "src/item.txt");
        let decl_item = id_of(&index, "decl/item.txt");
        let net = id_of(&index, "decl/net.txt");

        assert_eq!(index.resolve("item", module), Resolution::Resolved(src_item));
        assert_eq!(index.resolve("decl:item", module), Resolution::Resolved(decl_item));
        assert_eq!(index.resolve("net", module), Resolution::Resolved(net));
        assert_eq!(index.resolve("wrong:dir:net", module), Resolution::Resolved(net));
        assert_eq!(
            index.resolve("other:item", module),
            Resolution::Ambiguous(vec![decl_item, src_item])
        );
        assert_eq!(index.resolve("missing", module), Resolution::Unresolved);
        assert_eq!(index.duplicate_names().len(), 1);
    }

    #[test]
    fn link_graph_ignores_backlinks_and_child_links() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(
            &root.join("a.txt"),
            "[[b]] [[b|again]] [[+child]] [[ghost]]\n===== Backlinks =====\n[[c]]\n",
        );
        write_file(&root.join("b.txt"), "[[a]]\n");
        write_file(&root.join("c.txt"), "plain\n");

        let index = PageIndex::scan(root, &LinksConfig::default()).expect("scan");
        let graph = build_link_graph(&index);
        let a = id_of(&index, "a.txt");
        let b = id_of(&index, "b.txt");
        let c = id_of(&index, "c.txt");

        assert_eq!(graph.edges.len(), 3);
        assert_eq!(graph.sources_of(b).into_iter().collect::<Vec<_>>(), vec![a]);
        assert_eq!(graph.sources_of(a).into_iter().collect::<Vec<_>>(), vec![b]);
        assert!(graph.sources_of(c).is_empty());
        assert_eq!(graph.unresolved.len(), 1);
        assert_eq!(graph.unresolved[0].target, "ghost");
        assert!(!graph.unresolved[0].ambiguous);
    }
}
