use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use similar::TextDiff;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One wiki page on disk.
#[derive(Debug, Clone)]
pub struct Page {
    pub path: PathBuf,
    pub relative_path: String,
    pub name: String,
    pub zim_path: String,
    pub text: String,
    pub is_text: bool,
}

impl Page {
    /// Directory of the page relative to the root, `/`-separated; empty at the root.
    pub fn relative_dir(&self) -> &str {
        match self.relative_path.rfind('/') {
            Some(index) => &self.relative_path[..index],
            None => "",
        }
    }

    pub fn same_dir(&self, other: &Page) -> bool {
        self.relative_dir() == other.relative_dir()
    }
}

pub fn scan_pages(root: &Path, extension: &str) -> Result<Vec<Page>> {
    if !root.is_dir() {
        bail!("structure root is not a directory: {}", display_path(root));
    }

    let mut pages = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", display_path(root)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|value| value.to_str()) != Some(extension) {
            continue;
        }
        pages.push(read_page(root, path, extension)?);
    }
    pages.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    debug!(root = %display_path(root), pages = pages.len(), "scanned structure");
    Ok(pages)
}

fn read_page(root: &Path, path: &Path, extension: &str) -> Result<Page> {
    let relative_path = relative_from_root(root, path)?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", display_path(path)))?;
    let (text, is_text) = match String::from_utf8(bytes) {
        Ok(text) => (text, true),
        Err(_) => {
            warn!(page = %relative_path, "skipping non-UTF-8 page content");
            (String::new(), false)
        }
    };
    let zim_path = relative_path_to_zim(&relative_path, extension);
    let name = zim_path
        .rsplit(':')
        .next()
        .unwrap_or(zim_path.as_str())
        .to_string();

    Ok(Page {
        path: path.to_path_buf(),
        relative_path,
        name,
        zim_path,
        text,
        is_text,
    })
}

/// `1_Source_text/module_item.txt` -> `1_Source_text:module_item`.
pub fn relative_path_to_zim(relative_path: &str, extension: &str) -> String {
    let normalized = normalize_separators(relative_path);
    let suffix = format!(".{extension}");
    let stem = normalized.strip_suffix(&suffix).unwrap_or(&normalized);
    stem.replace('/', ":")
}

/// `1_Source_text:module_item` -> `1_Source_text/module_item.txt`.
pub fn zim_to_relative_path(zim_path: &str, extension: &str) -> String {
    format!("{}.{extension}", zim_path.replace(':', "/"))
}

pub fn relative_from_root(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).with_context(|| {
        format!(
            "{} is not inside {}",
            display_path(path),
            display_path(root)
        )
    })?;
    Ok(normalize_separators(&relative.to_string_lossy()))
}

/// Reject paths that would escape the root once `..` components are folded.
pub fn validate_scoped_path(root: &Path, candidate: &Path) -> Result<()> {
    let root = normalize_pathbuf(root);
    let candidate = normalize_pathbuf(candidate);
    if !candidate.starts_with(&root) {
        bail!(
            "path escapes structure root: {} (root: {})",
            display_path(&candidate),
            display_path(&root)
        );
    }
    Ok(())
}

pub fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn display_path(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

/// A pending rewrite of one page.
#[derive(Debug, Clone)]
pub struct FileEdit {
    pub path: PathBuf,
    pub relative_path: String,
    pub before: String,
    pub after: String,
}

impl FileEdit {
    pub fn unified_diff(&self) -> String {
        TextDiff::from_lines(&self.before, &self.after)
            .unified_diff()
            .context_radius(2)
            .header(
                &format!("a/{}", self.relative_path),
                &format!("b/{}", self.relative_path),
            )
            .to_string()
    }
}

/// Write every edit whose content changed; returns the number of files written.
pub fn apply_edits(edits: &[FileEdit]) -> Result<usize> {
    let mut written = 0usize;
    for edit in edits {
        if edit.before == edit.after {
            continue;
        }
        fs::write(&edit.path, &edit.after)
            .with_context(|| format!("failed to write {}", display_path(&edit.path)))?;
        debug!(page = %edit.relative_path, "rewrote page");
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{
        FileEdit, apply_edits, relative_path_to_zim, scan_pages, validate_scoped_path,
        zim_to_relative_path,
    };

    fn write_file(path: &Path, content: &[u8]) {
        let parent = path.parent().expect("parent");
        fs::create_dir_all(parent).expect("create parent");
        fs::write(path, content).expect("write file");
    }

    #[test]
    fn zim_paths_map_to_relative_paths() {
        assert_eq!(
            relative_path_to_zim("1_Source_text/1.4_Module_items/module_item.txt", "txt"),
            "1_Source_text:1.4_Module_items:module_item"
        );
        assert_eq!(relative_path_to_zim("top.txt", "txt"), "top");
        assert_eq!(
            zim_to_relative_path("1_Source_text:module_item", "txt"),
            "1_Source_text/module_item.txt"
        );
    }

    #[test]
    fn scan_pages_collects_sorted_pages_with_extension() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("b").join("beta.txt"), b"beta");
        write_file(&root.join("a").join("alpha.txt"), b"alpha");
        write_file(&root.join("a").join("notes.md"), b"ignored");
        write_file(&root.join("binary.txt"), &[0xff, 0xfe, 0x00]);

        let pages = scan_pages(root, "txt").expect("scan");
        let relative: Vec<&str> = pages.iter().map(|page| page.relative_path.as_str()).collect();
        assert_eq!(relative, vec!["a/alpha.txt", "b/beta.txt", "binary.txt"]);
        assert_eq!(pages[0].name, "alpha");
        assert_eq!(pages[0].zim_path, "a:alpha");
        assert_eq!(pages[0].relative_dir(), "a");
        assert_eq!(pages[0].text, "alpha");
        assert!(!pages[2].is_text);
        assert_eq!(pages[2].relative_dir(), "");
    }

    #[test]
    fn scoped_path_validation_blocks_escaping_path() {
        let root = Path::new("/repo/doc/Structure");
        assert!(validate_scoped_path(root, &root.join("a").join("b.txt")).is_ok());
        let err = validate_scoped_path(root, &root.join("..").join("..").join("x.txt"))
            .expect_err("must fail");
        assert!(err.to_string().contains("escapes structure root"));
    }

    #[test]
    fn apply_edits_skips_unchanged_and_reports_diff() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("page.txt");
        write_file(&path, b"one\ntwo\n");

        let edits = vec![
            FileEdit {
                path: path.clone(),
                relative_path: "page.txt".to_string(),
                before: "one\ntwo\n".to_string(),
                after: "one\nthree\n".to_string(),
            },
            FileEdit {
                path: temp.path().join("untouched.txt"),
                relative_path: "untouched.txt".to_string(),
                before: "same\n".to_string(),
                after: "same\n".to_string(),
            },
        ];
        let diff = edits[0].unified_diff();
        assert!(diff.contains("--- a/page.txt"));
        assert!(diff.contains("-two"));
        assert!(diff.contains("+three"));

        assert_eq!(apply_edits(&edits).expect("apply"), 1);
        assert_eq!(fs::read_to_string(&path).expect("read"), "one\nthree\n");
        assert!(!temp.path().join("untouched.txt").exists());
    }
}
