use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::backlinks::{BacklinksReport, verify_backlinks};
use crate::config::LinksConfig;
use crate::forward::{FixOptions, ForwardReport, verify_forward_links};

#[derive(Debug, Clone, Serialize)]
pub struct VerifyAllReport {
    pub forward: ForwardReport,
    pub backlinks: BacklinksReport,
    pub success: bool,
}

/// Forward links first, then backlinks against the tree the forward pass left behind.
pub fn verify_all(root: &Path, config: &LinksConfig, options: FixOptions) -> Result<VerifyAllReport> {
    let forward = verify_forward_links(root, config, options)?;
    let backlinks = verify_backlinks(root, config, options)?;
    let success = forward.success() && backlinks.success();
    info!(
        forward_issues = forward.total_issues,
        backlink_issues = backlinks.issues.len(),
        success,
        "verification finished"
    );
    Ok(VerifyAllReport {
        forward,
        backlinks,
        success,
    })
}
