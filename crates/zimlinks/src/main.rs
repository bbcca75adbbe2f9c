use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use zimlinks_core::backlinks::{BacklinksReport, verify_backlinks};
use zimlinks_core::config::{LinksConfig, load_config, render_config};
use zimlinks_core::filesystem::FileEdit;
use zimlinks_core::forward::{FixOptions, ForwardIssue, ForwardReport, verify_forward_links};
use zimlinks_core::inspect::{BrokenLinksReport, FileCheckReport, check_file, find_broken_links};
use zimlinks_core::relink::{RelinkReport, relink_pages};
use zimlinks_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use zimlinks_core::verify::verify_all;

const RULE: &str = "============================================================";

#[derive(Debug, Parser)]
#[command(
    name = "zimlinks",
    version,
    about = "Verify and repair forward links and backlinks in a Zim wiki tree"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Structure root to scan")]
    root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(name = "verify-all", about = "Forward-link check, then backlink check")]
    VerifyAll(FixArgs),
    #[command(about = "Check that every content link resolves and uses canonical form")]
    Forward(FixArgs),
    #[command(about = "Check that backlinks sections list exactly the linking pages")]
    Backlinks(FixArgs),
    #[command(about = "Repoint unresolvable links using grammar element names")]
    Relink(RelinkArgs),
    #[command(about = "List every link on one page with its status")]
    Check(CheckArgs),
    #[command(about = "List links that are not fully qualified paths to existing pages")]
    Broken,
    #[command(about = "Print the resolved configuration")]
    Config,
}

#[derive(Debug, Args)]
struct FixArgs {
    #[arg(long, help = "Rewrite pages to repair fixable issues")]
    fix: bool,
    #[arg(long, help = "Show the repairs as diffs without writing")]
    dry_run: bool,
}

impl FixArgs {
    fn options(&self) -> FixOptions {
        FixOptions {
            fix: self.fix,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Args)]
struct RelinkArgs {
    #[arg(long, help = "Show the rewrites as diffs without writing")]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    file: PathBuf,
}

struct Runtime {
    paths: ResolvedPaths,
    config: LinksConfig,
    format: OutputFormat,
    diagnostics: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if run(cli)? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match verbose {
        0 => "zimlinks=warn,zimlinks_core=warn",
        1 => "zimlinks=info,zimlinks_core=info",
        2 => "zimlinks=debug,zimlinks_core=debug",
        _ => "zimlinks=trace,zimlinks_core=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the tree is consistent.
fn run(cli: Cli) -> Result<bool> {
    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(true);
    };
    let runtime = load_runtime(&cli.root, &cli.config, cli.format, cli.diagnostics)?;
    let root = runtime.paths.root.as_path();

    let success = match command {
        Commands::VerifyAll(args) => {
            let report = verify_all(root, &runtime.config, args.options())?;
            if runtime.format == OutputFormat::Json {
                print_json(&report)?;
            } else {
                print_forward(&runtime, &report.forward);
                println!();
                print_backlinks(&runtime, &report.backlinks);
                println!();
                println!(
                    "verify-all: {}",
                    if report.success { "PASSED" } else { "FAILED" }
                );
            }
            report.success
        }
        Commands::Forward(args) => {
            let report = verify_forward_links(root, &runtime.config, args.options())?;
            if runtime.format == OutputFormat::Json {
                print_json(&report)?;
            } else {
                print_forward(&runtime, &report);
            }
            report.success()
        }
        Commands::Backlinks(args) => {
            let report = verify_backlinks(root, &runtime.config, args.options())?;
            if runtime.format == OutputFormat::Json {
                print_json(&report)?;
            } else {
                print_backlinks(&runtime, &report);
            }
            report.success()
        }
        Commands::Relink(args) => {
            let report = relink_pages(root, &runtime.config, args.dry_run)?;
            if runtime.format == OutputFormat::Json {
                print_json(&report)?;
            } else {
                print_relink(&report);
            }
            true
        }
        Commands::Check(args) => {
            let file = if args.file.is_absolute() {
                args.file
            } else {
                ResolutionContext::from_process()?.cwd.join(args.file)
            };
            let report = check_file(root, &runtime.config, &file)?;
            if runtime.format == OutputFormat::Json {
                print_json(&report)?;
            } else {
                print_check(&report);
            }
            report.broken() == 0
        }
        Commands::Broken => {
            let report = find_broken_links(root, &runtime.config)?;
            if runtime.format == OutputFormat::Json {
                print_json(&report)?;
            } else {
                print_broken(&report);
            }
            report.total_broken() == 0
        }
        Commands::Config => {
            println!("root: {}", normalize_for_display(&runtime.paths.root));
            println!(
                "config_path: {}",
                normalize_for_display(&runtime.paths.config_path)
            );
            println!();
            print!("{}", render_config(&runtime.config)?);
            true
        }
    };

    if runtime.diagnostics {
        eprintln!("\n[diagnostics]\n{}", runtime.paths.diagnostics());
    }
    Ok(success)
}

fn load_runtime(
    root: &Option<PathBuf>,
    config: &Option<PathBuf>,
    format: OutputFormat,
    diagnostics: bool,
) -> Result<Runtime> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        root: root.clone(),
        config: config.clone(),
    };
    let initial = resolve_paths(&context, &overrides)?;
    let root_env = initial.root.join(".env");
    let paths = if root_env.exists() {
        let _ = dotenvy::from_path_override(&root_env);
        resolve_paths(&context, &overrides)?
    } else {
        initial
    };
    let config = load_config(&paths.config_path)?;
    tracing::debug!(root = %normalize_for_display(&paths.root), "resolved runtime");

    Ok(Runtime {
        paths,
        config,
        format,
        diagnostics,
    })
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn print_forward(runtime: &Runtime, report: &ForwardReport) {
    let limits = &runtime.config.report;
    println!(
        "Scanning {} files for forward link issues...",
        report.scanned_files
    );

    if !report.duplicates.is_empty() {
        println!(
            "\nNote: {} page names exist in multiple locations:",
            report.duplicates.len()
        );
        for duplicate in report.duplicates.iter().take(limits.duplicate_limit) {
            println!("  {}:", duplicate.name);
            for location in &duplicate.locations {
                println!("    - {location}");
            }
        }
        if report.duplicates.len() > limits.duplicate_limit {
            println!(
                "  ... and {} more",
                report.duplicates.len() - limits.duplicate_limit
            );
        }
    }

    println!("\n{RULE}\nFORWARD LINK ANALYSIS\n{RULE}");
    for file in &report.files {
        println!("\n{}:", file.relative_path);
        for issue in &file.issues {
            match issue {
                ForwardIssue::Unresolved { target, .. } => {
                    println!("  ERROR: Cannot find target for [[{target}]]");
                }
                ForwardIssue::Ambiguous {
                    target, candidates, ..
                } => {
                    println!(
                        "  WARNING: Ambiguous link [[{target}]] - {} matches",
                        candidates.len()
                    );
                    for candidate in candidates.iter().take(limits.candidate_limit) {
                        println!("           -> {candidate}");
                    }
                }
                ForwardIssue::WrongFormat {
                    current, correct, ..
                } => println!("  FIX: {current} -> {correct}"),
            }
        }
        if file.fixed > 0 {
            println!("  -> Fixed {} links", file.fixed);
        }
    }
    print_diffs(report.dry_run, &report.edits);

    println!("\n{RULE}\nSUMMARY\n{RULE}");
    if report.total_issues == 0 {
        println!("All forward links are correct!");
        return;
    }
    println!("Files with issues: {}", report.files.len());
    println!("Total issues found: {}", report.total_issues);
    if report.fix_mode && !report.dry_run {
        println!("Issues fixed: {}", report.total_fixed);
        if report.unfixed() > 0 {
            println!("Issues requiring manual attention: {}", report.unfixed());
        }
    } else if report.fixable > 0 {
        println!("\nRun with --fix to repair {} fixable issues", report.fixable);
    }
}

fn print_backlinks(runtime: &Runtime, report: &BacklinksReport) {
    let limit = runtime.config.report.unresolved_limit;
    println!("Scanning {} files...", report.scanned_files);

    if !report.unresolved.is_empty() {
        println!(
            "\nWARNING: {} unresolved links found:",
            report.unresolved.len()
        );
        for link in report.unresolved.iter().take(limit) {
            let note = if link.ambiguous { " (ambiguous)" } else { "" };
            println!("  {}: [[{}]]{note}", link.source, link.target);
        }
        if report.unresolved.len() > limit {
            println!("  ... and {} more", report.unresolved.len() - limit);
        }
    }

    if report.issues.is_empty() {
        println!("\nAll backlinks are correct!");
        return;
    }

    println!("\n{RULE}\nBACKLINK ISSUES: {} files\n{RULE}", report.issues.len());
    for issue in &report.issues {
        println!("\n{}:", issue.relative_path);
        if issue.missing_section {
            println!("  Backlinks section missing");
        }
        if issue.marker_conflict {
            println!("  Marked as having no backlinks, but is referenced");
        }
        if !issue.missing.is_empty() {
            println!("  Missing ({}):", issue.missing.len());
            for path in &issue.missing {
                println!("    + {path}");
            }
        }
        if !issue.extra.is_empty() {
            println!("  Extra ({}):", issue.extra.len());
            for path in &issue.extra {
                println!("    - {path}");
            }
        }
        if issue.fixed {
            println!("  -> FIXED");
        }
    }
    print_diffs(report.dry_run, &report.edits);

    if report.fix_mode && !report.dry_run {
        println!("\n\nFixed {} files", report.total_fixed);
    } else {
        println!("\n\nRun with --fix to repair these issues");
    }
}

fn print_relink(report: &RelinkReport) {
    println!("Scanned {} files", report.scanned_files);
    println!("Found {} elements\n", report.elements);
    for file in &report.files {
        println!("{}:", file.relative_path);
        for relinked in &file.relinked {
            println!("  {} -> {}", relinked.from, relinked.to);
        }
    }
    print_diffs(report.dry_run, &report.edits);
    let verb = if report.dry_run { "would relink" } else { "relinked" };
    println!(
        "\nTotal links {verb}: {} in {} files",
        report.total_relinked,
        report.files.len()
    );
}

fn print_check(report: &FileCheckReport) {
    println!("Checking: {}\n", report.relative_path);
    for link in &report.links {
        println!("  [{}] {}", link.status.as_str(), link.link);
        match &link.resolved {
            Some(resolved) => println!("         -> {resolved}"),
            None => println!("         Expected: {}", link.expected),
        }
    }
}

fn print_broken(report: &BrokenLinksReport) {
    if report.files.is_empty() {
        println!("No broken links found!");
        return;
    }
    println!("Found broken links:\n");
    for file in &report.files {
        println!("{}:", file.relative_path);
        for link in &file.broken {
            println!("  {}", link.link);
            println!("    Expected: {}", link.expected);
        }
        println!();
    }
    println!("Total files with broken links: {}", report.files.len());
    println!("Total broken links: {}", report.total_broken());
}

fn print_diffs(dry_run: bool, edits: &[FileEdit]) {
    if !dry_run || edits.is_empty() {
        return;
    }
    println!("\n[dry-run] {} files would change:", edits.len());
    for edit in edits {
        print!("{}", edit.unified_diff());
    }
}
