//! plurkdump - Plurk timeline archiver
//!
//! Main entry point for the plurkdump command-line tool.

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use plurkdump::activity::{self, AuthorTotal};
use plurkdump::cli::{
    Cli, Commands, CompletionsArgs, ConfigArgs, OutputFormat, ReportArgs, SyncArgs,
};
use plurkdump::error::format_unknown_value_error;
use plurkdump::logging::{OperationGuard, init_cli_logging};
use plurkdump::sync::SyncOptions;
use plurkdump::{
    ActivityTable, ChartOptions, Config, ConsumerCredentials, Palette, PlurkError, StdinVerifier,
    Storage, StoreStats, SyncOutcome, Syncer, authenticate, chart, date_parser, format_error,
    format_number,
};

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_cli_logging(cli.quiet, cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Completions(args) => return cmd_completions(args),
        Commands::Config(args) if args.init => return cmd_config_init(cli),
        _ => {}
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }

    match &cli.command {
        Commands::Sync(args) => cmd_sync(cli, config, args),
        Commands::Report(args) => cmd_report(cli, config, args),
        Commands::Stats => cmd_stats(cli, &config),
        Commands::Config(args) => cmd_config(cli, &config, args),
        Commands::Completions(_) => Ok(()),
    }
}

fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<PlurkError>() {
        Some(PlurkError::UnknownPalette { name }) => {
            format_unknown_value_error("palette", name, &Palette::names())
        }
        Some(plurk_err) => {
            let mut hints = Vec::new();
            if plurk_err.is_resumable() {
                hints.push("Stored data is intact; the next sync resumes from the oldest plurk.");
            }
            if let Some(hint) = plurk_err.suggestion() {
                hints.push(hint);
            }
            let detail = plurk_err.to_string();
            let title = if err.to_string() == detail {
                detail
            } else {
                format!("{err}: {detail}")
            };
            format_error(&title, "", &hints)
        }
        None => format_error(&format!("{err:#}"), "", &[]),
    }
}

fn print_json<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let json = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn fmt_epoch(epoch: Option<f64>) -> String {
    epoch.map_or_else(|| "-".to_string(), date_parser::format_epoch)
}

fn cmd_sync(cli: &Cli, mut config: Config, args: &SyncArgs) -> Result<()> {
    if let Some(size) = args.page_size {
        config.api.page_size = size;
    }
    if args.max_pages.is_some() {
        config.sync.max_pages = args.max_pages;
    }
    if args.no_reply_authors {
        config.sync.store_reply_authors = false;
    }
    config.validate()?;

    let consumer = ConsumerCredentials::from_env()?;
    let db_path = config.db_path();
    let mut storage = Storage::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let guard = OperationGuard::new("sync");
    let session = authenticate(&config.api, consumer, &mut StdinVerifier)?;

    let profile = session.fetch_own_profile()?;
    if let Some(user) = &profile.user_info {
        info!(user = %user.label(), id = user.id, "Logged in");
    }

    let pb = if cli.quiet || cli.format.is_json() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Fetching newest page...");

    let result = Syncer::new(&session, &mut storage, SyncOptions::from(&config.sync))
        .on_page(|page| {
            pb.set_message(format!(
                "page {} | {} plurks, {} responses | back to {}",
                page.page,
                page.posts,
                page.replies,
                fmt_epoch(page.cursor)
            ));
        })
        .run();
    pb.finish_and_clear();
    let report = guard.finish(result)?;

    if cli.format.is_json() {
        return print_json(cli.format, &report);
    }

    println!("{}", "Sync complete".bold().green());
    println!("  Stopped:    {}", report.outcome.to_string().cyan());
    println!("  Pages:      {}", format_number(to_i64(report.pages)));
    println!("  Plurks:     {}", format_number(to_i64(report.posts)));
    println!("  Responses:  {}", format_number(to_i64(report.replies)));
    println!("  Requests:   {}", format_number(to_i64(report.requests)));
    println!("  Oldest:     {}", fmt_epoch(report.oldest));
    println!("  Newest:     {}", fmt_epoch(report.newest));
    if report.dangling_reply_authors > 0 {
        println!(
            "  {} {} reply authors are not in the users table",
            "!".yellow(),
            report.dangling_reply_authors
        );
    }
    if report.outcome == SyncOutcome::Stalled {
        println!(
            "  {} the API returned a page that was not older than the stored plurks",
            "!".yellow()
        );
    }

    Ok(())
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[derive(Serialize)]
struct ReportOutput {
    charts: Vec<String>,
    months: usize,
    users: usize,
}

fn cmd_report(cli: &Cli, mut config: Config, args: &ReportArgs) -> Result<()> {
    if let Some(palette) = &args.palette {
        config.report.palette.clone_from(palette);
    }
    if let Some(scale) = args.scale {
        config.report.scale = scale;
    }
    if let Some(dir) = &args.output_dir {
        config.paths.output_dir = Some(dir.clone());
    }

    let base = ChartOptions::from_config(&config.report)?;
    let palettes = if args.all_palettes {
        Palette::ALL.to_vec()
    } else {
        vec![base.palette]
    };

    let db_path = config.db_path();
    let storage = Storage::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let guard = OperationGuard::new("report");
    let output_dir = config.output_dir();
    let result = render_all(&storage, &base, &palettes, &output_dir);
    let (table, charts) = guard.finish(result)?;

    if cli.format.is_json() {
        return print_json(
            cli.format,
            &ReportOutput {
                charts: charts.iter().map(|p| p.display().to_string()).collect(),
                months: table.months.len(),
                users: table.authors.len(),
            },
        );
    }

    if table.is_empty() && !cli.quiet {
        println!("{}", "No activity stored yet; wrote an empty chart.".yellow());
    }
    for path in &charts {
        println!("  {} {}", "✓".green(), path.display());
    }
    Ok(())
}

fn render_all(
    storage: &Storage,
    base: &ChartOptions,
    palettes: &[Palette],
    output_dir: &Path,
) -> plurkdump::Result<(ActivityTable, Vec<std::path::PathBuf>)> {
    let table = ActivityTable::from_storage(storage)?;
    let charts = palettes
        .iter()
        .map(|&palette| {
            let options = ChartOptions {
                palette,
                ..base.clone()
            };
            chart::render_activity_chart(&table, &options, output_dir)
        })
        .collect::<plurkdump::Result<Vec<_>>>()?;
    Ok((table, charts))
}

#[derive(Serialize)]
struct StatsOutput {
    #[serde(flatten)]
    store: StoreStats,
    users: Vec<AuthorTotal>,
    months: std::collections::BTreeMap<String, u64>,
}

fn cmd_stats(cli: &Cli, config: &Config) -> Result<()> {
    let db_path = config.db_path();
    if !db_path.exists() {
        anyhow::bail!(
            "No database found at {}. Run 'plurkdump sync' first.",
            db_path.display()
        );
    }

    let storage = Storage::open(&db_path)?;
    let stats = storage.get_stats()?;
    let counts = storage.activity_counts()?;
    let table = ActivityTable::pivot(&counts, chrono::Utc::now().date_naive());

    if cli.format.is_json() {
        return print_json(
            cli.format,
            &StatsOutput {
                store: stats,
                users: table.author_totals(),
                months: activity::monthly_totals(&counts),
            },
        );
    }

    println!("{}", "Store Statistics".bold().cyan());
    println!("{}", "─".repeat(40));
    println!("  {:<22} {:>12}", "Plurks:", format_number(stats.posts_count));
    println!("  {:<22} {:>12}", "Responses:", format_number(stats.replies_count));
    println!("  {:<22} {:>12}", "Users:", format_number(stats.authors_count));
    println!("{}", "─".repeat(40));
    println!("  Oldest plurk: {}", fmt_epoch(stats.oldest_post).green());
    println!("  Newest plurk: {}", fmt_epoch(stats.newest_post).green());

    if stats.dangling_reply_authors > 0 || stats.orphan_replies > 0 {
        println!();
        println!(
            "  {} {} reply authors without a user row, {} responses without their plurk",
            "!".yellow(),
            stats.dangling_reply_authors,
            stats.orphan_replies
        );
    }

    let totals = table.author_totals();
    if !totals.is_empty() {
        println!();
        println!("{}", "Most active users".bold());
        for total in totals.iter().take(10) {
            println!(
                "  {:<28} {:>10}",
                total.author,
                format_number(i64::try_from(total.count).unwrap_or(i64::MAX))
            );
        }

        println!();
        println!(
            "  {} {} .. {}",
            activity::sparkline(&table.month_totals(), 60).cyan(),
            table.months.first().map_or("", String::as_str).dimmed(),
            table.months.last().map_or("", String::as_str).dimmed()
        );
    }

    Ok(())
}

/// Runs before any config is loaded so a broken or missing file can be replaced.
fn cmd_config_init(cli: &Cli) -> Result<()> {
    let path = cli
        .config
        .clone()
        .or_else(Config::user_config_path)
        .context("Could not determine a config directory; pass --config")?;
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    Config::default().save_to(&path)?;
    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config, args: &ConfigArgs) -> Result<()> {
    if cli.format.is_json() {
        return print_json(cli.format, config);
    }

    println!("{}", "Current Configuration".bold().cyan());
    println!("  Database: {}", config.db_path().display());
    println!("  Charts:   {}", config.output_dir().display());
    if let Some(path) = cli.config.clone().or_else(Config::user_config_path) {
        let state = if path.exists() { "" } else { " (not present)" };
        println!("  File:     {}{}", path.display(), state.dimmed());
    }
    if args.show {
        println!();
        print!("{}", config.to_toml());
    }
    Ok(())
}

fn cmd_completions(args: &CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "plurkdump", &mut io::stdout());
    Ok(())
}
