use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::{Date, OffsetDateTime, UtcOffset};
use unicode_segmentation::UnicodeSegmentation;

use crate::analytics::AnalyticsSummary;
use crate::app::{App, Outcome, OutcomeLevel};
use crate::dates;
use crate::history::HistoryGroup;
use crate::metadata::parse_link_url;
use crate::model::{AnalyticsEvent, BoardData, CardGroup, DateGroup};

const TITLE_WIDTH: usize = 60;

#[derive(Args, Debug, Clone)]
pub struct TabArgs {
    #[command(subcommand)]
    pub command: TabCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TabCommand {
    /// List tabs, newest first
    List,
    /// Create a tab for a day (defaults to today) and make it active
    Create(TabCreateArgs),
    /// Make an existing tab the active one
    Select(TabDateArgs),
    /// Delete a tab and move its links to history
    Delete(TabDeleteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TabCreateArgs {
    /// Day in YYYY-MM-DD form
    pub date: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TabDateArgs {
    /// Tab day in YYYY-MM-DD form
    pub date: String,
}

#[derive(Args, Debug, Clone)]
pub struct TabDeleteArgs {
    /// Tab day in YYYY-MM-DD form
    pub date: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    #[command(subcommand)]
    pub command: LinkCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LinkCommand {
    /// Add a link to the active tab
    Add(LinkAddArgs),
    /// List the links of a tab (defaults to the active tab)
    List(LinkListArgs),
    /// Change a link; a new date moves it to that day's tab
    Edit(LinkEditArgs),
    /// Move a link to history
    Delete(LinkIdArgs),
    /// Set or clear a link's to-do date
    Todo(LinkTodoArgs),
    /// Swap the positions of two links in the active tab
    Swap(LinkSwapArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LinkAddArgs {
    pub url: String,
    /// Title to use instead of the fetched one
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LinkListArgs {
    /// Tab day in YYYY-MM-DD form
    #[arg(long)]
    pub tab: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LinkEditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// New creation day in YYYY-MM-DD form
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LinkIdArgs {
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct LinkTodoArgs {
    pub id: String,
    /// YYYY-MM-DD or an RFC 3339 timestamp
    #[arg(required_unless_present = "clear")]
    pub date: Option<String>,
    /// Remove the to-do date instead
    #[arg(long, conflicts_with = "date")]
    pub clear: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LinkSwapArgs {
    pub source: String,
    pub target: String,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// Show trashed links grouped by their original tab
    List,
    /// Permanently remove one trashed link
    Remove(LinkIdArgs),
    /// Permanently remove every trashed link from one tab
    ClearGroup(TabDateArgs),
    /// Permanently remove all trashed links
    Clear,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyticsArgs {
    #[command(subcommand)]
    pub command: AnalyticsCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AnalyticsCommand {
    /// Most recent events first
    Recent(RecentArgs),
    /// Net totals and per-day activity
    Summary,
    /// Reset the log
    Clear,
}

#[derive(Args, Debug, Clone)]
pub struct RecentArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct GroupArgs {
    #[command(subcommand)]
    pub command: GroupCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GroupCommand {
    /// Save a named selection of link ids
    Create(GroupCreateArgs),
    /// List saved groups of a tab (defaults to the active tab)
    List(GroupListArgs),
    /// Delete a saved group
    Delete(LinkIdArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GroupCreateArgs {
    pub name: String,
    /// Link ids to include
    pub ids: Vec<String>,
    #[arg(long)]
    pub tab: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct GroupListArgs {
    #[arg(long)]
    pub tab: Option<String>,
    /// Include groups of every tab
    #[arg(long, conflicts_with = "tab")]
    pub all: bool,
}

pub fn show_board(app: &mut App) -> Result<()> {
    let active = app.active_tab();
    print!("{}", format_board(&app.board(), active.as_deref()));
    Ok(())
}

pub fn handle_tab_command(app: &mut App, args: TabArgs) -> Result<()> {
    match args.command {
        TabCommand::List => {
            let active = app.active_tab();
            print!("{}", format_tabs(&app.board(), active.as_deref()));
            Ok(())
        }
        TabCommand::Create(args) => {
            let offset = app.config.board.utc_offset();
            let date = match args.date.as_deref() {
                Some(raw) => parse_day(raw)?,
                None => dates::today(offset),
            };
            report(app.create_tab(date))
        }
        TabCommand::Select(args) => report(app.select_tab(&args.date)),
        TabCommand::Delete(args) => tab_delete(app, args),
    }
}

fn tab_delete(app: &mut App, args: TabDeleteArgs) -> Result<()> {
    let question = app.attempt_delete_tab(&args.date);
    if question.is_failure() {
        return report(question);
    }
    let confirmed = args.yes || confirm(&question.description)?;
    if confirmed {
        report(app.confirm_delete_tab())
    } else {
        report(app.cancel_delete_tab())
    }
}

pub fn handle_link_command(app: &mut App, args: LinkArgs) -> Result<()> {
    match args.command {
        LinkCommand::Add(args) => report(app.add_link(&args.url, args.title.as_deref())),
        LinkCommand::List(args) => link_list(app, args),
        LinkCommand::Edit(args) => link_edit(app, args),
        LinkCommand::Delete(args) => report(app.delete_link(&args.id)),
        LinkCommand::Todo(args) => {
            let todo = match (args.clear, args.date.as_deref()) {
                (true, _) | (false, None) => None,
                (false, Some(raw)) => Some(parse_todo_date(raw, app.config.board.utc_offset())?),
            };
            report(app.update_link_todo_date(&args.id, todo))
        }
        LinkCommand::Swap(args) => report(app.swap_items(&args.source, &args.target)),
    }
}

fn link_list(app: &mut App, args: LinkListArgs) -> Result<()> {
    let Some(tab) = args.tab.or_else(|| app.active_tab()) else {
        println!("No tabs yet. Create one with `todlex tab create`.");
        return Ok(());
    };
    let board = app.board();
    let Some(group) = board.group(&tab) else {
        bail!("no tab for {tab}");
    };
    print!("{}", format_group(group));
    Ok(())
}

fn link_edit(app: &mut App, args: LinkEditArgs) -> Result<()> {
    let Some(mut link) = app.find_link(&args.id) else {
        return report(Outcome::info("Link Not Found", format!("No link with id {}.", args.id)));
    };
    if let Some(url) = args.url {
        if let Err(err) = parse_link_url(&url) {
            return report(err.into());
        }
        link.url = url.trim().to_string();
    }
    if let Some(title) = args.title {
        let title = title.trim();
        link.title = if title.is_empty() { link.url.clone() } else { title.to_string() };
    }
    if let Some(description) = args.description {
        let description = description.trim();
        link.description = (!description.is_empty()).then(|| description.to_string());
    }
    if let Some(raw) = args.date.as_deref() {
        let offset = app.config.board.utc_offset();
        link.created_at = dates::at_day(parse_day(raw)?, link.created_at, offset);
    }
    report(app.edit_link(link))
}

pub fn handle_history_command(app: &mut App, args: HistoryArgs) -> Result<()> {
    match args.command {
        HistoryCommand::List => {
            print!("{}", format_history(&app.history_groups()));
            Ok(())
        }
        HistoryCommand::Remove(args) => report(app.remove_history_item(&args.id)),
        HistoryCommand::ClearGroup(args) => report(app.remove_history_group(&args.date)),
        HistoryCommand::Clear => report(app.clear_history()),
    }
}

pub fn handle_analytics_command(app: &mut App, args: AnalyticsArgs) -> Result<()> {
    match args.command {
        AnalyticsCommand::Recent(args) => {
            print!("{}", format_events(&app.recent_events(args.limit)));
            Ok(())
        }
        AnalyticsCommand::Summary => {
            print!("{}", format_summary(&app.analytics_summary()));
            Ok(())
        }
        AnalyticsCommand::Clear => report(app.clear_analytics()),
    }
}

pub fn handle_group_command(app: &mut App, args: GroupArgs) -> Result<()> {
    match args.command {
        GroupCommand::Create(args) => {
            report(app.create_card_group(&args.name, args.ids, args.tab.as_deref()))
        }
        GroupCommand::List(args) => {
            let groups = if args.all {
                app.all_card_groups()
            } else {
                app.card_groups(args.tab.as_deref())
            };
            print!("{}", format_card_groups(&groups));
            Ok(())
        }
        GroupCommand::Delete(args) => report(app.delete_card_group(&args.id)),
    }
}

/// Prints an outcome; failures also become the command's error.
fn report(outcome: Outcome) -> Result<()> {
    match outcome.level {
        OutcomeLevel::Failure => bail!("{outcome}"),
        OutcomeLevel::Success | OutcomeLevel::Info => {
            println!("{outcome}");
            Ok(())
        }
    }
}

/// Asks a y/N question on the terminal. Non-interactive stdin answers no.
fn confirm(question: &str) -> Result<bool> {
    if !atty::is(atty::Stream::Stdin) {
        tracing::info!("stdin is not a terminal; treating confirmation as declined");
        return Ok(false);
    }
    let mut stdout = io::stdout();
    write!(stdout, "{question} [y/N]: ")?;
    stdout.flush()?;
    read_confirmation(&mut io::stdin().lock())
}

fn read_confirmation(input: &mut impl BufRead) -> Result<bool> {
    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn parse_day(raw: &str) -> Result<Date> {
    dates::parse_day_key(raw.trim())
        .with_context(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

/// Accepts a full RFC 3339 timestamp or a bare day, which means midnight in
/// the board's offset.
fn parse_todo_date(raw: &str, offset: UtcOffset) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = dates::parse_timestamp(raw) {
        return Ok(ts);
    }
    let day = parse_day(raw)?;
    Ok(day.midnight().assume_offset(offset).to_offset(UtcOffset::UTC))
}

fn truncate(text: &str, width: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(width).collect();
    if graphemes.next().is_some() {
        let mut cut: Vec<&str> = head.graphemes(true).collect();
        cut.pop();
        format!("{}…", cut.concat())
    } else {
        head
    }
}

fn format_board(board: &BoardData, active: Option<&str>) -> String {
    if board.is_empty() {
        return "No tabs yet. Create one with `todlex tab create`.\n".to_string();
    }
    let mut out = String::new();
    for group in &board.date_groups {
        let marker = if Some(group.date_string.as_str()) == active { "*" } else { " " };
        let _ = writeln!(&mut out, "{marker} {}", group.title);
        out.push_str(&format_group(group));
        out.push('\n');
    }
    out
}

fn format_tabs(board: &BoardData, active: Option<&str>) -> String {
    if board.is_empty() {
        return "No tabs yet.\n".to_string();
    }
    let mut out = String::new();
    for group in &board.date_groups {
        let marker = if Some(group.date_string.as_str()) == active { "*" } else { " " };
        let count = group.items.len();
        let _ = writeln!(
            &mut out,
            "{marker} {}  {}  ({count} link{})",
            group.date_string,
            group.title,
            if count == 1 { "" } else { "s" }
        );
    }
    out
}

fn format_group(group: &DateGroup) -> String {
    if group.items.is_empty() {
        return "    (no links)\n".to_string();
    }
    let mut out = String::new();
    for item in group.sorted_items() {
        let _ = writeln!(
            &mut out,
            "  {:>3}. {}",
            item.order(),
            truncate(&item.title, TITLE_WIDTH)
        );
        let _ = writeln!(&mut out, "       {}", item.url);
        if let Some(description) = &item.description {
            let _ = writeln!(&mut out, "       {}", truncate(description, TITLE_WIDTH));
        }
        if let Some(todo) = item.todo_date {
            let _ = writeln!(&mut out, "       todo {}", dates::format_timestamp(todo));
        }
        let _ = writeln!(&mut out, "       id {}", item.id);
    }
    out
}

fn format_history(groups: &[HistoryGroup]) -> String {
    if groups.is_empty() {
        return "History is empty.\n".to_string();
    }
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(&mut out, "{}  ({})", group.title, group.date_string);
        for entry in &group.items {
            let _ = writeln!(
                &mut out,
                "  - {}  deleted {}",
                truncate(&entry.link.title, TITLE_WIDTH),
                dates::format_timestamp(entry.deleted_at)
            );
            let _ = writeln!(&mut out, "    {}  id {}", entry.link.url, entry.link.id);
        }
    }
    out
}

fn format_events(events: &[AnalyticsEvent]) -> String {
    if events.is_empty() {
        return "No activity recorded.\n".to_string();
    }
    let mut out = String::new();
    for event in events {
        let detail = event
            .details
            .title
            .as_deref()
            .or(event.details.message.as_deref())
            .unwrap_or("");
        let _ = writeln!(
            &mut out,
            "{}  {:<17} {}",
            dates::format_timestamp(event.timestamp),
            event.kind,
            truncate(detail, TITLE_WIDTH)
        );
    }
    out
}

fn format_summary(summary: &AnalyticsSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "Net links: {:+}", summary.net_links);
    let _ = writeln!(&mut out, "Net tabs:  {:+}", summary.net_tabs);
    let _ = writeln!(&mut out, "\nDay         links +/-   tabs +/-");
    for day in &summary.daily {
        let _ = writeln!(
            &mut out,
            "{}  {:>5}/{:<5} {:>4}/{:<4}",
            dates::day_key(day.date),
            day.links_created,
            day.links_deleted,
            day.tabs_created,
            day.tabs_deleted
        );
    }
    let _ = writeln!(&mut out, "\nRecent activity");
    out.push_str(&format_events(&summary.recent));
    out
}

fn format_card_groups(groups: &[CardGroup]) -> String {
    if groups.is_empty() {
        return "No saved groups.\n".to_string();
    }
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(
            &mut out,
            "{}  [{}]  {} card(s)  id {}",
            truncate(&group.name, TITLE_WIDTH),
            group.date_string,
            group.card_ids.len(),
            group.id
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metadata::{LinkMetadata, StaticFetcher};
    use crate::storage::testing::init_storage;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;
    use time::macros::{date, datetime};

    type TestResult<T = ()> = Result<T>;

    fn setup_app() -> TestResult<(TempDir, App)> {
        let (temp, storage) = init_storage()?;
        let fetcher = StaticFetcher(LinkMetadata {
            title: Some("Fetched Title".into()),
            ..LinkMetadata::default()
        });
        let mut app = App::new(Arc::new(AppConfig::default()), storage).with_fetcher(Arc::new(fetcher));
        app.init();
        Ok((temp, app))
    }

    #[test]
    fn cli_board_marks_active_tab_and_sorts_links() -> TestResult {
        let (_temp, mut app) = setup_app()?;
        handle_tab_command(
            &mut app,
            TabArgs { command: TabCommand::Create(TabCreateArgs { date: Some("2024-05-19".into()) }) },
        )?;
        handle_tab_command(
            &mut app,
            TabArgs { command: TabCommand::Create(TabCreateArgs { date: Some("2024-05-20".into()) }) },
        )?;
        handle_link_command(
            &mut app,
            LinkArgs {
                command: LinkCommand::Add(LinkAddArgs {
                    url: "https://a.com".into(),
                    title: Some("Alpha".into()),
                }),
            },
        )?;
        handle_link_command(
            &mut app,
            LinkArgs {
                command: LinkCommand::Add(LinkAddArgs { url: "https://b.com".into(), title: None }),
            },
        )?;

        let output = format_board(&app.board(), app.active_tab().as_deref());
        let alpha = output.find("Alpha").expect("alpha listed");
        let fetched = output.find("Fetched Title").expect("fetched title listed");
        assert!(alpha < fetched, "links print in orderInTab order");
        assert!(output.contains("* May 20, 2024, Monday"));
        assert!(output.contains("  May 19, 2024, Sunday"));
        Ok(())
    }

    #[test]
    fn cli_rejects_bad_input_with_errors() -> TestResult {
        let (_temp, mut app) = setup_app()?;
        let err = handle_link_command(
            &mut app,
            LinkArgs {
                command: LinkCommand::Add(LinkAddArgs { url: "https://a.com".into(), title: None }),
            },
        )
        .expect_err("no tabs yet");
        assert!(err.to_string().starts_with("No Tab Selected"));

        let err = handle_tab_command(
            &mut app,
            TabArgs { command: TabCommand::Create(TabCreateArgs { date: Some("20-05-2024".into()) }) },
        )
        .expect_err("bad date");
        assert!(err.to_string().contains("YYYY-MM-DD"));
        Ok(())
    }

    #[test]
    fn cli_tab_delete_with_yes_moves_links_to_history() -> TestResult {
        let (_temp, mut app) = setup_app()?;
        app.create_tab(date!(2024 - 05 - 20));
        app.add_link("https://a.com", None);

        tab_delete(&mut app, TabDeleteArgs { date: "2024-05-20".into(), yes: true })?;
        assert!(app.board().is_empty());
        let history = format_history(&app.history_groups());
        assert!(history.contains("May 20, 2024, Monday  (2024-05-20)"));
        assert!(history.contains("Fetched Title"));

        assert!(tab_delete(&mut app, TabDeleteArgs { date: "2024-05-20".into(), yes: true }).is_err());
        Ok(())
    }

    #[test]
    fn cli_link_edit_moves_between_days() -> TestResult {
        let (_temp, mut app) = setup_app()?;
        app.create_tab(date!(2024 - 05 - 20));
        app.add_link("https://a.com", Some("Alpha"));
        let id = app.board().date_groups[0].items[0].id.clone();

        link_edit(
            &mut app,
            LinkEditArgs {
                id: id.clone(),
                title: Some("Renamed".into()),
                url: None,
                description: Some("  ".into()),
                date: Some("2024-05-18".into()),
            },
        )?;
        let board = app.board();
        let moved = board.group("2024-05-18").expect("new tab");
        assert_eq!(moved.items[0].title, "Renamed");
        assert!(moved.items[0].description.is_none());
        assert_eq!(app.active_tab().as_deref(), Some("2024-05-18"));

        let err = link_edit(
            &mut app,
            LinkEditArgs {
                id,
                title: None,
                url: Some("not a url".into()),
                description: None,
                date: None,
            },
        )
        .expect_err("invalid url");
        assert!(err.to_string().starts_with("Invalid Link"));
        Ok(())
    }

    #[test]
    fn cli_confirmation_parsing() -> TestResult {
        assert!(read_confirmation(&mut Cursor::new("y\n"))?);
        assert!(read_confirmation(&mut Cursor::new(" YES \n"))?);
        assert!(!read_confirmation(&mut Cursor::new("\n"))?);
        assert!(!read_confirmation(&mut Cursor::new("nope\n"))?);
        Ok(())
    }

    #[test]
    fn cli_todo_dates_accept_days_and_timestamps() -> TestResult {
        let offset = UtcOffset::from_hms(2, 0, 0)?;
        assert_eq!(
            parse_todo_date("2024-06-01", offset)?,
            datetime!(2024-05-31 22:00 UTC)
        );
        assert_eq!(
            parse_todo_date("2024-06-01T09:30:00Z", offset)?,
            datetime!(2024-06-01 09:30 UTC)
        );
        assert!(parse_todo_date("June 1st", offset).is_err());
        Ok(())
    }

    #[test]
    fn cli_truncates_on_grapheme_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("héllo wörld", 6), "héllo…");
        assert_eq!(truncate("👍🏽👍🏽👍🏽", 2), "👍🏽…");
    }
}
