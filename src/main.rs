use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use prettytable::{Cell, Row as PrettyRow, Table};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use erblogx::auth::{Identity, IdentityProvider};
use erblogx::bookmarks::BookmarkStore;
use erblogx::config::{ClientConfig, StoreConfig};
use erblogx::db::Database;
use erblogx::library::{provision_user, LibraryView};
use erblogx::logging::configure_logging;
use erblogx::remote::{ApiClient, RemoteClient, SearchBackend};
use erblogx::session::{SearchSession, SessionState};
use erblogx::store::{LibraryStore, RestStore, StoreError};
use erblogx::suggestions::SuggestionProvider;
use erblogx::types::{Article, ArticleId, Summary};
use erblogx::util::{excerpt, format_published_date, format_similarity};
use erblogx::TARGET_SESSION;

#[derive(Parser)]
#[command(author, version, about = "Semantic search over engineering blogs", long_about = None)]
struct Cli {
    /// Base URL of the search backend
    #[arg(long)]
    api_url: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retries after a timed out or failed attempt
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Sign in as this address on start
    #[arg(long)]
    email: Option<String>,

    /// Keep the library in this SQLite file instead of the hosted store
    #[arg(long)]
    database: Option<String>,

    /// Require sign-in before searching
    #[arg(long)]
    require_sign_in: bool,

    /// Skip the request that wakes the backend on start
    #[arg(long)]
    no_warmup: bool,
}

impl Cli {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.remote.timeout = std::time::Duration::from_millis(ms);
        }
        if let Some(attempts) = self.retry_attempts {
            config.remote.retry_attempts = attempts;
        }
        if let Some(ms) = self.retry_delay_ms {
            config.remote.retry_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(path) = &self.database {
            config.store = StoreConfig::Sqlite { path: path.clone() };
        }
        if self.require_sign_in {
            config.gate.require_sign_in_for_search = true;
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Search(String),
    Focus,
    Pick(usize),
    Summary,
    Save(usize),
    SignIn(String),
    SignOut,
    Library,
    LibrarySummary,
    Dismiss,
    Help,
    Quit,
    Unknown(String),
}

/// Plain text searches; lines starting with `:` are commands. Numbers are 1-based.
fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Some(Command::Search(line.to_string()));
    };
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();
    let index = || arg.parse::<usize>().ok().filter(|n| *n > 0).map(|n| n - 1);

    Some(match (name, arg) {
        ("suggest", _) => Command::Focus,
        ("pick", _) => match index() {
            Some(i) => Command::Pick(i),
            None => Command::Unknown(line.to_string()),
        },
        ("summary", _) => Command::Summary,
        ("save", _) => match index() {
            Some(i) => Command::Save(i),
            None => Command::Unknown(line.to_string()),
        },
        ("signin", email) if email.contains('@') => Command::SignIn(email.to_string()),
        ("signout", _) => Command::SignOut,
        ("library", _) => Command::Library,
        ("library-summary", _) => Command::LibrarySummary,
        ("dismiss", _) => Command::Dismiss,
        ("help", _) => Command::Help,
        ("quit", _) | ("q", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    })
}

async fn build_store(config: &ClientConfig) -> Result<Arc<dyn LibraryStore>> {
    match &config.store {
        StoreConfig::Rest { url, anon_key } => {
            info!("Using hosted library store at {}", url);
            let remote = RemoteClient::http(config.remote.clone())?;
            Ok(Arc::new(RestStore::new(url, anon_key, remote)?))
        }
        StoreConfig::Sqlite { path } => {
            info!("Using local library database {}", path);
            let db = Database::new(path)
                .await
                .with_context(|| format!("Failed to open database {}", path))?;
            Ok(Arc::new(db))
        }
    }
}

/// Stores `next` and reports whether it differs from what was shown.
fn replace_if_changed(shown: &mut Vec<ArticleId>, next: Vec<ArticleId>) -> bool {
    if *shown == next {
        return false;
    }
    *shown = next;
    true
}

fn print_help() {
    println!("{}", "Type a query to search. Commands:".bold());
    for (cmd, text) in [
        (":suggest", "show example queries"),
        (":pick N", "search suggestion N"),
        (":summary", "summarize the results, or hide the summary"),
        (":save N", "save or unsave result N"),
        (":signin EMAIL", "sign in"),
        (":signout", "sign out"),
        (":library", "list saved articles"),
        (":library-summary", "summarize saved articles"),
        (":dismiss", "dismiss the sign-in prompt"),
        (":quit", "exit"),
    ] {
        println!("  {:<18} {}", cmd.cyan(), text);
    }
}

fn prompt() {
    print!("{} ", ">".bright_blue().bold());
    let _ = std::io::stdout().flush();
}

fn print_summary(summary: &Summary) {
    let heading = if summary.fallback {
        "Summary unavailable".yellow().bold()
    } else {
        format!("Summary of {} articles", summary.article_count).green().bold()
    };
    println!("\n{}", heading);
    if !summary.themes.is_empty() {
        println!("{} {}", "Themes:".dimmed(), summary.themes.join(", "));
    }
    println!("{}\n", summary.summary_text);
}

fn render(session: &SearchSession, bookmarks: &BookmarkStore) {
    if let SessionState::AuthRequired { reason, .. } = session.state() {
        println!(
            "{} {}. Use {} or {}.",
            "Sign-in needed:".yellow().bold(),
            reason,
            ":signin EMAIL".cyan(),
            ":dismiss".cyan()
        );
        return;
    }

    match session.state() {
        SessionState::Idle => {}
        SessionState::Suggesting => {
            println!("{}", "Try one of these:".bold());
            for (i, suggestion) in session.visible_suggestions().unwrap_or_default().iter().enumerate() {
                println!("  {} {}", format!("{}.", i + 1).cyan(), suggestion);
            }
        }
        SessionState::Searching => {
            if let Some(query) = session.active_query() {
                println!("{} {}", "Searching for".dimmed(), query.as_str().bold());
            }
        }
        SessionState::ResultsShown | SessionState::SummaryLoading | SessionState::SummaryShown => {
            if session.no_results() {
                println!(
                    "{}",
                    "No results found. If the search service was asleep it may still be starting up; try again shortly."
                        .yellow()
                );
            } else {
                let saved = bookmarks.snapshot();
                let mut table = Table::new();
                table.add_row(PrettyRow::new(vec![
                    Cell::new("#"),
                    Cell::new("Saved"),
                    Cell::new("Title"),
                    Cell::new("Company"),
                    Cell::new("Published"),
                    Cell::new("Match"),
                ]));
                for (i, result) in session.results().iter().enumerate() {
                    table.add_row(PrettyRow::new(vec![
                        Cell::new(&(i + 1).to_string()),
                        Cell::new(if saved.contains(&result.id) { "*" } else { "" }),
                        Cell::new(&result.title),
                        Cell::new(&result.company),
                        Cell::new(&format_published_date(&result.published_date)),
                        Cell::new(&format_similarity(result.similarity)),
                    ]));
                }
                table.printstd();
            }
            match session.state() {
                SessionState::SummaryLoading => println!("{}", "Summarizing results...".dimmed()),
                SessionState::SummaryShown => {
                    if let Some(summary) = session.summary() {
                        print_summary(summary);
                    }
                }
                _ => {}
            }
        }
        SessionState::AuthRequired { .. } => {}
    }
}

fn render_library(articles: &[Article]) {
    if articles.is_empty() {
        println!("{}", "Your library is empty. Save results with :save N.".dimmed());
        return;
    }
    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("Title"),
        Cell::new("Company"),
        Cell::new("Published"),
        Cell::new("Excerpt"),
    ]));
    for article in articles {
        table.add_row(PrettyRow::new(vec![
            Cell::new(&article.title),
            Cell::new(&article.company),
            Cell::new(&format_published_date(&article.published_date)),
            Cell::new(&excerpt(&article.content)),
        ]));
    }
    table.printstd();
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    cli.apply(&mut config);

    let remote = RemoteClient::http(config.remote.clone())?;
    let api: Arc<dyn SearchBackend> = Arc::new(ApiClient::new(&config.api_url, remote)?);
    let store = build_store(&config).await?;

    let identity = IdentityProvider::new(match &cli.email {
        Some(email) => Identity::signed_in(email),
        None => Identity::anonymous(),
    });
    let bookmarks = BookmarkStore::new(store.clone(), identity.gate(config.gate));
    let identity_sync = bookmarks.spawn_identity_sync();
    if let Some(email) = &cli.email {
        if let Err(err) = provision_user(store.as_ref(), email).await {
            warn!(target: TARGET_SESSION, "Failed to provision user {}: {}", email, err);
        }
    }

    let mut session = SearchSession::new(api.clone(), identity.gate(config.gate))
        .with_history(store.clone())
        .with_suggestions(SuggestionProvider::new(config.suggestions.clone()));
    let mut library = LibraryView::new(store.clone(), api.clone(), identity.gate(config.gate));

    let shutdown = CancellationToken::new();
    if !cli.no_warmup {
        let api = api.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            match api.ping(&cancel).await {
                Ok(()) => info!(target: TARGET_SESSION, "Search service is awake"),
                Err(err) => warn!(target: TARGET_SESSION, "Warm-up request failed: {}", err),
            }
        });
    }

    println!(
        "{} {}",
        "erblogx".bold(),
        format!("searching {}", config.api_url).dimmed()
    );
    print_help();
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut saved_changes = bookmarks.subscribe();
    let mut shown_saved = bookmarks.snapshot().ids();
    loop {
        tokio::select! {
            handled = session.next_completion() => {
                if handled.applied() {
                    println!();
                    render(&session, &bookmarks);
                    if session.state().underlying() == &SessionState::ResultsShown {
                        let seen: Vec<Article> = session.results().iter().map(Article::from).collect();
                        if let Err(err) = store.remember_articles(&seen).await {
                            warn!(target: TARGET_SESSION, "Failed to keep local copies of results: {}", err);
                        }
                    }
                    prompt();
                }
            }
            changed = saved_changes.changed() => {
                if changed.is_err() {
                    break;
                }
                // Redraw when a write is rolled back or the set is reloaded
                let ids = saved_changes.borrow_and_update().ids();
                if replace_if_changed(&mut shown_saved, ids) && !session.results().is_empty() {
                    println!();
                    render(&session, &bookmarks);
                    prompt();
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(command) = parse_command(&line) else {
                    let _ = session.focus_input("");
                    render(&session, &bookmarks);
                    prompt();
                    continue;
                };
                match command {
                    Command::Quit => break,
                    Command::Help => print_help(),
                    Command::Search(text) => {
                        let _ = session.submit(&text);
                        render(&session, &bookmarks);
                    }
                    Command::Focus => {
                        let _ = session.focus_input("");
                        render(&session, &bookmarks);
                    }
                    Command::Pick(i) => {
                        if !session.choose_suggestion(i).applied() {
                            println!("{}", "No such suggestion. Use :suggest first.".yellow());
                        }
                        render(&session, &bookmarks);
                    }
                    Command::Summary => {
                        if session.toggle_summary().applied() {
                            render(&session, &bookmarks);
                        } else {
                            println!("{}", "Nothing to summarize yet.".yellow());
                        }
                    }
                    Command::Save(i) => match session.results().get(i).map(|r| (r.id.clone(), r.title.clone())) {
                        Some((id, title)) => match session.toggle_bookmark(&bookmarks, &id) {
                            Ok(saved) => {
                                shown_saved = saved.ids();
                                let verb = if saved.contains(&id) { "Saved" } else { "Removed" };
                                println!("{} {}", verb.green(), title);
                            }
                            Err(StoreError::Denied(_)) => render(&session, &bookmarks),
                            Err(err) => println!("{} {}", "Not saved:".yellow(), err),
                        },
                        None => println!("{}", "No such result.".yellow()),
                    },
                    Command::SignIn(email) => {
                        identity.sign_in(&email);
                        if let Err(err) = provision_user(store.as_ref(), &email).await {
                            warn!(target: TARGET_SESSION, "Failed to provision user {}: {}", email, err);
                        }
                        println!("{} {}", "Signed in as".green(), email);
                    }
                    Command::SignOut => {
                        identity.sign_out();
                        println!("{}", "Signed out".green());
                    }
                    Command::Library => match library.load().await {
                        Ok(articles) => render_library(articles),
                        Err(StoreError::Denied(reason)) => {
                            println!("{} {}", "Sign-in needed:".yellow().bold(), reason);
                        }
                        Err(err) => println!("{} {}", "Could not load library:".yellow(), err),
                    },
                    Command::LibrarySummary => match library.toggle_summary().await {
                        Ok(Some(summary)) => print_summary(summary),
                        Ok(None) => println!("{}", "No library summary shown.".dimmed()),
                        Err(reason) => println!("{} {}", "Sign-in needed:".yellow().bold(), reason),
                    },
                    Command::Dismiss => {
                        let _ = session.dismiss_auth();
                        render(&session, &bookmarks);
                    }
                    Command::Unknown(text) => {
                        println!("{} {}. Type :help for commands.", "Unknown command".yellow(), text);
                    }
                }
                prompt();
            }
        }
    }

    shutdown.cancel();
    identity_sync.abort();
    bookmarks.flush().await;
    Ok(())
}
