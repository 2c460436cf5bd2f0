//! Application entry point: a line-oriented console front end.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Build the Gemini assistant from config (needs an API key).
//! 4. Build the playback controller over the shared cpal output.
//! 5. Spawn the session printer, which echoes new log lines and results.
//! 6. Read commands from stdin until `quit` or end of input.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use voice_search::{
    assistant::{GeminiAssistant, SearchResponse},
    audio::PlaybackController,
    config::AppConfig,
    pipeline::{FlowOutcome, LogEntry, SearchFlowOrchestrator, SessionState},
};

const HELP: &str = "\
commands:
  search <query>   search and speak the summary
  tweak <query>    sharpen the query first, then search
  lucky            search for a random topic
  more             dig deeper into the current result
  replay           speak the current result again
  stop             stop playback
  back             clear the current result
  history          list recent searches
  open <n>         show history entry n
  quit";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Command {
    Search(String),
    Tweak(String),
    Lucky,
    More,
    Replay,
    Stop,
    Back,
    History,
    Open(usize),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match (word.to_ascii_lowercase().as_str(), rest) {
        ("search" | "s", q) if !q.is_empty() => Command::Search(q.to_string()),
        ("tweak" | "t", q) if !q.is_empty() => Command::Tweak(q.to_string()),
        ("lucky", "") => Command::Lucky,
        ("more", "") => Command::More,
        ("replay", "") => Command::Replay,
        ("stop", "") => Command::Stop,
        ("back", "") => Command::Back,
        ("history", "") => Command::History,
        ("open", n) => Command::Open(n.parse().ok().filter(|&n: &usize| n > 0)?),
        ("help" | "?", "") => Command::Help,
        ("quit" | "exit", "") => Command::Quit,
        _ => return None,
    };
    Some(command)
}

// ---------------------------------------------------------------------------
// Session printer
// ---------------------------------------------------------------------------

/// How much of the session log has been printed so far.
#[derive(Debug, Default)]
struct LogCursor {
    epoch: u64,
    printed: usize,
}

impl LogCursor {
    /// Log lines not yet printed.  A log cleared since the last call is
    /// printed from the top, even if it has already grown past the old length.
    fn fresh<'a>(&mut self, st: &'a SessionState) -> &'a [LogEntry] {
        if st.log_epoch != self.epoch {
            self.epoch = st.log_epoch;
            self.printed = 0;
        }
        let start = self.printed.min(st.log.len());
        self.printed = st.log.len();
        &st.log[start..]
    }
}

/// Print log lines and results as they appear in the session.
async fn print_session(flows: Arc<SearchFlowOrchestrator>) {
    let mut cursor = LogCursor::default();
    let mut shown: Option<SearchResponse> = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        ticker.tick().await;
        let st = flows.snapshot();

        for entry in cursor.fresh(&st) {
            println!("  {entry}");
        }

        if st.active_result != shown {
            if let Some(result) = &st.active_result {
                print_result(result);
            }
            shown = st.active_result.clone();
        }
    }
}

fn print_result(result: &SearchResponse) {
    println!("\n{}\n", result.summary);
    for (i, source) in result.sources.iter().enumerate() {
        println!("  [{}] {} <{}>", i + 1, source.title, source.uri);
    }
    println!();
}

fn spawn_flow<F, Fut>(flows: &Arc<SearchFlowOrchestrator>, run: F)
where
    F: FnOnce(Arc<SearchFlowOrchestrator>) -> Fut,
    Fut: std::future::Future<Output = FlowOutcome> + Send + 'static,
{
    let task = run(Arc::clone(flows));
    tokio::spawn(async move {
        match task.await {
            FlowOutcome::Rejected => println!("(busy, or nothing to act on)"),
            outcome => log::debug!("flow ended: {outcome:?}"),
        }
    });
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-search starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Assistant
    let assistant = GeminiAssistant::from_config(&config.assistant)
        .context("cannot reach the assistant backend")?;

    // 4. Playback (device is opened on first play)
    let playback = Arc::new(PlaybackController::with_default_output());

    let flows = Arc::new(SearchFlowOrchestrator::new(
        Arc::new(assistant),
        playback,
        &config,
    ));

    // 5. Printer
    let printer = tokio::spawn(print_session(Arc::clone(&flows)));

    // 6. Input loop
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = parse_command(&line) else {
            println!("unknown command; type `help`");
            continue;
        };

        match command {
            Command::Search(q) => spawn_flow(&flows, |f| async move { f.search(&q).await }),
            Command::Tweak(q) => spawn_flow(&flows, |f| async move { f.workshop(&q).await }),
            Command::Lucky => spawn_flow(&flows, |f| async move { f.feeling_lucky().await }),
            Command::More => spawn_flow(&flows, |f| async move { f.find_more().await }),
            Command::Replay => spawn_flow(&flows, |f| async move { f.replay().await }),
            Command::Stop => {
                if !flows.stop() {
                    println!("(nothing is playing)");
                }
            }
            Command::Back => flows.go_back(),
            Command::History => {
                let history = flows.history();
                if history.is_empty() {
                    println!("(no searches yet)");
                }
                for (i, entry) in history.iter().enumerate() {
                    println!("  {:>2}. {}", i + 1, entry.query);
                }
            }
            Command::Open(n) => {
                let entry = flows.history().into_iter().nth(n - 1);
                match entry {
                    Some(entry) if flows.select_history(entry.id) => {}
                    Some(_) => println!("(busy; stop or go back first)"),
                    None => println!("(no history entry {n})"),
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    flows.go_back();
    printer.abort();
    log::info!("voice-search shutting down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_queries_with_spaces() {
        assert_eq!(
            parse_command("search  history of tea "),
            Some(Command::Search("history of tea".into()))
        );
        assert_eq!(
            parse_command("tweak paris cafes"),
            Some(Command::Tweak("paris cafes".into()))
        );
    }

    #[test]
    fn bare_words() {
        assert_eq!(parse_command("lucky"), Some(Command::Lucky));
        assert_eq!(parse_command("STOP"), Some(Command::Stop));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
    }

    #[test]
    fn open_needs_positive_index() {
        assert_eq!(parse_command("open 3"), Some(Command::Open(3)));
        assert_eq!(parse_command("open 0"), None);
        assert_eq!(parse_command("open x"), None);
    }

    #[test]
    fn log_cursor_prints_only_new_lines() {
        let mut st = SessionState::default();
        let mut cursor = LogCursor::default();
        st.push_log("one");
        assert_eq!(cursor.fresh(&st).len(), 1);

        st.push_log("two");
        let fresh = cursor.fresh(&st);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "two");
        assert!(cursor.fresh(&st).is_empty());
    }

    #[test]
    fn log_cursor_restarts_after_a_longer_new_log() {
        let mut st = SessionState::default();
        let mut cursor = LogCursor::default();
        st.push_log("old");
        cursor.fresh(&st);

        // A new flow cleared the log and wrote more lines than before.
        st.begin_flow();
        st.push_log("new one");
        st.push_log("new two");
        let messages: Vec<_> = cursor.fresh(&st).iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["new one", "new two"]);
    }

    #[test]
    fn search_without_query_is_unknown() {
        assert_eq!(parse_command("search"), None);
        assert_eq!(parse_command("lucky now"), None);
    }
}
