use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use env_logger::Env;
use game_controller::config::Config;
use game_controller::controller::{GameController, Phase, Turn};
use game_controller::input::{Command, map_line};
use game_controller::session::Session;
use game_controller::store::{LeaderboardEntry, ProfileUpdate, ScoreStore};
use game_controller::submitter::ScoreSubmitter;
use log::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Play 2048 in the terminal")]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seed for tile spawning (overrides config)
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Sign in under this user id; requires --username
    #[arg(long, value_name = "ID", requires = "username")]
    user_id: Option<String>,

    /// Display name for the signed-in user
    #[arg(long, value_name = "NAME", requires = "user_id")]
    username: Option<String>,

    /// JSON file for the local best-score history
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// SQLite database that final scores are submitted to
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Log filter, e.g. "info", "debug"
    #[arg(long, default_value = "warn")]
    log: String,
}

const HELP: &str = "moves: arrows, w/a/s/d, h/j/k/l, up/down/left/right (runs like `aaw` work)\n\
                    other: c continue, x stop, r restart, b leaderboard, hist history, json snapshot, q quit";

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log.as_str())).init();

    let mut cfg = match &cli.config {
        Some(path) => Config::from_toml(path)
            .map_err(|err| anyhow!("failed to load {}: {err}", path.display()))?,
        None => Config::default(),
    };
    if cli.seed.is_some() {
        cfg.seed = cli.seed;
    }
    if cli.history.is_some() {
        cfg.history.path = cli.history.clone();
    }
    if cli.db.is_some() {
        cfg.store.db_path = cli.db.clone();
    }
    let session = match (&cli.user_id, &cli.username) {
        (Some(id), Some(name)) => Some(Session::signed_in(id.as_str(), name.as_str())),
        _ => None,
    };

    let mut controller = GameController::from_config(&cfg, session);

    // The writer owns one connection; the leaderboard view reads through another.
    let (worker, reader) = match &cfg.store.db_path {
        Some(path) => {
            let store = ScoreStore::open(path)?;
            if let Some(identity) = controller.session().scoring_identity() {
                store.upsert_user(&ProfileUpdate {
                    id: identity.user_id.clone(),
                    username: Some(identity.username.clone()),
                    ..Default::default()
                })?;
            }
            let (submitter, handle) = ScoreSubmitter::new();
            controller = controller.with_sink(Box::new(handle));
            (Some(submitter.spawn(store)), Some(ScoreStore::open(path)?))
        }
        None => (None, None),
    };
    info!(
        "playing as {} to {}",
        controller.session().display_name(),
        controller.winning_tile()
    );

    println!("{HELP}\n");
    render(&controller)?;

    let stdin = io::stdin();
    'game: for line in stdin.lock().lines() {
        let line = line?;
        let (commands, unknown) = map_line(&line);
        for token in unknown {
            println!("unknown input: {token:?}");
        }
        for command in commands {
            match command {
                Command::Quit => break 'game,
                Command::Leaderboard => show_leaderboard(reader.as_ref()),
                Command::History => show_history(&controller),
                Command::Snapshot => println!("{}", serde_json::to_string(controller.state())?),
                command => {
                    if let Some(Turn::Ignored) = controller.handle(command) {
                        println!("{}", phase_prompt(controller.state().phase));
                    }
                }
            }
        }
        render(&controller)?;
    }

    // Dropping the controller closes the submission channel so the writer
    // can drain and exit.
    drop(controller);
    if let Some(worker) = worker {
        info!("submitted {} score(s)", worker.shutdown());
    }
    Ok(())
}

fn render(controller: &GameController) -> Result<()> {
    render_to(&mut io::stdout().lock(), controller)
}

fn render_to<W: Write>(out: &mut W, controller: &GameController) -> Result<()> {
    let state = controller.state();
    let best = controller.history().best().unwrap_or(0).max(state.score);
    writeln!(out, "{}", state.grid)?;
    writeln!(out, "score {}  best {}  moves {}", state.score, best, state.moves)?;
    writeln!(out, "{}", phase_prompt(state.phase))?;
    out.flush()?;
    Ok(())
}

fn phase_prompt(phase: Phase) -> &'static str {
    match phase {
        Phase::Playing | Phase::WonKeepPlaying => "your move",
        Phase::WonPendingDecision => "you win! c to keep playing, x to stop",
        Phase::GameOver { won: true } => "game over, you won. r for a new game",
        Phase::GameOver { won: false } => "game over. r for a new game",
    }
}

fn show_history(controller: &GameController) {
    let entries = controller.history().entries();
    if entries.is_empty() {
        println!("no finished games yet");
        return;
    }
    for (rank, entry) in entries.iter().enumerate() {
        println!("{:>2}. {}", rank + 1, entry.value);
    }
}

fn show_leaderboard(store: Option<&ScoreStore>) {
    let Some(store) = store else {
        println!("no score database configured (use --db)");
        return;
    };
    match (store.daily_scores_today(), store.all_time_scores(10)) {
        (Ok(daily), Ok(all_time)) => {
            print_board("today", &daily);
            print_board("all time", &all_time);
        }
        (Err(err), _) | (_, Err(err)) => warn!("failed to read leaderboard: {err:#}"),
    }
}

fn print_board(title: &str, entries: &[LeaderboardEntry]) {
    println!("== {title} ==");
    if entries.is_empty() {
        println!("(empty)");
    }
    for (rank, entry) in entries.iter().take(10).enumerate() {
        let name = entry.username.as_deref().unwrap_or(&entry.user_id);
        println!("{:>2}. {:<16} {:>8}", rank + 1, name, entry.score);
    }
}
