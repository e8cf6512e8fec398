use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use twenty48_core::engine::{self as GameEngine, Direction, Grid, MoveOutcome, Score, Tile};

use crate::config::Config;
use crate::history::ScoreHistory;
use crate::input::Command;
use crate::session::Session;
use crate::submitter::ScoreSink;

/// Where a game stands between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Playing,
    /// The winning tile appeared; moves wait for keep-playing or stop.
    WonPendingDecision,
    /// Past the win; further wins do not prompt again.
    WonKeepPlaying,
    GameOver { won: bool },
}

impl Phase {
    pub fn accepts_moves(self) -> bool {
        matches!(self, Phase::Playing | Phase::WonKeepPlaying)
    }

    pub fn is_game_over(self) -> bool {
        matches!(self, Phase::GameOver { .. })
    }

    pub fn has_won(self) -> bool {
        match self {
            Phase::Playing => false,
            Phase::WonPendingDecision | Phase::WonKeepPlaying => true,
            Phase::GameOver { won } => won,
        }
    }
}

/// What a game command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    /// The current phase does not take this command.
    Ignored,
    /// Nothing slid or merged and no tile was spawned, or a non-move
    /// command was applied.
    Unchanged,
    /// Tiles moved and a new tile was spawned.
    Moved(MoveOutcome),
}

/// Snapshot of one game: grid, running score and phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub grid: Grid,
    pub score: Score,
    /// Accepted (grid-changing) moves so far.
    pub moves: u64,
    pub phase: Phase,
}

impl GameState {
    /// Fresh game with two random seed tiles.
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_grid(GameEngine::initialize(rng))
    }

    /// Start playing from an arbitrary grid.
    pub fn from_grid(grid: Grid) -> Self {
        Self {
            grid,
            score: 0,
            moves: 0,
            phase: Phase::Playing,
        }
    }

    pub fn won(&self) -> bool {
        self.phase.has_won()
    }

    pub fn game_over(&self) -> bool {
        self.phase.is_game_over()
    }

    pub fn keep_playing(&self) -> bool {
        self.phase == Phase::WonKeepPlaying
    }

    pub fn highest_tile(&self) -> Tile {
        self.grid.highest_tile()
    }

    /// Slide toward `direction`, spawn a tile if anything moved, then settle
    /// the phase. A win on this turn takes precedence over a locked board.
    pub fn apply_turn<R: Rng + ?Sized>(
        &mut self,
        direction: Direction,
        goal: Tile,
        rng: &mut R,
    ) -> Turn {
        if !self.phase.accepts_moves() {
            return Turn::Ignored;
        }
        let outcome = GameEngine::apply_move_with_goal(self.grid, direction, goal);
        if !outcome.changed {
            return Turn::Unchanged;
        }
        self.grid = GameEngine::place_random_tile(outcome.grid, rng);
        self.score += outcome.score_delta;
        self.moves += 1;
        self.phase = match self.phase {
            Phase::Playing if outcome.reached_winning_value => Phase::WonPendingDecision,
            Phase::Playing if !self.grid.has_legal_move() => Phase::GameOver { won: false },
            Phase::WonKeepPlaying if !self.grid.has_legal_move() => Phase::GameOver { won: true },
            phase => phase,
        };
        Turn::Moved(outcome)
    }

    /// Accept the offer to continue after a win. A board that is already
    /// locked ends the game instead. Returns whether the phase changed.
    pub fn continue_after_win(&mut self) -> bool {
        if self.phase != Phase::WonPendingDecision {
            return false;
        }
        self.phase = if self.grid.has_legal_move() {
            Phase::WonKeepPlaying
        } else {
            Phase::GameOver { won: true }
        };
        true
    }

    /// Decline to continue after a win; the game ends as won.
    pub fn stop_after_win(&mut self) -> bool {
        if self.phase != Phase::WonPendingDecision {
            return false;
        }
        self.phase = Phase::GameOver { won: true };
        true
    }
}

/// Owns the live game for a session and applies commands one at a time.
///
/// On every transition into `GameOver` the final score goes to the local
/// history and, for signed-in sessions, to the score sink. Neither can fail
/// or delay the game.
pub struct GameController<R: Rng = StdRng> {
    state: GameState,
    rng: R,
    winning_tile: Tile,
    session: Session,
    history: ScoreHistory,
    sink: Option<Box<dyn ScoreSink>>,
}

impl GameController<StdRng> {
    /// Build from configuration: seed, winning tile, history and session.
    /// `session` overrides the configured one when given.
    pub fn from_config(cfg: &Config, session: Option<Session>) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let session = session.unwrap_or_else(|| cfg.session.session());
        GameController::new(rng, session, cfg.load_history())
            .with_winning_tile(cfg.winning_tile_or_default())
    }
}

impl<R: Rng> GameController<R> {
    pub fn new(mut rng: R, session: Session, history: ScoreHistory) -> Self {
        let state = GameState::new(&mut rng);
        Self {
            state,
            rng,
            winning_tile: GameEngine::WINNING_TILE,
            session,
            history,
            sink: None,
        }
    }

    pub fn with_winning_tile(mut self, winning_tile: Tile) -> Self {
        self.winning_tile = winning_tile;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ScoreSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the live game, e.g. when resuming a saved snapshot.
    pub fn with_state(mut self, state: GameState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn history(&self) -> &ScoreHistory {
        &self.history
    }

    pub fn winning_tile(&self) -> Tile {
        self.winning_tile
    }

    /// Apply one move command to completion.
    pub fn play(&mut self, direction: Direction) -> Turn {
        let before = self.state.phase;
        let turn = self
            .state
            .apply_turn(direction, self.winning_tile, &mut self.rng);
        match &turn {
            Turn::Moved(outcome) => debug!(
                "move {direction}: +{} ({} merges), score {}",
                outcome.score_delta,
                outcome.merges.len(),
                self.state.score
            ),
            Turn::Unchanged => debug!("move {direction}: nothing moved"),
            Turn::Ignored => debug!("move {direction} ignored in {before:?}"),
        }
        if before != self.state.phase && self.state.phase == Phase::WonPendingDecision {
            info!("reached {} with score {}", self.winning_tile, self.state.score);
        }
        self.settle(before);
        turn
    }

    pub fn keep_playing(&mut self) -> bool {
        let before = self.state.phase;
        let changed = self.state.continue_after_win();
        self.settle(before);
        changed
    }

    pub fn stop(&mut self) -> bool {
        let before = self.state.phase;
        let changed = self.state.stop_after_win();
        self.settle(before);
        changed
    }

    /// Deal a fresh game. A game waiting on the win prompt ends as won
    /// first, so it is recorded like `stop`; any other unfinished game is
    /// dropped unrecorded.
    pub fn restart(&mut self) {
        if self.state.phase == Phase::WonPendingDecision {
            self.stop();
        }
        self.state = GameState::new(&mut self.rng);
        debug!("new game for {}", self.session.display_name());
    }

    /// Dispatch a game command; front-end commands (quit, leaderboard, ...)
    /// are not the controller's and yield `None`.
    pub fn handle(&mut self, command: Command) -> Option<Turn> {
        let accepted = match command {
            Command::Move(direction) => return Some(self.play(direction)),
            Command::KeepPlaying => self.keep_playing(),
            Command::Stop => self.stop(),
            Command::Restart => {
                self.restart();
                true
            }
            Command::Quit | Command::Leaderboard | Command::History | Command::Snapshot => {
                return None;
            }
        };
        Some(if accepted { Turn::Unchanged } else { Turn::Ignored })
    }

    fn settle(&mut self, before: Phase) {
        if !before.is_game_over() && self.state.phase.is_game_over() {
            self.finish();
        }
    }

    fn finish(&mut self) {
        let score = self.state.score;
        info!(
            "game over for {}: score {} highest tile {} after {} moves",
            self.session.display_name(),
            score,
            self.state.highest_tile(),
            self.state.moves
        );
        if let Err(err) = self.history.record(score) {
            warn!("failed to persist score history: {err:#}");
        }
        if score == 0 {
            return;
        }
        if let (Some(identity), Some(sink)) = (self.session.scoring_identity(), &self.sink) {
            sink.submit(identity, score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Identity;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingSink(Rc<RefCell<Vec<(String, Score)>>>);

    impl ScoreSink for RecordingSink {
        fn submit(&self, identity: &Identity, score: Score) {
            self.0.borrow_mut().push((identity.user_id.clone(), score));
        }
    }

    fn controller(session: Session) -> (GameController<StdRng>, RecordingSink) {
        let sink = RecordingSink::default();
        let ctl = GameController::new(
            StdRng::seed_from_u64(11),
            session,
            ScoreHistory::in_memory(10),
        )
        .with_sink(Box::new(sink.clone()));
        (ctl, sink)
    }

    fn state(rows: [[Tile; 4]; 4], score: Score, phase: Phase) -> GameState {
        GameState {
            grid: Grid::from_rows(rows),
            score,
            moves: 0,
            phase,
        }
    }

    // Sliding left merges the 2s; whatever spawns in the gap, nothing is
    // left to merge.
    const ALMOST_LOCKED: [[Tile; 4]; 4] = [
        [2, 2, 8, 16],
        [8, 16, 32, 64],
        [16, 32, 64, 128],
        [32, 64, 128, 256],
    ];

    #[test]
    fn new_game_has_two_tiles() {
        let (ctl, _) = controller(Session::Guest);
        let st = ctl.state();
        assert_eq!(st.grid.count_empty(), 14);
        assert_eq!(st.score, 0);
        assert_eq!(st.phase, Phase::Playing);
        assert!(!st.won() && !st.game_over() && !st.keep_playing());
    }

    #[test]
    fn unchanged_move_spawns_nothing() {
        let (ctl, _) = controller(Session::Guest);
        let start = state([[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]], 0, Phase::Playing);
        let mut ctl = ctl.with_state(start.clone());
        assert_eq!(ctl.play(Direction::Left), Turn::Unchanged);
        assert_eq!(ctl.state(), &start);
    }

    #[test]
    fn accepted_move_scores_and_spawns() {
        let (ctl, _) = controller(Session::Guest);
        let mut ctl = ctl.with_state(state([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]], 0, Phase::Playing));
        let Turn::Moved(outcome) = ctl.play(Direction::Left) else {
            panic!("expected a move");
        };
        assert_eq!(outcome.grid.rows()[0], [4, 0, 0, 0]);
        let st = ctl.state();
        assert_eq!(st.score, 4);
        assert_eq!(st.moves, 1);
        assert_eq!(st.grid.count_empty(), 14);
        assert!(matches!(st.grid.tile_sum(), 6 | 8));
        assert_eq!(st.phase, Phase::Playing);
    }

    #[test]
    fn locking_move_ends_game_and_submits_once() {
        let (ctl, sink) = controller(Session::signed_in("u-1", "alice"));
        let mut ctl = ctl.with_state(state(ALMOST_LOCKED, 100, Phase::Playing));
        assert!(matches!(ctl.play(Direction::Left), Turn::Moved(_)));
        let st = ctl.state();
        assert_eq!(st.phase, Phase::GameOver { won: false });
        assert_eq!(st.score, 104);
        assert_eq!(sink.0.borrow().as_slice(), &[("u-1".to_string(), 104)]);
        assert_eq!(ctl.history().best(), Some(104));

        // Terminal: moves are ignored and nothing is resubmitted.
        assert_eq!(ctl.play(Direction::Up), Turn::Ignored);
        assert!(!ctl.keep_playing());
        assert_eq!(sink.0.borrow().len(), 1);
    }

    #[test]
    fn guests_keep_local_history_only() {
        let (ctl, sink) = controller(Session::Guest);
        let mut ctl = ctl.with_state(state(ALMOST_LOCKED, 0, Phase::Playing));
        ctl.play(Direction::Left);
        assert!(ctl.state().game_over());
        assert!(sink.0.borrow().is_empty());
        assert_eq!(ctl.history().best(), Some(4));
    }

    #[test]
    fn win_prompts_and_blocks_moves() {
        let (ctl, _) = controller(Session::Guest);
        let mut ctl = ctl.with_state(state([[1024, 1024, 0, 0], [0; 4], [0; 4], [0; 4]], 0, Phase::Playing));
        let Turn::Moved(outcome) = ctl.play(Direction::Left) else {
            panic!("expected a move");
        };
        assert!(outcome.reached_winning_value);
        assert_eq!(ctl.state().phase, Phase::WonPendingDecision);
        assert_eq!(ctl.state().score, 2048);
        assert!(ctl.state().won());

        let frozen = ctl.state().clone();
        assert_eq!(ctl.play(Direction::Right), Turn::Ignored);
        assert_eq!(ctl.state(), &frozen);

        assert!(ctl.keep_playing());
        assert_eq!(ctl.state().phase, Phase::WonKeepPlaying);
        assert!(ctl.state().keep_playing());
    }

    #[test]
    fn later_wins_do_not_prompt_again() {
        let (ctl, _) = controller(Session::Guest);
        let mut ctl = ctl.with_state(state(
            [[1024, 1024, 0, 0], [2048, 0, 0, 0], [0; 4], [0; 4]],
            5000,
            Phase::WonKeepPlaying,
        ));
        let Turn::Moved(outcome) = ctl.play(Direction::Left) else {
            panic!("expected a move");
        };
        assert!(outcome.reached_winning_value);
        assert_eq!(ctl.state().phase, Phase::WonKeepPlaying);
    }

    #[test]
    fn win_on_a_locked_board_still_prompts() {
        let (ctl, sink) = controller(Session::signed_in("u-1", "alice"));
        // Left merges the 1024s; the spawn fills the only gap and nothing
        // else can move.
        let mut ctl = ctl.with_state(state(
            [
                [1024, 1024, 4, 8],
                [8, 16, 32, 64],
                [16, 32, 64, 128],
                [32, 64, 128, 256],
            ],
            0,
            Phase::Playing,
        ));
        ctl.play(Direction::Left);
        let st = ctl.state();
        assert!(!st.grid.has_legal_move());
        assert_eq!(st.phase, Phase::WonPendingDecision);
        assert!(sink.0.borrow().is_empty());

        // Continuing on a locked board ends the game as won.
        assert!(ctl.keep_playing());
        assert_eq!(ctl.state().phase, Phase::GameOver { won: true });
        assert_eq!(sink.0.borrow().as_slice(), &[("u-1".to_string(), 2048)]);
    }

    #[test]
    fn stopping_after_a_win_ends_the_game() {
        let (ctl, sink) = controller(Session::signed_in("u-2", "bob"));
        let mut ctl = ctl.with_state(state([[2048, 0, 0, 0], [0; 4], [0; 4], [0; 4]], 3000, Phase::WonPendingDecision));
        assert!(ctl.stop());
        assert_eq!(ctl.state().phase, Phase::GameOver { won: true });
        assert!(ctl.state().won());
        assert_eq!(sink.0.borrow().as_slice(), &[("u-2".to_string(), 3000)]);
        assert!(!ctl.stop());
    }

    #[test]
    fn keep_playing_loses_to_a_full_board_later() {
        let (ctl, sink) = controller(Session::signed_in("u-3", "carol"));
        let mut ctl = ctl.with_state(state(ALMOST_LOCKED, 9000, Phase::WonKeepPlaying));
        ctl.play(Direction::Left);
        assert_eq!(ctl.state().phase, Phase::GameOver { won: true });
        assert_eq!(sink.0.borrow().len(), 1);
    }

    #[test]
    fn restart_deals_a_fresh_game_without_recording() {
        let (ctl, sink) = controller(Session::signed_in("u-1", "alice"));
        let mut ctl = ctl.with_state(state(ALMOST_LOCKED, 100, Phase::Playing));
        ctl.restart();
        let st = ctl.state();
        assert_eq!(st.phase, Phase::Playing);
        assert_eq!(st.score, 0);
        assert_eq!(st.grid.count_empty(), 14);
        assert!(sink.0.borrow().is_empty());
        assert!(ctl.history().entries().is_empty());
    }

    #[test]
    fn restart_from_win_prompt_records_the_won_game() {
        let (ctl, sink) = controller(Session::signed_in("u-1", "alice"));
        let mut ctl = ctl.with_state(state(
            [[2048, 0, 0, 0], [0; 4], [0; 4], [0; 4]],
            3000,
            Phase::WonPendingDecision,
        ));
        assert_eq!(ctl.handle(Command::Restart), Some(Turn::Unchanged));
        assert_eq!(sink.0.borrow().as_slice(), &[("u-1".to_string(), 3000)]);
        assert_eq!(ctl.history().best(), Some(3000));
        let st = ctl.state();
        assert_eq!(st.phase, Phase::Playing);
        assert_eq!(st.score, 0);
        assert_eq!(st.grid.count_empty(), 14);
    }

    #[test]
    fn refused_transitions_are_reported_as_ignored() {
        let (ctl, sink) = controller(Session::signed_in("u-1", "alice"));
        let mut ctl = ctl.with_state(state([[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]], 4, Phase::Playing));
        let before = ctl.state().clone();
        assert_eq!(ctl.handle(Command::KeepPlaying), Some(Turn::Ignored));
        assert_eq!(ctl.handle(Command::Stop), Some(Turn::Ignored));
        assert_eq!(ctl.state(), &before);
        assert!(sink.0.borrow().is_empty());
    }

    #[test]
    fn handle_routes_commands() {
        let (ctl, _) = controller(Session::Guest);
        let mut ctl = ctl.with_state(state([[2048, 0, 0, 0], [0; 4], [0; 4], [0; 4]], 0, Phase::WonPendingDecision));
        assert_eq!(ctl.handle(Command::Move(Direction::Down)), Some(Turn::Ignored));
        assert_eq!(ctl.handle(Command::KeepPlaying), Some(Turn::Unchanged));
        assert_eq!(ctl.state().phase, Phase::WonKeepPlaying);
        assert_eq!(ctl.handle(Command::Quit), None);
        assert!(matches!(ctl.handle(Command::Move(Direction::Down)), Some(Turn::Moved(_))));
    }

    #[test]
    fn random_games_terminate_consistently() {
        let (ctl, _) = controller(Session::Guest);
        let mut ctl = ctl;
        let mut steps = 0;
        while !ctl.state().game_over() && steps < 20_000 {
            let before = ctl.state().clone();
            let direction = Direction::ALL[steps % 4];
            match ctl.play(direction) {
                Turn::Moved(outcome) => {
                    assert_eq!(outcome.grid.tile_sum(), before.grid.tile_sum());
                    assert_eq!(ctl.state().score, before.score + outcome.score_delta);
                }
                Turn::Unchanged => assert_eq!(ctl.state(), &before),
                Turn::Ignored => {
                    ctl.keep_playing();
                }
            }
            steps += 1;
        }
        assert!(ctl.state().game_over());
        assert!(!ctl.state().grid.has_legal_move() || ctl.state().won());
    }

    #[test]
    fn snapshot_serializes_phase_and_rows() {
        let st = state([[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]], 12, Phase::GameOver { won: true });
        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["phase"]["phase"], "game_over");
        assert_eq!(json["phase"]["won"], true);
        assert_eq!(json["grid"][0][0], 2);
        let back: GameState = serde_json::from_value(json).unwrap();
        assert_eq!(back, st);
    }
}
