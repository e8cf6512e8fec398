//! Raw terminal input → game commands.

use twenty48_core::engine::Direction;

/// Everything a player can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    KeepPlaying,
    Stop,
    Restart,
    Quit,
    Leaderboard,
    History,
    Snapshot,
}

/// Map a single token to a command. Case-insensitive; `None` when unknown.
pub fn map_input(raw: &str) -> Option<Command> {
    let token = raw.trim();
    let direction = match token {
        "\x1b[A" => Some(Direction::Up),
        "\x1b[B" => Some(Direction::Down),
        "\x1b[C" => Some(Direction::Right),
        "\x1b[D" => Some(Direction::Left),
        _ => None,
    };
    if let Some(direction) = direction {
        return Some(Command::Move(direction));
    }
    let command = match token.to_ascii_lowercase().as_str() {
        "up" | "w" | "k" => Command::Move(Direction::Up),
        "down" | "s" | "j" => Command::Move(Direction::Down),
        "left" | "a" | "h" => Command::Move(Direction::Left),
        "right" | "d" | "l" => Command::Move(Direction::Right),
        "c" | "continue" | "keep" => Command::KeepPlaying,
        "x" | "stop" => Command::Stop,
        "r" | "restart" | "new" => Command::Restart,
        "q" | "quit" | "exit" => Command::Quit,
        "b" | "board" | "leaderboard" => Command::Leaderboard,
        "hist" | "history" => Command::History,
        "json" | "snapshot" => Command::Snapshot,
        _ => return None,
    };
    Some(command)
}

/// Map a whole input line. Whitespace separates tokens; a token made only of
/// move keys (`wasd`/`hjkl`) expands to one move per key, so `aaw` is
/// left, left, up. Unknown tokens are returned separately.
pub fn map_line(line: &str) -> (Vec<Command>, Vec<String>) {
    let mut commands = Vec::new();
    let mut unknown = Vec::new();
    for token in split_tokens(line) {
        if let Some(command) = map_input(&token) {
            commands.push(command);
            continue;
        }
        let keys: Option<Vec<Command>> = token
            .chars()
            .map(|c| match map_input(c.encode_utf8(&mut [0; 4])) {
                Some(cmd @ Command::Move(_)) => Some(cmd),
                _ => None,
            })
            .collect();
        match keys {
            Some(keys) => commands.extend(keys),
            None => unknown.push(token),
        }
    }
    (commands, unknown)
}

// Arrow-key escape sequences arrive glued together in cooked mode.
fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in line.split_whitespace() {
        let mut rest = word;
        while let Some(start) = rest.find('\x1b') {
            if start > 0 {
                tokens.push(rest[..start].to_string());
            }
            let end = rest[start..]
                .char_indices()
                .nth(3)
                .map_or(rest.len(), |(offset, _)| start + offset);
            tokens.push(rest[start..end].to_string());
            rest = &rest[end..];
        }
        if !rest.is_empty() {
            tokens.push(rest.to_string());
        }
    }
    tokens
}
