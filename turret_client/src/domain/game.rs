use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameStatus {
    #[default]
    NotStarted,
    InProgress,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStatusError {
    pub from: GameStatus,
    pub to: GameStatus,
}

impl fmt::Display for GameStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot move game from {:?} to {:?}", self.from, self.to)
    }
}

impl std::error::Error for GameStatusError {}

impl GameStatus {
    // Turrets fire only in this state.
    pub fn is_active(self) -> bool {
        self == GameStatus::InProgress
    }

    pub fn start(self) -> Result<GameStatus, GameStatusError> {
        self.transition(GameStatus::InProgress)
    }

    pub fn end(self) -> Result<GameStatus, GameStatusError> {
        self.transition(GameStatus::Ended)
    }

    fn transition(self, to: GameStatus) -> Result<GameStatus, GameStatusError> {
        match (self, to) {
            (GameStatus::NotStarted, GameStatus::InProgress)
            | (GameStatus::InProgress, GameStatus::Ended) => Ok(to),
            _ => Err(GameStatusError { from: self, to }),
        }
    }
}
