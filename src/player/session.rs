/// Playback state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Running,
    /// Manual single advance; never enters repeat logic.
    Stepping,
    /// Suspended inside a step awaiting a scheduled resumption.
    WaitingAsync,
}

/// Ephemeral per-playback state. Owned by the player, reset on every play
/// start, never persisted.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub index: usize,
    pub state: PlayerState,
    /// Remaining full passes. None means loop forever while repeat is on.
    pub loops_remaining: Option<u32>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self {
            index: 0,
            state: PlayerState::Idle,
            loops_remaining: None,
        }
    }

    /// Arm the session for a fresh play run.
    pub fn begin(&mut self, repeat_enabled: bool, repeat_count: u32) {
        self.index = 0;
        self.state = PlayerState::Running;
        self.loops_remaining = if repeat_enabled && repeat_count > 0 {
            Some(repeat_count)
        } else {
            None
        };
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            PlayerState::Running | PlayerState::WaitingAsync | PlayerState::Stepping
        )
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}
