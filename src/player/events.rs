use colored::Colorize;
use tokio::sync::broadcast;

/// Playback status events for visual/status feedback.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    PlaybackStarted {
        target: String,
        step_count: usize,
    },
    StepStarted {
        index: usize,
        summary: String,
    },
    StepCompleted {
        index: usize,
    },
    /// The selector missed everywhere and the recorded rectangle was used.
    StepFellBack {
        index: usize,
    },
    StepSkipped {
        index: usize,
        reason: String,
    },
    LoopFinished {
        remaining: Option<u32>,
    },
    PlaybackFinished {
        target: String,
    },
    PlaybackStopped {
        at_index: usize,
    },
}

/// Broadcast emitter for playback events.
pub struct EventEmitter {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<PlayerEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

/// Console listener rendering playback progress.
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<PlayerEvent>) {
        while let Ok(event) = receiver.recv().await {
            match event {
                PlayerEvent::PlaybackStarted { target, step_count } => {
                    println!(
                        "{} Playing {} ({} steps)",
                        "▶".green().bold(),
                        target.cyan(),
                        step_count
                    );
                }
                PlayerEvent::StepStarted { index, summary } => {
                    println!("  [{}] {}", index, summary.dimmed());
                }
                PlayerEvent::StepCompleted { index } => {
                    println!("  [{}] {}", index, "✓".green());
                }
                PlayerEvent::StepFellBack { index } => {
                    println!("  [{}] {} rect fallback", index, "◆".yellow());
                }
                PlayerEvent::StepSkipped { index, reason } => {
                    println!("  [{}] {} {}", index, "○".yellow(), reason.dimmed());
                }
                PlayerEvent::LoopFinished { remaining } => match remaining {
                    Some(n) => println!("{} Loop finished, {} remaining", "↻".blue(), n),
                    None => println!("{} Loop finished", "↻".blue()),
                },
                PlayerEvent::PlaybackFinished { target } => {
                    println!("{} Finished {}", "■".blue().bold(), target.cyan());
                }
                PlayerEvent::PlaybackStopped { at_index } => {
                    println!("{} Stopped at step {}", "■".red().bold(), at_index);
                }
            }
        }
    }
}
