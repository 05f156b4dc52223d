use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of the indexer
///
/// A run moves `Idle -> Scanning -> Upserting -> Done | Failed -> Idle`.
/// Only `Idle -> Scanning` may be entered by a caller; every other transition
/// belongs to the running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingState {
    /// No run is active, a new one may start
    #[default]
    Idle,

    /// Walking the roots and collecting candidates
    Scanning,

    /// Extracting content and writing records
    Upserting,

    /// The run finished; observable until the indexer settles back to idle
    Done,

    /// The run aborted
    Failed,
}

impl IndexingState {
    /// Check if a run is currently active
    pub fn is_running(&self) -> bool {
        matches!(self, IndexingState::Scanning | IndexingState::Upserting)
    }

    /// Check if this is a terminal state of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexingState::Done | IndexingState::Failed)
    }

    fn as_u8(self) -> u8 {
        match self {
            IndexingState::Idle => 0,
            IndexingState::Scanning => 1,
            IndexingState::Upserting => 2,
            IndexingState::Done => 3,
            IndexingState::Failed => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => IndexingState::Scanning,
            2 => IndexingState::Upserting,
            3 => IndexingState::Done,
            4 => IndexingState::Failed,
            _ => IndexingState::Idle,
        }
    }
}

impl std::fmt::Display for IndexingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexingState::Idle => write!(f, "idle"),
            IndexingState::Scanning => write!(f, "scanning"),
            IndexingState::Upserting => write!(f, "upserting"),
            IndexingState::Done => write!(f, "done"),
            IndexingState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for IndexingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(IndexingState::Idle),
            "scanning" | "scan" => Ok(IndexingState::Scanning),
            "upserting" | "upsert" => Ok(IndexingState::Upserting),
            "done" | "completed" => Ok(IndexingState::Done),
            "failed" | "error" => Ok(IndexingState::Failed),
            _ => Err(format!(
                "Invalid indexing state: '{s}'. Valid values are: idle, scanning, upserting, done, failed"
            )),
        }
    }
}

/// Lock-free holder of the indexer state.
///
/// Transitions are compare-and-swap, so two callers racing to leave `Idle`
/// cannot both win.
#[derive(Debug, Default)]
pub struct AtomicIndexingState(AtomicU8);

impl AtomicIndexingState {
    pub fn new(state: IndexingState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> IndexingState {
        IndexingState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. On failure returns the state actually observed.
    pub fn transition(
        &self,
        from: IndexingState,
        to: IndexingState,
    ) -> Result<IndexingState, IndexingState> {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(IndexingState::from_u8)
            .map_err(IndexingState::from_u8)
    }

    pub fn store(&self, state: IndexingState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_indexing_state_properties() {
        assert!(!IndexingState::Idle.is_running());
        assert!(IndexingState::Scanning.is_running());
        assert!(IndexingState::Upserting.is_running());
        assert!(!IndexingState::Done.is_running());

        assert!(IndexingState::Done.is_terminal());
        assert!(IndexingState::Failed.is_terminal());
        assert!(!IndexingState::Idle.is_terminal());
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "idle".parse::<IndexingState>().unwrap(),
            IndexingState::Idle
        );
        assert_eq!(
            "Upserting".parse::<IndexingState>().unwrap(),
            IndexingState::Upserting
        );
        assert_eq!(
            "completed".parse::<IndexingState>().unwrap(),
            IndexingState::Done
        );
        assert!("paused".parse::<IndexingState>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(IndexingState::Scanning.to_string(), "scanning");
        assert_eq!(IndexingState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_transition_only_from_expected_state() {
        let state = AtomicIndexingState::default();
        assert_eq!(state.load(), IndexingState::Idle);

        assert!(
            state
                .transition(IndexingState::Idle, IndexingState::Scanning)
                .is_ok()
        );
        assert_eq!(
            state.transition(IndexingState::Idle, IndexingState::Scanning),
            Err(IndexingState::Scanning)
        );

        state.store(IndexingState::Done);
        assert_eq!(state.load(), IndexingState::Done);
    }

    #[test]
    fn test_only_one_racer_leaves_idle() {
        let state = Arc::new(AtomicIndexingState::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    state
                        .transition(IndexingState::Idle, IndexingState::Scanning)
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
