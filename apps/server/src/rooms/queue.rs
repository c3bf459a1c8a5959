//! Queue state machine
//!
//! All playlist mutations for a room go through this type, which maintains
//! the invariant that `current_index` is always either -1 or a valid index
//! into the playlist. -1 is the "queue finished" terminal state and is a
//! successful result, never an error.
//!
//! Callers hold the room lock for the duration of each operation, so every
//! mutation here is atomic with respect to other requests for the room.

use thiserror::Error;
use unison_protocol::{AdvanceDirection, LoopMode, QueueEntry, QueueView};

/// Queue mutation rejections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Track is already queued
    #[error("track {0} is already queued")]
    Duplicate(String),

    /// Queue is at its soft cap
    #[error("queue is at its limit of {cap} tracks")]
    Full { cap: usize },

    /// Index does not point into the playlist
    #[error("index {index} is out of range for a queue of {len}")]
    OutOfRange { index: i64, len: usize },

    /// Only the upcoming portion of the queue is reorderable
    #[error("only entries after the current track can be reordered")]
    Frozen,

    /// Track is not in the queue
    #[error("track {0} is not queued")]
    NotFound(String),
}

impl QueueError {
    /// Stable code for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Duplicate(_) => "DUPLICATE_TRACK",
            Self::Full { .. } => "QUEUE_FULL",
            Self::OutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            Self::Frozen => "REORDER_FROZEN",
            Self::NotFound(_) => "TRACK_NOT_FOUND",
        }
    }
}

/// A room's playlist plus the current position and loop flag
#[derive(Debug, Clone)]
pub struct Queue {
    entries: Vec<QueueEntry>,
    current_index: i64,
    loop_mode: LoopMode,
    max_tracks: usize,
}

impl Queue {
    pub fn new(max_tracks: usize) -> Self {
        Self {
            entries: Vec::new(),
            current_index: -1,
            loop_mode: LoopMode::default(),
            max_tracks,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> i64 {
        self.current_index
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// The entry the room is currently positioned at, if any
    pub fn current_entry(&self) -> Option<&QueueEntry> {
        usize::try_from(self.current_index)
            .ok()
            .and_then(|i| self.entries.get(i))
    }

    /// Wire representation of this queue
    pub fn view(&self) -> QueueView {
        QueueView {
            playlist: self.entries.clone(),
            current_track_index: self.current_index,
            loop_mode: self.loop_mode,
        }
    }

    /// Insert a track immediately after the current position ("play next")
    ///
    /// With no current track the entry goes to the tail and becomes the
    /// current one, so an add right after the queue finished resumes it.
    pub fn add(&mut self, entry: QueueEntry) -> Result<QueueView, QueueError> {
        if self
            .entries
            .iter()
            .any(|e| e.track.id == entry.track.id)
        {
            return Err(QueueError::Duplicate(entry.track.id.clone()));
        }
        if self.entries.len() >= self.max_tracks {
            return Err(QueueError::Full {
                cap: self.max_tracks,
            });
        }

        if self.current_index >= 0 {
            let at = (self.current_index as usize + 1).min(self.entries.len());
            self.entries.insert(at, entry);
        } else {
            self.entries.push(entry);
            self.current_index = self.entries.len() as i64 - 1;
        }

        Ok(self.view())
    }

    /// Remove a track by its track ID
    pub fn remove(&mut self, track_id: &str) -> Result<QueueView, QueueError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.track.id == track_id)
            .ok_or_else(|| QueueError::NotFound(track_id.to_string()))?;

        self.entries.remove(pos);

        let len = self.entries.len() as i64;
        let pos = pos as i64;
        if pos < self.current_index {
            self.current_index -= 1;
        } else if pos == self.current_index {
            // The index now points at the entry that followed the removed
            // one; clamp it into the shortened playlist.
            if len == 0 {
                self.current_index = -1;
            } else if self.current_index >= len {
                self.current_index = len - 1;
            }
        }

        Ok(self.view())
    }

    /// Move an upcoming entry to another upcoming position
    ///
    /// The now-playing entry and everything before it are frozen; both
    /// endpoints must be strictly after the current index.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<QueueView, QueueError> {
        let len = self.entries.len();
        if from >= len {
            return Err(QueueError::OutOfRange {
                index: from as i64,
                len,
            });
        }
        if to >= len {
            return Err(QueueError::OutOfRange {
                index: to as i64,
                len,
            });
        }
        if (from as i64) <= self.current_index || (to as i64) <= self.current_index {
            return Err(QueueError::Frozen);
        }

        if from != to {
            let entry = self.entries.remove(from);
            self.entries.insert(to, entry);
        }

        Ok(self.view())
    }

    /// Step the current index forward or backward
    ///
    /// Advancing past the tail wraps to 0 under queue looping and lands on
    /// -1 ("queue finished") otherwise. Stepping backward clamps at 0.
    pub fn advance(&mut self, direction: AdvanceDirection) -> QueueView {
        let len = self.entries.len() as i64;

        self.current_index = if len == 0 {
            -1
        } else {
            match direction {
                AdvanceDirection::Next => {
                    if self.current_index + 1 >= len {
                        match self.loop_mode {
                            LoopMode::Queue => 0,
                            LoopMode::None => -1,
                        }
                    } else {
                        self.current_index + 1
                    }
                }
                AdvanceDirection::Previous => (self.current_index - 1).max(0),
            }
        };

        self.view()
    }

    /// Set the current index directly
    ///
    /// Jumping to the index the queue is already at succeeds without
    /// mutation; anything outside the playlist is rejected.
    pub fn jump(&mut self, target: i64) -> Result<QueueView, QueueError> {
        if target == self.current_index {
            return Ok(self.view());
        }
        if target < 0 || target >= self.entries.len() as i64 {
            return Err(QueueError::OutOfRange {
                index: target,
                len: self.entries.len(),
            });
        }

        self.current_index = target;
        Ok(self.view())
    }

    /// Change the loop flag; position is untouched
    pub fn set_loop_mode(&mut self, mode: LoopMode) -> QueueView {
        self.loop_mode = mode;
        self.view()
    }
}
