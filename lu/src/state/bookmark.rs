//! Read cursors for the group conversation and each member's DM
//!
//! A cursor only moves forward. On first sight of a source it starts at the
//! transport's latest sequence, so history from before the daemon existed is
//! never replayed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transport::Sequence;

/// Which conversation a cursor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// The group conversation
    Group,
    /// One member's private conversation, keyed by contact
    Direct(&'a str),
}

/// Cursor bookkeeping for one group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmarks {
    /// Last ingested sequence in the group conversation
    #[serde(default)]
    pub last_cursor: Option<Sequence>,

    /// Last ingested sequence per member DM
    #[serde(default)]
    pub dm_cursors: BTreeMap<String, Sequence>,
}

impl Bookmarks {
    /// Current cursor, `None` if the source was never observed
    pub fn cursor(&self, source: Source<'_>) -> Option<Sequence> {
        match source {
            Source::Group => self.last_cursor,
            Source::Direct(member) => self.dm_cursors.get(member).copied(),
        }
    }

    /// Set the starting cursor if the source has none yet; returns true if set
    pub fn initialize(&mut self, source: Source<'_>, latest: Sequence) -> bool {
        if self.cursor(source).is_some() {
            return false;
        }
        self.set(source, latest);
        true
    }

    /// Move the cursor forward to `sequence`; never moves it back
    ///
    /// Returns true if the cursor changed.
    pub fn advance(&mut self, source: Source<'_>, sequence: Sequence) -> bool {
        match self.cursor(source) {
            Some(current) if current >= sequence => false,
            _ => {
                self.set(source, sequence);
                true
            }
        }
    }

    fn set(&mut self, source: Source<'_>, sequence: Sequence) {
        match source {
            Source::Group => self.last_cursor = Some(sequence),
            Source::Direct(member) => {
                self.dm_cursors.insert(member.to_string(), sequence);
            }
        }
    }
}
