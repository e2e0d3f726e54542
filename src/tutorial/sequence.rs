//! Sequence graph: per-track ordering of tutorials.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::progress::CompletedTutorials;

use super::model::{Track, TutorialId};

/// One tutorial's place in a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceEntry {
    pub tutorial: TutorialId,
    pub skippable: bool,
    pub next: Option<TutorialId>,
}

impl SequenceEntry {
    pub fn new(tutorial: TutorialId, skippable: bool, next: Option<TutorialId>) -> Self {
        Self {
            tutorial,
            skippable,
            next,
        }
    }
}

/// Ordered entries of a single track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSequence {
    pub track: Track,
    pub entries: Vec<SequenceEntry>,
}

impl TrackSequence {
    /// Build a linear chain where each entry points at the one after it.
    pub fn chain(track: Track, tutorials: &[(TutorialId, bool)]) -> Self {
        let entries = tutorials
            .iter()
            .enumerate()
            .map(|(i, &(id, skippable))| {
                SequenceEntry::new(id, skippable, tutorials.get(i + 1).map(|(next, _)| *next))
            })
            .collect();
        Self { track, entries }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let track = self.track.to_string();
        let mut members = HashSet::new();
        for entry in &self.entries {
            if !members.insert(entry.tutorial) {
                return Err(CatalogError::DuplicateSequenceEntry {
                    track,
                    tutorial: entry.tutorial.to_string(),
                });
            }
        }

        for entry in &self.entries {
            if let Some(next) = entry.next
                && !members.contains(&next)
            {
                return Err(CatalogError::DanglingNext {
                    track,
                    from: entry.tutorial.to_string(),
                    to: next.to_string(),
                });
            }
        }

        let terminals = self.entries.iter().filter(|e| e.next.is_none()).count();
        if terminals != 1 {
            return Err(CatalogError::TerminalCount {
                track,
                count: terminals,
            });
        }

        // Every walk must reach the terminal within `len` hops.
        let links: HashMap<TutorialId, Option<TutorialId>> =
            self.entries.iter().map(|e| (e.tutorial, e.next)).collect();
        for entry in &self.entries {
            let mut cursor = entry.next;
            let mut hops = 0;
            while let Some(id) = cursor {
                hops += 1;
                if hops > self.entries.len() {
                    return Err(CatalogError::Cycle {
                        track,
                        tutorial: entry.tutorial.to_string(),
                    });
                }
                cursor = links.get(&id).copied().flatten();
            }
        }

        Ok(())
    }

    fn entry(&self, id: TutorialId) -> Option<&SequenceEntry> {
        self.entries.iter().find(|e| e.tutorial == id)
    }
}

/// Validated sequences for every known track.
#[derive(Debug, Clone, Default)]
pub struct SequenceGraph {
    tracks: HashMap<Track, TrackSequence>,
}

impl SequenceGraph {
    /// Validate and index sequences. Fails on duplicates, dangling
    /// pointers, cycles, or a terminal count other than one.
    pub fn new(sequences: Vec<TrackSequence>) -> Result<Self, CatalogError> {
        let mut tracks = HashMap::new();
        for sequence in sequences {
            sequence.validate()?;
            if tracks.contains_key(&sequence.track) {
                return Err(CatalogError::DuplicateTrack {
                    track: sequence.track.to_string(),
                });
            }
            tracks.insert(sequence.track, sequence);
        }
        Ok(Self { tracks })
    }

    /// Built-in professional and facility sequences.
    pub fn standard() -> Result<Self, CatalogError> {
        use TutorialId::*;

        let professional = TrackSequence::chain(
            Track::Professional,
            &[
                (ProfileTabs, false),
                (Dashboard, false),
                (Messages, true),
                (Contracts, true),
                (Calendar, true),
                (Marketplace, true),
                (Account, true),
            ],
        );
        let facility = TrackSequence::chain(
            Track::Facility,
            &[
                (FacilityProfileTabs, false),
                (Dashboard, false),
                (Messages, true),
                (Contracts, true),
                (Calendar, true),
                (Payroll, true),
                (Organization, true),
                (Account, true),
            ],
        );

        Self::new(vec![professional, facility])
    }

    pub fn sequence(&self, track: Track) -> Option<&TrackSequence> {
        self.tracks.get(&track)
    }

    fn entries(&self, track: Track) -> &[SequenceEntry] {
        self.tracks
            .get(&track)
            .map(|s| s.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Next incomplete tutorial after `current`, following the chain past
    /// anything already completed.
    pub fn next_tutorial(
        &self,
        current: TutorialId,
        track: Track,
        completed: &CompletedTutorials,
    ) -> Option<TutorialId> {
        let sequence = self.tracks.get(&track)?;
        let mut cursor = sequence.entry(current)?.next;
        while let Some(id) = cursor {
            if !completed.is_completed(id) {
                return Some(id);
            }
            cursor = sequence.entry(id).and_then(|e| e.next);
        }
        None
    }

    pub fn first_incomplete(
        &self,
        track: Track,
        completed: &CompletedTutorials,
    ) -> Option<TutorialId> {
        self.entries(track)
            .iter()
            .map(|e| e.tutorial)
            .find(|id| !completed.is_completed(*id))
    }

    /// Tutorials outside the track are never blocking.
    pub fn is_skippable(&self, tutorial: TutorialId, track: Track) -> bool {
        self.tracks
            .get(&track)
            .and_then(|s| s.entry(tutorial))
            .is_none_or(|e| e.skippable)
    }

    pub fn is_mandatory(&self, tutorial: TutorialId, track: Track) -> bool {
        self.entries(track).iter().any(|e| e.tutorial == tutorial)
    }

    pub fn mandatory(&self, track: Track) -> Vec<TutorialId> {
        self.entries(track).iter().map(|e| e.tutorial).collect()
    }

    pub fn all_mandatory_complete(&self, track: Track, completed: &CompletedTutorials) -> bool {
        self.entries(track)
            .iter()
            .all(|e| completed.is_completed(e.tutorial))
    }

    /// Rounded percentage of the track's tutorials that are complete.
    pub fn completion_percentage(&self, track: Track, completed: &CompletedTutorials) -> u8 {
        let entries = self.entries(track);
        if entries.is_empty() {
            return 0;
        }
        let done = entries
            .iter()
            .filter(|e| completed.is_completed(e.tutorial))
            .count();
        ((done as f64 / entries.len() as f64) * 100.0).round() as u8
    }
}
