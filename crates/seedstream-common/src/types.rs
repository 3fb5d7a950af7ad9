//! Core type definitions shared by the job runner, the database layer and
//! the HTTP surface.
//!
//! Statuses are serialized in SCREAMING_SNAKE_CASE, which is also the form
//! stored in the database and returned by the status endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle status of a movie's download-and-stream job.
///
/// The legal moves form a closed table (see [`MovieStatus::can_transition_to`]):
///
/// ```text
/// PENDING -> DOWNLOADING -> DOWNLOADING_AND_CONVERTING -> PLAYABLE -> READY
///                 |                     |                    |
///                 +---------------------+--------------------+-> ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovieStatus {
    /// Known but nothing started yet.
    Pending,
    /// Transfer running, no segment work yet (duration unknown).
    Downloading,
    /// Transfer running and segments are being cut.
    DownloadingAndConverting,
    /// At least the first segment exists; clients can start playing.
    Playable,
    /// Every segment was produced.
    Ready,
    /// The job failed, either fatally or with permanently failed segments.
    Error,
}

impl MovieStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [MovieStatus; 6] = [
        Self::Pending,
        Self::Downloading,
        Self::DownloadingAndConverting,
        Self::Playable,
        Self::Ready,
        Self::Error,
    ];

    /// Whether the transition table allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: MovieStatus) -> bool {
        use MovieStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading)
                | (Downloading, DownloadingAndConverting)
                | (Downloading, Error)
                | (DownloadingAndConverting, Playable)
                | (DownloadingAndConverting, Error)
                | (Playable, Ready)
                | (Playable, Error)
        )
    }

    /// Move to `next`, rejecting anything the transition table does not allow.
    pub fn transition(self, next: MovieStatus) -> Result<MovieStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Position along the happy path. `Error` sits outside it.
    pub fn stage(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Downloading => Some(1),
            Self::DownloadingAndConverting => Some(2),
            Self::Playable => Some(3),
            Self::Ready => Some(4),
            Self::Error => None,
        }
    }

    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    /// A job for this status should have a live runner.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Downloading | Self::DownloadingAndConverting | Self::Playable
        )
    }

    /// Segments can be played.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Playable | Self::Ready)
    }

    /// The transfer is still running and nothing is playable yet.
    pub fn is_downloading(self) -> bool {
        matches!(self, Self::Downloading | Self::DownloadingAndConverting)
    }

    /// Wire/database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::DownloadingAndConverting => "DOWNLOADING_AND_CONVERTING",
            Self::Playable => "PLAYABLE",
            Self::Ready => "READY",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for MovieStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovieStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid movie status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let status = MovieStatus::Pending
            .transition(MovieStatus::Downloading)
            .and_then(|s| s.transition(MovieStatus::DownloadingAndConverting))
            .and_then(|s| s.transition(MovieStatus::Playable))
            .and_then(|s| s.transition(MovieStatus::Ready))
            .unwrap();
        assert_eq!(status, MovieStatus::Ready);
    }

    #[test]
    fn test_error_reachable_from_active_states() {
        assert!(MovieStatus::Downloading.can_transition_to(MovieStatus::Error));
        assert!(MovieStatus::DownloadingAndConverting.can_transition_to(MovieStatus::Error));
        assert!(MovieStatus::Playable.can_transition_to(MovieStatus::Error));
        assert!(!MovieStatus::Pending.can_transition_to(MovieStatus::Error));
    }

    #[test]
    fn test_playable_never_regresses() {
        for target in [MovieStatus::Pending, MovieStatus::Downloading] {
            assert!(!MovieStatus::Playable.can_transition_to(target));
            assert!(!MovieStatus::Ready.can_transition_to(target));
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [MovieStatus::Ready, MovieStatus::Error] {
            assert!(from.is_terminal());
            for to in MovieStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = MovieStatus::Pending
            .transition(MovieStatus::Ready)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: MovieStatus::Pending,
                to: MovieStatus::Ready
            }
        ));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&MovieStatus::DownloadingAndConverting).unwrap();
        assert_eq!(json, r#""DOWNLOADING_AND_CONVERTING""#);

        let status: MovieStatus = serde_json::from_str(r#""PLAYABLE""#).unwrap();
        assert_eq!(status, MovieStatus::Playable);
    }

    #[test]
    fn test_status_from_str_matches_display() {
        for status in MovieStatus::ALL {
            assert_eq!(status.to_string().parse::<MovieStatus>().unwrap(), status);
        }
        assert!("CONVERTING".parse::<MovieStatus>().is_err());
    }

    #[test]
    fn test_flags() {
        assert!(MovieStatus::Playable.is_ready());
        assert!(MovieStatus::Ready.is_ready());
        assert!(!MovieStatus::DownloadingAndConverting.is_ready());

        assert!(MovieStatus::Downloading.is_downloading());
        assert!(MovieStatus::DownloadingAndConverting.is_downloading());
        assert!(!MovieStatus::Playable.is_downloading());

        assert!(MovieStatus::Playable.is_in_flight());
        assert!(!MovieStatus::Pending.is_in_flight());
    }
}
