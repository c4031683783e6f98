//! Shared camera/microphone stream ownership.
//!
//! The session monitor holds the only [`MediaStreamHandle`]; detectors get
//! [`StreamView`]s, which can observe track liveness but cannot stop tracks.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Kind of media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Which devices to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaRequest {
    pub video: bool,
    pub audio: bool,
}

impl MediaRequest {
    pub fn is_empty(&self) -> bool {
        !self.video && !self.audio
    }
}

/// A single media track. Clones share the same liveness flag.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) -> bool {
        self.live.swap(false, Ordering::SeqCst)
    }
}

/// Owning handle for an acquired stream. Stops every track on drop.
#[derive(Debug)]
pub struct MediaStreamHandle {
    tracks: Vec<MediaTrack>,
}

impl MediaStreamHandle {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    /// Take over the tracks of a separately acquired stream.
    pub fn absorb(&mut self, mut other: MediaStreamHandle) {
        self.tracks.append(&mut other.tracks);
    }

    /// Read-only view for detectors.
    pub fn view(&self) -> StreamView {
        StreamView {
            tracks: self.tracks.clone().into(),
            filter: None,
        }
    }

    /// Stop every track. Returns how many were still live.
    pub fn stop_all(&mut self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }
}

impl Drop for MediaStreamHandle {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Read-only view of a shared stream.
#[derive(Debug, Clone)]
pub struct StreamView {
    tracks: Arc<[MediaTrack]>,
    filter: Option<TrackKind>,
}

impl StreamView {
    /// View restricted to the audio track(s), for the noise analyser.
    pub fn audio_only(&self) -> StreamView {
        StreamView {
            tracks: self.tracks.clone(),
            filter: Some(TrackKind::Audio),
        }
    }

    fn visible(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks
            .iter()
            .filter(move |t| self.filter.map_or(true, |k| t.kind() == k))
    }

    pub fn has_live(&self, kind: TrackKind) -> bool {
        self.visible().any(|t| t.kind() == kind && t.is_live())
    }

    pub fn is_live(&self) -> bool {
        self.visible().any(|t| t.is_live())
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.visible().map(|t| t.id().to_string()).collect()
    }
}
