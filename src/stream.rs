//! Per-connection screen streaming state and frame-rate throttling.
//!
//! The table is shared by every connection task. Its lock only guards the
//! session map; captures and encoding happen after the lock is released.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::frame::{FrameError, FrameSettings};
use crate::server::ConnectionId;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("fps must be a positive number")]
    InvalidFps,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Validated parameters of a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    settings: FrameSettings,
    fps: f64,
}

impl StreamConfig {
    /// `fps` may be fractional; `0.5` means one frame every two seconds.
    pub fn new(quality: i64, scale: f64, fps: f64) -> Result<Self, StreamError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(StreamError::InvalidFps);
        }
        Ok(Self {
            settings: FrameSettings::new(quality, scale)?,
            fps,
        })
    }

    pub fn settings(&self) -> FrameSettings {
        self.settings
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Minimum spacing between two emitted frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }
}

/// Streaming state owned by one connection. A session exists only while its
/// stream is running.
#[derive(Debug, Clone)]
pub struct StreamSession {
    config: StreamConfig,
    last_frame: Option<Instant>,
}

impl StreamSession {
    fn new(config: StreamConfig) -> Self {
        Self {
            config,
            last_frame: None,
        }
    }

    pub fn config(&self) -> StreamConfig {
        self.config
    }

    pub fn last_frame(&self) -> Option<Instant> {
        self.last_frame
    }
}

/// Outcome of asking for the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameGate {
    /// Capture now with these settings; the timestamp has been recorded.
    Ready(FrameSettings),
    /// Too early; try again after `wait`.
    Throttled { wait: Duration },
    /// `start_stream` has not been called on this connection.
    NotStarted,
}

/// Stream sessions keyed by connection.
#[derive(Debug, Default)]
pub struct StreamSessions {
    sessions: Mutex<HashMap<ConnectionId, StreamSession>>,
}

impl StreamSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, StreamSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates or replaces the session for `connection`.
    pub fn start(&self, connection: ConnectionId, config: StreamConfig) {
        self.lock().insert(connection, StreamSession::new(config));
    }

    /// Removes the session. Returns whether one existed.
    pub fn stop(&self, connection: ConnectionId) -> bool {
        self.lock().remove(&connection).is_some()
    }

    /// Decides whether a frame may be produced at `now`, recording `now` as
    /// the last frame time when it may.
    pub fn next_frame(&self, connection: ConnectionId, now: Instant) -> FrameGate {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(&connection) else {
            return FrameGate::NotStarted;
        };

        let interval = session.config.frame_interval();
        if let Some(last) = session.last_frame {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < interval {
                return FrameGate::Throttled {
                    wait: interval - elapsed,
                };
            }
        }
        session.last_frame = Some(now);
        FrameGate::Ready(session.config.settings())
    }

    pub fn get(&self, connection: ConnectionId) -> Option<StreamSession> {
        self.lock().get(&connection).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CONNECTION: ConnectionId = ConnectionId::new(7);

    fn sessions_with(fps: f64) -> StreamSessions {
        let sessions = StreamSessions::new();
        sessions.start(
            CONNECTION,
            StreamConfig::new(50, 0.5, fps).expect("valid config"),
        );
        sessions
    }

    #[test]
    fn first_frame_is_never_throttled() {
        let sessions = sessions_with(10.0);
        let now = Instant::now();
        assert!(matches!(sessions.next_frame(CONNECTION, now), FrameGate::Ready(_)));
        assert_eq!(
            sessions.get(CONNECTION).and_then(|s| s.last_frame()),
            Some(now)
        );
    }

    #[test]
    fn second_frame_inside_interval_is_throttled() {
        let sessions = sessions_with(10.0);
        let start = Instant::now();
        sessions.next_frame(CONNECTION, start);

        let gate = sessions.next_frame(CONNECTION, start + Duration::from_millis(30));
        let FrameGate::Throttled { wait } = gate else {
            panic!("expected throttling, got {gate:?}");
        };
        assert_eq!(wait, Duration::from_millis(70));
        assert_eq!(
            sessions.get(CONNECTION).and_then(|s| s.last_frame()),
            Some(start),
            "throttled polls must not move the timestamp"
        );
    }

    #[test]
    fn frame_after_interval_updates_timestamp() {
        let sessions = sessions_with(10.0);
        let start = Instant::now();
        sessions.next_frame(CONNECTION, start);

        let later = start + Duration::from_millis(100);
        assert!(matches!(sessions.next_frame(CONNECTION, later), FrameGate::Ready(_)));
        assert_eq!(
            sessions.get(CONNECTION).and_then(|s| s.last_frame()),
            Some(later)
        );
    }

    #[test]
    fn unknown_connection_is_not_started() {
        let sessions = sessions_with(10.0);
        assert_eq!(
            sessions.next_frame(ConnectionId::new(99), Instant::now()),
            FrameGate::NotStarted
        );
    }

    #[test]
    fn restart_resets_last_frame() {
        let sessions = sessions_with(1.0);
        let start = Instant::now();
        sessions.next_frame(CONNECTION, start);
        sessions.start(CONNECTION, StreamConfig::new(50, 0.5, 1.0).expect("valid"));

        assert!(matches!(
            sessions.next_frame(CONNECTION, start + Duration::from_millis(1)),
            FrameGate::Ready(_)
        ));
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let sessions = sessions_with(30.0);
        assert!(sessions.stop(CONNECTION));
        assert!(!sessions.stop(CONNECTION));
        assert!(sessions.is_empty());
        assert_eq!(
            sessions.next_frame(CONNECTION, Instant::now()),
            FrameGate::NotStarted
        );
    }

    #[test]
    fn fractional_fps_stretches_the_interval() {
        let config = StreamConfig::new(50, 0.5, 0.5).expect("valid");
        assert_eq!(config.frame_interval(), Duration::from_secs(2));
        let config = StreamConfig::new(50, 0.5, 30.0).expect("valid");
        assert_eq!(config.fps(), 30.0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-5.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn config_rejects_unusable_fps(#[case] fps: f64) {
        assert!(matches!(
            StreamConfig::new(50, 0.5, fps),
            Err(StreamError::InvalidFps)
        ));
    }
}
