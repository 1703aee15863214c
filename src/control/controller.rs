use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::session::{InteractionMode, SessionState, StreamingSession};

/// Default delay between a momentary release and the stop it triggers.
pub const DEFAULT_RELEASE_DELAY: Duration = Duration::from_millis(300);

/// Turns press / release / activate gestures into session start/stop calls.
///
/// Momentary: press starts, release stops after `release_delay`. A press
/// inside that window cancels the pending stop, which absorbs the brief
/// releases a finger produces while dragging across the button. A press that
/// lands while the previous episode is still tearing down starts a fresh one
/// as soon as the session is idle, unless the button was released meanwhile.
///
/// Toggle: each activation starts an idle session or stops a recording one.
pub struct InputController {
    session: Arc<StreamingSession>,
    mode: Mutex<InteractionMode>,
    release_delay: Duration,
    /// Bumped by every press; a delayed stop only fires if no press followed it.
    presses: Arc<AtomicU64>,
    /// Between a momentary press and its release
    held: AtomicBool,
}

impl InputController {
    pub fn new(session: Arc<StreamingSession>, release_delay: Duration) -> Self {
        let mode = session.config().mode;
        Self {
            session,
            mode: Mutex::new(mode),
            release_delay,
            presses: Arc::new(AtomicU64::new(0)),
            held: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &Arc<StreamingSession> {
        &self.session
    }

    pub fn mode(&self) -> InteractionMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn release_delay(&self) -> Duration {
        self.release_delay
    }

    /// Switch interaction mode. Does not touch an active recording.
    pub fn set_mode(&self, mode: InteractionMode) {
        let mut current = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != mode {
            info!("Interaction mode: {} -> {}", *current, mode);
            *current = mode;
        }
    }

    /// Pointer/touch/key down.
    pub async fn press(&self) -> Result<(), SessionError> {
        match self.mode() {
            InteractionMode::Momentary => {
                let press = self.presses.fetch_add(1, Ordering::SeqCst) + 1;
                self.held.store(true, Ordering::SeqCst);

                if self.session.state() == SessionState::Closing {
                    debug!("Press while stopping, restarting once idle");
                    self.session.wait_idle().await;
                    if !self.held.load(Ordering::SeqCst)
                        || self.presses.load(Ordering::SeqCst) != press
                    {
                        debug!("Press released before the session became idle");
                        return Ok(());
                    }
                }

                self.session.start().await
            }
            InteractionMode::Toggle => {
                debug!("Press ignored in toggle mode");
                Ok(())
            }
        }
    }

    /// Pointer/touch/key up, or the pointer leaving the control mid-drag.
    pub fn release(&self) {
        if self.mode() != InteractionMode::Momentary {
            debug!("Release ignored in toggle mode");
            return;
        }
        self.held.store(false, Ordering::SeqCst);

        let press = self.presses.load(Ordering::SeqCst);
        let presses = Arc::clone(&self.presses);
        let session = Arc::clone(&self.session);
        let delay = self.release_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if presses.load(Ordering::SeqCst) != press {
                debug!("Release superseded by a new press");
                return;
            }
            session.stop().await;
        });
    }

    /// Click/tap in toggle mode.
    pub async fn activate(&self) -> Result<(), SessionError> {
        if self.mode() != InteractionMode::Toggle {
            debug!("Activate ignored in momentary mode");
            return Ok(());
        }

        match self.session.state() {
            SessionState::Idle => self.session.start().await,
            SessionState::Recording => {
                self.session.stop().await;
                Ok(())
            }
            SessionState::Closing => {
                debug!("Activate ignored while stopping");
                Ok(())
            }
        }
    }
}
