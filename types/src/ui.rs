//! Presentation options and dialog animation state.
//!
//! Owned by the engine, read by the renderer. No ratatui types here.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiOptions {
    pub ascii_only: bool,
    pub high_contrast: bool,
    pub reduced_motion: bool,
}

/// How a dialog enters the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalEffectKind {
    /// Notices grow from the center.
    PopScale,
    /// Errors jolt sideways and settle.
    Shake,
}

/// Entrance animation of one dialog, advanced by frame time.
#[derive(Debug, Clone)]
pub struct ModalEffect {
    kind: ModalEffectKind,
    elapsed: Duration,
    duration: Duration,
}

impl ModalEffect {
    #[must_use]
    pub fn new(kind: ModalEffectKind, duration: Duration) -> Self {
        Self {
            kind,
            elapsed: Duration::ZERO,
            duration,
        }
    }

    #[must_use]
    pub fn pop_scale(duration: Duration) -> Self {
        Self::new(ModalEffectKind::PopScale, duration)
    }

    #[must_use]
    pub fn shake(duration: Duration) -> Self {
        Self::new(ModalEffectKind::Shake, duration)
    }

    pub fn advance(&mut self, delta: Duration) {
        self.elapsed = self.elapsed.saturating_add(delta).min(self.duration);
    }

    /// 0.0 at the first frame, 1.0 once settled.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    #[must_use]
    pub fn kind(&self) -> ModalEffectKind {
        self.kind
    }
}
