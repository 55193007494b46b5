//! Engine lifecycle and per-frame stage ordering.

use crate::error::CullError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Device objects exist but no scene is registered.
    Uninitialized,
    /// Registry built; frames may run.
    Initialized,
    Disposed,
}

impl EngineState {
    pub fn name(self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initialized => "initialized",
            EngineState::Disposed => "disposed",
        }
    }

    pub fn expect(self, expected: EngineState) -> Result<(), CullError> {
        if self == expected {
            Ok(())
        } else {
            Err(CullError::InvalidState { expected: expected.name(), actual: self.name() })
        }
    }
}

/// Last completed stage of the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    BoundsRefreshed,
    HiZBuilt,
    VisibilityTested,
    Compacted,
    StatsRead,
}

impl FramePhase {
    pub fn name(self) -> &'static str {
        match self {
            FramePhase::Idle => "idle",
            FramePhase::BoundsRefreshed => "bounds refreshed",
            FramePhase::HiZBuilt => "hi-z built",
            FramePhase::VisibilityTested => "visibility tested",
            FramePhase::Compacted => "compacted",
            FramePhase::StatsRead => "stats read",
        }
    }

    /// Phase that must precede `self`.
    fn predecessors(self) -> &'static [FramePhase] {
        match self {
            FramePhase::Idle => &[],
            // A new frame starts after the previous one finished (or from scratch).
            FramePhase::BoundsRefreshed => &[FramePhase::Idle, FramePhase::Compacted, FramePhase::StatsRead],
            FramePhase::HiZBuilt => &[FramePhase::BoundsRefreshed],
            FramePhase::VisibilityTested => &[FramePhase::HiZBuilt],
            FramePhase::Compacted => &[FramePhase::VisibilityTested],
            FramePhase::StatsRead => &[FramePhase::Compacted],
        }
    }
}

/// Enforces RefreshBounds -> BuildHiZ -> TestVisibility -> Compact -> (ReadStats).
#[derive(Debug)]
pub struct FrameTracker {
    phase: FramePhase,
}

impl Default for FrameTracker {
    fn default() -> Self {
        Self { phase: FramePhase::Idle }
    }
}

impl FrameTracker {
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Fails without changing the phase when `next` may not follow the current one.
    pub fn check(&self, next: FramePhase) -> Result<(), CullError> {
        if next.predecessors().contains(&self.phase) {
            Ok(())
        } else {
            Err(CullError::InvalidState { expected: next.name(), actual: self.phase.name() })
        }
    }

    pub fn advance(&mut self, next: FramePhase) -> Result<(), CullError> {
        self.check(next)?;
        self.phase = next;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.phase = FramePhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_in_order() {
        let mut t = FrameTracker::default();
        for p in [
            FramePhase::BoundsRefreshed,
            FramePhase::HiZBuilt,
            FramePhase::VisibilityTested,
            FramePhase::Compacted,
            FramePhase::StatsRead,
            FramePhase::BoundsRefreshed,
        ] {
            t.advance(p).unwrap();
        }
        assert_eq!(t.phase(), FramePhase::BoundsRefreshed);
    }

    #[test]
    fn stats_are_optional() {
        let mut t = FrameTracker::default();
        t.advance(FramePhase::BoundsRefreshed).unwrap();
        t.advance(FramePhase::HiZBuilt).unwrap();
        t.advance(FramePhase::VisibilityTested).unwrap();
        t.advance(FramePhase::Compacted).unwrap();
        t.advance(FramePhase::BoundsRefreshed).unwrap();
    }

    #[test]
    fn out_of_order_is_rejected() {
        let mut t = FrameTracker::default();
        assert!(matches!(t.advance(FramePhase::VisibilityTested), Err(CullError::InvalidState { .. })));
        t.advance(FramePhase::BoundsRefreshed).unwrap();
        assert!(t.advance(FramePhase::Compacted).is_err());
        assert_eq!(t.phase(), FramePhase::BoundsRefreshed);
    }

    #[test]
    fn engine_state_expect() {
        assert!(EngineState::Initialized.expect(EngineState::Initialized).is_ok());
        let err = EngineState::Disposed.expect(EngineState::Initialized).unwrap_err();
        assert_eq!(err.to_string(), "invalid state: expected initialized, engine is disposed");
    }
}
