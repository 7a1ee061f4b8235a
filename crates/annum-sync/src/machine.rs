//! The per-owner sync state machine.
//!
//! ```text
//! Idle → Requesting → {Authorized | Denied | Restricted}
//! Authorized → Syncing → {Completed | Failed} → Idle
//! ```
//!
//! `Idle` remembers whether access was ever granted so that a later sync can
//! start from `Idle` without asking again.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::SyncError;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncPhase {
  #[default]
  Idle,
  Requesting,
  Authorized,
  /// Terminal until the permission is changed out of band.
  Denied,
  /// Terminal until the permission is changed out of band.
  Restricted,
  Syncing,
  Completed,
  Failed,
}

/// Inputs that drive [`SyncMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
  RequestAccess,
  /// Access granted, either by the prompt or observed out of band.
  AccessGranted,
  AccessDenied,
  AccessRestricted,
  BeginSync,
  SyncSucceeded,
  SyncFailed,
  /// Return to `Idle` after a finished pass.
  Settle,
  /// A prompt or pass was dropped before it finished.
  Abandon,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMachine {
  phase:      SyncPhase,
  authorized: bool,
}

impl SyncMachine {
  pub fn phase(&self) -> SyncPhase { self.phase }

  pub fn is_authorized(&self) -> bool { self.authorized }

  /// A sync may start from `Authorized`, or from `Idle` after a prior grant.
  pub fn can_sync(&self) -> bool {
    match self.phase {
      SyncPhase::Authorized => true,
      SyncPhase::Idle => self.authorized,
      _ => false,
    }
  }

  /// Apply `event`, returning the new phase or
  /// [`SyncError::InvalidTransition`] (leaving the machine unchanged).
  pub fn apply(&mut self, event: SyncEvent) -> Result<SyncPhase, SyncError> {
    use SyncEvent as E;
    use SyncPhase as P;

    let next = match (self.phase, event) {
      (P::Idle, E::RequestAccess) => P::Requesting,

      (P::Requesting | P::Idle | P::Denied | P::Restricted, E::AccessGranted) => {
        P::Authorized
      }
      (P::Authorized, E::AccessGranted) => P::Authorized,

      // Refusals may also be observed after a grant was revoked.
      (
        P::Requesting | P::Idle | P::Authorized | P::Denied | P::Restricted,
        E::AccessDenied,
      ) => P::Denied,
      (
        P::Requesting | P::Idle | P::Authorized | P::Denied | P::Restricted,
        E::AccessRestricted,
      ) => P::Restricted,

      (P::Authorized, E::BeginSync) => P::Syncing,
      (P::Idle, E::BeginSync) if self.authorized => P::Syncing,

      (P::Syncing, E::SyncSucceeded) => P::Completed,
      (P::Syncing, E::SyncFailed) => P::Failed,
      (P::Completed | P::Failed, E::Settle) => P::Idle,
      (P::Requesting | P::Syncing, E::Abandon) => P::Idle,

      (from, event) => {
        return Err(SyncError::InvalidTransition {
          from,
          event: event_name(event),
        });
      }
    };

    match event {
      E::AccessGranted => self.authorized = true,
      E::AccessDenied | E::AccessRestricted => self.authorized = false,
      _ => {}
    }
    self.phase = next;
    Ok(next)
  }
}

fn event_name(event: SyncEvent) -> &'static str {
  match event {
    SyncEvent::RequestAccess => "request access",
    SyncEvent::AccessGranted => "grant access",
    SyncEvent::AccessDenied => "deny access",
    SyncEvent::AccessRestricted => "restrict access",
    SyncEvent::BeginSync => "begin sync",
    SyncEvent::SyncSucceeded => "complete sync",
    SyncEvent::SyncFailed => "fail sync",
    SyncEvent::Settle => "settle",
    SyncEvent::Abandon => "abandon",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn run(events: &[SyncEvent]) -> SyncMachine {
    let mut m = SyncMachine::default();
    for e in events {
      m.apply(*e).unwrap();
    }
    m
  }

  #[test]
  fn grant_path_reaches_authorized() {
    let m = run(&[SyncEvent::RequestAccess, SyncEvent::AccessGranted]);
    assert_eq!(m.phase(), SyncPhase::Authorized);
    assert!(m.can_sync());
  }

  #[test]
  fn full_pass_returns_to_idle_still_authorized() {
    let m = run(&[
      SyncEvent::RequestAccess,
      SyncEvent::AccessGranted,
      SyncEvent::BeginSync,
      SyncEvent::SyncSucceeded,
      SyncEvent::Settle,
    ]);
    assert_eq!(m.phase(), SyncPhase::Idle);
    assert!(m.can_sync());
  }

  #[test]
  fn failed_pass_returns_to_idle() {
    let mut m = run(&[SyncEvent::AccessGranted, SyncEvent::BeginSync]);
    assert_eq!(m.apply(SyncEvent::SyncFailed).unwrap(), SyncPhase::Failed);
    assert_eq!(m.apply(SyncEvent::Settle).unwrap(), SyncPhase::Idle);
    assert!(m.can_sync());
  }

  #[test]
  fn denied_is_terminal_for_prompts() {
    let mut m = run(&[SyncEvent::RequestAccess, SyncEvent::AccessDenied]);
    assert_eq!(m.phase(), SyncPhase::Denied);
    assert!(!m.can_sync());

    let err = m.apply(SyncEvent::RequestAccess).unwrap_err();
    assert!(matches!(err, SyncError::InvalidTransition { from: SyncPhase::Denied, .. }));
    assert_eq!(m.phase(), SyncPhase::Denied);

    // An out-of-band change is observed as a grant.
    assert_eq!(m.apply(SyncEvent::AccessGranted).unwrap(), SyncPhase::Authorized);
  }

  #[test]
  fn cannot_sync_from_fresh_idle() {
    let mut m = SyncMachine::default();
    assert!(!m.can_sync());
    assert!(m.apply(SyncEvent::BeginSync).is_err());
  }

  #[test]
  fn cannot_begin_twice() {
    let mut m = run(&[SyncEvent::AccessGranted, SyncEvent::BeginSync]);
    assert!(m.apply(SyncEvent::BeginSync).is_err());
    assert_eq!(m.phase(), SyncPhase::Syncing);
  }

  #[test]
  fn abandoned_pass_keeps_authorization() {
    let mut m = run(&[SyncEvent::AccessGranted, SyncEvent::BeginSync]);
    assert_eq!(m.apply(SyncEvent::Abandon).unwrap(), SyncPhase::Idle);
    assert!(m.can_sync());

    let mut m = run(&[SyncEvent::RequestAccess]);
    assert_eq!(m.apply(SyncEvent::Abandon).unwrap(), SyncPhase::Idle);
    assert!(!m.can_sync());
  }

  #[test]
  fn restricted_clears_authorization() {
    let m = run(&[SyncEvent::AccessGranted, SyncEvent::AccessRestricted]);
    assert_eq!(m.phase(), SyncPhase::Restricted);
    assert!(!m.is_authorized());
  }
}
