use std::fmt;

/// Memory pressure reported by the host, from mildest to most severe.
///
/// Every memory tier reacts to the same levels: `RunningLow` and
/// `RunningCritical` halve what it holds, `Background` or worse drops
/// everything, and the remaining levels leave it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrimLevel {
  /// The process is running and the system is beginning to run low.
  RunningModerate,
  /// The process is running and the system is low on memory.
  RunningLow,
  /// The process is running and the system is critically low on memory.
  RunningCritical,
  /// The process UI is no longer visible.
  UiHidden,
  /// The process moved to the background.
  Background,
  /// The process is in the middle of the background kill list.
  Moderate,
  /// The process is next in line to be killed.
  Complete,
}

impl TrimLevel {
  /// Whether a tier should drop all of its contents.
  #[inline]
  pub fn should_clear(self) -> bool {
    self >= TrimLevel::Background
  }

  /// Whether a tier should shrink to half its current size.
  #[inline]
  pub fn should_halve(self) -> bool {
    (TrimLevel::RunningLow..TrimLevel::UiHidden).contains(&self)
  }
}

impl fmt::Display for TrimLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TrimLevel::RunningModerate => "running-moderate",
      TrimLevel::RunningLow => "running-low",
      TrimLevel::RunningCritical => "running-critical",
      TrimLevel::UiHidden => "ui-hidden",
      TrimLevel::Background => "background",
      TrimLevel::Moderate => "moderate",
      TrimLevel::Complete => "complete",
    };
    f.write_str(name)
  }
}

#[cfg(test)]
mod tests {
  use super::TrimLevel::*;

  #[test]
  fn halving_levels() {
    assert!(!RunningModerate.should_halve());
    assert!(RunningLow.should_halve());
    assert!(RunningCritical.should_halve());
    assert!(!UiHidden.should_halve());
    assert!(!Background.should_halve());
  }

  #[test]
  fn clearing_levels() {
    assert!(!UiHidden.should_clear());
    assert!(Background.should_clear());
    assert!(Moderate.should_clear());
    assert!(Complete.should_clear());
  }
}
