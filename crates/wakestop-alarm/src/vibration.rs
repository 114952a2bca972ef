use serde::{Deserialize, Serialize};

/// Vibration request in milliseconds: a single duration, or alternating
/// on/off segments starting with "on".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VibrationPattern(Vec<u32>);

impl Default for VibrationPattern {
    fn default() -> Self {
        Self(vec![400, 200, 400])
    }
}

impl VibrationPattern {
    pub fn single(ms: u32) -> Self {
        Self(vec![ms])
    }

    pub fn sequence(segments: Vec<u32>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    /// Nothing to do: empty, or every "on" segment is zero.
    pub fn is_noop(&self) -> bool {
        self.0.iter().step_by(2).all(|&ms| ms == 0)
    }

    pub fn total_ms(&self) -> u64 {
        self.0.iter().map(|&ms| u64::from(ms)).sum()
    }
}
