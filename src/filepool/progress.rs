// Download Progress
//
// Frames reported while a file is downloaded and extracted, and the
// percentage shown to the user.

use serde::{Deserialize, Serialize};

/// Stage a download is in. Decides which total a byte count is measured against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadPhase {
    /// Transferring bytes, measured against the declared file size
    Download,
    /// Unpacking the package, measured against the total the extractor reports
    Extract,
    /// Any other stage announced by the pool
    Other(String),
}

impl DownloadPhase {
    /// Message key shown while in this phase
    pub fn message(&self) -> &str {
        match self {
            DownloadPhase::Download => "core.downloading",
            DownloadPhase::Extract => "core.unzipping",
            DownloadPhase::Other(message) => message,
        }
    }
}

/// Single frame reported by the file pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadProgress {
    Stage(DownloadPhase),
    Progress { loaded: u64, total: Option<u64> },
}

/// Percentage display for one download
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressDisplay {
    declared_size: Option<u64>,
    phase: DownloadPhase,
    percentage: Option<f64>,
}

impl ProgressDisplay {
    /// Start tracking a download of a file with the given declared size
    pub fn new(declared_size: Option<u64>) -> Self {
        Self {
            declared_size,
            phase: DownloadPhase::Download,
            percentage: None,
        }
    }

    /// Apply a frame. A percentage is kept only when the current phase has a
    /// definite, non-zero total and the value lies in [0, 100].
    pub fn apply(&mut self, frame: &DownloadProgress) {
        self.percentage = None;

        match frame {
            DownloadProgress::Stage(phase) => {
                self.phase = phase.clone();
            }
            DownloadProgress::Progress { loaded, total } => {
                let denominator = match self.phase {
                    DownloadPhase::Download => self.declared_size,
                    _ => *total,
                };

                if let Some(denominator) = denominator.filter(|d| *d > 0) {
                    let percentage = *loaded as f64 / denominator as f64 * 100.0;
                    if (0.0..=100.0).contains(&percentage) {
                        self.percentage = Some(percentage);
                    }
                }
            }
        }
    }

    pub fn phase(&self) -> &DownloadPhase {
        &self.phase
    }

    /// Percentage to display, if any
    pub fn percentage(&self) -> Option<f64> {
        self.percentage
    }

    /// Percentage formatted with one decimal, as displayed
    pub fn label(&self) -> Option<String> {
        self.percentage.map(|p| format!("{:.1}", p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(loaded: u64, total: Option<u64>) -> DownloadProgress {
        DownloadProgress::Progress { loaded, total }
    }

    #[test]
    fn test_download_phase_uses_declared_size() {
        let mut display = ProgressDisplay::new(Some(200));
        display.apply(&progress(50, Some(1000)));

        assert_eq!(display.percentage(), Some(25.0));
        assert_eq!(display.label().as_deref(), Some("25.0"));
    }

    #[test]
    fn test_extract_phase_uses_reported_total() {
        let mut display = ProgressDisplay::new(Some(200));
        display.apply(&DownloadProgress::Stage(DownloadPhase::Extract));
        assert_eq!(display.percentage(), None);

        display.apply(&progress(3, Some(4)));
        assert_eq!(display.percentage(), Some(75.0));
        assert_eq!(display.phase().message(), "core.unzipping");
    }

    #[test]
    fn test_indeterminate_totals_hide_percentage() {
        let mut display = ProgressDisplay::new(None);
        display.apply(&progress(50, Some(200)));
        assert_eq!(display.percentage(), None);

        let mut display = ProgressDisplay::new(Some(0));
        display.apply(&progress(50, None));
        assert_eq!(display.percentage(), None);

        let mut display = ProgressDisplay::new(Some(100));
        display.apply(&DownloadProgress::Stage(DownloadPhase::Extract));
        display.apply(&progress(10, None));
        assert_eq!(display.percentage(), None);
    }

    #[test]
    fn test_out_of_range_hides_percentage() {
        let mut display = ProgressDisplay::new(Some(100));
        display.apply(&progress(150, None));
        assert_eq!(display.percentage(), None);

        display.apply(&progress(100, None));
        assert_eq!(display.percentage(), Some(100.0));
    }

    #[test]
    fn test_stage_frame_clears_previous_percentage() {
        let mut display = ProgressDisplay::new(Some(100));
        display.apply(&progress(40, None));
        assert!(display.percentage().is_some());

        display.apply(&DownloadProgress::Stage(DownloadPhase::Other("core.storing".into())));
        assert_eq!(display.percentage(), None);
        assert_eq!(display.phase().message(), "core.storing");
    }
}
