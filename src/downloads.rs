#![allow(dead_code)]

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Starting,
    Downloading,
    Completed,
    Cancelled,
    Interrupted,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Cancelled | DownloadState::Interrupted
        )
    }
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: Uuid,
    pub filename: String,
    pub received: u64,
    /// Unknown until the transport reports it.
    pub total: Option<u64>,
    pub state: DownloadState,
}

impl DownloadJob {
    /// Defined only when the total is known and non-zero.
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(total) if total > 0 => {
                Some(((self.received as f64 / total as f64) * 100.0) as u8)
            }
            _ => None,
        }
    }

    pub fn progress_text(&self) -> String {
        match self.state {
            DownloadState::Starting => "Starting download...".to_string(),
            DownloadState::Downloading => {
                let received_mb = self.received as f64 / (1024.0 * 1024.0);
                match self.percent() {
                    Some(percent) => {
                        let total_mb = self.total.unwrap_or(0) as f64 / (1024.0 * 1024.0);
                        format!(
                            "Downloading... {:.1} MB / {:.1} MB ({}%)",
                            received_mb, total_mb, percent
                        )
                    }
                    None => format!("Downloading... {:.1} MB", received_mb),
                }
            }
            DownloadState::Completed => "Completed".to_string(),
            DownloadState::Cancelled => "Cancelled".to_string(),
            DownloadState::Interrupted => "Failed - Connection interrupted".to_string(),
        }
    }
}

/// Tracks page downloads reported by the renderer. Jobs stay listed after
/// they finish until swept or removed, so the user can still see what
/// happened.
#[derive(Default)]
pub struct DownloadTracker {
    jobs: Vec<DownloadJob>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, filename: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.push(DownloadJob {
            id,
            filename: filename.to_string(),
            received: 0,
            total: None,
            state: DownloadState::Starting,
        });
        id
    }

    /// Progress update from the transport. Re-enters Downloading on every
    /// call; updates against a terminal job are ignored.
    pub fn update(&mut self, id: Uuid, received: u64, total: Option<u64>) {
        if let Some(job) = self.job_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            job.state = DownloadState::Downloading;
            job.received = received;
            if total.is_some() {
                job.total = total;
            }
        }
    }

    pub fn finish(&mut self, id: Uuid) {
        if let Some(job) = self.job_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            if let Some(total) = job.total {
                job.received = total;
            }
            job.state = DownloadState::Completed;
        }
    }

    /// Externally-driven transition, e.g. the user cancelling at the
    /// transport layer. Valid from any non-terminal state.
    pub fn cancel(&mut self, id: Uuid) {
        self.terminate(id, DownloadState::Cancelled);
    }

    pub fn interrupt(&mut self, id: Uuid) {
        self.terminate(id, DownloadState::Interrupted);
    }

    fn terminate(&mut self, id: Uuid, state: DownloadState) {
        if let Some(job) = self.job_mut(id) {
            if job.state.is_terminal() {
                return;
            }
            job.state = state;
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&DownloadJob> {
        self.jobs.iter().find(|job| job.id == id)
    }

    fn job_mut(&mut self, id: Uuid) -> Option<&mut DownloadJob> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    pub fn jobs(&self) -> &[DownloadJob] {
        &self.jobs
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Removes Completed jobs only; cancelled and interrupted jobs stay
    /// visible until removed individually.
    pub fn clear_completed(&mut self) {
        self.jobs.retain(|job| job.state != DownloadState::Completed);
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.id != id);
        self.jobs.len() != before
    }

    pub fn active_count(&self) -> usize {
        self.jobs.iter().filter(|job| !job.state.is_terminal()).count()
    }

    /// Aggregate percent across active jobs with known totals; None when no
    /// active job has a known total.
    pub fn overall_percent(&self) -> Option<u8> {
        let mut received: u64 = 0;
        let mut total: u64 = 0;
        for job in &self.jobs {
            if job.state.is_terminal() {
                continue;
            }
            if let Some(job_total) = job.total {
                if job_total > 0 {
                    received += job.received;
                    total += job_total;
                }
            }
        }
        if total > 0 {
            Some(((received as f64 / total as f64) * 100.0) as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_to_completed() {
        let mut tracker = DownloadTracker::new();
        let id = tracker.begin("report.pdf");
        assert_eq!(tracker.get(id).unwrap().state, DownloadState::Starting);

        tracker.update(id, 512, Some(1024));
        assert_eq!(tracker.get(id).unwrap().state, DownloadState::Downloading);
        assert_eq!(tracker.get(id).unwrap().percent(), Some(50));

        tracker.finish(id);
        let job = tracker.get(id).unwrap();
        assert_eq!(job.state, DownloadState::Completed);
        assert_eq!(job.percent(), Some(100));
    }

    #[test]
    fn test_percent_undefined_without_total() {
        let mut tracker = DownloadTracker::new();
        let id = tracker.begin("blob.bin");
        tracker.update(id, 4096, None);
        assert_eq!(tracker.get(id).unwrap().percent(), None);
        assert!(tracker
            .get(id)
            .unwrap()
            .progress_text()
            .starts_with("Downloading..."));
    }

    #[test]
    fn test_percent_monotonic_across_updates() {
        let mut tracker = DownloadTracker::new();
        let id = tracker.begin("iso.img");
        let mut last = 0;
        for received in [100u64, 250, 400, 900, 1000] {
            tracker.update(id, received, Some(1000));
            let percent = tracker.get(id).unwrap().percent().unwrap();
            assert!(percent >= last);
            last = percent;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut tracker = DownloadTracker::new();
        let id = tracker.begin("a.zip");
        tracker.update(id, 10, Some(100));
        tracker.cancel(id);
        assert_eq!(tracker.get(id).unwrap().state, DownloadState::Cancelled);

        // Late updates and transitions must not resurrect the job.
        tracker.update(id, 90, Some(100));
        tracker.finish(id);
        tracker.interrupt(id);
        let job = tracker.get(id).unwrap();
        assert_eq!(job.state, DownloadState::Cancelled);
        assert_eq!(job.received, 10);
    }

    #[test]
    fn test_cancel_straight_from_starting() {
        let mut tracker = DownloadTracker::new();
        let id = tracker.begin("b.zip");
        tracker.cancel(id);
        assert_eq!(tracker.get(id).unwrap().state, DownloadState::Cancelled);
    }

    #[test]
    fn test_clear_completed_keeps_cancelled_and_interrupted() {
        let mut tracker = DownloadTracker::new();
        let done = tracker.begin("done.txt");
        let cancelled = tracker.begin("cancelled.txt");
        let interrupted = tracker.begin("interrupted.txt");
        let running = tracker.begin("running.txt");

        tracker.finish(done);
        tracker.cancel(cancelled);
        tracker.interrupt(interrupted);
        tracker.update(running, 1, Some(10));

        tracker.clear_completed();

        assert!(tracker.get(done).is_none());
        assert!(tracker.get(cancelled).is_some());
        assert!(tracker.get(interrupted).is_some());
        assert!(tracker.get(running).is_some());
    }

    #[test]
    fn test_individual_removal() {
        let mut tracker = DownloadTracker::new();
        let id = tracker.begin("c.zip");
        tracker.interrupt(id);
        assert!(tracker.remove(id));
        assert!(!tracker.remove(id));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_overall_percent_skips_unknown_totals() {
        let mut tracker = DownloadTracker::new();
        let known = tracker.begin("known.bin");
        let unknown = tracker.begin("unknown.bin");
        let finished = tracker.begin("finished.bin");

        tracker.update(known, 50, Some(100));
        tracker.update(unknown, 500, None);
        tracker.update(finished, 100, Some(100));
        tracker.finish(finished);

        assert_eq!(tracker.overall_percent(), Some(50));
        assert_eq!(tracker.active_count(), 2);
    }

    #[test]
    fn test_overall_percent_indeterminate_without_totals() {
        let mut tracker = DownloadTracker::new();
        let id = tracker.begin("x.bin");
        tracker.update(id, 10, None);
        assert_eq!(tracker.overall_percent(), None);
    }
}
