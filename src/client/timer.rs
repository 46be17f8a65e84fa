// src/client/timer.rs

/// Why an advance was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    QuestionExpired,
    SectionExpired,
    TotalExpired,
    Manual,
}

impl AdvanceReason {
    /// Everything except a manual submission is an auto-submit.
    pub fn is_auto(self) -> bool {
        !matches!(self, AdvanceReason::Manual)
    }
}

/// The client's locally ticking countdowns.
///
/// Never authoritative: `reconcile` overwrites section and total with the
/// server's values on every poll. All expiry paths go through one one-shot
/// flag, so a question can produce at most one advance until the next
/// question is rendered with `begin_question` (or `rearm` after a failed
/// advance call).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerView {
    total: u64,
    section: u64,
    /// `None` while no question countdown is running.
    question: Option<u64>,
    armed: bool,
}

impl TimerView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the countdown of a freshly rendered question and arms the
    /// advance trigger.
    pub fn begin_question(&mut self, question_seconds: u64) {
        self.question = Some(question_seconds);
        self.armed = true;
    }

    /// Applies an authoritative poll result. Returns a reason when either
    /// server-side deadline has passed and the trigger is still armed.
    pub fn reconcile(&mut self, total_remaining: u64, section_remaining: u64) -> Option<AdvanceReason> {
        self.total = total_remaining;
        self.section = section_remaining;

        if total_remaining == 0 {
            self.fire(AdvanceReason::TotalExpired)
        } else if section_remaining == 0 {
            self.fire(AdvanceReason::SectionExpired)
        } else {
            None
        }
    }

    /// One local second. Section and total only change for display; the
    /// question countdown fires when it reaches zero.
    pub fn tick(&mut self) -> Option<AdvanceReason> {
        self.total = self.total.saturating_sub(1);
        self.section = self.section.saturating_sub(1);

        let question = self.question.as_mut()?;
        *question = question.saturating_sub(1);
        if *question == 0 {
            self.fire(AdvanceReason::QuestionExpired)
        } else {
            None
        }
    }

    /// A manual "next" from the test-taker.
    pub fn request_manual(&mut self) -> Option<AdvanceReason> {
        self.fire(AdvanceReason::Manual)
    }

    /// Re-arms after an advance call failed before reaching the server.
    pub fn rearm(&mut self) {
        self.armed = true;
    }

    /// Stops all local countdowns, e.g. once the session completed.
    pub fn stop(&mut self) {
        self.question = None;
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn total_remaining(&self) -> u64 {
        self.total
    }

    pub fn section_remaining(&self) -> u64 {
        self.section
    }

    pub fn question_remaining(&self) -> Option<u64> {
        self.question
    }

    /// `total | section | question` as `mm:ss`, `--:--` for no question timer.
    pub fn display(&self) -> String {
        format!(
            "{} | {} | {}",
            format_countdown(self.total),
            format_countdown(self.section),
            self.question
                .map(format_countdown)
                .unwrap_or_else(|| "--:--".to_string())
        )
    }

    fn fire(&mut self, reason: AdvanceReason) -> Option<AdvanceReason> {
        if !self.armed {
            return None;
        }
        self.armed = false;
        Some(reason)
    }
}

/// `mm:ss`, minutes not wrapped at an hour.
pub fn format_countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_overwrites_local_drift() {
        let mut view = TimerView::new();
        view.begin_question(30);
        view.reconcile(600, 120);

        // A suspended tab missed ticks; the next poll corrects both ways.
        view.tick();
        assert_eq!(view.total_remaining(), 599);
        assert_eq!(view.reconcile(540, 60), None);
        assert_eq!(view.total_remaining(), 540);
        assert_eq!(view.section_remaining(), 60);
    }

    #[test]
    fn server_deadline_fires_once() {
        let mut view = TimerView::new();
        view.begin_question(30);

        assert_eq!(view.reconcile(100, 0), Some(AdvanceReason::SectionExpired));
        assert_eq!(view.reconcile(99, 0), None);
        assert_eq!(view.reconcile(0, 0), None);

        view.begin_question(30);
        assert_eq!(view.reconcile(0, 5), Some(AdvanceReason::TotalExpired));
    }

    #[test]
    fn question_countdown_fires_at_zero() {
        let mut view = TimerView::new();
        view.reconcile(500, 500);
        view.begin_question(2);

        assert_eq!(view.tick(), None);
        assert_eq!(view.question_remaining(), Some(1));
        assert_eq!(view.tick(), Some(AdvanceReason::QuestionExpired));
        assert_eq!(view.tick(), None);
        assert_eq!(view.question_remaining(), Some(0));
    }

    #[test]
    fn racing_expiries_produce_one_trigger() {
        let mut view = TimerView::new();
        view.begin_question(1);

        let from_poll = view.reconcile(10, 0);
        let from_countdown = view.tick();
        let from_user = view.request_manual();

        let fired: Vec<_> = [from_poll, from_countdown, from_user]
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(fired, vec![AdvanceReason::SectionExpired]);
        assert!(!view.is_armed());
    }

    #[test]
    fn rearm_lets_expired_question_retry_on_next_tick() {
        let mut view = TimerView::new();
        view.begin_question(1);
        assert_eq!(view.tick(), Some(AdvanceReason::QuestionExpired));

        view.rearm();
        assert_eq!(view.tick(), Some(AdvanceReason::QuestionExpired));
    }

    #[test]
    fn nothing_fires_before_first_question() {
        let mut view = TimerView::new();
        assert_eq!(view.reconcile(0, 0), None);
        assert_eq!(view.tick(), None);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(75), "01:15");
        assert_eq!(format_countdown(3000), "50:00");

        let mut view = TimerView::new();
        view.reconcile(3000, 120);
        assert_eq!(view.display(), "50:00 | 02:00 | --:--");
    }
}
