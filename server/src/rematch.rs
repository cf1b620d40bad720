//! Rematch negotiation for a finished session.
//!
//! One answer slot per seat plus a deadline; the session task records
//! answers as they arrive and folds the slots into a decision when
//! everybody answered or the deadline passed, whichever comes first.

use tokio::time::{Duration, Instant};

use shared::Seat;

/// How a finished session's pairing resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchDecision {
    /// Both seats said yes: the same two connections start a new session.
    BothYes,
    /// Only this seat said yes; it goes back to the matchmaking queue.
    OneYes(Seat),
    /// Nobody said yes (explicitly, silently, or by disconnecting).
    NoneYes,
}

/// Answer slots for one ended session. Seats that were already gone when
/// negotiation started are seeded with an implicit "no".
#[derive(Debug)]
pub struct RematchCoordinator {
    answers: [Option<bool>; 2],
    deadline: Instant,
}

impl RematchCoordinator {
    pub fn new(connected: [bool; 2], timeout: Duration) -> RematchCoordinator {
        let seed = |up: bool| if up { None } else { Some(false) };
        RematchCoordinator {
            answers: [seed(connected[0]), seed(connected[1])],
            deadline: Instant::now() + timeout,
        }
    }

    /// When negotiation gives up and unanswered seats become "no".
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// True while `seat` may still deliver an answer.
    pub fn awaiting(&self, seat: Seat) -> bool {
        self.answers[(seat - 1) as usize].is_none()
    }

    /// Records `seat`'s answer. Only the first answer counts; later ones
    /// are ignored.
    pub fn record_answer(&mut self, seat: Seat, answer: bool) {
        let slot = &mut self.answers[(seat - 1) as usize];
        if slot.is_none() {
            *slot = Some(answer);
        }
    }

    /// True once no seat is awaited anymore.
    pub fn resolved(&self) -> bool {
        self.answers.iter().all(Option::is_some)
    }

    /// Folds the slots into a decision; a missing answer counts as "no",
    /// which is how deadline expiry resolves silent seats.
    pub fn decision(&self) -> RematchDecision {
        let first = self.answers[0].unwrap_or(false);
        let second = self.answers[1].unwrap_or(false);
        match (first, second) {
            (true, true) => RematchDecision::BothYes,
            (true, false) => RematchDecision::OneYes(1),
            (false, true) => RematchDecision::OneYes(2),
            (false, false) => RematchDecision::NoneYes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> RematchCoordinator {
        RematchCoordinator::new([true, true], Duration::from_secs(30))
    }

    #[test]
    fn test_both_yes() {
        let mut pending = coordinator();
        pending.record_answer(1, true);
        assert!(!pending.resolved());
        pending.record_answer(2, true);
        assert!(pending.resolved());
        assert_eq!(pending.decision(), RematchDecision::BothYes);
    }

    #[test]
    fn test_one_yes_each_side() {
        let mut pending = coordinator();
        pending.record_answer(1, true);
        pending.record_answer(2, false);
        assert_eq!(pending.decision(), RematchDecision::OneYes(1));

        let mut pending = coordinator();
        pending.record_answer(1, false);
        pending.record_answer(2, true);
        assert_eq!(pending.decision(), RematchDecision::OneYes(2));
    }

    #[test]
    fn test_none_yes() {
        let mut pending = coordinator();
        pending.record_answer(1, false);
        pending.record_answer(2, false);
        assert_eq!(pending.decision(), RematchDecision::NoneYes);
    }

    #[test]
    fn test_silence_counts_as_no() {
        let mut pending = coordinator();
        pending.record_answer(1, true);
        // Deadline passes with seat 2 silent; the yes seat still wins the
        // requeue path.
        assert!(!pending.resolved());
        assert_eq!(pending.decision(), RematchDecision::OneYes(1));
    }

    #[test]
    fn test_disconnected_seat_is_preseeded_no() {
        let mut pending = RematchCoordinator::new([true, false], Duration::from_secs(30));
        assert!(!pending.awaiting(2));
        assert!(!pending.resolved());
        pending.record_answer(1, true);
        assert!(pending.resolved());
        assert_eq!(pending.decision(), RematchDecision::OneYes(1));
    }

    #[test]
    fn test_first_answer_wins() {
        let mut pending = coordinator();
        pending.record_answer(1, true);
        pending.record_answer(1, false);
        pending.record_answer(2, true);
        assert_eq!(pending.decision(), RematchDecision::BothYes);
    }

    #[test]
    fn test_nobody_connected_resolves_immediately() {
        let pending = RematchCoordinator::new([false, false], Duration::from_secs(30));
        assert!(pending.resolved());
        assert_eq!(pending.decision(), RematchDecision::NoneYes);
    }
}
