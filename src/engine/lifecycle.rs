use crate::model::ReservationStatus;

use super::EngineError;

/// A status move requested by staff or the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Cancel,
    Complete,
    NoShow,
}

impl Transition {
    pub fn target(&self) -> ReservationStatus {
        match self {
            Transition::Confirm => ReservationStatus::Confirmed,
            Transition::Cancel => ReservationStatus::Cancelled,
            Transition::Complete => ReservationStatus::Completed,
            Transition::NoShow => ReservationStatus::NoShow,
        }
    }

    /// The transition that lands on `status`. Nothing moves a reservation
    /// back to pending.
    pub fn into_status(status: ReservationStatus) -> Option<Self> {
        match status {
            ReservationStatus::Pending => None,
            ReservationStatus::Confirmed => Some(Transition::Confirm),
            ReservationStatus::Cancelled => Some(Transition::Cancel),
            ReservationStatus::Completed => Some(Transition::Complete),
            ReservationStatus::NoShow => Some(Transition::NoShow),
        }
    }

    pub fn allowed_from(&self, from: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, from),
            (Transition::Confirm, Pending)
                | (Transition::Cancel, Pending | Confirmed)
                | (Transition::Complete, Confirmed)
                | (Transition::NoShow, Pending | Confirmed)
        )
    }
}

/// Next status, or a validation error on `status`.
pub fn advance(from: ReservationStatus, transition: Transition) -> Result<ReservationStatus, EngineError> {
    if transition.allowed_from(from) {
        return Ok(transition.target());
    }
    let message = if from.is_terminal() {
        format!("reservation is already {from}")
    } else {
        format!("cannot move a {from} reservation to {}", transition.target())
    };
    Err(EngineError::validation("status", message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReservationStatus::*;

    const ALL: [ReservationStatus; 5] = [Pending, Confirmed, Cancelled, Completed, NoShow];

    #[test]
    fn happy_path() {
        let s = advance(Pending, Transition::Confirm).unwrap();
        assert_eq!(s, Confirmed);
        assert_eq!(advance(s, Transition::Complete).unwrap(), Completed);
    }

    #[test]
    fn complete_requires_confirmed() {
        let err = advance(Pending, Transition::Complete).unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "status", .. }));
    }

    #[test]
    fn confirm_only_from_pending() {
        assert!(advance(Confirmed, Transition::Confirm).is_err());
        assert!(advance(Pending, Transition::Confirm).is_ok());
    }

    #[test]
    fn cancel_and_no_show_before_terminal() {
        for from in [Pending, Confirmed] {
            assert_eq!(advance(from, Transition::Cancel).unwrap(), Cancelled);
            assert_eq!(advance(from, Transition::NoShow).unwrap(), NoShow);
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        let transitions = [
            Transition::Confirm,
            Transition::Cancel,
            Transition::Complete,
            Transition::NoShow,
        ];
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for t in transitions {
                let err = advance(from, t).unwrap_err();
                assert!(err.to_string().contains("already"), "{from} -> {t:?}: {err}");
            }
        }
    }

    #[test]
    fn into_status_round_trips_targets() {
        assert_eq!(Transition::into_status(Pending), None);
        for status in ALL.into_iter().filter(|s| *s != Pending) {
            assert_eq!(Transition::into_status(status).map(|t| t.target()), Some(status));
        }
    }
}
