/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt::Display;

pub type ChangeId = u64;

/// Composite state for entities backed directly by the IMAP mailbox.
/// Ordering is lexicographic over (uid_validity, uid_next, modseq),
/// which is exactly the declaration order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MailState {
    pub uid_validity: u32,
    pub uid_next: u32,
    pub modseq: u64,
}

/// A per-(account, entity type) state token. Server-owned entities use
/// a plain monotonic counter; IMAP-backed entities use the composite
/// triple, polled from the backend rather than assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Scalar(ChangeId),
    Mail(MailState),
}

/// Which token shape a given entity type uses. Wire tokens are always
/// strings; the shape directs how the string is parsed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateShape {
    Scalar,
    Mail,
}

impl MailState {
    pub fn new(uid_validity: u32, uid_next: u32, modseq: u64) -> Self {
        MailState {
            uid_validity,
            uid_next,
            modseq,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let mut it = value.split(',');
        let state = MailState {
            uid_validity: it.next()?.parse().ok()?,
            uid_next: it.next()?.parse().ok()?,
            modseq: it.next()?.parse().ok()?,
        };
        if it.next().is_none() {
            Some(state)
        } else {
            None
        }
    }
}

impl State {
    pub fn parse(value: &str, shape: StateShape) -> Option<Self> {
        match shape {
            StateShape::Scalar => value.parse::<ChangeId>().ok().map(State::Scalar),
            StateShape::Mail => MailState::parse(value).map(State::Mail),
        }
    }

    pub fn shape(&self) -> StateShape {
        match self {
            State::Scalar(_) => StateShape::Scalar,
            State::Mail(_) => StateShape::Mail,
        }
    }

    pub fn as_scalar(&self) -> Option<ChangeId> {
        match self {
            State::Scalar(id) => Some(*id),
            State::Mail(_) => None,
        }
    }

    pub fn as_mail(&self) -> Option<MailState> {
        match self {
            State::Mail(state) => Some(*state),
            State::Scalar(_) => None,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::Scalar(0)
    }
}

impl From<ChangeId> for State {
    fn from(change_id: ChangeId) -> Self {
        State::Scalar(change_id)
    }
}

impl From<MailState> for State {
    fn from(state: MailState) -> Self {
        State::Mail(state)
    }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Scalar(id) => write!(f, "{id}"),
            State::Mail(state) => write!(
                f,
                "{},{},{}",
                state.uid_validity, state.uid_next, state.modseq
            ),
        }
    }
}

impl serde::Serialize for State {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{MailState, State, StateShape};

    #[test]
    fn state_round_trip() {
        for state in [
            State::Scalar(0),
            State::Scalar(12345678),
            State::Scalar(u64::MAX),
            State::Mail(MailState::new(1, 1, 1)),
            State::Mail(MailState::new(167782, 4822, 90000)),
            State::Mail(MailState::new(u32::MAX, u32::MAX, u64::MAX)),
        ] {
            assert_eq!(
                State::parse(&state.to_string(), state.shape()),
                Some(state)
            );
        }
    }

    #[test]
    fn state_rejects_wrong_shape() {
        assert_eq!(State::parse("1,1,1", StateShape::Scalar), None);
        assert_eq!(State::parse("42", StateShape::Mail), None);
        assert_eq!(State::parse("1,1", StateShape::Mail), None);
        assert_eq!(State::parse("1,1,1,1", StateShape::Mail), None);
        assert_eq!(State::parse("a,b,c", StateShape::Mail), None);
        assert_eq!(State::parse("-1", StateShape::Scalar), None);
        assert_eq!(State::parse("", StateShape::Scalar), None);
    }

    #[test]
    fn mail_state_lexicographic_order() {
        let older = MailState::new(10, 100, 900);
        assert!(older < MailState::new(11, 0, 0));
        assert!(older < MailState::new(10, 101, 0));
        assert!(older < MailState::new(10, 100, 901));
        assert!(older == MailState::new(10, 100, 900));
    }
}
