use std::fmt;

/// Logical state of a device connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// The link dropped but the transport is trying to recover it
    DisconnectedRetrying,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::DisconnectedRetrying => "disconnected-retrying",
        };
        f.write_str(name)
    }
}

/// Connection state plus whether the user asked for the connection
/// to be open.
///
/// Transports may report `Connected` after the client closed or before
/// `open` returned. The open request decides whether such a report is
/// honored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub state: ConnectionState,
    pub open_requested: bool,
}

impl Lifecycle {
    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::DisconnectedRetrying
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    OpenRequested,
    OpenSucceeded,
    OpenFailed,
    CloseRequested,
    StatusChanged(ConnectionState),
}

/// Side effects the pump must carry out after a transition, in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    StartTasks,
    CancelTasks,
    CloseTransport,
}

/// Compute the next lifecycle for an event.
///
/// Effects are returned in the order they must be applied. Whenever new
/// periodic tasks are started while old ones may still exist, the old ones
/// are cancelled first.
pub fn transition(current: Lifecycle, event: Event) -> (Lifecycle, Vec<Effect>) {
    use ConnectionState::*;

    match event {
        Event::OpenRequested => (
            Lifecycle {
                open_requested: true,
                ..current
            },
            vec![],
        ),

        Event::OpenSucceeded => {
            let next = Lifecycle {
                state: Connected,
                open_requested: true,
            };
            match current.state {
                // the transport already reported the link as up
                Connected => (next, vec![]),
                Disconnected => (next, vec![Effect::StartTasks]),
                DisconnectedRetrying => (next, vec![Effect::CancelTasks, Effect::StartTasks]),
            }
        }

        Event::OpenFailed => {
            let next = Lifecycle {
                state: Disconnected,
                open_requested: false,
            };
            match current.state {
                Disconnected => (next, vec![]),
                _ => (next, vec![Effect::CancelTasks]),
            }
        }

        Event::CloseRequested => match current.state {
            Disconnected => (
                Lifecycle {
                    open_requested: false,
                    ..current
                },
                vec![],
            ),
            _ => (
                Lifecycle {
                    state: Disconnected,
                    open_requested: false,
                },
                vec![Effect::CancelTasks, Effect::CloseTransport],
            ),
        },

        Event::StatusChanged(Connected) => {
            if !current.open_requested {
                return (current, vec![]);
            }
            let next = Lifecycle {
                state: Connected,
                ..current
            };
            match current.state {
                Disconnected => (next, vec![Effect::StartTasks]),
                Connected | DisconnectedRetrying => {
                    (next, vec![Effect::CancelTasks, Effect::StartTasks])
                }
            }
        }

        Event::StatusChanged(DisconnectedRetrying) => match current.state {
            Connected => (
                Lifecycle {
                    state: DisconnectedRetrying,
                    ..current
                },
                vec![Effect::CancelTasks],
            ),
            Disconnected | DisconnectedRetrying => (current, vec![]),
        },

        Event::StatusChanged(Disconnected) => {
            let next = Lifecycle {
                state: Disconnected,
                open_requested: false,
            };
            match current.state {
                Disconnected => (next, vec![]),
                Connected | DisconnectedRetrying => (next, vec![Effect::CancelTasks]),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    fn lifecycle(state: ConnectionState, open_requested: bool) -> Lifecycle {
        Lifecycle {
            state,
            open_requested,
        }
    }

    #[test]
    fn initial_lifecycle_is_closed() {
        let initial = Lifecycle::default();
        assert_eq!(initial.state, Disconnected);
        assert!(!initial.open_requested);
        assert!(!initial.is_open());
    }

    #[test]
    fn retrying_counts_as_open() {
        assert!(lifecycle(Connected, true).is_open());
        assert!(lifecycle(DisconnectedRetrying, true).is_open());
        assert!(!lifecycle(Disconnected, true).is_open());
    }

    #[test]
    fn successful_open_starts_tasks() {
        let (next, effects) = transition(Lifecycle::default(), Event::OpenRequested);
        assert_eq!(next, lifecycle(Disconnected, true));
        assert!(effects.is_empty());

        let (next, effects) = transition(next, Event::OpenSucceeded);
        assert_eq!(next, lifecycle(Connected, true));
        assert_eq!(effects, vec![Effect::StartTasks]);
    }

    #[test]
    fn open_after_early_connected_report_does_not_restart_tasks() {
        let (next, effects) = transition(
            lifecycle(Disconnected, true),
            Event::StatusChanged(Connected),
        );
        assert_eq!(next, lifecycle(Connected, true));
        assert_eq!(effects, vec![Effect::StartTasks]);

        let (next, effects) = transition(next, Event::OpenSucceeded);
        assert_eq!(next, lifecycle(Connected, true));
        assert!(effects.is_empty());
    }

    #[test]
    fn failed_open_leaves_connection_closed() {
        let (next, effects) = transition(lifecycle(Disconnected, true), Event::OpenFailed);
        assert_eq!(next, lifecycle(Disconnected, false));
        assert!(effects.is_empty());

        let (next, effects) = transition(lifecycle(Connected, true), Event::OpenFailed);
        assert_eq!(next, lifecycle(Disconnected, false));
        assert_eq!(effects, vec![Effect::CancelTasks]);
    }

    #[test]
    fn close_cancels_tasks_and_closes_transport() {
        for state in [Connected, DisconnectedRetrying] {
            let (next, effects) = transition(lifecycle(state, true), Event::CloseRequested);
            assert_eq!(next, lifecycle(Disconnected, false));
            assert_eq!(effects, vec![Effect::CancelTasks, Effect::CloseTransport]);
        }
    }

    #[test]
    fn close_when_closed_is_a_no_op() {
        let (next, effects) = transition(Lifecycle::default(), Event::CloseRequested);
        assert_eq!(next, Lifecycle::default());
        assert!(effects.is_empty());
    }

    #[test]
    fn link_loss_cancels_tasks_but_stays_open() {
        let (next, effects) = transition(
            lifecycle(Connected, true),
            Event::StatusChanged(DisconnectedRetrying),
        );
        assert_eq!(next, lifecycle(DisconnectedRetrying, true));
        assert!(next.is_open());
        assert_eq!(effects, vec![Effect::CancelTasks]);
    }

    #[test]
    fn reconnect_cancels_stale_tasks_before_starting_new_ones() {
        let (next, effects) = transition(
            lifecycle(DisconnectedRetrying, true),
            Event::StatusChanged(Connected),
        );
        assert_eq!(next, lifecycle(Connected, true));
        assert_eq!(effects, vec![Effect::CancelTasks, Effect::StartTasks]);

        let (next, effects) = transition(
            lifecycle(Connected, true),
            Event::StatusChanged(Connected),
        );
        assert_eq!(next, lifecycle(Connected, true));
        assert_eq!(effects, vec![Effect::CancelTasks, Effect::StartTasks]);
    }

    #[test]
    fn late_connected_report_after_close_is_ignored() {
        let (next, effects) = transition(
            lifecycle(Disconnected, false),
            Event::StatusChanged(Connected),
        );
        assert_eq!(next, lifecycle(Disconnected, false));
        assert!(effects.is_empty());
    }

    #[test]
    fn retrying_report_while_closed_is_ignored() {
        let (next, effects) = transition(
            lifecycle(Disconnected, false),
            Event::StatusChanged(DisconnectedRetrying),
        );
        assert_eq!(next, lifecycle(Disconnected, false));
        assert!(effects.is_empty());
    }

    #[test]
    fn giving_up_retrying_disconnects_and_clears_the_open_request() {
        let (next, effects) = transition(
            lifecycle(DisconnectedRetrying, true),
            Event::StatusChanged(Disconnected),
        );
        assert_eq!(next, lifecycle(Disconnected, false));
        assert!(!next.is_open());
        assert_eq!(effects, vec![Effect::CancelTasks]);

        // a late connected report cannot resurrect the connection
        let (next, effects) = transition(next, Event::StatusChanged(Connected));
        assert_eq!(next, lifecycle(Disconnected, false));
        assert!(effects.is_empty());
    }
}
