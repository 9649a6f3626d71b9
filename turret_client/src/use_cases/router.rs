// Routes decoded relay frames into the client's state sinks.

use crate::domain::{Clock, FrameSink};
use crate::interface_adapters::protocol::{FrameError, InboundFrame, decode_inbound_frame};
use tracing::{debug, info};

pub const DEFAULT_ROUND_END_SENTINEL: &str = "No loons left";

/// Recognizes the log message the telemetry feed sends when a round runs out of balloons.
#[derive(Debug, Clone)]
pub struct RoundEndMatcher {
    sentinel: Option<String>,
}

impl RoundEndMatcher {
    /// An empty sentinel disables matching.
    pub fn new(sentinel: impl Into<String>) -> Self {
        let sentinel = sentinel.into();
        Self {
            sentinel: (!sentinel.is_empty()).then_some(sentinel),
        }
    }

    pub fn disabled() -> Self {
        Self { sentinel: None }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.sentinel
            .as_deref()
            .is_some_and(|sentinel| text.contains(sentinel))
    }
}

impl Default for RoundEndMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ROUND_END_SENTINEL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    BalloonsReplaced { count: usize },
    MessageRecorded,
    RoundEnded,
    Ignored,
}

/// Stateless dispatcher: everything it learns goes into the sink it is handed.
pub struct ClientMessageRouter<C> {
    clock: C,
    round_end: RoundEndMatcher,
}

impl<C: Clock> ClientMessageRouter<C> {
    pub fn new(clock: C, round_end: RoundEndMatcher) -> Self {
        Self { clock, round_end }
    }

    pub fn route_text(&self, text: &str, sink: &dyn FrameSink) -> Result<RouteOutcome, FrameError> {
        let frame = decode_inbound_frame(text)?;
        Ok(self.route(frame, sink))
    }

    pub fn route(&self, frame: InboundFrame, sink: &dyn FrameSink) -> RouteOutcome {
        match frame {
            InboundFrame::BalloonState(balloons) => {
                let count = balloons.len();
                sink.replace_balloons(balloons);
                RouteOutcome::BalloonsReplaced { count }
            }
            InboundFrame::LogMessage(text) if self.round_end.matches(&text) => {
                info!(%text, "round ended");
                sink.round_ended(&text);
                RouteOutcome::RoundEnded
            }
            InboundFrame::LogMessage(text) => {
                debug!(%text, "message received");
                sink.push_message(self.clock.now_epoch_millis(), text);
                RouteOutcome::MessageRecorded
            }
            InboundFrame::Unrecognized(value) => {
                info!(frame = %value, "unrecognized frame; ignoring");
                RouteOutcome::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BalloonPosition;
    use crate::use_cases::test_support::{FixedClock, RecordingSink};

    fn router() -> ClientMessageRouter<FixedClock> {
        ClientMessageRouter::new(FixedClock::at(1_000), RoundEndMatcher::default())
    }

    #[test]
    fn when_loon_state_is_routed_then_balloons_are_replaced() {
        let sink = RecordingSink::default();

        let outcome = router()
            .route_text(
                r#"{"loonState":{"a":{"position_x":1,"position_y":2}}}"#,
                &sink,
            )
            .unwrap();

        assert_eq!(outcome, RouteOutcome::BalloonsReplaced { count: 1 });
        let balloons = sink.last_balloons().expect("balloons were replaced");
        let entries: Vec<&BalloonPosition> = balloons.iter().collect();
        assert_eq!(entries, vec![&BalloonPosition::new("a", 1.0, 2.0)]);
    }

    #[test]
    fn when_two_messages_arrive_then_history_is_most_recent_first() {
        let sink = RecordingSink::default();
        let router = router();

        router.route_text(r#"{"msg":{"msg":"hello"}}"#, &sink).unwrap();
        router.route_text(r#"{"msg":{"msg":"world"}}"#, &sink).unwrap();

        assert_eq!(sink.history_texts(), vec!["world", "hello"]);
    }

    #[test]
    fn when_message_is_recorded_then_clock_supplies_timestamp() {
        let sink = RecordingSink::default();

        router().route_text(r#"{"msg":{"msg":"tick"}}"#, &sink).unwrap();

        assert_eq!(sink.history_timestamps(), vec![1_000]);
    }

    #[test]
    fn when_sentinel_message_arrives_then_round_ends_without_history_entry() {
        let sink = RecordingSink::default();

        let outcome = router()
            .route_text(r#"{"msg":{"msg":"No loons left. Round over"}}"#, &sink)
            .unwrap();

        assert_eq!(outcome, RouteOutcome::RoundEnded);
        assert_eq!(sink.rounds_ended(), 1);
        assert!(sink.history_texts().is_empty());
    }

    #[test]
    fn when_sentinel_is_disabled_then_message_is_recorded() {
        let sink = RecordingSink::default();
        let router = ClientMessageRouter::new(FixedClock::at(5), RoundEndMatcher::new(""));

        let outcome = router
            .route_text(r#"{"msg":{"msg":"No loons left"}}"#, &sink)
            .unwrap();

        assert_eq!(outcome, RouteOutcome::MessageRecorded);
        assert_eq!(sink.rounds_ended(), 0);
    }

    #[test]
    fn when_frame_is_unrecognized_or_invalid_then_sink_is_untouched() {
        let sink = RecordingSink::default();
        let router = router();

        assert_eq!(
            router.route_text(r#"{"status":"ok"}"#, &sink).unwrap(),
            RouteOutcome::Ignored
        );
        assert!(router.route_text("not json", &sink).is_err());
        assert!(sink.last_balloons().is_none());
        assert!(sink.history_texts().is_empty());
    }
}
