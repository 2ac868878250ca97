use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use attendly_core::errors::InterfaceError;

use crate::blocks::interface_error_notice;
use crate::events::{
    EventContext, EventDispatcher, HandlerResult, Reply, SlackEnvelope, SlackEventType,
};
use crate::web::{deliver, SlackWebApi};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngressError {
    #[error("ingress queue is full")]
    QueueFull,
    #[error("ingress queue is closed")]
    QueueClosed,
    #[error("transport read failed: {0}")]
    Receive(String),
}

/// Source of inbound envelopes. `Ok(None)` means the stream is finished.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, IngressError>;
}

/// Producer half handed to the HTTP ingress. Enqueueing never waits, so the
/// request can be acknowledged right away.
#[derive(Clone)]
pub struct IngressSender {
    tx: mpsc::Sender<SlackEnvelope>,
}

impl IngressSender {
    pub fn enqueue(&self, envelope: SlackEnvelope) -> Result<(), IngressError> {
        self.tx.try_send(envelope).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => IngressError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IngressError::QueueClosed,
        })
    }
}

pub struct QueuedTransport {
    rx: Mutex<mpsc::Receiver<SlackEnvelope>>,
}

#[async_trait]
impl EventTransport for QueuedTransport {
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, IngressError> {
        Ok(self.rx.lock().await.recv().await)
    }
}

/// The queue closes once every `IngressSender` clone is dropped.
pub fn ingress_queue(capacity: usize) -> (IngressSender, QueuedTransport) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IngressSender { tx }, QueuedTransport { rx: Mutex::new(rx) })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub received: usize,
    pub replied: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerOutcome {
    Replied,
    Quiet,
    Failed,
    TimedOut,
}

pub struct IngressRunner {
    transport: Arc<dyn EventTransport>,
    dispatcher: Arc<EventDispatcher>,
    web: Arc<dyn SlackWebApi>,
    bot_user_id: Option<String>,
    worker_timeout: Duration,
}

impl IngressRunner {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        dispatcher: EventDispatcher,
        web: Arc<dyn SlackWebApi>,
        worker_timeout: Duration,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), web, bot_user_id: None, worker_timeout }
    }

    pub fn with_bot_user_id(mut self, bot_user_id: Option<String>) -> Self {
        self.bot_user_id = bot_user_id;
        self
    }

    /// Pumps envelopes until the transport is exhausted, one worker per
    /// envelope, then waits for the in-flight workers.
    pub async fn run(&self) -> Result<RunSummary, IngressError> {
        let mut summary = RunSummary::default();
        let mut workers = JoinSet::new();

        info!(event_name = "ingress.runner.started", "ingress runner started");
        while let Some(envelope) = self.transport.next_envelope().await? {
            summary.received += 1;
            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                "received slack envelope"
            );

            if envelope.event.event_type() == SlackEventType::Unsupported {
                debug!(envelope_id = %envelope.envelope_id, "unsupported event type; not spawning worker");
                continue;
            }

            let context = EventContext {
                correlation_id: envelope.envelope_id.clone(),
                bot_user_id: self.bot_user_id.clone(),
            };
            workers.spawn(run_worker(
                self.dispatcher.clone(),
                self.web.clone(),
                envelope,
                context,
                self.worker_timeout,
            ));

            while let Some(finished) = workers.try_join_next() {
                record(&mut summary, finished);
            }
        }

        info!(
            event_name = "ingress.runner.draining",
            in_flight = workers.len(),
            "transport closed; waiting for in-flight workers"
        );
        while let Some(finished) = workers.join_next().await {
            record(&mut summary, finished);
        }

        info!(
            event_name = "ingress.runner.stopped",
            received = summary.received,
            replied = summary.replied,
            failed = summary.failed,
            timed_out = summary.timed_out,
            "ingress runner stopped"
        );
        Ok(summary)
    }
}

fn record(summary: &mut RunSummary, finished: Result<WorkerOutcome, tokio::task::JoinError>) {
    match finished {
        Ok(WorkerOutcome::Replied) => summary.replied += 1,
        Ok(WorkerOutcome::Quiet) => {}
        Ok(WorkerOutcome::Failed) => summary.failed += 1,
        Ok(WorkerOutcome::TimedOut) => summary.timed_out += 1,
        Err(join_error) => {
            error!(event_name = "ingress.worker.panicked", error = %join_error, "event worker panicked");
            summary.failed += 1;
        }
    }
}

async fn run_worker(
    dispatcher: Arc<EventDispatcher>,
    web: Arc<dyn SlackWebApi>,
    envelope: SlackEnvelope,
    context: EventContext,
    deadline: Duration,
) -> WorkerOutcome {
    let dispatched = tokio::time::timeout(deadline, dispatcher.dispatch(&envelope, &context)).await;

    match dispatched {
        Ok(Ok(HandlerResult::Responded(reply))) => {
            if let Err(transport_error) = deliver(web.as_ref(), &reply).await {
                warn!(
                    event_name = "slack.reply.failed",
                    correlation_id = %context.correlation_id,
                    channel_id = %reply.channel_id,
                    error = %transport_error,
                    "failed to post reply; event dropped"
                );
                return WorkerOutcome::Failed;
            }
            WorkerOutcome::Replied
        }
        Ok(Ok(HandlerResult::Processed | HandlerResult::Ignored)) => WorkerOutcome::Quiet,
        Ok(Err(dispatch_error)) => {
            error!(
                event_name = "ingress.worker.failed",
                correlation_id = %context.correlation_id,
                event_type = ?envelope.event.event_type(),
                error = %dispatch_error,
                "event handler failed"
            );
            let notice = InterfaceError::ServiceUnavailable {
                message: dispatch_error.to_string(),
                correlation_id: context.correlation_id.clone(),
            };
            notify_failure(web.as_ref(), &envelope, &notice).await;
            WorkerOutcome::Failed
        }
        Err(_) => {
            warn!(
                event_name = "ingress.worker.timed_out",
                correlation_id = %context.correlation_id,
                event_type = ?envelope.event.event_type(),
                deadline_secs = deadline.as_secs(),
                "event worker exceeded its deadline; event dropped"
            );
            WorkerOutcome::TimedOut
        }
    }
}

async fn notify_failure(web: &dyn SlackWebApi, envelope: &SlackEnvelope, notice: &InterfaceError) {
    let Some((channel_id, user_id)) = envelope.event.reply_target() else {
        return;
    };
    let reply = Reply::ephemeral(channel_id, user_id, interface_error_notice(notice));
    if let Err(transport_error) = deliver(web, &reply).await {
        warn!(
            event_name = "slack.reply.failed",
            correlation_id = %notice.correlation_id(),
            error = %transport_error,
            "failed to post failure notice"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{ingress_queue, EventTransport, IngressError, IngressRunner, RunSummary};
    use crate::blocks::MessageTemplate;
    use crate::commands::{
        AnalyticsCommandService, CommandReply, CommandRouteError, QueryCommand, SlashCommandPayload,
    };
    use crate::events::{
        ChannelMessageHandler, EventContext, EventDispatcher, EventHandlerError,
        LeaveMessageService, MessageEvent, Reply, SlackEnvelope, SlackEvent, SlashCommandHandler,
    };
    use crate::web::{SlackWebApi, TransportError};

    #[derive(Default)]
    struct ScriptedTransport {
        envelopes: Mutex<VecDeque<Result<Option<SlackEnvelope>, IngressError>>>,
    }

    impl ScriptedTransport {
        fn with_script(envelopes: Vec<Result<Option<SlackEnvelope>, IngressError>>) -> Self {
            Self { envelopes: Mutex::new(envelopes.into()) }
        }
    }

    #[async_trait]
    impl EventTransport for ScriptedTransport {
        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, IngressError> {
            self.envelopes.lock().await.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct RecordingApi {
        posts: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingApi {
        fn posts(&self) -> Vec<String> {
            self.posts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl SlackWebApi for RecordingApi {
        async fn post_message(
            &self,
            channel_id: &str,
            message: &MessageTemplate,
        ) -> Result<(), TransportError> {
            self.posts.lock().expect("lock").push(format!("{channel_id}:{}", message.fallback_text));
            Ok(())
        }

        async fn post_ephemeral(
            &self,
            channel_id: &str,
            user_id: &str,
            message: &MessageTemplate,
        ) -> Result<(), TransportError> {
            self.posts
                .lock()
                .expect("lock")
                .push(format!("{channel_id}/{user_id}:{}", message.fallback_text));
            Ok(())
        }

        async fn user_name(&self, user_id: &str) -> Result<String, TransportError> {
            Ok(user_id.to_owned())
        }

        async fn bot_user_id(&self) -> Result<String, TransportError> {
            Ok("UBOT".to_owned())
        }
    }

    struct EchoLeaveService {
        delay: Duration,
    }

    #[async_trait]
    impl LeaveMessageService for EchoLeaveService {
        async fn handle_leave_message(
            &self,
            event: &MessageEvent,
            _ctx: &EventContext,
        ) -> Result<Option<Reply>, EventHandlerError> {
            tokio::time::sleep(self.delay).await;
            Ok(Some(Reply::channel(&event.channel_id, MessageTemplate::text(format!("ok {}", event.text)))))
        }
    }

    struct FailingAnalytics;

    #[async_trait]
    impl AnalyticsCommandService for FailingAnalytics {
        async fn answer(&self, _command: &QueryCommand) -> Result<CommandReply, CommandRouteError> {
            Err(CommandRouteError::Service("database is locked".to_owned()))
        }
    }

    fn message_envelope(id: &str, text: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: id.to_owned(),
            event: SlackEvent::ChannelMessage(MessageEvent {
                channel_id: "C1".to_owned(),
                user_id: Some("U1".to_owned()),
                text: text.to_owned(),
                ts: format!("1710000000.{id}"),
                ..MessageEvent::default()
            }),
        }
    }

    fn dispatcher(delay: Duration) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(ChannelMessageHandler::new(EchoLeaveService { delay }));
        dispatcher.register(SlashCommandHandler::new(FailingAnalytics, "/query"));
        dispatcher
    }

    #[tokio::test]
    async fn every_envelope_gets_a_worker_and_replies_are_posted() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(Some(message_envelope("1", "wfh"))),
            Ok(Some(SlackEnvelope {
                envelope_id: "2".to_owned(),
                event: SlackEvent::Unsupported { event_type: "reaction_added".to_owned() },
            })),
            Ok(Some(message_envelope("3", "late"))),
            Ok(None),
        ]));
        let api = Arc::new(RecordingApi::default());

        let summary = IngressRunner::new(transport, dispatcher(Duration::ZERO), api.clone(), Duration::from_secs(5))
            .run()
            .await
            .expect("run");

        assert_eq!(summary, RunSummary { received: 3, replied: 2, failed: 0, timed_out: 0 });
        let mut posts = api.posts();
        posts.sort();
        assert_eq!(posts, vec!["C1:ok late".to_owned(), "C1:ok wfh".to_owned()]);
    }

    #[tokio::test]
    async fn handler_errors_send_a_generic_private_notice() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(Some(SlackEnvelope {
            envelope_id: "req-7".to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: "/query".to_owned(),
                text: "top".to_owned(),
                channel_id: "C2".to_owned(),
                user_id: "U2".to_owned(),
                trigger_id: String::new(),
                request_id: "req-7".to_owned(),
            }),
        }))]));
        let api = Arc::new(RecordingApi::default());

        let summary = IngressRunner::new(transport, dispatcher(Duration::ZERO), api.clone(), Duration::from_secs(5))
            .run()
            .await
            .expect("run");

        assert_eq!(summary.failed, 1);
        let posts = api.posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].starts_with("C2/U2:❌ Sorry, I couldn't process that"));
        assert!(!posts[0].contains("database is locked"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_workers_are_dropped_at_the_deadline() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(Some(message_envelope(
            "9", "wfh",
        )))]));
        let api = Arc::new(RecordingApi::default());

        let summary = IngressRunner::new(
            transport,
            dispatcher(Duration::from_secs(600)),
            api.clone(),
            Duration::from_secs(90),
        )
        .run()
        .await
        .expect("run");

        assert_eq!(summary.timed_out, 1);
        assert!(api.posts().is_empty());
    }

    #[tokio::test]
    async fn transport_errors_stop_the_runner() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Err(IngressError::Receive(
            "socket reset".to_owned(),
        ))]));
        let result = IngressRunner::new(
            transport,
            EventDispatcher::new(),
            Arc::new(RecordingApi::default()),
            Duration::from_secs(1),
        )
        .run()
        .await;
        assert_eq!(result, Err(IngressError::Receive("socket reset".to_owned())));
    }

    #[tokio::test]
    async fn queue_closes_when_senders_drop() {
        let (sender, transport) = ingress_queue(2);
        sender.enqueue(message_envelope("1", "wfh")).expect("enqueue");
        sender.enqueue(message_envelope("2", "wfh")).expect("enqueue");
        assert_eq!(sender.enqueue(message_envelope("3", "wfh")), Err(IngressError::QueueFull));
        drop(sender);

        let api = Arc::new(RecordingApi::default());
        let summary = IngressRunner::new(
            Arc::new(transport),
            dispatcher(Duration::ZERO),
            api.clone(),
            Duration::from_secs(5),
        )
        .with_bot_user_id(Some("UBOT".to_owned()))
        .run()
        .await
        .expect("run");

        assert_eq!(summary.received, 2);
        assert_eq!(api.posts().len(), 2);
    }
}
