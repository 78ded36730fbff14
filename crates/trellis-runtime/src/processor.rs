//! The turn controller.
//!
//! [`Processor::process_message`] drives one incoming event through the
//! full turn lifecycle: short-circuit gates, state lock acquisition with
//! bounded retry, timestamp deduplication, dispatch through the router,
//! postback draining, state merge, persistence with lock release, and
//! outbound flush.
//!
//! Ordering guarantees:
//!
//! - at most one turn mutates a sender's state at a time (pessimistic lock);
//! - queued postbacks run strictly in emission order, each as a nested
//!   dispatch sharing the turn's sender and response accumulator;
//! - the merged state is persisted exactly once, after the last postback
//!   (including deferred ones) settles;
//! - handler failures and send failures never leave the lock held.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_runtime::{MemoryStateStorage, Processor};
//!
//! let processor = Processor::new(router, Arc::new(MemoryStateStorage::new()), sender_factory);
//! let summary = processor.process_message(event).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, trace, warn};

use trellis_core::{ActionResolver, ConversationState, Event};
use trellis_router::{PostBack, PostBackQueue, Request, Response, Router};

use crate::config::ProcessorConfig;
use crate::error::{ProcessError, ProcessResult, TurnStatus, TurnSummary};
use crate::hooks::{IntentResolver, TokenIssuer, UserLoader};
use crate::sender::{SendReport, SenderFactory, SenderHandle};
use crate::storage::{StateStorage, StorageError};

/// Reserved state variable holding the loaded user profile.
const USER_VAR: &str = "user";

/// Drives incoming events through the turn lifecycle.
pub struct Processor {
    router: Router,
    resolver: ActionResolver,
    storage: Arc<dyn StateStorage>,
    sender_factory: Arc<dyn SenderFactory>,
    user_loader: Option<Arc<dyn UserLoader>>,
    token_issuer: Option<Arc<dyn TokenIssuer>>,
    intent_resolver: Option<Arc<dyn IntentResolver>>,
    config: ProcessorConfig,
}

impl Processor {
    /// Creates a processor with default limits and no optional hooks.
    pub fn new(
        router: Router,
        storage: Arc<dyn StateStorage>,
        sender_factory: Arc<dyn SenderFactory>,
    ) -> Self {
        Self {
            router,
            resolver: ActionResolver::new(),
            storage,
            sender_factory,
            user_loader: None,
            token_issuer: None,
            intent_resolver: None,
            config: ProcessorConfig::default(),
        }
    }

    /// Replaces the action resolver (e.g. to change text normalization).
    pub fn with_resolver(mut self, resolver: ActionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Attaches a user profile loader.
    pub fn with_user_loader(mut self, loader: Arc<dyn UserLoader>) -> Self {
        self.user_loader = Some(loader);
        self
    }

    /// Attaches a conversation token issuer.
    pub fn with_token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.token_issuer = Some(issuer);
        self
    }

    /// Attaches a free-text intent resolver.
    pub fn with_intent_resolver(mut self, resolver: Arc<dyn IntentResolver>) -> Self {
        self.intent_resolver = Some(resolver);
        self
    }

    /// Overrides the processing limits.
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Processes one incoming event end to end.
    pub async fn process_message(&self, event: Event) -> ProcessResult<TurnSummary> {
        let mut event = event;

        // Optins carry no durable sender id; the one-time reference serves
        // as the conversation key until the flush report resolves one.
        if event.sender_id.is_empty() {
            if let Some(reference) = event.optin_ref().map(String::from) {
                event.sender_id = reference;
            }
        }

        if event.sender_id.is_empty() {
            warn!("Discarding event without sender id");
            return Ok(TurnSummary::new(TurnStatus::Skipped));
        }
        if !event.should_process() {
            trace!(sender_id = %event.sender_id, "Skipping bookkeeping event");
            return Ok(TurnSummary::new(TurnStatus::Skipped));
        }

        let mut state = self.acquire_state(&event).await?;

        if state.has_seen(event.timestamp) {
            debug!(
                sender_id = %event.sender_id,
                timestamp = event.timestamp,
                "Duplicate event, ignoring"
            );
            state.lock = 0;
            self.storage.save_state(state).await?;
            return Ok(TurnSummary::new(TurnStatus::Deduplicated));
        }

        state = self.storage.on_after_state_load(&event, state).await?;

        if let Some(loader) = &self.user_loader
            && !state.vars.contains_key(USER_VAR)
            && let Some(user) = loader
                .load_user(&event.sender_id, event.page_id.as_deref())
                .await
        {
            state.vars.insert(USER_VAR.to_string(), user);
        }

        let token = match &self.token_issuer {
            Some(issuer) => {
                issuer
                    .get_or_create_token(&event.sender_id, event.page_id.as_deref())
                    .await
            }
            None => None,
        };

        let mut request = Request::new(event.clone(), state.clone(), &self.resolver);
        request = request.with_token(token);
        if request.action().is_none()
            && let (Some(resolver), Some(text)) = (&self.intent_resolver, event.text.as_deref())
        {
            request = request.with_intents(resolver.resolve(text).await);
        }
        let request = Arc::new(request);

        let sender = self.sender_factory.create(&event);
        let res = Response::new();
        let queue = PostBackQueue::new();
        let post_back = PostBack::new(queue.clone(), &event.sender_id, event.page_id.clone());

        let mut failed = false;
        match self
            .router
            .reduce(Arc::clone(&request), res.clone(), post_back, "/")
            .await
        {
            Ok(trellis_router::RouteOutcome::Exit(signal)) => {
                // Not an error: no exit point along the chain consumed it.
                debug!(exit = %signal.name, "Exit signal left unconsumed");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(sender_id = %event.sender_id, error = %err, "Handler failed");
                failed = true;
            }
        }

        // Drain in emission order. Each postback is a nested dispatch from
        // the root location, sharing the response accumulator; its state
        // snapshot includes everything written so far.
        while let Some(queued) = queue.next().await {
            trace!(action = %queued.action, "Draining postback");
            let mut synthetic = Event::postback(
                &queued.sender_id,
                json!({ "action": queued.action, "data": queued.data }),
            );
            if let Some(page) = &queued.page_id {
                synthetic = synthetic.on_page(page.clone());
            }
            let nested_state = res.apply_to(&state);
            let nested_request =
                Arc::new(Request::new(synthetic, nested_state, &self.resolver));
            let nested_pb =
                PostBack::new(queue.clone(), &queued.sender_id, queued.page_id.clone());
            if let Err(err) = self
                .router
                .reduce(nested_request, res.clone(), nested_pb, "/")
                .await
            {
                warn!(action = %queued.action, error = %err, "Postback handler failed");
                failed = true;
            }
        }

        let mut merged = res.apply_to(&state);
        if event.is_user_initiated() && !res.expectations_set() {
            merged.clear_expectations();
        }
        merged.remember_timestamp(event.timestamp);
        if merged.last_timestamps.len() > self.config.dedup_window {
            let overflow = merged.last_timestamps.len() - self.config.dedup_window;
            merged.last_timestamps.drain(..overflow);
        }
        merged.lock = 0;

        let status = if failed {
            TurnStatus::Failed
        } else {
            TurnStatus::Processed
        };

        if event.is_optin() {
            return self.finish_optin(&event, merged, res, sender, status).await;
        }

        self.storage.save_state(merged.clone()).await?;

        for payload in res.drain_messages() {
            sender.send(payload);
        }
        let report = sender.flush().await;
        if report.error.is_some() {
            self.record_send_failure(&event, &mut merged, &report);
            self.storage.save_state(merged).await?;
        }

        Ok(TurnSummary::with_sent(status, report.sent))
    }

    /// Optin turns flush before persisting: the flush report carries the
    /// durable recipient id the merged state must be re-keyed to.
    async fn finish_optin(
        &self,
        event: &Event,
        mut merged: ConversationState,
        res: Response,
        sender: Arc<dyn SenderHandle>,
        status: TurnStatus,
    ) -> ProcessResult<TurnSummary> {
        for payload in res.drain_messages() {
            sender.send(payload);
        }
        let report = sender.flush().await;
        if report.error.is_some() {
            self.record_send_failure(event, &mut merged, &report);
        }

        match &report.recipient_id {
            Some(durable) => {
                debug!(recipient_id = %durable, "Optin resolved durable recipient");
                let mut durable_state = merged.clone();
                durable_state.sender_id = durable.clone();
                self.storage.save_state(durable_state).await?;
            }
            None => warn!(
                sender_id = %event.sender_id,
                "Optin turn resolved no durable recipient id, state stays under the reference"
            ),
        }

        // Release the lock held under the temporary reference.
        self.storage.save_state(merged).await?;
        Ok(TurnSummary::with_sent(status, report.sent))
    }

    async fn acquire_state(&self, event: &Event) -> ProcessResult<ConversationState> {
        let attempts = self.config.lock_attempts.max(1);
        for attempt in 0..attempts {
            let default = ConversationState::new(&event.sender_id);
            match self
                .storage
                .get_or_create_and_lock(
                    &event.sender_id,
                    event.page_id.as_deref(),
                    default,
                    self.config.lock_timeout_ms,
                )
                .await
            {
                Ok(state) => return Ok(state),
                Err(StorageError::Locked) => {
                    trace!(
                        sender_id = %event.sender_id,
                        attempt,
                        "Conversation locked, backing off"
                    );
                    if attempt + 1 < attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.lock_backoff_ms))
                            .await;
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }
        debug!(sender_id = %event.sender_id, "Lock acquisition exhausted, rejecting turn");
        Err(ProcessError::LockTimeout)
    }

    fn record_send_failure(
        &self,
        event: &Event,
        state: &mut ConversationState,
        report: &SendReport,
    ) {
        let Some(err) = &report.error else {
            return;
        };
        if err.is_forbidden() {
            // Consent revocation is routine; keep it below warning level.
            debug!(sender_id = %event.sender_id, "Recipient rejected delivery");
        } else {
            warn!(sender_id = %event.sender_id, error = %err, "Outbound delivery failed");
        }
        state.last_send_error = Some(event.timestamp);
        state.last_error_message = Some(err.to_string());
        state.last_error_code = Some(err.code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::CollectingSenderFactory;
    use crate::storage::MemoryStateStorage;
    use serde_json::Value;
    use trellis_router::{HandlerError, Route};

    fn quick_config() -> ProcessorConfig {
        ProcessorConfig {
            lock_backoff_ms: 1,
            ..ProcessorConfig::default()
        }
    }

    fn build(
        router: Router,
    ) -> (Processor, Arc<MemoryStateStorage>, Arc<CollectingSenderFactory>) {
        build_with(router, Arc::new(CollectingSenderFactory::new()))
    }

    fn build_with(
        router: Router,
        factory: Arc<CollectingSenderFactory>,
    ) -> (Processor, Arc<MemoryStateStorage>, Arc<CollectingSenderFactory>) {
        let storage = Arc::new(MemoryStateStorage::new());
        let processor = Processor::new(
            router,
            Arc::clone(&storage) as Arc<dyn StateStorage>,
            Arc::clone(&factory) as Arc<dyn SenderFactory>,
        )
        .with_config(quick_config());
        (processor, storage, factory)
    }

    fn echo_router() -> Router {
        Router::new().with(Route::any().handler(|_req, res, _pb| async move {
            res.text("ok");
            Router::end()
        }))
    }

    #[tokio::test]
    async fn duplicate_events_are_silently_ignored() {
        let (processor, storage, factory) = build(echo_router());
        let event = Event::text("u1", "hello").at(1234);

        let first = processor.process_message(event.clone()).await.unwrap();
        assert_eq!(first.status, TurnStatus::Processed);
        assert_eq!(first.sent, 1);

        let second = processor.process_message(event).await.unwrap();
        assert_eq!(second.status, TurnStatus::Deduplicated);
        assert_eq!(factory.all_payloads().len(), 1);

        let state = storage.get("u1", None).unwrap();
        assert_eq!(state.lock, 0);
        assert!(state.has_seen(1234));
    }

    #[tokio::test]
    async fn bookkeeping_events_short_circuit_before_storage() {
        let (processor, storage, _) = build(echo_router());
        let summary = processor
            .process_message(Event::text("u1", "hi").echo())
            .await
            .unwrap();
        assert_eq!(summary.status, TurnStatus::Skipped);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn held_lock_rejects_the_turn_after_retries() {
        let (processor, storage, _) = build(echo_router());
        let mut locked = ConversationState::new("u1");
        locked.lock = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        storage.insert(locked);

        let result = processor.process_message(Event::text("u1", "hi")).await;
        assert!(matches!(result, Err(ProcessError::LockTimeout)));
    }

    #[tokio::test]
    async fn concurrent_turns_for_one_sender_serialize() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (f, p) = (Arc::clone(&in_flight), Arc::clone(&peak));

        let router = Router::new().with(Route::any().handler(move |_req, _res, _pb| {
            let in_flight = Arc::clone(&f);
            let peak = Arc::clone(&p);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Router::end()
            }
        }));
        let (processor, _, _) = build(router);
        // Give retries enough room to outlast the handler's hold time.
        let processor = Arc::new(processor.with_config(ProcessorConfig {
            lock_backoff_ms: 20,
            ..ProcessorConfig::default()
        }));

        let a = tokio::spawn({
            let p = Arc::clone(&processor);
            async move { p.process_message(Event::text("u1", "one").at(1)).await }
        });
        let b = tokio::spawn({
            let p = Arc::clone(&processor);
            async move { p.process_message(Event::text("u1", "two").at(2)).await }
        });

        assert_eq!(a.await.unwrap().unwrap().status, TurnStatus::Processed);
        assert_eq!(b.await.unwrap().unwrap().status, TurnStatus::Processed);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_expectations_clear_unless_reset_this_turn() {
        let (processor, storage, _) = build(echo_router());
        let mut prepared = ConversationState::new("u1");
        prepared.expected_action =
            Some(trellis_core::Expectation::new("/old", Value::Null));
        storage.insert(prepared);

        processor
            .process_message(Event::postback("u1", json!("/anywhere")))
            .await
            .unwrap();

        assert!(storage.get("u1", None).unwrap().expected_action.is_none());
    }

    #[tokio::test]
    async fn expectations_set_this_turn_survive_the_merge() {
        let router = Router::new().with(Route::any().handler(|_req, res, _pb| async move {
            res.expected("/next", json!({}));
            Router::end()
        }));
        let (processor, storage, _) = build(router);

        processor
            .process_message(Event::text("u1", "hi"))
            .await
            .unwrap();

        let state = storage.get("u1", None).unwrap();
        assert_eq!(state.expected_action.unwrap().action, "/next");
    }

    #[tokio::test]
    async fn postbacks_drain_in_order_through_the_same_sender() {
        let router = Router::new()
            .with(Route::new("/first").handler(|_req, res, pb| async move {
                res.text("one");
                pb.send("/second", json!({}));
                Router::end()
            }))
            .with(Route::new("/second").handler(|_req, res, _pb| async move {
                res.text("two");
                Router::end()
            }));
        let (processor, storage, factory) = build(router);

        let summary = processor
            .process_message(Event::postback("u1", json!("/first")))
            .await
            .unwrap();

        assert_eq!(summary.status, TurnStatus::Processed);
        assert_eq!(summary.sent, 2);
        let payloads = factory.all_payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["message"]["text"], "one");
        assert_eq!(payloads[1]["message"]["text"], "two");
        // one merge covers the whole chain
        assert_eq!(storage.get("u1", None).unwrap().last_timestamps.len(), 1);
    }

    #[tokio::test]
    async fn nested_postbacks_see_earlier_state_writes() {
        let router = Router::new()
            .with(Route::new("/first").handler(|_req, res, pb| async move {
                res.set_state("step", json!(1));
                pb.send("/second", json!({}));
                Router::end()
            }))
            .with(Route::new("/second").handler(|req, res, _pb| async move {
                assert_eq!(req.state_var("step"), Some(&json!(1)));
                res.set_state("step", json!(2));
                Router::end()
            }));
        let (processor, storage, _) = build(router);

        processor
            .process_message(Event::postback("u1", json!("/first")))
            .await
            .unwrap();

        assert_eq!(
            storage.get("u1", None).unwrap().vars.get("step"),
            Some(&json!(2))
        );
    }

    #[tokio::test]
    async fn handler_failure_releases_the_lock_and_reports_failed() {
        let router = Router::new().with(Route::any().handler(|_req, _res, _pb| async move {
            Err(HandlerError::msg("boom"))
        }));
        let (processor, storage, _) = build(router);

        let summary = processor
            .process_message(Event::text("u1", "hi"))
            .await
            .unwrap();

        assert_eq!(summary.status, TurnStatus::Failed);
        assert_eq!(storage.get("u1", None).unwrap().lock, 0);
    }

    #[tokio::test]
    async fn optin_rekeys_state_to_the_durable_recipient() {
        let factory = Arc::new(CollectingSenderFactory::with_recipient("durable-1"));
        let (processor, storage, _) = build_with(echo_router(), factory);

        let summary = processor
            .process_message(Event::optin("one-time-ref"))
            .await
            .unwrap();

        assert_eq!(summary.status, TurnStatus::Processed);
        let durable = storage.get("durable-1", None).unwrap();
        assert_eq!(durable.sender_id, "durable-1");
        assert_eq!(durable.lock, 0);
        // the reference-keyed copy releases its lock too
        assert_eq!(storage.get("one-time-ref", None).unwrap().lock, 0);
    }

    #[tokio::test]
    async fn send_failure_is_recorded_as_state_diagnostics() {
        let factory = Arc::new(CollectingSenderFactory::failing());
        let (processor, storage, _) = build_with(echo_router(), factory);

        let summary = processor
            .process_message(Event::text("u1", "hi").at(99))
            .await
            .unwrap();

        // delivery failure does not fail the turn
        assert_eq!(summary.status, TurnStatus::Processed);
        let state = storage.get("u1", None).unwrap();
        assert_eq!(state.last_send_error, Some(99));
        assert!(state.last_error_message.is_some());
    }

    #[tokio::test]
    async fn deferred_postbacks_are_awaited_before_the_merge() {
        let router = Router::new()
            .with(Route::new("/start").handler(|_req, _res, pb| async move {
                let deferred = pb.wait();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    deferred.resolve("/late", json!({}));
                });
                Router::end()
            }))
            .with(Route::new("/late").handler(|_req, res, _pb| async move {
                res.set_state("late", json!(true));
                Router::end()
            }));
        let (processor, storage, _) = build(router);

        processor
            .process_message(Event::postback("u1", json!("/start")))
            .await
            .unwrap();

        assert_eq!(
            storage.get("u1", None).unwrap().vars.get("late"),
            Some(&json!(true))
        );
    }
}
