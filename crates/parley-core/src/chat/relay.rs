//! Turn relay: one user utterance in, one assistant reply out.
//!
//! The relay loads the session's windowed history, calls the chat-completion
//! provider with the full message list, parses the reply into a structured
//! [`TurnReply`], commits the exchange and hands the result back. It never
//! returns an error to its caller: transport failures, timeouts and unusable
//! replies all become one of the configured fallback phrases, and history is
//! left untouched for failed turns.
//!
//! Two delivery shapes are offered:
//! - [`TurnRelay::run_turn`] waits for the whole reply (`stream: false`).
//! - [`TurnRelay::stream_turn`] yields raw token deltas, speakable sentences
//!   and finally exactly one [`TurnEvent::Completed`].
//!
//! Sessions nobody has touched for `session_idle` are dropped by
//! [`TurnRelay::prune_idle_sessions`], run periodically by the sweeper task.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, info_span, warn};

use parley_types::chat::{FallbackReason, SessionId, TurnOutcome, TurnRecord, TurnReply};
use parley_types::config::{FallbackPhrases, RelayConfig};
use parley_types::error::{ConfigError, RepositoryError, SessionError};
use parley_types::llm::{CompletionRequest, LlmError, Message, StreamEvent};

use crate::chat::chunker::SentenceChunker;
use crate::chat::history::ConversationHistory;
use crate::chat::reply::{parse_reply, strip_markup, validate_fallback_phrases};
use crate::chat::store::{BoxSessionStore, StoredSession};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::EventStream;
use crate::prompt::PromptCatalog;

/// Sampling and windowing knobs applied to every turn.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub history_window: usize,
    pub session_idle: Duration,
    pub fallbacks: FallbackPhrases,
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            history_window: config.history_window,
            session_idle: Duration::from_secs(config.session_idle_secs),
            fallbacks: config.fallbacks.clone(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// A live session bound to the business whose prompt seeds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: SessionId,
    pub business: String,
}

/// Items produced by [`TurnRelay::stream_turn`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Raw token text exactly as streamed by the model.
    Delta(String),
    /// A complete sentence with markup removed, ready to be spoken.
    Sentence(String),
    /// Terminal event; always the last item.
    Completed(TurnOutcome),
}

/// Relays user turns to the chat-completion provider.
///
/// Cheap to clone; all clones share the provider, store and catalog.
#[derive(Clone)]
pub struct TurnRelay {
    provider: Arc<BoxLlmProvider>,
    store: Arc<BoxSessionStore>,
    catalog: Arc<PromptCatalog>,
    default_business: String,
    settings: Arc<RelaySettings>,
    turn_log: Option<mpsc::UnboundedSender<TurnRecord>>,
}

impl TurnRelay {
    /// Build a relay. Fails if `default_business` is not in the catalog or a
    /// fallback phrase has nothing speakable in it.
    pub fn new(
        provider: BoxLlmProvider,
        store: BoxSessionStore,
        catalog: PromptCatalog,
        default_business: &str,
        settings: RelaySettings,
    ) -> Result<Self, ConfigError> {
        catalog.require(default_business)?;
        validate_fallback_phrases(&settings.fallbacks)?;
        Ok(Self {
            provider: Arc::new(provider),
            store: Arc::new(store),
            catalog: Arc::new(catalog),
            default_business: default_business.to_string(),
            settings: Arc::new(settings),
            turn_log: None,
        })
    }

    /// Send a [`TurnRecord`] for every finished turn to `sender`.
    pub fn with_turn_log(mut self, sender: mpsc::UnboundedSender<TurnRecord>) -> Self {
        self.turn_log = Some(sender);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn default_business(&self) -> &str {
        &self.default_business
    }

    // --- Session lifecycle ---

    /// Mint a new session for `business` (or the default business).
    pub fn open_session(&self, business: Option<&str>) -> Result<SessionHandle, ConfigError> {
        let business = business.unwrap_or(&self.default_business);
        self.catalog.require(business)?;
        Ok(SessionHandle {
            id: SessionId::new(),
            business: business.to_string(),
        })
    }

    /// Bind a session id to a business.
    ///
    /// A stored session keeps the business it was started with; asking for a
    /// different one is a [`SessionError::BusinessMismatch`]. An unknown id
    /// takes `business`, or the default business.
    pub async fn resume_session(
        &self,
        id: SessionId,
        business: Option<&str>,
    ) -> Result<SessionHandle, SessionError> {
        if let Some(requested) = business {
            self.catalog.require(requested)?;
        }

        let stored = match self.store.load(&id).await {
            Ok(stored) => stored.map(|session| session.business),
            Err(err) => {
                warn!(session_id = %id, error = %err, "Session store unavailable, treating session as new");
                None
            }
        };

        let business = match (stored, business) {
            (Some(stored), Some(requested)) if stored != requested => {
                return Err(SessionError::BusinessMismatch {
                    session_id: id,
                    stored,
                    requested: requested.to_string(),
                });
            }
            (Some(stored), _) => stored,
            (None, Some(requested)) => requested.to_string(),
            (None, None) => self.default_business.clone(),
        };
        Ok(SessionHandle { id, business })
    }

    /// Drop a session's history.
    pub async fn end_session(&self, session_id: &SessionId) {
        match self.store.remove(session_id).await {
            Ok(()) => debug!(%session_id, "Session history dropped"),
            Err(err) => warn!(%session_id, error = %err, "Failed to drop session history"),
        }
    }

    pub async fn active_sessions(&self) -> Result<usize, RepositoryError> {
        self.store.count().await
    }

    /// Drop sessions idle for longer than `session_idle`. Returns how many.
    pub async fn prune_idle_sessions(&self) -> usize {
        let cutoff = TimeDelta::from_std(self.settings.session_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle));
        let Some(cutoff) = cutoff else {
            return 0;
        };
        match self.store.prune_idle(cutoff).await {
            Ok(0) => 0,
            Ok(pruned) => {
                info!(pruned, "Idle sessions dropped");
                pruned
            }
            Err(err) => {
                warn!(error = %err, "Failed to prune idle sessions");
                0
            }
        }
    }

    /// Run [`Self::prune_idle_sessions`] every `period` until aborted.
    pub fn spawn_idle_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let relay = self.clone();
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                relay.prune_idle_sessions().await;
            }
        })
    }

    /// Current history of a session, seeded with its system prompt if new.
    pub async fn history(&self, session: &SessionHandle) -> ConversationHistory {
        let window = self.settings.history_window;
        match self.store.load(&session.id).await {
            Ok(Some(stored)) if !stored.messages.is_empty() => {
                ConversationHistory::from_messages(stored.messages, window)
            }
            Ok(_) => ConversationHistory::seeded(self.system_prompt(&session.business), window),
            Err(err) => {
                warn!(
                    session_id = %session.id,
                    error = %err,
                    "Session store unavailable, continuing with a fresh history"
                );
                ConversationHistory::seeded(self.system_prompt(&session.business), window)
            }
        }
    }

    // --- Turns ---

    /// Relay one utterance and wait for the complete reply.
    pub async fn run_turn(&self, session: &SessionHandle, utterance: &str) -> TurnOutcome {
        let started = Instant::now();
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return self.fallback_outcome(FallbackReason::Malformed, started);
        }

        let history = self.history(session).await;
        let request = self.build_request(history.request_messages(utterance), false);

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = false,
            session_id = %session.id,
        );

        let outcome = match self.provider.complete(&request).instrument(span).await {
            Ok(response) => {
                self.complete_turn(session, history, utterance, &response.content, started)
                    .await
            }
            Err(err) => {
                warn!(
                    session_id = %session.id,
                    provider = self.provider.name(),
                    error = %err,
                    "Chat completion failed"
                );
                self.fallback_outcome(err.fallback_reason(), started)
            }
        };

        self.record(session, utterance, &outcome);
        outcome
    }

    /// Relay one utterance, streaming the reply as it is generated.
    pub fn stream_turn(
        &self,
        session: SessionHandle,
        utterance: String,
    ) -> Pin<Box<dyn Stream<Item = TurnEvent> + Send + 'static>> {
        let relay = self.clone();

        Box::pin(async_stream::stream! {
            let started = Instant::now();
            let utterance = utterance.trim().to_string();
            if utterance.is_empty() {
                yield TurnEvent::Completed(relay.fallback_outcome(FallbackReason::Malformed, started));
                return;
            }

            let history = relay.history(&session).await;
            let request = relay.build_request(history.request_messages(&utterance), true);
            let span = info_span!(
                "gen_ai.stream",
                gen_ai.system = relay.provider.name(),
                gen_ai.request.model = %request.model,
                gen_ai.request.max_tokens = request.max_tokens,
                gen_ai.request.temperature = ?request.temperature,
                gen_ai.request.stream = true,
                session_id = %session.id,
            );
            let mut events = StreamInSpan {
                inner: relay.provider.stream(request),
                span,
            };

            let mut chunker = SentenceChunker::new();
            let mut raw = String::new();
            let mut failure: Option<FallbackReason> = None;

            while let Some(event) = events.next().await {
                match event {
                    Ok(StreamEvent::TextDelta { text }) => {
                        raw.push_str(&text);
                        let unit = chunker.push(&text);
                        yield TurnEvent::Delta(text);
                        if let Some(unit) = unit {
                            let speakable = strip_markup(&unit);
                            if !speakable.is_empty() {
                                yield TurnEvent::Sentence(speakable);
                            }
                        }
                    }
                    Ok(StreamEvent::Done) => break,
                    Ok(other) => debug!(?other, "Ignoring stream event"),
                    Err(err) => {
                        warn!(
                            session_id = %session.id,
                            provider = relay.provider.name(),
                            error = %err,
                            received_chars = raw.len(),
                            "Chat stream failed"
                        );
                        failure = Some(err.fallback_reason());
                        break;
                    }
                }
            }

            let outcome = match failure {
                Some(reason) => relay.fallback_outcome(reason, started),
                None => {
                    if let Some(unit) = chunker.finish() {
                        let speakable = strip_markup(&unit);
                        if !speakable.is_empty() {
                            yield TurnEvent::Sentence(speakable);
                        }
                    }
                    relay.complete_turn(&session, history, &utterance, &raw, started).await
                }
            };

            relay.record(&session, &utterance, &outcome);
            yield TurnEvent::Completed(outcome);
        })
    }

    /// Commit a turn the user cut short: the utterance and whatever part of
    /// the reply was produced before the interruption.
    pub async fn commit_interrupted(&self, session: &SessionHandle, utterance: &str, partial: &str) {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return;
        }
        let mut history = self.history(session).await;
        history.push(Message::user(utterance));
        let partial = partial.trim();
        if !partial.is_empty() {
            history.push(Message::assistant(partial));
        }
        self.save_history(session, history).await;
        info!(session_id = %session.id, partial_chars = partial.len(), "Interrupted turn committed");
    }

    // --- Helpers ---

    fn system_prompt(&self, business: &str) -> &str {
        self.catalog
            .get(business)
            .or_else(|| self.catalog.get(&self.default_business))
            .unwrap_or_default()
    }

    fn build_request(&self, messages: Vec<Message>, stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: Some(self.settings.temperature),
            stream,
        }
    }

    /// Parse the model's text and, if usable, commit the exchange.
    async fn complete_turn(
        &self,
        session: &SessionHandle,
        mut history: ConversationHistory,
        utterance: &str,
        raw: &str,
        started: Instant,
    ) -> TurnOutcome {
        let Some(reply) = parse_reply(raw) else {
            warn!(session_id = %session.id, raw = %raw, "Model reply had no speakable text");
            return self.fallback_outcome(FallbackReason::Malformed, started);
        };

        history.push_turn(utterance, raw);
        self.save_history(session, history).await;

        TurnOutcome {
            reply,
            raw_text: raw.to_string(),
            fallback: None,
            latency_ms: elapsed_ms(started),
        }
    }

    async fn save_history(&self, session: &SessionHandle, history: ConversationHistory) {
        let stored = StoredSession::new(session.business.clone(), history.into_messages());
        if let Err(err) = self.store.save(&session.id, &stored).await {
            warn!(session_id = %session.id, error = %err, "Failed to save session history");
        }
    }

    fn fallback_outcome(&self, reason: FallbackReason, started: Instant) -> TurnOutcome {
        let phrase = self.settings.fallbacks.phrase(reason);
        TurnOutcome {
            reply: parse_reply(phrase).unwrap_or_else(|| TurnReply::plain(phrase)),
            raw_text: phrase.to_string(),
            fallback: Some(reason),
            latency_ms: elapsed_ms(started),
        }
    }

    fn record(&self, session: &SessionHandle, utterance: &str, outcome: &TurnOutcome) {
        info!(
            session_id = %session.id,
            business = %session.business,
            latency_ms = outcome.latency_ms,
            fallback = ?outcome.fallback,
            language = %outcome.reply.language,
            "Turn completed"
        );

        let Some(sender) = &self.turn_log else {
            return;
        };
        let record = TurnRecord {
            session_id: session.id,
            business: session.business.clone(),
            user_text: utterance.to_string(),
            reply_text: outcome.reply.text.clone(),
            language: outcome.reply.language.clone(),
            fallback: outcome.fallback,
            latency_ms: outcome.latency_ms,
            created_at: Utc::now(),
        };
        if sender.send(record).is_err() {
            debug!("Turn log writer has stopped; record dropped");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Polls a provider stream inside its GenAI span.
struct StreamInSpan {
    inner: EventStream,
    span: tracing::Span,
}

impl Stream for StreamInSpan {
    type Item = Result<StreamEvent, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let _enter = this.span.enter();
        this.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};
    use futures_util::stream;
    use parley_types::llm::{CompletionResponse, LlmError, MessageRole, StopReason, Usage};

    use super::*;
    use crate::chat::store::SessionStore;
    use crate::llm::provider::LlmProvider;

    enum Script {
        Reply(&'static str),
        Tokens(Vec<&'static str>),
        Fail(FallbackReason),
        TokensThenFail(Vec<&'static str>, FallbackReason),
    }

    fn error_for(reason: FallbackReason) -> LlmError {
        match reason {
            FallbackReason::Transport => LlmError::Provider {
                message: "connection refused".into(),
            },
            FallbackReason::Timeout => LlmError::Timeout("60s elapsed".into()),
            FallbackReason::Malformed => LlmError::Deserialization("bad json".into()),
        }
    }

    /// Provider double that replays a script and records every request.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Script>>,
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Script>) -> (Self, Arc<Mutex<Vec<CompletionRequest>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let provider = Self {
                script: Mutex::new(script.into()),
                requests: requests.clone(),
            };
            (provider, requests)
        }

        fn next(&self, request: &CompletionRequest) -> Script {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Reply("Okay."))
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let content = match self.next(request) {
                Script::Reply(text) => text.to_string(),
                Script::Tokens(tokens) => tokens.concat(),
                Script::Fail(reason) | Script::TokensThenFail(_, reason) => {
                    return Err(error_for(reason));
                }
            };
            Ok(CompletionResponse {
                content,
                model: request.model.clone(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }

        fn stream(&self, request: CompletionRequest) -> EventStream {
            let delta = |t: &str| Ok(StreamEvent::TextDelta { text: t.to_string() });
            let mut items = vec![Ok(StreamEvent::Connected)];
            match self.next(&request) {
                Script::Reply(text) => {
                    items.push(delta(text));
                    items.push(Ok(StreamEvent::Done));
                }
                Script::Tokens(tokens) => {
                    items.extend(tokens.into_iter().map(delta));
                    items.push(Ok(StreamEvent::Done));
                }
                Script::Fail(reason) => items.push(Err(error_for(reason))),
                Script::TokensThenFail(tokens, reason) => {
                    items.extend(tokens.into_iter().map(delta));
                    items.push(Err(error_for(reason)));
                }
            }
            Box::pin(stream::iter(items))
        }
    }

    #[derive(Default)]
    struct TestStore {
        sessions: Mutex<HashMap<SessionId, StoredSession>>,
        broken: bool,
    }

    impl SessionStore for TestStore {
        async fn load(&self, id: &SessionId) -> Result<Option<StoredSession>, RepositoryError> {
            if self.broken {
                return Err(RepositoryError::Query("disk full".into()));
            }
            Ok(self.sessions.lock().unwrap().get(id).cloned())
        }

        async fn save(&self, id: &SessionId, session: &StoredSession) -> Result<(), RepositoryError> {
            if self.broken {
                return Err(RepositoryError::Query("disk full".into()));
            }
            self.sessions.lock().unwrap().insert(*id, session.clone());
            Ok(())
        }

        async fn remove(&self, id: &SessionId) -> Result<(), RepositoryError> {
            self.sessions.lock().unwrap().remove(id);
            Ok(())
        }

        async fn count(&self) -> Result<usize, RepositoryError> {
            Ok(self.sessions.lock().unwrap().len())
        }

        async fn prune_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
            let mut sessions = self.sessions.lock().unwrap();
            let before = sessions.len();
            sessions.retain(|_, session| session.updated_at >= cutoff);
            Ok(before - sessions.len())
        }
    }

    fn james_catalog() -> PromptCatalog {
        let mut overrides = BTreeMap::new();
        overrides.insert("james".to_string(), "You are James...".to_string());
        PromptCatalog::with_overrides(&overrides).unwrap()
    }

    fn relay_with(
        script: Vec<Script>,
        store: TestStore,
        settings: RelaySettings,
    ) -> (TurnRelay, Arc<Mutex<Vec<CompletionRequest>>>) {
        let (provider, requests) = ScriptedProvider::new(script);
        let relay = TurnRelay::new(
            BoxLlmProvider::new(provider),
            BoxSessionStore::new(store, "test"),
            james_catalog(),
            "james",
            settings,
        )
        .unwrap();
        (relay, requests)
    }

    fn relay(script: Vec<Script>) -> (TurnRelay, Arc<Mutex<Vec<CompletionRequest>>>) {
        relay_with(script, TestStore::default(), RelaySettings::default())
    }

    async fn collect(relay: &TurnRelay, session: &SessionHandle, text: &str) -> Vec<TurnEvent> {
        relay
            .stream_turn(session.clone(), text.to_string())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_end_to_end_turn_with_suggestions() {
        let (relay, requests) = relay(vec![Script::Reply(
            "Hello, I'm James. How can I help? <<Pricing|Book a demo>>",
        )]);
        let session = relay.open_session(None).unwrap();

        let outcome = relay.run_turn(&session, "Hi, who are you?").await;

        assert!(!outcome.is_fallback());
        assert_eq!(outcome.reply.text, "Hello, I'm James. How can I help?");
        assert_eq!(outcome.reply.suggestions, vec!["Pricing", "Book a demo"]);

        let sent = requests.lock().unwrap()[0].clone();
        assert!(!sent.stream);
        assert_eq!(sent.messages[0], Message::system("You are James..."));
        assert_eq!(sent.messages[1], Message::user("Hi, who are you?"));

        let history = relay.history(&session).await;
        assert_eq!(history.messages().len(), 3);
        assert_eq!(history.messages()[1], Message::user("Hi, who are you?"));
        assert_eq!(history.messages()[2].role, MessageRole::Assistant);
        assert!(history.messages()[2].content.contains("<<Pricing|Book a demo>>"));
    }

    #[tokio::test]
    async fn test_second_turn_sends_previous_exchange() {
        let (relay, requests) = relay(vec![Script::Reply("Hi there."), Script::Reply("Sure.")]);
        let session = relay.open_session(None).unwrap();

        relay.run_turn(&session, "Hello").await;
        relay.run_turn(&session, "Tell me more").await;

        let second = requests.lock().unwrap()[1].clone();
        let roles: Vec<_> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_return_exact_fallback_and_keep_history() {
        for reason in [
            FallbackReason::Transport,
            FallbackReason::Timeout,
            FallbackReason::Malformed,
        ] {
            let (relay, _) = relay(vec![Script::Fail(reason)]);
            let session = relay.open_session(None).unwrap();

            let outcome = relay.run_turn(&session, "Hi").await;

            let fallbacks = &relay.settings().fallbacks;
            assert_eq!(outcome.fallback, Some(reason));
            assert_eq!(outcome.reply.text, fallbacks.phrase(reason));
            assert_eq!(outcome.raw_text, fallbacks.phrase(reason));
            assert_eq!(relay.history(&session).await.messages().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_markup_only_reply_is_malformed() {
        let (relay, _) = relay(vec![Script::Reply("[EN] <<A|B>>")]);
        let session = relay.open_session(None).unwrap();

        let outcome = relay.run_turn(&session, "Hi").await;
        assert_eq!(outcome.fallback, Some(FallbackReason::Malformed));
        assert!(!outcome.reply.text.is_empty());
    }

    #[tokio::test]
    async fn test_blank_utterance_never_calls_provider() {
        let (relay, requests) = relay(vec![]);
        let session = relay.open_session(None).unwrap();

        let outcome = relay.run_turn(&session, "   ").await;
        assert!(outcome.is_fallback());
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_never_exceeds_window() {
        let settings = RelaySettings {
            history_window: 4,
            ..RelaySettings::default()
        };
        let (relay, _) = relay_with(vec![], TestStore::default(), settings);
        let session = relay.open_session(None).unwrap();

        for i in 0..30 {
            let outcome = relay.run_turn(&session, &format!("question {i}")).await;
            assert!(!outcome.reply.text.is_empty());
            let history = relay.history(&session).await;
            assert!(history.messages().len() <= 5);
            assert_eq!(history.messages()[0].role, MessageRole::System);
        }
    }

    #[tokio::test]
    async fn test_stream_turn_emits_deltas_sentences_and_completion() {
        let tokens = vec![
            "[EN]", " Hello", ".", " How", " can", " I", " help", "?", " <<Pricing|Demo>>",
        ];
        let (relay, requests) = relay(vec![Script::Tokens(tokens.clone())]);
        let session = relay.open_session(None).unwrap();

        let events = collect(&relay, &session, "Hi").await;

        let deltas: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Delta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, tokens.concat());

        let sentences: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Sentence(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sentences, vec!["Hello.", "How can I help?"]);

        let Some(TurnEvent::Completed(outcome)) = events.last() else {
            panic!("stream must end with Completed");
        };
        assert_eq!(outcome.reply.text, "Hello. How can I help?");
        assert_eq!(outcome.reply.language, "en");
        assert_eq!(outcome.reply.suggestions, vec!["Pricing", "Demo"]);
        assert_eq!(outcome.raw_text, tokens.concat());
        assert!(requests.lock().unwrap()[0].stream);
        assert_eq!(relay.history(&session).await.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_failure_mid_reply_falls_back() {
        let (relay, _) = relay(vec![Script::TokensThenFail(
            vec!["Sure", "."],
            FallbackReason::Transport,
        )]);
        let session = relay.open_session(None).unwrap();

        let events = collect(&relay, &session, "Hi").await;

        assert_eq!(events[0], TurnEvent::Delta("Sure".into()));
        let completed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::Completed(_)))
            .collect();
        assert_eq!(completed.len(), 1);
        let Some(TurnEvent::Completed(outcome)) = events.last() else {
            panic!("stream must end with Completed");
        };
        assert_eq!(outcome.reply.text, "Connection unstable.");
        assert_eq!(outcome.fallback, Some(FallbackReason::Transport));
        assert_eq!(relay.history(&session).await.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_connect_failure_yields_only_completion() {
        let (relay, _) = relay(vec![Script::Fail(FallbackReason::Timeout)]);
        let session = relay.open_session(None).unwrap();

        let events = collect(&relay, &session, "Hi").await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            TurnEvent::Completed(o) if o.fallback == Some(FallbackReason::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_commit_interrupted_keeps_partial_reply() {
        let (relay, _) = relay(vec![]);
        let session = relay.open_session(None).unwrap();

        relay
            .commit_interrupted(&session, "What's the price?", "It starts at ")
            .await;

        let history = relay.history(&session).await;
        assert_eq!(
            &history.messages()[1..],
            &[
                Message::user("What's the price?"),
                Message::assistant("It starts at")
            ]
        );

        relay.commit_interrupted(&session, "Wait", "").await;
        let history = relay.history(&session).await;
        assert_eq!(history.messages().last(), Some(&Message::user("Wait")));
    }

    #[tokio::test]
    async fn test_end_session_drops_history() {
        let (relay, _) = relay(vec![]);
        let session = relay.open_session(None).unwrap();
        relay.run_turn(&session, "Hi").await;
        assert_eq!(relay.active_sessions().await.unwrap(), 1);

        relay.end_session(&session.id).await;
        assert_eq!(relay.active_sessions().await.unwrap(), 0);
        assert_eq!(relay.history(&session).await.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_turn_log_receives_records() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (relay, _) = relay(vec![Script::Reply("[FR] Bonjour !")]);
        let relay = relay.with_turn_log(tx);
        let session = relay.open_session(None).unwrap();

        relay.run_turn(&session, "Salut").await;

        let record = rx.try_recv().unwrap();
        assert_eq!(record.session_id, session.id);
        assert_eq!(record.business, "james");
        assert_eq!(record.user_text, "Salut");
        assert_eq!(record.reply_text, "Bonjour !");
        assert_eq!(record.language, "fr");
        assert!(record.fallback.is_none());
    }

    #[tokio::test]
    async fn test_broken_store_still_answers() {
        let store = TestStore {
            broken: true,
            ..TestStore::default()
        };
        let (relay, _) = relay_with(vec![Script::Reply("Hi!")], store, RelaySettings::default());
        let session = relay.open_session(None).unwrap();

        let outcome = relay.run_turn(&session, "Hello").await;
        assert_eq!(outcome.reply.text, "Hi!");
        assert!(!outcome.is_fallback());
    }

    #[test]
    fn test_unknown_business_rejected() {
        let (relay, _) = relay(vec![]);
        assert!(relay.open_session(Some("bakery")).is_err());
        let session = relay.open_session(Some("saas_demo")).unwrap();
        assert_eq!(session.business, "saas_demo");

        let (provider, _) = ScriptedProvider::new(vec![]);
        let result = TurnRelay::new(
            BoxLlmProvider::new(provider),
            BoxSessionStore::new(TestStore::default(), "test"),
            PromptCatalog::builtin(),
            "bakery",
            RelaySettings::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unspeakable_fallback_rejected() {
        let (provider, _) = ScriptedProvider::new(vec![]);
        let mut settings = RelaySettings::default();
        settings.fallbacks.timeout = "  ".into();
        let result = TurnRelay::new(
            BoxLlmProvider::new(provider),
            BoxSessionStore::new(TestStore::default(), "test"),
            james_catalog(),
            "james",
            settings,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_tagged_fallback_phrase_is_parsed() {
        let mut settings = RelaySettings::default();
        settings.fallbacks.transport = "[ES] Conexión inestable. <<Reintentar>>".into();
        let (relay, _) = relay_with(
            vec![Script::Fail(FallbackReason::Transport)],
            TestStore::default(),
            settings,
        );
        let session = relay.open_session(None).unwrap();

        let outcome = relay.run_turn(&session, "Hola").await;
        assert_eq!(outcome.fallback, Some(FallbackReason::Transport));
        assert_eq!(outcome.reply.text, "Conexión inestable.");
        assert_eq!(outcome.reply.language, "es");
        assert_eq!(outcome.reply.suggestions, vec!["Reintentar"]);
        assert_eq!(outcome.raw_text, "[ES] Conexión inestable. <<Reintentar>>");
    }

    #[tokio::test]
    async fn test_resume_keeps_stored_business() {
        let (relay, _) = relay(vec![]);
        let session = relay.open_session(Some("saas_demo")).unwrap();
        relay.run_turn(&session, "Hi").await;

        let resumed = relay.resume_session(session.id, None).await.unwrap();
        assert_eq!(resumed.business, "saas_demo");
        let resumed = relay
            .resume_session(session.id, Some("saas_demo"))
            .await
            .unwrap();
        assert_eq!(resumed, session);

        let err = relay
            .resume_session(session.id, Some("james"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::BusinessMismatch { ref stored, ref requested, .. }
                if stored == "saas_demo" && requested == "james"
        ));
    }

    #[tokio::test]
    async fn test_resume_unknown_session() {
        let (relay, _) = relay(vec![]);
        let id = SessionId::new();

        let resumed = relay.resume_session(id, None).await.unwrap();
        assert_eq!(resumed.business, "james");
        let resumed = relay.resume_session(id, Some("saas_demo")).await.unwrap();
        assert_eq!(resumed.business, "saas_demo");
        assert!(matches!(
            relay.resume_session(id, Some("bakery")).await,
            Err(SessionError::Config(ConfigError::UnknownBusiness(_)))
        ));
    }

    #[tokio::test]
    async fn test_idle_sessions_pruned() {
        let (relay, _) = relay(vec![]);
        let session = relay.open_session(None).unwrap();
        relay.run_turn(&session, "Hi").await;
        assert_eq!(relay.prune_idle_sessions().await, 0);
        assert_eq!(relay.active_sessions().await.unwrap(), 1);

        let settings = RelaySettings {
            session_idle: Duration::ZERO,
            ..RelaySettings::default()
        };
        let (relay, _) = relay_with(vec![], TestStore::default(), settings);
        let session = relay.open_session(None).unwrap();
        relay.run_turn(&session, "Hi").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(relay.prune_idle_sessions().await, 1);
        assert_eq!(relay.active_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_idle_sweeper_runs_periodically() {
        let settings = RelaySettings {
            session_idle: Duration::ZERO,
            ..RelaySettings::default()
        };
        let (relay, _) = relay_with(vec![], TestStore::default(), settings);
        let session = relay.open_session(None).unwrap();
        relay.run_turn(&session, "Hi").await;

        let sweeper = relay.spawn_idle_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        assert_eq!(relay.active_sessions().await.unwrap(), 0);
    }
}
