//! Session orchestration: initialization, steady turns, and one-shot
//! retrieval operations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::config::{GroundingMethod, Prompts, ProviderSpecialty, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{AnamneseError, Result};
use crate::index::{load_index, LoadedIndex};
use crate::record::{HttpRecordSource, RecordSource};

use super::grounding::{
    assemble_record_context, ground_user_turn, select_mode, specialty_directive,
};
use super::model::{ChatModel, OpenAIChatModel};
use super::session::{ChatSession, RagBinding};
use super::transcript::{Role, Transcript, Turn};
use super::Excerpt;

/// A one-shot retrieval-grounded answer with its supporting excerpts.
pub struct Answer {
    pub text: String,
    pub sources: Vec<Excerpt>,
}

/// Drives chat sessions against the record and the index.
///
/// The orchestrator is shared and stateless apart from a cached index
/// handle; all conversation state lives in the [`ChatSession`] passed to
/// each call.
pub struct ChatOrchestrator {
    record_source: Option<Arc<dyn RecordSource>>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    prompts: Prompts,
    index_path: PathBuf,
    top_k: usize,
    index_cache: Mutex<Option<Arc<LoadedIndex>>>,
}

impl ChatOrchestrator {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            settings.prompts.variables.clone(),
        )?;

        // Leaving the record unconfigured only matters once a long-context
        // session actually needs it; rag retrieval runs off the index alone.
        let record_source: Option<Arc<dyn RecordSource>> = if settings.record.endpoint.is_none()
            && settings.record.patient_id.is_none()
            && settings.record.fallback_file.is_none()
        {
            None
        } else {
            Some(Arc::new(HttpRecordSource::from_settings(&settings.record)?))
        };

        let embedder = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions,
        ));
        let model = Arc::new(OpenAIChatModel::new(&settings.chat.model));

        Ok(Self::with_components(
            record_source,
            embedder,
            model,
            prompts,
            settings.index_db_path(),
            settings.chat.top_k,
        ))
    }

    pub fn with_components(
        record_source: Option<Arc<dyn RecordSource>>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        prompts: Prompts,
        index_path: PathBuf,
        top_k: usize,
    ) -> Self {
        Self {
            record_source,
            embedder,
            model,
            prompts,
            index_path,
            top_k,
            index_cache: Mutex::new(None),
        }
    }

    /// Initialize a fresh session and return its opening summary. Returns
    /// `None` when the session is already initialized.
    #[instrument(skip(self, session))]
    pub async fn start(&self, session: &mut ChatSession) -> Result<Option<String>> {
        if session.is_initialized() {
            return Ok(None);
        }
        let summary = self.initialize(session).await?;
        Ok(Some(summary))
    }

    /// Answer one user question within a session, initializing it first if
    /// needed. On failure after the user turn is recorded, the turn stays
    /// in the transcript so the same question can be retried.
    #[instrument(skip(self, session, input))]
    pub async fn handle_turn(&self, session: &mut ChatSession, input: &str) -> Result<String> {
        if !session.is_initialized() {
            self.initialize(session).await?;
        }
        let mode = select_mode(session.transcript(), session.defaults().grounding)?;
        match mode {
            GroundingMethod::LongContext => self.steady_long_context(session, input).await,
            GroundingMethod::Rag => self.steady_rag(session, input).await,
        }
    }

    /// Answer a single question from the index without any session state.
    #[instrument(skip(self, question), fields(specialty = %specialty))]
    pub async fn answer_once(
        &self,
        question: &str,
        specialty: ProviderSpecialty,
    ) -> Result<Answer> {
        let index = self.loaded_index().await?;
        let excerpts = self.retrieve(&index, question).await?;
        let grounded = ground_user_turn(&self.prompts, question, &excerpts);

        let system = self.system_prompt(specialty);
        let reply = self
            .model
            .reply(&system, std::slice::from_ref(&grounded))
            .await?;

        Ok(Answer {
            text: reply.content,
            sources: excerpts,
        })
    }

    /// Retrieve index excerpts for a query, without calling the model.
    #[instrument(skip(self, query))]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<Excerpt>> {
        let index = self.loaded_index().await?;
        let embedding = self.embedder.embed(query).await?;
        let store = index.store();
        let results = match min_score {
            Some(threshold) => {
                store
                    .retrieve_with_threshold(&embedding, limit, threshold)
                    .await?
            }
            None => store.retrieve(&embedding, limit).await?,
        };
        Ok(results.into_iter().map(Excerpt::from).collect())
    }

    async fn initialize(&self, session: &mut ChatSession) -> Result<String> {
        let mode = select_mode(session.transcript(), session.defaults().grounding)?;
        match mode {
            GroundingMethod::LongContext => self.init_long_context(session).await,
            GroundingMethod::Rag => self.init_rag(session).await,
        }
    }

    /// Fetch the record, send it with the summary request, and commit the
    /// opening pair of turns. Nothing is committed if any step fails, so a
    /// failed start leaves the session blank.
    async fn init_long_context(&self, session: &mut ChatSession) -> Result<String> {
        let specialty = session.defaults().specialty;
        let source = self.record_source.as_ref().ok_or_else(|| {
            AnamneseError::RecordUnavailable(
                "No record source configured. Set record.endpoint and record.patient_id, \
                 or record.fallback_file"
                    .to_string(),
            )
        })?;
        let record = source.fetch().await?;
        info!(
            patient_id = %record.patient_id,
            chars = record.text.len(),
            "Grounding session in the full record"
        );

        let opening = assemble_record_context(&self.prompts, &record, specialty);
        let reply = self
            .model
            .reply(&self.prompts.chat.system, std::slice::from_ref(&opening))
            .await?;
        let summary = reply.content.clone();

        let mut transcript = Transcript::new(GroundingMethod::LongContext);
        transcript.push(opening);
        transcript.push(reply);
        session.install(transcript, None);
        Ok(summary)
    }

    /// Load the index and open with a retrieval-grounded summary. Only the
    /// assistant's summary is committed; the grounded request is per-call
    /// scaffolding, not conversation history.
    async fn init_rag(&self, session: &mut ChatSession) -> Result<String> {
        let specialty = session.defaults().specialty;
        let index = self.loaded_index().await?;
        info!(build_id = %index.meta.build_id, "Grounding session in the index");

        let question = self
            .prompts
            .render_with_custom(&self.prompts.grounding.summary_request, &HashMap::new());
        let excerpts = self.retrieve(&index, &question).await?;
        let grounded = ground_user_turn(&self.prompts, &question, &excerpts);

        let system = self.system_prompt(specialty);
        let reply = self
            .model
            .reply(&system, std::slice::from_ref(&grounded))
            .await?;
        let summary = reply.content.clone();

        let mut transcript = Transcript::new(GroundingMethod::Rag);
        transcript.push(reply);
        session.install(transcript, Some(RagBinding { index }));
        Ok(summary)
    }

    async fn steady_long_context(&self, session: &mut ChatSession, input: &str) -> Result<String> {
        self.append_user_turn(session, input)?;

        let snapshot: Vec<Turn> = session
            .transcript()
            .map(|t| t.turns().to_vec())
            .unwrap_or_default();
        let reply = self.model.reply(&self.prompts.chat.system, &snapshot).await?;

        let content = reply.content.clone();
        session.require_transcript_mut()?.push(reply);
        Ok(content)
    }

    async fn steady_rag(&self, session: &mut ChatSession, input: &str) -> Result<String> {
        // An initialized rag session always carries its index binding.
        let binding = session.retrieval().cloned().ok_or_else(|| {
            AnamneseError::ModeInconsistency("rag session has no bound index".to_string())
        })?;

        self.append_user_turn(session, input)?;
        let excerpts = self.retrieve(&binding.index, input).await?;

        // Resend prior turns as stored; excerpts ride only on the final
        // user message.
        let outgoing = {
            let transcript = session
                .transcript()
                .ok_or_else(|| AnamneseError::Chat("Session has no transcript".to_string()))?;
            let turns = transcript.turns();
            let mut outgoing: Vec<Turn> = turns[..turns.len() - 1].to_vec();
            outgoing.push(ground_user_turn(&self.prompts, input, &excerpts));
            outgoing
        };

        let system = self.system_prompt(session.defaults().specialty);
        let reply = self.model.reply(&system, &outgoing).await?;

        let content = reply.content.clone();
        session.require_transcript_mut()?.push(reply);
        Ok(content)
    }

    /// Record the user's turn before the model call. A retry of the exact
    /// question left hanging by a failed call reuses the recorded turn
    /// instead of appending a duplicate.
    fn append_user_turn(&self, session: &mut ChatSession, input: &str) -> Result<()> {
        let transcript = session.require_transcript_mut()?;
        let unanswered_retry = matches!(
            transcript.last(),
            Some(turn) if turn.role == Role::User && turn.content == input
        );
        if !unanswered_retry {
            transcript.push(Turn::user(input));
        }
        Ok(())
    }

    async fn retrieve(&self, index: &LoadedIndex, query: &str) -> Result<Vec<Excerpt>> {
        let embedding = self.embedder.embed(query).await?;
        let results = index.store().retrieve(&embedding, self.top_k).await?;
        Ok(results.into_iter().map(Excerpt::from).collect())
    }

    async fn loaded_index(&self) -> Result<Arc<LoadedIndex>> {
        let mut cache = self.index_cache.lock().await;
        if let Some(index) = cache.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(load_index(&self.index_path, self.embedder.as_ref()).await?);
        *cache = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Rag-mode system prompt: the shared prompt plus the per-session
    /// specialty directive. Long-context calls use the shared prompt alone
    /// because the directive already sits in the record turn.
    fn system_prompt(&self, specialty: ProviderSpecialty) -> String {
        format!(
            "{}\n\n{}",
            self.prompts.chat.system.trim_end(),
            specialty_directive(&self.prompts, specialty)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::SessionDefaults;
    use crate::embedding::testing::MockEmbedder;
    use crate::index::IndexBuilder;
    use crate::record::{PatientRecord, SourceDocument};
    use crate::splitting::{SplitStrategy, Splitter, SplitterConfig};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct MockChatModel {
        replies: std::sync::Mutex<VecDeque<std::result::Result<String, String>>>,
        calls: std::sync::Mutex<Vec<(String, Vec<Turn>)>>,
    }

    impl MockChatModel {
        fn with_replies(replies: Vec<std::result::Result<String, String>>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies.into_iter().collect()),
                calls: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<Turn>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for MockChatModel {
        async fn reply(&self, system: &str, turns: &[Turn]) -> Result<Turn> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), turns.to_vec()));
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(content)) => Ok(Turn::assistant(content)),
                Some(Err(message)) => Err(AnamneseError::OpenAI(message)),
                None => Ok(Turn::assistant("default reply")),
            }
        }
    }

    struct StaticRecordSource {
        record: PatientRecord,
    }

    #[async_trait]
    impl RecordSource for StaticRecordSource {
        async fn fetch(&self) -> Result<PatientRecord> {
            Ok(self.record.clone())
        }

        fn record_id(&self) -> &str {
            &self.record.patient_id
        }
    }

    struct UnavailableRecordSource;

    #[async_trait]
    impl RecordSource for UnavailableRecordSource {
        async fn fetch(&self) -> Result<PatientRecord> {
            Err(AnamneseError::RecordUnavailable("endpoint down".to_string()))
        }

        fn record_id(&self) -> &str {
            "unavailable"
        }
    }

    fn record() -> PatientRecord {
        PatientRecord {
            patient_id: "sarah-brown".to_string(),
            text: "Sarah Brown, born 1984.\n\n\
                   Hypertension diagnosed 2019; on lisinopril 10 mg.\n\n\
                   HbA1c 6.1 percent in March 2025."
                .to_string(),
        }
    }

    fn defaults(grounding: Option<GroundingMethod>) -> SessionDefaults {
        SessionDefaults {
            grounding,
            specialty: ProviderSpecialty::GeneralPractitioner,
        }
    }

    async fn build_rag_index(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("index.db");
        let splitter = Splitter::new(
            SplitStrategy::Paragraph,
            SplitterConfig {
                target_chars: 60,
                overlap_chars: 0,
                min_chars: 1,
            },
        );
        let builder = IndexBuilder::new(splitter, Arc::new(MockEmbedder::new()));
        let documents = vec![SourceDocument {
            source_id: "bundle".to_string(),
            text: record().text,
        }];
        let built = builder.build("sarah-brown", &documents).await.unwrap();
        built.persist(&path).await.unwrap();
        path
    }

    fn long_context_orchestrator(
        model: Arc<MockChatModel>,
        index_path: PathBuf,
    ) -> ChatOrchestrator {
        ChatOrchestrator::with_components(
            Some(Arc::new(StaticRecordSource { record: record() }) as Arc<dyn RecordSource>),
            Arc::new(MockEmbedder::new()),
            model,
            Prompts::default(),
            index_path,
            30,
        )
    }

    fn rag_orchestrator(
        model: Arc<MockChatModel>,
        index_path: PathBuf,
        top_k: usize,
    ) -> ChatOrchestrator {
        ChatOrchestrator::with_components(
            None,
            Arc::new(MockEmbedder::new()),
            model,
            Prompts::default(),
            index_path,
            top_k,
        )
    }

    #[tokio::test]
    async fn long_context_start_commits_record_turn_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![Ok(
            "Patient summary.".to_string()
        )]));
        let orchestrator = long_context_orchestrator(model.clone(), dir.path().join("index.db"));
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        let summary = orchestrator.start(&mut session).await.unwrap();
        assert_eq!(summary.as_deref(), Some("Patient summary."));

        let transcript = session.transcript().unwrap();
        assert_eq!(transcript.mode(), GroundingMethod::LongContext);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[0].role, Role::User);
        assert!(transcript.turns()[0]
            .content
            .contains("Hypertension diagnosed 2019"));
        assert_eq!(session.visible_turns().len(), 1);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.len(), 1);
        // The directive rides in the record turn, not the system prompt.
        assert!(!calls[0].0.contains("advising as"));
        assert!(calls[0].1[0].content.contains("advising as"));
    }

    #[tokio::test]
    async fn long_context_followup_resends_the_whole_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![
            Ok("Summary.".to_string()),
            Ok("Her last HbA1c was 6.1 percent.".to_string()),
        ]));
        let orchestrator = long_context_orchestrator(model.clone(), dir.path().join("index.db"));
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        orchestrator.start(&mut session).await.unwrap();
        let answer = orchestrator
            .handle_turn(&mut session, "What was her last HbA1c?")
            .await
            .unwrap();
        assert_eq!(answer, "Her last HbA1c was 6.1 percent.");
        assert_eq!(session.transcript().unwrap().len(), 4);

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.len(), 3);
        assert!(calls[1].1[0].content.contains("PATIENT RECORD"));
        assert_eq!(calls[1].1[2].content, "What was her last HbA1c?");
    }

    #[tokio::test]
    async fn failed_reply_keeps_the_user_turn_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![
            Ok("Summary.".to_string()),
            Err("rate limited".to_string()),
            Ok("Recovered answer.".to_string()),
        ]));
        let orchestrator = long_context_orchestrator(model.clone(), dir.path().join("index.db"));
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        orchestrator.start(&mut session).await.unwrap();
        let err = orchestrator
            .handle_turn(&mut session, "Any allergies?")
            .await
            .unwrap_err();
        assert!(matches!(err, AnamneseError::OpenAI(_)));

        let transcript = session.transcript().unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.last().map(|t| t.role), Some(Role::User));

        let answer = orchestrator
            .handle_turn(&mut session, "Any allergies?")
            .await
            .unwrap();
        assert_eq!(answer, "Recovered answer.");

        let transcript = session.transcript().unwrap();
        assert_eq!(transcript.len(), 4);
        let occurrences = transcript
            .turns()
            .iter()
            .filter(|t| t.content == "Any allergies?")
            .count();
        assert_eq!(occurrences, 1);
    }

    #[tokio::test]
    async fn failed_start_leaves_the_session_blank() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![Err("boom".to_string())]));
        let orchestrator = long_context_orchestrator(model, dir.path().join("index.db"));
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        let err = orchestrator.start(&mut session).await.unwrap_err();
        assert!(matches!(err, AnamneseError::OpenAI(_)));
        assert!(!session.is_initialized());
    }

    #[tokio::test]
    async fn record_fetch_failure_leaves_the_session_blank() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![]));
        let orchestrator = ChatOrchestrator::with_components(
            Some(Arc::new(UnavailableRecordSource) as Arc<dyn RecordSource>),
            Arc::new(MockEmbedder::new()),
            model.clone(),
            Prompts::default(),
            dir.path().join("index.db"),
            30,
        );
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        let err = orchestrator.start(&mut session).await.unwrap_err();
        assert!(matches!(err, AnamneseError::RecordUnavailable(_)));
        assert!(!session.is_initialized());
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn rag_start_commits_a_single_assistant_turn() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = build_rag_index(&dir).await;
        let model = Arc::new(MockChatModel::with_replies(vec![Ok(
            "Opening summary.".to_string()
        )]));
        let orchestrator = rag_orchestrator(model.clone(), index_path, 30);
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::Rag)));

        let summary = orchestrator.start(&mut session).await.unwrap();
        assert_eq!(summary.as_deref(), Some("Opening summary."));

        let transcript = session.transcript().unwrap();
        assert_eq!(transcript.mode(), GroundingMethod::Rag);
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.turns()[0].role, Role::Assistant);
        assert_eq!(session.visible_turns().len(), 1);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("advising as a general practitioner"));
        assert!(calls[0].1[0].content.contains("Relevant excerpts"));
    }

    #[tokio::test]
    async fn rag_transcript_stores_clean_input_while_the_model_sees_excerpts() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = build_rag_index(&dir).await;
        let model = Arc::new(MockChatModel::with_replies(vec![
            Ok("Opening summary.".to_string()),
            Ok("She takes lisinopril 10 mg.".to_string()),
        ]));
        let orchestrator = rag_orchestrator(model.clone(), index_path, 30);
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::Rag)));

        orchestrator.start(&mut session).await.unwrap();
        let answer = orchestrator
            .handle_turn(&mut session, "What medications is she taking?")
            .await
            .unwrap();
        assert_eq!(answer, "She takes lisinopril 10 mg.");

        let transcript = session.transcript().unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(
            transcript.turns()[1].content,
            "What medications is she taking?"
        );

        let calls = model.calls();
        let outgoing = &calls[1].1;
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0].content, "Opening summary.");
        let last = outgoing.last().unwrap();
        assert!(last.content.contains("What medications is she taking?"));
        assert!(last.content.contains("Relevant excerpts"));
        assert!(last.content.contains("lisinopril"));
    }

    #[tokio::test]
    async fn rag_retrieval_caps_excerpts_at_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = build_rag_index(&dir).await;
        let model = Arc::new(MockChatModel::with_replies(vec![
            Ok("Opening summary.".to_string()),
            Ok("Answer.".to_string()),
        ]));
        let orchestrator = rag_orchestrator(model.clone(), index_path, 2);
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::Rag)));

        orchestrator.start(&mut session).await.unwrap();
        orchestrator
            .handle_turn(&mut session, "Tell me about her blood pressure.")
            .await
            .unwrap();

        let calls = model.calls();
        let last = calls[1].1.last().unwrap().clone();
        assert!(last.content.contains("[2] bundle"));
        assert!(!last.content.contains("[3] bundle"));
    }

    #[tokio::test]
    async fn rag_start_without_an_index_fails_and_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![]));
        let orchestrator = rag_orchestrator(model.clone(), dir.path().join("missing.db"), 30);
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::Rag)));

        let err = orchestrator.start(&mut session).await.unwrap_err();
        assert!(matches!(err, AnamneseError::IndexLoad(_)));
        assert!(!session.is_initialized());
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn first_turn_initializes_the_session_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![
            Ok("Summary.".to_string()),
            Ok("Answer.".to_string()),
        ]));
        let orchestrator = long_context_orchestrator(model, dir.path().join("index.db"));
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        let answer = orchestrator
            .handle_turn(&mut session, "Medications?")
            .await
            .unwrap();
        assert_eq!(answer, "Answer.");
        assert_eq!(session.transcript().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_session_in_the_new_mode() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = build_rag_index(&dir).await;
        let model = Arc::new(MockChatModel::with_replies(vec![
            Ok("LC summary.".to_string()),
            Ok("LC answer.".to_string()),
            Ok("Rag summary.".to_string()),
        ]));
        let orchestrator = ChatOrchestrator::with_components(
            Some(Arc::new(StaticRecordSource { record: record() }) as Arc<dyn RecordSource>),
            Arc::new(MockEmbedder::new()),
            model.clone(),
            Prompts::default(),
            index_path,
            30,
        );
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        orchestrator.start(&mut session).await.unwrap();
        orchestrator
            .handle_turn(&mut session, "Question one?")
            .await
            .unwrap();
        assert_eq!(session.transcript().unwrap().len(), 4);

        session.reset(SessionDefaults {
            grounding: Some(GroundingMethod::Rag),
            specialty: ProviderSpecialty::Cardiologist,
        });
        let summary = orchestrator.start(&mut session).await.unwrap();
        assert_eq!(summary.as_deref(), Some("Rag summary."));

        let transcript = session.transcript().unwrap();
        assert_eq!(transcript.mode(), GroundingMethod::Rag);
        assert_eq!(transcript.len(), 1);

        let calls = model.calls();
        assert!(calls.last().unwrap().0.contains("cardiologist"));
    }

    #[tokio::test]
    async fn reset_without_a_default_cannot_restart() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![Ok(
            "Summary.".to_string()
        )]));
        let orchestrator = long_context_orchestrator(model, dir.path().join("index.db"));
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        orchestrator.start(&mut session).await.unwrap();
        session.reset(defaults(None));

        let err = orchestrator.start(&mut session).await.unwrap_err();
        assert!(matches!(err, AnamneseError::Config(_)));
    }

    #[tokio::test]
    async fn malformed_transcript_fails_the_next_turn() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(MockChatModel::with_replies(vec![]));
        let orchestrator = long_context_orchestrator(model, dir.path().join("index.db"));
        let mut session = ChatSession::new(defaults(Some(GroundingMethod::LongContext)));

        let mut transcript = Transcript::new(GroundingMethod::LongContext);
        transcript.push(Turn::assistant("not the record turn"));
        session.install(transcript, None);

        let err = orchestrator
            .handle_turn(&mut session, "Hello?")
            .await
            .unwrap_err();
        assert!(matches!(err, AnamneseError::ModeInconsistency(_)));
    }

    #[tokio::test]
    async fn answer_once_returns_text_and_sources() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = build_rag_index(&dir).await;
        let model = Arc::new(MockChatModel::with_replies(vec![Ok(
            "One-shot answer.".to_string()
        )]));
        let orchestrator = rag_orchestrator(model.clone(), index_path, 30);

        let answer = orchestrator
            .answer_once("What was her HbA1c?", ProviderSpecialty::Endocrinologist)
            .await
            .unwrap();

        assert_eq!(answer.text, "One-shot answer.");
        assert_eq!(answer.sources.len(), 3);

        let calls = model.calls();
        assert!(calls[0].0.contains("endocrinologist"));
    }

    #[tokio::test]
    async fn search_honors_limit_and_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = build_rag_index(&dir).await;
        let model = Arc::new(MockChatModel::with_replies(vec![]));
        let orchestrator = rag_orchestrator(model, index_path, 30);

        let results = orchestrator.search("hypertension", 2, None).await.unwrap();
        assert_eq!(results.len(), 2);

        let filtered = orchestrator
            .search("hypertension", 10, Some(2.0))
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }
}
