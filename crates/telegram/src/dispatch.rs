//! Routes inbound messages into exchanges.

use std::sync::Arc;

use {
    teloxide::{
        prelude::*,
        types::{MediaKind, MessageKind},
    },
    tracing::{debug, warn},
};

use {codeglass_chat::Orchestrator, codeglass_ocr::TextExtractor, codeglass_transcripts::ChatKey};

use crate::{
    delivery::send_markdown,
    error::{Error, Modality, Result},
    files,
    normalize::{self, ImageOutcome, InputNormalizer},
};

pub(crate) const TEXT_ACK: &str = "🧠 Working on it...";
pub(crate) const IMAGE_ACK: &str = "🖼️ Reading text from the image...";
pub(crate) const IMAGE_ANALYZING: &str = "🔍 Analyzing the code...";
pub(crate) const DOCUMENT_ACK: &str = "📄 Reading the file...";
pub(crate) const NO_TEXT_NOTICE: &str = "❌ No text recognized. Try another screenshot.";
pub(crate) const ERROR_NOTICE: &str =
    "⚠️ Something went wrong while processing that. Please try again.";

pub(crate) const HELP_TEXT: &str = "🤖 *codeglass* powered by DeepSeek-Coder\n\n\
I can help with:\n\
- Explaining code and error messages\n\
- Reading code from screenshots (OCR)\n\
- Reviewing uploaded source files (js, ts, py, rs, txt)\n\
- Generating examples\n\n\
📌 Just type a question or send a photo of your code.";

/// Routes one inbound message by modality and isolates its failures.
///
/// Text, photo, and document are checked independently, so an event carrying
/// more than one modality runs one exchange per modality present.
pub struct Dispatcher {
    bot: Bot,
    orchestrator: Arc<Orchestrator>,
    normalizer: InputNormalizer,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        bot: Bot,
        orchestrator: Arc<Orchestrator>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            bot,
            orchestrator,
            normalizer: InputNormalizer::new(extractor),
        }
    }

    /// Handles one message. Every failure ends here: logged, answered with a
    /// short notice, never propagated to the polling loop.
    pub async fn handle_message(&self, msg: Message) {
        let chat_id = msg.chat.id;
        let chat = ChatKey::from(chat_id.0);

        if let Some(text) = message_text(&msg) {
            if let Err(e) = self.handle_text(chat_id, &chat, &text).await {
                self.report_failure(chat_id, Modality::Text, &e).await;
            }
        }
        if let Some(file_id) = largest_photo(&msg) {
            if let Err(e) = self.handle_photo(chat_id, &chat, &file_id).await {
                self.report_failure(chat_id, Modality::Image, &e).await;
            }
        }
        if let Some((file_id, file_name)) = document_ref(&msg) {
            let result = self
                .handle_document(chat_id, &chat, &file_id, file_name.as_deref())
                .await;
            if let Err(e) = result {
                self.report_failure(chat_id, Modality::Document, &e).await;
            }
        }
    }

    async fn handle_text(&self, chat_id: ChatId, chat: &ChatKey, text: &str) -> Result<()> {
        if let Some(prompt) = self.normalizer.text(text) {
            send_notice(&self.bot, chat_id, TEXT_ACK).await;
            self.orchestrator.run_exchange(chat, prompt).await?;
            return Ok(());
        }
        match normalize::command_name(text) {
            Some("start" | "help") => {
                if let Err(e) = send_markdown(&self.bot, chat_id, HELP_TEXT).await {
                    warn!(chat_id = chat_id.0, error = %e, "failed to send help");
                }
            },
            other => debug!(chat_id = chat_id.0, command = ?other, "ignoring command"),
        }
        Ok(())
    }

    async fn handle_photo(&self, chat_id: ChatId, chat: &ChatKey, file_id: &str) -> Result<()> {
        send_notice(&self.bot, chat_id, IMAGE_ACK).await;
        let image = files::download_file(&self.bot, file_id)
            .await
            .map_err(|e| Error::normalization(Modality::Image, e))?;
        match self.normalizer.image(&image).await? {
            ImageOutcome::NoText => {
                debug!(chat_id = chat_id.0, "image had no readable text");
                send_notice(&self.bot, chat_id, NO_TEXT_NOTICE).await;
            },
            ImageOutcome::Recognized { text, prompt } => {
                let echo = format!("```\n{text}\n```\n\n{IMAGE_ANALYZING}");
                if let Err(e) = send_markdown(&self.bot, chat_id, &echo).await {
                    warn!(chat_id = chat_id.0, error = %e, "failed to echo recognized text");
                }
                self.orchestrator.run_exchange(chat, prompt).await?;
            },
        }
        Ok(())
    }

    async fn handle_document(
        &self,
        chat_id: ChatId,
        chat: &ChatKey,
        file_id: &str,
        file_name: Option<&str>,
    ) -> Result<()> {
        let Some(name) = file_name else {
            debug!(chat_id = chat_id.0, "document has no file name, ignoring");
            return Ok(());
        };
        if !normalize::allowed_extension(name) {
            debug!(chat_id = chat_id.0, file = name, "extension not allowed, ignoring");
            return Ok(());
        }
        send_notice(&self.bot, chat_id, DOCUMENT_ACK).await;
        let content = files::download_file(&self.bot, file_id)
            .await
            .map_err(|e| Error::normalization(Modality::Document, e))?;
        let prompt = self.normalizer.document(&content);
        self.orchestrator.run_exchange(chat, prompt).await?;
        Ok(())
    }

    async fn report_failure(&self, chat_id: ChatId, modality: Modality, error: &Error) {
        warn!(chat_id = chat_id.0, %modality, error = %error, "message handling failed");
        send_notice(&self.bot, chat_id, ERROR_NOTICE).await;
    }
}

/// Plain message text; captions do not count.
fn message_text(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(text) => Some(text.text.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// File id of the highest-resolution photo variant, if any.
fn largest_photo(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            // Telegram lists sizes in ascending order, so the last is largest.
            MediaKind::Photo(photo) => photo.photo.last().map(|size| size.file.id.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Document file id and name, if the message carries an attachment.
fn document_ref(msg: &Message) -> Option<(String, Option<String>)> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Document(doc) => Some((
                doc.document.file.id.clone(),
                doc.document.file_name.clone(),
            )),
            _ => None,
        },
        _ => None,
    }
}

/// Best-effort plain-text notice; failures are logged and swallowed.
async fn send_notice(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, text).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to send notice");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::{Arc, Mutex},
            time::Duration,
        },
    };

    use {
        async_trait::async_trait,
        axum::{
            Json, Router,
            body::Bytes,
            extract::State,
            http::{Method, Uri},
            response::{IntoResponse, Response},
            routing::any,
        },
        serde::Deserialize,
        serde_json::json,
        tokio::sync::oneshot,
    };

    use {
        codeglass_completion::CompletionClient,
        codeglass_ocr::MockExtractor,
        codeglass_transcripts::{Role, TranscriptStore, Turn},
    };

    use crate::delivery::TelegramDelivery;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TelegramApiMethod {
        SendMessage,
        GetFile,
        Other(String),
    }

    impl TelegramApiMethod {
        fn from_path(path: &str) -> Self {
            let method = path.rsplit('/').next().unwrap_or_default();
            match method {
                "SendMessage" => Self::SendMessage,
                "GetFile" => Self::GetFile,
                _ => Self::Other(method.to_string()),
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    struct SendMessageRequest {
        chat_id: i64,
        text: String,
        #[serde(default)]
        parse_mode: Option<String>,
    }

    #[derive(Debug, Clone)]
    enum CapturedRequest {
        SendMessage(SendMessageRequest),
        GetFile { file_id: String },
        Other { method: String },
    }

    #[derive(Clone)]
    struct MockTelegramApi {
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
        file_bytes: Arc<Vec<u8>>,
        reject_markdown: bool,
    }

    async fn telegram_api_handler(
        State(state): State<MockTelegramApi>,
        method: Method,
        uri: Uri,
        body: Bytes,
    ) -> Response {
        if method == Method::GET && uri.path().starts_with("/file/") {
            return state.file_bytes.as_ref().clone().into_response();
        }

        match TelegramApiMethod::from_path(uri.path()) {
            TelegramApiMethod::SendMessage => {
                let Ok(req) = serde_json::from_slice::<SendMessageRequest>(&body) else {
                    return Json(json!({
                        "ok": false,
                        "error_code": 400,
                        "description": "Bad Request: malformed body"
                    }))
                    .into_response();
                };
                let rejected = state.reject_markdown && req.parse_mode.is_some();
                state
                    .requests
                    .lock()
                    .expect("requests lock")
                    .push(CapturedRequest::SendMessage(req));
                if rejected {
                    return Json(json!({
                        "ok": false,
                        "error_code": 400,
                        "description": "Bad Request: can't parse entities: rejected by test"
                    }))
                    .into_response();
                }
                Json(json!({
                    "ok": true,
                    "result": {
                        "message_id": 1,
                        "date": 0,
                        "chat": { "id": 42, "type": "private" },
                        "text": "ok"
                    }
                }))
                .into_response()
            },
            TelegramApiMethod::GetFile => {
                let file_id = serde_json::from_slice::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v["file_id"].as_str().map(str::to_string))
                    .unwrap_or_default();
                state
                    .requests
                    .lock()
                    .expect("requests lock")
                    .push(CapturedRequest::GetFile {
                        file_id: file_id.clone(),
                    });
                Json(json!({
                    "ok": true,
                    "result": {
                        "file_id": file_id,
                        "file_unique_id": "unique",
                        "file_size": state.file_bytes.len(),
                        "file_path": "files/attachment"
                    }
                }))
                .into_response()
            },
            TelegramApiMethod::Other(method) => {
                state
                    .requests
                    .lock()
                    .expect("requests lock")
                    .push(CapturedRequest::Other { method });
                Json(json!({ "ok": true, "result": true })).into_response()
            },
        }
    }

    struct TestRig {
        bot: Bot,
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
        shutdown: oneshot::Sender<()>,
        server: tokio::task::JoinHandle<()>,
    }

    impl TestRig {
        async fn spawn(file_bytes: &[u8], reject_markdown: bool) -> Self {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let state = MockTelegramApi {
                requests: Arc::clone(&requests),
                file_bytes: Arc::new(file_bytes.to_vec()),
                reject_markdown,
            };
            let app = Router::new()
                .route("/{*path}", any(telegram_api_handler))
                .with_state(state);

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind test listener");
            let addr = listener.local_addr().expect("local addr");
            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            let server = tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("serve mock telegram api");
            });
            tokio::time::sleep(Duration::from_millis(50)).await;

            let api_url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
            let bot = Bot::new("test-token").set_api_url(api_url);

            Self {
                bot,
                requests,
                shutdown: shutdown_tx,
                server,
            }
        }

        fn sends(&self) -> Vec<SendMessageRequest> {
            self.requests
                .lock()
                .expect("requests lock")
                .iter()
                .filter_map(|r| match r {
                    CapturedRequest::SendMessage(req) => Some(req.clone()),
                    _ => None,
                })
                .collect()
        }

        async fn finish(self) {
            let _ = self.shutdown.send(());
            self.server.await.expect("server join");
        }
    }

    struct RecordingCompletion {
        reply: String,
        calls: Mutex<Vec<Vec<Turn>>>,
    }

    impl RecordingCompletion {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<Turn>> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl CompletionClient for RecordingCompletion {
        async fn complete(&self, transcript: &[Turn]) -> codeglass_completion::Result<String> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(transcript.to_vec());
            Ok(self.reply.clone())
        }
    }

    fn build_dispatcher(
        rig: &TestRig,
        sessions: &tempfile::TempDir,
        completion: Arc<RecordingCompletion>,
        extractor: MockExtractor,
    ) -> Dispatcher {
        let store = TranscriptStore::new(sessions.path().to_path_buf());
        let delivery = Arc::new(TelegramDelivery::new(rig.bot.clone()));
        let orchestrator = Arc::new(Orchestrator::new(store, completion, delivery));
        Dispatcher::new(rig.bot.clone(), orchestrator, Arc::new(extractor))
    }

    fn text_message(text: &str) -> Message {
        serde_json::from_value(json!({
            "message_id": 1,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
            "text": text
        }))
        .expect("deserialize text message")
    }

    fn photo_message() -> Message {
        serde_json::from_value(json!({
            "message_id": 2,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
            "photo": [
                {
                    "file_id": "photo-small",
                    "file_unique_id": "u-small",
                    "width": 90,
                    "height": 60,
                    "file_size": 120
                },
                {
                    "file_id": "photo-large",
                    "file_unique_id": "u-large",
                    "width": 800,
                    "height": 600,
                    "file_size": 1200
                }
            ]
        }))
        .expect("deserialize photo message")
    }

    fn document_message(file_name: &str) -> Message {
        serde_json::from_value(json!({
            "message_id": 3,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
            "document": {
                "file_id": "doc-1",
                "file_unique_id": "u-doc",
                "file_name": file_name,
                "file_size": 64
            }
        }))
        .expect("deserialize document message")
    }

    async fn saved_turns(sessions: &tempfile::TempDir) -> Vec<Turn> {
        TranscriptStore::new(sessions.path().to_path_buf())
            .load(&ChatKey::from(42))
            .await
            .expect("load transcript")
    }

    #[tokio::test]
    async fn text_message_runs_one_exchange() {
        let rig = TestRig::spawn(b"", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("let binds a variable");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher
            .handle_message(text_message("what does `let` do?"))
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let sends = rig.sends();
        assert_eq!(sends[0].text, TEXT_ACK);
        assert!(sends[0].parse_mode.is_none(), "notices are plain text");
        assert!(
            sends.iter().any(|s| s.chat_id == 42
                && s.text == "let binds a variable"
                && s.parse_mode.as_deref() == Some("Markdown")),
            "reply should arrive with markdown rendering, sends={sends:?}"
        );

        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
        assert_eq!(calls[0][0].role, Role::User);
        assert_eq!(calls[0][0].content, "what does `let` do?");

        let saved = saved_turns(&sessions).await;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].content, "let binds a variable");

        rig.finish().await;
    }

    #[tokio::test]
    async fn start_command_sends_help_without_an_exchange() {
        let rig = TestRig::spawn(b"", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("never");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher.handle_message(text_message("/start")).await;
        dispatcher.handle_message(text_message("/help")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sends = rig.sends();
        assert_eq!(sends.len(), 2);
        assert!(sends.iter().all(|s| s.text == HELP_TEXT));
        assert!(
            sends
                .iter()
                .all(|s| s.parse_mode.as_deref() == Some("Markdown"))
        );
        assert!(completion.calls().is_empty());
        assert!(saved_turns(&sessions).await.is_empty());

        rig.finish().await;
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        let rig = TestRig::spawn(b"", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("never");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher.handle_message(text_message("/weather moscow")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(rig.sends().is_empty());
        assert!(completion.calls().is_empty());

        rig.finish().await;
    }

    #[tokio::test]
    async fn disallowed_document_extension_is_a_silent_no_op() {
        let rig = TestRig::spawn(b"binary", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("never");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher
            .handle_message(document_message("payload.exe"))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(rig.sends().is_empty(), "no notice and no reply");
        assert!(completion.calls().is_empty());
        assert!(saved_turns(&sessions).await.is_empty());

        rig.finish().await;
    }

    #[tokio::test]
    async fn allowed_document_runs_an_exchange_with_fenced_content() {
        let rig = TestRig::spawn(b"fn main() {}", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("a minimal entry point");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher.handle_message(document_message("main.rs")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let sends = rig.sends();
        assert_eq!(sends[0].text, DOCUMENT_ACK);
        assert!(sends.iter().any(|s| s.text == "a minimal entry point"));

        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0][0].content,
            "Analyze this source file and explain what it does:\n\n```\nfn main() {}\n```"
        );

        rig.finish().await;
    }

    #[tokio::test]
    async fn photo_with_no_text_sends_notice_and_no_exchange() {
        let rig = TestRig::spawn(b"jpeg bytes", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("never");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher.handle_message(photo_message()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sends = rig.sends();
        assert_eq!(sends[0].text, IMAGE_ACK);
        assert!(sends.iter().any(|s| s.text == NO_TEXT_NOTICE));
        assert!(completion.calls().is_empty());
        assert!(saved_turns(&sessions).await.is_empty());

        rig.finish().await;
    }

    #[tokio::test]
    async fn photo_with_recognized_text_echoes_and_runs_exchange() {
        let rig = TestRig::spawn(b"jpeg bytes", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("that assigns five");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::with_text("let x = 5;"),
        );

        dispatcher.handle_message(photo_message()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        {
            let requests = rig.requests.lock().expect("requests lock");
            assert!(
                requests.iter().any(|r| matches!(
                    r,
                    CapturedRequest::GetFile { file_id } if file_id == "photo-large"
                )),
                "should download the largest photo size, requests={requests:?}"
            );
        }

        let sends = rig.sends();
        assert_eq!(sends[0].text, IMAGE_ACK);
        let echo = format!("```\nlet x = 5;\n```\n\n{IMAGE_ANALYZING}");
        assert!(
            sends
                .iter()
                .any(|s| s.text == echo && s.parse_mode.as_deref() == Some("Markdown"))
        );
        assert!(sends.iter().any(|s| s.text == "that assigns five"));

        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0][0].content,
            "Analyze this code or error message and explain it:\n\nlet x = 5;"
        );

        let saved = saved_turns(&sessions).await;
        assert_eq!(saved.len(), 2);

        rig.finish().await;
    }

    #[tokio::test]
    async fn extractor_failure_sends_error_notice() {
        let rig = TestRig::spawn(b"jpeg bytes", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("never");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::failing(),
        );

        dispatcher.handle_message(photo_message()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sends = rig.sends();
        assert_eq!(sends[0].text, IMAGE_ACK);
        assert!(sends.iter().any(|s| s.text == ERROR_NOTICE));
        assert!(completion.calls().is_empty());
        assert!(saved_turns(&sessions).await.is_empty());

        rig.finish().await;
    }

    #[tokio::test]
    async fn long_reply_is_delivered_in_paced_segments() {
        let rig = TestRig::spawn(b"", false).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let reply = "r".repeat(5000);
        let completion = RecordingCompletion::replying(&reply);
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher.handle_message(text_message("long answer")).await;
        tokio::time::sleep(Duration::from_millis(900)).await;

        let segments: Vec<String> = rig
            .sends()
            .into_iter()
            .filter(|s| s.text != TEXT_ACK)
            .map(|s| s.text)
            .collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].chars().count(), 4000);
        assert_eq!(segments[1].chars().count(), 1000);
        assert_eq!(segments.concat(), reply);

        rig.finish().await;
    }

    #[tokio::test]
    async fn markdown_rejection_falls_back_to_plain_text() {
        let rig = TestRig::spawn(b"", true).await;
        let sessions = tempfile::tempdir().expect("tempdir");
        let completion = RecordingCompletion::replying("*unbalanced markup");
        let dispatcher = build_dispatcher(
            &rig,
            &sessions,
            Arc::clone(&completion),
            MockExtractor::empty(),
        );

        dispatcher.handle_message(text_message("hello")).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let attempts: Vec<SendMessageRequest> = rig
            .sends()
            .into_iter()
            .filter(|s| s.text == "*unbalanced markup")
            .collect();
        assert_eq!(attempts.len(), 2, "markdown send then plain retry");
        assert_eq!(attempts[0].parse_mode.as_deref(), Some("Markdown"));
        assert!(attempts[1].parse_mode.is_none());

        rig.finish().await;
    }
}
