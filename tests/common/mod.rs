// Shared test helpers, not every test binary uses all of them.
#![allow(unused)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use warbler::bus::{EventPayload, InboundEvent};
use warbler::channels::{MediaDownload, MediaFetcher, OutboundSender};
use warbler::commands::{CommandContext, CommandRegistry};
use warbler::config::Config;
use warbler::directory::UserDirectory;
use warbler::extract::TextExtractor;
use warbler::providers::AiProvider;
use warbler::router::{DispatchResult, Router, RouterPolicy};
use warbler::session::ChatTurn;
use warbler::store::Store;

/// Admin phone used by the test fixtures.
pub const ADMIN: &str = "19990001111";

/// Records outbound replies instead of hitting the network.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sender lock").clone()
    }
}

#[async_trait]
impl OutboundSender for RecordingSender {
    async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("sender lock")
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// Deterministic AI stand-in: echoes chat prompts and describes analyses.
#[derive(Default)]
pub struct ScriptedAi {
    pub chat_calls: AtomicUsize,
}

#[async_trait]
impl AiProvider for ScriptedAi {
    async fn chat(&self, prompt: &str, _history: &[ChatTurn]) -> anyhow::Result<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("echo: {prompt}"))
    }

    async fn analyze_text(
        &self,
        content: &str,
        filename: &str,
        _file_type: &str,
    ) -> anyhow::Result<String> {
        Ok(format!("summary of {filename} ({} bytes)", content.len()))
    }

    async fn analyze_image(&self, bytes: &[u8], mime: &str) -> anyhow::Result<String> {
        Ok(format!("a {mime} image of {} bytes", bytes.len()))
    }
}

/// Serves one fixed blob for any media id.
pub struct StaticMedia {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[async_trait]
impl MediaFetcher for StaticMedia {
    async fn fetch(&self, _media_id: &str) -> anyhow::Result<MediaDownload> {
        Ok(MediaDownload {
            bytes: self.bytes.clone(),
            mime: self.mime.clone(),
        })
    }
}

/// A full pipeline wired like the serve subcommand, minus the HTTP layer.
pub struct TestBot {
    pub _dir: TempDir,
    pub router: Router,
    pub store: Arc<Store>,
    pub directory: Arc<UserDirectory>,
    pub sender: Arc<RecordingSender>,
    pub ai: Arc<ScriptedAi>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.bot.admin_phone = ADMIN.to_string();
    config
}

pub fn test_bot() -> TestBot {
    test_bot_with(test_config())
}

pub fn test_bot_with(config: Config) -> TestBot {
    let dir = TempDir::new().expect("create temp dir");
    let store = Arc::new(Store::new(dir.path().join("warbler.db")).expect("open store"));
    let admins: Vec<String> = vec![config.admin_digits()]
        .into_iter()
        .filter(|a| !a.is_empty())
        .collect();
    let directory = Arc::new(UserDirectory::new(store.clone(), &admins));
    let sender = Arc::new(RecordingSender::default());
    let ai = Arc::new(ScriptedAi::default());
    let media = Arc::new(StaticMedia {
        bytes: b"name,count\nalpha,1\n".to_vec(),
        mime: "text/csv".to_string(),
    });

    let context = CommandContext {
        store: store.clone(),
        directory: directory.clone(),
        sender: sender.clone(),
        bot_name: config.bot.name.clone(),
        command_prefix: config.bot.command_prefix.clone(),
    };
    let router = Router::new(
        context,
        CommandRegistry::with_builtins(),
        ai.clone(),
        media,
        Arc::new(TextExtractor::new(config.limits.max_file_bytes as usize)),
        RouterPolicy::from_config(&config),
    );

    TestBot {
        _dir: dir,
        router,
        store,
        directory,
        sender,
        ai,
    }
}

/// Dispatch one event and deliver the rendered reply, the way the serve
/// loop does.
pub async fn deliver(bot: &TestBot, event: &InboundEvent) -> DispatchResult {
    let result = bot.router.dispatch(event).await;
    if let Some(reply) = bot.router.render_reply(&result) {
        bot.sender
            .send_text(&event.sender, &reply)
            .await
            .expect("recording sender never fails");
    }
    result
}

pub fn text_event(id: &str, sender: &str, body: &str) -> InboundEvent {
    InboundEvent::text(id, sender, body)
}

pub fn document_event(id: &str, sender: &str, filename: &str) -> InboundEvent {
    InboundEvent {
        message_id: id.to_string(),
        sender: sender.to_string(),
        sender_name: None,
        group_id: None,
        timestamp: chrono::Utc::now(),
        payload: EventPayload::Document {
            media_id: "media-1".to_string(),
            filename: Some(filename.to_string()),
            mime_type: Some("text/csv".to_string()),
            declared_bytes: Some(19),
            caption: None,
        },
    }
}
