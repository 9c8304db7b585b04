//! The dispatch pipeline: dedup, user resolution, ban and rate policy,
//! classification, branch execution, persistence. One invocation per inbound
//! event; the only cross-event state lives in the dedup/rate working sets,
//! chat memory, and the user directory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::bus::{EventPayload, InboundEvent};
use crate::channels::MediaFetcher;
use crate::commands::{CommandContext, CommandRegistry};
use crate::config::Config;
use crate::directory::User;
use crate::extract::ContentExtractor;
use crate::providers::AiProvider;
use crate::session::ChatMemory;
use crate::store::{AiRequestLogEntry, FileLogEntry, MessageLogEntry};
use crate::utils::normalize_phone;

pub mod classify;
pub mod dedup;
pub mod rate_limit;

pub use classify::{Classifier, MessageKind};
pub use dedup::Deduper;
pub use rate_limit::RateLimiter;

/// Expected, policy-driven rejections. Every reason except Duplicate still
/// gets a deterministic user-facing reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Duplicate,
    Banned,
    RateLimited,
    Permission,
    InvalidFile { declared: u64, max: u64 },
}

/// Collaborator faults. Users see a generic apology; detail goes to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AiUnavailable,
    Processing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Handled(String),
    Suppressed(SuppressReason),
    Failed(FailureKind),
}

impl DispatchResult {
    /// Status tag recorded in the message log.
    pub fn status(&self) -> &'static str {
        match self {
            DispatchResult::Handled(_) => "handled",
            DispatchResult::Suppressed(SuppressReason::Duplicate) => "suppressed:duplicate",
            DispatchResult::Suppressed(SuppressReason::Banned) => "suppressed:banned",
            DispatchResult::Suppressed(SuppressReason::RateLimited) => "suppressed:rate-limited",
            DispatchResult::Suppressed(SuppressReason::Permission) => "suppressed:permission",
            DispatchResult::Suppressed(SuppressReason::InvalidFile { .. }) => {
                "suppressed:invalid-file"
            }
            DispatchResult::Failed(FailureKind::AiUnavailable) => "failed:ai-unavailable",
            DispatchResult::Failed(FailureKind::Processing) => "failed:processing",
        }
    }
}

/// Pipeline tunables, lifted out of the config so tests can set them
/// directly.
#[derive(Debug, Clone)]
pub struct RouterPolicy {
    pub command_prefix: String,
    pub rate_cap: u32,
    pub rate_window: Duration,
    pub admin_exempt: bool,
    pub fail_open: bool,
    pub dedup_ttl: Duration,
    pub dedup_max_entries: usize,
    pub max_file_bytes: u64,
    pub ai_timeout: Duration,
    pub document_types: Vec<String>,
    pub image_types: Vec<String>,
    /// Shown in the banned reply when set.
    pub admin_contact: Option<String>,
}

impl RouterPolicy {
    pub fn from_config(config: &Config) -> Self {
        let admin_phone = config.bot.admin_phone.trim();
        Self {
            command_prefix: config.bot.command_prefix.clone(),
            rate_cap: config.limits.rate_per_window,
            rate_window: Duration::from_secs(config.limits.window_secs),
            admin_exempt: config.limits.admin_exempt,
            fail_open: config.limits.fail_open,
            dedup_ttl: Duration::from_secs(config.limits.dedup_ttl_secs),
            dedup_max_entries: config.limits.dedup_max_entries,
            max_file_bytes: config.limits.max_file_bytes,
            ai_timeout: Duration::from_secs(config.limits.ai_timeout_secs),
            document_types: config.limits.supported_document_types.clone(),
            image_types: config.limits.supported_image_types.clone(),
            admin_contact: (!admin_phone.is_empty()).then(|| admin_phone.to_string()),
        }
    }
}

/// What the message log records about the current event; classification
/// refines the payload tag and fills in the command token.
struct LogRecord {
    kind: String,
    command: Option<String>,
}

/// How far a media branch got, for the file log.
#[derive(Default)]
struct MediaProgress {
    file_size: Option<u64>,
    extracted: bool,
    analyzed: bool,
}

pub struct Router {
    deduper: Deduper,
    limiter: RateLimiter,
    classifier: Classifier,
    registry: CommandRegistry,
    memory: ChatMemory,
    ai: Arc<dyn AiProvider>,
    media: Arc<dyn MediaFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    context: CommandContext,
    policy: RouterPolicy,
}

impl Router {
    pub fn new(
        context: CommandContext,
        registry: CommandRegistry,
        ai: Arc<dyn AiProvider>,
        media: Arc<dyn MediaFetcher>,
        extractor: Arc<dyn ContentExtractor>,
        policy: RouterPolicy,
    ) -> Self {
        Self {
            deduper: Deduper::new(policy.dedup_ttl, policy.dedup_max_entries),
            limiter: RateLimiter::new(policy.rate_cap, policy.rate_window),
            classifier: Classifier::new(
                &policy.command_prefix,
                &policy.document_types,
                &policy.image_types,
            ),
            registry,
            memory: ChatMemory::new(),
            ai,
            media,
            extractor,
            context,
            policy,
        }
    }

    /// Run one event through the pipeline. Returns the outcome; rendering and
    /// delivery of the reply stay with the caller.
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchResult {
        if self.deduper.seen(&event.message_id) {
            debug!("suppressing duplicate delivery {}", event.message_id);
            return DispatchResult::Suppressed(SuppressReason::Duplicate);
        }

        let mut record = LogRecord {
            kind: event.payload_kind().to_string(),
            command: None,
        };
        let result = self.process(event, &mut record).await;
        self.log_outcome(event, &record, &result);
        result
    }

    /// Map an outcome to the outbound reply, if any. Every non-duplicate
    /// event gets exactly one.
    pub fn render_reply(&self, result: &DispatchResult) -> Option<String> {
        match result {
            DispatchResult::Handled(reply) => Some(reply.clone()),
            DispatchResult::Suppressed(SuppressReason::Duplicate) => None,
            DispatchResult::Suppressed(SuppressReason::Banned) => Some(self.banned_reply()),
            DispatchResult::Suppressed(SuppressReason::RateLimited) => Some(format!(
                "⏰ Rate limit exceeded! Please wait {} seconds before trying again.",
                self.policy.rate_window.as_secs()
            )),
            DispatchResult::Suppressed(SuppressReason::Permission) => {
                Some("❌ Access denied. Admin privileges required.".to_string())
            }
            DispatchResult::Suppressed(SuppressReason::InvalidFile { max, .. }) => Some(format!(
                "❌ File too large. Maximum size is {}MB.",
                max / (1024 * 1024)
            )),
            DispatchResult::Failed(FailureKind::AiUnavailable) => Some(
                "❌ Sorry, I'm having trouble thinking right now. Please try again! 🤖"
                    .to_string(),
            ),
            DispatchResult::Failed(FailureKind::Processing) => {
                Some("❌ Sorry, something went wrong. Please try again later.".to_string())
            }
        }
    }

    async fn process(&self, event: &InboundEvent, record: &mut LogRecord) -> DispatchResult {
        let user = match self
            .context
            .directory
            .get_or_create(&event.sender, event.sender_name.as_deref())
        {
            Ok(user) => user,
            Err(e) => {
                error!("user resolution failed for {}: {e:#}", event.sender);
                return DispatchResult::Failed(FailureKind::Processing);
            }
        };

        if user.is_banned {
            debug!("dropping event from banned user {}", user.phone);
            return DispatchResult::Suppressed(SuppressReason::Banned);
        }

        if !(user.is_admin && self.policy.admin_exempt) {
            let decision = Ok(self.limiter.allow(&user.phone, Instant::now()));
            if !rate_limit::gate_outcome(decision, self.policy.fail_open) {
                debug!("rate limit hit for {}", user.phone);
                return DispatchResult::Suppressed(SuppressReason::RateLimited);
            }
        }

        match self.classifier.classify(event) {
            MessageKind::Command { name, args } => {
                record.kind = "command".to_string();
                record.command = Some(name.clone());
                self.run_command(&user, &name, &args).await
            }
            MessageKind::Text => match &event.payload {
                EventPayload::Text { body } => self.run_chat(&user, body).await,
                _ => {
                    error!("text classification on non-text payload");
                    DispatchResult::Failed(FailureKind::Processing)
                }
            },
            MessageKind::Document { file_type } => match &event.payload {
                EventPayload::Document {
                    media_id,
                    filename,
                    declared_bytes,
                    ..
                } => {
                    let filename = filename.as_deref().unwrap_or("document");
                    self.run_document(&user, media_id, filename, &file_type, *declared_bytes)
                        .await
                }
                _ => {
                    error!("document classification on non-document payload");
                    DispatchResult::Failed(FailureKind::Processing)
                }
            },
            MessageKind::Image { mime } => match &event.payload {
                EventPayload::Image {
                    media_id,
                    declared_bytes,
                    ..
                } => {
                    self.run_image(&user, media_id, &mime, *declared_bytes)
                        .await
                }
                _ => {
                    error!("image classification on non-image payload");
                    DispatchResult::Failed(FailureKind::Processing)
                }
            },
            MessageKind::Unsupported { kind } => {
                debug!("unsupported content kind {kind} from {}", user.phone);
                DispatchResult::Handled(format!(
                    "🤖 I received your message! Send me text to chat or use {}help for commands.",
                    self.policy.command_prefix
                ))
            }
        }
    }

    async fn run_command(&self, user: &User, name: &str, args: &str) -> DispatchResult {
        let Some(command) = self.registry.get(name) else {
            return DispatchResult::Handled(format!(
                "❓ Unknown command: `{name}`\n\nType `{}help` to see available commands.",
                self.policy.command_prefix
            ));
        };

        if command.admin_only() && !user.is_admin {
            warn!(
                "{} invoked admin command {name} without privileges",
                user.phone
            );
            return DispatchResult::Suppressed(SuppressReason::Permission);
        }

        match command.handle(&self.context, user, args).await {
            Ok(reply) => DispatchResult::Handled(reply),
            Err(e) => {
                error!("command {name} failed for {}: {e:#}", user.phone);
                DispatchResult::Failed(FailureKind::Processing)
            }
        }
    }

    async fn run_chat(&self, user: &User, body: &str) -> DispatchResult {
        let history = self.memory.history(&user.phone);
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.policy.ai_timeout, self.ai.chat(body, &history)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(reply)) => {
                self.memory.record(&user.phone, body, &reply);
                self.record_ai(user, "chat", body, Some(&reply), true, duration_ms);
                DispatchResult::Handled(reply)
            }
            Ok(Err(e)) => {
                error!("chat completion failed for {}: {e:#}", user.phone);
                self.record_ai(user, "chat", body, None, false, duration_ms);
                DispatchResult::Failed(FailureKind::AiUnavailable)
            }
            Err(_) => {
                error!(
                    "chat completion for {} timed out after {:?}",
                    user.phone, self.policy.ai_timeout
                );
                self.record_ai(user, "chat", body, None, false, duration_ms);
                DispatchResult::Failed(FailureKind::AiUnavailable)
            }
        }
    }

    async fn run_document(
        &self,
        user: &User,
        media_id: &str,
        filename: &str,
        file_type: &str,
        declared_bytes: Option<u64>,
    ) -> DispatchResult {
        if let Some(declared) = declared_bytes
            && declared > self.policy.max_file_bytes
        {
            debug!(
                "declared document size {declared} exceeds cap for {}",
                user.phone
            );
            return DispatchResult::Suppressed(SuppressReason::InvalidFile {
                declared,
                max: self.policy.max_file_bytes,
            });
        }

        let mut progress = MediaProgress::default();
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.policy.ai_timeout,
            self.document_chain(media_id, filename, file_type, &mut progress),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let prompt = format!("File: {filename}");
        let result = match outcome {
            Ok(Ok(analysis)) => {
                self.record_ai(
                    user,
                    "file_analysis",
                    &prompt,
                    Some(&analysis),
                    true,
                    duration_ms,
                );
                DispatchResult::Handled(format!("📄 *File Analysis: {filename}*\n\n{analysis}"))
            }
            Ok(Err(e)) => {
                error!(
                    "document processing of {filename} failed for {}: {e:#}",
                    user.phone
                );
                if progress.extracted {
                    self.record_ai(user, "file_analysis", &prompt, None, false, duration_ms);
                }
                DispatchResult::Failed(FailureKind::Processing)
            }
            Err(_) => {
                error!(
                    "document processing of {filename} for {} timed out after {:?}",
                    user.phone, self.policy.ai_timeout
                );
                if progress.extracted {
                    self.record_ai(user, "file_analysis", &prompt, None, false, duration_ms);
                }
                DispatchResult::Failed(FailureKind::Processing)
            }
        };
        self.record_file(user, filename, file_type, &progress, duration_ms);
        result
    }

    async fn document_chain(
        &self,
        media_id: &str,
        filename: &str,
        file_type: &str,
        progress: &mut MediaProgress,
    ) -> anyhow::Result<String> {
        let download = self.media.fetch(media_id).await?;
        progress.file_size = Some(download.bytes.len() as u64);
        let content = self.extractor.extract(&download.bytes, file_type)?;
        progress.extracted = true;
        let analysis = self.ai.analyze_text(&content, filename, file_type).await?;
        progress.analyzed = true;
        Ok(analysis)
    }

    async fn run_image(
        &self,
        user: &User,
        media_id: &str,
        mime: &str,
        declared_bytes: Option<u64>,
    ) -> DispatchResult {
        if let Some(declared) = declared_bytes
            && declared > self.policy.max_file_bytes
        {
            debug!(
                "declared image size {declared} exceeds cap for {}",
                user.phone
            );
            return DispatchResult::Suppressed(SuppressReason::InvalidFile {
                declared,
                max: self.policy.max_file_bytes,
            });
        }

        let subtype = mime.strip_prefix("image/").unwrap_or("bin");
        let image_name = format!("image.{subtype}");
        let mut progress = MediaProgress::default();
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.policy.ai_timeout,
            self.image_chain(media_id, &mut progress),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let prompt = format!("Image: {image_name}");
        let result = match outcome {
            Ok(Ok(analysis)) => {
                self.record_ai(
                    user,
                    "image_analysis",
                    &prompt,
                    Some(&analysis),
                    true,
                    duration_ms,
                );
                DispatchResult::Handled(format!("🖼️ *Image Analysis*\n\n{analysis}"))
            }
            Ok(Err(e)) => {
                error!("image analysis failed for {}: {e:#}", user.phone);
                if progress.file_size.is_some() {
                    self.record_ai(user, "image_analysis", &prompt, None, false, duration_ms);
                }
                DispatchResult::Failed(FailureKind::Processing)
            }
            Err(_) => {
                error!(
                    "image analysis for {} timed out after {:?}",
                    user.phone, self.policy.ai_timeout
                );
                if progress.file_size.is_some() {
                    self.record_ai(user, "image_analysis", &prompt, None, false, duration_ms);
                }
                DispatchResult::Failed(FailureKind::Processing)
            }
        };
        self.record_file(user, &image_name, subtype, &progress, duration_ms);
        result
    }

    async fn image_chain(
        &self,
        media_id: &str,
        progress: &mut MediaProgress,
    ) -> anyhow::Result<String> {
        let download = self.media.fetch(media_id).await?;
        progress.file_size = Some(download.bytes.len() as u64);
        progress.extracted = true;
        let analysis = self.ai.analyze_image(&download.bytes, &download.mime).await?;
        progress.analyzed = true;
        Ok(analysis)
    }

    fn banned_reply(&self) -> String {
        let mut reply = "❌ You are banned from using this bot.".to_string();
        if let Some(admin) = &self.policy.admin_contact {
            reply.push_str(&format!(
                " Please contact the admin at {admin} for more information."
            ));
        }
        reply
    }

    fn log_outcome(&self, event: &InboundEvent, record: &LogRecord, result: &DispatchResult) {
        let phone = normalize_phone(&event.sender);
        let content = event.content_preview();
        let entry = MessageLogEntry {
            message_id: &event.message_id,
            phone: &phone,
            group_id: event.group_id.as_deref(),
            kind: &record.kind,
            command: record.command.as_deref(),
            content: &content,
            status: result.status(),
        };
        if let Err(e) = self.context.store.log_message(&entry) {
            error!("failed to record message log entry: {e:#}");
        }
    }

    fn record_ai(
        &self,
        user: &User,
        request_type: &str,
        prompt: &str,
        response: Option<&str>,
        success: bool,
        duration_ms: u64,
    ) {
        let entry = AiRequestLogEntry {
            phone: &user.phone,
            request_type,
            prompt,
            response,
            success,
            duration_ms,
        };
        if let Err(e) = self.context.store.log_ai_request(&entry) {
            error!("failed to record ai request: {e:#}");
        }
    }

    fn record_file(
        &self,
        user: &User,
        filename: &str,
        file_type: &str,
        progress: &MediaProgress,
        duration_ms: u64,
    ) {
        let entry = FileLogEntry {
            phone: &user.phone,
            filename,
            file_type,
            file_size: progress.file_size.unwrap_or(0),
            extracted: progress.extracted,
            analyzed: progress.analyzed,
            duration_ms,
        };
        if let Err(e) = self.context.store.log_file(&entry) {
            error!("failed to record file log entry: {e:#}");
        }
    }
}
