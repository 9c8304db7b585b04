use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::channels::OutboundSender;
use crate::directory::{User, UserDirectory};
use crate::store::Store;

mod admin;
mod help;
mod start;

pub use admin::{AdminPanelCommand, BanCommand, BroadcastCommand, StatsCommand, UnbanCommand};
pub use help::HelpCommand;
pub use start::StartCommand;

/// Shared handles available to every command handler.
pub struct CommandContext {
    pub store: Arc<Store>,
    pub directory: Arc<UserDirectory>,
    pub sender: Arc<dyn OutboundSender>,
    pub bot_name: String,
    pub command_prefix: String,
}

/// A chat command. Handlers return the reply text; delivery back to the
/// invoking user is the caller's job. Side sends (broadcast fan-out, ban
/// notices) go through `ctx.sender` directly.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// Admin-only commands are refused upstream; `handle` can assume the
    /// caller is authorized.
    fn admin_only(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &CommandContext, user: &User, args: &str)
    -> anyhow::Result<String>;
}

pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in command set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HelpCommand));
        registry.register(Arc::new(StartCommand));
        registry.register(Arc::new(AdminPanelCommand));
        registry.register(Arc::new(StatsCommand));
        registry.register(Arc::new(BroadcastCommand));
        registry.register(Arc::new(BanCommand));
        registry.register(Arc::new(UnbanCommand));
        registry
    }

    pub fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_string();
        if name.is_empty() || name.chars().any(char::is_control) {
            warn!("command registry: rejecting command with invalid name");
            return;
        }
        if self.commands.contains_key(&name) {
            warn!("command registry: overwriting duplicate command '{name}'");
        }
        self.commands.insert(name, command);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Sorted command names, for startup logging.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures outbound sends so tests can assert on fan-out.
    pub(crate) struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        /// Numbers for which send_text should fail.
        pub(crate) failing: Vec<String>,
    }

    impl RecordingSender {
        pub(crate) fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: Vec::new(),
            }
        }

        pub(crate) fn failing_for(numbers: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: numbers.iter().map(|s| s.to_string()).collect(),
            }
        }

        pub(crate) fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
            if self.failing.iter().any(|n| n == to) {
                anyhow::bail!("delivery refused for {to}");
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    pub(crate) fn context(
        dir: &tempfile::TempDir,
        sender: Arc<RecordingSender>,
        admins: &[&str],
    ) -> CommandContext {
        let store = Arc::new(Store::new(dir.path().join("commands.db")).unwrap());
        let admins: Vec<String> = admins.iter().map(|s| s.to_string()).collect();
        let directory = Arc::new(UserDirectory::new(store.clone(), &admins));
        CommandContext {
            store,
            directory,
            sender,
            bot_name: "Warbler".to_string(),
            command_prefix: "/".to_string(),
        }
    }
}
