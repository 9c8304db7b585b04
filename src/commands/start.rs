use std::fmt::Write;

use async_trait::async_trait;

use super::{Command, CommandContext};
use crate::directory::User;

/// `/start`: welcome message with a capability overview.
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    fn name(&self) -> &str {
        "start"
    }

    async fn handle(
        &self,
        ctx: &CommandContext,
        user: &User,
        _args: &str,
    ) -> anyhow::Result<String> {
        let p = &ctx.command_prefix;
        let mut text = format!("🎉 *Welcome to {}!*\n\n", ctx.bot_name);
        match &user.name {
            Some(name) => {
                let _ = writeln!(text, "Hello {name}! 👋");
            }
            None => text.push_str("Hello there! 👋\n"),
        }
        text.push('\n');

        text.push_str("🤖 I'm an AI-powered WhatsApp bot with amazing capabilities:\n\n");

        text.push_str("💬 *Chat Features:*\n");
        text.push_str("• Intelligent conversations with AI\n");
        text.push_str("• Fun and engaging responses\n");
        text.push_str("• Contextual understanding\n\n");

        text.push_str("📄 *File Analysis:*\n");
        text.push_str("• Code analysis (Python, JS, etc.)\n");
        text.push_str("• Document processing\n");
        text.push_str("• HTML, JSON, CSV parsing\n\n");

        text.push_str("🖼️ *Image Analysis:*\n");
        text.push_str("• Describe images in detail\n");
        text.push_str("• Extract text from images\n");
        text.push_str("• Object and scene recognition\n\n");

        if user.is_admin {
            text.push_str("👑 *Admin Features:*\n");
            text.push_str("• User moderation\n");
            text.push_str("• Broadcast messages\n");
            text.push_str("• Bot statistics\n\n");
        }

        text.push_str("🚀 *Getting Started:*\n");
        let _ = writeln!(text, "• Type `{p}help` for all commands");
        text.push_str("• Send me any message to start chatting\n");
        text.push_str("• Send images or files for analysis\n\n");

        text.push_str("Let's start our conversation! What would you like to do? 😊");

        Ok(text)
    }
}
