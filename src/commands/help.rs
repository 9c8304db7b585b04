use std::fmt::Write;

use async_trait::async_trait;

use super::{Command, CommandContext};
use crate::directory::User;

/// `/help`: command list and feature overview, with the admin section
/// appended for admins.
pub struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    async fn handle(
        &self,
        ctx: &CommandContext,
        user: &User,
        _args: &str,
    ) -> anyhow::Result<String> {
        let p = &ctx.command_prefix;
        let mut text = format!("🤖 *{} - Help*\n\n", ctx.bot_name);
        text.push_str("📚 *Available Commands:*\n\n");
        let _ = writeln!(text, "`{p}start` - Start conversation with bot");
        let _ = writeln!(text, "`{p}help` - Show this help message");
        text.push('\n');

        text.push_str("🧠 *AI Features:*\n");
        text.push_str("• Send any text message for AI chat\n");
        text.push_str("• Send images for AI analysis\n");
        text.push_str("• Send documents for content analysis\n");
        text.push_str("• Supported files: TXT, HTML, JSON, CSV, XML, YAML, code files\n\n");

        if user.is_admin {
            text.push_str("👑 *Admin Commands:*\n");
            let _ = writeln!(text, "`{p}admin` - Show admin panel");
            let _ = writeln!(text, "`{p}broadcast <message>` - Broadcast to all users");
            let _ = writeln!(text, "`{p}ban <user>` - Ban a user");
            let _ = writeln!(text, "`{p}unban <user>` - Unban a user");
            let _ = writeln!(text, "`{p}stats` - Show bot statistics");
            text.push('\n');
        }

        text.push_str("💡 *Tips:*\n");
        text.push_str("• Just send me a message to start chatting!\n");
        text.push_str("• I can analyze images and extract text\n");
        text.push_str("• Send me documents for detailed analysis");

        Ok(text)
    }
}
