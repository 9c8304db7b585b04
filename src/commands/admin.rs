use std::fmt::Write;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use tracing::{info, warn};

use super::{Command, CommandContext};
use crate::directory::{BanOutcome, UnbanOutcome, User};
use crate::utils::parse_phone_target;

const BAN_NOTICE: &str = "🚫 You have been banned from using this bot. \
If you believe this is a mistake, please contact support.";
const UNBAN_NOTICE: &str = "🎉 You have been unbanned! Welcome back to the bot.";

/// `/admin`: quick stats plus the admin command reference.
pub struct AdminPanelCommand;

#[async_trait]
impl Command for AdminPanelCommand {
    fn name(&self) -> &str {
        "admin"
    }

    fn admin_only(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        ctx: &CommandContext,
        _user: &User,
        _args: &str,
    ) -> anyhow::Result<String> {
        let stats = ctx.store.stats()?;
        let p = &ctx.command_prefix;

        let mut text = format!("👑 *{} - Admin Panel*\n\n", ctx.bot_name);
        text.push_str("📊 *Quick Stats:*\n");
        let _ = writeln!(text, "• Total Users: {}", stats.total_users);
        let _ = writeln!(text, "• Total Messages: {}", stats.total_messages);
        let _ = writeln!(text, "• Active Today: {}", stats.active_today);
        let _ = writeln!(text, "• AI Requests: {}", stats.ai_requests);
        text.push('\n');

        text.push_str("🛠️ *Available Actions:*\n");
        let _ = writeln!(text, "`{p}stats` - Detailed statistics");
        let _ = writeln!(text, "`{p}broadcast <msg>` - Send to all users");
        let _ = writeln!(text, "`{p}ban <phone>` - Ban user");
        let _ = write!(text, "`{p}unban <phone>` - Unban user");

        Ok(text)
    }
}

/// `/stats`: full usage statistics.
pub struct StatsCommand;

#[async_trait]
impl Command for StatsCommand {
    fn name(&self) -> &str {
        "stats"
    }

    fn admin_only(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        ctx: &CommandContext,
        _user: &User,
        _args: &str,
    ) -> anyhow::Result<String> {
        let stats = ctx.store.stats()?;
        let p = &ctx.command_prefix;

        let mut text = format!("📊 *{} - Statistics*\n\n", ctx.bot_name);
        text.push_str("👥 *User Statistics:*\n");
        let _ = writeln!(text, "• Total Users: {}", stats.total_users);
        let _ = writeln!(text, "• Active Today: {}", stats.active_today);
        let _ = writeln!(text, "• Admins: {}", stats.admin_users);
        let _ = writeln!(text, "• Banned: {}", stats.banned_users);
        text.push('\n');

        text.push_str("💬 *Message Statistics:*\n");
        let _ = writeln!(text, "• Total Messages: {}", stats.total_messages);
        let _ = writeln!(text, "• Messages Today: {}", stats.messages_today);
        let _ = writeln!(text, "• Commands Used: {}", stats.commands_used);
        let _ = writeln!(text, "• AI Requests: {}", stats.ai_requests);
        let _ = writeln!(text, "• Files Processed: {}", stats.files_processed);
        text.push('\n');

        if !stats.top_commands.is_empty() {
            text.push_str("🔥 *Popular Commands:*\n");
            for (command, uses) in &stats.top_commands {
                let _ = writeln!(text, "• {p}{command}: {uses} uses");
            }
            text.push('\n');
        }

        text.push_str("⚙️ *System Information:*\n");
        let _ = writeln!(text, "• Bot Prefix: {p}");
        let _ = write!(
            text,
            "• Last Updated: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );

        Ok(text)
    }
}

/// `/broadcast <message>`: concurrent announcement to every non-banned user
/// except the sender.
pub struct BroadcastCommand;

#[async_trait]
impl Command for BroadcastCommand {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn admin_only(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        ctx: &CommandContext,
        user: &User,
        args: &str,
    ) -> anyhow::Result<String> {
        let message = args.trim();
        if message.is_empty() {
            return Ok(format!(
                "❌ Usage: `{}broadcast <message>`",
                ctx.command_prefix
            ));
        }

        let targets: Vec<String> = ctx
            .store
            .broadcast_targets()?
            .into_iter()
            .filter(|phone| *phone != user.phone)
            .collect();
        if targets.is_empty() {
            return Ok("❌ No active users found.".to_string());
        }

        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let body = format!("📢 *Broadcast Message*\n\n{message}\n\n_Sent by admin at {stamp}_");

        let results = join_all(targets.iter().map(|to| ctx.sender.send_text(to, &body))).await;
        let mut sent = 0usize;
        let mut failed = 0usize;
        for (to, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("broadcast delivery to {to} failed: {e:#}");
                    failed += 1;
                }
            }
        }
        info!("broadcast by {}: {sent} sent, {failed} failed", user.phone);

        let mut text = format!("📢 *Broadcast Complete*\n\n✅ Sent to: {sent} users\n");
        if failed > 0 {
            let _ = writeln!(text, "❌ Failed: {failed} users");
        }
        let _ = write!(text, "\nMessage: _{message}_");
        Ok(text)
    }
}

/// `/ban <target>`: flag a user as banned and notify them, best effort.
pub struct BanCommand;

#[async_trait]
impl Command for BanCommand {
    fn name(&self) -> &str {
        "ban"
    }

    fn admin_only(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        ctx: &CommandContext,
        user: &User,
        args: &str,
    ) -> anyhow::Result<String> {
        let Some(target) = parse_phone_target(args) else {
            if args.trim().is_empty() {
                return Ok(format!(
                    "❌ Usage: `{}ban <phone_number>`",
                    ctx.command_prefix
                ));
            }
            return Ok(format!("❌ User {} not found.", args.trim()));
        };

        match ctx.directory.ban(&target)? {
            BanOutcome::Banned => {
                if let Err(e) = ctx.sender.send_text(&target, BAN_NOTICE).await {
                    warn!("could not notify banned user {target}: {e:#}");
                }
                info!("user {target} banned by admin {}", user.phone);
                Ok(format!("✅ User {target} has been banned."))
            }
            BanOutcome::AlreadyBanned => Ok(format!("⚠️ User {target} is already banned.")),
            BanOutcome::NotFound => Ok(format!("❌ User {target} not found.")),
            BanOutcome::IsAdmin => Ok("❌ Cannot ban an admin user.".to_string()),
        }
    }
}

/// `/unban <target>`: clear the banned flag and notify, best effort.
pub struct UnbanCommand;

#[async_trait]
impl Command for UnbanCommand {
    fn name(&self) -> &str {
        "unban"
    }

    fn admin_only(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        ctx: &CommandContext,
        user: &User,
        args: &str,
    ) -> anyhow::Result<String> {
        let Some(target) = parse_phone_target(args) else {
            if args.trim().is_empty() {
                return Ok(format!(
                    "❌ Usage: `{}unban <phone_number>`",
                    ctx.command_prefix
                ));
            }
            return Ok(format!("❌ User {} not found.", args.trim()));
        };

        match ctx.directory.unban(&target)? {
            UnbanOutcome::Unbanned => {
                if let Err(e) = ctx.sender.send_text(&target, UNBAN_NOTICE).await {
                    warn!("could not notify unbanned user {target}: {e:#}");
                }
                info!("user {target} unbanned by admin {}", user.phone);
                Ok(format!("✅ User {target} has been unbanned."))
            }
            UnbanOutcome::NotBanned => Ok(format!("⚠️ User {target} is not banned.")),
            UnbanOutcome::NotFound => Ok(format!("❌ User {target} not found.")),
        }
    }
}
