//! Plugin system for command handlers.
//!
//! Add new plugins by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_plugin;` below
//! 3. Adding the handler to `command_handler()`

pub mod join;
pub mod nextshow;
pub mod report;
pub mod topic;
pub mod utility;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

/// All bot commands.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "Join a chat")]
    Start(String),

    #[command(description = "Join a chat, e.g. /join chatname")]
    Join(String),

    #[command(description = "Stop joining")]
    Cancel,

    #[command(description = "Revoke invite links (admin chats)")]
    Newlink(String),

    #[command(description = "When is the next show?")]
    Next(String),

    #[command(description = "Report a message to the admins (reply)")]
    Report(String),

    #[command(description = "Report a message to the admins (reply)")]
    Admin(String),

    #[command(description = "Report a message to the admins (reply)")]
    Admins(String),

    #[command(description = "Suggest a chat topic")]
    Topic(String),

    #[command(description = "Set the chat topic silently")]
    Stopic(String),

    #[command(description = "Show chat details")]
    Chatinfo,

    #[command(description = "Show bot version")]
    Version,
}

/// Build the combined command handler.
pub fn command_handler() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    teloxide::filter_command::<Command, _>()
        // Join
        .branch(case![Command::Start(args)].endpoint(join::join_command))
        .branch(case![Command::Join(args)].endpoint(join::join_command))
        .branch(case![Command::Cancel].endpoint(join::cancel_command))
        .branch(case![Command::Newlink(args)].endpoint(join::newlink_command))
        // Next show
        .branch(case![Command::Next(args)].endpoint(nextshow::next_command))
        // Reports
        .branch(case![Command::Report(args)].endpoint(report::report_command))
        .branch(case![Command::Admin(args)].endpoint(report::report_command))
        .branch(case![Command::Admins(args)].endpoint(report::report_command))
        // Topic
        .branch(case![Command::Topic(args)].endpoint(topic::topic_command))
        .branch(case![Command::Stopic(args)].endpoint(topic::stopic_command))
        // Utility
        .branch(case![Command::Chatinfo].endpoint(utility::chatinfo_command))
        .branch(case![Command::Version].endpoint(utility::version_command))
}

/// Build the callback query handler.
pub fn callback_handler() -> UpdateHandler<anyhow::Error> {
    Update::filter_callback_query().endpoint(topic::topic_callback)
}
