//! Tagged mutation commands
//!
//! Each actor gets its own command set, so a fan can never reach a
//! creator-only mutation through a shared entry point. Ids arrive as raw
//! strings and are parsed before anything touches the store.

use crate::accounts::{Account, ProfileUpdate};
use crate::cascade::CascadeReport;
use crate::catalog::{NewOption, OptionEdit};
use crate::entity::{PollOption, Project};
use crate::graph::FollowOutcome;
use crate::ledger::VoteOutcome;
use crate::lifecycle::{NewProject, ProjectUpdate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FanCommand {
    ToggleFollow { creator_id: String },
    RecordVote { option_id: String },
    RetractVote { option_id: String },
    /// Delete the caller's own fan account
    DeleteAccount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CreatorCommand {
    CreateProject { project: NewProject },
    UpdateProject { project_id: String, update: ProjectUpdate },
    DeleteProject { project_id: String },
    CreateOption { project_id: String, option: NewOption },
    EditOption { option_id: String, edit: OptionEdit },
    DeleteOption { option_id: String },
    /// Delete the caller's own creator account with everything it owns
    DeleteAccount,
}

/// Anything an authenticated caller can ask the platform to change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "as", content = "command", rename_all = "camelCase")]
pub enum Command {
    Fan(FanCommand),
    Creator(CreatorCommand),
    UpdateProfile(ProfileUpdate),
    ChangePassword { current: String, new: String },
}

impl Command {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Fan(FanCommand::ToggleFollow { .. }) => "toggleFollow",
            Command::Fan(FanCommand::RecordVote { .. }) => "recordVote",
            Command::Fan(FanCommand::RetractVote { .. }) => "retractVote",
            Command::Fan(FanCommand::DeleteAccount) => "deleteFan",
            Command::Creator(CreatorCommand::CreateProject { .. }) => "createProject",
            Command::Creator(CreatorCommand::UpdateProject { .. }) => "updateProject",
            Command::Creator(CreatorCommand::DeleteProject { .. }) => "deleteProject",
            Command::Creator(CreatorCommand::CreateOption { .. }) => "createOption",
            Command::Creator(CreatorCommand::EditOption { .. }) => "editOption",
            Command::Creator(CreatorCommand::DeleteOption { .. }) => "deleteOption",
            Command::Creator(CreatorCommand::DeleteAccount) => "deleteCreator",
            Command::UpdateProfile(_) => "updateProfile",
            Command::ChangePassword { .. } => "changePassword",
        }
    }
}

impl From<FanCommand> for Command {
    fn from(command: FanCommand) -> Self {
        Command::Fan(command)
    }
}

impl From<CreatorCommand> for Command {
    fn from(command: CreatorCommand) -> Self {
        Command::Creator(command)
    }
}

/// Result of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Outcome {
    Follow(FollowOutcome),
    Vote(VoteOutcome),
    Project(Project),
    Option(PollOption),
    Account(Account),
    Deleted(CascadeReport),
    PasswordChanged,
}
