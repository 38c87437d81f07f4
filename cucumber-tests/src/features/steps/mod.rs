// Accounts, seeding and assertions shared by every feature
pub mod common_steps;

pub mod cascade_steps;
pub mod follow_steps;
pub mod lifecycle_steps;
pub mod vote_steps;
