use crate::features::world::FanpollWorld;
use cucumber::{given, then};
use fanpoll_core::catalog::NewOption;
use fanpoll_core::commands::{CreatorCommand, Outcome};
use fanpoll_core::lifecycle::NewProject;

// ==================== GIVEN STEPS ====================

#[given(expr = "a creator {string}")]
async fn given_creator(world: &mut FanpollWorld, name: String) {
    world.register_creator(&name).await;
}

#[given(expr = "a fan {string}")]
async fn given_fan(world: &mut FanpollWorld, name: String) {
    world.register_fan(&name).await;
}

#[given(expr = "creator {string} runs an active project {string} with options {string} and {string}")]
async fn given_active_project(
    world: &mut FanpollWorld,
    creator: String,
    title: String,
    first: String,
    second: String,
) {
    let identity = world.creator(&creator);
    let project = NewProject {
        title: title.clone(),
        description: format!("{} campaign", title),
        in_progress: true,
        time_count: 7,
        ..Default::default()
    };
    let project_id = match world
        .run(identity.clone(), CreatorCommand::CreateProject { project }.into())
        .await
    {
        Some(Outcome::Project(project)) => project.id.clone(),
        other => panic!("project not created: {:?} / {:?}", other, world.last_error),
    };
    world.projects.insert(title, project_id.clone());

    for option_title in [first, second] {
        let option = NewOption {
            title: option_title.clone(),
            description: format!("Vote for {}", option_title),
            ..Default::default()
        };
        let command = CreatorCommand::CreateOption { project_id: project_id.to_string(), option };
        let option_id = match world.run(identity.clone(), command.into()).await {
            Some(Outcome::Option(option)) => option.id.clone(),
            other => panic!("option not created: {:?} / {:?}", other, world.last_error),
        };
        world.options.insert(option_title, option_id);
    }
}

// ==================== THEN STEPS ====================

#[then("the last command succeeds")]
async fn last_command_succeeds(world: &mut FanpollWorld) {
    assert!(world.last_error.is_none(), "command failed: {:?}", world.last_error);
}

#[then(expr = "the last command fails with {word}")]
async fn last_command_fails_with(world: &mut FanpollWorld, kind: String) {
    let report = world.last_error.as_ref().expect("last command succeeded");
    assert_eq!(format!("{:?}", report.kind), kind, "unexpected failure: {}", report);
}

#[then("the store is consistent")]
async fn store_is_consistent(world: &mut FanpollWorld) {
    let report = world.platform.check_consistency().await.expect("consistency check");
    assert!(report.is_consistent(), "inconsistent store: {:?}", report);
}
