use crate::features::world::FanpollWorld;
use cucumber::{then, when};
use fanpoll_core::commands::{CreatorCommand, Outcome};
use fanpoll_core::lifecycle::{NewProject, ProjectUpdate};

async fn create_project(world: &mut FanpollWorld, creator: &str, title: String, days: u32, active: bool) {
    let identity = world.creator(creator);
    let project = NewProject {
        title: title.clone(),
        description: "Pick the next cover".into(),
        in_progress: active,
        time_count: days,
        ..Default::default()
    };
    let created = match world.run(identity, CreatorCommand::CreateProject { project }.into()).await {
        Some(Outcome::Project(project)) => Some(project.id.clone()),
        _ => None,
    };
    if let Some(id) = created {
        world.projects.insert(title, id);
    }
}

async fn set_in_progress(world: &mut FanpollWorld, creator: &str, title: &str, in_progress: bool) {
    let identity = world.creator(creator);
    let command = CreatorCommand::UpdateProject {
        project_id: world.project(title).to_string(),
        update: ProjectUpdate { in_progress: Some(in_progress), ..Default::default() },
    };
    world.run(identity, command.into()).await;
}

// ==================== WHEN STEPS ====================

#[when(expr = "creator {string} creates project {string} lasting {int} days")]
async fn create_scheduled(world: &mut FanpollWorld, creator: String, title: String, days: u32) {
    create_project(world, &creator, title, days, false).await;
}

#[when(expr = "creator {string} creates project {string} lasting {int} days, active right away")]
async fn create_active(world: &mut FanpollWorld, creator: String, title: String, days: u32) {
    create_project(world, &creator, title, days, true).await;
}

#[when(expr = "creator {string} deactivates project {string}")]
async fn deactivate(world: &mut FanpollWorld, creator: String, title: String) {
    set_in_progress(world, &creator, &title, false).await;
}

#[when(expr = "creator {string} activates project {string}")]
async fn activate(world: &mut FanpollWorld, creator: String, title: String) {
    set_in_progress(world, &creator, &title, true).await;
}

#[when(expr = "{int} day(s) pass(es)")]
async fn days_pass(world: &mut FanpollWorld, days: i64) {
    world.advance_days(days).await;
}

// ==================== THEN STEPS ====================

#[then(expr = "project {string} is active")]
async fn project_is_active(world: &mut FanpollWorld, title: String) {
    let project_id = world.project(&title);
    let projects = world.platform.catalog().list_projects().await.expect("projects");
    let project = projects.iter().find(|p| p.id == project_id).expect("project exists");
    assert!(project.in_progress, "project {} is not active", title);
}

#[then(expr = "project {string} is not active")]
async fn project_is_inactive(world: &mut FanpollWorld, title: String) {
    let project_id = world.project(&title);
    let projects = world.platform.catalog().list_projects().await.expect("projects");
    let project = projects.iter().find(|p| p.id == project_id).expect("project exists");
    assert!(!project.in_progress, "project {} is active", title);
}

#[then(expr = "project {string} has {int} pending activation(s)")]
async fn pending_activations(world: &mut FanpollWorld, title: String, expected: usize) {
    let project_id = world.project(&title);
    let pending = world.platform.lifecycle().pending(&project_id).await.expect("pending");
    assert_eq!(pending.len(), expected);
}
