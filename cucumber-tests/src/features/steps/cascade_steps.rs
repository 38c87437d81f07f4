use crate::features::world::FanpollWorld;
use cucumber::{then, when};
use fanpoll_core::commands::{CreatorCommand, FanCommand};

#[when(expr = "fan {string} deletes their account")]
async fn delete_fan(world: &mut FanpollWorld, fan: String) {
    let identity = world.fan(&fan);
    world.run(identity, FanCommand::DeleteAccount.into()).await;
}

#[when(expr = "creator {string} deletes their account")]
async fn delete_creator(world: &mut FanpollWorld, creator: String) {
    let identity = world.creator(&creator);
    world.run(identity, CreatorCommand::DeleteAccount.into()).await;
}

#[when(expr = "creator {string} deletes project {string}")]
async fn delete_project(world: &mut FanpollWorld, creator: String, title: String) {
    let identity = world.creator(&creator);
    let project_id = world.project(&title).to_string();
    world.run(identity, CreatorCommand::DeleteProject { project_id }.into()).await;
}

#[when(expr = "creator {string} deletes option {string}")]
async fn delete_option(world: &mut FanpollWorld, creator: String, title: String) {
    let identity = world.creator(&creator);
    let option_id = world.option(&title).to_string();
    world.run(identity, CreatorCommand::DeleteOption { option_id }.into()).await;
}

#[then(expr = "creator {string} no longer exists")]
async fn creator_gone(world: &mut FanpollWorld, creator: String) {
    let creator_id = world.creator(&creator).id;
    assert!(FanpollWorld::is_not_found(world.platform.catalog().get_creator(&creator_id).await));
}

#[then(expr = "fan {string} no longer exists")]
async fn fan_gone(world: &mut FanpollWorld, fan: String) {
    let fan_id = world.fan(&fan).id;
    assert!(FanpollWorld::is_not_found(world.platform.catalog().get_fan(&fan_id).await));
}

#[then(expr = "project {string} no longer exists")]
async fn project_gone(world: &mut FanpollWorld, title: String) {
    let project_id = world.project(&title);
    let projects = world.platform.catalog().list_projects().await.expect("projects");
    assert!(projects.iter().all(|p| p.id != project_id), "project {} still stored", title);
    let pending = world.platform.lifecycle().pending(&project_id).await.expect("pending");
    assert!(pending.is_empty(), "project {} left a timer behind", title);
}

#[then(expr = "option {string} no longer exists")]
async fn option_gone(world: &mut FanpollWorld, title: String) {
    let option_id = world.option(&title);
    assert!(FanpollWorld::is_not_found(world.platform.catalog().get_option(&option_id).await));
}

#[then(expr = "project {string} lists {int} option(s)")]
async fn project_option_count(world: &mut FanpollWorld, title: String, expected: usize) {
    let project_id = world.project(&title);
    let options = world.platform.catalog().project_options(&project_id).await.expect("options");
    assert_eq!(options.len(), expected);
}
