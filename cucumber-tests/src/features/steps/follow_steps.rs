use crate::features::world::FanpollWorld;
use cucumber::{then, when};
use fanpoll_core::commands::FanCommand;

#[when(expr = "fan {string} toggles follow on creator {string}")]
async fn toggle_follow(world: &mut FanpollWorld, fan: String, creator: String) {
    let identity = world.fan(&fan);
    let creator_id = world.creator(&creator).id.to_string();
    world.run(identity, FanCommand::ToggleFollow { creator_id }.into()).await;
}

#[when(expr = "fan {string} toggles follow on creator {string} {int} times concurrently")]
async fn toggle_follow_concurrently(world: &mut FanpollWorld, fan: String, creator: String, times: usize) {
    let identity = world.fan(&fan);
    let creator_id = world.creator(&creator).id.to_string();
    let platform = &world.platform;

    let toggles = (0..times).map(|_| {
        let command = FanCommand::ToggleFollow { creator_id: creator_id.clone() };
        platform.handle(Some(&identity), command.into())
    });
    let results = futures::future::join_all(toggles).await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(failed, 0, "{} toggle(s) failed", failed);
    println!("✅ {} concurrent toggles applied", times);
}

#[then(expr = "fan {string} follows creator {string}")]
async fn fan_follows(world: &mut FanpollWorld, fan: String, creator: String) {
    let fan_id = world.fan(&fan).id;
    let creator_id = world.creator(&creator).id;

    let fan_record = world.platform.catalog().get_fan(&fan_id).await.expect("fan");
    let creator_record = world.platform.catalog().get_creator(&creator_id).await.expect("creator");
    assert_eq!(fan_record.favorite_creators, vec![creator_id]);
    assert_eq!(creator_record.fans, vec![fan_id]);
}

#[then(expr = "fan {string} does not follow creator {string}")]
async fn fan_does_not_follow(world: &mut FanpollWorld, fan: String, creator: String) {
    let fan_id = world.fan(&fan).id;
    let creator_id = world.creator(&creator).id;

    let fan_record = world.platform.catalog().get_fan(&fan_id).await.expect("fan");
    assert!(!fan_record.favorite_creators.contains(&creator_id));
    if let Ok(creator_record) = world.platform.catalog().get_creator(&creator_id).await {
        assert!(!creator_record.fans.contains(&fan_id));
    }
}

#[then(expr = "creator {string} has {int} follower(s)")]
async fn follower_count(world: &mut FanpollWorld, creator: String, expected: usize) {
    let creator_id = world.creator(&creator).id;
    let followers = world.platform.graph().followers(&creator_id).await.expect("followers");
    assert_eq!(followers.len(), expected);
}
