use crate::features::world::FanpollWorld;
use cucumber::{then, when};
use fanpoll_core::commands::FanCommand;

#[when(expr = "fan {string} votes for option {string}")]
async fn vote(world: &mut FanpollWorld, fan: String, option: String) {
    let identity = world.fan(&fan);
    let option_id = world.option(&option).to_string();
    world.run(identity, FanCommand::RecordVote { option_id }.into()).await;
}

#[when(expr = "fan {string} retracts the vote for option {string}")]
async fn retract(world: &mut FanpollWorld, fan: String, option: String) {
    let identity = world.fan(&fan);
    let option_id = world.option(&option).to_string();
    world.run(identity, FanCommand::RetractVote { option_id }.into()).await;
}

#[when(expr = "fans {string} and {string} vote for option {string} at the same time")]
async fn vote_together(world: &mut FanpollWorld, first: String, second: String, option: String) {
    let first = world.fan(&first);
    let second = world.fan(&second);
    let option_id = world.option(&option).to_string();
    let platform = &world.platform;

    let (a, b) = tokio::join!(
        platform.handle(Some(&first), FanCommand::RecordVote { option_id: option_id.clone() }.into()),
        platform.handle(Some(&second), FanCommand::RecordVote { option_id: option_id.clone() }.into()),
    );
    assert!(a.is_ok() && b.is_ok(), "vote failed: {:?} / {:?}", a, b);
}

#[then(expr = "option {string} has {int} vote(s)")]
async fn option_counter(world: &mut FanpollWorld, option: String, expected: u64) {
    let option_id = world.option(&option);
    let record = world.platform.catalog().get_option(&option_id).await.expect("option");
    assert_eq!(record.counter, expected);
}

#[then(expr = "fan {string} has voted for option {string}")]
async fn has_voted(world: &mut FanpollWorld, fan: String, option: String) {
    let fan_id = world.fan(&fan).id;
    let option_id = world.option(&option);
    assert!(world.platform.ledger().has_voted(&fan_id, &option_id).await.expect("vote lookup"));
}

#[then(expr = "fan {string} has not voted for option {string}")]
async fn has_not_voted(world: &mut FanpollWorld, fan: String, option: String) {
    let fan_id = world.fan(&fan).id;
    let option_id = world.option(&option);
    assert!(!world.platform.ledger().has_voted(&fan_id, &option_id).await.expect("vote lookup"));
}
