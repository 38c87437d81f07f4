//! Whole-store consistency check
//!
//! Scans every collection and reports each violation of the relationship
//! invariants. Meant for tests, operators and post-incident checks after a
//! partial failure; it takes no locks, so run it on a quiet store.

use crate::context::EngineContext;
use crate::entity::{fields, Creator, Fan, PollOption, Project};
use crate::error::EngineResult;
use crate::id::{EntityId, EntityKind};
use crate::store::{self, Filter, Patch};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterMismatch {
    pub option_id: EntityId,
    pub stored: u64,
    pub actual: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// `counter` differs from the number of fans holding the option
    pub counter_mismatches: Vec<CounterMismatch>,
    /// (fan, creator) pairs recorded on one side only
    pub asymmetric_follows: Vec<(EntityId, EntityId)>,
    /// (fan, option) votes for options that no longer exist
    pub dangling_votes: Vec<(EntityId, EntityId)>,
    /// Options whose project is gone
    pub orphan_options: Vec<EntityId>,
    /// Projects whose creator is gone
    pub orphan_projects: Vec<EntityId>,
    /// (owner, missing child) entries in `projects` / `options` arrays
    pub dangling_links: Vec<(EntityId, EntityId)>,
    /// Emails used by more than one account
    pub duplicate_emails: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.counter_mismatches.is_empty()
            && self.asymmetric_follows.is_empty()
            && self.dangling_votes.is_empty()
            && self.orphan_options.is_empty()
            && self.orphan_projects.is_empty()
            && self.dangling_links.is_empty()
            && self.duplicate_emails.is_empty()
    }
}

#[derive(Clone)]
pub struct Auditor {
    ctx: EngineContext,
}

impl Auditor {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub async fn check(&self) -> EngineResult<ConsistencyReport> {
        let store = self.ctx.store();
        let creators: Vec<Creator> = store::load_where(store, &Filter::All).await?;
        let fans: Vec<Fan> = store::load_where(store, &Filter::All).await?;
        let projects: Vec<Project> = store::load_where(store, &Filter::All).await?;
        let options: Vec<PollOption> = store::load_where(store, &Filter::All).await?;

        let creator_ids: HashSet<&EntityId> = creators.iter().map(|c| &c.id).collect();
        let project_ids: HashSet<&EntityId> = projects.iter().map(|p| &p.id).collect();
        let option_ids: HashSet<&EntityId> = options.iter().map(|o| &o.id).collect();

        let mut report = ConsistencyReport::default();

        // counters and vote liveness
        let mut votes: HashMap<&EntityId, u64> = HashMap::new();
        for fan in &fans {
            for option_id in &fan.votes {
                if option_ids.contains(option_id) {
                    *votes.entry(option_id).or_default() += 1;
                } else {
                    report.dangling_votes.push((fan.id.clone(), option_id.clone()));
                }
            }
        }
        for option in &options {
            let actual = votes.get(&option.id).copied().unwrap_or(0);
            if option.counter != actual {
                report.counter_mismatches.push(CounterMismatch {
                    option_id: option.id.clone(),
                    stored: option.counter,
                    actual,
                });
            }
            if !project_ids.contains(&option.project_id) {
                report.orphan_options.push(option.id.clone());
            }
        }

        // follow symmetry
        let from_fans: BTreeSet<(EntityId, EntityId)> = fans
            .iter()
            .flat_map(|f| f.favorite_creators.iter().map(|c| (f.id.clone(), c.clone())))
            .collect();
        let from_creators: BTreeSet<(EntityId, EntityId)> = creators
            .iter()
            .flat_map(|c| c.fans.iter().map(|f| (f.clone(), c.id.clone())))
            .collect();
        report.asymmetric_follows =
            from_fans.symmetric_difference(&from_creators).cloned().collect();

        // containment
        for project in &projects {
            if !creator_ids.contains(&project.creator) {
                report.orphan_projects.push(project.id.clone());
            }
            for option_id in &project.options {
                if !option_ids.contains(option_id) {
                    report.dangling_links.push((project.id.clone(), option_id.clone()));
                }
            }
        }
        for creator in &creators {
            for project_id in &creator.projects {
                if !project_ids.contains(project_id) {
                    report.dangling_links.push((creator.id.clone(), project_id.clone()));
                }
            }
        }

        // email uniqueness across both account collections
        let mut emails: BTreeMap<&str, usize> = BTreeMap::new();
        for email in creators.iter().map(|c| c.email.as_str()).chain(fans.iter().map(|f| f.email.as_str())) {
            *emails.entry(email).or_default() += 1;
        }
        report.duplicate_emails =
            emails.into_iter().filter(|(_, n)| *n > 1).map(|(e, _)| e.to_string()).collect();

        if !report.is_consistent() {
            log::warn!("Consistency check found violations: {:?}", report);
        }
        Ok(report)
    }

    /// Recompute every option counter from the fans' vote sets. Returns
    /// how many counters changed.
    pub async fn repair_counters(&self) -> EngineResult<usize> {
        let store = self.ctx.store();
        let options: Vec<PollOption> = store::load_where(store, &Filter::All).await?;
        let mut repaired = 0;
        for option in options {
            let _guard = self.ctx.locks.acquire_one(EntityKind::Option, &option.id).await;
            let voters = store
                .find(EntityKind::Fan, &Filter::contains(fields::VOTES, store::id_value(&option.id)))
                .await?
                .len() as u64;
            let Some(current) = store::try_load::<PollOption>(store, &option.id).await? else {
                continue;
            };
            if current.counter != voters {
                store::patch::<PollOption>(store, &option.id, &Patch::new().set(fields::COUNTER, voters))
                    .await?;
                log::warn!("Option {} counter repaired: {} -> {}", option.id, current.counter, voters);
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}
