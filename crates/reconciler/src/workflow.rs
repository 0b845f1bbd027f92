//! The RisingWave reconcile workflow.
//!
//! Written as a condition state machine: every branch of the top-level
//! parallel join starts with a barrier that exits unless the object is in
//! the state the branch handles.
//!
//! | State                                    | Transition                         |
//! |------------------------------------------|------------------------------------|
//! | no conditions                            | Initializing=True, Running=False   |
//! | Initializing=True                        | sync all and wait, drop Initializing |
//! | Running=False                            | sync all and wait, Running=True    |
//! | Running=True, generation outdated        | Upgrading=True                     |
//! | Upgrading=True                           | sync all and wait, Upgrading=False |
//!
//! The running status is collected on every pass, and the service monitor
//! is synced whenever its CRDs are served.

use std::time::Duration;

use rwo_workflow::{join, parallel_join, sequential, shared, timeout, Action};

use crate::components::ManagedObject;
use crate::error::Result;
use crate::manager::ControllerManager;
use crate::types::{Component, ConditionType};

/// Sync every object, then wait for every component to be ready.
///
/// The result is shared: it runs at most once per pass however many
/// branches reach it.
pub fn sync_all_and_wait(mgr: &ControllerManager, meta_ready_timeout: Duration) -> Result<Action> {
    let sync_pair = |component: Component| {
        parallel_join([
            mgr.sync(ManagedObject::Service(component)),
            mgr.sync(ManagedObject::Workload(component)),
        ])
    };

    let sync_components = parallel_join([
        mgr.sync(ManagedObject::ConfigMap),
        sync_pair(Component::Meta),
        parallel_join([
            sequential([
                mgr.sync(ManagedObject::Service(Component::Compute)),
                mgr.sync(ManagedObject::Workload(Component::Compute)),
            ])?,
            sync_pair(Component::Compactor),
            sync_pair(Component::Frontend),
        ]),
    ]);

    let wait_components = join([
        sequential([
            mgr.wait_before_ready(ManagedObject::Workload(Component::Meta)),
            timeout(
                meta_ready_timeout,
                mgr.wait_before_ready(ManagedObject::Service(Component::Meta)),
            ),
        ])?,
        join([
            mgr.wait_before_ready(ManagedObject::Workload(Component::Frontend)),
            mgr.wait_before_ready(ManagedObject::Workload(Component::Compute)),
            mgr.wait_before_ready(ManagedObject::Workload(Component::Compactor)),
        ]),
    ]);

    Ok(shared(sequential([
        mgr.sync_observed_generation(),
        mgr.sync(ManagedObject::ConfigMap),
        sync_components,
        wait_components,
    ])?))
}

/// The full reconcile workflow for one object.
pub fn risingwave_workflow(mgr: &ControllerManager, meta_ready_timeout: Duration) -> Result<Action> {
    let sync_all = sync_all_and_wait(mgr, meta_ready_timeout)?;

    Ok(parallel_join([
        sequential([
            mgr.barrier_first_time_observed(),
            mgr.mark_condition(ConditionType::Initializing, true),
            mgr.mark_condition(ConditionType::Running, false),
        ])?,
        sequential([
            mgr.barrier_condition(ConditionType::Initializing, true),
            sync_all.clone(),
            mgr.remove_condition(ConditionType::Initializing),
        ])?,
        sequential([
            mgr.barrier_condition(ConditionType::Running, false),
            sync_all.clone(),
            mgr.mark_condition(ConditionType::Running, true),
        ])?,
        sequential([
            mgr.barrier_condition(ConditionType::Running, true),
            mgr.barrier_observed_generation_outdated(),
            mgr.mark_condition(ConditionType::Upgrading, true),
        ])?,
        sequential([
            mgr.barrier_condition(ConditionType::Upgrading, true),
            sync_all,
            mgr.mark_condition(ConditionType::Upgrading, false),
        ])?,
        mgr.collect_running_statistics_and_sync_status(),
        sequential([
            mgr.barrier_service_monitor_served(),
            mgr.sync(ManagedObject::ServiceMonitor),
        ])?,
    ]))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::sync::Arc;

    use rwo_workflow::{dry_run, optimize_workflow, ChainedHooks};

    use super::*;
    use crate::components::InMemoryComponentManager;
    use crate::events::MessageStore;
    use crate::manager::RisingWaveManager;
    use crate::types::{ObjectKey, RisingWave, RisingWaveSpec};

    fn manager() -> ControllerManager {
        ControllerManager::new(
            Arc::new(RisingWaveManager::new(RisingWave::new(
                &ObjectKey::new("default", "rw"),
                RisingWaveSpec::default(),
            ))),
            Arc::new(InMemoryComponentManager::new()),
            Arc::new(MessageStore::new()),
            Arc::new(ChainedHooks::new()),
        )
    }

    #[test]
    fn test_sync_all_is_shared() {
        let act = sync_all_and_wait(&manager(), Duration::from_secs(1)).unwrap();
        assert!(act.describe().starts_with("Shared(Sequential(SyncObservedGeneration"));
    }

    #[test]
    fn test_workflow_names_every_step() {
        let workflow = optimize_workflow(
            risingwave_workflow(&manager(), Duration::from_secs(1)).unwrap(),
        );
        let dump = dry_run(&workflow);
        for name in [
            "BarrierFirstTimeObserved",
            "MarkConditionInitializingAsTrue",
            "RemoveConditionInitializing",
            "BarrierConditionRunningIsFalse",
            "BarrierObservedGenerationOutdated",
            "MarkConditionUpgradingAsFalse",
            "CollectRunningStatisticsAndSyncStatus",
            "BarrierPrometheusCRDsInstalled",
            "SyncServiceMonitor",
            "SyncComputeStatefulSets",
            "WaitBeforeCompactorDeploymentsReady",
        ] {
            assert!(dump.contains(name), "{name} missing from\n{dump}");
        }
        assert!(dump.contains("timeout=1s"));
        assert!(workflow.describe().starts_with("ParallelJoin("));
    }
}
