//! Finalizer-gated teardown
//!
//! Dependents live in the owner's namespace, outside the instance's own,
//! so they are located by the same name derivation used at creation and
//! deleted explicitly. The finalizer is released only once every deletion
//! has succeeded or found nothing to delete.

use super::InstanceReconciler;
use crate::conditions::{self, reason};
use crate::error::{Action, ReconcileError, Result};
use crate::resources::registration_namespace;
use tracing::{debug, info, instrument, warn};
use warden_store::{Api, StoreError};
use warden_types::naming::{self, user_namespace, FINALIZER};
use warden_types::{set_condition, Condition, Instance, InstanceState, Kind, ObjectKey, Resource};

const MAX_WRITE_ATTEMPTS: usize = 5;

/// Delete one dependent, recording anything other than "already gone"
async fn delete_child<K: Resource>(api: &Api<K>, key: ObjectKey, failures: &mut Vec<String>) {
    match api.delete_ignore_missing(&key).await {
        Ok(true) => debug!(kind = %K::KIND, object = %key, "Deleted dependent"),
        Ok(false) => debug!(kind = %K::KIND, object = %key, "Dependent already gone"),
        Err(e) => {
            warn!(kind = %K::KIND, object = %key, error = %e, "Failed to delete dependent");
            failures.push(format!("{} {key}: {e}", K::KIND));
        }
    }
}

impl InstanceReconciler {
    #[instrument(skip(self, live), fields(instance = %live.key()))]
    pub(super) async fn teardown(&self, live: Instance) -> Result<Action> {
        let key = live.key();
        if !live.metadata.has_finalizer(FINALIZER) {
            return Ok(Action::AwaitChange);
        }

        if live.status.state != InstanceState::Deleting {
            let mut status = live.status.clone();
            status.state = InstanceState::Deleting;
            set_condition(
                &mut status.conditions,
                Condition::new(
                    conditions::READY,
                    false,
                    reason::DELETING,
                    "Tearing down dependent resources",
                    live.metadata.generation,
                ),
            );
            self.write_status(&key, &status).await?;
        }

        let failures = self.delete_dependents(&live).await;

        // Best-effort: a missed copy is collected on the owner's next pass
        match self.collector.collect(&live.spec.owner).await {
            Ok(deleted) if !deleted.is_empty() => {
                debug!(?deleted, "Collected credential copies")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Credential collection failed"),
        }

        if !failures.is_empty() {
            let err = ReconcileError::TeardownIncomplete(failures);
            self.events
                .warning(Kind::Instance, &key, err.reason(), err.to_string())
                .await;
            return Err(err);
        }

        self.release_finalizer(&key).await?;
        info!("Teardown complete");
        Ok(Action::AwaitChange)
    }

    async fn delete_dependents(&self, live: &Instance) -> Vec<String> {
        let apis = &self.apis;
        let name = live.name();
        let namespace = user_namespace(&live.spec.owner);
        let in_tenant = |object: String| ObjectKey::new(&namespace, object);
        let mut failures = Vec::new();

        delete_child(
            &apis.config_maps,
            in_tenant(naming::config_map_name(name)),
            &mut failures,
        )
        .await;
        delete_child(
            &apis.secrets,
            in_tenant(naming::api_key_secret_name(name)),
            &mut failures,
        )
        .await;
        delete_child(
            &apis.service_accounts,
            in_tenant(naming::service_account_name(name)),
            &mut failures,
        )
        .await;
        delete_child(
            &apis.workloads,
            in_tenant(naming::workload_name(name)),
            &mut failures,
        )
        .await;
        delete_child(
            &apis.services,
            in_tenant(naming::service_name(name)),
            &mut failures,
        )
        .await;
        delete_child(
            &apis.registrations,
            ObjectKey::new(
                registration_namespace(live, &self.config),
                naming::registration_name(name),
            ),
            &mut failures,
        )
        .await;
        if let Some(workspace) = &live.spec.workspace {
            delete_child(&apis.pvcs, in_tenant(naming::pvc_name(name)), &mut failures).await;
            if workspace.git_secret().is_some() {
                delete_child(
                    &apis.secrets,
                    in_tenant(naming::git_secret_name(name)),
                    &mut failures,
                )
                .await;
            }
        }

        failures
    }

    async fn release_finalizer(&self, key: &ObjectKey) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(mut latest) = self.apis.instances.get_opt(key).await? else {
                return Ok(());
            };
            if !latest.metadata.remove_finalizer(FINALIZER) {
                return Ok(());
            }
            match self.apis.instances.replace(&latest).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(attempt, "Finalizer write conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
