//! Personality status controller
//!
//! Validates template bundles and keeps their usage counters current.
//! Instances that select a personality are requeued by the instance
//! controller's own event mapping.

use crate::conditions::{self, reason};
use crate::error::{Action, Result};
use crate::events::EventRecorder;
use crate::runtime::Reconcile;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use warden_merge::validate_personality;
use warden_store::{Api, ObjectStore, WatchEvent};
use warden_types::{
    set_condition, Condition, Instance, Kind, ObjectKey, Personality, PersonalityStatus, Resource,
    TemplateSelector,
};

pub struct PersonalityReconciler {
    personalities: Api<Personality>,
    instances: Api<Instance>,
    events: EventRecorder,
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl PersonalityReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, events: EventRecorder) -> Self {
        Self {
            personalities: Api::new(store.clone()),
            instances: Api::new(store),
            events,
        }
    }

    async fn instance_count(&self, key: &ObjectKey) -> Result<u32> {
        let instances = self
            .instances
            .list(Some(&key.namespace), &BTreeMap::new())
            .await?;
        let selecting = instances
            .iter()
            .filter(|i| {
                !i.metadata.is_deleting()
                    && matches!(&i.spec.personality, Some(TemplateSelector::Named(n)) if *n == key.name)
            })
            .count();
        Ok(count(selecting))
    }

    #[instrument(skip(self), fields(personality = %key))]
    async fn reconcile_personality(&self, key: &ObjectKey) -> Result<Action> {
        let Some(live) = self.personalities.get_opt(key).await? else {
            return Ok(Action::AwaitChange);
        };
        let generation = live.metadata.generation;
        let bundle = &live.spec.bundle;

        let mut status = PersonalityStatus {
            conditions: live.status.conditions.clone(),
            instance_count: self.instance_count(key).await?,
            plugin_count: count(bundle.plugins.len()),
            mcp_server_count: count(bundle.mcp_server_count()),
            observed_generation: generation,
        };

        match validate_personality(&live.spec) {
            Ok(()) => {
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        conditions::VALID,
                        true,
                        reason::VALIDATION_PASSED,
                        "Bundle is valid",
                        generation,
                    ),
                );
                set_condition(
                    &mut status.conditions,
                    Condition::new(conditions::READY, true, reason::RECONCILED, "Ready", generation),
                );
            }
            Err(e) => {
                let message = e.to_string();
                if set_condition(
                    &mut status.conditions,
                    Condition::new(
                        conditions::VALID,
                        false,
                        reason::VALIDATION_FAILED,
                        message.clone(),
                        generation,
                    ),
                ) {
                    self.events
                        .warning(Kind::Personality, key, reason::VALIDATION_FAILED, message.clone())
                        .await;
                }
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        conditions::READY,
                        false,
                        reason::VALIDATION_FAILED,
                        message,
                        generation,
                    ),
                );
            }
        }

        self.personalities
            .patch_status(key, |p| p.status = status.clone())
            .await?;
        debug!(instances = status.instance_count, "Personality status updated");
        Ok(Action::AwaitChange)
    }
}

#[async_trait]
impl Reconcile for PersonalityReconciler {
    fn name(&self) -> &'static str {
        "personality"
    }

    async fn list_keys(&self) -> Result<Vec<ObjectKey>> {
        Ok(self
            .personalities
            .list(None, &BTreeMap::new())
            .await?
            .iter()
            .map(Resource::key)
            .collect())
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        self.reconcile_personality(key).await
    }

    async fn map_event(&self, event: &WatchEvent) -> Vec<ObjectKey> {
        match event.kind() {
            Kind::Personality => vec![event.key()],
            Kind::Instance => match event.object.clone().into_resource::<Instance>() {
                Ok(instance) => match &instance.spec.personality {
                    Some(TemplateSelector::Named(name)) => {
                        vec![ObjectKey::new(&instance.metadata.namespace, name)]
                    }
                    _ => Vec::new(),
                },
                Err(_) => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}
