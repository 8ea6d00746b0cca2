//! Dry-run placement: which devices could host a set of components?
//!
//! Simulation runs the resolver and the packer's initial pass with the
//! components under test forced visible, then throws the arrangement away.
//! Nothing is persisted; the caller gets the device-to-component mapping
//! plus synthetic create messages (null start and stop times) it can push
//! so candidate devices pre-load.
use crate::{
    assemble,
    core::{
        component::{Component, ComponentSet},
        constraint::{ConstraintResolver, ConstraintSet},
        context::Context,
        messages::{CreateMessage, MessageId, MessageLayout, CREATE_LEAD_NS},
        ComponentId, DeviceId,
    },
    packer::GroupPacker,
    Result,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The components that could be placed on one device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCandidates {
    /// The viable device
    pub device_id: DeviceId,
    /// The components it could host
    pub component_ids: Vec<ComponentId>,
}

/// The outcome of a dry run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    /// Viable devices and what they could host
    pub devices: Vec<DeviceCandidates>,
    /// Synthetic create messages for pre-loading
    pub create: Vec<CreateMessage>,
}

pub(crate) fn run(
    ctx: &Context,
    constraints: &ConstraintSet,
    components: &ComponentSet,
    force_visible: &[ComponentId],
    timestamp_ns: i64,
) -> Result<Simulation> {
    let resolver = ConstraintResolver::new(constraints);
    let candidates: Vec<&Component> = components
        .active()
        .filter(|c| c.visible || force_visible.contains(&c.id))
        .collect();
    debug!(forced = force_visible.len(), candidates = candidates.len(), "simulating placement");

    let mut sim = Simulation::default();

    for group in ctx.groups() {
        let packer = GroupPacker::new(ctx, &group, candidates.iter().copied(), &resolver)?;
        let outcome = packer.pack_initial();

        for placement in &outcome.placements {
            match sim
                .devices
                .iter_mut()
                .find(|d| d.device_id == placement.device_id)
            {
                Some(d) => {
                    if !d.component_ids.contains(&placement.component_id) {
                        d.component_ids.push(placement.component_id.clone());
                    }
                }
                None => sim.devices.push(DeviceCandidates {
                    device_id: placement.device_id.clone(),
                    component_ids: vec![placement.component_id.clone()],
                }),
            }

            let instance_id = assemble::instance_id(
                &ctx.id,
                &ctx.dmapp,
                &placement.device_id,
                &placement.component_id,
            );
            let comp = components.get(&placement.component_id);
            sim.create.push(CreateMessage {
                message_id: MessageId::next(),
                timestamp: timestamp_ns - CREATE_LEAD_NS,
                component_id: placement.component_id.clone(),
                context_id: ctx.id.clone(),
                dmapp_id: ctx.dmapp.clone(),
                device_id: placement.device_id.clone(),
                config: comp.and_then(|c| c.config.clone()),
                start_time: None,
                stop_time: None,
                layout: MessageLayout::instance_only(instance_id),
                parameters: comp.and_then(|c| c.parameters.clone()),
                priorities: comp.map(|c| c.overrides.clone()).unwrap_or_default(),
            });
        }
    }

    Ok(sim)
}
