//! A diff of changes between the previous and newly assembled layouts
use crate::{
    core::{
        component::ComponentSet,
        context::{Context, Region},
        messages::{
            ComponentProperties, ComponentPropertiesMessage, CreateMessage, DestroyMessage,
            LogicalRegion, LogicalRegionChangeMessage, MessageId, MessageLayout, UpdateMessage,
            CREATE_LEAD_NS,
        },
        DeviceId, GroupId,
    },
    pure::{
        geometry::Point,
        layout::{DeviceLayout, Extent, Layout, NotPlaced, NotPlacedStatus, PlacedComponent},
    },
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The record sets that carry clients from the previous layout to the new
/// one. Message ids are strictly increasing in the order create, update,
/// destroy within one evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Components newly placed on a device
    pub create: Vec<CreateMessage>,
    /// Components whose placement or metadata changed
    pub update: Vec<UpdateMessage>,
    /// Components removed from a device
    pub destroy: Vec<DestroyMessage>,
    /// The new layout's not-placed records
    pub not_placed: Vec<NotPlaced>,
    /// Priority changes, batched
    pub component_properties: Option<ComponentPropertiesMessage>,
    /// Devices whose logical regions changed since the previous layout
    pub logical_region_change: Vec<LogicalRegionChangeMessage>,
}

impl Diff {
    /// Whether the diff carries no messages at all.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update.is_empty()
            && self.destroy.is_empty()
            && self.component_properties.is_none()
            && self.logical_region_change.is_empty()
    }
}

/// Attach a carry-over entry to a device layout, creating the device entry
/// from the previous snapshot when the new layout does not have one.
fn attach(
    new: &mut Layout,
    device_id: &DeviceId,
    group: &GroupId,
    regions: &[Region],
    placed: PlacedComponent,
) {
    match new.device_mut(device_id) {
        Some(d) => {
            if d.component(&placed.component_id).is_none() {
                d.components.push(placed);
            }
        }
        None => new.devices.push(DeviceLayout {
            device_id: device_id.clone(),
            group: group.clone(),
            regions: regions.to_vec(),
            components: vec![placed],
        }),
    }
}

/// Initialised-but-not-started components from the previous layout that the
/// packer dropped are re-attached on their device with an empty layout: they
/// are not presenting yet and must not be lost.
fn carry_over_inited(prev: &Layout, new: &mut Layout, components: &ComponentSet) {
    let mut attachments = Vec::new();

    for d in &prev.devices {
        for p in &d.components {
            if p.start_time.is_some() {
                continue;
            }
            let Some(comp) = components.get(&p.component_id) else {
                continue;
            };
            if !comp.is_active() || new.devices_for(&p.component_id).next().is_some() {
                continue;
            }

            debug!(component = %p.component_id, device = %d.device_id, "carrying over inited component");
            attachments.push((
                d.device_id.clone(),
                d.group.clone(),
                d.regions.clone(),
                PlacedComponent {
                    component_id: p.component_id.clone(),
                    region_id: p.region_id.clone(),
                    position: None,
                    size: None,
                    z_depth: p.z_depth,
                    instance_id: p.instance_id.clone(),
                    priority: p.priority,
                    start_time: comp.start_time,
                    stop_time: comp.stop_time,
                    parameters: comp.parameters.clone(),
                },
            ));
        }
    }

    for (device, group, regions, placed) in attachments {
        attach(new, &device, &group, &regions, placed);
    }
}

/// Still-running components that lost their spot are re-inserted on their
/// previous device with the explicit hidden size so clients hide them
/// instead of silently losing them.
fn carry_over_hidden(prev: &Layout, new: &mut Layout, components: &ComponentSet) {
    let mut attachments = Vec::new();

    for np in &new.not_placed {
        if !matches!(
            np.status,
            NotPlacedStatus::Incompatible | NotPlacedStatus::Skipped
        ) {
            continue;
        }

        for id in &np.component_ids {
            let Some(comp) = components.get(id) else {
                continue;
            };
            if !comp.is_running() {
                continue;
            }

            let Some((pd, old)) = prev
                .devices
                .iter()
                .filter(|d| d.group == np.group)
                .find_map(|d| d.component(id).map(|old| (d, old)))
            else {
                continue;
            };
            if new
                .device(&pd.device_id)
                .map(|d| d.component(id).is_some())
                .unwrap_or(false)
            {
                continue;
            }

            debug!(component = %id, device = %pd.device_id, "hiding still-running component");
            attachments.push((
                pd.device_id.clone(),
                pd.group.clone(),
                pd.regions.clone(),
                PlacedComponent {
                    component_id: id.clone(),
                    region_id: old.region_id.clone(),
                    position: Some(Point::new(0.0, 0.0)),
                    size: Some(Extent::hidden()),
                    z_depth: old.z_depth,
                    instance_id: old.instance_id.clone(),
                    priority: old.priority,
                    start_time: comp.start_time,
                    stop_time: comp.stop_time,
                    parameters: comp.parameters.clone(),
                },
            ));
        }
    }

    for (device, group, regions, placed) in attachments {
        attach(new, &device, &group, &regions, placed);
    }
}

fn percent_extent(
    percent: bool,
    d: &DeviceLayout,
    p: &PlacedComponent,
) -> Option<(f64, f64)> {
    if !percent {
        return None;
    }

    d.regions
        .iter()
        .find(|r| r.id == p.region_id)
        .map(|r| (r.width, r.height))
}

/// Compare the previous and new layouts and derive the outgoing messages.
///
/// The carry-over rules mutate the new layout *before* diffing so that the
/// layout the caller persists is the one clients were told about.
pub(crate) fn compute(
    ctx: &Context,
    previous: Option<&Layout>,
    new: &mut Layout,
    components: &ComponentSet,
) -> Diff {
    if let Some(prev) = previous {
        carry_over_inited(prev, new, components);
        carry_over_hidden(prev, new, components);
    }

    let percent = ctx.config.percent_coords;
    let mut diff = Diff {
        not_placed: new.not_placed.clone(),
        ..Diff::default()
    };
    let mut properties = Vec::new();

    // create: present in new, absent from previous
    for d in &new.devices {
        let prev_device = previous.and_then(|p| p.device(&d.device_id));
        for p in &d.components {
            let existed = prev_device
                .map(|pd| pd.component(&p.component_id).is_some())
                .unwrap_or(false);
            if existed {
                continue;
            }

            // a device that was not in the previous layout receives the
            // fresh-init form: null times make its client init from scratch
            let fresh = previous.is_some() && prev_device.is_none();
            let comp = components.get(&p.component_id);

            diff.create.push(CreateMessage {
                message_id: MessageId::next(),
                timestamp: new.timestamp - CREATE_LEAD_NS,
                component_id: p.component_id.clone(),
                context_id: new.context_id.clone(),
                dmapp_id: new.dmapp_id.clone(),
                device_id: d.device_id.clone(),
                config: comp.and_then(|c| c.config.clone()),
                start_time: if fresh { None } else { p.start_time },
                stop_time: if fresh { None } else { p.stop_time },
                layout: MessageLayout::from_placement(p, &d.device_id, percent_extent(percent, d, p)),
                parameters: p.parameters.clone(),
                priorities: comp.map(|c| c.overrides.clone()).unwrap_or_default(),
            });
        }
    }

    // update: present in both on the same device, with tracked fields changed
    if let Some(prev) = previous {
        for d in &new.devices {
            let Some(pd) = prev.device(&d.device_id) else {
                continue;
            };
            for p in &d.components {
                let Some(old) = pd.component(&p.component_id) else {
                    continue;
                };

                if old.priority != p.priority {
                    properties.push(ComponentProperties {
                        component_id: p.component_id.clone(),
                        dmapp_id: new.dmapp_id.clone(),
                        context_id: new.context_id.clone(),
                        device_id: d.device_id.clone(),
                        priorities: components
                            .get(&p.component_id)
                            .map(|c| c.overrides.clone())
                            .unwrap_or_default(),
                    });
                }

                let changed = old.position != p.position
                    || old.size != p.size
                    || old.priority != p.priority
                    || old.parameters != p.parameters
                    || old.start_time != p.start_time
                    || old.stop_time != p.stop_time;
                if !changed {
                    continue;
                }

                diff.update.push(UpdateMessage {
                    message_id: MessageId::next(),
                    timestamp: new.timestamp,
                    component_id: p.component_id.clone(),
                    context_id: new.context_id.clone(),
                    dmapp_id: new.dmapp_id.clone(),
                    device_id: d.device_id.clone(),
                    start_time: p.start_time,
                    stop_time: p.stop_time,
                    layout: MessageLayout::from_placement(p, &d.device_id, percent_extent(percent, d, p)),
                    parameters: p.parameters.clone(),
                    priorities: components
                        .get(&p.component_id)
                        .map(|c| c.overrides.clone())
                        .unwrap_or_default(),
                });
            }
        }
    }

    // destroy: present in previous, absent from new; carries the stop time
    if let Some(prev) = previous {
        for pd in &prev.devices {
            for old in &pd.components {
                let still = new
                    .device(&pd.device_id)
                    .map(|d| d.component(&old.component_id).is_some())
                    .unwrap_or(false);
                if still {
                    continue;
                }

                diff.destroy.push(DestroyMessage {
                    message_id: MessageId::next(),
                    timestamp: new.timestamp,
                    component_id: old.component_id.clone(),
                    context_id: new.context_id.clone(),
                    dmapp_id: new.dmapp_id.clone(),
                    device_id: pd.device_id.clone(),
                    stop_time: components
                        .get(&old.component_id)
                        .and_then(|c| c.stop_time)
                        .or(old.stop_time),
                    instance_id: old.instance_id.clone(),
                });
            }
        }
    }

    if !properties.is_empty() {
        diff.component_properties = Some(ComponentPropertiesMessage {
            message_id: MessageId::next(),
            timestamp: new.timestamp,
            components: properties,
        });
    }

    if let Some(prev) = previous {
        for d in &new.devices {
            let Some(pd) = prev.device(&d.device_id) else {
                continue;
            };
            if pd.regions == d.regions {
                continue;
            }

            diff.logical_region_change.push(LogicalRegionChangeMessage {
                message_id: MessageId::next(),
                timestamp: new.timestamp,
                device_id: d.device_id.clone(),
                logical_regions: d
                    .regions
                    .iter()
                    .map(|r| LogicalRegion {
                        region_id: r.id.clone(),
                        display_width: r.width.round() as i64,
                        display_height: r.height.round() as i64,
                        resizable: r.resizable,
                    })
                    .collect(),
            });
        }
    }

    diff
}
