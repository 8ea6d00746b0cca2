//! Collects the packer's placements into a device keyed layout
use crate::{
    core::{
        component::ComponentSet,
        context::{Context, Group},
        ComponentId, ContextId, DeviceId, DmAppId,
    },
    packer::PackOutcome,
    pure::{
        geometry::Point,
        layout::{DeviceLayout, Extent, Layout, PlacedComponent},
    },
};

/// The deterministic instance identifier for one placement.
///
/// A component placed on several devices has one instance per device; the
/// id is stable across evaluations so clients can correlate messages.
pub fn instance_id(
    context: &ContextId,
    dmapp: &DmAppId,
    device: &DeviceId,
    component: &ComponentId,
) -> String {
    format!("{context}:{dmapp}:{device}:{component}")
}

/// Fold one group's pack outcome into the layout under construction.
pub(crate) fn extend_layout(
    layout: &mut Layout,
    ctx: &Context,
    group: &Group,
    outcome: &PackOutcome,
    components: &ComponentSet,
) {
    for placement in &outcome.placements {
        let component = components.get(&placement.component_id);

        let placed = PlacedComponent {
            component_id: placement.component_id.clone(),
            region_id: placement.region_id.clone(),
            position: Some(Point::new(placement.rect.x, placement.rect.y)),
            size: Some(Extent::new(placement.rect.w, placement.rect.h)),
            z_depth: placement.priority,
            instance_id: instance_id(
                &layout.context_id,
                &layout.dmapp_id,
                &placement.device_id,
                &placement.component_id,
            ),
            priority: placement.priority,
            start_time: component.and_then(|c| c.start_time),
            stop_time: component.and_then(|c| c.stop_time),
            parameters: component.and_then(|c| c.parameters.clone()),
        };

        match layout.device_mut(&placement.device_id) {
            Some(d) => d.components.push(placed),
            None => {
                let regions = ctx
                    .device(&placement.device_id)
                    .map(|d| d.layout_regions())
                    .unwrap_or_default();
                layout.devices.push(DeviceLayout {
                    device_id: placement.device_id.clone(),
                    group: group.id.clone(),
                    regions,
                    components: vec![placed],
                });
            }
        }
    }

    for (id, status) in &outcome.failures {
        layout.push_not_placed(group.id.clone(), *status, id.clone());
    }
}
