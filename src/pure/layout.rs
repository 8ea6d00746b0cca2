//! The persist-ready result of one evaluation
use crate::{
    core::{context::Region, ComponentId, ContextId, DeviceId, DmAppId, GroupId, RegionId},
    pure::geometry::Point,
};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

/// A width / height pair in px.
///
/// The sentinel `{-1, -1}` is the explicit "hidden" size sent to clients for
/// components that are still running but currently have nowhere to go.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    /// Width in px
    pub width: f64,
    /// Height in px
    pub height: f64,
}

impl Extent {
    /// Create a new Extent.
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// The explicit hidden sentinel.
    pub fn hidden() -> Self {
        Self::new(-1.0, -1.0)
    }

    /// Whether this is the hidden sentinel.
    pub fn is_hidden(&self) -> bool {
        self.width < 0.0 || self.height < 0.0
    }
}

/// One component placed on one device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlacedComponent {
    /// The placed component
    pub component_id: ComponentId,
    /// The region the placement is inside
    pub region_id: RegionId,
    /// Top left corner, region relative. `None` for components that are
    /// initialised but carry no layout yet.
    pub position: Option<Point>,
    /// Displayed size. `None` for components with no layout yet,
    /// [Extent::hidden] for running components with nowhere to go.
    pub size: Option<Extent>,
    /// Stacking depth on the device
    pub z_depth: i32,
    /// Deterministic identifier for this (context, dmapp, device, component)
    /// instance
    pub instance_id: String,
    /// Resolved priority the placement was made with
    pub priority: i32,
    /// Presentation start time at evaluation, if started
    pub start_time: Option<f64>,
    /// Presentation stop time at evaluation, if stopped
    pub stop_time: Option<f64>,
    /// Opaque client parameters at evaluation
    pub parameters: Option<serde_json::Value>,
}

impl PlacedComponent {
    /// Whether this entry carries real geometry (not a carry-over stub).
    pub fn has_geometry(&self) -> bool {
        matches!(self.size, Some(s) if !s.is_hidden())
    }
}

/// Everything placed on one device, plus the region geometry it was
/// computed against.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLayout {
    /// The host device
    pub device_id: DeviceId,
    /// The group the device was laid out with
    pub group: GroupId,
    /// Region geometry at evaluation time, for change detection
    pub regions: Vec<Region>,
    /// The components on this device
    pub components: Vec<PlacedComponent>,
}

impl DeviceLayout {
    /// Look up a component on this device.
    pub fn component(&self, id: &ComponentId) -> Option<&PlacedComponent> {
        self.components.iter().find(|c| &c.component_id == id)
    }
}

/// Why a set of components was left out of a group's arrangement.
#[derive(AsRefStr, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum NotPlacedStatus {
    /// No region in the group satisfies the component's capability filters
    NoDevice,
    /// Capability compatible regions exist but none fits even the minimum
    /// size
    Incompatible,
    /// A geometric fit exists but the packer ran out of space
    Skipped,
    /// A declared dependency could not be satisfied
    NoDependent,
}

/// Components a group could not place, with the reason.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotPlaced {
    /// The group the components failed in
    pub group: GroupId,
    /// Why they failed
    pub status: NotPlacedStatus,
    /// The affected components
    pub component_ids: Vec<ComponentId>,
}

/// The full arrangement for one session, re-created from scratch by every
/// evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    /// The session this layout is for
    pub context_id: ContextId,
    /// The application this layout is for
    pub dmapp_id: DmAppId,
    /// Server timestamp in nanoseconds since the Unix epoch
    pub timestamp: i64,
    /// Per-device placements. Devices with nothing on them are omitted.
    pub devices: Vec<DeviceLayout>,
    /// Components that could not be placed, by group and reason
    pub not_placed: Vec<NotPlaced>,
}

impl Layout {
    /// An empty layout for a session.
    pub fn empty(context_id: ContextId, dmapp_id: DmAppId, timestamp: i64) -> Self {
        Self {
            context_id,
            dmapp_id,
            timestamp,
            devices: Vec::new(),
            not_placed: Vec::new(),
        }
    }

    /// Look up the layout for one device.
    pub fn device(&self, id: &DeviceId) -> Option<&DeviceLayout> {
        self.devices.iter().find(|d| &d.device_id == id)
    }

    /// Mutable lookup of the layout for one device.
    pub fn device_mut(&mut self, id: &DeviceId) -> Option<&mut DeviceLayout> {
        self.devices.iter_mut().find(|d| &d.device_id == id)
    }

    /// Iterate over every (device, placement) pair in the layout.
    pub fn placements(&self) -> impl Iterator<Item = (&DeviceId, &PlacedComponent)> {
        self.devices
            .iter()
            .flat_map(|d| d.components.iter().map(move |c| (&d.device_id, c)))
    }

    /// The devices a component is placed on.
    pub fn devices_for(&self, id: &ComponentId) -> impl Iterator<Item = &DeviceId> + '_ {
        let id = id.clone();
        self.devices
            .iter()
            .filter(move |d| d.component(&id).is_some())
            .map(|d| &d.device_id)
    }

    /// The not-placed record covering a component in a group, if any.
    pub fn not_placed_in(&self, group: &GroupId, id: &ComponentId) -> Option<NotPlacedStatus> {
        self.not_placed
            .iter()
            .find(|np| &np.group == group && np.component_ids.contains(id))
            .map(|np| np.status)
    }

    /// Record a not-placed component, merging into an existing record for
    /// the same group and status.
    pub fn push_not_placed(&mut self, group: GroupId, status: NotPlacedStatus, id: ComponentId) {
        match self
            .not_placed
            .iter_mut()
            .find(|np| np.group == group && np.status == status)
        {
            Some(np) => {
                if !np.component_ids.contains(&id) {
                    np.component_ids.push(id);
                }
            }
            None => self.not_placed.push(NotPlaced {
                group,
                status,
                component_ids: vec![id],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(id: &str) -> PlacedComponent {
        PlacedComponent {
            component_id: ComponentId::from(id),
            region_id: RegionId::from("main"),
            position: Some(Point::new(0.0, 0.0)),
            size: Some(Extent::new(100.0, 100.0)),
            z_depth: 1,
            instance_id: format!("ctx:app:dev:{id}"),
            priority: 1,
            start_time: None,
            stop_time: None,
            parameters: None,
        }
    }

    #[test]
    fn push_not_placed_merges_by_group_and_status() {
        let mut l = Layout::empty(ContextId::from("ctx"), DmAppId::from("app"), 0);
        let g = GroupId::from("g");

        l.push_not_placed(g.clone(), NotPlacedStatus::Skipped, ComponentId::from("a"));
        l.push_not_placed(g.clone(), NotPlacedStatus::Skipped, ComponentId::from("b"));
        l.push_not_placed(g.clone(), NotPlacedStatus::NoDevice, ComponentId::from("c"));

        assert_eq!(l.not_placed.len(), 2);
        assert_eq!(
            l.not_placed_in(&g, &ComponentId::from("b")),
            Some(NotPlacedStatus::Skipped)
        );
        assert_eq!(
            l.not_placed_in(&g, &ComponentId::from("c")),
            Some(NotPlacedStatus::NoDevice)
        );
    }

    #[test]
    fn placements_walk_all_devices() {
        let mut l = Layout::empty(ContextId::from("ctx"), DmAppId::from("app"), 0);
        l.devices.push(DeviceLayout {
            device_id: DeviceId::from("tv"),
            group: GroupId::from("g"),
            regions: vec![],
            components: vec![placed("a"), placed("b")],
        });
        l.devices.push(DeviceLayout {
            device_id: DeviceId::from("tablet"),
            group: GroupId::from("g"),
            regions: vec![],
            components: vec![placed("a")],
        });

        assert_eq!(l.placements().count(), 3);
        assert_eq!(l.devices_for(&ComponentId::from("a")).count(), 2);
        assert_eq!(l.devices_for(&ComponentId::from("b")).count(), 1);
    }

    #[test]
    fn hidden_sentinel_round_trips_through_json() {
        let e = Extent::hidden();
        let s = serde_json::to_string(&e).unwrap();
        let back: Extent = serde_json::from_str(&s).unwrap();

        assert!(back.is_hidden());
    }
}
