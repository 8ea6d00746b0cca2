//! Snapshot of a session: the devices taking part and how they are grouped
use crate::{
    core::{ContextId, DeviceId, DmAppId, GroupId, RegionId},
    pure::geometry::Rect,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, EnumString};

fn default_dpi() -> f64 {
    96.0
}

fn default_reduce_factor() -> f64 {
    0.8
}

fn default_reduce_tries() -> u32 {
    5
}

fn default_orientations() -> Vec<Orientation> {
    vec![Orientation::Landscape]
}

/// The physical orientation a device is (or can be) held in.
#[derive(
    AsRefStr, EnumString, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Width >= height
    Landscape,
    /// Height >= width
    Portrait,
}

/// Static capability metadata reported by a device when it joins a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Reported display width in px, in the device's natural orientation
    pub display_width: u32,
    /// Reported display height in px, in the device's natural orientation
    pub display_height: u32,
    /// Pixel density used to resolve inch based constraint units
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    /// How many audio-flagged components this device can play at once
    #[serde(default)]
    pub concurrent_audio: u32,
    /// How many video-flagged components this device can decode at once
    #[serde(default)]
    pub concurrent_video: u32,
    /// Whether the display accepts touch input
    #[serde(default)]
    pub touch_interaction: bool,
    /// Communal devices (e.g. a living room TV) are shared between users;
    /// non-communal ones are personal
    #[serde(default)]
    pub communal_device: bool,
    /// The orientations this device supports
    #[serde(default = "default_orientations")]
    pub orientations: Vec<Orientation>,
}

/// A logical rectangular sub-area of a device's display.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Identifier the constraint document's targetRegions refer to
    pub id: RegionId,
    /// Displayed width in px
    pub width: f64,
    /// Displayed height in px
    pub height: f64,
    /// Whether clients may resize this region between evaluations
    #[serde(default)]
    pub resizable: bool,
}

/// A single device participating in a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable identifier for this device
    pub id: DeviceId,
    /// The group this device is laid out with. Ungrouped devices are laid
    /// out on their own.
    #[serde(default)]
    pub group: Option<GroupId>,
    /// The orientation the device is currently held in
    #[serde(default = "Device::default_orientation")]
    pub orientation: Orientation,
    /// Capability metadata
    pub caps: Capabilities,
    /// Declared logical regions. A device with none is treated as one
    /// whole-display region named after the device.
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl Device {
    fn default_orientation() -> Orientation {
        Orientation::Landscape
    }

    /// Display width and height with the current orientation applied.
    pub fn oriented_size(&self) -> (f64, f64) {
        let (w, h) = (self.caps.display_width as f64, self.caps.display_height as f64);

        match self.orientation {
            Orientation::Landscape if h > w => (h, w),
            Orientation::Portrait if w > h => (h, w),
            _ => (w, h),
        }
    }

    /// The logical regions layout runs against: the declared ones, or a
    /// single whole-display region when the device declares none.
    pub fn layout_regions(&self) -> Vec<Region> {
        if self.regions.is_empty() {
            let (w, h) = self.oriented_size();

            vec![Region {
                id: RegionId::from(self.id.as_ref()),
                width: w,
                height: h,
                resizable: false,
            }]
        } else {
            self.regions.clone()
        }
    }

    /// Region-relative bounding box for one of this device's regions.
    pub(crate) fn region_bounds(region: &Region) -> Rect {
        Rect::new(0.0, 0.0, region.width, region.height)
    }
}

/// How the members of a group relate to their users.
#[derive(AsRefStr, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Every member is a communal device
    Communal,
    /// No member is a communal device
    Personal,
    /// A mixture: the constraint side is chosen per device
    Mixed,
}

/// A set of devices laid out together.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// The group identifier (for ungrouped devices, the device id)
    pub id: GroupId,
    /// Indices into [Context::devices] for the member devices
    pub devices: Vec<usize>,
    /// Derived classification of the member devices
    pub kind: GroupKind,
}

/// Per-session configuration options that influence evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextConfig {
    /// Emit positions and sizes as percent strings instead of integer px
    pub percent_coords: bool,
    /// Multiplicative size reduction applied per retry of the packer's
    /// second pass
    pub reduce_factor: f64,
    /// Bound on the number of reduction retries
    pub reduce_tries: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            percent_coords: false,
            reduce_factor: default_reduce_factor(),
            reduce_tries: default_reduce_tries(),
        }
    }
}

/// A named session grouping the devices that are participating together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Stable identifier for the session
    pub id: ContextId,
    /// The distributed media application this session is running
    pub dmapp: DmAppId,
    /// Devices currently joined, with their orientations applied
    pub devices: Vec<Device>,
    /// Evaluation options
    #[serde(default)]
    pub config: ContextConfig,
}

impl Context {
    /// Partition the session's devices into layout groups.
    ///
    /// Devices sharing a group id are laid out together; a device without one
    /// forms a group of its own, keyed by its device id. Groups are returned
    /// in a stable order so that repeated evaluations of the same snapshot
    /// walk them identically.
    pub fn groups(&self) -> Vec<Group> {
        let mut members: BTreeMap<GroupId, Vec<usize>> = BTreeMap::new();

        for (ix, d) in self.devices.iter().enumerate() {
            let gid = match &d.group {
                Some(g) => g.clone(),
                None => GroupId::from(d.id.as_ref()),
            };
            members.entry(gid).or_default().push(ix);
        }

        members
            .into_iter()
            .map(|(id, devices)| {
                let communal = devices
                    .iter()
                    .filter(|&&ix| self.devices[ix].caps.communal_device)
                    .count();
                let kind = if communal == devices.len() {
                    GroupKind::Communal
                } else if communal == 0 {
                    GroupKind::Personal
                } else {
                    GroupKind::Mixed
                };

                Group { id, devices, kind }
            })
            .collect()
    }

    /// Look up a device by id.
    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == id)
    }
}
