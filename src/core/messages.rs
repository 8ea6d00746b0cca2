//! Push notification message shapes, transport agnostic
use crate::{
    core::{component::PriorityOverrides, ComponentId, ContextId, DeviceId, DmAppId, RegionId},
    pure::layout::{Extent, PlacedComponent},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

// The only process wide mutable state in the engine. Message ids must be
// unique and strictly increasing within one evaluation; an atomic keeps them
// unique across concurrent evaluations of independent sessions too.
static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Create messages are stamped this much earlier than the layout timestamp
/// so clients can pre-load before updates arrive.
pub const CREATE_LEAD_NS: i64 = 100_000_000;

/// A unique, monotonically increasing message identifier.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Allocate the next message id.
    pub fn next() -> Self {
        Self(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A coordinate value: integer pixels by default, a percent string relative
/// to the host region when the session sets `percentCoords`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Coord {
    /// Integer pixels
    Px(i64),
    /// A percent string such as "42.1875%"
    Percent(String),
}

impl Coord {
    /// A pixel coordinate, rounded to a whole pixel.
    pub fn px(v: f64) -> Self {
        Self::Px(v.round() as i64)
    }

    /// A percent coordinate relative to `extent`.
    pub fn percent(v: f64, extent: f64) -> Self {
        let pct = if extent > 0.0 { v / extent * 100.0 } else { 0.0 };

        Self::Percent(format!("{pct:.4}%"))
    }

    /// Convert back to pixels relative to `extent`.
    ///
    /// Used by clients (and the round-trip tests) to recover positions from
    /// percent strings.
    pub fn as_px(&self, extent: f64) -> f64 {
        match self {
            Coord::Px(v) => *v as f64,
            Coord::Percent(s) => s
                .trim_end_matches('%')
                .parse::<f64>()
                .map(|pct| pct / 100.0 * extent)
                .unwrap_or(0.0),
        }
    }
}

/// A position in the host region's coordinate space.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoordPosition {
    /// Offset from the region's left edge
    pub x: Coord,
    /// Offset from the region's top edge
    pub y: Coord,
}

/// A displayed size.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoordSize {
    /// Displayed width
    pub width: Coord,
    /// Displayed height
    pub height: Coord,
}

/// The layout block carried inside create and update messages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageLayout {
    /// Deterministic instance identifier
    pub instance_id: String,
    /// Placed position; absent for components with no geometry yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<CoordPosition>,
    /// Placed size; `{-1, -1}` hides a still-running component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<CoordSize>,
    /// Stacking depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_depth: Option<i32>,
    /// The host region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<RegionId>,
    /// The host device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl MessageLayout {
    /// Build the layout block for a placement, converting coordinates to
    /// percent strings when `percent_extent` carries the region size.
    pub(crate) fn from_placement(
        placed: &PlacedComponent,
        device_id: &DeviceId,
        percent_extent: Option<(f64, f64)>,
    ) -> Self {
        let position = placed.position.map(|p| match percent_extent {
            Some((w, h)) => CoordPosition {
                x: Coord::percent(p.x, w),
                y: Coord::percent(p.y, h),
            },
            None => CoordPosition {
                x: Coord::px(p.x),
                y: Coord::px(p.y),
            },
        });

        // the hidden sentinel is never rewritten as a percentage
        let size = placed.size.map(|s: Extent| match percent_extent {
            Some((w, h)) if !s.is_hidden() => CoordSize {
                width: Coord::percent(s.width, w),
                height: Coord::percent(s.height, h),
            },
            _ => CoordSize {
                width: Coord::px(s.width),
                height: Coord::px(s.height),
            },
        });

        Self {
            instance_id: placed.instance_id.clone(),
            position,
            size,
            z_depth: Some(placed.z_depth),
            region_id: Some(placed.region_id.clone()),
            device_id: Some(device_id.clone()),
        }
    }

    /// The minimal layout block sent in fresh-init create messages.
    pub(crate) fn instance_only(instance_id: String) -> Self {
        Self {
            instance_id,
            position: None,
            size: None,
            z_depth: None,
            region_id: None,
            device_id: None,
        }
    }
}

/// Announce a component newly placed on a device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    /// Unique id, monotonic within the evaluation
    pub message_id: MessageId,
    /// Layout timestamp minus [CREATE_LEAD_NS]
    pub timestamp: i64,
    /// The component being created
    pub component_id: ComponentId,
    /// The session
    pub context_id: ContextId,
    /// The application
    #[serde(rename = "DMAppId")]
    pub dmapp_id: DmAppId,
    /// The device the component appears on
    pub device_id: DeviceId,
    /// Opaque client configuration
    pub config: Option<serde_json::Value>,
    /// Presentation start time, if started
    pub start_time: Option<f64>,
    /// Presentation stop time, if stopped
    pub stop_time: Option<f64>,
    /// Where and how big
    pub layout: MessageLayout,
    /// Opaque client parameters
    pub parameters: Option<serde_json::Value>,
    /// Priority overrides in effect
    pub priorities: PriorityOverrides,
}

/// Update the placement or metadata of an existing component.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    /// Unique id, monotonic within the evaluation
    pub message_id: MessageId,
    /// The layout timestamp
    pub timestamp: i64,
    /// The component being updated
    pub component_id: ComponentId,
    /// The session
    pub context_id: ContextId,
    /// The application
    #[serde(rename = "DMAppId")]
    pub dmapp_id: DmAppId,
    /// The device the component is on
    pub device_id: DeviceId,
    /// Presentation start time, if started
    pub start_time: Option<f64>,
    /// Presentation stop time, if stopped
    pub stop_time: Option<f64>,
    /// Where and how big
    pub layout: MessageLayout,
    /// Opaque client parameters
    pub parameters: Option<serde_json::Value>,
    /// Priority overrides in effect
    pub priorities: PriorityOverrides,
}

/// Remove a component from a device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestroyMessage {
    /// Unique id, monotonic within the evaluation
    pub message_id: MessageId,
    /// The layout timestamp
    pub timestamp: i64,
    /// The component being removed
    pub component_id: ComponentId,
    /// The session
    pub context_id: ContextId,
    /// The application
    #[serde(rename = "DMAppId")]
    pub dmapp_id: DmAppId,
    /// The device it is removed from
    pub device_id: DeviceId,
    /// The stop time recorded in the previous layout
    pub stop_time: Option<f64>,
    /// The instance being destroyed
    pub instance_id: String,
}

/// One entry of a [ComponentPropertiesMessage].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentProperties {
    /// The component whose properties changed
    pub component_id: ComponentId,
    /// The application
    #[serde(rename = "DMAppId")]
    pub dmapp_id: DmAppId,
    /// The session
    pub context_id: ContextId,
    /// The device the component is on
    pub device_id: DeviceId,
    /// Priority overrides in effect
    pub priorities: PriorityOverrides,
}

/// Batched priority changes for components whose placement did not move.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPropertiesMessage {
    /// Unique id, monotonic within the evaluation
    pub message_id: MessageId,
    /// The layout timestamp
    pub timestamp: i64,
    /// The affected components
    pub components: Vec<ComponentProperties>,
}

/// Geometry of one logical region, as announced to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogicalRegion {
    /// The region
    pub region_id: RegionId,
    /// Displayed width in px
    pub display_width: i64,
    /// Displayed height in px
    pub display_height: i64,
    /// Whether clients may resize it
    pub resizable: bool,
}

/// Announce that a device's logical regions changed since the last layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogicalRegionChangeMessage {
    /// Unique id, monotonic within the evaluation
    pub message_id: MessageId,
    /// The layout timestamp
    pub timestamp: i64,
    /// The device whose regions changed
    pub device_id: DeviceId,
    /// The new region list
    pub logical_regions: Vec<LogicalRegion>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test]
    fn message_ids_are_strictly_increasing() {
        let a = MessageId::next();
        let b = MessageId::next();
        let c = MessageId::next();

        assert!(a < b && b < c);
    }

    #[test_case(0.0, 1920.0, "0.0000%"; "origin")]
    #[test_case(960.0, 1920.0, "50.0000%"; "half")]
    #[test_case(1920.0, 1920.0, "100.0000%"; "full")]
    #[test_case(810.0, 1920.0, "42.1875%"; "fractional")]
    #[test]
    fn percent_formatting(v: f64, extent: f64, expected: &str) {
        match Coord::percent(v, extent) {
            Coord::Percent(s) => assert_eq!(s, expected),
            other => panic!("expected percent, got {other:?}"),
        }
    }

    #[test_case(123.0, 1920.0; "uneven px")]
    #[test_case(500.0, 1024.0; "power of two extent")]
    #[test_case(1.0, 1080.0; "single px")]
    #[test]
    fn percent_round_trips_within_one_px(v: f64, extent: f64) {
        let c = Coord::percent(v, extent);

        assert!((c.as_px(extent) - v).abs() <= 1.0);
    }

    #[test]
    fn px_coords_serialize_as_numbers() {
        let p = CoordPosition {
            x: Coord::px(10.4),
            y: Coord::px(20.5),
        };

        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"x":10,"y":21}"#);
    }
}
