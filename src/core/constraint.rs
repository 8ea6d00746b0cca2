//! The constraint document and per-component effective constraints
use crate::{
    core::{component::Component, context::GroupKind, ComponentId, GroupId, RegionId},
    Error, Result,
};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, str::FromStr};
use strum::{AsRefStr, EnumString};
use tracing::warn;

/// The constraint id every document should carry: components bound to a
/// missing or unknown id fall back to it.
pub const DEFAULT_CONSTRAINT_ID: &str = "default";

/// The sentinel dimension meaning "don't care" in a preferred size.
pub const FREE_DIM: f64 = -1.0;

/// Unit a [SizeSpec] is expressed in.
#[derive(AsRefStr, Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Device pixels
    #[default]
    Px,
    /// Percent of the host region's bounding size
    Percent,
    /// Physical inches, resolved through the device dpi
    Inches,
}

/// A width / height pair with the unit it is expressed in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SizeSpec {
    /// Width, or [FREE_DIM] for "don't care"
    pub width: f64,
    /// Height, or [FREE_DIM] for "don't care"
    pub height: f64,
    /// Unit both dimensions are expressed in
    #[serde(default)]
    pub unit: Unit,
}

impl SizeSpec {
    /// A pixel size.
    pub fn px(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            unit: Unit::Px,
        }
    }

    /// The default preferred size: don't care on either axis.
    pub fn free() -> Self {
        Self::px(FREE_DIM, FREE_DIM)
    }

    /// The default minimum size: a single pixel.
    pub fn min_default() -> Self {
        Self::px(1.0, 1.0)
    }

    /// Whether a dimension is the "don't care" sentinel.
    pub fn is_free(dim: f64) -> bool {
        dim < 0.0
    }

    /// Resolve both dimensions to pixels against a host region.
    ///
    /// Free dimensions pass through unresolved.
    pub fn resolve(&self, dpi: f64, bounding: (f64, f64)) -> (f64, f64) {
        let one = |dim: f64, extent: f64| -> f64 {
            if Self::is_free(dim) {
                return FREE_DIM;
            }
            match self.unit {
                Unit::Px => dim,
                Unit::Percent => dim / 100.0 * extent,
                Unit::Inches => dim * dpi,
            }
        };

        (one(self.width, bounding.0), one(self.height, bounding.1))
    }
}

/// Unit a [MarginSpec] is expressed in.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarginUnit {
    /// Device pixels
    #[default]
    Px,
    /// Physical inches, resolved through the device dpi
    Inches,
}

/// Padding around a placed component.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarginSpec {
    /// The margin applied on every side
    pub value: f64,
    /// Unit the value is expressed in
    #[serde(default)]
    pub unit: MarginUnit,
}

impl MarginSpec {
    /// Resolve to pixels through the device dpi.
    pub fn resolve(&self, dpi: f64) -> f64 {
        match self.unit {
            MarginUnit::Px => self.value,
            MarginUnit::Inches => self.value * dpi,
        }
    }
}

/// An edge or centring requirement a component may declare.
#[derive(AsRefStr, EnumString, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum Anchor {
    /// Flush with the top edge of the host region
    Top,
    /// Flush with the bottom edge of the host region
    Bottom,
    /// Flush with the left edge of the host region
    Left,
    /// Flush with the right edge of the host region
    Right,
    /// Vertically centred on the host region
    VCenter,
    /// Horizontally centred on the host region
    HCenter,
}

bitflags! {
    /// The set of anchors in effect for one component.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Anchors: u8 {
        /// See [Anchor::Top]
        const TOP = 1 << 0;
        /// See [Anchor::Bottom]
        const BOTTOM = 1 << 1;
        /// See [Anchor::Left]
        const LEFT = 1 << 2;
        /// See [Anchor::Right]
        const RIGHT = 1 << 3;
        /// See [Anchor::VCenter]
        const VCENTER = 1 << 4;
        /// See [Anchor::HCenter]
        const HCENTER = 1 << 5;
    }
}

impl From<Anchor> for Anchors {
    fn from(a: Anchor) -> Self {
        match a {
            Anchor::Top => Anchors::TOP,
            Anchor::Bottom => Anchors::BOTTOM,
            Anchor::Left => Anchors::LEFT,
            Anchor::Right => Anchors::RIGHT,
            Anchor::VCenter => Anchors::VCENTER,
            Anchor::HCenter => Anchors::HCENTER,
        }
    }
}

impl Anchors {
    /// Parse the anchor token list of a constraint config.
    pub fn parse(tokens: &[String]) -> Result<Self> {
        let mut anchors = Anchors::empty();
        for t in tokens {
            anchors |= Anchors::from(Anchor::from_str(t)?);
        }

        Ok(anchors)
    }

    /// Rank used when ordering anchored candidates: top, right, left, bottom,
    /// then centring anchors.
    pub(crate) fn sort_rank(&self) -> u8 {
        if self.contains(Anchors::TOP) {
            0
        } else if self.contains(Anchors::RIGHT) {
            1
        } else if self.contains(Anchors::LEFT) {
            2
        } else if self.contains(Anchors::BOTTOM) {
            3
        } else {
            4
        }
    }
}

bitflags! {
    /// Media capabilities a component requires of its host device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MediaFlags: u8 {
        /// The component plays audio
        const AUDIO = 1 << 0;
        /// The component decodes video
        const VIDEO = 1 << 1;
        /// The component needs touch interaction
        const TOUCH = 1 << 2;
    }
}

/// The layout model a constraint document asks for.
#[derive(AsRefStr, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LayoutModel {
    /// The dynamic packing model
    Dynamic,
    /// Alias some documents use for the dynamic model
    Packer,
    /// Static templated layouts (not implemented by this engine)
    Template,
}

/// One side (personal or communal) of a constraint record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConstraintConfig {
    /// Placement priority; 0 excludes the component, higher wins
    pub priority: i32,
    /// Smallest acceptable size
    pub min_size: Option<SizeSpec>,
    /// Preferred size; free dimensions fill the available node
    pub pref_size: Option<SizeSpec>,
    /// Aspect ratio string "w:h"
    pub aspect: Option<String>,
    /// Padding around the placed rectangle
    pub margin: Option<MarginSpec>,
    /// Whitelist of region ids this component may occupy
    pub target_regions: Option<Vec<RegionId>>,
    /// Anchor tokens, parsed through [Anchor]
    pub anchor: Vec<String>,
    /// The component plays audio
    pub audio: bool,
    /// The component decodes video
    pub video: bool,
    /// The component needs touch interaction
    pub touch_interaction: bool,
    /// Components that must also be placed for this one to show
    pub component_dependency: Vec<ComponentId>,
    /// Components that must be placed *on the same device* as this one
    pub component_device_dependency: Vec<ComponentId>,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            priority: 1,
            min_size: None,
            pref_size: None,
            aspect: None,
            margin: None,
            target_regions: None,
            anchor: Vec::new(),
            audio: false,
            video: false,
            touch_interaction: false,
            component_dependency: Vec::new(),
            component_device_dependency: Vec::new(),
        }
    }
}

/// A (personal, communal) pair of configs keyed by a constraint id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintRecord {
    /// The id components bind to
    pub constraint_id: String,
    /// Config applied on personal devices
    #[serde(default)]
    pub personal: Option<ConstraintConfig>,
    /// Config applied on communal devices
    #[serde(default)]
    pub communal: Option<ConstraintConfig>,
}

/// The top level constraint document shipped with a DMApp.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDocument {
    /// Document schema version; this engine understands version 4
    pub version: u32,
    /// The DMApp the document belongs to
    pub dmapp: String,
    /// The constraint records
    #[serde(default)]
    pub constraints: Vec<ConstraintRecord>,
    /// Which layout model to run
    pub layout_model: LayoutModel,
}

/// A validated set of constraint records, indexed by constraint id.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    records: Vec<ConstraintRecord>,
    by_id: HashMap<String, usize>,
}

impl ConstraintSet {
    /// Validate a parsed [ConstraintDocument] and index its records.
    pub fn from_document(doc: ConstraintDocument) -> Result<Self> {
        if doc.version != 4 {
            return Err(Error::UnsupportedVersion(doc.version));
        }
        if doc.layout_model == LayoutModel::Template {
            return Err(Error::UnsupportedLayoutModel(
                doc.layout_model.as_ref().to_owned(),
            ));
        }

        let by_id = doc
            .constraints
            .iter()
            .enumerate()
            .map(|(ix, r)| (r.constraint_id.clone(), ix))
            .collect::<HashMap<_, _>>();

        if !by_id.contains_key(DEFAULT_CONSTRAINT_ID) {
            warn!("constraint document has no {DEFAULT_CONSTRAINT_ID:?} record");
        }

        Ok(Self {
            records: doc.constraints,
            by_id,
        })
    }

    /// Parse and validate a JSON constraint document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: ConstraintDocument = serde_json::from_str(raw)?;

        Self::from_document(doc)
    }

    /// Look up a record by constraint id.
    pub fn record(&self, id: &str) -> Option<&ConstraintRecord> {
        self.by_id.get(id).map(|&ix| &self.records[ix])
    }

    /// The record a component is bound to, falling back to the default
    /// record when the binding is missing or unknown.
    pub fn binding_for(&self, component: &Component) -> Result<&ConstraintRecord> {
        if let Some(id) = component.constraint_id.as_deref() {
            if let Some(r) = self.record(id) {
                return Ok(r);
            }
            warn!(component = %component.id, constraint = id, "unknown constraint binding, falling back to default");
        }

        self.record(DEFAULT_CONSTRAINT_ID)
            .ok_or_else(|| Error::MissingDefaultConstraint(component.id.clone()))
    }
}

/// Parse an aspect string "w:h" of positive integers into the ratio h / w.
pub(crate) fn parse_aspect(raw: &str) -> Result<f64> {
    let err = || Error::InvalidAspect(raw.to_owned());
    let (w, h) = raw.split_once(':').ok_or_else(err)?;
    let w: u32 = w.trim().parse().map_err(|_| err())?;
    let h: u32 = h.trim().parse().map_err(|_| err())?;

    if w == 0 || h == 0 {
        return Err(err());
    }

    Ok(h as f64 / w as f64)
}

/// The materialised constraints the packer works with for one component on
/// one class of device.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConstraint {
    /// Priority after group and context overrides (device overrides are
    /// applied per node, see
    /// [PriorityOverrides::device_override][crate::core::component::PriorityOverrides::device_override])
    pub priority: i32,
    /// Smallest acceptable size
    pub min: SizeSpec,
    /// Preferred size; free dimensions fill the available node
    pub pref: SizeSpec,
    /// Aspect ratio as height over width; 0.0 means free
    pub aspect: f64,
    /// Padding around the placed rectangle
    pub margin: Option<MarginSpec>,
    /// Region id whitelist, if any
    pub target_regions: Option<Vec<RegionId>>,
    /// Anchor set
    pub anchors: Anchors,
    /// Required media capabilities
    pub flags: MediaFlags,
    /// Components that must also be placed
    pub dependencies: Vec<ComponentId>,
    /// Components that must be placed on the same device
    pub device_dependencies: Vec<ComponentId>,
}

impl EffectiveConstraint {
    /// Minimum size in px for a given host region, clamped to at least one
    /// pixel on each axis.
    pub fn min_px(&self, dpi: f64, bounding: (f64, f64)) -> (f64, f64) {
        let (w, h) = self.min.resolve(dpi, bounding);

        (w.max(1.0), h.max(1.0))
    }

    /// Preferred size in px for a given host region; free dimensions remain
    /// [FREE_DIM].
    pub fn pref_px(&self, dpi: f64, bounding: (f64, f64)) -> (f64, f64) {
        self.pref.resolve(dpi, bounding)
    }

    /// Margin in px for a given device.
    pub fn margin_px(&self, dpi: f64) -> f64 {
        self.margin.map(|m| m.resolve(dpi)).unwrap_or(0.0)
    }

    /// Whether the region id whitelist (if any) admits `region`.
    pub fn accepts_region(&self, region: &RegionId) -> bool {
        match &self.target_regions {
            Some(ids) => ids.contains(region),
            None => true,
        }
    }
}

/// One or two effective constraints for a component within a group:
/// monolithic groups get a single side, mixed groups carry both and the
/// packer picks per node based on the host device.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedConstraint {
    /// Side applied on communal devices
    pub communal: Option<EffectiveConstraint>,
    /// Side applied on personal devices
    pub personal: Option<EffectiveConstraint>,
}

impl ResolvedConstraint {
    /// The side that applies on a device.
    pub fn for_device(&self, communal_device: bool) -> Option<&EffectiveConstraint> {
        if communal_device {
            self.communal.as_ref()
        } else {
            self.personal.as_ref()
        }
    }

    /// The priority used for ordering candidates within the group.
    pub fn sort_priority(&self) -> i32 {
        [self.communal.as_ref(), self.personal.as_ref()]
            .into_iter()
            .flatten()
            .map(|c| c.priority)
            .max()
            .unwrap_or(0)
    }

    /// Union of dependency targets across both sides.
    pub fn dependencies(&self) -> impl Iterator<Item = &ComponentId> {
        [self.communal.as_ref(), self.personal.as_ref()]
            .into_iter()
            .flatten()
            .flat_map(|c| c.dependencies.iter())
    }
}

/// Materialises per-component effective constraints.
#[derive(Debug)]
pub struct ConstraintResolver<'a> {
    set: &'a ConstraintSet,
}

impl<'a> ConstraintResolver<'a> {
    /// Create a resolver over a validated constraint set.
    pub fn new(set: &'a ConstraintSet) -> Self {
        Self { set }
    }

    /// Resolve the effective constraints for `component` within a group.
    ///
    /// Communal groups resolve the communal side, personal groups the
    /// personal side, mixed groups both. A record missing the needed side
    /// falls back to the side it does carry so that single-sided documents
    /// work on any group.
    pub fn resolve(
        &self,
        component: &Component,
        group: &GroupId,
        kind: GroupKind,
    ) -> Result<ResolvedConstraint> {
        let record = self.set.binding_for(component)?;
        let communal = record.communal.as_ref().or(record.personal.as_ref());
        let personal = record.personal.as_ref().or(record.communal.as_ref());

        let side = |cfg: Option<&ConstraintConfig>| -> Result<Option<EffectiveConstraint>> {
            cfg.map(|c| self.effective(c, &record.constraint_id, component, group))
                .transpose()
        };

        Ok(match kind {
            GroupKind::Communal => ResolvedConstraint {
                communal: side(communal)?,
                personal: None,
            },
            GroupKind::Personal => ResolvedConstraint {
                communal: None,
                personal: side(personal)?,
            },
            GroupKind::Mixed => ResolvedConstraint {
                communal: side(communal)?,
                personal: side(personal)?,
            },
        })
    }

    fn effective(
        &self,
        cfg: &ConstraintConfig,
        constraint_id: &str,
        component: &Component,
        group: &GroupId,
    ) -> Result<EffectiveConstraint> {
        let min = cfg.min_size.unwrap_or_else(SizeSpec::min_default);
        let pref = component
            .pref_size
            .or(cfg.pref_size)
            .unwrap_or_else(SizeSpec::free);

        // min > pref is only checkable when the two are in the same unit;
        // cross-unit comparisons need a host region and are caught at
        // placement time instead.
        if min.unit == pref.unit {
            let exceeded = |m: f64, p: f64| !SizeSpec::is_free(p) && m > p;
            if exceeded(min.width, pref.width) || exceeded(min.height, pref.height) {
                return Err(Error::MinExceedsPref(constraint_id.to_owned()));
            }
        }

        let aspect = match cfg.aspect.as_deref() {
            Some(raw) => parse_aspect(raw)?,
            None => 0.0,
        };

        let mut flags = MediaFlags::empty();
        flags.set(MediaFlags::AUDIO, cfg.audio);
        flags.set(MediaFlags::VIDEO, cfg.video);
        flags.set(MediaFlags::TOUCH, cfg.touch_interaction);

        Ok(EffectiveConstraint {
            priority: component.overrides.resolve(group, cfg.priority),
            min,
            pref,
            aspect,
            margin: cfg.margin,
            target_regions: cfg.target_regions.clone(),
            anchors: Anchors::parse(&cfg.anchor)?,
            flags,
            dependencies: cfg.component_dependency.clone(),
            device_dependencies: cfg.component_device_dependency.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::component::Component;
    use simple_test_case::test_case;

    #[test_case("16:9", Some(0.5625); "sixteen nine")]
    #[test_case("1:1", Some(1.0); "square")]
    #[test_case("4:3", Some(0.75); "four three")]
    #[test_case("16-9", None; "wrong separator")]
    #[test_case("0:9", None; "zero width")]
    #[test_case("16:0", None; "zero height")]
    #[test_case("a:b", None; "not numeric")]
    #[test_case("-16:9", None; "negative")]
    #[test]
    fn aspect_parsing(raw: &str, expected: Option<f64>) {
        let res = parse_aspect(raw);

        match expected {
            Some(v) => assert!((res.unwrap() - v).abs() < 1e-9),
            None => assert!(matches!(res, Err(Error::InvalidAspect(_)))),
        }
    }

    #[test_case(SizeSpec::px(800.0, 450.0), (800.0, 450.0); "px passthrough")]
    #[test_case(
        SizeSpec { width: 50.0, height: 25.0, unit: Unit::Percent },
        (960.0, 270.0);
        "percent of bounding"
    )]
    #[test_case(
        SizeSpec { width: 2.0, height: 1.0, unit: Unit::Inches },
        (192.0, 96.0);
        "inches through dpi"
    )]
    #[test_case(SizeSpec::free(), (FREE_DIM, FREE_DIM); "free dims pass through")]
    #[test]
    fn size_resolution(spec: SizeSpec, expected: (f64, f64)) {
        let res = spec.resolve(96.0, (1920.0, 1080.0));

        assert!((res.0 - expected.0).abs() < 1e-9);
        assert!((res.1 - expected.1).abs() < 1e-9);
    }

    #[test]
    fn anchor_parsing_folds_tokens() {
        let anchors =
            Anchors::parse(&["top".to_owned(), "left".to_owned(), "vcenter".to_owned()]).unwrap();

        assert_eq!(anchors, Anchors::TOP | Anchors::LEFT | Anchors::VCENTER);
    }

    #[test]
    fn unknown_anchor_token_is_an_error() {
        assert!(matches!(
            Anchors::parse(&["topleft".to_owned()]),
            Err(Error::Strum(_))
        ));
    }

    fn doc_json(version: u32, model: &str) -> String {
        format!(
            r#"{{
                "version": {version},
                "dmapp": "demo",
                "layoutModel": "{model}",
                "constraints": [
                    {{ "constraintId": "default", "personal": {{ "priority": 1 }} }},
                    {{
                        "constraintId": "video",
                        "communal": {{
                            "priority": 300,
                            "aspect": "16:9",
                            "minSize": {{ "width": 800, "height": 450 }},
                            "audio": true,
                            "video": true
                        }}
                    }}
                ]
            }}"#
        )
    }

    #[test]
    fn valid_document_round_trips() {
        let set = ConstraintSet::from_json(&doc_json(4, "dynamic")).unwrap();
        let record = set.record("video").unwrap();
        let communal = record.communal.as_ref().unwrap();

        assert_eq!(communal.priority, 300);
        assert_eq!(communal.aspect.as_deref(), Some("16:9"));
        assert!(communal.audio && communal.video);
    }

    #[test_case(3, "dynamic"; "old version")]
    #[test_case(5, "packer"; "future version")]
    #[test]
    fn unsupported_versions_are_rejected(version: u32, model: &str) {
        assert!(matches!(
            ConstraintSet::from_json(&doc_json(version, model)),
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn template_model_is_rejected() {
        assert!(matches!(
            ConstraintSet::from_json(&doc_json(4, "template")),
            Err(Error::UnsupportedLayoutModel(_))
        ));
    }

    #[test]
    fn min_exceeding_pref_is_rejected() {
        let set = ConstraintSet::from_json(
            r#"{
                "version": 4,
                "dmapp": "demo",
                "layoutModel": "dynamic",
                "constraints": [{
                    "constraintId": "broken",
                    "personal": {
                        "minSize": { "width": 900, "height": 100 },
                        "prefSize": { "width": 800, "height": 600 }
                    }
                }]
            }"#,
        )
        .unwrap();
        let resolver = ConstraintResolver::new(&set);
        let c = Component::new("c1", Some("broken"));

        let res = resolver.resolve(&c, &GroupId::from("g"), GroupKind::Personal);

        assert!(matches!(res, Err(Error::MinExceedsPref(_))));
    }

    #[test]
    fn missing_binding_falls_back_to_default() {
        let set = ConstraintSet::from_json(&doc_json(4, "dynamic")).unwrap();
        let resolver = ConstraintResolver::new(&set);
        let c = Component::new("c1", Some("no-such-constraint"));

        let resolved = resolver
            .resolve(&c, &GroupId::from("g"), GroupKind::Personal)
            .unwrap();

        assert_eq!(resolved.personal.as_ref().unwrap().priority, 1);
    }

    #[test]
    fn mixed_groups_resolve_both_sides() {
        let set = ConstraintSet::from_json(&doc_json(4, "dynamic")).unwrap();
        let resolver = ConstraintResolver::new(&set);
        let c = Component::new("c1", Some("video"));

        let resolved = resolver
            .resolve(&c, &GroupId::from("g"), GroupKind::Mixed)
            .unwrap();

        // the single-sided record covers both sides
        assert!(resolved.communal.is_some());
        assert!(resolved.personal.is_some());
        assert_eq!(resolved.sort_priority(), 300);
    }
}
