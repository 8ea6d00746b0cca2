//! Core data structures and the evaluation entry points
use crate::{
    assemble,
    packer::GroupPacker,
    pure::{
        diff::{self, Diff},
        layout::Layout,
    },
    simulate::{self, Simulation},
    Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

pub mod component;
pub mod constraint;
pub mod context;
pub mod messages;

#[doc(inline)]
pub use component::{Component, ComponentSet, LifecycleState, PriorityOverrides, Transaction};
#[doc(inline)]
pub use constraint::{ConstraintDocument, ConstraintResolver, ConstraintSet, EffectiveConstraint};
#[doc(inline)]
pub use context::{Capabilities, Context, ContextConfig, Device, Group, GroupKind, Orientation, Region};

macro_rules! id_type {
    ($(#[$doc:meta])+ $name:ident) => {
        $(#[$doc])+
        #[derive(
            Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

id_type!(
    /// Identifier of a component within its application
    ComponentId
);
id_type!(
    /// Identifier of a session
    ContextId
);
id_type!(
    /// Identifier of a device within a session
    DeviceId
);
id_type!(
    /// Identifier of a distributed media application
    DmAppId
);
id_type!(
    /// Identifier of a device group within a session
    GroupId
);
id_type!(
    /// Identifier of a logical region on a device
    RegionId
);

/// The result of one evaluation: the persist-ready layout and the messages
/// that carry clients from the previous one to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The newly assembled layout
    pub layout: Layout,
    /// The differential message sets
    pub diff: Diff,
}

/// The layout engine.
///
/// A pure, synchronous function over its inputs: callers serialise
/// evaluations of the same session (one at a time), persist the returned
/// layout, and forward the diff's messages to clients. Concurrent
/// evaluations of independent sessions are safe.
#[derive(Debug)]
pub struct Engine;

impl Engine {
    /// Evaluate a session snapshot into a fresh layout and the diff against
    /// the previous one.
    ///
    /// `timestamp_ns` is the server timestamp (nanoseconds since the Unix
    /// epoch) stamped onto the layout and its messages; the engine performs
    /// no clock reads of its own.
    #[instrument(level = "debug", skip_all, fields(context = %ctx.id))]
    pub fn evaluate(
        ctx: &Context,
        constraints: &ConstraintSet,
        components: &ComponentSet,
        previous: Option<&Layout>,
        timestamp_ns: i64,
    ) -> Result<Evaluation> {
        let resolver = ConstraintResolver::new(constraints);
        let mut layout = Layout::empty(ctx.id.clone(), ctx.dmapp.clone(), timestamp_ns);

        let visible: Vec<&Component> = components.active().filter(|c| c.visible).collect();
        debug!(
            devices = ctx.devices.len(),
            components = visible.len(),
            "evaluating layout"
        );

        for group in ctx.groups() {
            let packer =
                GroupPacker::new(ctx, &group, visible.iter().copied(), &resolver)?;
            let outcome = packer.pack();
            assemble::extend_layout(&mut layout, ctx, &group, &outcome, components);
        }

        let diff = diff::compute(ctx, previous, &mut layout, components);

        Ok(Evaluation { layout, diff })
    }

    /// Dry-run placement for a set of components, announcing the devices
    /// they could land on without persisting anything.
    ///
    /// Only the initial packing pass runs: coverage is irrelevant when the
    /// question is which devices are viable.
    #[instrument(level = "debug", skip_all, fields(context = %ctx.id))]
    pub fn simulate(
        ctx: &Context,
        constraints: &ConstraintSet,
        components: &ComponentSet,
        force_visible: &[ComponentId],
        timestamp_ns: i64,
    ) -> Result<Simulation> {
        simulate::run(ctx, constraints, components, force_visible, timestamp_ns)
    }
}
