//! Mondrian is a constraint-driven layout engine for distributed media
//! applications: sessions in which a heterogeneous set of devices
//! (televisions, tablets, phones) present the components of a shared
//! application together.
//!
//! Given a snapshot of the session ([Context][core::Context]), the
//! application's constraint document ([ConstraintSet][core::ConstraintSet]),
//! the current component states ([ComponentSet][core::ComponentSet]) and the
//! previously published arrangement, the engine decides which components are
//! shown, on which device and region, at what position and size, and which
//! differential messages carry clients from the old arrangement to the new
//! one:
//!
//! ```no_run
//! use mondrian::core::{ComponentSet, ConstraintSet, Context, Engine};
//!
//! # fn example(ctx: Context, constraints: ConstraintSet, components: ComponentSet) -> mondrian::Result<()> {
//! let evaluation = Engine::evaluate(&ctx, &constraints, &components, None, 0)?;
//! for msg in evaluation.diff.create.iter() {
//!     println!("new component: {}", msg.component_id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The engine is a synchronous pure function over its inputs: it performs no
//! I/O, holds no global state beyond a monotonic message-id counter, and is
//! safe to run concurrently for independent sessions. Serialising evaluations
//! of the *same* session is the caller's responsibility.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms
)]

pub mod assemble;
pub mod core;
pub mod packer;
pub mod pure;
pub mod simulate;

#[doc(inline)]
pub use crate::core::{
    ComponentId, ContextId, DeviceId, DmAppId, Engine, Evaluation, GroupId, RegionId,
};

use crate::core::component::LifecycleState;

/// Error variants for operations that can not be reported through the
/// `notPlaced` section of a layout.
///
/// Component level placement failures are never raised as an [Error]: they
/// demote the component to `notPlaced` and the evaluation carries on. Only
/// malformed input shapes and illegal state transitions surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An aspect ratio string was not of the form "w:h" with positive integers
    #[error("invalid aspect ratio {0:?} (expected \"w:h\" of positive integers)")]
    InvalidAspect(String),

    /// A component lifecycle transition that the state machine forbids
    #[error("component {component}: illegal transition {from} -> {to}")]
    IllegalTransition {
        /// The component the transaction targeted
        component: ComponentId,
        /// The state the component was in
        from: LifecycleState,
        /// The state the transaction asked for
        to: LifecycleState,
    },

    /// Malformed JSON was supplied as a constraint document
    #[error("malformed constraint document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    /// A constraint declared a minimum size larger than its preferred size
    #[error("minimum size exceeds preferred size for constraint {0:?}")]
    MinExceedsPref(String),

    /// The constraint document does not carry a "default" record and a
    /// component binding could not be resolved against it
    #[error("no \"default\" constraint to fall back to for component {0}")]
    MissingDefaultConstraint(ComponentId),

    /// Parsing a strum generated enum from a str failed
    #[error("{0}")]
    Strum(#[from] strum::ParseError),

    /// A transaction referenced a component that is not part of the application
    #[error("{0} is not a known component")]
    UnknownComponent(ComponentId),

    /// The constraint document requested a layout model this engine does not
    /// implement
    #[error("unsupported layout model {0:?} (only \"dynamic\" / \"packer\" are in scope)")]
    UnsupportedLayoutModel(String),

    /// The constraint document version is not one this engine understands
    #[error("unsupported constraint document version {0} (expected 4)")]
    UnsupportedVersion(u32),
}

/// A Result where the error type is a mondrian [Error]
pub type Result<T> = std::result::Result<T, Error>;
