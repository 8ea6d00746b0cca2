//! Components and the transaction driven lifecycle they move through
use crate::{
    core::{constraint::SizeSpec, ComponentId, DeviceId, GroupId},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::Display;

/// The lifecycle states a component moves through.
///
/// Transitions are driven by the external transaction interface; the engine
/// only observes the current state. `stopped -> started` is not permitted:
/// callers must destroy and re-init instead.
#[derive(Display, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Declared but not yet initialised on any client
    Uninitialised,
    /// Initialised and eligible for placement, but not yet presenting
    Inited,
    /// Actively presenting
    Started,
    /// Finished presenting; awaiting destruction
    Stopped,
    /// Removed from the running application
    Destroyed,
}

/// Per-component priority overrides at the three supported scopes.
///
/// Resolution order is fixed: device, then group, then context, then the
/// constraint's own priority. The value -1 removes the override at its scope
/// so resolution falls through to the next one.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PriorityOverrides {
    /// Overrides keyed by device id
    pub device: HashMap<DeviceId, i32>,
    /// Overrides keyed by group id
    pub group: HashMap<GroupId, i32>,
    /// Session wide override
    pub context: Option<i32>,
}

impl PriorityOverrides {
    /// Resolve the group and context scopes against a constraint default.
    ///
    /// The device scope is applied separately per node through
    /// [device_override][Self::device_override], since a mixed group resolves
    /// one effective constraint for several devices.
    pub fn resolve(&self, group: &GroupId, default: i32) -> i32 {
        if let Some(&v) = self.group.get(group) {
            if v != -1 {
                return v;
            }
        }
        if let Some(v) = self.context {
            if v != -1 {
                return v;
            }
        }

        default
    }

    /// The device scoped override for `device`, if one is in effect.
    pub fn device_override(&self, device: &DeviceId) -> Option<i32> {
        match self.device.get(device) {
            Some(&v) if v != -1 => Some(v),
            _ => None,
        }
    }

    /// Whether any override is set at any scope.
    pub fn is_empty(&self) -> bool {
        self.device.is_empty() && self.group.is_empty() && self.context.is_none()
    }
}

/// A displayable element of the running application.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Stable identifier
    pub id: ComponentId,
    /// The constraint record this component is bound to; a missing or
    /// unknown binding falls back to the document's default record
    #[serde(default)]
    pub constraint_id: Option<String>,
    /// Current lifecycle state
    #[serde(default = "Component::default_state")]
    pub state: LifecycleState,
    /// Presentation clock time the component started at, if it has
    #[serde(default)]
    pub start_time: Option<f64>,
    /// Presentation clock time the component stopped at, if it has
    #[serde(default)]
    pub stop_time: Option<f64>,
    /// Orthogonal visibility flag; hidden components are not laid out
    #[serde(default = "Component::default_visible")]
    pub visible: bool,
    /// Priority overrides in effect for this component
    #[serde(default)]
    pub overrides: PriorityOverrides,
    /// Preferred size override, taking precedence over the constraint's
    #[serde(default)]
    pub pref_size: Option<SizeSpec>,
    /// Opaque client configuration, passed through untouched
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    /// Opaque client parameters, passed through untouched
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

impl Component {
    fn default_state() -> LifecycleState {
        LifecycleState::Inited
    }

    fn default_visible() -> bool {
        true
    }

    /// Create a freshly initialised component bound to a constraint id.
    pub fn new(id: impl Into<ComponentId>, constraint_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            constraint_id: constraint_id.map(str::to_owned),
            state: LifecycleState::Inited,
            start_time: None,
            stop_time: None,
            visible: true,
            overrides: PriorityOverrides::default(),
            pref_size: None,
            config: None,
            parameters: None,
        }
    }

    /// Whether this component takes part in layout evaluation.
    pub fn is_active(&self) -> bool {
        matches!(self.state, LifecycleState::Inited | LifecycleState::Started)
    }

    /// Whether the component is presenting: started and not stopped.
    pub fn is_running(&self) -> bool {
        self.start_time.is_some() && self.stop_time.is_none()
    }
}

/// An action on one component, received from the transaction interface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Transaction {
    /// Initialise a new component
    #[serde(rename_all = "camelCase")]
    Init {
        /// The component to create
        component_id: ComponentId,
        /// The constraint record it binds to
        #[serde(default)]
        constraint_id: Option<String>,
        /// Opaque client configuration
        #[serde(default)]
        config: Option<serde_json::Value>,
        /// Opaque client parameters
        #[serde(default)]
        parameters: Option<serde_json::Value>,
    },
    /// Begin presenting an inited component
    #[serde(rename_all = "camelCase")]
    Start {
        /// The component to start
        component_id: ComponentId,
        /// Presentation clock start time
        time: f64,
    },
    /// Stop a started component
    #[serde(rename_all = "camelCase")]
    Stop {
        /// The component to stop
        component_id: ComponentId,
        /// Presentation clock stop time
        time: f64,
    },
    /// Remove a component from the application
    #[serde(rename_all = "camelCase")]
    Destroy {
        /// The component to destroy
        component_id: ComponentId,
    },
}

/// The set of components making up the running application.
///
/// Insertion order is preserved: it is the final tie break when ordering
/// placement candidates.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ComponentSet {
    components: Vec<Component>,
}

impl ComponentSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component, replacing any previous one with the same id.
    pub fn insert(&mut self, component: Component) {
        match self.components.iter_mut().find(|c| c.id == component.id) {
            Some(slot) => *slot = component,
            None => self.components.push(component),
        }
    }

    /// Look up a component by id.
    pub fn get(&self, id: &ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| &c.id == id)
    }

    fn get_mut(&mut self, id: &ComponentId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| &c.id == id)
    }

    /// Iterate over all components in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Iterate over the components that take part in layout evaluation.
    pub fn active(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is_active())
    }

    /// The number of components in the set.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Apply a transaction, enforcing the lifecycle state machine.
    pub fn apply(&mut self, transaction: Transaction) -> Result<()> {
        use LifecycleState::*;

        match transaction {
            Transaction::Init {
                component_id,
                constraint_id,
                config,
                parameters,
            } => {
                if let Some(existing) = self.get(&component_id) {
                    if existing.state != Destroyed {
                        return Err(Error::IllegalTransition {
                            component: component_id,
                            from: existing.state,
                            to: Inited,
                        });
                    }
                }

                let mut c = Component::new(component_id, constraint_id.as_deref());
                c.config = config;
                c.parameters = parameters;
                self.insert(c);

                Ok(())
            }

            Transaction::Start { component_id, time } => {
                let c = self
                    .get_mut(&component_id)
                    .ok_or_else(|| Error::UnknownComponent(component_id.clone()))?;

                if c.state != Inited {
                    return Err(Error::IllegalTransition {
                        component: component_id,
                        from: c.state,
                        to: Started,
                    });
                }

                c.state = Started;
                c.start_time = Some(time);

                Ok(())
            }

            Transaction::Stop { component_id, time } => {
                let c = self
                    .get_mut(&component_id)
                    .ok_or_else(|| Error::UnknownComponent(component_id.clone()))?;

                if c.state != Started {
                    return Err(Error::IllegalTransition {
                        component: component_id,
                        from: c.state,
                        to: Stopped,
                    });
                }

                c.state = Stopped;
                c.stop_time = Some(time);

                Ok(())
            }

            Transaction::Destroy { component_id } => {
                let c = self
                    .get_mut(&component_id)
                    .ok_or_else(|| Error::UnknownComponent(component_id.clone()))?;
                c.state = Destroyed;

                Ok(())
            }
        }
    }
}

impl FromIterator<Component> for ComponentSet {
    fn from_iter<T: IntoIterator<Item = Component>>(iter: T) -> Self {
        let mut set = Self::new();
        for c in iter {
            set.insert(c);
        }

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    fn set_with(id: &str, state: LifecycleState) -> ComponentSet {
        let mut c = Component::new(id, None);
        c.state = state;
        if matches!(state, LifecycleState::Started | LifecycleState::Stopped) {
            c.start_time = Some(1.0);
        }
        if state == LifecycleState::Stopped {
            c.stop_time = Some(2.0);
        }

        [c].into_iter().collect()
    }

    #[test]
    fn full_lifecycle_is_accepted() {
        let mut set = ComponentSet::new();

        set.apply(Transaction::Init {
            component_id: ComponentId::from("c"),
            constraint_id: None,
            config: None,
            parameters: None,
        })
        .unwrap();
        set.apply(Transaction::Start {
            component_id: ComponentId::from("c"),
            time: 1.5,
        })
        .unwrap();
        set.apply(Transaction::Stop {
            component_id: ComponentId::from("c"),
            time: 9.0,
        })
        .unwrap();
        set.apply(Transaction::Destroy {
            component_id: ComponentId::from("c"),
        })
        .unwrap();

        let c = set.get(&ComponentId::from("c")).unwrap();
        assert_eq!(c.state, LifecycleState::Destroyed);
        assert_eq!(c.start_time, Some(1.5));
        assert_eq!(c.stop_time, Some(9.0));
    }

    #[test]
    fn stopped_components_can_not_restart() {
        let mut set = set_with("c", LifecycleState::Stopped);

        let res = set.apply(Transaction::Start {
            component_id: ComponentId::from("c"),
            time: 3.0,
        });

        assert!(matches!(res, Err(Error::IllegalTransition { .. })));
    }

    #[test]
    fn destroyed_components_can_be_reinited() {
        let mut set = set_with("c", LifecycleState::Destroyed);

        set.apply(Transaction::Init {
            component_id: ComponentId::from("c"),
            constraint_id: None,
            config: None,
            parameters: None,
        })
        .unwrap();

        assert_eq!(
            set.get(&ComponentId::from("c")).unwrap().state,
            LifecycleState::Inited
        );
    }

    #[test]
    fn transactions_on_unknown_components_do_not_mutate_state() {
        let mut set = set_with("c", LifecycleState::Inited);
        let before = set.clone();

        let res = set.apply(Transaction::Start {
            component_id: ComponentId::from("nope"),
            time: 0.0,
        });

        assert!(matches!(res, Err(Error::UnknownComponent(_))));
        assert_eq!(set, before);
    }

    #[test_case(LifecycleState::Inited, true; "inited is active")]
    #[test_case(LifecycleState::Started, true; "started is active")]
    #[test_case(LifecycleState::Stopped, false; "stopped is not")]
    #[test_case(LifecycleState::Destroyed, false; "destroyed is not")]
    #[test]
    fn active_components(state: LifecycleState, expected: bool) {
        let set = set_with("c", state);

        assert_eq!(set.active().count() == 1, expected);
    }

    #[test]
    fn override_resolution_prefers_group_then_context() {
        let g = GroupId::from("g");
        let mut o = PriorityOverrides::default();
        assert_eq!(o.resolve(&g, 7), 7);

        o.context = Some(20);
        assert_eq!(o.resolve(&g, 7), 20);

        o.group.insert(g.clone(), 30);
        assert_eq!(o.resolve(&g, 7), 30);

        // -1 removes the group override so the context one applies again
        o.group.insert(g.clone(), -1);
        assert_eq!(o.resolve(&g, 7), 20);
    }

    #[test]
    fn device_override_wins_and_minus_one_removes_it() {
        let d = DeviceId::from("d");
        let mut o = PriorityOverrides::default();
        assert_eq!(o.device_override(&d), None);

        o.device.insert(d.clone(), 42);
        assert_eq!(o.device_override(&d), Some(42));

        o.device.insert(d.clone(), -1);
        assert_eq!(o.device_override(&d), None);
    }
}
