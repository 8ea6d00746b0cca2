//! End to end evaluation scenarios over the public engine API
use mondrian::{
    core::{
        messages::Coord, Capabilities, Component, ComponentSet, ConstraintSet, Context,
        ContextConfig, Device, Engine, Orientation, Transaction,
    },
    pure::{Extent, NotPlacedStatus},
    ComponentId, ContextId, DeviceId, DmAppId, GroupId,
};

const TS: i64 = 1_700_000_000_000_000_000;

fn tv() -> Device {
    Device {
        id: DeviceId::from("tv"),
        group: None,
        orientation: Orientation::Landscape,
        caps: Capabilities {
            display_width: 1920,
            display_height: 1080,
            dpi: 96.0,
            concurrent_audio: 1,
            concurrent_video: 1,
            touch_interaction: false,
            communal_device: true,
            orientations: vec![Orientation::Landscape],
        },
        regions: vec![],
    }
}

fn tablet() -> Device {
    Device {
        id: DeviceId::from("tablet"),
        group: None,
        orientation: Orientation::Landscape,
        caps: Capabilities {
            display_width: 1024,
            display_height: 768,
            dpi: 132.0,
            concurrent_audio: 1,
            concurrent_video: 1,
            touch_interaction: true,
            communal_device: false,
            orientations: vec![Orientation::Landscape, Orientation::Portrait],
        },
        regions: vec![],
    }
}

fn ctx(devices: Vec<Device>) -> Context {
    Context {
        id: ContextId::from("ctx-1"),
        dmapp: DmAppId::from("demo-app"),
        devices,
        config: ContextConfig::default(),
    }
}

fn constraints(inner: &str) -> ConstraintSet {
    let raw = format!(
        r#"{{
            "version": 4,
            "dmapp": "demo-app",
            "layoutModel": "dynamic",
            "constraints": [
                {{ "constraintId": "default", "personal": {{ "priority": 1 }}, "communal": {{ "priority": 1 }} }},
                {inner}
            ]
        }}"#
    );

    ConstraintSet::from_json(&raw).expect("valid test document")
}

fn started(id: &str, constraint: &str) -> Component {
    let mut c = Component::new(id, Some(constraint));
    c.state = mondrian::core::LifecycleState::Started;
    c.start_time = Some(1.0);

    c
}

fn video_and_chat() -> ConstraintSet {
    constraints(
        r#"{ "constraintId": "video", "communal": {
                "priority": 300, "aspect": "16:9",
                "minSize": { "width": 800, "height": 450 },
                "prefSize": { "width": 1920, "height": 1080 },
                "audio": true
           } },
           { "constraintId": "chat", "communal": {
                "priority": 5,
                "minSize": { "width": 300, "height": 300 },
                "prefSize": { "width": 500, "height": 600 }
           } }"#,
    )
}

#[test]
fn full_screen_video_wins_and_chat_is_skipped() {
    let ctx = ctx(vec![tv()]);
    let set = video_and_chat();
    let components: ComponentSet = [started("video", "video"), started("chat", "chat")]
        .into_iter()
        .collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    let d = ev.layout.device(&DeviceId::from("tv")).expect("tv in layout");
    let video = d.component(&ComponentId::from("video")).expect("video placed");
    assert_eq!(video.position.map(|p| (p.x, p.y)), Some((0.0, 0.0)));
    assert_eq!(
        video.size.map(|s| (s.width, s.height)),
        Some((1920.0, 1080.0))
    );
    assert!(d.component(&ComponentId::from("chat")).is_none());
    assert_eq!(
        ev.layout
            .not_placed
            .iter()
            .find(|np| np.component_ids.contains(&ComponentId::from("chat")))
            .map(|np| np.status),
        Some(NotPlacedStatus::Skipped)
    );
}

#[test]
fn chat_alone_gets_its_preferred_size_at_the_origin() {
    let ctx = ctx(vec![tv()]);
    let set = video_and_chat();
    let components: ComponentSet = [started("chat", "chat")].into_iter().collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    let chat = ev
        .layout
        .device(&DeviceId::from("tv"))
        .and_then(|d| d.component(&ComponentId::from("chat")))
        .expect("chat placed");
    assert_eq!(chat.position.map(|p| (p.x, p.y)), Some((0.0, 0.0)));
    assert_eq!(chat.size.map(|s| (s.width, s.height)), Some((500.0, 600.0)));
}

#[test]
fn video_lands_on_the_tv_and_chat_on_the_tablet() {
    let ctx = ctx(vec![tv(), tablet()]);
    let set = constraints(
        r#"{ "constraintId": "video",
             "communal": {
                "priority": 300, "aspect": "16:9",
                "minSize": { "width": 800, "height": 450 },
                "prefSize": { "width": 1920, "height": 810 },
                "audio": true
             },
             "personal": {
                "priority": 300,
                "minSize": { "width": 800, "height": 450 },
                "targetRegions": ["tab1", "tab2"]
             } },
           { "constraintId": "chat",
             "communal": { "priority": 0 },
             "personal": {
                "priority": 2,
                "minSize": { "width": 50, "height": 50 }
             } }"#,
    );
    let components: ComponentSet = [started("video", "video"), started("chat", "chat")]
        .into_iter()
        .collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    let video_devices: Vec<_> = ev
        .layout
        .devices_for(&ComponentId::from("video"))
        .cloned()
        .collect();
    let chat_devices: Vec<_> = ev
        .layout
        .devices_for(&ComponentId::from("chat"))
        .cloned()
        .collect();
    assert_eq!(video_devices, vec![DeviceId::from("tv")]);
    assert_eq!(chat_devices, vec![DeviceId::from("tablet")]);
}

#[test]
fn a_mixed_group_chooses_the_constraint_side_per_device() {
    let mut communal = tv();
    communal.group = Some(GroupId::from("g"));
    let mut personal = tablet();
    personal.group = Some(GroupId::from("g"));
    let ctx = ctx(vec![communal, personal]);

    let set = constraints(
        r#"{ "constraintId": "host",
             "communal": { "priority": 300, "minSize": { "width": 400, "height": 300 } },
             "personal": { "priority": 2, "minSize": { "width": 400, "height": 300 } } },
           { "constraintId": "remote",
             "communal": { "priority": 0 },
             "personal": { "priority": 10, "minSize": { "width": 100, "height": 100 } } }"#,
    );
    let components: ComponentSet = [started("host", "host"), started("remote", "remote")]
        .into_iter()
        .collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    // the host's communal side dominates, so it lands on the tv; the remote
    // is excluded on communal devices and lands on the tablet
    assert_eq!(
        ev.layout
            .devices_for(&ComponentId::from("host"))
            .cloned()
            .collect::<Vec<_>>(),
        vec![DeviceId::from("tv")]
    );
    assert_eq!(
        ev.layout
            .devices_for(&ComponentId::from("remote"))
            .cloned()
            .collect::<Vec<_>>(),
        vec![DeviceId::from("tablet")]
    );
}

#[test]
fn dependants_fail_as_no_dependent_when_their_target_leaves_no_room() {
    let mut small_tv = tv();
    small_tv.caps.display_width = 1000;
    small_tv.caps.display_height = 1000;
    let ctx = ctx(vec![small_tv]);
    let set = constraints(
        r#"{ "constraintId": "x", "communal": {
                "priority": 10,
                "minSize": { "width": 900, "height": 900 },
                "prefSize": { "width": 1000, "height": 1000 }
           } },
           { "constraintId": "y", "communal": {
                "priority": 5,
                "minSize": { "width": 300, "height": 300 },
                "componentDependency": ["x"]
           } }"#,
    );
    let components: ComponentSet = [started("x", "x"), started("y", "y")]
        .into_iter()
        .collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    assert_eq!(
        ev.layout.devices_for(&ComponentId::from("x")).count(),
        1,
        "x should be placed"
    );
    assert_eq!(
        ev.layout
            .not_placed
            .iter()
            .find(|np| np.component_ids.contains(&ComponentId::from("y")))
            .map(|np| np.status),
        Some(NotPlacedStatus::NoDependent)
    );
}

#[test]
fn start_then_stop_produces_create_then_destroy() {
    let ctx = ctx(vec![tv()]);
    let set = video_and_chat();

    let mut components = ComponentSet::new();
    components
        .apply(Transaction::Init {
            component_id: ComponentId::from("chat"),
            constraint_id: Some("chat".to_owned()),
            config: None,
            parameters: None,
        })
        .unwrap();
    components
        .apply(Transaction::Start {
            component_id: ComponentId::from("chat"),
            time: 2.0,
        })
        .unwrap();

    let first = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();
    assert_eq!(first.diff.create.len(), 1);
    assert_eq!(first.diff.create[0].component_id, ComponentId::from("chat"));
    assert!(first.diff.update.is_empty() && first.diff.destroy.is_empty());

    components
        .apply(Transaction::Stop {
            component_id: ComponentId::from("chat"),
            time: 9.0,
        })
        .unwrap();

    let second = Engine::evaluate(&ctx, &set, &components, Some(&first.layout), TS + 1).unwrap();
    assert!(second.diff.create.is_empty() && second.diff.update.is_empty());
    assert_eq!(second.diff.destroy.len(), 1);
    assert_eq!(second.diff.destroy[0].stop_time, Some(9.0));
}

#[test]
fn a_component_that_no_longer_fits_is_hidden_not_destroyed() {
    let ctx = ctx(vec![tv()]);
    let grown = |min: u32| {
        constraints(&format!(
            r#"{{ "constraintId": "d", "communal": {{
                    "priority": 10,
                    "minSize": {{ "width": {min}, "height": {min} }}
               }} }}"#
        ))
    };
    let components: ComponentSet = [started("d", "d")].into_iter().collect();

    let first = Engine::evaluate(&ctx, &grown(300), &components, None, TS).unwrap();
    assert_eq!(first.layout.devices_for(&ComponentId::from("d")).count(), 1);

    let second =
        Engine::evaluate(&ctx, &grown(5000), &components, Some(&first.layout), TS + 1).unwrap();

    assert!(second.diff.destroy.is_empty());
    assert_eq!(second.diff.update.len(), 1);
    let layout = &second.diff.update[0].layout;
    assert_eq!(
        layout.size.as_ref().map(|s| (s.width.clone(), s.height.clone())),
        Some((Coord::Px(-1), Coord::Px(-1)))
    );
    let entry = second
        .layout
        .device(&DeviceId::from("tv"))
        .and_then(|d| d.component(&ComponentId::from("d")))
        .expect("hidden entry kept on the tv");
    assert_eq!(entry.size, Some(Extent::hidden()));
}

#[test]
fn min_size_larger_than_the_only_region_is_incompatible() {
    let ctx = ctx(vec![tv()]);
    let set = constraints(
        r#"{ "constraintId": "huge", "communal": {
                "priority": 10,
                "minSize": { "width": 4000, "height": 4000 }
           } }"#,
    );
    let components: ComponentSet = [started("huge", "huge")].into_iter().collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    assert!(ev.layout.devices.is_empty());
    assert_eq!(
        ev.layout.not_placed.first().map(|np| np.status),
        Some(NotPlacedStatus::Incompatible)
    );
}

#[test]
fn priority_zero_components_are_skipped() {
    let ctx = ctx(vec![tv()]);
    let set = constraints(r#"{ "constraintId": "muted", "communal": { "priority": 0 } }"#);
    let components: ComponentSet = [started("muted", "muted")].into_iter().collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    assert!(ev.layout.devices.is_empty());
    assert_eq!(
        ev.layout.not_placed.first().map(|np| np.status),
        Some(NotPlacedStatus::Skipped)
    );
}

#[test]
fn reduce_factor_of_one_still_terminates() {
    let mut ctx = ctx(vec![tv()]);
    ctx.config.reduce_factor = 1.0;
    let set = video_and_chat();
    let components: ComponentSet = [started("video", "video"), started("chat", "chat")]
        .into_iter()
        .collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    // same outcome as the default config: the video fills the screen and
    // the chat is skipped, without the reduction loop spinning
    assert_eq!(ev.layout.devices_for(&ComponentId::from("video")).count(), 1);
    assert_eq!(
        ev.layout
            .not_placed
            .iter()
            .find(|np| np.component_ids.contains(&ComponentId::from("chat")))
            .map(|np| np.status),
        Some(NotPlacedStatus::Skipped)
    );
}

#[test]
fn reevaluation_with_unchanged_inputs_is_an_empty_diff() {
    let ctx = ctx(vec![tv(), tablet()]);
    let set = video_and_chat();
    let components: ComponentSet = [started("video", "video"), started("chat", "chat")]
        .into_iter()
        .collect();

    let first = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();
    let second = Engine::evaluate(&ctx, &set, &components, Some(&first.layout), TS).unwrap();

    assert!(second.diff.is_empty(), "diff: {:?}", second.diff);
    assert_eq!(second.layout.devices, first.layout.devices);
    assert_eq!(second.layout.not_placed, first.layout.not_placed);
}

#[test]
fn percent_coordinates_round_trip_within_one_px() {
    let mut ctx = ctx(vec![tv()]);
    ctx.config.percent_coords = true;
    let set = video_and_chat();
    let components: ComponentSet = [started("chat", "chat")].into_iter().collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    let layout = &ev.diff.create[0].layout;
    let size = layout.size.as_ref().expect("size present");
    assert!(matches!(size.width, Coord::Percent(_)));
    assert!((size.width.as_px(1920.0) - 500.0).abs() <= 1.0);
    assert!((size.height.as_px(1080.0) - 600.0).abs() <= 1.0);

    let position = layout.position.as_ref().expect("position present");
    assert!((position.x.as_px(1920.0) - 0.0).abs() <= 1.0);
}

#[test]
fn simulation_announces_viable_devices_without_times() {
    let ctx = ctx(vec![tv()]);
    let set = video_and_chat();
    let mut hidden = Component::new("video", Some("video"));
    hidden.visible = false;
    let components: ComponentSet = [hidden].into_iter().collect();

    let sim = Engine::simulate(
        &ctx,
        &set,
        &components,
        &[ComponentId::from("video")],
        TS,
    )
    .unwrap();

    let tv_candidates = sim
        .devices
        .iter()
        .find(|d| d.device_id == DeviceId::from("tv"))
        .expect("tv is viable");
    assert!(tv_candidates
        .component_ids
        .contains(&ComponentId::from("video")));
    assert_eq!(sim.create.len(), 1);
    assert_eq!(sim.create[0].start_time, None);
    assert_eq!(sim.create[0].stop_time, None);
}

#[test]
fn anchored_rivals_cannot_share_a_corner() {
    let ctx = ctx(vec![tv()]);
    let set = constraints(
        r#"{ "constraintId": "a", "communal": {
                "priority": 10,
                "minSize": { "width": 400, "height": 400 },
                "prefSize": { "width": 600, "height": 600 },
                "anchor": ["top", "left"]
           } },
           { "constraintId": "b", "communal": {
                "priority": 5,
                "minSize": { "width": 400, "height": 400 },
                "prefSize": { "width": 600, "height": 600 },
                "anchor": ["top", "left"]
           } }"#,
    );
    let components: ComponentSet = [started("a", "a"), started("b", "b")]
        .into_iter()
        .collect();

    let ev = Engine::evaluate(&ctx, &set, &components, None, TS).unwrap();

    let at_origin = ev
        .layout
        .placements()
        .filter(|(_, p)| p.position.map(|pos| pos.x == 0.0 && pos.y == 0.0).unwrap_or(false))
        .count();
    assert!(at_origin <= 1, "both rivals claimed the origin");
}
