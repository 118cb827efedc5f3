#![forbid(unsafe_code)]

//! End-to-end: subject and panel talking through a router, with the panel's
//! mirror reconciling the structure it receives.

use pretty_assertions::assert_eq;
use rdt_core::{EndpointId, NodeId, SubjectKey};
use rdt_harness::Session;
use rdt_protocol::{Detected, Envelope, Message, MessageKind, Versions};
use rdt_router::{Endpoint, ObserverKind, RouterConfig};
use rdt_structure::{NodeType, RawOwner, StructureUpdates};
use serde_json::json;
use web_time::Duration;

const TAB: u32 = 7;

fn kinds(envelopes: &[Envelope]) -> Vec<(&str, serde_json::Value)> {
    envelopes
        .iter()
        .map(|e| (e.kind.as_str(), e.data.clone()))
        .collect()
}

fn node_ids(session: &Session, observer: EndpointId) -> Vec<String> {
    session
        .mirror(observer)
        .expect("mirror")
        .nodes()
        .iter()
        .map(|n| n.id().to_string())
        .collect()
}

#[test]
fn subject_and_panel_round_trip() {
    let mut session = Session::new(RouterConfig::default().with_recheck_delay(Duration::from_millis(200)));
    let subject = Endpoint::subject(1, TAB);
    let panel = Endpoint::observer(2, ObserverKind::Panel, TAB);

    // (1) subject connects for tab 7
    session.connect(&subject).expect("subject connect");
    assert!(session.router().subject_attached(SubjectKey(TAB)));

    // (2) subject reports detection
    let detected = Detected {
        solid: true,
        ..Detected::default()
    };
    session
        .send(&subject, &Message::Detected(Some(detected)))
        .expect("detected");
    assert_eq!(session.detection(SubjectKey(TAB)), Some(true));

    // (3) panel connects: replay + observation notice
    session.connect(&panel).expect("panel connect");
    assert_eq!(
        session.mirror(panel.id).and_then(|m| m.detected()),
        Some(detected)
    );
    assert_eq!(
        kinds(&session.take_inbox(subject.id)),
        vec![("DevtoolsOpened", json!(true))]
    );

    // (4) structure with root R and child C
    let full = StructureUpdates::full([RawOwner::new("R", NodeType::Root)
        .with_children(vec![RawOwner::new("C", NodeType::Component).with_name("Counter")])]);
    session
        .send(&subject, &Message::StructureUpdates(full))
        .expect("structure");
    assert_eq!(node_ids(&session, panel.id), vec!["R", "C"]);
    let mirror = session.mirror(panel.id).expect("mirror");
    let c = mirror.structure().node(&NodeId::new("C")).expect("C");
    assert_eq!(c.level(), 1);
    let r_before = mirror.structure().node(&NodeId::new("R")).cloned().expect("R");

    // (5) partial update removing C
    session
        .send(
            &subject,
            &Message::StructureUpdates(StructureUpdates::removal([NodeId::new("C")])),
        )
        .expect("removal");
    assert_eq!(node_ids(&session, panel.id), vec!["R"]);
    let r_after = session
        .mirror(panel.id)
        .and_then(|m| m.structure().node(&NodeId::new("R")).cloned())
        .expect("R");
    assert!(std::rc::Rc::ptr_eq(&r_before, &r_after));

    // (6) panel leaves
    session.disconnect(&panel).expect("panel disconnect");
    assert_eq!(
        kinds(&session.take_inbox(subject.id)),
        vec![("DevtoolsOpened", json!(false))]
    );
}

#[test]
fn late_popup_sees_versions_and_subject_loss() {
    let mut session = Session::default();
    let subject = Endpoint::subject(1, TAB);
    let popup = Endpoint::observer(3, ObserverKind::Popup, TAB);
    session.connect(&subject).expect("subject connect");
    let versions = Versions {
        client: Some("0.3.0".into()),
        framework: Some("1.8.0".into()),
        ..Versions::default()
    };
    session
        .send(&subject, &Message::Versions(Some(versions.clone())))
        .expect("versions");

    session.connect(&popup).expect("popup connect");
    assert_eq!(
        session.mirror(popup.id).and_then(|m| m.versions()),
        Some(&versions)
    );

    session.disconnect(&subject).expect("subject disconnect");
    let mirror = session.mirror(popup.id).expect("mirror");
    assert_eq!(mirror.versions(), None);
    assert_eq!(mirror.detected(), None);
    assert_eq!(session.detection(SubjectKey(TAB)), Some(false));

    assert_eq!(session.advance(Duration::from_millis(499)), 0);
    assert_eq!(session.advance(Duration::from_millis(1)), 1);
    assert_eq!(session.detection(SubjectKey(TAB)), Some(false));
}

#[test]
fn reconnecting_subject_resets_the_panel_mirror() {
    let mut session = Session::default();
    let first = Endpoint::subject(1, TAB);
    let panel = Endpoint::observer(2, ObserverKind::Panel, TAB);
    session.connect(&first).expect("subject connect");
    session.connect(&panel).expect("panel connect");
    session
        .send(
            &first,
            &Message::StructureUpdates(StructureUpdates::full([RawOwner::new("R", NodeType::Root)])),
        )
        .expect("structure");
    assert_eq!(node_ids(&session, panel.id), vec!["R"]);

    session.disconnect(&first).expect("subject disconnect");
    let second = Endpoint::subject(5, TAB);
    session.connect(&second).expect("subject reconnect");

    assert!(node_ids(&session, panel.id).is_empty());
    assert_eq!(
        kinds(&session.take_inbox(second.id)),
        vec![
            ("DevtoolsOpened", json!(true)),
            (MessageKind::ResetState.as_str(), serde_json::Value::Null),
        ]
    );
}

#[test]
fn panel_requests_reach_the_subject() {
    let mut session = Session::default();
    let subject = Endpoint::subject(1, TAB);
    let panel = Endpoint::observer(2, ObserverKind::Panel, TAB);
    session.connect(&subject).expect("subject connect");
    session.connect(&panel).expect("panel connect");
    session.take_inbox(subject.id);

    let delivered = session
        .send(&panel, &Message::InspectNode(Some(NodeId::new("C"))))
        .expect("inspect");
    assert_eq!(delivered, 1);
    assert_eq!(
        kinds(&session.take_inbox(subject.id)),
        vec![("InspectNode", json!("C"))]
    );
}
