//! End-to-end call control through the gateway callbacks, with the bus
//! pumped on the test thread.

use rayo_actors::ActorType;
use rayo_config::GatewayConfig;
use rayo_gateway::test_utils::{LiteralGrammar, RecordingEngine, RecordingTransport};
use rayo_gateway::{
    EndReason, EngineError, EngineEvent, EngineOperation, Gateway, GatewayError, MediaDirection,
    OutputCompletion, OutputControl, RecordCompletion, RecordControl, StreamInfo,
};
use rayo_types::{ns, Element, IqType, PresenceType, Stanza, StanzaError};
use std::sync::Arc;
use std::time::Duration;

const ALICE: &str = "alice@localhost/phone";
const BOB: &str = "bob@localhost/desk";

struct Harness {
    gateway: Gateway,
    engine: Arc<RecordingEngine>,
    transport: Arc<RecordingTransport>,
    next_stream: u64,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    fn with_config(config: GatewayConfig) -> Self {
        let engine = Arc::new(RecordingEngine::new());
        let transport = Arc::new(RecordingTransport::new());
        let gateway = Gateway::builder(config)
            .engine(engine.clone())
            .grammar(Arc::new(LiteralGrammar))
            .transport(transport.clone())
            .build()
            .unwrap();
        Self {
            gateway,
            engine,
            transport,
            next_stream: 1,
        }
    }

    /// Attach a client stream and announce it online
    fn connect(&mut self, jid: &str) -> StreamInfo {
        let stream = StreamInfo::client(self.next_stream, jid);
        self.next_stream += 1;
        self.gateway.on_ready(&stream).unwrap();
        self.send(&stream, Stanza::presence(PresenceType::Available));
        stream
    }

    fn send(&self, stream: &StreamInfo, stanza: Stanza) {
        self.gateway.on_received(stream, stanza).unwrap();
        self.gateway.deliver_pending();
    }

    fn event(&self, event: EngineEvent) {
        self.gateway.on_engine_event(event).unwrap();
        self.gateway.deliver_pending();
    }

    /// Offer `uuid` to whoever is online and let `controller` answer it
    fn answered_call(&self, uuid: &str, controller: &StreamInfo) -> String {
        let address = self.gateway.offer_call(uuid, "sip:caller@example.com", "sip:rayo@localhost", &[]).unwrap();
        self.gateway.deliver_pending();
        self.send(controller, command("answer-1", &address, Element::ns("answer", ns::RAYO)));
        self.transport.take();
        self.engine.take_operations();
        address
    }

    fn sent_to(&self, jid: &str) -> Vec<Stanza> {
        self.transport.sent_to(jid)
    }

    /// Component address from the most recent operation that started one
    fn started_component(&self, operation: &str) -> String {
        self.engine
            .operations()
            .into_iter()
            .rev()
            .find_map(|op| match op {
                EngineOperation::StartOutput { component, .. } if operation == "output" => Some(component),
                EngineOperation::StartInput { component, .. } if operation == "input" => Some(component),
                _ => None,
            })
            .unwrap()
    }
}

fn command(id: &str, to: &str, payload: Element) -> Stanza {
    Stanza::iq(IqType::Set, id).with_to(to).with_child(payload)
}

fn reply_to<'a>(stanzas: &'a [Stanza], id: &str) -> &'a Stanza {
    stanzas
        .iter()
        .find(|s| s.is_iq() && s.id.as_deref() == Some(id))
        .unwrap_or_else(|| panic!("no reply to {id} in {stanzas:?}"))
}

fn with_child<'a>(stanzas: &'a [Stanza], name: &str) -> Vec<&'a Stanza> {
    stanzas
        .iter()
        .filter(|s| s.children.iter().any(|c| c.name == name))
        .collect()
}

fn ref_uri(reply: &Stanza) -> String {
    reply.payload().and_then(|r| r.attr("uri")).unwrap().to_string()
}

fn prompt_element(barge_in: bool) -> Element {
    Element::ns("prompt", ns::PROMPT)
        .with_attr("barge-in", barge_in.to_string())
        .with_child(Element::ns("output", ns::OUTPUT).with_child(Element::new("document").with_text("Pick one")))
        .with_child(
            Element::ns("input", ns::INPUT)
                .with_attr("mode", "dtmf")
                .with_child(Element::new("grammar").with_text("1,2,3")),
        )
}

#[test]
fn test_ping_and_unknown_command() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);

    h.send(&alice, Stanza::iq(IqType::Get, "p1").with_child(Element::ns("ping", ns::PING)));
    h.send(&alice, command("r1", "localhost", Element::ns("sendfax", ns::RAYO_EXT)));

    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "p1").iq_type(), Some(IqType::Result));
    assert_eq!(reply_to(&sent, "r1").error_condition(), Some(StanzaError::FeatureNotImplemented));
}

#[test]
fn test_disco_lists_supported_namespaces() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);

    h.send(&alice, Stanza::iq(IqType::Get, "q1").with_child(Element::ns("query", ns::DISCO_INFO)));
    let sent = h.sent_to(ALICE);
    let reply = reply_to(&sent, "q1");
    assert_eq!(reply.iq_type(), Some(IqType::Result));
    let query = reply.payload().unwrap();
    assert_eq!(query.namespace(), Some(ns::DISCO_INFO));
    let features: Vec<_> = query.children.iter().filter_map(|f| f.attr("var")).collect();
    for supported in [ns::RAYO, ns::OUTPUT, ns::INPUT, ns::PROMPT, ns::RECORD] {
        assert!(features.contains(&supported), "{supported} missing from {features:?}");
    }
}

#[test]
fn test_unknown_stream_is_an_error() {
    let h = Harness::new();
    let ghost = StreamInfo::client(99, "ghost@localhost/x");
    let result = h.gateway.on_received(&ghost, Stanza::presence(PresenceType::Available));
    assert!(matches!(result, Err(GatewayError::UnknownStream { id: 99 })));
}

#[test]
fn test_dial_creates_call_controlled_by_requester() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);

    let dial = Element::ns("dial", ns::RAYO)
        .with_attr("to", "sip:bob@example.com")
        .with_attr("from", "sip:alice@example.com")
        .with_child(Element::new("header").with_attr("name", "X-Account").with_attr("value", "7"));
    h.send(&alice, command("d1", "localhost", dial));

    let sent = h.sent_to(ALICE);
    let uri = ref_uri(reply_to(&sent, "d1"));
    assert!(uri.starts_with("xmpp:") && uri.ends_with("@localhost"), "{uri}");

    let ops = h.engine.operations();
    let EngineOperation::Originate { uuid, caller_id, headers, .. } = &ops[0] else {
        panic!("expected originate, got {ops:?}");
    };
    assert_eq!(uri, format!("xmpp:{}@localhost", uuid));
    assert_eq!(caller_id.as_deref(), Some("sip:alice@example.com"));
    assert_eq!(headers, &vec![("X-Account".to_string(), "7".to_string())]);

    h.transport.take();
    h.event(EngineEvent::Ringing { uuid: uuid.clone() });
    h.event(EngineEvent::Answered { uuid: uuid.clone() });
    let sent = h.sent_to(ALICE);
    assert_eq!(with_child(&sent, "ringing").len(), 1);
    assert_eq!(with_child(&sent, "answered").len(), 1);
}

#[test]
fn test_dial_refused_by_engine() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    h.engine.fail("originate", EngineError::Unavailable("no trunks".into()));

    h.send(&alice, command("d1", "localhost", Element::ns("dial", ns::RAYO).with_attr("to", "tel:+15550100")));
    h.send(&alice, command("d2", "localhost", Element::ns("dial", ns::RAYO)));

    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "d1").error_condition(), Some(StanzaError::ServiceUnavailable));
    assert_eq!(reply_to(&sent, "d2").error_condition(), Some(StanzaError::BadRequest));
    assert!(h.gateway.registry().addresses_of(ActorType::CALL).is_empty());
}

#[test]
fn test_offer_without_clients_is_busy() {
    let h = Harness::new();
    let result = h.gateway.offer_call("c1", "sip:a@example.com", "sip:rayo@localhost", &[]);
    assert!(matches!(result, Err(GatewayError::NoClientsAvailable { .. })));
    assert_eq!(
        h.engine.operations(),
        vec![EngineOperation::Hangup {
            uuid: "c1".into(),
            reason: "busy".into(),
            headers: Vec::new()
        }]
    );
}

#[test]
fn test_first_client_to_command_an_offer_wins() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let bob = h.connect(BOB);

    let headers = vec![("X-Campaign".to_string(), "spring".to_string())];
    let call = h.gateway.offer_call("c1", "sip:a@example.com", "sip:rayo@localhost", &headers).unwrap();
    h.gateway.deliver_pending();
    assert_eq!(call, "c1@localhost");
    for jid in [ALICE, BOB] {
        let offers = h.sent_to(jid);
        let offer = with_child(&offers, "offer")[0].payload().unwrap();
        assert_eq!(offer.attr("from"), Some("sip:a@example.com"));
        assert_eq!(offer.child("header").and_then(|h| h.attr("value")), Some("spring"));
    }

    h.send(&bob, command("b1", &call, Element::ns("answer", ns::RAYO)));
    h.send(&alice, command("a1", &call, Element::ns("answer", ns::RAYO)));
    assert_eq!(reply_to(&h.sent_to(BOB), "b1").iq_type(), Some(IqType::Result));
    assert_eq!(reply_to(&h.sent_to(ALICE), "a1").error_condition(), Some(StanzaError::Conflict));
    assert_eq!(h.engine.names(), vec!["answer"]);

    h.transport.take();
    h.event(EngineEvent::CallEnded {
        uuid: "c1".into(),
        reason: EndReason::Hangup,
    });
    let bob_sent = h.sent_to(BOB);
    let end = with_child(&bob_sent, "end");
    assert_eq!(end.len(), 1);
    assert_eq!(end[0].presence_type(), Some(PresenceType::Unavailable));
    assert_eq!(end[0].payload().unwrap().children[0].name, "hangup");
    assert!(h.sent_to(ALICE).is_empty());
    assert!(h.gateway.registry().lookup_by_id("c1").is_none());
}

#[test]
fn test_hangup_command_reason_wins() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    h.send(&alice, command("h1", &call, Element::ns("hangup", ns::RAYO)));
    assert_eq!(reply_to(&h.sent_to(ALICE), "h1").iq_type(), Some(IqType::Result));
    assert_eq!(h.engine.names(), vec!["hangup"]);

    h.event(EngineEvent::CallEnded {
        uuid: "c1".into(),
        reason: EndReason::Hangup,
    });
    let sent = h.sent_to(ALICE);
    let end = with_child(&sent, "end");
    assert_eq!(end[0].payload().unwrap().children[0].name, "hangup-command");

    // the call is gone
    h.send(&alice, command("h2", &call, Element::ns("hangup", ns::RAYO)));
    assert!(h.gateway.registry().lookup_by_address(&call).is_none());
}

#[test]
fn test_reject_defaults_to_decline() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.gateway.offer_call("c1", "sip:a@example.com", "sip:rayo@localhost", &[]).unwrap();
    h.gateway.deliver_pending();

    h.send(&alice, command("r1", &call, Element::ns("reject", ns::RAYO)));
    let EngineOperation::Hangup { reason, .. } = &h.engine.operations()[0] else {
        panic!("expected hangup");
    };
    assert_eq!(reason, "decline");
}

#[test]
fn test_join_mixer_and_broadcast() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    let join = Element::ns("join", ns::RAYO).with_attr("mixer-name", "conf");
    h.send(&alice, command("j1", &call, join.clone()));
    // answered when the engine reports the join
    assert!(h.sent_to(ALICE).is_empty());
    assert_eq!(
        h.engine.operations(),
        vec![EngineOperation::JoinMixer {
            uuid: "c1".into(),
            mixer: "conf".into(),
            direction: MediaDirection::Duplex,
            profile: "sla".into(),
        }]
    );

    h.send(&alice, command("j2", &call, join));
    assert_eq!(reply_to(&h.sent_to(ALICE), "j2").error_condition(), Some(StanzaError::Conflict));

    h.event(EngineEvent::MixerMemberAdded {
        mixer: "conf".into(),
        uuid: "c1".into(),
    });
    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "j1").iq_type(), Some(IqType::Result));
    let joined = with_child(&sent, "joined");
    assert_eq!(joined.len(), 2);
    let from_call = joined.iter().find(|s| s.from.as_deref() == Some("c1@localhost")).unwrap();
    assert_eq!(from_call.payload().unwrap().attr("mixer-name"), Some("conf"));
    let from_mixer = joined.iter().find(|s| s.from.as_deref() == Some("conf@localhost")).unwrap();
    assert_eq!(from_mixer.payload().unwrap().attr("call-uri"), Some("xmpp:c1@localhost"));
    assert!(h.gateway.registry().lookup_by_id("conf").is_some());

    h.transport.take();
    h.send(&alice, command("u1", &call, Element::ns("unjoin", ns::RAYO).with_attr("mixer-name", "conf")));
    h.event(EngineEvent::MixerMemberRemoved {
        mixer: "conf".into(),
        uuid: "c1".into(),
    });
    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "u1").iq_type(), Some(IqType::Result));
    assert_eq!(with_child(&sent, "unjoined").len(), 2);

    h.event(EngineEvent::MixerDestroyed { mixer: "conf".into() });
    assert!(h.gateway.registry().lookup_by_id("conf").is_none());
}

#[test]
fn test_join_two_calls() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let first = h.answered_call("c1", &alice);
    let second = h.answered_call("c2", &alice);

    let to_self = Element::ns("join", ns::RAYO).with_attr("call-uri", format!("xmpp:{}", first));
    let to_nobody = Element::ns("join", ns::RAYO).with_attr("call-uri", "xmpp:c9@localhost");
    let both = Element::ns("join", ns::RAYO)
        .with_attr("call-uri", format!("xmpp:{}", second))
        .with_attr("mixer-name", "conf");
    h.send(&alice, command("bad1", &first, to_self));
    h.send(&alice, command("bad2", &first, to_nobody));
    h.send(&alice, command("bad3", &first, both));
    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "bad1").error_condition(), Some(StanzaError::BadRequest));
    assert_eq!(reply_to(&sent, "bad2").error_condition(), Some(StanzaError::ItemNotFound));
    assert_eq!(reply_to(&sent, "bad3").error_condition(), Some(StanzaError::BadRequest));
    assert!(h.engine.operations().is_empty());

    h.transport.take();
    let join = Element::ns("join", ns::RAYO).with_attr("call-uri", format!("xmpp:{}", second));
    h.send(&alice, command("j1", &first, join));
    assert_eq!(
        h.engine.operations(),
        vec![EngineOperation::Bridge {
            uuid: "c1".into(),
            peer: "c2".into()
        }]
    );
    h.event(EngineEvent::Bridged {
        uuid: "c1".into(),
        peer: "c2".into(),
    });
    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "j1").iq_type(), Some(IqType::Result));
    let uris: Vec<_> = with_child(&sent, "joined")
        .iter()
        .filter_map(|s| s.payload().and_then(|j| j.attr("call-uri")).map(str::to_string))
        .collect();
    assert_eq!(uris.len(), 2);
    assert!(uris.contains(&"xmpp:c2@localhost".to_string()));
    assert!(uris.contains(&"xmpp:c1@localhost".to_string()));
}

#[test]
fn test_join_failure_is_reported() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    h.send(&alice, command("j1", &call, Element::ns("join", ns::RAYO).with_attr("mixer-name", "conf")));
    h.event(EngineEvent::JoinFailed {
        uuid: "c1".into(),
        reason: "no such profile".into(),
    });
    assert_eq!(reply_to(&h.sent_to(ALICE), "j1").error_condition(), Some(StanzaError::ServiceUnavailable));

    // nothing pending any more
    h.send(&alice, command("j2", &call, Element::ns("join", ns::RAYO).with_attr("mixer-name", "conf")));
    assert_eq!(h.engine.names(), vec!["join-mixer", "join-mixer"]);
}

#[test]
fn test_pending_join_fails_when_call_ends() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    h.send(&alice, command("j1", &call, Element::ns("join", ns::RAYO).with_attr("mixer-name", "conf")));
    assert!(h.sent_to(ALICE).is_empty());
    h.event(EngineEvent::CallEnded {
        uuid: "c1".into(),
        reason: EndReason::Hangup,
    });

    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "j1").error_condition(), Some(StanzaError::ItemNotFound));
    assert_eq!(with_child(&sent, "end").len(), 1);
    assert!(h.gateway.registry().addresses_of(ActorType::CALL).is_empty());
}

#[test]
fn test_output_controls_and_completion() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    let output = Element::ns("output", ns::OUTPUT).with_child(Element::new("document").with_text("hello"));
    h.send(&alice, command("o1", &call, output));
    let component = h.started_component("output");
    assert_eq!(ref_uri(reply_to(&h.sent_to(ALICE), "o1")), format!("xmpp:{}", component));
    assert!(component.starts_with("c1@localhost/output-"));

    h.send(&alice, command("o2", &component, Element::ns("pause", ns::OUTPUT)));
    h.send(&alice, command("o3", &component, Element::ns("seek", ns::OUTPUT)));
    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "o2").iq_type(), Some(IqType::Result));
    assert_eq!(reply_to(&sent, "o3").error_condition(), Some(StanzaError::BadRequest));
    assert!(h.engine.operations().contains(&EngineOperation::OutputControl {
        component: component.clone(),
        control: OutputControl::Pause,
    }));

    h.transport.take();
    h.event(EngineEvent::OutputComplete {
        component: component.clone(),
        reason: OutputCompletion::Finish,
    });
    let sent = h.sent_to(ALICE);
    let complete = with_child(&sent, "complete");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].presence_type(), Some(PresenceType::Unavailable));
    let reason = &complete[0].payload().unwrap().children[0];
    assert_eq!((reason.name.as_str(), reason.namespace()), ("finish", Some(ns::OUTPUT_COMPLETE)));
    assert!(h.gateway.registry().lookup_by_address(&component).is_none());
}

#[test]
fn test_component_refuses_other_clients() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let bob = h.connect(BOB);
    let call = h.answered_call("c1", &alice);

    let output = Element::ns("output", ns::OUTPUT).with_child(Element::new("document").with_text("hi"));
    h.send(&alice, command("o1", &call, output));
    let component = h.started_component("output");

    h.send(&bob, command("b1", &component, Element::ns("stop", ns::RAYO_EXT)));
    assert_eq!(reply_to(&h.sent_to(BOB), "b1").error_condition(), Some(StanzaError::Conflict));
}

#[test]
fn test_call_end_completes_components() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    let output = Element::ns("output", ns::OUTPUT).with_child(Element::new("document").with_text("hold music"));
    h.send(&alice, command("o1", &call, output));
    let component = h.started_component("output");
    h.transport.take();
    let not_found = h.gateway.stats().bus.destination_not_found;

    h.event(EngineEvent::CallEnded {
        uuid: "c1".into(),
        reason: EndReason::Hangup,
    });
    // the output does not report back to the call it is torn down with
    assert_eq!(h.gateway.stats().bus.destination_not_found, not_found);
    let sent = h.sent_to(ALICE);
    let complete = with_child(&sent, "complete");
    assert_eq!(complete[0].payload().unwrap().children[0].name, "hangup");
    assert_eq!(with_child(&sent, "end").len(), 1);
    assert!(h.engine.operations().contains(&EngineOperation::StopComponent { component }));
    assert!(h.gateway.registry().addresses_of(ActorType::CALL).is_empty());
}

#[test]
fn test_completed_components_are_not_hung_up() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    for id in ["o1", "o2", "o3"] {
        let output = Element::ns("output", ns::OUTPUT).with_child(Element::new("document").with_text(id));
        h.send(&alice, command(id, &call, output));
        let component = h.started_component("output");
        h.event(EngineEvent::OutputComplete {
            component,
            reason: OutputCompletion::Finish,
        });
    }
    assert_eq!(with_child(&h.sent_to(ALICE), "complete").len(), 3);
    h.transport.take();
    h.engine.take_operations();
    let not_found = h.gateway.stats().bus.destination_not_found;

    h.event(EngineEvent::CallEnded {
        uuid: "c1".into(),
        reason: EndReason::Hangup,
    });
    assert_eq!(h.gateway.stats().bus.destination_not_found, not_found);
    assert!(h.engine.operations().is_empty());
    assert_eq!(with_child(&h.sent_to(ALICE), "end").len(), 1);
    assert!(h.gateway.registry().addresses_of(ActorType::CALL).is_empty());
}

#[test]
fn test_record_pause_and_completion() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    let record = Element::ns("record", ns::RECORD).with_attr("max-duration", "60000");
    h.send(&alice, command("r1", &call, record));
    let ops = h.engine.take_operations();
    let [EngineOperation::StartRecording {
        component,
        uuid,
        format,
        max_duration_ms,
        start_beep,
    }] = ops.as_slice()
    else {
        panic!("expected start-recording, got {ops:?}");
    };
    assert!(component.starts_with("c1@localhost/record-"), "{component}");
    assert_eq!(
        (uuid.as_str(), format.as_str(), *max_duration_ms, *start_beep),
        ("c1", "wav", Some(60_000), false)
    );
    assert_eq!(ref_uri(reply_to(&h.sent_to(ALICE), "r1")), format!("xmpp:{}", component));

    h.send(&alice, command("r2", component, Element::ns("pause", ns::RECORD)));
    h.send(&alice, command("r3", component, Element::ns("pause", ns::RECORD)));
    let sent = h.sent_to(ALICE);
    assert_eq!(reply_to(&sent, "r2").iq_type(), Some(IqType::Result));
    assert_eq!(reply_to(&sent, "r3").iq_type(), Some(IqType::Result));
    // already paused; the engine is asked once
    assert_eq!(
        h.engine.take_operations(),
        vec![EngineOperation::RecordControl {
            component: component.clone(),
            control: RecordControl::Pause,
        }]
    );

    h.transport.take();
    h.event(EngineEvent::RecordComplete {
        component: component.clone(),
        reason: RecordCompletion::MaxDuration,
        uri: "file:///recordings/c1.wav".into(),
        duration_ms: 60_000,
    });
    let sent = h.sent_to(ALICE);
    let complete = with_child(&sent, "complete");
    assert_eq!(complete.len(), 1);
    let children = &complete[0].payload().unwrap().children;
    assert_eq!(
        (children[0].name.as_str(), children[0].namespace()),
        ("max-duration", Some(ns::RECORD_COMPLETE))
    );
    assert_eq!(children[1].name, "recording");
    assert_eq!(children[1].attr("uri"), Some("file:///recordings/c1.wav"));
    assert_eq!(children[1].attr("duration"), Some("60000"));
    assert!(h.gateway.registry().lookup_by_address(component).is_none());

    h.send(&alice, command("r4", component, Element::ns("resume", ns::RECORD)));
    assert_eq!(reply_to(&h.sent_to(ALICE), "r4").error_condition(), Some(StanzaError::ItemNotFound));
}

#[test]
fn test_record_stop_and_refusals() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    let bad = Element::ns("record", ns::RECORD).with_attr("max-duration", "0");
    h.send(&alice, command("r0", &call, bad));
    assert_eq!(reply_to(&h.sent_to(ALICE), "r0").error_condition(), Some(StanzaError::BadRequest));
    assert!(h.engine.operations().is_empty());

    h.engine.fail("start-recording", EngineError::Unavailable("disk full".into()));
    h.send(&alice, command("r1", &call, Element::ns("record", ns::RECORD)));
    assert_eq!(reply_to(&h.sent_to(ALICE), "r1").error_condition(), Some(StanzaError::ServiceUnavailable));
    h.engine.succeed("start-recording");

    h.send(&alice, command("r2", &call, Element::ns("record", ns::RECORD).with_attr("format", "mp3")));
    let ops = h.engine.take_operations();
    let [EngineOperation::StartRecording { component, format, .. }] = ops.as_slice() else {
        panic!("expected start-recording, got {ops:?}");
    };
    assert_eq!(format.as_str(), "mp3");
    let component = component.clone();

    h.transport.take();
    h.send(&alice, command("s1", &component, Element::ns("stop", ns::RAYO_EXT)));
    assert_eq!(reply_to(&h.sent_to(ALICE), "s1").iq_type(), Some(IqType::Result));
    assert_eq!(
        h.engine.operations(),
        vec![EngineOperation::StopComponent {
            component: component.clone()
        }]
    );

    h.event(EngineEvent::RecordComplete {
        component: component.clone(),
        reason: RecordCompletion::Stop,
        uri: String::new(),
        duration_ms: 0,
    });
    let sent = h.sent_to(ALICE);
    let complete = with_child(&sent, "complete");
    let children = &complete[0].payload().unwrap().children;
    assert_eq!(children.len(), 1);
    assert_eq!((children[0].name.as_str(), children[0].namespace()), ("stop", Some(ns::RAYO_COMPLETE)));

    // the finished recording no longer needs a hangup
    let not_found = h.gateway.stats().bus.destination_not_found;
    h.event(EngineEvent::CallEnded {
        uuid: "c1".into(),
        reason: EndReason::Hangup,
    });
    assert_eq!(h.gateway.stats().bus.destination_not_found, not_found);
}

#[test]
fn test_input_match() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    let input = Element::ns("input", ns::INPUT).with_child(Element::new("grammar").with_text("12,3"));
    h.send(&alice, command("i1", &call, input));
    let component = h.started_component("input");
    assert_eq!(ref_uri(reply_to(&h.sent_to(ALICE), "i1")), format!("xmpp:{}", component));

    for digit in ['1', '2'] {
        h.event(EngineEvent::InputDigit {
            component: component.clone(),
            digit,
        });
    }
    let sent = h.sent_to(ALICE);
    let complete = with_child(&sent, "complete");
    let matched = &complete[0].payload().unwrap().children[0];
    assert_eq!((matched.name.as_str(), matched.namespace()), ("match", Some(ns::INPUT_COMPLETE)));
    assert_eq!(matched.child("input").and_then(Element::text), Some("12"));

    let bad = Element::ns("input", ns::INPUT).with_child(Element::new("grammar").with_text("yes,no"));
    h.send(&alice, command("i2", &call, bad));
    assert_eq!(reply_to(&h.sent_to(ALICE), "i2").error_condition(), Some(StanzaError::BadRequest));
}

#[test]
fn test_prompt_without_barge_in() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    h.send(&alice, command("p1", &call, prompt_element(false)));
    let output = h.started_component("output");
    let sent = h.sent_to(ALICE);
    let prompt = ref_uri(reply_to(&sent, "p1"));
    assert!(prompt.starts_with("xmpp:c1@localhost/prompt-"), "{prompt}");
    assert_eq!(h.engine.names(), vec!["start-output"]);

    h.event(EngineEvent::OutputComplete {
        component: output,
        reason: OutputCompletion::Finish,
    });
    let EngineOperation::StartInput { start_timers, .. } = h.engine.operations()[1].clone() else {
        panic!("expected start-input");
    };
    assert!(start_timers);

    let input = h.started_component("input");
    h.event(EngineEvent::InputDigit { component: input, digit: '2' });

    let sent = h.sent_to(ALICE);
    // the output's own completion went to the prompt, not the client
    let complete = with_child(&sent, "complete");
    assert_eq!(complete.len(), 1);
    let reason = &complete[0].payload().unwrap().children[0];
    assert_eq!((reason.name.as_str(), reason.namespace()), ("match", Some(ns::INPUT_COMPLETE)));
    assert!(h.gateway.registry().lookup_by_address(prompt.trim_start_matches("xmpp:")).is_none());
}

#[test]
fn test_prompt_barge_in_stops_output() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    h.send(&alice, command("p1", &call, prompt_element(true)));
    let output = h.started_component("output");
    let input = h.started_component("input");
    assert_eq!(h.engine.names(), vec!["start-output", "start-input"]);
    let EngineOperation::StartInput { start_timers, .. } = h.engine.operations()[1].clone() else {
        panic!("expected start-input");
    };
    assert!(!start_timers);
    assert_eq!(reply_to(&h.sent_to(ALICE), "p1").iq_type(), Some(IqType::Result));

    h.event(EngineEvent::InputDigit { component: input, digit: '3' });
    assert!(h.engine.operations().contains(&EngineOperation::OutputControl {
        component: output,
        control: OutputControl::Stop,
    }));
    let sent = h.sent_to(ALICE);
    let complete = with_child(&sent, "complete");
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].payload().unwrap().children[0].name, "match");
}

#[test]
fn test_prompt_stop_while_playing() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);

    h.send(&alice, command("p1", &call, prompt_element(false)));
    let output = h.started_component("output");
    let prompt = ref_uri(reply_to(&h.sent_to(ALICE), "p1")).trim_start_matches("xmpp:").to_string();

    h.send(&alice, command("s1", &prompt, Element::ns("stop", ns::RAYO_EXT)));
    assert_eq!(reply_to(&h.sent_to(ALICE), "s1").iq_type(), Some(IqType::Result));
    assert!(h.engine.operations().contains(&EngineOperation::OutputControl {
        component: output.clone(),
        control: OutputControl::Stop,
    }));

    h.event(EngineEvent::OutputComplete {
        component: output,
        reason: OutputCompletion::Stop,
    });
    let sent = h.sent_to(ALICE);
    let complete = with_child(&sent, "complete");
    assert_eq!(complete.len(), 1);
    let reason = &complete[0].payload().unwrap().children[0];
    assert_eq!((reason.name.as_str(), reason.namespace()), ("stop", Some(ns::RAYO_COMPLETE)));
    assert!(!h.engine.names().contains(&"start-input"));
}

#[test]
fn test_idle_calls_are_hung_up() {
    let mut config = GatewayConfig::default();
    config.settings.max_idle_sec = 0;
    let mut h = Harness::with_config(config);
    let alice = h.connect(ALICE);
    let idle = h.answered_call("c1", &alice);
    let joined = h.answered_call("c2", &alice);

    h.send(&alice, command("j1", &joined, Element::ns("join", ns::RAYO).with_attr("mixer-name", "conf")));
    h.event(EngineEvent::MixerMemberAdded {
        mixer: "conf".into(),
        uuid: "c2".into(),
    });
    h.engine.take_operations();
    std::thread::sleep(Duration::from_millis(10));

    assert_eq!(h.gateway.sweep_idle(), 2);
    h.gateway.deliver_pending();
    assert_eq!(
        h.engine.operations(),
        vec![EngineOperation::Hangup {
            uuid: "c1".into(),
            reason: "timeout".into(),
            headers: Vec::new()
        }]
    );

    h.transport.take();
    h.event(EngineEvent::CallEnded {
        uuid: "c1".into(),
        reason: EndReason::Hangup,
    });
    let sent = h.sent_to(ALICE);
    let end = with_child(&sent, "end");
    assert_eq!(end[0].from.as_deref(), Some(idle.as_str()));
    assert_eq!(end[0].payload().unwrap().children[0].name, "timeout");
}

#[test]
fn test_console_commands_and_status() {
    let mut h = Harness::new();
    let alice = h.connect(ALICE);
    let call = h.answered_call("c1", &alice);
    let other = h.answered_call("c2", &alice);

    let id = h.gateway.console_command(&call, "hangup").unwrap();
    h.gateway.deliver_pending();
    assert!(id.starts_with("console-"));
    assert_eq!(h.engine.names(), vec!["hangup"]);
    let console = h.gateway.console_address().to_string();
    assert_eq!(reply_to(&h.sent_to(&console), &id).iq_type(), Some(IqType::Result));
    let id = h.gateway.console_command(&other, "record").unwrap();
    h.gateway.deliver_pending();
    assert_eq!(h.engine.names(), vec!["hangup", "start-recording"]);
    assert_eq!(reply_to(&h.sent_to(&console), &id).iq_type(), Some(IqType::Result));

    assert!(matches!(
        h.gateway.console_command(&call, "dance"),
        Err(GatewayError::UnknownAlias { .. })
    ));

    let status = h.gateway.status();
    assert!(status
        .iter()
        .any(|line| line == "TYPE='SERVER',SUBTYPE='',ID='localhost',JID='localhost',DOMAIN='localhost',REFS=1"));
    assert!(status.iter().any(|line| line.starts_with("TYPE='CALL',SUBTYPE='',ID='c1'")));
    assert!(status.iter().any(|line| line.contains("SUBTYPE='console'")));

    let stats = h.gateway.stats();
    assert_eq!(stats.streams, 1);
    assert_eq!(stats.online_clients, 1);
}

#[test]
fn test_peer_server_clients() {
    let h = Harness::new();
    let peer = StreamInfo::inbound_server(7, "peer.example.com");
    h.gateway.on_ready(&peer).unwrap();

    let carol = "carol@peer.example.com/1";
    let ping = Stanza::iq(IqType::Get, "p1")
        .with_from(carol)
        .with_child(Element::ns("ping", ns::PING));
    h.send(&peer, ping);
    assert_eq!(reply_to(&h.sent_to(carol), "p1").iq_type(), Some(IqType::Result));
    // bookkeeping stays inside the gateway
    assert!(h.sent_to("peer.example.com").is_empty());

    h.gateway.on_destroyed(&peer).unwrap();
    h.gateway.deliver_pending();
    assert!(h.gateway.registry().lookup_by_address(carol).is_none());
    assert!(h.gateway.registry().lookup_by_address("peer.example.com").is_none());
}

#[test]
fn test_shutdown_is_idempotent() {
    let mut h = Harness::new();
    h.connect(ALICE);
    h.gateway.shutdown();
    h.gateway.shutdown();
    assert_eq!(h.gateway.registry().active_count(), 0);
}
