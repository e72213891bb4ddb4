//! Console command aliases
//!
//! The operator console drives calls and components with one-word aliases.
//! Each expands to the request a client would send.

use rayo_types::{ns, Element, IqType, Stanza};

/// Aliases the console understands, in display order
pub const ALIASES: [&str; 15] = [
    "answer",
    "hangup",
    "ping",
    "disco",
    "stop",
    "pause",
    "resume",
    "speed-up",
    "speed-down",
    "volume-up",
    "volume-down",
    "prompt",
    "record",
    "record-pause",
    "record-resume",
];

/// Request for `alias`, or `None` if the alias is unknown
pub fn request(alias: &str, id: impl Into<String>) -> Option<Stanza> {
    let (iq_type, payload) = match alias {
        "ping" => (IqType::Get, Element::ns("ping", ns::PING)),
        "disco" => (IqType::Get, Element::ns("query", ns::DISCO_INFO)),
        "answer" | "hangup" => (IqType::Set, Element::ns(alias, ns::RAYO)),
        "stop" => (IqType::Set, Element::ns("stop", ns::RAYO_EXT)),
        "pause" | "resume" | "speed-up" | "speed-down" | "volume-up" | "volume-down" => {
            (IqType::Set, Element::ns(alias, ns::OUTPUT))
        }
        "prompt" => (IqType::Set, demo_prompt()),
        "record" => (IqType::Set, Element::ns("record", ns::RECORD).with_attr("format", "wav")),
        "record-pause" => (IqType::Set, Element::ns("pause", ns::RECORD)),
        "record-resume" => (IqType::Set, Element::ns("resume", ns::RECORD)),
        _ => return None,
    };
    Some(Stanza::iq(iq_type, id).with_child(payload))
}

/// Play a short announcement and collect one digit
fn demo_prompt() -> Element {
    let output = Element::ns("output", ns::OUTPUT).with_child(
        Element::new("document")
            .with_attr("content-type", "text/plain")
            .with_text("Press one, two or three."),
    );
    let input = Element::ns("input", ns::INPUT)
        .with_attr("mode", "dtmf")
        .with_child(
            Element::new("grammar")
                .with_attr("content-type", "text/plain")
                .with_text("1,2,3"),
        );
    Element::ns("prompt", ns::PROMPT)
        .with_attr("barge-in", "true")
        .with_child(output)
        .with_child(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_alias_expands() {
        for alias in ALIASES {
            let stanza = request(alias, "c-1").unwrap();
            assert_eq!(stanza.id.as_deref(), Some("c-1"));
            assert!(stanza.payload().is_some(), "{alias}");
        }
        assert!(request("dance", "c-2").is_none());
    }

    #[test]
    fn test_prompt_alias_carries_children() {
        let prompt = request("prompt", "1").unwrap();
        let element = prompt.payload().unwrap();
        assert!(element.child_ns("output", ns::OUTPUT).is_some());
        assert!(element.child_ns("input", ns::INPUT).is_some());
        assert_eq!(request("ping", "2").unwrap().iq_type(), Some(IqType::Get));
        assert_eq!(request("disco", "3").unwrap().iq_type(), Some(IqType::Get));
        let pause = request("record-pause", "4").unwrap();
        assert_eq!(pause.payload().and_then(Element::namespace), Some(ns::RECORD));
    }
}
