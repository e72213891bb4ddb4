//! Document model
//!
//! A [`Stanza`] is the unit the bus carries: an `iq` request/response, a
//! `presence` notification or a `message`, with a list of child [`Element`]s.
//! Handlers dispatch on the first child's name and namespace.

use crate::error::StanzaError;
use crate::ns;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Generic XML-like element
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Element with an explicit namespace
    pub fn ns(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Attribute value, treating an empty string as absent
    pub fn non_empty_attr(&self, key: &str) -> Option<&str> {
        self.attr(key).filter(|v| !v.is_empty())
    }

    /// Boolean attribute; anything other than `true`/`false` yields `default`
    pub fn bool_attr(&self, key: &str, default: bool) -> bool {
        match self.attr(key) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_ns(&self, name: &str, namespace: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.name == name && c.namespace() == Some(namespace))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        if let Some(namespace) = &self.namespace {
            write!(f, " xmlns='{}'", escape(namespace))?;
        }
        for (key, value) in &self.attrs {
            write!(f, " {}='{}'", key, escape(value))?;
        }
        if self.children.is_empty() && self.text.is_none() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        if let Some(text) = &self.text {
            f.write_str(&escape(text))?;
        }
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.name)
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

/// Type attribute of an `iq` stanza
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

impl IqType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IqType::Get => "get",
            IqType::Set => "set",
            IqType::Result => "result",
            IqType::Error => "error",
        }
    }

    /// Responses never get a response of their own
    pub fn is_response(&self) -> bool {
        matches!(self, IqType::Result | IqType::Error)
    }
}

impl FromStr for IqType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(IqType::Get),
            "set" => Ok(IqType::Set),
            "result" => Ok(IqType::Result),
            "error" => Ok(IqType::Error),
            other => Err(format!("unknown iq type '{}'", other)),
        }
    }
}

/// Type attribute of a `presence` stanza; a missing attribute means available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceType {
    Available,
    Unavailable,
    Error,
}

impl PresenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceType::Available => "",
            PresenceType::Unavailable => "unavailable",
            PresenceType::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StanzaKind {
    Iq(IqType),
    Presence(PresenceType),
    Message,
}

impl StanzaKind {
    pub fn name(&self) -> &'static str {
        match self {
            StanzaKind::Iq(_) => "iq",
            StanzaKind::Presence(_) => "presence",
            StanzaKind::Message => "message",
        }
    }
}

/// Top-level document routed between actors and clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stanza {
    pub kind: StanzaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Stanza {
    pub fn new(kind: StanzaKind) -> Self {
        Self {
            kind,
            id: None,
            from: None,
            to: None,
            children: Vec::new(),
        }
    }

    pub fn iq(iq_type: IqType, id: impl Into<String>) -> Self {
        Self::new(StanzaKind::Iq(iq_type)).with_id(id)
    }

    pub fn presence(presence_type: PresenceType) -> Self {
        Self::new(StanzaKind::Presence(presence_type))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn iq_type(&self) -> Option<IqType> {
        match self.kind {
            StanzaKind::Iq(iq_type) => Some(iq_type),
            _ => None,
        }
    }

    pub fn presence_type(&self) -> Option<PresenceType> {
        match self.kind {
            StanzaKind::Presence(presence_type) => Some(presence_type),
            _ => None,
        }
    }

    pub fn is_iq(&self) -> bool {
        matches!(self.kind, StanzaKind::Iq(_))
    }

    pub fn is_presence(&self) -> bool {
        matches!(self.kind, StanzaKind::Presence(_))
    }

    /// The element handlers dispatch on
    pub fn payload(&self) -> Option<&Element> {
        self.children.first()
    }

    /// Non-empty `id` attribute
    pub fn request_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Empty `result` answering this request
    pub fn result_reply(&self) -> Stanza {
        let mut reply = Stanza::new(StanzaKind::Iq(IqType::Result));
        reply.id = self.id.clone();
        reply.from = self.to.clone();
        reply.to = self.from.clone();
        reply
    }

    /// `result` carrying a single child
    pub fn result_with(&self, child: Element) -> Stanza {
        self.result_reply().with_child(child)
    }

    /// `error` reply quoting the original request. The reply keeps the
    /// stanza kind: an undeliverable presence bounces as an error presence.
    pub fn error_reply(&self, condition: StanzaError) -> Stanza {
        self.build_error(condition, None)
    }

    pub fn error_reply_text(&self, condition: StanzaError, text: impl Into<String>) -> Stanza {
        self.build_error(condition, Some(text.into()))
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.kind,
            StanzaKind::Iq(IqType::Error) | StanzaKind::Presence(PresenceType::Error)
        )
    }

    fn build_error(&self, condition: StanzaError, text: Option<String>) -> Stanza {
        let kind = match self.kind {
            StanzaKind::Iq(_) => StanzaKind::Iq(IqType::Error),
            StanzaKind::Presence(_) => StanzaKind::Presence(PresenceType::Error),
            StanzaKind::Message => StanzaKind::Message,
        };
        let mut reply = Stanza::new(kind);
        reply.id = self.id.clone();
        reply.from = self.to.clone();
        reply.to = self.from.clone();
        reply.children = self.children.clone();

        let mut error = Element::new("error").with_attr("type", condition.error_type());
        error.push(Element::ns(condition.condition(), ns::STANZAS));
        if let Some(text) = text {
            error.push(Element::ns("text", ns::STANZAS).with_text(text));
        }
        reply.children.push(error);
        reply
    }

    /// Condition carried by an error reply
    pub fn error_condition(&self) -> Option<StanzaError> {
        let error = self.children.iter().find(|c| c.name == "error")?;
        error
            .children
            .iter()
            .filter(|c| c.namespace() == Some(ns::STANZAS))
            .find_map(|c| StanzaError::from_condition(&c.name))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

impl fmt::Display for Stanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.kind.name())?;
        match self.kind {
            StanzaKind::Iq(iq_type) => write!(f, " type='{}'", iq_type.as_str())?,
            StanzaKind::Presence(PresenceType::Available) | StanzaKind::Message => {}
            StanzaKind::Presence(presence_type) => {
                write!(f, " type='{}'", presence_type.as_str())?
            }
        }
        for (key, value) in [("id", &self.id), ("from", &self.from), ("to", &self.to)] {
            if let Some(value) = value {
                write!(f, " {}='{}'", key, escape(value))?;
            }
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.kind.name())
    }
}
