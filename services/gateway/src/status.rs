//! Operator status listing

use rayo_actors::{ActorStatus, RegistrySnapshot};

/// One line per actor, active ones first, then those awaiting finalization
pub fn status_lines(snapshot: &RegistrySnapshot) -> Vec<String> {
    let active = snapshot.active.iter().map(|status| status_line(status, false));
    let pending = snapshot.pending.iter().map(|status| status_line(status, true));
    active.chain(pending).collect()
}

pub fn status_line(status: &ActorStatus, dead: bool) -> String {
    format!(
        "{}TYPE='{}',SUBTYPE='{}',ID='{}',JID='{}',DOMAIN='{}',REFS={}",
        if dead { "(DEAD) " } else { "" },
        status.actor_type.kind.as_str(),
        status.actor_type.subkind.as_str(),
        status.id.as_deref().unwrap_or_default(),
        status.address.as_deref().unwrap_or_default(),
        status.domain.as_deref().unwrap_or_default(),
        status.refs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayo_actors::{ActorSpec, ActorType, Registry, Subkind};

    #[test]
    fn test_status_lines() {
        let registry = Registry::new();
        let call = registry
            .create(
                ActorSpec::new(ActorType::CALL).with_id("c1").with_address("c1@example.com"),
                Box::new(crate::test_utils::Inert),
            )
            .unwrap();
        let output = registry
            .create(
                ActorSpec::new(ActorType::call_component(Subkind::Output))
                    .with_address("c1@example.com/output-1")
                    .with_parent(&call),
                Box::new(crate::test_utils::Inert),
            )
            .unwrap();
        registry.destroy(&call);

        let lines = status_lines(&registry.snapshot());
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "TYPE='CALL_COMPONENT',SUBTYPE='output',ID='',JID='c1@example.com/output-1',DOMAIN='example.com',REFS=1"
        );
        assert_eq!(
            lines[1],
            "(DEAD) TYPE='CALL',SUBTYPE='',ID='c1',JID='c1@example.com',DOMAIN='example.com',REFS=1"
        );
        drop(output);
    }
}
