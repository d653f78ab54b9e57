use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
            sqlx::Type,
        )]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// Identifier of a monitored domain record
    DomainId
);
entity_id!(
    /// Identifier of a scan job
    JobId
);
entity_id!(
    /// Identifier of a typosquat threat finding
    ThreatId
);
entity_id!(
    /// Identifier of a code-repository leak finding
    LeakId
);
entity_id!(
    /// Identifier of a guard agent (one per monitored host)
    AgentId
);
entity_id!(
    /// Identifier of a guard event (one per anomaly alert)
    EventId
);
entity_id!(
    /// Identifier of a platform user
    UserId
);
entity_id!(
    /// Identifier of an API key record
    KeyId
);
entity_id!(
    /// Identifier of a subscription record
    SubscriptionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_display_and_parse() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn malformed_id_fails_to_parse() {
        assert!("not-a-uuid".parse::<EventId>().is_err());
    }
}
