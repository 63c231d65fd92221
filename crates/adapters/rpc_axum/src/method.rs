//! The closed set of methods the server exposes.
//!
//! Method names are validated against this enum instead of being resolved
//! dynamically; an unknown name fails closed with an `error` response.

/// One exposed RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Current automation list. Single reply.
    AutomationsList,
    /// Run an automation by hash. Streams transcript turns.
    AutomationsRun,
    /// Current trigger-handler descriptions. Single reply.
    TriggersList,
    /// Most recent log entries. Single reply.
    LogsRecent,
    /// Live log-entry feed. Streams until the connection closes.
    LogsSubscribe,
}

impl Method {
    /// Resolve a dot-joined wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "automations.list" => Some(Self::AutomationsList),
            "automations.run" => Some(Self::AutomationsRun),
            "triggers.list" => Some(Self::TriggersList),
            "logs.recent" => Some(Self::LogsRecent),
            "logs.subscribe" => Some(Self::LogsSubscribe),
            _ => None,
        }
    }

    /// The dot-joined wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutomationsList => "automations.list",
            Self::AutomationsRun => "automations.run",
            Self::TriggersList => "triggers.list",
            Self::LogsRecent => "logs.recent",
            Self::LogsSubscribe => "logs.subscribe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_roundtrip_every_method_name() {
        let methods = [
            Method::AutomationsList,
            Method::AutomationsRun,
            Method::TriggersList,
            Method::LogsRecent,
            Method::LogsSubscribe,
        ];
        for method in methods {
            assert_eq!(Method::parse(method.as_str()), Some(method));
        }
    }

    #[test]
    fn should_reject_unknown_method_name() {
        assert_eq!(Method::parse("automations.delete"), None);
        assert_eq!(Method::parse(""), None);
    }
}
