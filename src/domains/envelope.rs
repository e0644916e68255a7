use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Addressing metadata carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Every cluster member answers.
    All,
    /// Only the member with this id answers.
    Cluster(u16),
}

/// Present on every response; marks it so receivers never re-dispatch it as a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMeta {
    pub cluster_id: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownAction,
    HandlerFailed,
    HandlerPanicked,
    EmptyResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_action() -> Self {
        Self::new(ErrorKind::UnknownAction, "unknown action")
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// One unit of bus traffic, request or response.
///
/// `result` and `error` are never both populated; the constructors below are the
/// only way to build a response, and the codec rejects foreign payloads that set both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub scope: String,
    pub action: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorPayload>,
}

/// Borrowed view of what a response reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome<'a> {
    Success(&'a Value),
    Failure(&'a ErrorPayload),
    /// Requests carry neither.
    Pending,
}

impl Envelope {
    pub fn request(
        scope: impl Into<String>,
        action: impl Into<String>,
        correlation_id: impl Into<String>,
        args: Map<String, Value>,
        target: Option<Target>,
    ) -> Self {
        Self {
            scope: scope.into(),
            action: action.into(),
            correlation_id: correlation_id.into(),
            args,
            target,
            reply: None,
            result: None,
            error: None,
        }
    }

    /// Builds the successful answer to `self`, echoing scope, action and correlation id.
    pub fn success(&self, responder: Option<u16>, result: Value) -> Self {
        Self {
            result: Some(result),
            ..self.response_shell(responder)
        }
    }

    pub fn failure(&self, responder: Option<u16>, error: ErrorPayload) -> Self {
        Self {
            error: Some(error),
            ..self.response_shell(responder)
        }
    }

    fn response_shell(&self, responder: Option<u16>) -> Self {
        Self {
            scope: self.scope.clone(),
            action: self.action.clone(),
            correlation_id: self.correlation_id.clone(),
            args: Map::new(),
            target: None,
            reply: Some(ReplyMeta {
                cluster_id: responder,
            }),
            result: None,
            error: None,
        }
    }

    pub fn is_response(&self) -> bool {
        self.reply.is_some()
    }

    pub fn responder(&self) -> Option<u16> {
        self.reply.and_then(|meta| meta.cluster_id)
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorPayload> {
        self.error.as_ref()
    }

    pub fn outcome(&self) -> Outcome<'_> {
        match (&self.result, &self.error) {
            (_, Some(error)) => Outcome::Failure(error),
            (Some(result), None) => Outcome::Success(result),
            (None, None) => Outcome::Pending,
        }
    }

    pub(crate) fn has_conflicting_outcome(&self) -> bool {
        self.result.is_some() && self.error.is_some()
    }
}

/// A destination worker-cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterAddress {
    pub id: u16,
    pub suffix: String,
}

impl ClusterAddress {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            suffix: format!("ipc@{id}"),
        }
    }

    pub fn with_suffix(id: u16, suffix: impl Into<String>) -> Self {
        Self {
            id,
            suffix: suffix.into(),
        }
    }

    pub fn channel(&self, base: &str) -> String {
        format!("{base}/{}", self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn responses_echo_request_identity() {
        let request = Envelope::request("scope", "ping", "abc", Map::new(), Some(Target::All));
        let response = request.success(Some(2), json!({"pong": true}));
        assert_eq!(response.correlation_id, "abc");
        assert_eq!(response.action, "ping");
        assert!(response.is_response());
        assert_eq!(response.responder(), Some(2));
        assert!(response.target.is_none());
        assert!(response.error().is_none());

        let failed = request.failure(None, ErrorPayload::unknown_action());
        assert!(failed.result().is_none());
        assert!(matches!(failed.outcome(), Outcome::Failure(e) if e.message == "unknown action"));
        assert_eq!(request.outcome(), Outcome::Pending);
    }

    #[test]
    fn cluster_address_channel() {
        assert_eq!(ClusterAddress::new(3).channel("mewld"), "mewld/ipc@3");
        assert_eq!(
            ClusterAddress::with_suffix(1, "ipc@one").channel("base"),
            "base/ipc@one"
        );
    }
}
