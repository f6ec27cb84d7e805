use serde::{Deserialize, Serialize};

/// Token accounting reported by the backend at the end of a turn.
///
/// Cache fields count prompt tokens written to / served from the prompt
/// cache; they are part of the effective input size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl Usage {
    /// Effective input size: fresh input plus cache creation and cache reads.
    pub fn total_input_tokens(&self) -> u64 {
        self.input_tokens + self.cache_creation_input_tokens + self.cache_read_input_tokens
    }
}

/// Terminal message of an invocation, carrying the outcome and usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Outcome discriminator: "success", "error", "max_turns", ...
    pub subtype: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Final text produced by the agent, when the backend includes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ResultMessage {
    pub fn success(usage: Usage, session_id: impl Into<String>) -> Self {
        Self {
            subtype: "success".to_string(),
            duration_ms: 0,
            num_turns: 1,
            is_error: false,
            session_id: Some(session_id.into()),
            total_cost_usd: None,
            usage: Some(usage),
            result: None,
        }
    }
}

/// One item of the message stream an invocation yields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    User {
        content: String,
    },
    Assistant {
        /// Model that produced this message, when the backend reports it.
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default)]
        content: Vec<serde_json::Value>,
    },
    System {
        subtype: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    Result(ResultMessage),
}

impl AgentMessage {
    pub fn assistant(model: impl Into<String>) -> Self {
        AgentMessage::Assistant {
            model: Some(model.into()),
            content: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_input_sums_cache_tokens() {
        let usage = Usage {
            input_tokens: 100,
            output_tokens: 50,
            cache_creation_input_tokens: 20,
            cache_read_input_tokens: 30,
        };
        assert_eq!(usage.total_input_tokens(), 150);
    }

    #[test]
    fn total_input_without_cache_is_plain_input() {
        let usage = Usage {
            input_tokens: 100,
            output_tokens: 50,
            ..Default::default()
        };
        assert_eq!(usage.total_input_tokens(), 100);
    }

    #[test]
    fn messages_round_trip_through_json() {
        let msg = AgentMessage::Result(ResultMessage::success(
            Usage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            },
            "session-1",
        ));
        let json = serde_json::to_string(&msg).unwrap();
        let back: AgentMessage = serde_json::from_str(&json).unwrap();
        match back {
            AgentMessage::Result(r) => {
                assert_eq!(r.subtype, "success");
                assert_eq!(r.session_id.as_deref(), Some("session-1"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
