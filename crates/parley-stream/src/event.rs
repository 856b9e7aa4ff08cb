//! Wire-level stream events emitted by the agent backend.
//!
//! Each line of the newline-delimited response body decodes to one of these
//! records, discriminated by its `type` field. Unknown fields are ignored;
//! unknown `type` values fail deserialization and are skipped by the decoder.

use serde::{Deserialize, Serialize};

/// Payload of a completed tool execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Raw tool output as free text. May embed an `output/<path>` reference
    /// to a generated file.
    #[serde(default)]
    pub result: String,
    /// Human-readable summary produced by the result formatter.
    #[serde(default)]
    pub formatted_result: String,
    /// Source links collected by the tool (e.g. search citations).
    #[serde(default)]
    pub links: Vec<String>,
}

/// One decoded record from the response stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Final answer text for the exchange.
    Result {
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        content: String,
    },
    /// A tool finished; carries its raw and formatted output.
    ToolComplete {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        result: ToolOutcome,
    },
    /// A progress line emitted before the final answer. The payload may span
    /// several lines.
    ThinkingProcess {
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        content: String,
    },
    /// The backend failed; the exchange settles with this message.
    Error {
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        content: String,
    },
}

// =============================================================================
// Tests
// =============================================================================
