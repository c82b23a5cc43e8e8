//! Tool-call execution loop
//!
//! Drives one exchange with a remote agent to completion: while the agent is
//! waiting on tool results, execute every requested call and submit the whole
//! round back under the agent's turn id.

use tracing::{debug, info, warn};

use crate::llm::{AgentClient, AgentResponse, ConversationHandle, LlmError, ToolOutput};
use crate::tools::{ToolContext, ToolExecutor};

/// Upper bound on tool rounds in one exchange
const MAX_ROUNDS: usize = 25;

/// What happened during one exchange
#[derive(Debug)]
pub struct ExchangeOutcome {
    /// The response that ended the exchange
    pub final_response: AgentResponse,

    /// Tool calls executed, across all rounds
    pub tool_calls: usize,

    /// Rounds of tool results submitted
    pub rounds: usize,

    /// Whether a corrective nudge was sent
    pub nudged: bool,
}

/// Run tool rounds until the agent stops asking for tools
///
/// Unknown tools and failing tools are reported back to the agent as error
/// results; only agent errors end the exchange early. An agent that is still
/// asking for tools after `MAX_ROUNDS` rounds fails the exchange with
/// [`LlmError::RoundLimit`], leaving its run open on the remote side.
pub async fn run_exchange(
    client: &dyn AgentClient,
    executor: &ToolExecutor,
    handle: &ConversationHandle,
    initial: AgentResponse,
    ctx: &ToolContext,
) -> Result<ExchangeOutcome, LlmError> {
    debug!(%handle, status = ?initial.status, "run_exchange: called");
    let mut response = initial;
    let mut tool_calls = 0;
    let mut rounds = 0;

    while response.requires_action() {
        if rounds >= MAX_ROUNDS {
            warn!(%handle, "Max tool rounds ({}) reached, abandoning exchange", MAX_ROUNDS);
            return Err(LlmError::RoundLimit(MAX_ROUNDS));
        }
        rounds += 1;

        let turn_id = response
            .turn_id
            .clone()
            .ok_or_else(|| LlmError::InvalidResponse("tool calls without a turn id".to_string()))?;
        debug!(%handle, rounds, count = response.tool_calls.len(), "run_exchange: executing round");

        let results = executor.execute_all(&response.tool_calls, ctx).await;
        tool_calls += results.len();

        let outputs = results
            .into_iter()
            .map(|(tool_call_id, result)| ToolOutput {
                tool_call_id,
                output: result.content,
            })
            .collect();
        response = client.submit_tool_results(handle, &turn_id, outputs).await?;
    }

    debug!(%handle, tool_calls, rounds, preview = %response.preview(), "run_exchange: finished");
    Ok(ExchangeOutcome {
        final_response: response,
        tool_calls,
        rounds,
        nudged: false,
    })
}

/// Like [`run_exchange`], with one corrective nudge for silent private chats
///
/// A private-chat agent must act through tools. If a whole exchange made no
/// tool call while its member is still chatting, `nudge` is sent once and
/// the loop runs again. Never nudges twice.
pub async fn run_exchange_with_nudge(
    client: &dyn AgentClient,
    executor: &ToolExecutor,
    handle: &ConversationHandle,
    initial: AgentResponse,
    ctx: &ToolContext,
    nudge: &str,
) -> Result<ExchangeOutcome, LlmError> {
    debug!(%handle, "run_exchange_with_nudge: called");
    let first = run_exchange(client, executor, handle, initial, ctx).await?;
    if first.tool_calls > 0 || !ctx.member_still_chatting().await {
        return Ok(first);
    }

    info!(%handle, "Agent made no tool calls, sending a nudge");
    let response = client.send_turn(handle, nudge).await?;
    let second = run_exchange(client, executor, handle, response, ctx).await?;
    if second.tool_calls == 0 {
        warn!(%handle, "Agent still made no tool calls after the nudge");
    }

    Ok(ExchangeOutcome {
        final_response: second.final_response,
        tool_calls: second.tool_calls,
        rounds: first.rounds + second.rounds,
        nudged: true,
    })
}
