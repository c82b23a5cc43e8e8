//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// System prompt for the group agent
pub const GROUP_SYSTEM: &str = include_str!("../../prompts/group-system.pmt");

/// System prompt for the private-chat agent
pub const DIRECT_SYSTEM: &str = include_str!("../../prompts/direct-system.pmt");

/// A group message forwarded to the group agent
pub const INCOMING: &str = include_str!("../../prompts/incoming.pmt");

/// Hangout threshold reached
pub const NUDGE: &str = include_str!("../../prompts/nudge.pmt");

/// First turn of a private chat
pub const OPENING: &str = include_str!("../../prompts/opening.pmt");

/// First turn of a private chat re-opened after a conflict
pub const RESCHEDULE: &str = include_str!("../../prompts/reschedule.pmt");

/// Compiled preferences handed to the group agent
pub const SUMMARY: &str = include_str!("../../prompts/summary.pmt");

/// Corrective turn when a private-chat agent answered without tools
pub const DIRECT_NUDGE: &str = include_str!("../../prompts/direct-nudge.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "group-system" => Some(GROUP_SYSTEM),
        "direct-system" => Some(DIRECT_SYSTEM),
        "incoming" => Some(INCOMING),
        "nudge" => Some(NUDGE),
        "opening" => Some(OPENING),
        "reschedule" => Some(RESCHEDULE),
        "summary" => Some(SUMMARY),
        "direct-nudge" => Some(DIRECT_NUDGE),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_all_names() {
        for name in [
            "group-system",
            "direct-system",
            "incoming",
            "nudge",
            "opening",
            "reschedule",
            "summary",
            "direct-nudge",
        ] {
            assert!(get_embedded(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_system_prompts_name_their_tools() {
        let group = get_embedded("group-system").unwrap();
        for tool in [
            "send_group_message",
            "start_collecting",
            "log_hangout",
            "check_last_hangout",
            "get_member_availability",
            "request_reschedule",
        ] {
            assert!(group.contains(tool), "group prompt lacks {}", tool);
        }

        let direct = get_embedded("direct-system").unwrap();
        assert!(direct.contains("send_reply"));
        assert!(direct.contains("submit_preferences"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
