//! Built-in tools for the group and private-chat agents

mod check_last_hangout;
mod get_group_memory;
mod get_member_availability;
mod log_hangout;
mod request_reschedule;
mod send_group_message;
mod send_reply;
mod start_collecting;
mod submit_preferences;
mod suggest_fallback;

pub use check_last_hangout::CheckLastHangoutTool;
pub use get_group_memory::GetGroupMemoryTool;
pub use get_member_availability::GetMemberAvailabilityTool;
pub use log_hangout::LogHangoutTool;
pub use request_reschedule::RequestRescheduleTool;
pub use send_group_message::SendGroupMessageTool;
pub use send_reply::SendReplyTool;
pub use start_collecting::StartCollectingTool;
pub use submit_preferences::SubmitPreferencesTool;
pub use suggest_fallback::SuggestFallbackTool;
