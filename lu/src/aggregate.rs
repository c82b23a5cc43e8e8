//! Preference aggregation and reschedule seeding
//!
//! Turns the per-member agents of a finished collection round into the
//! summary the group agent plans from, and works out what carries over when
//! a round is re-opened. Conflict detection itself is left to the group agent.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::{GroupConfig, Member};
use crate::state::Agents;

/// One member's answers, ready for the summary prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberPreferences {
    pub name: String,
    pub availability: String,
    pub activity: String,
    pub notes: String,
}

/// Submitted preferences in roster order
///
/// Members without a submission are left out.
pub fn compile_summary(group: &GroupConfig, agents: &Agents) -> Vec<MemberPreferences> {
    group
        .members
        .iter()
        .filter_map(|member| {
            let agent = agents.get(&member.contact)?;
            let prefs = agent.preferences.as_ref()?;
            Some(MemberPreferences {
                name: agent.display_name.clone(),
                availability: prefs.availability.clone(),
                activity: prefs.activity.clone(),
                notes: prefs.notes.clone(),
            })
        })
        .collect()
}

/// Activity to carry into a re-opened round for `member`
///
/// A fresh submission wins over an older carried value; availability is
/// never carried.
pub fn carried_activity(agents: Option<&Agents>, member: &Member) -> Option<String> {
    let agent = agents?.get(&member.contact)?;
    agent
        .preferences
        .as_ref()
        .map(|p| p.activity.clone())
        .filter(|a| !a.trim().is_empty())
        .or_else(|| agent.prior_activity.clone())
}

/// Availability view for the group agent, keyed by display name
pub fn availability_view(group: &GroupConfig, agents: Option<&Agents>) -> Value {
    let mut view = Map::new();
    if let Some(agents) = agents {
        for member in &group.members {
            if let Some(agent) = agents.get(&member.contact) {
                let entry = match &agent.preferences {
                    Some(prefs) => json!({
                        "availability": prefs.availability,
                        "activity": prefs.activity,
                        "notes": prefs.notes,
                    }),
                    None => json!("still chatting..."),
                };
                view.insert(agent.display_name.clone(), entry);
            }
        }
    }
    Value::Object(view)
}
