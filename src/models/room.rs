use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Whether a room can be joined at any time or only around its scheduled window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    #[default]
    Anytime,
    Window,
}

impl JoinPolicy {
    pub fn enforced(enforce_window: bool) -> Self {
        if enforce_window {
            JoinPolicy::Window
        } else {
            JoinPolicy::Anytime
        }
    }
}

/// Meeting room record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(rename = "roomID")]
    pub room_id: String,
    pub title: String,
    #[serde(rename = "hostID")]
    pub host_id: String,
    #[serde(rename = "meetingFrom")]
    pub window_from: DateTime<Utc>,
    #[serde(rename = "meetingTo")]
    pub window_to: DateTime<Utc>,
    #[serde(rename = "participantIds")]
    pub participant_ids: BTreeSet<String>,
    #[serde(default)]
    pub join_policy: JoinPolicy,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant_ids.contains(user_id)
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    /// True when the join policy allows entry at `now`.
    /// Window rooms open `grace` before `window_from` and close at `window_to`.
    pub fn is_joinable_at(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match self.join_policy {
            JoinPolicy::Anytime => true,
            JoinPolicy::Window => now >= self.window_from - grace && now <= self.window_to,
        }
    }
}

/// Public view returned by the validate endpoint; omits the participant list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(rename = "roomID")]
    pub room_id: String,
    pub title: String,
    #[serde(rename = "hostID")]
    pub host_id: String,
    #[serde(rename = "meetingFrom")]
    pub window_from: DateTime<Utc>,
    #[serde(rename = "meetingTo")]
    pub window_to: DateTime<Utc>,
    pub join_policy: JoinPolicy,
    pub participant_count: usize,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.room_id.clone(),
            title: room.title.clone(),
            host_id: room.host_id.clone(),
            window_from: room.window_from,
            window_to: room.window_to,
            join_policy: room.join_policy,
            participant_count: room.participant_ids.len(),
        }
    }
}

/// Listing category for a user's rooms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MeetingCategory {
    Upcoming,
    #[default]
    Past,
}

/// Fields accepted when scheduling a room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub title: String,
    pub window_from: DateTime<Utc>,
    pub window_to: DateTime<Utc>,
    pub host_id: String,
    pub participant_ids: Vec<String>,
    pub join_policy: JoinPolicy,
}

/// Partial update; `None` leaves the field untouched.
/// `participant_ids` replaces the whole set.
#[derive(Debug, Clone, Default)]
pub struct RoomUpdate {
    pub title: Option<String>,
    pub window_from: Option<DateTime<Utc>>,
    pub window_to: Option<DateTime<Utc>>,
    pub participant_ids: Option<Vec<String>>,
    pub join_policy: Option<JoinPolicy>,
}

/// POST /meetings body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub title: String,
    pub meeting_from: DateTime<Utc>,
    pub meeting_to: DateTime<Utc>,
    pub participant_ids: Vec<String>,
    #[serde(default)]
    pub enforce_window: Option<bool>,
}

/// PUT /meetings/{roomID} body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeetingRequest {
    pub title: Option<String>,
    pub meeting_from: Option<DateTime<Utc>>,
    pub meeting_to: Option<DateTime<Utc>>,
    pub participant_ids: Option<Vec<String>>,
    pub enforce_window: Option<bool>,
}

impl From<UpdateMeetingRequest> for RoomUpdate {
    fn from(req: UpdateMeetingRequest) -> Self {
        Self {
            title: req.title,
            window_from: req.meeting_from,
            window_to: req.meeting_to,
            participant_ids: req.participant_ids,
            join_policy: req.enforce_window.map(JoinPolicy::enforced),
        }
    }
}

/// GET /meetings/recent query
#[derive(Debug, Deserialize)]
pub struct RecentMeetingsQuery {
    #[serde(default, rename = "type")]
    pub category: MeetingCategory,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_room(policy: JoinPolicy) -> Room {
        let from = Utc::now() + Duration::hours(2);
        Room {
            room_id: "12345678".to_string(),
            title: "Standup".to_string(),
            host_id: "host".to_string(),
            window_from: from,
            window_to: from + Duration::hours(1),
            participant_ids: ["host".to_string()].into_iter().collect(),
            join_policy: policy,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_anytime_room_always_joinable() {
        let room = sample_room(JoinPolicy::Anytime);
        assert!(room.is_joinable_at(Utc::now(), Duration::zero()));
    }

    #[test]
    fn test_window_room_respects_grace() {
        let room = sample_room(JoinPolicy::Window);
        let now = room.window_from - Duration::minutes(5);
        assert!(!room.is_joinable_at(now, Duration::minutes(1)));
        assert!(room.is_joinable_at(now, Duration::minutes(10)));
        assert!(!room.is_joinable_at(room.window_to + Duration::seconds(1), Duration::minutes(10)));
    }

    #[test]
    fn test_room_serializes_with_wire_names() {
        let room = sample_room(JoinPolicy::Window);
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["roomID"], "12345678");
        assert_eq!(json["hostID"], "host");
        assert_eq!(json["joinPolicy"], "window");
        assert!(json.get("meetingFrom").is_some());
    }

    #[test]
    fn test_recent_query_defaults_to_past() {
        let query: RecentMeetingsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.category, MeetingCategory::Past);
        let query: RecentMeetingsQuery = serde_json::from_str(r#"{"type":"upcoming"}"#).unwrap();
        assert_eq!(query.category, MeetingCategory::Upcoming);
    }

    #[test]
    fn test_summary_hides_participants() {
        let room = sample_room(JoinPolicy::Anytime);
        let json = serde_json::to_value(RoomSummary::from(&room)).unwrap();
        assert_eq!(json["roomID"], "12345678");
        assert_eq!(json["participantCount"], 1);
        assert!(json.get("participantIds").is_none());
    }
}
