use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Who vouched for a user's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authoriser {
    Local,
    Github,
    Google,
}

impl Authoriser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Authoriser::Local => "local",
            Authoriser::Github => "github",
            Authoriser::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Authoriser::Local),
            "github" => Some(Authoriser::Github),
            "google" => Some(Authoriser::Google),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub profile_pic: Option<String>,
    pub authoriser: Authoriser,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub profile_pic: Option<String>,
    pub title: String,
    pub content: String,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub likes: i64,
    pub dislikes: i64,
    pub comments: i64,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: String,
    pub username: String,
    pub profile_pic: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub kind: String,
    pub post_id: i64,
    pub actor_name: String,
    pub actor_profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Timestamps are stored as Unix epoch milliseconds.
pub fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_keeps_millisecond_precision() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(from_millis(to_millis(t)), t);
    }

    #[test]
    fn authoriser_tags_parse_back() {
        for a in [Authoriser::Local, Authoriser::Github, Authoriser::Google] {
            assert_eq!(Authoriser::parse(a.as_str()), Some(a));
        }
        assert_eq!(Authoriser::parse("facebook"), None);
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User {
            id: "u1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: Some("secret".into()),
            profile_pic: None,
            authoriser: Authoriser::Local,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"authoriser\":\"local\""));
    }
}
