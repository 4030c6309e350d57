use serde::{Deserialize, Serialize};

/// Identity record returned by the identity endpoint.
///
/// Only the identifier is relied upon; the remaining profile fields are
/// carried through for display. Servers that send no `id`/`_id` identify
/// the user by email, which then doubles as the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UserRecord")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Wire shape of [`User`] before the id is resolved.
#[derive(Deserialize)]
struct UserRecord {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<UserRecord> for User {
    type Error = String;

    fn try_from(record: UserRecord) -> Result<Self, Self::Error> {
        let id = record
            .id
            .filter(|id| !id.is_empty())
            .or_else(|| record.email.clone().filter(|e| !e.is_empty()))
            .ok_or_else(|| "user record has neither an id nor an email".to_string())?;
        Ok(Self {
            id,
            email: record.email,
            name: record.name,
        })
    }
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }

    /// Name to show in a front-end: name, then email, then the raw id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.email.as_deref().filter(|e| !e.is_empty()))
            .unwrap_or(&self.id)
    }
}
