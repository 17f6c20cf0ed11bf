use serde::{Deserialize, Serialize};

/// Role a user can be granted on a document
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Admin,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Add,
    Remove,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionUpdate {
    pub user_email: String,
    pub role: Role,
    pub mode: PermissionMode,
}

impl PermissionUpdate {
    pub fn grant(user_email: impl Into<String>, role: Role) -> Self {
        Self { user_email: user_email.into(), role, mode: PermissionMode::Add }
    }

    pub fn revoke(user_email: impl Into<String>, role: Role) -> Self {
        Self { user_email: user_email.into(), role, mode: PermissionMode::Remove }
    }
}
