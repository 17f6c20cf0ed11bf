use serde::{Deserialize, Serialize};

/// Compact user record used in permission lists and the profile menu
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct UserMini {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "pfpUrl")]
    pub pfp_url: Option<String>,
}

/// Bodies accepted by `POST /user`
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UserRequest {
    UserLogin {
        email: String,
        password: String,
    },
    UserSignup {
        username: String,
        email: String,
        password: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateUsername {
        new_username: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateEmail {
        new_email: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdatePassword {
        new_password: String,
    },
}

/// Reply of a successful login
#[derive(Deserialize, Debug)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LoginReply {
    Success {
        token: String,
        #[serde(default, rename = "pfpUrl")]
        pfp_url: Option<String>,
    },
    Error {
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Token and avatar returned by a login
#[derive(Debug, Clone, PartialEq)]
pub struct Login {
    pub token: String,
    pub pfp_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_requests_use_backend_shapes() {
        let login = UserRequest::UserLogin { email: "a@b.io".into(), password: "pw".into() };
        assert_eq!(
            serde_json::to_value(login).unwrap(),
            serde_json::json!({"type": "userLogin", "email": "a@b.io", "password": "pw"})
        );
        let rename = UserRequest::UpdateUsername { new_username: "ann".into() };
        assert_eq!(
            serde_json::to_value(rename).unwrap(),
            serde_json::json!({"type": "updateUsername", "newUsername": "ann"})
        );
    }

    #[test]
    fn login_reply_parses_both_variants() {
        let ok: LoginReply = serde_json::from_str(r#"{"status":"success","token":"t","pfpUrl":"/a.png"}"#).unwrap();
        assert!(matches!(ok, LoginReply::Success { ref token, .. } if token == "t"));
        let err: LoginReply = serde_json::from_str(r#"{"status":"error","message":"bad password"}"#).unwrap();
        assert!(matches!(err, LoginReply::Error { .. }));
    }
}
