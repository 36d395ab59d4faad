//! Payloads of the auth endpoints.

use serde::{Deserialize, Serialize};

/// Role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    SystemAdmin,
    User,
    Manager,
    /// A role this client does not know about.
    #[serde(other)]
    Unknown,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::SystemAdmin => "SYSTEM_ADMIN",
            UserRole::User => "USER",
            UserRole::Manager => "MANAGER",
            UserRole::Unknown => "UNKNOWN",
        }
    }

    /// Roles that land on the dashboard.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SystemAdmin)
    }

    pub fn parse(role: &str) -> Self {
        match role {
            "ADMIN" => UserRole::Admin,
            "SYSTEM_ADMIN" => UserRole::SystemAdmin,
            "USER" => UserRole::User,
            "MANAGER" => UserRole::Manager,
            _ => UserRole::Unknown,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Landing page after sign-in.
pub fn redirect_path(role: Option<UserRole>) -> &'static str {
    match role {
        None => "/login",
        Some(role) if role.is_admin() => "/dashboard",
        Some(_) => "/profile",
    }
}

/// A role given either as a bare code or as `{ "name": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleRef {
    Named {
        #[serde(default)]
        name: Option<String>,
    },
    Code(UserRole),
}

impl RoleRef {
    pub fn role(&self) -> Option<UserRole> {
        match self {
            RoleRef::Code(role) => Some(*role),
            RoleRef::Named { name } => name.as_deref().map(UserRole::parse),
        }
    }
}

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// User summary returned by login and OTP verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<RoleRef>,
}

impl SessionUser {
    pub fn role(&self) -> Option<UserRole> {
        self.role.as_ref().and_then(RoleRef::role)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    /// First sign-in: 2FA has to be set up.
    #[serde(default)]
    pub requires_2fa: bool,
    /// 2FA is on: an OTP has to be verified.
    #[serde(default)]
    pub requires_otp: bool,
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Setup2faRequest {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Setup2faResponse {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub qr_code_url: String,
}

#[derive(Clone, Serialize)]
pub struct Verify2faSetupRequest {
    pub otp_code: String,
    pub secret: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Verify2faSetupResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    pub otp_code: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyOtpResponse {
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Clone, Serialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPasswordResetOtpRequest {
    pub email: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPasswordResetOtpResponse {
    #[serde(default)]
    pub reset_token: String,
}

#[derive(Clone, Serialize)]
pub struct CompletePasswordResetRequest {
    pub new_password: String,
    pub confirm_password: String,
    pub reset_token: String,
}

/// `{ id, name }` reference to a department or project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: RoleRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redirect_path() {
        assert_eq!(redirect_path(Some(UserRole::Admin)), "/dashboard");
        assert_eq!(redirect_path(Some(UserRole::SystemAdmin)), "/dashboard");
        assert_eq!(redirect_path(Some(UserRole::Manager)), "/profile");
        assert_eq!(redirect_path(Some(UserRole::Unknown)), "/profile");
        assert_eq!(redirect_path(None), "/login");
    }

    #[test]
    fn test_unknown_role_code() {
        let role: UserRole = serde_json::from_value(json!("AUDITOR")).unwrap();
        assert_eq!(role, UserRole::Unknown);
    }

    #[test]
    fn test_role_ref_shapes() {
        let code: RoleRef = serde_json::from_value(json!("SYSTEM_ADMIN")).unwrap();
        assert_eq!(code.role(), Some(UserRole::SystemAdmin));

        let named: RoleRef = serde_json::from_value(json!({"name": "MANAGER"})).unwrap();
        assert_eq!(named.role(), Some(UserRole::Manager));

        let empty: RoleRef = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.role(), None);
    }

    #[test]
    fn test_login_response_flags_default_false() {
        let resp: LoginResponse = serde_json::from_value(json!({
            "user": {"id": 3, "username": "mai", "role": "USER"}
        }))
        .unwrap();
        assert!(!resp.requires_2fa);
        assert!(!resp.requires_otp);
        assert_eq!(resp.user.unwrap().role(), Some(UserRole::User));
    }

    #[test]
    fn test_user_response() {
        let user: UserResponse = serde_json::from_value(json!({
            "id": 1,
            "username": "admin",
            "email": "admin@example.com",
            "role": "ADMIN",
            "department": {"id": 2, "name": "HR"},
            "is_active": true,
            "created_at": "2026-01-05T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(user.role.role(), Some(UserRole::Admin));
        assert_eq!(user.department.unwrap().name, "HR");
        assert!(user.permissions.is_empty());
    }
}
