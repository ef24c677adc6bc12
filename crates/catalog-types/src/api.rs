use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Attachment, Category, Role, Subniche, User};
use crate::pagination::PageQuery;

/// Request bodies check their own shape beyond what serde enforces.
/// The error string is returned to the client as-is.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn require_name(name: &str, field: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(format!("\"{}\" is required", field));
    }
    if name.len() > 255 {
        return Err(format!("\"{}\" must be at most 255 characters", field));
    }
    Ok(())
}

fn require_any(present: &[bool]) -> Result<(), String> {
    if present.iter().any(|p| *p) {
        Ok(())
    } else {
        Err("Request body must contain at least one field".into())
    }
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
}

/// At least 8 characters with one letter and one digit.
pub fn check_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("password must be at least 8 characters".into());
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic())
        || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err("password must contain at least 1 letter and 1 number".into());
    }
    Ok(())
}

// -- JWT Claims --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Access,
    Refresh,
    ResetPassword,
    VerifyEmail,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "ACCESS",
            TokenKind::Refresh => "REFRESH",
            TokenKind::ResetPassword => "RESET_PASSWORD",
            TokenKind::VerifyEmail => "VERIFY_EMAIL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub kind: TokenKind,
    /// Unique per issued token, so stored token hashes never collide.
    pub jti: String,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), String> {
        if !is_valid_email(&self.email) {
            return Err("\"email\" must be a valid email".into());
        }
        check_password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), String> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err("\"email\" and \"password\" are required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub token: String,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access: TokenInfo,
    pub refresh: TokenInfo,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: AuthTokens,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl Validate for RefreshTokenRequest {
    fn validate(&self) -> Result<(), String> {
        if self.refresh_token.is_empty() {
            return Err("\"refreshToken\" is required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

impl Validate for ForgotPasswordRequest {
    fn validate(&self) -> Result<(), String> {
        if !is_valid_email(&self.email) {
            return Err("\"email\" must be a valid email".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub password: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Result<(), String> {
        check_password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), String> {
        if !is_valid_email(&self.email) {
            return Err("\"email\" must be a valid email".into());
        }
        check_password(&self.password)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar_id: Option<Uuid>,
    pub first_access: Option<bool>,
    pub role: Option<Role>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), String> {
        require_any(&[
            self.name.is_some(),
            self.email.is_some(),
            self.password.is_some(),
            self.avatar_id.is_some(),
            self.first_access.is_some(),
            self.role.is_some(),
        ])?;
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err("\"email\" must be a valid email".into());
            }
        }
        if let Some(password) = &self.password {
            check_password(password)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserStatusRequest {
    pub status: bool,
}

impl Validate for UserStatusRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

// -- Categories --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub attachment_id: Option<Uuid>,
}

impl Validate for CreateCategoryRequest {
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name, "name")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub attachment_id: Option<Uuid>,
}

impl Validate for UpdateCategoryRequest {
    fn validate(&self) -> Result<(), String> {
        require_any(&[self.name.is_some(), self.attachment_id.is_some()])?;
        match &self.name {
            Some(name) => require_name(name, "name"),
            None => Ok(()),
        }
    }
}

// -- Subniches --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateSubnicheRequest {
    pub name: String,
    pub category_id: Uuid,
    pub attachment_id: Option<Uuid>,
}

impl Validate for CreateSubnicheRequest {
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name, "name")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateSubnicheRequest {
    pub name: Option<String>,
    pub category_id: Option<Uuid>,
    pub attachment_id: Option<Uuid>,
}

impl Validate for UpdateSubnicheRequest {
    fn validate(&self) -> Result<(), String> {
        require_any(&[
            self.name.is_some(),
            self.category_id.is_some(),
            self.attachment_id.is_some(),
        ])?;
        match &self.name {
            Some(name) => require_name(name, "name"),
            None => Ok(()),
        }
    }
}

// -- Stickers --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslationInput {
    pub language: String,
    pub name: String,
}

fn validate_translations(translations: Option<&Vec<TranslationInput>>) -> Result<(), String> {
    for t in translations.into_iter().flatten() {
        require_name(&t.language, "translations.language")?;
        require_name(&t.name, "translations.name")?;
    }
    Ok(())
}

/// Sticker names are optional; an empty string counts as absent.
pub fn normalize_name(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.trim().is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateStickerRequest {
    pub name: Option<String>,
    pub attachment_id: Uuid,
    pub category_id: Uuid,
    pub subniche_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub translations: Option<Vec<TranslationInput>>,
}

impl Validate for CreateStickerRequest {
    fn validate(&self) -> Result<(), String> {
        validate_translations(self.translations.as_ref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateStickerRequest {
    pub name: Option<String>,
    pub attachment_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub subniche_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub translations: Option<Vec<TranslationInput>>,
}

impl Validate for UpdateStickerRequest {
    fn validate(&self) -> Result<(), String> {
        require_any(&[
            self.name.is_some(),
            self.attachment_id.is_some(),
            self.category_id.is_some(),
            self.subniche_id.is_some(),
            self.user_id.is_some(),
            self.translations.is_some(),
        ])?;
        validate_translations(self.translations.as_ref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateUserStickerRequest {
    pub name: Option<String>,
    pub attachment_id: Uuid,
    pub translations: Option<Vec<TranslationInput>>,
}

impl Validate for CreateUserStickerRequest {
    fn validate(&self) -> Result<(), String> {
        validate_translations(self.translations.as_ref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserStickerRequest {
    pub name: Option<String>,
    pub translations: Option<Vec<TranslationInput>>,
}

impl Validate for UpdateUserStickerRequest {
    fn validate(&self) -> Result<(), String> {
        require_any(&[self.name.is_some(), self.translations.is_some()])?;
        validate_translations(self.translations.as_ref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FavoriteRequest {
    pub sticker_id: Uuid,
}

impl Validate for FavoriteRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

// -- Fonts, icons, tutorials --

fn check_link(link: &str) -> Result<(), String> {
    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))
        .ok_or_else(|| "\"youtubeLink\" must be a valid uri".to_string())?;
    if rest.is_empty() || rest.chars().any(char::is_whitespace) {
        return Err("\"youtubeLink\" must be a valid uri".into());
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAssetRequest {
    pub name: String,
    pub attachment_id: Option<Uuid>,
    pub youtube_link: Option<String>,
}

impl Validate for CreateAssetRequest {
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name, "name")?;
        match &self.youtube_link {
            Some(link) => check_link(link),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAssetRequest {
    pub name: Option<String>,
    pub attachment_id: Option<Uuid>,
    pub youtube_link: Option<String>,
}

impl Validate for UpdateAssetRequest {
    fn validate(&self) -> Result<(), String> {
        require_any(&[
            self.name.is_some(),
            self.attachment_id.is_some(),
            self.youtube_link.is_some(),
        ])?;
        if let Some(name) = &self.name {
            require_name(name, "name")?;
        }
        match &self.youtube_link {
            Some(link) => check_link(link),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportanceRequest {
    pub id: Uuid,
}

impl Validate for ImportanceRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DisplayOrderRequest {
    pub id: Uuid,
    pub display_order: i64,
}

impl Validate for DisplayOrderRequest {
    fn validate(&self) -> Result<(), String> {
        if self.display_order < 0 {
            return Err("\"displayOrder\" must be a non-negative number".into());
        }
        Ok(())
    }
}

// -- Generic responses --

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TotalResponse {
    pub total: u64,
}

// -- Search --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub page: u32,
    pub page_size: u32,
    pub total_categories: u64,
    pub total_subniches: u64,
    pub total: u64,
    pub total_pages: u64,
    pub categories: Vec<Category>,
    pub subniches: Vec<Subniche>,
}

// -- Files --

#[derive(Debug, Serialize)]
pub struct MultiUploadResponse {
    pub message: String,
    pub files: Vec<Attachment>,
}

/// Metadata of a stored object as reported by the bucket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetail {
    #[serde(flatten)]
    pub attachment: Attachment,
    pub object: Option<ObjectInfo>,
}

#[derive(Debug, Serialize)]
pub struct FileDetailResponse {
    pub file: FileDetail,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<ObjectInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana.example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana @example.com"));
    }

    #[test]
    fn password_rules() {
        assert!(check_password("abc12345").is_ok());
        assert!(check_password("short1").is_err());
        assert!(check_password("onlyletters").is_err());
        assert!(check_password("12345678").is_err());
    }

    #[test]
    fn update_requires_at_least_one_field() {
        let req: UpdateCategoryRequest = serde_json::from_str("{}").unwrap();
        assert!(req.validate().is_err());

        let req: UpdateCategoryRequest = serde_json::from_str(r#"{"name":"Pets"}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res = serde_json::from_str::<CreateCategoryRequest>(r#"{"name":"x","color":"red"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn sticker_ids_must_be_uuids() {
        let res = serde_json::from_str::<CreateStickerRequest>(
            r#"{"attachmentId":"nope","categoryId":"7d3a3c1e-9d1c-4c59-9a53-0d7b0e0b5f11"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn tutorial_link_must_be_http() {
        let req = CreateAssetRequest {
            name: "Intro".into(),
            attachment_id: None,
            youtube_link: Some("youtube.com/watch?v=1".into()),
        };
        assert!(req.validate().is_err());

        let req = CreateAssetRequest {
            youtube_link: Some("https://youtube.com/watch?v=1".into()),
            ..req
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_sticker_name_is_absent() {
        assert_eq!(normalize_name(Some("  ".into())), None);
        assert_eq!(normalize_name(Some("Cat".into())), Some("Cat".into()));
    }
}
