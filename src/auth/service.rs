//! Registration, login and the current-user view.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use super::password::PasswordHasher;
use super::store::{User, UserStore, UserView};
use super::token::{TokenResponse, TokenService};
use crate::billing::EntitlementsManager;
use crate::error::{OsikatuError, Result};
use crate::oplog::{NewOperation, OperationLogger};
use crate::points::PointsService;
use crate::validation::validate_not_blank;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 50), custom(function = "validate_not_blank"))]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    #[serde(flatten)]
    pub token: TokenResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user: UserView,
    pub plan_id: String,
    pub points_balance: i64,
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: Arc<TokenService>,
    points: Arc<PointsService>,
    entitlements: Arc<EntitlementsManager>,
    oplog: Arc<OperationLogger>,
    /// Verified against when the email is unknown so both paths cost the same.
    dummy_hash: OnceLock<Option<String>>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: Arc<TokenService>,
        points: Arc<PointsService>,
        entitlements: Arc<EntitlementsManager>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            points,
            entitlements,
            oplog,
            dummy_hash: OnceLock::new(),
        }
    }

    #[instrument(skip_all)]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse> {
        let email = normalize_email(&request.email);
        let password_hash = self.hasher.hash(&request.password)?;

        let user = self
            .users
            .create_user(User {
                id: crate::utils::new_id(),
                email,
                display_name: request.display_name.trim().to_string(),
                password_hash,
                created_at: crate::utils::now(),
            })
            .await?;

        self.points.grant_signup_bonus(&user.id).await?;
        let token = self.tokens.issue(&user.id, &user.display_name)?;

        info!(user_id = %user.id, "User registered");
        self.oplog
            .record(
                NewOperation::new("account.register")
                    .actor(&user.id)
                    .target("user", &user.id)
                    .metadata(json!({ "email": user.email })),
            )
            .await;

        Ok(AuthResponse {
            user: UserView::from(&user),
            token,
        })
    }

    /// Unknown email and wrong password fail with the same message.
    #[instrument(skip_all)]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        let email = normalize_email(&request.email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            if let Some(dummy) = self.dummy_hash() {
                let _ = self.hasher.verify(&request.password, dummy);
            }
            debug!("Login for unknown email");
            return Err(OsikatuError::unauthorized(INVALID_CREDENTIALS));
        };

        if !self.hasher.verify(&request.password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(OsikatuError::unauthorized(INVALID_CREDENTIALS));
        }

        if self.hasher.needs_rehash(&user.password_hash)? {
            let upgraded = self.hasher.hash(&request.password)?;
            self.users.update_password_hash(&user.id, &upgraded).await?;
            debug!(user_id = %user.id, "Password hash upgraded");
        }

        let token = self.tokens.issue(&user.id, &user.display_name)?;
        info!(user_id = %user.id, "User logged in");
        self.oplog
            .record(NewOperation::new("account.login").actor(&user.id))
            .await;

        Ok(AuthResponse {
            user: UserView::from(&user),
            token,
        })
    }

    pub async fn me(&self, user_id: &str) -> Result<MeResponse> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| OsikatuError::not_found("User not found"))?;

        Ok(MeResponse {
            user: UserView::from(&user),
            plan_id: self.entitlements.plan_id(user_id).await?,
            points_balance: self.points.balance(user_id).await?,
        })
    }

    fn dummy_hash(&self) -> Option<&str> {
        self.dummy_hash
            .get_or_init(|| self.hasher.hash("osikatu-unknown-account").ok())
            .as_deref()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
