use crate::auth::jwt::verify_access_token;
use crate::config::Config;
use crate::model::role::Role;
use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_code: Option<String>,
}

impl AuthUser {
    pub fn from_token(token: &str, secret: &str) -> Result<Self, String> {
        let claims = verify_access_token(token, secret)?;
        let role = Role::from_id(claims.role).ok_or_else(|| "Invalid role".to_string())?;
        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            employee_code: claims.employee_code,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already verified by auth_middleware
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(actix_web::error::ErrorInternalServerError(
                    "Config missing",
                )));
            }
        };

        ready(AuthUser::from_token(token, &config.jwt_secret).map_err(ErrorUnauthorized))
    }
}

impl AuthUser {
    /// Operator endpoints: HR, admins and internal system accounts.
    pub fn require_operator(&self) -> actix_web::Result<()> {
        if self.role.is_operator() {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("HR/Admin only"))
        }
    }

    /// Employee code of the caller, required for self-service punches.
    pub fn require_employee_code(&self) -> actix_web::Result<&str> {
        self.employee_code
            .as_deref()
            .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))
    }
}
