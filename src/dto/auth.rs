use serde::{Deserialize, Serialize};

/// JWT claims issued by the identity service and checked by [`crate::middleware::auth::AuthUser`].
#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}
