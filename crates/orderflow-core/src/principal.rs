use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrderFlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "cliente")]
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "cliente",
        }
    }
}

impl FromStr for Role {
    type Err = OrderFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "cliente" => Ok(Self::Client),
            other => Err(OrderFlowError::Unauthorized(format!("unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata carried into audit entries.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// The authenticated caller of a workflow operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    /// Owning client for `cliente` users. Always `Some` for that role.
    pub client_id: Option<Uuid>,
    pub request: RequestMeta,
}

impl Actor {
    /// Construct from validated JWT claims at the server boundary.
    /// Core logic never reads raw tokens.
    pub fn from_jwt_claims(claims: &JwtClaims) -> Result<Self, OrderFlowError> {
        let sub = claims
            .sub
            .as_deref()
            .ok_or_else(|| OrderFlowError::Unauthorized("missing sub claim".into()))?;
        let user_id = Uuid::parse_str(sub)
            .map_err(|_| OrderFlowError::Unauthorized(format!("sub is not a uuid: {sub}")))?;
        let role: Role = claims
            .role
            .as_deref()
            .ok_or_else(|| OrderFlowError::Unauthorized("missing role claim".into()))?
            .parse()?;
        let client_id = claims
            .client_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| OrderFlowError::Unauthorized("client_id is not a uuid".into()))?;
        if role == Role::Client && client_id.is_none() {
            return Err(OrderFlowError::Unauthorized(
                "cliente token without client_id".into(),
            ));
        }
        Ok(Self {
            user_id,
            role,
            client_id,
            request: RequestMeta::default(),
        })
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            client_id: None,
            request: RequestMeta::default(),
        }
    }

    pub fn client(user_id: Uuid, client_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Client,
            client_id: Some(client_id),
            request: RequestMeta::default(),
        }
    }

    pub fn with_request(mut self, request: RequestMeta) -> Self {
        self.request = request;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), OrderFlowError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(OrderFlowError::Forbidden(format!(
                "{} is not an admin",
                self.user_id
            )))
        }
    }

    /// `None` means unrestricted; `Some(id)` restricts reads to one client.
    pub fn client_scope(&self) -> Option<Uuid> {
        match self.role {
            Role::Admin => None,
            Role::Client => self.client_id,
        }
    }

    pub fn can_access_client(&self, client_id: Uuid) -> bool {
        self.is_admin() || self.client_id == Some(client_id)
    }

    pub fn require_client_access(&self, client_id: Uuid) -> Result<(), OrderFlowError> {
        if self.can_access_client(client_id) {
            Ok(())
        } else {
            Err(OrderFlowError::Forbidden(format!(
                "{} cannot act on client {client_id}",
                self.user_id
            )))
        }
    }
}

/// JWT claims shape expected from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Option<String>,
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<usize>,
}
