//! Per-request identity produced by the dispatcher.

use serde::Serialize;

/// Authentication branch that resolved the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Hmac,
    Legacy,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hmac => "hmac",
            Self::Legacy => "legacy",
        }
    }
}

/// Authenticated caller, stored in request extensions.
///
/// Lives for one request; handlers read it with `Extension<RequestIdentity>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    /// Resolved tenant id
    pub account_id: String,
    pub method: AuthMethod,
    /// External numeric id (legacy path only)
    pub external_id: Option<u32>,
    /// Sub-account id (legacy path only)
    pub sub_identity: Option<String>,
    /// Access key used to sign (HMAC path only)
    pub access_key: Option<String>,
    pub email: Option<String>,
}

impl RequestIdentity {
    pub fn hmac(account_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            method: AuthMethod::Hmac,
            external_id: None,
            sub_identity: None,
            access_key: Some(access_key.into()),
            email: None,
        }
    }

    pub fn legacy(account_id: impl Into<String>, external_id: u32) -> Self {
        Self {
            account_id: account_id.into(),
            method: AuthMethod::Legacy,
            external_id: Some(external_id),
            sub_identity: None,
            access_key: None,
            email: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let id = RequestIdentity::hmac("acc_1", "AK_1");
        assert_eq!(id.method, AuthMethod::Hmac);
        assert_eq!(id.access_key.as_deref(), Some("AK_1"));
        assert_eq!(id.external_id, None);

        let id = RequestIdentity::legacy("qiniu_7", 7);
        assert_eq!(id.method.as_str(), "legacy");
        assert_eq!(id.external_id, Some(7));
    }
}
