// issuer.rs - Authorization-URL issuer collaborator.
//
// When consent is missing, the gateway asks an issuer for a URL the subject
// can visit to grant access for a toolkit. Real deployments plug in the
// toolkit provider's OAuth/consent endpoint; the template issuer builds a
// stable URL under a configured base.

use url::Url;

use crate::error::IssuerError;
use crate::gateway::AccessRequest;

/// Toolkit segment used for sub-capabilities that declare no toolkit.
pub const INTERNAL_TOOLKIT: &str = "internal";

/// Produces the URL a subject visits to grant consent.
pub trait AuthorizationUrlIssuer: Send + Sync {
    /// `toolkit` is the sub-capability's first declared toolkit, or `None`.
    fn authorize_url(
        &self,
        request: &AccessRequest<'_>,
        toolkit: Option<&str>,
    ) -> Result<String, IssuerError>;
}

/// Builds `<base>/authorize/<toolkit>?user_id=<subject>&scope=<sub_capability>`.
#[derive(Debug, Clone)]
pub struct TemplateUrlIssuer {
    base: Url,
}

impl TemplateUrlIssuer {
    pub fn new(base: &str) -> Result<Self, IssuerError> {
        let base = Url::parse(base).map_err(|e| IssuerError(format!("base URL '{}': {}", base, e)))?;
        if base.cannot_be_a_base() {
            return Err(IssuerError(format!("base URL '{}' cannot hold a path", base)));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl AuthorizationUrlIssuer for TemplateUrlIssuer {
    fn authorize_url(
        &self,
        request: &AccessRequest<'_>,
        toolkit: Option<&str>,
    ) -> Result<String, IssuerError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IssuerError(format!("base URL '{}' cannot hold a path", self.base)))?
            .pop_if_empty()
            .push("authorize")
            .push(toolkit.unwrap_or(INTERNAL_TOOLKIT));
        url.query_pairs_mut()
            .append_pair("user_id", request.subject_id)
            .append_pair("scope", request.sub_capability_key);
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(subject: &'a str, sub: &'a str) -> AccessRequest<'a> {
        AccessRequest {
            subject_id: subject,
            capability_key: "repo_ci",
            sub_capability_key: sub,
        }
    }

    #[test]
    fn url_is_keyed_by_toolkit() {
        let issuer = TemplateUrlIssuer::new("https://consent.example.com/").unwrap();
        let url = issuer
            .authorize_url(&request("u1", "create_repo"), Some("github"))
            .unwrap();
        assert_eq!(
            url,
            "https://consent.example.com/authorize/github?user_id=u1&scope=create_repo"
        );
    }

    #[test]
    fn base_path_is_kept_and_values_encoded() {
        let issuer = TemplateUrlIssuer::new("http://localhost:8787/consent").unwrap();
        let url = issuer
            .authorize_url(&request("user 1&2", "create_db"), None)
            .unwrap();
        assert_eq!(
            url,
            "http://localhost:8787/consent/authorize/internal?user_id=user+1%262&scope=create_db"
        );
    }

    #[test]
    fn rejects_unusable_base() {
        assert!(TemplateUrlIssuer::new("not a url").is_err());
        assert!(TemplateUrlIssuer::new("mailto:consent@example.com").is_err());
    }
}
