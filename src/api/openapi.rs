use super::handlers::{auth, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and documented. Routes added outside (like `/` and preflight `OPTIONS`)
/// are intentionally undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut service_tag = Tag::new("talentgate");
    service_tag.description = Some("Job marketplace account lifecycle API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description =
        Some("Registration, verification, login, and two-factor".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service health".to_string());

    let mut base = cargo_openapi();
    base.tags = Some(vec![service_tag, auth_tag, health_tag]);

    OpenApiRouter::with_openapi(base)
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::register::verify_otp))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::password_reset::forgot_password))
        .routes(routes!(auth::password_reset::reset_password))
        .routes(routes!(auth::password_reset::change_password))
        .routes(routes!(auth::profile::me))
        .routes(routes!(auth::profile::delete_account))
        .routes(routes!(auth::two_factor::enable_two_factor))
        .routes(routes!(auth::two_factor::verify_two_factor_setup))
        .routes(routes!(auth::two_factor::disable_two_factor))
        .routes(routes!(auth::two_factor::verify_two_factor_login))
        .routes(routes!(auth::two_factor::send_two_factor_login_otp))
        .routes(routes!(auth::two_factor::verify_two_factor_login_otp))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact.expect("contact from authors");
        assert_eq!(contact.name.as_deref(), Some("Team TalentGate"));
        assert_eq!(contact.email.as_deref(), Some("team@talentgate.dev"));

        let license = spec.info.license.expect("license from manifest");
        assert_eq!(license.name, "BSD-3-Clause");
    }

    #[test]
    fn openapi_documents_the_auth_surface() {
        let spec = openapi();
        for path in [
            "/v1/auth/register",
            "/v1/auth/verify-otp",
            "/v1/auth/login",
            "/v1/auth/forgot-password",
            "/v1/auth/reset-password",
            "/v1/auth/change-password",
            "/v1/auth/me",
            "/v1/auth/delete-account",
            "/v1/auth/enable-2fa",
            "/v1/auth/verify-2fa-setup",
            "/v1/auth/disable-2fa",
            "/v1/auth/verify-2fa-login",
            "/v1/auth/send-2fa-login-otp",
            "/v1/auth/verify-2fa-login-otp",
            "/health",
        ] {
            assert!(
                spec.paths.paths.contains_key(path),
                "missing path in spec: {path}"
            );
        }
    }

    #[test]
    fn openapi_tags_present() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "talentgate"));
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "health"));
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Ada <ada@example.com>"),
            (Some("Ada"), Some("ada@example.com"))
        );
        assert_eq!(parse_author("Ada"), (Some("Ada"), None));
        assert_eq!(parse_author("<ada@example.com>"), (None, Some("ada@example.com")));
    }
}
