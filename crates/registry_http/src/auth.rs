//! Authorization Gate (C7): resolves caller identity from whatever credential form
//! arrived (JWT bearer, long-lived token as bearer, long-lived token as Basic
//! password, or plain username+password) and applies the per-verb, per-project
//! admission rules in §4.7.
use base64::Engine;
use http::{header, HeaderMap};
use nom::{
    bytes::complete::{tag_no_case, take_while, take_while1},
    character::is_space,
    combinator::map_res,
    IResult,
};

use registry_core::collab::{Identity, ProjectService, UserService, Verb};

#[derive(Debug, Eq, PartialEq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

fn skip_whitespace(input: &[u8]) -> &[u8] {
    let (input, _) = take_while::<_, _, ()>(is_space)(input).expect("infallible");
    input
}

fn basic_auth_value(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let input = skip_whitespace(input);
    let (input, _) = tag_no_case("basic")(input)?;
    let input = skip_whitespace(input);
    map_res(take_while1(|c: u8| !c.is_ascii_whitespace()), |raw: &[u8]| {
        base64::prelude::BASE64_STANDARD.decode(raw)
    })(input)
}

/// Parse an `Authorization: Basic <base64(username:password)>` header value.
pub fn basic_auth(input: &[u8]) -> Option<BasicCredentials> {
    let (_, decoded) = basic_auth_value(input).ok()?;
    let idx = decoded.iter().position(|&c| c == b':')?;
    Some(BasicCredentials {
        username: String::from_utf8(decoded[..idx].to_vec()).ok()?,
        password: String::from_utf8(decoded[idx + 1..].to_vec()).ok()?,
    })
}

/// Resolve the caller's [`Identity`] from the request's `Authorization` header,
/// accepting a bearer token (JWT or long-lived-token-as-bearer) or HTTP Basic
/// credentials where the password may itself be a long-lived token or an actual
/// password (§9 "mixed credential forms").
pub async fn extract_identity(headers: &HeaderMap, users: &dyn UserService) -> Option<Identity> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let trimmed = raw.trim_start();
    if let Some(token) = trimmed.strip_prefix("Bearer ").or_else(|| trimmed.strip_prefix("bearer ")) {
        return users.validate_bearer(token.trim()).await;
    }
    let creds = basic_auth(raw.as_bytes())?;
    if let Some(identity) = users.validate_long_lived_token(&creds.password).await {
        return Some(identity);
    }
    let pair = users.login_password(&creds.username, &creds.password).await?;
    users.validate_bearer(&pair.token).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Deny,
    /// §4.7 step 3: pull against a project the authorization gate has never heard
    /// of. Distinct from `Deny` -- this is a 404, not a 401 challenge, since the
    /// resource simply isn't there rather than being withheld from this caller.
    NotFound,
}

/// Apply §4.7's resolution order for one `(identity, project, verb)` triple.
pub async fn authorize(
    identity: Option<&Identity>,
    projects: &dyn ProjectService,
    repository: &str,
    verb: Verb,
    dev_mode: bool,
) -> Decision {
    let identity = match identity {
        Some(identity) => identity,
        None => {
            // §4.7 step 1: no upstream-resolved identity. Only an explicit
            // single-machine dev mode admits unauthenticated callers.
            return if dev_mode { Decision::Admit } else { Decision::Deny };
        }
    };

    // §4.7 step 2: long-lived-token scopes (or the absence of a restriction) gate
    // the verb before project membership is even consulted.
    if !identity.permits(verb) {
        return Decision::Deny;
    }

    let slug = repository.split('/').next().unwrap_or(repository);
    match projects.get_by_name(slug).await {
        None => {
            // §4.7 step 3: push implicitly creates a project; pull against an
            // unknown project is a not-found, not an authorization question, but
            // the gate can't tell those apart without a lookup -- deny here and
            // let the dispatcher turn an allowed push into project creation.
            if verb == Verb::Push {
                Decision::Admit
            } else {
                Decision::NotFound
            }
        }
        Some(project) => {
            if project.is_public && verb == Verb::Pull {
                return Decision::Admit;
            }
            if project.owner_id == identity.user_id {
                Decision::Admit
            } else {
                Decision::Deny
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_auth_header() {
        let creds = basic_auth(b"Basic YWxhZGRpbjpvcGVuc2VzYW1l").unwrap();
        assert_eq!(creds.username, "aladdin");
        assert_eq!(creds.password, "opensesame");
    }

    #[test]
    fn rejects_non_basic_scheme() {
        assert!(basic_auth(b"Bearer abc.def.ghi").is_none());
    }
}
