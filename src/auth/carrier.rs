//! Transport of `(identifier, signature)` pairs.
//!
//! Everything here works on named values (cookie pairs, query parameters)
//! and header strings; the HTTP layer does the extraction and the writing.

use crate::auth::signature::Signature;
use std::{collections::HashMap, fmt};

/// Query parameter naming the user by id.
pub const PARAM_USERID: &str = "userid";
/// Query parameter naming the user by username.
///
/// The listing routes use the same name as an owner filter, so
/// `?username=bob&sig=...` is a claim to be bob, not a filtered listing for
/// someone else. Clients filtering by another user sign with `userid`, which
/// takes precedence over `username`.
pub const PARAM_USERNAME: &str = "username";
/// Query parameter holding the signature.
pub const PARAM_SIGNATURE: &str = "sig";

const VALUE_SEPARATOR: char = '|';

/// A user named by id or by username.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserRef {
    /// `user.userid`.
    Id(i64),
    /// `user.username`.
    Name(String),
}

impl UserRef {
    /// Numeric strings are ids, anything else non-empty is a username.
    pub fn parse(raw: &str) -> Option<UserRef> {
        if raw.is_empty() {
            None
        } else if let Ok(id) = raw.parse::<i64>() {
            Some(UserRef::Id(id))
        } else {
            Some(UserRef::Name(raw.to_string()))
        }
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Id(id) => write!(f, "#{}", id),
            UserRef::Name(name) => f.write_str(name),
        }
    }
}

/// One identifier with the signature presented for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Who the signature claims to be.
    pub user: UserRef,
    /// The signature as presented, not yet checked.
    pub signature: String,
}

/// Where a request's credentials came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// `userid` or `username` plus `sig` in the query string.
    Explicit,
    /// The login cookie.
    Cookie,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Explicit => f.write_str("explicit credentials"),
            CredentialSource::Cookie => f.write_str("login cookie"),
        }
    }
}

/// Credentials found on one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialCarrier {
    /// Query string credentials.
    pub explicit: Option<Credentials>,
    /// Login cookie credentials.
    pub cookie: Option<Credentials>,
}

impl CredentialCarrier {
    /// Reads explicit credentials from `params` and the login cookie named
    /// `cookie_name` from `cookies`.
    pub fn from_named_values(
        params: &HashMap<String, String>,
        cookies: &HashMap<String, String>,
        cookie_name: &str,
    ) -> CredentialCarrier {
        CredentialCarrier {
            explicit: explicit_credentials(params),
            cookie: cookies.get(cookie_name).and_then(|v| decode_cookie_value(v)),
        }
    }

    /// Explicit credentials win over the cookie whenever both an identifier
    /// and a signature were supplied.
    pub fn credentials(&self) -> Option<(&Credentials, CredentialSource)> {
        match (&self.explicit, &self.cookie) {
            (Some(explicit), _) => Some((explicit, CredentialSource::Explicit)),
            (None, Some(cookie)) => Some((cookie, CredentialSource::Cookie)),
            (None, None) => None,
        }
    }
}

// A usable `userid` wins; an unparsable one falls through to `username`.
fn explicit_credentials(params: &HashMap<String, String>) -> Option<Credentials> {
    let signature = params.get(PARAM_SIGNATURE).filter(|s| !s.is_empty())?;
    let user = params
        .get(PARAM_USERID)
        .and_then(|id| id.parse().ok())
        .map(UserRef::Id)
        .or_else(|| {
            params
                .get(PARAM_USERNAME)
                .filter(|u| !u.is_empty())
                .map(|u| UserRef::Name(u.clone()))
        })?;
    Some(Credentials {
        user,
        signature: signature.clone(),
    })
}

/// Encodes `<userid>|<signature>` for use as a cookie value. Signatures are
/// PHC strings whose `,` is not a legal cookie character.
pub fn encode_cookie_value(user_id: i64, signature: &Signature) -> String {
    urlencoding::encode(&format!("{}{}{}", user_id, VALUE_SEPARATOR, signature)).into_owned()
}

/// Inverse of [`encode_cookie_value`]. Values without a signature part are
/// incomplete and yield nothing.
pub fn decode_cookie_value(value: &str) -> Option<Credentials> {
    let decoded = urlencoding::decode(value).ok()?;
    let (user, signature) = decoded.split_once(VALUE_SEPARATOR)?;
    if signature.is_empty() {
        return None;
    }
    Some(Credentials {
        user: UserRef::parse(user)?,
        signature: signature.to_string(),
    })
}

/// `Set-Cookie` value storing the login carrier. No expiry: the signature
/// lives until the password changes.
pub fn login_cookie(cookie_name: &str, secure: bool, user_id: i64, signature: &Signature) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; SameSite=Lax",
        cookie_name,
        encode_cookie_value(user_id, signature)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the login carrier.
pub fn logout_cookie(cookie_name: &str) -> String {
    format!("{}=; Path=/; Max-Age=0", cookie_name)
}

/// Splits a `Cookie` header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|cookie_pair| {
            let (name, value) = cookie_pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Splits a query string into decoded name/value pairs. `+` is a space.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = urlencoding::decode(&name.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHC: &str = "$argon2id$v=19$m=64,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2g";

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn should_parse_user_refs() {
        assert_eq!(UserRef::parse("12"), Some(UserRef::Id(12)));
        assert_eq!(UserRef::parse("alice"), Some(UserRef::Name("alice".to_string())));
        assert_eq!(UserRef::parse(""), None);
    }

    #[test]
    fn should_round_trip_cookie_value_with_phc_characters() {
        let sig = Signature::from(PHC.to_string());
        let value = encode_cookie_value(7, &sig);
        assert!(!value.contains(',') && !value.contains(';') && !value.contains('$'));
        assert_eq!(
            decode_cookie_value(&value),
            Some(Credentials {
                user: UserRef::Id(7),
                signature: PHC.to_string(),
            })
        );
    }

    #[test]
    fn should_read_username_cookie_layout() {
        let creds = decode_cookie_value("alice|tok").unwrap();
        assert_eq!(creds.user, UserRef::Name("alice".to_string()));
        assert_eq!(creds.signature, "tok");
    }

    #[test]
    fn should_ignore_incomplete_cookie_values() {
        assert_eq!(decode_cookie_value("7"), None);
        assert_eq!(decode_cookie_value("7|"), None);
        assert_eq!(decode_cookie_value("|sig"), None);
        assert_eq!(decode_cookie_value(""), None);
    }

    #[test]
    fn should_parse_cookies_from_header() {
        let cookie_map = parse_cookie_header(
            "guest_id=5356763797944027; \
            useridtok=2%7C%24argon2id%24v%3D19; \
            lang=en",
        );
        assert_eq!(cookie_map.get("guest_id"), Some(&"5356763797944027".to_string()));
        assert_eq!(
            cookie_map.get("useridtok"),
            Some(&"2%7C%24argon2id%24v%3D19".to_string())
        );
        assert_eq!(cookie_map.get("lang"), Some(&"en".to_string()));
        assert!(parse_cookie_header("").is_empty());
    }

    #[test]
    fn should_keep_equal_signs_inside_cookie_values() {
        let cookie_map = parse_cookie_header("tok=a=b=c");
        assert_eq!(cookie_map.get("tok"), Some(&"a=b=c".to_string()));
    }

    #[test]
    fn should_decode_query_parameters() {
        let params = parse_query("userid=2&sig=%24argon2id%24v%3D19%24m%3D64%2Ct%3D1&x=a+b");
        assert_eq!(params.get("userid"), Some(&"2".to_string()));
        assert_eq!(params.get("sig"), Some(&"$argon2id$v=19$m=64,t=1".to_string()));
        assert_eq!(params.get("x"), Some(&"a b".to_string()));
    }

    #[test]
    fn should_prefer_explicit_credentials_over_cookie() {
        let sig = Signature::from(PHC.to_string());
        let value = encode_cookie_value(3, &sig);
        let cookies = map(&[("useridtok", value.as_str())]);
        let params = map(&[("username", "alice"), ("sig", "abc")]);

        let carrier = CredentialCarrier::from_named_values(&params, &cookies, "useridtok");
        let (creds, source) = carrier.credentials().unwrap();
        assert_eq!(source, CredentialSource::Explicit);
        assert_eq!(creds.user, UserRef::Name("alice".to_string()));

        let carrier = CredentialCarrier::from_named_values(&HashMap::new(), &cookies, "useridtok");
        let (creds, source) = carrier.credentials().unwrap();
        assert_eq!(source, CredentialSource::Cookie);
        assert_eq!(creds.user, UserRef::Id(3));
    }

    #[test]
    fn should_require_identifier_and_signature_for_explicit_credentials() {
        let carrier = CredentialCarrier::from_named_values(
            &map(&[("userid", "2")]),
            &HashMap::new(),
            "useridtok",
        );
        assert_eq!(carrier.credentials(), None);

        let carrier = CredentialCarrier::from_named_values(
            &map(&[("sig", "abc")]),
            &HashMap::new(),
            "useridtok",
        );
        assert_eq!(carrier.credentials(), None);

        let carrier = CredentialCarrier::from_named_values(
            &map(&[("userid", "abc"), ("sig", "abc")]),
            &HashMap::new(),
            "useridtok",
        );
        assert_eq!(carrier.credentials(), None);
    }

    #[test]
    fn should_fall_back_to_username_when_userid_is_not_a_number() {
        let params = map(&[("userid", "abc"), ("username", "alice"), ("sig", "abc")]);
        let carrier = CredentialCarrier::from_named_values(&params, &HashMap::new(), "useridtok");
        let (creds, source) = carrier.credentials().unwrap();
        assert_eq!(source, CredentialSource::Explicit);
        assert_eq!(creds.user, UserRef::Name("alice".to_string()));
    }

    #[test]
    fn should_prefer_userid_over_username_filter() {
        // a listing filtered by bob, signed by user 2
        let params = map(&[("userid", "2"), ("username", "bob"), ("sig", "abc")]);
        let carrier = CredentialCarrier::from_named_values(&params, &HashMap::new(), "useridtok");
        let (creds, _) = carrier.credentials().unwrap();
        assert_eq!(creds.user, UserRef::Id(2));
    }

    #[test]
    fn should_build_login_and_logout_cookies() {
        let sig = Signature::from("s,ig".to_string());
        assert_eq!(
            login_cookie("useridtok", false, 2, &sig),
            "useridtok=2%7Cs%2Cig; Path=/; SameSite=Lax"
        );
        assert!(login_cookie("useridtok", true, 2, &sig).ends_with("; Secure"));
        assert_eq!(logout_cookie("useridtok"), "useridtok=; Path=/; Max-Age=0");
    }
}
