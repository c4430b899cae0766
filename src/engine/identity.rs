use serde::Serialize;

pub const ANONYMOUS: &str = "Anonymous";

/// Who a session is, once logged in. Never changes after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(username: String, email: Option<String>, verified_names: &[String]) -> Identity {
        let verified = is_verified(&username, verified_names);
        Identity { username, verified, email }
    }

    /// Stand-in shown to everyone inside anonymous rooms.
    pub fn anonymous() -> Identity {
        Identity {
            username: ANONYMOUS.to_owned(),
            verified: false,
            email: None,
        }
    }
}

/// A name is verified when it contains any allow-listed entry, so "Aaronson" counts as "Aaron".
pub fn is_verified(username: &str, verified_names: &[String]) -> bool {
    verified_names
        .iter()
        .any(|entry| !entry.is_empty() && username.contains(entry.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["Aaron".to_owned(), "Developer".to_owned()]
    }

    #[test]
    fn substring_matches_are_verified() {
        assert!(is_verified("Aaron", &names()));
        assert!(is_verified("Aaronson", &names()));
        assert!(is_verified("TheDeveloper99", &names()));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!is_verified("aaron", &names()));
        assert!(!is_verified("Bob", &names()));
        assert!(!is_verified("Bob", &[]));
    }

    #[test]
    fn unverified_flag_is_omitted_on_the_wire() {
        let bob = Identity::new("Bob".to_owned(), None, &names());
        assert_eq!(serde_json::to_value(&bob).unwrap(), serde_json::json!({ "username": "Bob" }));

        let aaron = Identity::new("Aaron".to_owned(), Some("a@b.c".to_owned()), &names());
        assert_eq!(
            serde_json::to_value(&aaron).unwrap(),
            serde_json::json!({ "username": "Aaron", "verified": true, "email": "a@b.c" })
        );
    }
}
