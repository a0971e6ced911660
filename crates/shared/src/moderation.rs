//! Chat content policy: pure checks applied to message bodies before they
//! are accepted, on the client and again on the server.
//!
//! Detection is heuristic. It favors catching the common ways people write
//! phone numbers and e-mail addresses over completeness; a message is never
//! silently dropped, rejection always carries the policy message.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const MAX_MESSAGE_CHARS: usize = 2000;

pub const PHONE_MASK: &str = "[numéro masqué]";
pub const EMAIL_MASK: &str = "[e-mail masqué]";

// Nine or more digits, optionally prefixed with '+', each pair of digits
// separated by at most one space, dot or dash. Nine keeps ISO dates and
// prices out of scope while still catching local and international numbers.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d(?:[\s.\-]?\d){8,}").expect("phone pattern"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9][A-Za-z0-9._%+\-]*@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
        .expect("email pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Phone,
    Email,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessagePolicyError {
    #[error("Le message est vide.")]
    Empty,
    #[error("Le message dépasse {max} caractères.", max = MAX_MESSAGE_CHARS)]
    TooLong,
    #[error("Le partage de coordonnées (téléphone, e-mail) n'est pas autorisé dans le chat.")]
    ContactSharing(ContactKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    pub redacted: bool,
}

/// Best-effort scan for contact information. E-mail wins when both appear.
pub fn find_contact_info(text: &str) -> Option<ContactKind> {
    if EMAIL_RE.is_match(text) {
        return Some(ContactKind::Email);
    }
    if PHONE_RE.is_match(text) {
        return Some(ContactKind::Phone);
    }
    None
}

/// Accepts or rejects a message body. Rejections carry the user-facing
/// French message via `Display`.
pub fn validate_message(text: &str) -> Result<(), MessagePolicyError> {
    if text.trim().is_empty() {
        return Err(MessagePolicyError::Empty);
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(MessagePolicyError::TooLong);
    }
    if let Some(kind) = find_contact_info(text) {
        return Err(MessagePolicyError::ContactSharing(kind));
    }
    Ok(())
}

/// Masks contact information in place, leaving the rest of the message
/// untouched. E-mails are masked before phones so digits inside an address
/// are not double-counted.
pub fn sanitize_message(text: &str) -> Sanitized {
    let after_email = EMAIL_RE.replace_all(text, EMAIL_MASK);
    let after_phone = PHONE_RE.replace_all(&after_email, PHONE_MASK);
    let redacted = after_phone != text;
    Sanitized {
        text: after_phone.into_owned(),
        redacted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn international_phone_is_rejected() {
        let err = validate_message("Appelez-moi au +225 07 00 00 00 00").expect_err("rejected");
        assert_eq!(err, MessagePolicyError::ContactSharing(ContactKind::Phone));
    }

    #[test]
    fn plain_digit_grouping_is_rejected() {
        let err = validate_message("Mon numéro est 0700000000").expect_err("rejected");
        assert_eq!(err, MessagePolicyError::ContactSharing(ContactKind::Phone));
    }

    #[test]
    fn punctuated_digit_grouping_is_rejected() {
        let err = validate_message("Joignable au 07.07.07.07.07").expect_err("rejected");
        assert_eq!(err, MessagePolicyError::ContactSharing(ContactKind::Phone));
    }

    #[test]
    fn email_is_rejected() {
        let err = validate_message("Écrivez-moi sur jean@example.com").expect_err("rejected");
        assert_eq!(err, MessagePolicyError::ContactSharing(ContactKind::Email));
    }

    #[test]
    fn rejection_carries_the_policy_message() {
        let err = validate_message("jean@example.com").expect_err("rejected");
        assert!(err.to_string().contains("partage de coordonnées"));
    }

    #[test]
    fn ordinary_message_passes() {
        assert_eq!(validate_message("Bonjour, je suis disponible demain"), Ok(()));
    }

    #[test]
    fn prices_and_dates_are_not_phones() {
        assert_eq!(validate_message("Le total est 150 000 FCFA"), Ok(()));
        assert_eq!(validate_message("Disponible le 2025-06-14"), Ok(()));
    }

    #[test]
    fn empty_and_oversized_messages_are_rejected() {
        assert_eq!(validate_message("   "), Err(MessagePolicyError::Empty));
        let long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(validate_message(&long), Err(MessagePolicyError::TooLong));
    }

    #[test]
    fn sanitize_masks_phone_in_place() {
        let out = sanitize_message("Appelez le +225 07 00 00 00 00 merci");
        assert_eq!(out.text, format!("Appelez le {PHONE_MASK} merci"));
        assert!(out.redacted);
    }

    #[test]
    fn sanitize_masks_email_in_place() {
        let out = sanitize_message("Contact : jean@example.com svp");
        assert_eq!(out.text, format!("Contact : {EMAIL_MASK} svp"));
        assert!(out.redacted);
    }

    #[test]
    fn sanitize_leaves_clean_text_alone() {
        let out = sanitize_message("Bonjour, je suis disponible demain");
        assert_eq!(out.text, "Bonjour, je suis disponible demain");
        assert!(!out.redacted);
    }

    #[test]
    fn sanitize_masks_both_kinds_in_one_message() {
        let out = sanitize_message("0700000000 ou jean@example.com");
        assert_eq!(out.text, format!("{PHONE_MASK} ou {EMAIL_MASK}"));
        assert!(out.redacted);
    }
}
