/*!
 * Tests for placeholder tokens and reconciliation
 */

use yadtwai::placeholder::{self, TOKEN_LEN};
use yadtwai::translation::reconcile;

fn id(n: u8) -> String {
    format!("{:032x}", n)
}

#[test]
fn test_encode_shouldProduceFixedLengthTokens() {
    let token = placeholder::encode(&id(7));
    assert_eq!(token.len(), TOKEN_LEN);
    assert_eq!(token, format!("<||img_placeholder_{}||>", id(7)));
}

#[test]
fn test_newId_shouldBeLowercaseHex() {
    let fresh = placeholder::new_id();
    assert_eq!(fresh.len(), 32);
    assert!(fresh.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_ne!(fresh, placeholder::new_id());
}

#[test]
fn test_findAll_shouldIgnoreMalformedTokens() {
    let text = format!(
        "a {} b <||img_placeholder_XYZ||> c {}",
        placeholder::encode(&id(1)),
        placeholder::encode(&id(2))
    );
    let ids: Vec<String> = placeholder::find_all(&text).into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![id(1), id(2)]);
}

#[test]
fn test_isInsideToken_shouldExcludeEdges() {
    let text = format!("ab{}cd", placeholder::encode(&id(3)));
    assert!(!placeholder::is_inside_token(&text, 2));
    assert!(placeholder::is_inside_token(&text, 3));
    assert!(!placeholder::is_inside_token(&text, 2 + TOKEN_LEN));
}

#[test]
fn test_reconcile_shouldStripHallucinatedIds() {
    let original = format!(
        "One {} two {} three {}",
        placeholder::encode(&id(0xa)),
        placeholder::encode(&id(0xb)),
        placeholder::encode(&id(0xc))
    );
    let translated = format!(
        "Uno {} dos {} tres {} extra {}",
        placeholder::encode(&id(0xa)),
        placeholder::encode(&id(0xb)),
        placeholder::encode(&id(0xc)),
        placeholder::encode(&id(0xd))
    );

    let reconciled = reconcile(&original, &translated);
    assert_eq!(placeholder::id_set(&reconciled.text), placeholder::id_set(&original));
    assert!(reconciled.stripped.contains(&id(0xd)));
    let warning = reconciled.warning.expect("hallucinated token must warn");
    assert!(warning.contains("stripped 1"));
}

#[test]
fn test_reconcile_shouldWarnWhenTokensGoMissing() {
    let original = format!("x {} y {}", placeholder::encode(&id(1)), placeholder::encode(&id(2)));
    let translated = format!("x {} y", placeholder::encode(&id(1)));

    let reconciled = reconcile(&original, &translated);
    assert_eq!(reconciled.text, translated);
    let warning = reconciled.warning.expect("missing token must warn");
    assert!(warning.contains(&id(2)));
}
