use runtime_core::crypto::HeaderCipher;
use runtime_core::model::HeaderValue;

#[test]
fn plain_header_values_pass_through_unchanged() {
    let cipher = HeaderCipher::from_key_material("test-secret");
    let value = HeaderValue::Plain("application/json".to_string());
    assert_eq!(cipher.decrypt(&value).unwrap(), "application/json");
}

#[test]
fn encrypted_header_values_round_trip() {
    let cipher = HeaderCipher::from_key_material("test-secret");
    let secret = "Bearer sk-very-secret-token";

    let encrypted = cipher.encrypt(secret).unwrap();
    assert!(matches!(encrypted, HeaderValue::Encrypted { .. }));

    let decrypted = cipher.decrypt(&encrypted).unwrap();
    assert_eq!(decrypted, secret);
}

#[test]
fn ciphertext_is_not_the_plaintext() {
    let cipher = HeaderCipher::from_key_material("test-secret");
    let encrypted = cipher.encrypt("authorization-value").unwrap();
    if let HeaderValue::Encrypted { ciphertext_b64, .. } = encrypted {
        assert_ne!(ciphertext_b64, "authorization-value");
    } else {
        panic!("expected encrypted variant");
    }
}

#[test]
fn different_keys_cannot_decrypt_each_others_ciphertext() {
    let cipher_a = HeaderCipher::from_key_material("key-a");
    let cipher_b = HeaderCipher::from_key_material("key-b");

    let encrypted = cipher_a.encrypt("top-secret").unwrap();
    assert!(cipher_b.decrypt(&encrypted).is_err());
}

#[test]
fn is_sensitive_header_matches_case_insensitively() {
    use runtime_core::model::is_sensitive_header;
    assert!(is_sensitive_header("Authorization"));
    assert!(is_sensitive_header("X-API-KEY"));
    assert!(is_sensitive_header("api-key"));
    assert!(is_sensitive_header("Token"));
    assert!(!is_sensitive_header("content-type"));
}
