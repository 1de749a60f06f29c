//! Token data model and opaque token generation.
//!
//! Tokens are opaque lookups, not signed claims (spec §9) — this avoids key
//! rotation and gives instantaneous revocation, at the cost of one store
//! round-trip per check.

use chrono::{DateTime, Utc};

use crate::scope::{EntityScope, EntityType};

/// A persisted, opaque bearer token.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    /// Opaque identifier: universally unique, time-sortable. Primary key.
    pub token: String,
    /// Caller-supplied human label; not unique.
    pub name: String,
    /// The principal this token acts as.
    pub entity_type: EntityType,
    pub entity_id: i64,
    /// Captured at issuance; immutable for the token's lifetime.
    pub scopes: Vec<EntityScope>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Token {
    /// `now >= expires_at` is treated as expired (inclusive on the expired
    /// side — spec §8's own recommendation, resolving the ambiguity spec §9
    /// flags).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn head(&self) -> TokenHead {
        TokenHead {
            token_id: self.token.clone(),
            name: self.name.clone(),
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// A non-secret summary of a [`Token`] — returned by
/// [`crate::vending::VendingMachine::list_tokens_for_entity`]. The opaque
/// token string must never leave the machine after issuance (spec §9), so
/// this type deliberately has no `token` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHead {
    pub token_id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Crockford base32 alphabet (omits `I`, `L`, `O`, `U` to avoid visual
/// confusion), the ULID encoding. Unlike the standard base64url alphabet,
/// this alphabet's ASCII byte order matches its value order (digits `0`-`9`
/// all sort below letters `A`-`Z`, and within each run the letters are
/// listed in ascending order) — required so that encoding a
/// lexicographically-increasing byte sequence (our millisecond-prefixed
/// tokens) always produces a lexicographically-increasing string. A plain
/// base64url alphabet does not have this property (e.g. raw value 51→52 is
/// `z`(0x7A)→`0`(0x30), a decrease), which silently breaks the
/// "time-sortable" invariant spec §3 asks for.
const ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

fn base32_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits_in_buffer: u32 = 0;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = (buffer >> bits_in_buffer) & 0x1F;
            result.push(ALPHABET[index as usize] as char);
        }
        buffer &= (1 << bits_in_buffer) - 1;
    }
    if bits_in_buffer > 0 {
        let index = (buffer << (5 - bits_in_buffer)) & 0x1F;
        result.push(ALPHABET[index as usize] as char);
    }
    result
}

/// Generate a fresh opaque token: 8 bytes of big-endian millisecond
/// timestamp followed by 16 random bytes, Crockford-base32-encoded. Every
/// token has the same encoded length (fixed-size input), so the leading
/// timestamp bytes make tokens issued later sort after tokens issued
/// earlier as plain strings — the "time-sortable" property spec §3 asks
/// for, without requiring a dedicated ULID dependency the rest of this
/// crate's stack has no other use for.
pub fn generate_token(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis() as u64;
    let mut bytes = [0u8; 24];
    bytes[0..8].copy_from_slice(&millis.to_be_bytes());
    getrandom::getrandom(&mut bytes[8..]).expect("failed to generate random bytes");
    base32_encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    #[test]
    fn encoding_is_strictly_increasing_across_every_adjacent_byte_boundary() {
        // Exercise every possible single-byte increment at the position a
        // millisecond tick actually changes (the timestamp prefix's
        // lowest-order byte). The old base64url alphabet failed at the
        // 51->52 boundary specifically; checking all 255 boundaries here
        // instead of relying on wall-clock jitter makes this deterministic
        // and would have caught that regression outright.
        for b in 0u8..=254 {
            let mut low = [0u8; 24];
            let mut high = [0u8; 24];
            low[7] = b;
            high[7] = b + 1;
            assert!(
                base32_encode(&low) < base32_encode(&high),
                "encoding did not increase across byte boundary {b} -> {}",
                b + 1
            );
        }
    }

    #[test]
    fn encoding_is_strictly_increasing_across_a_carry() {
        let mut low = [0u8; 24];
        let mut high = [0u8; 24];
        low[6] = 0;
        low[7] = 255;
        high[6] = 1;
        high[7] = 0;
        assert!(base32_encode(&low) < base32_encode(&high));
    }

    #[test]
    fn tokens_issued_later_sort_after_earlier_tokens() {
        let t1 = generate_token(Utc::now());
        let t2 = generate_token(Utc::now() + chrono::Duration::milliseconds(5));
        assert!(t1 < t2);
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let token = Token {
            token: "x".into(),
            name: "n".into(),
            entity_type: EntityType::User,
            entity_id: 1,
            scopes: vec![EntityScope::new(EntityType::User, 1, Scope::Read)],
            expires_at: now,
            created_at: now - chrono::Duration::hours(1),
        };
        assert!(token.is_expired_at(now));
        assert!(token.is_expired_at(now + chrono::Duration::milliseconds(1)));
        assert!(!token.is_expired_at(now - chrono::Duration::milliseconds(1)));
    }
}
