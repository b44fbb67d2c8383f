use ulid::Ulid;

pub const CONFIRMATION_PREFIX: &str = "CI";
/// Hex digits after the prefix.
pub const CONFIRMATION_DIGITS: usize = 12;
pub const CONFIRMATION_LEN: usize = CONFIRMATION_PREFIX.len() + CONFIRMATION_DIGITS;

/// Produces public confirmation tokens. Uniqueness is checked by the engine,
/// which retries a bounded number of times on collision.
pub trait ConfirmationIds: Send + Sync {
    fn generate(&self) -> String;
}

/// `CI` followed by 48 bits of ULID randomness as uppercase hex.
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidConfirmationIds;

impl ConfirmationIds for UlidConfirmationIds {
    fn generate(&self) -> String {
        let bits = Ulid::new().random() & 0xFFFF_FFFF_FFFF;
        format!("{CONFIRMATION_PREFIX}{bits:012X}")
    }
}

/// Whether `s` has the shape of a confirmation id.
pub fn is_well_formed(s: &str) -> bool {
    s.len() == CONFIRMATION_LEN
        && s.starts_with(CONFIRMATION_PREFIX)
        && s[CONFIRMATION_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_well_formed() {
        let ids = UlidConfirmationIds;
        for _ in 0..100 {
            let id = ids.generate();
            assert!(is_well_formed(&id), "bad id: {id}");
        }
    }

    #[test]
    fn generated_ids_are_distinct() {
        let ids = UlidConfirmationIds;
        let seen: HashSet<String> = (0..1000).map(|_| ids.generate()).collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn well_formed_rejects_bad_shapes() {
        assert!(is_well_formed("CI0123456789AB"));
        assert!(!is_well_formed("CI0123456789ab")); // lowercase
        assert!(!is_well_formed("XX0123456789AB"));
        assert!(!is_well_formed("CI0123"));
        assert!(!is_well_formed("CI0123456789ABC"));
    }
}
