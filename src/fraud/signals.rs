use sha2::{Digest, Sha256};

/// External observations the engine cannot derive from its own history:
/// wallet age, on-chain activity, content/image checks.
pub trait SignalSource: Send + Sync {
    /// Seconds since the address's first transaction.
    fn wallet_age_secs(&self, address: &str) -> u64;
    /// Lifetime transaction count of the address.
    fn transaction_count(&self, address: &str) -> u64;
    /// Similarity of the listing text to known events, 0.0..1.0.
    fn content_similarity(&self, title: &str, description: &str) -> f64;
    /// Whether reverse image search matched stock or stolen imagery.
    fn image_flagged(&self, image_url: &str) -> bool;
}

/// Deterministic stand-in signals derived from SHA-256 of the input.
/// The same address or listing always yields the same values, which keeps
/// demo runs and tests reproducible until real data sources are wired in.
pub struct SyntheticSignals;

impl SyntheticSignals {
    fn derive(domain: &str, input: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(domain.as_bytes());
        hasher.update(b":");
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl SignalSource for SyntheticSignals {
    fn wallet_age_secs(&self, address: &str) -> u64 {
        // up to one year
        Self::derive("wallet_age", &address.to_lowercase()) % 31_536_000
    }

    fn transaction_count(&self, address: &str) -> u64 {
        Self::derive("tx_count", &address.to_lowercase()) % 1_000
    }

    fn content_similarity(&self, title: &str, description: &str) -> f64 {
        let input = format!("{title}\n{description}");
        (Self::derive("content", &input) % 10_000) as f64 / 10_000.0
    }

    fn image_flagged(&self, image_url: &str) -> bool {
        Self::derive("image", image_url) % 100 >= 80
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_are_deterministic() {
        let s = SyntheticSignals;
        let addr = "0xAbC0000000000000000000000000000000000001";
        assert_eq!(s.wallet_age_secs(addr), s.wallet_age_secs(addr));
        assert_eq!(s.transaction_count(addr), s.transaction_count(addr));
        assert_eq!(
            s.content_similarity("Tech Conf", "desc"),
            s.content_similarity("Tech Conf", "desc")
        );
        assert_eq!(s.image_flagged("/img/a.png"), s.image_flagged("/img/a.png"));
    }

    #[test]
    fn signals_ignore_address_case() {
        let s = SyntheticSignals;
        assert_eq!(
            s.wallet_age_secs("0xABCDEF0000000000000000000000000000000001"),
            s.wallet_age_secs("0xabcdef0000000000000000000000000000000001"),
        );
    }

    #[test]
    fn signals_stay_in_range() {
        let s = SyntheticSignals;
        for i in 0..32 {
            let addr = format!("0x{i:040x}");
            assert!(s.wallet_age_secs(&addr) < 31_536_000);
            assert!(s.transaction_count(&addr) < 1_000);
            let sim = s.content_similarity(&addr, "body");
            assert!((0.0..1.0).contains(&sim));
        }
    }

    #[test]
    fn different_inputs_diverge() {
        let s = SyntheticSignals;
        // Not a collision proof, just a sanity check that the domains
        // and inputs actually feed the digest.
        let a = s.wallet_age_secs("0x0000000000000000000000000000000000000001");
        let b = s.wallet_age_secs("0x0000000000000000000000000000000000000002");
        let c = s.transaction_count("0x0000000000000000000000000000000000000001");
        assert!(a != b || a != c);
    }
}
