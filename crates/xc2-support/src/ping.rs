//! ICMP reachability check — `spec.md` §1 Non-goals "ICMP ping utility".
//!
//! Live ICMP needs raw sockets/elevated privileges that don't belong in this crate; the
//! trait exists so a caller can wire in whatever ICMP library fits its deployment without
//! this crate depending on one.

#[async_trait::async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, host: &str) -> bool;
}
