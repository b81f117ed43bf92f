use dashmap::DashSet;
use pnet::util::MacAddr;

/// Hardware addresses that are never inspected or blocked.
///
/// Populated once at startup from `--trust` and only read afterwards, so a
/// sharded set keeps lookups on the packet path uncontended.
#[derive(Debug, Default)]
pub struct TrustRegistry {
    macs: DashSet<MacAddr>,
}

impl TrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `mac` to the registry. Returns `false` if it was already trusted.
    pub fn add(&self, mac: MacAddr) -> bool {
        self.macs.insert(mac)
    }

    pub fn is_trusted(&self, mac: &MacAddr) -> bool {
        self.macs.contains(mac)
    }

    pub fn len(&self) -> usize {
        self.macs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macs.is_empty()
    }
}

impl FromIterator<MacAddr> for TrustRegistry {
    fn from_iter<I: IntoIterator<Item = MacAddr>>(iter: I) -> Self {
        let registry = Self::new();
        for mac in iter {
            registry.add(mac);
        }
        registry
    }
}
