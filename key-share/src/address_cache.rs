//! Address cache: a node's local record of derived child addresses, §6.
//!
//! Purely a read-through cache over [`wallet_mpc_eth::derive_tweak`] — every
//! entry is independently recomputable from `pk_master`, so this file can be
//! deleted or rebuilt without losing anything.

use std::collections::BTreeMap;

use wallet_mpc_curve::Point;
use wallet_mpc_eth::{address_from_public_key, bip44_path, derive_tweak, eip55_checksum};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AddressEntry {
    pub path: String,
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub pubkey: Point,
    pub address: String,
    pub derived_at: String,
}

/// `{ pkMaster, derivationRoot, entries: { index → entry } }`, §6.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AddressCache {
    #[serde(with = "wallet_mpc_curve::serde_point")]
    pub pk_master: Point,
    pub derivation_root: String,
    pub entries: BTreeMap<u32, AddressEntry>,
}

impl AddressCache {
    pub fn new(pk_master: Point) -> Self {
        AddressCache {
            pk_master,
            derivation_root: "m/44'/60'/0'/0".to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Return the cached entry for `index`, deriving and inserting it first
    /// if absent. `derived_at` is supplied by the caller since this crate
    /// has no wall-clock access of its own.
    pub fn get_or_derive(
        &mut self,
        chain_code: &[u8; 32],
        index: u32,
        now: impl FnOnce() -> String,
    ) -> &AddressEntry {
        if !self.entries.contains_key(&index) {
            let tweak = derive_tweak(&self.pk_master, chain_code, index);
            let address = eip55_checksum(&address_from_public_key(&tweak.child_public_key));
            self.entries.insert(
                index,
                AddressEntry {
                    path: bip44_path(index),
                    pubkey: tweak.child_public_key,
                    address,
                    derived_at: now(),
                },
            );
        }
        &self.entries[&index]
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
