//! Per-block digital artifact statistics.
//!
//! One [`OrdpoolStats`] value exists per block hash. Counters and size aggregates map
//! onto columns of the aggregate row; the per-identifier activity of the token
//! families with their own tables ([`TokenFamily`]) lives in [`TokenActivity`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Rune id of UNCOMMON•GOODS, the open-mint rune excluded from "non uncommon" figures
pub const UNCOMMON_GOODS_RUNE_ID: &str = "1:0";

/// Aggregated statistics for a single block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdpoolStats {
    pub amounts: Amounts,
    pub fees: Fees,
    pub inscriptions: InscriptionSizes,
    pub runes: RuneStats,
    pub brc20: TokenStats,
    pub src20: TokenStats,
    /// Version of the analyser that produced these figures; 0 means "not analysed"
    pub version: u32,
}

/// Per-asset-class counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amounts {
    pub atomical: u32,
    pub atomical_mint: u32,
    pub atomical_transfer: u32,
    pub atomical_update: u32,

    pub cat21: u32,
    pub cat21_mint: u32,
    pub cat21_transfer: u32,

    pub inscription: u32,
    pub inscription_mint: u32,
    pub inscription_transfer: u32,
    pub inscription_burn: u32,

    pub rune: u32,
    pub rune_etch: u32,
    pub rune_mint: u32,
    pub rune_cenotaph: u32,
    pub rune_transfer: u32,
    pub rune_burn: u32,

    pub brc20: u32,
    pub brc20_deploy: u32,
    pub brc20_mint: u32,
    pub brc20_transfer: u32,

    pub src20: u32,
    pub src20_deploy: u32,
    pub src20_mint: u32,
    pub src20_transfer: u32,
}

/// Fee totals in satoshis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub rune_mints: u64,
    pub non_uncommon_rune_mints: u64,
    pub brc20_mints: u64,
    pub src20_mints: u64,
    pub cat21_mints: u64,
    pub atomicals: u64,
    pub inscription_mints: u64,
}

/// Inscription envelope and content size aggregates, in bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InscriptionSizes {
    pub total_envelope_size: u64,
    pub total_content_size: u64,
    pub largest_envelope_size: u64,
    pub largest_content_size: u64,
    pub largest_envelope_inscription_id: Option<String>,
    pub largest_content_inscription_id: Option<String>,
    pub average_envelope_size: u64,
    pub average_content_size: u64,
}

/// Mint counts and etch/deploy attempts keyed by token identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenActivity {
    /// identifier -> number of mints in this block
    pub mint_activity: HashMap<String, u64>,
    /// identifier -> txids of etch/deploy attempts, in order of appearance
    pub attempts: HashMap<String, Vec<String>>,
}

impl TokenActivity {
    pub fn record_mint(&mut self, identifier: &str) {
        *self.mint_activity.entry(identifier.to_string()).or_insert(0) += 1;
    }

    pub fn record_attempt(&mut self, identifier: &str, txid: &str) {
        self.attempts
            .entry(identifier.to_string())
            .or_default()
            .push(txid.to_string());
    }

    /// Identifier with the most mints; ties go to the lexicographically smallest id
    pub fn most_active_mint(&self, excluding: Option<&str>) -> Option<String> {
        self.mint_activity
            .iter()
            .filter(|(identifier, _)| Some(identifier.as_str()) != excluding)
            .max_by(|(a_id, a_count), (b_id, b_count)| {
                a_count.cmp(b_count).then_with(|| b_id.cmp(a_id))
            })
            .map(|(identifier, _)| identifier.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.mint_activity.is_empty() && self.attempts.is_empty()
    }
}

/// Rune-specific figures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuneStats {
    pub most_active_mint: Option<String>,
    pub most_active_non_uncommon_mint: Option<String>,
    pub activity: TokenActivity,
}

/// Figures shared by the ticker based token protocols (BRC-20, SRC-20)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    pub most_active_mint: Option<String>,
    pub activity: TokenActivity,
}

/// Token protocols whose per-identifier activity is persisted in dedicated tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFamily {
    Rune,
    Brc20,
    Src20,
}

/// How a family's activity rows are folded into a single string by the read query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEncoding {
    /// `k1,v1,k2,v2` - identifiers are ASCII and never contain commas
    Flat,
    /// `{"identifier":..,..},{..}` - identifiers are free-form Unicode tickers
    JsonFragments,
}

impl TokenFamily {
    pub const ALL: [TokenFamily; 3] = [TokenFamily::Rune, TokenFamily::Brc20, TokenFamily::Src20];

    /// Table holding `identifier -> count` rows
    pub fn mint_activity_table(&self) -> &'static str {
        match self {
            TokenFamily::Rune => "ordpool_stats_rune_mint_activity",
            TokenFamily::Brc20 => "ordpool_stats_brc20_mint_activity",
            TokenFamily::Src20 => "ordpool_stats_src20_mint_activity",
        }
    }

    /// Table holding `(identifier, txid)` etch/deploy attempt rows
    pub fn attempt_table(&self) -> &'static str {
        match self {
            TokenFamily::Rune => "ordpool_stats_rune_etch",
            TokenFamily::Brc20 => "ordpool_stats_brc20_deploy",
            TokenFamily::Src20 => "ordpool_stats_src20_deploy",
        }
    }

    pub fn encoding(&self) -> ActivityEncoding {
        match self {
            TokenFamily::Rune => ActivityEncoding::Flat,
            TokenFamily::Brc20 | TokenFamily::Src20 => ActivityEncoding::JsonFragments,
        }
    }
}

impl fmt::Display for TokenFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenFamily::Rune => write!(f, "rune"),
            TokenFamily::Brc20 => write!(f, "brc20"),
            TokenFamily::Src20 => write!(f, "src20"),
        }
    }
}

impl OrdpoolStats {
    pub fn activity(&self, family: TokenFamily) -> &TokenActivity {
        match family {
            TokenFamily::Rune => &self.runes.activity,
            TokenFamily::Brc20 => &self.brc20.activity,
            TokenFamily::Src20 => &self.src20.activity,
        }
    }

    pub fn activity_mut(&mut self, family: TokenFamily) -> &mut TokenActivity {
        match family {
            TokenFamily::Rune => &mut self.runes.activity,
            TokenFamily::Brc20 => &mut self.brc20.activity,
            TokenFamily::Src20 => &mut self.src20.activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_active_mint_prefers_highest_count() {
        let mut activity = TokenActivity::default();
        activity.record_mint("840000:3");
        activity.record_mint("840000:3");
        activity.record_mint("1:0");
        activity.record_mint("1:0");
        activity.record_mint("1:0");

        assert_eq!(activity.most_active_mint(None).as_deref(), Some("1:0"));
        assert_eq!(
            activity.most_active_mint(Some(UNCOMMON_GOODS_RUNE_ID)).as_deref(),
            Some("840000:3")
        );
    }

    #[test]
    fn test_most_active_mint_breaks_ties_deterministically() {
        let mut activity = TokenActivity::default();
        activity.record_mint("sats");
        activity.record_mint("ordi");
        assert_eq!(activity.most_active_mint(None).as_deref(), Some("ordi"));
        assert_eq!(TokenActivity::default().most_active_mint(None), None);
    }

    #[test]
    fn test_attempts_keep_order_of_appearance() {
        let mut activity = TokenActivity::default();
        activity.record_attempt("ordi", "tx1");
        activity.record_attempt("ordi", "tx2");
        activity.record_attempt("sats", "tx3");

        assert_eq!(activity.attempts["ordi"], vec!["tx1", "tx2"]);
        assert_eq!(activity.attempts["sats"], vec!["tx3"]);
    }

    #[test]
    fn test_family_tables_and_encodings() {
        assert_eq!(TokenFamily::Rune.attempt_table(), "ordpool_stats_rune_etch");
        assert_eq!(TokenFamily::Src20.mint_activity_table(), "ordpool_stats_src20_mint_activity");
        assert_eq!(TokenFamily::Rune.encoding(), ActivityEncoding::Flat);
        assert_eq!(TokenFamily::Brc20.encoding(), ActivityEncoding::JsonFragments);
    }
}
