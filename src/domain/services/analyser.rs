//! The analyser boundary and the built-in envelope analyser.

use bitcoincore_rpc::bitcoin::Transaction;
use serde::Deserialize;

use super::envelope::{self, Envelope};
use super::runestone::{self, Artifact};
use crate::domain::errors::AnalyserError;
use crate::domain::models::{
    BlockCursor, InscriptionSizes, OrdpoolStats, TokenFamily, UNCOMMON_GOODS_RUNE_ID,
};

/// Version stamped on every stats row produced by [`EnvelopeAnalyser`]
pub const ANALYSER_VERSION: u32 = 1;

const CAT21_LOCK_TIME: u32 = 21;
const ORD_PROTOCOL: &[u8] = b"ord";
const ATOMICALS_PROTOCOL: &[u8] = b"atom";
const ATOMICALS_MINT_OPS: [&[u8]; 4] = [b"nft", b"ft", b"dft", b"dmt"];
const ATOMICALS_UPDATE_OP: &[u8] = b"mod";

/// Turns a block's transactions into statistics.
///
/// Implementations must be deterministic: the same transactions always yield
/// the same stats.
pub trait Analyser: Send + Sync {
    fn analyse(
        &self,
        cursor: &BlockCursor,
        transactions: &[Transaction],
    ) -> Result<OrdpoolStats, AnalyserError>;
}

/// Recognises inscription and atomicals envelopes, BRC-20 / SRC-20 JSON
/// operations carried in inscriptions, runestones and CAT-21 mints.
///
/// Fees need the values of spent outputs, which a raw block does not carry, so
/// they stay 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeAnalyser;

impl EnvelopeAnalyser {
    pub fn new() -> Self {
        Self
    }
}

impl Analyser for EnvelopeAnalyser {
    fn analyse(
        &self,
        _cursor: &BlockCursor,
        transactions: &[Transaction],
    ) -> Result<OrdpoolStats, AnalyserError> {
        let mut stats = OrdpoolStats {
            version: ANALYSER_VERSION,
            ..OrdpoolStats::default()
        };

        for tx in transactions.iter().filter(|tx| !is_coinbase(tx)) {
            analyse_transaction(tx, &mut stats);
        }

        finalize(&mut stats);
        Ok(stats)
    }
}

fn is_coinbase(tx: &Transaction) -> bool {
    tx.input.len() == 1 && tx.input[0].previous_output.is_null()
}

fn analyse_transaction(tx: &Transaction, stats: &mut OrdpoolStats) {
    let txid = tx.txid().to_string();

    let mut inscription_index = 0usize;
    let mut has_atomical = false;
    for input in &tx.input {
        for found in envelope::envelopes(input) {
            match found.protocol.as_slice() {
                ORD_PROTOCOL => {
                    let inscription_id = format!("{}i{}", txid, inscription_index);
                    inscription_index += 1;
                    record_inscription(&found, &inscription_id, &txid, stats);
                }
                ATOMICALS_PROTOCOL => {
                    has_atomical = true;
                    record_atomical(&found, stats);
                }
                _ => {}
            }
        }
    }
    if has_atomical {
        stats.amounts.atomical += 1;
    }

    if tx.lock_time.to_consensus_u32() == CAT21_LOCK_TIME {
        stats.amounts.cat21 += 1;
        stats.amounts.cat21_mint += 1;
    }

    if let Some(artifact) = runestone::decipher(tx) {
        record_rune(artifact, &txid, stats);
    }
}

fn record_inscription(found: &Envelope, inscription_id: &str, txid: &str, stats: &mut OrdpoolStats) {
    let body = found.body();
    let envelope_size = found.envelope_size as u64;
    let content_size = body.len() as u64;

    stats.amounts.inscription += 1;
    stats.amounts.inscription_mint += 1;

    let sizes = &mut stats.inscriptions;
    sizes.total_envelope_size += envelope_size;
    sizes.total_content_size += content_size;
    if envelope_size > sizes.largest_envelope_size || sizes.largest_envelope_inscription_id.is_none() {
        sizes.largest_envelope_size = envelope_size;
        sizes.largest_envelope_inscription_id = Some(inscription_id.to_string());
    }
    if content_size > sizes.largest_content_size || sizes.largest_content_inscription_id.is_none() {
        sizes.largest_content_size = content_size;
        sizes.largest_content_inscription_id = Some(inscription_id.to_string());
    }

    if let Some(operation) = TokenOperation::parse(&body) {
        operation.record(txid, stats);
    }
}

fn record_atomical(found: &Envelope, stats: &mut OrdpoolStats) {
    match found.operation() {
        Some(op) if ATOMICALS_MINT_OPS.iter().any(|mint| *mint == op) => stats.amounts.atomical_mint += 1,
        Some(ATOMICALS_UPDATE_OP) => stats.amounts.atomical_update += 1,
        _ => stats.amounts.atomical_transfer += 1,
    }
}

fn record_rune(artifact: Artifact, txid: &str, stats: &mut OrdpoolStats) {
    stats.amounts.rune += 1;
    let runestone = match artifact {
        Artifact::Cenotaph => {
            stats.amounts.rune_cenotaph += 1;
            return;
        }
        Artifact::Runestone(runestone) => runestone,
    };

    if let Some(name) = &runestone.etching {
        stats.amounts.rune_etch += 1;
        stats.runes.activity.record_attempt(name, txid);
    }
    if let Some(rune_id) = &runestone.mint {
        stats.amounts.rune_mint += 1;
        stats.runes.activity.record_mint(rune_id);
    }
    if runestone.has_edicts {
        stats.amounts.rune_transfer += 1;
    }
}

/// JSON body of a BRC-20 / SRC-20 inscription
#[derive(Debug, Deserialize)]
struct TokenOperation {
    p: String,
    op: String,
    tick: String,
}

impl TokenOperation {
    fn parse(body: &[u8]) -> Option<Self> {
        let operation: TokenOperation = serde_json::from_slice(body).ok()?;
        if operation.tick.is_empty() {
            return None;
        }
        Some(operation)
    }

    fn family(&self) -> Option<TokenFamily> {
        match self.p.to_ascii_lowercase().as_str() {
            "brc-20" => Some(TokenFamily::Brc20),
            "src-20" => Some(TokenFamily::Src20),
            _ => None,
        }
    }

    fn record(&self, txid: &str, stats: &mut OrdpoolStats) {
        let Some(family) = self.family() else {
            return;
        };
        let tick = self.tick.to_lowercase();
        let op = self.op.to_ascii_lowercase();

        let amounts = &mut stats.amounts;
        let (total, deploy, mint, transfer) = match family {
            TokenFamily::Brc20 => (
                &mut amounts.brc20,
                &mut amounts.brc20_deploy,
                &mut amounts.brc20_mint,
                &mut amounts.brc20_transfer,
            ),
            TokenFamily::Src20 => (
                &mut amounts.src20,
                &mut amounts.src20_deploy,
                &mut amounts.src20_mint,
                &mut amounts.src20_transfer,
            ),
            TokenFamily::Rune => return,
        };

        match op.as_str() {
            "deploy" => {
                *total += 1;
                *deploy += 1;
                stats.activity_mut(family).record_attempt(&tick, txid);
            }
            "mint" => {
                *total += 1;
                *mint += 1;
                stats.activity_mut(family).record_mint(&tick);
            }
            "transfer" => {
                *total += 1;
                *transfer += 1;
            }
            _ => {}
        }
    }
}

fn finalize(stats: &mut OrdpoolStats) {
    let count = u64::from(stats.amounts.inscription);
    let sizes: &mut InscriptionSizes = &mut stats.inscriptions;
    if count > 0 {
        sizes.average_envelope_size = sizes.total_envelope_size / count;
        sizes.average_content_size = sizes.total_content_size / count;
    }

    stats.runes.most_active_mint = stats.runes.activity.most_active_mint(None);
    stats.runes.most_active_non_uncommon_mint = stats
        .runes
        .activity
        .most_active_mint(Some(UNCOMMON_GOODS_RUNE_ID));
    stats.brc20.most_active_mint = stats.brc20.activity.most_active_mint(None);
    stats.src20.most_active_mint = stats.src20.activity.most_active_mint(None);
}
