//! Repository for the ordpool_stats table and its per-identifier activity tables

use async_trait::async_trait;
use bitcoincore_rpc::bitcoin::BlockHash;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend,
    EntityTrait, QueryResult, Statement, TransactionTrait, Value,
};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use super::{SaveOutcome, StatsStore};
use crate::domain::models::{
    ActivityEncoding, Amounts, BlockCursor, Fees, InscriptionSizes, OrdpoolStats, RuneStats,
    TokenActivity, TokenFamily, TokenStats,
};
use crate::domain::services::activity_codec;
use crate::infrastructure::persistence::entities::ordpool_stats;
use crate::infrastructure::persistence::error::{is_duplicate_key, DbError};
use crate::utils::logging;

/// Identifiers and most-active ids are cut to this many characters before storage
pub const MAX_IDENTIFIER_LENGTH: usize = 20;

const NEXT_UNINDEXED_BLOCK_SQL: &str = r#"
    SELECT b.hash AS hash,
           b.height::BIGINT AS height,
           EXTRACT(EPOCH FROM b.block_timestamp)::BIGINT AS block_timestamp
    FROM blocks b
    LEFT JOIN ordpool_stats s ON s.hash = b.hash
    WHERE b.height >= $1 AND s.hash IS NULL
    ORDER BY b.height ASC
    LIMIT 1
"#;

/// Repository for ordpool stats operations
#[derive(Clone)]
pub struct OrdpoolStatsRepository {
    conn: Arc<DatabaseConnection>,
    activity_batch_size: usize,
}

impl std::fmt::Debug for OrdpoolStatsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdpoolStatsRepository")
            .field("activity_batch_size", &self.activity_batch_size)
            .finish_non_exhaustive()
    }
}

impl OrdpoolStatsRepository {
    /// Create a new OrdpoolStatsRepository
    pub fn new(conn: Arc<DatabaseConnection>, activity_batch_size: usize) -> Self {
        Self {
            conn,
            activity_batch_size: activity_batch_size.max(1),
        }
    }

    async fn write_mint_activity(
        &self,
        txn: &DatabaseTransaction,
        cursor: &BlockCursor,
        family: TokenFamily,
        activity: &TokenActivity,
    ) -> Result<(), DbError> {
        let rows = mint_rows(activity);
        for chunk in rows.chunks(self.activity_batch_size) {
            let mut values = Vec::with_capacity(chunk.len() * 4);
            for (identifier, count) in chunk {
                values.push(Value::from(cursor.id.to_string()));
                values.push(Value::from(to_int(cursor.height)));
                values.push(Value::from(identifier.clone()));
                values.push(Value::from(to_int(*count)));
            }
            let sql = format!(
                "INSERT INTO {} (hash, height, identifier, count) VALUES {} \
                 ON CONFLICT (hash, identifier) DO UPDATE SET count = EXCLUDED.count",
                family.mint_activity_table(),
                placeholders(chunk.len(), 4)
            );
            txn.execute(Statement::from_sql_and_values(DbBackend::Postgres, &sql, values))
                .await
                .map_err(|e| DbError::QueryError(e.to_string()))?;
        }
        Ok(())
    }

    async fn write_attempts(
        &self,
        txn: &DatabaseTransaction,
        cursor: &BlockCursor,
        family: TokenFamily,
        activity: &TokenActivity,
    ) -> Result<(), DbError> {
        let rows = attempt_rows(activity);
        for chunk in rows.chunks(self.activity_batch_size) {
            let mut values = Vec::with_capacity(chunk.len() * 4);
            for (identifier, txid) in chunk {
                values.push(Value::from(cursor.id.to_string()));
                values.push(Value::from(to_int(cursor.height)));
                values.push(Value::from(identifier.clone()));
                values.push(Value::from(txid.clone()));
            }
            let sql = format!(
                "INSERT INTO {} (hash, height, identifier, txid) VALUES {} \
                 ON CONFLICT (hash, identifier, txid) DO NOTHING",
                family.attempt_table(),
                placeholders(chunk.len(), 4)
            );
            txn.execute(Statement::from_sql_and_values(DbBackend::Postgres, &sql, values))
                .await
                .map_err(|e| DbError::QueryError(e.to_string()))?;
        }
        Ok(())
    }

    async fn load_activity(
        &self,
        hash: &str,
    ) -> Result<HashMap<TokenFamily, TokenActivity>, DbError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &activity_sql(),
            [Value::from(hash.to_string())],
        );
        let row = self.conn.query_one(stmt).await?;

        let mut activities = HashMap::new();
        for family in TokenFamily::ALL {
            let activity = match &row {
                Some(row) => decode_activity_row(row, family)?,
                None => TokenActivity::default(),
            };
            activities.insert(family, activity);
        }
        Ok(activities)
    }
}

#[async_trait]
impl StatsStore for OrdpoolStatsRepository {
    async fn next_unindexed_block(&self, min_height: u64) -> Result<Option<BlockCursor>, DbError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            NEXT_UNINDEXED_BLOCK_SQL,
            [Value::from(i64::try_from(min_height).unwrap_or(i64::MAX))],
        );

        let Some(row) = self
            .conn
            .query_one(stmt)
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?
        else {
            return Ok(None);
        };

        let hash: String = row.try_get("", "hash")?;
        let height: i64 = row.try_get("", "height")?;
        let timestamp: i64 = row.try_get("", "block_timestamp")?;

        let id = BlockHash::from_str(&hash)
            .map_err(|e| DbError::DecodeError(format!("Invalid block hash {}: {}", hash, e)))?;
        let height = u64::try_from(height)
            .map_err(|_| DbError::DecodeError(format!("Negative block height {}", height)))?;

        Ok(Some(BlockCursor::new(id, height, timestamp)))
    }

    async fn save_stats(
        &self,
        cursor: &BlockCursor,
        stats: &OrdpoolStats,
    ) -> Result<SaveOutcome, DbError> {
        let txn = self.conn.begin().await?;

        let inserted = ordpool_stats::Entity::insert(to_active_model(cursor, stats))
            .on_conflict(
                OnConflict::column(ordpool_stats::Column::Hash)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await;

        let rows = match inserted {
            Ok(rows) => rows,
            Err(e) if is_duplicate_key(&e) => 0,
            Err(e) => {
                logging::log_error(&format!(
                    "Cannot save stats of block {} at height {}: {}",
                    cursor.id, cursor.height, e
                ));
                return Err(e.into());
            }
        };

        if rows == 0 {
            txn.rollback().await?;
            logging::log_debug(&format!(
                "Block {} has already been indexed, ignoring",
                cursor.height
            ));
            return Ok(SaveOutcome::AlreadyIndexed);
        }

        for family in TokenFamily::ALL {
            let activity = stats.activity(family);
            self.write_mint_activity(&txn, cursor, family, activity).await?;
            self.write_attempts(&txn, cursor, family, activity).await?;
        }

        txn.commit().await?;
        logging::log_debug(&format!("Block {} successfully stored", cursor.height));
        Ok(SaveOutcome::Inserted)
    }

    async fn load_stats(&self, block: &BlockHash) -> Result<Option<OrdpoolStats>, DbError> {
        let hash = block.to_string();
        let Some(model) = ordpool_stats::Entity::find_by_id(hash.clone())
            .one(self.conn.as_ref())
            .await?
        else {
            return Ok(None);
        };

        if model.analyser_version == 0 {
            return Ok(None);
        }

        let mut activities = self.load_activity(&hash).await?;
        let mut take = |family: TokenFamily| activities.remove(&family).unwrap_or_default();
        let rune_activity = take(TokenFamily::Rune);
        let brc20_activity = take(TokenFamily::Brc20);
        let src20_activity = take(TokenFamily::Src20);

        Ok(Some(into_stats(model, rune_activity, brc20_activity, src20_activity)))
    }
}

/// First [`MAX_IDENTIFIER_LENGTH`] characters of an identifier
pub fn truncate_identifier(identifier: &str) -> String {
    identifier.chars().take(MAX_IDENTIFIER_LENGTH).collect()
}

/// Mint counts keyed by truncated identifier; ids colliding after truncation are summed
fn mint_rows(activity: &TokenActivity) -> Vec<(String, u64)> {
    let mut merged: HashMap<String, u64> = HashMap::new();
    for (identifier, count) in &activity.mint_activity {
        *merged.entry(truncate_identifier(identifier)).or_insert(0) += count;
    }
    let mut rows: Vec<(String, u64)> = merged.into_iter().collect();
    rows.sort();
    rows
}

/// Distinct `(truncated identifier, txid)` pairs, txids kept in order of appearance
fn attempt_rows(activity: &TokenActivity) -> Vec<(String, String)> {
    let mut identifiers: Vec<&String> = activity.attempts.keys().collect();
    identifiers.sort();

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut rows: Vec<(String, String)> = Vec::new();
    for identifier in identifiers {
        let truncated = truncate_identifier(identifier);
        for txid in &activity.attempts[identifier] {
            let row = (truncated.clone(), txid.clone());
            if seen.insert(row.clone()) {
                rows.push(row);
            }
        }
    }
    rows
}

/// `($1, $2, ..), ($n, ..)` for a multi-row insert
fn placeholders(rows: usize, columns: usize) -> String {
    (0..rows)
        .map(|row| {
            let params: Vec<String> = (1..=columns)
                .map(|column| format!("${}", row * columns + column))
                .collect();
            format!("({})", params.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// One scalar sub-select per family and kind, folding rows into a compact string
fn activity_sql() -> String {
    let columns: Vec<String> = TokenFamily::ALL
        .iter()
        .flat_map(|family| {
            let (mint_expr, attempt_expr) = match family.encoding() {
                ActivityEncoding::Flat => (
                    "identifier || ',' || count".to_string(),
                    "identifier || ',' || txid".to_string(),
                ),
                ActivityEncoding::JsonFragments => (
                    format!(
                        "json_build_object('{}', identifier, '{}', count)::text",
                        activity_codec::IDENTIFIER_FIELD,
                        activity_codec::COUNT_FIELD
                    ),
                    format!(
                        "json_build_object('{}', identifier, '{}', txid)::text",
                        activity_codec::IDENTIFIER_FIELD,
                        activity_codec::TXID_FIELD
                    ),
                ),
            };
            [
                format!(
                    "(SELECT string_agg({}, ',' ORDER BY identifier) FROM {} WHERE hash = $1) AS {}_mint_activity",
                    mint_expr,
                    family.mint_activity_table(),
                    family
                ),
                format!(
                    "(SELECT string_agg({}, ',' ORDER BY id) FROM {} WHERE hash = $1) AS {}_attempts",
                    attempt_expr,
                    family.attempt_table(),
                    family
                ),
            ]
        })
        .collect();
    format!("SELECT {}", columns.join(", "))
}

fn decode_activity_row(row: &QueryResult, family: TokenFamily) -> Result<TokenActivity, DbError> {
    let mint: Option<String> = row.try_get("", &format!("{}_mint_activity", family))?;
    let attempts: Option<String> = row.try_get("", &format!("{}_attempts", family))?;

    Ok(TokenActivity {
        mint_activity: activity_codec::decode_activity(family.encoding(), mint.as_deref())?,
        attempts: activity_codec::decode_attempts(family.encoding(), attempts.as_deref())?,
    })
}

fn to_int<T: TryInto<i32>>(value: T) -> i32 {
    value.try_into().unwrap_or(i32::MAX)
}

fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_int(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn from_bigint(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_active_model(cursor: &BlockCursor, stats: &OrdpoolStats) -> ordpool_stats::ActiveModel {
    let a = &stats.amounts;
    let f = &stats.fees;
    let i = &stats.inscriptions;

    ordpool_stats::ActiveModel {
        hash: Set(cursor.id.to_string()),
        height: Set(to_int(cursor.height)),

        amounts_atomical: Set(to_int(a.atomical)),
        amounts_atomical_mint: Set(to_int(a.atomical_mint)),
        amounts_atomical_transfer: Set(to_int(a.atomical_transfer)),
        amounts_atomical_update: Set(to_int(a.atomical_update)),

        amounts_cat21: Set(to_int(a.cat21)),
        amounts_cat21_mint: Set(to_int(a.cat21_mint)),
        amounts_cat21_transfer: Set(to_int(a.cat21_transfer)),

        amounts_inscription: Set(to_int(a.inscription)),
        amounts_inscription_mint: Set(to_int(a.inscription_mint)),
        amounts_inscription_transfer: Set(to_int(a.inscription_transfer)),
        amounts_inscription_burn: Set(to_int(a.inscription_burn)),

        amounts_rune: Set(to_int(a.rune)),
        amounts_rune_etch: Set(to_int(a.rune_etch)),
        amounts_rune_mint: Set(to_int(a.rune_mint)),
        amounts_rune_cenotaph: Set(to_int(a.rune_cenotaph)),
        amounts_rune_transfer: Set(to_int(a.rune_transfer)),
        amounts_rune_burn: Set(to_int(a.rune_burn)),

        amounts_brc20: Set(to_int(a.brc20)),
        amounts_brc20_deploy: Set(to_int(a.brc20_deploy)),
        amounts_brc20_mint: Set(to_int(a.brc20_mint)),
        amounts_brc20_transfer: Set(to_int(a.brc20_transfer)),

        amounts_src20: Set(to_int(a.src20)),
        amounts_src20_deploy: Set(to_int(a.src20_deploy)),
        amounts_src20_mint: Set(to_int(a.src20_mint)),
        amounts_src20_transfer: Set(to_int(a.src20_transfer)),

        fees_rune_mints: Set(to_bigint(f.rune_mints)),
        fees_non_uncommon_rune_mints: Set(to_bigint(f.non_uncommon_rune_mints)),
        fees_brc20_mints: Set(to_bigint(f.brc20_mints)),
        fees_src20_mints: Set(to_bigint(f.src20_mints)),
        fees_cat21_mints: Set(to_bigint(f.cat21_mints)),
        fees_atomicals: Set(to_bigint(f.atomicals)),
        fees_inscription_mints: Set(to_bigint(f.inscription_mints)),

        inscriptions_total_envelope_size: Set(to_bigint(i.total_envelope_size)),
        inscriptions_total_content_size: Set(to_bigint(i.total_content_size)),
        inscriptions_largest_envelope_size: Set(to_bigint(i.largest_envelope_size)),
        inscriptions_largest_content_size: Set(to_bigint(i.largest_content_size)),
        inscriptions_largest_envelope_inscription_id: Set(i.largest_envelope_inscription_id.clone()),
        inscriptions_largest_content_inscription_id: Set(i.largest_content_inscription_id.clone()),
        inscriptions_average_envelope_size: Set(to_bigint(i.average_envelope_size)),
        inscriptions_average_content_size: Set(to_bigint(i.average_content_size)),

        runes_most_active_mint: Set(stats.runes.most_active_mint.as_deref().map(truncate_identifier)),
        runes_most_active_non_uncommon_mint: Set(stats
            .runes
            .most_active_non_uncommon_mint
            .as_deref()
            .map(truncate_identifier)),
        brc20_most_active_mint: Set(stats.brc20.most_active_mint.as_deref().map(truncate_identifier)),
        src20_most_active_mint: Set(stats.src20.most_active_mint.as_deref().map(truncate_identifier)),

        analyser_version: Set(to_int(stats.version)),
    }
}

fn into_stats(
    m: ordpool_stats::Model,
    rune_activity: TokenActivity,
    brc20_activity: TokenActivity,
    src20_activity: TokenActivity,
) -> OrdpoolStats {
    OrdpoolStats {
        amounts: Amounts {
            atomical: from_int(m.amounts_atomical),
            atomical_mint: from_int(m.amounts_atomical_mint),
            atomical_transfer: from_int(m.amounts_atomical_transfer),
            atomical_update: from_int(m.amounts_atomical_update),

            cat21: from_int(m.amounts_cat21),
            cat21_mint: from_int(m.amounts_cat21_mint),
            cat21_transfer: from_int(m.amounts_cat21_transfer),

            inscription: from_int(m.amounts_inscription),
            inscription_mint: from_int(m.amounts_inscription_mint),
            inscription_transfer: from_int(m.amounts_inscription_transfer),
            inscription_burn: from_int(m.amounts_inscription_burn),

            rune: from_int(m.amounts_rune),
            rune_etch: from_int(m.amounts_rune_etch),
            rune_mint: from_int(m.amounts_rune_mint),
            rune_cenotaph: from_int(m.amounts_rune_cenotaph),
            rune_transfer: from_int(m.amounts_rune_transfer),
            rune_burn: from_int(m.amounts_rune_burn),

            brc20: from_int(m.amounts_brc20),
            brc20_deploy: from_int(m.amounts_brc20_deploy),
            brc20_mint: from_int(m.amounts_brc20_mint),
            brc20_transfer: from_int(m.amounts_brc20_transfer),

            src20: from_int(m.amounts_src20),
            src20_deploy: from_int(m.amounts_src20_deploy),
            src20_mint: from_int(m.amounts_src20_mint),
            src20_transfer: from_int(m.amounts_src20_transfer),
        },
        fees: Fees {
            rune_mints: from_bigint(m.fees_rune_mints),
            non_uncommon_rune_mints: from_bigint(m.fees_non_uncommon_rune_mints),
            brc20_mints: from_bigint(m.fees_brc20_mints),
            src20_mints: from_bigint(m.fees_src20_mints),
            cat21_mints: from_bigint(m.fees_cat21_mints),
            atomicals: from_bigint(m.fees_atomicals),
            inscription_mints: from_bigint(m.fees_inscription_mints),
        },
        inscriptions: InscriptionSizes {
            total_envelope_size: from_bigint(m.inscriptions_total_envelope_size),
            total_content_size: from_bigint(m.inscriptions_total_content_size),
            largest_envelope_size: from_bigint(m.inscriptions_largest_envelope_size),
            largest_content_size: from_bigint(m.inscriptions_largest_content_size),
            largest_envelope_inscription_id: m.inscriptions_largest_envelope_inscription_id,
            largest_content_inscription_id: m.inscriptions_largest_content_inscription_id,
            average_envelope_size: from_bigint(m.inscriptions_average_envelope_size),
            average_content_size: from_bigint(m.inscriptions_average_content_size),
        },
        runes: RuneStats {
            most_active_mint: m.runes_most_active_mint,
            most_active_non_uncommon_mint: m.runes_most_active_non_uncommon_mint,
            activity: rune_activity,
        },
        brc20: TokenStats {
            most_active_mint: m.brc20_most_active_mint,
            activity: brc20_activity,
        },
        src20: TokenStats {
            most_active_mint: m.src20_most_active_mint,
            activity: src20_activity,
        },
        version: from_int(m.analyser_version),
    }
}
